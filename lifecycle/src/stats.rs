//! Dashboard statistics, recomputed from scratch on every call.

use crate::domain::graph;
use crate::request::Request;
use crate::status::{Milestone, Status};
use crate::types::Money;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// What to group the "top" list by.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKey {
    /// Request service type (emergency type, test type, service category)
    #[default]
    ServiceType,
    /// Line item name (medicine, test panel)
    LineItem,
}

/// Parameters of an aggregation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsQuery {
    /// Milestone pair whose gap is averaged
    pub duration: (Milestone, Milestone),
    /// Grouping of the top list
    pub group_by: GroupKey,
    /// Length of the top list
    pub top_n: usize,
}

impl Default for StatsQuery {
    fn default() -> Self {
        Self {
            duration: (Milestone::Created, Milestone::Assigned),
            group_by: GroupKey::ServiceType,
            top_n: 5,
        }
    }
}

/// One entry of the top list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSummary {
    /// Service type or line item name
    pub key: String,
    /// Requests (service type) or units (line item)
    pub count: u64,
    /// Revenue attributed to the key from completed requests
    pub revenue: Money,
}

/// Aggregated view of a set of requests.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    /// Number of requests
    pub total: usize,
    /// Requests per status, serialised as `[status, count]` pairs
    #[serde(with = "status_counts")]
    pub by_status: BTreeMap<Status, usize>,
    /// Requests in their domain's success terminal
    pub completed: usize,
    /// Requests cancelled
    pub cancelled: usize,
    /// Verification cases rejected
    pub rejected: usize,
    /// Requests not yet terminal
    pub active: usize,
    /// `completed / total`, `0.0` for an empty set
    pub completion_rate: f64,
    /// Mean minutes between the query's milestones
    pub average_minutes: Option<f64>,
    /// Sum of completed requests' totals
    pub total_revenue: Money,
    /// Mean total of completed requests
    pub average_revenue: Money,
    /// Most frequent groups
    pub top: Vec<GroupSummary>,
}

impl Stats {
    /// Requests currently in `status`
    #[must_use]
    pub fn count(&self, status: Status) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

/// `Status` is a tagged enum, which JSON cannot use as an object key.
mod status_counts {
    use crate::status::Status;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(
        counts: &BTreeMap<Status, usize>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(counts)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<Status, usize>, D::Error> {
        Ok(Vec::<(Status, usize)>::deserialize(deserializer)?.into_iter().collect())
    }
}

#[derive(Default)]
struct Group {
    count: u64,
    revenue: Money,
}

/// Aggregate `requests` under `query`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn aggregate<'a, I>(requests: I, query: &StatsQuery) -> Stats
where
    I: IntoIterator<Item = &'a Request>,
{
    let mut stats = Stats::default();
    let mut minutes = Vec::new();
    let mut groups: HashMap<String, Group> = HashMap::new();

    for request in requests {
        let g = graph(request.domain());
        let completed = request.status == g.success;

        stats.total += 1;
        *stats.by_status.entry(request.status).or_insert(0) += 1;
        if completed {
            stats.completed += 1;
            stats.total_revenue = stats.total_revenue.saturating_add(request.cost.total());
        } else if request.status.is_cancelled() {
            stats.cancelled += 1;
        } else if request.status.is_rejected() {
            stats.rejected += 1;
        } else if !g.is_terminal(request.status) {
            stats.active += 1;
        }

        let (from, to) = query.duration;
        if let Some(m) = request.minutes_between(from, to) {
            minutes.push(m);
        }

        match query.group_by {
            GroupKey::ServiceType => {
                if let Some(key) = &request.service_type {
                    let group = groups.entry(key.clone()).or_default();
                    group.count += 1;
                    if completed {
                        group.revenue = group.revenue.saturating_add(request.cost.total());
                    }
                }
            },
            GroupKey::LineItem => {
                for item in &request.line_items {
                    let group = groups.entry(item.name.clone()).or_default();
                    group.count += u64::try_from(item.quantity).unwrap_or(0);
                    if completed {
                        let line = item.unit_price.checked_mul(item.quantity).unwrap_or(Money::ZERO);
                        group.revenue = group.revenue.saturating_add(line);
                    }
                }
            },
        }
    }

    if stats.total > 0 {
        stats.completion_rate = stats.completed as f64 / stats.total as f64;
    }
    if !minutes.is_empty() {
        stats.average_minutes = Some(minutes.iter().sum::<f64>() / minutes.len() as f64);
    }
    if let Ok(completed @ 1..) = i64::try_from(stats.completed) {
        stats.average_revenue = Money::from_cents(stats.total_revenue.cents() / completed);
    }

    let mut top: Vec<GroupSummary> = groups
        .into_iter()
        .map(|(key, group)| GroupSummary {
            key,
            count: group.count,
            revenue: group.revenue,
        })
        .collect();
    top.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| b.revenue.cmp(&a.revenue))
            .then_with(|| a.key.cmp(&b.key))
    });
    top.truncate(query.top_n);
    stats.top = top;

    tracing::debug!(
        total = stats.total,
        completed = stats.completed,
        groups = stats.top.len(),
        "Stats aggregated"
    );

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LifecycleConfig;
    use crate::machine::submit;
    use crate::request::RequestDraft;
    use crate::status::{DomainType, LabStatus, VerificationStatus};
    use crate::types::{LineItem, ProviderId, SubjectId};
    use carelane_testing::test_epoch;
    use chrono::Duration;

    fn lab(test: &str, cents: i64) -> Request {
        let draft = RequestDraft::new(DomainType::LabOrder, ProviderId::new(), SubjectId::new(), "P")
            .service_type(test)
            .item(LineItem::new(test, 1, Money::from_cents(cents)));
        submit(draft, &LifecycleConfig::default(), test_epoch())
            .unwrap_or_else(|e| unreachable!("{e}"))
    }

    #[test]
    fn empty_set_has_zero_rate_and_no_average() {
        let stats = aggregate(std::iter::empty(), &StatsQuery::default());
        assert_eq!(stats.total, 0);
        assert!(stats.completion_rate.abs() < f64::EPSILON);
        assert_eq!(stats.average_minutes, None);
        assert_eq!(stats.average_revenue, Money::ZERO);
        assert!(stats.top.is_empty());
    }

    #[test]
    fn counts_partition_by_outcome() {
        let mut done = lab("CBC", 5_000);
        done.status = Status::LabOrder(LabStatus::Completed);
        let mut cancelled = lab("CBC", 5_000);
        cancelled.status = Status::LabOrder(LabStatus::Cancelled);
        let open = lab("Lipid panel", 8_000);
        let mut rejected = submit(
            RequestDraft::new(DomainType::ProviderVerification, ProviderId::new(), SubjectId::new(), "Clinic"),
            &LifecycleConfig::default(),
            test_epoch(),
        )
        .unwrap_or_else(|e| unreachable!("{e}"));
        rejected.status = Status::ProviderVerification(VerificationStatus::Rejected);

        let stats = aggregate(&[done.clone(), cancelled, open, rejected], &StatsQuery::default());

        assert_eq!(stats.total, 4);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.active, 1);
        assert!((stats.completion_rate - 0.25).abs() < f64::EPSILON);
        assert_eq!(stats.count(Status::LabOrder(LabStatus::Completed)), 1);
        assert_eq!(stats.count(Status::LabOrder(LabStatus::Processing)), 0);
        assert_eq!(stats.total_revenue, done.cost.total());
        assert_eq!(stats.average_revenue, done.cost.total());
    }

    #[test]
    fn average_skips_requests_missing_a_stamp() {
        let mut fast = lab("CBC", 5_000);
        fast.stamp(Milestone::Collected, test_epoch() + Duration::minutes(30));
        let mut slow = lab("CBC", 5_000);
        slow.stamp(Milestone::Collected, test_epoch() + Duration::minutes(90));
        let never = lab("CBC", 5_000);

        let query = StatsQuery {
            duration: (Milestone::Created, Milestone::Collected),
            ..StatsQuery::default()
        };
        let stats = aggregate(&[fast, slow, never], &query);

        assert_eq!(stats.average_minutes, Some(60.0));
    }

    #[test]
    fn top_list_ranks_by_count_then_revenue_then_key() {
        let mut requests = vec![lab("Lipid panel", 8_000), lab("CBC", 5_000), lab("CBC", 5_000)];
        let mut thyroid = lab("Thyroid", 9_000);
        thyroid.status = Status::LabOrder(LabStatus::Completed);
        requests.push(thyroid);
        requests.push(lab("Allergy", 7_000));

        let query = StatsQuery {
            top_n: 3,
            ..StatsQuery::default()
        };
        let stats = aggregate(&requests, &query);
        let keys: Vec<&str> = stats.top.iter().map(|g| g.key.as_str()).collect();

        assert_eq!(keys, vec!["CBC", "Thyroid", "Allergy"]);
        assert_eq!(stats.top[0].count, 2);
        assert_eq!(stats.top[0].revenue, Money::ZERO);
    }

    #[test]
    fn line_item_grouping_counts_units() {
        let draft = RequestDraft::new(DomainType::PharmacyOrder, ProviderId::new(), SubjectId::new(), "P")
            .item(LineItem::new("Amoxicillin", 3, Money::from_cents(400)))
            .item(LineItem::new("Ibuprofen", 1, Money::from_cents(250)));
        let order = submit(draft, &LifecycleConfig::default(), test_epoch())
            .unwrap_or_else(|e| unreachable!("{e}"));

        let query = StatsQuery {
            group_by: GroupKey::LineItem,
            ..StatsQuery::default()
        };
        let stats = aggregate(std::iter::once(&order), &query);

        assert_eq!(stats.top[0].key, "Amoxicillin");
        assert_eq!(stats.top[0].count, 3);
        assert_eq!(stats.top[1].count, 1);
    }

    #[test]
    fn stats_survive_a_json_round_trip() -> Result<(), serde_json::Error> {
        let mut done = lab("CBC", 5_000);
        done.status = Status::LabOrder(LabStatus::Completed);
        let open = lab("Lipid panel", 8_000);
        let stats = aggregate(&[done, open], &StatsQuery::default());

        let json = serde_json::to_string(&stats)?;
        let back: Stats = serde_json::from_str(&json)?;

        assert_eq!(back.by_status, stats.by_status);
        assert_eq!(back.count(Status::LabOrder(LabStatus::Ordered)), 1);
        assert_eq!(back.total, 2);
        assert_eq!(back.top, stats.top);
        assert_eq!(back.total_revenue, stats.total_revenue);
        Ok(())
    }
}
