//! Payment status, kept apart from the lifecycle status.
//!
//! Payment moves `Pending → Completed → Refunded` and never backwards. An
//! emergency's `PENDING → PAID` edge and any cancellation update it as a
//! side effect; everything else goes through [`record_payment`].

use crate::error::PaymentError;
use crate::permissions::{Caller, owns};
use crate::request::Request;
use crate::status::Milestone;
use crate::types::{PaymentStatus, Role};
use chrono::{DateTime, Utc};

const PAYERS: &[Role] = &[Role::Client, Role::Provider, Role::Staff, Role::Platform];
const REFUNDERS: &[Role] = &[Role::Provider, Role::Staff, Role::Platform];

/// Roles that may move payment `from → to`, or `None` if the move is illegal.
const fn permitted(from: PaymentStatus, to: PaymentStatus) -> Option<&'static [Role]> {
    match (from, to) {
        (PaymentStatus::Pending, PaymentStatus::Completed) => Some(PAYERS),
        (PaymentStatus::Completed, PaymentStatus::Refunded) => Some(REFUNDERS),
        _ => None,
    }
}

/// Record a payment change on `request`.
///
/// Completing a payment stamps the `Paid` milestone. The returned request
/// carries a bumped version; the input is not modified.
///
/// # Errors
///
/// - [`PaymentError::IllegalPaymentTransition`] for any move other than
///   `Pending → Completed` or `Completed → Refunded`
/// - [`PaymentError::Unauthorized`] if the role may not make the move or the
///   caller does not own the request
pub fn record_payment(
    request: &Request,
    to: PaymentStatus,
    caller: &Caller,
    now: DateTime<Utc>,
) -> Result<Request, PaymentError> {
    let from = request.payment_status;
    let roles = permitted(from, to).ok_or(PaymentError::IllegalPaymentTransition { from, to })?;

    if !roles.contains(&caller.role) || !owns(caller, request) {
        return Err(PaymentError::Unauthorized {
            role: caller.role,
            to,
        });
    }

    let mut next = request.clone();
    next.payment_status = to;
    next.updated_at = now;
    next.version = request.version.next();
    if to == PaymentStatus::Completed {
        next.stamp(Milestone::Paid, now);
    }

    tracing::info!(request_id = %request.id, %from, %to, "Payment recorded");

    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LifecycleConfig;
    use crate::machine::submit;
    use crate::request::RequestDraft;
    use crate::status::DomainType;
    use crate::types::{ProviderId, SubjectId};
    use carelane_testing::test_epoch;

    fn order() -> Request {
        let draft = RequestDraft::new(
            DomainType::PharmacyOrder,
            ProviderId::new(),
            SubjectId::new(),
            "Mr. Okafor",
        );
        submit(draft, &LifecycleConfig::default(), test_epoch())
            .unwrap_or_else(|e| unreachable!("{e}"))
    }

    #[test]
    fn client_pays_then_provider_refunds() -> Result<(), PaymentError> {
        let order = order();
        let paid = record_payment(
            &order,
            PaymentStatus::Completed,
            &Caller::client(order.subject_id),
            test_epoch(),
        )?;
        assert_eq!(paid.payment_status, PaymentStatus::Completed);
        assert_eq!(paid.milestone(Milestone::Paid), Some(test_epoch()));
        assert_eq!(paid.status, order.status);

        let refunded = record_payment(
            &paid,
            PaymentStatus::Refunded,
            &Caller::provider(order.provider_id),
            test_epoch(),
        )?;
        assert_eq!(refunded.payment_status, PaymentStatus::Refunded);
        assert_eq!(refunded.version, order.version.next().next());
        Ok(())
    }

    #[test]
    fn payment_never_moves_backwards() {
        let order = order();
        let result = record_payment(
            &order,
            PaymentStatus::Refunded,
            &Caller::platform(),
            test_epoch(),
        );
        assert_eq!(
            result,
            Err(PaymentError::IllegalPaymentTransition {
                from: PaymentStatus::Pending,
                to: PaymentStatus::Refunded,
            })
        );
    }

    #[test]
    fn clients_cannot_refund_themselves() -> Result<(), PaymentError> {
        let order = order();
        let client = Caller::client(order.subject_id);
        let paid = record_payment(&order, PaymentStatus::Completed, &client, test_epoch())?;

        let result = record_payment(&paid, PaymentStatus::Refunded, &client, test_epoch());
        assert!(matches!(result, Err(PaymentError::Unauthorized { .. })));
        Ok(())
    }

    #[test]
    fn strangers_cannot_pay() {
        let order = order();
        let result = record_payment(
            &order,
            PaymentStatus::Completed,
            &Caller::client(SubjectId::new()),
            test_epoch(),
        );
        assert!(matches!(result, Err(PaymentError::Unauthorized { .. })));
    }
}
