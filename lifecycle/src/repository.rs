//! Request persistence with optimistic concurrency.
//!
//! The trait is object safe (boxed futures) so an environment can hold an
//! `Arc<dyn RequestRepository>` and swap the in-memory implementation for a
//! database-backed one.
//!
//! Saves are ordered by [`Request::version`], not by arrival: the store
//! keeps the highest version it has seen. A host that spawns one save per
//! accepted change may see them land in any order and still converge on
//! the latest request.

use crate::error::RepositoryError;
use crate::request::Request;
use crate::types::{ProviderId, RequestId};
use carelane_core::Version;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Boxed future returned by [`RequestRepository`] methods
pub type RepositoryFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, RepositoryError>> + Send + 'a>>;

/// Storage for requests.
pub trait RequestRepository: Send + Sync {
    /// Load a request by id.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::NotFound`] if no request is stored under `id`.
    fn load(&self, id: RequestId) -> RepositoryFuture<'_, Request>;

    /// Store `request` unless a newer version is already stored.
    ///
    /// - nothing stored, or an older version: `request` is written
    /// - the same version with identical content: no-op (a retried save)
    /// - a newer version: no-op, `request` is superseded
    ///
    /// Returns the version now stored.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::ConcurrencyConflict`] when a different request is
    /// already stored at `request.version`: two writers advanced the same
    /// base.
    fn save(&self, request: Request) -> RepositoryFuture<'_, Version>;

    /// All requests belonging to `provider_id`, oldest first.
    ///
    /// # Errors
    ///
    /// Implementation specific; the in-memory store never fails.
    fn list_by_provider(&self, provider_id: ProviderId) -> RepositoryFuture<'_, Vec<Request>>;
}

/// `HashMap`-backed repository for tests and single-process hosts.
#[derive(Clone, Debug, Default)]
pub struct InMemoryRequestRepository {
    requests: Arc<RwLock<HashMap<RequestId, Request>>>,
}

impl InMemoryRequestRepository {
    /// Create an empty repository
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored requests
    pub async fn len(&self) -> usize {
        self.requests.read().await.len()
    }

    /// Whether nothing is stored
    pub async fn is_empty(&self) -> bool {
        self.requests.read().await.is_empty()
    }
}

impl RequestRepository for InMemoryRequestRepository {
    fn load(&self, id: RequestId) -> RepositoryFuture<'_, Request> {
        Box::pin(async move {
            self.requests
                .read()
                .await
                .get(&id)
                .cloned()
                .ok_or(RepositoryError::NotFound(id))
        })
    }

    fn save(&self, request: Request) -> RepositoryFuture<'_, Version> {
        Box::pin(async move {
            let mut requests = self.requests.write().await;

            if let Some(stored) = requests.get(&request.id) {
                if stored.version > request.version {
                    tracing::debug!(
                        request_id = %request.id,
                        stored = %stored.version,
                        saved = %request.version,
                        "Superseded save ignored"
                    );
                    return Ok(stored.version);
                }
                if stored.version == request.version {
                    if *stored == request {
                        return Ok(stored.version);
                    }
                    tracing::warn!(
                        request_id = %request.id,
                        version = %request.version,
                        "Concurrency conflict on save"
                    );
                    return Err(RepositoryError::ConcurrencyConflict {
                        id: request.id,
                        version: request.version,
                    });
                }
            }

            let version = request.version;
            requests.insert(request.id, request);
            Ok(version)
        })
    }

    fn list_by_provider(&self, provider_id: ProviderId) -> RepositoryFuture<'_, Vec<Request>> {
        Box::pin(async move {
            let mut found: Vec<Request> = self
                .requests
                .read()
                .await
                .values()
                .filter(|request| request.provider_id == provider_id)
                .cloned()
                .collect();
            found.sort_by_key(|request| (request.created_at, request.id));
            Ok(found)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LifecycleConfig;
    use crate::machine::submit;
    use crate::request::RequestDraft;
    use crate::status::DomainType;
    use crate::types::SubjectId;
    use carelane_testing::test_epoch;

    fn request(provider: ProviderId) -> Request {
        submit(
            RequestDraft::new(DomainType::LabOrder, provider, SubjectId::new(), "Patient"),
            &LifecycleConfig::default(),
            test_epoch(),
        )
        .unwrap_or_else(|e| unreachable!("{e}"))
    }

    #[tokio::test]
    async fn newer_version_replaces_older() -> Result<(), RepositoryError> {
        let repo = InMemoryRequestRepository::new();
        let mut req = request(ProviderId::new());

        let v0 = repo.save(req.clone()).await?;
        req.version = v0.next();
        let v1 = repo.save(req.clone()).await?;

        assert_eq!(v1, Version::new(1));
        assert_eq!(repo.load(req.id).await?.version, v1);
        Ok(())
    }

    #[tokio::test]
    async fn out_of_order_saves_keep_the_latest() -> Result<(), RepositoryError> {
        let repo = InMemoryRequestRepository::new();
        let created = request(ProviderId::new());
        let mut advanced = created.clone();
        advanced.version = created.version.next();
        advanced.reason = Some("moved on".to_string());

        repo.save(advanced.clone()).await?;
        let stored = repo.save(created.clone()).await?;

        assert_eq!(stored, advanced.version);
        assert_eq!(repo.load(created.id).await?, advanced);
        Ok(())
    }

    #[tokio::test]
    async fn retried_save_is_idempotent() -> Result<(), RepositoryError> {
        let repo = InMemoryRequestRepository::new();
        let req = request(ProviderId::new());
        repo.save(req.clone()).await?;

        assert_eq!(repo.save(req.clone()).await?, req.version);
        Ok(())
    }

    #[tokio::test]
    async fn diverging_writers_conflict() -> Result<(), RepositoryError> {
        let repo = InMemoryRequestRepository::new();
        let base = request(ProviderId::new());
        repo.save(base.clone()).await?;

        let mut first = base.clone();
        first.version = base.version.next();
        first.reason = Some("first".to_string());
        let mut second = first.clone();
        second.reason = Some("second".to_string());

        repo.save(first).await?;
        assert_eq!(
            repo.save(second).await,
            Err(RepositoryError::ConcurrencyConflict {
                id: base.id,
                version: Version::new(1),
            })
        );
        Ok(())
    }

    #[tokio::test]
    async fn missing_request_is_not_found() {
        let repo = InMemoryRequestRepository::new();
        let id = RequestId::new();
        assert_eq!(repo.load(id).await, Err(RepositoryError::NotFound(id)));
        assert!(repo.is_empty().await);
    }

    #[tokio::test]
    async fn lists_only_the_providers_requests() -> Result<(), RepositoryError> {
        let repo = InMemoryRequestRepository::new();
        let provider = ProviderId::new();
        repo.save(request(provider)).await?;
        repo.save(request(provider)).await?;
        repo.save(request(ProviderId::new())).await?;

        assert_eq!(repo.list_by_provider(provider).await?.len(), 2);
        assert_eq!(repo.len().await, 3);
        Ok(())
    }
}
