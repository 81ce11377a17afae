use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use thiserror::Error;

use crate::models::Concert;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("http error: {0}")]
    Http(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("remote lookup not configured: {0}")]
    NotConfigured(String),
}

/// The remote source of truth for concert documents.
pub trait RemoteConcertLookup: Send + Sync {
    fn fetch_by_id(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<Concert>, RemoteError>> + Send;

    fn exists(&self, id: &str) -> impl Future<Output = Result<bool, RemoteError>> + Send;
}

impl<R: RemoteConcertLookup> RemoteConcertLookup for Arc<R> {
    fn fetch_by_id(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<Concert>, RemoteError>> + Send {
        (**self).fetch_by_id(id)
    }

    fn exists(&self, id: &str) -> impl Future<Output = Result<bool, RemoteError>> + Send {
        (**self).exists(id)
    }
}

/// Checks every id concurrently and returns the ones the remote still has.
///
/// All lookups are awaited before returning. One failed lookup fails the
/// whole group, since its ids can't be classified.
pub async fn verify_exist<R>(remote: &R, ids: &[String]) -> Result<Vec<String>, RemoteError>
where
    R: RemoteConcertLookup,
{
    let checks: Vec<_> = ids.iter().map(|id| remote.exists(id)).collect();
    let outcomes = join_all(checks).await;

    let mut confirmed = Vec::with_capacity(ids.len());
    for (id, outcome) in ids.iter().zip(outcomes) {
        if outcome? {
            confirmed.push(id.clone());
        }
    }
    Ok(confirmed)
}
