use std::future::Future;
use std::sync::Arc;

use futures::future::try_join_all;

use crate::duplicates::{CandidateGroup, DuplicateService, FileHash, ImageRecord, ReviewError, SearchFilter};

/// Produces one candidate group per call.
/// This is the unit of work the prefetch buffer keeps in flight.
pub trait GroupSource: Send + Sync + 'static {
    fn fetch_one_group(&self) -> impl Future<Output = Result<CandidateGroup, ReviewError>> + Send;
}

/// Fetches a full candidate group from the remote service:
/// candidate search, file downloads, and decoding.
#[derive(Debug)]
pub struct CandidateGroupFetcher<S> {
    service: Arc<S>,
    filter: SearchFilter,
}

impl<S> Clone for CandidateGroupFetcher<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            filter: self.filter.clone(),
        }
    }
}

impl<S: DuplicateService> CandidateGroupFetcher<S> {
    #[must_use]
    pub const fn new(service: Arc<S>, filter: SearchFilter) -> Self {
        Self { service, filter }
    }

    /// Run one full round trip.
    ///
    /// All files are downloaded concurrently.
    /// A group is only produced if every member downloads and decodes.
    ///
    /// # Errors
    /// - `ServiceUnavailable` if the search or any download fails.
    /// - `EmptyGroup` if the search returns no candidates.
    /// - `Decode` if any file cannot be decoded.
    pub async fn fetch_one_group(&self) -> Result<CandidateGroup, ReviewError> {
        let hashes = self
            .service
            .search_candidates(&self.filter)
            .await
            .map_err(|error| ReviewError::ServiceUnavailable(format!("{error:#}")))?;

        if hashes.is_empty() {
            return Err(ReviewError::EmptyGroup);
        }

        let images = try_join_all(hashes.into_iter().map(|hash| self.fetch_image(hash))).await?;
        Ok(CandidateGroup::new(images))
    }

    async fn fetch_image(&self, hash: FileHash) -> Result<ImageRecord, ReviewError> {
        let bytes = self
            .service
            .fetch_bytes(&hash)
            .await
            .map_err(|error| ReviewError::ServiceUnavailable(format!("{hash}: {error:#}")))?;

        let hash_string = hash.to_string();
        tokio::task::spawn_blocking(move || ImageRecord::decode(hash, bytes))
            .await
            .map_err(|error| ReviewError::Decode {
                hash: hash_string,
                message: error.to_string(),
            })?
    }
}

impl<S: DuplicateService> GroupSource for CandidateGroupFetcher<S> {
    fn fetch_one_group(&self) -> impl Future<Output = Result<CandidateGroup, ReviewError>> + Send {
        Self::fetch_one_group(self)
    }
}
