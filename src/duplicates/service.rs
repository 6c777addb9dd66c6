use std::future::Future;

use anyhow::Result;
use serde::{Serialize, Serializer};

use crate::duplicates::FileHash;

/// Tag search used to pick potential duplicate candidates.
pub const DEFAULT_TAGS: &[&str] = &["system:num file relationships > 5 potential duplicates"];

/// Search filter passed to the remote service when asking for candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchFilter {
    pub tags: Vec<String>,
}

/// Duplicate relationship kinds understood by the Hydrus client API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipKind {
    /// The files only look alike.
    FalsePositive,
    /// Related but both worth keeping.
    Alternates,
    /// File A is the better duplicate of file B.
    ABetter,
}

/// One batched relationship write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipBatch {
    pub kind: RelationshipKind,
    pub pairs: Vec<(FileHash, FileHash)>,
    /// Merge tags and other metadata from B into A.
    pub merge: bool,
    pub delete_a: bool,
    pub delete_b: bool,
}

/// Remote duplicate service the review core depends on.
///
/// Implementations must tolerate concurrent use from several fetches at once.
pub trait DuplicateService: Send + Sync + 'static {
    /// Get a set of file hashes the service believes are duplicates of each other.
    fn search_candidates(&self, filter: &SearchFilter) -> impl Future<Output = Result<Vec<FileHash>>> + Send;

    /// Download the raw bytes of a file.
    fn fetch_bytes(&self, hash: &FileHash) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Record a relationship for every pair in the batch.
    fn assign_relationship(&self, batch: &RelationshipBatch) -> impl Future<Output = Result<()>> + Send;

    /// Delete the given files outright.
    fn delete(&self, hashes: &[FileHash]) -> impl Future<Output = Result<()>> + Send;
}

impl Default for SearchFilter {
    fn default() -> Self {
        Self {
            tags: DEFAULT_TAGS.iter().map(|&tag| tag.to_string()).collect(),
        }
    }
}

impl SearchFilter {
    #[must_use]
    pub const fn new(tags: Vec<String>) -> Self {
        Self { tags }
    }

    /// Tags encoded as the JSON list the client API expects in query parameters.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn tags_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.tags)
    }
}

impl RelationshipKind {
    /// Numeric code used by the client API.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::FalsePositive => 1,
            Self::Alternates => 3,
            Self::ABetter => 4,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::FalsePositive => "false positive",
            Self::Alternates => "alternates",
            Self::ABetter => "better than",
        }
    }
}

impl Serialize for RelationshipKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl RelationshipBatch {
    /// Rows in the `[kind, hash_a, hash_b, merge, delete_a, delete_b]` layout
    /// of the `set_file_relationships` endpoint.
    #[must_use]
    pub fn pair_rows(&self) -> Vec<(RelationshipKind, &FileHash, &FileHash, bool, bool, bool)> {
        self.pairs
            .iter()
            .map(|(a, b)| (self.kind, a, b, self.merge, self.delete_a, self.delete_b))
            .collect()
    }
}
