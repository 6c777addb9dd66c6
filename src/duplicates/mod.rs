//! Potential duplicate review core.
//!
//! Fetches candidate duplicate groups from a remote service ahead of time,
//! compares the two most suspicious images of a group,
//! and turns a reviewer's decision into the remote write that records it.

mod buffer;
mod compare;
mod error;
mod fetcher;
mod record;
mod relationship;
mod service;

pub use buffer::{BufferOptions, BufferStatus, PrefetchBuffer};
pub use compare::{Comparison, DIFF_EPSILON, ResizeInfo, compare, compare_group};
pub use error::ReviewError;
pub use fetcher::{CandidateGroupFetcher, GroupSource};
pub use record::{CandidateGroup, FileHash, ImageOrigin, ImageRecord};
pub use relationship::{Decision, RemoteWrite, submit};
pub use service::{DuplicateService, RelationshipBatch, RelationshipKind, SearchFilter};
