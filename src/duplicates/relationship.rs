use std::fmt;

use anyhow::Result;
use itertools::iproduct;

use crate::duplicates::{CandidateGroup, DuplicateService, FileHash, RelationshipBatch, RelationshipKind, ReviewError};

/// Reviewer decision for one candidate group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The image at the given display index is the keeper.
    /// Every other image is marked as its worse duplicate, merged into it, and deleted.
    Best(usize),
    /// All images are alternates of each other.
    Alternates,
    /// None of the images are actually duplicates.
    FalsePositive,
    /// Delete every image outright.
    DeleteAll,
}

/// The single remote write a decision translates to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteWrite {
    Relationships(RelationshipBatch),
    Delete(Vec<FileHash>),
}

impl Decision {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Best(_) => "best",
            Self::Alternates => "alternates",
            Self::FalsePositive => "false positive",
            Self::DeleteAll => "delete all",
        }
    }

    /// Build the remote write for this decision.
    /// Only images with a remote identity are included.
    ///
    /// # Errors
    /// Returns `InvalidSelection` if the group has no remote files,
    /// or the chosen best image does not exist, is synthetic, or has nothing to be better than.
    pub fn plan(&self, group: &CandidateGroup) -> Result<RemoteWrite, ReviewError> {
        let hashes = group.remote_ids();
        if hashes.is_empty() {
            return Err(ReviewError::InvalidSelection("group has no remote files".to_string()));
        }

        let write = match *self {
            Self::Best(index) => {
                let best = group
                    .get(index)
                    .ok_or_else(|| ReviewError::InvalidSelection(format!("no image at index {index}")))?
                    .remote_id()
                    .ok_or_else(|| ReviewError::InvalidSelection("the diff image cannot be the best".to_string()))?
                    .clone();

                let pairs: Vec<(FileHash, FileHash)> = hashes
                    .into_iter()
                    .filter(|hash| *hash != best)
                    .map(|worse| (best.clone(), worse))
                    .collect();

                if pairs.is_empty() {
                    return Err(ReviewError::InvalidSelection(
                        "no other images to mark as duplicates".to_string(),
                    ));
                }

                RemoteWrite::Relationships(RelationshipBatch {
                    kind: RelationshipKind::ABetter,
                    pairs,
                    merge: true,
                    delete_a: false,
                    delete_b: true,
                })
            }
            Self::Alternates => RemoteWrite::Relationships(all_pairs(RelationshipKind::Alternates, &hashes)),
            Self::FalsePositive => RemoteWrite::Relationships(all_pairs(RelationshipKind::FalsePositive, &hashes)),
            Self::DeleteAll => RemoteWrite::Delete(hashes),
        };

        Ok(write)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Best(index) => write!(f, "best #{index}"),
            _ => write!(f, "{}", self.name()),
        }
    }
}

impl RemoteWrite {
    /// Number of files touched by this write.
    #[must_use]
    pub fn file_count(&self) -> usize {
        match self {
            Self::Relationships(batch) => {
                let mut hashes: Vec<&FileHash> = batch.pairs.iter().flat_map(|(a, b)| [a, b]).collect();
                hashes.sort_unstable();
                hashes.dedup();
                hashes.len()
            }
            Self::Delete(hashes) => hashes.len(),
        }
    }
}

impl fmt::Display for RemoteWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relationships(batch) => {
                writeln!(
                    f,
                    "Set {} relationship for {} pair(s) (merge: {}, delete a: {}, delete b: {})",
                    batch.kind.label(),
                    batch.pairs.len(),
                    batch.merge,
                    batch.delete_a,
                    batch.delete_b
                )?;
                for (a, b) in &batch.pairs {
                    writeln!(f, "  {a} -> {b}")?;
                }
                Ok(())
            }
            Self::Delete(hashes) => {
                writeln!(f, "Delete {} file(s)", hashes.len())?;
                for hash in hashes {
                    writeln!(f, "  {hash}")?;
                }
                Ok(())
            }
        }
    }
}

/// Send a planned write to the remote service.
///
/// # Errors
/// Returns an error if the remote call fails.
pub async fn submit<S: DuplicateService>(service: &S, write: &RemoteWrite) -> Result<()> {
    match write {
        RemoteWrite::Relationships(batch) => service.assign_relationship(batch).await,
        RemoteWrite::Delete(hashes) => service.delete(hashes).await,
    }
}

/// Every ordered pair of the given hashes, including each hash with itself.
fn all_pairs(kind: RelationshipKind, hashes: &[FileHash]) -> RelationshipBatch {
    RelationshipBatch {
        kind,
        pairs: iproduct!(hashes, hashes).map(|(a, b)| (a.clone(), b.clone())).collect(),
        merge: false,
        delete_a: false,
        delete_b: false,
    }
}

#[cfg(test)]
mod decision_tests {
    use super::*;

    use image::{GrayImage, RgbImage};

    use crate::duplicates::{ImageOrigin, ImageRecord};

    fn hash(value: &str) -> FileHash {
        FileHash::new(value).expect("valid hash")
    }

    fn group_with_diff(hashes: &[&str]) -> CandidateGroup {
        let images = hashes
            .iter()
            .map(|&value| ImageRecord::from_pixels(ImageOrigin::Remote(hash(value)), vec![1], RgbImage::new(1, 1)))
            .collect();
        let mut group = CandidateGroup::new(images);
        group.push_synthetic(ImageRecord::synthetic(GrayImage::new(1, 1)).expect("should encode"));
        group
    }

    fn batch(write: RemoteWrite) -> RelationshipBatch {
        match write {
            RemoteWrite::Relationships(batch) => batch,
            RemoteWrite::Delete(_) => panic!("expected relationship batch"),
        }
    }

    #[test]
    fn best_marks_others_as_worse_and_skips_diff() {
        let group = group_with_diff(&["a", "b", "c"]);
        let batch = batch(Decision::Best(0).plan(&group).expect("should plan"));
        assert_eq!(batch.kind, RelationshipKind::ABetter);
        assert_eq!(batch.pairs, vec![(hash("a"), hash("b")), (hash("a"), hash("c"))]);
        assert!(batch.merge);
        assert!(!batch.delete_a);
        assert!(batch.delete_b);
    }

    #[test]
    fn best_can_be_any_real_image() {
        let group = group_with_diff(&["a", "b", "c"]);
        let batch = batch(Decision::Best(2).plan(&group).expect("should plan"));
        assert_eq!(batch.pairs, vec![(hash("c"), hash("a")), (hash("c"), hash("b"))]);
    }

    #[test]
    fn best_rejects_diff_image() {
        let group = group_with_diff(&["a", "b"]);
        assert!(matches!(
            Decision::Best(2).plan(&group),
            Err(ReviewError::InvalidSelection(_))
        ));
    }

    #[test]
    fn best_rejects_out_of_range_index() {
        let group = group_with_diff(&["a", "b"]);
        assert!(Decision::Best(7).plan(&group).is_err());
    }

    #[test]
    fn best_requires_another_image() {
        let group = group_with_diff(&["a"]);
        assert!(Decision::Best(0).plan(&group).is_err());
    }

    #[test]
    fn alternates_cover_every_ordered_pair() {
        let group = group_with_diff(&["a", "b"]);
        let batch = batch(Decision::Alternates.plan(&group).expect("should plan"));
        assert_eq!(batch.kind, RelationshipKind::Alternates);
        assert_eq!(
            batch.pairs,
            vec![
                (hash("a"), hash("a")),
                (hash("a"), hash("b")),
                (hash("b"), hash("a")),
                (hash("b"), hash("b")),
            ]
        );
        assert!(!batch.merge && !batch.delete_a && !batch.delete_b);
    }

    #[test]
    fn false_positive_cover_every_ordered_pair() {
        let group = group_with_diff(&["a", "b", "c"]);
        let batch = batch(Decision::FalsePositive.plan(&group).expect("should plan"));
        assert_eq!(batch.kind, RelationshipKind::FalsePositive);
        assert_eq!(batch.pairs.len(), 9);
        assert!(!batch.merge && !batch.delete_a && !batch.delete_b);
    }

    #[test]
    fn delete_all_lists_real_files_only() {
        let group = group_with_diff(&["a", "b"]);
        let write = Decision::DeleteAll.plan(&group).expect("should plan");
        assert_eq!(write, RemoteWrite::Delete(vec![hash("a"), hash("b")]));
        assert_eq!(write.file_count(), 2);
    }

    #[test]
    fn group_of_only_synthetic_records_is_rejected() {
        let group = group_with_diff(&[]);
        assert!(Decision::Alternates.plan(&group).is_err());
    }

    #[test]
    fn file_count_deduplicates_pairs() {
        let group = group_with_diff(&["a", "b", "c"]);
        let write = Decision::Alternates.plan(&group).expect("should plan");
        assert_eq!(write.file_count(), 3);
    }

    #[test]
    fn display_best_includes_index() {
        assert_eq!(Decision::Best(3).to_string(), "best #3");
        assert_eq!(Decision::DeleteAll.to_string(), "delete all");
    }
}
