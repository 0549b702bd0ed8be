//! Apply one crop rectangle to every image
//!
//! Items are processed one after another with the same rectangle snapshot.
//! An image that fails to decode is skipped and reported; the rest of the
//! batch carries on.

use std::sync::Arc;

use crate::state::data::{CropResult, ImageId};
use crate::state::edit::CropRectangle;
use crate::state::library::ImageCollection;

use super::crop::crop;

/// Progress after one item finished (successfully or not)
#[derive(Debug, Clone, PartialEq)]
pub struct BatchProgress {
    pub completed: usize,
    pub total: usize,
    pub id: ImageId,
    pub failed: bool,
}

impl BatchProgress {
    /// Completed share in (0, 1]
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f32 / self.total as f32
        }
    }
}

/// One item's outcome. A failure carries the error message.
#[derive(Debug, Clone)]
pub enum BatchOutcome {
    Cropped(ImageId, CropResult),
    Failed(ImageId, String),
}

/// Everything a batch produced, in input order
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub outcomes: Vec<BatchOutcome>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, BatchOutcome::Cropped(..)))
            .count()
    }

    pub fn failed_ids(&self) -> Vec<ImageId> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                BatchOutcome::Failed(id, _) => Some(*id),
                BatchOutcome::Cropped(..) => None,
            })
            .collect()
    }

    /// Write successful crops back. Comments stay as they are and images
    /// deleted while the batch ran are ignored. Returns the IDs that were stored.
    pub fn store_into(self, images: &mut ImageCollection) -> Vec<ImageId> {
        let mut stored = Vec::new();
        for outcome in self.outcomes {
            if let BatchOutcome::Cropped(id, result) = outcome {
                if images.store_batch_result(id, result) {
                    stored.push(id);
                }
            }
        }
        stored
    }
}

/// Crop every `(id, source)` pair with `rect`, calling `on_progress` after
/// each item. Progress is strictly increasing and ends at `total / total`.
pub fn apply_to_all(
    items: &[(ImageId, Arc<[u8]>)],
    rect: CropRectangle,
    quality: u8,
    mut on_progress: impl FnMut(BatchProgress),
) -> BatchReport {
    let rect = rect.clamped();
    let total = items.len();
    let mut report = BatchReport {
        outcomes: Vec::with_capacity(total),
    };

    log::info!("🔁 Applying crop to {} images", total);

    for (index, (id, source)) in items.iter().enumerate() {
        let outcome = match crop(source, &rect, quality) {
            Ok(result) => BatchOutcome::Cropped(*id, result),
            Err(e) => {
                log::warn!("⚠️  Skipping image {}: {}", id, e);
                BatchOutcome::Failed(*id, e.to_string())
            }
        };
        let failed = matches!(outcome, BatchOutcome::Failed(..));
        report.outcomes.push(outcome);

        on_progress(BatchProgress {
            completed: index + 1,
            total,
            id: *id,
            failed,
        });
    }

    log::info!(
        "✅ Batch done: {} cropped, {} failed",
        report.succeeded(),
        total - report.succeeded()
    );
    report
}
