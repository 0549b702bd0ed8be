//! Error type shared by the crop/compose pipeline and the preset store
//!
//! None of these are fatal: the image collection and the edit session stay
//! valid after any of them, the caller just reports the failure.
use thiserror::Error;

use crate::state::presets::PresetId;

#[derive(Debug, Error)]
pub enum Error {
    /// A source or intermediate raster could not be decoded
    #[error("could not decode image: {reason}")]
    Decode { reason: String },

    /// Compose was asked to stack zero cropped images
    #[error("nothing to compose: crop at least one image first")]
    NothingToCompose,

    /// The composed raster would not fit in memory
    #[error("composed image would be {width}x{height} pixels, too large to render")]
    CanvasTooLarge { width: u32, height: u64 },

    /// Re-encoding a raster failed
    #[error("could not encode image: {0}")]
    Encode(#[from] image::ImageError),

    #[error("preset store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("invalid stored JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking worker panicked or was cancelled
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("no preset with id {0}")]
    PresetNotFound(PresetId),
}

impl Error {
    pub fn decode(reason: impl std::fmt::Display) -> Self {
        Error::Decode {
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
