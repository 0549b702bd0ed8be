//! Shared data structures for the application state
//!
//! These structs represent the data model that flows between the image
//! collection, the crop/compose pipeline and the UI layer.

use std::fmt;
use std::sync::Arc;

use super::edit::CropRectangle;

/// Identifier of an imported image.
///
/// Handed out by the collection in increasing order and never reused, so a
/// stale id held by the UI can only miss, never hit a different image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImageId(pub u64);

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Output of cropping one image
#[derive(Debug, Clone, PartialEq)]
pub struct CropResult {
    /// Re-encoded JPEG bytes of the cropped region
    pub jpeg: Vec<u8>,
    /// Pixel width of the cropped raster
    pub width: u32,
    /// Pixel height of the cropped raster
    pub height: u32,
    /// Rectangle this result was cut with
    pub area: CropRectangle,
}

/// Represents a single imported image through its lifecycle
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    /// Unique collection ID
    pub id: ImageId,
    /// Original encoded bytes as imported (never modified)
    pub source: Arc<[u8]>,
    /// File name or other human label, if the import had one
    pub label: Option<String>,
    /// Latest crop, `None` until the image is cropped
    pub crop_result: Option<CropResult>,
    /// User comment rendered under the crop when composing
    pub comment: String,
}

impl ImageRecord {
    pub fn new(id: ImageId, source: impl Into<Arc<[u8]>>) -> Self {
        Self {
            id,
            source: source.into(),
            label: None,
            crop_result: None,
            comment: String::new(),
        }
    }

    pub fn is_cropped(&self) -> bool {
        self.crop_result.is_some()
    }
}
