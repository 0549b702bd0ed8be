use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::WalkDir;

use super::data::{CropResult, ImageId, ImageRecord};

/// File extensions offered by the pickers and accepted from folders/drops
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp", "gif", "tif", "tiff"];

/// The ordered set of imported images.
///
/// Order is import order and is the order the compositor stacks crops in.
/// IDs come from a monotonic counter that survives deletes, so an ID is never
/// handed out twice during the collection's lifetime.
#[derive(Debug, Default)]
pub struct ImageCollection {
    images: Vec<ImageRecord>,
    next_id: u64,
}

impl ImageCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new image and return its ID
    pub fn import(&mut self, source: impl Into<Arc<[u8]>>, label: Option<String>) -> ImageId {
        let id = ImageId(self.next_id);
        self.next_id += 1;

        let mut record = ImageRecord::new(id, source);
        record.label = label;
        self.images.push(record);
        id
    }

    /// Delete an image. Returns the removed record, or `None` for an unknown ID.
    pub fn remove(&mut self, id: ImageId) -> Option<ImageRecord> {
        let index = self.images.iter().position(|img| img.id == id)?;
        Some(self.images.remove(index))
    }

    pub fn get(&self, id: ImageId) -> Option<&ImageRecord> {
        self.images.iter().find(|img| img.id == id)
    }

    pub fn get_mut(&mut self, id: ImageId) -> Option<&mut ImageRecord> {
        self.images.iter_mut().find(|img| img.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageRecord> {
        self.images.iter()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Records that have a crop, in collection order (the compose list)
    pub fn cropped(&self) -> impl Iterator<Item = &ImageRecord> {
        self.images.iter().filter(|img| img.is_cropped())
    }

    pub fn cropped_count(&self) -> usize {
        self.cropped().count()
    }

    /// Store a single-image crop together with the comment typed in the editor.
    /// Returns `false` if the image was deleted in the meantime.
    pub fn apply_crop(&mut self, id: ImageId, result: CropResult, comment: String) -> bool {
        match self.get_mut(id) {
            Some(record) => {
                record.crop_result = Some(result);
                record.comment = comment;
                true
            }
            None => false,
        }
    }

    /// Store a batch crop result. The existing comment is kept.
    /// Returns `false` if the image was deleted in the meantime.
    pub fn store_batch_result(&mut self, id: ImageId, result: CropResult) -> bool {
        match self.get_mut(id) {
            Some(record) => {
                record.crop_result = Some(result);
                true
            }
            None => false,
        }
    }
}

/// One file read from disk, ready to be imported
#[derive(Debug, Clone)]
pub struct ImportedFile {
    pub label: String,
    pub bytes: Arc<[u8]>,
}

/// Result of reading a set of files for import
#[derive(Debug, Clone, Default)]
pub struct ImportResult {
    pub files: Vec<ImportedFile>,
    pub skipped_count: usize,
}

/// True if the path has one of the supported image extensions
pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Recursively list image files under `folder`, sorted by path
pub fn scan_folder(folder: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = WalkDir::new(folder)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|entry| entry.into_path())
        .filter(|path| path.is_file() && has_image_extension(path))
        .collect();

    paths.sort();
    paths
}

/// Read files for import.
///
/// Files that cannot be read, or whose header does not identify a raster
/// with known dimensions, are skipped and counted.
pub fn read_files(paths: &[PathBuf]) -> ImportResult {
    let mut result = ImportResult::default();

    for path in paths {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("⚠️  Could not read {}: {}", path.display(), e);
                result.skipped_count += 1;
                continue;
            }
        };

        if let Err(e) = probe_dimensions(&bytes) {
            log::warn!("⚠️  Skipping {}: {}", path.display(), e);
            result.skipped_count += 1;
            continue;
        }

        let label = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        result.files.push(ImportedFile {
            label,
            bytes: bytes.into(),
        });
    }

    log::info!(
        "📥 Read {} images, skipped {}",
        result.files.len(),
        result.skipped_count
    );
    result
}

/// Read only the header to get pixel dimensions
pub fn probe_dimensions(bytes: &[u8]) -> crate::error::Result<(u32, u32)> {
    image::ImageReader::new(std::io::Cursor::new(bytes))
        .with_guessed_format()
        .map_err(crate::error::Error::decode)?
        .into_dimensions()
        .map_err(crate::error::Error::decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::edit::CropRectangle;

    fn result(area: CropRectangle) -> CropResult {
        CropResult {
            jpeg: vec![0xFF, 0xD8],
            width: 10,
            height: 3,
            area,
        }
    }

    #[test]
    fn test_import_keeps_order() {
        let mut images = ImageCollection::new();
        let a = images.import(vec![1u8], Some("a.png".into()));
        let b = images.import(vec![2u8], None);

        let ids: Vec<ImageId> = images.iter().map(|img| img.id).collect();
        assert_eq!(ids, vec![a, b]);
        assert_eq!(images.get(a).unwrap().label.as_deref(), Some("a.png"));
        assert!(!images.get(b).unwrap().is_cropped());
        assert_eq!(images.get(b).unwrap().comment, "");
    }

    #[test]
    fn test_ids_never_reused_after_delete() {
        let mut images = ImageCollection::new();
        let a = images.import(vec![1u8], None);
        let b = images.import(vec![2u8], None);

        assert!(images.remove(b).is_some());
        assert!(images.remove(b).is_none());
        let c = images.import(vec![3u8], None);

        assert_ne!(c, b);
        assert_ne!(c, a);
        assert!(c > b);
        assert!(images.get(b).is_none());
        assert_eq!(images.len(), 2);
    }

    #[test]
    fn test_delete_removes_from_compose_list() {
        let mut images = ImageCollection::new();
        let a = images.import(vec![1u8], None);
        let b = images.import(vec![2u8], None);
        images.apply_crop(a, result(CropRectangle::default()), "one".into());
        images.apply_crop(b, result(CropRectangle::default()), String::new());
        assert_eq!(images.cropped_count(), 2);

        images.remove(a);

        let cropped: Vec<ImageId> = images.cropped().map(|img| img.id).collect();
        assert_eq!(cropped, vec![b]);
        assert_eq!(images.iter().next().map(|img| img.id), Some(b));
    }

    #[test]
    fn test_batch_result_preserves_comment() {
        let mut images = ImageCollection::new();
        let a = images.import(vec![1u8], None);
        images.get_mut(a).unwrap().comment = "keep me".into();

        assert!(images.store_batch_result(a, result(CropRectangle::full())));

        let record = images.get(a).unwrap();
        assert!(record.is_cropped());
        assert_eq!(record.comment, "keep me");
    }

    #[test]
    fn test_writes_to_deleted_image_are_dropped() {
        let mut images = ImageCollection::new();
        let a = images.import(vec![1u8], None);
        images.remove(a);

        assert!(!images.apply_crop(a, result(CropRectangle::default()), "x".into()));
        assert!(!images.store_batch_result(a, result(CropRectangle::default())));
        assert!(images.is_empty());
    }

    #[test]
    fn test_extension_filter() {
        assert!(has_image_extension(Path::new("shot.PNG")));
        assert!(has_image_extension(Path::new("dir/frame.jpeg")));
        assert!(!has_image_extension(Path::new("notes.txt")));
        assert!(!has_image_extension(Path::new("no_extension")));
    }

    #[test]
    fn test_read_files_skips_non_images() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        let bad = dir.path().join("bad.png");
        image::RgbaImage::new(4, 2).save(&good).unwrap();
        std::fs::write(&bad, b"not an image").unwrap();

        let found = scan_folder(dir.path());
        assert_eq!(found, vec![bad.clone(), good.clone()]);

        let result = read_files(&found);
        assert_eq!(result.skipped_count, 1);
        assert_eq!(result.files.len(), 1);
        assert_eq!(result.files[0].label, "good.png");
        assert_eq!(probe_dimensions(&result.files[0].bytes).unwrap(), (4, 2));
    }
}
