use std::fmt;
use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};

use crate::duplicates::ReviewError;

/// Remote file identifier, the SHA-256 hex digest Hydrus uses for every file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileHash(String);

/// Where an image record came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOrigin {
    /// Backed by a file on the remote service.
    Remote(FileHash),
    /// Generated locally, for example the difference visualization.
    /// Never part of a remote write.
    Synthetic,
}

/// One decoded image and the bytes it was decoded from.
///
/// Dimensions are captured once from the decoded pixels.
#[derive(Debug, Clone)]
pub struct ImageRecord {
    origin: ImageOrigin,
    bytes: Vec<u8>,
    width: u32,
    height: u32,
    pixels: RgbImage,
}

/// Images the remote service considers potential duplicates of each other,
/// produced by a single fetch round.
#[derive(Debug, Clone, Default)]
pub struct CandidateGroup {
    images: Vec<ImageRecord>,
}

impl FileHash {
    /// Create a file hash, returning `None` for an empty or blank identifier.
    #[must_use]
    pub fn new(hash: impl Into<String>) -> Option<Self> {
        let hash = hash.into().trim().to_lowercase();
        if hash.is_empty() { None } else { Some(Self(hash)) }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ImageRecord {
    /// Decode remote file bytes into an image record.
    ///
    /// # Errors
    /// Returns `ReviewError::Decode` if the bytes are not a supported image.
    pub fn decode(hash: FileHash, bytes: Vec<u8>) -> Result<Self, ReviewError> {
        let pixels = image::load_from_memory(&bytes)
            .map_err(|error| ReviewError::Decode {
                hash: hash.to_string(),
                message: error.to_string(),
            })?
            .to_rgb8();

        Ok(Self::from_pixels(ImageOrigin::Remote(hash), bytes, pixels))
    }

    /// Package a single-channel map as a synthetic record with PNG-encoded bytes.
    ///
    /// # Errors
    /// Returns `ReviewError::Encode` if PNG encoding fails.
    pub fn synthetic(map: GrayImage) -> Result<Self, ReviewError> {
        let image = DynamicImage::ImageLuma8(map);
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|error| ReviewError::Encode(error.to_string()))?;

        Ok(Self::from_pixels(ImageOrigin::Synthetic, bytes, image.to_rgb8()))
    }

    /// Build a record from already decoded pixels.
    #[must_use]
    pub fn from_pixels(origin: ImageOrigin, bytes: Vec<u8>, pixels: RgbImage) -> Self {
        let (width, height) = pixels.dimensions();
        Self {
            origin,
            bytes,
            width,
            height,
            pixels,
        }
    }

    #[must_use]
    pub const fn origin(&self) -> &ImageOrigin {
        &self.origin
    }

    /// Remote identifier, or `None` for synthetic records.
    #[must_use]
    pub const fn remote_id(&self) -> Option<&FileHash> {
        match &self.origin {
            ImageOrigin::Remote(hash) => Some(hash),
            ImageOrigin::Synthetic => None,
        }
    }

    #[must_use]
    pub const fn is_synthetic(&self) -> bool {
        matches!(self.origin, ImageOrigin::Synthetic)
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub const fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    /// Width divided by height, zero for degenerate images.
    #[must_use]
    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            0.0
        } else {
            f64::from(self.width) / f64::from(self.height)
        }
    }
}

impl CandidateGroup {
    #[must_use]
    pub const fn new(images: Vec<ImageRecord>) -> Self {
        Self { images }
    }

    #[must_use]
    pub fn images(&self) -> &[ImageRecord] {
        &self.images
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.images.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&ImageRecord> {
        self.images.get(index)
    }

    /// Sort images by file size, largest first.
    /// Equal sizes keep their fetch order.
    pub fn sort_by_size(&mut self) {
        self.images.sort_by_key(|image| std::cmp::Reverse(image.size()));
    }

    /// Remote identifiers of every non-synthetic image, in display order.
    #[must_use]
    pub fn remote_ids(&self) -> Vec<FileHash> {
        self.images.iter().filter_map(ImageRecord::remote_id).cloned().collect()
    }

    /// Append a locally generated image to the end of the group.
    pub fn push_synthetic(&mut self, record: ImageRecord) {
        debug_assert!(record.is_synthetic(), "only synthetic records can be appended");
        self.images.push(record);
    }

    /// Combined byte size of all images.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.images.iter().map(ImageRecord::size).sum()
    }
}

#[cfg(test)]
mod record_tests {
    use super::*;

    use image::{Luma, Rgb};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([10, 20, 30])));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("should encode png");
        bytes
    }

    fn remote(hash: &str, size: usize) -> ImageRecord {
        ImageRecord::from_pixels(
            ImageOrigin::Remote(FileHash::new(hash).expect("valid hash")),
            vec![0; size],
            RgbImage::new(1, 1),
        )
    }

    #[test]
    fn file_hash_rejects_empty() {
        assert!(FileHash::new("").is_none());
        assert!(FileHash::new("   ").is_none());
    }

    #[test]
    fn file_hash_normalizes_case() {
        let hash = FileHash::new(" ABCdef ").expect("valid hash");
        assert_eq!(hash.as_str(), "abcdef");
    }

    #[test]
    fn decode_captures_dimensions() {
        let hash = FileHash::new("aa").expect("valid hash");
        let record = ImageRecord::decode(hash.clone(), png_bytes(7, 3)).expect("should decode");
        assert_eq!(record.width(), 7);
        assert_eq!(record.height(), 3);
        assert_eq!(record.remote_id(), Some(&hash));
        assert!(!record.is_synthetic());
    }

    #[test]
    fn decode_rejects_garbage() {
        let hash = FileHash::new("bb").expect("valid hash");
        let result = ImageRecord::decode(hash, b"definitely not an image".to_vec());
        assert!(matches!(result, Err(ReviewError::Decode { ref hash, .. }) if hash == "bb"));
    }

    #[test]
    fn synthetic_has_no_remote_id() {
        let record = ImageRecord::synthetic(GrayImage::from_pixel(4, 2, Luma([255]))).expect("should encode");
        assert!(record.is_synthetic());
        assert!(record.remote_id().is_none());
        assert_eq!((record.width(), record.height()), (4, 2));
        assert!(record.size() > 0);
        assert_eq!(record.pixels().get_pixel(0, 0), &Rgb([255, 255, 255]));
    }

    #[test]
    fn sort_by_size_is_descending_and_stable() {
        let mut group = CandidateGroup::new(vec![remote("a", 10), remote("b", 30), remote("c", 10), remote("d", 20)]);
        group.sort_by_size();
        let order: Vec<_> = group.remote_ids().iter().map(ToString::to_string).collect();
        assert_eq!(order, vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn remote_ids_skip_synthetic_records() {
        let mut group = CandidateGroup::new(vec![remote("a", 1), remote("b", 1)]);
        group.push_synthetic(ImageRecord::synthetic(GrayImage::new(1, 1)).expect("should encode"));
        assert_eq!(group.len(), 3);
        assert_eq!(group.remote_ids().len(), 2);
    }

    #[test]
    fn aspect_ratio_of_landscape_image() {
        let record = ImageRecord::from_pixels(ImageOrigin::Synthetic, Vec::new(), RgbImage::new(100, 50));
        crate::assert_f64_eq(record.aspect_ratio(), 2.0);
    }
}
