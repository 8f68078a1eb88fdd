//! External collaborator seams: the page provider and the recognition model.
//!
//! The core never opens source files or runs layout/OCR networks itself. It
//! consumes two narrow traits:
//!
//! * [`PageProvider`] — supplies page rasters at a requested DPI, page
//!   bounding boxes, and source cross-reference metadata. A provider failure
//!   is structural and fatal for the document.
//! * [`RecognitionModel`] — turns a page raster into layout regions, text
//!   lines, and recognised line text. A model failure on one region is a
//!   per-block failure: logged, skipped, never fatal.
//!
//! [`InMemoryProvider`] is a ready-made provider over pre-rendered bounding
//! boxes, used by the test suite and by callers that already hold rasters.

use crate::block::BlockType;
use crate::document::PageRef;
use crate::error::PipelineError;
use crate::geometry::PolygonBox;
use image::DynamicImage;
use thiserror::Error;

/// Failure inside the recognition model, scoped to the call that failed.
#[derive(Debug, Clone, Error)]
#[error("recognition model error: {0}")]
pub struct ModelError(pub String);

/// Supplies raster images and page-level metadata for a paginated source.
pub trait PageProvider {
    /// Total number of pages in the source.
    fn page_count(&self) -> usize;

    /// Render the given pages at `dpi`, in `page_range` order.
    ///
    /// Must return exactly one image per requested page; anything else is a
    /// structural failure the pipeline propagates.
    fn get_images(
        &self,
        page_range: &[usize],
        dpi: u32,
    ) -> Result<Vec<DynamicImage>, PipelineError>;

    /// Page bounding polygon in page-space points.
    fn get_page_bbox(&self, page_id: usize) -> Result<PolygonBox, PipelineError>;

    /// Source cross-reference metadata for intra-document links.
    fn get_page_refs(&self, page_id: usize) -> Vec<PageRef>;
}

/// A layout region detected on a page raster.
///
/// The polygon is in the coordinates of the image handed to the model; the
/// layout builder rescales it into page space.
#[derive(Debug, Clone)]
pub struct LayoutRegion {
    pub polygon: PolygonBox,
    pub label: BlockType,
}

/// A text line detected on a page raster, in image coordinates.
#[derive(Debug, Clone)]
pub struct DetectedLine {
    pub polygon: PolygonBox,
}

/// Layout, line-detection, and text-recognition capabilities of the vision
/// model backing the structural builders.
pub trait RecognitionModel {
    /// Detect typed layout regions on a low-res page raster.
    fn detect_layout(&self, image: &DynamicImage) -> Result<Vec<LayoutRegion>, ModelError>;

    /// Detect text lines on a low-res page raster.
    fn detect_lines(&self, image: &DynamicImage) -> Result<Vec<DetectedLine>, ModelError>;

    /// Recognise the text of each polygon region on a high-res page raster.
    ///
    /// Returns one string per input polygon, in input order.
    fn recognize_lines(
        &self,
        image: &DynamicImage,
        polygons: &[PolygonBox],
    ) -> Result<Vec<String>, ModelError>;
}

// ── In-memory provider ───────────────────────────────────────────────────

/// A provider over pages whose geometry is known up front.
///
/// Rasters are synthesised blank at the exact pixel size the requested DPI
/// implies (`points × dpi / 72`), so geometry rescaling behaves as it would
/// with a real renderer.
pub struct InMemoryProvider {
    pages: Vec<(PolygonBox, Vec<PageRef>)>,
}

impl InMemoryProvider {
    pub fn new(pages: Vec<(PolygonBox, Vec<PageRef>)>) -> Self {
        Self { pages }
    }

    /// `count` pages of US-letter geometry with no refs.
    pub fn letter_pages(count: usize) -> Self {
        Self::new(
            (0..count)
                .map(|_| (PolygonBox::from_bbox(0.0, 0.0, 612.0, 792.0), Vec::new()))
                .collect(),
        )
    }
}

impl PageProvider for InMemoryProvider {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn get_images(
        &self,
        page_range: &[usize],
        dpi: u32,
    ) -> Result<Vec<DynamicImage>, PipelineError> {
        let mut images = Vec::with_capacity(page_range.len());
        for &page_id in page_range {
            let (bbox, _) =
                self.pages
                    .get(page_id)
                    .ok_or(PipelineError::PageOutOfRange {
                        page: page_id,
                        total: self.pages.len(),
                    })?;
            let scale = dpi as f64 / 72.0;
            let width = (bbox.width() * scale).round().max(1.0) as u32;
            let height = (bbox.height() * scale).round().max(1.0) as u32;
            images.push(DynamicImage::new_rgb8(width, height));
        }
        Ok(images)
    }

    fn get_page_bbox(&self, page_id: usize) -> Result<PolygonBox, PipelineError> {
        self.pages
            .get(page_id)
            .map(|(bbox, _)| bbox.clone())
            .ok_or(PipelineError::ProviderBboxMissing { page_id })
    }

    fn get_page_refs(&self, page_id: usize) -> Vec<PageRef> {
        self.pages
            .get(page_id)
            .map(|(_, refs)| refs.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_provider_scales_images_by_dpi() {
        let provider = InMemoryProvider::letter_pages(2);
        let images = provider.get_images(&[0, 1], 96).unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].width(), 816); // 612 * 96 / 72
        assert_eq!(images[0].height(), 1056); // 792 * 96 / 72
    }

    #[test]
    fn in_memory_provider_rejects_out_of_range() {
        let provider = InMemoryProvider::letter_pages(1);
        assert!(provider.get_images(&[3], 96).is_err());
        assert!(provider.get_page_bbox(3).is_err());
    }
}
