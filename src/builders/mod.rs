//! Builder stages: populate the tree from raw page data.
//!
//! Each submodule implements exactly one transformation step. Stages execute
//! strictly in a fixed order, and a later stage may assume every earlier
//! stage's invariants hold (the OCR stage assumes every line already has a
//! polygon).
//!
//! ## Data flow
//!
//! ```text
//! provider ──▶ skeleton ──▶ layout ──▶ line ──▶ ocr ──▶ extras ──▶ structure
//!  (images)    (pages)     (regions)  (lines)  (spans)  (descriptions) (groups)
//! ```
//!
//! ## Failure policy
//!
//! A builder failing on one block logs, records a [`BlockError`], and
//! continues with the remaining blocks. Only structural failures — the
//! provider cannot produce an image or bounding box — abort the document.

pub mod description;
pub mod layout;
pub mod line;
pub mod ocr;
pub mod structure;

use crate::config::PipelineConfig;
use crate::document::{Document, Page};
use crate::error::{BlockError, PipelineError};
use crate::geometry::PolygonBox;
use crate::provider::PageProvider;
use image::DynamicImage;
use tracing::{debug, info};

/// A pure-effect pipeline stage: `(document, provider) -> document`.
///
/// Stages that need no raw page access simply ignore the provider. Non-fatal
/// per-block failures are returned for the caller's stats; fatal failures
/// propagate as `Err`.
pub trait Builder {
    fn name(&self) -> &'static str;

    fn build(
        &self,
        document: &mut Document,
        provider: &dyn PageProvider,
    ) -> Result<Vec<BlockError>, PipelineError>;
}

/// Assembles the document skeleton and drives the builder sequence.
///
/// Pages are created exactly once, here, from the provider's page count,
/// bounding boxes, and two rasters per page at the configured DPIs. Every
/// later stage mutates that skeleton in place.
pub struct DocumentBuilder {
    config: PipelineConfig,
}

impl DocumentBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Build the initial `Document` skeleton from the provider.
    pub fn build_document(
        &self,
        name: &str,
        provider: &dyn PageProvider,
    ) -> Result<Document, PipelineError> {
        let page_range: Vec<usize> = (0..provider.page_count()).collect();

        let lowres = provider.get_images(&page_range, self.config.lowres_dpi)?;
        let highres = provider.get_images(&page_range, self.config.highres_dpi)?;
        check_image_count(&page_range, &lowres, self.config.lowres_dpi)?;
        check_image_count(&page_range, &highres, self.config.highres_dpi)?;

        let mut pages = Vec::with_capacity(page_range.len());
        for ((page_id, low), high) in page_range.iter().copied().zip(lowres).zip(highres) {
            let bbox = provider.get_page_bbox(page_id)?;
            let refs = provider.get_page_refs(page_id);
            pages.push(Page::new(page_id, bbox, low, high, refs));
        }

        info!("document skeleton built: {} pages", pages.len());
        Ok(Document::new(name, pages))
    }

    /// Run the configured stage sequence over a fresh skeleton.
    ///
    /// `ocr` is optional so the `disable_ocr` knob can drop the stage without
    /// disturbing the rest of the order. Extra builders run last, before the
    /// structure pass the converter appends.
    pub fn run(
        &self,
        name: &str,
        provider: &dyn PageProvider,
        layout: &dyn Builder,
        line: &dyn Builder,
        ocr: Option<&dyn Builder>,
        extra_builders: &[&dyn Builder],
    ) -> Result<(Document, Vec<BlockError>), PipelineError> {
        let mut document = self.build_document(name, provider)?;
        let mut errors = Vec::new();

        let mut stages: Vec<&dyn Builder> = vec![layout, line];
        if let Some(ocr) = ocr {
            stages.push(ocr);
        }
        stages.extend_from_slice(extra_builders);

        for stage in stages {
            debug!("running builder stage: {}", stage.name());
            let stage_errors = stage.build(&mut document, provider)?;
            for e in &stage_errors {
                debug!("{}: non-fatal: {e}", stage.name());
            }
            errors.extend(stage_errors);
        }

        Ok((document, errors))
    }
}

fn check_image_count(
    page_range: &[usize],
    images: &[DynamicImage],
    dpi: u32,
) -> Result<(), PipelineError> {
    if images.len() != page_range.len() {
        return Err(PipelineError::ProviderImageCountMismatch {
            expected: page_range.len(),
            got: images.len(),
            dpi,
        });
    }
    Ok(())
}

/// Crop the region of `polygon` (page coordinates) out of one of the page's
/// rasters, clamped to the image bounds.
///
/// Empty (sub-pixel) regions still produce a 1×1 crop so downstream encoders
/// never see a zero-sized image.
pub(crate) fn crop_page_region(
    page: &Page,
    polygon: &PolygonBox,
    highres: bool,
) -> DynamicImage {
    let image = page.image(highres);
    let image_size = (image.width() as f64, image.height() as f64);
    let scaled = polygon
        .rescale(page.polygon.size(), image_size)
        .fit_to_bounds((0.0, 0.0, image_size.0, image_size.1));

    let (x0, y0, x1, y1) = scaled.bbox();
    let x = x0.floor().max(0.0) as u32;
    let y = y0.floor().max(0.0) as u32;
    let w = ((x1.ceil() - x0.floor()) as u32).clamp(1, image.width().saturating_sub(x).max(1));
    let h = ((y1.ceil() - y0.floor()) as u32).clamp(1, image.height().saturating_sub(y).max(1));
    image.crop_imm(x, y, w, h)
}
