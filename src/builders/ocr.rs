//! OCR stage: fill line text, preserving hyperlinks through reconciliation.
//!
//! Two interchangeable builders cover the same slot in the stage order:
//!
//! * [`OcrBuilder`] batches every line polygon of a page into one
//!   recognition-model call.
//! * [`LlmOcrBuilder`] crops each line region out of the high-res raster and
//!   sends it to the vision service, one request per line.
//!
//! Both replace a line's spans via [`crate::reconcile::replace_line_spans`],
//! so hyperlinks known from earlier spans are redistributed onto the new
//! text instead of being lost. A failed call leaves the line in its prior
//! state; the pipeline continues with the remaining lines.

use crate::block::{Block, BlockId, BlockKind, BlockType};
use crate::builders::{crop_page_region, Builder};
use crate::document::Document;
use crate::error::{BlockError, PipelineError};
use crate::geometry::PolygonBox;
use crate::prompts::LINE_OCR_PROMPT;
use crate::provider::{PageProvider, RecognitionModel};
use crate::reconcile::replace_line_spans;
use crate::service::{extract_text, ImageData, VisionService};
use tracing::{debug, warn};

/// `(page_id, [(line_id, page-space polygon)])` for every page.
fn collect_lines(document: &Document) -> Vec<(usize, Vec<(BlockId, PolygonBox)>)> {
    document
        .pages
        .iter()
        .map(|page| {
            let lines = document
                .page_contained_blocks(page.page_id, Some(&[BlockType::Line]))
                .iter()
                .map(|b| (b.id, b.polygon.clone()))
                .collect();
            (page.page_id, lines)
        })
        .collect()
}

/// Build the single replacement span for a line's newly recognised text.
fn replacement_span(page_id: usize, polygon: PolygonBox, text: String) -> Block {
    Block::new(page_id, polygon, BlockKind::plain_span(text))
}

// ── Model-backed OCR ─────────────────────────────────────────────────────

pub struct OcrBuilder<'a> {
    model: &'a dyn RecognitionModel,
}

impl<'a> OcrBuilder<'a> {
    pub fn new(model: &'a dyn RecognitionModel) -> Self {
        Self { model }
    }
}

impl Builder for OcrBuilder<'_> {
    fn name(&self) -> &'static str {
        "ocr"
    }

    fn build(
        &self,
        document: &mut Document,
        _provider: &dyn PageProvider,
    ) -> Result<Vec<BlockError>, PipelineError> {
        let per_page = collect_lines(document);
        let mut errors = Vec::new();

        for (page_id, lines) in per_page {
            if lines.is_empty() {
                continue;
            }
            let page = match document.page_mut(page_id) {
                Some(p) => p,
                None => continue,
            };
            let image_size = (
                page.highres_image.width() as f64,
                page.highres_image.height() as f64,
            );
            let page_size = page.polygon.size();
            let image_polys: Vec<PolygonBox> = lines
                .iter()
                .map(|(_, poly)| {
                    poly.rescale(page_size, image_size)
                        .fit_to_bounds((0.0, 0.0, image_size.0, image_size.1))
                })
                .collect();

            let texts = match self.model.recognize_lines(&page.highres_image, &image_polys) {
                Ok(texts) => texts,
                Err(e) => {
                    warn!("text recognition failed on page {page_id}: {e}");
                    errors.extend(lines.iter().map(|(id, _)| BlockError::RecognitionFailed {
                        id: *id,
                        detail: e.to_string(),
                    }));
                    continue;
                }
            };

            if texts.len() != lines.len() {
                warn!(
                    "page {page_id}: model returned {} texts for {} lines",
                    texts.len(),
                    lines.len()
                );
            }
            let mut texts = texts.into_iter();
            for (line_id, polygon) in lines {
                let Some(text) = texts.next() else {
                    errors.push(BlockError::RecognitionFailed {
                        id: line_id,
                        detail: "model returned no text for this line".to_string(),
                    });
                    continue;
                };
                if text.is_empty() {
                    continue;
                }
                let span = replacement_span(page_id, polygon, text);
                replace_line_spans(page, line_id, vec![span])?;
            }
        }

        Ok(errors)
    }
}

// ── Vision-service OCR ───────────────────────────────────────────────────

pub struct LlmOcrBuilder<'a> {
    service: &'a VisionService,
}

impl<'a> LlmOcrBuilder<'a> {
    pub fn new(service: &'a VisionService) -> Self {
        Self { service }
    }
}

impl Builder for LlmOcrBuilder<'_> {
    fn name(&self) -> &'static str {
        "llm-ocr"
    }

    fn build(
        &self,
        document: &mut Document,
        _provider: &dyn PageProvider,
    ) -> Result<Vec<BlockError>, PipelineError> {
        let per_page = collect_lines(document);
        let mut errors = Vec::new();

        for (page_id, lines) in per_page {
            let page = match document.page_mut(page_id) {
                Some(p) => p,
                None => continue,
            };

            for (line_id, polygon) in lines {
                let crop = crop_page_region(page, &polygon, true);
                let image = match ImageData::from_image(&crop) {
                    Ok(img) => img,
                    Err(e) => {
                        warn!("failed to encode crop for line {line_id}: {e}");
                        errors.push(BlockError::RecognitionFailed {
                            id: line_id,
                            detail: e.to_string(),
                        });
                        continue;
                    }
                };

                let line_block = page.get_block_mut(line_id)?;
                let results = self.service.generate(LINE_OCR_PROMPT, &[image], line_block);

                let Some(text) = results.first().and_then(extract_text) else {
                    // Empty means "nothing to apply": the line keeps its
                    // prior spans.
                    debug!("line {line_id}: no usable OCR output");
                    if results.is_empty() {
                        errors.push(BlockError::ServiceFailed {
                            id: line_id,
                            retries: self.service.policy().max_retries,
                            detail: "all attempts failed".to_string(),
                        });
                    } else {
                        errors.push(BlockError::UnusableResponse {
                            id: line_id,
                            detail: "response carried no text".to_string(),
                        });
                    }
                    continue;
                };

                let span = replacement_span(page_id, polygon, text);
                replace_line_spans(page, line_id, vec![span])?;
            }
        }

        Ok(errors)
    }
}
