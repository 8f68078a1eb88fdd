//! Vision-service descriptions for figure and picture blocks.

use crate::block::{BlockId, BlockKind, BlockType};
use crate::builders::{crop_page_region, Builder};
use crate::document::Document;
use crate::error::{BlockError, PipelineError};
use crate::geometry::PolygonBox;
use crate::prompts::FIGURE_DESCRIPTION_PROMPT;
use crate::provider::PageProvider;
use crate::service::{ImageData, VisionService};
use serde_json::Value;
use tracing::{debug, warn};

const DESCRIBED_TYPES: [BlockType; 2] = [BlockType::Figure, BlockType::Picture];

/// Crops each figure out of the high-res raster, asks the vision service for
/// a description, and stores both the plain text and an HTML rendering on the
/// block. Blocks the service cannot describe keep `None` and render as their
/// raster crop downstream.
pub struct FigureDescriptionBuilder<'a> {
    service: &'a VisionService,
}

impl<'a> FigureDescriptionBuilder<'a> {
    pub fn new(service: &'a VisionService) -> Self {
        Self { service }
    }
}

/// Prefer a markdown/HTML field from the response; otherwise wrap the plain
/// description in a paragraph.
fn description_fields(value: &Value) -> Option<(String, String)> {
    let obj = value.as_object();
    let description = match value {
        Value::String(s) => s.trim().to_string(),
        _ => obj?
            .get("description")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())?,
    };
    if description.is_empty() {
        return None;
    }
    let markdown = obj
        .and_then(|o| o.get("description_markdown"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("<p>{description}</p>"));
    Some((description, markdown))
}

impl Builder for FigureDescriptionBuilder<'_> {
    fn name(&self) -> &'static str {
        "figure-description"
    }

    fn build(
        &self,
        document: &mut Document,
        _provider: &dyn PageProvider,
    ) -> Result<Vec<BlockError>, PipelineError> {
        let per_page: Vec<(usize, Vec<(BlockId, PolygonBox)>)> = document
            .pages
            .iter()
            .map(|page| {
                let figures = document
                    .page_contained_blocks(page.page_id, Some(&DESCRIBED_TYPES))
                    .iter()
                    .map(|b| (b.id, b.polygon.clone()))
                    .collect();
                (page.page_id, figures)
            })
            .collect();

        let mut errors = Vec::new();

        for (page_id, figures) in per_page {
            let page = match document.page_mut(page_id) {
                Some(p) => p,
                None => continue,
            };

            for (block_id, polygon) in figures {
                let crop = crop_page_region(page, &polygon, true);
                let image = match ImageData::from_image(&crop) {
                    Ok(img) => img,
                    Err(e) => {
                        warn!("failed to encode crop for figure {block_id}: {e}");
                        errors.push(BlockError::RecognitionFailed {
                            id: block_id,
                            detail: e.to_string(),
                        });
                        continue;
                    }
                };

                let block = page.get_block_mut(block_id)?;
                let results = self
                    .service
                    .generate(FIGURE_DESCRIPTION_PROMPT, &[image], block);

                let Some((description, markdown)) =
                    results.first().and_then(description_fields)
                else {
                    debug!("figure {block_id}: no usable description");
                    if results.is_empty() {
                        errors.push(BlockError::ServiceFailed {
                            id: block_id,
                            retries: self.service.policy().max_retries,
                            detail: "all attempts failed".to_string(),
                        });
                    }
                    continue;
                };

                match &mut block.kind {
                    BlockKind::Figure {
                        description: d,
                        description_markdown: m,
                    }
                    | BlockKind::Picture {
                        description: d,
                        description_markdown: m,
                    } => {
                        *d = Some(description);
                        *m = Some(markdown);
                    }
                    _ => {}
                }
            }
        }

        Ok(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Block;
    use crate::document::Page;
    use crate::provider::InMemoryProvider;
    use crate::service::{BackendResponse, RetryPolicy, ServiceError, VisionBackend};
    use image::DynamicImage;
    use std::time::Duration;

    struct FixedBackend(Result<BackendResponse, ServiceError>);

    impl VisionBackend for FixedBackend {
        fn send(
            &self,
            _: &str,
            _: Option<&ImageData>,
        ) -> Result<BackendResponse, ServiceError> {
            self.0.clone()
        }
    }

    fn service_with(content: &str) -> VisionService {
        VisionService::new(
            Box::new(FixedBackend(Ok(BackendResponse {
                content: content.into(),
                total_tokens: 10,
            }))),
            RetryPolicy {
                max_retries: 1,
                retry_wait: Duration::from_millis(1),
            },
        )
    }

    fn document_with_figure() -> (Document, BlockId) {
        let mut page = Page::new(
            0,
            PolygonBox::from_bbox(0.0, 0.0, 612.0, 792.0),
            DynamicImage::new_rgb8(816, 1056),
            DynamicImage::new_rgb8(1632, 2112),
            Vec::new(),
        );
        let fig_id = page.add_full_block(Block::new(
            0,
            PolygonBox::from_bbox(50.0, 50.0, 400.0, 300.0),
            BlockKind::Figure {
                description: None,
                description_markdown: None,
            },
        ));
        page.structure = vec![fig_id];
        (Document::new("t", vec![page]), fig_id)
    }

    #[test]
    fn stores_description_with_paragraph_fallback() {
        let (mut doc, fig_id) = document_with_figure();
        let provider = InMemoryProvider::letter_pages(1);
        let service = service_with("{\"description\": \"Sales by quarter\"}");

        let errors = FigureDescriptionBuilder::new(&service)
            .build(&mut doc, &provider)
            .unwrap();
        assert!(errors.is_empty());

        let block = doc.get_block(fig_id).unwrap();
        match &block.kind {
            BlockKind::Figure {
                description,
                description_markdown,
            } => {
                assert_eq!(description.as_deref(), Some("Sales by quarter"));
                assert_eq!(
                    description_markdown.as_deref(),
                    Some("<p>Sales by quarter</p>")
                );
            }
            other => panic!("unexpected kind: {other:?}"),
        }
        assert_eq!(block.metadata.llm_request_count, 1);
    }

    #[test]
    fn richer_markdown_field_is_preferred() {
        let (mut doc, fig_id) = document_with_figure();
        let provider = InMemoryProvider::letter_pages(1);
        let service = service_with(
            "{\"description\": \"A bar chart\", \"description_markdown\": \"<ul><li>Q1: 4</li></ul>\"}",
        );

        FigureDescriptionBuilder::new(&service)
            .build(&mut doc, &provider)
            .unwrap();

        let block = doc.get_block(fig_id).unwrap();
        match &block.kind {
            BlockKind::Figure {
                description_markdown,
                ..
            } => assert_eq!(
                description_markdown.as_deref(),
                Some("<ul><li>Q1: 4</li></ul>")
            ),
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn empty_description_leaves_block_unset() {
        let (mut doc, fig_id) = document_with_figure();
        let provider = InMemoryProvider::letter_pages(1);
        let service = service_with("{\"description\": \"  \"}");

        let errors = FigureDescriptionBuilder::new(&service)
            .build(&mut doc, &provider)
            .unwrap();
        assert!(errors.is_empty());

        let block = doc.get_block(fig_id).unwrap();
        match &block.kind {
            BlockKind::Figure { description, .. } => assert!(description.is_none()),
            other => panic!("unexpected kind: {other:?}"),
        }
    }
}
