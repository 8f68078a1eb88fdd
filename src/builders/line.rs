//! Line stage: detect text lines and attach each to its owning block.
//!
//! Lines are detected on the low-res raster, rescaled into page space, and
//! assigned to the layout block that covers the largest fraction of the
//! line's area (at or above the configured threshold). A line no block
//! claims still carries text the document must not lose, so it is wrapped in
//! a fresh Text block linked at page level.

use crate::block::{Block, BlockType};
use crate::builders::Builder;
use crate::config::PipelineConfig;
use crate::document::Document;
use crate::error::{BlockError, PipelineError};
use crate::geometry::PolygonBox;
use crate::provider::{PageProvider, RecognitionModel};
use crate::registry::BlockRegistry;
use tracing::{debug, warn};

pub struct LineBuilder<'a> {
    model: &'a dyn RecognitionModel,
    registry: &'a BlockRegistry,
    config: &'a PipelineConfig,
}

impl<'a> LineBuilder<'a> {
    pub fn new(
        model: &'a dyn RecognitionModel,
        registry: &'a BlockRegistry,
        config: &'a PipelineConfig,
    ) -> Self {
        Self {
            model,
            registry,
            config,
        }
    }
}

/// Block types that own text lines. Figures, pictures, and tables get their
/// content through dedicated stages instead.
fn owns_lines(block_type: BlockType) -> bool {
    matches!(
        block_type,
        BlockType::Text
            | BlockType::SectionHeader
            | BlockType::Code
            | BlockType::Equation
            | BlockType::ListItem
            | BlockType::Caption
            | BlockType::Footnote
            | BlockType::Reference
            | BlockType::PageHeader
            | BlockType::PageFooter
            | BlockType::TableOfContents
    )
}

impl Builder for LineBuilder<'_> {
    fn name(&self) -> &'static str {
        "line"
    }

    fn build(
        &self,
        document: &mut Document,
        _provider: &dyn PageProvider,
    ) -> Result<Vec<BlockError>, PipelineError> {
        for page in document.pages.iter_mut() {
            let detected = match self.model.detect_lines(&page.lowres_image) {
                Ok(lines) => lines,
                Err(e) => {
                    warn!("line detection failed on page {}: {e}", page.page_id);
                    continue;
                }
            };

            let image_size = (
                page.lowres_image.width() as f64,
                page.lowres_image.height() as f64,
            );
            let page_size = page.polygon.size();

            // Candidate owners, captured before we start inserting.
            let candidates: Vec<(crate::block::BlockId, PolygonBox)> = page
                .structure
                .iter()
                .filter_map(|&id| page.get_block(id).ok())
                .filter(|b| owns_lines(b.block_type()))
                .map(|b| (b.id, b.polygon.clone()))
                .collect();

            let mut assigned = 0usize;
            for line in detected {
                let polygon = line
                    .polygon
                    .rescale(image_size, page_size)
                    .fit_to_bounds(page.polygon.bbox());

                let owner = candidates
                    .iter()
                    .map(|(id, poly)| (*id, polygon.intersection_fraction(poly)))
                    .max_by(|a, b| a.1.total_cmp(&b.1))
                    .filter(|(_, overlap)| *overlap >= self.config.line_overlap_threshold)
                    .map(|(id, _)| id);

                let line_kind = self.registry.construct(BlockType::Line);
                let line_id =
                    page.add_full_block(Block::new(page.page_id, polygon.clone(), line_kind));

                match owner {
                    Some(owner_id) => {
                        page.get_block_mut(owner_id)?.structure.push(line_id);
                        assigned += 1;
                    }
                    None => {
                        // Orphan line: wrap it so its text is reachable.
                        let text_kind = self.registry.construct(BlockType::Text);
                        let text_id = page
                            .add_full_block(Block::new(page.page_id, polygon, text_kind));
                        page.get_block_mut(text_id)?.structure.push(line_id);
                        page.structure.push(text_id);
                    }
                }
            }
            debug!(
                "page {}: {assigned} lines assigned to layout blocks",
                page.page_id
            );
        }

        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::layout::LayoutBuilder;
    use crate::builders::DocumentBuilder;
    use crate::provider::{DetectedLine, InMemoryProvider, LayoutRegion, ModelError};
    use image::DynamicImage;

    struct Model {
        regions: Vec<LayoutRegion>,
        lines: Vec<DetectedLine>,
    }

    impl RecognitionModel for Model {
        fn detect_layout(&self, _: &DynamicImage) -> Result<Vec<LayoutRegion>, ModelError> {
            Ok(self.regions.clone())
        }

        fn detect_lines(&self, _: &DynamicImage) -> Result<Vec<DetectedLine>, ModelError> {
            Ok(self.lines.clone())
        }

        fn recognize_lines(
            &self,
            _: &DynamicImage,
            _: &[PolygonBox],
        ) -> Result<Vec<String>, ModelError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn lines_attach_to_covering_block_and_orphans_get_text_wrappers() {
        let provider = InMemoryProvider::letter_pages(1);
        let config = PipelineConfig::default();
        let mut doc = DocumentBuilder::new(config.clone())
            .build_document("doc", &provider)
            .unwrap();

        // One Text region in the top half of the 816×1056 lowres image; one
        // line inside it, one line far below it.
        let model = Model {
            regions: vec![LayoutRegion {
                polygon: PolygonBox::from_bbox(0.0, 0.0, 816.0, 500.0),
                label: BlockType::Text,
            }],
            lines: vec![
                DetectedLine {
                    polygon: PolygonBox::from_bbox(40.0, 100.0, 700.0, 130.0),
                },
                DetectedLine {
                    polygon: PolygonBox::from_bbox(40.0, 900.0, 700.0, 930.0),
                },
            ],
        };
        let registry = BlockRegistry::default();
        LayoutBuilder::new(&model, &registry)
            .build(&mut doc, &provider)
            .unwrap();
        LineBuilder::new(&model, &registry, &config)
            .build(&mut doc, &provider)
            .unwrap();

        let page = &doc.pages[0];
        // Original Text block plus one orphan wrapper.
        assert_eq!(page.structure.len(), 2);
        let owner = doc.get_block(page.structure[0]).unwrap();
        assert_eq!(owner.structure.len(), 1);
        assert_eq!(owner.structure[0].block_type, BlockType::Line);

        let wrapper = doc.get_block(page.structure[1]).unwrap();
        assert_eq!(wrapper.block_type(), BlockType::Text);
        assert_eq!(wrapper.structure.len(), 1);

        let all_lines = doc.page_contained_blocks(0, Some(&[BlockType::Line]));
        assert_eq!(all_lines.len(), 2);
    }
}
