//! Layout stage: classify page regions into typed blocks.
//!
//! Runs the recognition model over each page's low-res raster, rescales the
//! detected polygons into page space, constructs a block for each region
//! through the registry, and links it into the page's top-level structure
//! list in detection order.

use crate::block::{Block, BlockType};
use crate::builders::Builder;
use crate::document::Document;
use crate::error::{BlockError, PipelineError};
use crate::provider::{PageProvider, RecognitionModel};
use crate::registry::BlockRegistry;
use tracing::{debug, warn};

pub struct LayoutBuilder<'a> {
    model: &'a dyn RecognitionModel,
    registry: &'a BlockRegistry,
}

impl<'a> LayoutBuilder<'a> {
    pub fn new(model: &'a dyn RecognitionModel, registry: &'a BlockRegistry) -> Self {
        Self { model, registry }
    }
}

/// Labels the layout model may legally emit: content/group-level regions,
/// never text-internal types. Anything else is a model defect and skipped.
fn is_layout_label(block_type: BlockType) -> bool {
    !matches!(
        block_type,
        BlockType::Line | BlockType::Span | BlockType::Char
    ) && !block_type.is_group()
}

impl Builder for LayoutBuilder<'_> {
    fn name(&self) -> &'static str {
        "layout"
    }

    fn build(
        &self,
        document: &mut Document,
        _provider: &dyn PageProvider,
    ) -> Result<Vec<BlockError>, PipelineError> {
        for page in document.pages.iter_mut() {
            let regions = match self.model.detect_layout(&page.lowres_image) {
                Ok(regions) => regions,
                Err(e) => {
                    // One page's model failure never aborts the document.
                    warn!("layout detection failed on page {}: {e}", page.page_id);
                    continue;
                }
            };

            let image_size = (
                page.lowres_image.width() as f64,
                page.lowres_image.height() as f64,
            );
            let page_size = page.polygon.size();

            for region in regions {
                if !is_layout_label(region.label) {
                    warn!(
                        "page {}: model emitted non-layout label {:?}; skipped",
                        page.page_id, region.label
                    );
                    continue;
                }
                let polygon = region
                    .polygon
                    .rescale(image_size, page_size)
                    .fit_to_bounds(page.polygon.bbox());
                let kind = self.registry.construct(region.label);
                let id = page.add_full_block(Block::new(page.page_id, polygon, kind));
                page.structure.push(id);
            }
            debug!(
                "page {}: {} layout blocks",
                page.page_id,
                page.structure.len()
            );
        }

        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::DocumentBuilder;
    use crate::config::PipelineConfig;
    use crate::geometry::PolygonBox;
    use crate::provider::{DetectedLine, InMemoryProvider, LayoutRegion, ModelError};
    use image::DynamicImage;

    struct FixedLayoutModel {
        regions: Vec<LayoutRegion>,
    }

    impl RecognitionModel for FixedLayoutModel {
        fn detect_layout(
            &self,
            _image: &DynamicImage,
        ) -> Result<Vec<LayoutRegion>, ModelError> {
            Ok(self.regions.clone())
        }

        fn detect_lines(&self, _image: &DynamicImage) -> Result<Vec<DetectedLine>, ModelError> {
            Ok(Vec::new())
        }

        fn recognize_lines(
            &self,
            _image: &DynamicImage,
            _polygons: &[PolygonBox],
        ) -> Result<Vec<String>, ModelError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn regions_become_linked_blocks_in_page_space() {
        let provider = InMemoryProvider::letter_pages(1);
        let doc_builder = DocumentBuilder::new(PipelineConfig::default());
        let mut doc = doc_builder.build_document("doc", &provider).unwrap();

        // Image is 816×1056 px (96 DPI letter); the top half in image coords.
        let model = FixedLayoutModel {
            regions: vec![
                LayoutRegion {
                    polygon: PolygonBox::from_bbox(0.0, 0.0, 816.0, 528.0),
                    label: BlockType::Text,
                },
                LayoutRegion {
                    polygon: PolygonBox::from_bbox(0.0, 0.0, 10.0, 10.0),
                    label: BlockType::Span, // illegal layout label
                },
            ],
        };
        let registry = BlockRegistry::default();
        LayoutBuilder::new(&model, &registry)
            .build(&mut doc, &provider)
            .unwrap();

        let page = &doc.pages[0];
        assert_eq!(page.structure.len(), 1);
        let block = doc.get_block(page.structure[0]).unwrap();
        assert_eq!(block.block_type(), BlockType::Text);
        // Rescaled into page points: 612×396.
        let (x0, y0, x1, y1) = block.polygon.bbox();
        assert_eq!((x0, y0), (0.0, 0.0));
        assert!((x1 - 612.0).abs() < 1e-6 && (y1 - 396.0).abs() < 1e-6);
    }
}
