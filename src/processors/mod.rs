//! Whole-document passes that run after the tree is structurally complete.
//!
//! Builders add blocks; processors rewrite what is already there. A
//! processor declares the block types it touches through `block_types()`,
//! with `None` meaning it runs unconditionally. The chain runner executes
//! an arbitrary list in the order given, skipping typed processors when the
//! document carries no block of their declared types.

pub mod document_toc;
pub mod order;
pub mod section_header;

use crate::block::BlockType;
use crate::document::Document;
use tracing::debug;

pub trait Processor {
    fn name(&self) -> &'static str;

    /// The block types this processor rewrites. `None` marks a processor
    /// that must run regardless of document content.
    fn block_types(&self) -> Option<&'static [BlockType]>;

    fn process(&self, document: &mut Document);
}

fn has_any_block(document: &Document, types: &[BlockType]) -> bool {
    document
        .pages
        .iter()
        .any(|page| page.all_blocks().any(|b| types.contains(&b.block_type())))
}

/// Run `processors` over `document` in order. A typed processor is skipped
/// when none of its declared block types occur in the document.
pub fn run_processors(document: &mut Document, processors: &[&dyn Processor]) {
    for processor in processors {
        if let Some(types) = processor.block_types() {
            if !has_any_block(document, types) {
                debug!("skipping processor {}: no matching blocks", processor.name());
                continue;
            }
        }
        debug!("running processor {}", processor.name());
        processor.process(document);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Block, BlockKind};
    use crate::document::Page;
    use crate::geometry::PolygonBox;
    use image::DynamicImage;
    use std::cell::Cell;

    struct CountingProcessor {
        types: Option<&'static [BlockType]>,
        runs: Cell<usize>,
    }

    impl Processor for CountingProcessor {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn block_types(&self) -> Option<&'static [BlockType]> {
            self.types
        }

        fn process(&self, _: &mut Document) {
            self.runs.set(self.runs.get() + 1);
        }
    }

    #[test]
    fn typed_processor_skipped_when_no_block_matches() {
        let mut page = Page::new(
            0,
            PolygonBox::from_bbox(0.0, 0.0, 612.0, 792.0),
            DynamicImage::new_rgb8(8, 8),
            DynamicImage::new_rgb8(16, 16),
            Vec::new(),
        );
        let id = page.add_full_block(Block::new(
            0,
            PolygonBox::from_bbox(0.0, 0.0, 100.0, 20.0),
            BlockKind::Text,
        ));
        page.structure = vec![id];
        let mut doc = Document::new("t", vec![page]);

        let absent = CountingProcessor {
            types: Some(&[BlockType::Equation]),
            runs: Cell::new(0),
        };
        let present = CountingProcessor {
            types: Some(&[BlockType::Text]),
            runs: Cell::new(0),
        };
        let unconditional = CountingProcessor {
            types: None,
            runs: Cell::new(0),
        };
        run_processors(&mut doc, &[&absent, &present, &unconditional]);

        assert_eq!(absent.runs.get(), 0);
        assert_eq!(present.runs.get(), 1);
        assert_eq!(unconditional.runs.get(), 1);
    }
}
