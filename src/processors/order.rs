//! Reading-order pass.

use crate::block::BlockType;
use crate::document::Document;
use crate::processors::Processor;

/// Sorts each page's top-level structure list into reading order.
///
/// Layout models emit regions in detection order, which follows model
/// confidence rather than the page. Sorting by the polygon's top edge, then
/// its left edge, recovers the order a single-column reader would follow.
/// Header blocks sort ahead of body text and footers fall to the end purely
/// by position.
pub struct OrderProcessor;

impl Processor for OrderProcessor {
    fn name(&self) -> &'static str {
        "order"
    }

    fn block_types(&self) -> Option<&'static [BlockType]> {
        // Reorders page-level links rather than any one block type.
        None
    }

    fn process(&self, document: &mut Document) {
        for page in &mut document.pages {
            let mut keyed: Vec<(f64, f64, crate::block::BlockId)> = page
                .structure
                .iter()
                .map(|id| match page.get_block(*id) {
                    Ok(block) => (block.polygon.y0(), block.polygon.x0(), *id),
                    Err(_) => (f64::MAX, f64::MAX, *id),
                })
                .collect();
            keyed.sort_by(|a, b| {
                a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1))
            });
            page.structure = keyed.into_iter().map(|(_, _, id)| id).collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Block, BlockKind};
    use crate::document::Page;
    use crate::geometry::PolygonBox;
    use image::DynamicImage;

    #[test]
    fn structure_sorts_top_to_bottom_then_left_to_right() {
        let mut page = Page::new(
            0,
            PolygonBox::from_bbox(0.0, 0.0, 612.0, 792.0),
            DynamicImage::new_rgb8(816, 1056),
            DynamicImage::new_rgb8(1632, 2112),
            Vec::new(),
        );
        let footer = page.add_full_block(Block::new(
            0,
            PolygonBox::from_bbox(0.0, 700.0, 600.0, 780.0),
            BlockKind::PageFooter,
        ));
        let right = page.add_full_block(Block::new(
            0,
            PolygonBox::from_bbox(300.0, 100.0, 600.0, 200.0),
            BlockKind::Text,
        ));
        let left = page.add_full_block(Block::new(
            0,
            PolygonBox::from_bbox(0.0, 100.0, 290.0, 200.0),
            BlockKind::Text,
        ));
        let header = page.add_full_block(Block::new(
            0,
            PolygonBox::from_bbox(0.0, 10.0, 600.0, 40.0),
            BlockKind::PageHeader,
        ));
        page.structure = vec![footer, right, left, header];

        let mut doc = Document::new("t", vec![page]);
        OrderProcessor.process(&mut doc);

        assert_eq!(
            doc.page(0).unwrap().structure,
            vec![header, left, right, footer]
        );
    }
}
