//! Heading-level inference from header heights.

use crate::block::{BlockKind, BlockType};
use crate::document::Document;
use crate::processors::Processor;

const TYPES: [BlockType; 1] = [BlockType::SectionHeader];

/// Assigns `heading_level` to every section header by ranking header
/// heights document-wide.
///
/// Layout detection gives no nesting information, but within one document
/// larger headings sit higher in the outline. Heights are bucketed to the
/// nearest point so rasterisation jitter does not split one visual size into
/// several ranks. The tallest bucket becomes `<h1>`, the next `<h2>`, down
/// to `<h6>` for everything smaller. Headers already carrying a level (from
/// a provider outline) are left alone.
pub struct SectionHeaderProcessor;

impl SectionHeaderProcessor {
    fn bucket(height: f64) -> i64 {
        height.round() as i64
    }
}

impl Processor for SectionHeaderProcessor {
    fn name(&self) -> &'static str {
        "section-header"
    }

    fn block_types(&self) -> Option<&'static [BlockType]> {
        Some(&TYPES)
    }

    fn process(&self, document: &mut Document) {
        let mut buckets: Vec<i64> = document
            .pages
            .iter()
            .flat_map(|page| {
                page.all_blocks()
                    .filter(|b| b.block_type() == BlockType::SectionHeader)
                    .map(|b| Self::bucket(b.polygon.height()))
            })
            .collect();
        buckets.sort_unstable_by(|a, b| b.cmp(a));
        buckets.dedup();

        for page in &mut document.pages {
            for block in page.all_blocks_mut() {
                let height = Self::bucket(block.polygon.height());
                if let BlockKind::SectionHeader { heading_level } = &mut block.kind {
                    if heading_level.is_some() {
                        continue;
                    }
                    let rank = buckets.iter().position(|b| *b == height).unwrap_or(0);
                    *heading_level = Some((rank as u32 + 1).min(6));
                }
            }
        }
    }
}
