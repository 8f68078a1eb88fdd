//! Table-of-contents rebuild.

use crate::block::{BlockKind, BlockType};
use crate::document::{Document, TocEntry};
use crate::processors::Processor;

/// Rebuilds `document.table_of_contents` from the section headers.
///
/// Runs unconditionally: it replaces the whole list on every run
/// rather than patching it, so the TOC is always consistent with the tree it
/// was derived from. Entries appear in page order, then each page's structure
/// order, with the header's line text as the title.
pub struct DocumentTocProcessor;

impl Processor for DocumentTocProcessor {
    fn name(&self) -> &'static str {
        "document-toc"
    }

    fn block_types(&self) -> Option<&'static [BlockType]> {
        None
    }

    fn process(&self, document: &mut Document) {
        let mut toc = Vec::new();
        for page in &document.pages {
            for header in
                document.page_contained_blocks(page.page_id, Some(&[BlockType::SectionHeader]))
            {
                let heading_level = match &header.kind {
                    BlockKind::SectionHeader { heading_level } => *heading_level,
                    _ => None,
                };
                let title = document.raw_text(header.id).trim().to_string();
                if title.is_empty() {
                    continue;
                }
                toc.push(TocEntry {
                    title,
                    heading_level,
                    page_id: page.page_id,
                    polygon: header.polygon.clone(),
                });
            }
        }
        document.table_of_contents = toc;
    }
}
