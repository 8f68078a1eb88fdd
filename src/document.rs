//! The document tree: pages, the per-page block index, and traversal.
//!
//! Each page owns an arena of blocks (`HashMap<BlockId, Block>`) plus the
//! per-type sequence counters that make ids unique and never reused. Blocks
//! reference children by id, so inserting a block ([`Page::add_full_block`])
//! and linking it into a parent's structure list are two separate,
//! composable steps — exactly the seam the span-replacement path needs.

use crate::block::{Block, BlockId, BlockType};
use crate::error::PipelineError;
use crate::geometry::PolygonBox;
use image::DynamicImage;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Source cross-reference metadata attached to a page (anchor targets the
/// original document exposes for intra-document links).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRef {
    pub ref_id: String,
    pub polygon: Option<PolygonBox>,
}

/// One entry of the document-level table of contents.
///
/// Derived data: recomputed wholesale by the TOC processor, never
/// hand-edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TocEntry {
    pub title: String,
    pub heading_level: Option<u32>,
    pub page_id: usize,
    pub polygon: PolygonBox,
}

// ── Page ─────────────────────────────────────────────────────────────────

/// A single page: two rasters, the top-level structure list, and the index.
///
/// The low-res image feeds layout and line detection; the high-res image
/// feeds OCR/vision crops. Both share the page-space origin, so polygons
/// rescale between them and the page bounding box with
/// [`PolygonBox::rescale`].
#[derive(Debug, Serialize)]
pub struct Page {
    pub page_id: usize,
    pub polygon: PolygonBox,
    #[serde(skip)]
    pub lowres_image: DynamicImage,
    #[serde(skip)]
    pub highres_image: DynamicImage,
    /// Ordered top-level block ids.
    pub structure: Vec<BlockId>,
    pub refs: Vec<PageRef>,
    #[serde(serialize_with = "blocks_in_id_order")]
    blocks: HashMap<BlockId, Block>,
    #[serde(skip)]
    sequences: HashMap<BlockType, usize>,
}

fn blocks_in_id_order<S: Serializer>(
    blocks: &HashMap<BlockId, Block>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut ordered: Vec<&Block> = blocks.values().collect();
    ordered.sort_by_key(|b| (b.id.block_type, b.id.sequence));
    serializer.collect_seq(ordered)
}

impl Page {
    pub fn new(
        page_id: usize,
        polygon: PolygonBox,
        lowres_image: DynamicImage,
        highres_image: DynamicImage,
        refs: Vec<PageRef>,
    ) -> Self {
        Self {
            page_id,
            polygon,
            lowres_image,
            highres_image,
            structure: Vec::new(),
            refs,
            blocks: HashMap::new(),
            sequences: HashMap::new(),
        }
    }

    /// Insert `block` into the page index, assigning the next free sequence
    /// number for its type. Does **not** touch any structure list — linking
    /// is the caller's explicit second step.
    pub fn add_full_block(&mut self, mut block: Block) -> BlockId {
        let block_type = block.block_type();
        let seq = self.sequences.entry(block_type).or_insert(0);
        let id = BlockId::new(self.page_id, block_type, *seq);
        *seq += 1;
        block.id = id;
        self.blocks.insert(id, block);
        id
    }

    /// O(1) lookup in the page index.
    pub fn get_block(&self, id: BlockId) -> Result<&Block, PipelineError> {
        self.blocks
            .get(&id)
            .ok_or(PipelineError::BlockNotFound { id })
    }

    pub fn get_block_mut(&mut self, id: BlockId) -> Result<&mut Block, PipelineError> {
        self.blocks
            .get_mut(&id)
            .ok_or(PipelineError::BlockNotFound { id })
    }

    pub fn contains_block(&self, id: BlockId) -> bool {
        self.blocks.contains_key(&id)
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Every block in the index, order unspecified. Dead blocks (unreferenced
    /// by any structure list) are included until pruned.
    pub fn all_blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    pub fn all_blocks_mut(&mut self) -> impl Iterator<Item = &mut Block> {
        self.blocks.values_mut()
    }

    /// Remove every block unreachable from the page's structure list.
    ///
    /// Detached subtrees (old spans after a replacement, unlinked blocks a
    /// stage abandoned) stay in the index until this runs. Returns the
    /// number of blocks removed.
    pub fn prune_dead_blocks(&mut self) -> usize {
        let mut live = HashSet::new();
        let mut stack: Vec<BlockId> = self.structure.clone();
        while let Some(id) = stack.pop() {
            if !self.blocks.contains_key(&id) || !live.insert(id) {
                continue;
            }
            if let Some(block) = self.blocks.get(&id) {
                stack.extend(block.structure.iter().copied());
            }
        }
        let before = self.blocks.len();
        self.blocks.retain(|id, _| live.contains(id));
        before - self.blocks.len()
    }

    pub fn image(&self, highres: bool) -> &DynamicImage {
        if highres {
            &self.highres_image
        } else {
            &self.lowres_image
        }
    }
}

// ── Document ─────────────────────────────────────────────────────────────

/// The root of the tree: an ordered sequence of pages plus document-level
/// derived data.
#[derive(Debug, Serialize)]
pub struct Document {
    pub name: String,
    pub pages: Vec<Page>,
    pub table_of_contents: Vec<TocEntry>,
}

impl Document {
    pub fn new(name: impl Into<String>, pages: Vec<Page>) -> Self {
        Self {
            name: name.into(),
            pages,
            table_of_contents: Vec::new(),
        }
    }

    pub fn page(&self, page_id: usize) -> Option<&Page> {
        self.pages.iter().find(|p| p.page_id == page_id)
    }

    pub fn page_mut(&mut self, page_id: usize) -> Option<&mut Page> {
        self.pages.iter_mut().find(|p| p.page_id == page_id)
    }

    /// Resolve a block id through its owning page's index.
    pub fn get_block(&self, id: BlockId) -> Result<&Block, PipelineError> {
        let page = self.page(id.page_id).ok_or(PipelineError::PageNotFound {
            id,
            page_id: id.page_id,
        })?;
        page.get_block(id)
    }

    pub fn get_block_mut(&mut self, id: BlockId) -> Result<&mut Block, PipelineError> {
        let page = self
            .page_mut(id.page_id)
            .ok_or(PipelineError::PageNotFound {
                id,
                page_id: id.page_id,
            })?;
        page.get_block_mut(id)
    }

    /// Descendants of `root` in pre-order, following each level's structure
    /// order, optionally restricted to a set of type tags.
    ///
    /// `root` itself is not included. Dangling ids (detached by a later
    /// stage but still present in a stale list) are skipped with a warning
    /// rather than failing the traversal.
    pub fn contained_blocks(
        &self,
        root: BlockId,
        filter: Option<&[BlockType]>,
    ) -> Vec<&Block> {
        let mut out = Vec::new();
        if let Ok(block) = self.get_block(root) {
            self.collect_descendants(&block.structure, filter, &mut out);
        }
        out
    }

    /// Pre-order traversal of a whole page's tree, from its top-level
    /// structure list.
    pub fn page_contained_blocks(
        &self,
        page_id: usize,
        filter: Option<&[BlockType]>,
    ) -> Vec<&Block> {
        let mut out = Vec::new();
        if let Some(page) = self.page(page_id) {
            self.collect_descendants(&page.structure, filter, &mut out);
        }
        out
    }

    fn collect_descendants<'a>(
        &'a self,
        ids: &[BlockId],
        filter: Option<&[BlockType]>,
        out: &mut Vec<&'a Block>,
    ) {
        for &id in ids {
            let block = match self.get_block(id) {
                Ok(b) => b,
                Err(_) => {
                    warn!("skipping dangling block id {id} during traversal");
                    continue;
                }
            };
            if filter.map_or(true, |types| types.contains(&block.block_type())) {
                out.push(block);
            }
            self.collect_descendants(&block.structure, filter, out);
        }
    }

    /// Concatenated span text of all descendants of `root`, in structure
    /// order, with a newline after each line that does not already end in
    /// one.
    pub fn raw_text(&self, root: BlockId) -> String {
        let mut text = String::new();
        if let Ok(block) = self.get_block(root) {
            self.raw_text_into(&block.structure, &mut text);
        }
        text
    }

    fn raw_text_into(&self, ids: &[BlockId], out: &mut String) {
        for &id in ids {
            let Ok(block) = self.get_block(id) else { continue };
            if let Some(t) = block.span_text() {
                out.push_str(t);
            }
            self.raw_text_into(&block.structure, out);
            if block.block_type() == BlockType::Line && !out.ends_with('\n') {
                out.push('\n');
            }
        }
    }

    /// Recursively assemble the HTML fragment for `root` — the renderer
    /// boundary contract. Children are assembled first, in structure order,
    /// then handed to [`Block::assemble_html`].
    pub fn assemble_block_html(&self, root: BlockId) -> Result<String, PipelineError> {
        let block = self.get_block(root)?;
        let mut fragments = Vec::with_capacity(block.structure.len());
        for &child in &block.structure {
            // Dangling children render as nothing, matching traversal.
            if self.get_block(child).is_ok() {
                fragments.push(self.assemble_block_html(child)?);
            }
        }
        Ok(block.assemble_html(&fragments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockKind;
    use std::collections::HashSet;

    fn empty_page(page_id: usize) -> Page {
        Page::new(
            page_id,
            PolygonBox::from_bbox(0.0, 0.0, 612.0, 792.0),
            DynamicImage::new_rgb8(1, 1),
            DynamicImage::new_rgb8(1, 1),
            Vec::new(),
        )
    }

    fn add(page: &mut Page, kind: BlockKind) -> BlockId {
        page.add_full_block(Block::new(
            page.page_id,
            PolygonBox::from_bbox(0.0, 0.0, 10.0, 10.0),
            kind,
        ))
    }

    #[test]
    fn sequences_are_per_type_and_never_reused() {
        let mut page = empty_page(0);
        let a = add(&mut page, BlockKind::Text);
        let b = add(&mut page, BlockKind::Text);
        let c = add(&mut page, BlockKind::Line);
        assert_eq!((a.sequence, b.sequence, c.sequence), (0, 1, 0));

        let ids: HashSet<BlockId> = page.all_blocks().map(|b| b.id).collect();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn add_full_block_does_not_link() {
        let mut page = empty_page(0);
        let id = add(&mut page, BlockKind::Text);
        assert!(page.structure.is_empty());
        assert!(page.contains_block(id));
    }

    #[test]
    fn get_block_reports_missing_id() {
        let page = empty_page(0);
        let missing = BlockId::new(0, BlockType::Text, 99);
        assert!(matches!(
            page.get_block(missing),
            Err(PipelineError::BlockNotFound { .. })
        ));
    }

    #[test]
    fn traversal_is_preorder_in_structure_order() {
        let mut page = empty_page(0);
        let text = add(&mut page, BlockKind::Text);
        let line_a = add(&mut page, BlockKind::Line);
        let line_b = add(&mut page, BlockKind::Line);
        let span_a = add(&mut page, BlockKind::plain_span("a"));
        let span_b = add(&mut page, BlockKind::plain_span("b"));

        page.get_block_mut(text).unwrap().structure = vec![line_a, line_b];
        page.get_block_mut(line_a).unwrap().structure = vec![span_a];
        page.get_block_mut(line_b).unwrap().structure = vec![span_b];
        page.structure = vec![text];

        let doc = Document::new("t", vec![page]);
        let order: Vec<BlockId> = doc
            .page_contained_blocks(0, None)
            .iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(order, vec![text, line_a, span_a, line_b, span_b]);

        let spans: Vec<BlockId> = doc
            .contained_blocks(text, Some(&[BlockType::Span]))
            .iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(spans, vec![span_a, span_b]);
    }

    #[test]
    fn traversal_skips_dangling_ids() {
        let mut page = empty_page(0);
        let text = add(&mut page, BlockKind::Text);
        page.get_block_mut(text).unwrap().structure =
            vec![BlockId::new(0, BlockType::Line, 42)];
        page.structure = vec![text];

        let doc = Document::new("t", vec![page]);
        assert_eq!(doc.page_contained_blocks(0, None).len(), 1);
    }

    #[test]
    fn prune_removes_unreachable_blocks_only() {
        let mut page = empty_page(0);
        let text = add(&mut page, BlockKind::Text);
        let line = add(&mut page, BlockKind::Line);
        let dead_span = add(&mut page, BlockKind::plain_span("stale"));
        let live_span = add(&mut page, BlockKind::plain_span("fresh"));
        page.get_block_mut(text).unwrap().structure = vec![line];
        page.get_block_mut(line).unwrap().structure = vec![live_span];
        page.structure = vec![text];

        assert_eq!(page.prune_dead_blocks(), 1);
        assert!(!page.contains_block(dead_span));
        assert!(page.contains_block(live_span));
        assert_eq!(page.block_count(), 3);
    }

    #[test]
    fn raw_text_concatenates_spans() {
        let mut page = empty_page(0);
        let line = add(&mut page, BlockKind::Line);
        let s1 = add(&mut page, BlockKind::plain_span("Hello "));
        let s2 = add(&mut page, BlockKind::plain_span("world"));
        page.get_block_mut(line).unwrap().structure = vec![s1, s2];
        page.structure = vec![line];

        let doc = Document::new("t", vec![page]);
        assert_eq!(doc.raw_text(line), "Hello world");
    }

    #[test]
    fn assemble_html_recurses_through_children() {
        let mut page = empty_page(0);
        let header = add(
            &mut page,
            BlockKind::SectionHeader {
                heading_level: Some(2),
            },
        );
        let line = add(&mut page, BlockKind::Line);
        let span = add(&mut page, BlockKind::plain_span("Title"));
        page.get_block_mut(header).unwrap().structure = vec![line];
        page.get_block_mut(line).unwrap().structure = vec![span];

        let doc = Document::new("t", vec![page]);
        assert_eq!(doc.assemble_block_html(header).unwrap(), "<h2>Title\n</h2>");
    }
}
