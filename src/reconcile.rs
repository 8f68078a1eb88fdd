//! Span reconciliation: splice replacement text into a line without losing
//! hyperlinks.
//!
//! A line's spans are replaced wholesale when a vision call re-recognises its
//! text. The replacement spans know nothing about hyperlinks, but some of
//! the old spans carried a link target tied to a literal substring of the
//! old text. Reconciliation redistributes those links onto matching
//! substrings of the new text — each link consumed at most once — and
//! guarantees the emitted spans concatenate back to the new text exactly.
//!
//! Tie-break rule: when two linked substrings both match (one contains the
//! other), the first-declared mapping entry wins. This is deliberately kept
//! as the deterministic insertion-order rule rather than a longest-match
//! heuristic; see DESIGN.md.

use crate::block::{Block, BlockId, BlockKind, BlockType};
use crate::document::Page;
use crate::error::PipelineError;
use tracing::warn;

/// Insertion-ordered mapping from linked literal substring to link target.
///
/// Sourced only from old spans whose link target is non-empty; unlinked old
/// spans contribute nothing and are superseded entirely. Entries are removed
/// as they are consumed, so a link attaches to at most one occurrence.
#[derive(Debug, Default, Clone)]
pub struct LinkMap {
    entries: Vec<(String, String)>,
}

impl LinkMap {
    pub fn from_old_spans<'a>(spans: impl Iterator<Item = &'a Block>) -> Self {
        let mut map = Self::default();
        for span in spans {
            if let (Some(text), Some(url)) = (span.span_text(), span.span_url()) {
                if !text.is_empty() && !url.is_empty() {
                    map.insert(text, url);
                }
            }
        }
        map
    }

    /// Append an entry. A repeated key keeps its original position but takes
    /// the latest URL, matching map-insertion semantics.
    pub fn insert(&mut self, text: &str, url: &str) {
        match self.entries.iter_mut().find(|(k, _)| k == text) {
            Some((_, stored)) => *stored = url.to_string(),
            None => self.entries.push((text.to_string(), url.to_string())),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry, in insertion order, whose key is a substring of `text`.
    fn first_match(&self, text: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| text.contains(k))
    }

    fn consume(&mut self, idx: usize) -> (String, String) {
        self.entries.remove(idx)
    }
}

/// Split replacement spans around the linked substrings still present in
/// their text.
///
/// Each emitted span inherits the originating replacement span's formatting
/// and geometry; only `text` and `url` differ. Concatenating the emitted
/// texts reproduces the replacement texts exactly — splits are lossless.
pub fn reconcile_spans(mut links: LinkMap, new_spans: Vec<Block>) -> Vec<Block> {
    let mut emitted = Vec::new();

    for span in new_spans {
        let Some(text) = span.span_text() else {
            warn!(
                "non-span block {} passed to reconciliation; dropped",
                span.id
            );
            continue;
        };
        let mut remaining = text.to_string();
        let input_text = remaining.clone();
        let start = emitted.len();

        while !remaining.is_empty() {
            match links.first_match(&remaining) {
                Some(idx) => {
                    let (key, url) = links.consume(idx);
                    // first_match guarantees the key occurs
                    let pos = remaining.find(&key).unwrap_or(0);
                    let before = &remaining[..pos];
                    if !before.is_empty() {
                        emitted.push(derive_span(&span, before, None));
                    }
                    emitted.push(derive_span(&span, &key, Some(url)));
                    remaining = remaining[pos + key.len()..].to_string();
                }
                None => {
                    emitted.push(derive_span(&span, &remaining, None));
                    remaining.clear();
                }
            }
        }

        // Losslessness is a logic invariant, not a recoverable condition.
        debug_assert_eq!(
            emitted[start..]
                .iter()
                .filter_map(|s| s.span_text())
                .collect::<String>(),
            input_text,
            "reconciliation must reproduce the replacement text exactly"
        );
    }

    emitted
}

/// Clone `template` with different text and link target.
fn derive_span(template: &Block, text: &str, url: Option<String>) -> Block {
    let mut span = template.clone();
    if let BlockKind::Span {
        text: span_text,
        url: span_url,
        ..
    } = &mut span.kind
    {
        *span_text = text.to_string();
        *span_url = url;
    }
    span
}

/// Replace a line's spans: detach the old ids, insert the reconciled spans
/// into the page index, and rewrite the line's structure list in emission
/// order.
///
/// The old span blocks stay in the index as dead entries until pruned; only
/// the line's structure list changes, so other holders of the old ids are
/// not invalidated — they dangle.
pub fn replace_line_spans(
    page: &mut Page,
    line_id: BlockId,
    new_spans: Vec<Block>,
) -> Result<Vec<BlockId>, PipelineError> {
    let line = page.get_block(line_id)?;
    let old_span_ids: Vec<BlockId> = line
        .structure
        .iter()
        .copied()
        .filter(|id| id.block_type == BlockType::Span)
        .collect();

    let links = LinkMap::from_old_spans(
        old_span_ids
            .iter()
            .filter_map(|&id| page.get_block(id).ok()),
    );

    let emitted = reconcile_spans(links, new_spans);

    let mut ids = Vec::with_capacity(emitted.len());
    for span in emitted {
        ids.push(page.add_full_block(span));
    }
    page.get_block_mut(line_id)?.structure = ids.clone();
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, Page};
    use crate::geometry::PolygonBox;
    use image::DynamicImage;

    fn poly() -> PolygonBox {
        PolygonBox::from_bbox(0.0, 0.0, 100.0, 10.0)
    }

    fn span(text: &str, url: Option<&str>) -> Block {
        let mut kind = BlockKind::plain_span(text);
        if let BlockKind::Span { url: u, .. } = &mut kind {
            *u = url.map(str::to_string);
        }
        Block::new(0, poly(), kind)
    }

    fn texts(spans: &[Block]) -> Vec<(&str, Option<&str>)> {
        spans
            .iter()
            .map(|s| (s.span_text().unwrap(), s.span_url()))
            .collect()
    }

    #[test]
    fn text_preserved_and_link_redistributed() {
        let old = [span("Acme Corp", Some("https://acme.test")), span("other text", None)];
        let links = LinkMap::from_old_spans(old.iter());
        let out = reconcile_spans(links, vec![span("Contact Acme Corp today", None)]);

        assert_eq!(
            texts(&out),
            vec![
                ("Contact ", None),
                ("Acme Corp", Some("https://acme.test")),
                (" today", None),
            ]
        );
        let joined: String = out.iter().filter_map(|s| s.span_text()).collect();
        assert_eq!(joined, "Contact Acme Corp today");
    }

    #[test]
    fn link_is_consumed_at_most_once() {
        let old = [span("Acme Corp", Some("https://acme.test"))];
        let links = LinkMap::from_old_spans(old.iter());
        let out = reconcile_spans(links, vec![span("Acme Corp vs Acme Corp", None)]);

        assert_eq!(
            texts(&out),
            vec![
                ("Acme Corp", Some("https://acme.test")),
                (" vs Acme Corp", None),
            ]
        );
    }

    #[test]
    fn no_match_emits_single_unlinked_span() {
        let old = [span("Acme Corp", Some("https://acme.test"))];
        let links = LinkMap::from_old_spans(old.iter());
        let out = reconcile_spans(links, vec![span("completely different text", None)]);
        assert_eq!(texts(&out), vec![("completely different text", None)]);
    }

    #[test]
    fn unlinked_old_spans_contribute_nothing() {
        let old = [span("lost text", None)];
        let links = LinkMap::from_old_spans(old.iter());
        assert!(links.is_empty());
        let out = reconcile_spans(links, vec![span("new text", None)]);
        assert_eq!(texts(&out), vec![("new text", None)]);
    }

    #[test]
    fn first_declared_entry_wins_on_overlap() {
        // "Corp" declared before "Acme Corp": insertion order decides, so the
        // shorter key matches inside the longer literal.
        let mut links = LinkMap::default();
        links.insert("Corp", "https://corp.test");
        links.insert("Acme Corp", "https://acme.test");
        let out = reconcile_spans(links, vec![span("See Acme Corp", None)]);

        assert_eq!(
            texts(&out),
            vec![("See Acme ", None), ("Corp", Some("https://corp.test"))]
        );
    }

    #[test]
    fn repeated_link_key_takes_latest_url() {
        // Same literal linked twice in the old spans: position of the first
        // declaration is kept, but the later URL replaces the earlier one.
        let old = [
            span("here", Some("https://first.test")),
            span(" and ", None),
            span("here", Some("https://last.test")),
        ];
        let links = LinkMap::from_old_spans(old.iter());
        let out = reconcile_spans(links, vec![span("click here now", None)]);

        assert_eq!(
            texts(&out),
            vec![
                ("click ", None),
                ("here", Some("https://last.test")),
                (" now", None)
            ]
        );
    }

    #[test]
    fn links_spread_across_multiple_replacement_spans() {
        let old = [
            span("alpha", Some("https://a.test")),
            span("beta", Some("https://b.test")),
        ];
        let links = LinkMap::from_old_spans(old.iter());
        let out = reconcile_spans(
            links,
            vec![span("see alpha here", None), span("and beta there", None)],
        );
        assert_eq!(
            texts(&out),
            vec![
                ("see ", None),
                ("alpha", Some("https://a.test")),
                (" here", None),
                ("and ", None),
                ("beta", Some("https://b.test")),
                (" there", None),
            ]
        );
    }

    #[test]
    fn replace_line_spans_relinks_and_preserves_raw_text() {
        let mut page = Page::new(
            0,
            PolygonBox::from_bbox(0.0, 0.0, 612.0, 792.0),
            DynamicImage::new_rgb8(1, 1),
            DynamicImage::new_rgb8(1, 1),
            Vec::new(),
        );
        let line_id = page.add_full_block(Block::new(0, poly(), BlockKind::Line));
        let old_a = page.add_full_block(span("Acme Corp", Some("https://acme.test")));
        let old_b = page.add_full_block(span(" was here", None));
        page.get_block_mut(line_id).unwrap().structure = vec![old_a, old_b];
        page.structure = vec![line_id];

        let ids =
            replace_line_spans(&mut page, line_id, vec![span("Call Acme Corp now", None)])
                .unwrap();
        assert_eq!(ids.len(), 3);
        assert_eq!(page.get_block(line_id).unwrap().structure, ids);

        // Old spans dangle in the index but are no longer reachable.
        assert!(page.contains_block(old_a));

        let doc = Document::new("t", vec![page]);
        assert_eq!(doc.raw_text(line_id), "Call Acme Corp now");
        let linked = doc
            .contained_blocks(line_id, Some(&[BlockType::Span]))
            .iter()
            .filter(|b| b.span_url().is_some())
            .count();
        assert_eq!(linked, 1);
    }
}
