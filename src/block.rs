//! The typed block: identifiers, type tags, payloads, and metadata.
//!
//! Every node in the document tree — structural group or content leaf —
//! shares the same [`Block`] shell: a stable [`BlockId`], a polygon in page
//! coordinates, an ordered `structure` list of child ids, and a free-form
//! metadata record. What varies per type lives in the [`BlockKind`] payload.
//!
//! ## Why ids instead of child handles?
//!
//! Parent→child links are `Vec<BlockId>` resolved through the owning page's
//! index, never owning references. Any stage can replace a subtree by
//! rewriting the parent's id list without invalidating other holders of the
//! old ids — they simply dangle and are skipped by traversal. A tree of ids
//! also cannot form an ownership cycle, which keeps the arena design honest.

use crate::geometry::PolygonBox;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

// ── Identifiers ──────────────────────────────────────────────────────────

/// Stable identifier for a block: `(page_id, block_type, sequence)`.
///
/// Assigned once by the owning page at insertion, globally unique within a
/// document, never reused or mutated. Displays in path form,
/// e.g. `/page/0/Span/3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId {
    pub page_id: usize,
    pub block_type: BlockType,
    pub sequence: usize,
}

impl BlockId {
    pub fn new(page_id: usize, block_type: BlockType, sequence: usize) -> Self {
        Self {
            page_id,
            block_type,
            sequence,
        }
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/page/{}/{:?}/{}",
            self.page_id, self.block_type, self.sequence
        )
    }
}

// ── Type tags ────────────────────────────────────────────────────────────

/// Closed set of block-type tags.
///
/// Modelled as an enum rather than open registration: the registry maps each
/// tag to a constructor and can be overridden per deployment before the
/// pipeline starts, but the tag set itself is fixed at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BlockType {
    Line,
    Span,
    Char,
    Text,
    Code,
    Equation,
    SectionHeader,
    ListItem,
    ListGroup,
    Table,
    TableCell,
    TableGroup,
    Figure,
    FigureGroup,
    Picture,
    PictureGroup,
    Caption,
    Footnote,
    Reference,
    PageHeader,
    PageFooter,
    TableOfContents,
}

impl BlockType {
    /// True for tags that exist only to group other blocks.
    pub fn is_group(self) -> bool {
        matches!(
            self,
            BlockType::ListGroup
                | BlockType::TableGroup
                | BlockType::FigureGroup
                | BlockType::PictureGroup
        )
    }
}

// ── Span formatting ──────────────────────────────────────────────────────

/// Inline formatting attributes a span can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanFormat {
    Plain,
    Bold,
    Italic,
    Math,
    Underline,
}

// ── Payloads ─────────────────────────────────────────────────────────────

/// Type-specific payload fields.
///
/// Structural groups and plain containers are unit variants; content leaves
/// carry their text/attributes inline. `BlockKind` and [`BlockType`] are
/// kept in lockstep by [`BlockKind::block_type`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum BlockKind {
    Line,
    Span {
        text: String,
        url: Option<String>,
        formats: Vec<SpanFormat>,
        font: String,
        font_weight: f64,
        font_size: f64,
        minimum_position: usize,
        maximum_position: usize,
    },
    Char {
        text: String,
        idx: usize,
    },
    Text,
    Code {
        code: Option<String>,
    },
    Equation {
        latex: Option<String>,
    },
    SectionHeader {
        heading_level: Option<u32>,
    },
    ListItem,
    ListGroup,
    Table,
    TableCell,
    TableGroup,
    Figure {
        description: Option<String>,
        description_markdown: Option<String>,
    },
    FigureGroup,
    Picture {
        description: Option<String>,
        description_markdown: Option<String>,
    },
    PictureGroup,
    Caption,
    Footnote,
    Reference,
    PageHeader,
    PageFooter,
    TableOfContents,
}

impl BlockKind {
    /// The tag this payload belongs to.
    pub fn block_type(&self) -> BlockType {
        match self {
            BlockKind::Line => BlockType::Line,
            BlockKind::Span { .. } => BlockType::Span,
            BlockKind::Char { .. } => BlockType::Char,
            BlockKind::Text => BlockType::Text,
            BlockKind::Code { .. } => BlockType::Code,
            BlockKind::Equation { .. } => BlockType::Equation,
            BlockKind::SectionHeader { .. } => BlockType::SectionHeader,
            BlockKind::ListItem => BlockType::ListItem,
            BlockKind::ListGroup => BlockType::ListGroup,
            BlockKind::Table => BlockType::Table,
            BlockKind::TableCell => BlockType::TableCell,
            BlockKind::TableGroup => BlockType::TableGroup,
            BlockKind::Figure { .. } => BlockType::Figure,
            BlockKind::FigureGroup => BlockType::FigureGroup,
            BlockKind::Picture { .. } => BlockType::Picture,
            BlockKind::PictureGroup => BlockType::PictureGroup,
            BlockKind::Caption => BlockType::Caption,
            BlockKind::Footnote => BlockType::Footnote,
            BlockKind::Reference => BlockType::Reference,
            BlockKind::PageHeader => BlockType::PageHeader,
            BlockKind::PageFooter => BlockType::PageFooter,
            BlockKind::TableOfContents => BlockType::TableOfContents,
        }
    }

    /// Convenience constructor for an unlinked, unstyled span.
    pub fn plain_span(text: impl Into<String>) -> Self {
        BlockKind::Span {
            text: text.into(),
            url: None,
            formats: vec![SpanFormat::Plain],
            font: "Unknown".to_string(),
            font_weight: 0.0,
            font_size: 0.0,
            minimum_position: 0,
            maximum_position: 0,
        }
    }
}

// ── Metadata ─────────────────────────────────────────────────────────────

/// Free-form per-block metadata record.
///
/// The token/request counters accumulate across vision-service calls made on
/// behalf of this block; they count successful requests only — failed
/// attempts never touch them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockMetadata {
    pub llm_tokens_used: u64,
    pub llm_request_count: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl BlockMetadata {
    /// Add one successful request's usage to the counters.
    pub fn record_llm_usage(&mut self, tokens: u64, requests: u64) {
        self.llm_tokens_used += tokens;
        self.llm_request_count += requests;
    }
}

// ── The block itself ─────────────────────────────────────────────────────

/// A typed node in the document tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub polygon: PolygonBox,
    /// Ordered child ids. Empty for leaves.
    pub structure: Vec<BlockId>,
    #[serde(default)]
    pub metadata: BlockMetadata,
    pub kind: BlockKind,
}

impl Block {
    /// A block with no id yet; the page assigns one in `add_full_block`.
    ///
    /// The placeholder sequence is `usize::MAX` so accidental use of an
    /// unregistered block is loud in logs and impossible to collide with a
    /// real id.
    pub fn new(page_id: usize, polygon: PolygonBox, kind: BlockKind) -> Self {
        let block_type = kind.block_type();
        Self {
            id: BlockId::new(page_id, block_type, usize::MAX),
            polygon,
            structure: Vec::new(),
            metadata: BlockMetadata::default(),
            kind,
        }
    }

    pub fn block_type(&self) -> BlockType {
        self.kind.block_type()
    }

    /// The span's literal text, if this block is a span.
    pub fn span_text(&self) -> Option<&str> {
        match &self.kind {
            BlockKind::Span { text, .. } => Some(text),
            _ => None,
        }
    }

    /// The span's hyperlink target, if any.
    pub fn span_url(&self) -> Option<&str> {
        match &self.kind {
            BlockKind::Span { url, .. } => url.as_deref(),
            _ => None,
        }
    }

    /// Per-block HTML fragment for the renderer boundary.
    ///
    /// `child_fragments` are the already-assembled fragments of this block's
    /// resolved children, in structure order. The default is concatenation;
    /// content leaves emit their own markup; Figure/Picture append a rendered
    /// description fragment after their base content when one is present,
    /// falling back to the plain-text description form.
    pub fn assemble_html(&self, child_fragments: &[String]) -> String {
        let children = child_fragments.concat();
        match &self.kind {
            BlockKind::Span { text, url, .. } => match url {
                Some(u) => format!("<a href=\"{}\">{}</a>", escape_html(u), escape_html(text)),
                None => escape_html(text),
            },
            BlockKind::Char { text, .. } => escape_html(text),
            BlockKind::Code { code } => {
                format!("<pre>{}</pre>", escape_html(code.as_deref().unwrap_or("")))
            }
            BlockKind::Equation { latex } => match latex {
                Some(tex) => format!("<math>{}</math>", escape_html(tex)),
                None => children,
            },
            BlockKind::SectionHeader { heading_level } => {
                let level = heading_level.unwrap_or(2).clamp(1, 6);
                format!("<h{level}>{children}</h{level}>")
            }
            BlockKind::Figure {
                description,
                description_markdown,
            }
            | BlockKind::Picture {
                description,
                description_markdown,
            } => self.assemble_described(children, description, description_markdown),
            BlockKind::Line => format!("{children}\n"),
            _ => children,
        }
    }

    fn assemble_described(
        &self,
        base: String,
        description: &Option<String>,
        description_markdown: &Option<String>,
    ) -> String {
        if let Some(md_html) = description_markdown {
            return format!(
                "{base}<p role='img' data-original-image-id='{}'>{md_html}</p>",
                self.id
            );
        }
        if let Some(desc) = description {
            return format!(
                "{base}<p role='img' data-original-image-id='{}'>Image {} description: {}</p>",
                self.id,
                self.id,
                escape_html(desc)
            );
        }
        base
    }
}

/// Minimal HTML escaping for text content and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
