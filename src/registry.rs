//! Block registry: the tag → constructor table behind block creation.
//!
//! Builders never hard-code payloads for the regions they classify; they ask
//! the registry for the concrete shape registered for a tag. A deployment can
//! substitute shapes wholesale (e.g. a Figure variant that starts with a
//! canned description) before document construction begins. Once the pipeline
//! starts the table is frozen — there is no per-instance polymorphism swap
//! mid-run, so every block of a tag within one run has the same shape.

use crate::block::{BlockKind, BlockType};
use crate::error::PipelineError;
use std::collections::HashMap;
use std::fmt;

/// Constructor for a type's default payload.
pub type KindConstructor = Box<dyn Fn() -> BlockKind + Send + Sync>;

/// Startup-time table from [`BlockType`] to payload constructor.
pub struct BlockRegistry {
    table: HashMap<BlockType, KindConstructor>,
    frozen: bool,
}

impl fmt::Debug for BlockRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockRegistry")
            .field("types", &self.table.len())
            .field("frozen", &self.frozen)
            .finish()
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        let mut registry = Self {
            table: HashMap::new(),
            frozen: false,
        };
        for (block_type, ctor) in default_constructors() {
            registry.table.insert(block_type, ctor);
        }
        registry
    }
}

impl BlockRegistry {
    /// Replace the constructor for one tag.
    ///
    /// The replacement payload must belong to the same tag, otherwise ids and
    /// payloads would disagree about the block's type.
    pub fn override_type(
        &mut self,
        block_type: BlockType,
        ctor: KindConstructor,
    ) -> Result<(), PipelineError> {
        if self.frozen {
            return Err(PipelineError::InvalidConfig(format!(
                "registry is frozen; cannot override {block_type:?}"
            )));
        }
        let produced = ctor().block_type();
        if produced != block_type {
            return Err(PipelineError::InvalidConfig(format!(
                "constructor registered for {block_type:?} produces {produced:?}"
            )));
        }
        self.table.insert(block_type, ctor);
        Ok(())
    }

    /// Freeze the table for the rest of the run.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Construct the registered payload for `block_type`.
    pub fn construct(&self, block_type: BlockType) -> BlockKind {
        match self.table.get(&block_type) {
            Some(ctor) => ctor(),
            // Every known tag has a default entry; this arm only fires if a
            // caller built a registry by hand, in which case the unit-like
            // fallback keeps ids and payloads consistent.
            None => fallback_kind(block_type),
        }
    }
}

fn default_constructors() -> Vec<(BlockType, KindConstructor)> {
    use BlockType::*;
    let all = [
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
    ];
    all.into_iter()
        .map(|t| {
            let ctor: KindConstructor = Box::new(move || fallback_kind(t));
            (t, ctor)
        })
        .collect()
}

fn fallback_kind(block_type: BlockType) -> BlockKind {
    match block_type {
        BlockType::Line => BlockKind::Line,
        BlockType::Span => BlockKind::plain_span(""),
        BlockType::Char => BlockKind::Char {
            text: String::new(),
            idx: 0,
        },
        BlockType::Text => BlockKind::Text,
        BlockType::Code => BlockKind::Code { code: None },
        BlockType::Equation => BlockKind::Equation { latex: None },
        BlockType::SectionHeader => BlockKind::SectionHeader {
            heading_level: None,
        },
        BlockType::ListItem => BlockKind::ListItem,
        BlockType::ListGroup => BlockKind::ListGroup,
        BlockType::Table => BlockKind::Table,
        BlockType::TableCell => BlockKind::TableCell,
        BlockType::TableGroup => BlockKind::TableGroup,
        BlockType::Figure => BlockKind::Figure {
            description: None,
            description_markdown: None,
        },
        BlockType::FigureGroup => BlockKind::FigureGroup,
        BlockType::Picture => BlockKind::Picture {
            description: None,
            description_markdown: None,
        },
        BlockType::PictureGroup => BlockKind::PictureGroup,
        BlockType::Caption => BlockKind::Caption,
        BlockType::Footnote => BlockKind::Footnote,
        BlockType::Reference => BlockKind::Reference,
        BlockType::PageHeader => BlockKind::PageHeader,
        BlockType::PageFooter => BlockKind::PageFooter,
        BlockType::TableOfContents => BlockKind::TableOfContents,
    }
}
