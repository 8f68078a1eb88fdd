//! # doctree
//!
//! Build a typed block tree from scanned or born-digital document pages and
//! enrich it with layout, text lines, OCR text, and vision-model
//! descriptions.
//!
//! ## Why this crate?
//!
//! Flat text extraction loses exactly the information downstream consumers
//! need — which region is a heading, where a list starts, which caption
//! belongs to which figure. This crate keeps everything as a tree of typed
//! blocks with page-space polygons, so structure survives all the way to
//! rendering, and hyperlinks known before re-OCR are reconciled back onto
//! the fresh text instead of being dropped.
//!
//! ## Pipeline Overview
//!
//! ```text
//! pages (PageProvider)
//!  │
//!  ├─ 1. Skeleton    one Page per source page, two rasters (96/192 DPI)
//!  ├─ 2. Layout      typed regions from the recognition model
//!  ├─ 3. Lines       text lines, assigned to their owning region
//!  ├─ 4. OCR         model or vision-service text, spans reconciled
//!  ├─ 5. Describe    optional figure/picture descriptions (vision service)
//!  ├─ 6. Structure   list/figure/table grouping
//!  └─ 7. Processors  reading order, heading levels, table of contents
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use doctree::{BlockRegistry, DocumentConverter, PipelineConfig};
//! # fn run(
//! #     provider: &dyn doctree::PageProvider,
//! #     model: &dyn doctree::RecognitionModel,
//! # ) -> Result<(), doctree::PipelineError> {
//! let config = PipelineConfig::builder().highres_dpi(300).build()?;
//! let converter = DocumentConverter::new(config, BlockRegistry::default(), model, None)?;
//! let output = converter.convert("report", provider)?;
//! println!("{} pages, {} blocks", output.stats.pages, output.stats.blocks);
//! # Ok(())
//! # }
//! ```
//!
//! Execution is synchronous and strictly sequential per document; run
//! separate documents in separate processes for parallelism.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod block;
pub mod builders;
pub mod config;
pub mod convert;
pub mod document;
pub mod error;
pub mod geometry;
pub mod processors;
pub mod prompts;
pub mod provider;
pub mod reconcile;
pub mod registry;
pub mod service;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use block::{Block, BlockId, BlockKind, BlockMetadata, BlockType, SpanFormat};
pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use convert::{ConversionOutput, ConversionStats, DocumentConverter};
pub use document::{Document, Page, PageRef, TocEntry};
pub use error::{BlockError, PipelineError};
pub use geometry::PolygonBox;
pub use provider::{
    DetectedLine, InMemoryProvider, LayoutRegion, ModelError, PageProvider, RecognitionModel,
};
pub use registry::BlockRegistry;
pub use service::{
    BackendResponse, ImageData, RetryPolicy, ServiceError, VisionBackend, VisionService,
};
