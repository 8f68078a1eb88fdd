//! Error types for the doctree library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PipelineError`] — **Fatal**: the document cannot be built at all
//!   (the provider cannot supply an image or bounding box, the configuration
//!   is invalid). Returned as `Err(PipelineError)` from the top-level
//!   conversion entry points.
//!
//! * [`BlockError`] — **Non-fatal**: one block's enrichment failed (a vision
//!   call errored, a description could not be parsed) but the rest of the
//!   tree is fine. Logged and recorded so callers can inspect partial
//!   success rather than losing the whole document to one bad region.
//!
//! The separation lets callers decide their own tolerance: a structurally
//! complete document is always produced even if every enrichment call fails.

use crate::block::BlockId;
use thiserror::Error;

/// All fatal errors returned by the doctree library.
///
/// Block-level failures use [`BlockError`] and are logged/recorded rather
/// than propagated here.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Provider errors ───────────────────────────────────────────────────
    /// The provider could not produce page images at the requested DPI.
    #[error("Provider failed to render pages at {dpi} DPI: {detail}")]
    ProviderImageFailed { dpi: u32, detail: String },

    /// The provider could not supply a page bounding box.
    #[error("Provider has no bounding box for page {page_id}")]
    ProviderBboxMissing { page_id: usize },

    /// The provider returned a different number of images than pages.
    #[error("Provider returned {got} images for {expected} pages at {dpi} DPI")]
    ProviderImageCountMismatch {
        expected: usize,
        got: usize,
        dpi: u32,
    },

    /// A requested page index exceeds the provider's page count.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    // ── Tree errors ───────────────────────────────────────────────────────
    /// A structure list referenced an id absent from its page's index.
    #[error("Block {id} is not present in the page index")]
    BlockNotFound { id: BlockId },

    /// An id resolved to a page the document does not contain.
    #[error("Block {id} references page {page_id}, which does not exist")]
    PageNotFound { id: BlockId, page_id: usize },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error scoped to a single block.
///
/// Recorded in [`crate::convert::ConversionStats`] when an enrichment stage
/// fails on one region. The block is left in its prior state (no replaced
/// spans, no description) and the pipeline continues.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum BlockError {
    /// A vision/LLM call failed for this block after all retries.
    #[error("Block {id}: service call failed after {retries} retries: {detail}")]
    ServiceFailed {
        id: BlockId,
        retries: u32,
        detail: String,
    },

    /// The service responded but the payload could not be interpreted.
    #[error("Block {id}: unusable service response: {detail}")]
    UnusableResponse { id: BlockId, detail: String },

    /// The recognition model failed on this block's region.
    #[error("Block {id}: recognition failed: {detail}")]
    RecognitionFailed { id: BlockId, detail: String },
}
