//! Prompt constants for vision-service calls.
//!
//! Centralising every prompt here keeps a single source of truth and lets
//! unit tests inspect prompts without touching a real backend. Builders use
//! these verbatim; callers who need different behaviour construct their own
//! builders with custom prompts.

/// Prompt for re-recognising a single cropped text line.
///
/// The service is asked for raw text only; hyperlinks are reattached
/// afterwards by span reconciliation, and formatting is inherited from the
/// line's prior spans.
pub const LINE_OCR_PROMPT: &str = "Extract the exact text from the following image region. \
Return only the raw text, no commentary.";

/// Prompt for describing a Figure/Picture crop.
///
/// Asks for a JSON object so the response parser can pick out the
/// description (and an optional pre-rendered fragment) without guessing.
pub const FIGURE_DESCRIPTION_PROMPT: &str = "\
You are analysing a figure cropped from a document page.
If the image is a data chart (bar, line, pie, histogram, scatter):
  - describe it in detail, and
  - extract any visible data series as a Markdown table.
If it is not a data chart, describe its content in one or two sentences.
Respond with a JSON object: {\"description\": \"...\"}.
If the image carries no describable content, respond with {\"description\": \"\"}.";
