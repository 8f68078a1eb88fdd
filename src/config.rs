//! Configuration for the document pipeline.
//!
//! Every knob lives in one [`PipelineConfig`] value built via its
//! [`PipelineConfigBuilder`] and passed explicitly into stage constructors at
//! pipeline-assembly time — no stage reads ambient global state during
//! execution. Keeping the knobs in one struct makes it trivial to serialise
//! them for logging and to diff two runs to understand why their outputs
//! differ.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for building and enriching one document.
///
/// Built via [`PipelineConfig::builder()`] or [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use doctree::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .highres_dpi(300)
///     .use_llm_ocr(true)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// DPI for the low-resolution page raster used by layout and line
    /// detection. Default: 96.
    ///
    /// Detection models downscale internally, so spending pixels here only
    /// slows rendering. Geometry correctness requires this value to match
    /// the raster the provider actually produces — downstream rescales
    /// assume both DPIs are accurate relative to the same page bounding box.
    pub lowres_dpi: u32,

    /// DPI for the high-resolution raster used by OCR/vision crops.
    /// Default: 192.
    ///
    /// Crops are taken per text line or figure region; 192 keeps small print
    /// legible to vision models without ballooning request payloads.
    pub highres_dpi: u32,

    /// Skip the OCR stage entirely. Default: false.
    ///
    /// Layout and line structure are still built; lines simply end up with
    /// no spans. Useful when a caller only needs geometry.
    pub disable_ocr: bool,

    /// Route OCR through the vision service instead of the recognition
    /// model. Default: false.
    pub use_llm_ocr: bool,

    /// Ask the vision service to describe Figure/Picture blocks.
    /// Default: false.
    pub describe_figures: bool,

    /// Total attempts per service request, including the first. Default: 2.
    pub max_retries: u32,

    /// Base backoff between retries; the n-th retry waits `n ×` this.
    /// Default: 3000 ms.
    pub retry_wait_ms: u64,

    /// Minimum fraction of a detected line's area that must fall inside a
    /// layout region for the region to claim the line. Default: 0.5.
    pub line_overlap_threshold: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            lowres_dpi: 96,
            highres_dpi: 192,
            disable_ocr: false,
            use_llm_ocr: false,
            describe_figures: false,
            max_retries: 2,
            retry_wait_ms: 3000,
            line_overlap_threshold: 0.5,
        }
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn retry_wait(&self) -> Duration {
        Duration::from_millis(self.retry_wait_ms)
    }

    /// Retry policy for a [`crate::service::VisionService`] wired to this
    /// configuration.
    pub fn retry_policy(&self) -> crate::service::RetryPolicy {
        crate::service::RetryPolicy {
            max_retries: self.max_retries,
            retry_wait: self.retry_wait(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn lowres_dpi(mut self, dpi: u32) -> Self {
        self.config.lowres_dpi = dpi;
        self
    }

    pub fn highres_dpi(mut self, dpi: u32) -> Self {
        self.config.highres_dpi = dpi;
        self
    }

    pub fn disable_ocr(mut self, v: bool) -> Self {
        self.config.disable_ocr = v;
        self
    }

    pub fn use_llm_ocr(mut self, v: bool) -> Self {
        self.config.use_llm_ocr = v;
        self
    }

    pub fn describe_figures(mut self, v: bool) -> Self {
        self.config.describe_figures = v;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.max(1);
        self
    }

    pub fn retry_wait_ms(mut self, ms: u64) -> Self {
        self.config.retry_wait_ms = ms;
        self
    }

    pub fn line_overlap_threshold(mut self, t: f64) -> Self {
        self.config.line_overlap_threshold = t.clamp(0.0, 1.0);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.lowres_dpi < 24 || c.lowres_dpi > 600 {
            return Err(PipelineError::InvalidConfig(format!(
                "lowres_dpi must be 24–600, got {}",
                c.lowres_dpi
            )));
        }
        if c.highres_dpi < c.lowres_dpi {
            return Err(PipelineError::InvalidConfig(format!(
                "highres_dpi ({}) must be >= lowres_dpi ({})",
                c.highres_dpi, c.lowres_dpi
            )));
        }
        if c.max_retries == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_retries must be >= 1".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = PipelineConfig::default();
        assert_eq!(c.lowres_dpi, 96);
        assert_eq!(c.highres_dpi, 192);
        assert_eq!(c.max_retries, 2);
        assert_eq!(c.retry_wait(), Duration::from_secs(3));
        assert!(!c.use_llm_ocr);
    }

    #[test]
    fn retry_policy_mirrors_config() {
        let c = PipelineConfig::builder()
            .max_retries(4)
            .retry_wait_ms(100)
            .build()
            .unwrap();
        let p = c.retry_policy();
        assert_eq!(p.max_retries, 4);
        assert_eq!(p.retry_wait, Duration::from_millis(100));
    }

    #[test]
    fn builder_rejects_inverted_dpis() {
        let err = PipelineConfig::builder()
            .lowres_dpi(300)
            .highres_dpi(96)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("highres_dpi"));
    }

    #[test]
    fn builder_clamps_threshold_and_retries() {
        let c = PipelineConfig::builder()
            .line_overlap_threshold(1.5)
            .max_retries(0)
            .build()
            .unwrap();
        assert_eq!(c.line_overlap_threshold, 1.0);
        assert_eq!(c.max_retries, 1);
    }
}
