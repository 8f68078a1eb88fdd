//! Top-level conversion entry point.
//!
//! [`DocumentConverter`] assembles the stage sequence from one
//! [`PipelineConfig`], runs the builders, then the processor chain, and
//! returns the finished tree together with [`ConversionStats`]. It is the
//! only place stage order is decided; individual stages know nothing about
//! each other.

use crate::builders::description::FigureDescriptionBuilder;
use crate::builders::layout::LayoutBuilder;
use crate::builders::line::LineBuilder;
use crate::builders::ocr::{LlmOcrBuilder, OcrBuilder};
use crate::builders::structure::StructureBuilder;
use crate::builders::{Builder, DocumentBuilder};
use crate::config::PipelineConfig;
use crate::document::Document;
use crate::error::{BlockError, PipelineError};
use crate::processors::document_toc::DocumentTocProcessor;
use crate::processors::order::OrderProcessor;
use crate::processors::section_header::SectionHeaderProcessor;
use crate::processors::{run_processors, Processor};
use crate::provider::{PageProvider, RecognitionModel};
use crate::registry::BlockRegistry;
use crate::service::VisionService;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Summary of one conversion run.
///
/// `block_errors` holds every non-fatal failure the stages recorded; an
/// empty list means full enrichment, a non-empty one partial enrichment of a
/// still structurally complete document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversionStats {
    pub pages: usize,
    pub blocks: usize,
    pub llm_tokens_used: u64,
    pub llm_request_count: u64,
    pub build_duration: Duration,
    pub process_duration: Duration,
    pub block_errors: Vec<BlockError>,
}

/// A finished document plus the run's stats.
#[derive(Debug)]
pub struct ConversionOutput {
    pub document: Document,
    pub stats: ConversionStats,
}

/// Assembles and runs the whole pipeline for one document.
pub struct DocumentConverter<'a> {
    config: PipelineConfig,
    registry: BlockRegistry,
    model: &'a dyn RecognitionModel,
    service: Option<&'a VisionService>,
}

impl<'a> DocumentConverter<'a> {
    /// Create a converter, validating that every enabled knob has the
    /// component it needs. The registry is frozen here; overrides must
    /// happen before construction.
    pub fn new(
        config: PipelineConfig,
        mut registry: BlockRegistry,
        model: &'a dyn RecognitionModel,
        service: Option<&'a VisionService>,
    ) -> Result<Self, PipelineError> {
        if (config.use_llm_ocr || config.describe_figures) && service.is_none() {
            return Err(PipelineError::InvalidConfig(
                "use_llm_ocr/describe_figures require a vision service".into(),
            ));
        }
        registry.freeze();
        Ok(Self {
            config,
            registry,
            model,
            service,
        })
    }

    /// Build, enrich, and post-process one document.
    pub fn convert(
        &self,
        name: &str,
        provider: &dyn PageProvider,
    ) -> Result<ConversionOutput, PipelineError> {
        let build_start = Instant::now();

        let layout = LayoutBuilder::new(self.model, &self.registry);
        let line = LineBuilder::new(self.model, &self.registry, &self.config);

        let model_ocr;
        let llm_ocr;
        let ocr: Option<&dyn Builder> = if self.config.disable_ocr {
            None
        } else if self.config.use_llm_ocr {
            // Presence validated in `new`.
            let service = self
                .service
                .ok_or_else(|| PipelineError::Internal("vision service disappeared".into()))?;
            llm_ocr = LlmOcrBuilder::new(service);
            Some(&llm_ocr)
        } else {
            model_ocr = OcrBuilder::new(self.model);
            Some(&model_ocr)
        };

        let description;
        let mut extras: Vec<&dyn Builder> = Vec::new();
        if self.config.describe_figures {
            let service = self
                .service
                .ok_or_else(|| PipelineError::Internal("vision service disappeared".into()))?;
            description = FigureDescriptionBuilder::new(service);
            extras.push(&description);
        }
        let structure = StructureBuilder;
        extras.push(&structure);

        let document_builder = DocumentBuilder::new(self.config.clone());
        let (mut document, block_errors) =
            document_builder.run(name, provider, &layout, &line, ocr, &extras)?;
        let build_duration = build_start.elapsed();

        let process_start = Instant::now();
        let processors: [&dyn Processor; 3] = [
            &OrderProcessor,
            &SectionHeaderProcessor,
            &DocumentTocProcessor,
        ];
        run_processors(&mut document, &processors);
        let pruned: usize = document
            .pages
            .iter_mut()
            .map(|page| page.prune_dead_blocks())
            .sum();
        if pruned > 0 {
            debug!("pruned {pruned} dead blocks");
        }
        let process_duration = process_start.elapsed();

        let stats = collect_stats(&document, block_errors, build_duration, process_duration);
        info!(
            "converted '{name}': {} pages, {} blocks, {} block errors",
            stats.pages,
            stats.blocks,
            stats.block_errors.len()
        );
        Ok(ConversionOutput { document, stats })
    }
}

fn collect_stats(
    document: &Document,
    block_errors: Vec<BlockError>,
    build_duration: Duration,
    process_duration: Duration,
) -> ConversionStats {
    let mut stats = ConversionStats {
        pages: document.pages.len(),
        build_duration,
        process_duration,
        block_errors,
        ..ConversionStats::default()
    };
    for page in &document.pages {
        stats.blocks += page.block_count();
        for block in page.all_blocks() {
            stats.llm_tokens_used += block.metadata.llm_tokens_used;
            stats.llm_request_count += block.metadata.llm_request_count;
        }
    }
    stats
}
