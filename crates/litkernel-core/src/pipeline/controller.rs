//! The stage controller and checkpoint manager.
//!
//! Drives stage 0 -> 1 -> 2A -> 2B in order. Each stage is satisfied from a
//! valid checkpoint when one exists; otherwise the service is called, the
//! output validated and approved, and only then checkpointed.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use litkernel_store::{CheckpointKey, CheckpointStore, StoreError};
use serde_json::Value;
use tracing::{debug, info, instrument, warn, Instrument};
use uuid::Uuid;

use crate::assemble::{assemble_record, merged_alignment, record_path, write_record, BookMetadata};
use crate::config::PipelineConfig;
use crate::document::Document;
use crate::domain::alignment::ChapterAlignment;
use crate::domain::error::{PipelineError, Result};
use crate::domain::macro_profile::MacroProfile;
use crate::domain::record::PipelineRecord;
use crate::domain::segment::SegmentKind;
use crate::domain::stage::{PipelineState, Stage};
use crate::obs;
use crate::position::sample_window;
use crate::prompts::{self, BookInfo, SampleExcerpt, SYSTEM_PROMPT};
use crate::response::unwrap_response;
use crate::service::{GenerativeService, ServiceRequest};
use crate::structure::conventional_alignment;

use super::outputs::{
    macro_summary, parse_devices, parse_extract, parse_macro, parse_structure, process_devices,
    validate_macro, DeviceOutput, ExtractionOutput, StructureOutput,
};
use super::review::{AutoApprove, ReviewDecision, StageReviewer};

/// How a stage was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// Loaded from a valid checkpoint; no service call.
    Resumed,
    /// Produced by the service, validated, approved and checkpointed.
    Generated,
}

/// Output of one stage, before it is installed on the controller.
enum StageData {
    Structure(StructureOutput),
    Extraction(ExtractionOutput),
    Macro(MacroProfile),
    Devices(DeviceOutput),
}

impl StageData {
    fn summary(&self) -> String {
        match self {
            StageData::Structure(out) => out.summary(),
            StageData::Extraction(out) => out.summary(),
            StageData::Macro(profile) => macro_summary(profile),
            StageData::Devices(out) => out.summary(),
        }
    }

    fn to_value(&self) -> Result<Value> {
        let value = match self {
            StageData::Structure(out) => serde_json::to_value(out)?,
            StageData::Extraction(out) => serde_json::to_value(out)?,
            StageData::Macro(profile) => serde_json::to_value(profile)?,
            StageData::Devices(out) => serde_json::to_value(out)?,
        };
        Ok(value)
    }
}

/// Presence of one stage checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointStatus {
    pub stage: Stage,
    pub present: bool,
}

pub struct PipelineController {
    config: PipelineConfig,
    book: BookMetadata,
    document: Document,
    service: Arc<dyn GenerativeService>,
    store: Arc<dyn CheckpointStore>,
    reviewer: Box<dyn StageReviewer>,
    state: PipelineState,
    structure: Option<StructureOutput>,
    extraction: Option<ExtractionOutput>,
    macro_profile: Option<MacroProfile>,
    devices: Option<DeviceOutput>,
    calls_made: u32,
    run_id: Uuid,
}

impl PipelineController {
    pub fn new(
        config: PipelineConfig,
        book: BookMetadata,
        document: Document,
        service: Arc<dyn GenerativeService>,
        store: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            config,
            book,
            document,
            service,
            store,
            reviewer: Box::new(AutoApprove),
            state: PipelineState::NotStarted,
            structure: None,
            extraction: None,
            macro_profile: None,
            devices: None,
            calls_made: 0,
            run_id: Uuid::new_v4(),
        }
    }

    pub fn with_reviewer(mut self, reviewer: Box<dyn StageReviewer>) -> Self {
        self.reviewer = reviewer;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn book(&self) -> &BookMetadata {
        &self.book
    }

    pub fn structure(&self) -> Option<&StructureOutput> {
        self.structure.as_ref()
    }

    pub fn extraction(&self) -> Option<&ExtractionOutput> {
        self.extraction.as_ref()
    }

    pub fn macro_profile(&self) -> Option<&MacroProfile> {
        self.macro_profile.as_ref()
    }

    pub fn devices(&self) -> Option<&DeviceOutput> {
        self.devices.as_ref()
    }

    /// Service calls made by this controller so far.
    pub fn service_calls(&self) -> u32 {
        self.calls_made
    }

    fn key(&self, stage: Stage) -> CheckpointKey {
        CheckpointKey::new(&self.book.title, stage.id())
    }

    fn slug(&self) -> String {
        self.key(Stage::Structure).document
    }

    fn book_info(&self) -> BookInfo<'_> {
        BookInfo {
            title: &self.book.title,
            author: &self.book.author,
            total_chapters: self.document.chapter_count(),
        }
    }

    /// Which stage checkpoints exist for `title`.
    pub fn checkpoint_status(store: &dyn CheckpointStore, title: &str) -> Result<Vec<CheckpointStatus>> {
        Stage::ALL
            .into_iter()
            .map(|stage| {
                let present = store.exists(&CheckpointKey::new(title, stage.id()))?;
                Ok(CheckpointStatus { stage, present })
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Restart
    // -----------------------------------------------------------------------

    /// Delete the checkpoint of `stage` and every later one, and forget
    /// their in-memory outputs. Earlier checkpoints are kept.
    pub fn restart_from(&mut self, stage: Stage) -> Result<()> {
        let slug = self.slug();
        for later in stage.and_later() {
            if self.store.delete(&self.key(later))? {
                obs::emit_checkpoint_invalidated(&slug, later, "restart requested");
            }
            self.clear_output(later);
        }
        if self.state >= PipelineState::before(stage) {
            self.state = PipelineState::before(stage);
        }
        info!(stage = %stage, "pipeline restarted");
        Ok(())
    }

    pub fn fresh_start(&mut self) -> Result<()> {
        self.restart_from(Stage::Structure)
    }

    fn clear_output(&mut self, stage: Stage) {
        match stage {
            Stage::Structure => self.structure = None,
            Stage::Extraction => self.extraction = None,
            Stage::Macro => self.macro_profile = None,
            Stage::Devices => self.devices = None,
        }
    }

    fn install(&mut self, data: StageData) {
        match data {
            StageData::Structure(out) => self.structure = Some(out),
            StageData::Extraction(out) => self.extraction = Some(out),
            StageData::Macro(profile) => self.macro_profile = Some(profile),
            StageData::Devices(out) => self.devices = Some(out),
        }
    }

    // -----------------------------------------------------------------------
    // Running
    // -----------------------------------------------------------------------

    /// Run every stage in order, then assemble and write the record.
    pub async fn run(&mut self) -> Result<PipelineRecord> {
        let span = obs::pipeline_span(&self.slug(), &self.run_id.to_string());
        async {
            for stage in Stage::ALL {
                self.run_stage(stage).await?;
            }
            self.assemble()
        }
        .instrument(span)
        .await
    }

    /// Satisfy one stage, from its checkpoint or from the service.
    #[instrument(skip_all, fields(stage = %stage))]
    pub async fn run_stage(&mut self, stage: Stage) -> Result<StageOutcome> {
        if let Some(missing) = stage.predecessor() {
            if !self.state.has_completed(missing) {
                return Err(PipelineError::MissingUpstreamStage { stage, missing });
            }
        }
        if self.state.has_completed(stage) {
            debug!("stage already complete in this run");
            return Ok(StageOutcome::Resumed);
        }

        let slug = self.slug();
        if let Some(data) = self.resume(stage)? {
            self.install(data);
            self.state = PipelineState::after(stage);
            obs::emit_stage_resumed(&slug, stage);
            return Ok(StageOutcome::Resumed);
        }

        obs::emit_stage_started(&slug, stage);
        let started = Instant::now();
        let calls_before = self.calls_made;

        let data = match self.generate_approved(stage).await {
            Ok(data) => data,
            Err(e) => {
                obs::emit_stage_failed(&slug, stage, &e);
                return Err(e);
            }
        };

        self.store.save(&self.key(stage), &data.to_value()?)?;
        obs::emit_checkpoint_saved(&slug, stage);
        self.invalidate_downstream(stage)?;

        self.install(data);
        self.state = PipelineState::after(stage);
        obs::emit_stage_completed(
            &slug,
            stage,
            obs::duration_ms(started.elapsed()),
            self.calls_made - calls_before,
        );
        Ok(StageOutcome::Generated)
    }

    /// Later checkpoints were derived from output that no longer exists.
    fn invalidate_downstream(&self, stage: Stage) -> Result<()> {
        let slug = self.slug();
        for later in stage.and_later().skip(1) {
            if self.store.delete(&self.key(later))? {
                obs::emit_checkpoint_invalidated(&slug, later, "upstream stage regenerated");
            }
        }
        Ok(())
    }

    async fn generate_approved(&mut self, stage: Stage) -> Result<StageData> {
        let data = self.generate(stage).await?;
        match self.reviewer.review(stage, &data.summary()) {
            ReviewDecision::Approve => Ok(data),
            ReviewDecision::Reject { reason } => Err(PipelineError::StageRejected { stage, reason }),
        }
    }

    /// Load and re-validate a checkpoint. Anything unusable is deleted so
    /// the stage regenerates.
    fn resume(&self, stage: Stage) -> Result<Option<StageData>> {
        let key = self.key(stage);
        let problem = match self.store.load(&key) {
            Ok(None) => return Ok(None),
            Ok(Some(value)) => match self.decode(stage, value) {
                Ok(data) => return Ok(Some(data)),
                Err(e) => e.to_string(),
            },
            Err(StoreError::Corrupt { reason, .. }) => reason,
            Err(e) => return Err(e.into()),
        };

        warn!(checkpoint = %key, problem = %problem, "discarding unusable checkpoint");
        self.store.delete(&key)?;
        obs::emit_checkpoint_invalidated(&key.document, stage, &problem);
        Ok(None)
    }

    fn decode(&self, stage: Stage, value: Value) -> Result<StageData> {
        let data = match stage {
            Stage::Structure => {
                let out: StructureOutput = serde_json::from_value(value)?;
                out.validate(self.document.chapter_count())?;
                StageData::Structure(out)
            }
            Stage::Extraction => {
                let out: ExtractionOutput = serde_json::from_value(value)?;
                out.validate()?;
                StageData::Extraction(out)
            }
            Stage::Macro => {
                let profile: MacroProfile = serde_json::from_value(value)?;
                validate_macro(&profile)?;
                StageData::Macro(profile)
            }
            Stage::Devices => {
                let mut out: DeviceOutput = serde_json::from_value(value)?;
                let alignment = self.upstream_alignment(stage)?;
                let pov = self.macro_profile.as_ref().and_then(MacroProfile::pov_code);
                out.revalidate(&alignment, self.document.chapter_count(), pov)?;
                StageData::Devices(out)
            }
        };
        Ok(data)
    }

    /// One service call. Waits out the cooldown before every call but the
    /// first.
    async fn call(&mut self, stage: Stage, label: String, prompt: String) -> Result<Value> {
        let cooldown = self.config.cooldown();
        if self.calls_made > 0 && !cooldown.is_zero() {
            debug!(secs = cooldown.as_secs(), "cooling down before next service call");
            tokio::time::sleep(cooldown).await;
        }
        self.calls_made += 1;

        let request = ServiceRequest::new(label, SYSTEM_PROMPT, prompt);
        let response = self
            .service
            .generate(&request)
            .await
            .map_err(|source| PipelineError::Service { stage, source })?;
        debug!(
            label = %request.label,
            input_tokens = ?response.input_tokens,
            output_tokens = ?response.output_tokens,
            "service responded"
        );
        unwrap_response(&response.text).map_err(|e| PipelineError::malformed(stage, e.to_string()))
    }

    fn excerpt_around(&self, chapter: u32, window: usize) -> Result<String> {
        let span = sample_window(
            chapter,
            self.document.chapter_count(),
            self.document.word_count(),
            window,
        )?;
        Ok(self.document.slice_words(span))
    }

    fn upstream_alignment(&self, stage: Stage) -> Result<ChapterAlignment> {
        match (&self.structure, &self.extraction) {
            (Some(structure), Some(extraction)) => Ok(merged_alignment(structure, extraction)),
            (None, _) => Err(PipelineError::MissingUpstreamStage {
                stage,
                missing: Stage::Structure,
            }),
            (Some(_), None) => Err(PipelineError::MissingUpstreamStage {
                stage,
                missing: Stage::Extraction,
            }),
        }
    }

    async fn generate(&mut self, stage: Stage) -> Result<StageData> {
        let total_chapters = self.document.chapter_count();
        match stage {
            Stage::Structure => {
                let conventional = conventional_alignment(total_chapters)?;
                let mut samples = Vec::with_capacity(SegmentKind::ALL.len());
                for seg in conventional.iter() {
                    samples.push(SampleExcerpt {
                        segment: seg.kind,
                        around_chapter: seg.primary_chapter,
                        text: self.excerpt_around(seg.primary_chapter, self.config.sample_window_words)?,
                    });
                }
                let prompt = prompts::structure_prompt(self.book_info(), &samples);
                let value = self.call(stage, stage.id().to_string(), prompt).await?;
                let out = parse_structure(&value, total_chapters)?;
                out.validate(total_chapters)?;
                Ok(StageData::Structure(out))
            }
            Stage::Extraction => {
                let alignment = self
                    .structure
                    .as_ref()
                    .map(|s| s.alignment.clone())
                    .ok_or(PipelineError::MissingUpstreamStage {
                        stage,
                        missing: Stage::Structure,
                    })?;
                let mut out = ExtractionOutput::default();
                for kind in SegmentKind::ALL {
                    let excerpt = self.excerpt_around(
                        alignment.get(kind).primary_chapter,
                        self.config.extraction_window_words,
                    )?;
                    let prompt = prompts::extraction_prompt(self.book_info(), kind, &alignment, &excerpt);
                    let label = format!("{}:{}", stage.id(), kind.as_str());
                    let value = self.call(stage, label, prompt).await?;
                    out.extracts.insert(kind, parse_extract(&value, kind)?);
                }
                out.validate()?;
                Ok(StageData::Extraction(out))
            }
            Stage::Macro => {
                let alignment = self.upstream_alignment(stage)?;
                let prompt = prompts::macro_prompt(self.book_info(), &alignment);
                let value = self.call(stage, stage.id().to_string(), prompt).await?;
                Ok(StageData::Macro(parse_macro(value)?))
            }
            Stage::Devices => {
                let alignment = self.upstream_alignment(stage)?;
                let pov_code = self
                    .macro_profile
                    .as_ref()
                    .and_then(|p| p.pov_code())
                    .map(str::to_string);
                let prompt = prompts::device_prompt(self.book_info(), &alignment, pov_code.as_deref());
                let value = self.call(stage, stage.id().to_string(), prompt).await?;
                let raw = parse_devices(value)?;
                Ok(StageData::Devices(process_devices(
                    raw,
                    &alignment,
                    total_chapters,
                    pov_code.as_deref(),
                )))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Assembly
    // -----------------------------------------------------------------------

    /// Merge the four outputs into the record and write it. Once per run.
    pub fn assemble(&mut self) -> Result<PipelineRecord> {
        if self.state == PipelineState::Assembled {
            return Err(PipelineError::AlreadyAssembled);
        }
        let structure = self.structure.as_ref().ok_or(PipelineError::Incomplete(Stage::Structure))?;
        let extraction = self.extraction.as_ref().ok_or(PipelineError::Incomplete(Stage::Extraction))?;
        let macro_profile = self.macro_profile.as_ref().ok_or(PipelineError::Incomplete(Stage::Macro))?;
        let devices = self.devices.as_ref().ok_or(PipelineError::Incomplete(Stage::Devices))?;

        let record = assemble_record(
            &self.book,
            &self.document,
            self.run_id,
            structure,
            extraction,
            macro_profile,
            devices,
        );
        let path = self.record_path();
        write_record(&path, &record)?;

        self.state = PipelineState::Assembled;
        obs::emit_record_assembled(&self.slug(), record.devices.len(), &path);
        Ok(record)
    }

    pub fn record_path(&self) -> PathBuf {
        record_path(&self.config.records_dir, &self.book.title)
    }
}
