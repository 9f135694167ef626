//! Instruction renderer
//!
//! Drives each instruction through a fixed stage sequence:
//! `Pending -> HostCreated -> Placed -> Tagged -> Registered -> Done`.
//!
//! Validation and placement preflight run in `Pending`, so malformed
//! instructions are rejected before any host call. Once a host element exists,
//! any later failure deletes it again before the error is returned.

use crate::config::EngineConfig;
use crate::error::{InstrError, RenderError};
use crate::geometry::Vector;
use crate::handle::ElementHandle;
use crate::host::{HostApi, TextOptions};
use crate::instruction::{Instruction, TextKind};
use crate::placement::{centering_translation, reconstruct_dimension, DimensionLayout};
use crate::registry::Registry;
use crate::tagger::InstructionTagger;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Render progress of one instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderStage {
    Pending,
    HostCreated,
    Placed,
    Tagged,
    Registered,
    Done,
}

impl RenderStage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            RenderStage::Pending => "pending",
            RenderStage::HostCreated => "host-created",
            RenderStage::Placed => "placed",
            RenderStage::Tagged => "tagged",
            RenderStage::Registered => "registered",
            RenderStage::Done => "done",
        }
    }

    /// Stages reachable in one step
    #[must_use]
    pub const fn allowed_transitions(self) -> &'static [RenderStage] {
        use RenderStage::*;
        match self {
            Pending => &[HostCreated],
            HostCreated => &[Placed],
            Placed => &[Tagged],
            Tagged => &[Registered],
            Registered => &[Done],
            Done => &[],
        }
    }

    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Check if a host element exists at this stage
    #[inline]
    #[must_use]
    pub fn has_host_element(self) -> bool {
        self != RenderStage::Pending
    }
}

impl fmt::Display for RenderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validates a stage transition
///
/// # Errors
/// `IllegalTransition` if `to` is not reachable from `from` in one step
pub fn validate_transition(from: RenderStage, to: RenderStage) -> Result<(), InstrError> {
    if from.allowed_transitions().contains(&to) {
        Ok(())
    } else {
        Err(InstrError::IllegalTransition { from, to })
    }
}

/// Stage bookkeeping for one render call
#[derive(Debug)]
struct StageTracker<'a> {
    instruction_id: &'a str,
    stage: RenderStage,
}

impl<'a> StageTracker<'a> {
    fn new(instruction_id: &'a str) -> Self {
        Self {
            instruction_id,
            stage: RenderStage::Pending,
        }
    }

    fn advance(&mut self, to: RenderStage) -> Result<(), InstrError> {
        validate_transition(self.stage, to)?;
        tracing::debug!("Instruction {}: {} -> {to}", self.instruction_id, self.stage);
        self.stage = to;
        Ok(())
    }

    /// Registration happened; only `Done` can follow
    fn complete(&mut self) {
        debug_assert_eq!(self.stage, RenderStage::Registered);
        tracing::debug!("Instruction {}: {} -> done", self.instruction_id, self.stage);
        self.stage = RenderStage::Done;
    }

    fn fail(&self, source: InstrError) -> RenderError {
        RenderError {
            instruction_id: self.instruction_id.to_string(),
            stage: self.stage,
            source,
        }
    }
}

/// Per-kind data computed before the host is touched
enum Prepared {
    Text(TextKind),
    Dimension {
        layout: DimensionLayout,
        direction: Vector,
    },
    Model,
}

/// A successfully rendered instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub handle: ElementHandle,
    pub correlation_id: String,
    pub kind: &'static str,
}

/// Outcome of [`InstructionRenderer::render_batch`]
#[derive(Debug, Default)]
pub struct BatchReport {
    pub rendered: Vec<Rendered>,
    pub failed: Vec<RenderError>,
    /// Number of elements redrawn at the end of the batch
    pub redrawn: usize,
}

impl BatchReport {
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Handles created by the batch, in render order
    #[must_use]
    pub fn handles(&self) -> Vec<ElementHandle> {
        self.rendered.iter().map(|r| r.handle).collect()
    }
}

/// Draws instructions into the host
pub struct InstructionRenderer {
    host: Arc<dyn HostApi>,
    registry: Arc<Registry>,
    tagger: InstructionTagger,
    config: EngineConfig,
}

impl InstructionRenderer {
    #[must_use]
    pub fn new(host: Arc<dyn HostApi>, registry: Arc<Registry>, config: EngineConfig) -> Self {
        let tagger = InstructionTagger::new(host.clone(), config.attribute_key);
        Self {
            host,
            registry,
            tagger,
            config,
        }
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    #[inline]
    #[must_use]
    pub fn tagger(&self) -> &InstructionTagger {
        &self.tagger
    }

    /// Render one instruction.
    ///
    /// # Errors
    /// `RenderError` naming the instruction, the last completed stage and the
    /// cause. No host element created by this call survives a failure, unless
    /// the cleanup delete itself failed (logged).
    pub fn render(&self, instruction: &Instruction) -> Result<Rendered, RenderError> {
        let mut tracker = StageTracker::new(instruction.id());

        let prepared = self
            .prepare(instruction)
            .map_err(|source| self.failed(instruction, &tracker, source))?;
        let handle = self
            .create(instruction, &prepared)
            .map_err(|source| self.failed(instruction, &tracker, source))?;

        let finished = tracker
            .advance(RenderStage::HostCreated)
            .and_then(|()| self.finish(instruction, &prepared, handle, &mut tracker));
        if let Err(source) = finished {
            self.discard(handle, instruction.id());
            return Err(self.failed(instruction, &tracker, source));
        }

        self.registry.record(handle);
        tracker.complete();

        Ok(Rendered {
            handle,
            correlation_id: instruction.id().to_string(),
            kind: instruction.kind_name(),
        })
    }

    /// Render every instruction, continuing past failures, then optionally
    /// redraw the registry once
    pub fn render_batch(&self, instructions: &[Instruction]) -> BatchReport {
        let mut report = BatchReport::default();
        for instruction in instructions {
            match self.render(instruction) {
                Ok(rendered) => report.rendered.push(rendered),
                Err(err) => report.failed.push(err),
            }
        }

        if self.config.redraw_after_batch && !report.rendered.is_empty() {
            match self.registry.redraw() {
                Ok(count) => report.redrawn = count,
                Err(err) => tracing::warn!("Redraw after batch failed: {err}"),
            }
        }

        tracing::info!(
            "Rendered {} of {} instructions ({} failed)",
            report.rendered.len(),
            instructions.len(),
            report.failed.len()
        );
        report
    }

    fn prepare(&self, instruction: &Instruction) -> Result<Prepared, InstrError> {
        match instruction {
            Instruction::Text(text) => Ok(Prepared::Text(text.validate()?)),
            Instruction::Dimension(dim) => {
                let layout = reconstruct_dimension(
                    &dim.anchors,
                    dim.location.xaxis(),
                    -dim.location.normal(),
                    self.config.precision,
                )?;
                let direction = layout.direction()?;
                Ok(Prepared::Dimension { layout, direction })
            }
            Instruction::Model(_) => Ok(Prepared::Model),
        }
    }

    fn create(
        &self,
        instruction: &Instruction,
        prepared: &Prepared,
    ) -> Result<ElementHandle, InstrError> {
        let handle = match (instruction, prepared) {
            (Instruction::Text(text), Prepared::Text(kind)) => {
                let options = TextOptions {
                    text: text.text.clone(),
                    height: text.size,
                    thickness: text.thickness,
                    kind: *kind,
                    color: self.config.text_color,
                };
                self.host.create_text(
                    text.location.origin(),
                    text.location.xaxis(),
                    text.location.yaxis(),
                    &options,
                )?
            }
            (Instruction::Dimension(dim), Prepared::Dimension { layout, direction }) => {
                self.host.create_dimension(
                    *direction,
                    -dim.location.normal(),
                    dim.location.origin(),
                    &layout.anchors,
                )?
            }
            (Instruction::Model(model), Prepared::Model) => self
                .host
                .import_light_model(&model.source_path, model.location.origin())?,
            _ => {
                return Err(InstrError::UnsupportedInstructionKind(
                    instruction.kind_name().to_string(),
                ))
            }
        };
        Ok(handle)
    }

    /// Place, tag and validate registration; `tracker` ends at `Registered`
    fn finish(
        &self,
        instruction: &Instruction,
        prepared: &Prepared,
        handle: ElementHandle,
        tracker: &mut StageTracker<'_>,
    ) -> Result<(), InstrError> {
        self.place(instruction, prepared, handle)?;
        tracker.advance(RenderStage::Placed)?;

        self.tagger.tag(handle, instruction.id())?;
        tracker.advance(RenderStage::Tagged)?;

        tracker.advance(RenderStage::Registered)
    }

    fn place(
        &self,
        instruction: &Instruction,
        prepared: &Prepared,
        handle: ElementHandle,
    ) -> Result<(), InstrError> {
        match (instruction, prepared) {
            (Instruction::Text(text), Prepared::Text(kind)) if text.centered => {
                let corners = self.host.bounding_box_local(handle, &[handle])?;
                let translation = centering_translation(
                    &corners,
                    &text.location,
                    *kind,
                    self.config.corner_policy,
                    self.config.text_standoff,
                )?;
                self.host.move_elements(&[handle], translation)?;
            }
            (Instruction::Model(model), Prepared::Model) => {
                self.host
                    .apply_transform(&[handle], &model.location, &model.target_location)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn failed(
        &self,
        instruction: &Instruction,
        tracker: &StageTracker<'_>,
        source: InstrError,
    ) -> RenderError {
        let err = tracker.fail(source);
        tracing::warn!(
            "Render of {} instruction {} failed after {}: {}",
            instruction.kind_name(),
            err.instruction_id,
            err.stage,
            err.source
        );
        err
    }

    /// Best-effort delete of a half-created element
    fn discard(&self, handle: ElementHandle, instruction_id: &str) {
        match self.host.delete(&[handle]) {
            Ok(()) => tracing::debug!("Removed orphan {handle} of instruction {instruction_id}"),
            Err(err) => tracing::error!(
                "Failed to remove orphan {handle} of instruction {instruction_id}: {err}"
            ),
        }
    }
}

impl fmt::Debug for InstructionRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstructionRenderer")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_advance_linearly() {
        let mut stage = RenderStage::Pending;
        let mut seen = vec![stage];
        while let [next] = stage.allowed_transitions() {
            validate_transition(stage, *next).unwrap();
            stage = *next;
            seen.push(stage);
        }
        assert_eq!(
            seen,
            vec![
                RenderStage::Pending,
                RenderStage::HostCreated,
                RenderStage::Placed,
                RenderStage::Tagged,
                RenderStage::Registered,
                RenderStage::Done,
            ]
        );
        assert!(stage.is_terminal());
    }

    #[test]
    fn skipping_a_stage_is_illegal() {
        let err = validate_transition(RenderStage::HostCreated, RenderStage::Tagged).unwrap_err();
        assert!(matches!(
            err,
            InstrError::IllegalTransition {
                from: RenderStage::HostCreated,
                to: RenderStage::Tagged
            }
        ));
        assert_eq!(
            err.to_string(),
            "illegal render transition: host-created -> tagged"
        );
    }

    #[test]
    fn no_backwards_transitions() {
        assert!(validate_transition(RenderStage::Placed, RenderStage::HostCreated).is_err());
        assert!(validate_transition(RenderStage::Done, RenderStage::Pending).is_err());
    }

    #[test]
    fn only_pending_has_no_host_element() {
        assert!(!RenderStage::Pending.has_host_element());
        assert!(RenderStage::HostCreated.has_host_element());
        assert!(RenderStage::Done.has_host_element());
    }

    #[test]
    fn tracker_reports_last_completed_stage() {
        let mut tracker = StageTracker::new("t-1");
        tracker.advance(RenderStage::HostCreated).unwrap();
        assert!(tracker.advance(RenderStage::Done).is_err());
        let err = tracker.fail(InstrError::degenerate("empty bounding box"));
        assert_eq!(err.stage, RenderStage::HostCreated);
        assert_eq!(err.instruction_id, "t-1");
    }

    #[test]
    fn stage_serializes_kebab_case() {
        let json = serde_json::to_string(&RenderStage::HostCreated).unwrap();
        assert_eq!(json, "\"host-created\"");
    }
}
