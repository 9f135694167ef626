//! Seeded session simulator
//!
//! Generates a random mix of instructions, renders them against a
//! [`instr_test_utils::FakeHost`] while injecting one-shot host failures, watches external edits
//! through the change detector, then clears the session and checks that the
//! lifecycle guarantees held throughout.

use glam::DVec3;
use instr_core::{
    AnchorPoint, DimensionInstruction, ElementHandle, EngineConfig, Frame, HostApi, Instruction,
    ModelInstruction, RenderStage, TextInstruction,
};
use instr_events::{ChangeDetector, DetectorConfig};
use instr_storage::{FileStorage, SessionSnapshot, StorageExt};
use instr_test_utils::{setup_session, HostOp, TestSession};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::f64::consts::TAU;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Clear attempts before the session counts as stuck
const MAX_CLEAR_ATTEMPTS: usize = 3;

/// Share of generated instructions that are malformed on purpose
const INVALID_RATE: f64 = 0.05;

const WORDS: &[&str] = &["A", "B", "DATUM", "CUT 2-2", "WELD", "REV C", "Ø12 H7"];
const TEXT_KINDS: &[&str] = &["line", "surface", "volume"];

/// Configuration file layout shared by `simulate --config` and `report`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfigFile {
    pub engine: EngineConfig,
    pub detector: DetectorConfig,
}

impl SimConfigFile {
    /// Parse a TOML document; missing tables keep their defaults
    ///
    /// # Errors
    /// If the document is malformed
    pub fn from_toml_str(source: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// If the file cannot be read or parsed
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
        Self::from_toml_str(&source)
    }
}

/// Simulator configuration
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub seed: u64,
    /// Instructions rendered in the main phase
    pub instructions: u64,
    /// Probability of injecting a host failure per instruction, clamped to `[0, 1]`
    pub failure_rate: f64,
    /// External edits made while the change detector watches
    pub external_edits: usize,
    /// Write the session snapshot here before clearing
    pub snapshot: Option<PathBuf>,
    pub engine: EngineConfig,
    pub detector: DetectorConfig,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            instructions: 200,
            failure_rate: 0.1,
            external_edits: 6,
            snapshot: None,
            engine: EngineConfig::default(),
            detector: DetectorConfig::default(),
        }
    }
}

impl SimulatorConfig {
    #[must_use]
    pub fn with_file(mut self, file: SimConfigFile) -> Self {
        self.engine = file.engine;
        self.detector = file.detector;
        self
    }

    fn failure_probability(&self) -> f64 {
        if self.failure_rate.is_nan() {
            0.0
        } else {
            self.failure_rate.clamp(0.0, 1.0)
        }
    }
}

/// A broken lifecycle guarantee
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    /// A failed render left host elements behind
    OrphanedElement {
        instruction_id: String,
        stage: RenderStage,
        leaked: usize,
    },
    /// A malformed instruction reached the host
    HostTouchedByRejected {
        instruction_id: String,
        calls: usize,
    },
    /// A successful render is missing from the registry or the host
    UnregisteredElement {
        instruction_id: String,
        handle: ElementHandle,
    },
    /// Registry size differs from the number of successful renders
    RegistryMismatch { expected: usize, actual: usize },
    /// Detector deliveries differ from the external edits made
    DetectorMismatch {
        expected_added: usize,
        seen_added: usize,
        expected_removed: usize,
        seen_removed: usize,
    },
    /// Saved snapshot does not round-trip the registry
    SnapshotMismatch { saved: usize, loaded: usize },
    /// Registry still holds handles after every clear attempt
    ClearIncomplete { remaining: usize, attempts: usize },
    /// Tagged elements remain on the host after a successful clear
    OwnedLeftover { count: usize },
    /// Clearing an empty registry reached the host
    RedundantClearCalledHost { calls: usize },
}

/// Counters collected during a run
#[derive(Debug, Clone, Default)]
pub struct SimulatorStats {
    pub instructions_attempted: u64,
    pub instructions_rendered: u64,
    pub rejected_before_host: u64,
    pub failed_after_host: u64,
    pub injected_failures: u64,
    pub external_added: usize,
    pub external_removed: usize,
    pub detector_ticks: u64,
    pub detector_notifications: u64,
    pub clear_attempts: usize,
    pub elements_cleared: usize,
}

/// Outcome of [`run_simulator`]
#[derive(Debug, Clone)]
pub struct SimulatorReport {
    pub config: SimulatorConfig,
    pub stats: SimulatorStats,
    pub violations: Vec<Violation>,
}

impl SimulatorReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Instruction Simulator Report ===\n\n");
        report.push_str(&format!("Seed: {}\n", self.config.seed));
        report.push_str(&format!(
            "Failure Rate: {:.2}\n",
            self.config.failure_probability()
        ));
        report.push_str(&format!(
            "Instructions Attempted: {}\n",
            self.stats.instructions_attempted
        ));
        report.push_str(&format!(
            "Instructions Rendered: {}\n",
            self.stats.instructions_rendered
        ));
        report.push_str(&format!(
            "Rejected Before Host: {}\n",
            self.stats.rejected_before_host
        ));
        report.push_str(&format!(
            "Failed After Host Creation: {}\n",
            self.stats.failed_after_host
        ));
        report.push_str(&format!(
            "Injected Host Failures: {}\n",
            self.stats.injected_failures
        ));
        report.push_str(&format!(
            "External Edits: {} added, {} removed\n",
            self.stats.external_added, self.stats.external_removed
        ));
        report.push_str(&format!(
            "Detector: {} ticks, {} notifications\n",
            self.stats.detector_ticks, self.stats.detector_notifications
        ));
        report.push_str(&format!(
            "Clear Attempts: {} ({} elements removed)\n",
            self.stats.clear_attempts, self.stats.elements_cleared
        ));
        report.push_str(&format!("Violations: {}\n", self.violations.len()));

        if !self.violations.is_empty() {
            report.push_str("\n=== Violations ===\n");
            for (i, v) in self.violations.iter().enumerate() {
                report.push_str(&format!("{}. {:?}\n", i + 1, v));
            }
        }

        report.push_str(&format!(
            "\n=== Result: {} ===\n",
            if self.passed() { "PASS" } else { "FAIL" }
        ));

        report
    }
}

/// Run one seeded session
///
/// # Errors
/// Only for failures of the harness itself: the detector cannot start or its
/// task panics, or the snapshot file cannot be written or read back.
pub async fn run_simulator(config: SimulatorConfig) -> anyhow::Result<SimulatorReport> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut stats = SimulatorStats::default();
    let mut violations = Vec::new();

    let session = setup_session(config.engine.clone());
    tracing::info!(
        "Simulating {} instructions with seed {}",
        config.instructions,
        config.seed
    );

    let rendered = render_phase(&config, &session, &mut rng, &mut stats, &mut violations);

    let actual = session.registry.len();
    if actual != rendered.len() {
        violations.push(Violation::RegistryMismatch {
            expected: rendered.len(),
            actual,
        });
    }

    detector_phase(&config, &session, &mut rng, &mut stats, &mut violations).await?;

    if let Some(path) = &config.snapshot {
        check_snapshot(path, &session, rendered, &mut violations)?;
    }

    clear_phase(&config, &session, &mut rng, &mut stats, &mut violations);

    tracing::info!(
        "Simulation finished with {} violations",
        violations.len()
    );
    Ok(SimulatorReport {
        config,
        stats,
        violations,
    })
}

fn render_phase(
    config: &SimulatorConfig,
    session: &TestSession,
    rng: &mut StdRng,
    stats: &mut SimulatorStats,
    violations: &mut Vec<Violation>,
) -> Vec<Instruction> {
    let host = &session.host;
    let mut rendered = Vec::new();

    for _ in 0..config.instructions {
        let invalid = rng.gen_bool(INVALID_RATE);
        let instruction = if invalid {
            invalid_instruction(rng)
        } else {
            random_instruction(rng)
        };
        if !invalid && rng.gen_bool(config.failure_probability()) {
            if let Some(op) = failure_points(&instruction).choose(rng) {
                host.fail_next(*op);
                stats.injected_failures += 1;
            }
        }

        stats.instructions_attempted += 1;
        host.take_calls();
        let before = host.element_count();

        match session.renderer.render(&instruction) {
            Ok(done) => {
                stats.instructions_rendered += 1;
                if !session.registry.contains(done.handle) || !host.contains(done.handle) {
                    violations.push(Violation::UnregisteredElement {
                        instruction_id: instruction.id().to_string(),
                        handle: done.handle,
                    });
                }
                rendered.push(instruction);
            }
            Err(err) => {
                if err.before_host_creation() {
                    stats.rejected_before_host += 1;
                } else {
                    stats.failed_after_host += 1;
                }
                let leaked = host.element_count().saturating_sub(before);
                if leaked > 0 {
                    violations.push(Violation::OrphanedElement {
                        instruction_id: err.instruction_id.clone(),
                        stage: err.stage,
                        leaked,
                    });
                }
                if invalid {
                    let calls = host.calls().len();
                    if calls > 0 {
                        violations.push(Violation::HostTouchedByRejected {
                            instruction_id: err.instruction_id.clone(),
                            calls,
                        });
                    }
                }
            }
        }
        // an injected failure on a step this instruction never reached must not leak into the next
        host.clear_failures();
    }

    rendered
}

async fn detector_phase(
    config: &SimulatorConfig,
    session: &TestSession,
    rng: &mut StdRng,
    stats: &mut SimulatorStats,
    violations: &mut Vec<Violation>,
) -> anyhow::Result<()> {
    let host = &session.host;
    let pre_existing: Vec<ElementHandle> = (0..config.external_edits.max(1))
        .map(|_| host.add_external())
        .collect();

    let dyn_host: Arc<dyn HostApi> = host.clone();
    let detector =
        ChangeDetector::new(dyn_host, config.detector)?.with_registry(session.registry.clone());
    let seen_added: Arc<Mutex<BTreeSet<ElementHandle>>> = Arc::default();
    let seen_removed: Arc<Mutex<BTreeSet<ElementHandle>>> = Arc::default();
    let (added_sink, removed_sink) = (seen_added.clone(), seen_removed.clone());
    detector.subscribe_fn("simulator", move |added, removed| {
        added_sink.lock().extend(added.iter().copied());
        removed_sink.lock().extend(removed.iter().copied());
        Ok(())
    });

    let mut expected_added = BTreeSet::new();
    let mut expected_removed = BTreeSet::new();
    for handle in &pre_existing {
        if rng.gen_bool(0.5) && host.remove_external(*handle) {
            expected_removed.insert(*handle);
        }
    }
    for _ in 0..config.external_edits {
        expected_added.insert(host.add_external());
    }
    // the detector's own session keeps drawing; with ignore_owned these stay hidden
    if let Ok(done) = session.renderer.render(&random_instruction(rng)) {
        if !config.detector.ignore_owned {
            expected_added.insert(done.handle);
        }
    }
    stats.external_added = expected_added.len();
    stats.external_removed = expected_removed.len();

    let running = detector.spawn();
    tokio::time::sleep(config.detector.interval() * 2).await;
    let detector = running.stop().await?;
    stats.detector_ticks = detector.stats().ticks;
    stats.detector_notifications = detector.stats().notifications;

    let seen_added = seen_added.lock().clone();
    let seen_removed = seen_removed.lock().clone();
    if seen_added != expected_added || seen_removed != expected_removed {
        violations.push(Violation::DetectorMismatch {
            expected_added: expected_added.len(),
            seen_added: seen_added.len(),
            expected_removed: expected_removed.len(),
            seen_removed: seen_removed.len(),
        });
    }
    Ok(())
}

fn check_snapshot(
    path: &Path,
    session: &TestSession,
    rendered: Vec<Instruction>,
    violations: &mut Vec<Violation>,
) -> anyhow::Result<()> {
    let storage = FileStorage::new(path);
    let snapshot = SessionSnapshot::capture(&session.registry, rendered);
    storage.save(&snapshot)?;
    let loaded: SessionSnapshot = storage.load()?;
    if loaded.handles != snapshot.handles {
        violations.push(Violation::SnapshotMismatch {
            saved: snapshot.handles.len(),
            loaded: loaded.handles.len(),
        });
    }
    tracing::info!(
        "Session snapshot with {} handles written to {}",
        snapshot.handles.len(),
        path.display()
    );
    Ok(())
}

fn clear_phase(
    config: &SimulatorConfig,
    session: &TestSession,
    rng: &mut StdRng,
    stats: &mut SimulatorStats,
    violations: &mut Vec<Violation>,
) {
    let host = &session.host;
    let registry = &session.registry;

    let stuck = if rng.gen_bool(config.failure_probability()) {
        registry.handles().choose(rng).copied()
    } else {
        None
    };
    if let Some(handle) = stuck {
        host.set_undeletable(handle, true);
        stats.injected_failures += 1;
    }

    let mut cleared = false;
    while stats.clear_attempts < MAX_CLEAR_ATTEMPTS {
        stats.clear_attempts += 1;
        let before = registry.len();
        let outcome = registry.clear();
        stats.elements_cleared += before.saturating_sub(registry.len());
        match outcome {
            Ok(_) => {
                cleared = true;
                break;
            }
            Err(err) => {
                tracing::warn!("Clear attempt {} failed: {err}", stats.clear_attempts);
                if let Some(handle) = stuck {
                    host.set_undeletable(handle, false);
                }
            }
        }
    }

    if !cleared || !registry.is_empty() {
        violations.push(Violation::ClearIncomplete {
            remaining: registry.len(),
            attempts: stats.clear_attempts,
        });
        return;
    }

    let leftover = session
        .renderer
        .tagger()
        .owned_elements()
        .map_or(usize::MAX, |owned| owned.len());
    if leftover > 0 {
        violations.push(Violation::OwnedLeftover { count: leftover });
    }

    host.take_calls();
    let redundant = registry.clear();
    let calls = host.take_calls().len();
    if calls > 0 || !matches!(redundant, Ok(0)) {
        violations.push(Violation::RedundantClearCalledHost { calls });
    }
}

/// Host steps an instruction of this kind passes through
fn failure_points(instruction: &Instruction) -> &'static [HostOp] {
    match instruction {
        Instruction::Text(text) if text.centered => &[
            HostOp::CreateText,
            HostOp::BoundingBox,
            HostOp::Move,
            HostOp::SetAttribute,
        ],
        Instruction::Text(_) => &[HostOp::CreateText, HostOp::SetAttribute],
        Instruction::Dimension(_) => &[HostOp::CreateDimension, HostOp::SetAttribute],
        Instruction::Model(_) => &[
            HostOp::ImportModel,
            HostOp::ApplyTransform,
            HostOp::SetAttribute,
        ],
    }
}

fn random_point(rng: &mut StdRng) -> DVec3 {
    DVec3::new(
        rng.gen_range(-5000.0..5000.0),
        rng.gen_range(-5000.0..5000.0),
        rng.gen_range(-500.0..500.0),
    )
}

/// Frame in a plane parallel to world XY, rotated about its normal
fn random_frame(rng: &mut StdRng) -> Frame {
    let origin = random_point(rng);
    let angle = rng.gen_range(0.0..TAU);
    let (sin, cos) = angle.sin_cos();
    Frame::new(
        origin,
        DVec3::new(cos, sin, 0.0),
        DVec3::new(-sin, cos, 0.0),
    )
    .unwrap_or_else(|_| Frame::world_xy().with_origin(origin))
}

fn random_instruction(rng: &mut StdRng) -> Instruction {
    match rng.gen_range(0..3) {
        0 => {
            let word = WORDS.choose(rng).copied().unwrap_or("A");
            let kind = TEXT_KINDS.choose(rng).copied().unwrap_or("volume");
            TextInstruction::new(word, random_frame(rng))
                .with_size(rng.gen_range(10.0..200.0))
                .with_thickness(rng.gen_range(0.0..10.0))
                .with_geometry_kind(kind)
                .with_centered(rng.gen_bool(0.5))
                .into()
        }
        1 => {
            let side = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
            let direction = DVec3::new(0.0, side, 0.0);
            let mut x = 0.0;
            let anchors = (0..rng.gen_range(2..=4))
                .map(|_| {
                    let anchor = AnchorPoint::new(
                        DVec3::new(x, 0.0, 0.0),
                        rng.gen_range(5.0..50.0),
                        direction,
                    );
                    x += rng.gen_range(10.0..500.0);
                    anchor
                })
                .collect();
            let location = Frame::world_xy().with_origin(random_point(rng));
            DimensionInstruction::new(anchors, location).into()
        }
        _ => {
            let part = rng.gen_range(1..100);
            ModelInstruction::new(
                format!("models/part-{part}.3dm"),
                Frame::world_xy(),
                random_frame(rng),
            )
            .into()
        }
    }
}

/// Instruction the renderer must reject before touching the host
fn invalid_instruction(rng: &mut StdRng) -> Instruction {
    if rng.gen_bool(0.5) {
        TextInstruction::new("?", random_frame(rng))
            .with_geometry_kind("hologram")
            .into()
    } else {
        let single = vec![AnchorPoint::on_line(random_point(rng))];
        DimensionInstruction::new(single, Frame::world_xy()).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick(seed: u64, failure_rate: f64) -> SimulatorConfig {
        SimulatorConfig {
            seed,
            instructions: 60,
            failure_rate,
            ..SimulatorConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_run_passes() {
        let report = run_simulator(quick(7, 0.0)).await.unwrap();
        assert!(report.passed(), "{}", report.generate_text());
        assert_eq!(report.stats.instructions_attempted, 60);
        assert_eq!(report.stats.failed_after_host, 0);
        assert_eq!(report.stats.clear_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_injection_keeps_invariants() {
        for seed in [1, 2, 3, 42] {
            let report = run_simulator(quick(seed, 0.5)).await.unwrap();
            assert!(report.passed(), "{}", report.generate_text());
            assert!(report.stats.injected_failures > 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_clear_is_retried() {
        let report = run_simulator(quick(11, 1.0)).await.unwrap();
        assert!(report.passed(), "{}", report.generate_text());
        assert_eq!(report.stats.instructions_rendered, 0);
        // the detector phase leaves one owned element, stuck on the first attempt
        assert_eq!(report.stats.clear_attempts, 2);
        assert_eq!(report.stats.elements_cleared, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_seed_same_stats() {
        let a = run_simulator(quick(99, 0.3)).await.unwrap();
        let b = run_simulator(quick(99, 0.3)).await.unwrap();
        assert_eq!(a.stats.instructions_rendered, b.stats.instructions_rendered);
        assert_eq!(a.stats.injected_failures, b.stats.injected_failures);
        assert_eq!(a.stats.external_removed, b.stats.external_removed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let config = SimulatorConfig {
            snapshot: Some(path.clone()),
            ..quick(5, 0.0)
        };
        let report = run_simulator(config).await.unwrap();
        assert!(report.passed(), "{}", report.generate_text());
        let snapshot: SessionSnapshot = FileStorage::new(&path).load().unwrap();
        assert!(!snapshot.handles.is_empty());
    }

    #[test]
    fn test_report_text() {
        let report = SimulatorReport {
            config: SimulatorConfig::default(),
            stats: SimulatorStats::default(),
            violations: vec![Violation::OwnedLeftover { count: 2 }],
        };
        let text = report.generate_text();
        assert!(text.starts_with("=== Instruction Simulator Report ==="));
        assert!(text.contains("1. OwnedLeftover { count: 2 }"));
        assert!(text.ends_with("=== Result: FAIL ===\n"));
    }

    #[test]
    fn test_config_file_defaults() {
        let file = SimConfigFile::from_toml_str("[detector]\ninterval_ms = 250\n").unwrap();
        assert_eq!(file.detector.interval_ms, 250);
        assert_eq!(file.engine, EngineConfig::default());
        assert!(SimConfigFile::from_toml_str("[engine\n").is_err());
    }
}
