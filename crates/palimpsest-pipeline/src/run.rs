//! Pipeline orchestrator
//!
//! Sequences perception, restoration, judging, and the bounded refinement
//! loop, reporting progress along the way. Error policy is per stage:
//! perception and judging fail open, refinement never blocks, restoration is
//! the single hard failure. Cancellation is checked between stages only and
//! yields a distinguished outcome, never an error.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::judge::ConsistencyJudge;
use crate::perception::AtlasBuilder;
use crate::progress::{ProgressEntry, ProgressLog};
use crate::refine::SurgicalRefiner;
use crate::restoration::RestorationRenderer;
use crate::stage::{self, Stage};
use futures::future::join_all;
use palimpsest_atlas::{AtlasRegion, RegionId, RegionVerdict, SemanticAtlas, ValidationReport};
use palimpsest_imageops as imageops;
use palimpsest_transform::{ContentTransform, TransformError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use ulid::Ulid;

/// Unique run identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(pub Ulid);

impl RunId {
    /// Generate a new run id
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cancellation signal for a pipeline orchestrator
///
/// Takes effect at the next stage boundary; stages are never interrupted
/// mid-flight.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Request cancellation
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Terminal result of a run
#[derive(Debug, Clone)]
pub enum RunResult {
    /// Restored image (PNG-encoded)
    Complete(Vec<u8>),
    /// Cancellation took effect at a stage boundary
    Cancelled,
}

/// Everything a run hands back to the caller
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Run identifier
    pub run_id: RunId,
    /// Terminal result
    pub result: RunResult,
    /// Last validation report, when judging ran
    pub report: Option<ValidationReport>,
    /// Regions accepted despite still failing after the refinement budget
    pub caveats: Vec<String>,
    /// This run's progress entries; other runs on the same orchestrator are
    /// excluded
    pub log: Vec<ProgressEntry>,
}

/// Transient per-run state owned exclusively by the orchestrator
///
/// The atlas is shared-immutable once built; the attempt counters are the
/// only mutable per-run state and worker tasks never touch them. The
/// candidate artifact and the ephemeral report flow through the run loop and
/// exit via [`RunOutcome`].
#[derive(Debug)]
struct PipelineRun {
    id: RunId,
    stage: Stage,
    atlas: Option<Arc<SemanticAtlas>>,
    attempts: HashMap<RegionId, u32>,
}

impl PipelineRun {
    fn new() -> Self {
        Self {
            id: RunId::new(),
            stage: Stage::Init,
            atlas: None,
            attempts: HashMap::new(),
        }
    }

    fn advance(&mut self, to: Stage) {
        debug_assert!(
            stage::validate_transition(self.stage, to).is_ok(),
            "invalid stage transition {} -> {to}",
            self.stage
        );
        self.stage = to;
    }

    fn attempts_for(&self, id: &RegionId) -> u32 {
        self.attempts.get(id).copied().unwrap_or(0)
    }

    /// Increment a region's attempt counter, saturating at `max`
    fn record_attempt(&mut self, id: &RegionId, max: u32) {
        let count = self.attempts.entry(id.clone()).or_insert(0);
        if *count < max {
            *count += 1;
        }
    }
}

/// The pipeline orchestrator
///
/// Owns the stage components, the per-image atlas cache, the cancellation
/// flag, and the progress log. The backing transform is opaque: swapping it
/// requires no change here.
pub struct PipelineOrchestrator {
    config: PipelineConfig,
    builder: AtlasBuilder,
    renderer: RestorationRenderer,
    judge: ConsistencyJudge,
    refiner: SurgicalRefiner,
    atlas_cache: moka::future::Cache<[u8; 32], Arc<SemanticAtlas>>,
    cancel: CancelHandle,
    log: Arc<ProgressLog>,
}

impl PipelineOrchestrator {
    /// Create an orchestrator around a transform
    #[must_use]
    pub fn new(transform: Arc<dyn ContentTransform>, config: PipelineConfig) -> Self {
        let retry = config.retry;
        Self {
            builder: AtlasBuilder::new(Arc::clone(&transform), retry, config.perception_max_dim),
            renderer: RestorationRenderer::new(Arc::clone(&transform), retry),
            judge: ConsistencyJudge::new(
                Arc::clone(&transform),
                retry,
                config.similarity_threshold,
                config.critical_region_limit,
            ),
            refiner: SurgicalRefiner::new(transform, retry),
            atlas_cache: moka::future::Cache::new(config.atlas_cache_capacity),
            cancel: CancelHandle::default(),
            log: Arc::new(ProgressLog::new()),
            config,
        }
    }

    /// Handle for requesting cancellation
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Snapshot of the progress log
    #[must_use]
    pub fn progress(&self) -> Vec<ProgressEntry> {
        self.log.entries()
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the restoration pipeline over one image
    ///
    /// # Errors
    /// [`PipelineError::InvalidInput`] when the input is not an image, or
    /// [`PipelineError::Restoration`] when the rendering stage fails; every
    /// other stage degrades gracefully.
    pub async fn run(&self, image: &[u8], mime_type: &str) -> Result<RunOutcome, PipelineError> {
        let mut run = PipelineRun::new();
        self.log.append(run.id, Stage::Init, "run started");

        let original = imageops::decode(image)?;

        // PERCEIVING: advisory, never hard-fails.
        if self.cancel.is_cancelled() {
            return Ok(self.finish_cancelled(&mut run, None));
        }
        run.advance(Stage::Perceiving);
        self.log.append(run.id, Stage::Perceiving, "building semantic atlas");
        let atlas = self.atlas_for(run.id, image, mime_type).await;
        self.log.append(
            run.id,
            Stage::Perceiving,
            format!(
                "atlas ready: {} region(s), degradation {}/100",
                atlas.regions.len(),
                atlas.degradation_score
            ),
        );
        run.atlas = Some(Arc::clone(&atlas));

        // RESTORING: the single load-bearing stage.
        if self.cancel.is_cancelled() {
            return Ok(self.finish_cancelled(&mut run, None));
        }
        run.advance(Stage::Restoring);
        self.log
            .append(run.id, Stage::Restoring, "rendering restoration candidate");
        let candidate_bytes = match self
            .renderer
            .render(image, mime_type, &atlas, &self.config.render)
            .await
        {
            Ok(bytes) => bytes,
            Err(err) => {
                run.advance(Stage::Failed);
                self.log
                    .append(run.id, Stage::Failed, format!("restoration failed: {err}"));
                return Err(PipelineError::Restoration(err));
            }
        };
        let mut candidate = match imageops::decode(&candidate_bytes) {
            Ok(img) => img,
            Err(err) => {
                run.advance(Stage::Failed);
                self.log
                    .append(run.id, Stage::Failed, format!("candidate not decodable: {err}"));
                return Err(PipelineError::Restoration(TransformError::Fatal(format!(
                    "candidate not decodable: {err}"
                ))));
            }
        };

        // JUDGING: quality gate, fail-open.
        if self.cancel.is_cancelled() {
            return Ok(self.finish_cancelled(&mut run, None));
        }
        run.advance(Stage::Judging);
        self.log.append(run.id, Stage::Judging, "judging critical regions");
        let mut report = self.judge.judge(&original, &candidate, &atlas).await;
        self.log
            .append(run.id, Stage::Judging, report.global_critique.clone());

        // (REFINING <-> JUDGING)*, bounded by the pass budget. Refinement is
        // per region; only refined regions are re-judged.
        let mut pass = 0u32;
        while !report.is_consistent && pass < self.config.max_refinement_passes {
            if self.cancel.is_cancelled() {
                return Ok(self.finish_cancelled(&mut run, Some(report)));
            }

            let targets: Vec<(AtlasRegion, RegionVerdict)> = report
                .failing()
                .filter_map(|v| atlas.region(&v.region_id).map(|r| (r.clone(), v.clone())))
                .filter(|(r, _)| run.attempts_for(&r.id) < self.config.max_refinement_passes)
                .collect();
            if targets.is_empty() {
                break;
            }

            run.advance(Stage::Refining);
            pass += 1;
            self.log.append(
                run.id,
                Stage::Refining,
                format!("refinement pass {pass}: {} region(s)", targets.len()),
            );

            let corrections = join_all(targets.iter().map(|(region, verdict)| {
                let patch = imageops::crop(&candidate, &region.bbox);
                async move {
                    let corrected = self.refiner.refine(&patch, verdict, region).await;
                    (region, corrected)
                }
            }))
            .await;

            // Compositing and counter updates happen after the full join;
            // worker tasks never touch run state.
            for (region, patch) in &corrections {
                candidate = imageops::composite(&candidate, patch, &region.bbox);
                run.record_attempt(&region.id, self.config.max_refinement_passes);
            }

            run.advance(Stage::Judging);
            let refined: Vec<&AtlasRegion> = targets.iter().map(|(r, _)| r).collect();
            self.log.append(
                run.id,
                Stage::Judging,
                format!("re-judging {} refined region(s)", refined.len()),
            );
            let fresh = self.judge.judge_regions(&original, &candidate, &refined).await;
            report = report.merged_with(fresh.results);
        }

        // Budget exhaustion is a normal terminal condition, recorded as
        // caveats rather than raised as an error.
        let caveats: Vec<String> = report
            .failing()
            .map(|v| {
                format!(
                    "region {} accepted with caveat after {} refinement pass(es): {}",
                    v.region_id.as_str(),
                    run.attempts_for(&v.region_id),
                    v.reason
                )
            })
            .collect();
        for caveat in &caveats {
            self.log.append(run.id, Stage::Judging, caveat.clone());
        }

        run.advance(Stage::Complete);
        self.log.append(run.id, Stage::Complete, "run complete");

        let restored = imageops::encode_png(&candidate).map_err(|err| {
            PipelineError::Restoration(TransformError::Fatal(format!(
                "candidate encode failed: {err}"
            )))
        })?;

        Ok(RunOutcome {
            run_id: run.id,
            result: RunResult::Complete(restored),
            report: Some(report),
            caveats,
            log: self.log.entries_for(run.id),
        })
    }

    /// Fetch or build the atlas for these exact input bytes
    ///
    /// Repeated runs over the same bytes reuse the cached atlas; concurrent
    /// builds for one digest are coalesced.
    async fn atlas_for(&self, run_id: RunId, image: &[u8], mime_type: &str) -> Arc<SemanticAtlas> {
        let digest: [u8; 32] = Sha256::digest(image).into();
        self.atlas_cache
            .get_with(digest, async {
                let outcome = self.builder.build(image, mime_type).await;
                if let Some(note) = &outcome.note {
                    self.log
                        .append(run_id, Stage::Perceiving, format!("perception degraded: {note}"));
                }
                Arc::new(outcome.atlas)
            })
            .await
    }

    fn finish_cancelled(
        &self,
        run: &mut PipelineRun,
        report: Option<ValidationReport>,
    ) -> RunOutcome {
        run.advance(Stage::Cancelled);
        self.log
            .append(run.id, Stage::Cancelled, "run cancelled at stage boundary");
        RunOutcome {
            run_id: run.id,
            result: RunResult::Cancelled,
            report,
            caveats: Vec::new(),
            log: self.log.entries_for(run.id),
        }
    }
}
