//! Async audit runner.
//!
//! Loads the staged relations, evaluates the audit chain and the service
//! growth pipeline side by side on blocking workers, then writes the
//! snapshot.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use audit_core::error::{AuditError, Result};
use audit_core::pricing::DiscountPolicy;
use audit_core::settings::Settings;
use audit_core::time_utils::generate_run_id;
use audit_data::analysis::{evaluate_audit, evaluate_growth, AuditResult, InputCounts, StageTimings};
use audit_data::reader::{load_snapshot, resolve_inputs, StagedInputs};
use chrono::Utc;
use tokio::task::{self, JoinError};
use tracing::info;

use crate::snapshot::SnapshotWriter;

// ── Public types ──────────────────────────────────────────────────────────────

/// What a completed run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub snapshot_dir: PathBuf,
    pub result: AuditResult,
}

// ── AuditRunner ───────────────────────────────────────────────────────────────

pub struct AuditRunner {
    inputs: StagedInputs,
    policy: DiscountPolicy,
    writer: SnapshotWriter,
}

impl AuditRunner {
    pub fn new(inputs: StagedInputs, policy: DiscountPolicy, writer: SnapshotWriter) -> Self {
        Self {
            inputs,
            policy,
            writer,
        }
    }

    /// Build a runner from merged CLI/config settings, resolving the staged
    /// input paths.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let inputs = resolve_inputs(
            settings.staging_dir.as_deref(),
            settings.usage_file.as_deref(),
            settings.prices_file.as_deref(),
            settings.unit_factors_file.as_deref(),
        )?;
        let writer = SnapshotWriter::new(
            settings.output_dir.clone(),
            settings.output_format(),
            settings.materialize_joined,
        );
        Ok(Self::new(inputs, settings.policy.clone(), writer))
    }

    pub fn inputs(&self) -> &StagedInputs {
        &self.inputs
    }

    /// Evaluate both pipelines without writing anything.
    ///
    /// Inputs are loaded and checked first; a missing, malformed or empty
    /// relation fails the run before either pipeline starts.
    pub async fn evaluate(&self) -> Result<AuditResult> {
        let load_start = Instant::now();
        let inputs = self.inputs.clone();
        let snapshot = task::spawn_blocking(move || load_snapshot(&inputs))
            .await
            .map_err(join_error)??;
        let load_time = load_start.elapsed().as_secs_f64();
        let counts = InputCounts::of(&snapshot);

        let snapshot = Arc::new(snapshot);
        let policy = self.policy.clone();

        let audit_snapshot = Arc::clone(&snapshot);
        let audit_task = task::spawn_blocking(move || {
            let start = Instant::now();
            let output = evaluate_audit(
                &audit_snapshot.usage,
                &audit_snapshot.prices,
                &audit_snapshot.unit_factors,
                &policy,
            );
            (output, start.elapsed().as_secs_f64())
        });

        let growth_snapshot = Arc::clone(&snapshot);
        let growth_task = task::spawn_blocking(move || {
            let start = Instant::now();
            let rows = evaluate_growth(&growth_snapshot.usage);
            (rows, start.elapsed().as_secs_f64())
        });

        let ((audit, audit_time), (growth, growth_time)) =
            tokio::try_join!(audit_task, growth_task).map_err(join_error)?;

        Ok(AuditResult::assemble(
            self.inputs.clone(),
            counts,
            audit,
            growth,
            StageTimings {
                load_time_seconds: load_time,
                audit_time_seconds: audit_time,
                growth_time_seconds: growth_time,
            },
        ))
    }

    /// Evaluate and write snapshot `run_id`, or a timestamped one when `None`.
    pub async fn run(&self, run_id: Option<String>) -> Result<RunOutcome> {
        let run_id = run_id.unwrap_or_else(|| generate_run_id(Utc::now()));
        info!(%run_id, "starting audit run");

        let result = self.evaluate().await?;

        let writer = self.writer.clone();
        let policy = self.policy.clone();
        let id = run_id.clone();
        let (snapshot_dir, result) = task::spawn_blocking(move || {
            writer
                .write(&id, &result, &policy)
                .map(|dir| (dir, result))
        })
        .await
        .map_err(join_error)??;

        info!(
            %run_id,
            cost_audit = result.metadata.cost_audit_rows,
            needs_review = result.metadata.needs_review_rows,
            service_growth = result.metadata.service_growth_rows,
            "audit run complete"
        );

        Ok(RunOutcome {
            run_id,
            snapshot_dir,
            result,
        })
    }
}

fn join_error(e: JoinError) -> AuditError {
    AuditError::Other(anyhow::Error::new(e).context("audit worker task failed"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
