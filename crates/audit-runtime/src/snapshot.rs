//! Versioned output snapshots.
//!
//! A run writes `<output>/<run_id>/` holding `cost_audit`, `service_growth`,
//! optionally `joined_cost`, and `manifest.json`. Everything is written into a
//! hidden sibling directory first and renamed into place, so a snapshot is
//! either complete or absent.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use audit_core::error::{AuditError, Result};
use audit_core::pricing::DiscountPolicy;
use audit_core::settings::OutputFormat;
use audit_core::time_utils::is_valid_run_id;
use audit_data::analysis::{AuditMetadata, AuditResult};
use audit_data::reader::StagedInputs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const COST_AUDIT_RELATION: &str = "cost_audit";
pub const SERVICE_GROWTH_RELATION: &str = "service_growth";
pub const JOINED_COST_RELATION: &str = "joined_cost";

// ── RunManifest ───────────────────────────────────────────────────────────────

/// Description of one snapshot, written as `manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    pub format: OutputFormat,
    pub inputs: StagedInputs,
    /// File names of the relations in the snapshot, manifest excluded.
    pub files: Vec<String>,
    pub policy: DiscountPolicy,
    pub metadata: AuditMetadata,
}

impl RunManifest {
    pub fn load(snapshot_dir: &Path) -> Result<Self> {
        let path = snapshot_dir.join(MANIFEST_FILE);
        let content = fs::read_to_string(&path).map_err(|source| AuditError::FileRead {
            path: path.clone(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

// ── SnapshotWriter ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    output_dir: PathBuf,
    format: OutputFormat,
    materialize_joined: bool,
}

impl SnapshotWriter {
    pub fn new(output_dir: impl Into<PathBuf>, format: OutputFormat, materialize_joined: bool) -> Self {
        Self {
            output_dir: output_dir.into(),
            format,
            materialize_joined,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write `result` as snapshot `run_id`, replacing any snapshot with the
    /// same id. Returns the snapshot directory.
    pub fn write(&self, run_id: &str, result: &AuditResult, policy: &DiscountPolicy) -> Result<PathBuf> {
        if !is_valid_run_id(run_id) {
            return Err(AuditError::Snapshot(format!("invalid run id: {run_id:?}")));
        }

        fs::create_dir_all(&self.output_dir).map_err(|source| AuditError::FileWrite {
            path: self.output_dir.clone(),
            source,
        })?;

        let target = self.output_dir.join(run_id);
        let staging = self
            .output_dir
            .join(format!(".{run_id}.tmp-{}", std::process::id()));

        if staging.exists() {
            remove_dir(&staging)?;
        }
        fs::create_dir(&staging).map_err(|source| AuditError::FileWrite {
            path: staging.clone(),
            source,
        })?;

        if let Err(e) = self.write_contents(&staging, run_id, result, policy) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        // Full overwrite: the previous snapshot with this id goes away whole.
        if target.exists() {
            remove_dir(&target)?;
        }
        fs::rename(&staging, &target).map_err(|source| AuditError::FileWrite {
            path: target.clone(),
            source,
        })?;

        info!(snapshot = %target.display(), "snapshot written");
        Ok(target)
    }

    fn write_contents(
        &self,
        dir: &Path,
        run_id: &str,
        result: &AuditResult,
        policy: &DiscountPolicy,
    ) -> Result<()> {
        let mut files = Vec::new();

        files.push(self.write_relation(dir, COST_AUDIT_RELATION, &result.cost_audit)?);
        files.push(self.write_relation(dir, SERVICE_GROWTH_RELATION, &result.service_growth)?);
        if self.materialize_joined {
            files.push(self.write_relation(dir, JOINED_COST_RELATION, &result.joined)?);
        }

        let manifest = RunManifest {
            run_id: run_id.to_string(),
            format: self.format,
            inputs: result.inputs.clone(),
            files,
            policy: policy.clone(),
            metadata: result.metadata.clone(),
        };
        let path = dir.join(MANIFEST_FILE);
        let content = serde_json::to_string_pretty(&manifest)?;
        fs::write(&path, content).map_err(|source| AuditError::FileWrite { path, source })?;
        Ok(())
    }

    /// Write one relation and return its file name.
    fn write_relation<T: Serialize>(&self, dir: &Path, relation: &str, rows: &[T]) -> Result<String> {
        let file_name = format!("{relation}.{}", self.format.extension());
        let path = dir.join(&file_name);
        let file = fs::File::create(&path).map_err(|source| AuditError::FileWrite {
            path: path.clone(),
            source,
        })?;

        match self.format {
            OutputFormat::Csv => write_csv(file, rows)?,
            OutputFormat::Json => {
                let mut writer = BufWriter::new(file);
                serde_json::to_writer_pretty(&mut writer, rows)?;
                writer
                    .flush()
                    .map_err(|source| AuditError::FileWrite { path, source })?;
            }
        }

        debug!("Wrote {} {} rows", rows.len(), relation);
        Ok(file_name)
    }
}

fn write_csv<T: Serialize>(file: fs::File, rows: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(BufWriter::new(file));
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn remove_dir(path: &Path) -> Result<()> {
    fs::remove_dir_all(path).map_err(|source| AuditError::FileWrite {
        path: path.to_path_buf(),
        source,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
