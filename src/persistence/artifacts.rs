//! Append-only artifact logs.
//!
//! One JSONL file per artifact kind per UTC date; every line carries the
//! `snapshot_id` it belongs to. Nothing is ever rewritten, so a cycle's
//! artifacts can be replayed or audited after the fact. Write failures are
//! the caller's problem to log, never to abort a cycle over.

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Snapshot,
    /// Per-timeframe indicator frame plus the live candle; the frame's
    /// price columns double as the raw kline record
    Frame,
    Features,
    Quant,
    Prediction,
    Decision,
    RiskAudit,
    Execution,
}

impl ArtifactKind {
    pub fn file_stem(&self) -> &'static str {
        match self {
            ArtifactKind::Snapshot => "snapshots",
            ArtifactKind::Frame => "frames",
            ArtifactKind::Features => "features",
            ArtifactKind::Quant => "quant",
            ArtifactKind::Prediction => "predictions",
            ArtifactKind::Decision => "decisions",
            ArtifactKind::RiskAudit => "risk_audits",
            ArtifactKind::Execution => "executions",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Append one artifact line keyed by `snapshot_id`.
    pub fn append<T: Serialize>(
        &self,
        kind: ArtifactKind,
        snapshot_id: &str,
        data: &T,
    ) -> Result<()> {
        let now = Utc::now();
        let dir = self.root.join(now.format("%Y-%m-%d").to_string());
        std::fs::create_dir_all(&dir)?;

        let line = json!({
            "snapshot_id": snapshot_id,
            "recorded_at": now.to_rfc3339(),
            "data": data,
        });

        let path = dir.join(format!("{}.jsonl", kind.file_stem()));
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}
