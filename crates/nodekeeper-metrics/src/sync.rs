//! Sync-stage percentages parsed from execution client logs
//!
//! Geth progress is mirrored into `progressMonitor.json` so it survives a
//! dashboard restart. Reth and Nethermind are tracked in memory only.

use nodekeeper_core::fail_open::fail_open_sync;
use nodekeeper_core::{ClientKind, NodeError, Result, SyncSource};
use regex::Regex;
use std::path::PathBuf;
use tracing::debug;

use crate::progress::{clamp_fraction, Progress};

struct Patterns {
    synced_percent: Regex,
    downloaded_left: Regex,
    stage: Regex,
    stage_progress: Regex,
    checkpoint_target: Regex,
    ratio: Regex,
    percent: Regex,
}

impl Patterns {
    fn compile() -> Result<Self> {
        let re = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| NodeError::Metrics(format!("bad sync pattern {}: {}", pattern, e)))
        };
        Ok(Self {
            synced_percent: re(r"synced=(\d+(?:\.\d+)?)%")?,
            downloaded_left: re(r"downloaded=([\d,]+)\s+left=([\d,]+)")?,
            stage: re(r"\bstage=(\w+)")?,
            stage_progress: re(r"stage_progress=(\d+(?:\.\d+)?)%")?,
            checkpoint_target: re(r"checkpoint=(\d+)\s+target=(\d+)")?,
            ratio: re(r"([\d,]+)\s*/\s*([\d,]+)")?,
            percent: re(r"(\d+(?:\.\d+)?)\s*%")?,
        })
    }
}

/// Tracks ordered stage completions for one execution client
pub struct SyncTracker {
    kind: ClientKind,
    stages: Vec<f64>,
    progress_file: Option<PathBuf>,
    patterns: Patterns,
}

impl SyncTracker {
    /// For geth, `progress_file` is loaded now and rewritten on every change
    pub fn new(kind: ClientKind, progress_file: Option<PathBuf>) -> Result<Self> {
        let mut stages = vec![0.0; kind.stage_names().len()];

        if kind.sync_source() == SyncSource::ProgressFile {
            if let Some(path) = &progress_file {
                if let Some(progress) = fail_open_sync("load sync progress", || Progress::load(path))
                {
                    stages = progress.stages();
                }
            }
        }

        Ok(Self {
            kind,
            stages,
            progress_file,
            patterns: Patterns::compile()?,
        })
    }

    pub fn kind(&self) -> ClientKind {
        self.kind
    }

    pub fn stage_names(&self) -> &'static [&'static str] {
        self.kind.stage_names()
    }

    /// Current completions, one per stage name, each in `[0, 1]`
    pub fn stages(&self) -> Vec<f64> {
        self.stages.clone()
    }

    /// Feed one log line; returns whether any stage changed
    pub fn observe(&mut self, line: &str) -> bool {
        let updates = match self.kind {
            ClientKind::Geth => self.geth_updates(line),
            ClientKind::Reth => self.reth_updates(line),
            ClientKind::Nethermind => self.nethermind_updates(line),
            ClientKind::Prysm | ClientKind::Lighthouse => Vec::new(),
        };

        let mut changed = false;
        for (index, value) in updates {
            let Some(slot) = self.stages.get_mut(index) else {
                continue;
            };
            let value = clamp_fraction(value);
            if *slot != value {
                *slot = value;
                changed = true;
            }
        }

        if changed {
            debug!(client = %self.kind, stages = ?self.stages, "Sync progress updated");
            if self.kind.sync_source() == SyncSource::ProgressFile {
                self.persist();
            }
        }
        changed
    }

    fn persist(&self) {
        let Some(path) = &self.progress_file else {
            return;
        };
        let progress = Progress {
            header_dl_progress: self.stages.first().copied().unwrap_or_default(),
            chain_dl_progress: self.stages.get(1).copied().unwrap_or_default(),
            state_dl_progress: self.stages.get(2).copied().unwrap_or_default(),
        };
        fail_open_sync("save sync progress", || progress.save(path));
    }

    fn geth_updates(&self, line: &str) -> Vec<(usize, f64)> {
        if line.contains("Imported new potential chain segment") {
            return vec![(0, 1.0), (1, 1.0), (2, 1.0)];
        }
        if line.contains("chain download in progress") {
            if let Some(value) = capture_percent(&self.patterns.synced_percent, line) {
                return vec![(1, value)];
            }
        }
        if line.contains("state download in progress") {
            if let Some(value) = capture_percent(&self.patterns.synced_percent, line) {
                return vec![(2, value)];
            }
        }
        if line.contains("headers") {
            if let Some(caps) = self.patterns.downloaded_left.captures(line) {
                let done = parse_count(&caps[1]);
                let left = parse_count(&caps[2]);
                if let (Some(done), Some(left)) = (done, left) {
                    if done + left > 0.0 {
                        return vec![(0, done / (done + left))];
                    }
                }
            }
        }
        Vec::new()
    }

    fn reth_updates(&self, line: &str) -> Vec<(usize, f64)> {
        let Some(caps) = self.patterns.stage.captures(line) else {
            return Vec::new();
        };
        let Some(index) = reth_stage_index(&caps[1]) else {
            return Vec::new();
        };

        let value = if line.contains("Finished stage") {
            Some(1.0)
        } else if let Some(value) = capture_percent(&self.patterns.stage_progress, line) {
            Some(value)
        } else {
            self.patterns.checkpoint_target.captures(line).and_then(|caps| {
                let checkpoint: f64 = caps[1].parse().ok()?;
                let target: f64 = caps[2].parse().ok()?;
                (target > 0.0).then(|| checkpoint / target)
            })
        };

        let Some(value) = value else {
            return Vec::new();
        };
        // Stages run in order; everything before the active one is done
        let mut updates: Vec<(usize, f64)> = (0..index).map(|i| (i, 1.0)).collect();
        updates.push((index, value));
        updates
    }

    fn nethermind_updates(&self, line: &str) -> Vec<(usize, f64)> {
        if line.contains("State Sync") {
            return capture_percent(&self.patterns.percent, line)
                .map(|value| vec![(0, 1.0), (1, 1.0), (2, value)])
                .unwrap_or_default();
        }

        let index = if line.contains("Headers") {
            0
        } else if line.contains("Bodies") {
            1
        } else {
            return Vec::new();
        };

        self.patterns
            .ratio
            .captures(line)
            .and_then(|caps| {
                let done = parse_count(&caps[1])?;
                let total = parse_count(&caps[2])?;
                (total > 0.0).then(|| vec![(index, done / total)])
            })
            .unwrap_or_default()
    }
}

fn capture_percent(pattern: &Regex, line: &str) -> Option<f64> {
    let caps = pattern.captures(line)?;
    let value: f64 = caps[1].parse().ok()?;
    Some(value / 100.0)
}

fn parse_count(raw: &str) -> Option<f64> {
    raw.replace(',', "").parse().ok()
}

fn reth_stage_index(stage: &str) -> Option<usize> {
    let index = match stage {
        "Headers" => 0,
        "Bodies" => 1,
        "SenderRecovery" => 2,
        "Execution" => 3,
        "MerkleUnwind" | "AccountHashing" | "StorageHashing" | "MerkleExecute" | "Merkle" => 4,
        "TransactionLookup" => 5,
        "IndexStorageHistory" | "IndexAccountHistory" => 6,
        _ => return None,
    };
    Some(index)
}
