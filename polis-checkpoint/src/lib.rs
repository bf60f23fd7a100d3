#![deny(missing_docs)]
//! Filesystem checkpoint store for polis runs.
//!
//! Directory layout, exclusively owned by the run:
//!
//! ```text
//! output/
//!   {run_id}/
//!     checkpoints/
//!       last.json         (overwritten every turn)
//!       turn_{N}.json     (interval + final, immutable)
//!     result.json         (written at simulation end)
//! ```
//!
//! Every write is atomic: serialize, write `{target}.tmp`, flush +
//! fsync, rename over `{target}`. A failed save is fatal to the run
//! and leaves the previous `last.json` intact; at worst an orphaned
//! `.tmp` remains, which the next `create` for the directory sweeps.

use chrono::{DateTime, Utc};
use polis_core::checkpoint::{Checkpoint, CheckpointKind, SimulationResults};
use polis_core::error::CheckpointError;
use polis_core::state::StateSnapshot;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Subdirectory holding per-turn snapshots.
const CHECKPOINTS_DIR: &str = "checkpoints";
/// Highest run-id sequence number per prefix.
const MAX_RUN_SEQ: u32 = 99;

/// Where checkpoint timestamps come from. The determinism harness
/// fixes them so two identical runs produce identical bytes.
#[derive(Debug, Clone, Copy)]
pub enum Clock {
    /// Wall clock.
    System,
    /// A pinned instant, for reproducible test output.
    Fixed(DateTime<Utc>),
}

impl Clock {
    fn now(self) -> DateTime<Utc> {
        match self {
            Self::System => Utc::now(),
            Self::Fixed(instant) => instant,
        }
    }
}

/// The per-run checkpoint store.
pub struct CheckpointStore {
    run_id: String,
    run_dir: PathBuf,
    interval: Option<u64>,
    schema_fingerprint: String,
    clock: Clock,
}

/// Replace `/` and whitespace so a simulation name is a safe path
/// component.
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c == '/' || c.is_whitespace() { '_' } else { c })
        .collect()
}

impl CheckpointStore {
    /// Allocate a fresh run directory under `output_root`.
    ///
    /// Run ids follow `{name}_{N}agents_{YYYYMMDD}_{HHMMSS}_{seq:02}`
    /// with `seq` starting at `01` and advancing past existing
    /// directories; the space is capped at 99 per prefix.
    pub fn create(
        output_root: &Path,
        name: &str,
        num_agents: usize,
        interval: Option<u64>,
        schema_fingerprint: String,
    ) -> Result<Self, CheckpointError> {
        Self::create_with_clock(
            output_root,
            name,
            num_agents,
            interval,
            schema_fingerprint,
            Clock::System,
        )
    }

    /// [`CheckpointStore::create`] with an explicit clock. The clock
    /// stamps both the run id and every checkpoint envelope.
    pub fn create_with_clock(
        output_root: &Path,
        name: &str,
        num_agents: usize,
        interval: Option<u64>,
        schema_fingerprint: String,
        clock: Clock,
    ) -> Result<Self, CheckpointError> {
        let prefix = format!(
            "{}_{num_agents}agents_{}",
            sanitize_name(name),
            clock.now().format("%Y%m%d_%H%M%S"),
        );

        let map_io = |path: &Path, e: std::io::Error| CheckpointError::Save {
            path: path.display().to_string(),
            message: e.to_string(),
        };
        std::fs::create_dir_all(output_root).map_err(|e| map_io(output_root, e))?;

        for seq in 1..=MAX_RUN_SEQ {
            let run_id = format!("{prefix}_{seq:02}");
            let run_dir = output_root.join(&run_id);
            match std::fs::create_dir(&run_dir) {
                Ok(()) => {
                    let checkpoints = run_dir.join(CHECKPOINTS_DIR);
                    std::fs::create_dir_all(&checkpoints)
                        .map_err(|e| map_io(&checkpoints, e))?;
                    sweep_orphans(&checkpoints);
                    info!(run_id = %run_id, dir = %run_dir.display(), "run directory allocated");
                    return Ok(Self {
                        run_id,
                        run_dir,
                        interval,
                        schema_fingerprint,
                        clock,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(map_io(&run_dir, e)),
            }
        }
        Err(CheckpointError::RunIdExhausted { prefix })
    }

    /// The allocated run id.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// The run directory (`output/{run_id}`).
    #[must_use]
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Whether turn `turn` gets an immutable `turn_{N}.json`.
    /// `last.json` is written every turn regardless of this policy.
    #[must_use]
    pub fn should_save(&self, turn: u64, is_final: bool) -> bool {
        is_final
            || self
                .interval
                .is_some_and(|interval| turn > 0 && turn % interval == 0)
    }

    /// Persist a snapshot. `Last` overwrites `last.json`; `Interval`
    /// and `Final` write the immutable `turn_{N}.json`.
    pub async fn save(
        &self,
        snapshot: &StateSnapshot,
        kind: CheckpointKind,
    ) -> Result<(), CheckpointError> {
        let checkpoint = Checkpoint {
            turn: snapshot.turn,
            checkpoint_type: kind,
            timestamp: self.clock.now(),
            schema_fingerprint: self.schema_fingerprint.clone(),
            state: snapshot.clone(),
        };
        let path = self.checkpoint_path(match kind {
            CheckpointKind::Last => None,
            CheckpointKind::Interval | CheckpointKind::Final => Some(snapshot.turn),
        });
        let bytes = serde_json::to_vec_pretty(&checkpoint).map_err(|e| CheckpointError::Save {
            path: path.display().to_string(),
            message: format!("serialization: {e}"),
        })?;
        atomic_write(&path, &bytes).await?;
        debug!(turn = snapshot.turn, kind = ?kind, path = %path.display(), "checkpoint written");
        Ok(())
    }

    /// Write `result.json`.
    pub async fn write_result(&self, results: &SimulationResults) -> Result<(), CheckpointError> {
        let path = self.run_dir.join("result.json");
        let bytes = serde_json::to_vec_pretty(results).map_err(|e| CheckpointError::Save {
            path: path.display().to_string(),
            message: format!("serialization: {e}"),
        })?;
        atomic_write(&path, &bytes).await
    }

    /// Turns with an immutable checkpoint on disk, sorted ascending.
    pub fn checkpoint_turns(&self) -> Vec<u64> {
        let dir = self.run_dir.join(CHECKPOINTS_DIR);
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return Vec::new();
        };
        let mut turns: Vec<u64> = entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name();
                let name = name.to_str()?;
                name.strip_prefix("turn_")?
                    .strip_suffix(".json")?
                    .parse()
                    .ok()
            })
            .collect();
        turns.sort_unstable();
        turns
    }

    /// Load a checkpoint from an existing run directory. `turn =
    /// None` reads `last.json`. The stored fingerprint must equal
    /// `expected_fingerprint` — there is no migration across schemas.
    pub async fn load(
        output_root: &Path,
        run_id: &str,
        turn: Option<u64>,
        expected_fingerprint: &str,
    ) -> Result<Checkpoint, CheckpointError> {
        let path = output_root
            .join(run_id)
            .join(CHECKPOINTS_DIR)
            .join(match turn {
                Some(n) => format!("turn_{n}.json"),
                None => "last.json".to_owned(),
            });

        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CheckpointError::Missing {
                    path: path.display().to_string(),
                    hint: "check the run id and turn number; only interval and final turns \
                           have a turn_{N}.json, others resume from last.json"
                        .to_owned(),
                });
            }
            Err(e) => {
                return Err(CheckpointError::Corrupt {
                    path: path.display().to_string(),
                    message: e.to_string(),
                });
            }
        };
        let checkpoint: Checkpoint =
            serde_json::from_str(&text).map_err(|e| CheckpointError::Corrupt {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        if checkpoint.schema_fingerprint != expected_fingerprint {
            return Err(CheckpointError::FingerprintMismatch {
                expected: expected_fingerprint.to_owned(),
                found: checkpoint.schema_fingerprint,
            });
        }
        Ok(checkpoint)
    }

    fn checkpoint_path(&self, turn: Option<u64>) -> PathBuf {
        self.run_dir.join(CHECKPOINTS_DIR).join(match turn {
            Some(n) => format!("turn_{n}.json"),
            None => "last.json".to_owned(),
        })
    }
}

/// Write `bytes` to `target` atomically: temp file, flush, fsync,
/// rename-replace.
async fn atomic_write(target: &Path, bytes: &[u8]) -> Result<(), CheckpointError> {
    let save_err = |message: String| CheckpointError::Save {
        path: target.display().to_string(),
        message,
    };
    let tmp = target.with_extension("json.tmp");

    let result: std::io::Result<()> = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, target).await
    }
    .await;

    if let Err(e) = result {
        // Best effort: don't leave the temp file behind on failure.
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(save_err(e.to_string()));
    }
    Ok(())
}

/// Remove `.tmp` orphans left by a crash mid-save.
fn sweep_orphans(dir: &Path) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        if entry.path().extension().is_some_and(|ext| ext == "tmp") {
            let _ = std::fs::remove_file(entry.path());
        }
    }
}
