//! Weight snapshots and the on-disk model store.
//!
//! A snapshot is one document with four named matrices (`W1`, `W2`, `B1`,
//! `B2`), each stored as `{rows, cols, values}` with row-major values. A
//! missing file means "no saved model"; a file that cannot be decoded or whose
//! shapes do not fit the network is an error the caller may recover from by
//! keeping its freshly initialized weights.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::debug::numerical_check::check_tensors;
use crate::error::{ReinforceError, Result};
use crate::network::QWeights;
use crate::tensor::Mat;

/// Serialized form of one tensor (values only, gradients are never saved).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatSnapshot {
    pub rows: usize,
    pub cols: usize,
    pub values: Vec<f64>,
}

impl MatSnapshot {
    pub fn from_mat(mat: &Mat) -> Self {
        MatSnapshot {
            rows: mat.rows(),
            cols: mat.cols(),
            values: mat.to_vec(),
        }
    }

    pub fn into_mat(self, name: &str) -> Result<Mat> {
        let expected = self.rows.checked_mul(self.cols).ok_or_else(|| {
            ReinforceError::InvalidSnapshot(format!(
                "{} declares {}x{}, which overflows",
                name, self.rows, self.cols
            ))
        })?;
        if self.values.len() != expected {
            return Err(ReinforceError::InvalidSnapshot(format!(
                "{} declares {}x{} but holds {} values",
                name,
                self.rows,
                self.cols,
                self.values.len()
            )));
        }
        Ok(Mat::from_vec(self.rows, self.cols, self.values))
    }
}

/// The four Q-network matrices.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightSnapshot {
    #[serde(rename = "W1")]
    pub w1: MatSnapshot,
    #[serde(rename = "W2")]
    pub w2: MatSnapshot,
    #[serde(rename = "B1")]
    pub b1: MatSnapshot,
    #[serde(rename = "B2")]
    pub b2: MatSnapshot,
}

impl WeightSnapshot {
    pub fn into_weights(self) -> Result<QWeights> {
        let weights = QWeights::from_parts(
            self.w1.into_mat("W1")?,
            self.b1.into_mat("B1")?,
            self.w2.into_mat("W2")?,
            self.b2.into_mat("B2")?,
        )
        .ok_or_else(|| ReinforceError::InvalidSnapshot("matrix shapes are inconsistent".to_string()))?;

        let issues = check_tensors(&weights);
        if !issues.is_empty() {
            return Err(ReinforceError::InvalidSnapshot(format!(
                "non-finite weights: {:?}",
                issues
            )));
        }
        Ok(weights)
    }
}

impl QWeights {
    pub fn snapshot(&self) -> WeightSnapshot {
        WeightSnapshot {
            w1: MatSnapshot::from_mat(&self.w1),
            w2: MatSnapshot::from_mat(&self.w2),
            b1: MatSnapshot::from_mat(&self.b1),
            b2: MatSnapshot::from_mat(&self.b2),
        }
    }

    pub fn from_snapshot(snapshot: WeightSnapshot) -> Result<Self> {
        snapshot.into_weights()
    }
}

/// On-disk encoding of a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotFormat {
    Json,
    Bincode,
}

impl SnapshotFormat {
    /// `.json` files are JSON, anything else is bincode.
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => SnapshotFormat::Json,
            _ => SnapshotFormat::Bincode,
        }
    }

    pub fn encode(&self, snapshot: &WeightSnapshot) -> Result<Vec<u8>> {
        match self {
            SnapshotFormat::Json => Ok(serde_json::to_vec_pretty(snapshot)?),
            SnapshotFormat::Bincode => Ok(bincode::serialize(snapshot)?),
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<WeightSnapshot> {
        match self {
            SnapshotFormat::Json => Ok(serde_json::from_slice(bytes)?),
            SnapshotFormat::Bincode => Ok(bincode::deserialize(bytes)?),
        }
    }
}

/// A single snapshot file.
#[derive(Clone, Debug)]
pub struct ModelStore {
    path: PathBuf,
    format: SnapshotFormat,
}

impl ModelStore {
    /// Format is picked from the file extension.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        let format = SnapshotFormat::for_path(&path);
        ModelStore { path, format }
    }

    pub fn with_format<P: Into<PathBuf>>(path: P, format: SnapshotFormat) -> Self {
        ModelStore {
            path: path.into(),
            format,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> SnapshotFormat {
        self.format
    }

    /// Write the snapshot next to the target and rename it into place, so a
    /// crash mid-write never leaves a truncated model behind.
    pub fn save(&self, weights: &QWeights) -> Result<()> {
        let bytes = self.format.encode(&weights.snapshot())?;
        let tmp = self.path.with_extension("partial");
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        log::info!("saved Q-network weights to {}", self.path.display());
        Ok(())
    }

    /// `Ok(None)` when nothing has been saved yet.
    pub fn load(&self) -> Result<Option<QWeights>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.path)?;
        let weights = self.format.decode(&bytes)?.into_weights()?;
        log::info!("loaded Q-network weights from {}", self.path.display());
        Ok(Some(weights))
    }

    /// Load weights that fit a `states -> hidden -> actions` network.
    ///
    /// Every failure is logged and reported as `None`, so callers simply keep
    /// their random initialization.
    pub fn load_compatible(
        &self,
        num_states: usize,
        num_actions: usize,
        hidden_units: usize,
    ) -> Option<QWeights> {
        match self.load() {
            Ok(Some(weights)) => {
                let shape = (weights.num_states(), weights.num_actions(), weights.hidden_units());
                if shape == (num_states, num_actions, hidden_units) {
                    Some(weights)
                } else {
                    log::warn!(
                        "ignoring saved model at {}: topology {:?} does not match {:?}",
                        self.path.display(),
                        shape,
                        (num_states, num_actions, hidden_units)
                    );
                    None
                }
            }
            Ok(None) => {
                log::debug!("no saved model at {}", self.path.display());
                None
            }
            Err(e) => {
                log::warn!("ignoring unreadable model at {}: {}", self.path.display(), e);
                None
            }
        }
    }
}
