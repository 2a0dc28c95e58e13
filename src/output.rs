//! Per-run result tables and their CSV files
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ndarray::{Array2, ArrayView1};

use crate::covariance_pack::pack_covariance;
use crate::types::{StateMat15, StateVec15, PACKED_COV_LEN_15, STATE_DIM_15};

pub const STATE_FILE: &str = "stateEstimate.csv";
pub const COVARIANCE_FILE: &str = "covariance.csv";
pub const TIME_FILE: &str = "systemTime_us.csv";
pub const MEASUREMENT_FILE: &str = "measurementAvail.csv";

/// One row per processed sample
#[derive(Clone, Debug)]
pub struct RunLog {
    pub states: Array2<f64>,
    pub covariances: Array2<f64>,
    pub timestamps_us: Vec<u64>,
    pub measurement_available: Vec<bool>,
}

impl Default for RunLog {
    fn default() -> Self {
        Self::new()
    }
}

impl RunLog {
    pub fn new() -> Self {
        Self {
            states: Array2::zeros((0, STATE_DIM_15)),
            covariances: Array2::zeros((0, PACKED_COV_LEN_15)),
            timestamps_us: Vec::new(),
            measurement_available: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps_us.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps_us.is_empty()
    }

    /// Append the filter output for one sample.
    pub fn record(
        &mut self,
        timestamp_us: u64,
        state: &StateVec15,
        covariance: &StateMat15,
        measurement_available: bool,
    ) -> Result<()> {
        self.states
            .push_row(ArrayView1::from(state.as_slice()))
            .context("state row has wrong width")?;
        let packed = pack_covariance(covariance)?;
        self.covariances
            .push_row(packed.view())
            .context("packed covariance row has wrong width")?;
        self.timestamps_us.push(timestamp_us);
        self.measurement_available.push(measurement_available);
        Ok(())
    }

    /// Write all four tables into `dir`.
    ///
    /// Files are staged under temporary names and renamed only once every
    /// table has been written, so a failure leaves no partial artifacts.
    pub fn write_dir(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let staged = [
            (STATE_FILE, write_table(dir, STATE_FILE, &self.states)),
            (
                COVARIANCE_FILE,
                write_table(dir, COVARIANCE_FILE, &self.covariances),
            ),
            (
                TIME_FILE,
                write_column(dir, TIME_FILE, self.timestamps_us.iter().map(|t| t.to_string())),
            ),
            (
                MEASUREMENT_FILE,
                write_column(
                    dir,
                    MEASUREMENT_FILE,
                    self.measurement_available
                        .iter()
                        .map(|&m| (if m { "1" } else { "0" }).to_string()),
                ),
            ),
        ];

        let staged_paths: Vec<&PathBuf> = staged
            .iter()
            .filter_map(|(_, result)| result.as_ref().ok())
            .collect();
        if let Some((name, Err(e))) = staged.iter().find(|(_, r)| r.is_err()) {
            remove_all(&staged_paths);
            anyhow::bail!("Failed to write {}: {:#}", name, e);
        }

        let mut placed = Vec::with_capacity(staged_paths.len());
        for ((name, _), tmp) in staged.iter().zip(&staged_paths) {
            let dest = dir.join(name);
            if let Err(e) = fs::rename(tmp, &dest) {
                remove_all(&placed);
                remove_all(&staged_paths);
                return Err(e).with_context(|| format!("Failed to move {} into place", name));
            }
            placed.push(dest);
        }
        Ok(())
    }
}

/// Best-effort cleanup; paths already moved or never created are skipped.
fn remove_all<P: AsRef<Path>>(paths: &[P]) {
    for path in paths {
        fs::remove_file(path).ok();
    }
}

fn write_table(dir: &Path, name: &str, table: &Array2<f64>) -> Result<PathBuf> {
    let tmp = staging_path(dir, name);
    let mut writer = csv::Writer::from_path(&tmp)?;
    for row in table.rows() {
        writer.write_record(row.iter().map(|v| v.to_string()))?;
    }
    writer.flush()?;
    Ok(tmp)
}

fn write_column<I>(dir: &Path, name: &str, values: I) -> Result<PathBuf>
where
    I: Iterator<Item = String>,
{
    let tmp = staging_path(dir, name);
    let mut writer = csv::Writer::from_path(&tmp)?;
    for value in values {
        writer.write_record([value])?;
    }
    writer.flush()?;
    Ok(tmp)
}

fn staging_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!(".{}.tmp", name))
}
