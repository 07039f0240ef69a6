//! JSON model checkpoints

use crate::error::{ForecastError, Result};
use crate::training::Forecaster;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Whether a checkpoint comes from a fresh fit or a warm-started one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Initial,
    Retrained,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Initial => "initial",
            Stage::Retrained => "retrained",
        }
    }
}

/// On-disk envelope around a model's fitted state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub kind: String,
    pub stage: Stage,
    pub created_at: DateTime<Utc>,
    pub model: serde_json::Value,
}

impl Checkpoint {
    pub fn capture(forecaster: &dyn Forecaster, stage: Stage) -> Result<Self> {
        Ok(Self {
            kind: forecaster.kind().to_string(),
            stage,
            created_at: Utc::now(),
            model: forecaster.checkpoint()?,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let checkpoint: Self = serde_json::from_str(&json)?;
        Ok(checkpoint)
    }

    /// Hand the stored state to a forecaster of the same kind
    pub fn restore_into(self, forecaster: &mut dyn Forecaster) -> Result<()> {
        if self.kind != forecaster.kind() {
            return Err(ForecastError::Config(format!(
                "checkpoint holds a '{}' model, cannot warm-start '{}'",
                self.kind,
                forecaster.kind()
            )));
        }
        forecaster.warm_start(self.model)
    }
}

/// Keep file names portable: anything but alphanumerics, `-`, `_` and `.` becomes `_`
pub(crate) fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// `<dir>/<unit>__<model>__<stage>.json`
pub fn checkpoint_path(dir: &Path, unit: &str, model: &str, stage: Stage) -> PathBuf {
    dir.join(format!(
        "{}__{}__{}.json",
        sanitize(unit),
        sanitize(model),
        stage.as_str()
    ))
}

/// Write a checkpoint for a freshly fitted forecaster and return its path
pub fn write_checkpoint(
    dir: &Path,
    unit: &str,
    model: &str,
    stage: Stage,
    forecaster: &dyn Forecaster,
) -> Result<PathBuf> {
    let path = checkpoint_path(dir, unit, model, stage);
    Checkpoint::capture(forecaster, stage)?.save(&path)?;
    info!(path = %path.display(), stage = stage.as_str(), "Saved checkpoint");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeseries::frame::tests::hourly;
    use crate::timeseries::{TimeFrame, Y};
    use crate::training::{ArConfig, AutoRegressive, LagConfig, LagRegression};
    use tempfile::tempdir;

    fn fitted_ar() -> AutoRegressive {
        let y: Vec<f64> = (0..30).map(|i| (i % 4) as f64).collect();
        let train = TimeFrame::new(hourly(30, 2))
            .unwrap()
            .with_dense_column(Y, y)
            .unwrap();
        let mut model = AutoRegressive::new(ArConfig::default().with_order(2));
        model.fit(&train, &[]).unwrap();
        model
    }

    #[test]
    fn test_checkpoint_path_naming() {
        let path = checkpoint_path(Path::new("/tmp/ck"), "floor 3/Aggregate", "additive", Stage::Retrained);
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "floor_3_Aggregate__additive__retrained.json"
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let model = fitted_ar();
        let path = write_checkpoint(dir.path(), "floor3_MC1", "autoregressive", Stage::Initial, &model)
            .unwrap();
        assert!(path.ends_with("floor3_MC1__autoregressive__initial.json"));

        let loaded = Checkpoint::load(&path).unwrap();
        assert_eq!(loaded.kind, "autoregressive");
        assert_eq!(loaded.stage, Stage::Initial);

        let mut fresh = AutoRegressive::new(ArConfig::default().with_order(2));
        loaded.restore_into(&mut fresh).unwrap();
    }

    #[test]
    fn test_restore_kind_mismatch() {
        let checkpoint = Checkpoint::capture(&fitted_ar(), Stage::Initial).unwrap();
        let mut other = LagRegression::new(LagConfig::default());
        assert!(matches!(
            checkpoint.restore_into(&mut other),
            Err(ForecastError::Config(_))
        ));
    }

    #[test]
    fn test_capture_unfitted() {
        let model = AutoRegressive::new(ArConfig::default());
        assert!(matches!(
            Checkpoint::capture(&model, Stage::Initial),
            Err(ForecastError::ModelNotFitted)
        ));
    }
}
