//! Pipeline configuration
//!
//! One JSON document drives a batch run. Every field has a default so a partial
//! file (or none at all) is valid; the CLI applies overrides on top and the result
//! is validated before any unit starts.

use crate::data::ClimateConfig;
use crate::error::{ForecastError, Result};
use crate::forecast::RegressorTransform;
use crate::preprocessing::PreprocessConfig;
use crate::training::{
    AdditiveConfig, AdditiveGrid, ArConfig, BoostConfig, LagConfig, ModelSpec,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// A model to run on every unit, with its optional grid and future regressor
/// transforms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub model: ModelSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<AdditiveGrid>,

    /// Computes future regressor values from timestamps instead of taking
    /// held-out covariate rows
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub regressor_transforms: BTreeMap<String, RegressorTransform>,
}

impl ModelEntry {
    pub fn new(model: ModelSpec) -> Self {
        Self {
            model,
            grid: None,
            regressor_transforms: BTreeMap::new(),
        }
    }

    pub fn with_grid(mut self, grid: AdditiveGrid) -> Self {
        self.grid = Some(grid);
        self
    }

    pub fn with_transform(mut self, regressor: impl Into<String>, transform: RegressorTransform) -> Self {
        self.regressor_transforms.insert(regressor.into(), transform);
        self
    }

    pub fn name(&self) -> &'static str {
        self.model.name()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory of per-floor sensor CSV files
    pub data_dir: PathBuf,

    /// Daily climate CSV; without it models run on the target alone
    pub climate_file: Option<PathBuf>,

    pub climate: ClimateConfig,

    pub preprocess: PreprocessConfig,

    /// Forecast only the synthesized `Aggregate` column of each worksheet
    pub aggregate: bool,

    pub models: Vec<ModelEntry>,

    pub output_dir: PathBuf,

    /// Where fitted models are checkpointed; `None` disables checkpoints
    pub checkpoint_dir: Option<PathBuf>,

    /// Checkpoint file, or directory of initial checkpoints, to warm-start from
    pub retrain_from: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let climate = ClimateConfig::default();
        let additive = climate
            .columns
            .iter()
            .fold(AdditiveConfig::default(), |config, column| config.add_regressor(column.clone()));
        Self {
            data_dir: PathBuf::from("data/sensors"),
            climate_file: None,
            climate,
            preprocess: PreprocessConfig::default(),
            aggregate: true,
            models: vec![
                ModelEntry::new(ModelSpec::Autoregressive(ArConfig::default())),
                ModelEntry::new(ModelSpec::LagRegression(LagConfig::default())),
                ModelEntry::new(ModelSpec::GradientBoosted(BoostConfig::default())),
                ModelEntry::new(ModelSpec::Additive(additive)),
            ],
            output_dir: PathBuf::from("output"),
            checkpoint_dir: None,
            retrain_from: None,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_climate_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.climate_file = Some(path.into());
        self
    }

    pub fn with_models(mut self, models: Vec<ModelEntry>) -> Self {
        self.models = models;
        self
    }

    pub fn with_horizon(mut self, horizon: usize) -> Self {
        self.preprocess.horizon = horizon;
        self
    }

    pub fn with_aggregate(mut self, aggregate: bool) -> Self {
        self.aggregate = aggregate;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = Some(dir.into());
        self
    }

    pub fn with_retrain_from(mut self, path: impl Into<PathBuf>) -> Self {
        self.retrain_from = Some(path.into());
        self
    }

    /// Load from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json).map_err(|e| {
            ForecastError::Config(format!("invalid config {}: {}", path.display(), e))
        })?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.preprocess.validate()?;

        if self.models.is_empty() {
            return Err(ForecastError::Config("at least one model is required".to_string()));
        }

        let has_climate = self.climate_file.is_some();
        let mut seen = HashSet::new();
        for entry in &self.models {
            entry.model.validate()?;
            if !seen.insert(entry.name()) {
                return Err(ForecastError::Config(format!(
                    "model '{}' is listed more than once",
                    entry.name()
                )));
            }

            if let Some(grid) = &entry.grid {
                grid.validate()?;
                if !matches!(entry.model, ModelSpec::Additive(_)) {
                    return Err(ForecastError::Config(format!(
                        "grid search is only supported for the additive model, not '{}'",
                        entry.name()
                    )));
                }
                if self.retrain_from.is_some() {
                    return Err(ForecastError::Config(
                        "retrain and grid search cannot be combined".to_string(),
                    ));
                }
                if !self.preprocess.in_sample {
                    return Err(ForecastError::Config(
                        "grid search needs in-sample evaluation for ground truth".to_string(),
                    ));
                }
            }

            if !entry.regressor_transforms.is_empty() && !matches!(entry.model, ModelSpec::Additive(_)) {
                return Err(ForecastError::Config(format!(
                    "regressor transforms are only supported for the additive model, not '{}'",
                    entry.name()
                )));
            }

            let covariate_only = match &entry.model {
                ModelSpec::LagRegression(lag) => lag.target_lags == 0,
                ModelSpec::GradientBoosted(boost) => boost.target_lags == 0,
                _ => false,
            };
            if covariate_only && !has_climate {
                return Err(ForecastError::Config(format!(
                    "model '{}' has no target lags and needs a climate_file for covariates",
                    entry.name()
                )));
            }

            if let ModelSpec::Additive(additive) = &entry.model {
                // Transforms replace held-out covariates for the whole model
                for regressor in &additive.regressors {
                    let covered = if entry.regressor_transforms.is_empty() {
                        has_climate && self.climate.columns.contains(regressor)
                    } else {
                        entry.regressor_transforms.contains_key(regressor)
                    };
                    if !covered {
                        return Err(ForecastError::Config(format!(
                            "additive regressor '{}' has no source of future values",
                            regressor
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_is_valid_with_climate() {
        let config = PipelineConfig::default().with_climate_file("climate.csv");
        assert!(config.validate().is_ok());
        assert_eq!(config.models.len(), 4);
        assert_eq!(config.preprocess.horizon, 300);
    }

    #[test]
    fn test_covariate_models_need_climate() {
        // default lag, boosted and additive entries all read climate columns
        let config = PipelineConfig::default();
        assert!(matches!(config.validate(), Err(ForecastError::Config(_))));

        for spec in [
            ModelSpec::LagRegression(LagConfig::default()),
            ModelSpec::GradientBoosted(BoostConfig::default()),
            ModelSpec::Additive(AdditiveConfig::default().add_regressor("MEAN_TEMPERATURE")),
        ] {
            let config = PipelineConfig::default().with_models(vec![ModelEntry::new(spec.clone())]);
            assert!(config.validate().is_err(), "{} accepted without climate", spec.name());
        }

        // target lags or timestamp transforms need no climate file
        let config = PipelineConfig::default().with_models(vec![
            ModelEntry::new(ModelSpec::Autoregressive(ArConfig::default())),
            ModelEntry::new(ModelSpec::LagRegression(LagConfig::default().with_target_lags(3))),
            ModelEntry::new(ModelSpec::GradientBoosted(BoostConfig::default().with_lags(3, 0))),
            ModelEntry::new(ModelSpec::Additive(AdditiveConfig::default().add_regressor("HOUR")))
                .with_transform("HOUR", RegressorTransform::HourOfDay),
        ]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{
            "aggregate": false,
            "preprocess": { "horizon": 24 },
            "models": [ { "model": { "kind": "autoregressive", "order": 3 } } ]
        }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert!(!config.aggregate);
        assert_eq!(config.preprocess.horizon, 24);
        assert!(config.preprocess.in_sample);
        assert_eq!(config.models[0].name(), "autoregressive");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        let config = PipelineConfig::default().with_horizon(12).with_aggregate(false);
        config.save(&path).unwrap();
        assert_eq!(PipelineConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_retrain_with_grid_rejected() {
        let config = PipelineConfig::default()
            .with_models(vec![ModelEntry::new(ModelSpec::Additive(AdditiveConfig::default()))
                .with_grid(AdditiveGrid::default())])
            .with_retrain_from("checkpoints");
        assert!(matches!(config.validate(), Err(ForecastError::Config(_))));
    }

    #[test]
    fn test_grid_on_other_model_rejected() {
        let config = PipelineConfig::default().with_models(vec![
            ModelEntry::new(ModelSpec::LagRegression(LagConfig::default())).with_grid(AdditiveGrid::default()),
        ]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_models_rejected() {
        let entry = ModelEntry::new(ModelSpec::Autoregressive(ArConfig::default()));
        let config = PipelineConfig::default().with_models(vec![entry.clone(), entry]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_regressor_rejected() {
        let additive = AdditiveConfig::default().add_regressor("HOUR");
        let config = PipelineConfig::default()
            .with_models(vec![ModelEntry::new(ModelSpec::Additive(additive.clone()))]);
        assert!(config.validate().is_err());

        let config = PipelineConfig::default().with_models(vec![
            ModelEntry::new(ModelSpec::Additive(additive)).with_transform("HOUR", RegressorTransform::HourOfDay),
        ]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_horizon_rejected() {
        assert!(PipelineConfig::default().with_horizon(0).validate().is_err());
    }
}
