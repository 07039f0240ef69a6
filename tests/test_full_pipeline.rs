//! Integration test: full batch (sensor CSVs + climate CSV → forecasts, MAE tables)

use chrono::{Duration, NaiveDate};
use std::fmt::Write as _;
use std::path::Path;
use tempfile::tempdir;
use timber_forecast::batch::BatchOrchestrator;
use timber_forecast::config::{ModelEntry, PipelineConfig};
use timber_forecast::data::ClimateConfig;
use timber_forecast::export::export_report;
use timber_forecast::forecast::RegressorTransform;
use timber_forecast::timeseries::Interval;
use timber_forecast::training::{
    AdditiveConfig, ArConfig, BoostConfig, BoostingParams, LagConfig, ModelSpec,
};

const DAYS: i64 = 15;

fn temperature(day: i64) -> f64 {
    8.0 + (day % 7) as f64
}

fn write_climate(path: &Path) {
    let mut csv = String::from("LOCAL_DATE,MEAN_TEMPERATURE,TOTAL_PRECIPITATION\n");
    let start = NaiveDate::from_ymd_opt(2021, 2, 25).unwrap();
    for d in 0..40 {
        let date = start + Duration::days(d);
        let precip = if d % 5 == 0 { String::new() } else { format!("{}", (d * 3 % 7) as f64 * 0.5) };
        writeln!(csv, "{},{},{}", date.format("%Y-%m-%d"), temperature(d), precip).unwrap();
    }
    std::fs::write(path, csv).unwrap();
}

/// Two-hourly readings from 2021-03-01 02:00; `broken_column` is entirely NULL
fn write_sensors(path: &Path, offset: f64, broken_column: bool) {
    let mut csv = String::from("DateTime,MC1,MC2\n");
    let start = NaiveDate::from_ymd_opt(2021, 3, 1)
        .unwrap()
        .and_hms_opt(2, 0, 0)
        .unwrap();
    for i in 0..(DAYS * 12) {
        let ts = start + Duration::hours(2 * i);
        let day = 4 + (i + 1) / 12;
        let mc1 = if i % 37 == 5 {
            "NULL".to_string()
        } else {
            format!("{:.3}", offset + 0.1 * temperature(day) + 0.01 * (i % 12) as f64)
        };
        let mc2 = if broken_column {
            "NULL".to_string()
        } else {
            format!("{:.3}", offset + 1.0 - 0.05 * temperature(day))
        };
        writeln!(csv, "{}-0800,{},{}", ts.format("%Y-%m-%d %H:%M:%S"), mc1, mc2).unwrap();
    }
    std::fs::write(path, csv).unwrap();
}

fn models() -> Vec<ModelEntry> {
    let climate = ClimateConfig::default().columns;
    let additive = climate
        .iter()
        .fold(AdditiveConfig::default().with_seasonalities(false, false, true), |c, col| {
            c.add_regressor(col.clone())
        });
    vec![
        ModelEntry::new(ModelSpec::Autoregressive(ArConfig::default().with_order(4))),
        ModelEntry::new(ModelSpec::LagRegression(LagConfig {
            ridge: 0.1,
            ..LagConfig::default().with_covariate_lags(3)
        })),
        ModelEntry::new(ModelSpec::GradientBoosted(BoostConfig::default().with_lags(0, 3).with_boosting(
            BoostingParams {
                n_estimators: 20,
                ..BoostingParams::default()
            },
        ))),
        ModelEntry::new(ModelSpec::Additive(additive)),
    ]
}

fn base_config(root: &Path) -> PipelineConfig {
    let data_dir = root.join("sensors");
    std::fs::create_dir_all(&data_dir).unwrap();
    write_climate(&root.join("climate.csv"));

    let mut config = PipelineConfig::default()
        .with_data_dir(&data_dir)
        .with_climate_file(root.join("climate.csv"))
        .with_models(models())
        .with_horizon(24)
        .with_output_dir(root.join("out"));
    config.climate.interval = Some(Interval::hours(2));
    config
}

#[test]
fn test_batch_aggregate_in_sample() {
    let dir = tempdir().unwrap();
    let config = base_config(dir.path()).with_checkpoint_dir(dir.path().join("ckpt"));
    write_sensors(&config.data_dir.join("floor5.csv"), 16.0, false);
    write_sensors(&config.data_dir.join("floor3.csv"), 14.0, false);

    let orchestrator = BatchOrchestrator::new(config.clone()).unwrap();
    let report = orchestrator.run().unwrap();

    assert!(report.is_clean(), "failures: {:?}", report.failures);
    assert_eq!(report.successes(), 8);
    assert_eq!(report.errors.len(), 4);
    for (model, rows) in &report.errors {
        // files are processed in name order
        let files: Vec<_> = rows.iter().map(|r| r.file.as_str()).collect();
        assert_eq!(files, vec!["floor3", "floor5"], "model {}", model);
        assert!(rows.iter().all(|r| r.mae.is_finite() && r.mae >= 0.0));
    }

    let written = export_report(&config.output_dir, &report).unwrap();
    assert_eq!(written.len(), 12);
    assert!(config.output_dir.join("floor3-additive-aggr.csv").exists());
    assert!(config.output_dir.join("mae-gradient_boosted.csv").exists());
    assert!(dir
        .path()
        .join("ckpt")
        .join("floor3_Aggregate__lag_regression__initial.json")
        .exists());
}

#[test]
fn test_batch_isolates_failures() {
    let dir = tempdir().unwrap();
    let config = base_config(dir.path()).with_aggregate(false);
    write_sensors(&config.data_dir.join("floor3.csv"), 14.0, true);
    std::fs::write(
        config.data_dir.join("floor4.csv"),
        "DateTime,MC1\n2021-03-01 02:00:00-0800,abc\n",
    )
    .unwrap();

    let report = BatchOrchestrator::new(config).unwrap().run().unwrap();

    // floor4 fails to load; MC2 of floor3 has no valid readings
    assert_eq!(report.successes(), 4);
    assert_eq!(report.failures.len(), 5);
    let load_failure = report.failures.iter().find(|f| f.file == "floor4").unwrap();
    assert!(load_failure.model.is_none());
    assert_eq!(load_failure.kind, "data");
    assert!(report
        .failures
        .iter()
        .filter(|f| f.file == "floor3")
        .all(|f| f.column.as_deref() == Some("MC2") && f.kind == "insufficient_data"));
}

#[test]
fn test_batch_out_of_sample() {
    let dir = tempdir().unwrap();
    let mut config = base_config(dir.path());
    config.preprocess.in_sample = false;
    write_sensors(&config.data_dir.join("floor3.csv"), 14.0, false);

    let report = BatchOrchestrator::new(config).unwrap().run().unwrap();

    assert!(report.is_clean(), "failures: {:?}", report.failures);
    assert!(report.errors.is_empty());
    let lag = report
        .forecasts
        .iter()
        .find(|e| e.model == "lag_regression")
        .unwrap();
    assert_eq!(lag.forecast.len(), 24);
    assert_eq!(
        lag.forecast.ds[0],
        NaiveDate::from_ymd_opt(2021, 3, 16).unwrap().and_hms_opt(2, 0, 0).unwrap()
    );
}

#[test]
fn test_additive_with_timestamp_transform() {
    let dir = tempdir().unwrap();
    let additive = AdditiveConfig::default()
        .with_seasonalities(false, false, false)
        .add_regressor("HOUR");
    let config = base_config(dir.path()).with_models(vec![ModelEntry::new(ModelSpec::Additive(additive))
        .with_transform("HOUR", RegressorTransform::HourOfDay)]);
    write_sensors(&config.data_dir.join("floor3.csv"), 14.0, false);

    let report = BatchOrchestrator::new(config).unwrap().run().unwrap();
    assert!(report.is_clean(), "failures: {:?}", report.failures);
    assert_eq!(report.scores("additive").unwrap().len(), 1);
}

#[test]
fn test_batch_retrains_from_checkpoint_directory() {
    let dir = tempdir().unwrap();
    let lag_only = vec![ModelEntry::new(ModelSpec::LagRegression(LagConfig {
        ridge: 0.1,
        ..LagConfig::default().with_covariate_lags(3)
    }))];
    let ckpt = dir.path().join("ckpt");
    let config = base_config(dir.path())
        .with_models(lag_only)
        .with_checkpoint_dir(&ckpt);
    write_sensors(&config.data_dir.join("floor3.csv"), 14.0, false);

    let initial = BatchOrchestrator::new(config.clone()).unwrap().run().unwrap();
    assert!(initial.is_clean(), "failures: {:?}", initial.failures);
    assert!(ckpt.join("floor3_Aggregate__lag_regression__initial.json").exists());

    // floor5 has no initial checkpoint to warm-start from
    write_sensors(&config.data_dir.join("floor5.csv"), 16.0, false);
    let retrain = config.with_retrain_from(&ckpt);
    let report = BatchOrchestrator::new(retrain).unwrap().run().unwrap();

    assert_eq!(report.successes(), 1);
    assert!(ckpt.join("floor3_Aggregate__lag_regression__retrained.json").exists());
    assert!(!ckpt.join("floor5_Aggregate__lag_regression__retrained.json").exists());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].file, "floor5");
    assert_eq!(report.failures[0].kind, "io");

    let before = &initial.forecasts[0].forecast;
    let after = report.forecasts.iter().find(|e| e.file == "floor3").unwrap();
    assert_eq!(before.ds, after.forecast.ds);
}

#[test]
fn test_invalid_config_rejected_before_run() {
    let dir = tempdir().unwrap();
    let config = base_config(dir.path()).with_horizon(0);
    assert!(BatchOrchestrator::new(config).is_err());
}
