//! Pipeline configuration
//!
//! Every section has defaults matching the reference training and sweep
//! runs, so an empty TOML file (or none at all) is a valid configuration.
//! Selected settings can be overridden from the environment.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

use lichen_core::AlignMode;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::{Result, TrainerError};
use crate::search::{BoostedGrid, ForestGrid, RandomizedSearch};
use crate::sweep::SweepConfig;
use crate::training::ModelFamily;

/// Environment variable overriding every seed
pub const ENV_SEED: &str = "LICHEN_SEED";
/// Environment variable overriding the search worker count
pub const ENV_N_JOBS: &str = "LICHEN_N_JOBS";
/// Environment variable overriding the inference alignment mode
pub const ENV_ALIGN_MODE: &str = "LICHEN_ALIGN_MODE";

/// Column handling shared by training and prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnsConfig {
    pub label: String,
    /// Grouping column: exempt from missing-value filtering, never a feature
    pub group: String,
    pub rename: BTreeMap<String, String>,
    pub drop: Vec<String>,
}

impl Default for ColumnsConfig {
    fn default() -> Self {
        let rename = [
            ("probability", "lichenPresence"),
            ("slopeDEM", "slope"),
            ("d8flowDEM", "wbt_twi"),
            ("FIRE_YEAR", "tSinceFire"),
            ("Type", "stand_class"),
            ("50n150w_20101117_gmted_med075", "elevation"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            label: "lichenPresence".into(),
            group: "pixelGroup".into(),
            rename,
            drop: vec!["x".into(), "y".into()],
        }
    }
}

impl ColumnsConfig {
    /// Columns never encoded as features
    pub fn non_features(&self) -> Vec<String> {
        vec![self.label.clone(), self.group.clone()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub test_size: f64,
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub family: ModelFamily,
    pub n_iter: usize,
    pub cv: usize,
    pub n_jobs: usize,
    pub seed: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        let search = RandomizedSearch::default();
        Self {
            family: ModelFamily::Boosted,
            n_iter: search.n_iter,
            cv: search.cv,
            n_jobs: search.n_jobs,
            seed: search.seed,
        }
    }
}

impl SearchConfig {
    pub fn randomized_search(&self) -> RandomizedSearch {
        RandomizedSearch {
            n_iter: self.n_iter,
            cv: self.cv,
            n_jobs: self.n_jobs,
            seed: self.seed,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictConfig {
    pub align_mode: AlignMode,
}

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub columns: ColumnsConfig,
    pub split: SplitConfig,
    pub search: SearchConfig,
    pub boosted: BoostedGrid,
    pub forest: ForestGrid,
    pub predict: PredictConfig,
    pub sweep: SweepConfig,
}

impl PipelineConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = fs::read_to_string(path)?;
        let config: PipelineConfig = toml::from_str(&content)
            .map_err(|e| TrainerError::Config(format!("failed to parse {}: {e}", path.display())))?;
        Ok(config)
    }

    /// Defaults, or the given file, with environment overrides applied and validated
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load_from_file(p)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `LICHEN_*` overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup(ENV_SEED) {
            let seed: u64 = val
                .parse()
                .map_err(|_| TrainerError::Config(format!("{ENV_SEED} must be an integer, got '{val}'")))?;
            self.split.seed = seed;
            self.search.seed = seed;
            self.sweep.seed = seed;
            info!("Seed overridden from environment: {}", seed);
        }

        if let Some(val) = lookup(ENV_N_JOBS) {
            self.search.n_jobs = val
                .parse()
                .map_err(|_| TrainerError::Config(format!("{ENV_N_JOBS} must be an integer, got '{val}'")))?;
            info!("Worker count overridden from environment: {}", self.search.n_jobs);
        }

        if let Some(val) = lookup(ENV_ALIGN_MODE) {
            self.predict.align_mode = val.parse()?;
            info!("Alignment mode overridden from environment: {}", self.predict.align_mode);
        }

        Ok(())
    }

    /// Reject inconsistent settings
    pub fn validate(&self) -> Result<()> {
        if self.columns.label.is_empty() {
            return Err(TrainerError::Config("label column name is empty".into()));
        }
        if self.columns.drop.contains(&self.columns.label) {
            return Err(TrainerError::Config(format!(
                "label column '{}' is listed for dropping",
                self.columns.label
            )));
        }
        if !(self.split.test_size > 0.0 && self.split.test_size < 1.0) {
            return Err(TrainerError::Config(format!(
                "test_size must be in (0, 1), got {}",
                self.split.test_size
            )));
        }
        if self.search.cv < 2 {
            return Err(TrainerError::Config(format!(
                "cv must be at least 2, got {}",
                self.search.cv
            )));
        }
        if self.search.n_iter == 0 {
            return Err(TrainerError::Config("n_iter must be positive".into()));
        }
        if self.search.n_jobs == 0 {
            return Err(TrainerError::Config("n_jobs must be positive".into()));
        }
        match self.search.family {
            ModelFamily::Boosted if self.boosted.is_empty() => {
                return Err(TrainerError::Config("boosted grid has an empty parameter list".into()));
            }
            ModelFamily::Forest if self.forest.is_empty() => {
                return Err(TrainerError::Config("forest grid has an empty parameter list".into()));
            }
            _ => {}
        }
        if self.search.n_jobs > 256 {
            warn!("n_jobs = {} is unusually large", self.search.n_jobs);
        }
        self.sweep.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::MaxFeatures;

    #[test]
    fn test_defaults_match_reference_run() {
        let config = PipelineConfig::default();
        assert_eq!(config.columns.rename["slopeDEM"], "slope");
        assert_eq!(config.columns.drop, vec!["x", "y"]);
        assert_eq!(config.split.test_size, 0.2);
        assert_eq!(config.search.n_iter, 20);
        assert_eq!(config.search.cv, 5);
        assert_eq!(config.search.n_jobs, 20);
        assert_eq!(config.sweep.threshold, 0.3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: PipelineConfig = toml::from_str(
            r#"
            [search]
            family = "forest"
            n_iter = 5

            [forest]
            max_features = ["sqrt", "8"]

            [predict]
            align_mode = "strict"
            "#,
        )
        .unwrap();

        assert_eq!(config.search.family, ModelFamily::Forest);
        assert_eq!(config.search.n_iter, 5);
        assert_eq!(config.search.cv, 5);
        assert_eq!(config.forest.max_features, vec![MaxFeatures::Sqrt, MaxFeatures::Count(8)]);
        assert_eq!(config.forest.n_estimators, vec![100, 200]);
        assert_eq!(config.predict.align_mode, AlignMode::Strict);
        assert_eq!(config.columns.label, "lichenPresence");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lichen.toml");
        fs::write(&path, "[split]\ntest_size = 0.25\n").unwrap();

        let config = PipelineConfig::load_from_file(&path).unwrap();
        assert_eq!(config.split.test_size, 0.25);

        fs::write(&path, "[split]\ntest_size = \"a lot\"\n").unwrap();
        assert!(matches!(
            PipelineConfig::load_from_file(&path),
            Err(TrainerError::Config(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = PipelineConfig::default();
        config
            .apply_overrides(|key| match key {
                ENV_SEED => Some("7".into()),
                ENV_ALIGN_MODE => Some("STRICT".into()),
                _ => None,
            })
            .unwrap();

        assert_eq!(config.split.seed, 7);
        assert_eq!(config.search.seed, 7);
        assert_eq!(config.sweep.seed, 7);
        assert_eq!(config.predict.align_mode, AlignMode::Strict);

        let mut config = PipelineConfig::default();
        assert!(config
            .apply_overrides(|key| (key == ENV_N_JOBS).then(|| "many".to_string()))
            .is_err());
    }

    #[test]
    fn test_validation_rejects_bad_settings() {
        let mut config = PipelineConfig::default();
        config.split.test_size = 1.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.search.cv = 1;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.boosted.learning_rate.clear();
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.columns.drop.push("lichenPresence".into());
        assert!(config.validate().is_err());
    }
}
