use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::combine::Normalization;
use crate::error::{CoreError, CoreResult};
use crate::model::WeightVector;
use crate::pipeline::{CHATNOIR_BASE_URL, ChatNoirOptions};

pub const API_KEY_ENV: &str = "CHAT_NOIR_API_KEY";

/// Settings of a pipeline run, read from YAML. Relative paths resolve against
/// the directory of the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_run_name")]
    pub run_name: String,
    #[serde(default = "default_topics_path")]
    pub topics_path: PathBuf,
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default)]
    pub chatnoir: ChatNoirConfig,
    #[serde(default)]
    pub trec_run: TrecRunConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub steps: Vec<StepConfig>,
    /// Combination weights recorded with the run; also used for export.
    #[serde(default)]
    pub weights: WeightVector,
    #[serde(default)]
    pub normalization: Normalization,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            run_name: default_run_name(),
            topics_path: default_topics_path(),
            backend: BackendKind::default(),
            chatnoir: ChatNoirConfig::default(),
            trec_run: TrecRunConfig::default(),
            cache: CacheConfig::default(),
            steps: Vec::new(),
            weights: WeightVector::new(),
            normalization: Normalization::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Chatnoir,
    TrecRun,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatNoirConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_chatnoir_url")]
    pub base_url: String,
    #[serde(default = "default_chatnoir_index")]
    pub index: String,
    #[serde(default = "default_docs_per_query")]
    pub docs_per_query: usize,
    #[serde(default = "default_retries")]
    pub retries: usize,
    #[serde(default = "default_fetch_text")]
    pub fetch_text: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_native_score")]
    pub score_name: String,
    #[serde(default)]
    pub score_threshold: Option<f64>,
    #[serde(default)]
    pub spam_rank_threshold: Option<f64>,
    #[serde(default)]
    pub page_rank_threshold: Option<f64>,
}

impl Default for ChatNoirConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_chatnoir_url(),
            index: default_chatnoir_index(),
            docs_per_query: default_docs_per_query(),
            retries: default_retries(),
            fetch_text: default_fetch_text(),
            timeout_secs: default_timeout_secs(),
            score_name: default_native_score(),
            score_threshold: None,
            spam_rank_threshold: None,
            page_rank_threshold: None,
        }
    }
}

impl ChatNoirConfig {
    pub fn options(&self) -> ChatNoirOptions {
        ChatNoirOptions {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            index: self.index.clone(),
            docs_per_query: self.docs_per_query,
            retries: self.retries,
            fetch_text: self.fetch_text,
            timeout: Duration::from_secs(self.timeout_secs),
            score_name: self.score_name.clone(),
            score_threshold: self.score_threshold,
            spam_rank_threshold: self.spam_rank_threshold,
            page_rank_threshold: self.page_rank_threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrecRunConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_native_score")]
    pub score_name: String,
}

impl Default for TrecRunConfig {
    fn default() -> Self {
        Self {
            path: None,
            score_name: default_native_score(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    /// Defaults to `<cache-root>/retrieval`.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepConfig {
    SimpleTerms {
        terms_path: PathBuf,
    },
    TermCounts {
        #[serde(default = "default_factor_b")]
        factor_b: f64,
        #[serde(default = "default_min_term_length")]
        min_term_length: usize,
    },
}

impl StepConfig {
    pub fn score_name(&self) -> &'static str {
        match self {
            Self::SimpleTerms { .. } => crate::pipeline::SIMPLE_TERMS_SCORE,
            Self::TermCounts { .. } => crate::pipeline::TERM_COUNTS_SCORE,
        }
    }
}

impl PipelineConfig {
    /// Reads, resolves, applies `CHAT_NOIR_API_KEY` and validates.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let raw = fs::read_to_string(path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => CoreError::not_found("config file", path.display().to_string()),
            _ => CoreError::config(format!("failed to read {}: {err}", path.display())),
        })?;
        let mut config = Self::from_yaml(&raw)
            .map_err(|err| CoreError::config(format!("{}: {err}", path.display())))?;

        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };

        resolve(&mut self.topics_path);
        if let Some(path) = self.trec_run.path.as_mut() {
            resolve(path);
        }
        if let Some(dir) = self.cache.dir.as_mut() {
            resolve(dir);
        }
        for step in &mut self.steps {
            if let StepConfig::SimpleTerms { terms_path } = step {
                resolve(terms_path);
            }
        }
    }

    /// Environment values win over the file.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(api_key) = lookup(API_KEY_ENV).filter(|value| !value.trim().is_empty()) {
            self.chatnoir.api_key = api_key;
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.run_name.trim().is_empty() {
            return Err(CoreError::config("run_name must not be empty"));
        }

        match self.backend {
            BackendKind::Chatnoir => {
                if self.chatnoir.api_key.trim().is_empty() {
                    return Err(CoreError::config(format!(
                        "chatnoir.api_key is empty; set it or {API_KEY_ENV}"
                    )));
                }
                if self.chatnoir.docs_per_query == 0 {
                    return Err(CoreError::config("chatnoir.docs_per_query must be positive"));
                }
                if self.chatnoir.retries == 0 {
                    return Err(CoreError::config("chatnoir.retries must be at least 1"));
                }
            }
            BackendKind::TrecRun => {
                if self.trec_run.path.is_none() {
                    return Err(CoreError::config("trec_run.path is required"));
                }
            }
        }

        let mut score_names = BTreeSet::from([self.native_score_name()]);
        for step in &self.steps {
            if !score_names.insert(step.score_name()) {
                return Err(CoreError::config(format!(
                    "score '{}' is produced twice",
                    step.score_name()
                )));
            }
            if let StepConfig::TermCounts { factor_b, .. } = step
                && (*factor_b == 0.0 || !factor_b.is_finite())
            {
                return Err(CoreError::config("term_counts.factor_b must be finite and non-zero"));
            }
        }

        for (name, weight) in &self.weights {
            if !weight.is_finite() {
                return Err(CoreError::config(format!("weight '{name}' is not finite")));
            }
            if !score_names.contains(name.as_str()) {
                return Err(CoreError::Dimension {
                    dimension: name.clone(),
                });
            }
        }

        Ok(())
    }

    pub fn native_score_name(&self) -> &str {
        match self.backend {
            BackendKind::Chatnoir => &self.chatnoir.score_name,
            BackendKind::TrecRun => &self.trec_run.score_name,
        }
    }

    /// Serialized form stored with the run; the API key is blanked.
    pub fn to_recorded_json(&self) -> CoreResult<String> {
        let mut recorded = self.clone();
        recorded.chatnoir.api_key.clear();
        serde_json::to_string(&recorded)
            .map_err(|err| CoreError::config(format!("unserializable config: {err}")))
    }
}

fn default_run_name() -> String {
    "baseline".to_string()
}

fn default_topics_path() -> PathBuf {
    PathBuf::from("topics.xml")
}

fn default_chatnoir_url() -> String {
    CHATNOIR_BASE_URL.to_string()
}

fn default_chatnoir_index() -> String {
    "cw12".to_string()
}

fn default_docs_per_query() -> usize {
    100
}

fn default_retries() -> usize {
    4
}

fn default_fetch_text() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_native_score() -> String {
    "chatnoir".to_string()
}

fn default_cache_enabled() -> bool {
    true
}

fn default_factor_b() -> f64 {
    1.0
}

fn default_min_term_length() -> usize {
    3
}
