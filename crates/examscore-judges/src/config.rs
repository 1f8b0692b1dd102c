//! examscore configuration and judge factory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use examscore_core::engine::GradingEngineConfig;
use examscore_core::traits::RubricJudge;

use crate::manual::ManualJudge;
use crate::remote::RemoteJudge;

/// Environment variable that overrides the remote judge's API key.
pub const REVIEWER_KEY_ENV: &str = "EXAMSCORE_REVIEWER_KEY";

/// Configuration for a single rubric judge.
///
/// `Debug` prints `***` in place of API keys.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JudgeConfig {
    /// Recorded human score sheets.
    Manual {
        scores_path: PathBuf,
        #[serde(default)]
        reviewer: Option<String>,
    },
    /// HTTP reviewer service.
    Remote {
        api_key: String,
        base_url: String,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
}

impl std::fmt::Debug for JudgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JudgeConfig::Manual {
                scores_path,
                reviewer,
            } => f
                .debug_struct("Manual")
                .field("scores_path", scores_path)
                .field("reviewer", reviewer)
                .finish(),
            JudgeConfig::Remote {
                api_key: _,
                base_url,
                timeout_secs,
            } => f
                .debug_struct("Remote")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .field("timeout_secs", timeout_secs)
                .finish(),
        }
    }
}

/// Top-level examscore configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamscoreConfig {
    /// Judge configurations keyed by name.
    #[serde(default)]
    pub judges: HashMap<String, JudgeConfig>,
    /// Judge used for free-text essays; none means essays must arrive pre-scored.
    #[serde(default)]
    pub default_judge: Option<String>,
    /// Max concurrent submissions.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Deadline for one essay judgment, in seconds.
    #[serde(default = "default_judge_timeout")]
    pub judge_timeout_secs: u64,
    /// Max retries on transient judge errors.
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    /// Delay before the first retry in milliseconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
    /// Overrides the blueprint's passing percentage.
    #[serde(default)]
    pub passing_percentage: Option<f64>,
    /// Output directory for reports.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_parallelism() -> usize {
    4
}
fn default_judge_timeout() -> u64 {
    30
}
fn default_retries() -> u32 {
    2
}
fn default_retry_delay() -> u64 {
    500
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./examscore-results")
}

impl Default for ExamscoreConfig {
    fn default() -> Self {
        Self {
            judges: HashMap::new(),
            default_judge: None,
            parallelism: default_parallelism(),
            judge_timeout_secs: default_judge_timeout(),
            max_retries: default_retries(),
            retry_delay_ms: default_retry_delay(),
            passing_percentage: None,
            output_dir: default_output_dir(),
        }
    }
}

impl ExamscoreConfig {
    /// Engine settings derived from this configuration.
    pub fn engine_config(&self) -> GradingEngineConfig {
        GradingEngineConfig {
            parallelism: self.parallelism,
            judge_timeout: Duration::from_secs(self.judge_timeout_secs),
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            passing_percentage: self.passing_percentage,
        }
    }
}

/// Expand `${VAR}` references from the environment. Unset variables expand
/// to the empty string; an unterminated `${` is kept as written.
fn resolve_env_vars(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(open) = rest.find("${") {
        let Some(len) = rest[open + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..open]);
        let name = &rest[open + 2..open + 2 + len];
        out.push_str(&std::env::var(name).unwrap_or_default());
        rest = &rest[open + 3 + len..];
    }
    out.push_str(rest);
    out
}

/// Resolve env vars in a judge config.
fn resolve_judge_config(config: &JudgeConfig) -> JudgeConfig {
    match config {
        JudgeConfig::Manual {
            scores_path,
            reviewer,
        } => JudgeConfig::Manual {
            scores_path: PathBuf::from(resolve_env_vars(&scores_path.to_string_lossy())),
            reviewer: reviewer.as_ref().map(|r| resolve_env_vars(r)),
        },
        JudgeConfig::Remote {
            api_key,
            base_url,
            timeout_secs,
        } => JudgeConfig::Remote {
            api_key: resolve_env_vars(api_key),
            base_url: resolve_env_vars(base_url),
            timeout_secs: *timeout_secs,
        },
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `examscore.toml` in the current directory
/// 2. `~/.config/examscore/config.toml`
///
/// Environment variable override: `EXAMSCORE_REVIEWER_KEY` replaces the API
/// key of every remote judge.
pub fn load_config() -> Result<ExamscoreConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<ExamscoreConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("examscore.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<ExamscoreConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => ExamscoreConfig::default(),
    };

    let override_key = std::env::var(REVIEWER_KEY_ENV).ok();
    config.judges = config
        .judges
        .iter()
        .map(|(name, judge)| {
            let mut resolved = resolve_judge_config(judge);
            if let (JudgeConfig::Remote { api_key, .. }, Some(key)) = (&mut resolved, &override_key) {
                *api_key = key.clone();
            }
            (name.clone(), resolved)
        })
        .collect();

    if let Some(name) = &config.default_judge {
        if !config.judges.contains_key(name) {
            anyhow::bail!("default_judge '{name}' is not configured under [judges]");
        }
    }

    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("examscore"))
}

/// Create a judge instance from its configuration.
pub fn create_judge(name: &str, config: &JudgeConfig) -> Result<Box<dyn RubricJudge>> {
    match config {
        JudgeConfig::Manual {
            scores_path,
            reviewer,
        } => {
            let judge = ManualJudge::from_file(scores_path)
                .with_context(|| format!("failed to create judge '{name}'"))?;
            Ok(Box::new(match reviewer {
                Some(reviewer) => judge.with_reviewer(reviewer.clone()),
                None => judge,
            }))
        }
        JudgeConfig::Remote {
            api_key,
            base_url,
            timeout_secs,
        } => {
            if api_key.is_empty() {
                anyhow::bail!("judge '{name}' has no API key; set {REVIEWER_KEY_ENV}");
            }
            Ok(Box::new(RemoteJudge::new(api_key, base_url, *timeout_secs)?))
        }
    }
}
