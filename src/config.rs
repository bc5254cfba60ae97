use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::KiraError;

pub const DEFAULT_CONFIG_FILE: &str = "kira-am.json";
pub const DEFAULT_EMAIL: &str = "kira-am@users.noreply.github.com";
pub const DEFAULT_DELAY_SECS: f64 = 0.35;
pub const DEFAULT_EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// Optional on-disk settings. Every field may be omitted.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub delay_secs: Option<f64>,
    #[serde(default)]
    pub eutils_base: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub datasets_bin: Option<PathBuf>,
    #[serde(default)]
    pub dataformat_bin: Option<PathBuf>,
}

/// Values taken from the command line; they win over file and environment.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub email: Option<String>,
    pub delay_secs: Option<f64>,
}

/// Settings shared by every external collaborator, fixed for the whole run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub email: String,
    pub api_key: Option<String>,
    pub delay: Duration,
    pub eutils_base: String,
    pub timeout: Duration,
    pub datasets_bin: Option<PathBuf>,
    pub dataformat_bin: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            email: DEFAULT_EMAIL.to_string(),
            api_key: None,
            delay: Duration::from_secs_f64(DEFAULT_DELAY_SECS),
            eutils_base: DEFAULT_EUTILS_BASE.to_string(),
            timeout: Duration::from_secs(60),
            datasets_bin: None,
            dataformat_bin: None,
        }
    }
}

/// Process environment consulted by [`ConfigLoader`].
#[derive(Debug, Default, Clone)]
pub struct EnvVars {
    pub entrez_email: Option<String>,
    pub ncbi_api_key: Option<String>,
}

impl EnvVars {
    pub fn from_process() -> Self {
        Self {
            entrez_email: non_blank(std::env::var("ENTREZ_EMAIL").ok()),
            ncbi_api_key: non_blank(std::env::var("NCBI_API_KEY").ok()),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Defaults, then the JSON file, then environment, then CLI overrides.
    ///
    /// Without an explicit path, `kira-am.json` in the working directory is
    /// used when present.
    pub fn resolve(
        path: Option<&str>,
        overrides: &ConfigOverrides,
    ) -> Result<PipelineConfig, KiraError> {
        let config = match path {
            Some(path) => Self::read(PathBuf::from(path))?,
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::read(default_path)?
                } else {
                    Config::default()
                }
            }
        };
        Self::resolve_config(config, &EnvVars::from_process(), overrides)
    }

    fn read(path: PathBuf) -> Result<Config, KiraError> {
        let content = fs::read_to_string(&path).map_err(|_| KiraError::ConfigRead(path.clone()))?;
        serde_json::from_str(&content).map_err(|err| KiraError::ConfigParse(err.to_string()))
    }

    pub fn resolve_config(
        config: Config,
        env: &EnvVars,
        overrides: &ConfigOverrides,
    ) -> Result<PipelineConfig, KiraError> {
        let defaults = PipelineConfig::default();

        let email = non_blank(overrides.email.clone())
            .or_else(|| env.entrez_email.clone())
            .or_else(|| non_blank(config.email))
            .unwrap_or(defaults.email);
        let api_key = env
            .ncbi_api_key
            .clone()
            .or_else(|| non_blank(config.api_key));

        let delay_secs = overrides
            .delay_secs
            .or(config.delay_secs)
            .unwrap_or(DEFAULT_DELAY_SECS);
        let delay = Duration::try_from_secs_f64(delay_secs)
            .map_err(|_| KiraError::InvalidDelay(delay_secs.to_string()))?;

        Ok(PipelineConfig {
            email,
            api_key,
            delay,
            eutils_base: non_blank(config.eutils_base)
                .map(|base| base.trim_end_matches('/').to_string())
                .unwrap_or(defaults.eutils_base),
            timeout: config
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            datasets_bin: config.datasets_bin,
            dataformat_bin: config.dataformat_bin,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
