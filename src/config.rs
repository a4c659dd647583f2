use anyhow::{Context, Result};
use chrono_tz::Tz;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
pub struct CategoryConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub force: bool,
}

fn default_enabled() -> bool {
    true
}

impl Default for CategoryConfig {
    fn default() -> Self {
        CategoryConfig {
            enabled: true,
            force: false,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default)]
#[serde(default)]
pub struct CategoriesConfig {
    pub master_ticker: CategoryConfig,
    pub daily_nav: CategoryConfig,
    pub static_detail: CategoryConfig,
    pub holdings: CategoryConfig,
    pub sector_region: CategoryConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SiteConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub financial_times: Option<SiteConfig>,
    pub yahoo_finance: Option<SiteConfig>,
    pub stock_analysis: Option<SiteConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            financial_times: Some(SiteConfig {
                base_url: "https://markets.ft.com".to_string(),
            }),
            yahoo_finance: Some(SiteConfig {
                base_url: "https://query1.finance.yahoo.com".to_string(),
            }),
            stock_analysis: Some(SiteConfig {
                base_url: "https://stockanalysis.com".to_string(),
            }),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct FxConfig {
    pub base_url: String,
    pub window_days: u32,
}

impl Default for FxConfig {
    fn default() -> Self {
        FxConfig {
            base_url: "https://api.frankfurter.app".to_string(),
            window_days: 90,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_target_currency")]
    pub target_currency: String,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub categories: CategoriesConfig,
    #[serde(default)]
    pub fx: FxConfig,
    /// Overrides the per-user data directory holding the staging store.
    #[serde(default)]
    pub data_path: Option<PathBuf>,
}

fn default_timezone() -> String {
    "Europe/London".to_string()
}

fn default_target_currency() -> String {
    "USD".to_string()
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = Self::project_dirs()?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path() -> Result<PathBuf> {
        let proj_dirs = Self::project_dirs()?;
        Ok(proj_dirs.data_dir().join("store"))
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("io", "fundstage", "fundstage")
            .context("Could not determine project directories")
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    /// The configured IANA timezone used to resolve "today".
    pub fn market_timezone(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("Invalid timezone '{}': {}", self.timezone, e))
    }

    pub fn data_path(&self) -> Result<PathBuf> {
        match &self.data_path {
            Some(path) => Ok(path.clone()),
            None => Self::default_data_path(),
        }
    }
}
