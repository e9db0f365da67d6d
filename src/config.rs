use crate::auth::pipeline::DEFAULT_BASE_DOMAIN;
use crate::client::{ClientOptions, DEFAULT_AUTHENTICATION_URL};
use crate::error::AppError;
use crate::models::Rates;
use crate::pricing::BlockSchedule;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const SERVICE_NAME: &str = "utility-meter";
pub const HOME_ENV: &str = "UTILITY_METER_HOME";
pub const PASSWORD_ENV: &str = "UTILITY_METER_PASSWORD";

fn app_home_dir() -> Result<PathBuf, AppError> {
    if let Ok(custom) = std::env::var(HOME_ENV) {
        return Ok(PathBuf::from(custom));
    }

    if let Some(dirs) = ProjectDirs::from("com", "utility-meter", SERVICE_NAME) {
        let candidate = dirs.data_local_dir().to_path_buf();
        if fs::create_dir_all(&candidate).is_ok() {
            return Ok(candidate);
        }
    }

    let cwd = std::env::current_dir()?;
    Ok(cwd.join(".utility-meter"))
}

pub fn published_rates() -> Rates {
    Rates {
        base: 0.2301,
        first_block: 0.1132,
        second_block: 0.1307,
        misc_per_kwh: 0.0,
    }
}

fn default_base_domain() -> String {
    DEFAULT_BASE_DOMAIN.to_string()
}

fn default_authentication_url() -> String {
    DEFAULT_AUTHENTICATION_URL.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_base_domain")]
    pub base_domain: String,
    /// Empty means `https://<base_domain>/authenticate`.
    #[serde(default = "default_authentication_url")]
    pub authentication_url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default = "published_rates")]
    pub rates: Rates,
    #[serde(default)]
    pub blocks: BlockSchedule,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_domain: default_base_domain(),
            authentication_url: default_authentication_url(),
            username: None,
            rates: published_rates(),
            blocks: BlockSchedule::default(),
        }
    }
}

impl AppConfig {
    pub fn client_options(&self) -> ClientOptions {
        let authentication_url = Some(self.authentication_url.trim())
            .filter(|url| !url.is_empty())
            .map(ToString::to_string);
        ClientOptions {
            base_domain: self.base_domain.clone(),
            authentication_url,
            rates: Some(self.rates),
            schedule: self.blocks,
        }
    }

    pub fn require_username(&self) -> Result<&str, AppError> {
        self.username.as_deref().ok_or_else(|| {
            AppError::Config("No username configured. Run `utility-meter set-credentials` first.".into())
        })
    }
}

pub fn config_dir() -> Result<PathBuf, AppError> {
    Ok(app_home_dir()?.join("config"))
}

pub fn config_path() -> Result<PathBuf, AppError> {
    Ok(config_dir()?.join("config.toml"))
}

pub fn ensure_dirs() -> Result<(), AppError> {
    fs::create_dir_all(config_dir()?)?;
    Ok(())
}

fn normalize_config(config: &mut AppConfig) -> bool {
    let mut changed = false;

    let trimmed = config.base_domain.trim();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    let mut domain = without_scheme.trim_end_matches('/').to_string();
    if domain.is_empty() {
        domain = default_base_domain();
    }
    if domain != config.base_domain {
        config.base_domain = domain;
        changed = true;
    }

    if let Some(username) = config.username.take() {
        let trimmed = username.trim();
        if trimmed.is_empty() {
            changed = true;
        } else {
            if trimmed != username {
                changed = true;
            }
            config.username = Some(trimmed.to_string());
        }
    }

    changed
}

fn validate_config(config: &AppConfig) -> Result<(), AppError> {
    for (name, value) in config.rates.coefficients() {
        if !value.is_finite() || value < 0.0 {
            return Err(AppError::Config(format!(
                "Rate '{name}' must be a non-negative number, got {value}."
            )));
        }
    }

    let blocks = &config.blocks;
    let months = 1..=12;
    if !months.contains(&blocks.summer_start_month)
        || !months.contains(&blocks.summer_end_month)
        || blocks.summer_start_month > blocks.summer_end_month
    {
        return Err(AppError::Config(format!(
            "Summer months must satisfy 1 <= start <= end <= 12, got {}..{}.",
            blocks.summer_start_month, blocks.summer_end_month
        )));
    }
    if blocks.summer_block_kwh < 0.0 || blocks.winter_block_kwh < 0.0 {
        return Err(AppError::Config("Block sizes must be non-negative.".into()));
    }
    Ok(())
}

pub fn load_config_from(path: &Path) -> Result<AppConfig, AppError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }

    let raw = fs::read_to_string(path)?;
    let mut parsed: AppConfig = toml::from_str(&raw)?;
    if normalize_config(&mut parsed) {
        save_config_to(path, &parsed)?;
    }
    validate_config(&parsed)?;
    Ok(parsed)
}

pub fn save_config_to(path: &Path, config: &AppConfig) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, toml::to_string_pretty(config)?)?;
    Ok(())
}

pub fn load_config() -> Result<AppConfig, AppError> {
    load_config_from(&config_path()?)
}

pub fn save_config(config: &AppConfig) -> Result<(), AppError> {
    ensure_dirs()?;
    save_config_to(&config_path()?, config)
}

fn password_entry(username: &str) -> Result<keyring::Entry, AppError> {
    Ok(keyring::Entry::new(SERVICE_NAME, &format!("user:{username}"))?)
}

pub fn set_password(username: &str, password: &str) -> Result<(), AppError> {
    password_entry(username)?.set_password(password)?;
    Ok(())
}

pub fn delete_password(username: &str) -> Result<(), AppError> {
    match password_entry(username)?.delete_credential() {
        Ok(()) => Ok(()),
        Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(AppError::Keyring(e)),
    }
}

/// Keyring first, then `UTILITY_METER_PASSWORD`.
pub fn get_password(username: &str) -> Result<String, AppError> {
    if let Ok(value) = password_entry(username)?.get_password() {
        if !value.is_empty() {
            return Ok(value);
        }
    }

    if let Ok(value) = std::env::var(PASSWORD_ENV) {
        if !value.is_empty() {
            return Ok(value);
        }
    }

    Err(AppError::Config(format!(
        "No password found for '{username}'. Run `utility-meter set-credentials` or set {PASSWORD_ENV}."
    )))
}

pub fn ensure_initialized() -> Result<(), AppError> {
    ensure_dirs()?;
    let cfg_path = config_path()?;
    if !cfg_path.exists() {
        save_config(&AppConfig::default())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn normalize_strips_scheme_and_trailing_slash() {
        let mut cfg = AppConfig {
            base_domain: " https://portal.example/ ".into(),
            username: Some("  jane@example.com ".into()),
            ..AppConfig::default()
        };
        assert!(normalize_config(&mut cfg));
        assert_eq!(cfg.base_domain, "portal.example");
        assert_eq!(cfg.username.as_deref(), Some("jane@example.com"));
        assert!(!normalize_config(&mut cfg));
    }

    #[test]
    fn normalize_drops_blank_username_and_restores_domain() {
        let mut cfg = AppConfig {
            base_domain: "http://".into(),
            username: Some("   ".into()),
            ..AppConfig::default()
        };
        assert!(normalize_config(&mut cfg));
        assert_eq!(cfg.base_domain, DEFAULT_BASE_DOMAIN);
        assert!(cfg.username.is_none());
    }

    #[test]
    fn negative_rates_are_rejected() {
        let mut cfg = AppConfig::default();
        cfg.rates.second_block = -0.01;
        let err = validate_config(&cfg).expect_err("negative rate");
        assert!(err.to_string().contains("second_block"));
    }

    #[test]
    fn inverted_summer_months_are_rejected() {
        let mut cfg = AppConfig::default();
        cfg.blocks.summer_start_month = 10;
        cfg.blocks.summer_end_month = 3;
        assert!(matches!(validate_config(&cfg), Err(AppError::Config(_))));
    }

    #[test]
    fn missing_file_loads_defaults() {
        let home = TempDir::new().expect("temp dir");
        let cfg = load_config_from(&home.path().join("config.toml")).expect("defaults");
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.rates, published_rates());
    }

    #[test]
    fn partial_file_fills_defaults_and_is_rewritten_normalized() {
        let home = TempDir::new().expect("temp dir");
        let path = home.path().join("config").join("config.toml");
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(
            &path,
            "base_domain = \"https://portal.example/\"\nusername = \"jane\"\n\n[rates]\nbase = 0.5\n",
        )
        .expect("write");

        let cfg = load_config_from(&path).expect("load");
        assert_eq!(cfg.base_domain, "portal.example");
        assert_eq!(cfg.rates.base, 0.5);
        assert_eq!(cfg.rates.first_block, 0.0);
        assert_eq!(cfg.blocks, BlockSchedule::default());
        assert_eq!(cfg.authentication_url, DEFAULT_AUTHENTICATION_URL);

        let rewritten = fs::read_to_string(&path).expect("read back");
        assert!(rewritten.contains("base_domain = \"portal.example\""));
    }

    #[test]
    fn client_options_treat_blank_authentication_url_as_portal_default() {
        let cfg = AppConfig {
            authentication_url: "  ".into(),
            ..AppConfig::default()
        };
        let options = cfg.client_options();
        assert!(options.authentication_url.is_none());
        assert_eq!(
            options.endpoints().authentication_url(),
            format!("https://{DEFAULT_BASE_DOMAIN}/authenticate")
        );
        assert_eq!(options.rates, Some(published_rates()));
    }

    #[test]
    fn require_username_explains_the_fix() {
        let err = AppConfig::default().require_username().expect_err("unset");
        assert!(err.to_string().contains("set-credentials"));
    }
}
