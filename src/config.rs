use serde::de::{self, Deserializer};
use serde::Deserialize;
use std::fmt::Display;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file at {path}: {source}")]
    ParseFile {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to load config from environment: {0}")]
    Environment(#[from] envy::Error),
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("Email is enabled but missing required fields: {}", .0.join(", "))]
    MissingEmailFields(Vec<&'static str>),
    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Connection settings for the monitored database.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub schema: String,
    pub table: String,
}

/// SMTP session and message settings. Credential and recipient fields are
/// empty when not configured; they are only validated when email is enabled.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailConfig {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub sender_email: String,
    pub sender_password: String,
    pub recipient_email: String,
    /// Raw comma separated CC list, as configured.
    pub cc_email: String,
    pub subject_prefix: String,
}

impl EmailConfig {
    /// Environment names of required fields that are not set.
    pub fn missing_required_fields(&self) -> Vec<&'static str> {
        [
            ("SENDER_EMAIL", &self.sender_email),
            ("SENDER_PASSWORD", &self.sender_password),
            ("RECIPIENT_EMAIL", &self.recipient_email),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub check_interval_minutes: u32,
    pub time_window_minutes: u32,
    pub target_status_id: i32,
    pub enable_console: bool,
    pub enable_email: bool,
}

/// Everything the monitor needs, resolved once at startup and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub email: EmailConfig,
    pub monitor: MonitorConfig,
    pub log_dir: Option<String>,
    /// Config file that was requested but does not exist. Reported by the
    /// caller once logging is up.
    pub missing_config_file: Option<String>,
}

// Partial config for layering. Keys mirror the environment variable names in
// lowercase, so the same struct is filled from the TOML file and by envy.
#[derive(Deserialize, Default, Debug, Clone)]
#[serde(default)]
struct PartialAppConfig {
    #[serde(deserialize_with = "non_empty")]
    db_host: Option<String>,
    #[serde(deserialize_with = "number")]
    db_port: Option<u16>,
    #[serde(deserialize_with = "non_empty")]
    db_name: Option<String>,
    #[serde(deserialize_with = "non_empty")]
    db_user: Option<String>,
    #[serde(deserialize_with = "non_empty")]
    db_password: Option<String>,
    #[serde(deserialize_with = "non_empty")]
    db_schema: Option<String>,
    #[serde(deserialize_with = "non_empty")]
    db_table: Option<String>,
    #[serde(deserialize_with = "non_empty")]
    smtp_server: Option<String>,
    #[serde(deserialize_with = "number")]
    smtp_port: Option<u16>,
    #[serde(deserialize_with = "non_empty")]
    sender_email: Option<String>,
    #[serde(deserialize_with = "non_empty")]
    sender_password: Option<String>,
    #[serde(deserialize_with = "non_empty")]
    recipient_email: Option<String>,
    #[serde(deserialize_with = "non_empty")]
    cc_email: Option<String>,
    #[serde(deserialize_with = "non_empty")]
    email_subject_prefix: Option<String>,
    #[serde(deserialize_with = "number")]
    check_interval: Option<u32>,
    #[serde(deserialize_with = "number")]
    time_window: Option<u32>,
    #[serde(deserialize_with = "number")]
    target_status_id: Option<i32>,
    #[serde(deserialize_with = "flag")]
    enable_console: Option<bool>,
    #[serde(deserialize_with = "flag")]
    enable_email: Option<bool>,
    #[serde(deserialize_with = "non_empty")]
    log_dir: Option<String>,
}

// Environment values always arrive as text, TOML values may be typed.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar<T> {
    Typed(T),
    Text(String),
}

/// Empty values are treated as unset.
fn non_empty<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.filter(|v| !v.trim().is_empty()))
}

fn number<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    T::Err: Display,
{
    match Option::<Scalar<T>>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Scalar::Typed(value)) => Ok(Some(value)),
        Some(Scalar::Text(raw)) if raw.trim().is_empty() => Ok(None),
        Some(Scalar::Text(raw)) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| de::Error::custom(format!("invalid number '{raw}': {e}"))),
    }
}

/// Textual flags are true only for `true`, in any case.
fn flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Scalar<bool>>::deserialize(deserializer)? {
        None => None,
        Some(Scalar::Typed(value)) => Some(value),
        Some(Scalar::Text(raw)) if raw.trim().is_empty() => None,
        Some(Scalar::Text(raw)) => Some(raw.trim().eq_ignore_ascii_case("true")),
    })
}

impl PartialAppConfig {
    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::ParseFile {
            path: path.display().to_string(),
            source,
        })
    }

    /// `self` wins over `lower` field by field.
    fn over(self, lower: Self) -> Self {
        Self {
            db_host: self.db_host.or(lower.db_host),
            db_port: self.db_port.or(lower.db_port),
            db_name: self.db_name.or(lower.db_name),
            db_user: self.db_user.or(lower.db_user),
            db_password: self.db_password.or(lower.db_password),
            db_schema: self.db_schema.or(lower.db_schema),
            db_table: self.db_table.or(lower.db_table),
            smtp_server: self.smtp_server.or(lower.smtp_server),
            smtp_port: self.smtp_port.or(lower.smtp_port),
            sender_email: self.sender_email.or(lower.sender_email),
            sender_password: self.sender_password.or(lower.sender_password),
            recipient_email: self.recipient_email.or(lower.recipient_email),
            cc_email: self.cc_email.or(lower.cc_email),
            email_subject_prefix: self.email_subject_prefix.or(lower.email_subject_prefix),
            check_interval: self.check_interval.or(lower.check_interval),
            time_window: self.time_window.or(lower.time_window),
            target_status_id: self.target_status_id.or(lower.target_status_id),
            enable_console: self.enable_console.or(lower.enable_console),
            enable_email: self.enable_email.or(lower.enable_email),
            log_dir: self.log_dir.or(lower.log_dir),
        }
    }
}

fn positive_minutes(key: &'static str, value: u32) -> Result<u32, ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            reason: "must be a positive number of minutes".to_string(),
        });
    }
    Ok(value)
}

impl AppConfig {
    /// Loads `.env`, then the optional TOML file, then the process environment.
    /// Environment overrides the file, the file overrides defaults.
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let env_config = envy::from_env::<PartialAppConfig>()?;
        Self::load_layers(config_path, env_config)
    }

    fn load_layers(
        config_path: Option<&str>,
        env_config: PartialAppConfig,
    ) -> Result<Self, ConfigError> {
        let mut missing_config_file = None;
        let file_config = match config_path {
            Some(path_str) => {
                let path = Path::new(path_str);
                if path.exists() {
                    PartialAppConfig::from_file(path)?
                } else {
                    missing_config_file = Some(path_str.to_string());
                    PartialAppConfig::default()
                }
            }
            None => PartialAppConfig::default(),
        };

        let mut config = Self::resolve(env_config.over(file_config))?;
        config.missing_config_file = missing_config_file;
        Ok(config)
    }

    fn resolve(partial: PartialAppConfig) -> Result<Self, ConfigError> {
        let database = DatabaseConfig {
            host: partial.db_host.unwrap_or_else(|| "localhost".to_string()),
            port: partial.db_port.unwrap_or(5432),
            database: partial.db_name.ok_or(ConfigError::MissingField("DB_NAME"))?,
            user: partial.db_user.ok_or(ConfigError::MissingField("DB_USER"))?,
            password: partial.db_password.unwrap_or_default(),
            schema: partial.db_schema.unwrap_or_else(|| "public".to_string()),
            table: partial.db_table.ok_or(ConfigError::MissingField("DB_TABLE"))?,
        };

        let email = EmailConfig {
            smtp_server: partial
                .smtp_server
                .unwrap_or_else(|| "smtp.gmail.com".to_string()),
            smtp_port: partial.smtp_port.unwrap_or(587),
            sender_email: partial.sender_email.unwrap_or_default(),
            sender_password: partial.sender_password.unwrap_or_default(),
            recipient_email: partial.recipient_email.unwrap_or_default(),
            cc_email: partial.cc_email.unwrap_or_default(),
            subject_prefix: partial
                .email_subject_prefix
                .unwrap_or_else(|| "Database Alert".to_string()),
        };

        let monitor = MonitorConfig {
            check_interval_minutes: positive_minutes(
                "CHECK_INTERVAL",
                partial.check_interval.unwrap_or(5),
            )?,
            time_window_minutes: positive_minutes("TIME_WINDOW", partial.time_window.unwrap_or(30))?,
            target_status_id: partial.target_status_id.unwrap_or(3),
            enable_console: partial.enable_console.unwrap_or(true),
            enable_email: partial.enable_email.unwrap_or(true),
        };

        if monitor.enable_email {
            let missing = email.missing_required_fields();
            if !missing.is_empty() {
                return Err(ConfigError::MissingEmailFields(missing));
            }
        }

        Ok(AppConfig {
            database,
            email,
            monitor,
            log_dir: partial.log_dir,
            missing_config_file: None,
        })
    }
}
