use chrono::NaiveTime;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Deserializer, Serialize};
use std::env;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use url::Url;
use validator::{Validate, ValidateEmail};

use crate::plugins::traits::Locator;
use crate::scheduler::OperatingWindow;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub credentials: Credentials,
    #[validate(nested)]
    pub smtp: SmtpConfig,
    #[validate(nested)]
    pub thresholds: ThresholdConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Login for the watched site.
#[derive(Clone, Serialize, Deserialize, Validate)]
pub struct Credentials {
    #[validate(email)]
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize, Validate)]
pub struct SmtpConfig {
    #[serde(default = "default_smtp_host")]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[validate(email)]
    pub username: String,
    pub password: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
    #[serde(default = "default_smtp_timeout")]
    pub timeout_secs: u64,
}

impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("from_name", &self.from_name)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Which side of a threshold counts as "crossed".
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdDirection {
    #[default]
    AtOrBelow,
    Above,
}

impl ThresholdDirection {
    pub fn is_hit(self, value: u32, threshold: u32) -> bool {
        match self {
            ThresholdDirection::AtOrBelow => value <= threshold,
            ThresholdDirection::Above => value > threshold,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ThresholdConfig {
    #[serde(default = "default_fuel_threshold")]
    pub fuel_threshold: u32,
    #[serde(default = "default_co2_threshold")]
    pub co2_threshold: u32,
    #[serde(default)]
    pub direction: ThresholdDirection,
    /// A list, or one comma-separated string as given in the environment.
    #[validate(length(min = 1, message = "at least one recipient is required"))]
    #[serde(deserialize_with = "deserialize_recipients")]
    pub recipients: Vec<String>,
    #[validate(email)]
    pub admin_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub window_start: String,
    pub window_end: String,
    pub shutdown_grace_secs: u64,
    pub shutdown_force_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            window_start: "00:00".to_string(),
            window_end: "23:59:59".to_string(),
            shutdown_grace_secs: 10,
            shutdown_force_secs: 5,
        }
    }
}

impl ScheduleConfig {
    pub fn window(&self) -> Result<OperatingWindow, ConfigError> {
        let start = parse_time_of_day(&self.window_start)?;
        let end = parse_time_of_day(&self.window_end)?;
        OperatingWindow::new(start, end).ok_or_else(|| {
            ConfigError::Message(format!(
                "Operating window start {} must not be after end {}",
                start, end
            ))
        })
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn shutdown_force(&self) -> Duration {
        Duration::from_secs(self.shutdown_force_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub headless: bool,
    pub chrome_path: Option<String>,
    pub page_load_attempts: u32,
    pub page_load_backoff_ms: u64,
    pub page_load_timeout_ms: u64,
    pub login_attempts: u32,
    pub step_timeout_ms: u64,
    pub confirmation_timeout_ms: u64,
    pub extraction_timeout_ms: u64,
    pub logged_in_probe_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            page_load_attempts: 3,
            page_load_backoff_ms: 5_000,
            page_load_timeout_ms: 30_000,
            login_attempts: 3,
            step_timeout_ms: 10_000,
            confirmation_timeout_ms: 20_000,
            extraction_timeout_ms: 20_000,
            logged_in_probe_ms: 2_000,
        }
    }
}

impl SessionConfig {
    pub fn page_load_backoff(&self) -> Duration {
        Duration::from_millis(self.page_load_backoff_ms)
    }

    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_millis(self.page_load_timeout_ms)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms)
    }

    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_millis(self.extraction_timeout_ms)
    }

    pub fn logged_in_probe(&self) -> Duration {
        Duration::from_millis(self.logged_in_probe_ms)
    }
}

/// Where the prices live and how to reach them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub url: String,
    pub entry_button: Locator,
    pub registration_login_button: Locator,
    pub login_form: Locator,
    pub email_input: Locator,
    pub password_input: Locator,
    pub submit_button: Locator,
    pub post_login_marker: Locator,
    pub preloader: Locator,
    pub resources_button: Locator,
    pub fuel_price: Locator,
    pub co2_button: Locator,
    pub co2_price: Locator,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            url: "https://airlinemanager.com".to_string(),
            entry_button: Locator::xpath("/html/body/div[1]/div[1]/div/div[1]/button[1]"),
            registration_login_button: Locator::xpath("/html/body/div[3]/div[3]/div/form/div[2]/button"),
            login_form: Locator::xpath("/html/body/div[4]/div[3]/div/form"),
            email_input: Locator::name("lEmail"),
            password_input: Locator::name("lPass"),
            submit_button: Locator::id("btnLogin"),
            post_login_marker: Locator::id("mapMaint"),
            preloader: Locator::css("div.preloader"),
            resources_button: Locator::id("mapMaint"),
            fuel_price: Locator::xpath("/html/body/div[9]/div/div/div[3]/div[2]/div/div[1]/span[2]/b"),
            co2_button: Locator::id("popBtn2"),
            co2_price: Locator::xpath("/html/body/div[9]/div/div/div[3]/div[2]/div/div/div[2]/span[2]/b"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9001,
        }
    }
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    465
}

fn default_from_name() -> String {
    "Fuel Watcher".to_string()
}

fn default_smtp_timeout() -> u64 {
    30
}

fn default_fuel_threshold() -> u32 {
    600
}

fn default_co2_threshold() -> u32 {
    120
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RecipientList {
    List(Vec<String>),
    Joined(String),
}

fn deserialize_recipients<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let recipients = match RecipientList::deserialize(deserializer)? {
        RecipientList::List(list) => list,
        RecipientList::Joined(joined) => joined.split(',').map(str::to_string).collect(),
    };

    Ok(recipients
        .into_iter()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect())
}

/// Accepts `HH:MM` or `HH:MM:SS`.
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime, ConfigError> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|_| ConfigError::Message(format!("Invalid time of day '{}', expected HH:MM[:SS]", value)))
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Self::legacy_env_defaults(Config::builder())?
            // Optional file layers
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Environment variables with prefix "FUELWATCH_". Values stay
            // strings so secrets such as "007123" are passed through verbatim;
            // numeric fields are converted on deserialization.
            .add_source(
                Environment::with_prefix("FUELWATCH")
                    .prefix_separator("_")
                    .separator("__"),
            );

        let mut config: AppConfig = builder.build()?.try_deserialize()?;

        // Add Chrome path from environment if not set
        if config.session.chrome_path.is_none() {
            config.session.chrome_path = env::var("CHROME_PATH").ok();
        }

        config.validate()?;
        Ok(config)
    }

    /// Built-in defaults plus a single config file; the environment is not consulted.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config: AppConfig = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// The un-prefixed variable names of earlier deployments, honoured as
    /// lowest-priority values.
    fn legacy_env_defaults(
        mut builder: ConfigBuilder<DefaultState>,
    ) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        let legacy = [
            ("AIRLINE_MANAGER_EMAIL", "credentials.email"),
            ("AIRLINE_MANAGER_PASSWORD", "credentials.password"),
            ("MAIL_SENDER_USN", "smtp.username"),
            ("MAIL_SENDER_PWD", "smtp.password"),
            ("MAIL_RECIPIENT_1", "thresholds.admin_address"),
        ];

        for (var, key) in legacy {
            if let Ok(value) = env::var(var) {
                builder = builder.set_default(key, value)?;
            }
        }

        if let Ok(recipient) = env::var("MAIL_RECIPIENT_1") {
            builder = builder.set_default("thresholds.recipients", vec![recipient])?;
        }

        Ok(builder)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate credentials
        if self.credentials.email.trim().is_empty() || self.credentials.password.trim().is_empty() {
            return Err(ConfigError::Message("Site credentials must not be blank".into()));
        }

        // Validate SMTP configuration
        if self.smtp.host.trim().is_empty() {
            return Err(ConfigError::Message("SMTP host must not be blank".into()));
        }

        if self.smtp.port == 0 {
            return Err(ConfigError::Message("SMTP port must be greater than 0".into()));
        }

        if self.smtp.password.trim().is_empty() {
            return Err(ConfigError::Message("SMTP password must not be blank".into()));
        }

        // Validate recipients
        if self.thresholds.recipients.is_empty() {
            return Err(ConfigError::Message("At least one recipient is required".into()));
        }

        if let Some(bad) = self.thresholds.recipients.iter().find(|r| !r.validate_email()) {
            return Err(ConfigError::Message(format!("Invalid recipient address '{}'", bad)));
        }

        // Validate schedule configuration
        self.schedule.window()?;

        // Validate session configuration
        if self.session.page_load_attempts == 0 || self.session.login_attempts == 0 {
            return Err(ConfigError::Message("Session retry budgets must be greater than 0".into()));
        }

        if Url::parse(&self.site.url).is_err() {
            return Err(ConfigError::Message("Invalid site URL format".into()));
        }

        // Validate metrics configuration
        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(ConfigError::Message("Metrics port must be greater than 0".into()));
        }

        // Field level checks (email formats)
        Validate::validate(self).map_err(|e| ConfigError::Message(format!("Invalid configuration: {}", e)))?;

        Ok(())
    }
}
