//! Configuration and environment selection.
use config::{Config as ConfigLib, Environment, File};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, str::FromStr};
use thiserror::Error;

pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 3;
const MAX_UTC_OFFSET_HOURS: i32 = 14;

const DEVELOPMENT_COMPLIANCE_BASE: &str = "http://localhost:5212/";
const DEVELOPMENT_PRODUCTION_BASE: &str = "http://qpt.invoiceq.com/service/core/";
const SIMULATION_BASE: &str = "https://staging.fotara.com/";
const PRODUCTION_BASE: &str = "https://prod.fotara.com/";

/// Service environment. Selects default endpoints and the CSR template name.
///
/// # Examples
/// ```rust
/// use std::str::FromStr;
/// use fotara_core::config::EnvironmentType;
///
/// let env = EnvironmentType::from_str("sim")?;
/// assert_eq!(env, EnvironmentType::Simulation);
/// # Ok::<(), fotara_core::config::ConfigError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EnvironmentType {
    #[default]
    Development,
    Simulation,
    Production,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid environment type: {input}")]
    InvalidEnvironment { input: String },
    #[error("UTC offset of {hours} hours is outside -14..=14")]
    InvalidUtcOffset { hours: i32 },
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

impl FromStr for EnvironmentType {
    type Err = ConfigError;
    fn from_str(env: &str) -> Result<EnvironmentType, ConfigError> {
        match env.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(EnvironmentType::Development),
            "sim" | "simulation" => Ok(EnvironmentType::Simulation),
            "prod" | "production" => Ok(EnvironmentType::Production),
            _ => Err(ConfigError::InvalidEnvironment {
                input: env.to_string(),
            }),
        }
    }
}

impl EnvironmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentType::Development => "development",
            EnvironmentType::Simulation => "simulation",
            EnvironmentType::Production => "production",
        }
    }

    pub fn default_endpoints(&self) -> Endpoints {
        match self {
            EnvironmentType::Development => Endpoints {
                compliance_csr: format!("{DEVELOPMENT_COMPLIANCE_BASE}v1/compliance/csr"),
                compliance_invoice: format!("{DEVELOPMENT_COMPLIANCE_BASE}v1/compliance/invoice"),
                production_certificate: format!("{DEVELOPMENT_COMPLIANCE_BASE}v1/prod/certificate"),
                clearance: format!("{DEVELOPMENT_PRODUCTION_BASE}invoices/clearance"),
                reporting: format!("{DEVELOPMENT_PRODUCTION_BASE}invoices/reporting"),
            },
            EnvironmentType::Simulation => Endpoints::under(SIMULATION_BASE),
            EnvironmentType::Production => Endpoints::under(PRODUCTION_BASE),
        }
    }

    /// Certificate template name requested in the CSR.
    pub fn certificate_template(&self) -> &'static str {
        match self {
            EnvironmentType::Development => "NQCSignature",
            EnvironmentType::Simulation => "SIM_TEMP",
            EnvironmentType::Production => "PROD_TEMP",
        }
    }
}

impl std::fmt::Display for EnvironmentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Service URLs for each call made by the API client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    pub compliance_csr: String,
    pub compliance_invoice: String,
    pub production_certificate: String,
    pub clearance: String,
    pub reporting: String,
}

impl Endpoints {
    /// All five endpoints under one base URL.
    ///
    /// ```rust
    /// use fotara_core::config::Endpoints;
    ///
    /// let endpoints = Endpoints::under("http://127.0.0.1:8080");
    /// assert_eq!(endpoints.compliance_csr, "http://127.0.0.1:8080/v1/compliance/csr");
    /// ```
    pub fn under(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            compliance_csr: format!("{base}/v1/compliance/csr"),
            compliance_invoice: format!("{base}/v1/compliance/invoice"),
            production_certificate: format!("{base}/v1/prod/certificate"),
            clearance: format!("{base}/v1/prod/invoice"),
            reporting: format!("{base}/v1/prod/report/invoice"),
        }
    }
}

/// Raw layered settings before per-environment defaults are applied.
#[derive(Debug, Deserialize)]
struct Settings {
    env: String,
    base_url: Option<String>,
    certificate_template: Option<String>,
    utc_offset_hours: i32,
}

/// Process-wide settings, built once at start-up and passed by reference.
///
/// # Examples
/// ```rust
/// use fotara_core::config::{Config, EnvironmentType};
///
/// let config = Config::new(EnvironmentType::Simulation);
/// assert_eq!(config.certificate_template(), "SIM_TEMP");
/// assert_eq!(config.utc_offset_hours(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    env: EnvironmentType,
    endpoints: Endpoints,
    certificate_template: String,
    utc_offset_hours: i32,
}

impl Config {
    pub fn new(env: EnvironmentType) -> Self {
        Self {
            env,
            endpoints: env.default_endpoints(),
            certificate_template: env.certificate_template().to_string(),
            utc_offset_hours: DEFAULT_UTC_OFFSET_HOURS,
        }
    }

    /// Defaults, then `fotara.toml`, then `FOTARA_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_sources(None)
    }

    pub fn load_with_sources(
        env_vars: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = ConfigLib::builder()
            .set_default("env", EnvironmentType::default().as_str())?
            .set_default("utc_offset_hours", DEFAULT_UTC_OFFSET_HOURS)?
            .add_source(File::with_name("fotara").required(false));

        // An explicit map replaces the process environment so tests stay isolated
        if let Some(vars) = env_vars {
            for (key, value) in vars {
                builder = builder.set_override(&key, value)?;
            }
        } else {
            // FOTARA_ENV, FOTARA_BASE_URL, FOTARA_UTC_OFFSET_HOURS, ...
            builder = builder.add_source(
                Environment::with_prefix("FOTARA")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let settings: Settings = builder.build()?.try_deserialize()?;
        Self::from_settings(settings)
    }

    fn from_settings(settings: Settings) -> Result<Self, ConfigError> {
        let env = EnvironmentType::from_str(&settings.env)?;
        let mut config = Self::new(env).with_utc_offset(settings.utc_offset_hours)?;
        if let Some(base) = settings.base_url.filter(|b| !b.trim().is_empty()) {
            config.endpoints = Endpoints::under(&base);
        }
        if let Some(template) = settings.certificate_template.filter(|t| !t.trim().is_empty()) {
            config.certificate_template = template;
        }
        Ok(config)
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_utc_offset(mut self, hours: i32) -> Result<Self, ConfigError> {
        if hours.abs() > MAX_UTC_OFFSET_HOURS {
            return Err(ConfigError::InvalidUtcOffset { hours });
        }
        self.utc_offset_hours = hours;
        Ok(self)
    }

    pub fn env(&self) -> EnvironmentType {
        self.env
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn certificate_template(&self) -> &str {
        &self.certificate_template
    }

    pub fn utc_offset_hours(&self) -> i32 {
        self.utc_offset_hours
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(EnvironmentType::default())
    }
}
