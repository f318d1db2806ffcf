/// Configuration management for image-variant-service
///
/// Loads configuration from environment variables with sensible defaults.
use crate::error::ConfigError;
use crate::models::{OutputFormat, TierName};
use crate::services::variants::tier::{TierPolicy, TierProfile};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_QUALITY: u8 = 85;
pub const DEFAULT_TARGET_WIDTHS: [u32; 2] = [700, 1400];
pub const DEFAULT_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

#[derive(Clone, Debug)]
pub struct Config {
    pub app: AppConfig,
    pub s3: S3Config,
    pub variants: VariantConfig,
    pub tiers: TierPolicy,
    pub worker: WorkerConfig,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub env: String,
}

#[derive(Clone, Debug)]
pub struct S3Config {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub endpoint: Option<String>,
    pub force_path_style: bool,
}

/// Per-call variant settings, threaded through planning and rendering
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariantConfig {
    /// Encoder quality shared by every lossy output format (1-100)
    pub quality: u8,
    /// Strictly ascending widths to try, before the original-width re-encode
    pub target_widths: Vec<u32>,
    /// Ordered, de-duplicated output formats
    pub output_formats: Vec<OutputFormat>,
    /// Upper bound on renders in flight within one job
    pub render_concurrency: usize,
    pub cache_control: String,
}

impl Default for VariantConfig {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            target_widths: DEFAULT_TARGET_WIDTHS.to_vec(),
            output_formats: vec![OutputFormat::Webp, OutputFormat::OriginalPreserving],
            render_concurrency: 1,
            cache_control: DEFAULT_CACHE_CONTROL.to_string(),
        }
    }
}

impl VariantConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.quality) {
            return Err(ConfigError::Quality(self.quality));
        }
        if self.target_widths.iter().any(|w| *w == 0) {
            return Err(ConfigError::TargetWidths("widths must be positive".into()));
        }
        if self.target_widths.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(ConfigError::TargetWidths(format!(
                "{:?} is not strictly ascending",
                self.target_widths
            )));
        }
        if self.output_formats.is_empty() {
            return Err(ConfigError::NoOutputFormats);
        }
        if self.render_concurrency == 0 {
            return Err(ConfigError::RenderConcurrency);
        }
        Ok(())
    }
}

/// Settings of the worker pool this process belongs to
#[derive(Clone, Debug, Default)]
pub struct WorkerConfig {
    /// Tier whose capacity this worker was provisioned with, if tier-segregated
    pub served_tier: Option<TierName>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Config {
            app: AppConfig {
                host: std::env::var("VARIANT_SERVICE_HOST")
                    .unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_setting("VARIANT_SERVICE_PORT", 8080)?,
                env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            },
            s3: S3Config {
                region: std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
                access_key_id: std::env::var("AWS_ACCESS_KEY_ID").ok(),
                secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").ok(),
                endpoint: std::env::var("S3_ENDPOINT").ok(),
                force_path_style: env_setting("S3_FORCE_PATH_STYLE", false)?,
            },
            variants: variant_config_from_env()?,
            tiers: tier_policy_from_env()?,
            worker: WorkerConfig {
                served_tier: match std::env::var("VARIANT_WORKER_TIER") {
                    Ok(raw) => Some(TierName::parse(&raw).ok_or(ConfigError::InvalidValue {
                        name: "VARIANT_WORKER_TIER".to_string(),
                        value: raw,
                    })?),
                    Err(_) => None,
                },
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.variants.validate()?;
        self.tiers.validate()
    }
}

fn variant_config_from_env() -> Result<VariantConfig, ConfigError> {
    let defaults = VariantConfig::default();

    let target_widths = match std::env::var("VARIANT_TARGET_WIDTHS") {
        Ok(raw) => parse_widths(&raw)?,
        Err(_) => defaults.target_widths,
    };

    let output_formats = match std::env::var("VARIANT_OUTPUT_FORMATS") {
        Ok(raw) => parse_formats(&raw)?,
        Err(_) => defaults.output_formats,
    };

    Ok(VariantConfig {
        quality: env_setting("VARIANT_QUALITY", defaults.quality)?,
        target_widths,
        output_formats,
        render_concurrency: env_setting(
            "VARIANT_RENDER_CONCURRENCY",
            defaults.render_concurrency,
        )?,
        cache_control: std::env::var("VARIANT_CACHE_CONTROL")
            .unwrap_or(defaults.cache_control),
    })
}

/// Read an optional numeric setting; present but unparsable is an error, not the default
fn env_setting<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => parse_setting(name, &raw),
        Err(_) => Ok(default),
    }
}

pub fn parse_setting<T: FromStr>(name: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name: name.to_string(),
        value: raw.to_string(),
    })
}

/// Parse a comma-separated width list such as `700,1400`
pub fn parse_widths(raw: &str) -> Result<Vec<u32>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u32>()
                .map_err(|_| ConfigError::TargetWidths(format!("not an integer: {s}")))
        })
        .collect()
}

/// Parse a comma-separated format list such as `webp,original`, keeping first occurrences
pub fn parse_formats(raw: &str) -> Result<Vec<OutputFormat>, ConfigError> {
    let mut formats = Vec::new();
    for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let format = OutputFormat::parse(item).ok_or(ConfigError::InvalidValue {
            name: "VARIANT_OUTPUT_FORMATS".to_string(),
            value: item.to_string(),
        })?;
        if !formats.contains(&format) {
            formats.push(format);
        }
    }
    Ok(formats)
}

fn tier_policy_from_env() -> Result<TierPolicy, ConfigError> {
    let defaults = TierPolicy::default();
    let mut profiles = Vec::with_capacity(TierName::ALL.len());

    for (index, default) in defaults.profiles().iter().enumerate() {
        let n = index + 1;
        let read_u64 = |suffix: &str, fallback: u64| -> Result<u64, ConfigError> {
            env_setting(&format!("TIER{n}_{suffix}"), fallback)
        };

        profiles.push(TierProfile {
            name: default.name,
            min_bytes: read_u64("MIN_BYTES", default.min_bytes)?,
            max_bytes: read_u64("MAX_BYTES", default.max_bytes)?,
            memory_budget_mb: read_u64("MEMORY_MB", default.memory_budget_mb)?,
            ephemeral_storage_budget_mb: read_u64(
                "EPHEMERAL_STORAGE_MB",
                default.ephemeral_storage_budget_mb,
            )?,
            timeout_budget: Duration::from_secs(read_u64(
                "TIMEOUT_SECS",
                default.timeout_budget.as_secs(),
            )?),
        });
    }

    TierPolicy::new(profiles)
}
