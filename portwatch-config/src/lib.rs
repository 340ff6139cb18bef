//! Typed settings for the snapshot run: which sources to scrape, how to
//! reach them, and where the snapshot lands.
//!
//! Sources are merged in the order they are added; `PORTWATCH__`-prefixed
//! environment variables (nested keys separated by `__`, e.g.
//! `PORTWATCH__OUTPUT__DIR`) are applied on top, and `${VAR}` placeholders
//! inside string values are expanded after merging. Every field has a
//! default, so an empty document describes the two built-in sources.
use chrono_tz::Tz;
use config::{Config, ConfigError, Environment, File};
use portwatch_common::{OutputFormat, Port};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Bound on nested `${VAR}` rounds, so self-referencing variables terminate.
const INTERPOLATION_PASSES: usize = 8;

pub const SYDNEY_MOVEMENTS_URL: &str = "https://www.portauthoritynsw.com.au/port-operations/sydney-harbour/sydney-harbour-daily-vessel-movements";
pub const MELBOURNE_MOVEMENTS_URL: &str = "https://ports.vic.gov.au/marine-operations/ship-movements/";

#[derive(Debug, Clone, Deserialize)]
pub struct PortwatchConfig {
    #[serde(default)]
    pub version: Option<String>,
    /// IANA zone used for `captured_at` and `generated_at`.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceSpec>,
}

impl Default for PortwatchConfig {
    fn default() -> Self {
        Self {
            version: None,
            timezone: default_timezone(),
            output: OutputConfig::default(),
            http: HttpConfig::default(),
            sources: default_sources(),
        }
    }
}

impl PortwatchConfig {
    /// Parsed reference zone.
    pub fn zone(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| ConfigError::Message(format!("invalid timezone {:?}: {e}", self.timezone)))
    }

    /// Checks that deserialization alone cannot express: a known timezone
    /// and a page cap that admits at least one page of rows.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.zone()?;
        for spec in &self.sources {
            if let SourceDetails::PaginatedTable { config } = &spec.details {
                if config.max_pages == 0 {
                    return Err(ConfigError::Message(format!(
                        "source {}: max_pages must be at least 1",
                        spec.port
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceSpec> {
        self.sources.iter().filter(|s| s.enabled.unwrap_or(true))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_file_stem")]
    pub file_stem: String,
    #[serde(default)]
    pub format: OutputFormat,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            file_stem: default_file_stem(),
            format: OutputFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_retries")]
    pub retries: usize,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            retries: default_retries(),
            user_agent: None,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Shared fields + the per-kind details.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceSpec {
    pub port: Port,
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Wall-clock budget for the whole source, all pages included.
    #[serde(default)]
    pub deadline_secs: Option<u64>,
    #[serde(flatten)]
    pub details: SourceDetails,
}

impl SourceSpec {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs.unwrap_or(DEFAULT_DEADLINE_SECS))
    }

    pub fn url(&self) -> &str {
        match &self.details {
            SourceDetails::PaginatedTable { config } => &config.url,
            SourceDetails::HeadingKeyed { config } => &config.url,
        }
    }

    pub fn tls_verify(&self) -> bool {
        match &self.details {
            SourceDetails::PaginatedTable { config } => config.tls_verify,
            SourceDetails::HeadingKeyed { config } => config.tls_verify,
        }
    }
}

/// The tag is `kind`; the payload lives in `config`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind")]
pub enum SourceDetails {
    #[serde(rename = "paginated_table")]
    PaginatedTable { config: PaginatedTableConfig },

    #[serde(rename = "heading_keyed")]
    HeadingKeyed { config: HeadingKeyedConfig },
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaginatedTableConfig {
    pub url: String,
    #[serde(default = "default_page_param")]
    pub page_param: String,
    #[serde(default = "default_first_page")]
    pub first_page: u32,
    /// Most pages with rows that are accepted; a site still paging past
    /// this marks the source partial.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_keyword")]
    pub classification: String,
    #[serde(default = "default_true")]
    pub tls_verify: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeadingKeyedConfig {
    pub url: String,
    #[serde(default = "default_heading_tag")]
    pub heading_tag: String,
    #[serde(default = "default_keyword")]
    pub keyword: String,
    #[serde(default = "default_true")]
    pub tls_verify: bool,
}

const DEFAULT_DEADLINE_SECS: u64 = 120;

fn default_timezone() -> String {
    "Australia/Sydney".into()
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}
fn default_file_stem() -> String {
    "combined_arrivals".into()
}
fn default_timeout_secs() -> u64 {
    15
}
fn default_connect_timeout_secs() -> u64 {
    5
}
fn default_retries() -> usize {
    2
}
fn default_page_param() -> String {
    "page".into()
}
fn default_first_page() -> u32 {
    1
}
fn default_max_pages() -> u32 {
    50
}
fn default_keyword() -> String {
    "arrival".into()
}
fn default_heading_tag() -> String {
    "h3".into()
}
fn default_true() -> bool {
    true
}

fn default_sources() -> Vec<SourceSpec> {
    vec![
        SourceSpec {
            port: Port::Sydney,
            enabled: None,
            deadline_secs: None,
            details: SourceDetails::PaginatedTable {
                config: PaginatedTableConfig {
                    url: SYDNEY_MOVEMENTS_URL.into(),
                    page_param: default_page_param(),
                    first_page: default_first_page(),
                    max_pages: default_max_pages(),
                    classification: default_keyword(),
                    tls_verify: true,
                },
            },
        },
        SourceSpec {
            port: Port::Melbourne,
            enabled: None,
            deadline_secs: None,
            details: SourceDetails::HeadingKeyed {
                config: HeadingKeyedConfig {
                    url: MELBOURNE_MOVEMENTS_URL.into(),
                    heading_tag: default_heading_tag(),
                    keyword: default_keyword(),
                    // The Ports Victoria chain has not validated with stock roots.
                    tls_verify: false,
                },
            },
        },
    ]
}

/// Expand `${VAR}` until the text settles; unknown variables stay literal.
fn interpolate(raw: &str) -> String {
    let mut current = raw.to_owned();
    for _ in 0..INTERPOLATION_PASSES {
        let next =
            shellexpand::env_with_context_no_errors(&current, |name| std::env::var(name).ok())
                .into_owned();
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn interpolate_strings(value: &mut Value) {
    match value {
        Value::String(s) if s.contains('$') => *s = interpolate(s),
        Value::Array(items) => items.iter_mut().for_each(interpolate_strings),
        Value::Object(fields) => fields.values_mut().for_each(interpolate_strings),
        _ => {}
    }
}

/// Layers YAML files and snippets, then `PORTWATCH__` env vars, into a [`PortwatchConfig`].
pub struct PortwatchConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for PortwatchConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl PortwatchConfigLoader {
    /// Start empty; `PORTWATCH__` env overrides are layered on at [`Self::load`].
    ///
    /// ```
    /// use portwatch_config::PortwatchConfigLoader;
    ///
    /// let config = PortwatchConfigLoader::new()
    ///     .with_yaml_str("version: '1'")
    ///     .load()
    ///     .expect("version-only document");
    ///
    /// assert_eq!(config.version.as_deref(), Some("1"));
    /// assert_eq!(config.sources.len(), 2);
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
        }
    }

    /// Attach a YAML/TOML/JSON file that must exist; format is inferred by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Attach a file that is skipped when absent, for env-only deployments.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Merge an inline YAML snippet.
    ///
    /// ```
    /// use portwatch_common::Port;
    /// use portwatch_config::{PortwatchConfigLoader, SourceDetails};
    ///
    /// let cfg = PortwatchConfigLoader::new()
    ///     .with_yaml_str(
    ///         r#"
    /// sources:
    ///   - port: melbourne
    ///     kind: heading_keyed
    ///     config:
    ///       url: "https://ports.example.com/movements"
    ///       tls_verify: false
    /// "#,
    ///     )
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(cfg.sources.len(), 1);
    /// assert_eq!(cfg.sources[0].port, Port::Melbourne);
    /// assert!(!cfg.sources[0].tls_verify());
    /// assert!(matches!(cfg.sources[0].details, SourceDetails::HeadingKeyed { .. }));
    /// ```
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Merge every layer and build the typed config.
    ///
    /// `${VAR}` placeholders are expanded before the typed structs are built,
    /// then the result is checked with [`PortwatchConfig::validate`].
    ///
    /// ```
    /// use portwatch_config::{PortwatchConfigLoader, SourceDetails};
    ///
    /// unsafe { std::env::set_var("SYDNEY_URL", "https://mirror.example.com/sydney"); }
    ///
    /// let config = PortwatchConfigLoader::new()
    ///     .with_yaml_str(r#"
    /// timezone: "Australia/Melbourne"
    /// sources:
    ///   - port: sydney
    ///     kind: paginated_table
    ///     config:
    ///       url: "${SYDNEY_URL}"
    ///       max_pages: 10
    /// "#)
    ///     .load()
    ///     .expect("sydney override");
    ///
    /// match &config.sources[0].details {
    ///     SourceDetails::PaginatedTable { config } => {
    ///         assert_eq!(config.url, "https://mirror.example.com/sydney");
    ///         assert_eq!(config.max_pages, 10);
    ///         assert_eq!(config.page_param, "page");
    ///         assert!(config.tls_verify);
    ///     }
    ///     _ => panic!("expected paginated table"),
    /// }
    ///
    /// unsafe { std::env::remove_var("SYDNEY_URL"); }
    /// ```
    pub fn load(self) -> Result<PortwatchConfig, ConfigError> {
        // Env is added last so it wins over every file/snippet.
        let cfg = self
            .builder
            .add_source(
                Environment::with_prefix("PORTWATCH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut merged: Value = cfg.try_deserialize()?;
        interpolate_strings(&mut merged);

        let parsed: PortwatchConfig =
            serde_json::from_value(merged).map_err(|e| ConfigError::Message(e.to_string()))?;
        parsed.validate()?;
        Ok(parsed)
    }
}
