//! ---
//! devsim_section: "01-core-functionality"
//! devsim_subsection: "module"
//! devsim_type: "source"
//! devsim_scope: "code"
//! devsim_description: "Configuration model and loading for the device simulator."
//! devsim_version: "v0.1.0"
//! devsim_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_namespace_uri() -> String {
    "urn:devsim:simulated-devices".to_owned()
}

fn default_base_offset() -> u32 {
    10_000
}

fn default_simulation_seed() -> u64 {
    0xD3_51A1
}

fn default_simulation_enabled() -> bool {
    true
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_device_count() -> u32 {
    5
}

fn default_period() -> Duration {
    Duration::from_secs(1)
}

/// Primary configuration object for the simulator daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub devices: IndexMap<String, DeviceKindConfig>,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "DEVSIM_CONFIG";

    /// Load configuration from disk, respecting the `DEVSIM_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Retrieve a device kind configuration by identifier.
    pub fn device_kind(&self, kind: &str) -> Option<&DeviceKindConfig> {
        self.devices.get(kind)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.server.namespace_uri.trim().is_empty() {
            return Err(anyhow!("server.namespace_uri must not be empty"));
        }
        if self.devices.is_empty() {
            return Err(anyhow!("configuration must declare at least one device kind"));
        }
        if !(0.0..1.0).contains(&self.simulation.null_frequency) {
            return Err(anyhow!(
                "simulation.null_frequency must lie in [0, 1), got {}",
                self.simulation.null_frequency
            ));
        }
        for (kind, device) in &self.devices {
            device.validate(kind)?;
        }
        Ok(())
    }
}

impl Default for AppConfig {
    /// Reference deployment: five refrigerators and five boilers.
    fn default() -> Self {
        let mut devices = IndexMap::new();
        devices.insert(
            "refrigerators".to_owned(),
            DeviceKindConfig {
                template: "refrigerator".to_owned(),
                template_path: None,
                folder: "Refrigerators".to_owned(),
                name_prefix: "Refrigerator".to_owned(),
                count: default_device_count(),
                stride: 10,
                period: Duration::from_secs(5),
                rules: vec![RuleConfig {
                    target: "ActualTemperature".to_owned(),
                    kind: RuleKind::Uniform {
                        min: -5.0,
                        max: 2.0,
                    },
                }],
            },
        );
        devices.insert(
            "boilers".to_owned(),
            DeviceKindConfig {
                template: "boiler".to_owned(),
                template_path: None,
                folder: "Boilers".to_owned(),
                name_prefix: "Boiler".to_owned(),
                count: default_device_count(),
                stride: 100,
                period: default_period(),
                rules: vec![
                    RuleConfig {
                        target: "InputPipe/FlowTransmitter1/Output".to_owned(),
                        kind: RuleKind::Uniform {
                            min: 0.0,
                            max: 100.0,
                        },
                    },
                    RuleConfig {
                        target: "Drum/LevelIndicator/Output".to_owned(),
                        kind: RuleKind::Normal {
                            mean: 50.0,
                            std_dev: 2.5,
                        },
                    },
                ],
            },
        );
        Self {
            server: ServerConfig::default(),
            identity: IdentityConfig::default(),
            simulation: SimulationConfig::default(),
            logging: LoggingConfig::default(),
            devices,
        }
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_namespace_uri")]
    pub namespace_uri: String,
    /// Predefined nodes imported before any device is instantiated.
    #[serde(default)]
    pub static_import: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            namespace_uri: default_namespace_uri(),
            static_import: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// First identity handed out to device instances; everything below is
    /// reserved for static imports.
    #[serde(default = "default_base_offset")]
    pub base_offset: u32,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            base_offset: default_base_offset(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_simulation_enabled")]
    pub enabled: bool,
    #[serde(default = "default_simulation_seed")]
    pub random_seed: u64,
    /// Probability that the initial value generator yields no value for a draw.
    #[serde(default)]
    pub null_frequency: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            enabled: default_simulation_enabled(),
            random_seed: default_simulation_seed(),
            null_frequency: 0.0,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceKindConfig {
    /// Built-in template name, or the root node name inside `template_path`.
    pub template: String,
    #[serde(default)]
    pub template_path: Option<PathBuf>,
    pub folder: String,
    pub name_prefix: String,
    #[serde(default = "default_device_count")]
    pub count: u32,
    pub stride: u32,
    #[serde(default = "default_period")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub period: Duration,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

impl DeviceKindConfig {
    pub fn validate(&self, kind: &str) -> Result<()> {
        if self.template.trim().is_empty() {
            return Err(anyhow!("device kind '{}' must name a template", kind));
        }
        if self.folder.trim().is_empty() {
            return Err(anyhow!("device kind '{}' must name an organizer folder", kind));
        }
        if self.count == 0 {
            return Err(anyhow!("device kind '{}' must create at least one instance", kind));
        }
        if self.stride == 0 {
            return Err(anyhow!("device kind '{}' must use a non-zero stride", kind));
        }
        if self.period.is_zero() && !self.rules.is_empty() {
            return Err(anyhow!(
                "device kind '{}' declares simulation rules with a zero period",
                kind
            ));
        }
        for rule in &self.rules {
            rule.validate()
                .with_context(|| format!("invalid rule for device kind '{}'", kind))?;
        }
        Ok(())
    }
}

/// A value rule bound to a browse path relative to the device root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub target: String,
    #[serde(flatten)]
    pub kind: RuleKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RuleKind {
    Uniform { min: f64, max: f64 },
    Normal { mean: f64, std_dev: f64 },
    Toggle { probability: f64 },
    Constant { value: f64 },
}

impl RuleConfig {
    pub fn validate(&self) -> Result<()> {
        if self.target.trim().is_empty() {
            return Err(anyhow!("rule target must not be empty"));
        }
        match self.kind {
            RuleKind::Uniform { min, max } if !(min.is_finite() && max.is_finite() && min <= max) => {
                Err(anyhow!("uniform rule for {} needs finite min <= max", self.target))
            }
            RuleKind::Normal { mean, std_dev }
                if !(mean.is_finite() && std_dev.is_finite() && std_dev >= 0.0) =>
            {
                Err(anyhow!(
                    "normal rule for {} needs a finite mean and non-negative std_dev",
                    self.target
                ))
            }
            RuleKind::Toggle { probability } if !(0.0..=1.0).contains(&probability) => Err(
                anyhow!("toggle rule for {} needs a probability in [0, 1]", self.target),
            ),
            RuleKind::Constant { value } if !value.is_finite() => {
                Err(anyhow!("constant rule for {} needs a finite value", self.target))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::str::FromStr;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
        [server]
        namespace_uri = "urn:test:plant"

        [identity]
        base_offset = 20000

        [devices.chillers]
        template = "refrigerator"
        folder = "Chillers"
        name_prefix = "Chiller"
        count = 2
        stride = 12
        period = 5

        [[devices.chillers.rules]]
        target = "ActualTemperature"
        kind = "uniform"
        min = -5.0
        max = 2.0

        [[devices.chillers.rules]]
        target = "DoorState"
        kind = "toggle"
        probability = 0.02

        [devices.boilers]
        template = "boiler"
        folder = "Boilers"
        name_prefix = "Boiler"
        stride = 64
    "#;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        let kinds: Vec<_> = config.devices.keys().cloned().collect();
        assert_eq!(kinds, vec!["refrigerators", "boilers"]);
        assert_eq!(config.identity.base_offset, 10_000);
    }

    #[test]
    fn parses_toml_and_preserves_kind_order() {
        let config = AppConfig::from_str(SAMPLE).unwrap();
        assert_eq!(config.server.namespace_uri, "urn:test:plant");
        assert_eq!(config.identity.base_offset, 20_000);
        let kinds: Vec<_> = config.devices.keys().map(String::as_str).collect();
        assert_eq!(kinds, vec!["chillers", "boilers"]);

        let chillers = config.device_kind("chillers").unwrap();
        assert_eq!(chillers.count, 2);
        assert_eq!(chillers.period, Duration::from_secs(5));
        assert_eq!(
            chillers.rules[1].kind,
            RuleKind::Toggle { probability: 0.02 }
        );

        let boilers = config.device_kind("boilers").unwrap();
        assert_eq!(boilers.count, 5);
        assert_eq!(boilers.period, Duration::from_secs(1));
        assert!(boilers.rules.is_empty());
    }

    #[test]
    fn rejects_inverted_uniform_range() {
        let broken = SAMPLE.replace("min = -5.0", "min = 9.0");
        let err = AppConfig::from_str(&broken).unwrap_err();
        assert!(format!("{err:#}").contains("min <= max"));
    }

    #[test]
    fn rejects_zero_stride() {
        let broken = SAMPLE.replace("stride = 64", "stride = 0");
        assert!(AppConfig::from_str(&broken).is_err());
    }

    #[test]
    fn loads_first_existing_candidate() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        file.flush().unwrap();
        let missing = PathBuf::from("does/not/exist.toml");
        let loaded =
            AppConfig::load_with_source(&[missing, file.path().to_path_buf()]).unwrap();
        assert_eq!(loaded.source, file.path());
        assert_eq!(loaded.config.devices.len(), 2);
    }
}
