use crate::error::{EngineError, Result};
use dialoguer::Input;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "agronomy-engine";

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RulesConfig {
    /// Rule file or directory of `*.yaml` rule documents.
    #[serde(default = "default_rules_path")]
    pub path: PathBuf,
    /// How often `serve` checks the rule path for changes.
    #[serde(default = "default_watch_interval")]
    pub watch_interval_secs: u64,
}

fn default_rules_path() -> PathBuf {
    PathBuf::from("rules")
}

fn default_watch_interval() -> u64 {
    5
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            path: default_rules_path(),
            watch_interval_secs: default_watch_interval(),
        }
    }
}

/// Engine-level constants. Nothing here is per crop or per rule.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EngineSettings {
    /// Confidence reported by the explicit no-action default.
    #[serde(default = "default_no_match_confidence")]
    pub no_match_confidence: f64,
    #[serde(default)]
    pub harvest: HarvestSettings,
}

fn default_no_match_confidence() -> f64 {
    0.5
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            no_match_confidence: default_no_match_confidence(),
            harvest: HarvestSettings::default(),
        }
    }
}

/// Two-tier confidence for harvest projections.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HarvestSettings {
    /// Accumulated GDD at or above which the projection is trusted more.
    pub confidence_floor_gdd: f64,
    pub high_confidence: f64,
    pub low_confidence: f64,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            confidence_floor_gdd: 800.0,
            high_confidence: 0.85,
            low_confidence: 0.6,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AuditConfig {
    #[serde(default)]
    pub enabled: bool,
    /// SQLite file; defaults to the XDG data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load config from `config_override`, else the standard locations.
    ///
    /// With no override and no file anywhere, built-in defaults are used.
    pub fn load(config_override: Option<&Path>) -> Result<Self> {
        let config_path = match config_override {
            Some(p) => {
                if !p.exists() {
                    return Err(EngineError::Config(format!(
                        "Config file not found at {:?}",
                        p
                    )));
                }
                p.to_path_buf()
            }
            None => match Self::find_config_path() {
                Some(p) => p,
                None => {
                    tracing::info!("No config file found, using built-in defaults");
                    return Ok(Self::default());
                }
            },
        };

        let config_str = std::fs::read_to_string(&config_path)
            .map_err(|e| EngineError::Config(format!("Failed to read config: {}", e)))?;

        let config = Self::from_yaml(&config_str)?;
        tracing::debug!(path = %config_path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse YAML after `${VAR}` substitution, then validate.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let content = Self::substitute_env_vars(content);
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let check_unit = |name: &str, value: f64| -> Result<()> {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::Config(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
            Ok(())
        };

        check_unit("engine.no_match_confidence", self.engine.no_match_confidence)?;
        check_unit(
            "engine.harvest.high_confidence",
            self.engine.harvest.high_confidence,
        )?;
        check_unit(
            "engine.harvest.low_confidence",
            self.engine.harvest.low_confidence,
        )?;

        let floor = self.engine.harvest.confidence_floor_gdd;
        if !floor.is_finite() || floor < 0.0 {
            return Err(EngineError::Config(format!(
                "engine.harvest.confidence_floor_gdd must be a non-negative number, got {}",
                floor
            )));
        }

        if self.rules.watch_interval_secs == 0 {
            return Err(EngineError::Config(
                "rules.watch_interval_secs must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Search for config.yaml in standard locations.
    fn find_config_path() -> Option<PathBuf> {
        let local_config = PathBuf::from("config/config.yaml");
        if local_config.exists() {
            return Some(local_config);
        }

        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR).join("config.yaml"))
            .filter(|p| p.exists())
    }

    /// Default path for writing new config files (~/.config/agronomy-engine/config.yaml).
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| EngineError::Config("Cannot determine config directory".into()))?
            .join(APP_DIR);
        Ok(config_dir.join("config.yaml"))
    }

    /// Run interactive setup prompts and write config to disk.
    /// Returns the config and the path it was written to.
    pub fn setup_interactive() -> Result<(Self, PathBuf)> {
        println!();
        println!("Agronomy engine setup");
        println!();

        println!("Rules");
        let rules_path: String = Input::new()
            .with_prompt("  Rule file or directory")
            .default("rules".into())
            .interact_text()
            .map_err(|e| EngineError::Config(format!("Input error: {}", e)))?;

        let watch_interval_secs: u64 = Input::new()
            .with_prompt("  Reload check interval (seconds)")
            .default(default_watch_interval())
            .interact_text()
            .map_err(|e| EngineError::Config(format!("Input error: {}", e)))?;

        println!();
        println!("Harvest projection");
        let defaults = HarvestSettings::default();
        let confidence_floor_gdd: f64 = Input::new()
            .with_prompt("  GDD floor for high confidence")
            .default(defaults.confidence_floor_gdd)
            .interact_text()
            .map_err(|e| EngineError::Config(format!("Input error: {}", e)))?;

        println!();
        println!("Audit log");
        let audit_enabled: bool = Input::new()
            .with_prompt("  Record every evaluation (true/false)")
            .default(false)
            .interact_text()
            .map_err(|e| EngineError::Config(format!("Input error: {}", e)))?;

        let config = Config {
            rules: RulesConfig {
                path: PathBuf::from(rules_path),
                watch_interval_secs,
            },
            engine: EngineSettings {
                harvest: HarvestSettings {
                    confidence_floor_gdd,
                    ..defaults
                },
                ..EngineSettings::default()
            },
            audit: AuditConfig {
                enabled: audit_enabled,
                path: None,
            },
        };
        config.validate()?;

        let config_path = Self::default_config_path()?;
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let yaml = serde_yaml::to_string(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        let content = format!(
            "# Agronomy engine configuration\n# Generated by `agronomy init`\n# Environment variable substitution (${{VAR}}) is supported.\n\n{}",
            yaml
        );
        std::fs::write(&config_path, content)?;

        println!();
        println!("Configuration saved to {}", config_path.display());

        Ok((config, config_path))
    }

    fn substitute_env_vars(content: &str) -> String {
        let mut result = content.to_string();

        let re = match regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}") {
            Ok(re) => re,
            Err(_) => return result,
        };

        for cap in re.captures_iter(content) {
            let var_name = &cap[1];
            let placeholder = &cap[0];
            if let Ok(value) = std::env::var(var_name) {
                result = result.replace(placeholder, &value);
            }
        }

        result
    }

    pub fn data_dir(data_dir_override: Option<&Path>) -> Result<PathBuf> {
        if let Some(dir) = data_dir_override {
            std::fs::create_dir_all(dir)?;
            return Ok(dir.to_path_buf());
        }

        if let Ok(dir) = std::env::var("AGRONOMY_DATA_DIR") {
            let p = PathBuf::from(dir);
            std::fs::create_dir_all(&p)?;
            return Ok(p);
        }

        let data_dir = dirs::data_dir()
            .ok_or_else(|| EngineError::Config("Cannot determine data directory".into()))?
            .join(APP_DIR);

        std::fs::create_dir_all(&data_dir)?;
        Ok(data_dir)
    }

    /// Audit database location: explicit config path, else the data directory.
    pub fn audit_db_path(&self, data_dir_override: Option<&Path>) -> Result<PathBuf> {
        match &self.audit.path {
            Some(p) => Ok(p.clone()),
            None => Ok(Self::data_dir(data_dir_override)?.join("audit.db")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = Config::from_yaml("{}").unwrap();
        assert_eq!(config, Config::default());
        assert!((config.engine.no_match_confidence - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.rules.path, PathBuf::from("rules"));
    }

    #[test]
    fn partial_sections_fill_in_defaults() {
        let config = Config::from_yaml(
            "engine:\n  harvest:\n    confidence_floor_gdd: 600\n    high_confidence: 0.9\n    low_confidence: 0.5\n",
        )
        .unwrap();
        assert!((config.engine.harvest.confidence_floor_gdd - 600.0).abs() < f64::EPSILON);
        assert!((config.engine.no_match_confidence - 0.5).abs() < f64::EPSILON);
        assert!(!config.audit.enabled);
    }

    #[test]
    fn harvest_fields_default_individually() {
        let config =
            Config::from_yaml("engine:\n  harvest:\n    confidence_floor_gdd: 650\n").unwrap();
        let harvest = &config.engine.harvest;
        assert!((harvest.confidence_floor_gdd - 650.0).abs() < f64::EPSILON);
        assert_eq!(harvest.high_confidence, HarvestSettings::default().high_confidence);
        assert_eq!(harvest.low_confidence, HarvestSettings::default().low_confidence);
    }

    #[test]
    fn env_vars_are_substituted() {
        std::env::set_var("AGRONOMY_TEST_RULES_DIR", "/srv/agronomy/rules");
        let config =
            Config::from_yaml("rules:\n  path: ${AGRONOMY_TEST_RULES_DIR}\n").unwrap();
        assert_eq!(config.rules.path, PathBuf::from("/srv/agronomy/rules"));
    }

    #[test]
    fn unset_env_vars_are_left_in_place() {
        let out = Config::substitute_env_vars("path: ${AGRONOMY_TEST_SURELY_UNSET_VAR}");
        assert_eq!(out, "path: ${AGRONOMY_TEST_SURELY_UNSET_VAR}");
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        assert!(Config::from_yaml("engine:\n  no_match_confidence: 1.5\n").is_err());
        assert!(Config::from_yaml(
            "engine:\n  harvest:\n    confidence_floor_gdd: -1\n    high_confidence: 0.9\n    low_confidence: 0.5\n"
        )
        .is_err());
        assert!(Config::from_yaml("rules:\n  path: rules\n  watch_interval_secs: 0\n").is_err());
    }

    #[test]
    fn shipped_example_parses() {
        let config = Config::from_yaml(include_str!("../config/config.yaml.example")).unwrap();
        assert_eq!(config.rules.path, PathBuf::from("rules"));
        assert_eq!(config.engine.harvest, HarvestSettings::default());
        assert!(!config.audit.enabled);
    }

    #[test]
    fn missing_override_is_an_error() {
        let err = Config::load(Some(Path::new("/nonexistent/agronomy.yaml"))).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn explicit_audit_path_wins() {
        let mut config = Config::default();
        config.audit.path = Some(PathBuf::from("/tmp/audit-test.db"));
        assert_eq!(
            config.audit_db_path(None).unwrap(),
            PathBuf::from("/tmp/audit-test.db")
        );
    }
}
