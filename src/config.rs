use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// 随机源种子；缺省时使用操作系统熵
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_diagnostics")]
    pub diagnostics: bool,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: None,
            diagnostics: default_diagnostics(),
            max_steps: default_max_steps(),
        }
    }
}

impl EngineConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: EngineConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }
}

fn default_diagnostics() -> bool {
    true
}

fn default_max_steps() -> usize {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = EngineConfig::load_from_file("/definitely/not/here/cpn.toml").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(config.diagnostics);
        assert_eq!(config.max_steps, 1000);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config: EngineConfig = toml::from_str("seed = 42").unwrap();
        assert_eq!(config.seed, Some(42));
        assert!(config.diagnostics);

        let path = std::env::temp_dir().join(format!("cpn-config-{}.toml", std::process::id()));
        fs::write(&path, "diagnostics = false\nmax_steps = 5\n").unwrap();
        let config = EngineConfig::load_from_file(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(config.max_steps, 5);
        assert!(!config.diagnostics);
        assert_eq!(config.seed, None);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let path = std::env::temp_dir().join(format!("cpn-bad-{}.toml", std::process::id()));
        fs::write(&path, "max_steps = \"lots\"").unwrap();
        let err = EngineConfig::load_from_file(&path).unwrap_err();
        fs::remove_file(&path).unwrap();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
