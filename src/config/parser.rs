use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigFormat {
    Json,
    Json5,
    Toml,
    Yaml,
}

impl ConfigFormat {
    /// Guess the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "json" => Some(ConfigFormat::Json),
            "json5" | "jsonc" => Some(ConfigFormat::Json5),
            "toml" => Some(ConfigFormat::Toml),
            "yaml" | "yml" => Some(ConfigFormat::Yaml),
            _ => None,
        }
    }
}

/// Configuration parser
pub struct ConfigParser;

impl ConfigParser {
    /// Parse configuration from a string
    pub fn parse_str<T>(content: &str, format: ConfigFormat) -> Result<T>
    where
        T: DeserializeOwned,
    {
        match format {
            ConfigFormat::Json => {
                serde_json::from_str(content).context("Failed to parse JSON configuration")
            }
            ConfigFormat::Json5 => {
                json5::from_str(content).context("Failed to parse JSON5 configuration")
            }
            ConfigFormat::Toml => {
                toml::from_str(content).context("Failed to parse TOML configuration")
            }
            ConfigFormat::Yaml => {
                serde_yaml::from_str(content).context("Failed to parse YAML configuration")
            }
        }
    }

    /// Parse configuration from a file, format chosen by extension
    pub fn parse_file<T>(path: &Path) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let format = ConfigFormat::from_path(path).with_context(|| {
            format!("Unsupported configuration file extension: {}", path.display())
        })?;
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse_str(&content, format)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Merge `overlay` into `base`. Objects merge recursively, everything else is replaced.
    pub fn merge_values(base: &mut Value, overlay: &Value) {
        json_patch::merge(base, overlay);
    }
}

/// Trait for configuration sources
pub trait ConfigSource {
    /// Partial configuration tree, `None` when the source has nothing to say
    fn load_config(&self) -> Result<Option<Value>>;
}

/// File-based configuration source
pub struct FileConfigSource {
    pub path: PathBuf,
    /// Fail instead of skipping when the file does not exist
    pub required: bool,
}

impl ConfigSource for FileConfigSource {
    fn load_config(&self) -> Result<Option<Value>> {
        if !self.path.exists() {
            if self.required {
                anyhow::bail!("Config file not found: {}", self.path.display());
            }
            return Ok(None);
        }

        let config: Value = ConfigParser::parse_file(&self.path)?;
        Ok(Some(config))
    }
}

/// Environment variable configuration source.
///
/// `PREFIX_SERVER__PORT=9000` becomes `{"server": {"port": 9000}}`.
pub struct EnvConfigSource {
    pub prefix: String,
    vars: Option<Vec<(String, String)>>,
}

impl EnvConfigSource {
    /// Read from the process environment
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            vars: None,
        }
    }

    /// Read from a fixed set of variables instead of the process environment
    pub fn from_vars<I, K, V>(prefix: impl Into<String>, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            prefix: prefix.into(),
            vars: Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect()),
        }
    }

    fn scalar(raw: &str) -> Value {
        match serde_json::from_str::<Value>(raw) {
            Ok(value @ (Value::Number(_) | Value::Bool(_) | Value::Array(_))) => value,
            _ => Value::String(raw.to_string()),
        }
    }
}

impl ConfigSource for EnvConfigSource {
    fn load_config(&self) -> Result<Option<Value>> {
        let vars: Vec<(String, String)> = match &self.vars {
            Some(vars) => vars.clone(),
            None => std::env::vars().collect(),
        };

        let mut config = Value::Object(Default::default());
        let mut found = false;
        for (key, raw) in vars {
            let Some(path) = key.strip_prefix(&self.prefix) else {
                continue;
            };
            let segments: Vec<String> = path
                .to_lowercase()
                .split("__")
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect();
            let Some((last, parents)) = segments.split_last() else {
                continue;
            };

            let mut node = &mut config;
            for segment in parents {
                node = node
                    .as_object_mut()
                    .context("Conflicting environment configuration keys")?
                    .entry(segment.clone())
                    .or_insert_with(|| Value::Object(Default::default()));
            }
            node.as_object_mut()
                .with_context(|| format!("Conflicting environment configuration key: {}", key))?
                .insert(last.clone(), Self::scalar(&raw));
            found = true;
        }

        Ok(found.then_some(config))
    }
}
