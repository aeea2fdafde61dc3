//! Configuration loading for grammar emission.
//!
//! `defaults/grammar.default.toml` is embedded into the library so that the
//! documented defaults and runtime behavior stay in sync. Callers layer their
//! own files and overrides on top via [`Loader`] before deserializing into
//! [`GrammarConfig`].

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, ValueKind};
use serde::Deserialize;
use std::path::Path;

const DEFAULT_TOML: &str = include_str!("../../defaults/grammar.default.toml");

/// Top-level configuration consumed by the emitter.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GrammarConfig {
    pub output: OutputConfig,
    #[serde(default)]
    pub metadata: MetadataOverrides,
}

/// Encoding of the emitted artifact.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub pretty: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    Json,
    Yaml,
}

/// Replaces the grammar's own metadata fields when set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MetadataOverrides {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub scope_name: Option<String>,
    #[serde(default)]
    pub file_types: Option<Vec<String>>,
}

/// Layers emission settings: the embedded defaults first, then project files
/// in the order they are added, then single-key overrides.
#[derive(Debug, Clone)]
pub struct Loader {
    builder: ConfigBuilder<DefaultState>,
}

impl Loader {
    pub fn new() -> Self {
        Self {
            builder: Config::builder().add_source(File::from_str(DEFAULT_TOML, FileFormat::Toml)),
        }
    }

    /// Add a TOML file of emission settings; `build` fails when it is missing.
    pub fn with_file(self, path: impl AsRef<Path>) -> Self {
        self.layer(path.as_ref(), true)
    }

    /// Add a TOML file of emission settings that may not exist, such as a
    /// per-project `grammar.toml`.
    pub fn with_optional_file(self, path: impl AsRef<Path>) -> Self {
        self.layer(path.as_ref(), false)
    }

    /// Override one dotted key, e.g. `output.format` or `metadata.scope_name`.
    pub fn set_override<I>(mut self, key: &str, value: I) -> Result<Self, ConfigError>
    where
        I: Into<ValueKind>,
    {
        self.builder = self.builder.set_override(key, value)?;
        Ok(self)
    }

    /// Merge every layer into the settings the emitter runs with.
    pub fn build(self) -> Result<GrammarConfig, ConfigError> {
        self.builder.build()?.try_deserialize()
    }

    fn layer(mut self, path: &Path, required: bool) -> Self {
        let source = File::from(path).format(FileFormat::Toml).required(required);
        self.builder = self.builder.add_source(source);
        self
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

/// Emission settings with nothing layered over the embedded defaults.
pub fn load_defaults() -> Result<GrammarConfig, ConfigError> {
    Loader::new().build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_default_config() {
        let config = load_defaults().expect("defaults to deserialize");
        assert_eq!(config.output.format, OutputFormat::Json);
        assert!(config.output.pretty);
        assert_eq!(config.metadata, MetadataOverrides::default());
    }

    #[test]
    fn supports_overrides() {
        let config = Loader::new()
            .set_override("output.format", "yaml")
            .expect("override to apply")
            .set_override("metadata.scope_name", "source.wat")
            .expect("override to apply")
            .build()
            .expect("config to build");
        assert_eq!(config.output.format, OutputFormat::Yaml);
        assert_eq!(config.metadata.scope_name.as_deref(), Some("source.wat"));
        assert_eq!(config.metadata.name, None);
    }

    #[test]
    fn optional_file_may_be_absent() {
        let config = Loader::new()
            .with_optional_file("does/not/exist.toml")
            .build()
            .expect("absent optional file to be ignored");
        assert!(config.output.pretty);
    }

    #[test]
    fn required_file_must_exist() {
        let result = Loader::new().with_file("does/not/exist.toml").build();
        assert!(result.is_err());
    }
}
