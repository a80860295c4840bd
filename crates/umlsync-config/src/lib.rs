//! Configuration management for umlsync.
//!
//! Parses `umlsync.toml` with serde, discovering it in the current directory
//! or its parents, and resolves relative paths against the directory that
//! holds the file. [`CliSettings`] override file values after loading.
//!
//! ## Environment Variable Expansion
//!
//! String values support `${VAR}` (error if unset) and `${VAR:-default}`.
//!
//! Expanded fields:
//! - `assets.url_prefix`
//! - `renderer.command`
//! - `renderer.args`

mod expand;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "umlsync.toml";

const DEFAULT_PATTERN: &str = "**/*.md";
const DEFAULT_OUTPUT_DIR: &str = "docs/generated-assets";
const DEFAULT_COMMAND: &str = "plantuml";
const DEFAULT_EXCLUDE: &[&str] = &["node_modules", ".git", "target"];

/// CLI settings that override configuration file values.
///
/// Relative paths are taken as given, i.e. relative to the working directory.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override the directory documents are discovered in.
    pub root: Option<PathBuf>,
    /// Override the document glob pattern.
    pub pattern: Option<String>,
    /// Override the asset output directory.
    pub output_dir: Option<PathBuf>,
}

/// Configuration file as written, before expansion and path resolution.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    docs: RawDocs,
    assets: RawAssets,
    renderer: RawRenderer,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawDocs {
    root: Option<String>,
    pattern: Option<String>,
    exclude: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawAssets {
    output_dir: Option<String>,
    format: Option<String>,
    url_prefix: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawRenderer {
    command: Option<String>,
    args: Option<Vec<String>>,
}

/// Resolved application configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub docs: DocsConfig,
    pub assets: AssetsConfig,
    pub renderer: RendererConfig,
    /// Path to the config file, if one was loaded.
    pub config_path: Option<PathBuf>,
}

/// Which documents to process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocsConfig {
    /// Directory the pattern is relative to.
    pub root: PathBuf,
    /// Glob pattern selecting markdown documents.
    pub pattern: String,
    /// Path components that exclude a document.
    pub exclude: Vec<String>,
}

/// Where and how rendered diagrams are stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetsConfig {
    pub output_dir: PathBuf,
    pub format: AssetFormat,
    /// Link assets as `<prefix>/<hash>.<format>` instead of relative paths.
    pub url_prefix: Option<String>,
}

/// External renderer invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererConfig {
    pub command: String,
    /// Explicit arguments. `None` means the defaults for the asset format.
    pub args: Option<Vec<String>>,
}

/// Image format of rendered diagrams.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AssetFormat {
    #[default]
    Svg,
    Png,
}

impl AssetFormat {
    /// File extension, also the renderer's output type name.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Svg => "svg",
            Self::Png => "png",
        }
    }

    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.to_ascii_lowercase().as_str() {
            "svg" => Ok(Self::Svg),
            "png" => Ok(Self::Png),
            other => Err(ConfigError::Validation(format!(
                "assets.format must be \"svg\" or \"png\", got \"{other}\""
            ))),
        }
    }
}

impl fmt::Display for AssetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`renderer.command`").
        field: String,
        message: String,
    },
}

impl Config {
    /// Load configuration with optional CLI overrides.
    ///
    /// If `config_path` is provided, loads from that file. Otherwise searches
    /// for `umlsync.toml` in the current directory and its parents, falling
    /// back to defaults relative to the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit `config_path` doesn't exist, the file
    /// cannot be read or parsed, an environment variable is missing, or a
    /// value fails validation.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_base(&std::env::current_dir()?)
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }
        config.validate()?;
        Ok(config)
    }

    /// Default configuration with paths relative to `base`.
    #[must_use]
    pub fn default_with_base(base: &Path) -> Self {
        Self {
            docs: DocsConfig {
                root: base.to_path_buf(),
                pattern: DEFAULT_PATTERN.to_owned(),
                exclude: DEFAULT_EXCLUDE.iter().map(|s| (*s).to_owned()).collect(),
            },
            assets: AssetsConfig {
                output_dir: base.join(DEFAULT_OUTPUT_DIR),
                format: AssetFormat::default(),
                url_prefix: None,
            },
            renderer: RendererConfig {
                command: DEFAULT_COMMAND.to_owned(),
                args: None,
            },
            config_path: None,
        }
    }

    /// Parse TOML text, resolving relative paths against `base`.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid TOML, unknown keys, an unknown asset
    /// format, or a missing environment variable.
    pub fn from_toml(text: &str, base: &Path) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(text)?;
        let defaults = Self::default_with_base(base);
        let resolve = |path: Option<String>, default: PathBuf| path.map_or(default, |p| base.join(p));

        let format = match raw.assets.format.as_deref() {
            Some(value) => AssetFormat::parse(value)?,
            None => defaults.assets.format,
        };
        let url_prefix = raw
            .assets
            .url_prefix
            .map(|prefix| expand::expand_env(&prefix, "assets.url_prefix"))
            .transpose()?;
        let command = match raw.renderer.command {
            Some(command) => expand::expand_env(&command, "renderer.command")?,
            None => defaults.renderer.command,
        };
        let args = raw
            .renderer
            .args
            .map(|args| expand::expand_all(&args, "renderer.args"))
            .transpose()?;

        Ok(Self {
            docs: DocsConfig {
                root: resolve(raw.docs.root, defaults.docs.root),
                pattern: raw.docs.pattern.unwrap_or(defaults.docs.pattern),
                exclude: raw.docs.exclude.unwrap_or(defaults.docs.exclude),
            },
            assets: AssetsConfig {
                output_dir: resolve(raw.assets.output_dir, defaults.assets.output_dir),
                format,
                url_prefix,
            },
            renderer: RendererConfig { command, args },
            config_path: None,
        })
    }

    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let base = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut config = Self::from_toml(&content, base)?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(root) = &settings.root {
            self.docs.root.clone_from(root);
        }
        if let Some(pattern) = &settings.pattern {
            self.docs.pattern.clone_from(pattern);
        }
        if let Some(output_dir) = &settings.output_dir {
            self.assets.output_dir.clone_from(output_dir);
        }
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any check fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.docs.pattern, "docs.pattern")?;
        glob::Pattern::new(&self.docs.pattern).map_err(|e| {
            ConfigError::Validation(format!("docs.pattern is not a valid glob: {e}"))
        })?;
        require_non_empty(&self.renderer.command, "renderer.command")?;
        if let Some(prefix) = &self.assets.url_prefix {
            require_non_empty(prefix, "assets.url_prefix")?;
        }
        Ok(())
    }
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Search for the config file in the current directory and its parents.
fn discover_config() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;
    loop {
        let candidate = current.join(CONFIG_FILENAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !current.pop() {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = Config::default_with_base(Path::new("/project"));

        assert_eq!(config.docs.root, PathBuf::from("/project"));
        assert_eq!(config.docs.pattern, "**/*.md");
        assert_eq!(config.docs.exclude, vec!["node_modules", ".git", "target"]);
        assert_eq!(
            config.assets.output_dir,
            PathBuf::from("/project/docs/generated-assets")
        );
        assert_eq!(config.assets.format, AssetFormat::Svg);
        assert_eq!(config.assets.url_prefix, None);
        assert_eq!(config.renderer.command, "plantuml");
        assert_eq!(config.renderer.args, None);
    }

    #[test]
    fn test_empty_file_is_default() {
        let config = Config::from_toml("", Path::new("/project")).unwrap();
        assert_eq!(config, Config::default_with_base(Path::new("/project")));
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[docs]
root = "site"
pattern = "guide/**/*.md"
exclude = ["drafts"]

[assets]
output_dir = "static/uml"
format = "PNG"
url_prefix = "/static/uml"

[renderer]
command = "/usr/local/bin/plantuml"
args = ["-tpng", "-pipe"]
"#;
        let config = Config::from_toml(toml, Path::new("/project")).unwrap();

        assert_eq!(config.docs.root, PathBuf::from("/project/site"));
        assert_eq!(config.docs.pattern, "guide/**/*.md");
        assert_eq!(config.docs.exclude, vec!["drafts"]);
        assert_eq!(config.assets.output_dir, PathBuf::from("/project/static/uml"));
        assert_eq!(config.assets.format, AssetFormat::Png);
        assert_eq!(config.assets.url_prefix.as_deref(), Some("/static/uml"));
        assert_eq!(config.renderer.command, "/usr/local/bin/plantuml");
        assert_eq!(
            config.renderer.args,
            Some(vec!["-tpng".to_owned(), "-pipe".to_owned()])
        );
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let err = Config::from_toml("[assets]\nformat = \"gif\"\n", Path::new("/p")).unwrap_err();

        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("gif"));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = Config::from_toml("[assets]\noutput = \"x\"\n", Path::new("/p")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_command_expands_environment() {
        let config = Config::from_toml(
            "[renderer]\ncommand = \"${UMLSYNC_TEST_UNSET_RENDERER:-plantuml-docker}\"\n",
            Path::new("/p"),
        )
        .unwrap();
        assert_eq!(config.renderer.command, "plantuml-docker");
    }

    #[test]
    fn test_cli_settings_override_file() {
        let mut config = Config::from_toml("[docs]\npattern = \"*.md\"\n", Path::new("/p")).unwrap();
        config.apply_cli_settings(&CliSettings {
            root: Some(PathBuf::from("other")),
            pattern: Some("docs/**/*.md".to_owned()),
            output_dir: None,
        });

        assert_eq!(config.docs.root, PathBuf::from("other"));
        assert_eq!(config.docs.pattern, "docs/**/*.md");
        assert_eq!(
            config.assets.output_dir,
            PathBuf::from("/p/docs/generated-assets")
        );
    }

    #[test]
    fn test_validate_rejects_bad_pattern() {
        let mut config = Config::default_with_base(Path::new("/p"));
        config.docs.pattern = "[".to_owned();
        assert!(config.validate().is_err());

        config.docs.pattern = " ".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("docs.pattern cannot be empty"));
    }

    #[test]
    fn test_validate_rejects_empty_command() {
        let mut config = Config::default_with_base(Path::new("/p"));
        config.renderer.command = String::new();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("renderer.command"));
    }

    #[test]
    fn test_load_explicit_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("umlsync.toml");
        std::fs::write(&path, "[assets]\noutput_dir = \"out\"\n").unwrap();

        let config = Config::load(Some(&path), None).unwrap();

        assert_eq!(config.assets.output_dir, temp.path().join("out"));
        assert_eq!(config.docs.root, temp.path());
        assert_eq!(config.config_path, Some(path));
    }

    #[test]
    fn test_load_missing_explicit_file() {
        let err = Config::load(Some(Path::new("/nonexistent/umlsync.toml")), None).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}
