use anyhow::{Context, Result, anyhow, bail};
use ci_forge::Format;
use ci_forge::scan::DEFAULT_MODELING_CRATE;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_SOURCE_DIR: &str = "ci";
const DEFAULT_OUTPUT: &str = ".gitlab-ci.yml";
const DEFAULT_LOG_RETENTION_COUNT: usize = 16;

/// Project settings from `ci-forge.toml` (or `.yml`, `.yaml`, `.json`).
///
/// Relative paths are relative to the directory holding the configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawConfig")]
pub struct Config {
    source_dir: PathBuf,
    output: PathBuf,
    format: Format,
    modeling_crates: Vec<String>,
    manifest: Option<PathBuf>,
    log_retention_count: usize,
    strict_warnings: bool,
    directory: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    source_dir: Option<PathBuf>,

    #[serde(default)]
    output: Option<PathBuf>,

    #[serde(default)]
    format: Option<Format>,

    #[serde(default)]
    modeling_crates: Option<Vec<String>>,

    #[serde(default)]
    manifest: Option<PathBuf>,

    #[serde(default)]
    log_retention_count: Option<usize>,

    #[serde(default)]
    strict_warnings: bool,
}

impl TryFrom<RawConfig> for Config {
    type Error = anyhow::Error;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        let output = raw.output.unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));

        let implied = match output.extension().and_then(|e| e.to_str()) {
            Some("json") => Format::Json,
            _ => Format::Yaml,
        };
        let format = raw.format.unwrap_or(implied);
        if format != implied && raw.format.is_some() && output.extension().is_some() {
            bail!("format '{format}' does not match the output file '{}'", output.display());
        }

        let modeling_crates = raw.modeling_crates.unwrap_or_else(|| vec![DEFAULT_MODELING_CRATE.to_string()]);
        if modeling_crates.is_empty() {
            bail!("modeling_crates must name at least one crate");
        }
        for name in &modeling_crates {
            _ = syn::parse_str::<syn::Ident>(name).map_err(|_invalid| anyhow!("modeling crate '{name}' is not a valid crate name"))?;
        }

        let log_retention_count = raw.log_retention_count.unwrap_or(DEFAULT_LOG_RETENTION_COUNT);
        if log_retention_count == 0 {
            bail!("log_retention_count must be at least 1");
        }

        Ok(Self {
            source_dir: raw.source_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_SOURCE_DIR)),
            output,
            format,
            modeling_crates,
            manifest: raw.manifest,
            log_retention_count,
            strict_warnings: raw.strict_warnings,
            directory: PathBuf::new(),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from(DEFAULT_SOURCE_DIR),
            output: PathBuf::from(DEFAULT_OUTPUT),
            format: Format::Yaml,
            modeling_crates: vec![DEFAULT_MODELING_CRATE.to_string()],
            manifest: None,
            log_retention_count: DEFAULT_LOG_RETENTION_COUNT,
            strict_warnings: false,
            directory: PathBuf::new(),
        }
    }
}

impl Config {
    /// Loads the configuration for the project at `root`.
    ///
    /// With no explicit path and no configuration file in `root`, the defaults apply.
    pub fn load(root: &Path, config_path: Option<&Path>) -> Result<Self> {
        let Some((path, text)) = Self::read_config(root, config_path)? else {
            log::debug!("no configuration file in {}, using defaults", root.display());
            return Ok(Self {
                directory: root.to_path_buf(),
                ..Self::default()
            });
        };

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        let mut config: Self = match extension {
            "toml" => toml::from_str(&text).map_err(anyhow::Error::from),
            "yml" | "yaml" => serde_yaml::from_str(&text).map_err(anyhow::Error::from),
            "json" => serde_json::from_str(&text).map_err(anyhow::Error::from),
            _ => Err(anyhow!("unsupported configuration file extension: {extension}")),
        }
        .with_context(|| format!("Unable to parse {}", path.display()))?;

        config.directory = path.parent().map_or_else(|| root.to_path_buf(), Path::to_path_buf);
        log::debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    #[expect(clippy::similar_names, reason = "Yep, indeed")]
    fn read_config(root: &Path, config_path: Option<&Path>) -> Result<Option<(PathBuf, String)>> {
        let path = if let Some(path) = config_path {
            path.to_path_buf()
        } else {
            let toml = root.join("ci-forge.toml");
            let yml = root.join("ci-forge.yml");
            let yaml = root.join("ci-forge.yaml");
            let json = root.join("ci-forge.json");

            if toml.exists() {
                toml
            } else if yml.exists() {
                yml
            } else if yaml.exists() {
                yaml
            } else if json.exists() {
                json
            } else {
                return Ok(None);
            }
        };

        let text = fs::read_to_string(&path).with_context(|| format!("Reading ci-forge configuration from {}", path.display()))?;
        Ok(Some((path, text)))
    }

    /// Replaces settings given on the command line.
    pub fn override_with(&mut self, source_dir: Option<&Path>, output: Option<&Path>, format: Option<Format>) {
        if let Some(dir) = source_dir {
            self.source_dir = dir.to_path_buf();
        }
        if let Some(output) = output {
            self.output = output.to_path_buf();
            if format.is_none() && output.extension().and_then(|e| e.to_str()) == Some("json") {
                self.format = Format::Json;
            }
        }
        if let Some(format) = format {
            self.format = format;
        }
    }

    pub fn source_dir(&self) -> PathBuf {
        self.directory.join(&self.source_dir)
    }

    pub fn output(&self) -> PathBuf {
        self.directory.join(&self.output)
    }

    /// The directory the output document is written to; logs go below it.
    pub fn output_dir(&self) -> PathBuf {
        self.output().parent().map_or_else(|| self.directory.clone(), Path::to_path_buf)
    }

    pub fn manifest(&self) -> Option<PathBuf> {
        self.manifest.as_ref().map(|path| self.directory.join(path))
    }

    #[must_use]
    pub const fn format(&self) -> Format {
        self.format
    }

    pub fn modeling_crates(&self) -> &[String] {
        &self.modeling_crates
    }

    #[must_use]
    pub const fn log_retention_count(&self) -> usize {
        self.log_retention_count
    }

    #[must_use]
    pub const fn strict_warnings(&self) -> bool {
        self.strict_warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn load(name: &str, text: &str) -> Result<Config> {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(name), text).unwrap();
        Config::load(dir.path(), None).map(|config| Config {
            directory: PathBuf::new(),
            ..config
        })
    }

    #[test]
    fn missing_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path(), None).unwrap();

        assert_eq!(config.source_dir(), dir.path().join("ci"));
        assert_eq!(config.output(), dir.path().join(".gitlab-ci.yml"));
        assert_eq!(config.format(), Format::Yaml);
        assert_eq!(config.modeling_crates(), ["ci_forge"]);
        assert_eq!(config.log_retention_count(), 16);
        assert!(config.manifest().is_none());
    }

    #[test]
    fn every_format_loads() {
        let toml = load("ci-forge.toml", "source_dir = \"pipeline\"\nstrict_warnings = true\n").unwrap();
        assert_eq!(toml.source_dir(), PathBuf::from("pipeline"));
        assert!(toml.strict_warnings());

        let yaml = load("ci-forge.yml", "output: ci.json\nmanifest: build/manifest.json\n").unwrap();
        assert_eq!(yaml.format(), Format::Json);
        assert_eq!(yaml.manifest(), Some(PathBuf::from("build/manifest.json")));

        let json = load("ci-forge.json", r#"{"modeling_crates": ["ci_forge", "company_ci"]}"#).unwrap();
        assert_eq!(json.modeling_crates(), ["ci_forge", "company_ci"]);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        assert!(load("ci-forge.toml", "jobs = 3\n").is_err());
        assert!(load("ci-forge.toml", "modeling_crates = []\n").is_err());
        assert!(load("ci-forge.toml", "modeling_crates = [\"not a crate\"]\n").is_err());
        assert!(load("ci-forge.toml", "log_retention_count = 0\n").is_err());
        assert!(load("ci-forge.toml", "format = \"json\"\noutput = \"ci.yml\"\n").is_err());
    }

    #[test]
    fn command_line_wins() {
        let mut config = Config::default();
        config.override_with(Some(Path::new("decl")), Some(Path::new("out.json")), None);
        assert_eq!(config.source_dir(), PathBuf::from("decl"));
        assert_eq!(config.format(), Format::Json);

        config.override_with(None, None, Some(Format::Yaml));
        assert_eq!(config.format(), Format::Yaml);
    }
}
