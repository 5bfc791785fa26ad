//! YAML configuration: artifacts plus the shared rule lists.
//!
//! Schema (all top-level keys optional except `artifacts` entries'
//! `alias` and `target`):
//!
//! ```yaml
//! artifacts:
//!   - alias: build
//!     target: https://ci.example.com/build/123/console
//!     reference:
//!       - https://ci.example.com/build/122/console
//! filters:
//!   - r: "^\\[DEBUG\\]"
//! normalizers:
//!   - r: "\\d{2}:\\d{2}:\\d{2}"
//!   - s: "jenkins-agent-07"
//! ```
//!
//! A pattern entry carries `r` (regex) or `s` (literal); one with
//! neither is a configuration error, and `r` wins when both appear. The
//! global filter/normalizer lists are attached to every artifact.

use crate::error::{Error, Result};
use crate::pattern::{Pattern, Rules};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;

/// One artifact to denoise: a target and the references to diff against.
#[derive(Clone, Debug)]
pub struct ArtifactConfig {
    pub alias: String,
    pub target: String,
    pub reference: Vec<String>,
    pub rules: Rules,
}

/// The parsed configuration: every artifact with its rules attached.
#[derive(Clone, Debug, Default)]
pub struct Config {
    pub artifacts: Vec<ArtifactConfig>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    artifacts: Vec<RawArtifact>,
    #[serde(default)]
    filters: Vec<RawPattern>,
    #[serde(default)]
    normalizers: Vec<RawPattern>,
}

#[derive(Debug, Deserialize)]
struct RawArtifact {
    alias: String,
    target: String,
    #[serde(default)]
    reference: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawPattern {
    r: Option<String>,
    s: Option<String>,
}

impl Config {
    /// Reads and parses a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(path.display().to_string())
            } else {
                Error::Io(e)
            }
        })?;
        Config::from_str(&text)
    }

    /// Parses a configuration from any reader (stdin, a test buffer).
    pub fn read(mut reader: impl Read) -> Result<Config> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Config::from_str(&text)
    }

    /// Parses a configuration from YAML text.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(text: &str) -> Result<Config> {
        let raw: RawConfig = serde_yaml::from_str(text)
            .map_err(|e| Error::Config(format!("malformed YAML: {e}")))?;

        let rules = Rules {
            filters: compile_patterns(&raw.filters, "filters")?,
            normalizers: compile_patterns(&raw.normalizers, "normalizers")?,
        };

        let artifacts = raw
            .artifacts
            .into_iter()
            .map(|a| ArtifactConfig {
                alias: a.alias,
                target: a.target,
                reference: a.reference,
                rules: rules.clone(),
            })
            .collect();

        Ok(Config { artifacts })
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ArtifactConfig> {
        self.artifacts.iter()
    }
}

fn compile_patterns(entries: &[RawPattern], section: &str) -> Result<Vec<Pattern>> {
    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| match entry {
            RawPattern { r: Some(expr), .. } => Pattern::compile(expr),
            RawPattern { s: Some(text), .. } => Ok(Pattern::literal(text.clone())),
            RawPattern { r: None, s: None } => Err(Error::Config(format!(
                "{section}[{i}]: entry needs either 'r' (regex) or 's' (literal)"
            ))),
        })
        .collect()
}
