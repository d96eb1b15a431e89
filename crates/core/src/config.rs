//! Run configuration.
//!
//! A TOML file selects API families and their inputs, enabled emitters,
//! policy overrides and the output root. CLI flags narrow or override
//! these values; the merged result is what the pipeline consumes.
//!
//! ```toml
//! output_root = "generated"
//! namespace = "capture"
//! format = true
//!
//! [api.vulkan]
//! registry = "vk.xml"
//!
//! [api.directx]
//! headers = ["d3d12.h"]
//!
//! [api.opencl]
//! tables = "cl_tables.toml"
//!
//! [[group]]
//! name = "draw-calls"
//! members = ["vkCmdDraw*"]
//!
//! [[policy]]
//! group = "draw-calls"
//! concern = "recorder"
//! policy = "custom"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::model::ApiFamily;
use crate::normalize::{GroupSpec, PolicyOverride};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration `{path}`: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse configuration `{path}`: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("unknown API family `{name}`")]
    UnknownApi { name: String },

    #[error("unknown emitter(s): {}", names.join(", "))]
    UnknownEmitters { names: Vec<String> },

    #[error("API family `{name}` is selected but has no inputs configured")]
    MissingInputs { name: String },
}

/// Inputs for one API family.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiInputs {
    /// XML registry file (Vulkan, OpenGL).
    #[serde(default)]
    pub registry: Option<PathBuf>,
    /// Header files (DirectX, Level Zero).
    #[serde(default)]
    pub headers: Vec<PathBuf>,
    /// Include search paths; filled from the SDK locator when empty.
    #[serde(default)]
    pub include_dirs: Vec<PathBuf>,
    /// Extra `NAME=VALUE` defines for header preprocessing.
    #[serde(default)]
    pub defines: Vec<String>,
    /// Hand-authored table file (OpenCL, configuration elements).
    #[serde(default)]
    pub tables: Option<PathBuf>,
}

impl ApiInputs {
    pub fn is_empty(&self) -> bool {
        self.registry.is_none() && self.headers.is_empty() && self.tables.is_none()
    }

    pub fn parsed_defines(&self) -> Vec<(String, String)> {
        self.defines
            .iter()
            .map(|d| match d.split_once('=') {
                Some((name, value)) => (name.to_string(), value.to_string()),
                None => (d.clone(), String::new()),
            })
            .collect()
    }
}

fn default_output_root() -> PathBuf {
    PathBuf::from("generated")
}

fn default_namespace() -> String {
    "capture".to_string()
}

fn default_true() -> bool {
    true
}

/// The parsed configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_true")]
    pub format: bool,
    #[serde(default)]
    pub formatter: Option<String>,
    /// Enabled emitters; empty means all.
    #[serde(default)]
    pub emitters: Vec<String>,
    #[serde(default)]
    pub api: BTreeMap<String, ApiInputs>,
    #[serde(default, rename = "group")]
    pub groups: Vec<GroupSpec>,
    #[serde(default, rename = "policy")]
    pub policies: Vec<PolicyOverride>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            output_root: default_output_root(),
            namespace: default_namespace(),
            format: true,
            formatter: None,
            emitters: Vec::new(),
            api: BTreeMap::new(),
            groups: Vec::new(),
            policies: Vec::new(),
        }
    }
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: RunConfig = toml::from_str(text).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            message: err.message().to_string(),
        })?;
        for name in config.api.keys() {
            if ApiFamily::parse(name).is_none() {
                return Err(ConfigError::UnknownApi { name: name.clone() });
            }
        }
        Ok(config)
    }

    /// Resolve the API families to run: the CLI filter when given, else
    /// every configured family, in declaration order of [`ApiFamily::ALL`].
    pub fn selected_apis(
        &self,
        cli_filter: &[String],
    ) -> Result<Vec<(ApiFamily, ApiInputs)>, ConfigError> {
        let mut selected = Vec::new();
        for api in ApiFamily::ALL {
            let configured = self
                .api
                .iter()
                .find(|(name, _)| ApiFamily::parse(name) == Some(api))
                .map(|(_, inputs)| inputs.clone());
            let in_filter = cli_filter.is_empty()
                || cli_filter.iter().any(|n| ApiFamily::parse(n) == Some(api));
            if !in_filter {
                continue;
            }
            match configured {
                Some(inputs) if !inputs.is_empty() => selected.push((api, inputs)),
                Some(_) => {
                    return Err(ConfigError::MissingInputs {
                        name: api.dir_name().to_string(),
                    });
                }
                None if cli_filter.iter().any(|n| ApiFamily::parse(n) == Some(api)) => {
                    return Err(ConfigError::MissingInputs {
                        name: api.dir_name().to_string(),
                    });
                }
                None => {}
            }
        }
        for name in cli_filter {
            if ApiFamily::parse(name).is_none() {
                return Err(ConfigError::UnknownApi { name: name.clone() });
            }
        }
        Ok(selected)
    }
}
