//! Session bootstrap configuration
//!
//! Lists the applications session bootstrap registers before any card model
//! runs. Stored as JSON; the file is taken from an explicit path or from the
//! `USIM_FS_CONFIG` environment variable.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::usim::{AID_USIM, FID_ADF_USIM};
use crate::fs::{Container, FileId, FsError, RuntimeTree, SelectResponseDecoder};

/// Errors while loading a session configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Fs(#[from] FsError),
}

/// One application found on the card at bootstrap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    pub aid: String,
    /// File id of the ADF below the MF, as four hex digits
    pub fid: String,
    pub name: String,
    #[serde(default)]
    pub desc: String,
}

impl ApplicationConfig {
    fn to_adf(&self) -> Result<Container, FsError> {
        let fid: FileId = self.fid.parse()?;
        Container::adf(&self.aid, fid, &self.name, &self.desc, Vec::new())
    }
}

/// Applications to register when a session starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub applications: Vec<ApplicationConfig>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            applications: vec![ApplicationConfig {
                aid: AID_USIM.to_string(),
                fid: FID_ADF_USIM.to_string(),
                name: "ADF.USIM".to_string(),
                desc: "USIM Application".to_string(),
            }],
        }
    }
}

impl SessionConfig {
    pub const ENV_VAR: &'static str = "USIM_FS_CONFIG";

    /// Config file named by the environment, if any
    fn env_path() -> Option<PathBuf> {
        std::env::var_os(Self::ENV_VAR).map(PathBuf::from)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config = Self::from_json(&content)?;
        debug!("Loaded session config from {:?}", path);
        Ok(config)
    }

    /// Load the config from `path` or the environment
    ///
    /// Falls back to the default (USIM only) when no file is named or the
    /// named file cannot be read or parsed.
    pub fn load(path: Option<PathBuf>) -> Self {
        let path = match path.or_else(Self::env_path) {
            Some(path) => path,
            None => {
                info!("No session config given, registering USIM only");
                return Self::default();
            }
        };

        match Self::from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring session config {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Build the runtime tree with every configured application registered
    ///
    /// `decoder` is attached to the MF and shared by every container below it.
    pub fn build_tree(
        &self,
        decoder: Option<Arc<dyn SelectResponseDecoder>>,
    ) -> Result<RuntimeTree, ConfigError> {
        let mut mf = Container::mf();
        if let Some(decoder) = decoder {
            mf.set_decoder(decoder);
        }

        let mut tree = RuntimeTree::from_mf(mf)?;
        for app in &self.applications {
            tree.add_application(app.to_adf()?)?;
        }
        Ok(tree)
    }
}
