use anyhow::Result;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

use crate::common::Error;

/// Which side of the filesystem the backing device belongs to.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Mds,
    Ost,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Mds => write!(f, "MDS"),
            Role::Ost => write!(f, "OST"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatherConfig {
    pub role: Role,
    /// Mount point of the backing filesystem.
    pub device_root: PathBuf,
    /// Base path of the MDS tables. Read by the OST pass as well.
    pub mds_db: PathBuf,
    #[serde(default)]
    pub ost_db: Option<PathBuf>,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl GatherConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let cfg: GatherConfig = toml::from_str(&content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> std::result::Result<(), Error> {
        if self.role == Role::Ost && self.ost_db.is_none() {
            return Err(Error::Config("ost_db is required for the OST role".to_string()));
        }
        if self.max_depth == 0 {
            return Err(Error::Config("max_depth must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn pass_options(&self) -> PassOptions {
        PassOptions {
            mds_db: self.mds_db.clone(),
            ost_db: self.ost_db.clone(),
            read_only: self.read_only,
            max_depth: self.max_depth,
        }
    }
}

/// The part of the configuration a pass needs once the device is open.
#[derive(Debug, Clone)]
pub struct PassOptions {
    pub mds_db: PathBuf,
    pub ost_db: Option<PathBuf>,
    pub read_only: bool,
    pub max_depth: usize,
}

impl PassOptions {
    pub fn new(mds_db: impl Into<PathBuf>) -> Self {
        Self {
            mds_db: mds_db.into(),
            ost_db: None,
            read_only: false,
            max_depth: default_max_depth(),
        }
    }

    pub fn with_ost_db(mut self, ost_db: impl Into<PathBuf>) -> Self {
        self.ost_db = Some(ost_db.into());
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }
}

pub(crate) fn default_max_depth() -> usize {
    4096
}
