//! Per-session runtime tree
//!
//! The runtime tree owns the Master File and keeps the application registry
//! (AID to ADF) in step with it: ADFs enter the tree only through
//! `RuntimeTree::insert`, which places them under the MF and records their
//! AID together.

use std::collections::BTreeMap;

use log::debug;
use serde::Serialize;

use super::container::{Container, ContainerKind, Node};
use super::ef::{EfNode, FileId};
use super::layout::Fields;
use super::{FsError, Result};

/// Shortest and longest AID (RID plus PIX), in bytes
const AID_MIN_LEN: usize = 5;
const AID_MAX_LEN: usize = 16;

/// Normalize an application identifier to lowercase hex without spaces
pub(crate) fn normalize_aid(aid: &str) -> Result<String> {
    let compact: String = aid.split_whitespace().collect();
    let bytes = hex::decode(&compact).map_err(|e| FsError::InvalidAid(format!("'{}': {}", aid, e)))?;
    if !(AID_MIN_LEN..=AID_MAX_LEN).contains(&bytes.len()) {
        return Err(FsError::InvalidAid(format!(
            "'{}' is {} bytes, expected {} to {}",
            aid,
            bytes.len(),
            AID_MIN_LEN,
            AID_MAX_LEN
        )));
    }
    Ok(hex::encode(bytes))
}

/// Lookup of application containers by AID
pub trait ApplicationRegistry {
    fn application(&self, aid: &str) -> Option<&Container>;

    fn application_mut(&mut self, aid: &str) -> Option<&mut Container>;

    fn contains_application(&self, aid: &str) -> bool {
        self.application(aid).is_some()
    }
}

/// Master File plus the registry of applications found on the card
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeTree {
    mf: Container,
    applications: BTreeMap<String, FileId>,
}

impl Default for RuntimeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeTree {
    /// Create a tree with an empty MF and no applications
    pub fn new() -> Self {
        Self {
            mf: Container::mf(),
            applications: BTreeMap::new(),
        }
    }

    /// Create a tree from an existing MF, registering every ADF directly below it
    ///
    /// Two ADFs sharing an AID are a `Configuration` error.
    pub fn from_mf(mf: Container) -> Result<Self> {
        let mut applications = BTreeMap::new();
        for df in mf.children().filter_map(Node::as_container) {
            let Some(aid) = df.aid() else { continue };
            if let Some(existing) = applications.insert(aid.to_string(), df.fid()) {
                return Err(FsError::Configuration {
                    file: df.name().to_string(),
                    reason: format!("AID {} already registered for {}", aid, existing),
                });
            }
        }
        Ok(Self { mf, applications })
    }

    /// Build a tree holding the given ADFs, as session bootstrap does
    pub fn bootstrap<I>(adfs: I) -> Result<Self>
    where
        I: IntoIterator<Item = Container>,
    {
        let mut tree = Self::new();
        for adf in adfs {
            tree.add_application(adf)?;
        }
        Ok(tree)
    }

    /// The Master File
    pub fn mf(&self) -> &Container {
        &self.mf
    }

    /// Insert a node directly under the MF
    ///
    /// ADFs are registered under their AID at the same time; a second ADF for
    /// an AID that is already registered is rejected before anything changes.
    pub fn insert(&mut self, child: impl Into<Node>) -> Result<()> {
        let child = child.into();
        let aid = match &child {
            Node::Container(df) => df.aid().map(str::to_string),
            Node::Ef(_) => None,
        };

        if let Some(aid) = &aid {
            if self.applications.contains_key(aid) {
                return Err(FsError::Configuration {
                    file: child.name().to_string(),
                    reason: format!("application {} is already registered", aid),
                });
            }
        }

        let fid = child.fid();
        self.mf.insert(child)?;
        if let Some(aid) = aid {
            debug!("Registered application {} at {}", aid, fid);
            self.applications.insert(aid, fid);
        }
        Ok(())
    }

    /// Insert an ADF under the MF and register it
    pub fn add_application(&mut self, adf: Container) -> Result<()> {
        if !matches!(adf.kind(), ContainerKind::Adf { .. }) {
            return Err(FsError::Configuration {
                file: adf.name().to_string(),
                reason: "only ADFs can be registered as applications".to_string(),
            });
        }
        self.insert(adf)
    }

    /// Registered AIDs with their ADFs, in AID order
    pub fn applications(&self) -> impl Iterator<Item = (&str, &Container)> {
        self.applications.iter().filter_map(move |(aid, fid)| {
            self.mf
                .child(*fid)
                .and_then(Node::as_container)
                .map(|adf| (aid.as_str(), adf))
        })
    }

    /// Node at `path` below the MF
    pub fn lookup_path(&self, path: &[FileId]) -> Option<&Node> {
        self.mf.lookup_path(path)
    }

    /// EF at `path` below the MF, for content updates
    pub fn ef_mut(&mut self, path: &[FileId]) -> Option<&mut EfNode> {
        self.mf.lookup_path_mut(path).and_then(Node::as_ef_mut)
    }

    /// Decode the contents stored for the EF at `path`
    pub fn read_fields(&self, path: &[FileId]) -> Result<Option<Fields>> {
        self.lookup_path(path)
            .and_then(Node::as_ef)
            .ok_or_else(|| FsError::FileNotFound(format_path(path)))?
            .read_fields()
    }

    /// Encode `fields` into the EF at `path`
    pub fn update_fields(&mut self, path: &[FileId], fields: &Fields) -> Result<()> {
        self.ef_mut(path)
            .ok_or_else(|| FsError::FileNotFound(format_path(path)))?
            .update_fields(fields)
    }

    /// Pretty JSON listing of the whole tree
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    fn adf_fid(&self, aid: &str) -> Option<FileId> {
        let aid = normalize_aid(aid).ok()?;
        self.applications.get(&aid).copied()
    }
}

impl ApplicationRegistry for RuntimeTree {
    fn application(&self, aid: &str) -> Option<&Container> {
        let fid = self.adf_fid(aid)?;
        self.mf.child(fid).and_then(Node::as_container)
    }

    fn application_mut(&mut self, aid: &str) -> Option<&mut Container> {
        let fid = self.adf_fid(aid)?;
        self.mf.child_mut(fid).and_then(Node::as_container_mut)
    }
}

fn format_path(path: &[FileId]) -> String {
    std::iter::once(FileId::MF)
        .chain(path.iter().copied())
        .map(|fid| fid.to_string())
        .collect::<Vec<_>>()
        .join("/")
}
