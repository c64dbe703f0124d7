//! Dedicated files: MF, DF and ADF containers
//!
//! A container exclusively owns its children, keyed by file id. Inserting a
//! child whose id already exists among the direct children fails; nothing is
//! ever overwritten.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};
use serde_json::Value;

use super::ef::{EfNode, ElementaryFile, FileId};
use super::tree::normalize_aid;
use super::{FsError, Result};

/// Decoder for the structural bytes a card returns when a DF is selected
///
/// The decoder belongs to the card profile; containers only hold a shared
/// reference to it and hand over the raw bytes.
pub trait SelectResponseDecoder: Send + Sync {
    fn decode_select_response(&self, resp: &[u8]) -> Result<Value>;
}

impl<F> SelectResponseDecoder for F
where
    F: Fn(&[u8]) -> Result<Value> + Send + Sync,
{
    fn decode_select_response(&self, resp: &[u8]) -> Result<Value> {
        self(resp)
    }
}

/// Kind of dedicated file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    /// Master File, root of the tree
    Mf,
    Df,
    /// Application Dedicated File with its application identifier
    Adf { aid: String },
}

/// A node of the card file system
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    Ef(EfNode),
    Container(Container),
}

impl Node {
    pub fn fid(&self) -> FileId {
        match self {
            Node::Ef(ef) => ef.fid(),
            Node::Container(df) => df.fid(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Node::Ef(ef) => ef.name(),
            Node::Container(df) => df.name(),
        }
    }

    pub fn as_ef(&self) -> Option<&EfNode> {
        match self {
            Node::Ef(ef) => Some(ef),
            Node::Container(_) => None,
        }
    }

    pub fn as_ef_mut(&mut self) -> Option<&mut EfNode> {
        match self {
            Node::Ef(ef) => Some(ef),
            Node::Container(_) => None,
        }
    }

    pub fn as_container(&self) -> Option<&Container> {
        match self {
            Node::Container(df) => Some(df),
            Node::Ef(_) => None,
        }
    }

    pub fn as_container_mut(&mut self) -> Option<&mut Container> {
        match self {
            Node::Container(df) => Some(df),
            Node::Ef(_) => None,
        }
    }
}

impl From<EfNode> for Node {
    fn from(ef: EfNode) -> Self {
        Node::Ef(ef)
    }
}

impl From<ElementaryFile> for Node {
    fn from(file: ElementaryFile) -> Self {
        Node::Ef(EfNode::new(file))
    }
}

impl From<Container> for Node {
    fn from(df: Container) -> Self {
        Node::Container(df)
    }
}

/// MF, DF or ADF owning a set of child files
#[derive(Clone, Serialize)]
pub struct Container {
    fid: FileId,
    name: String,
    desc: String,
    kind: ContainerKind,
    #[serde(serialize_with = "serialize_children")]
    children: BTreeMap<FileId, Node>,
    #[serde(skip)]
    decoder: Option<Arc<dyn SelectResponseDecoder>>,
    /// Decoder came from the parent and follows it when the parent's changes
    #[serde(skip)]
    decoder_inherited: bool,
}

fn serialize_children<S: Serializer>(
    children: &BTreeMap<FileId, Node>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_seq(children.values())
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("fid", &self.fid)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("children", &self.children)
            .field("decoder", &self.decoder.is_some())
            .finish()
    }
}

impl Container {
    fn empty(fid: FileId, name: &str, desc: &str, kind: ContainerKind) -> Self {
        Self {
            fid,
            name: name.to_string(),
            desc: desc.to_string(),
            kind,
            children: BTreeMap::new(),
            decoder: None,
            decoder_inherited: false,
        }
    }

    /// Create an empty Master File
    pub fn mf() -> Self {
        Self::empty(FileId::MF, "MF", "Master File", ContainerKind::Mf)
    }

    /// Create a DF holding `children`, inserted in the given order
    pub fn df(fid: FileId, name: &str, desc: &str, children: Vec<Node>) -> Result<Self> {
        let mut df = Self::empty(fid, name, desc, ContainerKind::Df);
        df.add_files(children)?;
        Ok(df)
    }

    /// Create an ADF for the application `aid`
    pub fn adf(aid: &str, fid: FileId, name: &str, desc: &str, children: Vec<Node>) -> Result<Self> {
        let aid = normalize_aid(aid)?;
        let mut adf = Self::empty(fid, name, desc, ContainerKind::Adf { aid });
        adf.add_files(children)?;
        Ok(adf)
    }

    /// Attach the shared select-response decoder
    pub fn with_decoder(mut self, decoder: Arc<dyn SelectResponseDecoder>) -> Self {
        self.set_decoder(decoder);
        self
    }

    /// Inject a decoder for this container
    ///
    /// Child containers without a decoder of their own, or holding one they
    /// inherited, switch to this one.
    pub fn set_decoder(&mut self, decoder: Arc<dyn SelectResponseDecoder>) {
        self.decoder = Some(decoder);
        self.decoder_inherited = false;
        let shared = self.decoder.clone();
        for child in self.children.values_mut() {
            if let Node::Container(df) = child {
                df.inherit_decoder(&shared);
            }
        }
    }

    /// Give this subtree the parent's decoder where none was injected
    fn inherit_decoder(&mut self, decoder: &Option<Arc<dyn SelectResponseDecoder>>) {
        if self.decoder.is_none() || self.decoder_inherited {
            self.decoder = decoder.clone();
            self.decoder_inherited = decoder.is_some();
        }
        let own = self.decoder.clone();
        for child in self.children.values_mut() {
            if let Node::Container(df) = child {
                df.inherit_decoder(&own);
            }
        }
    }

    pub fn fid(&self) -> FileId {
        self.fid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn desc(&self) -> &str {
        &self.desc
    }

    pub fn kind(&self) -> &ContainerKind {
        &self.kind
    }

    /// Application identifier, for ADFs only
    pub fn aid(&self) -> Option<&str> {
        match &self.kind {
            ContainerKind::Adf { aid } => Some(aid),
            _ => None,
        }
    }

    /// Whether any container below this one is an ADF
    fn holds_adf(&self) -> bool {
        self.children
            .values()
            .filter_map(Node::as_container)
            .any(|df| df.aid().is_some() || df.holds_adf())
    }

    pub fn has_decoder(&self) -> bool {
        self.decoder.is_some()
    }

    /// Add a child, failing if its file id is already taken
    ///
    /// ADFs may only sit directly below the MF, so an ADF child is refused
    /// anywhere else and a child container may not carry ADFs inside it.
    pub fn insert(&mut self, child: impl Into<Node>) -> Result<()> {
        let mut child = child.into();
        let fid = child.fid();
        if self.children.contains_key(&fid) {
            return Err(FsError::DuplicateFileId {
                fid,
                parent: self.name.clone(),
            });
        }
        if let Node::Container(df) = &child {
            if df.aid().is_some() && self.kind != ContainerKind::Mf {
                return Err(FsError::Configuration {
                    file: df.name.clone(),
                    reason: format!("ADFs can only be placed below the MF, not in {}", self.name),
                });
            }
            if df.holds_adf() {
                return Err(FsError::Configuration {
                    file: df.name.clone(),
                    reason: "contains an ADF below its top level".to_string(),
                });
            }
        }
        if let Node::Container(df) = &mut child {
            df.inherit_decoder(&self.decoder);
        }
        self.children.insert(fid, child);
        Ok(())
    }

    /// Insert children in order, stopping at the first failure
    ///
    /// Children inserted before the failing one stay in place.
    pub fn add_files<I, N>(&mut self, children: I) -> Result<()>
    where
        I: IntoIterator<Item = N>,
        N: Into<Node>,
    {
        for child in children {
            self.insert(child)?;
        }
        Ok(())
    }

    pub fn contains(&self, fid: FileId) -> bool {
        self.children.contains_key(&fid)
    }

    pub fn child(&self, fid: FileId) -> Option<&Node> {
        self.children.get(&fid)
    }

    pub fn child_mut(&mut self, fid: FileId) -> Option<&mut Node> {
        self.children.get_mut(&fid)
    }

    pub fn child_by_name(&self, name: &str) -> Option<&Node> {
        self.children.values().find(|node| node.name() == name)
    }

    /// Direct child EF by file id
    pub fn ef(&self, fid: FileId) -> Option<&EfNode> {
        self.child(fid).and_then(Node::as_ef)
    }

    pub fn ef_mut(&mut self, fid: FileId) -> Option<&mut EfNode> {
        self.child_mut(fid).and_then(Node::as_ef_mut)
    }

    /// Walk down a path of file ids below this container
    pub fn lookup_path(&self, path: &[FileId]) -> Option<&Node> {
        let (last, parents) = path.split_last()?;
        let mut current = self;
        for fid in parents {
            current = current.child(*fid)?.as_container()?;
        }
        current.child(*last)
    }

    pub fn lookup_path_mut(&mut self, path: &[FileId]) -> Option<&mut Node> {
        let (last, parents) = path.split_last()?;
        let mut current = self;
        for fid in parents {
            current = current.child_mut(*fid)?.as_container_mut()?;
        }
        current.child_mut(*last)
    }

    /// Direct children in file id order
    pub fn children(&self) -> impl Iterator<Item = &Node> {
        self.children.values()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Decode the response to selecting this container
    ///
    /// The bytes go to the injected decoder unchanged. Without a decoder the
    /// raw hex string is returned as-is.
    pub fn decode_select_response(&self, resp_hex: &str) -> Result<Value> {
        let resp = hex::decode(resp_hex).map_err(|e| FsError::MalformedData {
            file: self.name.clone(),
            reason: format!("invalid select response hex: {}", e),
        })?;
        match &self.decoder {
            Some(decoder) => decoder.decode_select_response(&resp),
            None => Ok(Value::String(hex::encode(resp))),
        }
    }
}
