//! Elementary files
//!
//! An `ElementaryFile` is an immutable descriptor: identity, size constraint
//! and field layout. Contents live in the `EfNode` that places the descriptor
//! in a runtime tree.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use super::layout::{FieldLayout, Fields, SizeConstraint};
use super::{FsError, Result};

/// Two-byte file identifier, shown as four lowercase hex digits
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileId(u16);

impl FileId {
    /// Master File
    pub const MF: FileId = FileId(0x3F00);

    pub const fn new(fid: u16) -> Self {
        Self(fid)
    }

    pub fn value(&self) -> u16 {
        self.0
    }

    pub fn to_bytes(&self) -> [u8; 2] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}", self.0)
    }
}

impl FromStr for FileId {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = |reason: String| FsError::MalformedData {
            file: "file id".to_string(),
            reason,
        };
        let bytes = hex::decode(s.trim()).map_err(|e| malformed(format!("'{}': {}", s, e)))?;
        match bytes.as_slice() {
            [hi, lo] => Ok(Self(u16::from_be_bytes([*hi, *lo]))),
            _ => Err(malformed(format!("'{}' is not two bytes", s))),
        }
    }
}

impl Serialize for FileId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Transparent elementary file descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementaryFile {
    fid: FileId,
    sfid: Option<u8>,
    name: String,
    desc: String,
    size: SizeConstraint,
    layout: FieldLayout,
}

impl ElementaryFile {
    /// Largest short file identifier (5 bits, 0x1F is reserved)
    pub const MAX_SFID: u8 = 0x1E;

    /// Create a descriptor, rejecting inconsistent size constraints and layouts
    pub fn new(
        fid: FileId,
        sfid: Option<u8>,
        name: &str,
        desc: &str,
        size: SizeConstraint,
        layout: FieldLayout,
    ) -> Result<Self> {
        let configuration = |reason: String| FsError::Configuration {
            file: name.to_string(),
            reason,
        };

        if let Some(reason) = size.inconsistency() {
            return Err(configuration(reason));
        }
        if let Some(sfid) = sfid {
            if sfid == 0 || sfid > Self::MAX_SFID {
                return Err(configuration(format!("short file id {:#04x} out of range", sfid)));
            }
        }
        layout.check(&size).map_err(configuration)?;

        Ok(Self {
            fid,
            sfid,
            name: name.to_string(),
            desc: desc.to_string(),
            size,
            layout,
        })
    }

    /// Generic transparent file of at least one byte, decoded as one `raw` field
    pub fn transparent(fid: FileId, sfid: Option<u8>, name: &str, desc: &str) -> Result<Self> {
        Self::new(
            fid,
            sfid,
            name,
            desc,
            SizeConstraint::Range { min: 1, max: None },
            FieldLayout::whole("raw"),
        )
    }

    pub fn fid(&self) -> FileId {
        self.fid
    }

    pub fn sfid(&self) -> Option<u8> {
        self.sfid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn desc(&self) -> &str {
        &self.desc
    }

    pub fn size(&self) -> SizeConstraint {
        self.size
    }

    pub fn layout(&self) -> &FieldLayout {
        &self.layout
    }

    /// Decode a hex-encoded raw value into its fields
    pub fn decode(&self, raw_hex: &str) -> Result<Fields> {
        let raw = hex::decode(raw_hex).map_err(|e| self.malformed(format!("invalid hex: {}", e)))?;
        self.decode_bytes(&raw)
    }

    /// Decode raw bytes into their fields
    pub fn decode_bytes(&self, raw: &[u8]) -> Result<Fields> {
        self.check_size(raw.len())?;
        self.layout.split(raw).map_err(|reason| self.malformed(reason))
    }

    /// Encode fields into a lowercase hex string
    pub fn encode(&self, fields: &Fields) -> Result<String> {
        self.encode_bytes(fields).map(hex::encode)
    }

    /// Encode fields into raw bytes
    ///
    /// Every key must be a declared field and every value lowercase hex, so
    /// that decoding the result gives back exactly `fields`.
    pub fn encode_bytes(&self, fields: &Fields) -> Result<Vec<u8>> {
        let raw = self.layout.join(fields).map_err(|reason| self.malformed(reason))?;
        self.check_size(raw.len())?;
        Ok(raw)
    }

    fn check_size(&self, len: usize) -> Result<()> {
        if self.size.accepts(len) {
            Ok(())
        } else {
            Err(FsError::SizeConstraintViolation {
                file: self.name.clone(),
                actual: len,
                constraint: self.size,
            })
        }
    }

    fn malformed(&self, reason: String) -> FsError {
        FsError::MalformedData {
            file: self.name.clone(),
            reason,
        }
    }
}

/// An elementary file placed in a runtime tree, with its session contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EfNode {
    #[serde(flatten)]
    file: ElementaryFile,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "serialize_content")]
    content: Option<Vec<u8>>,
}

fn serialize_content<S: Serializer>(
    content: &Option<Vec<u8>>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match content {
        Some(bytes) => serializer.serialize_str(&hex::encode(bytes)),
        None => serializer.serialize_none(),
    }
}

impl EfNode {
    pub fn new(file: ElementaryFile) -> Self {
        Self { file, content: None }
    }

    pub fn file(&self) -> &ElementaryFile {
        &self.file
    }

    pub fn fid(&self) -> FileId {
        self.file.fid
    }

    pub fn name(&self) -> &str {
        &self.file.name
    }

    /// Raw contents last read from or written to the card, if any
    pub fn content(&self) -> Option<&[u8]> {
        self.content.as_deref()
    }

    /// Store raw contents after checking them against the descriptor
    pub fn update_binary(&mut self, raw: &[u8]) -> Result<()> {
        self.file.decode_bytes(raw)?;
        self.content = Some(raw.to_vec());
        Ok(())
    }

    /// Encode fields and store the result as the file's contents
    pub fn update_fields(&mut self, fields: &Fields) -> Result<()> {
        let raw = self.file.encode_bytes(fields)?;
        self.content = Some(raw);
        Ok(())
    }

    /// Decode the stored contents, `None` if nothing was stored yet
    pub fn read_fields(&self) -> Result<Option<Fields>> {
        self.content
            .as_deref()
            .map(|raw| self.file.decode_bytes(raw))
            .transpose()
    }

    pub fn clear(&mut self) {
        self.content = None;
    }
}

impl From<ElementaryFile> for EfNode {
    fn from(file: ElementaryFile) -> Self {
        Self::new(file)
    }
}
