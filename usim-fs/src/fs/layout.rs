//! Declarative byte layouts for elementary files
//!
//! A layout is an ordered list of named byte ranges. Decoding slices a raw
//! value into those ranges, encoding concatenates them back in order, so a
//! new file shape is just a new `FieldLayout` value.

use std::collections::HashSet;
use std::fmt;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// Allowed byte length of an elementary file's content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeConstraint {
    /// Exactly this many bytes
    Exact(usize),
    /// Inclusive range; `max: None` leaves the upper end open
    Range { min: usize, max: Option<usize> },
}

impl SizeConstraint {
    /// Smallest accepted length
    pub fn min(&self) -> usize {
        match *self {
            SizeConstraint::Exact(n) => n,
            SizeConstraint::Range { min, .. } => min,
        }
    }

    /// Largest accepted length, `None` if unbounded
    pub fn max(&self) -> Option<usize> {
        match *self {
            SizeConstraint::Exact(n) => Some(n),
            SizeConstraint::Range { max, .. } => max,
        }
    }

    /// Check whether a value of `len` bytes satisfies the constraint
    pub fn accepts(&self, len: usize) -> bool {
        len >= self.min() && self.max().map_or(true, |max| len <= max)
    }

    /// Describe why the constraint itself is unusable, if it is
    pub(crate) fn inconsistency(&self) -> Option<String> {
        match *self {
            SizeConstraint::Exact(0) => Some("exact size must be at least 1 byte".to_string()),
            SizeConstraint::Range { min, max: Some(max) } if min > max => {
                Some(format!("minimum size {} exceeds maximum size {}", min, max))
            }
            SizeConstraint::Range { max: Some(0), .. } => {
                Some("maximum size must be at least 1 byte".to_string())
            }
            _ => None,
        }
    }
}

impl fmt::Display for SizeConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeConstraint::Exact(n) => write!(f, "{}", n),
            SizeConstraint::Range { min, max: Some(max) } => write!(f, "[{}, {}]", min, max),
            SizeConstraint::Range { min, max: None } => write!(f, "[{}, ..]", min),
        }
    }
}

/// Byte length of a single field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldLength {
    Fixed(usize),
    /// Everything from the field's offset to the end of the value
    Rest,
}

/// One named byte range of a layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub name: String,
    pub offset: usize,
    pub length: FieldLength,
}

impl Field {
    pub fn new(name: impl Into<String>, offset: usize, length: FieldLength) -> Self {
        Self {
            name: name.into(),
            offset,
            length,
        }
    }
}

/// Ordered field layout of an elementary file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldLayout {
    fields: Vec<Field>,
}

impl FieldLayout {
    /// Create an empty layout, to be filled with the builder methods
    pub fn new() -> Self {
        Self::default()
    }

    /// Use explicitly positioned fields; checked when the file is built
    pub fn from_fields(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Layout with a single field spanning the whole value
    pub fn whole(name: &str) -> Self {
        Self::new().rest(name)
    }

    /// Layout of consecutive one-byte fields
    pub fn bytes(names: &[&str]) -> Self {
        names.iter().fold(Self::new(), |layout, name| layout.field(name, 1))
    }

    /// Append a fixed-length field directly after the previous one
    pub fn field(mut self, name: &str, length: usize) -> Self {
        let offset = self.next_offset();
        self.fields.push(Field::new(name, offset, FieldLength::Fixed(length)));
        self
    }

    /// Append a field that takes the remainder of the value
    pub fn rest(mut self, name: &str) -> Self {
        let offset = self.next_offset();
        self.fields.push(Field::new(name, offset, FieldLength::Rest));
        self
    }

    fn next_offset(&self) -> usize {
        self.fields.last().map_or(0, |last| match last.length {
            FieldLength::Fixed(len) => last.offset.saturating_add(len),
            // A field after `Rest` is rejected by `check`
            FieldLength::Rest => last.offset,
        })
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Total length of the fixed fields
    pub fn fixed_len(&self) -> usize {
        self.fields
            .iter()
            .map(|f| match f.length {
                FieldLength::Fixed(len) => len,
                FieldLength::Rest => 0,
            })
            .fold(0usize, usize::saturating_add)
    }

    pub fn has_rest(&self) -> bool {
        matches!(self.fields.last(), Some(Field { length: FieldLength::Rest, .. }))
    }

    /// Validate the layout against a size constraint
    ///
    /// Fields must be non-empty, uniquely named, contiguous from offset 0,
    /// with at most one trailing `Rest` field, and must fit the constraint.
    pub(crate) fn check(&self, size: &SizeConstraint) -> Result<(), String> {
        if self.fields.is_empty() {
            return Err("layout declares no fields".to_string());
        }

        let mut names = HashSet::new();
        let mut expected_offset = 0;
        for (i, field) in self.fields.iter().enumerate() {
            if !names.insert(field.name.as_str()) {
                return Err(format!("field '{}' declared twice", field.name));
            }
            if field.offset != expected_offset {
                return Err(format!(
                    "field '{}' at offset {} leaves the layout non-contiguous (expected offset {})",
                    field.name, field.offset, expected_offset
                ));
            }
            match field.length {
                FieldLength::Fixed(0) => {
                    return Err(format!("field '{}' has zero length", field.name));
                }
                FieldLength::Fixed(len) => {
                    expected_offset = expected_offset
                        .checked_add(len)
                        .ok_or_else(|| format!("field '{}' ends beyond the addressable range", field.name))?;
                }
                FieldLength::Rest if i + 1 != self.fields.len() => {
                    return Err(format!("field '{}' spans the remainder but is not last", field.name));
                }
                FieldLength::Rest => {}
            }
        }

        let fixed = expected_offset;
        if let Some(max) = size.max() {
            if fixed > max {
                return Err(format!("fields span {} bytes but the file holds at most {}", fixed, max));
            }
        }
        if !self.has_rest() && fixed < size.min() {
            return Err(format!("fields span {} bytes but the file holds at least {}", fixed, size.min()));
        }
        Ok(())
    }

    /// Slice a raw value into fields
    pub(crate) fn split(&self, raw: &[u8]) -> Result<Fields, String> {
        let fixed = self.fixed_len();
        if raw.len() < fixed || (!self.has_rest() && raw.len() != fixed) {
            return Err(format!("{} bytes cannot be sliced into a {}-byte layout", raw.len(), fixed));
        }

        let mut fields = Fields::new();
        for field in &self.fields {
            let end = match field.length {
                FieldLength::Fixed(len) => field.offset + len,
                FieldLength::Rest => raw.len(),
            };
            fields.insert(field.name.clone(), hex::encode(&raw[field.offset..end]));
        }
        Ok(fields)
    }

    /// Concatenate field values in declaration order
    ///
    /// Values must be lowercase hex, the form `split` produces, and every
    /// key must name a declared field.
    pub(crate) fn join(&self, fields: &Fields) -> Result<Vec<u8>, String> {
        if let Some(unknown) = fields
            .names()
            .find(|name| !self.fields.iter().any(|f| f.name == *name))
        {
            return Err(format!("field '{}' is not part of the layout", unknown));
        }

        let mut raw = Vec::with_capacity(self.fixed_len());
        for field in &self.fields {
            let value = fields
                .get(&field.name)
                .ok_or_else(|| format!("field '{}' is missing", field.name))?;
            if value.bytes().any(|b| b.is_ascii_uppercase()) {
                return Err(format!("field '{}' must be lowercase hex", field.name));
            }
            let bytes = hex::decode(value)
                .map_err(|e| format!("field '{}' is not valid hex: {}", field.name, e))?;
            if let FieldLength::Fixed(len) = field.length {
                if bytes.len() != len {
                    return Err(format!(
                        "field '{}' has {} bytes, expected {}",
                        field.name,
                        bytes.len(),
                        len
                    ));
                }
            }
            raw.extend_from_slice(&bytes);
        }
        Ok(raw)
    }
}

/// Decoded field values: name to hex byte string, in declaration order
///
/// Equality compares the mapping, not the order entries were inserted in.
#[derive(Debug, Clone, Default, Eq)]
pub struct Fields {
    entries: Vec<(String, String)>,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Set a field, keeping its position if it already exists
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

impl PartialEq for Fields {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = Fields::new();
        for (k, v) in iter {
            fields.insert(k, v);
        }
        fields
    }
}

impl Serialize for Fields {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}
