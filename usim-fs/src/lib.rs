//! USIM card file system model
//!
//! Models the files of a USIM-family smart card as a typed hierarchy and
//! transcodes file contents between raw bytes and named fields.
//!
//! The crate covers:
//! - elementary files with declarative, size-checked byte layouts
//! - MF/DF/ADF containers and the per-session runtime tree
//! - card models that add their proprietary files once the card's ATR is known
//!
//! # Example
//! ```ignore
//! use usim_fs::card::{apply_matching_models, parse_atr, SessionConfig};
//!
//! let mut tree = SessionConfig::load(None).build_tree(None)?;
//! let atr = parse_atr("3B 9F 95 80 1F C3 80 31 E0 73 FE 21 13 57 86 81 02 86 98 44 18 A8")?;
//! apply_matching_models(&atr, &mut tree)?;
//! println!("{}", tree.to_json()?);
//! ```

pub mod card;
pub mod fs;

pub use card::{CardModel, GrcardUsim, SessionConfig};
pub use fs::{
    ApplicationRegistry, Container, ElementaryFile, FieldLayout, Fields, FileId, FsError, Node,
    RuntimeTree, SizeConstraint,
};
