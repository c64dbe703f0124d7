//! Card identification and card-model provisioning
//!
//! This module matches observed ATRs against the known card models, builds
//! the per-session runtime tree from the bootstrap configuration, and holds
//! the card-model specific file sets.

pub mod atr;
pub mod config;
pub mod grcard;
pub mod model;
pub mod usim;

pub use atr::{atr_matches, format_atr, parse_atr};
pub use config::{ApplicationConfig, ConfigError, SessionConfig};
pub use grcard::GrcardUsim;
pub use model::{apply_matching_models, apply_models, find_matching_model, known_models, CardModel};
