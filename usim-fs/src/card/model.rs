//! Card models
//!
//! A card model recognizes a card family by its ATR and adds the family's
//! proprietary files to a runtime tree that session bootstrap already built.

use log::{debug, info};
use once_cell::sync::Lazy;

use super::atr::{atr_matches, format_atr};
use super::grcard::GrcardUsim;
use crate::fs::{Result, RuntimeTree};

/// A card family with its own file set
pub trait CardModel: Send + Sync {
    /// Human readable model name
    fn name(&self) -> &'static str;

    /// ATRs identifying this model
    fn atrs(&self) -> &'static [&'static [u8]];

    /// Check whether `atr` is one of this model's ATRs
    fn matches(&self, atr: &[u8]) -> bool {
        atr_matches(self.atrs(), atr)
    }

    /// Add the model's files to `tree`
    ///
    /// Runs once per session. Insertions happen in order and stop at the
    /// first failure; files added before it are not removed.
    fn add_files(&self, tree: &mut RuntimeTree) -> Result<()>;
}

static MODELS: Lazy<Vec<Box<dyn CardModel>>> = Lazy::new(|| vec![Box::new(GrcardUsim::new())]);

/// All card models known to this crate
pub fn known_models() -> &'static [Box<dyn CardModel>] {
    &MODELS
}

/// First known model whose ATR list contains `atr`
pub fn find_matching_model(atr: &[u8]) -> Option<&'static dyn CardModel> {
    known_models()
        .iter()
        .map(|model| model.as_ref())
        .find(|model| model.matches(atr))
}

/// Add the files of every known model matching `atr`
///
/// Returns how many models were applied.
pub fn apply_matching_models(atr: &[u8], tree: &mut RuntimeTree) -> Result<usize> {
    apply_models(known_models().iter().map(|model| model.as_ref()), atr, tree)
}

/// Add the files of every model in `models` matching `atr`
pub fn apply_models<'a, I>(models: I, atr: &[u8], tree: &mut RuntimeTree) -> Result<usize>
where
    I: IntoIterator<Item = &'a dyn CardModel>,
{
    let mut applied = 0;
    for model in models {
        if model.matches(atr) {
            info!("Card model {} matches ATR {}", model.name(), format_atr(atr));
            model.add_files(tree)?;
            applied += 1;
        }
    }
    if applied == 0 {
        debug!("No card model matches ATR {}", format_atr(atr));
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{ElementaryFile, FileId, FsError};

    struct VersionOnly;

    impl CardModel for VersionOnly {
        fn name(&self) -> &'static str {
            "Version only"
        }

        fn atrs(&self) -> &'static [&'static [u8]] {
            &[&[0x3B, 0x02, 0x14, 0x50]]
        }

        fn add_files(&self, tree: &mut RuntimeTree) -> Result<()> {
            tree.insert(ElementaryFile::transparent(FileId::new(0xA000), None, "EF.VERSION", "Version")?)
        }
    }

    #[test]
    fn test_known_models_include_grcard() {
        assert!(known_models().iter().any(|model| model.name() == "GRcard USIM"));
    }

    #[test]
    fn test_find_matching_model() {
        let atr = GrcardUsim::ATRS[0].to_vec();
        assert_eq!(find_matching_model(&atr).map(|m| m.name()), Some("GRcard USIM"));
        assert!(find_matching_model(&[0x3B, 0x00]).is_none());
    }

    #[test]
    fn test_apply_models_only_runs_matching() {
        let models: [&dyn CardModel; 2] = [&VersionOnly, &GrcardUsim::new()];
        let mut tree = RuntimeTree::new();

        let applied = apply_models(models, &[0x3B, 0x02, 0x14, 0x50], &mut tree).unwrap();
        assert_eq!(applied, 1);
        assert_eq!(tree.mf().len(), 1);

        let applied = apply_models(models, &[0x3B, 0x02, 0x14, 0x51], &mut tree).unwrap();
        assert_eq!(applied, 0);
    }

    #[test]
    fn test_apply_models_propagates_failure() {
        let models: [&dyn CardModel; 1] = [&VersionOnly];
        let mut tree = RuntimeTree::new();
        let atr = [0x3B, 0x02, 0x14, 0x50];

        apply_models(models, &atr, &mut tree).unwrap();
        let err = apply_models(models, &atr, &mut tree).unwrap_err();
        assert!(matches!(err, FsError::DuplicateFileId { .. }));
    }
}
