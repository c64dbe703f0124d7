//! GRcard USIM
//!
//! Programmable USIM with a proprietary configuration DF at 7FF0 holding the
//! subscriber key material. When the USIM application is present the same
//! key files are also reachable below ADF.USIM.

use std::sync::Arc;

use log::{debug, info};

use super::model::CardModel;
use super::usim::{ef_imsi, AID_USIM};
use crate::fs::{
    ApplicationRegistry, Container, ElementaryFile, FieldLayout, FileId, Node, Result, RuntimeTree,
    SelectResponseDecoder, SizeConstraint,
};

pub const FID_EF_VERSION: FileId = FileId::new(0xA000);
pub const FID_DF_USIM: FileId = FileId::new(0x7FF0);
pub const FID_EF_OPC: FileId = FileId::new(0xFF01);
pub const FID_EF_K: FileId = FileId::new(0xFF02);
pub const FID_EF_R1R5: FileId = FileId::new(0xFF03);

/// EF.OPC: the 128-bit value derived from OP and K
pub fn ef_opc() -> Result<ElementaryFile> {
    ElementaryFile::new(
        FID_EF_OPC,
        None,
        "EF.OPC",
        "A 128-bit value that is derived from OP and K",
        SizeConstraint::Exact(16),
        FieldLayout::new().field("OPc", 16),
    )
}

/// EF.K: the subscriber key
pub fn ef_k() -> Result<ElementaryFile> {
    ElementaryFile::new(
        FID_EF_K,
        None,
        "EF.K",
        "The Subscriber Key",
        SizeConstraint::Exact(16),
        FieldLayout::new().field("K", 16),
    )
}

/// EF.R1R5: rotation constants R1 to R5, one byte each
pub fn ef_r1r5() -> Result<ElementaryFile> {
    ElementaryFile::new(
        FID_EF_R1R5,
        None,
        "EF.R1R5",
        "The Rotating Parameter for Key Generation",
        SizeConstraint::Exact(5),
        FieldLayout::bytes(&["R1", "R2", "R3", "R4", "R5"]),
    )
}

pub fn ef_version() -> Result<ElementaryFile> {
    ElementaryFile::transparent(FID_EF_VERSION, None, "EF.VERSION", "The Version of Card")
}

/// Fresh set of the three key material files
pub fn key_files() -> Result<Vec<ElementaryFile>> {
    Ok(vec![ef_opc()?, ef_k()?, ef_r1r5()?])
}

/// DF.USIM: IMSI plus key material
pub fn df_usim() -> Result<Container> {
    let mut children: Vec<Node> = vec![ef_imsi()?.into()];
    children.extend(key_files()?.into_iter().map(Into::into));
    Container::df(FID_DF_USIM, "DF.USIM", "USIM Configuration", children)
}

/// GRcard USIM card model
#[derive(Default, Clone)]
pub struct GrcardUsim {
    decoder: Option<Arc<dyn SelectResponseDecoder>>,
}

impl GrcardUsim {
    pub const ATRS: &'static [&'static [u8]] = &[&[
        0x3B, 0x9F, 0x95, 0x80, 0x1F, 0xC3, 0x80, 0x31, 0xE0, 0x73, 0xFE, 0x21, 0x13, 0x57, 0x86, 0x81,
        0x02, 0x86, 0x98, 0x44, 0x18, 0xA8,
    ]];

    pub fn new() -> Self {
        Self::default()
    }

    /// Use `decoder` for DF.USIM select responses instead of the MF's
    pub fn with_decoder(decoder: Arc<dyn SelectResponseDecoder>) -> Self {
        Self { decoder: Some(decoder) }
    }
}

impl CardModel for GrcardUsim {
    fn name(&self) -> &'static str {
        "GRcard USIM"
    }

    fn atrs(&self) -> &'static [&'static [u8]] {
        Self::ATRS
    }

    fn add_files(&self, tree: &mut RuntimeTree) -> Result<()> {
        tree.insert(ef_version()?)?;

        let mut df = df_usim()?;
        if let Some(decoder) = &self.decoder {
            df.set_decoder(Arc::clone(decoder));
        }
        tree.insert(df)?;
        info!("Added GRcard DF.USIM at {}", FID_DF_USIM);

        match tree.application_mut(AID_USIM) {
            Some(adf) => {
                adf.add_files(key_files()?)?;
                info!("Added GRcard key files to {}", adf.name());
            }
            None => debug!("USIM application {} not present, skipping ADF key files", AID_USIM),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::atr::{format_atr, parse_atr};
    use crate::card::usim::{adf_usim, FID_ADF_USIM, FID_EF_IMSI};
    use crate::fs::{Fields, FsError};

    fn tree_with_usim() -> RuntimeTree {
        RuntimeTree::bootstrap(vec![adf_usim().unwrap()]).unwrap()
    }

    #[test]
    fn test_key_files_round_trip() {
        for ef in key_files().unwrap() {
            let len = ef.size().min();
            let raw: String = (0..len).map(|i| format!("{:02x}", (i * 17 + 3) % 256)).collect();
            let fields = ef.decode(&raw).unwrap();
            assert_eq!(ef.encode(&fields).unwrap(), raw, "{}", ef.name());
            assert_eq!(ef.decode(&ef.encode(&fields).unwrap()).unwrap(), fields);
        }
    }

    #[test]
    fn test_r1r5_split() {
        let ef = ef_r1r5().unwrap();
        let fields = ef.decode("1122334455").unwrap();
        let expected: Fields = [("R1", "11"), ("R2", "22"), ("R3", "33"), ("R4", "44"), ("R5", "55")]
            .into_iter()
            .collect();
        assert_eq!(fields, expected);
        assert_eq!(ef.encode(&expected).unwrap(), "1122334455");
    }

    #[test]
    fn test_key_size_validation() {
        for ef in [ef_k().unwrap(), ef_opc().unwrap()] {
            for len in [0usize, 15, 17, 32] {
                let raw = "ab".repeat(len);
                assert!(
                    matches!(ef.decode(&raw), Err(FsError::SizeConstraintViolation { .. })),
                    "{} accepted {} bytes",
                    ef.name(),
                    len
                );
            }
        }
    }

    #[test]
    fn test_opc_and_k_field_names() {
        let raw = "000102030405060708090a0b0c0d0e0f";
        assert_eq!(ef_opc().unwrap().decode(raw).unwrap().get("OPc"), Some(raw));
        assert_eq!(ef_k().unwrap().decode(raw).unwrap().get("K"), Some(raw));
    }

    #[test]
    fn test_df_usim_composition() {
        let mut df = df_usim().unwrap();
        assert_eq!(df.len(), 4);
        for fid in [FID_EF_IMSI, FID_EF_OPC, FID_EF_K, FID_EF_R1R5] {
            assert!(df.contains(fid), "missing {}", fid);
        }

        let err = df.insert(ef_k().unwrap()).unwrap_err();
        assert!(matches!(err, FsError::DuplicateFileId { fid, .. } if fid == FID_EF_K));
        assert_eq!(df.len(), 4);
    }

    #[test]
    fn test_matches_grcard_atr() {
        let model = GrcardUsim::new();
        let atr = parse_atr("3B 9F 95 80 1F C3 80 31 E0 73 FE 21 13 57 86 81 02 86 98 44 18 A8").unwrap();
        assert!(model.matches(&atr));
        assert_eq!(format_atr(GrcardUsim::ATRS[0]), format_atr(&atr));

        let mut off_by_one = atr.clone();
        off_by_one[21] = 0xA9;
        assert!(!model.matches(&off_by_one));
    }

    #[test]
    fn test_add_files_without_usim() {
        let mut tree = RuntimeTree::new();
        GrcardUsim::new().add_files(&mut tree).unwrap();

        let names: Vec<_> = tree.mf().children().map(Node::name).collect();
        assert_eq!(names, vec!["DF.USIM", "EF.VERSION"]);
        assert_eq!(tree.applications().count(), 0);
    }

    #[test]
    fn test_add_files_with_usim() {
        let mut tree = tree_with_usim();
        GrcardUsim::new().add_files(&mut tree).unwrap();

        assert_eq!(tree.mf().len(), 3);
        let adf = tree.application(AID_USIM).unwrap();
        assert_eq!(adf.len(), 3);
        for fid in [FID_EF_OPC, FID_EF_K, FID_EF_R1R5] {
            assert!(adf.contains(fid));
        }
    }

    #[test]
    fn test_adf_key_files_are_independent() {
        let mut tree = tree_with_usim();
        GrcardUsim::new().add_files(&mut tree).unwrap();

        let in_df = [FID_DF_USIM, FID_EF_K];
        let in_adf = [FID_ADF_USIM, FID_EF_K];
        let key: Fields = [("K", "000102030405060708090a0b0c0d0e0f")].into_iter().collect();

        tree.update_fields(&in_df, &key).unwrap();
        assert_eq!(tree.read_fields(&in_df).unwrap(), Some(key.clone()));
        assert_eq!(tree.read_fields(&in_adf).unwrap(), None);

        let other: Fields = [("K", "ffeeddccbbaa99887766554433221100")].into_iter().collect();
        tree.update_fields(&in_adf, &other).unwrap();
        assert_eq!(tree.read_fields(&in_df).unwrap(), Some(key));
        assert_eq!(tree.read_fields(&in_adf).unwrap(), Some(other));
    }

    #[test]
    fn test_add_files_twice_fails() {
        let mut tree = tree_with_usim();
        let model = GrcardUsim::new();
        model.add_files(&mut tree).unwrap();

        let err = model.add_files(&mut tree).unwrap_err();
        assert_eq!(
            err,
            FsError::DuplicateFileId {
                fid: FID_EF_VERSION,
                parent: "MF".to_string()
            }
        );
        assert_eq!(tree.mf().len(), 3);
    }

    #[test]
    fn test_partial_application_is_kept() {
        let mut tree = tree_with_usim();
        tree.application_mut(AID_USIM).unwrap().insert(ef_k().unwrap()).unwrap();

        let err = GrcardUsim::new().add_files(&mut tree).unwrap_err();
        assert!(matches!(err, FsError::DuplicateFileId { fid, .. } if fid == FID_EF_K));

        // Steps before the collision stay applied
        assert!(tree.mf().contains(FID_EF_VERSION));
        assert!(tree.mf().contains(FID_DF_USIM));
        assert!(tree.application(AID_USIM).unwrap().contains(FID_EF_OPC));
        assert!(!tree.application(AID_USIM).unwrap().contains(FID_EF_R1R5));
    }

    #[test]
    fn test_df_usim_uses_model_decoder() {
        let decoder: Arc<dyn SelectResponseDecoder> = Arc::new(|resp: &[u8]| -> Result<serde_json::Value> {
            Ok(serde_json::json!({ "fcp_len": resp.len() }))
        });
        let mut tree = RuntimeTree::new();
        GrcardUsim::with_decoder(decoder).add_files(&mut tree).unwrap();

        let df = tree.mf().child(FID_DF_USIM).and_then(Node::as_container).unwrap();
        assert_eq!(df.decode_select_response("620a").unwrap()["fcp_len"], 2);
    }
}
