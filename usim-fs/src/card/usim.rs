//! Standard USIM files shared by all card models
//!
//! Only the files the card models reference are declared here.

use crate::fs::{Container, ElementaryFile, FieldLayout, FileId, Result, SizeConstraint};

/// AID of the 3GPP USIM application
pub const AID_USIM: &str = "a0000000871002";

/// File id the USIM ADF is placed at below the MF
pub const FID_ADF_USIM: FileId = FileId::new(0x7FFF);

pub const FID_EF_IMSI: FileId = FileId::new(0x6F07);

/// EF.IMSI: length byte followed by the BCD-coded IMSI
pub fn ef_imsi() -> Result<ElementaryFile> {
    ElementaryFile::new(
        FID_EF_IMSI,
        Some(0x07),
        "EF.IMSI",
        "IMSI",
        SizeConstraint::Exact(9),
        FieldLayout::new().field("length", 1).field("imsi", 8),
    )
}

/// Empty USIM ADF, as session bootstrap registers it
pub fn adf_usim() -> Result<Container> {
    Container::adf(AID_USIM, FID_ADF_USIM, "ADF.USIM", "USIM Application", Vec::new())
}
