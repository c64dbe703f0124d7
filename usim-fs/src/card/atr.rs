//! ATR (Answer To Reset) handling
//!
//! Card models identify themselves by a fixed list of ATRs. Matching is an
//! exact byte-for-byte comparison; no masks or wildcards.

use crate::fs::{FsError, Result};

/// Parse an ATR written as hex, with or without spaces between bytes
pub fn parse_atr(atr: &str) -> Result<Vec<u8>> {
    let compact: String = atr.split_whitespace().collect();
    if compact.is_empty() {
        return Err(FsError::InvalidAtr("empty ATR".to_string()));
    }
    hex::decode(&compact).map_err(|e| FsError::InvalidAtr(format!("'{}': {}", atr, e)))
}

/// Format an ATR the way card tools print it: "3B 9F 95 ..."
pub fn format_atr(atr: &[u8]) -> String {
    atr.iter().map(|b| format!("{:02X}", b)).collect::<Vec<_>>().join(" ")
}

/// Check whether `observed` equals one of the candidate ATRs exactly
pub fn atr_matches(candidates: &[&[u8]], observed: &[u8]) -> bool {
    candidates.iter().any(|candidate| *candidate == observed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRCARD_ATR: &str = "3B 9F 95 80 1F C3 80 31 E0 73 FE 21 13 57 86 81 02 86 98 44 18 A8";

    #[test]
    fn test_parse_atr() {
        let atr = parse_atr(GRCARD_ATR).unwrap();
        assert_eq!(atr.len(), 22);
        assert_eq!(atr[0], 0x3B);
        assert_eq!(atr[21], 0xA8);

        assert_eq!(parse_atr("3b9f95").unwrap(), vec![0x3B, 0x9F, 0x95]);
        assert!(matches!(parse_atr(""), Err(FsError::InvalidAtr(_))));
        assert!(matches!(parse_atr("3B 9"), Err(FsError::InvalidAtr(_))));
    }

    #[test]
    fn test_format_atr() {
        let atr = parse_atr(GRCARD_ATR).unwrap();
        assert_eq!(format_atr(&atr), GRCARD_ATR);
    }

    #[test]
    fn test_atr_matches_exactly() {
        let atr = parse_atr(GRCARD_ATR).unwrap();
        let candidates: &[&[u8]] = &[&atr];
        assert!(atr_matches(candidates, &atr));
        assert!(!atr_matches(&[], &atr));

        // Every single-byte deviation must miss
        for i in 0..atr.len() {
            let mut changed = atr.clone();
            changed[i] ^= 0x01;
            assert!(!atr_matches(candidates, &changed), "byte {} ignored", i);
        }

        // Prefixes and extensions do not match either
        assert!(!atr_matches(candidates, &atr[..atr.len() - 1]));
        let mut longer = atr.clone();
        longer.push(0x00);
        assert!(!atr_matches(candidates, &longer));
    }
}
