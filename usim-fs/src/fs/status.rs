//! Status Word (SW) constants for file system errors
//!
//! ISO 7816-4 status words a card answers for the conditions the file
//! system model reports, so tooling can show the same codes a card would.

/// Status Word constants
pub struct SW;

impl SW {
    pub const WRONG_LENGTH: u16 = 0x6700;

    pub const WRONG_DATA: u16 = 0x6A80;
    pub const FILE_NOT_FOUND: u16 = 0x6A82;
    pub const FILE_ALREADY_EXISTS: u16 = 0x6A89;

    pub const UNKNOWN_ERROR: u16 = 0x6F00;
}
