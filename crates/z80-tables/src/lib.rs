//! Static Z80 opcode tables.
//!
//! Seven parallel tables, one per prefix family, each a `[InstrEntry; 256]`
//! indexed by the raw opcode byte. `byte_len = -1` marks a prefix byte: the
//! opcode itself belongs to another family and decoding must continue.
//! Shared by the CPU decoder and the disassembler so both walk exactly the
//! same data.

mod fields;
mod tables;

pub use fields::{decode_fields, Fields};
pub use tables::{
    cb_table, ed_table, fd_table, fdcb_table, dd_table, ddcb_table, main_table, is_unmodelled_io,
    Family, InstrEntry,
};

/// Marks an opcode that is itself a prefix byte for another family.
pub const PREFIX_BYTE_LEN: i8 = -1;

impl Family {
    /// Looks up the static table for this family.
    #[must_use]
    pub fn table(self) -> &'static [InstrEntry; 256] {
        match self {
            Family::Main => main_table(),
            Family::Cb => cb_table(),
            Family::Ed => ed_table(),
            Family::Dd => dd_table(),
            Family::Fd => fd_table(),
            Family::DdCb => ddcb_table(),
            Family::FdCb => fdcb_table(),
        }
    }
}
