use crate::operand::Operand;

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Byte offset of the first prefix (or opcode, if unprefixed) in the source buffer.
    pub index: usize,
    pub prefix_bytes: Vec<u8>,
    pub opcode: u8,
    /// Set only for `DD CB`/`FD CB` bit instructions, whose displacement
    /// byte precedes the final opcode.
    pub displacement: Option<u8>,
    pub operand: Operand,
    pub mnemonic: &'static str,
}

/// A non-fatal decode fault surfaced during a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub index: usize,
    pub message: String,
}
