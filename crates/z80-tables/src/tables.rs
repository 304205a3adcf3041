use std::sync::LazyLock;

use crate::fields::decode_fields;

/// Which of the seven opcode tables an instruction byte stream is currently reading from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Main,
    Cb,
    Ed,
    Dd,
    Fd,
    DdCb,
    FdCb,
}

/// One opcode's static metadata.
///
/// `byte_len` counts the instruction's total encoded length including any
/// prefix bytes already consumed to reach this family; `-1` means this byte
/// is itself a prefix and decoding should continue in another family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstrEntry {
    pub byte_len: i8,
    pub mnemonic: &'static str,
}

const UNDEFINED: InstrEntry = InstrEntry { byte_len: 2, mnemonic: "NOP" };
const PREFIX: InstrEntry = InstrEntry { byte_len: -1, mnemonic: "" };

/// True for opcodes that decode cleanly (correct `byte_len`/mnemonic) but
/// whose execution is an I/O port transfer no device exists to model: the
/// immediate `OUT (n),A`/`IN A,(n)` pair and the whole `IN r,(C)`/`OUT (C),r`
/// family. The CPU core's executor treats these as no-ops rather than
/// implementing the transfer; the disassembler surfaces that gap as a
/// warning instead of a silent placeholder function pointer.
#[must_use]
pub fn is_unmodelled_io(family: Family, opcode: u8) -> bool {
    match family {
        Family::Main => matches!(opcode, 0xD3 | 0xDB),
        Family::Ed => {
            let f = decode_fields(opcode);
            f.x == 1 && matches!(f.z, 0 | 1)
        }
        _ => false,
    }
}

const R8: [&str; 8] = ["B", "C", "D", "E", "H", "L", "(HL)", "A"];
const RP_SP: [&str; 4] = ["BC", "DE", "HL", "SP"];
const RP_AF: [&str; 4] = ["BC", "DE", "HL", "AF"];
const CC: [&str; 8] = ["NZ", "Z", "NC", "C", "PO", "PE", "P", "M"];
const ALU: [&str; 8] = ["ADD A,", "ADC A,", "SUB ", "SBC A,", "AND ", "XOR ", "OR ", "CP "];
const ROT: [&str; 8] = ["RLC", "RRC", "RL", "RR", "SLA", "SRA", "SLL", "SRL"];

fn leak(s: String) -> &'static str {
    Box::leak(s.into_boxed_str())
}

fn build_main() -> [InstrEntry; 256] {
    let mut table = [UNDEFINED; 256];
    for opcode in 0..=255u16 {
        let op = opcode as u8;
        let f = decode_fields(op);
        let (x, y, z, p, q) = (f.x, f.y, f.z, f.p, f.q);
        table[op as usize] = match x {
            0 => match z {
                0 => match y {
                    0 => InstrEntry { byte_len: 1, mnemonic: "NOP" },
                    1 => InstrEntry { byte_len: 1, mnemonic: "EX AF,AF'" },
                    2 => InstrEntry { byte_len: 2, mnemonic: "DJNZ d" },
                    3 => InstrEntry { byte_len: 2, mnemonic: "JR d" },
                    _ => InstrEntry { byte_len: 2, mnemonic: leak(format!("JR {},d", CC[(y - 4) as usize])) },
                },
                1 => {
                    if q == 0 {
                        InstrEntry { byte_len: 3, mnemonic: leak(format!("LD {},nn", RP_SP[p as usize])) }
                    } else {
                        InstrEntry { byte_len: 1, mnemonic: leak(format!("ADD HL,{}", RP_SP[p as usize])) }
                    }
                }
                2 => match (q, p) {
                    (0, 0) => InstrEntry { byte_len: 1, mnemonic: "LD (BC),A" },
                    (0, 1) => InstrEntry { byte_len: 1, mnemonic: "LD (DE),A" },
                    (0, 2) => InstrEntry { byte_len: 3, mnemonic: "LD (nn),HL" },
                    (0, _) => InstrEntry { byte_len: 3, mnemonic: "LD (nn),A" },
                    (_, 0) => InstrEntry { byte_len: 1, mnemonic: "LD A,(BC)" },
                    (_, 1) => InstrEntry { byte_len: 1, mnemonic: "LD A,(DE)" },
                    (_, 2) => InstrEntry { byte_len: 3, mnemonic: "LD HL,(nn)" },
                    _ => InstrEntry { byte_len: 3, mnemonic: "LD A,(nn)" },
                },
                3 => {
                    if q == 0 {
                        InstrEntry { byte_len: 1, mnemonic: leak(format!("INC {}", RP_SP[p as usize])) }
                    } else {
                        InstrEntry { byte_len: 1, mnemonic: leak(format!("DEC {}", RP_SP[p as usize])) }
                    }
                }
                4 => InstrEntry { byte_len: 1, mnemonic: leak(format!("INC {}", R8[y as usize])) },
                5 => InstrEntry { byte_len: 1, mnemonic: leak(format!("DEC {}", R8[y as usize])) },
                6 => InstrEntry { byte_len: 2, mnemonic: leak(format!("LD {},n", R8[y as usize])) },
                _ => InstrEntry {
                    byte_len: 1,
                    mnemonic: ["RLCA", "RRCA", "RLA", "RRA", "DAA", "CPL", "SCF", "CCF"][y as usize],
                },
            },
            1 => {
                if y == 6 && z == 6 {
                    InstrEntry { byte_len: 1, mnemonic: "HALT" }
                } else {
                    InstrEntry { byte_len: 1, mnemonic: leak(format!("LD {},{}", R8[y as usize], R8[z as usize])) }
                }
            }
            2 => InstrEntry { byte_len: 1, mnemonic: leak(format!("{}{}", ALU[y as usize], R8[z as usize])) },
            _ => match z {
                0 => InstrEntry { byte_len: 1, mnemonic: leak(format!("RET {}", CC[y as usize])) },
                1 => {
                    if q == 0 {
                        InstrEntry { byte_len: 1, mnemonic: leak(format!("POP {}", RP_AF[p as usize])) }
                    } else {
                        match p {
                            0 => InstrEntry { byte_len: 1, mnemonic: "RET" },
                            1 => InstrEntry { byte_len: 1, mnemonic: "EXX" },
                            2 => InstrEntry { byte_len: 1, mnemonic: "JP (HL)" },
                            _ => InstrEntry { byte_len: 1, mnemonic: "LD SP,HL" },
                        }
                    }
                }
                2 => InstrEntry { byte_len: 3, mnemonic: leak(format!("JP {},nn", CC[y as usize])) },
                3 => match y {
                    0 => InstrEntry { byte_len: 3, mnemonic: "JP nn" },
                    1 => PREFIX,
                    2 => InstrEntry { byte_len: 2, mnemonic: "OUT (n),A" },
                    3 => InstrEntry { byte_len: 2, mnemonic: "IN A,(n)" },
                    4 => InstrEntry { byte_len: 1, mnemonic: "EX (SP),HL" },
                    5 => InstrEntry { byte_len: 1, mnemonic: "EX DE,HL" },
                    6 => InstrEntry { byte_len: 1, mnemonic: "DI" },
                    _ => InstrEntry { byte_len: 1, mnemonic: "EI" },
                },
                4 => InstrEntry { byte_len: 3, mnemonic: leak(format!("CALL {},nn", CC[y as usize])) },
                5 => {
                    if q == 0 {
                        InstrEntry { byte_len: 1, mnemonic: leak(format!("PUSH {}", RP_AF[p as usize])) }
                    } else {
                        match p {
                            0 => InstrEntry { byte_len: 3, mnemonic: "CALL nn" },
                            1 => PREFIX,
                            2 => PREFIX,
                            _ => PREFIX,
                        }
                    }
                }
                6 => InstrEntry { byte_len: 2, mnemonic: leak(format!("{}n", ALU[y as usize])) },
                _ => InstrEntry { byte_len: 1, mnemonic: leak(format!("RST {:02X}H", y * 8)) },
            },
        };
    }
    table
}

fn build_cb() -> [InstrEntry; 256] {
    let mut table = [UNDEFINED; 256];
    for opcode in 0..=255u16 {
        let op = opcode as u8;
        let f = decode_fields(op);
        let mnemonic = match f.x {
            0 => format!("{} {}", ROT[f.y as usize], R8[f.z as usize]),
            1 => format!("BIT {},{}", f.y, R8[f.z as usize]),
            2 => format!("RES {},{}", f.y, R8[f.z as usize]),
            _ => format!("SET {},{}", f.y, R8[f.z as usize]),
        };
        table[op as usize] = InstrEntry { byte_len: 2, mnemonic: leak(mnemonic) };
    }
    table
}

fn build_ed() -> [InstrEntry; 256] {
    let mut table = [UNDEFINED; 256];
    for opcode in 0..=255u16 {
        let op = opcode as u8;
        let f = decode_fields(op);
        let entry = match f.x {
            1 => match f.z {
                0 => {
                    if f.y == 6 {
                        InstrEntry { byte_len: 2, mnemonic: "IN (C)" }
                    } else {
                        InstrEntry { byte_len: 2, mnemonic: leak(format!("IN {},(C)", R8[f.y as usize])) }
                    }
                }
                1 => {
                    if f.y == 6 {
                        InstrEntry { byte_len: 2, mnemonic: "OUT (C),0" }
                    } else {
                        InstrEntry { byte_len: 2, mnemonic: leak(format!("OUT (C),{}", R8[f.y as usize])) }
                    }
                }
                2 => {
                    if f.q == 0 {
                        InstrEntry { byte_len: 2, mnemonic: leak(format!("SBC HL,{}", RP_SP[f.p as usize])) }
                    } else {
                        InstrEntry { byte_len: 2, mnemonic: leak(format!("ADC HL,{}", RP_SP[f.p as usize])) }
                    }
                }
                3 => {
                    if f.q == 0 {
                        InstrEntry { byte_len: 4, mnemonic: leak(format!("LD (nn),{}", RP_SP[f.p as usize])) }
                    } else {
                        InstrEntry { byte_len: 4, mnemonic: leak(format!("LD {},(nn)", RP_SP[f.p as usize])) }
                    }
                }
                4 => InstrEntry { byte_len: 2, mnemonic: "NEG" },
                5 => InstrEntry { byte_len: 2, mnemonic: if f.y == 1 { "RETI" } else { "RETN" } },
                6 => InstrEntry {
                    byte_len: 2,
                    mnemonic: ["IM 0", "IM 0", "IM 1", "IM 2", "IM 0", "IM 0", "IM 1", "IM 2"][f.y as usize],
                },
                _ => InstrEntry {
                    byte_len: 2,
                    mnemonic: ["LD I,A", "LD R,A", "LD A,I", "LD A,R", "RLD", "RRD", "NOP", "NOP"][f.y as usize],
                },
            },
            2 if f.y >= 4 && f.z <= 3 => {
                let name = match (f.y, f.z) {
                    (4, 0) => "LDI",
                    (4, 1) => "CPI",
                    (4, 2) => "INI",
                    (4, _) => "OUTI",
                    (5, 0) => "LDD",
                    (5, 1) => "CPD",
                    (5, 2) => "IND",
                    (5, _) => "OUTD",
                    (6, 0) => "LDIR",
                    (6, 1) => "CPIR",
                    (6, 2) => "INIR",
                    (6, _) => "OTIR",
                    (_, 0) => "LDDR",
                    (_, 1) => "CPDR",
                    (_, 2) => "INDR",
                    (_, _) => "OTDR",
                };
                InstrEntry { byte_len: 2, mnemonic: name }
            }
            _ => UNDEFINED,
        };
        table[op as usize] = entry;
    }
    table
}

/// `HL` (and the memory access through `(HL)`) becomes `IX`/`IY` (`(IX+d)`/`(IY+d)`)
/// in the index-register families; everything else falls through to the main
/// table with one extra byte for the prefix already consumed.
fn build_indexed(index_name: &str) -> [InstrEntry; 256] {
    let main = main_table();
    let mut table = [UNDEFINED; 256];
    for opcode in 0..=255u16 {
        let op = opcode as u8;
        let f = decode_fields(op);
        let base = main[op as usize];
        table[op as usize] = match (op, f.x, f.y, f.z) {
            (0x09, ..) | (0x19, ..) | (0x29, ..) | (0x39, ..) => {
                let rp = [ "BC", "DE", index_name, "SP" ][f.p as usize];
                InstrEntry { byte_len: 2, mnemonic: leak(format!("ADD {},{}", index_name, rp)) }
            }
            (0x21, ..) => InstrEntry { byte_len: 4, mnemonic: leak(format!("LD {},nn", index_name)) },
            (0x22, ..) => InstrEntry { byte_len: 4, mnemonic: leak(format!("LD (nn),{}", index_name)) },
            (0x23, ..) => InstrEntry { byte_len: 2, mnemonic: leak(format!("INC {}", index_name)) },
            (0x2A, ..) => InstrEntry { byte_len: 4, mnemonic: leak(format!("LD {},(nn)", index_name)) },
            (0x2B, ..) => InstrEntry { byte_len: 2, mnemonic: leak(format!("DEC {}", index_name)) },
            (0x34, ..) => InstrEntry { byte_len: 3, mnemonic: leak(format!("INC ({}+d)", index_name)) },
            (0x35, ..) => InstrEntry { byte_len: 3, mnemonic: leak(format!("DEC ({}+d)", index_name)) },
            (0x36, ..) => InstrEntry { byte_len: 4, mnemonic: leak(format!("LD ({}+d),n", index_name)) },
            (0xCB, ..) => PREFIX,
            (0xE1, ..) => InstrEntry { byte_len: 2, mnemonic: leak(format!("POP {}", index_name)) },
            (0xE3, ..) => InstrEntry { byte_len: 2, mnemonic: leak(format!("EX (SP),{}", index_name)) },
            (0xE5, ..) => InstrEntry { byte_len: 2, mnemonic: leak(format!("PUSH {}", index_name)) },
            (0xE9, ..) => InstrEntry { byte_len: 2, mnemonic: leak(format!("JP ({})", index_name)) },
            (0xF9, ..) => InstrEntry { byte_len: 2, mnemonic: leak(format!("LD SP,{}", index_name)) },
            (_, 1, 6, 6) => InstrEntry { byte_len: 2, mnemonic: "HALT" },
            (_, 1, y, 6) => InstrEntry {
                byte_len: 3,
                mnemonic: leak(format!("LD {},({}+d)", R8[y as usize], index_name)),
            },
            (_, 1, 6, z) => InstrEntry {
                byte_len: 3,
                mnemonic: leak(format!("LD ({}+d),{}", index_name, R8[z as usize])),
            },
            (_, 2, y, 6) => InstrEntry { byte_len: 3, mnemonic: leak(format!("{}({}+d)", ALU[y as usize], index_name)) },
            _ if base.byte_len == PREFIX_BYTE_LEN => base,
            _ if base.byte_len > 0 => InstrEntry { byte_len: base.byte_len + 1, mnemonic: base.mnemonic },
            _ => base,
        };
    }
    table
}

const PREFIX_BYTE_LEN: i8 = crate::PREFIX_BYTE_LEN;

fn build_indexed_bit(index_name: &str) -> [InstrEntry; 256] {
    let mut table = [UNDEFINED; 256];
    for opcode in 0..=255u16 {
        let op = opcode as u8;
        let f = decode_fields(op);
        let mnemonic = match f.x {
            0 => format!("{} ({}+d)", ROT[f.y as usize], index_name),
            1 => format!("BIT {},({}+d)", f.y, index_name),
            2 => format!("RES {},({}+d)", f.y, index_name),
            _ => format!("SET {},({}+d)", f.y, index_name),
        };
        table[op as usize] = InstrEntry { byte_len: 4, mnemonic: leak(mnemonic) };
    }
    table
}

static MAIN: LazyLock<[InstrEntry; 256]> = LazyLock::new(build_main);
static CB: LazyLock<[InstrEntry; 256]> = LazyLock::new(build_cb);
static ED: LazyLock<[InstrEntry; 256]> = LazyLock::new(build_ed);
static DD: LazyLock<[InstrEntry; 256]> = LazyLock::new(|| build_indexed("IX"));
static FD: LazyLock<[InstrEntry; 256]> = LazyLock::new(|| build_indexed("IY"));
static DDCB: LazyLock<[InstrEntry; 256]> = LazyLock::new(|| build_indexed_bit("IX"));
static FDCB: LazyLock<[InstrEntry; 256]> = LazyLock::new(|| build_indexed_bit("IY"));

#[must_use]
pub fn main_table() -> &'static [InstrEntry; 256] {
    &MAIN
}

#[must_use]
pub fn cb_table() -> &'static [InstrEntry; 256] {
    &CB
}

#[must_use]
pub fn ed_table() -> &'static [InstrEntry; 256] {
    &ED
}

#[must_use]
pub fn dd_table() -> &'static [InstrEntry; 256] {
    &DD
}

#[must_use]
pub fn fd_table() -> &'static [InstrEntry; 256] {
    &FD
}

#[must_use]
pub fn ddcb_table() -> &'static [InstrEntry; 256] {
    &DDCB
}

#[must_use]
pub fn fdcb_table() -> &'static [InstrEntry; 256] {
    &FDCB
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nop_is_one_byte() {
        assert_eq!(main_table()[0x00], InstrEntry { byte_len: 1, mnemonic: "NOP" });
    }

    #[test]
    fn ld_bc_nn_is_three_bytes() {
        assert_eq!(main_table()[0x01].byte_len, 3);
        assert_eq!(main_table()[0x01].mnemonic, "LD BC,nn");
    }

    #[test]
    fn cb_and_ed_and_dd_and_fd_are_prefixes_in_main() {
        for op in [0xCB, 0xED, 0xDD, 0xFD] {
            assert_eq!(main_table()[op].byte_len, -1);
        }
    }

    #[test]
    fn cb_table_bit_instruction() {
        assert_eq!(cb_table()[0x40], InstrEntry { byte_len: 2, mnemonic: "BIT 0,B" });
    }

    #[test]
    fn ed_neg() {
        assert_eq!(ed_table()[0x44].mnemonic, "NEG");
    }

    #[test]
    fn ed_block_ldir() {
        assert_eq!(ed_table()[0xB0].mnemonic, "LDIR");
    }

    #[test]
    fn indexed_table_substitutes_ix() {
        assert_eq!(dd_table()[0x21].mnemonic, "LD IX,nn");
        assert_eq!(dd_table()[0x21].byte_len, 4);
        assert_eq!(dd_table()[0x34].mnemonic, "INC (IX+d)");
    }

    #[test]
    fn indexed_table_falls_back_to_main_plus_one_byte() {
        let main_nop = main_table()[0x00];
        let dd_nop = dd_table()[0x00];
        assert_eq!(dd_nop.mnemonic, main_nop.mnemonic);
        assert_eq!(dd_nop.byte_len, main_nop.byte_len + 1);
    }

    #[test]
    fn indexed_halt_is_unaffected() {
        assert_eq!(dd_table()[0x76], InstrEntry { byte_len: 2, mnemonic: "HALT" });
    }

    #[test]
    fn ddcb_bit_instruction() {
        assert_eq!(ddcb_table()[0x46].mnemonic, "BIT 0,(IX+d)");
        assert_eq!(ddcb_table()[0x46].byte_len, 4);
    }
}
