use z80_disasm::{Disassembler, Operand, Record};
use z80_log::{Level, Logger};

fn format_record(record: &Record) -> String {
    let prefix: String = record.prefix_bytes.iter().map(|b| format!("{b:02X}")).collect();
    let operand = match record.operand {
        Operand::None => String::new(),
        Operand::Imm8(v) => format!(" ${v:02X}"),
        Operand::Imm16(v) => format!(" ${v:04X}"),
        Operand::Triple(bytes) => bytes.iter().map(|b| format!(" [{b:02X}]")).collect(),
    };
    format!("[{:04X}] |{prefix}{:02X}| {}{operand}\n", record.index, record.opcode, record.mnemonic)
}

/// Reads `path` as a flat byte image and disassembles it fully, writing one
/// line per instruction followed by a reverse-order warning dump, matching
/// the reference decompiler's error stack pop-and-print.
///
/// Returns `false` if the file can't be read.
pub fn run_decompile(path: &str, log: &mut Logger) -> bool {
    let data = match std::fs::read(path) {
        Ok(d) => d,
        Err(e) => {
            log.log(Level::Error, &format!("Decompilation file error: unable to read '{path}': {e}\n"));
            return false;
        }
    };

    let mut disasm = Disassembler::new(&data);
    while let Some(record) = disasm.next_instruction() {
        log.log_direct(&format_record(&record));
    }

    let warnings = disasm.warnings();
    log.log_direct(&format!("\n--- Decompilation Errors: {} ---\n", warnings.len()));
    for warning in warnings.iter().rev() {
        log.log_direct(&format!("[{:04X}] {}\n", warning.index, warning.message));
    }
    log.log_direct("--- End Errors --\n");

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreadable_file_fails_cleanly() {
        let mut log = Logger::muted();
        assert!(!run_decompile("/nonexistent/path/to/image.bin", &mut log));
    }

    #[test]
    fn disassembles_a_small_program() {
        let tmp = std::env::temp_dir().join("z80_system_decompile_test.bin");
        std::fs::write(&tmp, [0x00, 0x3E, 0x05, 0x76]).unwrap();
        let mut log = Logger::muted();
        assert!(run_decompile(tmp.to_str().unwrap(), &mut log));
        std::fs::remove_file(&tmp).ok();
    }
}
