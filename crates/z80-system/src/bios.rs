use std::cell::RefCell;
use std::rc::Rc;

use z80_bus::{SignalLine, Signals, SystemBus};
use z80_config::Settings;
use z80_log::{Level, Logger};
use z80_memory::MemoryController;

/// Loads the BIOS ROM named by the `bios_rom` setting into memory at
/// `bios_address` (default `0`), driving the write the same way the CPU's
/// generic memory-write cycle would: assert `MREQ`/`WR`, place each byte on
/// the address/data bus, let the memory controller's `CLCK` handler land it.
///
/// Returns `false` (and logs why) if `bios_rom` is missing or unreadable.
pub fn load_bios_rom(
    settings: &Settings,
    signals: &Signals,
    bus: &SystemBus,
    memory: &Rc<RefCell<MemoryController>>,
    log: &mut Logger,
) -> bool {
    if !settings.exists("bios_rom") {
        log.log(Level::Error, "Cfg file missing 'bios_rom' setting, unable to load\n");
        return false;
    }
    let path = settings.get_str("bios_rom").unwrap_or_default();

    let data = match std::fs::read(path) {
        Ok(d) => d,
        Err(e) => {
            log.log(Level::Error, &format!("BIOS ROM file error: unable to find file '{path}': {e}\n"));
            return false;
        }
    };

    let address: u16 = if settings.exists("bios_address") { settings.get_int("bios_address") as u16 } else { 0 };

    log.log(Level::Msg, &format!("Loading BIOS ROM file '{path}' into address {address:04X}\n"));
    log.log(Level::Msg, &format!("Writing BIOS ROM file to memory. Bytes to write: {:04X}\n", data.len()));

    signals.raise(SignalLine::Mreq);
    signals.raise(SignalLine::Wr);

    for (i, &byte) in data.iter().enumerate() {
        bus.set_address(address.wrapping_add(i as u16));
        bus.set_data(byte);
        signals.raise(SignalLine::Clck);
        signals.drop_line(SignalLine::Clck);
    }

    signals.drop_line(SignalLine::Mreq);
    signals.drop_line(SignalLine::Wr);

    log.log(Level::Msg, "BIOS ROM file write complete\n");
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use z80_memory::Region;

    fn harness() -> (Signals, SystemBus, Rc<RefCell<MemoryController>>) {
        let signals = Signals::new();
        let bus = SystemBus::new();
        let memory = Rc::new(RefCell::new(MemoryController::new()));
        memory.borrow_mut().register(Region::new(0, 0x100, true, true).unwrap()).unwrap();
        MemoryController::attach(&memory, &signals, &bus).unwrap();
        (signals, bus, memory)
    }

    #[test]
    fn missing_bios_rom_setting_fails_cleanly() {
        let (signals, bus, memory) = harness();
        let settings = Settings::parse("\n");
        let mut log = Logger::muted();
        assert!(!load_bios_rom(&settings, &signals, &bus, &memory, &mut log));
    }

    #[test]
    fn unreadable_path_fails_cleanly() {
        let (signals, bus, memory) = harness();
        let settings = Settings::parse("bios_rom=/nonexistent/path/to/rom.bin\n");
        let mut log = Logger::muted();
        assert!(!load_bios_rom(&settings, &signals, &bus, &memory, &mut log));
    }

    #[test]
    fn loads_bytes_at_the_default_address() {
        let (signals, bus, memory) = harness();
        let tmp = std::env::temp_dir().join("z80_system_bios_load_test_default.bin");
        std::fs::write(&tmp, [0xAA, 0xBB, 0xCC]).unwrap();
        let settings = Settings::parse(&format!("bios_rom={}\n", tmp.display()));
        let mut log = Logger::muted();
        assert!(load_bios_rom(&settings, &signals, &bus, &memory, &mut log));
        assert_eq!(memory.borrow().raw_read(0), 0xAA);
        assert_eq!(memory.borrow().raw_read(1), 0xBB);
        assert_eq!(memory.borrow().raw_read(2), 0xCC);
        std::fs::remove_file(&tmp).ok();
    }

    #[test]
    fn loads_bytes_at_a_configured_address() {
        let (signals, bus, memory) = harness();
        let tmp = std::env::temp_dir().join("z80_system_bios_load_test_offset.bin");
        std::fs::write(&tmp, [0x11, 0x22]).unwrap();
        let settings = Settings::parse(&format!("bios_rom={}\nbios_address=16\n", tmp.display()));
        let mut log = Logger::muted();
        assert!(load_bios_rom(&settings, &signals, &bus, &memory, &mut log));
        assert_eq!(memory.borrow().raw_read(16), 0x11);
        assert_eq!(memory.borrow().raw_read(17), 0x22);
        std::fs::remove_file(&tmp).ok();
    }
}
