use std::cell::RefCell;
use std::rc::Rc;

use z80_config::Settings;
use z80_log::{Level, Logger};
use z80_memory::{MemoryController, Region};

/// Scans `memdev0`..`memdev31` and registers each well-formed entry.
///
/// A memory device setting is `start,length,writable,readable` (all
/// integers, booleans as 0/1); anything else detected for a given key is
/// logged as a warning and skipped rather than aborting the scan.
pub fn load_memory_devices(settings: &Settings, memory: &Rc<RefCell<MemoryController>>, log: &mut Logger) {
    log.log(Level::Debug, "Memory device configuration\n");

    for i in 0..MemoryController::MAX_REGIONS {
        let key = format!("memdev{i}");
        if !settings.exists(&key) {
            continue;
        }
        let Some(raw) = settings.get_str(&key) else {
            continue;
        };
        let parts: Vec<&str> = raw.split(',').map(str::trim).filter(|p| !p.is_empty()).collect();
        if parts.len() != 4 {
            log.log(
                Level::Warn,
                &format!("Detected setting for '{key}', but it was of the incorrect format. Had {} elements.\n", parts.len()),
            );
            continue;
        }

        let start: u16 = parts[0].parse().unwrap_or(0);
        let length: u16 = parts[1].parse().unwrap_or(0);
        let writable = parts[2].parse::<i32>().unwrap_or(0) != 0;
        let readable = parts[3].parse::<i32>().unwrap_or(0) != 0;

        log.log(Level::Msg, &format!("Detected setting for '{key}'\n"));
        match Region::new(start, length, readable, writable) {
            Ok(region) => {
                if let Err(e) = memory.borrow_mut().register(region) {
                    log.log(Level::Warn, &format!("Memory device '{key}' rejected: {e}\n"));
                }
            }
            Err(e) => {
                log.log(Level::Warn, &format!("Memory device '{key}' rejected: {e}\n"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_entry_registers_a_region() {
        let settings = Settings::parse("memdev0=0,16384,0,1\n");
        let memory = Rc::new(RefCell::new(MemoryController::new()));
        let mut log = Logger::muted();
        load_memory_devices(&settings, &memory, &mut log);
        assert_eq!(memory.borrow().region_count(), 1);
    }

    #[test]
    fn malformed_entry_is_skipped() {
        let settings = Settings::parse("memdev0=0,16384,1\n");
        let memory = Rc::new(RefCell::new(MemoryController::new()));
        let mut log = Logger::muted();
        load_memory_devices(&settings, &memory, &mut log);
        assert_eq!(memory.borrow().region_count(), 0);
    }

    #[test]
    fn absent_keys_are_skipped_without_error() {
        let settings = Settings::parse("\n");
        let memory = Rc::new(RefCell::new(MemoryController::new()));
        let mut log = Logger::muted();
        load_memory_devices(&settings, &memory, &mut log);
        assert_eq!(memory.borrow().region_count(), 0);
    }
}
