use std::cell::RefCell;
use std::rc::Rc;

use z80_bus::{SignalError, SignalLine, Signals, SystemBus};

use crate::error::MemoryError;
use crate::region::Region;

/// Registry of memory regions, driven by `MREQ`/`RD`/`WR` on every `CLCK` edge.
pub struct MemoryController {
    regions: Vec<Region>,
}

impl Default for MemoryController {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryController {
    /// Matches the reference controller's fixed device-slot count.
    pub const MAX_REGIONS: usize = 32;

    #[must_use]
    pub fn new() -> Self {
        Self { regions: Vec::new() }
    }

    /// # Errors
    ///
    /// Returns [`MemoryError::TooManyRegions`] once [`Self::MAX_REGIONS`] regions are registered.
    pub fn register(&mut self, region: Region) -> Result<(), MemoryError> {
        if self.regions.len() >= Self::MAX_REGIONS {
            return Err(MemoryError::TooManyRegions);
        }
        self.regions.push(region);
        Ok(())
    }

    #[must_use]
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Bypasses bus signalling entirely; used by the UI/debug observer and
    /// the orchestrator's BIOS-load path's verification reads.
    #[must_use]
    pub fn raw_read(&self, addr: u16) -> u8 {
        self.regions
            .iter()
            .find(|region| region.readable_at(addr))
            .map_or(0, |region| region.read(addr))
    }

    /// Bypasses bus signalling entirely; used by the CPU's execute phase for
    /// memory side effects that aren't modelled as their own scheduled bus cycle.
    pub fn raw_write(&mut self, addr: u16, value: u8) {
        for region in self.regions.iter_mut().filter(|region| region.writable_at(addr)) {
            region.write(addr, value);
        }
    }

    /// Runs one bus transaction: `RD` wins over `WR` if both are asserted.
    /// Quiescent unless `MREQ` is asserted.
    fn handle_transaction(&mut self, signals: &Signals, bus: &SystemBus) {
        if !signals.read(SignalLine::Mreq) {
            return;
        }
        let addr = bus.address();
        if signals.read(SignalLine::Rd) {
            if let Some(region) = self.regions.iter().find(|region| region.readable_at(addr)) {
                bus.set_data(region.read(addr));
            }
        } else if signals.read(SignalLine::Wr) {
            let value = bus.data();
            for region in self.regions.iter_mut().filter(|region| region.writable_at(addr)) {
                region.write(addr, value);
            }
        }
    }

    /// Wires `controller` to react to every `CLCK` transition on `signals`.
    ///
    /// # Errors
    ///
    /// Propagates [`SignalError::TooManySubscribers`] if `CLCK` is already saturated.
    pub fn attach(
        controller: &Rc<RefCell<Self>>,
        signals: &Signals,
        bus: &SystemBus,
    ) -> Result<(), SignalError> {
        let controller = Rc::clone(controller);
        let signals_handle = signals.clone();
        let bus_handle = bus.clone();
        signals.subscribe(SignalLine::Clck, move |_level| {
            controller.borrow_mut().handle_transaction(&signals_handle, &bus_handle);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fire_clck(signals: &Signals) {
        signals.raise(SignalLine::Clck);
        signals.drop_line(SignalLine::Clck);
    }

    #[test]
    fn read_prefers_first_registered_region() {
        let signals = Signals::new();
        let bus = SystemBus::new();
        let controller = Rc::new(RefCell::new(MemoryController::new()));
        controller
            .borrow_mut()
            .register(Region::with_bytes(0, 1, true, false, &[0x11]).unwrap())
            .unwrap();
        controller
            .borrow_mut()
            .register(Region::with_bytes(0, 1, true, false, &[0x22]).unwrap())
            .unwrap();
        MemoryController::attach(&controller, &signals, &bus).unwrap();

        signals.raise(SignalLine::Mreq);
        signals.raise(SignalLine::Rd);
        bus.set_address(0);
        fire_clck(&signals);

        assert_eq!(bus.data(), 0x11);
    }

    #[test]
    fn write_lands_in_every_overlapping_writable_region() {
        let signals = Signals::new();
        let bus = SystemBus::new();
        let controller = Rc::new(RefCell::new(MemoryController::new()));
        controller
            .borrow_mut()
            .register(Region::new(0, 1, true, true).unwrap())
            .unwrap();
        controller
            .borrow_mut()
            .register(Region::new(0, 1, false, true).unwrap())
            .unwrap();
        MemoryController::attach(&controller, &signals, &bus).unwrap();

        signals.raise(SignalLine::Mreq);
        signals.raise(SignalLine::Wr);
        bus.set_address(0);
        bus.set_data(0xAA);
        fire_clck(&signals);

        signals.drop_line(SignalLine::Wr);
        signals.raise(SignalLine::Rd);
        fire_clck(&signals);

        assert_eq!(bus.data(), 0xAA);
    }

    #[test]
    fn quiescent_without_mreq() {
        let signals = Signals::new();
        let bus = SystemBus::new();
        let controller = Rc::new(RefCell::new(MemoryController::new()));
        controller
            .borrow_mut()
            .register(Region::with_bytes(0, 1, true, false, &[0x99]).unwrap())
            .unwrap();
        MemoryController::attach(&controller, &signals, &bus).unwrap();

        signals.raise(SignalLine::Rd);
        bus.set_address(0);
        bus.set_data(0x00);
        fire_clck(&signals);

        assert_eq!(bus.data(), 0x00);
    }

    #[test]
    fn region_cap_is_enforced() {
        let mut controller = MemoryController::new();
        for i in 0..MemoryController::MAX_REGIONS {
            controller
                .register(Region::new(i as u16, 1, true, false).unwrap())
                .unwrap();
        }
        assert_eq!(
            controller.register(Region::new(0xFFFF, 1, true, false).unwrap()),
            Err(MemoryError::TooManyRegions)
        );
    }
}
