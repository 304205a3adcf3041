use std::cell::RefCell;
use std::rc::Rc;

use z80_bus::{SignalError, SignalLine, Signals, SystemBus};
use z80_clock::Oscillator;
use z80_cpu::{Cpu, CpuState};
use z80_memory::MemoryController;

use crate::mode::Mode;

/// Matches the reference's hardcoded `numOscillations > 1000` cutoff.
const NORMAL_TICK_BUDGET: u64 = 1000;
/// Matches the reference's `i < 50` test-mode toggle count.
const TEST_TOGGLE_COUNT: u32 = 50;

/// Everything the orchestrator needs, bundled into one aggregate instead of
/// threading five separate handles (or reaching for module statics, as the
/// reference does) through every call.
pub struct Machine {
    pub signals: Signals,
    pub bus: SystemBus,
    pub memory: Rc<RefCell<MemoryController>>,
    pub cpu: Rc<RefCell<Cpu>>,
    pub oscillator: Oscillator,
    pub mode: Mode,
    num_oscillations: u64,
    test_toggles_done: u32,
    clock_state: bool,
}

impl Machine {
    /// Wires memory before the CPU, so data a memory device places on the
    /// bus during one `CLCK` edge is visible to the CPU within that same edge.
    ///
    /// # Errors
    ///
    /// Propagates [`SignalError`] if `CLCK`'s subscriber list is already full.
    pub fn new(oscillator_freq_mhz: f64, mode: Mode) -> Result<Self, SignalError> {
        let signals = Signals::new();
        let bus = SystemBus::new();
        let memory = Rc::new(RefCell::new(MemoryController::new()));
        MemoryController::attach(&memory, &signals, &bus)?;
        let cpu = Rc::new(RefCell::new(Cpu::new(Rc::clone(&memory))));
        Cpu::attach(&cpu, &signals, &bus)?;
        let oscillator = Oscillator::new(oscillator_freq_mhz);

        Ok(Self {
            signals,
            bus,
            memory,
            cpu,
            oscillator,
            mode,
            num_oscillations: 0,
            test_toggles_done: 0,
            clock_state: false,
        })
    }

    /// Advances one step of `Normal` mode. Returns `Some(message)` describing
    /// why the run just terminated, or `None` if it should keep going.
    pub fn step_normal(&mut self) -> Option<&'static str> {
        if self.num_oscillations > NORMAL_TICK_BUDGET {
            self.mode = Mode::None;
            return Some("Z80 has reached termination");
        }

        if self.cpu.borrow().state() == CpuState::Failure {
            self.mode = Mode::None;
            return Some("Z80 has issued a termination request");
        }

        if self.oscillator.tick(&self.signals) {
            self.num_oscillations += 1;
        }
        None
    }

    /// Advances one step of `Test` mode: toggles `CLCK` a fixed number of
    /// times, never loading or executing a program. Returns `Some(message)`
    /// once the fixed toggle count is reached.
    pub fn step_test(&mut self) -> Option<&'static str> {
        if self.test_toggles_done >= TEST_TOGGLE_COUNT {
            self.mode = Mode::None;
            return Some("Done!");
        }

        self.clock_state = !self.clock_state;
        if self.clock_state {
            self.signals.raise(SignalLine::Clck);
        } else {
            self.signals.drop_line(SignalLine::Clck);
        }
        self.test_toggles_done += 1;
        None
    }
}
