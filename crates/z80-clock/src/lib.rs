//! Wall-clock oscillator.
//!
//! Converts elapsed wall time into `CLCK` edges at a configured frequency,
//! keeping a fractional-microsecond remainder across calls so no edges are
//! lost to drift.

use std::time::Instant;

use z80_bus::{SignalLine, Signals};

/// Frequency floor the reference oscillator clamps to, in MHz.
const MIN_FREQUENCY_MHZ: f64 = 0.00001;

/// Drives `CLCK` from elapsed wall-clock time.
pub struct Oscillator {
    micros_per_cycle: f64,
    overflow: f64,
    clock_state: bool,
    last_tick: Option<Instant>,
}

impl Oscillator {
    /// `frequency_mhz` is clamped to [`MIN_FREQUENCY_MHZ`].
    #[must_use]
    pub fn new(frequency_mhz: f64) -> Self {
        let frequency_mhz = frequency_mhz.max(MIN_FREQUENCY_MHZ);
        Self {
            micros_per_cycle: 1.0 / frequency_mhz,
            overflow: 0.0,
            clock_state: false,
            last_tick: None,
        }
    }

    /// Measures elapsed time since the previous call and advances the
    /// clock accordingly. Returns whether at least one edge fired.
    pub fn tick(&mut self, signals: &Signals) -> bool {
        let now = Instant::now();
        let elapsed_micros = match self.last_tick {
            Some(previous) => now.duration_since(previous).as_secs_f64() * 1_000_000.0,
            None => 0.0,
        };
        self.last_tick = Some(now);
        self.advance(elapsed_micros, signals)
    }

    /// Core edge-accumulation logic, exposed separately from [`Self::tick`]
    /// so it can be driven deterministically without sleeping real time.
    pub fn advance(&mut self, elapsed_micros: f64, signals: &Signals) -> bool {
        self.overflow += elapsed_micros;
        let mut fired = false;
        while self.overflow >= self.micros_per_cycle {
            self.overflow -= self.micros_per_cycle;
            self.clock_state = !self.clock_state;
            if self.clock_state {
                signals.raise(SignalLine::Clck);
            } else {
                signals.drop_line(SignalLine::Clck);
            }
            fired = true;
        }
        fired
    }
}
