use std::cell::RefCell;
use std::rc::Rc;

use crate::error::SignalError;

/// The fixed set of Z80 pinout lines this fabric carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalLine {
    M1,
    Mreq,
    Iorq,
    Rd,
    Wr,
    Rfsh,
    Halt,
    Wait,
    Int,
    Nmi,
    Reset,
    Busrq,
    Busack,
    Clck,
}

impl SignalLine {
    const COUNT: usize = 14;

    fn index(self) -> usize {
        match self {
            SignalLine::M1 => 0,
            SignalLine::Mreq => 1,
            SignalLine::Iorq => 2,
            SignalLine::Rd => 3,
            SignalLine::Wr => 4,
            SignalLine::Rfsh => 5,
            SignalLine::Halt => 6,
            SignalLine::Wait => 7,
            SignalLine::Int => 8,
            SignalLine::Nmi => 9,
            SignalLine::Reset => 10,
            SignalLine::Busrq => 11,
            SignalLine::Busack => 12,
            SignalLine::Clck => 13,
        }
    }
}

type Subscriber = Box<dyn FnMut(bool)>;

#[derive(Default)]
struct Line {
    level: bool,
    subscribers: Vec<Subscriber>,
}

struct Inner {
    lines: [Line; SignalLine::COUNT],
}

/// The registry of every signal line in the system.
///
/// A cheap, clonable handle (internally `Rc<RefCell<_>>`) rather than a bare
/// struct: memory devices, the CPU, and any UI observer all need their own
/// reference to the same fabric so they can raise/read lines from inside
/// each other's callbacks. `raise`/`drop_line` take the affected line's
/// subscriber list out of the registry before invoking it, so a subscriber
/// is free to read or raise other lines (or even this one) without
/// re-entering a held `RefCell` borrow.
#[derive(Clone)]
pub struct Signals(Rc<RefCell<Inner>>);

impl Default for Signals {
    fn default() -> Self {
        Self::new()
    }
}

impl Signals {
    /// Matches the reference fabric's fixed subscriber-slot count per line.
    pub const MAX_SUBSCRIBERS: usize = 16;

    #[must_use]
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(Inner {
            lines: std::array::from_fn(|_| Line::default()),
        })))
    }

    /// Registers a callback invoked with the new level every time `line` transitions.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::TooManySubscribers`] if `line` already holds
    /// [`Self::MAX_SUBSCRIBERS`] callbacks.
    pub fn subscribe(
        &self,
        line: SignalLine,
        callback: impl FnMut(bool) + 'static,
    ) -> Result<(), SignalError> {
        let mut inner = self.0.borrow_mut();
        let slot = &mut inner.lines[line.index()];
        if slot.subscribers.len() >= Self::MAX_SUBSCRIBERS {
            return Err(SignalError::TooManySubscribers);
        }
        slot.subscribers.push(Box::new(callback));
        Ok(())
    }

    pub fn raise(&self, line: SignalLine) {
        self.set(line, true);
    }

    pub fn drop_line(&self, line: SignalLine) {
        self.set(line, false);
    }

    #[must_use]
    pub fn read(&self, line: SignalLine) -> bool {
        self.0.borrow().lines[line.index()].level
    }

    fn set(&self, line: SignalLine, level: bool) {
        let mut subscribers = {
            let mut inner = self.0.borrow_mut();
            let slot = &mut inner.lines[line.index()];
            slot.level = level;
            std::mem::take(&mut slot.subscribers)
        };
        for subscriber in &mut subscribers {
            subscriber(level);
        }
        self.0.borrow_mut().lines[line.index()].subscribers = subscribers;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell as StdRefCell;

    #[test]
    fn raise_invokes_subscribers_with_true() {
        let signals = Signals::new();
        let seen = Rc::new(StdRefCell::new(Vec::new()));
        let seen2 = Rc::clone(&seen);
        signals
            .subscribe(SignalLine::Clck, move |level| seen2.borrow_mut().push(level))
            .unwrap();
        signals.raise(SignalLine::Clck);
        signals.drop_line(SignalLine::Clck);
        assert_eq!(*seen.borrow(), vec![true, false]);
        assert!(!signals.read(SignalLine::Clck));
    }

    #[test]
    fn subscribers_fire_in_registration_order() {
        let signals = Signals::new();
        let order = Rc::new(StdRefCell::new(Vec::new()));
        for tag in 0..3 {
            let order = Rc::clone(&order);
            signals
                .subscribe(SignalLine::Wait, move |_| order.borrow_mut().push(tag))
                .unwrap();
        }
        signals.raise(SignalLine::Wait);
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn subscriber_can_reenter_signals_while_dispatching() {
        let signals = Signals::new();
        let outer = signals.clone();
        signals
            .subscribe(SignalLine::M1, move |level| {
                if level {
                    outer.drop_line(SignalLine::Rfsh);
                }
            })
            .unwrap();
        signals.raise(SignalLine::Rfsh);
        signals.raise(SignalLine::M1);
        assert!(!signals.read(SignalLine::Rfsh));
    }

    #[test]
    fn oversubscription_is_an_error() {
        let signals = Signals::new();
        for _ in 0..Signals::MAX_SUBSCRIBERS {
            signals.subscribe(SignalLine::Int, |_| {}).unwrap();
        }
        assert_eq!(
            signals.subscribe(SignalLine::Int, |_| {}),
            Err(SignalError::TooManySubscribers)
        );
    }

    #[test]
    fn unread_line_defaults_low() {
        let signals = Signals::new();
        assert!(!signals.read(SignalLine::Reset));
    }
}
