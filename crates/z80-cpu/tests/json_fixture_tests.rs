//! Runs small JSON-described programs to halt and checks the resulting
//! register state, the same shape as the fixture-driven suites the other
//! cores in this workspace use, scoped to the register fields this core
//! actually models (no WZ/Q/port state).

use std::cell::RefCell;
use std::rc::Rc;

use serde::Deserialize;
use z80_bus::{SignalLine, Signals, SystemBus};
use z80_cpu::Cpu;
use z80_memory::{MemoryController, Region};

#[derive(Deserialize, Default)]
struct RegisterDelta {
    a: Option<u8>,
    f: Option<u8>,
    b: Option<u8>,
    c: Option<u8>,
    d: Option<u8>,
    e: Option<u8>,
    h: Option<u8>,
    l: Option<u8>,
    ix: Option<u16>,
    iy: Option<u16>,
    sp: Option<u16>,
    pc: Option<u16>,
}

#[derive(Deserialize)]
struct Fixture {
    name: String,
    program: Vec<u8>,
    #[serde(default)]
    initial: RegisterDelta,
    expect: RegisterDelta,
}

fn apply(cpu: &mut Cpu, delta: &RegisterDelta) {
    if let Some(v) = delta.a {
        cpu.registers.a = v;
    }
    if let Some(v) = delta.f {
        cpu.registers.f = v;
    }
    if let Some(v) = delta.b {
        cpu.registers.b = v;
    }
    if let Some(v) = delta.c {
        cpu.registers.c = v;
    }
    if let Some(v) = delta.d {
        cpu.registers.d = v;
    }
    if let Some(v) = delta.e {
        cpu.registers.e = v;
    }
    if let Some(v) = delta.h {
        cpu.registers.h = v;
    }
    if let Some(v) = delta.l {
        cpu.registers.l = v;
    }
    if let Some(v) = delta.ix {
        cpu.registers.ix = v;
    }
    if let Some(v) = delta.iy {
        cpu.registers.iy = v;
    }
    if let Some(v) = delta.sp {
        cpu.registers.sp = v;
    }
    if let Some(v) = delta.pc {
        cpu.registers.pc = v;
    }
}

fn compare(cpu: &Cpu, name: &str, expect: &RegisterDelta) -> Vec<String> {
    let mut errors = Vec::new();
    let regs = cpu.registers();
    macro_rules! check {
        ($field:ident, $fmt:literal) => {
            if let Some(want) = expect.$field {
                let got = regs.$field;
                if got != want {
                    errors.push(format!(
                        concat!("[{}] ", stringify!($field), ": got ", $fmt, ", want ", $fmt),
                        name, got, want
                    ));
                }
            }
        };
    }
    check!(a, "{:#04x}");
    check!(f, "{:#04x}");
    check!(b, "{:#04x}");
    check!(c, "{:#04x}");
    check!(d, "{:#04x}");
    check!(e, "{:#04x}");
    check!(h, "{:#04x}");
    check!(l, "{:#04x}");
    check!(ix, "{:#06x}");
    check!(iy, "{:#06x}");
    check!(sp, "{:#06x}");
    check!(pc, "{:#06x}");
    errors
}

fn run_fixture(fixture: &Fixture) -> Vec<String> {
    let signals = Signals::new();
    let bus = SystemBus::new();
    let memory = Rc::new(RefCell::new(MemoryController::new()));
    let mut bytes = fixture.program.clone();
    bytes.resize(0xFFFF, 0);
    memory.borrow_mut().register(Region::with_bytes(0, 0xFFFF, true, true, &bytes).unwrap()).unwrap();
    MemoryController::attach(&memory, &signals, &bus).unwrap();
    let cpu = Rc::new(RefCell::new(Cpu::new(Rc::clone(&memory))));
    Cpu::attach(&cpu, &signals, &bus).unwrap();

    apply(&mut cpu.borrow_mut(), &fixture.initial);

    for _ in 0..2000 {
        if cpu.borrow().is_halted() {
            break;
        }
        signals.raise(SignalLine::Clck);
        signals.drop_line(SignalLine::Clck);
    }

    assert!(cpu.borrow().is_halted(), "[{}] program never reached HALT", fixture.name);
    compare(&cpu.borrow(), &fixture.name, &fixture.expect)
}

#[test]
fn execute_cases_match_expected_register_state() {
    let data = include_str!("fixtures/execute_cases.json");
    let fixtures: Vec<Fixture> = serde_json::from_str(data).expect("fixture JSON parses");
    assert!(!fixtures.is_empty());

    let mut failures = Vec::new();
    for fixture in &fixtures {
        failures.extend(run_fixture(fixture));
    }
    assert!(failures.is_empty(), "{}", failures.join("\n"));
}
