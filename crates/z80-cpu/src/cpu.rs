//! The scheduler and the fetch/decode/execute pipeline.
//!
//! Fetch, operand reads, and prefix chaining are modelled one T-state at a
//! time off `CLCK`, matching the bus exactly. Execute-phase memory effects
//! (ALU against `(HL)`, `PUSH`/`POP`, block instructions, ...) read and write
//! straight through the memory controller's region lookup instead of being
//! split into their own scheduled bus cycles; see `DESIGN.md`.

use std::cell::RefCell;
use std::rc::Rc;

use z80_bus::{SignalError, SignalLine, Signals, SystemBus};
use z80_memory::MemoryController;
use z80_tables::{decode_fields, Family, PREFIX_BYTE_LEN};

use crate::alu;
use crate::flags::{CF, HF, NF, PF, SF, XF, YF, ZF};
use crate::instruction::{CurrentInstruction, DataSink};
use crate::microstep::MicroStep;
use crate::registers::Registers;

/// Coarse phase the CPU is in, independent of the fine-grained [`MicroStep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuState {
    Fetch,
    Decode,
    Execute,
    /// The scheduler starved: a rising edge arrived with nothing armed.
    Failure,
}

/// The Z80 CPU core.
pub struct Cpu {
    pub registers: Registers,
    state: CpuState,
    halted: bool,
    current: CurrentInstruction,
    bytes_consumed: u8,
    displacement_consumed: bool,
    pending_sink: DataSink,
    pending_write_addr: u16,
    pending_write_value: u8,
    next_rising: Option<MicroStep>,
    next_falling: Option<MicroStep>,
    on_finish_m_cycle: Option<MicroStep>,
    memory: Rc<RefCell<MemoryController>>,
}

impl Cpu {
    #[must_use]
    pub fn new(memory: Rc<RefCell<MemoryController>>) -> Self {
        Self {
            registers: Registers::default(),
            state: CpuState::Fetch,
            halted: false,
            current: CurrentInstruction::default(),
            bytes_consumed: 0,
            displacement_consumed: false,
            pending_sink: DataSink::Opcode,
            pending_write_addr: 0,
            pending_write_value: 0,
            next_rising: Some(MicroStep::M1T1Rise),
            next_falling: None,
            on_finish_m_cycle: None,
            memory,
        }
    }

    #[must_use]
    pub fn state(&self) -> CpuState {
        self.state
    }

    #[must_use]
    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    #[must_use]
    pub fn current_instruction(&self) -> &CurrentInstruction {
        &self.current
    }

    /// Wires `cpu` to react to every `CLCK` transition on `signals`.
    ///
    /// # Errors
    ///
    /// Propagates [`SignalError::TooManySubscribers`] if `CLCK` is already saturated.
    pub fn attach(
        cpu: &Rc<RefCell<Self>>,
        signals: &Signals,
        bus: &SystemBus,
    ) -> Result<(), SignalError> {
        let cpu_handle = Rc::clone(cpu);
        let signals_handle = signals.clone();
        let bus_handle = bus.clone();
        signals.subscribe(SignalLine::Clck, move |level| {
            cpu_handle
                .borrow_mut()
                .on_clck_edge(level, &signals_handle, &bus_handle);
        })
    }

    fn on_clck_edge(&mut self, rising: bool, signals: &Signals, bus: &SystemBus) {
        if signals.read(SignalLine::Wait) || self.state == CpuState::Failure {
            return;
        }
        let step = if rising { self.next_rising.take() } else { self.next_falling.take() };
        if let Some(step) = step {
            self.dispatch(step, signals, bus);
            return;
        }
        if rising {
            if let Some(step) = self.on_finish_m_cycle.take() {
                self.dispatch(step, signals, bus);
            } else {
                self.state = CpuState::Failure;
                signals.raise(SignalLine::Wait);
            }
        }
    }

    fn mem_read(&self, addr: u16) -> u8 {
        self.memory.borrow().raw_read(addr)
    }

    fn mem_write(&mut self, addr: u16, value: u8) {
        self.memory.borrow_mut().raw_write(addr, value);
    }

    fn store_sink_byte(&mut self, byte: u8) {
        match self.pending_sink {
            DataSink::Opcode => self.current.opcode = byte,
            DataSink::Operand0 => {
                self.current.operand0 = byte;
                self.current.operands_remaining = self.current.operands_remaining.saturating_sub(1);
            }
            DataSink::Operand1 => {
                self.current.operand1 = byte;
                self.current.operands_remaining = self.current.operands_remaining.saturating_sub(1);
            }
            DataSink::Displacement => {
                self.current.displacement = byte;
                self.displacement_consumed = true;
            }
        }
    }

    fn decode(&mut self) {
        let opcode = self.current.opcode;
        let fields = decode_fields(opcode);
        self.current.x = fields.x;
        self.current.y = fields.y;
        self.current.z = fields.z;
        self.current.p = fields.p;
        self.current.q = fields.q;
        let entry = self.current.family.table()[opcode as usize];
        self.current.mnemonic = entry.mnemonic;
        if entry.byte_len == PREFIX_BYTE_LEN {
            self.current.detected_prefix = true;
            self.current.num_operands = 0;
            self.current.operands_remaining = 0;
        } else {
            self.current.detected_prefix = false;
            let consumed_before = self.current.prefix_bytes.len() + usize::from(self.displacement_consumed);
            let len = usize::try_from(entry.byte_len).unwrap_or(0);
            let mut operands = len.saturating_sub(consumed_before + 1);
            if operands > 2 {
                operands = 0;
            }
            self.current.num_operands = operands as u8;
            self.current.operands_remaining = operands as u8;
            self.current.byte_len = len as u8;
        }
    }

    fn branch_decision(&self) -> MicroStep {
        if self.current.detected_prefix {
            MicroStep::PrepPrefixedRead
        } else if self.current.operands_remaining == 0 {
            MicroStep::Execute
        } else {
            MicroStep::PrepReadOperands
        }
    }

    fn advance_prefix_chain(&mut self) {
        if matches!(self.current.family, Family::DdCb | Family::FdCb) {
            self.decode();
            self.next_rising = Some(self.branch_decision());
            return;
        }
        match self.pending_sink {
            DataSink::Displacement => {
                self.pending_sink = DataSink::Opcode;
                self.on_finish_m_cycle = Some(MicroStep::FinalisePrefixedRead);
                self.next_rising = Some(MicroStep::MemReadT1Rise);
            }
            DataSink::Opcode => {
                let opcode = self.current.opcode;
                if matches!(self.current.family, Family::Dd | Family::Fd) && opcode == 0xCB {
                    self.current.prefix_bytes.push(opcode);
                    self.current.family =
                        if self.current.family == Family::Dd { Family::DdCb } else { Family::FdCb };
                    self.pending_sink = DataSink::Displacement;
                    self.on_finish_m_cycle = Some(MicroStep::FinalisePrefixedRead);
                    self.next_rising = Some(MicroStep::MemReadT1Rise);
                    return;
                }
                let resolved = match (self.current.family, opcode) {
                    (Family::Main, 0xCB) => Some(Family::Cb),
                    (Family::Main, 0xED) => Some(Family::Ed),
                    (Family::Main, 0xDD) => Some(Family::Dd),
                    (Family::Main, 0xFD) => Some(Family::Fd),
                    (Family::Dd, 0xDD) => Some(Family::Dd),
                    (Family::Dd, 0xFD) => Some(Family::Fd),
                    (Family::Dd, 0xED) => Some(Family::Ed),
                    (Family::Fd, 0xFD) => Some(Family::Fd),
                    (Family::Fd, 0xDD) => Some(Family::Dd),
                    (Family::Fd, 0xED) => Some(Family::Ed),
                    _ => None,
                };
                match resolved {
                    Some(family) => {
                        self.current.prefix_bytes.push(opcode);
                        self.current.family = family;
                        self.decode();
                        self.next_rising = Some(self.branch_decision());
                    }
                    None => {
                        self.current.mnemonic = "???";
                        self.current.num_operands = 0;
                        self.current.operands_remaining = 0;
                        self.current.byte_len =
                            (self.current.prefix_bytes.len() + 1) as u8;
                        self.next_rising = Some(MicroStep::Execute);
                    }
                }
            }
            DataSink::Operand0 | DataSink::Operand1 => unreachable!("prefix chain only reads opcode/displacement bytes"),
        }
    }

    fn dispatch(&mut self, step: MicroStep, signals: &Signals, bus: &SystemBus) {
        match step {
            MicroStep::Idle => {}

            MicroStep::M1T1Rise => {
                signals.raise(SignalLine::Mreq);
                signals.raise(SignalLine::Rd);
                signals.raise(SignalLine::Rfsh);
                signals.drop_line(SignalLine::M1);
                bus.set_address(self.registers.pc);
                self.current = CurrentInstruction::default();
                self.bytes_consumed = 0;
                self.displacement_consumed = false;
                self.state = CpuState::Fetch;
                self.next_falling = Some(MicroStep::M1T1Fall);
            }
            MicroStep::M1T1Fall => {
                signals.drop_line(SignalLine::Mreq);
                signals.drop_line(SignalLine::Rd);
                self.next_rising = Some(MicroStep::Idle);
                self.next_falling = Some(MicroStep::M1T2Fall);
            }
            MicroStep::M1T2Fall => {
                self.current.opcode = bus.data();
                self.bytes_consumed = 1;
                self.next_rising = Some(MicroStep::M1T3Rise);
            }
            MicroStep::M1T3Rise => {
                signals.raise(SignalLine::Mreq);
                signals.raise(SignalLine::Rd);
                signals.raise(SignalLine::M1);
                signals.drop_line(SignalLine::Rfsh);
                self.registers.bump_refresh();
                self.state = CpuState::Decode;
                self.decode();
                self.next_falling = Some(MicroStep::M1T3Fall);
            }
            MicroStep::M1T3Fall => {
                let next = self.branch_decision();
                self.on_finish_m_cycle = Some(next);
                self.next_rising = Some(MicroStep::Idle);
                self.next_falling = Some(MicroStep::M1T4Fall);
            }
            MicroStep::M1T4Fall => {
                signals.raise(SignalLine::Mreq);
            }

            MicroStep::MemReadT1Rise => {
                let addr = self.registers.pc.wrapping_add(u16::from(self.bytes_consumed));
                bus.set_address(addr);
                signals.raise(SignalLine::Mreq);
                signals.raise(SignalLine::Rd);
                self.next_falling = Some(MicroStep::MemReadT1Fall);
            }
            MicroStep::MemReadT1Fall => {
                signals.drop_line(SignalLine::Mreq);
                signals.drop_line(SignalLine::Rd);
                self.next_rising = Some(MicroStep::MemReadT2Rise);
            }
            MicroStep::MemReadT2Rise => {
                let byte = bus.data();
                self.store_sink_byte(byte);
                self.bytes_consumed += 1;
                self.next_falling = Some(MicroStep::MemReadT2Fall);
            }
            MicroStep::MemReadT2Fall => {
                signals.raise(SignalLine::Mreq);
                signals.raise(SignalLine::Rd);
            }

            MicroStep::MemWriteT1Rise => {
                bus.set_address(self.pending_write_addr);
                signals.raise(SignalLine::Mreq);
                signals.raise(SignalLine::Wr);
                self.next_falling = Some(MicroStep::MemWriteT1Fall);
            }
            MicroStep::MemWriteT1Fall => {
                signals.drop_line(SignalLine::Mreq);
                bus.set_data(self.pending_write_value);
                self.next_rising = Some(MicroStep::Idle);
                self.next_falling = Some(MicroStep::MemWriteT2Fall);
            }
            MicroStep::MemWriteT2Fall => {
                signals.drop_line(SignalLine::Wr);
                self.next_rising = Some(MicroStep::Idle);
                self.next_falling = Some(MicroStep::MemWriteT3Fall);
            }
            MicroStep::MemWriteT3Fall => {
                signals.raise(SignalLine::Mreq);
                signals.raise(SignalLine::Wr);
            }

            MicroStep::PrepReadOperands => {
                self.pending_sink = if self.current.operands_remaining == self.current.num_operands {
                    DataSink::Operand0
                } else {
                    DataSink::Operand1
                };
                let remaining_after = self.current.operands_remaining.saturating_sub(1);
                self.on_finish_m_cycle = Some(if remaining_after > 0 {
                    MicroStep::PrepReadOperands
                } else {
                    MicroStep::Execute
                });
                self.next_rising = Some(MicroStep::MemReadT1Rise);
            }
            MicroStep::PrepPrefixedRead => {
                self.current.prefix_bytes.push(self.current.opcode);
                self.pending_sink = DataSink::Opcode;
                self.on_finish_m_cycle = Some(MicroStep::FinalisePrefixedRead);
                self.next_rising = Some(MicroStep::MemReadT1Rise);
            }
            MicroStep::FinalisePrefixedRead => self.advance_prefix_chain(),

            MicroStep::Execute => {
                self.state = CpuState::Execute;
                self.registers.pc = self.registers.pc.wrapping_add(u16::from(self.current.byte_len));
                self.execute_current();
                self.state = CpuState::Fetch;
                self.next_rising = Some(MicroStep::M1T1Rise);
            }
            MicroStep::FetchCycleStart => {
                self.state = CpuState::Fetch;
                self.next_rising = Some(MicroStep::M1T1Rise);
            }
        }
    }

    fn hl_or_index(&self) -> u16 {
        match self.current.family {
            Family::Dd | Family::DdCb => self.registers.ix,
            Family::Fd | Family::FdCb => self.registers.iy,
            _ => self.registers.hl(),
        }
    }

    fn set_hl_or_index(&mut self, value: u16) {
        match self.current.family {
            Family::Dd | Family::DdCb => self.registers.ix = value,
            Family::Fd | Family::FdCb => self.registers.iy = value,
            _ => self.registers.set_hl(value),
        }
    }

    fn effective_hl_address(&self) -> u16 {
        match self.current.family {
            Family::Dd | Family::Fd => {
                self.hl_or_index().wrapping_add(i16::from(self.current.operand0 as i8) as u16)
            }
            Family::DdCb | Family::FdCb => {
                self.hl_or_index().wrapping_add(i16::from(self.current.displacement as i8) as u16)
            }
            _ => self.registers.hl(),
        }
    }

    fn r8_get(&mut self, idx: u8) -> u8 {
        match idx {
            0 => self.registers.b,
            1 => self.registers.c,
            2 => self.registers.d,
            3 => self.registers.e,
            4 => self.registers.h,
            5 => self.registers.l,
            6 => {
                let addr = self.effective_hl_address();
                self.mem_read(addr)
            }
            _ => self.registers.a,
        }
    }

    fn r8_set(&mut self, idx: u8, value: u8) {
        match idx {
            0 => self.registers.b = value,
            1 => self.registers.c = value,
            2 => self.registers.d = value,
            3 => self.registers.e = value,
            4 => self.registers.h = value,
            5 => self.registers.l = value,
            6 => {
                let addr = self.effective_hl_address();
                self.mem_write(addr, value);
            }
            _ => self.registers.a = value,
        }
    }

    fn rp_get(&self, p: u8) -> u16 {
        match p {
            0 => self.registers.bc(),
            1 => self.registers.de(),
            2 => self.hl_or_index(),
            _ => self.registers.sp,
        }
    }

    fn rp_set(&mut self, p: u8, value: u16) {
        match p {
            0 => self.registers.set_bc(value),
            1 => self.registers.set_de(value),
            2 => self.set_hl_or_index(value),
            _ => self.registers.sp = value,
        }
    }

    fn rp_af_get(&self, p: u8) -> u16 {
        match p {
            0 => self.registers.bc(),
            1 => self.registers.de(),
            2 => self.hl_or_index(),
            _ => self.registers.af(),
        }
    }

    fn rp_af_set(&mut self, p: u8, value: u16) {
        match p {
            0 => self.registers.set_bc(value),
            1 => self.registers.set_de(value),
            2 => self.set_hl_or_index(value),
            _ => self.registers.set_af(value),
        }
    }

    fn cc_test(&self, y: u8) -> bool {
        let f = self.registers.f;
        match y {
            0 => f & ZF == 0,
            1 => f & ZF != 0,
            2 => f & CF == 0,
            3 => f & CF != 0,
            4 => f & PF == 0,
            5 => f & PF != 0,
            6 => f & SF == 0,
            _ => f & SF != 0,
        }
    }

    fn apply_alu(&mut self, y: u8, operand: u8) {
        let carry = self.registers.f & CF != 0;
        let result = match y {
            0 => alu::add8(self.registers.a, operand, false),
            1 => alu::add8(self.registers.a, operand, carry),
            2 => alu::sub8(self.registers.a, operand, false),
            3 => alu::sub8(self.registers.a, operand, carry),
            4 => alu::and8(self.registers.a, operand),
            5 => alu::xor8(self.registers.a, operand),
            6 => alu::or8(self.registers.a, operand),
            _ => alu::cp8(self.registers.a, operand),
        };
        self.registers.f = result.flags;
        if y != 7 {
            self.registers.a = result.value;
        }
    }

    fn apply_rotate(&self, y: u8, value: u8) -> alu::AluResult {
        let carry = self.registers.f & CF != 0;
        match y {
            0 => alu::rlc8(value),
            1 => alu::rrc8(value),
            2 => alu::rl8(value, carry),
            3 => alu::rr8(value, carry),
            4 => alu::sla8(value),
            5 => alu::sra8(value),
            6 => alu::sll8(value),
            _ => alu::srl8(value),
        }
    }

    fn jump_relative(&mut self) {
        let offset = self.current.operand0 as i8;
        self.registers.pc = self.registers.pc.wrapping_add(offset as i16 as u16);
    }

    fn write16(&mut self, addr: u16, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.mem_write(addr, lo);
        self.mem_write(addr.wrapping_add(1), hi);
    }

    fn read16(&self, addr: u16) -> u16 {
        let lo = self.mem_read(addr);
        let hi = self.mem_read(addr.wrapping_add(1));
        u16::from_le_bytes([lo, hi])
    }

    fn push16(&mut self, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.registers.sp = self.registers.sp.wrapping_sub(1);
        self.mem_write(self.registers.sp, hi);
        self.registers.sp = self.registers.sp.wrapping_sub(1);
        self.mem_write(self.registers.sp, lo);
    }

    fn pop16(&mut self) -> u16 {
        let lo = self.mem_read(self.registers.sp);
        self.registers.sp = self.registers.sp.wrapping_add(1);
        let hi = self.mem_read(self.registers.sp);
        self.registers.sp = self.registers.sp.wrapping_add(1);
        u16::from_le_bytes([lo, hi])
    }

    fn apply_daa(&mut self) {
        let a = self.registers.a;
        let n = self.registers.f & NF != 0;
        let c = self.registers.f & CF != 0;
        let h = self.registers.f & HF != 0;
        let mut correction = 0u8;
        let mut carry = c;
        if h || (a & 0x0F) > 9 {
            correction |= 0x06;
        }
        if c || a > 0x99 {
            correction |= 0x60;
            carry = true;
        }
        let result = if n { a.wrapping_sub(correction) } else { a.wrapping_add(correction) };
        let half = if n { h && (a & 0x0F) < 6 } else { (a & 0x0F) + (correction & 0x0F) > 0x0F };
        self.registers.a = result;
        let mut f = 0;
        if result & 0x80 != 0 {
            f |= SF;
        }
        if result == 0 {
            f |= ZF;
        }
        f |= result & (YF | XF);
        if result.count_ones().is_multiple_of(2) {
            f |= PF;
        }
        if half {
            f |= HF;
        }
        if n {
            f |= NF;
        }
        if carry {
            f |= CF;
        }
        self.registers.f = f;
    }

    fn execute_current(&mut self) {
        let (x, y, z, p, q) =
            (self.current.x, self.current.y, self.current.z, self.current.p, self.current.q);
        match self.current.family {
            Family::Main | Family::Dd | Family::Fd => self.execute_main(x, y, z, p, q),
            Family::Cb | Family::DdCb | Family::FdCb => self.execute_cb(x, y, z),
            Family::Ed => self.execute_ed(x, y, z, p, q),
        }
    }

    #[allow(clippy::too_many_lines)]
    fn execute_main(&mut self, x: u8, y: u8, z: u8, p: u8, q: u8) {
        match x {
            0 => match z {
                0 => match y {
                    0 => {}
                    1 => {
                        let af = self.registers.af();
                        self.registers.set_af(self.registers.af_alt());
                        self.registers.set_af_alt(af);
                    }
                    2 => {
                        self.registers.b = self.registers.b.wrapping_sub(1);
                        if self.registers.b != 0 {
                            self.jump_relative();
                        }
                    }
                    3 => self.jump_relative(),
                    _ => {
                        if self.cc_test(y - 4) {
                            self.jump_relative();
                        }
                    }
                },
                1 => {
                    if q == 0 {
                        let value = self.current.operand16();
                        self.rp_set(p, value);
                    } else {
                        let (result, flags) = alu::add16(self.hl_or_index(), self.rp_get(p));
                        let preserved = self.registers.f & (ZF | SF | PF);
                        self.registers.f = flags | preserved;
                        self.set_hl_or_index(result);
                    }
                }
                2 => match y {
                    0 => self.mem_write(self.registers.bc(), self.registers.a),
                    1 => self.registers.a = self.mem_read(self.registers.bc()),
                    2 => self.mem_write(self.registers.de(), self.registers.a),
                    3 => self.registers.a = self.mem_read(self.registers.de()),
                    4 => {
                        let addr = self.current.operand16();
                        let value = self.hl_or_index();
                        self.write16(addr, value);
                    }
                    5 => {
                        let addr = self.current.operand16();
                        let value = self.read16(addr);
                        self.set_hl_or_index(value);
                    }
                    6 => {
                        let addr = self.current.operand16();
                        self.mem_write(addr, self.registers.a);
                    }
                    _ => {
                        let addr = self.current.operand16();
                        self.registers.a = self.mem_read(addr);
                    }
                },
                3 => {
                    let value = if q == 0 {
                        self.rp_get(p).wrapping_add(1)
                    } else {
                        self.rp_get(p).wrapping_sub(1)
                    };
                    self.rp_set(p, value);
                }
                4 => {
                    let value = self.r8_get(y);
                    let result = alu::inc8(value);
                    self.registers.f = (self.registers.f & CF) | (result.flags & !CF);
                    self.r8_set(y, result.value);
                }
                5 => {
                    let value = self.r8_get(y);
                    let result = alu::dec8(value);
                    self.registers.f = (self.registers.f & CF) | (result.flags & !CF);
                    self.r8_set(y, result.value);
                }
                6 => {
                    let value = self.current.operand0;
                    self.r8_set(y, value);
                }
                _ => match y {
                    0 => {
                        let result = alu::rlc8(self.registers.a);
                        self.registers.a = result.value;
                        self.registers.f =
                            (self.registers.f & (SF | ZF | PF)) | (result.flags & CF) | (self.registers.a & (YF | XF));
                    }
                    1 => {
                        let result = alu::rrc8(self.registers.a);
                        self.registers.a = result.value;
                        self.registers.f =
                            (self.registers.f & (SF | ZF | PF)) | (result.flags & CF) | (self.registers.a & (YF | XF));
                    }
                    2 => {
                        let carry = self.registers.f & CF != 0;
                        let result = alu::rl8(self.registers.a, carry);
                        self.registers.a = result.value;
                        self.registers.f =
                            (self.registers.f & (SF | ZF | PF)) | (result.flags & CF) | (self.registers.a & (YF | XF));
                    }
                    3 => {
                        let carry = self.registers.f & CF != 0;
                        let result = alu::rr8(self.registers.a, carry);
                        self.registers.a = result.value;
                        self.registers.f =
                            (self.registers.f & (SF | ZF | PF)) | (result.flags & CF) | (self.registers.a & (YF | XF));
                    }
                    4 => self.apply_daa(),
                    5 => {
                        self.registers.a = !self.registers.a;
                        let mut f = self.registers.f & (SF | ZF | PF | CF);
                        f |= HF | NF;
                        f |= self.registers.a & (YF | XF);
                        self.registers.f = f;
                    }
                    6 => {
                        let mut f = self.registers.f & (SF | ZF | PF);
                        f |= self.registers.a & (YF | XF);
                        f |= CF;
                        self.registers.f = f;
                    }
                    _ => {
                        let old_carry = self.registers.f & CF != 0;
                        let mut f = self.registers.f & (SF | ZF | PF);
                        f |= self.registers.a & (YF | XF);
                        if old_carry {
                            f |= HF;
                        } else {
                            f |= CF;
                        }
                        self.registers.f = f;
                    }
                },
            },
            1 => {
                if z == 6 && y == 6 {
                    self.halted = true;
                    self.registers.pc = self.registers.pc.wrapping_sub(1);
                } else {
                    let value = self.r8_get(z);
                    self.r8_set(y, value);
                }
            }
            2 => {
                let operand = self.r8_get(z);
                self.apply_alu(y, operand);
            }
            _ => match z {
                0 => {
                    if self.cc_test(y) {
                        self.registers.pc = self.pop16();
                    }
                }
                1 => {
                    if q == 0 {
                        let value = self.pop16();
                        self.rp_af_set(p, value);
                    } else {
                        match p {
                            0 => self.registers.pc = self.pop16(),
                            1 => {
                                std::mem::swap(&mut self.registers.b, &mut self.registers.b_alt);
                                std::mem::swap(&mut self.registers.c, &mut self.registers.c_alt);
                                std::mem::swap(&mut self.registers.d, &mut self.registers.d_alt);
                                std::mem::swap(&mut self.registers.e, &mut self.registers.e_alt);
                                std::mem::swap(&mut self.registers.h, &mut self.registers.h_alt);
                                std::mem::swap(&mut self.registers.l, &mut self.registers.l_alt);
                            }
                            2 => self.registers.pc = self.hl_or_index(),
                            _ => self.registers.sp = self.hl_or_index(),
                        }
                    }
                }
                2 => {
                    if self.cc_test(y) {
                        self.registers.pc = self.current.operand16();
                    }
                }
                3 => match y {
                    0 => self.registers.pc = self.current.operand16(),
                    1 | 2 | 3 => {}
                    4 => {
                        let sp = self.registers.sp;
                        let lo = self.mem_read(sp);
                        let hi = self.mem_read(sp.wrapping_add(1));
                        let stacked = u16::from_le_bytes([lo, hi]);
                        let hl = self.hl_or_index();
                        self.mem_write(sp, hl as u8);
                        self.mem_write(sp.wrapping_add(1), (hl >> 8) as u8);
                        self.set_hl_or_index(stacked);
                    }
                    5 => {
                        let de = self.registers.de();
                        self.registers.set_de(self.registers.hl());
                        self.registers.set_hl(de);
                    }
                    6 => self.registers.iff1 = false,
                    _ => {
                        self.registers.iff1 = true;
                        self.registers.iff2 = true;
                    }
                },
                4 => {
                    if self.cc_test(y) {
                        let target = self.current.operand16();
                        self.push16(self.registers.pc);
                        self.registers.pc = target;
                    }
                }
                5 => {
                    if q == 0 {
                        let value = self.rp_af_get(p);
                        self.push16(value);
                    } else if p == 0 {
                        let target = self.current.operand16();
                        self.push16(self.registers.pc);
                        self.registers.pc = target;
                    }
                }
                6 => {
                    let operand = self.current.operand0;
                    self.apply_alu(y, operand);
                }
                _ => {
                    self.push16(self.registers.pc);
                    self.registers.pc = u16::from(y) * 8;
                }
            },
        }
    }

    fn execute_cb(&mut self, x: u8, y: u8, z: u8) {
        let idx = if matches!(self.current.family, Family::DdCb | Family::FdCb) { 6 } else { z };
        let value = self.r8_get(idx);
        match x {
            0 => {
                let result = self.apply_rotate(y, value);
                self.r8_set(idx, result.value);
                self.registers.f = result.flags;
            }
            1 => {
                let mask = 1u8 << y;
                let mut f = (self.registers.f & CF) | HF;
                if value & mask == 0 {
                    f |= ZF | PF;
                }
                if y == 7 && value & mask != 0 {
                    f |= SF;
                }
                f |= value & (YF | XF);
                self.registers.f = f;
            }
            2 => self.r8_set(idx, value & !(1u8 << y)),
            _ => self.r8_set(idx, value | (1u8 << y)),
        }
    }

    fn execute_ed(&mut self, x: u8, y: u8, z: u8, p: u8, q: u8) {
        match x {
            1 => match z {
                0 => {
                    if y != 6 {
                        self.r8_set(y, 0);
                    }
                }
                1 => {}
                2 => {
                    let hl = self.registers.hl();
                    let rp = self.rp_get(p);
                    let carry = self.registers.f & CF != 0;
                    let (result, flags) =
                        if q == 0 { alu::sbc16(hl, rp, carry) } else { alu::adc16(hl, rp, carry) };
                    self.registers.set_hl(result);
                    self.registers.f = flags;
                }
                3 => {
                    let addr = self.current.operand16();
                    if q == 0 {
                        let value = self.rp_get(p);
                        self.write16(addr, value);
                    } else {
                        let value = self.read16(addr);
                        self.rp_set(p, value);
                    }
                }
                4 => {
                    let a = self.registers.a;
                    let result = alu::sub8(0, a, false);
                    self.registers.f = result.flags;
                    self.registers.a = result.value;
                }
                5 => self.registers.pc = self.pop16(),
                6 => self.registers.im = match y { 0 | 1 => 0, 2 | 3 => 1, _ => 2 },
                _ => match y {
                    0 => self.registers.i = self.registers.a,
                    1 => self.registers.r = self.registers.a,
                    2 => {
                        self.registers.a = self.registers.i;
                        let mut f = self.registers.f & CF;
                        f |= self.registers.a & (SF | YF | XF);
                        if self.registers.a == 0 {
                            f |= ZF;
                        }
                        if self.registers.iff2 {
                            f |= PF;
                        }
                        self.registers.f = f;
                    }
                    3 => {
                        self.registers.a = self.registers.r;
                        let mut f = self.registers.f & CF;
                        f |= self.registers.a & (SF | YF | XF);
                        if self.registers.a == 0 {
                            f |= ZF;
                        }
                        if self.registers.iff2 {
                            f |= PF;
                        }
                        self.registers.f = f;
                    }
                    4 | 5 => {
                        let addr = self.registers.hl();
                        let mem = self.mem_read(addr);
                        let a = self.registers.a;
                        let (new_a, new_mem) = if y == 4 {
                            ((a & 0xF0) | (mem >> 4), (mem << 4) | (a & 0x0F))
                        } else {
                            ((a & 0xF0) | (mem & 0x0F), (mem >> 4) | ((a & 0x0F) << 4))
                        };
                        self.mem_write(addr, new_mem);
                        self.registers.a = new_a;
                        let mut f = self.registers.f & CF;
                        f |= new_a & (SF | YF | XF);
                        if new_a == 0 {
                            f |= ZF;
                        }
                        if new_a.count_ones().is_multiple_of(2) {
                            f |= PF;
                        }
                        self.registers.f = f;
                    }
                    _ => {}
                },
            },
            2 if y >= 4 && z <= 3 => self.execute_ed_block(y, z),
            _ => {}
        }
    }

    fn execute_ed_block(&mut self, y: u8, z: u8) {
        let direction: i16 = if y == 4 || y == 6 { 1 } else { -1 };
        let repeating = y == 6 || y == 7;
        match z {
            0 => {
                let src = self.registers.hl();
                let dst = self.registers.de();
                let value = self.mem_read(src);
                self.mem_write(dst, value);
                self.registers.set_hl(src.wrapping_add(direction as u16));
                self.registers.set_de(dst.wrapping_add(direction as u16));
                let bc = self.registers.bc().wrapping_sub(1);
                self.registers.set_bc(bc);
                let n = value.wrapping_add(self.registers.a);
                let mut f = self.registers.f & (SF | ZF | CF);
                f |= n & XF;
                if n & 0x02 != 0 {
                    f |= YF;
                }
                if bc != 0 {
                    f |= PF;
                }
                self.registers.f = f;
                if repeating && bc != 0 {
                    self.registers.pc = self.registers.pc.wrapping_sub(2);
                }
            }
            1 => {
                let addr = self.registers.hl();
                let value = self.mem_read(addr);
                self.registers.set_hl(addr.wrapping_add(direction as u16));
                let bc = self.registers.bc().wrapping_sub(1);
                self.registers.set_bc(bc);
                let result = alu::sub8(self.registers.a, value, false);
                let half = result.flags & HF != 0;
                let n = if half { result.value.wrapping_sub(1) } else { result.value };
                let mut f = (result.flags & (SF | ZF | HF | NF)) | (self.registers.f & CF);
                f |= n & XF;
                if n & 0x02 != 0 {
                    f |= YF;
                }
                if bc != 0 {
                    f |= PF;
                }
                self.registers.f = f;
                if repeating && bc != 0 && result.value != 0 {
                    self.registers.pc = self.registers.pc.wrapping_sub(2);
                }
            }
            2 => {
                let addr = self.registers.hl();
                self.mem_write(addr, 0);
                self.registers.set_hl(addr.wrapping_add(direction as u16));
                self.registers.b = self.registers.b.wrapping_sub(1);
                if self.registers.b == 0 {
                    self.registers.f |= ZF;
                } else {
                    self.registers.f &= !ZF;
                }
                if repeating && self.registers.b != 0 {
                    self.registers.pc = self.registers.pc.wrapping_sub(2);
                }
            }
            _ => {
                let addr = self.registers.hl();
                let _ = self.mem_read(addr);
                self.registers.set_hl(addr.wrapping_add(direction as u16));
                self.registers.b = self.registers.b.wrapping_sub(1);
                if self.registers.b == 0 {
                    self.registers.f |= ZF;
                } else {
                    self.registers.f &= !ZF;
                }
                if repeating && self.registers.b != 0 {
                    self.registers.pc = self.registers.pc.wrapping_sub(2);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use z80_memory::Region;

    fn harness(program: &[u8]) -> (Rc<RefCell<Cpu>>, Signals, SystemBus, Rc<RefCell<MemoryController>>) {
        let signals = Signals::new();
        let bus = SystemBus::new();
        let memory = Rc::new(RefCell::new(MemoryController::new()));
        let mut bytes = program.to_vec();
        bytes.resize(0xFFFF, 0);
        memory
            .borrow_mut()
            .register(Region::with_bytes(0, 0xFFFF, true, true, &bytes).unwrap())
            .unwrap();
        MemoryController::attach(&memory, &signals, &bus).unwrap();
        let cpu = Rc::new(RefCell::new(Cpu::new(Rc::clone(&memory))));
        Cpu::attach(&cpu, &signals, &bus).unwrap();
        (cpu, signals, bus, memory)
    }

    fn tick(signals: &Signals, edges: usize) {
        for _ in 0..edges {
            signals.raise(SignalLine::Clck);
            signals.drop_line(SignalLine::Clck);
        }
    }

    #[test]
    fn fetches_and_executes_a_bare_nop() {
        let (cpu, signals, _bus, _memory) = harness(&[0x00, 0x00]);
        tick(&signals, 20);
        assert_eq!(cpu.borrow().registers().pc, 1);
    }

    #[test]
    fn reads_a_two_byte_immediate_load() {
        let (cpu, signals, _bus, _memory) = harness(&[0x01, 0x34, 0x12]);
        tick(&signals, 40);
        assert_eq!(cpu.borrow().registers().bc(), 0x1234);
        assert_eq!(cpu.borrow().registers().pc, 3);
    }

    #[test]
    fn walks_a_cb_prefix_chain() {
        // RLC B
        let (cpu, signals, _bus, _memory) = harness(&[0xCB, 0x00]);
        cpu.borrow_mut().registers.b = 0x80;
        tick(&signals, 40);
        assert_eq!(cpu.borrow().registers().b, 0x01);
        assert_eq!(cpu.borrow().registers().f & CF, CF);
        assert_eq!(cpu.borrow().registers().pc, 2);
    }

    #[test]
    fn runs_a_tiny_program_to_halt() {
        // LD A,5 ; ADD A,3 ; HALT
        let (cpu, signals, _bus, _memory) = harness(&[0x3E, 0x05, 0xC6, 0x03, 0x76]);
        for _ in 0..400 {
            if cpu.borrow().is_halted() {
                break;
            }
            tick(&signals, 1);
        }
        assert!(cpu.borrow().is_halted());
        assert_eq!(cpu.borrow().registers().a, 8);
    }

    #[test]
    fn memory_write_cycle_drives_the_bus_and_lands_in_memory() {
        let (cpu, signals, _bus, memory) = harness(&[0x00]);
        {
            let mut cpu = cpu.borrow_mut();
            cpu.pending_write_addr = 0x2000;
            cpu.pending_write_value = 0x42;
            cpu.next_rising = Some(MicroStep::MemWriteT1Rise);
            cpu.on_finish_m_cycle = Some(MicroStep::FetchCycleStart);
        }
        tick(&signals, 4);
        assert_eq!(memory.borrow().raw_read(0x2000), 0x42);
    }

    #[test]
    fn scheduler_starves_into_failure_with_nothing_armed() {
        let (cpu, signals, _bus, _memory) = harness(&[0x00]);
        cpu.borrow_mut().next_rising = None;
        cpu.borrow_mut().next_falling = None;
        cpu.borrow_mut().on_finish_m_cycle = None;
        signals.raise(SignalLine::Clck);
        assert_eq!(cpu.borrow().state(), CpuState::Failure);
        assert!(signals.read(SignalLine::Wait));
    }

    #[test]
    fn resolves_a_dd_cb_displacement_before_opcode() {
        // LD IX,0x0010 ; BIT 0,(IX+2)
        let program = [0xDD, 0x21, 0x10, 0x00, 0xDD, 0xCB, 0x02, 0x46];
        let (cpu, signals, _bus, memory) = harness(&program);
        memory.borrow_mut().raw_write(0x0012, 0x01);
        tick(&signals, 200);
        assert_eq!(cpu.borrow().registers().ix, 0x0010);
        assert_eq!(cpu.borrow().registers().f & ZF, 0);
    }
}
