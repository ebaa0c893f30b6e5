//! 6502 core (decimal mode disabled), instruction-stepped.
//!
//! `step` decodes and fully executes one instruction through the table in
//! [`lookup`], returning the cycles it consumed. Interrupt lines are plain
//! booleans the shell ORs into; the CPU clears them when it services the
//! interrupt.

use tracing::trace;

use crate::bus::CpuBus;
use crate::cpu::addressing::{Addressing, Operand};
use crate::cpu::lookup::{Instruction, Mnemonic, LOOKUP};
use crate::cpu::status::Status;
use crate::memory::cpu as cpu_mem;

pub mod addressing;
pub mod lookup;
pub mod status;

/// Cycles consumed by NMI/IRQ/BRK servicing.
const INTERRUPT_CYCLES: u32 = 7;

/// Register snapshot for tracing and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuSnapshot {
    pub pc: u16,
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub s: u8,
    pub p: u8,
}

/// CPU register file plus interrupt lines.
#[derive(Debug, Clone)]
pub struct Cpu {
    pub(crate) a: u8,
    pub(crate) x: u8,
    pub(crate) y: u8,
    pub(crate) s: u8,
    pub(crate) p: Status,
    pub(crate) pc: u16,
    /// Edge-latched NMI request; cleared when serviced.
    pub(crate) nmi_line: bool,
    /// Level-latched IRQ request; cleared when serviced (stays pending while
    /// the I flag masks it).
    pub(crate) irq_line: bool,
    /// Total cycles executed since power-on; drives DMA alignment.
    cycles: u64,
}

impl Cpu {
    /// Power-on state: registers cleared, S = $FD, P = $24 (U | I).
    pub(crate) fn new() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            s: 0xFD,
            p: Status::power_on(),
            pc: 0,
            nmi_line: false,
            irq_line: false,
            cycles: 0,
        }
    }

    /// Reset sequence: I set, S dropped by 3, PC loaded from `$FFFC`.
    pub(crate) fn reset(&mut self, bus: &mut CpuBus<'_>) {
        self.p.insert(Status::INTERRUPT);
        self.s = self.s.wrapping_sub(3);
        self.pc = self.read_word(bus, cpu_mem::RESET_VECTOR);
        trace!(pc = format_args!("{:04X}", self.pc), "cpu reset");
    }

    /// Executes one instruction (or services a pending interrupt) and returns
    /// the cycles it took.
    pub(crate) fn step(&mut self, bus: &mut CpuBus<'_>) -> u32 {
        if self.nmi_line {
            self.nmi_line = false;
            self.interrupt(bus, cpu_mem::NMI_VECTOR);
            self.cycles += u64::from(INTERRUPT_CYCLES);
            return INTERRUPT_CYCLES;
        }
        if self.irq_line && !self.p.contains(Status::INTERRUPT) {
            self.irq_line = false;
            self.interrupt(bus, cpu_mem::IRQ_VECTOR);
            self.cycles += u64::from(INTERRUPT_CYCLES);
            return INTERRUPT_CYCLES;
        }

        let opcode = self.fetch_byte(bus);
        let instr = &LOOKUP[opcode as usize];
        let operand = instr.addressing.resolve(self, bus);

        let mut cycles = u32::from(instr.cycles) + self.exec(bus, instr, operand);
        if instr.page_penalty && operand.page_crossed {
            cycles += 1;
        }
        if bus.take_oam_dma() {
            // OAM DMA suspends the CPU for 513 cycles, plus one more when the
            // transfer begins on an odd cycle.
            cycles += 513 + ((self.cycles + u64::from(cycles)) & 1) as u32;
        }

        self.cycles += u64::from(cycles);
        cycles
    }

    /// Registers as a snapshot, with U forced high in the reported status.
    pub fn snapshot(&self) -> CpuSnapshot {
        CpuSnapshot {
            pc: self.pc,
            a: self.a,
            x: self.x,
            y: self.y,
            s: self.s,
            p: (self.p | Status::UNUSED).bits(),
        }
    }

    /// Total cycles executed since power-on.
    pub fn cycle_count(&self) -> u64 {
        self.cycles
    }

    #[inline]
    pub(crate) fn fetch_byte(&mut self, bus: &mut CpuBus<'_>) -> u8 {
        let byte = bus.read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        byte
    }

    #[inline]
    pub(crate) fn fetch_word(&mut self, bus: &mut CpuBus<'_>) -> u16 {
        let lo = self.fetch_byte(bus);
        let hi = self.fetch_byte(bus);
        u16::from_le_bytes([lo, hi])
    }

    fn read_word(&mut self, bus: &mut CpuBus<'_>, addr: u16) -> u16 {
        let lo = bus.read(addr);
        let hi = bus.read(addr.wrapping_add(1));
        u16::from_le_bytes([lo, hi])
    }

    fn push(&mut self, bus: &mut CpuBus<'_>, data: u8) {
        bus.write(cpu_mem::STACK_PAGE | self.s as u16, data);
        self.s = self.s.wrapping_sub(1);
    }

    fn pull(&mut self, bus: &mut CpuBus<'_>) -> u8 {
        self.s = self.s.wrapping_add(1);
        bus.read(cpu_mem::STACK_PAGE | self.s as u16)
    }

    /// Hardware interrupt entry: stack PC and P (B clear, U set), mask IRQs,
    /// jump through `vector`.
    fn interrupt(&mut self, bus: &mut CpuBus<'_>, vector: u16) {
        self.push(bus, (self.pc >> 8) as u8);
        self.push(bus, self.pc as u8);
        self.push(bus, self.p.to_pushed_byte(false));
        self.p.insert(Status::INTERRUPT);
        self.pc = self.read_word(bus, vector);
    }

    /// Taken branches pay +1 cycle, +1 more when crossing a page.
    fn branch(&mut self, taken: bool, operand: Operand) -> u32 {
        if !taken {
            return 0;
        }
        self.pc = operand.addr;
        1 + u32::from(operand.page_crossed)
    }

    fn adc(&mut self, value: u8) {
        let carry = u16::from(self.p.contains(Status::CARRY));
        let sum = u16::from(self.a) + u16::from(value) + carry;
        let result = sum as u8;
        self.p.set(Status::CARRY, sum > 0xFF);
        self.p.set(
            Status::OVERFLOW,
            (!(self.a ^ value) & (self.a ^ result)) & 0x80 != 0,
        );
        self.p.set_zn(result);
        self.a = result;
    }

    fn compare(&mut self, register: u8, value: u8) {
        self.p.set(Status::CARRY, register >= value);
        self.p.set_zn(register.wrapping_sub(value));
    }

    /// Applies a read-modify-write operation to the accumulator or memory.
    fn rmw<F>(&mut self, bus: &mut CpuBus<'_>, instr: &Instruction, operand: Operand, f: F)
    where
        F: FnOnce(&mut Status, u8) -> u8,
    {
        if matches!(instr.addressing, Addressing::Accumulator) {
            let result = f(&mut self.p, self.a);
            self.p.set_zn(result);
            self.a = result;
        } else {
            let value = bus.read(operand.addr);
            let result = f(&mut self.p, value);
            bus.write(operand.addr, result);
            self.p.set_zn(result);
        }
    }

    fn exec(&mut self, bus: &mut CpuBus<'_>, instr: &Instruction, operand: Operand) -> u32 {
        match instr.mnemonic {
            // Loads and stores.
            Mnemonic::Lda => {
                self.a = bus.read(operand.addr);
                self.p.set_zn(self.a);
            }
            Mnemonic::Ldx => {
                self.x = bus.read(operand.addr);
                self.p.set_zn(self.x);
            }
            Mnemonic::Ldy => {
                self.y = bus.read(operand.addr);
                self.p.set_zn(self.y);
            }
            Mnemonic::Sta => bus.write(operand.addr, self.a),
            Mnemonic::Stx => bus.write(operand.addr, self.x),
            Mnemonic::Sty => bus.write(operand.addr, self.y),

            // Arithmetic. SBC is ADC of the one's complement.
            Mnemonic::Adc => {
                let value = bus.read(operand.addr);
                self.adc(value);
            }
            Mnemonic::Sbc => {
                let value = bus.read(operand.addr);
                self.adc(!value);
            }
            Mnemonic::Cmp => {
                let value = bus.read(operand.addr);
                self.compare(self.a, value);
            }
            Mnemonic::Cpx => {
                let value = bus.read(operand.addr);
                self.compare(self.x, value);
            }
            Mnemonic::Cpy => {
                let value = bus.read(operand.addr);
                self.compare(self.y, value);
            }

            // Logical operations.
            Mnemonic::And => {
                self.a &= bus.read(operand.addr);
                self.p.set_zn(self.a);
            }
            Mnemonic::Ora => {
                self.a |= bus.read(operand.addr);
                self.p.set_zn(self.a);
            }
            Mnemonic::Eor => {
                self.a ^= bus.read(operand.addr);
                self.p.set_zn(self.a);
            }
            Mnemonic::Bit => {
                let value = bus.read(operand.addr);
                self.p.set(Status::ZERO, self.a & value == 0);
                self.p.set(Status::OVERFLOW, value & 0x40 != 0);
                self.p.set(Status::NEGATIVE, value & 0x80 != 0);
            }

            // Shifts and rotates.
            Mnemonic::Asl => self.rmw(bus, instr, operand, |p, v| {
                p.set(Status::CARRY, v & 0x80 != 0);
                v << 1
            }),
            Mnemonic::Lsr => self.rmw(bus, instr, operand, |p, v| {
                p.set(Status::CARRY, v & 0x01 != 0);
                v >> 1
            }),
            Mnemonic::Rol => self.rmw(bus, instr, operand, |p, v| {
                let carry_in = u8::from(p.contains(Status::CARRY));
                p.set(Status::CARRY, v & 0x80 != 0);
                (v << 1) | carry_in
            }),
            Mnemonic::Ror => self.rmw(bus, instr, operand, |p, v| {
                let carry_in = u8::from(p.contains(Status::CARRY));
                p.set(Status::CARRY, v & 0x01 != 0);
                (v >> 1) | (carry_in << 7)
            }),

            // Increments and decrements.
            Mnemonic::Inc => self.rmw(bus, instr, operand, |_, v| v.wrapping_add(1)),
            Mnemonic::Dec => self.rmw(bus, instr, operand, |_, v| v.wrapping_sub(1)),
            Mnemonic::Inx => {
                self.x = self.x.wrapping_add(1);
                self.p.set_zn(self.x);
            }
            Mnemonic::Iny => {
                self.y = self.y.wrapping_add(1);
                self.p.set_zn(self.y);
            }
            Mnemonic::Dex => {
                self.x = self.x.wrapping_sub(1);
                self.p.set_zn(self.x);
            }
            Mnemonic::Dey => {
                self.y = self.y.wrapping_sub(1);
                self.p.set_zn(self.y);
            }

            // Register transfers.
            Mnemonic::Tax => {
                self.x = self.a;
                self.p.set_zn(self.x);
            }
            Mnemonic::Tay => {
                self.y = self.a;
                self.p.set_zn(self.y);
            }
            Mnemonic::Tsx => {
                self.x = self.s;
                self.p.set_zn(self.x);
            }
            Mnemonic::Txa => {
                self.a = self.x;
                self.p.set_zn(self.a);
            }
            Mnemonic::Tya => {
                self.a = self.y;
                self.p.set_zn(self.a);
            }
            Mnemonic::Txs => self.s = self.x,

            // Stack operations.
            Mnemonic::Pha => self.push(bus, self.a),
            Mnemonic::Php => self.push(bus, self.p.to_pushed_byte(true)),
            Mnemonic::Pla => {
                self.a = self.pull(bus);
                self.p.set_zn(self.a);
            }
            Mnemonic::Plp => {
                let byte = self.pull(bus);
                self.p.load_from_stack(byte);
            }

            // Flow control.
            Mnemonic::Jmp => self.pc = operand.addr,
            Mnemonic::Jsr => {
                let ret = self.pc.wrapping_sub(1);
                self.push(bus, (ret >> 8) as u8);
                self.push(bus, ret as u8);
                self.pc = operand.addr;
            }
            Mnemonic::Rts => {
                let lo = self.pull(bus);
                let hi = self.pull(bus);
                self.pc = u16::from_le_bytes([lo, hi]).wrapping_add(1);
            }
            Mnemonic::Rti => {
                let byte = self.pull(bus);
                self.p.load_from_stack(byte);
                let lo = self.pull(bus);
                let hi = self.pull(bus);
                self.pc = u16::from_le_bytes([lo, hi]);
            }
            Mnemonic::Brk => {
                // Software interrupt: skips the padding byte, pushes with B set.
                self.pc = self.pc.wrapping_add(1);
                self.push(bus, (self.pc >> 8) as u8);
                self.push(bus, self.pc as u8);
                self.push(bus, self.p.to_pushed_byte(true));
                self.p.insert(Status::INTERRUPT);
                self.pc = self.read_word(bus, cpu_mem::IRQ_VECTOR);
            }

            // Branches.
            Mnemonic::Bcc => return self.branch(!self.p.contains(Status::CARRY), operand),
            Mnemonic::Bcs => return self.branch(self.p.contains(Status::CARRY), operand),
            Mnemonic::Beq => return self.branch(self.p.contains(Status::ZERO), operand),
            Mnemonic::Bne => return self.branch(!self.p.contains(Status::ZERO), operand),
            Mnemonic::Bmi => return self.branch(self.p.contains(Status::NEGATIVE), operand),
            Mnemonic::Bpl => return self.branch(!self.p.contains(Status::NEGATIVE), operand),
            Mnemonic::Bvc => return self.branch(!self.p.contains(Status::OVERFLOW), operand),
            Mnemonic::Bvs => return self.branch(self.p.contains(Status::OVERFLOW), operand),

            // Flag manipulation.
            Mnemonic::Clc => self.p.remove(Status::CARRY),
            Mnemonic::Cld => self.p.remove(Status::DECIMAL),
            Mnemonic::Cli => self.p.remove(Status::INTERRUPT),
            Mnemonic::Clv => self.p.remove(Status::OVERFLOW),
            Mnemonic::Sec => self.p.insert(Status::CARRY),
            Mnemonic::Sed => self.p.insert(Status::DECIMAL),
            Mnemonic::Sei => self.p.insert(Status::INTERRUPT),

            Mnemonic::Nop => {}
        }
        0
    }
}
