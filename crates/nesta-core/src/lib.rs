//! Cycle-stepped NES (NROM) emulation core.
//!
//! The [`Nes`] shell owns every subsystem (CPU, PPU, APU, internal RAM, the
//! controller ports, and the cartridge) and drives them in lock-step: each
//! CPU instruction reports its cycle count, the PPU advances three dots per
//! cycle, and the APU frame sequencer advances in CPU cycles. Interrupt edges
//! raised by the PPU (NMI) and APU (frame/DMC IRQ) are ORed into the CPU
//! lines between instructions.
//!
//! The bus is rebuilt per CPU step from mutable borrows, so no component
//! holds a pointer back into the shell.

use std::path::Path;

use tracing::debug;

use crate::{
    apu::Apu,
    bus::CpuBus,
    cartridge::Cartridge,
    controller::{Button, Controller},
    cpu::{Cpu, CpuSnapshot},
    error::Error,
    memory::cpu as cpu_mem,
    ppu::{buffer::FrameBuffer, Ppu},
};

pub mod apu;
pub mod bus;
pub mod cartridge;
pub mod controller;
pub mod cpu;
pub mod error;
pub mod memory;
pub mod ppu;

/// Fallback entry point used when the reset vector reads as zero (no valid
/// PRG mapping).
const RESET_FALLBACK_PC: u16 = 0x8000;

/// Console configuration. Audio is best-effort: a host without an output
/// device builds with `audio(false)` and `$4015` reads return 0.
#[derive(Debug, Clone, Copy)]
pub struct NesBuilder {
    audio: bool,
    sample_rate: u32,
}

impl Default for NesBuilder {
    fn default() -> Self {
        Self {
            audio: true,
            sample_rate: apu::DEFAULT_SAMPLE_RATE,
        }
    }
}

impl NesBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables the APU.
    pub fn audio(mut self, enabled: bool) -> Self {
        self.audio = enabled;
        self
    }

    /// Output sample rate for [`Apu::fill_samples`].
    pub fn sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn build(self) -> Nes {
        Nes {
            cpu: Cpu::new(),
            ppu: Ppu::new(),
            apu: self.audio.then(|| Apu::new(self.sample_rate)),
            ram: [0; cpu_mem::INTERNAL_RAM_SIZE],
            cartridge: None,
            controllers: [Controller::new(); 2],
        }
    }
}

/// The console: sole owner of all subsystems.
#[derive(Debug)]
pub struct Nes {
    cpu: Cpu,
    ppu: Ppu,
    apu: Option<Apu>,
    ram: [u8; cpu_mem::INTERNAL_RAM_SIZE],
    cartridge: Option<Cartridge>,
    controllers: [Controller; 2],
}

impl Default for Nes {
    fn default() -> Self {
        Self::new()
    }
}

impl Nes {
    /// Powered-on console with audio enabled at the default sample rate.
    pub fn new() -> Self {
        NesBuilder::new().build()
    }

    pub fn builder() -> NesBuilder {
        NesBuilder::new()
    }

    /// Loads a cartridge from disk and inserts it.
    pub fn load_rom<P: AsRef<Path>>(&mut self, path: P) -> Result<(), Error> {
        let cartridge = Cartridge::from_file(path)?;
        self.insert_cartridge(cartridge);
        Ok(())
    }

    /// Inserts an already-parsed cartridge. Call [`reset`](Self::reset) to
    /// start execution from its reset vector.
    pub fn insert_cartridge(&mut self, cartridge: Cartridge) {
        debug!(mirroring = ?cartridge.mirroring(), "cartridge inserted");
        self.cartridge = Some(cartridge);
    }

    pub fn cartridge(&self) -> Option<&Cartridge> {
        self.cartridge.as_ref()
    }

    /// CPU reset through the vector at `$FFFC`; a vector of `$0000` falls
    /// back to the conventional NROM entry at `$8000`.
    pub fn reset(&mut self) {
        let mut bus = CpuBus::new(
            &mut self.ram,
            &mut self.ppu,
            self.apu.as_mut(),
            self.cartridge.as_mut(),
            &mut self.controllers,
        );
        self.cpu.reset(&mut bus);
        if self.cpu.snapshot().pc == 0 {
            self.cpu.pc = RESET_FALLBACK_PC;
        }
    }

    /// Executes one instruction and advances the PPU/APU accordingly,
    /// returning the CPU cycles consumed.
    pub fn step_instruction(&mut self) -> u32 {
        let used = {
            let mut bus = CpuBus::new(
                &mut self.ram,
                &mut self.ppu,
                self.apu.as_mut(),
                self.cartridge.as_mut(),
                &mut self.controllers,
            );
            self.cpu.step(&mut bus)
        };

        self.ppu.tick(used, self.cartridge.as_ref());
        if self.ppu.take_nmi() {
            self.cpu.nmi_line = true;
        }
        if let Some(apu) = self.apu.as_mut() {
            apu.tick(used, self.cartridge.as_ref());
            if apu.irq_pending() {
                self.cpu.irq_line = true;
            }
        }
        used
    }

    /// Runs instructions until at least `cycles` CPU cycles have elapsed;
    /// returns the cycles actually consumed.
    pub fn run_cycles(&mut self, cycles: u64) -> u64 {
        let mut used = 0u64;
        while used < cycles {
            used += u64::from(self.step_instruction());
        }
        used
    }

    /// Runs until the PPU completes the current frame.
    pub fn run_frame(&mut self) {
        loop {
            self.step_instruction();
            if self.ppu.take_frame() {
                break;
            }
        }
    }

    /// Pushes the per-frame keypad byte into one controller latch.
    pub fn set_controller(&mut self, port: usize, state: u8) {
        if let Some(pad) = self.controllers.get_mut(port) {
            pad.set_state(state);
        }
    }

    /// Updates a single button on one controller.
    pub fn set_button(&mut self, port: usize, button: Button, pressed: bool) {
        if let Some(pad) = self.controllers.get_mut(port) {
            pad.set_button(button, pressed);
        }
    }

    /// Rendered output plane and background-opacity mask.
    pub fn framebuffer(&self) -> &FrameBuffer {
        self.ppu.frame()
    }

    pub fn frame_ready(&self) -> bool {
        self.ppu.frame_ready()
    }

    /// Consumes the frame-ready flag.
    pub fn take_frame(&mut self) -> bool {
        self.ppu.take_frame()
    }

    pub fn ppu(&self) -> &Ppu {
        &self.ppu
    }

    /// Audio subsystem, absent when built with `audio(false)`.
    pub fn apu_mut(&mut self) -> Option<&mut Apu> {
        self.apu.as_mut()
    }

    pub fn cpu_snapshot(&self) -> CpuSnapshot {
        self.cpu.snapshot()
    }

    /// Total CPU cycles executed since power-on.
    pub fn cpu_cycles(&self) -> u64 {
        self.cpu.cycle_count()
    }

    /// One CPU-visible read, with full register side effects.
    pub fn cpu_read(&mut self, addr: u16) -> u8 {
        let mut bus = CpuBus::new(
            &mut self.ram,
            &mut self.ppu,
            self.apu.as_mut(),
            self.cartridge.as_mut(),
            &mut self.controllers,
        );
        bus.read(addr)
    }

    /// One CPU-visible write, with full register side effects.
    pub fn cpu_write(&mut self, addr: u16, data: u8) {
        let mut bus = CpuBus::new(
            &mut self.ram,
            &mut self.ppu,
            self.apu.as_mut(),
            self.cartridge.as_mut(),
            &mut self.controllers,
        );
        bus.write(addr, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_reads_zero_without_audio() {
        let mut nes = Nes::builder().audio(false).build();
        assert_eq!(nes.cpu_read(0x4015), 0);
        // Writes to APU space are ignored rather than routed.
        nes.cpu_write(0x4015, 0x1F);
        assert_eq!(nes.cpu_read(0x4015), 0);
    }

    #[test]
    fn ram_mirrors_across_the_first_8k() {
        let mut nes = Nes::new();
        nes.cpu_write(0x0002, 0xDE);
        assert_eq!(nes.cpu_read(0x0802), 0xDE);
        assert_eq!(nes.cpu_read(0x1002), 0xDE);
        assert_eq!(nes.cpu_read(0x1802), 0xDE);
    }

    #[test]
    fn unmapped_reads_return_zero() {
        let mut nes = Nes::new();
        assert_eq!(nes.cpu_read(0x4014), 0);
        assert_eq!(nes.cpu_read(0x5000), 0);
        assert_eq!(nes.cpu_read(0x8000), 0); // no cartridge inserted
    }
}
