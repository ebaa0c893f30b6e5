//! Audio processing unit.
//!
//! The register file at `$4000-$4017` configures five channels; `tick`
//! advances the frame sequencer and the DMC bit clock in CPU cycles. Sample
//! generation is pulled synchronously through [`Apu::fill_samples`]: each
//! channel keeps a private phase accumulator that only the sample path
//! mutates, so a host audio thread reading live channel state at worst mixes
//! old and new values for a single sample.

use tracing::trace;

use crate::{
    apu::{
        dmc::Dmc, frame_counter::FrameCounter, noise::Noise, pulse::Pulse, triangle::Triangle,
    },
    cartridge::Cartridge,
    memory::apu as apu_mem,
};

mod dmc;
mod envelope;
mod frame_counter;
mod length_counter;
mod noise;
mod pulse;
mod tables;
mod triangle;

/// Default output sample rate in Hz.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

#[derive(Debug, Clone, Copy)]
pub struct Apu {
    pulse1: Pulse,
    pulse2: Pulse,
    triangle: Triangle,
    noise: Noise,
    dmc: Dmc,
    frame_counter: FrameCounter,
    frame_irq: bool,
    sample_rate: u32,
}

impl Default for Apu {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE)
    }
}

impl Apu {
    pub(crate) fn new(sample_rate: u32) -> Self {
        Self {
            pulse1: Pulse::default(),
            pulse2: Pulse::default(),
            triangle: Triangle::default(),
            noise: Noise::default(),
            dmc: Dmc::default(),
            frame_counter: FrameCounter::default(),
            frame_irq: false,
            sample_rate,
        }
    }

    /// Advances the frame sequencer and DMC by `cpu_cycles`. The cartridge is
    /// the DMC DMA source; sample addresses always sit in its ROM window.
    pub(crate) fn tick(&mut self, cpu_cycles: u32, cart: Option<&Cartridge>) {
        let tick = self.frame_counter.clock(cpu_cycles);
        if tick.quarter {
            self.clock_quarter_frame();
        }
        if tick.half {
            self.clock_half_frame();
        }
        if tick.frame_irq {
            trace!("frame sequencer irq");
            self.frame_irq = true;
        }
        self.dmc.clock(cpu_cycles, cart);
    }

    /// True while either IRQ flag is raised; the shell ORs this into the CPU
    /// IRQ line.
    pub(crate) fn irq_pending(&self) -> bool {
        self.frame_irq || self.dmc.irq_flag
    }

    pub(crate) fn write_register(&mut self, addr: u16, data: u8) {
        match addr {
            0x4000 => self.pulse1.write_control(data),
            0x4002 => self.pulse1.write_timer_lo(data),
            0x4003 => self.pulse1.write_timer_hi(data),
            0x4004 => self.pulse2.write_control(data),
            0x4006 => self.pulse2.write_timer_lo(data),
            0x4007 => self.pulse2.write_timer_hi(data),
            0x4008 => self.triangle.write_control(data),
            0x400A => self.triangle.write_timer_lo(data),
            0x400B => self.triangle.write_timer_hi(data),
            0x400C => self.noise.write_control(data),
            0x400E => self.noise.write_mode(data),
            0x400F => self.noise.write_length(data),
            0x4010 => self.dmc.write_control(data),
            0x4011 => self.dmc.write_output(data),
            0x4012 => self.dmc.write_sample_addr(data),
            0x4013 => self.dmc.write_sample_length(data),
            apu_mem::STATUS => self.write_status(data),
            apu_mem::FRAME_COUNTER => {
                // 5-step mode clocks the quarter and half units immediately.
                if self.frame_counter.configure(data) {
                    self.clock_quarter_frame();
                    self.clock_half_frame();
                }
            }
            // $4001/$4005 sweep registers are accepted and ignored.
            _ => {}
        }
    }

    /// `$4015` write: channel enables. Clearing a bit zeroes that channel's
    /// length counter (and stops the DMC sample).
    fn write_status(&mut self, data: u8) {
        self.pulse1.set_enabled(data & 0x01 != 0);
        self.pulse2.set_enabled(data & 0x02 != 0);
        self.triangle.set_enabled(data & 0x04 != 0);
        self.noise.set_enabled(data & 0x08 != 0);
        self.dmc.set_enabled(data & 0x10 != 0);
    }

    /// `$4015` read: live length/activity bits plus the IRQ flags, which the
    /// read clears.
    pub(crate) fn read_status(&mut self) -> u8 {
        let mut status = 0u8;
        status |= u8::from(self.pulse1.length_active());
        status |= u8::from(self.pulse2.length_active()) << 1;
        status |= u8::from(self.triangle.length_active()) << 2;
        status |= u8::from(self.noise.length_active()) << 3;
        status |= u8::from(self.dmc.active()) << 4;
        status |= u8::from(self.frame_irq) << 6;
        status |= u8::from(self.dmc.irq_flag) << 7;
        self.frame_irq = false;
        self.dmc.clear_irq();
        status
    }

    /// Quarter-frame event: envelopes and the triangle linear counter.
    fn clock_quarter_frame(&mut self) {
        self.pulse1.clock_envelope();
        self.pulse2.clock_envelope();
        self.noise.clock_envelope();
        self.triangle.clock_linear();
    }

    /// Half-frame event: length counters.
    fn clock_half_frame(&mut self) {
        self.pulse1.clock_length();
        self.pulse2.clock_length();
        self.triangle.clock_length();
        self.noise.clock_length();
    }

    /// Fills `out` with mono samples in [-1, 1] pulled from live channel
    /// state, using the standard piecewise-rational mixer.
    pub fn fill_samples(&mut self, out: &mut [f32]) {
        let rate = self.sample_rate as f32;
        for sample in out.iter_mut() {
            let pulse_sum = self.pulse1.sample(rate) + self.pulse2.sample(rate);
            let pulse_out = if pulse_sum > 0.0 {
                95.88 / (8128.0 / pulse_sum + 100.0)
            } else {
                0.0
            };

            let tnd_in = self.triangle.sample(rate) / 8227.0
                + self.noise.sample(rate) / 12241.0
                + f32::from(self.dmc.output()) / 22638.0;
            let tnd_out = if tnd_in > 0.0 {
                159.79 / (1.0 / tnd_in + 100.0)
            } else {
                0.0
            };

            let level = (pulse_out + tnd_out).clamp(0.0, 1.0);
            *sample = level * 2.0 - 1.0;
        }
    }

    /// Output sample rate used by [`fill_samples`](Self::fill_samples).
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// CPU cycle of the fourth 4-step boundary.
    const FOUR_STEP_END: u32 = 14916;

    fn tick_in_steps(apu: &mut Apu, total: u32, step: u32) {
        let mut remaining = total;
        while remaining > 0 {
            let chunk = remaining.min(step);
            apu.tick(chunk, None);
            remaining -= chunk;
        }
    }

    #[test]
    fn frame_irq_raised_after_full_four_step_period() {
        let mut apu = Apu::new(DEFAULT_SAMPLE_RATE);
        apu.write_register(0x4017, 0x00);
        tick_in_steps(&mut apu, FOUR_STEP_END - 1, 3);
        assert!(!apu.irq_pending());
        apu.tick(1, None);
        assert!(apu.irq_pending());
    }

    #[test]
    fn status_read_reports_and_clears_frame_irq() {
        let mut apu = Apu::new(DEFAULT_SAMPLE_RATE);
        apu.write_register(0x4017, 0x00);
        tick_in_steps(&mut apu, FOUR_STEP_END, 3);
        let status = apu.read_status();
        assert_ne!(status & 0x40, 0);
        assert_eq!(apu.read_status() & 0x40, 0);
        assert!(!apu.irq_pending());
    }

    #[test]
    fn irq_inhibit_blocks_the_frame_irq() {
        let mut apu = Apu::new(DEFAULT_SAMPLE_RATE);
        apu.write_register(0x4017, 0x40);
        tick_in_steps(&mut apu, FOUR_STEP_END * 2, 3);
        assert!(!apu.irq_pending());
    }

    #[test]
    fn five_step_write_clocks_lengths_immediately() {
        let mut apu = Apu::new(DEFAULT_SAMPLE_RATE);
        apu.write_register(0x4015, 0x01);
        apu.write_register(0x4003, 3 << 3); // loads length 2
        apu.write_register(0x4017, 0x80);
        // The immediate half-frame clock stepped 2 -> 1.
        apu.write_register(0x4017, 0x80);
        assert_eq!(apu.read_status() & 0x01, 0);
    }

    #[test]
    fn disabling_a_channel_zeroes_its_length() {
        let mut apu = Apu::new(DEFAULT_SAMPLE_RATE);
        apu.write_register(0x4015, 0x01);
        apu.write_register(0x4003, 0x08);
        assert_ne!(apu.read_status() & 0x01, 0);
        apu.write_register(0x4015, 0x00);
        assert_eq!(apu.read_status() & 0x01, 0);
    }

    #[test]
    fn length_counters_expire_through_half_frames() {
        let mut apu = Apu::new(DEFAULT_SAMPLE_RATE);
        apu.write_register(0x4015, 0x01);
        apu.write_register(0x4000, 0x00); // decay mode, no halt
        apu.write_register(0x4003, 3 << 3); // length 2
        // Two half-frame events occur per 4-step period.
        tick_in_steps(&mut apu, FOUR_STEP_END, 3);
        assert_eq!(apu.read_status() & 0x01, 0);
    }

    #[test]
    fn mixer_output_stays_in_range() {
        let mut apu = Apu::new(DEFAULT_SAMPLE_RATE);
        apu.write_register(0x4015, 0x0F);
        apu.write_register(0x4000, 0x3F);
        apu.write_register(0x4002, 0xFD);
        apu.write_register(0x4003, 0x11);
        apu.write_register(0x4011, 0x7F);
        let mut buf = [0.0f32; 256];
        apu.fill_samples(&mut buf);
        assert!(buf.iter().all(|s| (-1.0..=1.0).contains(s)));
        assert!(buf.iter().any(|s| *s > -1.0));
    }

    #[test]
    fn silence_maps_to_negative_rail() {
        let mut apu = Apu::new(DEFAULT_SAMPLE_RATE);
        apu.write_register(0x4011, 0x00);
        let mut buf = [0.0f32; 8];
        apu.fill_samples(&mut buf);
        assert!(buf.iter().all(|s| *s == -1.0));
    }
}
