//! Frame sequencer: quarter- and half-frame event generation.

/// Sequencer timing mode selected by `$4017` bit 7.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(super) enum FrameCounterMode {
    #[default]
    FourStep,
    FiveStep,
}

/// Events produced by one sequencer advance.
#[derive(Debug, Default, Clone, Copy)]
pub(super) struct FrameTick {
    pub(super) quarter: bool,
    pub(super) half: bool,
    pub(super) frame_irq: bool,
}

/// 4-step schedule: (CPU cycle, half-frame). Every step is a quarter frame;
/// the final step asserts the frame IRQ unless inhibited.
const FOUR_STEP: [(u32, bool); 4] = [(3729, false), (7457, true), (11186, false), (14916, true)];
const FOUR_STEP_PERIOD: u32 = 14916;

/// 5-step schedule: same first three steps, a late fourth, and no IRQ.
const FIVE_STEP: [(u32, bool); 4] = [(3729, false), (7457, true), (11186, false), (18641, true)];
const FIVE_STEP_PERIOD: u32 = 18641;

/// Accumulates CPU cycles and fires quarter/half events at the canonical
/// boundaries, resetting the accumulator at each full period.
#[derive(Debug, Clone, Copy)]
pub(super) struct FrameCounter {
    mode: FrameCounterMode,
    irq_inhibit: bool,
    cycle: u32,
}

impl Default for FrameCounter {
    fn default() -> Self {
        // IRQs stay inhibited until the program writes $4017.
        Self {
            mode: FrameCounterMode::FourStep,
            irq_inhibit: true,
            cycle: 0,
        }
    }
}

impl FrameCounter {
    /// `$4017` write. Resets the sequence; returns `true` when the write
    /// should immediately clock the quarter and half units (5-step mode).
    pub(super) fn configure(&mut self, value: u8) -> bool {
        self.mode = if value & 0b1000_0000 == 0 {
            FrameCounterMode::FourStep
        } else {
            FrameCounterMode::FiveStep
        };
        self.irq_inhibit = value & 0b0100_0000 != 0;
        self.cycle = 0;
        self.mode == FrameCounterMode::FiveStep
    }

    fn schedule(&self) -> (&'static [(u32, bool)], u32) {
        match self.mode {
            FrameCounterMode::FourStep => (&FOUR_STEP, FOUR_STEP_PERIOD),
            FrameCounterMode::FiveStep => (&FIVE_STEP, FIVE_STEP_PERIOD),
        }
    }

    /// Advances by `cpu_cycles` and reports which units to clock.
    ///
    /// Instruction-sized advances (at most a few hundred cycles) can cross at
    /// most one boundary, so the events of one call never merge.
    pub(super) fn clock(&mut self, cpu_cycles: u32) -> FrameTick {
        let (steps, period) = self.schedule();
        let before = self.cycle;
        self.cycle += cpu_cycles;

        let mut tick = FrameTick::default();
        for (index, &(boundary, half)) in steps.iter().enumerate() {
            if before < boundary && self.cycle >= boundary {
                tick.quarter = true;
                tick.half |= half;
                if index == steps.len() - 1 {
                    tick.frame_irq =
                        self.mode == FrameCounterMode::FourStep && !self.irq_inhibit;
                }
            }
        }

        if self.cycle >= period {
            self.cycle -= period;
        }
        tick
    }
}
