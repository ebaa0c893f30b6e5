use bitflags::bitflags;

bitflags! {
    /// 6502 processor status register (P).
    ///
    /// Bit layout: `N V U B D I Z C`. The B flag is never stored in `p`
    /// itself; it only appears in the byte pushed by PHP/BRK. U reads as 1.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u8 {
        const CARRY     = 0b0000_0001;
        const ZERO      = 0b0000_0010;
        const INTERRUPT = 0b0000_0100;
        /// Decimal mode flag; latched but ignored by the NES ALU.
        const DECIMAL   = 0b0000_1000;
        const BREAK     = 0b0001_0000;
        const UNUSED    = 0b0010_0000;
        const OVERFLOW  = 0b0100_0000;
        const NEGATIVE  = 0b1000_0000;
    }
}

impl Status {
    /// Power-on value: U and I set.
    pub fn power_on() -> Self {
        Status::UNUSED | Status::INTERRUPT
    }

    /// Updates Z and N from a result byte.
    #[inline]
    pub fn set_zn(&mut self, value: u8) {
        self.set(Status::ZERO, value == 0);
        self.set(Status::NEGATIVE, value & 0x80 != 0);
    }

    /// Loads a pulled byte, forcing U set and B clear.
    #[inline]
    pub fn load_from_stack(&mut self, byte: u8) {
        *self = (Status::from_bits_retain(byte) | Status::UNUSED) - Status::BREAK;
    }

    /// Byte pushed by PHP and BRK (B and U forced high).
    #[inline]
    pub fn to_pushed_byte(self, from_instruction: bool) -> u8 {
        let mut byte = self | Status::UNUSED;
        byte.set(Status::BREAK, from_instruction);
        byte.bits()
    }
}
