//! Per-scanline sprite slots.
//!
//! Evaluation at dot 257 fills a pending buffer of up to eight slots for the
//! next scanline; at dot 1 of that line the pending buffer becomes active.
//! Each active slot counts down its X position, then shifts one pixel per dot.

use bitflags::bitflags;

bitflags! {
    /// OAM attribute byte (sprite byte 2).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SpriteAttributes: u8 {
        const PALETTE       = 0b0000_0011;
        const BEHIND_BG     = 0b0010_0000;
        const FLIP_H        = 0b0100_0000;
        const FLIP_V        = 0b1000_0000;
    }
}

/// One sprite latched for the current scanline.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SpriteSlot {
    pub(crate) x: u8,
    pub(crate) attributes: SpriteAttributes,
    pub(crate) pattern_lo: u8,
    pub(crate) pattern_hi: u8,
    /// Original OAM index, used for the sprite-0 hit test.
    pub(crate) oam_index: u8,
}

impl Default for SpriteSlot {
    fn default() -> Self {
        Self {
            x: 0,
            attributes: SpriteAttributes::empty(),
            pattern_lo: 0,
            pattern_hi: 0,
            oam_index: 0,
        }
    }
}

/// Sprite pixel chosen for one dot.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SpritePixel {
    /// 2-bit color within the sprite palette; 0 means no sprite here.
    pub(crate) color: u8,
    pub(crate) palette: u8,
    pub(crate) behind_background: bool,
    pub(crate) is_sprite0: bool,
}

/// Up to eight sprites latched for one scanline.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SpriteScanline {
    slots: [SpriteSlot; 8],
    count: u8,
}

impl SpriteScanline {
    pub(crate) fn clear(&mut self) {
        self.count = 0;
    }

    /// Latches one in-range sprite; horizontal flip is applied here by
    /// reversing the pattern bits so shifting always walks left to right.
    /// Returns `false` when all eight slots are already taken.
    pub(crate) fn push(
        &mut self,
        x: u8,
        attributes: SpriteAttributes,
        mut pattern_lo: u8,
        mut pattern_hi: u8,
        oam_index: u8,
    ) -> bool {
        if self.count >= 8 {
            return false;
        }
        if attributes.contains(SpriteAttributes::FLIP_H) {
            pattern_lo = pattern_lo.reverse_bits();
            pattern_hi = pattern_hi.reverse_bits();
        }
        self.slots[self.count as usize] = SpriteSlot {
            x,
            attributes,
            pattern_lo,
            pattern_hi,
            oam_index,
        };
        self.count += 1;
        true
    }

    /// First opaque pixel among the active slots, in OAM priority order.
    pub(crate) fn sample(&self) -> SpritePixel {
        for slot in &self.slots[..self.count as usize] {
            if slot.x > 0 {
                continue;
            }
            let color = ((slot.pattern_hi >> 7) << 1) | (slot.pattern_lo >> 7);
            if color != 0 {
                return SpritePixel {
                    color,
                    palette: (slot.attributes & SpriteAttributes::PALETTE).bits(),
                    behind_background: slot.attributes.contains(SpriteAttributes::BEHIND_BG),
                    is_sprite0: slot.oam_index == 0,
                };
            }
        }
        SpritePixel::default()
    }

    /// Per-dot advance: X counters tick down while positive, expired slots
    /// shift one pixel.
    pub(crate) fn advance(&mut self) {
        for slot in &mut self.slots[..self.count as usize] {
            if slot.x > 0 {
                slot.x -= 1;
            } else {
                slot.pattern_lo <<= 1;
                slot.pattern_hi <<= 1;
            }
        }
    }
}
