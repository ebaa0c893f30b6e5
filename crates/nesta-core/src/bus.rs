//! CPU-visible address decoder.
//!
//! The bus owns nothing: it is rebuilt for each CPU step from mutable borrows
//! of the components the shell owns, so there are no back-pointers between
//! subsystems. Reads of unmapped space return 0 (open-bus approximation).

use tracing::trace;

use crate::{
    apu::Apu,
    cartridge::Cartridge,
    controller::Controller,
    memory::{apu as apu_mem, cpu as cpu_mem, ppu as ppu_mem},
    ppu::Ppu,
};

/// Borrowed view of the console for one CPU step.
pub struct CpuBus<'a> {
    pub(crate) ram: &'a mut [u8; cpu_mem::INTERNAL_RAM_SIZE],
    pub(crate) ppu: &'a mut Ppu,
    pub(crate) apu: Option<&'a mut Apu>,
    pub(crate) cartridge: Option<&'a mut Cartridge>,
    pub(crate) controllers: &'a mut [Controller; 2],
    /// Set when a `$4014` write ran a DMA during the current instruction.
    dma_performed: bool,
}

impl<'a> CpuBus<'a> {
    pub(crate) fn new(
        ram: &'a mut [u8; cpu_mem::INTERNAL_RAM_SIZE],
        ppu: &'a mut Ppu,
        apu: Option<&'a mut Apu>,
        cartridge: Option<&'a mut Cartridge>,
        controllers: &'a mut [Controller; 2],
    ) -> Self {
        Self {
            ram,
            ppu,
            apu,
            cartridge,
            controllers,
            dma_performed: false,
        }
    }

    pub(crate) fn read(&mut self, addr: u16) -> u8 {
        match addr {
            0x0000..=cpu_mem::INTERNAL_RAM_MIRROR_END => {
                self.ram[(addr & cpu_mem::INTERNAL_RAM_MASK) as usize]
            }
            ppu_mem::REGISTER_BASE..=ppu_mem::REGISTER_MIRROR_END => {
                self.ppu.read_register(addr, self.cartridge.as_deref())
            }
            ppu_mem::OAM_DMA => 0,
            apu_mem::STATUS => match self.apu.as_deref_mut() {
                Some(apu) => apu.read_status(),
                None => 0,
            },
            cpu_mem::CONTROLLER_PORT_1 => self.controllers[0].read(),
            cpu_mem::CONTROLLER_PORT_2 => self.controllers[1].read(),
            cpu_mem::CARTRIDGE_BASE.. => match self.cartridge.as_deref() {
                Some(cart) => cart.cpu_read(addr),
                None => 0,
            },
            // APU channel registers are write-only; everything else in
            // $4000-$5FFF is unmapped.
            _ => 0,
        }
    }

    pub(crate) fn write(&mut self, addr: u16, data: u8) {
        match addr {
            0x0000..=cpu_mem::INTERNAL_RAM_MIRROR_END => {
                self.ram[(addr & cpu_mem::INTERNAL_RAM_MASK) as usize] = data;
            }
            ppu_mem::REGISTER_BASE..=ppu_mem::REGISTER_MIRROR_END => {
                self.ppu
                    .write_register(addr, data, self.cartridge.as_deref_mut());
            }
            ppu_mem::OAM_DMA => self.oam_dma(data),
            cpu_mem::CONTROLLER_PORT_1 => {
                // The strobe line is shared by both pads.
                self.controllers[0].write_strobe(data);
                self.controllers[1].write_strobe(data);
            }
            apu_mem::REGISTER_BASE..=apu_mem::CHANNEL_REGISTER_END
            | apu_mem::STATUS
            | apu_mem::FRAME_COUNTER => {
                if let Some(apu) = self.apu.as_deref_mut() {
                    apu.write_register(addr, data);
                }
            }
            cpu_mem::CARTRIDGE_BASE.. => {
                if let Some(cart) = self.cartridge.as_deref_mut() {
                    cart.cpu_write(addr, data);
                }
            }
            _ => {}
        }
    }

    /// `$4014` write: copies 256 bytes from `page << 8` into OAM, starting at
    /// the current OAMADDR and wrapping within the table.
    fn oam_dma(&mut self, page: u8) {
        trace!(page = format_args!("{page:02X}"), "oam dma");
        let base = u16::from(page) << 8;
        for offset in 0..ppu_mem::OAM_SIZE as u16 {
            let value = self.read(base.wrapping_add(offset));
            self.ppu.oam_dma_write(offset as u8, value);
        }
        self.dma_performed = true;
    }

    /// Reports (and clears) whether a DMA ran, so the CPU can charge the
    /// 513/514-cycle suspension to the triggering instruction.
    pub(crate) fn take_oam_dma(&mut self) -> bool {
        std::mem::take(&mut self.dma_performed)
    }
}
