//! System bus: the address decoder that routes CPU accesses to RAM,
//! the two banked ROMs, the self-test window, and the four chip
//! register blocks.
//!
//! Grounded on the reference MMU/PLA banking module: every
//! memory-mapped device is a small struct implementing one shared
//! `Bank` trait, and the bus itself is a thin router rather than one
//! monolithic 64 KiB `match`.

use crate::antic::Antic;
use crate::cpu::Bus as CpuBus;
use crate::error::AtariError;
use crate::gtia::Gtia;
use crate::pia::{self, Pia};
use crate::pokey::Pokey;

pub const RAM_SIZE: usize = 0x10000;
const OS_ROM_SIZE: usize = 0x4000;
const BASIC_ROM_SIZE: usize = 0x2000;

/// A readable/writable 16-bit-addressed block. Reads with a side
/// effect (a register acknowledge, a collision-matrix mutation) use
/// `peek_mut`; pure storage can leave the default alone.
pub trait Bank {
    fn peek(&self, offset: u16) -> u8;
    fn poke(&mut self, offset: u16, value: u8);

    fn peek_mut(&mut self, offset: u16) -> u8 {
        self.peek(offset)
    }
}

pub struct Ram {
    bytes: Vec<u8>,
}

impl Ram {
    fn new() -> Self {
        Self { bytes: vec![0; RAM_SIZE] }
    }
}

impl Bank for Ram {
    fn peek(&self, offset: u16) -> u8 {
        self.bytes[offset as usize]
    }
    fn poke(&mut self, offset: u16, value: u8) {
        self.bytes[offset as usize] = value;
    }
}

pub struct Rom {
    bytes: Vec<u8>,
}

impl Rom {
    fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

impl Bank for Rom {
    fn peek(&self, offset: u16) -> u8 {
        self.bytes[offset as usize]
    }
    fn poke(&mut self, _offset: u16, _value: u8) {
        // ROM ignores writes; the caller routes writes to RAM underneath.
    }
}

/// Open-bus stub for unmapped register windows ($D100-$D1FF, $D500-$D7FF).
pub struct OpenBus;

impl Bank for OpenBus {
    fn peek(&self, _offset: u16) -> u8 {
        0xFF
    }
    fn poke(&mut self, _offset: u16, _value: u8) {}
}

#[derive(Default, Clone, Copy)]
pub struct BankingState {
    pub os_visible: bool,
    pub basic_visible: bool,
    pub self_test_visible: bool,
}

pub struct SystemBus {
    pub ram: Ram,
    pub os_rom: Rom,
    pub basic_rom: Rom,
    pub banking: BankingState,
    open_bus: OpenBus,
}

impl SystemBus {
    pub fn new(os_rom: Vec<u8>, basic_rom: Vec<u8>) -> Result<Self, AtariError> {
        if os_rom.len() != OS_ROM_SIZE {
            return Err(AtariError::InvalidRom {
                detail: format!("OS ROM must be {OS_ROM_SIZE} bytes, got {}", os_rom.len()),
            });
        }
        if basic_rom.len() != BASIC_ROM_SIZE {
            return Err(AtariError::InvalidRom {
                detail: format!("BASIC ROM must be {BASIC_ROM_SIZE} bytes, got {}", basic_rom.len()),
            });
        }

        let reset_lo = os_rom[0x3FFC] as u16;
        let reset_hi = os_rom[0x3FFD] as u16;
        let reset_vector = (reset_hi << 8) | reset_lo;
        if !(0xC000..=0xFFFF).contains(&reset_vector) {
            return Err(AtariError::InvalidRom {
                detail: format!("reset vector ${reset_vector:04X} outside $C000-$FFFF"),
            });
        }

        Ok(Self {
            ram: Ram::new(),
            os_rom: Rom::new(os_rom),
            basic_rom: Rom::new(basic_rom),
            banking: BankingState { os_visible: true, basic_visible: true, self_test_visible: false },
            open_bus: OpenBus,
        })
    }

    /// Raw RAM backing store, for ANTIC's DMA reads (a dedicated
    /// non-mutating borrow, never routed through chip register logic).
    pub fn ram_slice(&self) -> &[u8] {
        &self.ram.bytes
    }

    pub fn reevaluate_banking(&mut self, port_b: u8) {
        self.banking = BankingState {
            os_visible: port_b & pia::bankbits::OS_ROM == 0,
            basic_visible: port_b & pia::bankbits::BASIC_ROM == 0,
            self_test_visible: port_b & pia::bankbits::SELF_TEST == 0,
        };
    }

    pub fn read(&self, addr: u16, antic: &mut Antic, gtia: &mut Gtia, pokey: &mut Pokey, pia: &Pia) -> u8 {
        match addr {
            0x0000..=0x4FFF => self.ram.peek(addr),
            0x5000..=0x57FF => {
                if self.banking.self_test_visible {
                    self.os_rom.peek(0x1000 + (addr - 0x5000))
                } else {
                    self.ram.peek(addr)
                }
            }
            0x5800..=0x9FFF => self.ram.peek(addr),
            0xA000..=0xBFFF => {
                if self.banking.basic_visible {
                    self.basic_rom.peek(addr - 0xA000)
                } else {
                    self.ram.peek(addr)
                }
            }
            0xC000..=0xCFFF => {
                if self.banking.os_visible {
                    self.os_rom.peek(addr - 0xC000)
                } else {
                    self.ram.peek(addr)
                }
            }
            0xD000..=0xD0FF => gtia.read((addr & 0x1F) as u8),
            0xD100..=0xD1FF => self.open_bus.peek(addr),
            0xD200..=0xD2FF => pokey.read((addr & 0x0F) as u8),
            0xD300..=0xD3FF => pia.read((addr & 0x03) as u8),
            0xD400..=0xD4FF => antic.read((addr & 0x0F) as u8),
            0xD500..=0xD7FF => self.open_bus.peek(addr),
            0xD800..=0xFFFF => {
                if self.banking.os_visible {
                    self.os_rom.peek(addr - 0xC000)
                } else {
                    self.ram.peek(addr)
                }
            }
        }
    }

    /// Returns `true` if this write went to the PIA and changed its
    /// effective port-B value, i.e. the caller must re-evaluate banking.
    pub fn write(
        &mut self,
        addr: u16,
        value: u8,
        antic: &mut Antic,
        gtia: &mut Gtia,
        pokey: &mut Pokey,
        pia: &mut Pia,
    ) -> bool {
        // Write-under-ROM: RAM always accepts the write, even where a ROM
        // bank is currently visible for reads (XL/XE behaviour).
        match addr {
            0x0000..=0xCFFF | 0xD800..=0xFFFF => {
                self.ram.poke(addr, value);
                false
            }
            0xA000..=0xBFFF => {
                self.ram.poke(addr, value);
                false
            }
            0xD000..=0xD0FF => {
                gtia.write((addr & 0x1F) as u8, value);
                false
            }
            0xD100..=0xD1FF => false,
            0xD200..=0xD2FF => {
                pokey.write((addr & 0x0F) as u8, value);
                false
            }
            0xD300..=0xD3FF => {
                let bank_changed = pia.write((addr & 0x03) as u8, value);
                if bank_changed {
                    self.reevaluate_banking(pia.port_b_value());
                }
                bank_changed
            }
            0xD400..=0xD4FF => {
                antic.write((addr & 0x0F) as u8, value);
                false
            }
            0xD500..=0xD7FF => false,
        }
    }
}

/// Adapter so the CPU core's narrow `Bus` trait can drive a full
/// system tick without the CPU module knowing any chip exists. Built
/// fresh (borrowing all the chip fields) for the span of one
/// `cpu.step()` call.
pub struct CpuBusView<'a> {
    pub bus: &'a mut SystemBus,
    pub antic: &'a mut Antic,
    pub gtia: &'a mut Gtia,
    pub pokey: &'a mut Pokey,
    pub pia: &'a mut Pia,
}

impl<'a> CpuBus for CpuBusView<'a> {
    fn read(&mut self, addr: u16) -> u8 {
        self.bus.read(addr, self.antic, self.gtia, self.pokey, self.pia)
    }

    fn write(&mut self, addr: u16, value: u8) {
        self.bus.write(addr, value, self.antic, self.gtia, self.pokey, self.pia);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gtia::TvSystem;

    fn make_bus() -> SystemBus {
        let mut os_rom = vec![0u8; OS_ROM_SIZE];
        os_rom[0x3FFC] = 0x00;
        os_rom[0x3FFD] = 0xC0;
        let basic_rom = vec![0u8; BASIC_ROM_SIZE];
        SystemBus::new(os_rom, basic_rom).unwrap()
    }

    #[test]
    fn rejects_wrong_sized_rom() {
        let os_rom = vec![0u8; 10];
        let basic_rom = vec![0u8; BASIC_ROM_SIZE];
        assert!(SystemBus::new(os_rom, basic_rom).is_err());
    }

    #[test]
    fn rejects_reset_vector_outside_os_range() {
        let mut os_rom = vec![0u8; OS_ROM_SIZE];
        os_rom[0x3FFC] = 0x00;
        os_rom[0x3FFD] = 0x10; // $1000, outside $C000-$FFFF
        let basic_rom = vec![0u8; BASIC_ROM_SIZE];
        assert!(SystemBus::new(os_rom, basic_rom).is_err());
    }

    #[test]
    fn s5_pia_banking_flips_c000_window() {
        let mut bus = make_bus();
        let mut antic = Antic::new(262);
        let mut gtia = Gtia::new(TvSystem::Ntsc);
        let mut pokey = Pokey::new(44_100);
        let mut pia = Pia::new();

        pia.write(pia::PACTL, 0x04);
        pia.write(pia::PBCTL, 0x00);
        pia.write(pia::PORTB, 0xFF); // DDR = all output
        pia.write(pia::PBCTL, 0x04);

        bus.write(0xD301, 0xFE, &mut antic, &mut gtia, &mut pokey, &mut pia);
        assert!(bus.banking.os_visible);
        bus.ram.poke(0xFFFC, 0xAA);
        bus.os_rom.bytes[0x3FFC] = 0x55;
        assert_eq!(bus.read(0xFFFC, &mut antic, &mut gtia, &mut pokey, &pia), 0x55);

        bus.write(0xD301, 0xFF, &mut antic, &mut gtia, &mut pokey, &mut pia);
        assert!(!bus.banking.os_visible);
        assert_eq!(bus.read(0xFFFC, &mut antic, &mut gtia, &mut pokey, &pia), 0xAA);
    }

    #[test]
    fn write_under_rom_reaches_ram() {
        let mut bus = make_bus();
        let mut antic = Antic::new(262);
        let mut gtia = Gtia::new(TvSystem::Ntsc);
        let mut pokey = Pokey::new(44_100);
        let mut pia = Pia::new();

        bus.write(0xC050, 0x42, &mut antic, &mut gtia, &mut pokey, &mut pia);
        assert_eq!(bus.ram.peek(0xC050), 0x42);
    }

    #[test]
    fn last_write_wins() {
        let mut bus = make_bus();
        let mut antic = Antic::new(262);
        let mut gtia = Gtia::new(TvSystem::Ntsc);
        let mut pokey = Pokey::new(44_100);
        let mut pia = Pia::new();

        bus.write(0x1000, 0x11, &mut antic, &mut gtia, &mut pokey, &mut pia);
        bus.write(0x1000, 0x22, &mut antic, &mut gtia, &mut pokey, &mut pia);
        bus.write(0x1000, 0x33, &mut antic, &mut gtia, &mut pokey, &mut pia);
        assert_eq!(bus.ram.peek(0x1000), 0x33);
    }
}
