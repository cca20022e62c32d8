//! `AtariXl`: the top-level owning container and the scanline loop.
//!
//! One struct owns RAM, both ROMs, the CPU, and all four chips —
//! component-for-component the same shape as the reference `C64`
//! struct that owns VIC-II, two CIAs, the MMU, and memory banks. Every
//! cross-chip effect (ANTIC reading GTIA colours, a PIA write
//! re-evaluating bus banking, POKEY asserting the CPU's IRQ line)
//! happens inside a `&mut self` method here rather than through any
//! pointer between chips.

use log::{debug, info};

use crate::antic::Antic;
use crate::bus::{CpuBusView, SystemBus};
use crate::cpu::{Bus as CpuBus, Mos6502};
use crate::error::AtariError;
use crate::gtia::{Gtia, TvSystem};
use crate::pia::Pia;
use crate::pokey::Pokey;
use crate::sinks::{AudioSink, DisplaySink, InputSource};

const CYCLES_PER_SCANLINE: u32 = 114;

pub struct AtariXl {
    pub cpu: Mos6502,
    pub bus: SystemBus,
    pub antic: Antic,
    pub gtia: Gtia,
    pub pokey: Pokey,
    pub pia: Pia,

    tv_system: TvSystem,
    stop_requested: bool,
    dropped_audio_frames: u32,

    /// Bresenham-style carry for `samples_per_scanline`: accumulates
    /// `pokey.sample_rate()` every scanline and divides out whole
    /// samples, so fractional remainders aren't silently floored away.
    sample_accum: u32,
}

impl AtariXl {
    pub fn new(os_rom: Vec<u8>, basic_rom: Vec<u8>, tv_system: TvSystem, sample_rate: u32) -> Result<Self, AtariError> {
        let bus = SystemBus::new(os_rom, basic_rom)?;
        let frame_scanlines = match tv_system {
            TvSystem::Pal => 312,
            TvSystem::Ntsc => 262,
        };
        info!("booting AtariXl, tv_system={tv_system:?}, frame_scanlines={frame_scanlines}");
        let mut system = Self {
            cpu: Mos6502::new(),
            bus,
            antic: Antic::new(frame_scanlines),
            gtia: Gtia::new(tv_system),
            pokey: Pokey::new(sample_rate),
            pia: Pia::new(),
            tv_system,
            stop_requested: false,
            dropped_audio_frames: 0,
            sample_accum: 0,
        };
        system.reset();
        Ok(system)
    }

    /// Re-zero every chip and fetch the CPU's PC from the reset vector.
    pub fn reset(&mut self) {
        info!("resetting AtariXl");
        self.antic.reset();
        self.gtia.reset();
        self.pokey.reset();
        self.pia.reset();
        self.sample_accum = 0;
        let mut view = CpuBusView {
            bus: &mut self.bus,
            antic: &mut self.antic,
            gtia: &mut self.gtia,
            pokey: &mut self.pokey,
            pia: &mut self.pia,
        };
        self.cpu.reset(&mut view);
    }

    /// Run the CPU from `addr` as though called by JSR, stopping once it
    /// returns through a fabricated sentinel return address. Used by the
    /// XEX loader to invoke a segment's INITAD routine (§6.4).
    pub(crate) fn run_init_routine(&mut self, addr: u16) {
        const SENTINEL: u16 = 0x0000;
        let return_addr = SENTINEL.wrapping_sub(1);
        {
            let mut view = CpuBusView {
                bus: &mut self.bus,
                antic: &mut self.antic,
                gtia: &mut self.gtia,
                pokey: &mut self.pokey,
                pia: &mut self.pia,
            };
            view.write(0x0100 | self.cpu.sp as u16, (return_addr >> 8) as u8);
            self.cpu.sp = self.cpu.sp.wrapping_sub(1);
            view.write(0x0100 | self.cpu.sp as u16, return_addr as u8);
            self.cpu.sp = self.cpu.sp.wrapping_sub(1);
        }
        self.cpu.pc = addr;

        const MAX_STEPS: u32 = 1_000_000;
        for _ in 0..MAX_STEPS {
            if self.cpu.pc == SENTINEL || self.cpu.is_halted() {
                break;
            }
            let mut view = CpuBusView {
                bus: &mut self.bus,
                antic: &mut self.antic,
                gtia: &mut self.gtia,
                pokey: &mut self.pokey,
                pia: &mut self.pia,
            };
            self.cpu.step(&mut view);
        }
    }

    pub fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    /// Run exactly one scanline: size the CPU's budget, step the CPU
    /// (checking pending interrupts at each instruction boundary),
    /// rasterise the line, accumulate audio, and advance ANTIC's
    /// scanline counter. Returns `true` if a frame just completed.
    pub fn run_scanline(&mut self, display: &mut dyn DisplaySink, audio: &mut dyn AudioSink) -> bool {
        let dma_cycles = self.antic.dma_cycles_for_next_scanline();
        let budget = CYCLES_PER_SCANLINE.saturating_sub(dma_cycles);

        let mut cycles_this_scanline = 0u32;
        while cycles_this_scanline < budget && !self.antic.wsync_halted() {
            self.antic.check_pending_nmi(&mut self.cpu);
            let irq_asserted = self.pokey.check_irq();
            self.cpu.raise_irq(irq_asserted);

            let mut view = CpuBusView {
                bus: &mut self.bus,
                antic: &mut self.antic,
                gtia: &mut self.gtia,
                pokey: &mut self.pokey,
                pia: &mut self.pia,
            };
            cycles_this_scanline += self.cpu.step(&mut view) as u32;
        }
        self.antic.release_wsync();

        self.antic.render_scanline(self.bus.ram_slice(), &mut self.gtia);

        let samples_this_scanline = self.samples_per_scanline();
        let samples = self.pokey.generate_samples(samples_this_scanline);
        if audio.push_samples(&samples).is_err() {
            self.dropped_audio_frames += 1;
            debug!("audio sink overflowed, total drops={}", self.dropped_audio_frames);
        }

        self.antic.advance_scanline();

        let frame_ended = self.antic.scanline() == 0;
        if frame_ended {
            let width = crate::antic::FRAME_WIDTH;
            let height = self.antic.frame_height();
            let rgb_indexed = &self.antic.framebuffer;
            display.present_bitmap(width, height, rgb_indexed);
            debug!("frame presented");
        }
        frame_ended
    }

    /// Samples to generate for the scanline about to run. Distributes
    /// `pokey.sample_rate()` samples per second across all scanlines of
    /// a frame using a Bresenham-style running remainder, so the total
    /// produced in one frame is `sample_rate/frame_rate` rounded to the
    /// nearest whole sample rather than floored every single line.
    fn samples_per_scanline(&mut self) -> usize {
        let frame_scanlines = match self.tv_system {
            TvSystem::Pal => 312u32,
            TvSystem::Ntsc => 262u32,
        };
        let frame_rate = match self.tv_system {
            TvSystem::Pal => 50u32,
            TvSystem::Ntsc => 60u32,
        };
        let denom = frame_rate * frame_scanlines;
        self.sample_accum += self.pokey.sample_rate();
        let samples = self.sample_accum / denom;
        self.sample_accum %= denom;
        samples as usize
    }

    /// Run scanlines until a full frame has been presented or a stop
    /// was requested. Returns `false` if the loop stopped early.
    pub fn run_frame(&mut self, display: &mut dyn DisplaySink, audio: &mut dyn AudioSink) -> bool {
        loop {
            if self.stop_requested {
                return false;
            }
            if self.run_scanline(display, audio) {
                return true;
            }
        }
    }

}

/// `AtariXl` is itself the `InputSource`: external driver threads call
/// these directly on the owning container rather than through any
/// extra indirection layer, matching how the reference routes player
/// commands straight to the subsystem they affect.
impl InputSource for AtariXl {
    fn set_key(&mut self, atari_keycode: u8, pressed: bool) {
        self.pokey.set_key(atari_keycode, pressed);
    }
    fn set_break_key(&mut self, pressed: bool) {
        self.pokey.set_break_key(pressed);
    }
    fn set_console(&mut self, start: bool, select: bool, option: bool) {
        self.gtia.set_console(start, select, option);
    }
    fn set_joystick(&mut self, port: u8, up: bool, down: bool, left: bool, right: bool, fire: bool) {
        let mut lines = 0xF0u8;
        if !up {
            lines |= 0x01;
        }
        if !down {
            lines |= 0x02;
        }
        if !left {
            lines |= 0x04;
        }
        if !right {
            lines |= 0x08;
        }
        self.pia.set_joystick_lines(lines);
        self.gtia.set_trigger(port as usize, fire);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Bank;
    use crate::sinks::testutil::{NullDisplaySink, RecordingAudioSink};

    fn make_system() -> AtariXl {
        let mut os_rom = vec![0u8; 0x4000];
        os_rom[0x3FFC] = 0x00;
        os_rom[0x3FFD] = 0xC0;
        let basic_rom = vec![0u8; 0x2000];
        AtariXl::new(os_rom, basic_rom, TvSystem::Ntsc, 44_100).unwrap()
    }

    #[test]
    fn boot_reaches_reset_vector() {
        let system = make_system();
        assert_eq!(system.cpu.pc, 0xC000);
    }

    #[test]
    fn scanline_budget_never_exceeded() {
        let mut system = make_system();
        let mut display = NullDisplaySink::default();
        let mut audio = RecordingAudioSink::new(1000);
        system.bus.ram.poke(0xC000, 0xEA); // NOP, so the CPU never halts mid-run
        for _ in 0..10 {
            system.run_scanline(&mut display, &mut audio);
            assert!(system.antic.scanline() < 262);
        }
    }

    #[test]
    fn frame_audio_sample_count_matches_sample_rate_budget() {
        let mut os_rom = vec![0u8; 0x4000];
        os_rom[0x3FFC] = 0x00;
        os_rom[0x3FFD] = 0xC0;
        let basic_rom = vec![0u8; 0x2000];
        let mut system = AtariXl::new(os_rom, basic_rom, TvSystem::Ntsc, 48_000).unwrap();
        system.bus.ram.poke(0xC000, 0xEA);

        let mut display = NullDisplaySink::default();
        let mut audio = RecordingAudioSink::new(100_000);
        for _ in 0..262 {
            system.run_scanline(&mut display, &mut audio);
        }
        let total: usize = audio.bursts.iter().map(|b| b.len()).sum();
        let expected = 48_000 / 60;
        assert!((total as i64 - expected as i64).abs() <= 1, "got {total} samples, expected {expected} +/- 1");
    }

    #[test]
    fn frame_boundary_presents_a_bitmap() {
        let mut system = make_system();
        let mut display = NullDisplaySink::default();
        let mut audio = RecordingAudioSink::new(10_000);
        system.bus.ram.poke(0xC000, 0xEA);
        for _ in 0..262 {
            system.run_scanline(&mut display, &mut audio);
        }
        assert_eq!(display.frames_presented, 1);
    }
}
