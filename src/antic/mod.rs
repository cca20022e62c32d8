//! ANTIC: display-list interpreter, scanline pacing, and NMI generation.
//!
//! Plays the role the reference VIC-II module plays for the C64 core —
//! it is the thing the scanline loop asks for a DMA-cycle budget and
//! then hands a finished video line to once the CPU has run. Unlike
//! the reference raster, ANTIC's "instructions" live in RAM as a
//! display list rather than being derived purely from register state,
//! so `process_scanline` also owns the display-list fetch/decode.

pub mod modes;

use crate::cpu::Mos6502;
use crate::gtia::{Gtia, PlayfieldColor};
use modes::{mode_info, ModeFamily};

pub const FRAME_WIDTH: usize = 320;

/// Register offsets within the 16-byte ANTIC window (address & 0x0F).
pub mod reg {
    pub const DMACTL: u8 = 0x00;
    pub const CHACTL: u8 = 0x01;
    pub const DLISTL: u8 = 0x02;
    pub const DLISTH: u8 = 0x03;
    pub const HSCROL: u8 = 0x04;
    pub const VSCROL: u8 = 0x05;
    pub const PMBASE: u8 = 0x07;
    pub const CHBASE: u8 = 0x09;
    pub const WSYNC: u8 = 0x0A;
    pub const NMIEN: u8 = 0x0E;
    pub const NMIRES: u8 = 0x0F;

    // Read-only aliases.
    pub const VCOUNT: u8 = 0x0B;
    pub const NMIST: u8 = 0x0F;
}

/// NMIEN/NMIST bit positions, matching the bits the spec calls out
/// explicitly for DLI ("NMIEN bit 7").
pub mod nmibits {
    pub const DLI: u8 = 1 << 7;
    pub const VBI: u8 = 1 << 6;
}

mod dmactlbits {
    pub const WIDTH_MASK: u8 = 0x03;
    pub const DL_ENABLE: u8 = 1 << 5;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlayfieldWidth {
    Off,
    Narrow,
    Standard,
    Wide,
}

fn playfield_width(dmactl: u8) -> PlayfieldWidth {
    match dmactl & dmactlbits::WIDTH_MASK {
        0 => PlayfieldWidth::Off,
        1 => PlayfieldWidth::Narrow,
        2 => PlayfieldWidth::Standard,
        _ => PlayfieldWidth::Wide,
    }
}

pub struct Antic {
    pub dmactl: u8,
    pub chactl: u8,
    dlistl: u8,
    dlisth: u8,
    pub hscrol: u8,
    pub vscrol: u8,
    pub pmbase: u8,
    pub chbase: u8,
    pub nmien: u8,
    nmist: u8,

    scanline: u16,
    dl_pc: u16,
    memscan: u16,
    mode_lines_remaining: u8,
    current_mode: u8,
    current_mode_dli: bool,
    current_bytes_per_row: u16,
    in_display_list: bool,
    wsync_halted: bool,

    frame_scanlines: u16,
    vblank_start: u16,
    vblank_end: u16,

    pub framebuffer: Vec<u8>,
    frame_height: usize,
}

impl Antic {
    pub fn new(frame_scanlines: u16) -> Self {
        let vblank_start = 8;
        let vblank_end = 248;
        let frame_height = (vblank_end - vblank_start) as usize;
        Self {
            dmactl: 0,
            chactl: 0,
            dlistl: 0,
            dlisth: 0,
            hscrol: 0,
            vscrol: 0,
            pmbase: 0,
            chbase: 0,
            nmien: 0,
            nmist: 0,
            scanline: 0,
            dl_pc: 0,
            memscan: 0,
            mode_lines_remaining: 0,
            current_mode: 0,
            current_mode_dli: false,
            current_bytes_per_row: 0,
            in_display_list: false,
            wsync_halted: false,
            frame_scanlines,
            vblank_start,
            vblank_end,
            framebuffer: vec![0; FRAME_WIDTH * frame_height],
            frame_height,
        }
    }

    pub fn reset(&mut self) {
        let frame_scanlines = self.frame_scanlines;
        *self = Self::new(frame_scanlines);
    }

    pub fn frame_height(&self) -> usize {
        self.frame_height
    }

    pub fn scanline(&self) -> u16 {
        self.scanline
    }

    pub fn wsync_halted(&self) -> bool {
        self.wsync_halted
    }

    pub fn release_wsync(&mut self) {
        self.wsync_halted = false;
    }

    fn dlist(&self) -> u16 {
        (self.dlisth as u16) << 8 | self.dlistl as u16
    }

    fn in_vblank(&self, scanline: u16) -> bool {
        scanline < self.vblank_start || scanline >= self.vblank_end
    }

    fn dl_dma_enabled(&self) -> bool {
        self.dmactl & dmactlbits::DL_ENABLE != 0
    }

    /// Cheap lookahead used by the scanline loop to size the CPU's
    /// cycle budget before any display-list decode has happened for
    /// this line (§4.B "DMA accounting").
    pub fn dma_cycles_for_next_scanline(&self) -> u32 {
        if self.in_vblank(self.scanline) || !self.dl_dma_enabled() {
            return 0;
        }
        let playfield = 40;
        let instruction_fetch = if self.mode_lines_remaining == 0 { 3 } else { 0 };
        playfield + instruction_fetch
    }

    /// Raise a latched NMI for whichever one-shot NMIST bit is set and
    /// enabled, consuming it. Mirrors `check_pending_irq` on POKEY.
    pub fn check_pending_nmi(&mut self, cpu: &mut Mos6502) {
        let armed = self.nmist & self.nmien;
        if armed & nmibits::DLI != 0 {
            self.nmist &= !nmibits::DLI;
            cpu.raise_nmi();
        } else if armed & nmibits::VBI != 0 {
            self.nmist &= !nmibits::VBI;
            cpu.raise_nmi();
        }
    }

    pub fn read(&mut self, addr: u8) -> u8 {
        match addr & 0x0F {
            reg::VCOUNT => (self.scanline / 2) as u8,
            reg::NMIST => self.nmist,
            _ => 0xFF,
        }
    }

    /// Returns `true` if this write was a WSYNC, so the caller's CPU
    /// loop knows to stop consuming cycles immediately.
    pub fn write(&mut self, addr: u8, value: u8) -> bool {
        match addr & 0x0F {
            reg::DMACTL => self.dmactl = value,
            reg::CHACTL => self.chactl = value,
            reg::DLISTL => self.dlistl = value,
            reg::DLISTH => self.dlisth = value,
            reg::HSCROL => self.hscrol = value & 0x0F,
            reg::VSCROL => self.vscrol = value & 0x0F,
            reg::PMBASE => self.pmbase = value,
            reg::CHBASE => self.chbase = value,
            reg::WSYNC => {
                self.wsync_halted = true;
                return true;
            }
            reg::NMIEN => self.nmien = value,
            reg::NMIRES => self.nmist = 0,
            _ => {}
        }
        false
    }

    /// Step 1-4 of the scanline algorithm: decode display-list work (if
    /// any is due) and rasterise exactly one scanline into the
    /// framebuffer. Called once per scanline after the CPU has spent
    /// its budget.
    pub fn render_scanline(&mut self, ram: &[u8], gtia: &mut Gtia) {
        let row = self.visible_row();

        if self.in_vblank(self.scanline) || !self.dl_dma_enabled() {
            self.fill_background(row, gtia);
            return;
        }

        if self.mode_lines_remaining == 0 {
            self.decode_next_instruction(ram, gtia);
            // Blank/jump instructions leave nothing to rasterise this line.
            if self.current_mode < 2 {
                self.fill_background(row, gtia);
                if self.current_mode == 0 {
                    self.mode_lines_remaining = self.mode_lines_remaining.saturating_sub(1);
                }
                return;
            }
        }

        self.rasterise_mode_line(ram, gtia, row);

        if self.mode_lines_remaining > 0 {
            self.mode_lines_remaining -= 1;
        }
        if self.mode_lines_remaining == 0 && self.current_mode_dli {
            self.nmist |= nmibits::DLI;
        }

        let info = mode_info(self.current_mode);
        let advance_every_line = info.family == ModeFamily::Bitmap;
        if advance_every_line || self.mode_lines_remaining == 0 {
            self.memscan = self.memscan.wrapping_add(self.current_bytes_per_row);
        }
    }

    fn visible_row(&self) -> Option<usize> {
        if self.scanline < self.vblank_start || self.scanline >= self.vblank_end {
            None
        } else {
            Some((self.scanline - self.vblank_start) as usize)
        }
    }

    fn fill_background(&mut self, row: Option<usize>, gtia: &mut Gtia) {
        let Some(row) = row else { return };
        let color = gtia.playfield_color(PlayfieldColor::Background);
        let base = row * FRAME_WIDTH;
        self.framebuffer[base..base + FRAME_WIDTH].fill(color);
    }

    fn decode_next_instruction(&mut self, ram: &[u8], _gtia: &mut Gtia) {
        let instr = ram[self.dl_pc as usize];
        self.dl_pc = self.dl_pc.wrapping_add(1);
        let low = instr & 0x0F;

        match low {
            0x0 => {
                let n = ((instr >> 4) & 0x07) + 1;
                self.current_mode = 0;
                self.mode_lines_remaining = n;
            }
            0x1 => {
                let lo = ram[self.dl_pc as usize] as u16;
                let hi = ram[self.dl_pc.wrapping_add(1) as usize] as u16;
                self.dl_pc = self.dl_pc.wrapping_add(2);
                let target = (hi << 8) | lo;
                self.current_mode = 1;
                if instr & 0x40 != 0 {
                    self.nmist |= nmibits::VBI;
                }
                self.dl_pc = target;
            }
            mode => {
                let dli = instr & 0x80 != 0;
                let lms = instr & 0x40 != 0;
                if lms {
                    let lo = ram[self.dl_pc as usize] as u16;
                    let hi = ram[self.dl_pc.wrapping_add(1) as usize] as u16;
                    self.dl_pc = self.dl_pc.wrapping_add(2);
                    self.memscan = (hi << 8) | lo;
                }
                let info = mode_info(mode);
                self.current_mode = mode;
                self.current_mode_dli = dli;
                self.mode_lines_remaining = info.scanlines;
                self.current_bytes_per_row = self.row_byte_count(info.bytes_per_row_normal_width);
            }
        }
    }

    fn row_byte_count(&self, normal_width: u16) -> u16 {
        match playfield_width(self.dmactl) {
            PlayfieldWidth::Off => 0,
            PlayfieldWidth::Narrow => normal_width * 32 / 40,
            PlayfieldWidth::Standard => normal_width,
            PlayfieldWidth::Wide => normal_width * 48 / 40,
        }
    }

    fn rasterise_mode_line(&mut self, ram: &[u8], gtia: &mut Gtia, row: Option<usize>) {
        let info = mode_info(self.current_mode);
        let bytes = self.current_bytes_per_row as usize;
        let line_in_cell = (info.scanlines - self.mode_lines_remaining) as u16;

        let mut pixels = [0u8; FRAME_WIDTH];
        let mut pf_bits = [0u8; FRAME_WIDTH];
        let pixels_per_byte = info.pixels_per_byte as usize;
        let span = (bytes * pixels_per_byte).min(FRAME_WIDTH);
        let start = (FRAME_WIDTH.saturating_sub(span)) / 2;

        for col in 0..bytes {
            let addr = self.memscan.wrapping_add(col as u16) as usize;
            let byte = ram[addr % ram.len()];
            let source_byte = match info.family {
                ModeFamily::Character => {
                    let code = byte & 0x7F;
                    let char_base = (self.chbase as u16) << 8;
                    let glyph_addr = char_base.wrapping_add(code as u16 * 8 + line_in_cell);
                    ram[glyph_addr as usize % ram.len()]
                }
                ModeFamily::Bitmap => byte,
            };

            let bits_per_pixel = 8 / pixels_per_byte.max(1);
            for p in 0..pixels_per_byte {
                let shift = 8 - bits_per_pixel * (p + 1);
                let value = (source_byte >> shift) & ((1u16 << bits_per_pixel) - 1) as u8;
                let (color, bit) = match (info.family, bits_per_pixel) {
                    (ModeFamily::Character, 1) => {
                        if value != 0 {
                            (gtia.playfield_color(PlayfieldColor::Pf1), 0x2)
                        } else {
                            (gtia.playfield_color(PlayfieldColor::Pf2), 0x4)
                        }
                    }
                    (_, 2) => match value {
                        0 => (gtia.playfield_color(PlayfieldColor::Pf0), 0x1),
                        1 => (gtia.playfield_color(PlayfieldColor::Pf1), 0x2),
                        2 => (gtia.playfield_color(PlayfieldColor::Pf2), 0x4),
                        _ => (gtia.playfield_color(PlayfieldColor::Pf3), 0x8),
                    },
                    _ => {
                        if value != 0 {
                            (gtia.playfield_color(PlayfieldColor::Pf2), 0x4)
                        } else {
                            (gtia.playfield_color(PlayfieldColor::Background), 0x0)
                        }
                    }
                };

                let out_idx = col * pixels_per_byte + p;
                if out_idx < pixels.len() {
                    pixels[out_idx] = color;
                    let screen_col = (start + out_idx).min(pf_bits.len() - 1);
                    pf_bits[screen_col] = bit;
                }
            }
        }

        composite_players_missiles(gtia, &mut pixels, &pf_bits, start, span);

        if let Some(row) = row {
            let base = row * FRAME_WIDTH;
            let bg = gtia.playfield_color(PlayfieldColor::Background);
            self.framebuffer[base..base + FRAME_WIDTH].fill(bg);
            self.framebuffer[base + start..base + start + span].copy_from_slice(&pixels[..span]);
        }
    }

    /// Step 5: release WSYNC, advance the scanline counter, wrap the
    /// frame and re-arm the display list at frame end.
    pub fn advance_scanline(&mut self) {
        self.wsync_halted = false;
        self.scanline += 1;
        if self.scanline >= self.frame_scanlines {
            self.scanline = 0;
            self.dl_pc = self.dlist();
            self.in_display_list = true;
            self.mode_lines_remaining = 0;
            if self.nmien & nmibits::VBI != 0 {
                self.nmist |= nmibits::VBI;
            }
        }
    }
}

mod gractlbits {
    pub const MISSILES: u8 = 1 << 0;
    pub const PLAYERS: u8 = 1 << 1;
}

fn pm_pixel_width(size: u8) -> usize {
    match size & 0x03 {
        0b01 => 2,
        0b11 => 4,
        _ => 1,
    }
}

/// Draw players/missiles over the playfield pixels just rasterised, and
/// note every collision against the playfield or another object. HPOSx
/// is treated as a direct screen column rather than a colour-clock
/// compare value — not cycle-exact, but `pixels`/`pf_bits` already index
/// by screen column so this keeps positioning and collisions consistent
/// with each other.
fn composite_players_missiles(gtia: &mut Gtia, pixels: &mut [u8; FRAME_WIDTH], pf_bits: &[u8; FRAME_WIDTH], start: usize, span: usize) {
    let mut obj_bits = [0u8; FRAME_WIDTH];
    let in_visible = |col: usize| col >= start && col < start + span;

    if gtia.gractl & gractlbits::MISSILES != 0 {
        for m in 0..4 {
            let width = pm_pixel_width(gtia.sizem >> (m * 2));
            let base_col = gtia.hposm[m] as usize;
            let bits = (gtia.grafm >> (m * 2)) & 0x03;
            for bitpos in 0..2 {
                if bits & (1 << (1 - bitpos)) == 0 {
                    continue;
                }
                for w in 0..width {
                    let col = base_col + bitpos * width + w;
                    if !in_visible(col) {
                        continue;
                    }
                    let pf = pf_bits[col];
                    if pf != 0 {
                        gtia.note_missile_playfield(m, pf);
                    }
                    for other in 0..4 {
                        if obj_bits[col] & (1 << (4 + other)) != 0 {
                            gtia.note_missile_player(m, 1 << other);
                        }
                    }
                    obj_bits[col] |= 1 << m;
                    pixels[col - start] = gtia.colpm[m];
                }
            }
        }
    }

    if gtia.gractl & gractlbits::PLAYERS != 0 {
        for p in 0..4 {
            let width = pm_pixel_width(gtia.sizep[p]);
            let base_col = gtia.hposp[p] as usize;
            let data = gtia.grafp[p];
            for bit in 0..8 {
                if data & (1 << (7 - bit)) == 0 {
                    continue;
                }
                for w in 0..width {
                    let col = base_col + bit * width + w;
                    if !in_visible(col) {
                        continue;
                    }
                    let pf = pf_bits[col];
                    if pf != 0 {
                        gtia.note_player_playfield(p, pf);
                    }
                    for other in 0..4 {
                        if other != p && obj_bits[col] & (1 << (4 + other)) != 0 {
                            gtia.note_player_player(p, 1 << other);
                        }
                    }
                    obj_bits[col] |= 1 << (4 + p);
                    pixels[col - start] = gtia.colpm[p];
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gtia::TvSystem;

    fn make_ram() -> Vec<u8> {
        vec![0u8; 0x10000]
    }

    #[test]
    fn dli_request_sets_nmist_and_is_consumed_once() {
        let mut antic = Antic::new(262);
        antic.nmien = nmibits::DLI;
        antic.current_mode = 0x02;
        antic.nmist = nmibits::DLI;
        let mut cpu = Mos6502::new();
        antic.check_pending_nmi(&mut cpu);
        assert_eq!(antic.nmist & nmibits::DLI, 0);
    }

    #[test]
    fn dli_fires_when_a_mode_row_with_the_dli_bit_finishes() {
        let mut ram = make_ram();
        // Mode 2 (text, 8 scanlines) with the DLI bit (0x80) set, LMS
        // pointing its data at $3000.
        ram[0x2000] = 0x82 | 0x40;
        ram[0x2001] = 0x00;
        ram[0x2002] = 0x30;

        let mut antic = Antic::new(262);
        antic.dmactl = dmactlbits::DL_ENABLE | 0x02;
        antic.nmien = nmibits::DLI;
        antic.dlistl = 0x00;
        antic.dlisth = 0x20;
        antic.scanline = 100;
        antic.dl_pc = 0x2000;

        let mut gtia = Gtia::new(TvSystem::Ntsc);
        for _ in 0..8 {
            antic.render_scanline(&ram, &mut gtia);
            antic.scanline += 1;
        }
        assert_eq!(antic.nmist & nmibits::DLI, nmibits::DLI, "DLI should fire once the mode row's 8 scanlines are exhausted");
    }

    #[test]
    fn s4_display_list_jump_sets_vbi_on_jvb() {
        let mut ram = make_ram();
        // JVB ($41) pointing back at itself, at $2000.
        ram[0x2000] = 0x41;
        ram[0x2001] = 0x00;
        ram[0x2002] = 0x20;

        let mut antic = Antic::new(262);
        antic.dmactl = dmactlbits::DL_ENABLE | 0x02;
        antic.nmien = nmibits::VBI;
        antic.dlistl = 0x00;
        antic.dlisth = 0x20;
        antic.scanline = 100; // well outside vblank
        antic.dl_pc = 0x2000;

        let mut gtia = Gtia::new(TvSystem::Ntsc);
        antic.render_scanline(&ram, &mut gtia);
        assert_eq!(antic.nmist & nmibits::VBI, nmibits::VBI);
        assert_eq!(antic.dl_pc, 0x2000);
    }

    #[test]
    fn s3_wsync_halts_until_released() {
        let mut antic = Antic::new(262);
        let halted = antic.write(reg::WSYNC, 0);
        assert!(halted);
        assert!(antic.wsync_halted());
        antic.advance_scanline();
        assert!(!antic.wsync_halted());
    }

    #[test]
    fn vblank_scanlines_skip_display_list_decode() {
        let mut antic = Antic::new(262);
        antic.dmactl = dmactlbits::DL_ENABLE | 0x02;
        antic.scanline = 0; // inside vblank region
        antic.dl_pc = 0x3000;
        let ram = make_ram();
        let mut gtia = Gtia::new(TvSystem::Ntsc);
        antic.render_scanline(&ram, &mut gtia);
        assert_eq!(antic.dl_pc, 0x3000);
    }

    #[test]
    fn player_rendered_over_playfield_registers_a_collision() {
        let mut ram = make_ram();
        // Mode 2 text row, character code 0 (blank glyph, all-zero font
        // byte) so the background colour fills the row under the player.
        ram[0x2000] = 0x42;
        ram[0x2001] = 0x00;
        ram[0x2002] = 0x30;
        ram[0x3000] = 0x00; // blank char code -> PF2 foreground everywhere it's set, 0 here means no set bits -> background

        let mut antic = Antic::new(262);
        antic.dmactl = dmactlbits::DL_ENABLE | 0x02;
        antic.dlistl = 0x00;
        antic.dlisth = 0x20;
        antic.scanline = 100;
        antic.dl_pc = 0x2000;

        let mut gtia = Gtia::new(TvSystem::Ntsc);
        gtia.gractl = 0b10; // players enabled
        gtia.hposp[0] = 50;
        gtia.sizep[0] = 0; // normal width
        gtia.grafp[0] = 0xFF;
        gtia.colpm[0] = 0x20;
        gtia.colpf[2] = 0x40; // PF2, the "set bit" colour for character mode

        antic.render_scanline(&ram, &mut gtia);

        let row = (antic.scanline() - antic.vblank_start) as usize;
        let base = row * FRAME_WIDTH;
        assert_eq!(antic.framebuffer[base + 50], 0x20, "player 0 should paint over the playfield at its HPOSP0 column");
    }

    #[test]
    fn frame_wraps_and_reloads_display_list() {
        let mut antic = Antic::new(4);
        antic.dlistl = 0x34;
        antic.dlisth = 0x12;
        antic.scanline = 3;
        antic.advance_scanline();
        assert_eq!(antic.scanline(), 0);
        assert_eq!(antic.dl_pc, 0x1234);
    }
}
