//! ROM search-path convenience, plus the XEX/ATR apply steps that are
//! allowed to mutate a running `AtariXl`.
//!
//! The search order is lifted straight from the reference `RomSet`
//! loader: an environment-variable override, `./roms`, the working
//! directory, then a platform data directory — just with
//! `ATARI_ROM_DIR` and `os`/`basic` in place of `C64_ROM_DIR` and
//! `kernal`/`basic`/`chargen`.

pub mod atr;
pub mod xex;

use std::path::{Path, PathBuf};
use std::{env, fs, io};

use log::info;

use crate::bus::Bank;
use crate::error::AtariError;
use crate::system::AtariXl;

pub struct RomSet {
    pub os: Vec<u8>,
    pub basic: Vec<u8>,
}

impl RomSet {
    pub fn load() -> io::Result<Self> {
        let dir = find_rom_dir()?;
        Self::load_from(&dir)
    }

    pub fn load_from<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        let dir = dir.as_ref();
        let os = load_rom(dir, "os", 0x4000)?;
        let basic = load_rom(dir, "basic", 0x2000)?;
        Ok(Self { os, basic })
    }
}

fn find_rom_dir() -> io::Result<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();

    if let Ok(val) = env::var("ATARI_ROM_DIR") {
        candidates.push(PathBuf::from(val));
    }
    if let Ok(cwd) = env::current_dir() {
        candidates.push(cwd.join("roms"));
        candidates.push(cwd.clone());
    }
    if let Some(home) = env::var_os("HOME").map(PathBuf::from) {
        candidates.push(home.join(".local").join("share").join("atari800").join("roms"));
    }
    candidates.push(PathBuf::from("/usr/share/atari800"));

    for dir in &candidates {
        if has_all_roms(dir) {
            return Ok(dir.clone());
        }
    }

    Err(io::Error::new(
        io::ErrorKind::NotFound,
        format!(
            "Atari ROM files not found. Searched:\n{}\n\
             Place os.bin/rom (16 KiB) and basic.bin/rom (8 KiB) in one of \
             those directories, or set the ATARI_ROM_DIR environment variable.",
            candidates.iter().map(|p| format!("  {}", p.display())).collect::<Vec<_>>().join("\n")
        ),
    ))
}

fn has_all_roms(dir: &Path) -> bool {
    ["os", "basic"].iter().all(|base| rom_path(dir, base).is_some())
}

fn rom_path(dir: &Path, base: &str) -> Option<PathBuf> {
    for ext in &["bin", "rom"] {
        let p = dir.join(format!("{base}.{ext}"));
        if p.is_file() {
            return Some(p);
        }
    }
    None
}

fn load_rom(dir: &Path, base: &str, expected_size: usize) -> io::Result<Vec<u8>> {
    let path = rom_path(dir, base)
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{}/{}.bin or .rom not found", dir.display(), base)))?;

    let data = fs::read(&path).map_err(|e| io::Error::new(e.kind(), format!("{}: {}", path.display(), e)))?;

    if data.len() != expected_size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{}: expected {} bytes, got {}", path.display(), expected_size, data.len()),
        ));
    }

    info!("loaded ROM: {}", path.display());
    Ok(data)
}

const INITAD: u16 = 0x02E2;
const RUNAD: u16 = 0x02E0;

/// Apply a parsed XEX file's segments to a running system, invoking
/// each segment's INITAD routine in turn and finally jumping to RUNAD.
pub fn apply_xex(system: &mut AtariXl, file: &xex::XexFile) -> Result<(), AtariError> {
    for seg in &file.segments {
        for (i, byte) in seg.data.iter().enumerate() {
            let addr = seg.start.wrapping_add(i as u16);
            system.bus.ram.poke(addr, *byte);
        }

        let lo = system.bus.ram_slice()[INITAD as usize] as u16;
        let hi = system.bus.ram_slice()[INITAD as usize + 1] as u16;
        let initad = (hi << 8) | lo;
        if initad != 0 {
            info!("running XEX INITAD routine at ${initad:04X}");
            system.run_init_routine(initad);
            system.bus.ram.poke(INITAD, 0);
            system.bus.ram.poke(INITAD + 1, 0);
        }
    }

    let lo = system.bus.ram_slice()[RUNAD as usize] as u16;
    let hi = system.bus.ram_slice()[RUNAD as usize + 1] as u16;
    system.cpu.pc = (hi << 8) | lo;
    Ok(())
}

/// Copy a raw binary image into RAM and jump to it directly (§6.4
/// `load_binary`), bypassing the XEX segment/INITAD machinery.
pub fn apply_binary(system: &mut AtariXl, bytes: &[u8], load_addr: u16) {
    for (i, byte) in bytes.iter().enumerate() {
        system.bus.ram.poke(load_addr.wrapping_add(i as u16), *byte);
    }
    system.cpu.pc = load_addr;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gtia::TvSystem;

    fn make_system() -> AtariXl {
        let mut os_rom = vec![0u8; 0x4000];
        os_rom[0x3FFC] = 0x00;
        os_rom[0x3FFD] = 0xC0;
        let basic_rom = vec![0u8; 0x2000];
        AtariXl::new(os_rom, basic_rom, TvSystem::Ntsc, 44_100).unwrap()
    }

    #[test]
    fn apply_binary_copies_and_jumps() {
        let mut system = make_system();
        apply_binary(&mut system, &[0xA9, 0x01], 0x2000);
        assert_eq!(system.bus.ram.peek(0x2000), 0xA9);
        assert_eq!(system.cpu.pc, 0x2000);
    }

    #[test]
    fn apply_xex_sets_runad() {
        let mut system = make_system();
        let mut bytes = vec![0xFF, 0xFF];
        bytes.extend_from_slice(&[0x00, 0x06, 0x01, 0x06]);
        bytes.extend_from_slice(&[0xA9, 0x01]);
        let file = xex::parse(&bytes).unwrap();

        system.bus.ram.poke(RUNAD, 0x00);
        system.bus.ram.poke(RUNAD + 1, 0x06);

        apply_xex(&mut system, &file).unwrap();
        assert_eq!(system.bus.ram.peek(0x0600), 0xA9);
        assert_eq!(system.cpu.pc, 0x0600);
    }
}
