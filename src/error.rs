//! Typed error kinds for the core (§7).
//!
//! The reference core never reaches for `thiserror` — its ROM loader
//! and SID-header parser both return plain `io::Error` / `Result<T,
//! String>` — so this follows the same low-ceremony convention: one
//! enum, a hand-written `Display`, no new macro dependency.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AtariError {
    /// ROM is the wrong size, or its embedded reset vector is out of range.
    InvalidRom { detail: String },
    /// XEX/ATR parsing failure; emulator state is left untouched.
    FileFormat { detail: String },
    /// CPU executed an unrecognised opcode.
    CpuHalt { pc: u16, opcode: u8 },
    /// A display/audio sink refused a submission; the frame was dropped.
    ExternalSinkOverflow { sink: &'static str },
    /// Out-of-range keycode or joystick port; the call was ignored.
    InputInvalid { detail: String },
}

impl fmt::Display for AtariError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtariError::InvalidRom { detail } => write!(f, "invalid ROM image: {detail}"),
            AtariError::FileFormat { detail } => write!(f, "file format error: {detail}"),
            AtariError::CpuHalt { pc, opcode } => {
                write!(f, "CPU halted on opcode ${opcode:02X} at ${pc:04X}")
            }
            AtariError::ExternalSinkOverflow { sink } => write!(f, "{sink} sink overflowed, frame dropped"),
            AtariError::InputInvalid { detail } => write!(f, "invalid input: {detail}"),
        }
    }
}

impl std::error::Error for AtariError {}
