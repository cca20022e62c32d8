//! External collaborator traits (§6): display, audio, and input.
//!
//! Each one maps to a driver interface the reference architecture
//! abstracts behind a trait (`SidChip` for the audio device, the
//! player thread's command/status channels for input) and is chosen
//! at start-up and moved into the top-level container — never touched
//! by chip code directly.

/// Presents a finished video frame. Width/height are whatever ANTIC's
/// framebuffer actually produced; implementations are expected to read
/// them back rather than assume a fixed 320x192 (an Open Question
/// resolved in DESIGN.md in favour of the frame size the scanline math
/// actually yields).
pub trait DisplaySink {
    fn present_bitmap(&mut self, width: usize, height: usize, palette_indexed: &[u8]);

    /// Optional: most implementations ignore this.
    fn present_border(&mut self, _palette_index: u8) {}
}

/// Receives mono PCM bursts, one per frame. Must drop on overflow,
/// never block — the core's own loop cannot stall on a slow sink.
pub trait AudioSink {
    fn push_samples(&mut self, samples: &[i16]) -> Result<(), crate::error::AtariError>;
}

/// Delivered to POKEY/PIA by whatever owns the keyboard/joystick
/// driver threads; see §6.3.
pub trait InputSource {
    fn set_key(&mut self, atari_keycode: u8, pressed: bool);
    fn set_break_key(&mut self, pressed: bool);
    fn set_console(&mut self, start: bool, select: bool, option: bool);
    fn set_joystick(&mut self, port: u8, up: bool, down: bool, left: bool, right: bool, fire: bool);
}

#[cfg(any(test, feature = "test-util"))]
pub mod testutil {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    pub struct NullDisplaySink {
        pub frames_presented: usize,
    }

    impl DisplaySink for NullDisplaySink {
        fn present_bitmap(&mut self, _width: usize, _height: usize, _palette_indexed: &[u8]) {
            self.frames_presented += 1;
        }
    }

    /// Records every burst it was handed, with a capacity cap standing
    /// in for the "drop on overflow" contract.
    pub struct RecordingAudioSink {
        pub bursts: Vec<Vec<i16>>,
        pub capacity: usize,
        pub dropped: usize,
    }

    impl RecordingAudioSink {
        pub fn new(capacity: usize) -> Self {
            Self { bursts: Vec::new(), capacity, dropped: 0 }
        }
    }

    impl AudioSink for RecordingAudioSink {
        fn push_samples(&mut self, samples: &[i16]) -> Result<(), crate::error::AtariError> {
            if self.bursts.len() >= self.capacity {
                self.dropped += 1;
                return Err(crate::error::AtariError::ExternalSinkOverflow { sink: "audio" });
            }
            self.bursts.push(samples.to_vec());
            Ok(())
        }
    }

    /// Plays back a fixed script of input events, one per call to
    /// `tick`, so integration tests can assert on deterministic timing.
    #[derive(Default)]
    pub struct ScriptedInputSource {
        pub key_events: Arc<Mutex<Vec<(u8, bool)>>>,
        pub break_events: Arc<Mutex<Vec<bool>>>,
        pub console_events: Arc<Mutex<Vec<(bool, bool, bool)>>>,
        pub joystick_events: Arc<Mutex<Vec<(u8, bool, bool, bool, bool, bool)>>>,
    }

    impl InputSource for ScriptedInputSource {
        fn set_key(&mut self, atari_keycode: u8, pressed: bool) {
            self.key_events.lock().unwrap().push((atari_keycode, pressed));
        }
        fn set_break_key(&mut self, pressed: bool) {
            self.break_events.lock().unwrap().push(pressed);
        }
        fn set_console(&mut self, start: bool, select: bool, option: bool) {
            self.console_events.lock().unwrap().push((start, select, option));
        }
        fn set_joystick(&mut self, port: u8, up: bool, down: bool, left: bool, right: bool, fire: bool) {
            self.joystick_events.lock().unwrap().push((port, up, down, left, right, fire));
        }
    }
}
