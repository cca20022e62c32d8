//! POKEY: four-channel audio, keyboard latch, and two IRQ sources.
//!
//! Channel dividers follow the same state-machine shape as the
//! reference CIA timer (countdown register reloaded from a latch on
//! underflow); IRQST/IRQEN follow the reference CIA's active-flags /
//! mask split, except POKEY's status register is active-low rather
//! than active-high.

pub mod poly;

use poly::Poly;

const NUM_CHANNELS: usize = 4;
const BASE_CLOCK_HZ: f64 = 1_789_790.0;

/// Register offsets (address & 0x0F).
pub mod reg {
    pub const AUDF1: u8 = 0x00;
    pub const AUDC1: u8 = 0x01;
    pub const AUDF2: u8 = 0x02;
    pub const AUDC2: u8 = 0x03;
    pub const AUDF3: u8 = 0x04;
    pub const AUDC3: u8 = 0x05;
    pub const AUDF4: u8 = 0x06;
    pub const AUDC4: u8 = 0x07;
    pub const AUDCTL: u8 = 0x08;
    pub const STIMER: u8 = 0x09;
    pub const SKREST: u8 = 0x0A;
    pub const POTGO: u8 = 0x0B;
    pub const SEROUT: u8 = 0x0D;
    pub const IRQEN: u8 = 0x0E;
    pub const SKCTL: u8 = 0x0F;

    // Read-side aliases sharing the same offsets.
    pub const POT0: u8 = 0x00;
    pub const ALLPOT: u8 = 0x08;
    pub const KBCODE: u8 = 0x09;
    pub const RANDOM: u8 = 0x0A;
    pub const SERIN: u8 = 0x0D;
    pub const IRQST: u8 = 0x0E;
    pub const SKSTAT: u8 = 0x0F;
}

/// IRQEN/IRQST bit positions.
pub mod irqbits {
    pub const TIMER1: u8 = 1 << 0;
    pub const TIMER2: u8 = 1 << 1;
    pub const TIMER4: u8 = 1 << 2;
    pub const SEROUT: u8 = 1 << 3;
    pub const SERIN: u8 = 1 << 4;
    pub const SEROC: u8 = 1 << 5;
    pub const KEY: u8 = 1 << 6;
    pub const BREAK: u8 = 1 << 7;
}

mod skstatbits {
    pub const KEY_DOWN: u8 = 1 << 2;
}

#[derive(Default, Clone, Copy)]
struct Channel {
    audf: u8,
    audc: u8,
    divider: i32,
    output: bool,
}

pub struct Pokey {
    channels: [Channel; NUM_CHANNELS],
    audctl: u8,

    poly4: Poly,
    poly5: Poly,
    poly9: Poly,
    poly17: Poly,

    irqen: u8,
    irqst: u8,
    skctl: u8,
    kbcode: u8,
    key_down: bool,

    /// High-pass filter memory for channels 1/2.
    hpf_last: [bool; 2],

    sample_rate: u32,
}

impl Pokey {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            channels: [Channel::default(); NUM_CHANNELS],
            audctl: 0,
            poly4: Poly::poly4(),
            poly5: Poly::poly5(),
            poly9: Poly::poly9(),
            poly17: Poly::poly17(),
            irqen: 0,
            irqst: 0xFF,
            skctl: 0,
            kbcode: 0,
            key_down: false,
            hpf_last: [false; 2],
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn reset(&mut self) {
        let sample_rate = self.sample_rate;
        *self = Self::new(sample_rate);
    }

    pub fn read(&mut self, addr: u8) -> u8 {
        match addr & 0x0F {
            reg::ALLPOT => 0x00,
            reg::KBCODE => self.kbcode,
            reg::RANDOM => self.random_value(),
            reg::IRQST => self.irqst,
            reg::SKSTAT => {
                if self.key_down {
                    0xFF & !skstatbits::KEY_DOWN
                } else {
                    0xFF
                }
            }
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u8, value: u8) {
        match addr & 0x0F {
            reg::AUDF1 => self.channels[0].audf = value,
            reg::AUDC1 => self.channels[0].audc = value,
            reg::AUDF2 => self.channels[1].audf = value,
            reg::AUDC2 => self.channels[1].audc = value,
            reg::AUDF3 => self.channels[2].audf = value,
            reg::AUDC3 => self.channels[2].audc = value,
            reg::AUDF4 => self.channels[3].audf = value,
            reg::AUDC4 => self.channels[3].audc = value,
            reg::AUDCTL => self.audctl = value,
            reg::STIMER => {
                for ch in &mut self.channels {
                    ch.divider = 0;
                }
            }
            reg::SKREST => {
                self.irqst |= irqbits::BREAK;
            }
            reg::IRQEN => {
                // Acknowledge sources whose enable bit is newly zero.
                let newly_acked = self.irqen & !value;
                self.irqst |= newly_acked;
                self.irqen = value;
            }
            reg::SKCTL => self.skctl = value,
            _ => {}
        }
    }

    /// `check_irq`: true iff any enabled source is asserting.
    pub fn check_irq(&self) -> bool {
        (self.irqst & self.irqen) != self.irqen
    }

    /// Deliver a keyboard transition from the input source (§4.D).
    pub fn set_key(&mut self, keycode: u8, pressed: bool) {
        self.key_down = pressed;
        if pressed {
            self.kbcode = keycode & 0x3F | (keycode & 0xC0);
            if self.irqen & irqbits::KEY != 0 {
                self.irqst &= !irqbits::KEY;
            }
        } else {
            // Release re-raises the bit (active-low: set = not asserting).
            self.irqst |= irqbits::KEY;
        }
    }

    pub fn set_break_key(&mut self, pressed: bool) {
        if pressed && self.irqen & irqbits::BREAK != 0 {
            self.irqst &= !irqbits::BREAK;
        } else if !pressed {
            self.irqst |= irqbits::BREAK;
        }
    }

    fn random_value(&self) -> u8 {
        // Nonlinear function of the active long poly, per §4.D.
        let long = if self.audctl & 0x80 != 0 { self.poly9.output() } else { self.poly17.output() };
        let fast = self.poly5.output();
        let mut v = 0u8;
        for shift in 0..8u32 {
            let bit = long ^ fast ^ (shift % 2 == 0);
            v |= (bit as u8) << shift;
        }
        v
    }

    fn base_period(&self, fast_clock_bit: bool) -> (f64, f64) {
        // Returns (divisor for base-clock mode, divisor for fast-clock mode).
        let base_divisor = if self.audctl & 0x01 != 0 { BASE_CLOCK_HZ / 15_000.0 } else { BASE_CLOCK_HZ / 64_000.0 };
        let _ = fast_clock_bit;
        (base_divisor, 1.0)
    }

    fn channel_period_cycles(&self, idx: usize) -> f64 {
        let fast_bit = match idx {
            0 => self.audctl & 0x40 != 0,
            2 => self.audctl & 0x20 != 0,
            _ => false,
        };
        let joined_low = match idx {
            1 => self.audctl & 0x10 != 0, // ch1+2 joined, ch2 uses 16-bit freq
            3 => self.audctl & 0x08 != 0, // ch3+4 joined
            _ => false,
        };

        if joined_low {
            let lower = idx - 1;
            let freq16 = (self.channels[idx].audf as u32) << 8 | self.channels[lower].audf as u32;
            return (freq16 as f64 + 1.0) * self.base_period(false).0;
        }

        if fast_bit {
            self.channels[idx].audf as f64 + 4.0
        } else {
            let (base_divisor, _) = self.base_period(false);
            (self.channels[idx].audf as f64 + 1.0) * base_divisor
        }
    }

    fn distortion_bit(&self, idx: usize) -> bool {
        let audc = self.channels[idx].audc;
        let dist = (audc >> 5) & 0x07;
        let poly5 = self.poly5.output();
        let long = if self.audctl & 0x80 != 0 { self.poly9.output() } else { self.poly17.output() };
        match dist {
            0 => poly5 && long,
            1 => poly5,
            2 => poly5 && self.poly4.output(),
            3 => poly5,
            4 => long,
            5 => true,
            6 => self.poly4.output(),
            7 => true,
            _ => unreachable!(),
        }
    }

    /// Step the chip's free-running polynomials by one POKEY clock tick.
    fn step_polys(&mut self) {
        self.poly4.step();
        self.poly5.step();
        self.poly9.step();
        self.poly17.step();
    }

    /// Generate `count` audio samples (§4.D algorithm). Returns the mixed,
    /// clamped int16 samples.
    pub fn generate_samples(&mut self, count: usize) -> Vec<i16> {
        let mut out = Vec::with_capacity(count);
        let polys_per_sample = (BASE_CLOCK_HZ / self.sample_rate as f64).max(1.0) as u32;

        for _ in 0..count {
            for _ in 0..polys_per_sample {
                self.step_polys();
                for idx in 0..NUM_CHANNELS {
                    let period = self.channel_period_cycles(idx).max(1.0);
                    self.channels[idx].divider -= 1;
                    if self.channels[idx].divider <= 0 {
                        self.channels[idx].output = !self.channels[idx].output;
                        self.channels[idx].divider = period as i32;
                    }
                }
            }
            out.push(self.mix_sample());
        }
        out
    }

    fn mix_sample(&mut self) -> i16 {
        let mut sum: i32 = 0;
        for idx in 0..NUM_CHANNELS {
            let audc = self.channels[idx].audc;
            let volume = (audc & 0x0F) as i32;
            let volume_only = audc & 0x10 != 0;

            let level = if volume_only {
                volume * 2048
            } else if self.distortion_bit(idx) == self.channels[idx].output {
                volume * 2048
            } else {
                0
            };

            let level = if idx < 2 && self.audctl & (0x04 >> idx) != 0 {
                self.high_pass(idx, level)
            } else {
                level
            };

            sum += level;
        }
        sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16
    }

    fn high_pass(&mut self, idx: usize, level: i32) -> i32 {
        let current = level != 0;
        let filtered = current != self.hpf_last[idx];
        self.hpf_last[idx] = current;
        if filtered {
            level
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s6_keyboard_irq() {
        let mut pokey = Pokey::new(44_100);
        pokey.write(reg::IRQEN, irqbits::KEY);
        pokey.set_key(0x3F, true);
        assert_eq!(pokey.irqst & irqbits::KEY, 0);
        assert_eq!(pokey.kbcode, 0x3F);
        assert!(pokey.check_irq());
    }

    #[test]
    fn key_release_reraises_bit() {
        let mut pokey = Pokey::new(44_100);
        pokey.write(reg::IRQEN, irqbits::KEY);
        pokey.set_key(0x01, true);
        pokey.set_key(0x01, false);
        assert_eq!(pokey.irqst & irqbits::KEY, irqbits::KEY);
        assert!(!pokey.check_irq());
    }

    #[test]
    fn writing_irqen_acks_newly_cleared_bits() {
        let mut pokey = Pokey::new(44_100);
        pokey.irqst = 0x00; // all asserting
        pokey.write(reg::IRQEN, 0xFF);
        pokey.write(reg::IRQEN, 0x00);
        assert_eq!(pokey.irqst, 0xFF);
    }

    #[test]
    fn skstat_reflects_key_down_without_touching_irqst() {
        let mut pokey = Pokey::new(44_100);
        pokey.irqst &= !irqbits::TIMER4; // pretend TIMER4 is already asserting
        pokey.set_key(0x3F, true);
        assert_eq!(pokey.read(reg::SKSTAT) & skstatbits::KEY_DOWN, 0, "SKSTAT bit 2 should clear while a key is down");
        assert_eq!(pokey.irqst & irqbits::TIMER4, 0, "an unrelated IRQ status bit must not be touched by a keypress");

        pokey.set_key(0x3F, false);
        assert_eq!(pokey.read(reg::SKSTAT) & skstatbits::KEY_DOWN, skstatbits::KEY_DOWN, "SKSTAT bit 2 should be set (inactive) once the key is released");
    }

    #[test]
    fn sample_count_matches_budget() {
        let mut pokey = Pokey::new(44_100);
        let samples = pokey.generate_samples(882);
        assert_eq!(samples.len(), 882);
    }
}
