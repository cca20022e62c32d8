//! GTIA colour palette generation.
//!
//! The hardware colour code is a byte `(hue:4, luma:4)`. We generate the
//! 256-entry table once at construction from an HSL model with a
//! system-dependent hue phase offset, matching the reference VIC-II
//! module's pattern of deriving all per-model timing from one small
//! `MODEL_DATA`-style table rather than hand-writing 256 RGB triples.

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TvSystem {
    Pal,
    Ntsc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Hue phase offset in degrees and saturation, per system.
fn model_params(system: TvSystem) -> (f64, f64) {
    match system {
        TvSystem::Pal => (-15.0, 0.35),
        TvSystem::Ntsc => (0.0, 0.35),
    }
}

pub fn build(system: TvSystem) -> [Rgb; 256] {
    let (phase_offset, saturation) = model_params(system);
    let mut table = [Rgb { r: 0, g: 0, b: 0 }; 256];
    for code in 0..256usize {
        let hue = ((code >> 4) & 0x0F) as f64;
        let luma = (code & 0x0F) as f64;
        let lightness = luma / 15.0;
        let sat = if hue == 0.0 { 0.0 } else { saturation };
        let hue_deg = (hue - 1.0) * (360.0 / 15.0) + phase_offset;
        table[code] = hsl_to_rgb(hue_deg, sat, lightness);
    }
    table
}

fn hsl_to_rgb(hue_deg: f64, sat: f64, lightness: f64) -> Rgb {
    if sat == 0.0 {
        let v = (lightness * 255.0).round().clamp(0.0, 255.0) as u8;
        return Rgb { r: v, g: v, b: v };
    }
    let hue = ((hue_deg % 360.0) + 360.0) % 360.0 / 360.0;
    let q = if lightness < 0.5 {
        lightness * (1.0 + sat)
    } else {
        lightness + sat - lightness * sat
    };
    let p = 2.0 * lightness - q;
    let r = hue_to_channel(p, q, hue + 1.0 / 3.0);
    let g = hue_to_channel(p, q, hue);
    let b = hue_to_channel(p, q, hue - 1.0 / 3.0);
    Rgb {
        r: (r * 255.0).round().clamp(0.0, 255.0) as u8,
        g: (g * 255.0).round().clamp(0.0, 255.0) as u8,
        b: (b * 255.0).round().clamp(0.0, 255.0) as u8,
    }
}

fn hue_to_channel(p: f64, q: f64, mut t: f64) -> f64 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 1.0 / 2.0 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn luma_zero_is_black_regardless_of_hue() {
        let table = build(TvSystem::Ntsc);
        for hue in 0..16usize {
            let code = (hue << 4) as usize;
            assert_eq!(table[code], Rgb { r: 0, g: 0, b: 0 });
        }
    }

    #[test]
    fn pal_and_ntsc_tables_differ() {
        let pal = build(TvSystem::Pal);
        let ntsc = build(TvSystem::Ntsc);
        assert!(pal.iter().zip(ntsc.iter()).any(|(a, b)| a != b));
    }
}
