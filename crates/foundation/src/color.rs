//! Deterministic per-entity colors.

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

pub const OWNER_SATURATION: f64 = 0.55;
pub const OWNER_LIGHTNESS: f64 = 0.50;

/// 32-bit FNV-1a over the UTF-8 bytes of `key`.
pub fn fnv1a32(key: &str) -> u32 {
    key.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

/// HSL (hue in degrees, saturation and lightness in `[0, 1]`) to 8-bit RGB.
pub fn hsl_to_rgb(hue: f64, saturation: f64, lightness: f64) -> [u8; 3] {
    let h = hue.rem_euclid(360.0);
    let s = saturation.clamp(0.0, 1.0);
    let l = lightness.clamp(0.0, 1.0);

    let chroma = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let sector = h / 60.0;
    let x = chroma * (1.0 - (sector.rem_euclid(2.0) - 1.0).abs());
    let m = l - chroma / 2.0;

    let (r, g, b) = match sector as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };

    let to_byte = |v: f64| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    [to_byte(r), to_byte(g), to_byte(b)]
}

/// Stable `#rrggbb` color for a canonical entity key.
pub fn color_from_key(key: &str) -> String {
    let hue = f64::from(fnv1a32(key) % 360);
    let [r, g, b] = hsl_to_rgb(hue, OWNER_SATURATION, OWNER_LIGHTNESS);
    format!("#{r:02x}{g:02x}{b:02x}")
}
