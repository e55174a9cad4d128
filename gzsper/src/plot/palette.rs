use plotters::style::{Color, HSLColor, RGBColor};

/// qualitative colours for up to 20 categories
const DEFAULT_20: [(u8, u8, u8); 20] = [
    (0x1f, 0x77, 0xb4),
    (0xff, 0x7f, 0x0e),
    (0x27, 0x9e, 0x68),
    (0xd6, 0x27, 0x28),
    (0xaa, 0x40, 0xfc),
    (0x8c, 0x56, 0x4b),
    (0xe3, 0x77, 0xc2),
    (0xb5, 0xbd, 0x61),
    (0x17, 0xbe, 0xcf),
    (0xae, 0xc7, 0xe8),
    (0xff, 0xbb, 0x78),
    (0x98, 0xdf, 0x8a),
    (0xff, 0x98, 0x96),
    (0xc5, 0xb0, 0xd5),
    (0xc4, 0x9c, 0x94),
    (0xf7, 0xb6, 0xd2),
    (0xdb, 0xdb, 0x8d),
    (0x9e, 0xda, 0xe5),
    (0xad, 0x49, 0x4a),
    (0x8c, 0x6d, 0x31),
];

const VIRIDIS: [(u8, u8, u8); 9] = [
    (68, 1, 84),
    (71, 44, 122),
    (59, 81, 139),
    (44, 113, 142),
    (33, 144, 141),
    (39, 173, 129),
    (92, 200, 99),
    (170, 220, 50),
    (253, 231, 37),
];

const REDS: [(u8, u8, u8); 9] = [
    (255, 245, 240),
    (254, 224, 210),
    (252, 187, 161),
    (252, 146, 114),
    (251, 106, 74),
    (239, 59, 44),
    (203, 24, 29),
    (165, 15, 21),
    (103, 0, 13),
];

/// colour of cells without a category
pub const MISSING_COLOR: RGBColor = RGBColor(211, 211, 211);

/// One colour per category; evenly spaced hues beyond 20 categories
pub fn categorical_palette(ncat: usize) -> Vec<RGBColor> {
    if ncat <= DEFAULT_20.len() {
        return DEFAULT_20[..ncat]
            .iter()
            .map(|&(r, g, b)| RGBColor(r, g, b))
            .collect();
    }
    (0..ncat)
        .map(|k| {
            let (r, g, b) = HSLColor(k as f64 / ncat as f64, 0.65, 0.5).rgb();
            RGBColor(r, g, b)
        })
        .collect()
}

fn interpolate(anchors: &[(u8, u8, u8)], t: f64) -> RGBColor {
    let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
    let pos = t * (anchors.len() - 1) as f64;
    let k = (pos.floor() as usize).min(anchors.len() - 2);
    let f = pos - k as f64;
    let (r0, g0, b0) = anchors[k];
    let (r1, g1, b1) = anchors[k + 1];
    let mix = |x: u8, y: u8| (x as f64 + (y as f64 - x as f64) * f).round() as u8;
    RGBColor(mix(r0, r1), mix(g0, g1), mix(b0, b1))
}

/// viridis colour of `t` in `[0, 1]`
pub fn viridis(t: f64) -> RGBColor {
    interpolate(&VIRIDIS, t)
}

/// sequential red colour of `t` in `[0, 1]`
pub fn reds(t: f64) -> RGBColor {
    interpolate(&REDS, t)
}
