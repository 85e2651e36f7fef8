use rayon::prelude::*;

use crate::grid::Grid;

// Heat palette, low to high
const HEAT_NONE: [u8; 4] = [24, 28, 40, 255];
const HEAT_LOW: [u8; 4] = [40, 70, 140, 255];
const HEAT_MID: [u8; 4] = [60, 170, 120, 255];
const HEAT_HIGH: [u8; 4] = [235, 200, 60, 255];
const HEAT_PEAK: [u8; 4] = [215, 50, 40, 255];
const UNDEFINED: [u8; 4] = [0, 0, 0, 0];

/// Linear blend of two palette stops; output is always opaque.
#[inline]
fn lerp_color(a: [u8; 4], b: [u8; 4], t: f32) -> [u8; 4] {
    let t = t.clamp(0.0, 1.0);
    [
        (a[0] as f32 + (b[0] as f32 - a[0] as f32) * t).round() as u8,
        (a[1] as f32 + (b[1] as f32 - a[1] as f32) * t).round() as u8,
        (a[2] as f32 + (b[2] as f32 - a[2] as f32) * t).round() as u8,
        255,
    ]
}

#[inline]
fn heat(t: f32) -> [u8; 4] {
    if t <= 0.0 {
        HEAT_NONE
    } else if t < 0.25 {
        lerp_color(HEAT_NONE, HEAT_LOW, t / 0.25)
    } else if t < 0.5 {
        lerp_color(HEAT_LOW, HEAT_MID, (t - 0.25) / 0.25)
    } else if t < 0.75 {
        lerp_color(HEAT_MID, HEAT_HIGH, (t - 0.5) / 0.25)
    } else {
        lerp_color(HEAT_HIGH, HEAT_PEAK, (t - 0.75) / 0.25)
    }
}

/// Heatmap of a numeric attribute grid, `scale` pixels per cell.
/// Values are normalized to the finite min..max; NaN cells are transparent.
/// Output is RGBA, `(w * scale) x (h * scale)`.
pub fn render_attribute(values: &Grid<f64>, scale: usize) -> Vec<u8> {
    let scale = scale.max(1);
    let (min_v, max_v) = values
        .data
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let range = if max_v > min_v { max_v - min_v } else { 1.0 };

    let dw = values.w * scale;
    let mut rgba = vec![0u8; dw * values.h * scale * 4];

    rgba.par_chunks_mut(dw * 4).enumerate().for_each(|(py, row)| {
        let y = py / scale;
        for px in 0..dw {
            let v = *values.get(px / scale, y);
            let color = if v.is_finite() {
                heat(((v - min_v) / range) as f32)
            } else {
                UNDEFINED
            };
            row[px * 4..px * 4 + 4].copy_from_slice(&color);
        }
    });

    rgba
}
