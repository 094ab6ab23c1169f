// ============================================================================
// Layer compositing — "over" blending of straight-alpha RGBA8 layers
// ============================================================================

use image::{Rgba, RgbaImage};
use rayon::prelude::*;

/// Blend `top` over `base` with normal "over" compositing (straight alpha).
#[inline]
pub fn blend_over(base: Rgba<u8>, top: Rgba<u8>) -> Rgba<u8> {
    // Fully transparent top: nothing to blend
    if top[3] == 0 {
        return base;
    }
    // Fully opaque top: overwrite
    if top[3] == 255 {
        return top;
    }

    let top_a = top[3] as f32 / 255.0;
    let base_a = base[3] as f32 / 255.0;
    let out_a = top_a + base_a * (1.0 - top_a);
    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let mut out = [0u8; 4];
    for c in 0..3 {
        let t = top[c] as f32 / 255.0;
        let b = base[c] as f32 / 255.0;
        let v = (t * top_a + b * base_a * (1.0 - top_a)) / out_a;
        out[c] = (v * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba(out)
}

/// Draw `top` onto `dest` anchored at the origin.
///
/// Only the overlapping rectangle is touched: pixels of `top` beyond the
/// bounds of `dest` are dropped. Rows are blended in parallel.
pub fn draw_over(dest: &mut RgbaImage, top: &RgbaImage) {
    let w = dest.width().min(top.width()) as usize;
    let h = dest.height().min(top.height()) as usize;
    if w == 0 || h == 0 {
        return;
    }
    let dest_stride = dest.width() as usize * 4;
    let top_stride = top.width() as usize * 4;
    let top_raw = top.as_raw();

    dest.par_chunks_mut(dest_stride)
        .take(h)
        .enumerate()
        .for_each(|(y, row)| {
            let src = &top_raw[y * top_stride..y * top_stride + w * 4];
            for (d, s) in row[..w * 4].chunks_exact_mut(4).zip(src.chunks_exact(4)) {
                let blended = blend_over(Rgba([d[0], d[1], d[2], d[3]]), Rgba([s[0], s[1], s[2], s[3]]));
                d.copy_from_slice(&blended.0);
            }
        });
}

/// Copy `base` and draw `top` over the copy. Neither input is modified.
pub fn composite_over(base: &RgbaImage, top: &RgbaImage) -> RgbaImage {
    let mut out = base.clone();
    draw_over(&mut out, top);
    out
}
