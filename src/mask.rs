//! Mask layer interpretation.
//!
//! The mask is authored as a regular RGBA layer. A pixel selects the region
//! to fill when it is visible (alpha > 0) and carries some colour; both
//! transparent pixels and all-zero pixels leave the photo untouched. This
//! covers painted-on-transparent masks as well as black/white mask exports.

use image::{GrayImage, Rgba, RgbaImage};
use rayon::prelude::*;

/// Value written into a [`GrayImage`] hole mask for selected pixels.
pub const HOLE: u8 = 255;

#[inline]
pub fn is_selected(p: &Rgba<u8>) -> bool {
    p.0[3] > 0 && (p.0[0] | p.0[1] | p.0[2]) > 0
}

/// Binary hole mask: [`HOLE`] where the pixel is selected, 0 elsewhere.
pub fn hole_mask(mask: &RgbaImage) -> GrayImage {
    let (w, h) = mask.dimensions();
    let mut out = GrayImage::new(w, h);
    if w == 0 || h == 0 {
        return out;
    }
    let row_len = w as usize;
    out.par_chunks_mut(row_len)
        .zip(mask.par_chunks(row_len * 4))
        .for_each(|(dst, src)| {
            for (d, s) in dst.iter_mut().zip(src.chunks_exact(4)) {
                let px = Rgba([s[0], s[1], s[2], s[3]]);
                *d = if is_selected(&px) { HOLE } else { 0 };
            }
        });
    out
}

/// Number of selected pixels.
pub fn selected_pixel_count(mask: &RgbaImage) -> usize {
    mask.pixels().filter(|p| is_selected(p)).count()
}

/// True when the mask selects nothing, so inpainting leaves the photo as is.
pub fn is_empty(mask: &RgbaImage) -> bool {
    !mask.pixels().any(is_selected)
}
