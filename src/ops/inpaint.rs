// ============================================================================
// Exemplar inpainting — onion-peeling fill refined with PatchMatch
// ============================================================================
//
// The hole is filled one boundary ring at a time. For every pixel of the
// current ring a nearest-neighbour field (NNF) offset is searched with
// PatchMatch (random init, propagation, shrinking random search). Patch
// distance only counts pixels that are known on both sides, so the match is
// driven by the surrounding context and never by the hole content. Filled
// ring pixels become known for the next ring, which grows texture inward.

use std::str::FromStr;

use image::{GrayImage, Luma, RgbaImage};

// -- Quality levels -----------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum InpaintQuality {
    /// 3×3 patches, 2 PatchMatch iterations per ring.
    Fast,
    /// 5×5 patches, 3 iterations.
    #[default]
    Balanced,
    /// 7×7 patches, 6 iterations.
    HighQuality,
}

impl InpaintQuality {
    pub fn label(&self) -> &'static str {
        match self {
            InpaintQuality::Fast => "Fast",
            InpaintQuality::Balanced => "Balanced",
            InpaintQuality::HighQuality => "High Quality",
        }
    }

    pub fn all() -> &'static [InpaintQuality] {
        &[
            InpaintQuality::Fast,
            InpaintQuality::Balanced,
            InpaintQuality::HighQuality,
        ]
    }

    /// Patch side length (odd).
    pub fn patch_size(&self) -> u32 {
        match self {
            InpaintQuality::Fast => 3,
            InpaintQuality::Balanced => 5,
            InpaintQuality::HighQuality => 7,
        }
    }

    /// PatchMatch iterations per boundary ring.
    pub fn iterations(&self) -> usize {
        match self {
            InpaintQuality::Fast => 2,
            InpaintQuality::Balanced => 3,
            InpaintQuality::HighQuality => 6,
        }
    }
}

impl FromStr for InpaintQuality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fast" => Ok(InpaintQuality::Fast),
            "balanced" => Ok(InpaintQuality::Balanced),
            "high" | "highquality" | "high-quality" => Ok(InpaintQuality::HighQuality),
            other => Err(format!(
                "unknown quality '{other}' (expected fast, balanced or high)"
            )),
        }
    }
}

// -- Helpers ------------------------------------------------------------

const NEIGHBOURS_4: [(i32, i32); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

/// Tiny LCG, seeded per pixel so results are deterministic.
struct Lcg(u64);

impl Lcg {
    fn seeded(x: u32, y: u32, salt: u64) -> Self {
        Lcg((x as u64)
            .wrapping_mul(6364136223846793005)
            .wrapping_add((y as u64).wrapping_mul(982451653))
            .wrapping_add(salt.wrapping_mul(1234567891)))
    }

    fn next_u32(&mut self) -> u32 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 33) as u32
    }

    /// Uniform in [-1, 1].
    fn next_signed(&mut self) -> f32 {
        (self.next_u32() as f32 / (u32::MAX >> 1) as f32) * 2.0 - 1.0
    }
}

/// Image plus the live hole mask being peeled.
struct Canvas<'a> {
    img: &'a mut RgbaImage,
    holes: GrayImage,
    w: i32,
    h: i32,
}

impl Canvas<'_> {
    #[inline]
    fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && x < self.w && y < self.h
    }

    #[inline]
    fn known(&self, x: i32, y: i32) -> bool {
        self.in_bounds(x, y) && self.holes.get_pixel(x as u32, y as u32).0[0] == 0
    }

    /// Hole pixels with at least one known 4-neighbour.
    fn boundary(&self) -> Vec<(i32, i32)> {
        let mut ring = Vec::new();
        for y in 0..self.h {
            for x in 0..self.w {
                if self.known(x, y) {
                    continue;
                }
                if NEIGHBOURS_4
                    .iter()
                    .any(|&(dx, dy)| self.known(x + dx, y + dy))
                {
                    ring.push((x, y));
                }
            }
        }
        ring
    }

    /// Mean squared RGB distance between patches centred on `a` and `b`,
    /// counting only pixels known around both centres.
    fn patch_distance(&self, a: (i32, i32), b: (i32, i32), half: i32, min_valid: usize) -> f32 {
        let mut sum = 0.0f32;
        let mut count = 0usize;
        for dy in -half..=half {
            for dx in -half..=half {
                let (ax, ay) = (a.0 + dx, a.1 + dy);
                let (bx, by) = (b.0 + dx, b.1 + dy);
                if !self.known(ax, ay) || !self.known(bx, by) {
                    continue;
                }
                let pa = self.img.get_pixel(ax as u32, ay as u32);
                let pb = self.img.get_pixel(bx as u32, by as u32);
                for c in 0..3 {
                    let d = pa.0[c] as f32 - pb.0[c] as f32;
                    sum += d * d;
                }
                count += 1;
            }
        }
        if count < min_valid {
            f32::MAX
        } else {
            sum / count as f32
        }
    }
}

/// Nearest-neighbour field: best known source pixel for each image pixel.
struct Field {
    width: usize,
    source: Vec<(i32, i32)>,
    cost: Vec<f32>,
}

impl Field {
    fn new(w: u32, h: u32) -> Self {
        let n = (w * h) as usize;
        Field {
            width: w as usize,
            source: vec![(0, 0); n],
            cost: vec![f32::MAX; n],
        }
    }

    #[inline]
    fn idx(&self, p: (i32, i32)) -> usize {
        p.1 as usize * self.width + p.0 as usize
    }

    fn offer(&mut self, canvas: &Canvas, p: (i32, i32), cand: (i32, i32), half: i32, min_valid: usize) {
        if !canvas.known(cand.0, cand.1) {
            return;
        }
        let cost = canvas.patch_distance(p, cand, half, min_valid);
        let i = self.idx(p);
        if cost < self.cost[i] {
            self.cost[i] = cost;
            self.source[i] = cand;
        }
    }
}

// -- Fill ---------------------------------------------------------------

/// Fill every non-zero pixel of `holes` in `src` and return the result.
///
/// Returns `None` when the hole covers the whole image (no texture to copy).
/// Pixels outside the hole are returned unchanged.
pub fn fill_region_patchmatch(
    src: &RgbaImage,
    holes: &GrayImage,
    patch_size: u32,
    iterations: usize,
) -> Option<RgbaImage> {
    let (w, h) = src.dimensions();
    let mut out = src.clone();
    if holes.pixels().all(|p| p.0[0] == 0) {
        return Some(out);
    }

    let half = (patch_size.max(3) / 2) as i32;
    let side = (half * 2 + 1) as usize;
    let min_valid = (side * side / 4).max(1);
    let max_radius = w.max(h) as f32;

    let mut known_pixels: Vec<(i32, i32)> = (0..h as i32)
        .flat_map(|y| (0..w as i32).map(move |x| (x, y)))
        .filter(|&(x, y)| holes.get_pixel(x as u32, y as u32).0[0] == 0)
        .collect();
    if known_pixels.is_empty() {
        return None;
    }

    let mut canvas = Canvas {
        img: &mut out,
        holes: holes.clone(),
        w: w as i32,
        h: h as i32,
    };
    let mut field = Field::new(w, h);

    loop {
        let ring = canvas.boundary();
        if ring.is_empty() {
            break;
        }

        // Seed each ring pixel with a handful of random known candidates
        for &p in &ring {
            let mut rng = Lcg::seeded(p.0 as u32, p.1 as u32, 0);
            for _ in 0..5 {
                let cand = known_pixels[rng.next_u32() as usize % known_pixels.len()];
                field.offer(&canvas, p, cand, half, min_valid);
            }
        }

        for iter in 0..iterations.max(1) {
            let forward = iter % 2 == 0;
            let step = if forward { -1 } else { 1 };
            let order: Box<dyn Iterator<Item = &(i32, i32)>> = if forward {
                Box::new(ring.iter())
            } else {
                Box::new(ring.iter().rev())
            };

            for &p in order {
                // Propagation: reuse the offset of the previous neighbour in scan order
                for (nx, ny) in [(p.0 + step, p.1), (p.0, p.1 + step)] {
                    if !canvas.in_bounds(nx, ny) {
                        continue;
                    }
                    let ni = field.idx((nx, ny));
                    if field.cost[ni] == f32::MAX {
                        continue;
                    }
                    let (sx, sy) = field.source[ni];
                    let cand = (p.0 + sx - nx, p.1 + sy - ny);
                    field.offer(&canvas, p, cand, half, min_valid);
                }

                // Random search around the current best, halving the radius
                let mut rng = Lcg::seeded(p.0 as u32, p.1 as u32, iter as u64 + 1);
                let mut radius = max_radius;
                while radius >= 1.0 {
                    let (bx, by) = field.source[field.idx(p)];
                    let cand = (
                        (bx as f32 + rng.next_signed() * radius).round() as i32,
                        (by as f32 + rng.next_signed() * radius).round() as i32,
                    );
                    field.offer(&canvas, p, cand, half, min_valid);
                    radius *= 0.5;
                }
            }
        }

        // Copy matched pixels, then mark the whole ring as known.
        // Unmatched ring pixels take their first known 4-neighbour.
        let fills: Vec<((i32, i32), image::Rgba<u8>)> = ring
            .iter()
            .filter_map(|&p| {
                let i = field.idx(p);
                let (sx, sy) = if field.cost[i] < f32::MAX {
                    field.source[i]
                } else {
                    NEIGHBOURS_4
                        .iter()
                        .map(|&(dx, dy)| (p.0 + dx, p.1 + dy))
                        .find(|&(x, y)| canvas.known(x, y))?
                };
                Some((p, *canvas.img.get_pixel(sx as u32, sy as u32)))
            })
            .collect();
        for ((x, y), px) in fills {
            canvas.img.put_pixel(x as u32, y as u32, px);
        }
        for &(x, y) in &ring {
            canvas.holes.put_pixel(x as u32, y as u32, Luma([0]));
            known_pixels.push((x, y));
        }
    }

    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn square_hole(w: u32, h: u32, x0: u32, y0: u32, size: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            if x >= x0 && x < x0 + size && y >= y0 && y < y0 + size {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    #[test]
    fn empty_hole_returns_input() {
        let src = RgbaImage::from_fn(8, 8, |x, y| Rgba([x as u8 * 10, y as u8 * 10, 0, 255]));
        let out = fill_region_patchmatch(&src, &GrayImage::new(8, 8), 5, 3).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn full_hole_cannot_be_filled() {
        let src = RgbaImage::new(4, 4);
        let holes = GrayImage::from_pixel(4, 4, Luma([255]));
        assert!(fill_region_patchmatch(&src, &holes, 3, 2).is_none());
    }

    #[test]
    fn hole_in_flat_colour_is_filled_with_that_colour() {
        let colour = Rgba([30, 120, 200, 255]);
        let mut src = RgbaImage::from_pixel(24, 24, colour);
        // paint a blemish inside the hole
        for y in 8..14 {
            for x in 8..14 {
                src.put_pixel(x, y, Rgba([255, 0, 0, 255]));
            }
        }
        let holes = square_hole(24, 24, 8, 8, 6);
        let out = fill_region_patchmatch(&src, &holes, 5, 3).unwrap();
        assert!(out.pixels().all(|p| *p == colour));
    }

    #[test]
    fn pixels_outside_hole_are_untouched() {
        let src = RgbaImage::from_fn(20, 16, |x, y| Rgba([(x * 12) as u8, (y * 15) as u8, 7, 255]));
        let holes = square_hole(20, 16, 5, 5, 4);
        let out = fill_region_patchmatch(&src, &holes, 3, 2).unwrap();
        for (x, y, p) in src.enumerate_pixels() {
            if holes.get_pixel(x, y).0[0] == 0 {
                assert_eq!(out.get_pixel(x, y), p);
            }
        }
    }

    #[test]
    fn quality_parses_from_cli_names() {
        assert_eq!("fast".parse::<InpaintQuality>(), Ok(InpaintQuality::Fast));
        assert_eq!("HIGH".parse::<InpaintQuality>(), Ok(InpaintQuality::HighQuality));
        assert!("ultra".parse::<InpaintQuality>().is_err());
        assert!(InpaintQuality::all().iter().all(|q| q.patch_size() % 2 == 1));
    }
}
