//! The inpainting capability consumed by a [`crate::Session`].
//!
//! The session treats an inpainter as an opaque black box: it is handed an
//! immutable snapshot of the photo and the mask on a worker thread and
//! either returns a filled image or an error message.

use image::RgbaImage;
use tracing::debug;

use crate::mask;
use crate::ops::inpaint::{InpaintQuality, fill_region_patchmatch};

/// Fills the selected region of `mask` in `image`.
///
/// Called off the interactive thread. Panics are caught by the session and
/// reported as a job failure.
pub trait Inpainter: Send + Sync {
    fn inpaint(&self, image: &RgbaImage, mask: &RgbaImage) -> Result<RgbaImage, String>;
}

impl<F> Inpainter for F
where
    F: Fn(&RgbaImage, &RgbaImage) -> Result<RgbaImage, String> + Send + Sync,
{
    fn inpaint(&self, image: &RgbaImage, mask: &RgbaImage) -> Result<RgbaImage, String> {
        self(image, mask)
    }
}

/// CPU exemplar inpainter (onion-peeling + PatchMatch).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PatchMatchInpainter {
    pub patch_size: u32,
    pub iterations: usize,
}

impl PatchMatchInpainter {
    pub fn new(quality: InpaintQuality) -> Self {
        Self::with_params(quality.patch_size(), quality.iterations())
    }

    /// Patch size is forced odd and at least 3.
    pub fn with_params(patch_size: u32, iterations: usize) -> Self {
        let patch_size = patch_size.max(3) | 1;
        PatchMatchInpainter {
            patch_size,
            iterations: iterations.max(1),
        }
    }
}

impl Default for PatchMatchInpainter {
    fn default() -> Self {
        Self::new(InpaintQuality::default())
    }
}

impl Inpainter for PatchMatchInpainter {
    fn inpaint(&self, image: &RgbaImage, mask: &RgbaImage) -> Result<RgbaImage, String> {
        if image.dimensions() != mask.dimensions() {
            return Err(format!(
                "mask is {}x{} but image is {}x{}",
                mask.width(),
                mask.height(),
                image.width(),
                image.height()
            ));
        }
        let holes = mask::hole_mask(mask);
        debug!(
            selected = mask::selected_pixel_count(mask),
            patch_size = self.patch_size,
            iterations = self.iterations,
            "PatchMatch fill"
        );
        fill_region_patchmatch(image, &holes, self.patch_size, self.iterations)
            .ok_or_else(|| "mask selects the whole image, nothing to sample from".to_string())
    }
}
