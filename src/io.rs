// ============================================================================
// Image sources and output encoding
// ============================================================================

use std::fs::File;
use std::io::{BufWriter, Cursor};
use std::path::{Path, PathBuf};

use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::tga::TgaEncoder;
use image::codecs::tiff::TiffEncoder;
use image::{ColorType, DynamicImage, ImageEncoder, RgbaImage};
use tracing::debug;

use crate::error::{DecodeError, EncodeError};

/// Common RAW camera file extensions (lowercase).
pub const RAW_EXTENSIONS: &[&str] = &[
    "cr2", "cr3", "nef", "nrw", "arw", "srf", "sr2", "dng", "orf", "rw2", "pef", "raf", "raw",
    "rwl", "srw", "x3f", "3fr", "fff", "iiq", "mrw", "mef", "mos", "kdc", "dcr", "erf",
];

/// Check if a file extension is a known RAW format.
pub fn is_raw_extension(ext: &str) -> bool {
    RAW_EXTENSIONS.contains(&ext.to_lowercase().as_str())
}

/// Where a photo comes from.
#[derive(Clone, Debug)]
pub enum ImageSource {
    /// A file on disk. RAW camera files are recognised by extension.
    Path(PathBuf),
    /// An encoded image already in memory (PNG, JPEG, …).
    Bytes(Vec<u8>),
}

impl ImageSource {
    pub fn describe(&self) -> String {
        match self {
            ImageSource::Path(p) => p.display().to_string(),
            ImageSource::Bytes(b) => format!("<{} bytes in memory>", b.len()),
        }
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        ImageSource::Path(path)
    }
}

impl From<&Path> for ImageSource {
    fn from(path: &Path) -> Self {
        ImageSource::Path(path.to_path_buf())
    }
}

impl From<Vec<u8>> for ImageSource {
    fn from(bytes: Vec<u8>) -> Self {
        ImageSource::Bytes(bytes)
    }
}

/// Decode a source into a freshly allocated, owned RGBA8 buffer.
pub fn decode_source(source: &ImageSource) -> Result<RgbaImage, DecodeError> {
    let img = match source {
        ImageSource::Path(path) => {
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("")
                .to_lowercase();
            if is_raw_extension(&ext) {
                decode_raw_image(path)?
            } else {
                image::io::Reader::open(path)?
                    .with_guessed_format()?
                    .decode()?
                    .into_rgba8()
            }
        }
        ImageSource::Bytes(bytes) => {
            if bytes.is_empty() {
                return Err(DecodeError::UnsupportedFormat("empty buffer".into()));
            }
            image::io::Reader::new(Cursor::new(bytes))
                .with_guessed_format()?
                .decode()?
                .into_rgba8()
        }
    };
    if img.width() == 0 || img.height() == 0 {
        return Err(DecodeError::UnsupportedFormat(format!(
            "{} has no pixels",
            source.describe()
        )));
    }
    debug!(source = %source.describe(), width = img.width(), height = img.height(), "decoded image");
    Ok(img)
}

/// Decode a RAW camera file to an sRGB RgbaImage (demosaiced by imagepipe).
pub fn decode_raw_image(path: &Path) -> Result<RgbaImage, DecodeError> {
    let mut pipeline = imagepipe::Pipeline::new_from_file(path)
        .map_err(|e| DecodeError::Raw(e.to_string()))?;
    let srgb = pipeline
        .output_8bit(None)
        .map_err(|e| DecodeError::Raw(e.to_string()))?;

    // imagepipe hands back packed RGB
    let pixel_count = srgb.width * srgb.height;
    if srgb.data.len() < pixel_count * 3 {
        return Err(DecodeError::Raw(format!(
            "RAW buffer too short: expected {} bytes, got {}",
            pixel_count * 3,
            srgb.data.len()
        )));
    }
    let rgba: Vec<u8> = srgb.data[..pixel_count * 3]
        .chunks_exact(3)
        .flat_map(|rgb| [rgb[0], rgb[1], rgb[2], 255])
        .collect();

    RgbaImage::from_raw(srgb.width as u32, srgb.height as u32, rgba)
        .ok_or_else(|| DecodeError::Raw("failed to create image from RAW data".into()))
}

// ============================================================================
// OUTPUT
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SaveFormat {
    #[default]
    Png,
    Jpeg,
    Bmp,
    Tga,
    Tiff,
}

impl SaveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SaveFormat::Png => "png",
            SaveFormat::Jpeg => "jpg",
            SaveFormat::Bmp => "bmp",
            SaveFormat::Tga => "tga",
            SaveFormat::Tiff => "tiff",
        }
    }

    pub fn supports_quality(&self) -> bool {
        matches!(self, SaveFormat::Jpeg)
    }

    /// Infer the format from a file extension.
    pub fn from_extension(ext: &str) -> Option<SaveFormat> {
        match ext.to_lowercase().as_str() {
            "png" => Some(SaveFormat::Png),
            "jpg" | "jpeg" => Some(SaveFormat::Jpeg),
            "bmp" => Some(SaveFormat::Bmp),
            "tga" => Some(SaveFormat::Tga),
            "tif" | "tiff" => Some(SaveFormat::Tiff),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Result<SaveFormat, EncodeError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        SaveFormat::from_extension(ext)
            .ok_or_else(|| EncodeError::UnsupportedFormat(path.display().to_string()))
    }
}

/// Encode and write an image to a file.
/// `quality` (1–100) only applies to JPEG; alpha is dropped for JPEG.
pub fn encode_and_write(
    image: &RgbaImage,
    path: &Path,
    format: SaveFormat,
    quality: u8,
) -> Result<(), EncodeError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let (w, h) = image.dimensions();

    match format {
        SaveFormat::Png => {
            PngEncoder::new(&mut writer).write_image(image.as_raw(), w, h, ColorType::Rgba8)?;
        }
        SaveFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100)).write_image(
                rgb.as_raw(),
                w,
                h,
                ColorType::Rgb8,
            )?;
        }
        SaveFormat::Bmp => {
            BmpEncoder::new(&mut writer).write_image(image.as_raw(), w, h, ColorType::Rgba8)?;
        }
        SaveFormat::Tga => {
            TgaEncoder::new(&mut writer).write_image(image.as_raw(), w, h, ColorType::Rgba8)?;
        }
        SaveFormat::Tiff => {
            TiffEncoder::new(&mut writer).write_image(image.as_raw(), w, h, ColorType::Rgba8)?;
        }
    }

    debug!(path = %path.display(), format = format.extension(), "wrote image");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn checker(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([10, 20, 30, 128])
            }
        })
    }

    #[test]
    fn png_written_to_disk_decodes_identically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checker.png");
        let img = checker(7, 5);
        encode_and_write(&img, &path, SaveFormat::Png, 90).unwrap();
        let back = decode_source(&ImageSource::Path(path)).unwrap();
        assert_eq!(back, img);
    }

    #[test]
    fn decodes_in_memory_png() {
        let img = checker(3, 3);
        let mut bytes = Vec::new();
        PngEncoder::new(&mut bytes)
            .write_image(img.as_raw(), 3, 3, ColorType::Rgba8)
            .unwrap();
        let back = decode_source(&ImageSource::Bytes(bytes)).unwrap();
        assert_eq!(back, img);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let err = decode_source(&ImageSource::Bytes(vec![1, 2, 3, 4, 5])).unwrap_err();
        assert!(matches!(err, DecodeError::Image(_)), "got {err:?}");
        assert!(decode_source(&ImageSource::Bytes(Vec::new())).is_err());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = decode_source(&ImageSource::Path("/definitely/not/here.png".into())).unwrap_err();
        assert!(matches!(err, DecodeError::Io(_)));
    }

    #[test]
    fn jpeg_output_keeps_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jpg");
        encode_and_write(&checker(9, 4), &path, SaveFormat::Jpeg, 80).unwrap();
        let back = decode_source(&ImageSource::Path(path)).unwrap();
        assert_eq!(back.dimensions(), (9, 4));
    }

    #[test]
    fn format_inferred_from_extension() {
        assert_eq!(SaveFormat::from_path(Path::new("a/b.JPEG")).unwrap(), SaveFormat::Jpeg);
        assert_eq!(SaveFormat::from_path(Path::new("x.tif")).unwrap(), SaveFormat::Tiff);
        assert!(SaveFormat::from_path(Path::new("x.pfe")).is_err());
        assert!(is_raw_extension("NEF"));
    }
}
