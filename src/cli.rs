// ============================================================================
// Headless front end — one photo, one mask, optional person layer
// ============================================================================
//
// Usage examples:
//   ai-image-editor -i photo.jpg -m mask.png -o clean.png
//   ai-image-editor -i photo.nef -m mask.png -p person.png -o merged.jpg --jpeg-quality 85
//   ai-image-editor -i photo.png -m mask.png -o out.png --quality high -v

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use clap::Parser;
use image::RgbaImage;
use tracing::{error, info, warn};

use aiimageeditor::io::{SaveFormat, decode_source, encode_and_write};
use aiimageeditor::{
    ImageSource, InpaintFailure, InpaintListener, InpaintQuality, JobId, PatchMatchInpainter,
    Session, mask,
};

const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Remove a masked region from a photo and put the subject back on top.
#[derive(Parser, Debug)]
#[command(
    name = "ai-image-editor",
    version,
    about = "Inpaint a masked region of a photo and composite a person layer over the result"
)]
pub struct CliArgs {
    /// Source photo (PNG, JPEG, WEBP, BMP, TGA, TIFF or camera RAW).
    #[arg(short, long, value_name = "PHOTO")]
    pub input: PathBuf,

    /// Mask layer, same size as the photo. Visible, non-black pixels are filled.
    #[arg(short, long, value_name = "MASK")]
    pub mask: PathBuf,

    /// Foreground layer drawn over the inpainted background.
    /// When omitted, only the inpainted background is written.
    #[arg(short, long, value_name = "LAYER")]
    pub person: Option<PathBuf>,

    /// Output file; format inferred from the extension (png, jpg, bmp, tga, tiff).
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,

    /// Inpainting quality: fast, balanced, high.
    #[arg(short, long, default_value = "balanced", value_name = "QUALITY")]
    pub quality: InpaintQuality,

    /// JPEG quality (1–100, default 90). Ignored for other output formats.
    #[arg(long, value_name = "1-100", value_parser = clap::value_parser!(u8).range(1..=100))]
    pub jpeg_quality: Option<u8>,

    /// Give up waiting for the inpainting job after this many seconds.
    #[arg(long, default_value_t = 600, value_name = "SECS")]
    pub timeout: u64,

    /// Session log file (default: platform data directory).
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Debug-level logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Forwards the job outcome to the thread driving the CLI.
struct ChannelListener(mpsc::Sender<Result<Arc<RgbaImage>, InpaintFailure>>);

impl InpaintListener for ChannelListener {
    fn on_finish_inpaint(&mut self, _job: JobId, background: &Arc<RgbaImage>) {
        let _ = self.0.send(Ok(Arc::clone(background)));
    }

    fn on_failure(&mut self, _job: JobId, reason: &InpaintFailure) {
        let _ = self.0.send(Err(reason.clone()));
    }
}

/// Run the whole edit and return an OS exit code.
pub fn run(args: CliArgs) -> ExitCode {
    match run_inner(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            error!("{}", msg);
            eprintln!("error: {msg}");
            ExitCode::FAILURE
        }
    }
}

fn run_inner(args: &CliArgs) -> Result<(), String> {
    let start = Instant::now();
    let format = SaveFormat::from_path(&args.output).map_err(|e| e.to_string())?;
    if args.jpeg_quality.is_some() && !format.supports_quality() {
        warn!(
            "--jpeg-quality has no effect on .{} output",
            format.extension()
        );
    }
    let quality = args.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY);

    let session = Session::new(PatchMatchInpainter::new(args.quality));
    let (tx, rx) = mpsc::channel();
    session.set_on_finish_inpaint(ChannelListener(tx));

    session
        .load_original(&ImageSource::Path(args.input.clone()))
        .map_err(|e| format!("could not load '{}': {}", args.input.display(), e))?;

    let mask_img = load_layer(&args.mask)?;
    if mask::is_empty(&mask_img) {
        warn!("mask selects nothing; the background will match the photo");
    }
    info!(
        selected = mask::selected_pixel_count(&mask_img),
        "mask loaded from {}",
        args.mask.display()
    );
    session.set_mask(mask_img);

    if let Some(person) = &args.person {
        session.set_person(load_layer(person)?);
    }

    let job = session.start_inpaint().map_err(|e| e.to_string())?;
    info!(%job, quality = args.quality.label(), "waiting for inpainting");

    if !session.wait_event(Duration::from_secs(args.timeout)) {
        session.cancel_inpaint();
        return Err(format!("inpainting did not finish within {}s", args.timeout));
    }
    let background = rx
        .try_recv()
        .map_err(|_| "inpainting finished without a result".to_string())?
        .map_err(|e| e.to_string())?;

    let result = if args.person.is_some() {
        session.merge_image().map_err(|e| e.to_string())?
    } else {
        background.as_ref().clone()
    };

    encode_and_write(&result, &args.output, format, quality)
        .map_err(|e| format!("could not write '{}': {}", args.output.display(), e))?;

    info!(
        elapsed_ms = start.elapsed().as_millis() as u64,
        "wrote {}",
        args.output.display()
    );
    Ok(())
}

fn load_layer(path: &Path) -> Result<RgbaImage, String> {
    decode_source(&ImageSource::Path(path.to_path_buf()))
        .map_err(|e| format!("could not load '{}': {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn jpeg_quality_is_optional_and_range_checked() {
        let args =
            CliArgs::try_parse_from(["ai-image-editor", "-i", "a.png", "-m", "m.png", "-o", "o.png"])
                .unwrap();
        assert_eq!(args.jpeg_quality, None);
        assert_eq!(args.quality, InpaintQuality::Balanced);

        let out_of_range = CliArgs::try_parse_from([
            "ai-image-editor",
            "-i",
            "a.png",
            "-m",
            "m.png",
            "-o",
            "o.jpg",
            "--jpeg-quality",
            "0",
        ]);
        assert!(out_of_range.is_err());
    }

    #[test]
    fn writes_background_when_no_person_is_given() {
        let dir = tempfile::tempdir().unwrap();
        let photo = RgbaImage::from_pixel(8, 8, Rgba([30, 60, 90, 255]));
        let input = dir.path().join("photo.png");
        let mask_path = dir.path().join("mask.png");
        let output = dir.path().join("out.png");
        photo.save(&input).unwrap();
        RgbaImage::new(8, 8).save(&mask_path).unwrap();

        // --jpeg-quality is accepted but has no effect on PNG
        let argv: Vec<std::ffi::OsString> = vec![
            "ai-image-editor".into(),
            "-i".into(),
            input.into_os_string(),
            "-m".into(),
            mask_path.into_os_string(),
            "-o".into(),
            output.clone().into_os_string(),
            "--quality".into(),
            "fast".into(),
            "--jpeg-quality".into(),
            "50".into(),
        ];
        let args = CliArgs::try_parse_from(argv).unwrap();
        run_inner(&args).unwrap();

        let written = image::open(&output).unwrap().to_rgba8();
        assert_eq!(written, photo);
    }
}
