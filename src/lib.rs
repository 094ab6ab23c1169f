//! Photo editing session core: load a photo, mark a region with a mask,
//! inpaint the region on a worker thread, then composite a cut-out person
//! layer back on top of the result.
//!
//! ```no_run
//! use std::time::Duration;
//! use aiimageeditor::{
//!     ImageSource, InpaintFailure, InpaintListener, JobId, PatchMatchInpainter, Session,
//! };
//!
//! struct Done;
//! impl InpaintListener for Done {
//!     fn on_finish_inpaint(&mut self, job: JobId, _bg: &std::sync::Arc<image::RgbaImage>) {
//!         println!("{job} finished");
//!     }
//!     fn on_failure(&mut self, job: JobId, reason: &InpaintFailure) {
//!         eprintln!("{job} failed: {reason}");
//!     }
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let session = Session::new(PatchMatchInpainter::default());
//! session.set_on_finish_inpaint(Done);
//! session.load_original(&ImageSource::Path("photo.jpg".into()))?;
//! session.set_mask(image::open("mask.png")?.into_rgba8());
//! session.set_person(image::open("person.png")?.into_rgba8());
//! session.start_inpaint()?;
//! session.wait_event(Duration::from_secs(60));
//! session.merge_image()?.save("merged.png")?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod inpainter;
pub mod io;
pub mod logger;
pub mod mask;
pub mod ops;
pub mod session;

pub use error::{DecodeError, EncodeError, InpaintFailure, Layer, SessionError};
pub use inpainter::{Inpainter, PatchMatchInpainter};
pub use io::ImageSource;
pub use ops::inpaint::InpaintQuality;
pub use session::{InpaintEvent, InpaintListener, JobId, Session, SessionConfig};
