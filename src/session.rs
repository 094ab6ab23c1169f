// ============================================================================
// Editing session — four layers, single-flight inpainting, final composite
// ============================================================================
//
// Layers:
//   original   — the loaded photo
//   mask       — region to fill (see `crate::mask`)
//   person     — foreground cutout, drawn last
//   background — working result: copy of `original`, then the inpaint output
//
// All admission decisions (`start_inpaint`, `reset_images`, loads) take the
// layer write lock and check the `inpainting` flag under it, so the
// check-and-set is atomic with respect to each other. The worker commits a
// finished job by swapping `background` and clearing the flag under the same
// lock, then posts an event; listeners run only when the interactive thread
// calls `poll_events` / `wait_event`.
//
// Each job gets its own named thread. The inpainter is opaque and may block
// for a long time, so it never occupies the rayon pool that `merge_image`
// composites on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread;
use std::time::{Duration, Instant};

use image::RgbaImage;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{InpaintFailure, Layer, Result, SessionError};
use crate::inpainter::Inpainter;
use crate::io::{ImageSource, decode_source};
use crate::ops::composite::composite_over;

/// Identifier of one accepted inpainting job.
pub type JobId = Uuid;

/// Receives job outcomes on the interactive thread.
pub trait InpaintListener: Send {
    /// The job succeeded; `background` is the new committed background.
    fn on_finish_inpaint(&mut self, job: JobId, background: &Arc<RgbaImage>);

    /// The job did not produce a background; the pre-job copy is kept.
    fn on_failure(&mut self, job: JobId, reason: &InpaintFailure);
}

/// Completion notice posted by a worker.
#[derive(Clone, Debug)]
pub enum InpaintEvent {
    Finished {
        job: JobId,
        background: Arc<RgbaImage>,
        elapsed: Duration,
    },
    Failed {
        job: JobId,
        failure: InpaintFailure,
    },
}

impl InpaintEvent {
    pub fn job(&self) -> JobId {
        match self {
            InpaintEvent::Finished { job, .. } | InpaintEvent::Failed { job, .. } => *job,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Size of the placeholder every layer is reset to.
    pub placeholder_size: (u32, u32),
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            placeholder_size: (1, 1),
        }
    }
}

#[derive(Default)]
struct Layers {
    original: Option<Arc<RgbaImage>>,
    mask: Option<Arc<RgbaImage>>,
    person: Option<Arc<RgbaImage>>,
    background: Option<Arc<RgbaImage>>,
}

/// The running job, as seen by `cancel_inpaint`.
struct ActiveJob {
    id: JobId,
    cancelled: Arc<AtomicBool>,
}

/// State shared with the worker thread.
struct Shared {
    layers: RwLock<Layers>,
    inpainting: AtomicBool,
    active: Mutex<Option<ActiveJob>>,
}

impl Shared {
    // A panic while holding a lock never leaves layers half-written (each
    // field is swapped whole), so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, Layers> {
        self.layers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Layers> {
        self.layers.write().unwrap_or_else(|e| e.into_inner())
    }

    fn active(&self) -> MutexGuard<'_, Option<ActiveJob>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A photo editing session. Create one per editing flow and reuse it across
/// any number of load / inpaint / merge cycles.
pub struct Session {
    shared: Arc<Shared>,
    inpainter: Arc<dyn Inpainter>,
    config: SessionConfig,
    listener: Mutex<Option<Box<dyn InpaintListener>>>,
    events_tx: Sender<InpaintEvent>,
    events_rx: Mutex<Receiver<InpaintEvent>>,
}

impl Session {
    pub fn new(inpainter: impl Inpainter + 'static) -> Self {
        Self::with_config(inpainter, SessionConfig::default())
    }

    pub fn with_config(inpainter: impl Inpainter + 'static, config: SessionConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Session {
            shared: Arc::new(Shared {
                layers: RwLock::new(Layers::default()),
                inpainting: AtomicBool::new(false),
                active: Mutex::new(None),
            }),
            inpainter: Arc::new(inpainter),
            config,
            listener: Mutex::new(None),
            events_tx,
            events_rx: Mutex::new(events_rx),
        }
    }

    /// True while a job is in flight.
    pub fn is_inpainting(&self) -> bool {
        self.shared.inpainting.load(Ordering::Acquire)
    }

    // -- Layer access ---------------------------------------------------

    pub fn original(&self) -> Option<Arc<RgbaImage>> {
        self.shared.read().original.clone()
    }

    pub fn mask(&self) -> Option<Arc<RgbaImage>> {
        self.shared.read().mask.clone()
    }

    pub fn person(&self) -> Option<Arc<RgbaImage>> {
        self.shared.read().person.clone()
    }

    pub fn background(&self) -> Option<Arc<RgbaImage>> {
        self.shared.read().background.clone()
    }

    /// Decode `source` into a new `original`. On failure nothing changes.
    pub fn load_original(&self, source: &ImageSource) -> Result<()> {
        // Decode outside the lock; an unreadable source never touches state
        let img = decode_source(source).inspect_err(|e| {
            warn!(source = %source.describe(), error = %e, "failed to load original");
        })?;
        info!(
            source = %source.describe(),
            width = img.width(),
            height = img.height(),
            "loaded original"
        );
        self.set_original(img)
    }

    /// Install an already-decoded photo as `original`.
    pub fn set_original(&self, img: RgbaImage) -> Result<()> {
        let mut layers = self.shared.write();
        if self.is_inpainting() {
            return Err(SessionError::JobInProgress);
        }
        layers.original = Some(Arc::new(img));
        Ok(())
    }

    /// Replace the mask. A running job keeps the mask it started with.
    pub fn set_mask(&self, mask: RgbaImage) {
        debug!(width = mask.width(), height = mask.height(), "mask updated");
        self.shared.write().mask = Some(Arc::new(mask));
    }

    /// Replace the person layer.
    pub fn set_person(&self, person: RgbaImage) {
        debug!(width = person.width(), height = person.height(), "person layer updated");
        self.shared.write().person = Some(Arc::new(person));
    }

    /// Register the listener, replacing any previous one.
    ///
    /// May be called from inside a listener callback; the new listener then
    /// receives every later event.
    pub fn set_on_finish_inpaint(&self, listener: impl InpaintListener + 'static) {
        *self.listener() = Some(Box::new(listener));
    }

    // -- Job lifecycle --------------------------------------------------

    /// Start inpainting `original` under `mask` on a worker thread.
    ///
    /// Returns once `background` holds a full copy of `original`; the job's
    /// outcome arrives later through the listener.
    pub fn start_inpaint(&self) -> Result<JobId> {
        let (job, image, mask) = {
            let mut layers = self.shared.write();
            if self.shared.inpainting.load(Ordering::Acquire) {
                debug!("start_inpaint rejected: job already running");
                return Err(SessionError::JobAlreadyRunning);
            }
            let original = layers
                .original
                .clone()
                .ok_or(SessionError::MissingLayer(Layer::Original))?;
            let mask = layers
                .mask
                .clone()
                .ok_or(SessionError::MissingLayer(Layer::Mask))?;
            if mask.dimensions() != original.dimensions() {
                return Err(SessionError::DimensionMismatch {
                    layer: Layer::Mask,
                    expected: original.dimensions(),
                    actual: mask.dimensions(),
                });
            }

            let job = Uuid::new_v4();
            layers.background = Some(Arc::new(original.as_ref().clone()));
            self.shared.inpainting.store(true, Ordering::Release);
            *self.shared.active() = Some(ActiveJob {
                id: job,
                cancelled: Arc::new(AtomicBool::new(false)),
            });
            (job, original, mask)
        };

        info!(%job, width = image.width(), height = image.height(), "inpaint job started");

        let shared = Arc::clone(&self.shared);
        let inpainter = Arc::clone(&self.inpainter);
        let sender = self.events_tx.clone();
        let spawned = thread::Builder::new()
            .name(format!("inpaint-{}", job.simple()))
            .spawn(move || {
                let started = Instant::now();
                let outcome = run_inpainter(inpainter.as_ref(), &image, &mask);
                let event = commit(&shared, job, image.dimensions(), outcome, started.elapsed());
                // Receiver lives as long as the session; a dropped session just
                // discards the notice.
                let _ = sender.send(event);
            });

        if let Err(e) = spawned {
            // Back to idle; `background` keeps the pre-job copy
            let layers = self.shared.write();
            *self.shared.active() = None;
            self.shared.inpainting.store(false, Ordering::Release);
            drop(layers);
            error!(%job, error = %e, "could not start inpaint worker");
            return Err(SessionError::WorkerSpawn(e));
        }

        Ok(job)
    }

    /// Ask the running job to be discarded when its inpainter returns.
    ///
    /// The inpainter itself is not interrupted, so the session stays busy
    /// until it finishes. Returns false when no job is running or the job is
    /// already committing; a `true` always ends in a `Cancelled` failure.
    pub fn cancel_inpaint(&self) -> bool {
        match self.shared.active().as_ref() {
            Some(active) => {
                active.cancelled.store(true, Ordering::Release);
                info!(job = %active.id, "inpaint job cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Reset every layer to a placeholder. Rejected while a job is running.
    pub fn reset_images(&self) -> Result<()> {
        let mut layers = self.shared.write();
        if self.is_inpainting() {
            debug!("reset_images rejected: job in progress");
            return Err(SessionError::JobInProgress);
        }
        let (w, h) = self.config.placeholder_size;
        let placeholder = Arc::new(RgbaImage::new(w.max(1), h.max(1)));
        layers.original = Some(Arc::clone(&placeholder));
        layers.mask = Some(Arc::clone(&placeholder));
        layers.person = Some(Arc::clone(&placeholder));
        layers.background = Some(placeholder);
        info!("session layers reset");
        Ok(())
    }

    /// New buffer: `background` with `person` drawn over it at the origin.
    ///
    /// Parts of `person` outside `background` are clipped. Safe to call while
    /// a job runs; it sees the pre-job copy until the job commits.
    pub fn merge_image(&self) -> Result<RgbaImage> {
        let (background, person) = {
            let layers = self.shared.read();
            (
                layers
                    .background
                    .clone()
                    .ok_or(SessionError::MissingLayer(Layer::Background))?,
                layers
                    .person
                    .clone()
                    .ok_or(SessionError::MissingLayer(Layer::Person))?,
            )
        };
        if person.dimensions() != background.dimensions() {
            debug!(
                person = ?person.dimensions(),
                background = ?background.dimensions(),
                "person layer clipped to background"
            );
        }
        Ok(composite_over(&background, &person))
    }

    // -- Listener delivery ----------------------------------------------

    /// Deliver every pending job event to the listener without blocking.
    /// Returns the number of events delivered.
    pub fn poll_events(&self) -> usize {
        let mut delivered = 0;
        // Receiver lock is released before each listener call
        loop {
            let event = match self.events().try_recv() {
                Ok(event) => event,
                Err(_) => break,
            };
            self.dispatch(event);
            delivered += 1;
        }
        delivered
    }

    /// Block until one job event arrives and deliver it.
    /// Returns false if `timeout` elapsed first.
    pub fn wait_event(&self, timeout: Duration) -> bool {
        let event = match self.events().recv_timeout(timeout) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => return false,
            // The session keeps a sender, so the channel never disconnects
            Err(RecvTimeoutError::Disconnected) => return false,
        };
        self.dispatch(event);
        true
    }

    fn events(&self) -> MutexGuard<'_, Receiver<InpaintEvent>> {
        self.events_rx.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn listener(&self) -> MutexGuard<'_, Option<Box<dyn InpaintListener>>> {
        self.listener.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn dispatch(&self, event: InpaintEvent) {
        // Called with the slot unlocked, so the callback may register a new listener
        let Some(mut listener) = self.listener().take() else {
            warn!(job = %event.job(), "no listener registered, inpaint event dropped");
            return;
        };
        match &event {
            InpaintEvent::Finished {
                job,
                background,
                elapsed,
            } => {
                debug!(%job, elapsed_ms = elapsed.as_millis() as u64, "delivering inpaint result");
                listener.on_finish_inpaint(*job, background)
            }
            InpaintEvent::Failed { job, failure } => listener.on_failure(*job, failure),
        }
        let mut slot = self.listener();
        if slot.is_none() {
            *slot = Some(listener);
        }
    }
}

/// Invoke the inpainter, turning panics into failures.
fn run_inpainter(
    inpainter: &dyn Inpainter,
    image: &RgbaImage,
    mask: &RgbaImage,
) -> std::result::Result<RgbaImage, InpaintFailure> {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        inpainter.inpaint(image, mask)
    }));
    match result {
        Ok(Ok(filled)) => Ok(filled),
        Ok(Err(msg)) => Err(InpaintFailure::Inpainter(msg)),
        Err(panic_info) => {
            let msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic_info.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic payload".to_string()
            };
            Err(InpaintFailure::Panicked(msg))
        }
    }
}

/// Apply a job outcome to the shared state and build its event.
///
/// `background` and the `inpainting` flag change together under the write
/// lock: nobody can see the flag cleared next to the pre-job background of
/// a successful job.
fn commit(
    shared: &Shared,
    job: JobId,
    expected: (u32, u32),
    outcome: std::result::Result<RgbaImage, InpaintFailure>,
    elapsed: Duration,
) -> InpaintEvent {
    // Cancel flag and active slot are read under the write lock: once the job
    // leaves `active`, `cancel_inpaint` reports false.
    let mut layers = shared.write();
    let cancelled = shared
        .active()
        .take()
        .is_some_and(|a| a.id == job && a.cancelled.load(Ordering::Acquire));

    let outcome = match outcome {
        _ if cancelled => Err(InpaintFailure::Cancelled),
        Ok(filled) if filled.dimensions() != expected => Err(InpaintFailure::InvalidResult {
            expected,
            actual: filled.dimensions(),
        }),
        other => other,
    };

    let event = match outcome {
        Ok(filled) => {
            // Fresh buffer sized to `original`, holding the filled pixels
            let background = Arc::new(filled);
            layers.background = Some(Arc::clone(&background));
            info!(%job, elapsed_ms = elapsed.as_millis() as u64, "inpaint job finished");
            InpaintEvent::Finished {
                job,
                background,
                elapsed,
            }
        }
        Err(failure) => {
            if failure == InpaintFailure::Cancelled {
                info!(%job, "inpaint job cancelled, result discarded");
            } else {
                error!(%job, error = %failure, "inpaint job failed");
            }
            InpaintEvent::Failed { job, failure }
        }
    };
    shared.inpainting.store(false, Ordering::Release);
    drop(layers);
    event
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn identity() -> impl Inpainter {
        |img: &RgbaImage, _mask: &RgbaImage| -> std::result::Result<RgbaImage, String> {
            Ok(img.clone())
        }
    }

    fn shared_with_background(bg: RgbaImage) -> Shared {
        let shared = Shared {
            layers: RwLock::new(Layers::default()),
            inpainting: AtomicBool::new(true),
            active: Mutex::new(None),
        };
        shared.write().background = Some(Arc::new(bg));
        shared
    }

    #[test]
    fn commit_rejects_wrongly_sized_result() {
        let pre = RgbaImage::from_pixel(4, 4, Rgba([1, 1, 1, 255]));
        let shared = shared_with_background(pre.clone());
        let event = commit(
            &shared,
            Uuid::new_v4(),
            (4, 4),
            Ok(RgbaImage::new(2, 2)),
            Duration::ZERO,
        );
        match event {
            InpaintEvent::Failed { failure, .. } => assert_eq!(
                failure,
                InpaintFailure::InvalidResult {
                    expected: (4, 4),
                    actual: (2, 2)
                }
            ),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(!shared.inpainting.load(Ordering::Acquire));
        assert_eq!(**shared.read().background.as_ref().unwrap(), pre);
    }

    #[test]
    fn commit_discards_cancelled_result() {
        let pre = RgbaImage::from_pixel(2, 2, Rgba([9, 9, 9, 255]));
        let shared = shared_with_background(pre.clone());
        let job = Uuid::new_v4();
        *shared.active() = Some(ActiveJob {
            id: job,
            cancelled: Arc::new(AtomicBool::new(true)),
        });
        let event = commit(&shared, job, (2, 2), Ok(RgbaImage::new(2, 2)), Duration::ZERO);
        assert!(matches!(
            event,
            InpaintEvent::Failed {
                failure: InpaintFailure::Cancelled,
                ..
            }
        ));
        assert_eq!(**shared.read().background.as_ref().unwrap(), pre);
        assert!(shared.active().is_none());
    }

    #[test]
    fn panicking_inpainter_is_reported() {
        let boom = |_: &RgbaImage, _: &RgbaImage| -> std::result::Result<RgbaImage, String> {
            panic!("native crash")
        };
        let img = RgbaImage::new(1, 1);
        assert_eq!(
            run_inpainter(&boom, &img, &img).unwrap_err(),
            InpaintFailure::Panicked("native crash".into())
        );
    }

    #[test]
    fn missing_layers_are_reported_by_name() {
        let session = Session::new(identity());
        assert!(matches!(
            session.start_inpaint(),
            Err(SessionError::MissingLayer(Layer::Original))
        ));
        session.set_original(RgbaImage::new(2, 2)).unwrap();
        assert!(matches!(
            session.start_inpaint(),
            Err(SessionError::MissingLayer(Layer::Mask))
        ));
        assert!(matches!(
            session.merge_image(),
            Err(SessionError::MissingLayer(Layer::Background))
        ));
    }

    #[test]
    fn custom_placeholder_size_is_used_on_reset() {
        let session = Session::with_config(
            identity(),
            SessionConfig {
                placeholder_size: (2, 3),
            },
        );
        session.reset_images().unwrap();
        assert_eq!(session.background().unwrap().dimensions(), (2, 3));
    }

    #[test]
    fn cancel_without_job_is_a_no_op() {
        let session = Session::new(identity());
        assert!(!session.cancel_inpaint());
    }
}
