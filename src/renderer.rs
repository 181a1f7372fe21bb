//! Bounded pool of SVG rendering sessions.
//!
//! A session owns a fully configured [`usvg::Options`] (including the font
//! database, which is slow to load) and is reused across renders. The pool
//! starts sessions lazily up to its capacity; beyond that, callers block until
//! a session is released. Sessions are held through a [`SessionGuard`] that
//! returns them on drop, so errors and panics never leak a session.
//!
//! # Example
//!
//! ```
//! use iconsmith::{RenderFlags, RendererConfig, RendererPool};
//!
//! let pool = RendererPool::new(RendererConfig {
//!     sessions: 1,
//!     load_system_fonts: false,
//!     ..RendererConfig::default()
//! });
//! let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10"><rect width="10" height="10" fill="#000"/></svg>"##;
//! let image = pool.render(svg, 24, 24, RenderFlags::default()).unwrap();
//! assert_eq!(image.dimensions(), (24, 24));
//! ```

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use image::{Rgba, RgbaImage};
use parking_lot::{Condvar, Mutex, MutexGuard};
use resvg::tiny_skia::{IntRect, Pixmap, Transform};
use resvg::usvg::{Options, Tree};
use thiserror::Error;

use crate::config::RendererConfig;

/// Extra room around the requested output so content is never clipped by
/// the surface before the final crop.
const VIEWPORT_MARGIN: u32 = 100;

/// Surface dimensions for a `width` x `height` output, margin included.
fn surface_size(width: u32, height: u32) -> Result<(u32, u32), RenderError> {
    let invalid = RenderError::InvalidSize { width, height };
    if width == 0 || height == 0 {
        return Err(invalid);
    }
    let grow = |side: u32| side.checked_add(VIEWPORT_MARGIN).filter(|s| i32::try_from(*s).is_ok());
    match (grow(width), grow(height)) {
        (Some(w), Some(h)) => Ok((w, h)),
        _ => Err(invalid),
    }
}

/// Per-render switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderFlags {
    /// Mirror the content horizontally (right-to-left variants).
    pub rtl_flip: bool,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no markup to render")]
    EmptyMarkup,

    #[error("invalid output size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },

    #[error("malformed svg: {0}")]
    Parse(#[from] resvg::usvg::Error),

    #[error("no rendering session became free within {0:?}")]
    Timeout(Duration),

    #[error("could not allocate a {width}x{height} surface")]
    Surface { width: u32, height: u32 },
}

// ============================================================================
// Session
// ============================================================================

/// A long-lived rendering session.
struct RenderSession {
    id: usize,
    options: Options<'static>,
}

impl RenderSession {
    fn start(id: usize, load_system_fonts: bool) -> Self {
        let mut options = Options::default();
        if load_system_fonts {
            options.fontdb_mut().load_system_fonts();
        }
        tracing::debug!(session = id, "started rendering session");
        Self { id, options }
    }

    fn render(
        &self,
        markup: &str,
        width: u32,
        height: u32,
        flags: RenderFlags,
    ) -> Result<RgbaImage, RenderError> {
        let tree = Tree::from_str(markup, &self.options)?;

        // Fit the content into width x height at the origin, keeping its
        // aspect ratio and centering it in the box.
        let size = tree.size();
        let scale = (width as f32 / size.width()).min(height as f32 / size.height());
        let dx = (width as f32 - size.width() * scale) / 2.0;
        let dy = (height as f32 - size.height() * scale) / 2.0;
        let mut transform = Transform::from_row(scale, 0.0, 0.0, scale, dx, dy);
        if flags.rtl_flip {
            transform =
                transform.post_concat(Transform::from_row(-1.0, 0.0, 0.0, 1.0, width as f32, 0.0));
        }

        let (surface_w, surface_h) = surface_size(width, height)?;
        let mut pixmap = Pixmap::new(surface_w, surface_h).ok_or(RenderError::Surface {
            width: surface_w,
            height: surface_h,
        })?;
        resvg::render(&tree, transform, &mut pixmap.as_mut());

        let clip = IntRect::from_xywh(0, 0, width, height)
            .ok_or(RenderError::InvalidSize { width, height })?;
        let cropped = pixmap
            .clone_rect(clip)
            .ok_or(RenderError::Surface { width, height })?;

        Ok(pixmap_to_rgba_image(&cropped))
    }
}

/// Converts a tiny_skia Pixmap to an image::RgbaImage.
fn pixmap_to_rgba_image(pixmap: &Pixmap) -> RgbaImage {
    let mut img = RgbaImage::new(pixmap.width(), pixmap.height());
    for (src, dst) in pixmap.pixels().iter().zip(img.pixels_mut()) {
        // tiny_skia stores premultiplied alpha
        let (r, g, b, a) = unpremultiply(src.red(), src.green(), src.blue(), src.alpha());
        *dst = Rgba([r, g, b, a]);
    }
    img
}

fn unpremultiply(r: u8, g: u8, b: u8, a: u8) -> (u8, u8, u8, u8) {
    if a == 0 {
        (0, 0, 0, 0)
    } else {
        let a_f = a as f32 / 255.0;
        (
            (r as f32 / a_f).round().min(255.0) as u8,
            (g as f32 / a_f).round().min(255.0) as u8,
            (b as f32 / a_f).round().min(255.0) as u8,
            a,
        )
    }
}

// ============================================================================
// Pool
// ============================================================================

/// Snapshot of pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Total successful acquisitions since the pool was created.
    pub acquisitions: u64,
    /// Sessions currently held by callers.
    pub in_flight: usize,
    /// Highest number of simultaneously held sessions observed.
    pub peak_in_flight: usize,
    /// Sessions started so far (never exceeds capacity).
    pub sessions_started: usize,
}

struct PoolState {
    idle: Vec<RenderSession>,
    started: usize,
}

/// A fixed-capacity pool of rendering sessions shared by all workers.
pub struct RendererPool {
    capacity: usize,
    acquire_timeout: Option<Duration>,
    load_system_fonts: bool,
    state: Mutex<PoolState>,
    available: Condvar,
    acquisitions: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl RendererPool {
    pub fn new(config: RendererConfig) -> Self {
        let capacity = config.sessions.max(1);
        Self {
            capacity,
            acquire_timeout: config.acquire_timeout_ms.map(Duration::from_millis),
            load_system_fonts: config.load_system_fonts,
            state: Mutex::new(PoolState {
                idle: Vec::with_capacity(capacity),
                started: 0,
            }),
            available: Condvar::new(),
            acquisitions: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            acquisitions: self.acquisitions.load(Ordering::Acquire),
            in_flight: self.in_flight.load(Ordering::Acquire),
            peak_in_flight: self.peak_in_flight.load(Ordering::Acquire),
            sessions_started: self.state.lock().started,
        }
    }

    /// Rasterizes `markup` to exactly `width` x `height` pixels.
    ///
    /// Blocks while every session is busy.
    pub fn render(
        &self,
        markup: &str,
        width: u32,
        height: u32,
        flags: RenderFlags,
    ) -> Result<RgbaImage, RenderError> {
        if markup.trim().is_empty() {
            return Err(RenderError::EmptyMarkup);
        }
        surface_size(width, height)?;

        let session = self.acquire()?;
        let _span =
            tracing::trace_span!("render", session = session.id(), width, height).entered();
        session.render(markup, width, height, flags)
    }

    /// Takes a session, starting one if capacity allows, otherwise waiting.
    fn acquire(&self) -> Result<SessionGuard<'_>, RenderError> {
        let deadline = self.acquire_timeout.map(|t| (t, Instant::now() + t));
        let mut state = self.state.lock();

        let session = loop {
            if let Some(session) = state.idle.pop() {
                break session;
            }
            if state.started < self.capacity {
                state.started += 1;
                let id = state.started;
                let load_fonts = self.load_system_fonts;
                // Font loading is slow; don't hold the lock while it runs.
                break MutexGuard::unlocked(&mut state, || RenderSession::start(id, load_fonts));
            }
            match deadline {
                Some((timeout, at)) => {
                    if self.available.wait_until(&mut state, at).timed_out()
                        && state.idle.is_empty()
                    {
                        tracing::warn!(?timeout, "timed out waiting for a rendering session");
                        return Err(RenderError::Timeout(timeout));
                    }
                }
                None => self.available.wait(&mut state),
            }
        };
        drop(state);

        self.acquisitions.fetch_add(1, Ordering::AcqRel);
        let held = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_in_flight.fetch_max(held, Ordering::AcqRel);

        Ok(SessionGuard {
            pool: self,
            session: Some(session),
        })
    }

    fn release(&self, session: RenderSession) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
        self.state.lock().idle.push(session);
        self.available.notify_one();
    }
}

/// Exclusive hold on one session; returns it to the pool when dropped.
struct SessionGuard<'a> {
    pool: &'a RendererPool,
    session: Option<RenderSession>,
}

impl SessionGuard<'_> {
    fn id(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.id)
    }

    fn render(
        &self,
        markup: &str,
        width: u32,
        height: u32,
        flags: RenderFlags,
    ) -> Result<RgbaImage, RenderError> {
        match &self.session {
            Some(session) => session.render(markup, width, height, flags),
            None => Err(RenderError::Surface { width, height }),
        }
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.pool.release(session);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const HALF_RED: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10"><rect x="0" y="0" width="5" height="10" fill="#ff0000"/></svg>"##;

    fn pool(sessions: usize) -> RendererPool {
        RendererPool::new(RendererConfig {
            sessions,
            acquire_timeout_ms: None,
            load_system_fonts: false,
        })
    }

    #[test]
    fn output_is_cropped_to_requested_size() {
        let pool = pool(1);
        let img = pool.render(HALF_RED, 20, 12, RenderFlags::default()).unwrap();
        assert_eq!(img.dimensions(), (20, 12));
    }

    #[test]
    fn content_sits_at_origin_with_transparent_background() {
        let pool = pool(1);
        let img = pool.render(HALF_RED, 10, 10, RenderFlags::default()).unwrap();
        assert_eq!(img.get_pixel(1, 5).0, [255, 0, 0, 255]);
        assert_eq!(img.get_pixel(8, 5).0[3], 0);
    }

    #[test]
    fn rtl_flip_mirrors_horizontally() {
        let pool = pool(1);
        let img = pool
            .render(HALF_RED, 10, 10, RenderFlags { rtl_flip: true })
            .unwrap();
        assert_eq!(img.get_pixel(1, 5).0[3], 0);
        assert_eq!(img.get_pixel(8, 5).0, [255, 0, 0, 255]);
    }

    #[test]
    fn malformed_markup_returns_session() {
        let pool = pool(1);
        let err = pool.render("<svg", 10, 10, RenderFlags::default()).unwrap_err();
        assert!(matches!(err, RenderError::Parse(_)));

        let stats = pool.stats();
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.acquisitions, 1);

        // The same session is reused by the next caller.
        pool.render(HALF_RED, 10, 10, RenderFlags::default()).unwrap();
        assert_eq!(pool.stats().sessions_started, 1);
    }

    #[test]
    fn invalid_input_never_acquires() {
        let pool = pool(1);
        assert!(matches!(
            pool.render("  ", 10, 10, RenderFlags::default()),
            Err(RenderError::EmptyMarkup)
        ));
        assert!(matches!(
            pool.render(HALF_RED, 0, 10, RenderFlags::default()),
            Err(RenderError::InvalidSize { .. })
        ));
        assert_eq!(pool.stats().acquisitions, 0);
    }

    #[test]
    fn oversized_output_is_rejected_before_acquiring() {
        let pool = pool(1);
        for (width, height) in [(u32::MAX - 10, 1), (1, u32::MAX), (i32::MAX as u32, 24)] {
            assert!(matches!(
                pool.render(HALF_RED, width, height, RenderFlags::default()),
                Err(RenderError::InvalidSize { width: w, height: h }) if w == width && h == height
            ));
        }
        assert_eq!(pool.stats().acquisitions, 0);
    }

    #[test]
    fn acquire_times_out_when_all_sessions_busy() {
        let pool = RendererPool::new(RendererConfig {
            sessions: 1,
            acquire_timeout_ms: Some(20),
            load_system_fonts: false,
        });
        let held = pool.acquire().unwrap();
        let err = pool.render(HALF_RED, 10, 10, RenderFlags::default()).unwrap_err();
        assert!(matches!(err, RenderError::Timeout(_)));
        drop(held);
        assert!(pool.render(HALF_RED, 10, 10, RenderFlags::default()).is_ok());
    }

    #[test]
    fn concurrent_flood_never_exceeds_capacity() {
        let pool = Arc::new(pool(2));
        let threads: Vec<_> = (0..16)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    for _ in 0..8 {
                        pool.render(HALF_RED, 32, 32, RenderFlags::default()).unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        let stats = pool.stats();
        assert_eq!(stats.acquisitions, 16 * 8);
        assert_eq!(stats.in_flight, 0);
        assert!(stats.peak_in_flight >= 1);
        assert!(stats.peak_in_flight <= 2);
        assert!(stats.sessions_started <= 2);
    }
}
