//! The host/target capability split.
//!
//! Everything the capture pipeline needs from "the hardware" is behind
//! the [`CameraBackend`] trait: register access, frame-buffer
//! announcement, capture window programming, trigger/abort/sync. The
//! host implementation keeps a register shadow and reads frames from
//! disk; the target implementation (behind the `hardware` feature)
//! issues ioctls to the sensor driver. The rest of the pipeline is the
//! same code on both.

use std::time::Instant;

use crate::error::OscarResult;
use crate::picture::PictureType;

pub mod host;
#[cfg(feature = "hardware")]
pub mod target;

pub use host::HostBackend;
#[cfg(feature = "hardware")]
pub use target::TargetBackend;

/// Which side of the host/target split a backend implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Development host: register shadow, frames from disk.
    Host,
    /// Camera hardware: sensor driver ioctls, real DMA.
    Target,
}

/// The area of the sensor that is actually read out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CaptureWindow {
    /// Column (x) offset of the window.
    pub col_off: u16,
    /// Row (y) offset of the window.
    pub row_off: u16,
    pub width: u16,
    pub height: u16,
}

impl CaptureWindow {
    pub fn new(col_off: u16, row_off: u16, width: u16, height: u16) -> Self {
        CaptureWindow {
            col_off,
            row_off,
            width,
            height,
        }
    }

    /// Number of pixels in the window.
    pub fn pixel_count(&self) -> usize {
        usize::from(self.width) * usize::from(self.height)
    }
}

/// How a capture is triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    /// The sensor is triggered by an external trigger edge.
    External,
    /// The sensor is triggered over a GPIO by software.
    Manual,
}

/// Capability set the capture pipeline consumes.
///
/// Backends do not hold pipeline policy: validation, derived sensor
/// state and the buffer state machine all live in the camera module.
pub trait CameraBackend {
    fn kind(&self) -> BackendKind;

    /// Read a sensor register.
    fn get_register(&mut self, addr: u16) -> OscarResult<u16>;

    /// Write a sensor register.
    fn set_register(&mut self, addr: u16, value: u16) -> OscarResult<()>;

    /// Announce an application frame buffer to the capture machinery.
    fn set_frame_buffer(&mut self, id: u8, data: &[u8], cached: bool) -> OscarResult<()>;

    /// Withdraw a previously announced frame buffer.
    fn clear_frame_buffer(&mut self, id: u8) -> OscarResult<()>;

    /// Program the capture window (already in sensor coordinates, i.e.
    /// with any mirroring applied).
    fn set_capture_window(&mut self, window: &CaptureWindow) -> OscarResult<()>;

    /// Arm a capture into frame buffer `id` for the next trigger.
    fn trigger_capture(
        &mut self,
        id: u8,
        window: &CaptureWindow,
        mode: TriggerMode,
    ) -> OscarResult<()>;

    /// Abort the capture currently in flight.
    fn abort_capture(&mut self) -> OscarResult<()>;

    /// Block until the frame for buffer `id` has landed in `buf`.
    ///
    /// `window` is the capture window recorded when the capture was set
    /// up; the host uses it to crop the stand-in image, the target
    /// already captured with it. Returns the pixel layout delivered.
    fn sync_capture(
        &mut self,
        id: u8,
        buf: &mut [u8],
        window: &CaptureWindow,
        max_age_ms: u16,
        timeout_ms: u16,
    ) -> OscarResult<PictureType>;
}

/// Free-running cycle counter.
///
/// On the host this is derived from the process monotonic clock at a
/// microsecond resolution; on the target it reads the core cycle
/// register. Only differences of two readings are meaningful.
pub fn cycles() -> u32 {
    static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    let start = START.get_or_init(Instant::now);
    start.elapsed().as_micros() as u32
}

/// Convert a cycle-counter difference to microseconds.
pub fn cycles_to_micro_secs(cycles: u32) -> u32 {
    // Host cycles already tick at 1 MHz.
    cycles
}
