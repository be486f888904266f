//! Target implementation of the camera backend.
//!
//! Talks to the mt9v032 kernel driver over ioctls on the video device
//! node. Register reads and writes go to the real sensor; capture
//! setup, abort and sync are forwarded to the driver, which owns the
//! sensor DMA.

// ioctls and the watchdog device require raw FFI calls. Each call site
// documents its argument lifetimes.
#![allow(unsafe_code)]

mod raw;

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::fd::AsRawFd;
use std::os::raw::c_int;
use std::path::Path;

use nix::errno::Errno;
use tracing::{debug, error};

use crate::backend::{BackendKind, CameraBackend, CaptureWindow, TriggerMode};
use crate::error::{OscarError, OscarResult};
use crate::picture::PictureType;

/// The device node which represents the camera.
pub const VIDEO_DEVICE_FILE: &str = "/dev/video0";
/// The hardware watchdog device node.
pub const WATCHDOG_DEVICE_FILE: &str = "/dev/watchdog";

pub struct TargetBackend {
    video: File,
}

fn map_errno(errno: Errno, context: &str) -> OscarError {
    match errno {
        Errno::EINVAL => OscarError::InvalidParameter(context.to_owned()),
        Errno::EBUSY => OscarError::DeviceBusy,
        Errno::EAGAIN | Errno::EINTR => OscarError::Timeout,
        Errno::ERANGE => OscarError::PictureTooOld,
        Errno::ENOMEM => OscarError::OutOfMemory,
        other => OscarError::Device(format!("{context}: {other}")),
    }
}

impl TargetBackend {
    /// Open the default video device node.
    pub fn new() -> OscarResult<Self> {
        Self::with_device(Path::new(VIDEO_DEVICE_FILE))
    }

    /// Open a specific video device node.
    pub fn with_device(path: &Path) -> OscarResult<Self> {
        let video = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| {
                error!(device = %path.display(), %source, "unable to open video device");
                OscarError::UnableToOpenFile {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
        Ok(TargetBackend { video })
    }

    fn fd(&self) -> i32 {
        self.video.as_raw_fd()
    }
}

impl From<&CaptureWindow> for raw::capture_window {
    fn from(win: &CaptureWindow) -> Self {
        raw::capture_window {
            width: c_int::from(win.width),
            height: c_int::from(win.height),
            col_off: c_int::from(win.col_off),
            row_off: c_int::from(win.row_off),
        }
    }
}

impl CameraBackend for TargetBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Target
    }

    fn get_register(&mut self, addr: u16) -> OscarResult<u16> {
        let mut reg = raw::reg_info {
            addr: c_int::from(addr),
            value: 0,
        };
        // SAFETY: `reg` lives for the duration of the call and matches
        // the driver's argument layout.
        unsafe { raw::cam_get_register(self.fd(), &mut reg) }
            .map_err(|e| map_errno(e, "get register"))?;
        Ok(reg.value as u16)
    }

    fn set_register(&mut self, addr: u16, value: u16) -> OscarResult<()> {
        let reg = raw::reg_info {
            addr: c_int::from(addr),
            value: c_int::from(value),
        };
        // SAFETY: see `get_register`.
        unsafe { raw::cam_set_register(self.fd(), &reg) }
            .map_err(|e| map_errno(e, "set register"))?;
        Ok(())
    }

    fn set_frame_buffer(&mut self, id: u8, data: &[u8], cached: bool) -> OscarResult<()> {
        let fb = raw::frame_buffer {
            size: data.len() as c_int,
            id: c_int::from(id),
            flags: if cached { raw::FB_FLAG_CACHED } else { 0 },
            data: data.as_ptr() as *mut _,
        };
        // SAFETY: the driver stores the pointer; the capture pipeline
        // guarantees the registered buffer outlives its registration.
        unsafe { raw::cam_set_frame_buffer(self.fd(), &fb) }
            .map_err(|e| map_errno(e, "set frame buffer"))?;
        Ok(())
    }

    fn clear_frame_buffer(&mut self, id: u8) -> OscarResult<()> {
        let fb = raw::frame_buffer {
            size: 0,
            id: c_int::from(id),
            flags: 0,
            data: std::ptr::null_mut(),
        };
        // SAFETY: a null data pointer withdraws the buffer.
        unsafe { raw::cam_set_frame_buffer(self.fd(), &fb) }
            .map_err(|e| map_errno(e, "clear frame buffer"))?;
        Ok(())
    }

    fn set_capture_window(&mut self, window: &CaptureWindow) -> OscarResult<()> {
        let win = raw::capture_window::from(window);
        // SAFETY: `win` is a plain value matching the driver layout.
        unsafe { raw::cam_set_window(self.fd(), &win) }
            .map_err(|e| map_errno(e, "set capture window"))?;
        Ok(())
    }

    fn trigger_capture(
        &mut self,
        id: u8,
        window: &CaptureWindow,
        mode: TriggerMode,
    ) -> OscarResult<()> {
        let cp = raw::capture_param {
            window: raw::capture_window::from(window),
            frame_buffer: c_int::from(id),
            trigger_mode: match mode {
                TriggerMode::External => raw::TRIGGER_MODE_EXTERNAL,
                TriggerMode::Manual => raw::TRIGGER_MODE_MANUAL,
            },
        };
        debug!(id, width = window.width, height = window.height, "arming capture");
        // SAFETY: `cp` is a plain value matching the driver layout.
        unsafe { raw::cam_capture(self.fd(), &cp) }.map_err(|e| map_errno(e, "trigger capture"))?;
        Ok(())
    }

    fn abort_capture(&mut self) -> OscarResult<()> {
        let arg: c_int = 0;
        // SAFETY: the abort ioctl takes a dummy integer argument.
        unsafe { raw::cam_abort_capture(self.fd(), &arg) }.map_err(|e| match e {
            Errno::ENOENT => OscarError::NoMatchingPicture,
            other => map_errno(other, "abort capture"),
        })?;
        Ok(())
    }

    fn sync_capture(
        &mut self,
        id: u8,
        _buf: &mut [u8],
        _window: &CaptureWindow,
        max_age_ms: u16,
        timeout_ms: u16,
    ) -> OscarResult<PictureType> {
        let mut sp = raw::sync_param {
            frame: c_int::from(id),
            timeout: u32::from(timeout_ms),
            max_age: u32::from(max_age_ms),
        };
        // SAFETY: `sp` lives for the duration of the blocking call. The
        // driver writes the frame into the buffer registered for `id`;
        // the capture pipeline passed that same buffer in `_buf`.
        unsafe { raw::cam_sync(self.fd(), &mut sp) }.map_err(|e| map_errno(e, "capture sync"))?;
        Ok(PictureType::Greyscale)
    }
}

/// Hardware watchdog of the camera board.
///
/// Once initialized, the board resets unless [`Watchdog::keep_alive`]
/// is called periodically. Dropping the handle closes the device with
/// the magic close character so the reset does not fire afterwards.
pub struct Watchdog {
    device: File,
}

impl Watchdog {
    pub fn init() -> OscarResult<Self> {
        let device = OpenOptions::new()
            .write(true)
            .open(WATCHDOG_DEVICE_FILE)
            .map_err(|source| OscarError::UnableToOpenFile {
                path: WATCHDOG_DEVICE_FILE.into(),
                source,
            })?;
        Ok(Watchdog { device })
    }

    pub fn keep_alive(&mut self) {
        let _ = self.device.write_all(b"\0");
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        // Magic close: tells the driver this was an orderly shutdown.
        let _ = self.device.write_all(b"V");
    }
}
