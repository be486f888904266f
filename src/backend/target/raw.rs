//! FFI definitions matching the mt9v032 sensor driver ABI.
//!
//! These types mirror the kernel driver's argument structs and should
//! not be exposed as public API.

#![allow(bad_style)]
#![allow(dead_code)]

use std::os::raw::{c_int, c_uchar, c_uint, c_void};

use nix::{ioctl_read, ioctl_write_ptr};

/// The memory of this frame buffer is in a cached region.
pub const FB_FLAG_CACHED: c_int = 0x1;

/// CMOS sensor is triggered by an external trigger.
pub const TRIGGER_MODE_EXTERNAL: c_int = 1;
/// CMOS sensor is triggered manually over a GPIO.
pub const TRIGGER_MODE_MANUAL: c_int = 2;

#[repr(C)]
#[derive(Debug)]
pub struct frame_buffer {
    pub size: c_int,
    pub id: c_int,
    pub flags: c_int,
    pub data: *mut c_void,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct capture_window {
    pub width: c_int,
    pub height: c_int,
    pub col_off: c_int,
    pub row_off: c_int,
}

#[repr(C)]
#[derive(Debug)]
pub struct capture_param {
    pub window: capture_window,
    pub frame_buffer: c_int,
    pub trigger_mode: c_int,
}

#[repr(C)]
#[derive(Debug)]
pub struct image_info {
    pub window: capture_window,
    pub fbuf: *mut c_uchar,
}

#[repr(C)]
#[derive(Debug)]
pub struct reg_info {
    pub addr: c_int,
    pub value: c_int,
}

#[repr(C)]
#[derive(Debug)]
pub struct sync_param {
    pub frame: c_int,
    /// Milliseconds to wait for pixel data; 0 means no timeout. The
    /// driver reports EAGAIN on expiry.
    pub timeout: c_uint,
    /// Maximum age of the picture to accept in milliseconds; 0 means
    /// no restriction. The driver reports ERANGE when exceeded.
    pub max_age: c_uint,
}

const MT9V032_MAGIC: u8 = b'm';

ioctl_write_ptr!(cam_set_frame_buffer, MT9V032_MAGIC, 0, frame_buffer);
ioctl_write_ptr!(cam_set_window, MT9V032_MAGIC, 2, capture_window);
ioctl_read!(cam_get_window, MT9V032_MAGIC, 3, capture_window);
ioctl_write_ptr!(cam_capture, MT9V032_MAGIC, 4, capture_param);
ioctl_write_ptr!(cam_abort_capture, MT9V032_MAGIC, 5, c_int);
ioctl_read!(cam_sync, MT9V032_MAGIC, 5, sync_param);
ioctl_read!(cam_get_last_frame, MT9V032_MAGIC, 6, image_info);
ioctl_write_ptr!(cam_set_register, MT9V032_MAGIC, 7, reg_info);
ioctl_read!(cam_get_register, MT9V032_MAGIC, 8, reg_info);
