//! The capture pipeline.
//!
//! Owns the frame-buffer registry, the sensor's derived state (capture
//! window, row time, exposure, mirroring), the capture state machine
//! and the multi-buffer rotation. All hardware access goes through the
//! [`CameraBackend`] capability trait, so the same pipeline runs
//! against the register shadow on a development host and against the
//! sensor driver on the camera.
//!
//! # Exposure and row time
//!
//! The sensor expresses exposure as a shutter width in row-readout
//! times, and the row time depends on the capture window width plus
//! the horizontal blanking (bounded below by the sensor minimum).
//! The pipeline therefore caches the exposure the application asked
//! for in microseconds and re-derives the shutter-width register
//! whenever the window geometry changes, so exposure survives AOI
//! changes.

pub mod multibuffer;
pub mod sensor;

use tracing::{debug, error, info, warn};

use crate::backend::{BackendKind, CameraBackend, CaptureWindow, TriggerMode};
use crate::debayer::BayerOrder;
use crate::error::{OscarError, OscarResult};
use crate::picture::{PictureType, PictureView};

use multibuffer::MultiBufferSlot;
use sensor::{reg, MAX_FRAME_BUFFERS, MAX_IMAGE_HEIGHT, MAX_IMAGE_WIDTH};

/// Selects which frame buffer an operation applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferSelect {
    /// A specific frame buffer.
    Id(u8),
    /// Resolve through the multi-buffer cursors.
    MultiBuffer,
}

/// Lifecycle state of one frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameBufferStatus {
    #[default]
    Uninitialized,
    Ready,
    CapturingExternalTrigger,
    CapturingManualTrigger,
    Valid,
    Corrupted,
}

impl FrameBufferStatus {
    fn is_capturing(self) -> bool {
        matches!(
            self,
            FrameBufferStatus::CapturingExternalTrigger
                | FrameBufferStatus::CapturingManualTrigger
        )
    }
}

/// Scene orientation relative to the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Perspective {
    #[default]
    Default,
    HorizontalMirror,
    VerticalMirror,
    Rotate180,
}

impl Perspective {
    /// Parse the perspective notation used in configuration files.
    pub fn from_config_str(s: &str) -> OscarResult<Self> {
        match s {
            "DEFAULT" => Ok(Perspective::Default),
            "HORIZONTAL_MIRROR" => Ok(Perspective::HorizontalMirror),
            "VERTICAL_MIRROR" => Ok(Perspective::VerticalMirror),
            "180DEG_ROTATE" => Ok(Perspective::Rotate180),
            other => Err(OscarError::InvalidParameter(format!(
                "unknown perspective `{other}`"
            ))),
        }
    }
}

/// In-place correction applied to a captured frame before it is handed
/// to the application. The calibration module implements this.
pub trait ImageCorrection: Send {
    fn correct(&mut self, img: &mut [u8], window: &CaptureWindow) -> OscarResult<()>;
}

struct FrameBufferEntry {
    data: Vec<u8>,
    #[allow(dead_code)]
    cached: bool,
}

/// The capture pipeline over a host or target backend.
pub struct Camera<B: CameraBackend> {
    backend: B,
    buffers: [Option<FrameBufferEntry>; MAX_FRAME_BUFFERS as usize],
    status: [FrameBufferStatus; MAX_FRAME_BUFFERS as usize],
    multi: MultiBufferSlot,
    /// The current capture window, in scene coordinates (mirroring not
    /// applied).
    window: CaptureWindow,
    /// The window recorded at the last capture setup; this is the
    /// geometry the next read delivers.
    last_capture_window: CaptureWindow,
    last_picture_type: PictureType,
    flip_horizontal: bool,
    flip_vertical: bool,
    /// Pixel clocks between successive row starts.
    row_clks: u32,
    /// Horizontal blanking in pixel clocks.
    horiz_blank: u16,
    /// Exposure requested by the application, in microseconds.
    exposure_us: u32,
    last_valid: Option<u8>,
    correction: Option<Box<dyn ImageCorrection>>,
}

impl<B: CameraBackend> Camera<B> {
    /// Build the pipeline over `backend` and read the current sensor
    /// settings to seed the derived state.
    pub fn new(backend: B) -> OscarResult<Self> {
        let mut cam = Camera {
            backend,
            buffers: Default::default(),
            status: Default::default(),
            multi: MultiBufferSlot::default(),
            window: CaptureWindow::default(),
            last_capture_window: CaptureWindow::default(),
            last_picture_type: PictureType::Greyscale,
            flip_horizontal: false,
            flip_vertical: false,
            row_clks: 0,
            horiz_blank: 0,
            exposure_us: 0,
            last_valid: None,
            correction: None,
        };

        // Build a model of the current sensor state from its registers.
        // Mirroring is considered off until the framework programs a
        // perspective itself; the sensor compensates its power-up flip
        // bits with dummy reads.
        cam.horiz_blank = cam.backend.get_register(reg::HORIZ_BLANK)?;
        // Reading the window back also derives the current row time.
        cam.get_area_of_interest()?;
        cam.exposure_us = cam.get_shutter_width()?;
        Ok(cam)
    }

    /// Which side of the host/target split this camera runs on.
    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Raw sensor register read. Derived state is unaffected.
    pub fn get_register_value(&mut self, addr: u16) -> OscarResult<u16> {
        self.backend.get_register(addr)
    }

    /// Raw sensor register write. No input validation, to retain
    /// flexibility for experiments.
    pub fn set_register_value(&mut self, addr: u16, value: u16) -> OscarResult<()> {
        self.backend.set_register(addr, value)
    }

    /* ------------------------ frame buffers ------------------------ */

    /// Register an application-supplied frame buffer under `id`.
    /// The memory stays registered until [`Self::deregister_frame_buffer`]
    /// returns it.
    pub fn register_frame_buffer(
        &mut self,
        id: u8,
        data: Vec<u8>,
        cached: bool,
    ) -> OscarResult<()> {
        if id >= MAX_FRAME_BUFFERS || data.is_empty() {
            error!(id, size = data.len(), "invalid frame buffer registration");
            return Err(OscarError::InvalidParameter(format!(
                "frame buffer {id} with {} bytes",
                data.len()
            )));
        }
        let slot = usize::from(id);
        if self.buffers[slot].is_some() || self.status[slot] != FrameBufferStatus::Uninitialized {
            error!(id, "unable to set frame buffer: busy");
            return Err(OscarError::FrameBufferBusy(id));
        }

        self.backend.set_frame_buffer(id, &data, cached)?;
        self.buffers[slot] = Some(FrameBufferEntry { data, cached });
        self.status[slot] = FrameBufferStatus::Ready;
        Ok(())
    }

    /// Deregister frame buffer `id` and hand its memory back.
    pub fn deregister_frame_buffer(&mut self, id: u8) -> OscarResult<Vec<u8>> {
        if id >= MAX_FRAME_BUFFERS {
            return Err(OscarError::InvalidParameter(format!("frame buffer {id}")));
        }
        if self.multi.member(id) {
            error!(id, "deleting a frame buffer that is part of a multi buffer");
            return Err(OscarError::CannotDelete(id));
        }
        let slot = usize::from(id);
        if self.status[slot].is_capturing() {
            error!(id, "deleting a frame buffer with a capture in flight");
            return Err(OscarError::FrameBufferBusy(id));
        }
        let entry = self.buffers[slot].take().ok_or_else(|| {
            warn!(id, "deleting an uninitialized frame buffer");
            OscarError::InvalidParameter(format!("frame buffer {id} not registered"))
        })?;

        info!(id, "deleting frame buffer");
        self.backend.clear_frame_buffer(id)?;
        self.status[slot] = FrameBufferStatus::Uninitialized;
        if self.last_valid == Some(id) {
            self.last_valid = None;
        }
        Ok(entry.data)
    }

    /// Current lifecycle state of frame buffer `id`.
    pub fn frame_buffer_status(&self, id: u8) -> OscarResult<FrameBufferStatus> {
        if id >= MAX_FRAME_BUFFERS {
            return Err(OscarError::InvalidParameter(format!("frame buffer {id}")));
        }
        Ok(self.status[usize::from(id)])
    }

    /// Group registered buffers into a multi buffer of depth 2..=8.
    pub fn create_multi_buffer(&mut self, ids: &[u8]) -> OscarResult<()> {
        if ids.len() < 2 || ids.len() > usize::from(MAX_FRAME_BUFFERS) {
            error!(depth = ids.len(), "invalid multi buffer depth");
            return Err(OscarError::InvalidParameter(format!(
                "multi buffer depth {}",
                ids.len()
            )));
        }
        for &id in ids {
            if id >= MAX_FRAME_BUFFERS || self.buffers[usize::from(id)].is_none() {
                error!(id, "invalid frame buffer in multi buffer");
                return Err(OscarError::InvalidParameter(format!(
                    "frame buffer {id} in multi buffer"
                )));
            }
        }
        self.multi.create(ids);
        Ok(())
    }

    /// Dissolve the multi buffer. The member buffers stay registered.
    pub fn delete_multi_buffer(&mut self) -> OscarResult<()> {
        self.multi.destroy();
        Ok(())
    }

    /* ------------------- window, exposure, flips ------------------- */

    /// Mirror a scene-coordinate window into sensor coordinates (and
    /// back; the transformation is its own inverse).
    fn to_sensor_coords(&self, win: &CaptureWindow) -> CaptureWindow {
        let mut out = *win;
        if self.flip_horizontal {
            let mirrored = i32::from(MAX_IMAGE_WIDTH) - i32::from(win.col_off) - i32::from(win.width);
            out.col_off = mirrored.max(0) as u16;
        }
        if self.flip_vertical {
            let mirrored =
                i32::from(MAX_IMAGE_HEIGHT) - i32::from(win.row_off) - i32::from(win.height);
            out.row_off = mirrored.max(0) as u16;
        }
        out
    }

    /// Update the capture window. A zero width or height restores the
    /// sensor maximum. Exposure in microseconds is preserved across the
    /// resulting row-time change.
    pub fn set_area_of_interest(
        &mut self,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
    ) -> OscarResult<()> {
        if width % 2 != 0
            || u32::from(x) + u32::from(width) > u32::from(MAX_IMAGE_WIDTH)
            || u32::from(y) + u32::from(height) > u32::from(MAX_IMAGE_HEIGHT)
        {
            error!(
                x,
                y,
                width,
                height,
                "invalid area of interest: must fit {}x{} and width must be even",
                MAX_IMAGE_WIDTH,
                MAX_IMAGE_HEIGHT
            );
            return Err(OscarError::InvalidParameter(format!(
                "area of interest {width}x{height} at {x}/{y}"
            )));
        }

        self.window = if width == 0 || height == 0 {
            CaptureWindow::new(0, 0, MAX_IMAGE_WIDTH, MAX_IMAGE_HEIGHT)
        } else {
            CaptureWindow::new(x, y, width, height)
        };

        let hw = self.to_sensor_coords(&self.window);
        self.backend.set_capture_window(&hw)?;

        // The row time is the pixel readout time for the row width plus
        // the horizontal blanking, bounded below by the sensor minimum.
        self.row_clks =
            (u32::from(self.window.width) + u32::from(self.horiz_blank)).max(sensor::MIN_ROW_CLKS);

        // The shutter width is quantized in row times, so re-derive it
        // for the new geometry.
        self.set_shutter_width(self.exposure_us)?;

        debug!(
            width = self.window.width,
            height = self.window.height,
            x = self.window.col_off,
            y = self.window.row_off,
            "area of interest set"
        );
        Ok(())
    }

    /// Read the capture window back from the sensor registers, in scene
    /// coordinates. Also refreshes the derived row time.
    pub fn get_area_of_interest(&mut self) -> OscarResult<(u16, u16, u16, u16)> {
        let read = |cam: &mut Self| -> OscarResult<CaptureWindow> {
            Ok(CaptureWindow::new(
                cam.backend.get_register(reg::COL_START)?,
                cam.backend.get_register(reg::ROW_START)?,
                cam.backend.get_register(reg::WIN_WIDTH)?,
                cam.backend.get_register(reg::WIN_HEIGHT)?,
            ))
        };
        let hw = read(self).map_err(|err| {
            error!(%err, "error retrieving area of interest from the sensor");
            err
        })?;
        self.window = self.to_sensor_coords(&hw);

        self.row_clks =
            (u32::from(self.window.width) + u32::from(self.horiz_blank)).max(sensor::MIN_ROW_CLKS);

        Ok((
            self.window.col_off,
            self.window.row_off,
            self.window.width,
            self.window.height,
        ))
    }

    /// Set the exposure time in microseconds. Zero engages the sensor's
    /// automatic exposure control.
    pub fn set_shutter_width(&mut self, usecs: u32) -> OscarResult<()> {
        // Convert to pixel clocks, then to rows with rounding.
        let pixel_clks = u64::from(usecs) * u64::from(sensor::PIX_CLKS_PER_US);
        let row_clks = u64::from(self.row_clks.max(1));
        let shutter = ((pixel_clks + row_clks / 2) / row_clks) as u16;

        self.backend.set_register(reg::SHUTTER_WIDTH, shutter)?;
        self.exposure_us = usecs;
        Ok(())
    }

    /// Exposure time in microseconds as currently programmed, derived
    /// from the shutter-width register and the current row time.
    pub fn get_shutter_width(&mut self) -> OscarResult<u32> {
        let shutter = self.backend.get_register(reg::SHUTTER_WIDTH)?;
        Ok(
            (u64::from(shutter) * u64::from(self.row_clks) / u64::from(sensor::PIX_CLKS_PER_US))
                as u32,
        )
    }

    /// Offset added to every pixel to push the black histogram above
    /// zero. Stored left-shifted by two in the row-noise register.
    pub fn set_black_level_offset(&mut self, offset: u16) -> OscarResult<()> {
        let val = (u32::from(offset) << 2).min(0xff) as u16;
        self.backend.set_register(reg::ROW_NOISE_CONST, val)
    }

    pub fn get_black_level_offset(&mut self) -> OscarResult<u16> {
        Ok(self.backend.get_register(reg::ROW_NOISE_CONST)? >> 2)
    }

    /// Configure the scene perspective via the sensor's mirroring bits.
    pub fn set_perspective(&mut self, perspective: Perspective) -> OscarResult<()> {
        let (row_flip, col_flip) = match perspective {
            Perspective::Default => (false, false),
            Perspective::HorizontalMirror => (false, true),
            Perspective::VerticalMirror => (true, false),
            Perspective::Rotate180 => (true, true),
        };

        let mut read_mode = self.backend.get_register(reg::READ_MODE)?;
        if row_flip {
            read_mode |= 1 << reg::READ_MODE_ROW_FLIP;
        } else {
            read_mode &= !(1 << reg::READ_MODE_ROW_FLIP);
        }
        if col_flip {
            read_mode |= 1 << reg::READ_MODE_COL_FLIP;
        } else {
            read_mode &= !(1 << reg::READ_MODE_COL_FLIP);
        }
        self.backend.set_register(reg::READ_MODE, read_mode)?;

        self.flip_horizontal = col_flip;
        self.flip_vertical = row_flip;
        Ok(())
    }

    /// Bring the sensor into the operating state the framework expects:
    /// snapshot mode, AGC/AEC off, default black level, exposure and
    /// window.
    pub fn preset_registers(&mut self) -> OscarResult<()> {
        // Reset frame capture and AGC/exposure logic. Registers are not
        // set back to their power-up defaults.
        self.backend.set_register(reg::RESET, 3)?;
        // Snapshot mode with simultaneous readout.
        self.backend.set_register(reg::CHIP_CONTROL, 0x398)?;
        // Colour sensor, linear response.
        self.backend.set_register(reg::PIXEL_OP_MODE, 0x0015)?;
        self.backend
            .set_register(reg::RESERVED_0X20, 0x03d5)?;
        // Disable AGC/AEC.
        self.backend.set_register(reg::AEC_AGC_ENA, 0x0)?;

        self.set_black_level_offset(sensor::DEFAULT_BLACK_LEVEL)?;
        self.set_shutter_width(sensor::DEFAULT_EXPOSURE_US)?;
        self.set_area_of_interest(0, 0, 0, 0)?;
        self.set_perspective(Perspective::Default)?;
        Ok(())
    }

    /// First-row Bayer order of a readout starting at `(x, y)`.
    ///
    /// The sensor compensates mirrored readout with dummy columns and
    /// rows, so the order at the origin is always RGRG; only the window
    /// offset parity shifts it.
    pub fn bayer_order_at(&self, x: u16, y: u16) -> OscarResult<BayerOrder> {
        if x >= MAX_IMAGE_WIDTH || y >= MAX_IMAGE_HEIGHT {
            return Err(OscarError::InvalidParameter(format!(
                "pixel position {x}/{y}"
            )));
        }
        let mut first_row_red = true;
        let mut first_pix_green = false;
        if x % 2 != 0 {
            first_pix_green = !first_pix_green;
        }
        if y % 2 != 0 {
            first_row_red = !first_row_red;
            first_pix_green = !first_pix_green;
        }
        Ok(match (first_row_red, first_pix_green) {
            (true, true) => BayerOrder::Grgr,
            (true, false) => BayerOrder::Rgrg,
            (false, true) => BayerOrder::Gbgb,
            (false, false) => BayerOrder::Bgbg,
        })
    }

    /* --------------------------- capture --------------------------- */

    fn resolve_capture_buffer(&self, select: BufferSelect) -> OscarResult<u8> {
        match select {
            BufferSelect::Id(id) if id < MAX_FRAME_BUFFERS => Ok(id),
            BufferSelect::Id(id) => {
                Err(OscarError::InvalidParameter(format!("frame buffer {id}")))
            }
            BufferSelect::MultiBuffer => self
                .multi
                .get()
                .map(|mb| mb.capture_buffer())
                .ok_or_else(|| OscarError::InvalidParameter("no multi buffer created".into())),
        }
    }

    /// Arm a capture into the selected buffer for the next trigger.
    pub fn setup_capture(&mut self, select: BufferSelect, mode: TriggerMode) -> OscarResult<()> {
        let fb = self.resolve_capture_buffer(select)?;

        if self.window.width == 0 || self.window.height == 0 {
            error!("no area of interest set");
            return Err(OscarError::NoAreaOfInterestSet);
        }
        if self.buffers[usize::from(fb)].is_none() {
            error!(fb, "capture into unregistered frame buffer");
            return Err(OscarError::InvalidParameter(format!(
                "frame buffer {fb} not registered"
            )));
        }
        for (i, status) in self.status.iter().enumerate() {
            if status.is_capturing() {
                // The sensor can only fill one buffer at a time, and we
                // do not know how long ago the previous capture was
                // armed.
                warn!(
                    armed = i,
                    requested = fb,
                    "already capturing to a different frame buffer"
                );
            }
        }

        let hw = self.to_sensor_coords(&self.window);
        self.backend.trigger_capture(fb, &hw, mode)?;

        self.status[usize::from(fb)] = match mode {
            TriggerMode::External => FrameBufferStatus::CapturingExternalTrigger,
            TriggerMode::Manual => FrameBufferStatus::CapturingManualTrigger,
        };
        if select == BufferSelect::MultiBuffer {
            if let Some(mb) = self.multi.get_mut() {
                mb.on_capture();
            }
        }
        // Record the window for the read that will complete this
        // capture; the application may change the AOI in between.
        self.last_capture_window = self.window;

        debug!(
            fb,
            width = self.window.width,
            height = self.window.height,
            "capture set up"
        );
        Ok(())
    }

    /// Abort the capture currently in flight. The affected buffer may
    /// be partially written and is marked corrupted.
    pub fn cancel_capture(&mut self) -> OscarResult<()> {
        let Some(armed) = self.status.iter().position(|s| s.is_capturing()) else {
            warn!("cancel request with no capture in flight");
            return Err(OscarError::NothingToAbort);
        };
        self.backend.abort_capture()?;
        // Assume the worst: the DMA may have half-filled the buffer.
        self.status[armed] = FrameBufferStatus::Corrupted;
        Ok(())
    }

    fn resolve_sync_buffer(&self, select: BufferSelect) -> OscarResult<u8> {
        match select {
            BufferSelect::Id(id) if id < MAX_FRAME_BUFFERS => Ok(id),
            BufferSelect::Id(id) => {
                Err(OscarError::InvalidParameter(format!("frame buffer {id}")))
            }
            BufferSelect::MultiBuffer => {
                let mb = self
                    .multi
                    .get()
                    .ok_or_else(|| OscarError::InvalidParameter("no multi buffer created".into()))?;
                mb.sync_buffer().ok_or_else(|| {
                    error!("no capture started");
                    OscarError::NoCaptureStarted
                })
            }
        }
    }

    /// Block until the armed frame has landed in the selected buffer,
    /// apply the registered correction, and return a view of the pixel
    /// data.
    ///
    /// A `Timeout` result leaves the multi-buffer cursors untouched so
    /// the next read retries the same buffer.
    pub fn read_picture(
        &mut self,
        select: BufferSelect,
        max_age_ms: u16,
        timeout_ms: u16,
    ) -> OscarResult<PictureView<'_>> {
        let fb = self.resolve_sync_buffer(select)?;
        let slot = usize::from(fb);

        if !self.status[slot].is_capturing() {
            error!(fb, "no capture started on this frame buffer");
            return Err(OscarError::NoCaptureStarted);
        }

        let window = self.last_capture_window;
        debug!(fb, max_age_ms, timeout_ms, "syncing capture");

        let entry = self.buffers[slot]
            .as_mut()
            .ok_or_else(|| OscarError::InvalidParameter(format!("frame buffer {fb}")))?;

        self.last_picture_type =
            self.backend
                .sync_capture(fb, &mut entry.data, &window, max_age_ms, timeout_ms)?;
        self.status[slot] = FrameBufferStatus::Valid;

        // On real hardware the raw frame still carries the sensor's
        // fixed-pattern artifacts; the host stand-in image does not.
        if self.backend.kind() == BackendKind::Target {
            if let Some(hook) = self.correction.as_mut() {
                hook.correct(&mut entry.data, &window)?;
            }
        }

        if select == BufferSelect::MultiBuffer {
            if let Some(mb) = self.multi.get_mut() {
                mb.on_sync();
            }
        }

        if self.window != window {
            // The geometry changed since this capture was armed; a
            // "latest picture" in the old format would surprise the
            // application.
            self.last_valid = None;
        } else {
            self.last_valid = Some(fb);
        }

        let len = window.pixel_count() * self.last_picture_type.bytes_per_pixel();
        Ok(PictureView {
            data: &entry.data[..len],
            width: u32::from(window.width),
            height: u32::from(window.height),
            pixel_type: self.last_picture_type,
        })
    }

    /// A view of the most recently read frame.
    pub fn read_latest_picture(&self) -> OscarResult<PictureView<'_>> {
        let fb = self.last_valid.ok_or(OscarError::NoMatchingPicture)?;
        let entry = self.buffers[usize::from(fb)]
            .as_ref()
            .ok_or(OscarError::NoMatchingPicture)?;

        debug!(fb, "returning latest picture");
        let len = self.last_capture_window.pixel_count() * self.last_picture_type.bytes_per_pixel();
        Ok(PictureView {
            data: &entry.data[..len],
            width: u32::from(self.last_capture_window.width),
            height: u32::from(self.last_capture_window.height),
            pixel_type: self.last_picture_type,
        })
    }

    /// Register the correction applied in place after every completed
    /// read on real hardware.
    pub fn register_correction_hook(&mut self, hook: Box<dyn ImageCorrection>) {
        if self.correction.is_some() {
            warn!("replacing registered correction hook");
        }
        self.correction = Some(hook);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HostBackend;
    use crate::simulation::Simulation;
    use std::sync::{Arc, Mutex};

    fn host_camera() -> Camera<HostBackend> {
        let sim = Arc::new(Mutex::new(Simulation::new()));
        Camera::new(HostBackend::new(sim)).unwrap()
    }

    #[test]
    fn shutter_width_is_quantized_in_row_times() {
        let mut cam = host_camera();
        cam.preset_registers().unwrap();

        cam.set_shutter_width(15_000).unwrap();
        let reported = cam.get_shutter_width().unwrap();
        // One row time at the default window is 795 pixel clocks.
        let row_time_us = 795 / sensor::PIX_CLKS_PER_US + 1;
        assert!(reported.abs_diff(15_000) <= row_time_us);
    }

    #[test]
    fn exposure_survives_aoi_changes() {
        let mut cam = host_camera();
        cam.preset_registers().unwrap();
        cam.set_shutter_width(15_000).unwrap();
        let wide = cam.get_register_value(reg::SHUTTER_WIDTH).unwrap();

        cam.set_area_of_interest(0, 0, 128, 128).unwrap();
        let narrow = cam.get_register_value(reg::SHUTTER_WIDTH).unwrap();

        // Fewer pixel clocks per row but the row time is clamped at the
        // sensor minimum, so the register must grow.
        assert!(narrow > wide);
        let reported = cam.get_shutter_width().unwrap();
        assert!(reported.abs_diff(15_000) <= sensor::MIN_ROW_CLKS / sensor::PIX_CLKS_PER_US + 1);
    }

    #[test]
    fn aoi_round_trips_through_the_registers() {
        let mut cam = host_camera();
        cam.set_area_of_interest(10, 20, 100, 80).unwrap();
        assert_eq!(cam.get_area_of_interest().unwrap(), (10, 20, 100, 80));
    }

    #[test]
    fn aoi_round_trips_under_mirroring() {
        let mut cam = host_camera();
        cam.set_perspective(Perspective::Rotate180).unwrap();
        cam.set_area_of_interest(10, 20, 100, 80).unwrap();
        assert_eq!(cam.get_area_of_interest().unwrap(), (10, 20, 100, 80));
    }

    #[test]
    fn aoi_bounds_are_enforced() {
        let mut cam = host_camera();
        assert!(matches!(
            cam.set_area_of_interest(0, 0, 753, 480),
            Err(OscarError::InvalidParameter(_))
        ));
        // Odd width.
        assert!(matches!(
            cam.set_area_of_interest(0, 0, 101, 100),
            Err(OscarError::InvalidParameter(_))
        ));
        cam.set_area_of_interest(0, 0, 128, 128).unwrap();
        // Zero restores the maximum window.
        cam.set_area_of_interest(0, 0, 0, 0).unwrap();
        assert_eq!(cam.get_area_of_interest().unwrap(), (0, 0, 752, 480));
    }

    #[test]
    fn black_level_round_trips_and_clamps() {
        let mut cam = host_camera();
        cam.set_black_level_offset(13).unwrap();
        assert_eq!(cam.get_black_level_offset().unwrap(), 13);
        // Values that would overflow the register clamp to the top.
        cam.set_black_level_offset(200).unwrap();
        assert_eq!(cam.get_black_level_offset().unwrap(), 0xff >> 2);
    }

    #[test]
    fn buffer_registry_guards() {
        let mut cam = host_camera();
        cam.register_frame_buffer(0, vec![0u8; 16], false).unwrap();
        assert!(matches!(
            cam.register_frame_buffer(0, vec![0u8; 16], false),
            Err(OscarError::FrameBufferBusy(0))
        ));
        assert!(matches!(
            cam.register_frame_buffer(8, vec![0u8; 16], false),
            Err(OscarError::InvalidParameter(_))
        ));

        cam.register_frame_buffer(1, vec![0u8; 16], false).unwrap();
        cam.create_multi_buffer(&[0, 1]).unwrap();
        assert!(matches!(
            cam.deregister_frame_buffer(0),
            Err(OscarError::CannotDelete(0))
        ));
        cam.delete_multi_buffer().unwrap();
        let data = cam.deregister_frame_buffer(0).unwrap();
        assert_eq!(data.len(), 16);
    }

    #[test]
    fn bayer_order_follows_window_parity() {
        let cam = host_camera();
        assert_eq!(cam.bayer_order_at(0, 0).unwrap(), BayerOrder::Rgrg);
        assert_eq!(cam.bayer_order_at(1, 0).unwrap(), BayerOrder::Grgr);
        assert_eq!(cam.bayer_order_at(0, 1).unwrap(), BayerOrder::Gbgb);
        assert_eq!(cam.bayer_order_at(1, 1).unwrap(), BayerOrder::Bgbg);
    }
}
