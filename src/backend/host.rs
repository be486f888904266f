//! Host implementation of the camera backend.
//!
//! Keeps a shadow of the MT9V032 register file seeded with the power-up
//! defaults and simulates captures by loading the bitmap named by the
//! filename reader for the current simulation time step, cropped to the
//! window recorded at capture setup.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, error};

use crate::backend::{BackendKind, CameraBackend, CaptureWindow, TriggerMode};
use crate::bitmap;
use crate::camera::sensor;
use crate::error::{OscarError, OscarResult};
use crate::filename_reader::FilenameReader;
use crate::picture::{Picture, PictureType};
use crate::simulation::Simulation;

/// Shared handle to the simulation clock.
pub type SharedSimulation = Arc<Mutex<Simulation>>;
/// Shared handle to a filename reader.
pub type SharedReader = Arc<Mutex<FilenameReader>>;

pub struct HostBackend {
    /// Register shadow, `(address, value)` pairs.
    regs: Vec<(u16, u16)>,
    sim: SharedSimulation,
    reader: Option<SharedReader>,
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl HostBackend {
    /// A backend with default register contents and no filename reader.
    pub fn new(sim: SharedSimulation) -> Self {
        HostBackend {
            regs: sensor::DEFAULT_REGISTERS.to_vec(),
            sim,
            reader: None,
        }
    }

    /// Attach the filename reader resolving which disk image stands in
    /// for each captured frame. The reader is advanced on every
    /// simulation tick. Replacing an existing reader is allowed but
    /// logged, since it usually indicates a setup mistake.
    pub fn set_filename_reader(&mut self, reader: SharedReader) {
        if self.reader.is_some() {
            tracing::warn!("replacing filename reader already associated with the camera");
        }
        let cb_reader = Arc::clone(&reader);
        lock(&self.sim)
            .register_cycle_callback(Box::new(move |step| {
                lock(&cb_reader).on_cycle(step);
            }))
            .ok();
        self.reader = Some(reader);
    }

    /// Attach a filename reader from its configuration file.
    pub fn set_filename_reader_from_config(&mut self, config: &Path) -> OscarResult<SharedReader> {
        let reader = Arc::new(Mutex::new(FilenameReader::from_config_file(config)?));
        self.set_filename_reader(Arc::clone(&reader));
        Ok(reader)
    }

    fn find_reg(&mut self, addr: u16) -> OscarResult<&mut (u16, u16)> {
        self.regs
            .iter_mut()
            .find(|(a, _)| *a == addr)
            .ok_or_else(|| OscarError::InvalidParameter(format!("no sensor register 0x{addr:02x}")))
    }

    /// Crop `pic` to `window` and store the result in `buf`.
    fn crop_into(
        buf: &mut [u8],
        pic: &Picture,
        window: &CaptureWindow,
    ) -> OscarResult<()> {
        if u32::from(window.col_off) + u32::from(window.width) > pic.width
            || u32::from(window.row_off) + u32::from(window.height) > pic.height
        {
            error!(
                pic_width = pic.width,
                pic_height = pic.height,
                ?window,
                "test image too small for the capture window"
            );
            return Err(OscarError::PictureTooSmall);
        }

        let bpp = pic.pixel_type.bytes_per_pixel();
        let cropped_size = window.pixel_count() * bpp;
        if cropped_size > buf.len() {
            return Err(OscarError::BufferTooSmall {
                needed: cropped_size,
                available: buf.len(),
            });
        }

        let src_stride = pic.width as usize * bpp;
        let dst_stride = usize::from(window.width) * bpp;
        let mut src_off =
            usize::from(window.row_off) * src_stride + usize::from(window.col_off) * bpp;
        let mut dst_off = 0;
        for _ in 0..window.height {
            buf[dst_off..dst_off + dst_stride]
                .copy_from_slice(&pic.data[src_off..src_off + dst_stride]);
            src_off += src_stride;
            dst_off += dst_stride;
        }
        Ok(())
    }
}

impl CameraBackend for HostBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Host
    }

    fn get_register(&mut self, addr: u16) -> OscarResult<u16> {
        Ok(self.find_reg(addr)?.1)
    }

    fn set_register(&mut self, addr: u16, value: u16) -> OscarResult<()> {
        self.find_reg(addr)?.1 = value;
        Ok(())
    }

    fn set_frame_buffer(&mut self, _id: u8, _data: &[u8], _cached: bool) -> OscarResult<()> {
        // Nothing to announce; the capture pipeline owns the registry.
        Ok(())
    }

    fn clear_frame_buffer(&mut self, _id: u8) -> OscarResult<()> {
        Ok(())
    }

    fn set_capture_window(&mut self, window: &CaptureWindow) -> OscarResult<()> {
        self.set_register(sensor::reg::COL_START, window.col_off)?;
        self.set_register(sensor::reg::ROW_START, window.row_off)?;
        self.set_register(sensor::reg::WIN_WIDTH, window.width)?;
        self.set_register(sensor::reg::WIN_HEIGHT, window.height)?;
        Ok(())
    }

    fn trigger_capture(
        &mut self,
        id: u8,
        window: &CaptureWindow,
        mode: TriggerMode,
    ) -> OscarResult<()> {
        // A picture can be read from file at any time; arming is a
        // pure bookkeeping step on the host.
        debug!(
            id,
            width = window.width,
            height = window.height,
            ?mode,
            "capture armed"
        );
        Ok(())
    }

    fn abort_capture(&mut self) -> OscarResult<()> {
        Ok(())
    }

    fn sync_capture(
        &mut self,
        id: u8,
        buf: &mut [u8],
        window: &CaptureWindow,
        _max_age_ms: u16,
        _timeout_ms: u16,
    ) -> OscarResult<PictureType> {
        let reader = self.reader.as_ref().ok_or_else(|| {
            error!("no filename reader set");
            OscarError::Device("no filename reader set".into())
        })?;

        let time_step = lock(&self.sim).time_step();
        let name = lock(reader).current_file_name(time_step);
        if name.is_empty() {
            return Err(OscarError::Device("no test image available".into()));
        }

        debug!(id, file = %name, time_step, "loading test image");
        let pic = bitmap::read(Path::new(&name)).map_err(|err| {
            error!(file = %name, %err, "unable to read test image");
            err
        })?;

        Self::crop_into(buf, &pic, window)?;
        Ok(pic.pixel_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> HostBackend {
        HostBackend::new(Arc::new(Mutex::new(Simulation::new())))
    }

    #[test]
    fn every_shadowed_register_round_trips() {
        let mut be = backend();
        for &(addr, _) in sensor::DEFAULT_REGISTERS {
            be.set_register(addr, 0x1234).unwrap();
            assert_eq!(be.get_register(addr).unwrap(), 0x1234, "register 0x{addr:02x}");
        }
    }

    #[test]
    fn unknown_registers_are_rejected() {
        let mut be = backend();
        assert!(matches!(
            be.get_register(0x21),
            Err(OscarError::InvalidParameter(_))
        ));
        assert!(matches!(
            be.set_register(0x21, 0),
            Err(OscarError::InvalidParameter(_))
        ));
    }

    #[test]
    fn cropping_respects_offsets_and_strides() {
        let mut pic = Picture::with_geometry(8, 4, PictureType::Greyscale);
        for (i, b) in pic.data.iter_mut().enumerate() {
            *b = i as u8;
        }
        let mut buf = vec![0u8; 4];
        let window = CaptureWindow::new(2, 1, 2, 2);
        HostBackend::crop_into(&mut buf, &pic, &window).unwrap();
        assert_eq!(buf, [10, 11, 18, 19]);
    }

    #[test]
    fn cropping_checks_both_directions() {
        let pic = Picture::with_geometry(8, 4, PictureType::Greyscale);
        let mut small = vec![0u8; 2];
        assert!(matches!(
            HostBackend::crop_into(&mut small, &pic, &CaptureWindow::new(0, 0, 2, 2)),
            Err(OscarError::BufferTooSmall { .. })
        ));
        let mut buf = vec![0u8; 64];
        assert!(matches!(
            HostBackend::crop_into(&mut buf, &pic, &CaptureWindow::new(4, 0, 6, 4)),
            Err(OscarError::PictureTooSmall)
        ));
    }
}
