//! Sensor calibration: fixed-pattern noise, photo-response
//! non-uniformity and hot pixels.
//!
//! Calibration data is produced once per camera during manufacturing
//! and shipped as a packed binary file. The loader validates and
//! unpacks it; the correction entry points run in place over the
//! current capture window and are registered with the capture pipeline
//! as its correction hook. A missing or malformed file degrades
//! gracefully: correction is simply not registered and capture runs
//! uncorrected.
//!
//! # File format (little-endian)
//!
//! | field | size |
//! |---|---|
//! | magic `0x12345678` | u32 |
//! | width, height (must equal the sensor's 752 x 480) | 2 x u16 |
//! | packed cells: FPN in the top 5 bits, PRNU in the low 10 | width*height x u16 |
//! | hot-pixel count (<= 1000) | u16 |
//! | hot-pixel coordinates (x, y) | count x 2 x u16 |

// Table allocation uses a zeroed heap block to express the cache-line
// alignment in the type.
#![allow(unsafe_code)]

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use tracing::{debug, error, warn};

use crate::backend::{CameraBackend, CaptureWindow};
use crate::camera::sensor::{MAX_IMAGE_HEIGHT, MAX_IMAGE_WIDTH};
use crate::camera::{Camera, ImageCorrection};
use crate::error::{OscarError, OscarResult};

/// Magic number opening a calibration file.
pub const CALIBRATION_MAGIC: u32 = 0x1234_5678;
/// Upper bound on the hot-pixel list.
pub const MAX_HOT_PIXELS: usize = 1000;

const FULL_FRAME_PIXELS: usize = MAX_IMAGE_WIDTH as usize * MAX_IMAGE_HEIGHT as usize;

/// Which corrections to apply per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalibrationMode {
    /// No per-pixel gain/offset correction.
    Off,
    /// Subtract the FPN offset, then scale by the PRNU gain.
    #[default]
    FpnPrnu,
}

/// Full-frame correction tables, kept on one cache-line boundary so the
/// per-row streams do not straddle lines.
#[repr(C, align(32))]
struct CalibrationTables {
    /// Per-pixel additive offset, 5 significant bits.
    fpn: [u8; FULL_FRAME_PIXELS],
    /// Per-pixel gain, fixed-point 8.8 in the low 10 bits.
    prnu: [u16; FULL_FRAME_PIXELS],
}

impl CalibrationTables {
    fn new_zeroed() -> Box<Self> {
        // SAFETY: both fields are plain integer arrays, for which the
        // all-zero bit pattern is a valid value.
        unsafe { Box::<Self>::new_zeroed().assume_init() }
    }
}

/// Loaded calibration data plus the selected correction set.
pub struct Calibration {
    tables: Box<CalibrationTables>,
    hot_pixels: Vec<(u16, u16)>,
    mode: CalibrationMode,
    hot_pixel_correction: bool,
}

impl Calibration {
    /// Load and unpack a calibration file.
    pub fn load(path: &Path) -> OscarResult<Self> {
        let file = File::open(path).map_err(|source| {
            error!(file = %path.display(), %source, "unable to open calibration data");
            OscarError::UnableToOpenFile {
                path: path.to_path_buf(),
                source,
            }
        })?;
        let mut r = BufReader::new(file);

        let parse_err = |what: &str| {
            warn!(file = %path.display(), what, "calibration file rejected");
            OscarError::FileParseError(format!("calibration data: {what}"))
        };

        if r.read_u32::<LittleEndian>()? != CALIBRATION_MAGIC {
            return Err(parse_err("bad magic number"));
        }
        if r.read_u16::<LittleEndian>()? != MAX_IMAGE_WIDTH {
            return Err(parse_err("width does not match the sensor"));
        }
        if r.read_u16::<LittleEndian>()? != MAX_IMAGE_HEIGHT {
            return Err(parse_err("height does not match the sensor"));
        }

        let mut tables = CalibrationTables::new_zeroed();

        // The packed section lands in the PRNU array, which doubles as
        // the unpacking scratch: one pass splits each cell into the
        // FPN offset (top 5 bits) and the PRNU gain (low 10 bits).
        r.read_u16_into::<LittleEndian>(&mut tables.prnu)?;
        for idx in 0..FULL_FRAME_PIXELS {
            let packed = tables.prnu[idx];
            tables.fpn[idx] = ((packed & 0xf800) >> 11) as u8;
            tables.prnu[idx] = packed & 0x03ff;
        }

        let n_hot = usize::from(r.read_u16::<LittleEndian>()?);
        if n_hot > MAX_HOT_PIXELS {
            return Err(parse_err("hot-pixel count out of range"));
        }
        let mut hot_pixels = Vec::with_capacity(n_hot);
        for _ in 0..n_hot {
            let x = r.read_u16::<LittleEndian>()?;
            let y = r.read_u16::<LittleEndian>()?;
            hot_pixels.push((x, y));
        }

        debug!(file = %path.display(), hot_pixels = n_hot, "calibration data loaded");
        Ok(Calibration {
            tables,
            hot_pixels,
            mode: CalibrationMode::FpnPrnu,
            hot_pixel_correction: true,
        })
    }

    /// Select which corrections run per captured frame.
    pub fn setup(&mut self, mode: CalibrationMode, hot_pixel_correction: bool) {
        self.mode = mode;
        self.hot_pixel_correction = hot_pixel_correction;
    }

    /// Apply FPN/PRNU correction in place over `window`:
    /// `corrected = sat8((sat8(pixel - fpn) * prnu) >> 8)`.
    pub fn correct_fpn_prnu(&self, img: &mut [u8], window: &CaptureWindow) {
        let full_width = MAX_IMAGE_WIDTH as usize;
        let width = usize::from(window.width);

        for row in 0..usize::from(window.height) {
            let table_base = usize::from(window.col_off) + (usize::from(window.row_off) + row) * full_width;
            let fpn_row = &self.tables.fpn[table_base..table_base + width];
            let prnu_row = &self.tables.prnu[table_base..table_base + width];
            let img_row = &mut img[row * width..(row + 1) * width];

            for ((pix, &offset), &gain) in img_row.iter_mut().zip(fpn_row).zip(prnu_row) {
                let dark = i16::from(*pix) - i16::from(offset);
                let dark = if dark < 0 { 0u32 } else { dark as u32 };
                let scaled = (dark * u32::from(gain)) >> 8;
                *pix = if scaled > 255 { 255 } else { scaled as u8 };
            }
        }
    }

    /// Replace every hot pixel inside `window` with the rounded average
    /// of its four neighbours, substituting the opposite neighbour at a
    /// window border.
    pub fn correct_hot_pixels(&self, img: &mut [u8], window: &CaptureWindow) {
        let width = usize::from(window.width);
        let height = usize::from(window.height);
        if width < 2 || height < 2 {
            return;
        }

        for &(hx, hy) in &self.hot_pixels {
            if hx < window.col_off
                || hx >= window.col_off + window.width
                || hy < window.row_off
                || hy >= window.row_off + window.height
            {
                continue;
            }
            // Window-local coordinates.
            let x = usize::from(hx - window.col_off);
            let y = usize::from(hy - window.row_off);

            let left = img[y * width + if x > 0 { x - 1 } else { x + 1 }];
            let right = img[y * width + if x + 1 < width { x + 1 } else { x - 1 }];
            let top = img[if y > 0 { y - 1 } else { y + 1 } * width + x];
            let bottom = img[if y + 1 < height { y + 1 } else { y - 1 } * width + x];

            let sum = u16::from(left) + u16::from(right) + u16::from(top) + u16::from(bottom);
            img[y * width + x] = ((sum + 2) / 4) as u8;
        }
    }

    /// Load the calibration file and register the correction hook with
    /// the capture pipeline. A load failure disables correction with a
    /// warning instead of failing camera setup.
    pub fn attach<B: CameraBackend>(
        camera: &mut Camera<B>,
        path: &Path,
        mode: CalibrationMode,
        hot_pixel_correction: bool,
    ) -> bool {
        match Calibration::load(path) {
            Ok(mut calibration) => {
                calibration.setup(mode, hot_pixel_correction);
                camera.register_correction_hook(Box::new(calibration));
                true
            }
            Err(err) => {
                warn!(%err, "image calibration disabled");
                false
            }
        }
    }
}

impl ImageCorrection for Calibration {
    fn correct(&mut self, img: &mut [u8], window: &CaptureWindow) -> OscarResult<()> {
        if self.mode == CalibrationMode::FpnPrnu {
            self.correct_fpn_prnu(img, window);
        }
        if self.hot_pixel_correction {
            self.correct_hot_pixels(img, window);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use std::io::Write;
    use tempfile::tempdir;

    /// Write a calibration file where every cell packs `fpn` and
    /// `prnu`, with the given hot pixels appended.
    fn write_calibration_file(
        path: &Path,
        fpn: u16,
        prnu: u16,
        hot: &[(u16, u16)],
    ) {
        let mut f = std::io::BufWriter::new(File::create(path).unwrap());
        f.write_u32::<LittleEndian>(CALIBRATION_MAGIC).unwrap();
        f.write_u16::<LittleEndian>(MAX_IMAGE_WIDTH).unwrap();
        f.write_u16::<LittleEndian>(MAX_IMAGE_HEIGHT).unwrap();
        let packed = (fpn << 11) | (prnu & 0x3ff);
        let cell = packed.to_le_bytes();
        for _ in 0..FULL_FRAME_PIXELS {
            f.write_all(&cell).unwrap();
        }
        f.write_u16::<LittleEndian>(hot.len() as u16).unwrap();
        for &(x, y) in hot {
            f.write_u16::<LittleEndian>(x).unwrap();
            f.write_u16::<LittleEndian>(y).unwrap();
        }
        f.flush().unwrap();
    }

    #[test]
    fn loader_unpacks_fpn_and_prnu() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cam.clb");
        // FPN 9, PRNU 0x180 (gain 1.5 in 8.8 fixed point).
        write_calibration_file(&path, 9, 0x180, &[]);

        let calibration = Calibration::load(&path).unwrap();
        assert_eq!(calibration.tables.fpn[0], 9);
        assert_eq!(calibration.tables.prnu[0], 0x180);
        assert!(calibration.hot_pixels.is_empty());
    }

    #[test]
    fn loader_rejects_bad_magic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("junk.clb");
        std::fs::write(&path, [0u8; 64]).unwrap();
        assert!(matches!(
            Calibration::load(&path),
            Err(OscarError::FileParseError(_))
        ));
    }

    #[test]
    fn fpn_prnu_correction_saturates_both_ways() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cam.clb");
        // Offset 16, gain 2.0.
        write_calibration_file(&path, 16, 0x200, &[]);
        let calibration = Calibration::load(&path).unwrap();

        let window = CaptureWindow::new(0, 0, 4, 1);
        let mut img = [10u8, 16, 100, 255];
        calibration.correct_fpn_prnu(&mut img, &window);

        // 10 - 16 clamps to 0; (100 - 16) * 2 = 168; 255 - 16 scaled
        // by 2 saturates at 255.
        assert_eq!(img, [0, 0, 168, 255]);
    }

    #[test]
    fn hot_pixel_is_replaced_by_neighbour_average() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cam.clb");
        // Neutral gain/offset, one hot pixel at sensor (5, 4).
        write_calibration_file(&path, 0, 0x100, &[(5, 4), (700, 400)]);
        let calibration = Calibration::load(&path).unwrap();

        // Window at (4, 3) of size 4x4; the hot pixel lands at local
        // (1, 1). The second hot pixel is outside and must be ignored.
        let window = CaptureWindow::new(4, 3, 4, 4);
        let mut img = vec![100u8; 16];
        img[1 * 4 + 1] = 255;
        img[0 * 4 + 1] = 96; // top neighbour

        calibration.correct_hot_pixels(&mut img, &window);
        // (100 + 100 + 96 + 100 + 2) / 4 = 99 (rounded)
        assert_eq!(img[1 * 4 + 1], 99);
    }

    #[test]
    fn attach_degrades_gracefully_without_a_file() {
        use crate::backend::HostBackend;
        use crate::simulation::Simulation;
        use std::sync::{Arc, Mutex};

        let sim = Arc::new(Mutex::new(Simulation::new()));
        let mut camera = crate::camera::Camera::new(HostBackend::new(sim)).unwrap();

        let registered = Calibration::attach(
            &mut camera,
            Path::new("/nonexistent/cam.clb"),
            CalibrationMode::FpnPrnu,
            true,
        );
        assert!(!registered);
    }

    #[test]
    fn border_hot_pixel_uses_the_opposite_neighbour() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cam.clb");
        write_calibration_file(&path, 0, 0x100, &[(0, 0)]);
        let calibration = Calibration::load(&path).unwrap();

        let window = CaptureWindow::new(0, 0, 2, 2);
        let mut img = vec![0u8; 4];
        img[0] = 255; // the hot corner
        img[1] = 40; // east, stands in for west as well
        img[2] = 60; // south, stands in for north as well

        calibration.correct_hot_pixels(&mut img, &window);
        // (40 + 40 + 60 + 60 + 2) / 4 = 50
        assert_eq!(img[0], 50);
    }
}
