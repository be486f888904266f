//! Demosaicing of the sensor's raw Bayer output.
//!
//! The main kernel produces a packed BGR image through gradient-aware
//! bilinear interpolation with a first-order Laplace correction: each
//! missing colour sample is interpolated along the direction with the
//! smaller combined gradient, which preserves edges far better than a
//! plain bilinear filter. Two cheaper kernels share the Bayer-order
//! input: a half-size greyscale collapse and a spot-colour integrator.
//!
//! Pixels are processed in two passes. Pass one fills the green
//! channel (native green pixels are copied, red/blue positions are
//! interpolated). Pass two fills red and blue, using the completed
//! green plane for the Laplace terms. The outermost two rows and the
//! outermost columns fall back to reduced-neighbour forms of the same
//! rules.

use crate::error::{OscarError, OscarResult};

/// Colour order of the first two pixels of the first raw row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BayerOrder {
    Bgbg,
    Rgrg,
    Gbgb,
    Grgr,
}

impl BayerOrder {
    /// Whether the top-left raw pixel is green.
    pub fn top_left_is_green(self) -> bool {
        matches!(self, BayerOrder::Gbgb | BayerOrder::Grgr)
    }

    /// Whether the first row carries red samples (else blue).
    pub fn top_row_is_red(self) -> bool {
        matches!(self, BayerOrder::Rgrg | BayerOrder::Grgr)
    }
}

/// Byte offset of blue within one output pixel.
const BLUE: usize = 0;
/// Byte offset of green within one output pixel.
const GREEN: usize = 1;
/// Byte offset of red within one output pixel.
const RED: usize = 2;
/// Bytes per output pixel (packed BGR).
const BPP: usize = 3;

/// Rounding division by 2.
fn div2r(x: i32) -> i32 {
    (x + 1) / 2
}
/// Rounding division by 3.
fn div3r(x: i32) -> i32 {
    (x + 1) / 3
}
/// Rounding division by 4.
fn div4r(x: i32) -> i32 {
    (x + 2) / 4
}
/// Rounding division by 8.
fn div8r(x: i32) -> i32 {
    (x + 4) / 8
}

fn sat8(x: i32) -> u8 {
    x.clamp(0, 255) as u8
}

struct Mosaic<'a> {
    raw: &'a [u8],
    width: usize,
    height: usize,
    top_left_green: bool,
    top_row_red: bool,
}

impl Mosaic<'_> {
    fn at(&self, x: usize, y: usize) -> i32 {
        i32::from(self.raw[y * self.width + x])
    }

    fn is_green(&self, x: usize, y: usize) -> bool {
        ((x + y) % 2 == 0) == self.top_left_green
    }

    fn row_is_red(&self, y: usize) -> bool {
        (y % 2 == 0) == self.top_row_red
    }
}

fn green_at(out: &[u8], width: usize, x: usize, y: usize) -> i32 {
    i32::from(out[BPP * (y * width + x) + GREEN])
}

/// Direction-adaptive green interpolation at a red or blue pixel with
/// full 5x5 support.
fn interp_green_adaptive(m: &Mosaic<'_>, x: usize, y: usize) -> u8 {
    let west = m.at(x - 1, y);
    let east = m.at(x + 1, y);
    let north = m.at(x, y - 1);
    let south = m.at(x, y + 1);

    // Horizontal and vertical Laplace of the current colour, computed
    // on the same-colour neighbours two steps away.
    let center = m.at(x, y);
    let lap_h = 2 * center - m.at(x - 2, y) - m.at(x + 2, y);
    let lap_v = 2 * center - m.at(x, y - 2) - m.at(x, y + 2);

    let delta_h = (west - east).abs() + lap_h.abs();
    let delta_v = (north - south).abs() + lap_v.abs();

    // Interpolate along the smaller gradient to preserve edges.
    let out = if delta_h < delta_v {
        div4r(2 * (west + east) + lap_h)
    } else if delta_h > delta_v {
        div4r(2 * (north + south) + lap_v)
    } else {
        div8r(2 * (west + east + north + south) + lap_h + lap_v)
    };
    sat8(out)
}

/// Green interpolation at the frame border: rounded average of
/// whichever of the four neighbours exist.
fn interp_green_border(m: &Mosaic<'_>, x: usize, y: usize) -> u8 {
    let mut sum = 0;
    let mut count = 0;
    if x > 0 {
        sum += m.at(x - 1, y);
        count += 1;
    }
    if x + 1 < m.width {
        sum += m.at(x + 1, y);
        count += 1;
    }
    if y > 0 {
        sum += m.at(x, y - 1);
        count += 1;
    }
    if y + 1 < m.height {
        sum += m.at(x, y + 1);
        count += 1;
    }
    let out = match count {
        2 => div2r(sum),
        3 => div3r(sum),
        _ => div4r(sum),
    };
    sat8(out)
}

/// Diagonal direction-adaptive interpolation of the colour opposite to
/// the current red or blue pixel.
fn interp_diagonal(m: &Mosaic<'_>, out: &[u8], x: usize, y: usize) -> u8 {
    let nw = m.at(x - 1, y - 1);
    let ne = m.at(x + 1, y - 1);
    let sw = m.at(x - 1, y + 1);
    let se = m.at(x + 1, y + 1);

    let center_green = green_at(out, m.width, x, y);
    let lap_n = 2 * center_green
        - green_at(out, m.width, x - 1, y - 1)
        - green_at(out, m.width, x + 1, y + 1);
    let lap_p = 2 * center_green
        - green_at(out, m.width, x + 1, y - 1)
        - green_at(out, m.width, x - 1, y + 1);

    let delta_n = (nw - se).abs() + lap_n.abs();
    let delta_p = (ne - sw).abs() + lap_p.abs();

    let value = if delta_n < delta_p {
        div2r(nw + se + lap_n)
    } else if delta_n > delta_p {
        div2r(ne + sw + lap_p)
    } else {
        div4r(nw + se + lap_n + ne + sw + lap_p)
    };
    sat8(value)
}

/// Demosaic `raw` into packed BGR. `out` must hold `3 * width * height`
/// bytes; width must be even and at least 4, height at least 4.
pub fn debayer_bgr(
    raw: &[u8],
    width: usize,
    height: usize,
    order: BayerOrder,
    out: &mut [u8],
) -> OscarResult<()> {
    if width % 2 != 0 || width < 4 || height < 4 {
        return Err(OscarError::InvalidParameter(format!(
            "mosaic {width}x{height}: width must be even and >= 4, height >= 4"
        )));
    }
    if raw.len() < width * height {
        return Err(OscarError::InvalidParameter(
            "raw buffer smaller than the mosaic".into(),
        ));
    }
    if out.len() < BPP * width * height {
        return Err(OscarError::BufferTooSmall {
            needed: BPP * width * height,
            available: out.len(),
        });
    }

    let m = Mosaic {
        raw,
        width,
        height,
        top_left_green: order.top_left_is_green(),
        top_row_red: order.top_row_is_red(),
    };

    /* Pass 1: the green channel. */
    for y in 0..height {
        for x in 0..width {
            let green = if m.is_green(x, y) {
                raw[y * width + x]
            } else if x >= 2 && x < width - 2 && y >= 2 && y < height - 2 {
                interp_green_adaptive(&m, x, y)
            } else {
                interp_green_border(&m, x, y)
            };
            out[BPP * (y * width + x) + GREEN] = green;
        }
    }

    /* Pass 2: red and blue, inner rows first. */
    for y in 1..height - 1 {
        let row_red = m.row_is_red(y);
        for x in 1..width - 1 {
            let idx = BPP * (y * width + x);
            if m.is_green(x, y) {
                // The raw neighbours on the row carry one colour, the
                // ones on the column the other; both get the Laplace
                // correction from the completed green plane.
                let horizontal = sat8(div4r(
                    2 * (m.at(x - 1, y) + m.at(x + 1, y)) + 2 * green_at(out, width, x, y)
                        - green_at(out, width, x - 1, y)
                        - green_at(out, width, x + 1, y),
                ));
                let vertical = sat8(div4r(
                    2 * (m.at(x, y - 1) + m.at(x, y + 1)) + 2 * green_at(out, width, x, y)
                        - green_at(out, width, x, y - 1)
                        - green_at(out, width, x, y + 1),
                ));
                if row_red {
                    out[idx + RED] = horizontal;
                    out[idx + BLUE] = vertical;
                } else {
                    out[idx + BLUE] = horizontal;
                    out[idx + RED] = vertical;
                }
            } else {
                let diagonal = interp_diagonal(&m, out, x, y);
                if row_red {
                    out[idx + RED] = raw[y * width + x];
                    out[idx + BLUE] = diagonal;
                } else {
                    out[idx + BLUE] = raw[y * width + x];
                    out[idx + RED] = diagonal;
                }
            }
        }

        // Outermost columns: copy from the pixel inside, keeping the
        // native colour of the column itself.
        for (x, inner) in [(0, 1), (width - 1, width - 2)] {
            let idx = BPP * (y * width + x);
            let src = BPP * (y * width + inner);
            if m.is_green(x, y) {
                out[idx + RED] = out[src + RED];
                out[idx + BLUE] = out[src + BLUE];
            } else if row_red {
                out[idx + RED] = raw[y * width + x];
                out[idx + BLUE] = out[src + BLUE];
            } else {
                out[idx + BLUE] = raw[y * width + x];
                out[idx + RED] = out[src + RED];
            }
        }
    }

    // First and last rows: red/blue comes from the row directly
    // inside; the row's own native colour comes from the raw input.
    for (y, copy_row) in [(0, 1), (height - 1, height - 2)] {
        let row_red = m.row_is_red(y);
        for x in 0..width {
            let idx = BPP * (y * width + x);
            let src = BPP * (copy_row * width + x);
            if m.is_green(x, y) {
                out[idx + RED] = out[src + RED];
                out[idx + BLUE] = out[src + BLUE];
            } else if row_red {
                out[idx + RED] = raw[y * width + x];
                out[idx + BLUE] = out[src + BLUE];
            } else {
                out[idx + BLUE] = raw[y * width + x];
                out[idx + RED] = out[src + RED];
            }
        }
    }

    Ok(())
}

/// Collapse the raw mosaic into a half-size greyscale image: every 2x2
/// cell becomes one luma byte weighted `2R + G1 + G2 + 2B`, divided
/// by 6. `out` must hold `width/2 * height/2` bytes.
pub fn debayer_half_size_grey(
    raw: &[u8],
    width: usize,
    height: usize,
    order: BayerOrder,
    out: &mut [u8],
) -> OscarResult<()> {
    if width % 2 != 0 || height % 2 != 0 || width < 2 || height < 2 {
        return Err(OscarError::InvalidParameter(format!(
            "mosaic {width}x{height}: width and height must be even and >= 2"
        )));
    }
    if raw.len() < width * height {
        return Err(OscarError::InvalidParameter(
            "raw buffer smaller than the mosaic".into(),
        ));
    }
    let out_width = width / 2;
    let out_height = height / 2;
    if out.len() < out_width * out_height {
        return Err(OscarError::BufferTooSmall {
            needed: out_width * out_height,
            available: out.len(),
        });
    }

    let top_left_green = order.top_left_is_green();
    for cy in 0..out_height {
        let y = cy * 2;
        for cx in 0..out_width {
            let x = cx * 2;
            // The two green samples sit on one diagonal of the cell,
            // red and blue on the other; red and blue share the same
            // luma weight, so their order inside the cell is
            // irrelevant.
            let (g1, g2, c1, c2) = if top_left_green {
                (
                    raw[y * width + x],
                    raw[(y + 1) * width + x + 1],
                    raw[y * width + x + 1],
                    raw[(y + 1) * width + x],
                )
            } else {
                (
                    raw[y * width + x + 1],
                    raw[(y + 1) * width + x],
                    raw[y * width + x],
                    raw[(y + 1) * width + x + 1],
                )
            };
            let luma = 2 * (u32::from(c1) + u32::from(c2)) + u32::from(g1) + u32::from(g2);
            out[cy * out_width + cx] = (luma / 6) as u8;
        }
    }
    Ok(())
}

/// Integrate a `size x size` patch of the raw mosaic starting at
/// `(x_pos, y_pos)` and return its average colour as a BGR triple. The
/// Bayer order is adjusted for the parity of the start position, so
/// the patch may sit anywhere on the frame.
pub fn debayer_spot(
    raw: &[u8],
    width: usize,
    height: usize,
    order: BayerOrder,
    x_pos: usize,
    y_pos: usize,
    size: usize,
) -> OscarResult<[u8; 3]> {
    if width % 2 != 0 || height % 2 != 0 || width < 2 || height < 2 {
        return Err(OscarError::InvalidParameter(format!(
            "mosaic {width}x{height}: width and height must be even and >= 2"
        )));
    }
    if size < 2 || size % 2 != 0 || x_pos + size > width || y_pos + size > height {
        return Err(OscarError::InvalidParameter(format!(
            "spot {size}x{size} at {x_pos}/{y_pos}"
        )));
    }
    if raw.len() < width * height {
        return Err(OscarError::InvalidParameter(
            "raw buffer smaller than the mosaic".into(),
        ));
    }

    // Shift the pattern for an unaligned spot position.
    let top_left_green = order.top_left_is_green() == ((x_pos % 2 == 0) == (y_pos % 2 == 0));
    let top_row_red = order.top_row_is_red() == (y_pos % 2 == 0);

    let mut sum_red: u32 = 0;
    let mut sum_green: u32 = 0;
    let mut sum_blue: u32 = 0;
    for y in (y_pos..y_pos + size).step_by(2) {
        for x in (x_pos..x_pos + size).step_by(2) {
            let p00 = u32::from(raw[y * width + x]);
            let p01 = u32::from(raw[y * width + x + 1]);
            let p10 = u32::from(raw[(y + 1) * width + x]);
            let p11 = u32::from(raw[(y + 1) * width + x + 1]);
            match (top_left_green, top_row_red) {
                (true, true) => {
                    sum_green += p00 + p11;
                    sum_red += p01;
                    sum_blue += p10;
                }
                (true, false) => {
                    sum_green += p00 + p11;
                    sum_blue += p01;
                    sum_red += p10;
                }
                (false, true) => {
                    sum_red += p00;
                    sum_green += p01 + p10;
                    sum_blue += p11;
                }
                (false, false) => {
                    sum_blue += p00;
                    sum_green += p01 + p10;
                    sum_red += p11;
                }
            }
        }
    }

    let area = (size * size) as u32;
    Ok([
        (sum_blue * 4 / area) as u8,
        (sum_green * 2 / area) as u8,
        (sum_red * 4 / area) as u8,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDERS: [BayerOrder; 4] = [
        BayerOrder::Bgbg,
        BayerOrder::Rgrg,
        BayerOrder::Gbgb,
        BayerOrder::Grgr,
    ];

    #[test]
    fn uniform_grey_stays_uniform_inside_the_border() {
        for order in ORDERS {
            let raw = vec![0x80u8; 16 * 16];
            let mut out = vec![0u8; 3 * 16 * 16];
            debayer_bgr(&raw, 16, 16, order, &mut out).unwrap();

            for y in 2..14 {
                for x in 2..14 {
                    let idx = 3 * (y * 16 + x);
                    assert_eq!(
                        &out[idx..idx + 3],
                        &[0x80, 0x80, 0x80],
                        "order {order:?} at {x}/{y}"
                    );
                }
            }
        }
    }

    #[test]
    fn native_samples_are_copied() {
        // Greens at 200, red/blue positions at 40.
        let order = BayerOrder::Rgrg;
        let w = 8;
        let h = 8;
        let mut raw = vec![0u8; w * h];
        for y in 0..h {
            for x in 0..w {
                let green = (x + y) % 2 == 1;
                raw[y * w + x] = if green { 200 } else { 40 };
            }
        }
        let mut out = vec![0u8; 3 * w * h];
        debayer_bgr(&raw, w, h, order, &mut out).unwrap();

        for y in 1..h - 1 {
            for x in 1..w - 1 {
                let idx = 3 * (y * w + x);
                if (x + y) % 2 == 1 {
                    assert_eq!(out[idx + 1], 200, "green copy at {x}/{y}");
                } else if y % 2 == 0 {
                    assert_eq!(out[idx + 2], 40, "red copy at {x}/{y}");
                } else {
                    assert_eq!(out[idx], 40, "blue copy at {x}/{y}");
                }
            }
        }
    }

    #[test]
    fn output_geometry_is_validated() {
        let raw = vec![0u8; 16];
        let mut out = vec![0u8; 3];
        assert!(matches!(
            debayer_bgr(&raw, 4, 4, BayerOrder::Rgrg, &mut out),
            Err(OscarError::BufferTooSmall { .. })
        ));
        let mut out = vec![0u8; 3 * 16];
        assert!(matches!(
            debayer_bgr(&raw, 5, 3, BayerOrder::Rgrg, &mut out),
            Err(OscarError::InvalidParameter(_))
        ));
    }

    #[test]
    fn half_size_cell_is_a_pure_function_of_its_quad() {
        let w = 8;
        let h = 6;
        let mut raw: Vec<u8> = (0..w * h).map(|i| (i * 7 % 251) as u8).collect();
        let mut out_a = vec![0u8; w / 2 * h / 2];
        debayer_half_size_grey(&raw, w, h, BayerOrder::Rgrg, &mut out_a).unwrap();

        // Mutating one quad only changes the matching output cell.
        raw[3 * w + 5] = raw[3 * w + 5].wrapping_add(90);
        let mut out_b = vec![0u8; w / 2 * h / 2];
        debayer_half_size_grey(&raw, w, h, BayerOrder::Rgrg, &mut out_b).unwrap();

        for cy in 0..h / 2 {
            for cx in 0..w / 2 {
                let changed = cy == 1 && cx == 2;
                assert_eq!(
                    out_a[cy * (w / 2) + cx] != out_b[cy * (w / 2) + cx],
                    changed,
                    "cell {cx}/{cy}"
                );
            }
        }
    }

    #[test]
    fn half_size_uniform_grey_is_identity() {
        for order in ORDERS {
            let raw = vec![0x66u8; 8 * 8];
            let mut out = vec![0u8; 16];
            debayer_half_size_grey(&raw, 8, 8, order, &mut out).unwrap();
            assert!(out.iter().all(|&v| v == 0x66), "order {order:?}");
        }
    }

    #[test]
    fn spot_average_separates_the_channels() {
        // RGRG mosaic with red 120, green 60, blue 30.
        let w = 8;
        let h = 8;
        let mut raw = vec![0u8; w * h];
        for y in 0..h {
            for x in 0..w {
                let green = (x + y) % 2 == 1;
                raw[y * w + x] = if green {
                    60
                } else if y % 2 == 0 {
                    120
                } else {
                    30
                };
            }
        }

        let bgr = debayer_spot(&raw, w, h, BayerOrder::Rgrg, 0, 0, 4).unwrap();
        assert_eq!(bgr, [30, 60, 120]);

        // An odd start position flips the cell pattern but not the
        // result for a uniform mosaic of this kind.
        let bgr = debayer_spot(&raw, w, h, BayerOrder::Rgrg, 1, 1, 4).unwrap();
        assert_eq!(bgr, [30, 60, 120]);
    }
}
