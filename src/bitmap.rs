//! Uncompressed BMP reading and writing for the host simulation.
//!
//! Only the two layouts the capture pipeline needs are supported:
//! 24-bit packed BGR without a colour table, and 8-bit greyscale with
//! the standard 256-entry grey palette. Rows are stored bottom-to-top
//! in the file, padded to 4-byte boundaries, and flipped on read.
//! Anything else (other colour depths, any compression flag) is
//! rejected with `UnsupportedFormat`.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::error;

use crate::error::{OscarError, OscarResult};
use crate::picture::{Picture, PictureType};

/// `BM` signature of a BMP file.
const BMP_MAGIC: u16 = 0x4d42;
/// Size of the BITMAPFILEHEADER + BITMAPINFOHEADER pair.
const HEADER_LEN: u32 = 54;
/// Pixel data offset of a 24-bit file (no colour table).
const DATA_OFFSET_BGR: u32 = HEADER_LEN;
/// Pixel data offset of an 8-bit file (256-entry palette follows the
/// header).
const DATA_OFFSET_GREY: u32 = HEADER_LEN + 256 * 4;

struct BmpHeader {
    data_offset: u32,
    width: i32,
    height: i32,
    color_depth: u16,
    compression: u32,
}

fn read_header<R: Read>(r: &mut R) -> OscarResult<BmpHeader> {
    let magic = r.read_u16::<LittleEndian>()?;
    if magic != BMP_MAGIC {
        return Err(OscarError::UnsupportedFormat(
            "missing BM signature".into(),
        ));
    }
    let _file_size = r.read_u32::<LittleEndian>()?;
    let _reserved = r.read_u32::<LittleEndian>()?;
    let data_offset = r.read_u32::<LittleEndian>()?;
    let _info_size = r.read_u32::<LittleEndian>()?;
    let width = r.read_i32::<LittleEndian>()?;
    let height = r.read_i32::<LittleEndian>()?;
    let _planes = r.read_u16::<LittleEndian>()?;
    let color_depth = r.read_u16::<LittleEndian>()?;
    let compression = r.read_u32::<LittleEndian>()?;
    Ok(BmpHeader {
        data_offset,
        width,
        height,
        color_depth,
        compression,
    })
}

/// Read a BMP file into `picture`.
///
/// If `picture` carries a non-zero geometry it must match the file
/// (`WrongImageFormat` otherwise) and its buffer is reused; if it is
/// empty, the buffer is allocated here. A caller-allocated buffer with
/// no declared geometry cannot be verified and is rejected.
pub fn read_into(picture: &mut Picture, path: &Path) -> OscarResult<()> {
    let file = File::open(path).map_err(|source| OscarError::UnableToOpenFile {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = BufReader::new(file);

    let header = read_header(&mut reader)?;

    // Positive height means the rows are stored bottom-up, which is the
    // common case; negative height is already top-down.
    let bottom_up = header.height > 0;
    let height = header.height.unsigned_abs();
    let width = u32::try_from(header.width)
        .map_err(|_| OscarError::FileParseError("negative BMP width".into()))?;

    if header.compression != 0 {
        error!(compression = header.compression, "compressed BMP rejected");
        return Err(OscarError::UnsupportedFormat(format!(
            "BMP compression {}",
            header.compression
        )));
    }
    let pixel_type = match header.color_depth {
        24 => PictureType::Bgr24,
        8 => PictureType::Greyscale,
        depth => {
            error!(depth, "unsupported BMP colour depth");
            return Err(OscarError::UnsupportedFormat(format!(
                "BMP colour depth {depth}"
            )));
        }
    };
    // Only headers without a colour table (or with the plain grey
    // palette) are supported.
    if header.data_offset != DATA_OFFSET_BGR && header.data_offset != DATA_OFFSET_GREY {
        return Err(OscarError::UnsupportedFormat(format!(
            "BMP data offset {}",
            header.data_offset
        )));
    }

    if picture.width != 0 && (picture.width != width || picture.height != height) {
        return Err(OscarError::WrongImageFormat {
            expected_width: picture.width,
            expected_height: picture.height,
            actual_width: width,
            actual_height: height,
        });
    }
    if !picture.data.is_empty() && picture.width == 0 {
        // Pre-allocated memory without declared geometry cannot be
        // checked against the file.
        return Err(OscarError::InvalidParameter(
            "caller-allocated picture must declare its geometry".into(),
        ));
    }

    let bytes_per_pixel = pixel_type.bytes_per_pixel();
    let row_len = width as usize * bytes_per_pixel;
    let padded_row_len = (row_len + 3) / 4 * 4;
    let image_len = row_len * height as usize;

    if picture.data.len() < image_len {
        picture.data.resize(image_len, 0);
    }
    picture.width = width;
    picture.height = height;
    picture.pixel_type = pixel_type;

    reader.seek(SeekFrom::Start(u64::from(header.data_offset)))?;
    let mut pad = [0u8; 3];
    for file_row in 0..height as usize {
        let row = if bottom_up {
            height as usize - 1 - file_row
        } else {
            file_row
        };
        reader.read_exact(&mut picture.data[row * row_len..(row + 1) * row_len])?;
        reader.read_exact(&mut pad[..padded_row_len - row_len])?;
    }
    Ok(())
}

/// Read a BMP file into a freshly allocated [`Picture`].
pub fn read(path: &Path) -> OscarResult<Picture> {
    let mut picture = Picture::empty();
    read_into(&mut picture, path)?;
    Ok(picture)
}

/// Write `picture` as an uncompressed BMP.
pub fn write(picture: &Picture, path: &Path) -> OscarResult<()> {
    if picture.width == 0 || picture.height == 0 {
        return Err(OscarError::InvalidParameter(
            "cannot write an empty picture".into(),
        ));
    }
    picture.validate()?;
    let (color_depth, data_offset) = match picture.pixel_type {
        PictureType::Bgr24 => (24u16, DATA_OFFSET_BGR),
        PictureType::Greyscale => (8u16, DATA_OFFSET_GREY),
        other => {
            return Err(OscarError::UnsupportedFormat(format!(
                "cannot store {other:?} as BMP"
            )))
        }
    };

    let bytes_per_pixel = usize::from(color_depth / 8);
    let row_len = picture.width as usize * bytes_per_pixel;
    let padded_row_len = (row_len + 3) / 4 * 4;
    let image_size = padded_row_len as u32 * picture.height;

    let file = File::create(path).map_err(|source| OscarError::UnableToOpenFile {
        path: path.to_path_buf(),
        source,
    })?;
    let mut w = BufWriter::new(file);

    // BITMAPFILEHEADER
    w.write_u16::<LittleEndian>(BMP_MAGIC)?;
    w.write_u32::<LittleEndian>(data_offset + image_size)?;
    w.write_u32::<LittleEndian>(0)?;
    w.write_u32::<LittleEndian>(data_offset)?;
    // BITMAPINFOHEADER
    w.write_u32::<LittleEndian>(40)?;
    w.write_i32::<LittleEndian>(picture.width as i32)?;
    w.write_i32::<LittleEndian>(picture.height as i32)?;
    w.write_u16::<LittleEndian>(1)?; // planes
    w.write_u16::<LittleEndian>(color_depth)?;
    w.write_u32::<LittleEndian>(0)?; // no compression
    w.write_u32::<LittleEndian>(image_size)?;
    w.write_i32::<LittleEndian>(0)?; // x pixels per meter
    w.write_i32::<LittleEndian>(0)?; // y pixels per meter
    w.write_u32::<LittleEndian>(0)?; // colours used
    w.write_u32::<LittleEndian>(0)?; // important colours

    if picture.pixel_type == PictureType::Greyscale {
        // Plain grey palette, B G R 0 per entry.
        for v in 0u8..=255 {
            w.write_all(&[v, v, v, 0])?;
        }
    }

    // Rows are stored bottom-up.
    let pad = [0u8; 3];
    for row in (0..picture.height as usize).rev() {
        w.write_all(&picture.data[row * row_len..(row + 1) * row_len])?;
        w.write_all(&pad[..padded_row_len - row_len])?;
    }
    w.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn gradient(width: u32, height: u32, pixel_type: PictureType) -> Picture {
        let mut pic = Picture::with_geometry(width, height, pixel_type);
        for (i, b) in pic.data.iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        pic
    }

    #[test]
    fn greyscale_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("grey.bmp");
        let pic = gradient(7, 5, PictureType::Greyscale);

        write(&pic, &path).unwrap();
        let back = read(&path).unwrap();

        assert_eq!(back.width, 7);
        assert_eq!(back.height, 5);
        assert_eq!(back.pixel_type, PictureType::Greyscale);
        assert_eq!(back.data, pic.data);
    }

    #[test]
    fn bgr_round_trip_with_row_padding() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("color.bmp");
        // 3 bytes/pixel * 5 = 15 bytes per row, padded to 16 on disk.
        let pic = gradient(5, 4, PictureType::Bgr24);

        write(&pic, &path).unwrap();
        let back = read(&path).unwrap();

        assert_eq!(back.pixel_type, PictureType::Bgr24);
        assert_eq!(back.data, pic.data);
    }

    #[test]
    fn declared_geometry_is_verified() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gate.bmp");
        write(&gradient(8, 8, PictureType::Greyscale), &path).unwrap();

        let mut wrong = Picture::with_geometry(4, 4, PictureType::Greyscale);
        let err = read_into(&mut wrong, &path).unwrap_err();
        assert!(matches!(err, OscarError::WrongImageFormat { .. }));
    }

    #[test]
    fn compressed_files_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rle.bmp");
        let pic = gradient(4, 4, PictureType::Greyscale);
        write(&pic, &path).unwrap();

        // Flip the compression field in place.
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[30] = 1;
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(
            read(&path),
            Err(OscarError::UnsupportedFormat(_))
        ));
    }
}
