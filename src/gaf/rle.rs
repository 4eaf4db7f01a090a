//! Scan-line run length decoding of paletted frames

use crate::vfs::FileRead;
use crate::{Result, Size2};
use log::warn;

/// Decode one compressed scan line into `row`
///
/// `row` must be pre-zeroed; skipped pixels are left untouched. Decoding
/// stops at the end of `line` or once the row is full.
pub fn decode_line(line: &[u8], row: &mut [u8]) {
    let mut pos = 0;
    let mut x = 0;

    while pos < line.len() && x < row.len() {
        let mask = line[pos];
        pos += 1;

        if mask & 0x01 == 0x01 {
            // Transparent run
            x += (mask >> 1) as usize;
        } else if mask & 0x02 == 0x02 {
            let Some(&color) = line.get(pos) else {
                break;
            };
            pos += 1;
            let end = (x + (mask >> 2) as usize + 1).min(row.len());
            row[x..end].fill(color);
            x = end;
        } else {
            let count = (mask >> 2) as usize + 1;
            let available = count.min(line.len() - pos).min(row.len() - x);
            row[x..x + available].copy_from_slice(&line[pos..pos + available]);
            pos += count;
            x += available;
        }
    }
}

/// Decode a run length encoded frame read from the handle's current offset
///
/// Each line is prefixed with its little-endian u16 byte length. A line
/// longer than twice the frame width is treated as corruption: decoding
/// stops and the partially decoded image is returned.
pub fn decode_image<R: FileRead + ?Sized>(handle: &mut R, size: Size2) -> Result<Vec<u8>> {
    let mut image = vec![0u8; size.area()];
    if size.width == 0 {
        return Ok(image);
    }

    for row in image.chunks_exact_mut(size.width) {
        let line_length = handle.read_u16()? as usize;
        if line_length > size.width * 2 {
            warn!(
                "Compressed line of {} bytes exceeds frame width {} in {}; frame truncated",
                line_length,
                size.width,
                handle.file_name()
            );
            break;
        }
        let line = handle.read_data_verifying(line_length)?;
        decode_line(&line, row);
    }

    Ok(image)
}
