//! zlib chunk decoding

use crate::{ForgeError, Result};
use flate2::{Decompress, FlushDecompress, Status};

/// Upper bound on the deflate expansion ratio
const MAX_DEFLATE_RATIO: usize = 1032;

/// Inflate a zlib stream of at most `decompressed_size` bytes
///
/// The whole stream is inflated in one call; anything short of reaching the
/// stream end (truncated input, corrupt data, output larger than declared)
/// is a [`ForgeError::DecompressionError`].
pub fn decompress_zlib(input: &[u8], decompressed_size: usize) -> Result<Vec<u8>> {
    let capacity = decompressed_size.min(input.len().saturating_mul(MAX_DEFLATE_RATIO));
    let mut output = Vec::with_capacity(capacity);
    let mut inflater = Decompress::new(true);

    let status = inflater
        .decompress_vec(input, &mut output, FlushDecompress::Finish)
        .map_err(|e| ForgeError::DecompressionError(format!("zlib: {e}")))?;

    match status {
        Status::StreamEnd => Ok(output),
        Status::Ok | Status::BufError => Err(ForgeError::DecompressionError(format!(
            "zlib stream did not end (inflated {} of {} bytes)",
            output.len(),
            decompressed_size
        ))),
    }
}
