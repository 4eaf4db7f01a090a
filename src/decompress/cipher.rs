//! Archive obfuscation ciphers
//!
//! Two unrelated byte transforms are used by HPI archives. The archive cipher
//! protects everything after the header of a first generation archive and is
//! keyed by the absolute file position of each byte. The chunk cipher is
//! applied to individual SQSH chunk payloads and is keyed only by the byte's
//! index within the chunk.

/// Derive the archive cipher key from the raw header key
///
/// A header key of zero disables the cipher.
pub fn archive_key(header_key: u32) -> u32 {
    if header_key == 0 {
        0
    } else {
        !(header_key.wrapping_mul(4) | (header_key >> 6))
    }
}

/// Decrypt (or encrypt) `data` in place as if it was read at file `offset`
///
/// The transform is its own inverse.
pub fn decrypt_at(data: &mut [u8], offset: u32, key: u32) {
    if key == 0 {
        return;
    }

    for (i, byte) in data.iter_mut().enumerate() {
        let tkey = offset.wrapping_add(i as u32) ^ key;
        *byte = (tkey ^ !(*byte as u32)) as u8;
    }
}

/// Remove the chunk cipher from a payload in place
pub fn decrypt_chunk(data: &mut [u8]) {
    for (i, byte) in data.iter_mut().enumerate() {
        let index = i as u8;
        *byte = byte.wrapping_sub(index) ^ index;
    }
}

/// Apply the chunk cipher to a payload in place
pub fn encrypt_chunk(data: &mut [u8]) {
    for (i, byte) in data.iter_mut().enumerate() {
        let index = i as u8;
        *byte = (*byte ^ index).wrapping_add(index);
    }
}
