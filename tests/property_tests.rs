//! Property-based tests for taforge
//!
//! These tests use randomized inputs to check that the decoders reject
//! malformed data gracefully and that tree merging and text parsing behave
//! consistently across a wide range of inputs.

use proptest::prelude::*;
use std::path::Path;
use taforge::decompress::{cipher, decompress_lz77, decompress_zlib, CompressionKind};
use taforge::hpi::{decode_chunk, ArchiveDirectory, ArchiveFile, ArchiveItem};
use taforge::tdf::Token;
use taforge::vfs::VfsDirectory;
use taforge::{ModelTable, Script, TdfParser};

/// An LZ77 stream made only of literals and the end token
fn literal_stream(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut rest = data;
    loop {
        let group = &rest[..rest.len().min(8)];
        let control = if group.len() < 8 { 1u8 << group.len() } else { 0 };
        out.push(control);
        out.extend_from_slice(group);
        rest = &rest[group.len()..];
        if group.len() < 8 {
            out.extend_from_slice(&[0, 0]);
            return out;
        }
    }
}

fn archive_dir(names: &[String], tag: u64) -> ArchiveDirectory {
    ArchiveDirectory {
        name: String::new(),
        items: names
            .iter()
            .map(|name| {
                ArchiveItem::File(ArchiveFile {
                    name: name.clone(),
                    size: 0,
                    offset: tag,
                    compression: CompressionKind::None,
                    compressed_size: 0,
                })
            })
            .collect(),
    }
}

proptest! {
    #[test]
    fn test_lz77_never_panics(
        data in prop::collection::vec(any::<u8>(), 0..1000),
        size in 0usize..8192
    ) {
        // Random data is rarely a valid stream; errors are fine, panics are not
        let _ = decompress_lz77(&data, size);
    }
}

proptest! {
    #[test]
    fn test_lz77_literals(data in prop::collection::vec(any::<u8>(), 0..500)) {
        let stream = literal_stream(&data);
        let decoded = decompress_lz77(&stream, data.len()).map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(decoded, data);
    }
}

proptest! {
    #[test]
    fn test_chunk_never_panics(
        body in prop::collection::vec(any::<u8>(), 0..600),
        kind in 0u8..4,
        encrypted in any::<bool>(),
        compressed_size in 0u32..1024,
        decompressed_size in 0u32..65536
    ) {
        let mut chunk = b"SQSH".to_vec();
        chunk.extend_from_slice(&[2, kind, encrypted as u8]);
        chunk.extend_from_slice(&compressed_size.to_le_bytes());
        chunk.extend_from_slice(&decompressed_size.to_le_bytes());
        chunk.extend_from_slice(&0u32.to_le_bytes());
        chunk.extend_from_slice(&body);
        let _ = decode_chunk(&chunk);
    }
}

proptest! {
    #[test]
    fn test_chunk_cipher_inverts(data in prop::collection::vec(any::<u8>(), 0..600)) {
        let mut ciphered = data.clone();
        cipher::encrypt_chunk(&mut ciphered);
        cipher::decrypt_chunk(&mut ciphered);
        prop_assert_eq!(ciphered, data);
    }
}

proptest! {
    #[test]
    fn test_zlib_rejects_garbage(data in prop::collection::vec(any::<u8>(), 0..300)) {
        // Whatever comes back must stay within the declared size
        if let Ok(out) = decompress_zlib(&data, 256) {
            prop_assert!(out.len() <= 256);
        }
    }
}

proptest! {
    #[test]
    fn test_script_and_model_never_panic(data in prop::collection::vec(any::<u8>(), 0..400)) {
        let _ = Script::from_bytes(&data);
        let _ = ModelTable::from_bytes(&data);
    }
}

proptest! {
    #[test]
    fn test_tdf_never_panics(data in prop::collection::vec(any::<u8>(), 0..400)) {
        let mut count = 0;
        TdfParser::parse(&data, |_| count += 1);
        let _ = TdfParser::new(data).extract_all();
    }
}

proptest! {
    #[test]
    fn test_tdf_properties_survive(
        pairs in prop::collection::btree_map("[A-Za-z][A-Za-z0-9]{0,8}", "[A-Za-z0-9 .]{0,12}", 1..12)
    ) {
        let mut text = String::from("[Section]\r\n{\r\n");
        for (key, value) in &pairs {
            text.push_str(&format!("\t{key}={value};\r\n"));
        }
        text.push_str("}\r\n");

        let mut parser = TdfParser::new(text.clone());
        prop_assert!(parser.skip_to_object("section"));
        let object = parser.extract_object(true);

        // Keys collide when they only differ in case
        let folded: std::collections::BTreeSet<String> =
            pairs.keys().map(|k| k.to_lowercase()).collect();
        prop_assert_eq!(object.len(), folded.len());
        for (key, value) in &pairs {
            prop_assert!(object.property(&key.to_lowercase()).is_some());
            if pairs.keys().filter(|k| k.eq_ignore_ascii_case(key)).count() == 1 {
                prop_assert_eq!(object.property(&key.to_lowercase()), Some(value.trim()));
            }
        }

        let mut properties = 0;
        TdfParser::parse(text.as_bytes(), |token| {
            if matches!(token, Token::Property(..)) {
                properties += 1;
            }
        });
        prop_assert_eq!(properties, pairs.len());
    }
}

proptest! {
    #[test]
    fn test_merge_keeps_first_entry(
        first in prop::collection::btree_set("[a-z]{1,6}\\.(fbi|gaf)", 0..12),
        second in prop::collection::btree_set("[A-Z]{1,6}\\.(FBI|GAF)", 0..12)
    ) {
        let first: Vec<String> = first.into_iter().collect();
        let second: Vec<String> = second.into_iter().collect();
        let a = VfsDirectory::from_archive_directory(&archive_dir(&first, 1), Path::new("a.ufo"));
        let b = VfsDirectory::from_archive_directory(&archive_dir(&second, 2), Path::new("b.hpi"));

        let kept = a.clone().merge(b.clone(), false);
        let replaced = a.merge(b, true);

        for name in first.iter().chain(&second) {
            let in_first = first.iter().any(|n| n.eq_ignore_ascii_case(name));
            let in_second = second.iter().any(|n| n.eq_ignore_ascii_case(name));

            let kept_file = kept.file(name).ok_or_else(|| TestCaseError::fail(name.clone()))?;
            let replaced_file = replaced.file(name).ok_or_else(|| TestCaseError::fail(name.clone()))?;

            let expect_kept = if in_first { 1 } else { 2 };
            let expect_replaced = if in_second { 2 } else { 1 };
            prop_assert_eq!(kept_file.info.offset, expect_kept);
            prop_assert_eq!(replaced_file.info.offset, expect_replaced);
        }
    }
}
