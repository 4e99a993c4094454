//! Round-trip tests: write an archive, parse it back, verify the layout
//! and the trailing checksum byte for byte.

use gmad_rs::checksum::crc32;
use gmad_rs::{writer, Addon, Reader, FORMAT_VERSION, MAGIC};
use proptest::prelude::*;
use std::io::Cursor;

fn build_addon(files: &[(&str, &[u8])]) -> Addon {
    let mut addon = Addon::new();
    addon.title = "Round Trip".to_string();
    addon.description = "round trip fixture".to_string();
    addon.addon_type = "model".to_string();
    addon.tags = vec!["fun".to_string()];
    for (path, content) in files {
        addon.add_file(path, content.to_vec()).unwrap();
    }
    addon
}

#[test]
fn test_roundtrip_preserves_metadata_and_content() {
    let mut addon = build_addon(&[
        ("models/props/crate.mdl", b"model bytes"),
        ("materials/props/crate.vmt", b"vmt bytes here"),
    ]);
    addon.sort();

    let mut buffer = Cursor::new(Vec::new());
    writer::create(&addon, &mut buffer).unwrap();

    let mut reader = Reader::new(Cursor::new(buffer.into_inner())).unwrap();
    assert_eq!(reader.format_version(), FORMAT_VERSION);
    assert_eq!(reader.name(), "Round Trip");
    assert_eq!(reader.description(), "round trip fixture");
    assert_eq!(reader.addon_type(), "model");
    assert_eq!(reader.tags(), ["fun".to_string()]);

    // Index is lexically sorted, ordinals sequential from 1.
    let index: Vec<_> = reader.index().to_vec();
    assert_eq!(index.len(), 2);
    assert_eq!(index[0].path, "materials/props/crate.vmt");
    assert_eq!(index[0].ordinal, 1);
    assert_eq!(index[1].path, "models/props/crate.mdl");
    assert_eq!(index[1].ordinal, 2);

    assert_eq!(reader.read_file(1).unwrap(), b"vmt bytes here");
    assert_eq!(reader.read_file(2).unwrap(), b"model bytes");
}

#[test]
fn test_written_bytes_start_with_magic_and_version() {
    let addon = build_addon(&[("lua/autorun/init.lua", b"-- empty")]);

    let mut buffer = Cursor::new(Vec::new());
    writer::create(&addon, &mut buffer).unwrap();
    let bytes = buffer.into_inner();

    assert_eq!(&bytes[..4], &MAGIC);
    assert_eq!(bytes[4], FORMAT_VERSION);
}

#[test]
fn test_trailing_checksum_covers_preceding_bytes() {
    let addon = build_addon(&[("lua/autorun/init.lua", b"print('hi')")]);

    let mut buffer = Cursor::new(Vec::new());
    writer::create(&addon, &mut buffer).unwrap();
    let bytes = buffer.into_inner();

    // Trailing 8 bytes are a CRC-32 widened to u64 LE.
    let (body, tail) = bytes.split_at(bytes.len() - 8);
    let stored = u64::from_le_bytes(tail.try_into().unwrap());
    assert_eq!(stored, u64::from(crc32(body)));
}

#[test]
fn test_index_crc_matches_content() {
    let content = b"some payload worth hashing";
    let addon = build_addon(&[("scripts/vehicles/payload.txt", content)]);

    let mut buffer = Cursor::new(Vec::new());
    writer::create(&addon, &mut buffer).unwrap();

    let reader = Reader::new(Cursor::new(buffer.into_inner())).unwrap();
    let entry = reader.entry(1).unwrap();
    assert_eq!(entry.size, content.len() as u64);
    assert_eq!(entry.crc, crc32(content));
}

#[test]
fn test_empty_addon_roundtrips() {
    let addon = build_addon(&[]);

    let mut buffer = Cursor::new(Vec::new());
    writer::create(&addon, &mut buffer).unwrap();

    let reader = Reader::new(Cursor::new(buffer.into_inner())).unwrap();
    assert!(reader.index().is_empty());
}

proptest! {
    #[test]
    fn prop_content_survives_roundtrip(
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..4096), 1..8)
    ) {
        let mut addon = Addon::new();
        addon.title = "Prop".to_string();
        addon.addon_type = "model".to_string();

        for (i, payload) in payloads.iter().enumerate() {
            addon.add_file(&format!("lua/file{i:03}.lua"), payload.clone()).unwrap();
        }
        addon.sort();

        let mut buffer = Cursor::new(Vec::new());
        writer::create(&addon, &mut buffer).unwrap();

        let mut reader = Reader::new(Cursor::new(buffer.into_inner())).unwrap();
        prop_assert_eq!(reader.index().len(), payloads.len());

        for (i, payload) in payloads.iter().enumerate() {
            let ordinal = (i + 1) as u32;
            let entry = reader.entry(ordinal).unwrap().clone();
            prop_assert_eq!(entry.size, payload.len() as u64);
            prop_assert_eq!(&reader.read_file(ordinal).unwrap(), payload);
        }
    }
}
