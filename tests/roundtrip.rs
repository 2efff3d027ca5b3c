//! Round-trip tests: write an archive, reopen it, compare.

mod common;

use std::io::{self, Read};

use common::{BLOCK, patterned, read_entry, write_archive};
use tarlite::{
    Archive, ArchiveConfig, ArchiveMode, Compression, EntryMode, HeaderCodec, Strategy,
    header::{self, DecodedBlock},
};
use tempfile::tempdir;

fn decode_at(raw: &[u8], offset: usize) -> DecodedBlock {
    HeaderCodec::new().decode(&raw[offset..offset + BLOCK])
}

#[test]
fn test_buffered_roundtrip_plain() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("plain.tar");
    let big = patterned(100_000, 3);
    write_archive(
        &path,
        Compression::Plain,
        &[("a.txt", b"alpha" as &[u8]), ("empty", b""), ("big.bin", &big[..])],
    )
    .unwrap();

    let mut archive = Archive::open(&path, ArchiveMode::Read, Compression::Auto).unwrap();
    assert!(!archive.is_compressed());
    assert_eq!(read_entry(&mut archive, "a.txt").unwrap(), b"alpha");
    assert_eq!(read_entry(&mut archive, "empty").unwrap(), b"");
    assert_eq!(read_entry(&mut archive, "big.bin").unwrap(), big);

    let sizes: Vec<u64> = archive.entries().iter().map(|e| e.size).collect();
    assert_eq!(sizes, [5, 0, 100_000]);
}

#[cfg(feature = "gzip")]
#[test]
fn test_buffered_roundtrip_gzip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("packed.tar.gz");
    let first = patterned(3000, 1);
    let second = patterned(70_000, 2);
    write_archive(
        &path,
        Compression::Gzip,
        &[("first.bin", &first[..]), ("second.bin", &second[..])],
    )
    .unwrap();

    let raw = std::fs::read(&path).unwrap();
    assert_eq!(&raw[..2], &[0x1f, 0x8b]);

    let mut archive = Archive::open(&path, ArchiveMode::Read, Compression::Auto).unwrap();
    assert!(archive.is_compressed());

    // Reading out of order forces the compressed stream to rewind
    assert_eq!(read_entry(&mut archive, "second.bin").unwrap(), second);
    assert_eq!(read_entry(&mut archive, "first.bin").unwrap(), first);
    assert_eq!(read_entry(&mut archive, "second.bin").unwrap(), second);
}

#[cfg(feature = "gzip")]
#[test]
fn test_streamed_roundtrip_gzip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("streamed.tar.gz");
    let data = patterned(200_000, 9);

    let config = ArchiveConfig::new().stream_buffer_size(4096).compression_level(1);
    let mut archive =
        Archive::open_with_config(&path, ArchiveMode::Write, Compression::Gzip, config).unwrap();
    let mut entry = archive
        .entry_open("stream.bin", EntryMode::Write, Some(data.len() as u64))
        .unwrap();
    assert_eq!(entry.strategy(), Some(Strategy::Streamed));
    for chunk in data.chunks(7001) {
        entry.write(chunk).unwrap();
    }
    assert!(entry.is_closed());
    archive.close().unwrap();

    let mut archive = Archive::open(&path, ArchiveMode::Read, Compression::Auto).unwrap();
    assert_eq!(read_entry(&mut archive, "stream.bin").unwrap(), data);
}

#[test]
fn test_scenario_layout() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("scenario.tar");

    let mut archive = Archive::open(&path, ArchiveMode::Write, Compression::Plain).unwrap();
    let mut alpha = archive
        .entry_open("alpha.bin", EntryMode::Write, Some(4096))
        .unwrap();
    assert_eq!(alpha.strategy(), Some(Strategy::Streamed));
    alpha.write(&[0xAA; 4000]).unwrap();

    let mut beta = archive
        .entry_open("beta.bin", EntryMode::Write, Some(10))
        .unwrap();
    assert_eq!(beta.strategy(), Some(Strategy::Buffered));
    beta.write(b"0123456789").unwrap();
    archive.entry_close(beta).unwrap();
    assert_eq!(archive.pending_flushes(), 1);

    alpha.write(&[0xAA; 96]).unwrap();
    assert!(alpha.is_closed());
    assert_eq!(archive.pending_flushes(), 0);
    archive.close().unwrap();

    let raw = std::fs::read(&path).unwrap();
    assert_eq!(raw.len(), 512 + 4096 + 512 + 512 + 1024);

    match decode_at(&raw, 0) {
        DecodedBlock::Record(r) => {
            assert_eq!(r.name, "alpha.bin");
            assert_eq!(r.size, 4096);
        }
        other => panic!("expected alpha header, got {:?}", other),
    }
    assert!(raw[512..4608].iter().all(|&b| b == 0xAA));
    match decode_at(&raw, 4608) {
        DecodedBlock::Record(r) => {
            assert_eq!(r.name, "beta.bin");
            assert_eq!(r.size, 10);
        }
        other => panic!("expected beta header, got {:?}", other),
    }
    assert_eq!(&raw[5120..5130], b"0123456789");
    assert!(raw[5130..].iter().all(|&b| b == 0));

    let mut archive = Archive::open(&path, ArchiveMode::Read, Compression::Auto).unwrap();
    let entries = archive.entries();
    assert_eq!(entries[0].size, 4096);
    assert_eq!(entries[0].offset, 512);
    assert_eq!(entries[1].size, 10);
    assert_eq!(entries[1].offset, 5120);
    assert_eq!(read_entry(&mut archive, "beta.bin").unwrap(), b"0123456789");
    assert_eq!(read_entry(&mut archive, "alpha.bin").unwrap(), vec![0xAA; 4096]);
}

#[test]
fn test_headers_carry_valid_checksums() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("checked.tar");
    write_archive(&path, Compression::Plain, &[("x", b"1" as &[u8]), ("y", b"22")]).unwrap();

    let raw = std::fs::read(&path).unwrap();
    for offset in [0, 1024] {
        let block: &[u8; BLOCK] = raw[offset..offset + BLOCK].try_into().unwrap();
        assert!(header::verify(block), "header at {} fails its checksum", offset);
    }

    let config = ArchiveConfig::new().verify_checksums(true);
    let archive =
        Archive::open_with_config(&path, ArchiveMode::Read, Compression::Auto, config).unwrap();
    assert_eq!(archive.entries().len(), 2);
}

#[test]
fn test_trailer_is_two_zero_blocks() {
    let dir = tempdir().unwrap();
    for count in [0usize, 1, 3] {
        let path = dir.path().join(format!("trailer{}.tar", count));
        let data = patterned(700, count as u8);
        let names: Vec<String> = (0..count).map(|i| format!("e{}", i)).collect();
        let entries: Vec<(&str, &[u8])> = names.iter().map(|n| (n.as_str(), &data[..])).collect();
        write_archive(&path, Compression::Plain, &entries).unwrap();

        let raw = std::fs::read(&path).unwrap();
        let payload_end = count * (512 + 1024);
        assert_eq!(raw.len(), payload_end + 1024);
        assert!(raw[payload_end..].iter().all(|&b| b == 0));
    }
}

#[test]
fn test_find_and_glob() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("find.tar");
    write_archive(
        &path,
        Compression::Plain,
        &[
            ("one.ext", b"1" as &[u8]),
            ("two.txt", b"2"),
            ("three.ext", b"3"),
            ("abc", b"4"),
        ],
    )
    .unwrap();

    let mut archive = Archive::open(&path, ArchiveMode::Read, Compression::Auto).unwrap();
    let mut found = Vec::new();
    let mut next = archive.find_first("*.ext");
    while let Some(name) = next {
        found.push(name);
        next = archive.find_next();
    }
    assert_eq!(found, ["one.ext", "three.ext"]);

    assert_eq!(archive.glob("*").count(), 4);
    assert_eq!(archive.find_first("a?c").as_deref(), Some("abc"));
    assert!(archive.find_first("zzz*").is_none());

    assert!(archive.exists("two.txt"));
    assert!(archive.exists("some/dir/two.txt"));
    assert!(!archive.exists("four.txt"));
    assert!(matches!(
        archive.entry_open("four.txt", EntryMode::Read, None),
        Err(tarlite::Error::NotFound { .. })
    ));
}

#[test]
fn test_entry_as_io_stream() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("io.tar");
    let data = patterned(50_000, 5);

    let mut archive = Archive::open(&path, ArchiveMode::Write, Compression::Plain).unwrap();
    let mut entry = archive
        .entry_open("copied.bin", EntryMode::Write, Some(data.len() as u64))
        .unwrap();
    io::copy(&mut &data[..], &mut entry).unwrap();
    entry.flush().unwrap();
    drop(entry);
    archive.close().unwrap();

    let mut archive = Archive::open(&path, ArchiveMode::Read, Compression::Auto).unwrap();
    let mut entry = archive.entry_open("copied.bin", EntryMode::Read, None).unwrap();
    let mut back = Vec::new();
    entry.read_to_end(&mut back).unwrap();
    assert_eq!(back, data);
}
