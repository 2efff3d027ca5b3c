//! Fuzz target for HeaderCodec::decode with arbitrary block input.
//!
//! Run with: cargo +nightly fuzz run header_decode
//!
//! Any input must decode to either a record or end of directory without
//! panicking. Blocks that decode to a record and carry a valid checksum must
//! survive a re-encode with the same name and size.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tarlite::header::{self, BLOCK_SIZE, DecodedBlock, HeaderCodec, HeaderRecord};

fuzz_target!(|data: &[u8]| {
    let codec = HeaderCodec::new().with_base256(true);
    let DecodedBlock::Record(record) = codec.decode(data) else {
        return;
    };

    let Ok(block) = <&[u8; BLOCK_SIZE]>::try_from(data) else {
        return;
    };
    let _ = header::verify(block);

    // Names read from arbitrary blocks may not be valid entry names
    let Ok(fresh) = HeaderRecord::new(&record.name, record.size) else {
        return;
    };
    if fresh.name != record.name {
        return;
    }
    let encoded = codec.encode(&fresh).expect("decoded size must be encodable");
    assert!(header::verify(&encoded));
    match codec.decode(&encoded) {
        DecodedBlock::Record(again) => {
            assert_eq!(again.name, fresh.name);
            assert_eq!(again.size, fresh.size);
        }
        DecodedBlock::EndOfDirectory => panic!("re-encoded header decoded as end of directory"),
    }
});
