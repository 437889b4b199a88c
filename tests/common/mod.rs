#![allow(dead_code)]

use std::str::FromStr;

use tracing_subscriber::{
    fmt::format::FmtSpan,
    EnvFilter,
};

use coratools::tob::{
    Footer,
    FooterFlags,
};

pub const FRAME_SIZE: usize = 512;
pub const SUBFRAME_SIZE: usize = 256;
pub const RECORD_SIZE: usize = 4;
pub const STAMP: u16 = 0x3c5a;
pub const BASE_SECONDS: u32 = 1_000_000;

pub const RECORDS_PER_FRAME: usize = (FRAME_SIZE - 16) / RECORD_SIZE;
pub const RECORDS_PER_SUBFRAME: usize = (SUBFRAME_SIZE - 16) / RECORD_SIZE;

pub fn trace_init() {
    let level_filter = EnvFilter::from_str("debug").unwrap();

    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stdout)
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(level_filter)
        .pretty()
        .try_init();
}

/// ASCII header of a one-second TOB3 table with a single IEEE4 field.
pub fn header() -> Vec<u8> {
    [
        r#""TOB3","6021","CR1000","6021","CR1000.Std.32","CPU:ring.CR1","1234","2021-07-14 12:00:00""#.to_owned(),
        format!(r#""Ring","1 SEC","{FRAME_SIZE}","496","{STAMP}","SecMsec","0","0","0""#),
        r#""Value""#.to_owned(),
        r#""Units""#.to_owned(),
        r#""Smp""#.to_owned(),
        r#""IEEE4""#.to_owned(),
    ]
    .iter()
    .flat_map(|line| format!("{line}\r\n").into_bytes())
    .collect()
}

/// TOB3 frame or subframe of `len` bytes holding records `first..first + count`.
/// Each record's value and time offset (in seconds) equal its number.
pub fn block(len: usize, first: u32, count: usize, flags: FooterFlags, stamp: u16) -> Vec<u8> {
    let mut block = vec![];
    block.extend_from_slice(&(BASE_SECONDS + first).to_le_bytes());
    block.extend_from_slice(&0u32.to_le_bytes());
    block.extend_from_slice(&first.to_le_bytes());

    for record_no in first..first + count as u32 {
        block.extend_from_slice(&(record_no as f32).to_le_bytes());
    }

    assert!(block.len() + Footer::SIZE <= len);
    block.resize(len - Footer::SIZE, 0);
    block.extend_from_slice(&Footer::new(len as u16, flags, stamp).to_bytes());

    block
}

/// Four slot ring. Slot 0 holds the newest frame, written after the ring
/// wrapped; slot 1 the oldest; slot 2 a dirty frame of two subframes.
pub fn ring_image() -> Vec<u8> {
    let f0 = 0u32;
    let f1a = f0 + RECORDS_PER_FRAME as u32;
    let f1b = f1a + RECORDS_PER_SUBFRAME as u32;
    let f2 = f1b + RECORDS_PER_SUBFRAME as u32;
    let f3 = f2 + RECORDS_PER_FRAME as u32;

    let dirty = [
        block(SUBFRAME_SIZE, f1a, RECORDS_PER_SUBFRAME, FooterFlags::MINOR, STAMP),
        block(SUBFRAME_SIZE, f1b, RECORDS_PER_SUBFRAME, FooterFlags::MINOR, STAMP),
    ]
    .concat();

    [
        header(),
        block(FRAME_SIZE, f3, RECORDS_PER_FRAME, FooterFlags::FILE_MARK, !STAMP),
        block(FRAME_SIZE, f0, RECORDS_PER_FRAME, FooterFlags::empty(), STAMP),
        dirty,
        block(FRAME_SIZE, f2, RECORDS_PER_FRAME, FooterFlags::empty(), STAMP),
    ]
    .concat()
}

/// Total records in [`ring_image`].
pub const RING_RECORDS: usize = 3 * RECORDS_PER_FRAME + 2 * RECORDS_PER_SUBFRAME;
