//! TOB1/TOB2/TOB3 datalogger files: header parsing, frame and subframe
//! decoding, and record extraction over ring-ordered frame slots.

pub mod data_file;
pub mod field;
pub mod footer;
pub mod frame;
pub mod header;
pub mod lgr_date;
pub mod reader;
pub mod subframe;

pub use self::{
    data_file::{
        DataFile,
        DataFileBuilder,
        FileType,
    },
    field::{
        DataType,
        Field,
        Value,
    },
    footer::{
        Footer,
        FooterFlags,
    },
    frame::{
        Frame,
        Record,
        RecordInfo,
    },
    header::{
        Tob2Header,
        Tob3Header,
    },
    lgr_date::LgrDate,
    reader::{
        IndexEntry,
        TobFileReader,
    },
    subframe::{
        decompose,
        SubframeSpan,
    },
};
