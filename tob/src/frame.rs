//! One frame of a TOB1/TOB2/TOB3 data file.

use bytes::Bytes;
use once_cell::unsync::OnceCell;
use packed_struct::{
    prelude::*,
    PackingError,
};

use crate::{
    data_file::{
        DataFile,
        FileType,
    },
    footer::Footer,
    header::{
        Tob2Header,
        Tob3Header,
        TOB2_HEADER_LEN,
        TOB3_HEADER_LEN,
    },
    subframe::{
        self,
        SubframeSpan,
    },
    LgrDate,
};

pub const MIN_TOB2_FRAME_SIZE: usize = TOB2_HEADER_LEN + Footer::SIZE;
pub const MIN_TOB3_FRAME_SIZE: usize = TOB3_HEADER_LEN + Footer::SIZE;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("frame of {len} bytes is shorter than the {min} byte minimum")]
    TooShort { len: usize, min: usize },

    #[error("frame holds no record data")]
    Empty,

    #[error("frame is not valid")]
    Invalid,

    #[error("{0} frames carry no record numbers")]
    NoRecordNumbers(FileType),

    #[error("record {index} out of range for frame holding {count}")]
    IndexOutOfRange { index: usize, count: usize },

    #[error(transparent)]
    Subframe(#[from] subframe::Error),

    #[error(transparent)]
    Packing(#[from] PackingError),
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
struct FrameHeader {
    seconds:    i64,
    subseconds: i64,
    record_no:  Option<u32>,
}

/// One record pulled out of a frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub stamp:             LgrDate,
    pub record_no:         Option<u32>,
    pub data:              Bytes,
    pub file_mark_after:   bool,
    pub remove_mark_after: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize)]
pub struct RecordInfo {
    pub stamp:     LgrDate,
    pub record_no: Option<u32>,
}

/// A frame borrowing its format parameters from the [`DataFile`] that owns
/// the image it was cut from.
///
/// A frame whose footer carries the minor flag and which fills a whole slot
/// is "dirty": it holds a run of smaller subframes, each with its own header
/// and footer. Record accessors on a dirty frame address records across all
/// of its subframes, oldest first.
#[derive(Debug)]
pub struct Frame<'f> {
    file:        &'f DataFile,
    contents:    Bytes,
    file_offset: u64,
    footer:      Footer,
    header:      FrameHeader,
    nested:      bool,
    spans:       OnceCell<Result<Vec<SubframeSpan>, subframe::Error>>,
}

impl<'f> Frame<'f> {
    /// Wraps `contents`, read from `file_offset` of `file`.
    ///
    /// Fails if `contents` is too short for the file type.
    pub fn new(file: &'f DataFile, contents: impl Into<Bytes>, file_offset: u64) -> Result<Self, Error> {
        Self::build(file, contents.into(), file_offset, false)
    }

    fn build(file: &'f DataFile, contents: Bytes, file_offset: u64, nested: bool) -> Result<Self, Error> {
        let min = min_frame_size(file);

        if contents.len() < min {
            return Err(Error::TooShort {
                len: contents.len(),
                min,
            });
        }

        let footer = match file.file_type() {
            FileType::Tob1 => Footer::default(),
            _ => Footer::trailing(&contents).unwrap_or_default(),
        };

        let header = read_header(file, &contents)?;

        Ok(Self {
            file,
            contents,
            file_offset,
            footer,
            header,
            nested,
            spans: OnceCell::new(),
        })
    }

    #[inline]
    pub fn file(&self) -> &'f DataFile {
        self.file
    }

    #[inline]
    pub fn contents(&self) -> &Bytes {
        &self.contents
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.contents.len()
    }

    #[inline]
    pub fn file_offset(&self) -> u64 {
        self.file_offset
    }

    #[inline]
    pub fn footer(&self) -> Footer {
        self.footer
    }

    /// Checks the frame size and, for a frame filling a whole slot, that its
    /// validation stamp matches `stamp` or its complement. A stamp of `None`
    /// or zero skips the stamp check.
    pub fn is_valid(&self, stamp: Option<u16>) -> bool {
        if self.len() < min_frame_size(self.file) {
            return false;
        }

        match stamp.filter(|&s| s != 0) {
            Some(stamp) if self.file.file_type() != FileType::Tob1 && self.len() == self.file.frame_size() => {
                let found = self.footer.validation();
                found == stamp || found == !stamp
            },
            _ => true,
        }
    }

    /// Whether the stamp equals `stamp` itself rather than its complement.
    pub fn is_current_generation(&self, stamp: u16) -> bool {
        self.file.file_type() == FileType::Tob1 || self.footer.validation() == stamp
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.has_footer() && self.footer.empty()
    }

    #[inline]
    pub fn is_minor(&self) -> bool {
        self.has_footer() && self.footer.minor()
    }

    #[inline]
    pub fn file_mark(&self) -> bool {
        self.has_footer() && self.footer.file_mark()
    }

    #[inline]
    pub fn remove_mark(&self) -> bool {
        self.has_footer() && self.footer.remove_mark()
    }

    /// A full-slot frame that was partially overwritten by subframes.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        !self.nested && self.is_minor() && self.len() == self.file.frame_size()
    }

    #[inline]
    fn has_footer(&self) -> bool {
        self.file.file_type() != FileType::Tob1
    }

    #[inline]
    pub fn header_len(&self) -> usize {
        self.file.frame_header_len()
    }

    pub fn data_len(&self) -> Result<usize, Error> {
        if !self.is_valid(None) {
            return Err(Error::Invalid);
        }

        if self.is_empty() {
            return Err(Error::Empty);
        }

        Ok(self.len() - self.header_len() - self.file.frame_footer_len())
    }

    /// Record payload bytes between header and footer.
    pub fn data(&self) -> Result<Bytes, Error> {
        let len = self.data_len()?;
        let start = self.header_len();

        Ok(self.contents.slice(start..start + len))
    }

    /// Time of the first record, with subseconds scaled by `subsec_res_ns`.
    #[inline]
    pub fn time_with(&self, subsec_res_ns: i64) -> LgrDate {
        LgrDate::from_parts(self.header.seconds, self.header.subseconds * subsec_res_ns)
    }

    #[inline]
    pub fn time(&self) -> LgrDate {
        self.time_with(self.file.subsec_resolution())
    }

    /// Number of the first record. TOB2 frames don't carry one.
    pub fn record_no(&self) -> Result<u32, Error> {
        self.header.record_no.ok_or(Error::NoRecordNumbers(self.file.file_type()))
    }

    pub fn records_count(&self) -> Result<usize, Error> {
        if !self.is_dirty() {
            return Ok(self.flat_records_count());
        }

        self.subframes()?.iter().map(Frame::records_count).sum()
    }

    fn flat_records_count(&self) -> usize {
        match self.data_len() {
            Ok(len) => len / self.file.record_size().max(1),
            Err(_) => 0,
        }
    }

    /// Spans of the subframes of a dirty frame, oldest first.
    pub fn subframe_spans(&self) -> Result<&[SubframeSpan], Error> {
        if !self.is_dirty() {
            return Ok(&[]);
        }

        match self.spans.get_or_init(|| subframe::decompose(&self.contents)) {
            Ok(spans) => Ok(spans.as_slice()),
            Err(e) => Err(Error::Subframe(*e)),
        }
    }

    /// Non-empty subframes of a dirty frame, oldest first. Empty for any
    /// other frame.
    pub fn subframes(&self) -> Result<Vec<Frame<'f>>, Error> {
        let mut frames = vec![];

        for span in self.subframe_spans()? {
            let frame = Self::build(
                self.file,
                self.contents.slice(span.range()),
                self.file_offset + span.start as u64,
                true,
            )?;

            if frame.is_empty() {
                tracing::trace!(offset = frame.file_offset, "dropping empty subframe");
                continue;
            }

            frames.push(frame);
        }

        Ok(frames)
    }

    /// Finds the subframe holding `index` and the index within it.
    fn locate(&self, index: usize) -> Result<(Frame<'f>, usize), Error> {
        let mut remaining = index;
        let mut count = 0;

        for sub in self.subframes()? {
            let n = sub.records_count()?;

            if remaining < n {
                return Ok((sub, remaining));
            }

            remaining -= n;
            count += n;
        }

        Err(Error::IndexOutOfRange {
            index,
            count,
        })
    }

    fn check_index(&self, index: usize) -> Result<usize, Error> {
        let count = self.flat_records_count();

        if index >= count {
            return Err(Error::IndexOutOfRange {
                index,
                count,
            });
        }

        Ok(count)
    }

    pub fn get_record(&self, index: usize) -> Result<Record, Error> {
        if self.is_dirty() {
            let (sub, index) = self.locate(index)?;
            return sub.get_record(index);
        }

        let count = self.check_index(index)?;
        let record_size = self.file.record_size();
        let start = self.header_len() + index * record_size;
        let last = index + 1 == count;

        Ok(Record {
            stamp:             self.time().add_nanos((index as i64).saturating_mul(self.file.record_interval())),
            record_no:         self.header.record_no.map(|n| n.wrapping_add(index as u32)),
            data:              self.contents.slice(start..start + record_size),
            file_mark_after:   last && self.file_mark(),
            remove_mark_after: last && self.remove_mark(),
        })
    }

    /// Absolute file offset of record `index`'s payload.
    pub fn get_record_offset(&self, index: usize) -> Result<u64, Error> {
        if self.is_dirty() {
            let (sub, index) = self.locate(index)?;
            return sub.get_record_offset(index);
        }

        self.check_index(index)?;

        Ok(self.file_offset + (self.header_len() + index * self.file.record_size()) as u64)
    }

    /// Time and number of the last record.
    ///
    /// A dirty frame answers from its first (oldest) subframe.
    pub fn newest_record_info(&self) -> Result<Option<RecordInfo>, Error> {
        if self.is_dirty() {
            return match self.subframes()?.first() {
                Some(sub) => Ok(sub.flat_newest_record_info()),
                None => Ok(None),
            };
        }

        Ok(self.flat_newest_record_info())
    }

    fn flat_newest_record_info(&self) -> Option<RecordInfo> {
        let last = self.flat_records_count().checked_sub(1)?;

        Some(RecordInfo {
            stamp:     self.time().add_nanos((last as i64).saturating_mul(self.file.record_interval())),
            record_no: self.header.record_no.map(|n| n.wrapping_add(last as u32)),
        })
    }
}

/// Smallest buffer a frame of `file`'s type can occupy.
pub fn min_frame_size(file: &DataFile) -> usize {
    match file.file_type() {
        FileType::Tob1 => file.frame_header_len().max(1),
        FileType::Tob2 => MIN_TOB2_FRAME_SIZE,
        FileType::Tob3 => MIN_TOB3_FRAME_SIZE,
    }
}

fn read_header(file: &DataFile, contents: &[u8]) -> Result<FrameHeader, Error> {
    let header = match file.file_type() {
        FileType::Tob3 => {
            let raw = Tob3Header::unpack_from_slice(&contents[..TOB3_HEADER_LEN])?;

            FrameHeader {
                seconds:    raw.seconds as i64,
                subseconds: raw.subseconds as i64,
                record_no:  Some(raw.record_no),
            }
        },
        FileType::Tob2 => {
            let raw = Tob2Header::unpack_from_slice(&contents[..TOB2_HEADER_LEN])?;

            FrameHeader {
                seconds:    raw.seconds as i64,
                subseconds: raw.subseconds as i64,
                record_no:  None,
            }
        },
        FileType::Tob1 => {
            let layout = file.tob1_layout();
            let word = |at: Option<usize>| {
                at.and_then(|at| contents.get(at..at + 4))
                    .and_then(|b| b.try_into().ok())
                    .map(u32::from_le_bytes)
            };

            FrameHeader {
                seconds:    word(layout.seconds).unwrap_or_default() as i64,
                subseconds: word(layout.nanoseconds).unwrap_or_default() as i64,
                record_no:  word(layout.record_no),
            }
        },
    };

    Ok(header)
}
