//! Walks the frames of a whole TOB file image.

use std::path::Path;

use bytes::Bytes;

use crate::{
    data_file::{
        self,
        DataFile,
        FileType,
    },
    frame::{
        self,
        Frame,
        Record,
        RecordInfo,
    },
    LgrDate,
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    DataFile(#[from] data_file::Error),

    #[error(transparent)]
    Frame(#[from] frame::Error),

    #[error("frame slot {slot} out of range for file holding {count}")]
    NoSuchSlot { slot: usize, count: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Location of one record in the file.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize)]
pub struct IndexEntry {
    pub stamp:     LgrDate,
    pub record_no: Option<u32>,
    pub offset:    u64,
}

/// Owns a file image and hands out [`Frame`]s borrowing it.
#[derive(Clone, Debug)]
pub struct TobFileReader {
    file:  DataFile,
    image: Bytes,
}

impl TobFileReader {
    #[tracing::instrument(skip_all, fields(path = %path.as_ref().display()), err)]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let image = std::fs::read(path.as_ref())?;
        Self::from_bytes(image)
    }

    /// Parses the header at the start of `image`.
    pub fn from_bytes(image: impl Into<Bytes>) -> Result<Self, Error> {
        let image = image.into();
        let file = DataFile::parse(&image)?;

        Ok(Self::with_data_file(file, image))
    }

    /// Frames of `image` start at `file.header_len()`.
    pub fn with_data_file(file: DataFile, image: impl Into<Bytes>) -> Self {
        Self {
            file,
            image: image.into(),
        }
    }

    #[inline]
    pub fn data_file(&self) -> &DataFile {
        &self.file
    }

    /// Number of whole frame slots after the header.
    pub fn frame_count(&self) -> usize {
        self.image.len().saturating_sub(self.file.header_len()) / self.file.frame_size()
    }

    pub fn frame_at(&self, slot: usize) -> Result<Frame<'_>, Error> {
        let count = self.frame_count();
        if slot >= count {
            return Err(Error::NoSuchSlot {
                slot,
                count,
            });
        }

        let start = self.file.header_len() + slot * self.file.frame_size();
        let contents = self.image.slice(start..start + self.file.frame_size());

        Ok(Frame::new(&self.file, contents, start as u64)?)
    }

    /// Frames holding records, oldest first.
    ///
    /// TOB1 frames come in file order. TOB2/TOB3 slots form a ring: the walk
    /// starts at the slot whose first record is oldest and wraps around.
    /// Slots that are unreadable, empty, or stamped for another file are
    /// skipped.
    pub fn frames(&self) -> Vec<Frame<'_>> {
        let stamp = Some(self.file.validation_stamp());

        let mut frames = (0..self.frame_count())
            .filter_map(|slot| match self.usable_frame(slot, stamp) {
                Ok(frame) => frame.map(|frame| (slot, frame)),
                Err(e) => {
                    tracing::warn!(slot, error = %e, "skipping unreadable frame");
                    None
                },
            })
            .collect::<Vec<_>>();

        if self.file.file_type() != FileType::Tob1 {
            let oldest = frames
                .iter()
                .enumerate()
                .filter_map(|(i, (_, frame))| frame.get_record(0).ok().map(|r| (i, (r.stamp, r.record_no))))
                .min_by_key(|(_, key)| *key)
                .map(|(i, _)| i)
                .unwrap_or_default();

            frames.rotate_left(oldest);
        }

        tracing::debug!(
            frames = frames.len(),
            slots = self.frame_count(),
            first_slot = frames.first().map(|(slot, _)| *slot),
            "walked frame ring"
        );

        frames.into_iter().map(|(_, frame)| frame).collect()
    }

    fn usable_frame(&self, slot: usize, stamp: Option<u16>) -> Result<Option<Frame<'_>>, Error> {
        let frame = self.frame_at(slot)?;

        if !frame.is_valid(stamp) {
            tracing::trace!(slot, footer = %frame.footer(), "frame stamped for another file");
            return Ok(None);
        }

        if frame.is_empty() || frame.records_count()? == 0 {
            return Ok(None);
        }

        Ok(Some(frame))
    }

    /// Every record of every frame, oldest first.
    pub fn records(&self) -> impl Iterator<Item = Record> + '_ {
        self.frames().into_iter().flat_map(|frame| {
            let count = frame.records_count().unwrap_or_default();

            (0..count).filter_map(move |i| match frame.get_record(i) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(offset = frame.file_offset(), index = i, error = %e, "skipping unreadable record");
                    None
                },
            })
        })
    }

    /// Stamp, number and file offset of every record, oldest first.
    pub fn index(&self) -> Result<Vec<IndexEntry>, Error> {
        let mut entries = vec![];

        for frame in self.frames() {
            for i in 0..frame.records_count()? {
                let record = frame.get_record(i)?;

                entries.push(IndexEntry {
                    stamp:     record.stamp,
                    record_no: record.record_no,
                    offset:    frame.get_record_offset(i)?,
                });
            }
        }

        Ok(entries)
    }

    /// Newest record as reported by the newest frame.
    pub fn newest_record(&self) -> Result<Option<RecordInfo>, Error> {
        match self.frames().last() {
            Some(frame) => Ok(frame.newest_record_info()?),
            None => Ok(None),
        }
    }
}
