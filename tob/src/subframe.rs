//! Decomposition of a dirty major frame into the minor frames written into it.
//!
//! A minor frame carries its own header and footer, with its byte size in the
//! footer. Walking footers back to front recovers the spans; the result is
//! ordered oldest to newest.

use std::{
    collections::VecDeque,
    ops::Range,
};

use crate::footer::Footer;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Error {
    #[error("subframe ending at byte {end} claims zero size")]
    ZeroSize { end: usize },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubframeSpan {
    pub start:  usize,
    pub len:    usize,
    pub footer: Footer,
}

impl SubframeSpan {
    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.len
    }
}

/// Splits `frame` into minor frame spans, newest last.
///
/// The walk stops at the first footer without the minor flag or whose size
/// runs past the start of the frame.
#[tracing::instrument(level = "trace", skip_all, fields(frame.len = frame.len()), err)]
pub fn decompose(frame: &[u8]) -> Result<Vec<SubframeSpan>, Error> {
    let mut spans = VecDeque::new();
    let mut end = frame.len();

    while let Some(footer) = Footer::trailing(&frame[..end]) {
        let size = footer.size();

        if !footer.minor() || size > end {
            break;
        }

        if size == 0 {
            return Err(Error::ZeroSize {
                end,
            });
        }

        spans.push_front(SubframeSpan {
            start: end - size,
            len: size,
            footer,
        });

        end -= size;
    }

    Ok(spans.into())
}
