use bytes::{
    BufMut,
    BytesMut,
};

use crate::{
    signature::Signature,
    QUOTE_BYTE,
    QUOTE_OFFSET,
    STORAGE_CAPACITY,
    SYNCH_BYTE,
};

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("empty packet body")]
    Empty,

    #[error("quote byte at end of input")]
    DanglingQuote,

    #[error("unescaped synch byte at offset {0}")]
    BareSynch(usize),

    #[error("body of {0} bytes does not fit the link-layer buffer")]
    Oversize(usize),

    #[error("a packet body cannot start with {0:#04x}")]
    InvalidLeadByte(u8),
}

#[inline]
fn needs_quote(byte: u8) -> bool {
    byte == SYNCH_BYTE || byte == QUOTE_BYTE
}

/// Appends `body` to `dst`, escaping synch and quote bytes.
pub fn quote_into(body: &[u8], dst: &mut BytesMut) {
    let extra = body.iter().filter(|&&b| needs_quote(b)).count();
    dst.reserve(body.len() + extra);

    for &byte in body {
        if needs_quote(byte) {
            dst.put_u8(QUOTE_BYTE);
            dst.put_u8(byte + QUOTE_OFFSET);
        } else {
            dst.put_u8(byte);
        }
    }
}

pub fn quote(body: &[u8]) -> BytesMut {
    let mut dst = BytesMut::new();
    quote_into(body, &mut dst);
    dst
}

/// Reverses [`quote_into`].
pub fn unquote(src: &[u8]) -> Result<Vec<u8>, Error> {
    let mut out = Vec::with_capacity(src.len());
    let mut iter = src.iter().copied().enumerate();

    while let Some((i, byte)) = iter.next() {
        match byte {
            SYNCH_BYTE => return Err(Error::BareSynch(i)),
            QUOTE_BYTE => {
                let (_, escaped) = iter.next().ok_or(Error::DanglingQuote)?;
                out.push(escaped.wrapping_sub(QUOTE_OFFSET));
            },
            other => out.push(other),
        }
    }

    Ok(out)
}

/// Writes a complete link-layer packet: leading synch, the quoted body
/// followed by its signature nullifier, and a trailing synch.
#[tracing::instrument(level = "trace", skip_all, fields(body = %hex::encode(body)), err)]
pub fn encode_packet(body: &[u8], dst: &mut BytesMut) -> Result<(), Error> {
    let lead = *body.first().ok_or(Error::Empty)?;
    if needs_quote(lead) {
        return Err(Error::InvalidLeadByte(lead));
    }

    if body.len() + 2 > STORAGE_CAPACITY {
        return Err(Error::Oversize(body.len()));
    }

    let nullifier = Signature::default().update(body).nullifier();

    dst.reserve(body.len() + 6);
    dst.put_u8(SYNCH_BYTE);
    quote_into(body, dst);
    quote_into(&nullifier, dst);
    dst.put_u8(SYNCH_BYTE);

    Ok(())
}
