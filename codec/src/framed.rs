use std::fmt::{
    Display,
    Formatter,
};

use bytes::{
    Buf,
    Bytes,
    BytesMut,
};
use tokio_util::codec::{
    Decoder,
    Encoder,
};

use crate::{
    low_level::{
        DecoderConfig,
        LowLevelDecoder,
        Outcome,
        PacketKind,
    },
    quote,
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Quote(#[from] quote::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A recognised link-layer packet. `body` is unquoted and, for quoted
/// sub-protocols, still carries its two signature nullifier bytes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Packet {
    pub kind: PacketKind,
    pub body: Bytes,
}

impl Packet {
    /// Link state carried in the high nibble of the first body byte.
    #[inline]
    pub fn link_state(&self) -> Option<u8> {
        match self.kind {
            PacketKind::Control | PacketKind::Serial => self.body.first().map(|b| b >> 4),
            _ => None,
        }
    }
}

impl Display for Packet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} [{} bytes]: 0x{}", self.kind, self.body.len(), hex::encode(&self.body))
    }
}

/// PakBus link-layer framing over a byte stream.
#[derive(Debug, Default)]
pub struct PakBusCodec {
    decoder: LowLevelDecoder,
}

impl PakBusCodec {
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            decoder: LowLevelDecoder::new(config),
        }
    }

    #[inline]
    pub fn decoder_mut(&mut self) -> &mut LowLevelDecoder {
        &mut self.decoder
    }
}

impl<T> Encoder<T> for PakBusCodec
where
    T: AsRef<[u8]>,
{
    type Error = Error;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        quote::encode_packet(item.as_ref(), dst)?;
        Ok(())
    }
}

impl Decoder for PakBusCodec {
    type Error = Error;
    type Item = Packet;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let decoded = self.decoder.decode(src.as_ref());
        src.advance(decoded.processed);

        let result = match decoded.outcome {
            Outcome::Incomplete => None,
            Outcome::Found(kind) => Some(Packet {
                kind,
                body: Bytes::copy_from_slice(self.decoder.storage()),
            }),
        };

        Ok(result)
    }
}
