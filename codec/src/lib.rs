//! PakBus link-layer framing: signatures, byte quoting and the resumable
//! low-level packet decoder, plus a `tokio_util` codec built on top of it.

pub use ::tokio_util::codec as tokio_codec;

pub mod framed;
pub mod low_level;
pub mod quote;
pub mod signature;

pub use self::{
    framed::{
        Packet,
        PakBusCodec,
    },
    low_level::{
        Decoded,
        DecoderConfig,
        LowLevelDecoder,
        Outcome,
        PacketKind,
        State,
    },
    signature::{
        calc_sig_for,
        calc_sig_nullifier,
        Signature,
        SIG_SEED,
    },
};

/// Delimits link-layer packets.
pub const SYNCH_BYTE: u8 = 0xbd;

/// Escapes a synch or quote byte inside a packet body.
pub const QUOTE_BYTE: u8 = 0xbc;

/// Added to an escaped byte after [`QUOTE_BYTE`].
pub const QUOTE_OFFSET: u8 = 0x20;

/// Largest packet body the decoder will hold, after unquoting.
pub const STORAGE_CAPACITY: usize = 1026;

/// Bytes copied out of a receive queue per [`LowLevelDecoder::decode_queue`].
pub const QUEUE_CHUNK: usize = 1024;
