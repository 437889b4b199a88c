//! Link-layer packet recognition for PakBus byte streams.
//!
//! [`LowLevelDecoder`] is resumable: it keeps its parser state between calls
//! to [`LowLevelDecoder::decode`], so callers feed whatever bytes the
//! transport produced and look at the outcome. Bad data is never an error;
//! the decoder drops back to waiting for a synch byte and carries on.

use std::collections::VecDeque;

use bytes::{
    Bytes,
    BytesMut,
};

use crate::{
    signature::{
        calc_sig_for,
        SIG_SEED,
    },
    QUEUE_CHUNK,
    QUOTE_BYTE,
    QUOTE_OFFSET,
    STORAGE_CAPACITY,
    SYNCH_BYTE,
};

/// First body byte announcing a length-prefixed, unquoted packet.
pub const UNQUOTED_MARKER: u8 = 0xf0;

/// First body byte announcing a device configuration packet.
pub const DEVCONFIG_MARKER: u8 = 0xf2;

pub const UNQUOTED_MIN_LEN: usize = 8;

/// High nibbles of the first body byte selecting the control sub-protocol.
pub const CONTROL_NIBBLES: [u8; 3] = [0x09, 0x0d, 0x0e];

/// High nibbles of the first body byte selecting the serial packet
/// sub-protocol (off-line, ready, finished, pause).
pub const LINK_NIBBLES: [u8; 4] = [0x08, 0x0a, 0x0b, 0x0c];

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum PacketKind {
    Control,
    Serial,
    Unquoted,
    DevConfig,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
    Incomplete,
    Found(PacketKind),
}

impl Outcome {
    #[inline]
    pub fn kind(&self) -> Option<PacketKind> {
        match self {
            Outcome::Incomplete => None,
            Outcome::Found(kind) => Some(*kind),
        }
    }
}

/// Result of one [`LowLevelDecoder::decode`] call.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Decoded {
    pub outcome:   Outcome,
    /// Offset in this call's input of the synch byte opening the current (or
    /// just recognised) packet. `None` if that synch byte was consumed by an
    /// earlier call.
    pub begins_at: Option<usize>,
    /// Number of input bytes consumed.
    pub processed: usize,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Keep bytes seen outside of any packet.
    pub capture_out_of_band:     bool,
    /// Also keep the earlier synch byte of a run of consecutive synch bytes.
    /// Only meaningful with `capture_out_of_band`.
    pub capture_redundant_synch: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum State {
    WaitForSynch,
    SynchFound,
    Body {
        kind:   PacketKind,
        quoted: bool,
    },
    UnquotedLen {
        high: Option<u8>,
    },
    UnquotedBody {
        len: usize,
    },
}

/// What the decoder must do besides switching state.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Signal {
    None,
    OutOfBand,
    MarkBegin,
    RedundantSynch,
    Found(PacketKind),
}

#[derive(Clone)]
struct Storage {
    buf: [u8; STORAGE_CAPACITY],
    len: usize,
}

impl Storage {
    const fn new() -> Self {
        Self {
            buf: [0; STORAGE_CAPACITY],
            len: 0,
        }
    }

    #[inline]
    fn seed(&mut self, ch: u8) {
        self.buf[0] = ch;
        self.len = 1;
    }

    #[inline]
    fn clear(&mut self) {
        self.len = 0;
    }

    /// Returns false if the buffer is already full.
    #[inline]
    fn push(&mut self, ch: u8) -> bool {
        if self.len >= self.buf.len() {
            return false;
        }

        self.buf[self.len] = ch;
        self.len += 1;
        true
    }

    #[inline]
    fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl State {
    fn on_byte(self, ch: u8, storage: &mut Storage) -> (State, Signal) {
        match self {
            State::WaitForSynch => wait_for_synch(ch),
            State::SynchFound => synch_found(ch, storage),
            State::Body {
                kind,
                quoted: false,
            } => body(kind, ch, storage),
            State::Body {
                kind,
                quoted: true,
            } => body_quoted(kind, ch, storage),
            State::UnquotedLen {
                high,
            } => unquoted_len(high, ch, storage),
            State::UnquotedBody {
                len,
            } => unquoted_body(len, ch, storage),
        }
    }
}

fn wait_for_synch(ch: u8) -> (State, Signal) {
    if ch == SYNCH_BYTE {
        (State::SynchFound, Signal::MarkBegin)
    } else {
        (State::WaitForSynch, Signal::OutOfBand)
    }
}

fn synch_found(ch: u8, storage: &mut Storage) -> (State, Signal) {
    let nibble = ch >> 4;

    let kind = match ch {
        SYNCH_BYTE => return (State::SynchFound, Signal::RedundantSynch),
        QUOTE_BYTE => return (State::WaitForSynch, Signal::None),
        UNQUOTED_MARKER => {
            storage.clear();
            return (
                State::UnquotedLen {
                    high: None,
                },
                Signal::None,
            );
        },
        DEVCONFIG_MARKER => PacketKind::DevConfig,
        _ if CONTROL_NIBBLES.contains(&nibble) => PacketKind::Control,
        _ if LINK_NIBBLES.contains(&nibble) => PacketKind::Serial,
        _ => return (State::WaitForSynch, Signal::None),
    };

    storage.seed(ch);

    (
        State::Body {
            kind,
            quoted: false,
        },
        Signal::None,
    )
}

fn body(kind: PacketKind, ch: u8, storage: &mut Storage) -> (State, Signal) {
    match ch {
        QUOTE_BYTE => (
            State::Body {
                kind,
                quoted: true,
            },
            Signal::None,
        ),
        SYNCH_BYTE => {
            if calc_sig_for(storage.as_slice(), SIG_SEED) == 0 {
                return (State::WaitForSynch, Signal::Found(kind));
            }

            tracing::trace!(
                ?kind,
                body = %hex::encode(storage.as_slice()),
                "discarding packet with bad signature"
            );

            // the closing synch of a bad candidate may be the opening synch
            // of a good one
            (State::SynchFound, Signal::MarkBegin)
        },
        _ => push_or_reset(
            State::Body {
                kind,
                quoted: false,
            },
            ch,
            storage,
        ),
    }
}

fn body_quoted(kind: PacketKind, ch: u8, storage: &mut Storage) -> (State, Signal) {
    if ch == SYNCH_BYTE {
        tracing::trace!(?kind, "synch byte after quote, restarting");
        return (State::SynchFound, Signal::MarkBegin);
    }

    push_or_reset(
        State::Body {
            kind,
            quoted: false,
        },
        ch.wrapping_sub(QUOTE_OFFSET),
        storage,
    )
}

fn unquoted_len(high: Option<u8>, ch: u8, _storage: &mut Storage) -> (State, Signal) {
    let high = match high {
        None => {
            return (
                State::UnquotedLen {
                    high: Some(ch),
                },
                Signal::None,
            )
        },
        Some(high) => high,
    };

    let len = u16::from_be_bytes([high, ch]) as usize;
    if !(UNQUOTED_MIN_LEN..=STORAGE_CAPACITY).contains(&len) {
        tracing::debug!(len, "rejecting unquoted packet length");
        return (State::WaitForSynch, Signal::None);
    }

    (
        State::UnquotedBody {
            len,
        },
        Signal::None,
    )
}

fn unquoted_body(len: usize, ch: u8, storage: &mut Storage) -> (State, Signal) {
    let (next, signal) = push_or_reset(
        State::UnquotedBody {
            len,
        },
        ch,
        storage,
    );

    if next != State::WaitForSynch && storage.len == len {
        return (State::WaitForSynch, Signal::Found(PacketKind::Unquoted));
    }

    (next, signal)
}

fn push_or_reset(next: State, ch: u8, storage: &mut Storage) -> (State, Signal) {
    if storage.push(ch) {
        (next, Signal::None)
    } else {
        tracing::debug!(capacity = STORAGE_CAPACITY, "packet overflows storage, resynchronising");
        (State::WaitForSynch, Signal::None)
    }
}

pub struct LowLevelDecoder {
    state:       State,
    storage:     Storage,
    config:      DecoderConfig,
    out_of_band: BytesMut,
}

impl Default for LowLevelDecoder {
    fn default() -> Self {
        Self::new(DecoderConfig::default())
    }
}

impl std::fmt::Debug for LowLevelDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LowLevelDecoder")
            .field("state", &self.state)
            .field("storage_len", &self.storage.len)
            .field("config", &self.config)
            .field("out_of_band_len", &self.out_of_band.len())
            .finish()
    }
}

impl LowLevelDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            state: State::WaitForSynch,
            storage: Storage::new(),
            config,
            out_of_band: BytesMut::new(),
        }
    }

    #[inline]
    pub fn state(&self) -> State {
        self.state
    }

    #[inline]
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Body of the most recently recognised packet, after unquoting. Only
    /// meaningful right after a [`Outcome::Found`].
    #[inline]
    pub fn storage(&self) -> &[u8] {
        self.storage.as_slice()
    }

    /// Drains the bytes seen between packets.
    pub fn take_out_of_band(&mut self) -> Bytes {
        self.out_of_band.split().freeze()
    }

    pub fn reset(&mut self) {
        self.state = State::WaitForSynch;
        self.storage.clear();
    }

    /// Feeds `buf` through the state machine, stopping right after the first
    /// recognised packet.
    pub fn decode(&mut self, buf: &[u8]) -> Decoded {
        let mut begins_at = None;

        for (i, &ch) in buf.iter().enumerate() {
            let (next, signal) = self.state.on_byte(ch, &mut self.storage);
            self.state = next;

            match signal {
                Signal::None => {},
                Signal::OutOfBand => {
                    if self.config.capture_out_of_band {
                        self.out_of_band.extend_from_slice(&[ch]);
                    }
                },
                Signal::MarkBegin => begins_at = Some(i),
                Signal::RedundantSynch => {
                    if self.config.capture_out_of_band && self.config.capture_redundant_synch {
                        self.out_of_band.extend_from_slice(&[SYNCH_BYTE]);
                    }

                    begins_at = Some(i);
                },
                Signal::Found(kind) => {
                    tracing::trace!(?kind, len = self.storage.len, "link-layer packet recognised");

                    return Decoded {
                        outcome: Outcome::Found(kind),
                        begins_at,
                        processed: i + 1,
                    };
                },
            }

            if self.state == State::WaitForSynch {
                begins_at = None;
            }
        }

        Decoded {
            outcome: Outcome::Incomplete,
            begins_at,
            processed: buf.len(),
        }
    }

    /// Runs [`decode`](Self::decode) over the front of a receive queue,
    /// popping exactly the bytes that were consumed. At most [`QUEUE_CHUNK`]
    /// bytes are looked at per call.
    pub fn decode_queue(&mut self, queue: &mut VecDeque<u8>) -> Decoded {
        let mut chunk = [0u8; QUEUE_CHUNK];
        let count = queue.len().min(QUEUE_CHUNK);

        let (front, back) = queue.as_slices();
        let from_front = front.len().min(count);
        chunk[..from_front].copy_from_slice(&front[..from_front]);
        chunk[from_front..count].copy_from_slice(&back[..count - from_front]);

        let decoded = self.decode(&chunk[..count]);
        queue.drain(..decoded.processed);

        decoded
    }
}

#[cfg(test)]
mod test {
    use bytes::BytesMut;
    use proptest::prelude::*;

    use super::*;
    use crate::quote::encode_packet;

    fn packet(body: &[u8]) -> Vec<u8> {
        let mut dst = BytesMut::new();
        encode_packet(body, &mut dst).unwrap();
        dst.to_vec()
    }

    fn signed(body: &[u8]) -> Vec<u8> {
        let mut out = body.to_vec();
        out.extend_from_slice(&crate::signature::calc_sig_nullifier(calc_sig_for(body, SIG_SEED)));
        out
    }

    fn unquoted(body: &[u8]) -> Vec<u8> {
        let mut out = vec![SYNCH_BYTE, UNQUOTED_MARKER];
        out.extend_from_slice(&(body.len() as u16).to_be_bytes());
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn finds_serial_packet() {
        let body = [0xa0, 0x01, 0x40, 0x02, 0x00, 0x01];
        let wire = packet(&body);

        let mut decoder = LowLevelDecoder::default();
        let decoded = decoder.decode(&wire);

        assert_eq!(decoded.outcome, Outcome::Found(PacketKind::Serial));
        assert_eq!(decoded.begins_at, Some(0));
        assert_eq!(decoded.processed, wire.len());
        assert_eq!(decoder.storage(), &signed(&body)[..]);
        assert_eq!(decoder.state(), State::WaitForSynch);
    }

    #[test]
    fn selects_sub_protocol_by_lead_byte() {
        let cases = [
            (0x90, PacketKind::Control),
            (0xd1, PacketKind::Control),
            (0xe0, PacketKind::Control),
            (0x80, PacketKind::Serial),
            (0xb3, PacketKind::Serial),
            (0xc7, PacketKind::Serial),
            (DEVCONFIG_MARKER, PacketKind::DevConfig),
        ];

        for (lead, kind) in cases {
            let mut decoder = LowLevelDecoder::default();
            let decoded = decoder.decode(&packet(&[lead, 0x01, 0x02]));

            assert_eq!(decoded.outcome, Outcome::Found(kind), "lead byte {lead:#04x}");
        }
    }

    #[test]
    fn rejects_unknown_lead_byte() {
        for lead in [0x00, 0x10, 0x7f, 0xf1, 0xf3] {
            let mut decoder = LowLevelDecoder::default();
            let mut wire = vec![SYNCH_BYTE, lead];
            wire.extend_from_slice(&signed(&[lead, 0x01])[1..]);
            wire.push(SYNCH_BYTE);

            assert_eq!(decoder.decode(&wire).outcome, Outcome::Incomplete);
        }
    }

    #[test]
    fn resumes_across_calls() {
        let wire = packet(&[0xa0, 0x01, 0x40, 0x02, 0xbd, 0xbc, 0x00]);
        let mut decoder = LowLevelDecoder::default();

        for split in 1..wire.len() {
            decoder.reset();

            let first = decoder.decode(&wire[..split]);
            assert_eq!(first.outcome, Outcome::Incomplete);
            assert_eq!(first.processed, split);

            let second = decoder.decode(&wire[split..]);
            assert_eq!(second.outcome, Outcome::Found(PacketKind::Serial), "split at {split}");
            assert_eq!(second.begins_at, None);
        }
    }

    #[test]
    fn consecutive_synch_bytes_move_begin() {
        let mut wire = vec![0x11, SYNCH_BYTE, SYNCH_BYTE, SYNCH_BYTE];
        wire.extend_from_slice(&packet(&[0xa0, 0x01])[1..]);

        let mut decoder = LowLevelDecoder::default();
        let decoded = decoder.decode(&wire);

        assert_eq!(decoded.outcome, Outcome::Found(PacketKind::Serial));
        assert_eq!(decoded.begins_at, Some(3));
    }

    #[test]
    fn stops_after_first_packet() {
        let first = packet(&[0xa0, 0x01]);
        let second = packet(&[0x90, 0x02]);
        let wire = [first.clone(), second.clone()].concat();

        let mut decoder = LowLevelDecoder::default();

        let decoded = decoder.decode(&wire);
        assert_eq!(decoded.outcome, Outcome::Found(PacketKind::Serial));
        assert_eq!(decoded.processed, first.len());

        let decoded = decoder.decode(&wire[first.len()..]);
        assert_eq!(decoded.outcome, Outcome::Found(PacketKind::Control));
        assert_eq!(decoded.begins_at, Some(0));
        assert_eq!(decoder.storage(), &signed(&[0x90, 0x02])[..]);
    }

    #[test]
    fn bad_signature_is_dropped() {
        let mut wire = packet(&[0xa0, 0x01, 0x40]);
        let last = wire.len() - 2;
        wire[last] ^= 0x01;

        let mut decoder = LowLevelDecoder::default();
        let decoded = decoder.decode(&wire);

        assert_eq!(decoded.outcome, Outcome::Incomplete);
        assert_eq!(decoded.processed, wire.len());
    }

    #[test]
    fn resynchronises_after_truncated_candidate() {
        // bad signature at the closing synch, quote then synch, synch with no body
        let truncated: [&[u8]; 3] = [&[SYNCH_BYTE, 0xa0, 0x01], &[SYNCH_BYTE, 0xa0, QUOTE_BYTE], &[SYNCH_BYTE, 0x90]];
        let wire = packet(&[0x90, 0x01, 0x02]);

        for prefix in truncated {
            let stream = [prefix, &wire[..]].concat();

            let mut decoder = LowLevelDecoder::default();
            let decoded = decoder.decode(&stream);

            assert_eq!(decoded.outcome, Outcome::Found(PacketKind::Control), "prefix {}", hex::encode(prefix));
            assert_eq!(decoded.begins_at, Some(prefix.len()), "prefix {}", hex::encode(prefix));
            assert_eq!(decoded.processed, stream.len());
            assert_eq!(decoder.storage(), &signed(&[0x90, 0x01, 0x02])[..]);
        }
    }

    #[test]
    fn overflow_resynchronises() {
        let mut wire = vec![SYNCH_BYTE, 0xa0];
        wire.extend(std::iter::repeat(0x01).take(STORAGE_CAPACITY));
        wire.extend_from_slice(&packet(&[0xa0, 0x02]));

        let mut decoder = LowLevelDecoder::default();
        let decoded = decoder.decode(&wire);

        assert_eq!(decoded.outcome, Outcome::Found(PacketKind::Serial));
        assert_eq!(decoded.begins_at, Some(STORAGE_CAPACITY + 2));
        assert_eq!(decoder.storage(), &signed(&[0xa0, 0x02])[..]);
    }

    #[test]
    fn unquoted_length_bounds() {
        for len in [UNQUOTED_MIN_LEN, STORAGE_CAPACITY] {
            let body: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let wire = unquoted(&body);

            let mut decoder = LowLevelDecoder::default();
            let decoded = decoder.decode(&wire);

            assert_eq!(decoded.outcome, Outcome::Found(PacketKind::Unquoted), "len {len}");
            assert_eq!(decoded.processed, wire.len());
            assert_eq!(decoder.storage(), &body[..]);
        }

        for len in [UNQUOTED_MIN_LEN - 1, STORAGE_CAPACITY + 1] {
            let body = vec![0x55; len];
            let wire = unquoted(&body);

            let mut decoder = LowLevelDecoder::default();
            let decoded = decoder.decode(&wire);

            assert_eq!(decoded.outcome, Outcome::Incomplete, "len {len}");
            assert_eq!(decoded.processed, wire.len());
        }
    }

    #[test]
    fn unquoted_body_may_contain_synch() {
        let body = [SYNCH_BYTE, QUOTE_BYTE, 0, 1, 2, 3, 4, SYNCH_BYTE];

        let mut decoder = LowLevelDecoder::default();
        let decoded = decoder.decode(&unquoted(&body));

        assert_eq!(decoded.outcome, Outcome::Found(PacketKind::Unquoted));
        assert_eq!(decoder.storage(), &body[..]);
    }

    #[test]
    fn captures_out_of_band_bytes() {
        let mut wire = b"AT\r\n".to_vec();
        wire.push(SYNCH_BYTE);
        wire.extend_from_slice(&packet(&[0xa0, 0x01]));

        let mut decoder = LowLevelDecoder::new(DecoderConfig {
            capture_out_of_band:     true,
            capture_redundant_synch: false,
        });
        assert!(decoder.decode(&wire).outcome.kind().is_some());
        assert_eq!(decoder.take_out_of_band().as_ref(), b"AT\r\n");
        assert!(decoder.take_out_of_band().is_empty());

        let mut decoder = LowLevelDecoder::new(DecoderConfig {
            capture_out_of_band:     true,
            capture_redundant_synch: true,
        });
        assert!(decoder.decode(&wire).outcome.kind().is_some());
        assert_eq!(decoder.take_out_of_band().as_ref(), b"AT\r\n\xbd");

        let mut decoder = LowLevelDecoder::default();
        assert!(decoder.decode(&wire).outcome.kind().is_some());
        assert!(decoder.take_out_of_band().is_empty());
    }

    #[test]
    fn queue_adapter_pops_consumed_bytes() {
        let mut queue: VecDeque<u8> = std::iter::repeat(0x42).take(QUEUE_CHUNK + 500).collect();
        let wire = packet(&[0x90, 0x01, 0x02]);
        queue.extend(wire.iter().copied());
        queue.push_back(0x77);

        let mut decoder = LowLevelDecoder::default();

        let decoded = decoder.decode_queue(&mut queue);
        assert_eq!(decoded.outcome, Outcome::Incomplete);
        assert_eq!(decoded.processed, QUEUE_CHUNK);
        assert_eq!(queue.len(), 500 + wire.len() + 1);

        let decoded = decoder.decode_queue(&mut queue);
        assert_eq!(decoded.outcome, Outcome::Found(PacketKind::Control));
        assert_eq!(decoded.begins_at, Some(500));
        assert_eq!(queue.iter().copied().collect::<Vec<_>>(), vec![0x77]);
    }

    #[test]
    fn queue_adapter_handles_wrapped_queue() {
        let wire = packet(&[0xa0, 0x05, 0x06]);

        let mut queue = VecDeque::with_capacity(8);
        queue.extend([0u8; 6]);
        queue.drain(..6);
        queue.extend(wire.iter().copied());

        let mut decoder = LowLevelDecoder::default();
        let decoded = decoder.decode_queue(&mut queue);

        assert_eq!(decoded.outcome, Outcome::Found(PacketKind::Serial));
        assert!(queue.is_empty());
    }

    fn lead_byte() -> impl Strategy<Value = u8> {
        prop_oneof![0x80u8..=0x8f, 0xa0u8..=0xbb, 0xbeu8..=0xcf]
    }

    proptest! {
        #[test]
        fn escaping_round_trip(lead in lead_byte(), rest in proptest::collection::vec(any::<u8>(), 0..200)) {
            let mut body = vec![lead];
            body.extend_from_slice(&rest);

            let mut decoder = LowLevelDecoder::default();
            let decoded = decoder.decode(&packet(&body));

            prop_assert_eq!(decoded.outcome, Outcome::Found(PacketKind::Serial));
            prop_assert_eq!(decoder.storage(), &signed(&body)[..]);
        }

        #[test]
        fn unsigned_body_never_found(lead in lead_byte(), rest in proptest::collection::vec(any::<u8>(), 0..64)) {
            let mut body = vec![lead];
            body.extend_from_slice(&rest);
            prop_assume!(calc_sig_for(&body, SIG_SEED) != 0);

            let mut wire = vec![SYNCH_BYTE];
            wire.extend_from_slice(&crate::quote::quote(&body));
            wire.push(SYNCH_BYTE);

            let mut decoder = LowLevelDecoder::default();
            prop_assert_eq!(decoder.decode(&wire).outcome, Outcome::Incomplete);
        }

        #[test]
        fn resynchronises_after_garbage(
            garbage in proptest::collection::vec(any::<u8>().prop_filter("synch byte", |b| *b != SYNCH_BYTE), 0..300),
            lead in lead_byte(),
            rest in proptest::collection::vec(any::<u8>(), 0..32)
        ) {
            let mut body = vec![lead];
            body.extend_from_slice(&rest);
            let wire = packet(&body);

            let mut decoder = LowLevelDecoder::default();

            let prefix = decoder.decode(&garbage);
            prop_assert_eq!(prefix.outcome, Outcome::Incomplete);
            prop_assert_eq!(prefix.processed, garbage.len());

            let stream = [garbage.clone(), wire].concat();
            decoder.reset();
            let decoded = decoder.decode(&stream);

            prop_assert_eq!(decoded.outcome, Outcome::Found(PacketKind::Serial));
            prop_assert_eq!(decoded.begins_at, Some(garbage.len()));
            prop_assert_eq!(decoded.processed, stream.len());
        }
    }
}
