//! PakBus signature: a 16-bit running checksum seeded with [`SIG_SEED`].
//!
//! A packet body that ends with its own signature nullifier signs to zero,
//! which is how the link layer decides a candidate packet is intact.

pub const SIG_SEED: u16 = 0xAAAA;

/// Computes the running signature of `buf`, continuing from `seed`.
#[inline]
pub fn calc_sig_for(buf: &[u8], seed: u16) -> u16 {
    buf.iter().fold(seed, |sig, &byte| step(sig, byte))
}

#[inline]
fn step(sig: u16, byte: u8) -> u16 {
    let mut rotated = (sig << 1) & 0x01ff;
    if rotated >= 0x100 {
        rotated += 1;
    }

    ((rotated + (sig >> 8) + byte as u16) & 0xff) | (sig << 8)
}

/// The single byte that zeroes the low byte of the signature after `sig`.
#[inline]
fn nullifier_byte(sig: u16) -> u8 {
    let mut rotated = (sig << 1) & 0x01ff;
    if rotated >= 0x100 {
        rotated += 1;
    }

    let partial = (rotated + (sig >> 8)) & 0xff;
    (0x100u16.wrapping_sub(partial) & 0xff) as u8
}

/// Returns the two bytes which, appended to a body signing to `sig`, make the
/// whole body sign to zero.
pub fn calc_sig_nullifier(sig: u16) -> [u8; 2] {
    let first = nullifier_byte(sig);
    let second = nullifier_byte(step(sig, first));

    [first, second]
}

/// Incremental form of [`calc_sig_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature(u16);

impl Default for Signature {
    fn default() -> Self {
        Self(SIG_SEED)
    }
}

impl Signature {
    #[inline]
    pub const fn with_seed(seed: u16) -> Self {
        Self(seed)
    }

    #[inline]
    pub fn update(&mut self, buf: &[u8]) -> &mut Self {
        self.0 = calc_sig_for(buf, self.0);
        self
    }

    #[inline]
    pub const fn value(&self) -> u16 {
        self.0
    }

    #[inline]
    pub fn nullifier(&self) -> [u8; 2] {
        calc_sig_nullifier(self.0)
    }
}
