use std::fmt::{
    Display,
    Formatter,
};

bitflags::bitflags! {
    /// Flag bits of a frame footer, in footer-word position.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct FooterFlags: u32 {
        const FILE_MARK   = 0x1000;
        const REMOVE_MARK = 0x2000;
        const EMPTY       = 0x4000;
        const MINOR       = 0x8000;
    }
}

/// Trailing 32-bit little-endian word of every TOB2/TOB3 frame and subframe.
///
/// | bits  | meaning                 |
/// |-------|-------------------------|
/// | 0-11  | frame size (bytes)      |
/// | 12    | file mark               |
/// | 13    | remove mark             |
/// | 14    | empty                   |
/// | 15    | minor (dirty)           |
/// | 16-31 | validation stamp        |
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Footer(u32);

impl Footer {
    pub const OFFSET_MASK: u32 = 0x0fff;
    pub const SIZE: usize = 4;

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn new(size: u16, flags: FooterFlags, validation: u16) -> Self {
        Self((size as u32 & Self::OFFSET_MASK) | flags.bits() | ((validation as u32) << 16))
    }

    /// Reads the footer occupying the last four bytes of `frame`.
    #[inline]
    pub fn trailing(frame: &[u8]) -> Option<Self> {
        let start = frame.len().checked_sub(Self::SIZE)?;
        let word: [u8; Self::SIZE] = frame[start..].try_into().ok()?;

        Some(Self(u32::from_le_bytes(word)))
    }

    #[inline]
    pub const fn raw(&self) -> u32 {
        self.0
    }

    #[inline]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        self.0.to_le_bytes()
    }

    #[inline]
    pub const fn size(&self) -> usize {
        (self.0 & Self::OFFSET_MASK) as usize
    }

    #[inline]
    pub fn flags(&self) -> FooterFlags {
        FooterFlags::from_bits_truncate(self.0)
    }

    #[inline]
    pub fn file_mark(&self) -> bool {
        self.flags().contains(FooterFlags::FILE_MARK)
    }

    #[inline]
    pub fn remove_mark(&self) -> bool {
        self.flags().contains(FooterFlags::REMOVE_MARK)
    }

    #[inline]
    pub fn empty(&self) -> bool {
        self.flags().contains(FooterFlags::EMPTY)
    }

    #[inline]
    pub fn minor(&self) -> bool {
        self.flags().contains(FooterFlags::MINOR)
    }

    #[inline]
    pub const fn validation(&self) -> u16 {
        (self.0 >> 16) as u16
    }
}

impl Display for Footer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "size {} stamp {:#06x} flags {:?}", self.size(), self.validation(), self.flags())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bit_layout() {
        let footer = Footer::from_raw(0xbeef_b123);

        assert_eq!(footer.size(), 0x123);
        assert!(footer.minor());
        assert!(!footer.empty());
        assert!(footer.remove_mark());
        assert!(footer.file_mark());
        assert_eq!(footer.validation(), 0xbeef);
    }

    #[test]
    fn builds_and_reads_trailing() {
        let footer = Footer::new(256, FooterFlags::MINOR | FooterFlags::EMPTY, 0x1234);

        let mut frame = vec![0u8; 12];
        frame.extend_from_slice(&footer.to_bytes());

        let read = Footer::trailing(&frame).unwrap();
        assert_eq!(read, footer);
        assert_eq!(read.size(), 256);
        assert!(read.minor() && read.empty());
        assert!(!read.file_mark() && !read.remove_mark());
        assert_eq!(read.validation(), 0x1234);

        assert_eq!(Footer::trailing(&[1, 2, 3]), None);
    }
}
