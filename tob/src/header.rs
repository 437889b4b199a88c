use packed_struct::prelude::*;

/// Binary header opening every TOB3 frame and subframe.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PackedStruct)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "12", endian = "lsb")]
pub struct Tob3Header {
    pub seconds:    u32,
    pub subseconds: u32,
    pub record_no:  u32,
}

/// Binary header opening every TOB2 frame and subframe.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PackedStruct)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "8", endian = "lsb")]
pub struct Tob2Header {
    pub seconds:    u32,
    pub subseconds: u32,
}

pub const TOB3_HEADER_LEN: usize = 12;
pub const TOB2_HEADER_LEN: usize = 8;

#[cfg(test)]
mod test {
    use byteorder::{
        LittleEndian,
        WriteBytesExt,
    };

    use super::*;

    #[test]
    fn tob3_is_little_endian() -> eyre::Result<()> {
        let mut raw = vec![];
        raw.write_u32::<LittleEndian>(1_000_000)?;
        raw.write_u32::<LittleEndian>(2_500)?;
        raw.write_u32::<LittleEndian>(77)?;

        let header = Tob3Header::unpack_from_slice(&raw)?;
        assert_eq!(header, Tob3Header {
            seconds:    1_000_000,
            subseconds: 2_500,
            record_no:  77,
        });

        assert_eq!(&header.pack()?[..], &raw[..]);

        Ok(())
    }

    #[test]
    fn tob2_rejects_short_input() {
        assert!(Tob2Header::unpack_from_slice(&[0u8; 7]).is_err());
        assert!(Tob2Header::unpack_from_slice(&[0u8; 8]).is_ok());
    }
}
