//! Byte input for the command line tools.

use std::io::{
    self,
    Read,
};

use base64::Engine;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Format {
    #[default]
    Raw,
    /// Hex pairs, optionally separated by whitespace. No `0x` prefix.
    Hex,
    Base64,
}

impl Format {
    pub fn from_flags(hex: bool, base64: bool) -> eyre::Result<Self> {
        match (hex, base64) {
            (true, true) => eyre::bail!("--hex and --base64 are mutually exclusive"),
            (true, false) => Ok(Format::Hex),
            (false, true) => Ok(Format::Base64),
            (false, false) => Ok(Format::Raw),
        }
    }

    pub fn decode(&self, raw: Vec<u8>) -> eyre::Result<Vec<u8>> {
        let decoded = match self {
            Format::Raw => raw,
            Format::Hex => {
                let text = String::from_utf8(raw)?;
                hex::decode(text.replace(char::is_whitespace, ""))?
            },
            Format::Base64 => {
                let text = String::from_utf8(raw)?;
                base64::engine::general_purpose::STANDARD.decode(text.trim())?
            },
        };

        Ok(decoded)
    }
}

pub fn read_stdin(format: Format) -> eyre::Result<Vec<u8>> {
    let mut buf = vec![];
    io::stdin().read_to_end(&mut buf)?;

    format.decode(buf)
}
