use std::{
    fmt::{
        Display,
        Formatter,
    },
    str::FromStr,
};

use crate::LgrDate;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("unknown data type {0:?}")]
    UnknownType(String),

    #[error("{ty} needs {need} bytes, got {got}")]
    Short { ty: DataType, need: usize, got: usize },
}

/// Storage type of one field, as named in a TOB header.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    Fp2,
    Ieee4,
    Ieee4B,
    Ieee8,
    Ieee8B,
    Uint1,
    Uint2,
    Uint4,
    Int1,
    Int2,
    Int4,
    ULong,
    Long,
    Bool,
    Bool2,
    Bool4,
    NSec,
    SecNano,
    Ascii(usize),
}

impl DataType {
    pub const fn size(&self) -> usize {
        match self {
            DataType::Uint1 | DataType::Int1 | DataType::Bool => 1,
            DataType::Fp2 | DataType::Uint2 | DataType::Int2 | DataType::Bool2 => 2,
            DataType::Ieee4
            | DataType::Ieee4B
            | DataType::Uint4
            | DataType::Int4
            | DataType::ULong
            | DataType::Long
            | DataType::Bool4 => 4,
            DataType::Ieee8 | DataType::Ieee8B | DataType::NSec | DataType::SecNano => 8,
            DataType::Ascii(len) => *len,
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Value, Error> {
        let need = self.size();
        if bytes.len() < need {
            return Err(Error::Short {
                ty: *self,
                need,
                got: bytes.len(),
            });
        }

        let b = &bytes[..need];

        let value = match self {
            DataType::Fp2 => Value::Float(decode_fp2(u16::from_be_bytes([b[0], b[1]]))),
            DataType::Ieee4 => Value::Float(f32::from_le_bytes(array(b)) as f64),
            DataType::Ieee4B => Value::Float(f32::from_be_bytes(array(b)) as f64),
            DataType::Ieee8 => Value::Float(f64::from_le_bytes(array(b))),
            DataType::Ieee8B => Value::Float(f64::from_be_bytes(array(b))),
            DataType::Uint1 => Value::UInt(b[0] as u64),
            DataType::Uint2 => Value::UInt(u16::from_be_bytes(array(b)) as u64),
            DataType::Uint4 => Value::UInt(u32::from_be_bytes(array(b)) as u64),
            DataType::Int1 => Value::Int(b[0] as i8 as i64),
            DataType::Int2 => Value::Int(i16::from_be_bytes(array(b)) as i64),
            DataType::Int4 => Value::Int(i32::from_be_bytes(array(b)) as i64),
            DataType::ULong => Value::UInt(u32::from_le_bytes(array(b)) as u64),
            DataType::Long => Value::Int(i32::from_le_bytes(array(b)) as i64),
            DataType::Bool | DataType::Bool2 | DataType::Bool4 => Value::Bool(b.iter().any(|&x| x != 0)),
            DataType::NSec | DataType::SecNano => {
                let seconds = i32::from_le_bytes(array(&b[..4]));
                let nanos = u32::from_le_bytes(array(&b[4..]));
                Value::Time(LgrDate::from_parts(seconds as i64, nanos as i64))
            },
            DataType::Ascii(_) => {
                let end = b.iter().position(|&x| x == 0).unwrap_or(b.len());
                Value::Text(String::from_utf8_lossy(&b[..end]).into_owned())
            },
        };

        Ok(value)
    }
}

#[inline]
fn array<const N: usize>(b: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&b[..N]);
    out
}

/// Campbell two-byte decimal float: sign bit, two bit decimal exponent, 13 bit
/// mantissa.
pub fn decode_fp2(raw: u16) -> f64 {
    let negative = raw & 0x8000 != 0;
    let exponent = (raw >> 13) & 0x3;
    let mantissa = raw & 0x1fff;

    let value = match (negative, exponent, mantissa) {
        (true, 0, 0x1ffe) => return f64::NAN,
        (_, 0, 0x1fff) => f64::INFINITY,
        _ => mantissa as f64 / 10f64.powi(exponent as i32),
    };

    if negative {
        -value
    } else {
        value
    }
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ty = match s.trim() {
            "FP2" => DataType::Fp2,
            "IEEE4" | "IEEE4L" => DataType::Ieee4,
            "IEEE4B" => DataType::Ieee4B,
            "IEEE8" | "IEEE8L" => DataType::Ieee8,
            "IEEE8B" => DataType::Ieee8B,
            "UINT1" => DataType::Uint1,
            "UINT2" => DataType::Uint2,
            "UINT4" => DataType::Uint4,
            "INT1" => DataType::Int1,
            "INT2" => DataType::Int2,
            "INT4" => DataType::Int4,
            "ULONG" => DataType::ULong,
            "LONG" => DataType::Long,
            "BOOL" => DataType::Bool,
            "BOOL2" => DataType::Bool2,
            "BOOL4" => DataType::Bool4,
            "NSEC" => DataType::NSec,
            "SecNano" => DataType::SecNano,
            other => {
                let len = other
                    .strip_prefix("ASCII(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .and_then(|len| len.parse::<usize>().ok())
                    .filter(|&len| len > 0)
                    .ok_or_else(|| Error::UnknownType(other.to_owned()))?;

                DataType::Ascii(len)
            },
        };

        Ok(ty)
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DataType::Fp2 => "FP2",
            DataType::Ieee4 => "IEEE4",
            DataType::Ieee4B => "IEEE4B",
            DataType::Ieee8 => "IEEE8",
            DataType::Ieee8B => "IEEE8B",
            DataType::Uint1 => "UINT1",
            DataType::Uint2 => "UINT2",
            DataType::Uint4 => "UINT4",
            DataType::Int1 => "INT1",
            DataType::Int2 => "INT2",
            DataType::Int4 => "INT4",
            DataType::ULong => "ULONG",
            DataType::Long => "LONG",
            DataType::Bool => "BOOL",
            DataType::Bool2 => "BOOL2",
            DataType::Bool4 => "BOOL4",
            DataType::NSec => "NSEC",
            DataType::SecNano => "SecNano",
            DataType::Ascii(len) => return write!(f, "ASCII({len})"),
        };

        f.write_str(name)
    }
}

/// One field description from a TOB header.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Field {
    pub name:       String,
    pub units:      String,
    pub processing: String,
    pub data_type:  DataType,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            units: String::new(),
            processing: String::new(),
            data_type,
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum Value {
    Float(f64),
    Int(i64),
    UInt(u64),
    Bool(bool),
    Text(String),
    Time(LgrDate),
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Float(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{}", *v as u8),
            Value::Text(v) => write!(f, "{v:?}"),
            Value::Time(v) => write!(f, "\"{v}\""),
        }
    }
}
