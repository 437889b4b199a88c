//! ASCII header of TOB1/TOB2/TOB3 data files and the format parameters
//! derived from it.

use std::{
    fmt::{
        Display,
        Formatter,
    },
    str::FromStr,
};

use crate::{
    field::{
        self,
        DataType,
        Field,
        Value,
    },
    header::{
        TOB2_HEADER_LEN,
        TOB3_HEADER_LEN,
    },
    lgr_date::NANOS_PER_SEC,
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("header ends before line {0}")]
    MissingLine(usize),

    #[error("unknown file type {0:?}")]
    UnknownFileType(String),

    #[error("invalid {what} in table line: {value:?}")]
    BadTableValue { what: &'static str, value: String },

    #[error("header lists {names} field names but {types} data types")]
    FieldCountMismatch { names: usize, types: usize },

    #[error("table has no fields")]
    NoFields,

    #[error("frame size {frame_size} cannot hold a {record_size} byte record")]
    FrameTooSmall { frame_size: usize, record_size: usize },

    #[error(transparent)]
    Field(#[from] field::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize)]
pub enum FileType {
    Tob1,
    Tob2,
    Tob3,
}

impl FileType {
    /// Number of ASCII header lines.
    pub const fn header_lines(&self) -> usize {
        match self {
            FileType::Tob1 => 5,
            FileType::Tob2 | FileType::Tob3 => 6,
        }
    }
}

impl FromStr for FileType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TOB1" => Ok(FileType::Tob1),
            "TOB2" => Ok(FileType::Tob2),
            "TOB3" => Ok(FileType::Tob3),
            other => Err(Error::UnknownFileType(other.to_owned())),
        }
    }
}

impl Display for FileType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FileType::Tob1 => "TOB1",
            FileType::Tob2 => "TOB2",
            FileType::Tob3 => "TOB3",
        };

        f.write_str(name)
    }
}

/// First header line.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, serde::Serialize)]
pub struct Environment {
    pub station_name:  String,
    pub model:         String,
    pub serial_no:     String,
    pub os_version:    String,
    pub program_name:  String,
    pub program_sig:   String,
    /// Empty for TOB1, whose first line ends in the table name instead.
    pub created:       String,
}

/// Leading `SECONDS`/`NANOSECONDS`/`RECORD` fields of a TOB1 record, as
/// byte offsets from the record start.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Tob1Layout {
    pub seconds:     Option<usize>,
    pub nanoseconds: Option<usize>,
    pub record_no:   Option<usize>,
    pub len:         usize,
}

impl Tob1Layout {
    fn from_fields(fields: &[Field]) -> Self {
        let mut layout = Self::default();

        for field in fields {
            if field.data_type.size() != 4 {
                break;
            }

            let slot = match field.name.as_str() {
                "SECONDS" => &mut layout.seconds,
                "NANOSECONDS" => &mut layout.nanoseconds,
                "RECORD" => &mut layout.record_no,
                _ => break,
            };

            if slot.is_some() {
                break;
            }

            *slot = Some(layout.len);
            layout.len += 4;
        }

        layout
    }

    fn field_count(&self) -> usize {
        [self.seconds, self.nanoseconds, self.record_no].iter().filter(|x| x.is_some()).count()
    }
}

/// Format parameters of one TOB file. Frames borrow this for their whole
/// lifetime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataFile {
    file_type:         FileType,
    environment:       Environment,
    table_name:        String,
    interval_ns:       i64,
    frame_size:        usize,
    intended_size:     u32,
    validation_stamp:  u16,
    subsec_res_ns:     i64,
    ring_record:       Option<u32>,
    removal_time:      Option<String>,
    fields:            Vec<Field>,
    header_len:        usize,
    tob1_layout:       Tob1Layout,
    record_size:       usize,
}

impl DataFile {
    pub fn builder(file_type: FileType) -> DataFileBuilder {
        DataFileBuilder::new(file_type)
    }

    /// Parses the ASCII header at the start of `image`.
    #[tracing::instrument(skip_all, fields(image.len = image.len()), err)]
    pub fn parse(image: &[u8]) -> Result<Self, Error> {
        let mut lines = HeaderLines::new(image);

        let env_line = lines.next_record()?;
        let file_type = env_line.first().map(String::as_str).unwrap_or_default().parse::<FileType>()?;
        let column = |i: usize| env_line.get(i).cloned().unwrap_or_default();

        let environment = Environment {
            station_name: column(1),
            model:        column(2),
            serial_no:    column(3),
            os_version:   column(4),
            program_name: column(5),
            program_sig:  column(6),
            created:      match file_type {
                FileType::Tob1 => String::new(),
                _ => column(7),
            },
        };

        let mut builder = DataFileBuilder::new(file_type);
        builder.environment = environment;

        // TOB1 carries the table name where the other types carry the creation time
        if file_type == FileType::Tob1 {
            builder.table_name = column(7);
        }

        if file_type != FileType::Tob1 {
            let table = lines.next_record()?;
            let column = |i: usize, what: &'static str| {
                table.get(i).map(|s| s.trim()).ok_or_else(|| Error::BadTableValue {
                    what,
                    value: String::new(),
                })
            };

            builder.table_name = column(0, "table name")?.to_owned();
            builder.interval_ns = parse_interval(column(1, "interval")?)?;
            builder.frame_size = parse_number(column(2, "frame size")?, "frame size")?;
            builder.intended_size = parse_number(column(3, "intended table size")?, "intended table size")?;
            builder.validation_stamp = parse_number(column(4, "validation stamp")?, "validation stamp")?;
            builder.subsec_res_ns = parse_resolution(column(5, "frame time resolution")?)?;
            builder.ring_record = table.get(6).and_then(|s| s.trim().parse().ok());
            builder.removal_time = table.get(7).map(|s| s.trim().to_owned()).filter(|s| !s.is_empty());
        }

        let names = lines.next_record()?;
        let units = lines.next_record()?;
        let processing = lines.next_record()?;
        let types = lines.next_record()?;

        if names.len() != types.len() {
            return Err(Error::FieldCountMismatch {
                names: names.len(),
                types: types.len(),
            });
        }

        builder.fields = names
            .iter()
            .zip(types.iter())
            .enumerate()
            .map(|(i, (name, ty))| {
                Ok(Field {
                    name:       name.clone(),
                    units:      units.get(i).cloned().unwrap_or_default(),
                    processing: processing.get(i).cloned().unwrap_or_default(),
                    data_type:  ty.parse::<DataType>()?,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;

        builder.header_len = lines.consumed();

        let file = builder.build()?;

        tracing::debug!(
            file_type = %file.file_type,
            table = %file.table_name,
            frame_size = file.frame_size,
            record_size = file.record_size,
            header_len = file.header_len,
            "parsed data file header"
        );

        Ok(file)
    }

    #[inline]
    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    #[inline]
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    #[inline]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Nanoseconds between records; zero for event driven tables.
    #[inline]
    pub fn record_interval(&self) -> i64 {
        self.interval_ns
    }

    /// Bytes per frame slot. For TOB1 this is one whole record.
    #[inline]
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    #[inline]
    pub fn intended_table_size(&self) -> u32 {
        self.intended_size
    }

    #[inline]
    pub fn validation_stamp(&self) -> u16 {
        self.validation_stamp
    }

    /// Nanoseconds per unit of a frame header's subsecond count.
    #[inline]
    pub fn subsec_resolution(&self) -> i64 {
        self.subsec_res_ns
    }

    #[inline]
    pub fn ring_record(&self) -> Option<u32> {
        self.ring_record
    }

    #[inline]
    pub fn removal_time(&self) -> Option<&str> {
        self.removal_time.as_deref()
    }

    #[inline]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Fields stored in each record's payload, i.e. without the TOB1 time and
    /// record number fields.
    #[inline]
    pub fn record_fields(&self) -> &[Field] {
        &self.fields[self.tob1_layout.field_count()..]
    }

    /// Byte offset of the first frame.
    #[inline]
    pub fn header_len(&self) -> usize {
        self.header_len
    }

    /// Payload bytes per record.
    #[inline]
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    #[inline]
    pub fn tob1_layout(&self) -> &Tob1Layout {
        &self.tob1_layout
    }

    /// Length of the binary header opening each frame.
    #[inline]
    pub fn frame_header_len(&self) -> usize {
        match self.file_type {
            FileType::Tob1 => self.tob1_layout.len,
            FileType::Tob2 => TOB2_HEADER_LEN,
            FileType::Tob3 => TOB3_HEADER_LEN,
        }
    }

    /// Length of the footer closing each frame.
    #[inline]
    pub fn frame_footer_len(&self) -> usize {
        match self.file_type {
            FileType::Tob1 => 0,
            FileType::Tob2 | FileType::Tob3 => crate::Footer::SIZE,
        }
    }

    /// Records held by one completely filled frame.
    pub fn records_per_frame(&self) -> usize {
        let overhead = self.frame_header_len() + self.frame_footer_len();
        self.frame_size.saturating_sub(overhead) / self.record_size.max(1)
    }

    /// Decodes a record payload into one value per [`record_fields`](Self::record_fields).
    pub fn decode_record(&self, data: &[u8]) -> Result<Vec<Value>, field::Error> {
        let mut offset = 0;

        self.record_fields()
            .iter()
            .map(|field| {
                let value = field.data_type.decode(data.get(offset..).unwrap_or_default())?;
                offset += field.data_type.size();
                Ok(value)
            })
            .collect()
    }
}

/// Builds a [`DataFile`] from explicit parameters.
#[derive(Clone, Debug)]
pub struct DataFileBuilder {
    file_type:        FileType,
    environment:      Environment,
    table_name:       String,
    interval_ns:      i64,
    frame_size:       usize,
    intended_size:    u32,
    validation_stamp: u16,
    subsec_res_ns:    i64,
    ring_record:      Option<u32>,
    removal_time:     Option<String>,
    fields:           Vec<Field>,
    header_len:       usize,
}

impl DataFileBuilder {
    fn new(file_type: FileType) -> Self {
        Self {
            file_type,
            environment: Environment::default(),
            table_name: String::new(),
            interval_ns: 0,
            frame_size: 0,
            intended_size: 0,
            validation_stamp: 0,
            subsec_res_ns: 1,
            ring_record: None,
            removal_time: None,
            fields: vec![],
            header_len: 0,
        }
    }

    pub fn table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = name.into();
        self
    }

    pub fn record_interval(mut self, interval_ns: i64) -> Self {
        self.interval_ns = interval_ns;
        self
    }

    /// Ignored for TOB1, where a frame is exactly one record.
    pub fn frame_size(mut self, frame_size: usize) -> Self {
        self.frame_size = frame_size;
        self
    }

    pub fn validation_stamp(mut self, stamp: u16) -> Self {
        self.validation_stamp = stamp;
        self
    }

    pub fn subsec_resolution(mut self, res_ns: i64) -> Self {
        self.subsec_res_ns = res_ns;
        self
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn header_len(mut self, header_len: usize) -> Self {
        self.header_len = header_len;
        self
    }

    pub fn build(self) -> Result<DataFile, Error> {
        if self.fields.is_empty() {
            return Err(Error::NoFields);
        }

        let tob1_layout = match self.file_type {
            FileType::Tob1 => Tob1Layout::from_fields(&self.fields),
            _ => Tob1Layout::default(),
        };

        let record_size: usize = self.fields[tob1_layout.field_count()..]
            .iter()
            .map(|f| f.data_type.size())
            .sum();

        let (frame_size, subsec_res_ns) = match self.file_type {
            FileType::Tob1 => (tob1_layout.len + record_size, 1),
            _ => (self.frame_size, self.subsec_res_ns),
        };

        let overhead = match self.file_type {
            FileType::Tob1 => tob1_layout.len,
            FileType::Tob2 => TOB2_HEADER_LEN + crate::Footer::SIZE,
            FileType::Tob3 => TOB3_HEADER_LEN + crate::Footer::SIZE,
        };

        if frame_size < overhead + record_size || record_size == 0 {
            return Err(Error::FrameTooSmall {
                frame_size,
                record_size,
            });
        }

        Ok(DataFile {
            file_type: self.file_type,
            environment: self.environment,
            table_name: self.table_name,
            interval_ns: self.interval_ns,
            frame_size,
            intended_size: self.intended_size,
            validation_stamp: self.validation_stamp,
            subsec_res_ns,
            ring_record: self.ring_record,
            removal_time: self.removal_time,
            fields: self.fields,
            header_len: self.header_len,
            tob1_layout,
            record_size,
        })
    }
}

/// Splits the header into CRLF or LF terminated CSV lines.
struct HeaderLines<'a> {
    image:    &'a [u8],
    consumed: usize,
    line_no:  usize,
}

impl<'a> HeaderLines<'a> {
    fn new(image: &'a [u8]) -> Self {
        Self {
            image,
            consumed: 0,
            line_no: 0,
        }
    }

    fn consumed(&self) -> usize {
        self.consumed
    }

    fn next_record(&mut self) -> Result<Vec<String>, Error> {
        self.line_no += 1;

        let rest = &self.image[self.consumed..];
        let end = rest.iter().position(|&b| b == b'\n').ok_or(Error::MissingLine(self.line_no))?;
        self.consumed += end + 1;

        let line = &rest[..end];
        let line = line.strip_suffix(b"\r").unwrap_or(line);

        let mut reader = csv::ReaderBuilder::new().has_headers(false).flexible(true).from_reader(line);

        let record = match reader.records().next() {
            Some(record) => record?,
            None => return Ok(vec![]),
        };

        Ok(record.iter().map(str::to_owned).collect())
    }
}

fn parse_number<T: FromStr>(s: &str, what: &'static str) -> Result<T, Error> {
    s.parse::<T>().map_err(|_| Error::BadTableValue {
        what,
        value: s.to_owned(),
    })
}

/// Parses a table interval such as `"1 SEC"` or `"500 MSEC"` into nanoseconds.
pub fn parse_interval(s: &str) -> Result<i64, Error> {
    let bad = || Error::BadTableValue {
        what:  "interval",
        value: s.to_owned(),
    };

    let mut parts = s.split_whitespace();
    let count = parts.next().and_then(|c| c.parse::<i64>().ok()).ok_or_else(bad)?;

    let unit = match parts.next().map(|u| u.to_ascii_uppercase()).as_deref() {
        Some("NSEC") => 1,
        Some("USEC") => 1_000,
        Some("MSEC") => 1_000_000,
        Some("SEC") | None => NANOS_PER_SEC,
        Some("MIN") => 60 * NANOS_PER_SEC,
        Some("HR") => 3_600 * NANOS_PER_SEC,
        Some("DAY") => 86_400 * NANOS_PER_SEC,
        Some(_) => return Err(bad()),
    };

    count.checked_mul(unit).ok_or_else(bad)
}

/// Parses a frame time resolution such as `"Sec100Usec"` into nanoseconds
/// per subsecond tick.
pub fn parse_resolution(s: &str) -> Result<i64, Error> {
    let res = match s {
        "SecMsec" => 1_000_000,
        "Sec100Usec" => 100_000,
        "Sec10Usec" => 10_000,
        "SecUsec" => 1_000,
        "SecNsec" | "Sec1Nsec" => 1,
        other => {
            return Err(Error::BadTableValue {
                what:  "frame time resolution",
                value: other.to_owned(),
            })
        },
    };

    Ok(res)
}

#[cfg(test)]
mod test {
    use super::*;

    const TOB3_HEADER: &[u8] = b"\"TOB3\",\"1234\",\"CR1000\",\"1234\",\"CR1000.Std.32\",\"CPU:met.CR1\",\"47561\",\"2021-07-14 12:00:00\"\r\n\
\"Met\",\"1 SEC\",\"512\",\"100000\",\"51284\",\"Sec100Usec\",\"0\",\"0\",\"2145362931\"\r\n\
\"AirT\",\"RH\",\"Msg\"\r\n\
\"Deg C\",\"%\",\"\"\r\n\
\"Smp\",\"Smp\",\"Smp\"\r\n\
\"IEEE4\",\"FP2\",\"ASCII(6)\"\r\n";

    const TOB1_HEADER: &[u8] = b"\"TOB1\",\"1234\",\"CR1000\",\"1234\",\"CR1000.Std.32\",\"CPU:met.CR1\",\"47561\",\"Met\"\r\n\
\"SECONDS\",\"NANOSECONDS\",\"RECORD\",\"AirT\"\r\n\
\"SECONDS\",\"NANOSECONDS\",\"RN\",\"Deg C\"\r\n\
\"\",\"\",\"\",\"Smp\"\r\n\
\"ULONG\",\"ULONG\",\"ULONG\",\"IEEE4\"\r\n";

    #[test]
    fn parses_tob3_header() -> eyre::Result<()> {
        let mut image = TOB3_HEADER.to_vec();
        image.extend_from_slice(&[0xff; 32]);

        let file = DataFile::parse(&image)?;

        assert_eq!(file.file_type(), FileType::Tob3);
        assert_eq!(file.environment().model, "CR1000");
        assert_eq!(file.environment().program_name, "CPU:met.CR1");
        assert_eq!(file.table_name(), "Met");
        assert_eq!(file.record_interval(), NANOS_PER_SEC);
        assert_eq!(file.frame_size(), 512);
        assert_eq!(file.intended_table_size(), 100_000);
        assert_eq!(file.validation_stamp(), 51284);
        assert_eq!(file.subsec_resolution(), 100_000);
        assert_eq!(file.ring_record(), Some(0));
        assert_eq!(file.header_len(), TOB3_HEADER.len());
        assert_eq!(file.record_size(), 4 + 2 + 6);
        assert_eq!(file.frame_header_len(), 12);
        assert_eq!(file.records_per_frame(), (512 - 16) / 12);
        assert_eq!(file.fields()[1].units, "%");
        assert_eq!(file.fields()[2].data_type, DataType::Ascii(6));

        Ok(())
    }

    #[test]
    fn parses_tob1_header() -> eyre::Result<()> {
        let file = DataFile::parse(TOB1_HEADER)?;

        assert_eq!(file.file_type(), FileType::Tob1);
        assert_eq!(file.table_name(), "Met");
        assert_eq!(file.environment().created, "");
        assert_eq!(file.tob1_layout(), &Tob1Layout {
            seconds:     Some(0),
            nanoseconds: Some(4),
            record_no:   Some(8),
            len:         12,
        });
        assert_eq!(file.frame_header_len(), 12);
        assert_eq!(file.record_size(), 4);
        assert_eq!(file.frame_size(), 16);
        assert_eq!(file.record_fields().len(), 1);
        assert_eq!(file.record_fields()[0].name, "AirT");
        assert_eq!(file.subsec_resolution(), 1);

        Ok(())
    }

    #[test]
    fn rejects_truncated_header() {
        let truncated = &TOB3_HEADER[..TOB3_HEADER.len() - 10];
        assert!(matches!(DataFile::parse(truncated), Err(Error::MissingLine(6))));
    }

    #[test]
    fn rejects_unknown_type() {
        let header = b"\"TOA5\",\"x\"\r\n";
        assert!(matches!(DataFile::parse(header), Err(Error::UnknownFileType(t)) if t == "TOA5"));
    }

    #[test]
    fn intervals_and_resolutions() -> eyre::Result<()> {
        assert_eq!(parse_interval("1 SEC")?, NANOS_PER_SEC);
        assert_eq!(parse_interval("500 MSEC")?, 500_000_000);
        assert_eq!(parse_interval("15 MIN")?, 900 * NANOS_PER_SEC);
        assert_eq!(parse_interval("1 HR")?, 3_600 * NANOS_PER_SEC);
        assert_eq!(parse_interval("0 SEC")?, 0);
        assert!(parse_interval("fast").is_err());
        assert!(parse_interval("1 FORTNIGHT").is_err());
        assert!(matches!(
            parse_interval("200000 DAY"),
            Err(Error::BadTableValue { what: "interval", .. })
        ));

        assert_eq!(parse_resolution("SecMsec")?, 1_000_000);
        assert_eq!(parse_resolution("SecUsec")?, 1_000);
        assert!(parse_resolution("Sec2Usec").is_err());

        Ok(())
    }

    #[test]
    fn builder_checks_frame_fits_a_record() {
        let result = DataFile::builder(FileType::Tob2)
            .frame_size(14)
            .field(Field::new("x", DataType::Ieee4))
            .build();

        assert!(matches!(result, Err(Error::FrameTooSmall {
            frame_size: 14,
            record_size: 4,
        })));

        assert!(matches!(DataFile::builder(FileType::Tob2).frame_size(64).build(), Err(Error::NoFields)));
    }

    #[test]
    fn decodes_record_values() -> eyre::Result<()> {
        let file = DataFile::parse(TOB3_HEADER)?;

        let mut data = 21.5f32.to_le_bytes().to_vec();
        data.extend_from_slice(&(0x2000u16 | 455).to_be_bytes());
        data.extend_from_slice(b"ok\0\0\0\0");

        assert_eq!(file.decode_record(&data)?, vec![
            Value::Float(21.5),
            Value::Float(45.5),
            Value::Text("ok".into()),
        ]);

        Ok(())
    }
}
