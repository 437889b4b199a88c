use std::fmt::{
    Display,
    Formatter,
};

use chrono::{
    DateTime,
    TimeZone,
    Utc,
};

pub const NANOS_PER_SEC: i64 = 1_000_000_000;

/// 1990-01-01T00:00:00Z as nanoseconds since the unix epoch.
pub const LGR_EPOCH_UNIX_NANOS: i64 = 631_152_000 * NANOS_PER_SEC;

lazy_static::lazy_static! {
    pub static ref EPOCH: DateTime<Utc> = Utc.timestamp_nanos(LGR_EPOCH_UNIX_NANOS);
}

/// Datalogger time: nanoseconds since 1990-01-01T00:00:00Z.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    derive_more::From,
    derive_more::Into,
)]
pub struct LgrDate(i64);

impl LgrDate {
    #[inline]
    pub const fn new(nanos: i64) -> Self {
        Self(nanos)
    }

    #[inline]
    pub const fn from_parts(seconds: i64, nanos: i64) -> Self {
        Self(seconds * NANOS_PER_SEC + nanos)
    }

    #[inline]
    pub const fn nanos(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn seconds(&self) -> i64 {
        self.0.div_euclid(NANOS_PER_SEC)
    }

    #[inline]
    pub const fn subsec_nanos(&self) -> i64 {
        self.0.rem_euclid(NANOS_PER_SEC)
    }

    #[inline]
    #[must_use]
    pub const fn add_nanos(self, nanos: i64) -> Self {
        Self(self.0.saturating_add(nanos))
    }
}

impl From<LgrDate> for DateTime<Utc> {
    fn from(val: LgrDate) -> Self {
        Utc.timestamp_nanos(val.0.saturating_add(LGR_EPOCH_UNIX_NANOS))
    }
}

impl From<DateTime<Utc>> for LgrDate {
    fn from(dt: DateTime<Utc>) -> Self {
        let unix = dt.timestamp() * NANOS_PER_SEC + dt.timestamp_subsec_nanos() as i64;
        Self(unix - LGR_EPOCH_UNIX_NANOS)
    }
}

impl Display for LgrDate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let dt: DateTime<Utc> = (*self).into();
        write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.9f"))
    }
}

impl serde::Serialize for LgrDate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}
