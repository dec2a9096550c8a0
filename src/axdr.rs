//! A-XDR codec: the tagged, length-prefixed value tree carried in DLMS APDUs.
//!
//! Every payload value in a GET/SET/ACTION exchange is one [`Data`] tree.
//! Tags and widths are fixed by IEC 61334-6; ARRAY and STRUCTURE share the
//! same wire form and only differ semantically.

use core::fmt;

use crate::error::{Error, Result};

/// Upper bound on ARRAY/STRUCTURE nesting accepted by the decoder.
const MAX_DEPTH: usize = 16;

// Wire tags, fixed by the standard.
const TAG_NULL: u8 = 0;
const TAG_ARRAY: u8 = 1;
const TAG_STRUCTURE: u8 = 2;
const TAG_BOOLEAN: u8 = 3;
const TAG_BIT_STRING: u8 = 4;
const TAG_DOUBLE_LONG: u8 = 5;
const TAG_DOUBLE_LONG_UNSIGNED: u8 = 6;
const TAG_OCTET_STRING: u8 = 9;
const TAG_VISIBLE_STRING: u8 = 10;
const TAG_UTF8_STRING: u8 = 12;
const TAG_BCD: u8 = 13;
const TAG_INTEGER: u8 = 15;
const TAG_LONG: u8 = 16;
const TAG_UNSIGNED: u8 = 17;
const TAG_LONG_UNSIGNED: u8 = 18;
const TAG_LONG64: u8 = 20;
const TAG_LONG64_UNSIGNED: u8 = 21;
const TAG_ENUM: u8 = 22;
const TAG_FLOAT32: u8 = 23;
const TAG_FLOAT64: u8 = 24;
const TAG_DATE_TIME: u8 = 25;
const TAG_DATE: u8 = 26;
const TAG_TIME: u8 = 27;
const TAG_DONT_CARE: u8 = 255;

/// One A-XDR value.
///
/// The variant carries the tag; [`Data::encode`] and [`Data::decode`] are
/// exact inverses for every well-formed value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum Data {
    /// Tag 0.
    Null,
    /// Tag 1: homogeneous, length-prefixed sequence.
    Array(Vec<Data>),
    /// Tag 2: heterogeneous, length-prefixed sequence.
    Structure(Vec<Data>),
    /// Tag 3: one byte, `0x00` or `0xFF`.
    Boolean(bool),
    /// Tag 4: bit-length-prefixed packed bits.
    BitString(BitString),
    /// Tag 5: i32 big-endian.
    DoubleLong(i32),
    /// Tag 6: u32 big-endian.
    DoubleLongUnsigned(u32),
    /// Tag 9: length-prefixed bytes.
    OctetString(Vec<u8>),
    /// Tag 10: length-prefixed bytes.
    VisibleString(Vec<u8>),
    /// Tag 12: length-prefixed UTF-8 text.
    Utf8String(String),
    /// Tag 13.
    Bcd(i8),
    /// Tag 15.
    Integer(i8),
    /// Tag 16: i16 big-endian.
    Long(i16),
    /// Tag 17.
    Unsigned(u8),
    /// Tag 18: u16 big-endian.
    LongUnsigned(u16),
    /// Tag 20: i64 big-endian.
    Long64(i64),
    /// Tag 21: u64 big-endian.
    Long64Unsigned(u64),
    /// Tag 22.
    Enum(u8),
    /// Tag 23: IEEE-754 big-endian.
    Float32(f32),
    /// Tag 24: IEEE-754 big-endian.
    Float64(f64),
    /// Tag 25: 12-byte DLMS date-time.
    DateTime(DateTime),
    /// Tag 26: 5-byte DLMS date.
    Date(Date),
    /// Tag 27: 4-byte DLMS time.
    Time(Time),
    /// Tag 255.
    DontCare,
}

/// Packed bit string with an explicit bit count.
///
/// The wire length prefix counts bits; the payload is `(bits + 7) / 8` bytes
/// with zero padding, MSB-first within each byte.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BitString {
    pub bit_length: usize,
    pub bytes: Vec<u8>,
}

impl BitString {
    pub fn new(bit_length: usize, bytes: Vec<u8>) -> Self {
        Self { bit_length, bytes }
    }

    fn byte_length(&self) -> usize {
        (self.bit_length + 7) / 8
    }
}

impl Data {
    /// The wire tag of this value.
    pub fn tag(&self) -> u8 {
        match self {
            Data::Null => TAG_NULL,
            Data::Array(_) => TAG_ARRAY,
            Data::Structure(_) => TAG_STRUCTURE,
            Data::Boolean(_) => TAG_BOOLEAN,
            Data::BitString(_) => TAG_BIT_STRING,
            Data::DoubleLong(_) => TAG_DOUBLE_LONG,
            Data::DoubleLongUnsigned(_) => TAG_DOUBLE_LONG_UNSIGNED,
            Data::OctetString(_) => TAG_OCTET_STRING,
            Data::VisibleString(_) => TAG_VISIBLE_STRING,
            Data::Utf8String(_) => TAG_UTF8_STRING,
            Data::Bcd(_) => TAG_BCD,
            Data::Integer(_) => TAG_INTEGER,
            Data::Long(_) => TAG_LONG,
            Data::Unsigned(_) => TAG_UNSIGNED,
            Data::LongUnsigned(_) => TAG_LONG_UNSIGNED,
            Data::Long64(_) => TAG_LONG64,
            Data::Long64Unsigned(_) => TAG_LONG64_UNSIGNED,
            Data::Enum(_) => TAG_ENUM,
            Data::Float32(_) => TAG_FLOAT32,
            Data::Float64(_) => TAG_FLOAT64,
            Data::DateTime(_) => TAG_DATE_TIME,
            Data::Date(_) => TAG_DATE,
            Data::Time(_) => TAG_TIME,
            Data::DontCare => TAG_DONT_CARE,
        }
    }

    /// Encode one value, tag included.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.encode_into(&mut out, 0)?;
        Ok(out)
    }

    fn encode_into(&self, out: &mut Vec<u8>, depth: usize) -> Result<()> {
        if depth >= MAX_DEPTH {
            return Err(Error::NestingTooDeep);
        }
        out.push(self.tag());
        match self {
            Data::Null | Data::DontCare => {}
            Data::Array(items) | Data::Structure(items) => {
                encode_length(items.len(), out)?;
                for item in items {
                    item.encode_into(out, depth + 1)?;
                }
            }
            Data::Boolean(value) => out.push(if *value { 0xFF } else { 0x00 }),
            Data::BitString(bits) => {
                if bits.bytes.len() != bits.byte_length() {
                    return Err(Error::TagMismatch);
                }
                encode_length(bits.bit_length, out)?;
                out.extend_from_slice(&bits.bytes);
            }
            Data::DoubleLong(value) => out.extend_from_slice(&value.to_be_bytes()),
            Data::DoubleLongUnsigned(value) => out.extend_from_slice(&value.to_be_bytes()),
            Data::OctetString(bytes) | Data::VisibleString(bytes) => {
                encode_length(bytes.len(), out)?;
                out.extend_from_slice(bytes);
            }
            Data::Utf8String(text) => {
                encode_length(text.len(), out)?;
                out.extend_from_slice(text.as_bytes());
            }
            Data::Bcd(value) | Data::Integer(value) => out.push(*value as u8),
            Data::Long(value) => out.extend_from_slice(&value.to_be_bytes()),
            Data::Unsigned(value) | Data::Enum(value) => out.push(*value),
            Data::LongUnsigned(value) => out.extend_from_slice(&value.to_be_bytes()),
            Data::Long64(value) => out.extend_from_slice(&value.to_be_bytes()),
            Data::Long64Unsigned(value) => out.extend_from_slice(&value.to_be_bytes()),
            Data::Float32(value) => out.extend_from_slice(&value.to_be_bytes()),
            Data::Float64(value) => out.extend_from_slice(&value.to_be_bytes()),
            Data::DateTime(value) => out.extend_from_slice(&value.encode()),
            Data::Date(value) => out.extend_from_slice(&value.encode()),
            Data::Time(value) => out.extend_from_slice(&value.encode()),
        }
        Ok(())
    }

    /// Decode exactly one tagged value, returning it and the byte count consumed.
    ///
    /// Trailing input is left untouched; on error nothing is consumed.
    pub fn decode(input: &[u8]) -> Result<(Self, usize)> {
        let (value, rest) = Self::take(input, 0)?;
        Ok((value, input.len() - rest.len()))
    }

    fn take(input: &[u8], depth: usize) -> Result<(Self, &[u8])> {
        if depth >= MAX_DEPTH {
            return Err(Error::NestingTooDeep);
        }
        let (&tag, rest) = input.split_first().ok_or(Error::Truncated)?;
        match tag {
            TAG_NULL => Ok((Data::Null, rest)),
            TAG_ARRAY | TAG_STRUCTURE => {
                let (count, mut rest) = decode_length(rest)?;
                // Each element is at least one byte.
                if count > rest.len() {
                    return Err(Error::LengthOverflow);
                }
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    let (item, next) = Self::take(rest, depth + 1)?;
                    items.push(item);
                    rest = next;
                }
                let value = if tag == TAG_ARRAY { Data::Array(items) } else { Data::Structure(items) };
                Ok((value, rest))
            }
            TAG_BOOLEAN => {
                let (bytes, rest) = split(rest, 1)?;
                match bytes[0] {
                    0x00 => Ok((Data::Boolean(false), rest)),
                    0xFF => Ok((Data::Boolean(true), rest)),
                    other => Err(Error::InvalidBoolean(other)),
                }
            }
            TAG_BIT_STRING => {
                let (bit_length, rest) = decode_length(rest)?;
                let (bytes, rest) = split(rest, (bit_length + 7) / 8)?;
                Ok((Data::BitString(BitString::new(bit_length, bytes.to_vec())), rest))
            }
            TAG_DOUBLE_LONG => {
                let (bytes, rest) = split(rest, 4)?;
                Ok((Data::DoubleLong(i32::from_be_bytes(bytes.try_into().unwrap())), rest))
            }
            TAG_DOUBLE_LONG_UNSIGNED => {
                let (bytes, rest) = split(rest, 4)?;
                Ok((Data::DoubleLongUnsigned(u32::from_be_bytes(bytes.try_into().unwrap())), rest))
            }
            TAG_OCTET_STRING => {
                let (length, rest) = decode_length(rest)?;
                let (bytes, rest) = split(rest, length)?;
                Ok((Data::OctetString(bytes.to_vec()), rest))
            }
            TAG_VISIBLE_STRING => {
                let (length, rest) = decode_length(rest)?;
                let (bytes, rest) = split(rest, length)?;
                Ok((Data::VisibleString(bytes.to_vec()), rest))
            }
            TAG_UTF8_STRING => {
                let (length, rest) = decode_length(rest)?;
                let (bytes, rest) = split(rest, length)?;
                let text = String::from_utf8(bytes.to_vec()).map_err(|_| Error::InvalidUtf8)?;
                Ok((Data::Utf8String(text), rest))
            }
            TAG_BCD => {
                let (bytes, rest) = split(rest, 1)?;
                Ok((Data::Bcd(bytes[0] as i8), rest))
            }
            TAG_INTEGER => {
                let (bytes, rest) = split(rest, 1)?;
                Ok((Data::Integer(bytes[0] as i8), rest))
            }
            TAG_LONG => {
                let (bytes, rest) = split(rest, 2)?;
                Ok((Data::Long(i16::from_be_bytes(bytes.try_into().unwrap())), rest))
            }
            TAG_UNSIGNED => {
                let (bytes, rest) = split(rest, 1)?;
                Ok((Data::Unsigned(bytes[0]), rest))
            }
            TAG_LONG_UNSIGNED => {
                let (bytes, rest) = split(rest, 2)?;
                Ok((Data::LongUnsigned(u16::from_be_bytes(bytes.try_into().unwrap())), rest))
            }
            TAG_LONG64 => {
                let (bytes, rest) = split(rest, 8)?;
                Ok((Data::Long64(i64::from_be_bytes(bytes.try_into().unwrap())), rest))
            }
            TAG_LONG64_UNSIGNED => {
                let (bytes, rest) = split(rest, 8)?;
                Ok((Data::Long64Unsigned(u64::from_be_bytes(bytes.try_into().unwrap())), rest))
            }
            TAG_ENUM => {
                let (bytes, rest) = split(rest, 1)?;
                Ok((Data::Enum(bytes[0]), rest))
            }
            TAG_FLOAT32 => {
                let (bytes, rest) = split(rest, 4)?;
                Ok((Data::Float32(f32::from_be_bytes(bytes.try_into().unwrap())), rest))
            }
            TAG_FLOAT64 => {
                let (bytes, rest) = split(rest, 8)?;
                Ok((Data::Float64(f64::from_be_bytes(bytes.try_into().unwrap())), rest))
            }
            TAG_DATE_TIME => {
                let (value, rest) = DateTime::take(rest)?;
                Ok((Data::DateTime(value), rest))
            }
            TAG_DATE => {
                let (value, rest) = Date::take(rest)?;
                Ok((Data::Date(value), rest))
            }
            TAG_TIME => {
                let (value, rest) = Time::take(rest)?;
                Ok((Data::Time(value), rest))
            }
            TAG_DONT_CARE => Ok((Data::DontCare, rest)),
            other => Err(Error::UnknownTag(other)),
        }
    }
}

/// Split off exactly `n` bytes or fail with [`Error::Truncated`].
pub(crate) fn split(input: &[u8], n: usize) -> Result<(&[u8], &[u8])> {
    if input.len() < n {
        return Err(Error::Truncated);
    }
    Ok(input.split_at(n))
}

/// Encode an A-XDR length prefix in its shortest form.
///
/// Lengths below 0x80 take one byte; larger values take `0x80 | n` followed
/// by `n` big-endian bytes, with `n` between 1 and 4.
pub fn encode_length(length: usize, out: &mut Vec<u8>) -> Result<()> {
    if length < 0x80 {
        out.push(length as u8);
    } else if length <= 0xFF {
        out.extend_from_slice(&[0x81, length as u8]);
    } else if length <= 0xFFFF {
        out.push(0x82);
        out.extend_from_slice(&(length as u16).to_be_bytes());
    } else if length <= 0xFF_FFFF {
        out.push(0x83);
        out.extend_from_slice(&(length as u32).to_be_bytes()[1..]);
    } else if length <= 0xFFFF_FFFF {
        out.push(0x84);
        out.extend_from_slice(&(length as u32).to_be_bytes());
    } else {
        return Err(Error::LengthOverflow);
    }
    Ok(())
}

/// Decode an A-XDR length prefix. Accepts any valid width up to four octets.
pub fn decode_length(input: &[u8]) -> Result<(usize, &[u8])> {
    let (&first, rest) = input.split_first().ok_or(Error::Truncated)?;
    if first < 0x80 {
        return Ok((first as usize, rest));
    }
    let n = (first & 0x7F) as usize;
    if n == 0 || n > 4 {
        return Err(Error::LengthOverflow);
    }
    if rest.len() < n {
        return Err(Error::Truncated);
    }
    let mut length = 0usize;
    for &byte in &rest[..n] {
        length = (length << 8) | byte as usize;
    }
    Ok((length, &rest[n..]))
}

// ============================================================================
// DLMS date and time
// ============================================================================

/// Wildcard sentinel for one-byte date/time sub-fields.
pub const NOT_SPECIFIED: u8 = 0xFF;

/// Wildcard sentinel for the year field.
pub const YEAR_NOT_SPECIFIED: u16 = 0xFFFF;

/// Wildcard sentinel for the UTC deviation (minutes).
pub const DEVIATION_NOT_SPECIFIED: i16 = 0x8000u16 as i16;

/// 5-byte DLMS date. `0xFF` (`0xFFFF` for the year) means "not specified".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Date {
    pub year: u16,
    pub month: u8,
    pub day_of_month: u8,
    /// ISO weekday, Monday = 1 through Sunday = 7.
    pub day_of_week: u8,
}

impl Date {
    pub fn new(year: u16, month: u8, day_of_month: u8, day_of_week: u8) -> Self {
        Self { year, month, day_of_month, day_of_week }
    }

    pub fn encode(&self) -> [u8; 5] {
        let year = self.year.to_be_bytes();
        [year[0], year[1], self.month, self.day_of_month, self.day_of_week]
    }

    fn take(input: &[u8]) -> Result<(Self, &[u8])> {
        let (bytes, rest) = split(input, 5)?;
        let date = Self {
            year: u16::from_be_bytes([bytes[0], bytes[1]]),
            month: bytes[2],
            day_of_month: bytes[3],
            day_of_week: bytes[4],
        };
        date.validate()?;
        Ok((date, rest))
    }

    fn validate(&self) -> Result<()> {
        // 0xFD/0xFE are the standard's daylight-saving markers.
        let month_ok = matches!(self.month, 1..=12 | 0xFD | 0xFE | NOT_SPECIFIED);
        let day_ok = matches!(self.day_of_month, 1..=31 | 0xFD | 0xFE | NOT_SPECIFIED);
        let dow_ok = matches!(self.day_of_week, 1..=7 | NOT_SPECIFIED);
        if month_ok && day_ok && dow_ok {
            Ok(())
        } else {
            Err(Error::InvalidDateTime)
        }
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day_of_month)
    }
}

/// 4-byte DLMS time. `0xFF` means "not specified".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Time {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub hundredths: u8,
}

impl Time {
    pub fn new(hour: u8, minute: u8, second: u8, hundredths: u8) -> Self {
        Self { hour, minute, second, hundredths }
    }

    pub fn encode(&self) -> [u8; 4] {
        [self.hour, self.minute, self.second, self.hundredths]
    }

    fn take(input: &[u8]) -> Result<(Self, &[u8])> {
        let (bytes, rest) = split(input, 4)?;
        let time =
            Self { hour: bytes[0], minute: bytes[1], second: bytes[2], hundredths: bytes[3] };
        time.validate()?;
        Ok((time, rest))
    }

    fn validate(&self) -> Result<()> {
        let ok = matches!(self.hour, 0..=23 | NOT_SPECIFIED)
            && matches!(self.minute, 0..=59 | NOT_SPECIFIED)
            && matches!(self.second, 0..=59 | NOT_SPECIFIED)
            && matches!(self.hundredths, 0..=99 | NOT_SPECIFIED);
        if ok { Ok(()) } else { Err(Error::InvalidDateTime) }
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

/// 12-byte DLMS date-time: date, time, signed UTC deviation in minutes
/// (`0x8000` = not specified) and the clock status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTime {
    pub date: Date,
    pub time: Time,
    pub deviation: i16,
    pub clock_status: u8,
}

impl DateTime {
    pub fn new(date: Date, time: Time, deviation: i16, clock_status: u8) -> Self {
        Self { date, time, deviation, clock_status }
    }

    /// Build a fully specified date-time from calendar parts.
    ///
    /// The day of week is derived from the date (Monday = 1), hundredths and
    /// the clock status are zero.
    pub fn from_calendar(
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
        deviation: i16,
    ) -> Self {
        Self {
            date: Date::new(year, month, day, day_of_week(year, month, day)),
            time: Time::new(hour, minute, second, 0),
            deviation,
            clock_status: 0,
        }
    }

    pub fn encode(&self) -> [u8; 12] {
        let mut out = [0u8; 12];
        out[..5].copy_from_slice(&self.date.encode());
        out[5..9].copy_from_slice(&self.time.encode());
        out[9..11].copy_from_slice(&self.deviation.to_be_bytes());
        out[11] = self.clock_status;
        out
    }

    /// Consume exactly twelve bytes, validating date and time sub-fields.
    pub fn decode(input: &[u8]) -> Result<(Self, &[u8])> {
        Self::take(input)
    }

    fn take(input: &[u8]) -> Result<(Self, &[u8])> {
        let (date, rest) = Date::take(input)?;
        let (time, rest) = Time::take(rest)?;
        let (bytes, rest) = split(rest, 3)?;
        let deviation = i16::from_be_bytes([bytes[0], bytes[1]]);
        Ok((Self { date, time, deviation, clock_status: bytes[2] }, rest))
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}T{}", self.date, self.time)?;
        if self.deviation != DEVIATION_NOT_SPECIFIED {
            let sign = if self.deviation >= 0 { '+' } else { '-' };
            let minutes = self.deviation.unsigned_abs();
            write!(f, "{}{:02}:{:02}", sign, minutes / 60, minutes % 60)?;
        }
        Ok(())
    }
}

/// ISO weekday (Monday = 1) of a Gregorian date, via Zeller's congruence.
fn day_of_week(year: u16, month: u8, day: u8) -> u8 {
    let (y, m) = if month < 3 { (year as i32 - 1, month as i32 + 12) } else { (year as i32, month as i32) };
    let k = y % 100;
    let j = y / 100;
    let h = (day as i32 + (13 * (m + 1)) / 5 + k + k / 4 + j / 4 + 5 * j) % 7;
    // h: 0 = Saturday .. 6 = Friday
    (((h + 5) % 7) + 1) as u8
}

#[cfg(feature = "serde")]
mod serde_impls {
    use super::{Date, DateTime, Time};
    use serde::{Serialize, Serializer};

    impl Serialize for Date {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(&self.to_string())
        }
    }

    impl Serialize for Time {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(&self.to_string())
        }
    }

    impl Serialize for DateTime {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(&self.to_string())
        }
    }
}
