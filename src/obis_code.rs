//! OBIS codes: six-octet addresses of COSEM object instances.

use core::fmt;
use core::str::FromStr;

use crate::error::{Error, Result};

/// A six-byte OBIS code `A.B.C.D.E.F`.
///
/// Equality is byte-wise; the canonical string form separates the six
/// octets with dots.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObisCode {
    pub a: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub f: u8,
}

impl ObisCode {
    pub const fn new(a: u8, b: u8, c: u8, d: u8, e: u8, f: u8) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub const fn from_bytes(bytes: [u8; 6]) -> Self {
        Self::new(bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5])
    }

    /// Raw 6-byte wire form, no tag or length.
    pub const fn encode(&self) -> [u8; 6] {
        [self.a, self.b, self.c, self.d, self.e, self.f]
    }

    /// Consume exactly six bytes.
    pub fn decode(input: &[u8]) -> Result<(Self, &[u8])> {
        let (bytes, rest) = crate::axdr::split(input, 6)?;
        Ok((Self::new(bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5]), rest))
    }
}

impl FromStr for ObisCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut octets = [0u8; 6];
        let mut parts = s.split('.');
        for slot in octets.iter_mut() {
            let part = parts.next().ok_or(Error::InvalidObis)?;
            *slot = part.parse().map_err(|_| Error::InvalidObis)?;
        }
        if parts.next().is_some() {
            return Err(Error::InvalidObis);
        }
        Ok(Self::from_bytes(octets))
    }
}

impl fmt::Display for ObisCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}.{}.{}", self.a, self.b, self.c, self.d, self.e, self.f)
    }
}

impl fmt::Debug for ObisCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObisCode({})", self)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for ObisCode {
    fn serialize<S>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
