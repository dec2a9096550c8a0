//! RLRQ / RLRE: orderly association release.
//!
//! Both APDUs are a BER TLV holding an optional context-0 reason byte.

use nom::number::complete::u8 as nom_u8;
use nom::IResult;

use super::ber::parse_content;
use super::{RLRE_TAG, RLRQ_TAG};
use crate::error::{Error, Result};

/// Release reason carried in RLRQ/RLRE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseReason {
    Normal,
    Urgent,
    UserDefined,
    /// A value outside the standard set, kept verbatim.
    Other(u8),
}

impl ReleaseReason {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Normal,
            1 => Self::Urgent,
            30 => Self::UserDefined,
            other => Self::Other(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::Urgent => 1,
            Self::UserDefined => 30,
            Self::Other(value) => value,
        }
    }
}

/// A-Release request (tag 0x62).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseRequest {
    pub reason: Option<ReleaseReason>,
}

impl ReleaseRequest {
    pub fn normal() -> Self {
        Self { reason: Some(ReleaseReason::Normal) }
    }

    pub fn encode(&self) -> Vec<u8> {
        encode_release(RLRQ_TAG, self.reason)
    }
}

/// A-Release response (tag 0x63).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseResponse {
    pub reason: Option<ReleaseReason>,
}

impl ReleaseResponse {
    pub fn encode(&self) -> Vec<u8> {
        encode_release(RLRE_TAG, self.reason)
    }

    /// Decode one RLRE APDU. The reason field is optional.
    pub fn decode(input: &[u8]) -> Result<Self> {
        match Self::parse(input) {
            Ok((_, response)) => Ok(response),
            Err(nom::Err::Incomplete(_)) => Err(Error::Truncated),
            Err(_) => Err(Error::InvalidResponse("malformed RLRE")),
        }
    }

    fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, tag) = nom_u8(input)?;
        if tag != RLRE_TAG {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Tag,
            )));
        }
        let (rest, mut content) = parse_content(input)?;

        let mut reason = None;
        while !content.is_empty() {
            let (after_tag, field_tag) = nom_u8(content)?;
            let (next, field) = parse_content(after_tag)?;
            content = next;
            // Context 0: release-response-reason
            if field_tag == 0x80 && !field.is_empty() {
                reason = Some(ReleaseReason::from_u8(field[0]));
            }
        }

        Ok((rest, Self { reason }))
    }
}

fn encode_release(tag: u8, reason: Option<ReleaseReason>) -> Vec<u8> {
    let mut out = vec![tag];
    match reason {
        Some(reason) => {
            out.extend_from_slice(&[0x03, 0x80, 0x01, reason.as_u8()]);
        }
        None => out.push(0x00),
    }
    out
}
