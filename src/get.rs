//! GET service PDUs and attribute addressing.
//!
//! Tags: GET-Request `0xC0`, GET-Response `0xC4`. Each side has three
//! choices: normal (1), next/with-datablock (2) and with-list (3).

use core::fmt;

use crate::axdr::{self, Data};
use crate::error::{Error, Result};
use crate::obis_code::ObisCode;
use crate::selective_access::SelectiveAccess;

pub const GET_REQUEST_TAG: u8 = 0xC0;
pub const GET_RESPONSE_TAG: u8 = 0xC4;

/// Address of one COSEM attribute: class, instance, attribute index.
///
/// Wire form is exactly nine bytes: 2-byte big-endian class, 6-byte OBIS,
/// 1-byte attribute index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AttributeDescriptor {
    pub class_id: u16,
    pub instance_id: ObisCode,
    pub attribute_id: i8,
}

impl AttributeDescriptor {
    pub const fn new(class_id: u16, instance_id: ObisCode, attribute_id: i8) -> Self {
        Self { class_id, instance_id, attribute_id }
    }

    pub fn encode(&self) -> [u8; 9] {
        let mut out = [0u8; 9];
        out[..2].copy_from_slice(&self.class_id.to_be_bytes());
        out[2..8].copy_from_slice(&self.instance_id.encode());
        out[8] = self.attribute_id as u8;
        out
    }

    /// Consume exactly nine bytes; a shorter buffer fails with `Truncated`
    /// and consumes nothing.
    pub fn decode(input: &[u8]) -> Result<(Self, &[u8])> {
        let (bytes, rest) = axdr::split(input, 9)?;
        let class_id = u16::from_be_bytes([bytes[0], bytes[1]]);
        let (instance_id, _) = ObisCode::decode(&bytes[2..8])?;
        Ok((Self::new(class_id, instance_id, bytes[8] as i8), rest))
    }
}

impl fmt::Display for AttributeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.class_id, self.instance_id, self.attribute_id)
    }
}

/// Single-byte result code carried in GET/SET replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum DataAccessResult {
    Success = 0,
    HardwareFault = 1,
    TemporaryFailure = 2,
    ReadWriteDenied = 3,
    ObjectUndefined = 4,
    ObjectClassInconsistent = 9,
    ObjectUnavailable = 11,
    TypeUnmatched = 12,
    ScopeOfAccessViolated = 13,
    DataBlockUnavailable = 14,
    LongGetAborted = 15,
    NoLongGetInProgress = 16,
    LongSetAborted = 17,
    NoLongSetInProgress = 18,
    DataBlockNumberInvalid = 19,
    OtherReason = 250,
}

impl DataAccessResult {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Success),
            1 => Some(Self::HardwareFault),
            2 => Some(Self::TemporaryFailure),
            3 => Some(Self::ReadWriteDenied),
            4 => Some(Self::ObjectUndefined),
            9 => Some(Self::ObjectClassInconsistent),
            11 => Some(Self::ObjectUnavailable),
            12 => Some(Self::TypeUnmatched),
            13 => Some(Self::ScopeOfAccessViolated),
            14 => Some(Self::DataBlockUnavailable),
            15 => Some(Self::LongGetAborted),
            16 => Some(Self::NoLongGetInProgress),
            17 => Some(Self::LongSetAborted),
            18 => Some(Self::NoLongSetInProgress),
            19 => Some(Self::DataBlockNumberInvalid),
            250 => Some(Self::OtherReason),
            _ => None,
        }
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for DataAccessResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::HardwareFault => "hardware-fault",
            Self::TemporaryFailure => "temporary-failure",
            Self::ReadWriteDenied => "read-write-denied",
            Self::ObjectUndefined => "object-undefined",
            Self::ObjectClassInconsistent => "object-class-inconsistent",
            Self::ObjectUnavailable => "object-unavailable",
            Self::TypeUnmatched => "type-unmatched",
            Self::ScopeOfAccessViolated => "scope-of-access-violated",
            Self::DataBlockUnavailable => "data-block-unavailable",
            Self::LongGetAborted => "long-get-aborted",
            Self::NoLongGetInProgress => "no-long-get-in-progress",
            Self::LongSetAborted => "long-set-aborted",
            Self::NoLongSetInProgress => "no-long-set-in-progress",
            Self::DataBlockNumberInvalid => "data-block-number-invalid",
            Self::OtherReason => "other-reason",
        };
        f.write_str(name)
    }
}

fn decode_access_result(input: &[u8]) -> Result<(DataAccessResult, &[u8])> {
    let (&code, rest) = input.split_first().ok_or(Error::Truncated)?;
    let result =
        DataAccessResult::from_u8(code).ok_or(Error::InvalidResponse("unknown data-access-result"))?;
    Ok((result, rest))
}

// ============================================================================
// Requests
// ============================================================================

/// GET service request, one variant per choice.
#[derive(Debug, Clone, PartialEq)]
pub enum GetRequest {
    Normal(GetRequestNormal),
    Next(GetRequestNext),
    WithList(GetRequestWithList),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetRequestNormal {
    pub invoke_id: u8,
    pub attribute: AttributeDescriptor,
    pub access: Option<SelectiveAccess>,
}

/// Acknowledges a received block and asks for the next one.
#[derive(Debug, Clone, PartialEq)]
pub struct GetRequestNext {
    pub invoke_id: u8,
    pub block_number: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetRequestWithList {
    pub invoke_id: u8,
    pub attributes: Vec<AttributeDescriptor>,
}

impl GetRequest {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = vec![GET_REQUEST_TAG];
        match self {
            GetRequest::Normal(req) => {
                out.push(0x01);
                out.push(req.invoke_id);
                out.extend_from_slice(&req.attribute.encode());
                encode_access(&req.access, &mut out)?;
            }
            GetRequest::Next(req) => {
                out.push(0x02);
                out.push(req.invoke_id);
                out.extend_from_slice(&req.block_number.to_be_bytes());
            }
            GetRequest::WithList(req) => {
                out.push(0x03);
                out.push(req.invoke_id);
                out.push(req.attributes.len() as u8);
                for attribute in &req.attributes {
                    out.extend_from_slice(&attribute.encode());
                }
            }
        }
        Ok(out)
    }

    pub fn decode(input: &[u8]) -> Result<(Self, &[u8])> {
        let (header, rest) = axdr::split(input, 2)?;
        if header[0] != GET_REQUEST_TAG {
            return Err(Error::InvalidResponse("expected GET-Request"));
        }
        match header[1] {
            0x01 => {
                let (&invoke_id, rest) = rest.split_first().ok_or(Error::Truncated)?;
                let (attribute, rest) = AttributeDescriptor::decode(rest)?;
                let (access, rest) = decode_access(rest)?;
                Ok((GetRequest::Normal(GetRequestNormal { invoke_id, attribute, access }), rest))
            }
            0x02 => {
                let (bytes, rest) = axdr::split(rest, 5)?;
                let block_number = u32::from_be_bytes(bytes[1..5].try_into().unwrap());
                Ok((GetRequest::Next(GetRequestNext { invoke_id: bytes[0], block_number }), rest))
            }
            0x03 => {
                let (bytes, mut rest) = axdr::split(rest, 2)?;
                let invoke_id = bytes[0];
                let mut attributes = Vec::with_capacity(bytes[1] as usize);
                for _ in 0..bytes[1] {
                    let (attribute, next) = AttributeDescriptor::decode(rest)?;
                    attributes.push(attribute);
                    rest = next;
                }
                Ok((GetRequest::WithList(GetRequestWithList { invoke_id, attributes }), rest))
            }
            _ => Err(Error::InvalidResponse("unknown GET-Request choice")),
        }
    }
}

pub(crate) fn encode_access(access: &Option<SelectiveAccess>, out: &mut Vec<u8>) -> Result<()> {
    match access {
        Some(descriptor) => {
            out.push(0x01);
            out.extend_from_slice(&descriptor.encode()?);
        }
        None => out.push(0x00),
    }
    Ok(())
}

pub(crate) fn decode_access(input: &[u8]) -> Result<(Option<SelectiveAccess>, &[u8])> {
    let (&present, rest) = input.split_first().ok_or(Error::Truncated)?;
    if present == 0 {
        return Ok((None, rest));
    }
    let (descriptor, consumed) = SelectiveAccess::decode(rest)?;
    Ok((Some(descriptor), &rest[consumed..]))
}

// ============================================================================
// Responses
// ============================================================================

/// GET service response, one variant per choice.
#[derive(Debug, Clone, PartialEq)]
pub enum GetResponse {
    Normal(GetResponseNormal),
    WithDataBlock(GetResponseWithDataBlock),
    WithList(GetResponseWithList),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetResponseNormal {
    pub invoke_id: u8,
    pub result: GetDataResult,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetResponseWithDataBlock {
    pub invoke_id: u8,
    pub last_block: bool,
    pub block_number: u32,
    pub result: DataBlockResult,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetResponseWithList {
    pub invoke_id: u8,
    pub results: Vec<GetDataResult>,
}

/// Choice 0: decoded data, choice 1: access error.
#[derive(Debug, Clone, PartialEq)]
pub enum GetDataResult {
    Data(Data),
    AccessError(DataAccessResult),
}

/// Block payload: choice 0 raw octets, choice 1 access error.
#[derive(Debug, Clone, PartialEq)]
pub enum DataBlockResult {
    Raw(Vec<u8>),
    AccessError(DataAccessResult),
}

impl GetDataResult {
    fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        match self {
            GetDataResult::Data(data) => {
                out.push(0x00);
                out.extend_from_slice(&data.encode()?);
            }
            GetDataResult::AccessError(code) => {
                out.push(0x01);
                out.push(code.as_u8());
            }
        }
        Ok(())
    }

    pub(crate) fn decode(input: &[u8]) -> Result<(Self, &[u8])> {
        let (&choice, rest) = input.split_first().ok_or(Error::Truncated)?;
        match choice {
            0x00 => {
                let (data, consumed) = Data::decode(rest)?;
                Ok((GetDataResult::Data(data), &rest[consumed..]))
            }
            0x01 => {
                let (code, rest) = decode_access_result(rest)?;
                Ok((GetDataResult::AccessError(code), rest))
            }
            _ => Err(Error::InvalidResponse("unknown get-data-result choice")),
        }
    }
}

impl GetResponse {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = vec![GET_RESPONSE_TAG];
        match self {
            GetResponse::Normal(resp) => {
                out.push(0x01);
                out.push(resp.invoke_id);
                resp.result.encode_into(&mut out)?;
            }
            GetResponse::WithDataBlock(resp) => {
                out.push(0x02);
                out.push(resp.invoke_id);
                out.push(if resp.last_block { 0x01 } else { 0x00 });
                out.extend_from_slice(&resp.block_number.to_be_bytes());
                match &resp.result {
                    DataBlockResult::Raw(raw) => {
                        out.push(0x00);
                        axdr::encode_length(raw.len(), &mut out)?;
                        out.extend_from_slice(raw);
                    }
                    DataBlockResult::AccessError(code) => {
                        out.push(0x01);
                        out.push(code.as_u8());
                    }
                }
            }
            GetResponse::WithList(resp) => {
                out.push(0x03);
                out.push(resp.invoke_id);
                out.push(resp.results.len() as u8);
                for result in &resp.results {
                    result.encode_into(&mut out)?;
                }
            }
        }
        Ok(out)
    }

    pub fn decode(input: &[u8]) -> Result<(Self, &[u8])> {
        let (header, rest) = axdr::split(input, 2)?;
        if header[0] != GET_RESPONSE_TAG {
            return Err(Error::InvalidResponse("expected GET-Response"));
        }
        match header[1] {
            0x01 => {
                let (&invoke_id, rest) = rest.split_first().ok_or(Error::Truncated)?;
                let (result, rest) = GetDataResult::decode(rest)?;
                Ok((GetResponse::Normal(GetResponseNormal { invoke_id, result }), rest))
            }
            0x02 => {
                let (bytes, rest) = axdr::split(rest, 6)?;
                let invoke_id = bytes[0];
                let last_block = bytes[1] != 0;
                let block_number = u32::from_be_bytes(bytes[2..6].try_into().unwrap());
                let (&choice, rest) = rest.split_first().ok_or(Error::Truncated)?;
                let (result, rest) = match choice {
                    0x00 => {
                        let (length, rest) = axdr::decode_length(rest)?;
                        let (raw, rest) = axdr::split(rest, length)?;
                        (DataBlockResult::Raw(raw.to_vec()), rest)
                    }
                    0x01 => {
                        let (code, rest) = decode_access_result(rest)?;
                        (DataBlockResult::AccessError(code), rest)
                    }
                    _ => return Err(Error::InvalidResponse("unknown datablock result choice")),
                };
                Ok((
                    GetResponse::WithDataBlock(GetResponseWithDataBlock {
                        invoke_id,
                        last_block,
                        block_number,
                        result,
                    }),
                    rest,
                ))
            }
            0x03 => {
                let (bytes, mut rest) = axdr::split(rest, 2)?;
                let invoke_id = bytes[0];
                let mut results = Vec::with_capacity(bytes[1] as usize);
                for _ in 0..bytes[1] {
                    let (result, next) = GetDataResult::decode(rest)?;
                    results.push(result);
                    rest = next;
                }
                Ok((GetResponse::WithList(GetResponseWithList { invoke_id, results }), rest))
            }
            _ => Err(Error::InvalidResponse("unknown GET-Response choice")),
        }
    }
}
