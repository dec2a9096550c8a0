//! SET service PDUs.
//!
//! Tags: SET-Request `0xC1`, SET-Response `0xC5`. Values too large for one
//! PDU stream through the with-first-datablock / with-datablock choices.

use crate::axdr::{self, Data};
use crate::error::{Error, Result};
use crate::get::{decode_access, encode_access, AttributeDescriptor, DataAccessResult};
use crate::selective_access::SelectiveAccess;

pub const SET_REQUEST_TAG: u8 = 0xC1;
pub const SET_RESPONSE_TAG: u8 = 0xC5;

/// One chunk of a block-streamed SET value.
#[derive(Debug, Clone, PartialEq)]
pub struct DataBlock {
    pub last_block: bool,
    pub block_number: u32,
    pub raw: Vec<u8>,
}

impl DataBlock {
    fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        out.push(if self.last_block { 0x01 } else { 0x00 });
        out.extend_from_slice(&self.block_number.to_be_bytes());
        axdr::encode_length(self.raw.len(), out)?;
        out.extend_from_slice(&self.raw);
        Ok(())
    }

    fn decode(input: &[u8]) -> Result<(Self, &[u8])> {
        let (header, rest) = axdr::split(input, 5)?;
        let last_block = header[0] != 0;
        let block_number = u32::from_be_bytes(header[1..5].try_into().unwrap());
        let (length, rest) = axdr::decode_length(rest)?;
        let (raw, rest) = axdr::split(rest, length)?;
        Ok((Self { last_block, block_number, raw: raw.to_vec() }, rest))
    }
}

/// SET service request, one variant per choice.
#[derive(Debug, Clone, PartialEq)]
pub enum SetRequest {
    Normal(SetRequestNormal),
    WithFirstDataBlock(SetRequestWithFirstDataBlock),
    WithDataBlock(SetRequestWithDataBlock),
    WithList(SetRequestWithList),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetRequestNormal {
    pub invoke_id: u8,
    pub attribute: AttributeDescriptor,
    pub access: Option<SelectiveAccess>,
    pub value: Data,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetRequestWithFirstDataBlock {
    pub invoke_id: u8,
    pub attribute: AttributeDescriptor,
    pub access: Option<SelectiveAccess>,
    pub block: DataBlock,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetRequestWithDataBlock {
    pub invoke_id: u8,
    pub block: DataBlock,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetRequestWithList {
    pub invoke_id: u8,
    pub attributes: Vec<AttributeDescriptor>,
    pub values: Vec<Data>,
}

impl SetRequest {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = vec![SET_REQUEST_TAG];
        match self {
            SetRequest::Normal(req) => {
                out.push(0x01);
                out.push(req.invoke_id);
                out.extend_from_slice(&req.attribute.encode());
                encode_access(&req.access, &mut out)?;
                out.extend_from_slice(&req.value.encode()?);
            }
            SetRequest::WithFirstDataBlock(req) => {
                out.push(0x02);
                out.push(req.invoke_id);
                out.extend_from_slice(&req.attribute.encode());
                encode_access(&req.access, &mut out)?;
                req.block.encode_into(&mut out)?;
            }
            SetRequest::WithDataBlock(req) => {
                out.push(0x03);
                out.push(req.invoke_id);
                req.block.encode_into(&mut out)?;
            }
            SetRequest::WithList(req) => {
                out.push(0x04);
                out.push(req.invoke_id);
                out.push(req.attributes.len() as u8);
                for attribute in &req.attributes {
                    out.extend_from_slice(&attribute.encode());
                }
                out.push(req.values.len() as u8);
                for value in &req.values {
                    out.extend_from_slice(&value.encode()?);
                }
            }
        }
        Ok(out)
    }

    pub fn decode(input: &[u8]) -> Result<(Self, &[u8])> {
        let (header, rest) = axdr::split(input, 2)?;
        if header[0] != SET_REQUEST_TAG {
            return Err(Error::InvalidResponse("expected SET-Request"));
        }
        match header[1] {
            0x01 => {
                let (&invoke_id, rest) = rest.split_first().ok_or(Error::Truncated)?;
                let (attribute, rest) = AttributeDescriptor::decode(rest)?;
                let (access, rest) = decode_access(rest)?;
                let (value, consumed) = Data::decode(rest)?;
                Ok((
                    SetRequest::Normal(SetRequestNormal { invoke_id, attribute, access, value }),
                    &rest[consumed..],
                ))
            }
            0x02 => {
                let (&invoke_id, rest) = rest.split_first().ok_or(Error::Truncated)?;
                let (attribute, rest) = AttributeDescriptor::decode(rest)?;
                let (access, rest) = decode_access(rest)?;
                let (block, rest) = DataBlock::decode(rest)?;
                Ok((
                    SetRequest::WithFirstDataBlock(SetRequestWithFirstDataBlock {
                        invoke_id,
                        attribute,
                        access,
                        block,
                    }),
                    rest,
                ))
            }
            0x03 => {
                let (&invoke_id, rest) = rest.split_first().ok_or(Error::Truncated)?;
                let (block, rest) = DataBlock::decode(rest)?;
                Ok((SetRequest::WithDataBlock(SetRequestWithDataBlock { invoke_id, block }), rest))
            }
            0x04 => {
                let (bytes, mut rest) = axdr::split(rest, 2)?;
                let invoke_id = bytes[0];
                let mut attributes = Vec::with_capacity(bytes[1] as usize);
                for _ in 0..bytes[1] {
                    let (attribute, next) = AttributeDescriptor::decode(rest)?;
                    attributes.push(attribute);
                    rest = next;
                }
                let (&count, mut rest) = rest.split_first().ok_or(Error::Truncated)?;
                let mut values = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let (value, consumed) = Data::decode(rest)?;
                    values.push(value);
                    rest = &rest[consumed..];
                }
                Ok((SetRequest::WithList(SetRequestWithList { invoke_id, attributes, values }), rest))
            }
            _ => Err(Error::InvalidResponse("unknown SET-Request choice")),
        }
    }
}

/// SET service response, one variant per choice.
#[derive(Debug, Clone, PartialEq)]
pub enum SetResponse {
    Normal(SetResponseNormal),
    DataBlock(SetResponseDataBlock),
    LastDataBlock(SetResponseLastDataBlock),
    WithList(SetResponseWithList),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetResponseNormal {
    pub invoke_id: u8,
    pub result: DataAccessResult,
}

/// Acknowledges one intermediate block.
#[derive(Debug, Clone, PartialEq)]
pub struct SetResponseDataBlock {
    pub invoke_id: u8,
    pub block_number: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetResponseLastDataBlock {
    pub invoke_id: u8,
    pub result: DataAccessResult,
    pub block_number: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetResponseWithList {
    pub invoke_id: u8,
    pub results: Vec<DataAccessResult>,
}

impl SetResponse {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = vec![SET_RESPONSE_TAG];
        match self {
            SetResponse::Normal(resp) => {
                out.push(0x01);
                out.push(resp.invoke_id);
                out.push(resp.result.as_u8());
            }
            SetResponse::DataBlock(resp) => {
                out.push(0x02);
                out.push(resp.invoke_id);
                out.extend_from_slice(&resp.block_number.to_be_bytes());
            }
            SetResponse::LastDataBlock(resp) => {
                out.push(0x03);
                out.push(resp.invoke_id);
                out.push(resp.result.as_u8());
                out.extend_from_slice(&resp.block_number.to_be_bytes());
            }
            SetResponse::WithList(resp) => {
                out.push(0x05);
                out.push(resp.invoke_id);
                out.push(resp.results.len() as u8);
                for result in &resp.results {
                    out.push(result.as_u8());
                }
            }
        }
        Ok(out)
    }

    pub fn decode(input: &[u8]) -> Result<(Self, &[u8])> {
        let (header, rest) = axdr::split(input, 2)?;
        if header[0] != SET_RESPONSE_TAG {
            return Err(Error::InvalidResponse("expected SET-Response"));
        }
        match header[1] {
            0x01 => {
                let (bytes, rest) = axdr::split(rest, 2)?;
                let result = DataAccessResult::from_u8(bytes[1])
                    .ok_or(Error::InvalidResponse("unknown data-access-result"))?;
                Ok((SetResponse::Normal(SetResponseNormal { invoke_id: bytes[0], result }), rest))
            }
            0x02 => {
                let (bytes, rest) = axdr::split(rest, 5)?;
                let block_number = u32::from_be_bytes(bytes[1..5].try_into().unwrap());
                Ok((
                    SetResponse::DataBlock(SetResponseDataBlock {
                        invoke_id: bytes[0],
                        block_number,
                    }),
                    rest,
                ))
            }
            0x03 => {
                let (bytes, rest) = axdr::split(rest, 6)?;
                let result = DataAccessResult::from_u8(bytes[1])
                    .ok_or(Error::InvalidResponse("unknown data-access-result"))?;
                let block_number = u32::from_be_bytes(bytes[2..6].try_into().unwrap());
                Ok((
                    SetResponse::LastDataBlock(SetResponseLastDataBlock {
                        invoke_id: bytes[0],
                        result,
                        block_number,
                    }),
                    rest,
                ))
            }
            0x05 => {
                let (bytes, rest) = axdr::split(rest, 2)?;
                let invoke_id = bytes[0];
                let (codes, rest) = axdr::split(rest, bytes[1] as usize)?;
                let results = codes
                    .iter()
                    .map(|&code| {
                        DataAccessResult::from_u8(code)
                            .ok_or(Error::InvalidResponse("unknown data-access-result"))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok((SetResponse::WithList(SetResponseWithList { invoke_id, results }), rest))
            }
            _ => Err(Error::InvalidResponse("unknown SET-Response choice")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obis_code::ObisCode;

    const INVOKE: u8 = 0xC1;

    fn clock_attribute() -> AttributeDescriptor {
        AttributeDescriptor::new(8, ObisCode::new(0, 0, 1, 0, 0, 255), 2)
    }

    #[test]
    fn test_set_request_normal_bytes() {
        let request = SetRequest::Normal(SetRequestNormal {
            invoke_id: INVOKE,
            attribute: AttributeDescriptor::new(1, ObisCode::new(0, 0, 96, 1, 0, 255), 2),
            access: None,
            value: Data::Unsigned(10),
        });
        assert_eq!(
            request.encode().unwrap(),
            [0xC1, 0x01, 0xC1, 0x00, 0x01, 0x00, 0x00, 0x60, 0x01, 0x00, 0xFF, 0x02, 0x00, 0x11, 0x0A]
        );
    }

    #[test]
    fn test_set_request_normal_roundtrip() {
        let request = SetRequest::Normal(SetRequestNormal {
            invoke_id: INVOKE,
            attribute: clock_attribute(),
            access: Some(SelectiveAccess::entry(0, 5)),
            value: Data::Structure(vec![Data::Long(-5), Data::Enum(30)]),
        });
        let encoded = request.encode().unwrap();
        let (decoded, rest) = SetRequest::decode(&encoded).unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_set_request_block_roundtrip() {
        let first = SetRequest::WithFirstDataBlock(SetRequestWithFirstDataBlock {
            invoke_id: INVOKE,
            attribute: clock_attribute(),
            access: None,
            block: DataBlock { last_block: false, block_number: 1, raw: vec![0x09, 0x10, 0xAA] },
        });
        let encoded = first.encode().unwrap();
        assert_eq!(&encoded[..2], &[0xC1, 0x02]);
        let (decoded, rest) = SetRequest::decode(&encoded).unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded, first);

        let next = SetRequest::WithDataBlock(SetRequestWithDataBlock {
            invoke_id: INVOKE,
            block: DataBlock { last_block: true, block_number: 2, raw: vec![0xBB; 40] },
        });
        let encoded = next.encode().unwrap();
        assert_eq!(&encoded[..2], &[0xC1, 0x03]);
        let (decoded, rest) = SetRequest::decode(&encoded).unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded, next);
    }

    #[test]
    fn test_set_request_with_list_roundtrip() {
        let request = SetRequest::WithList(SetRequestWithList {
            invoke_id: INVOKE,
            attributes: vec![clock_attribute(), clock_attribute()],
            values: vec![Data::Unsigned(1), Data::Unsigned(2)],
        });
        let encoded = request.encode().unwrap();
        let (decoded, rest) = SetRequest::decode(&encoded).unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_set_response_normal() {
        let input = [0xC5, 0x01, 0xC1, 0x00];
        let (response, rest) = SetResponse::decode(&input).unwrap();
        assert!(rest.is_empty());
        assert_eq!(
            response,
            SetResponse::Normal(SetResponseNormal {
                invoke_id: INVOKE,
                result: DataAccessResult::Success,
            })
        );
    }

    #[test]
    fn test_set_response_block_acks_roundtrip() {
        let ack = SetResponse::DataBlock(SetResponseDataBlock { invoke_id: INVOKE, block_number: 1 });
        let (decoded, _) = SetResponse::decode(&ack.encode().unwrap()).unwrap();
        assert_eq!(decoded, ack);

        let last = SetResponse::LastDataBlock(SetResponseLastDataBlock {
            invoke_id: INVOKE,
            result: DataAccessResult::Success,
            block_number: 3,
        });
        let (decoded, _) = SetResponse::decode(&last.encode().unwrap()).unwrap();
        assert_eq!(decoded, last);
    }

    #[test]
    fn test_set_response_with_list_roundtrip() {
        let response = SetResponse::WithList(SetResponseWithList {
            invoke_id: INVOKE,
            results: vec![DataAccessResult::Success, DataAccessResult::ReadWriteDenied],
        });
        let (decoded, _) = SetResponse::decode(&response.encode().unwrap()).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn test_set_response_unknown_choice() {
        assert!(matches!(
            SetResponse::decode(&[0xC5, 0x07, 0xC1, 0x00]),
            Err(Error::InvalidResponse(_))
        ));
    }
}
