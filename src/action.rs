//! ACTION service PDUs: method invocation on COSEM objects.
//!
//! Tags: ACTION-Request `0xC3`, ACTION-Response `0xC7`. The core uses the
//! normal choice only.

use core::fmt;

use crate::axdr::{self, Data};
use crate::error::{Error, Result};
use crate::get::GetDataResult;
use crate::obis_code::ObisCode;

pub const ACTION_REQUEST_TAG: u8 = 0xC3;
pub const ACTION_RESPONSE_TAG: u8 = 0xC7;

/// Address of one COSEM method: class, instance, method index.
///
/// Same nine-byte wire form as an attribute descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MethodDescriptor {
    pub class_id: u16,
    pub instance_id: ObisCode,
    pub method_id: i8,
}

impl MethodDescriptor {
    pub const fn new(class_id: u16, instance_id: ObisCode, method_id: i8) -> Self {
        Self { class_id, instance_id, method_id }
    }

    pub fn encode(&self) -> [u8; 9] {
        let mut out = [0u8; 9];
        out[..2].copy_from_slice(&self.class_id.to_be_bytes());
        out[2..8].copy_from_slice(&self.instance_id.encode());
        out[8] = self.method_id as u8;
        out
    }

    pub fn decode(input: &[u8]) -> Result<(Self, &[u8])> {
        let (bytes, rest) = axdr::split(input, 9)?;
        let class_id = u16::from_be_bytes([bytes[0], bytes[1]]);
        let (instance_id, _) = ObisCode::decode(&bytes[2..8])?;
        Ok((Self::new(class_id, instance_id, bytes[8] as i8), rest))
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.class_id, self.instance_id, self.method_id)
    }
}

/// Single-byte result code carried in ACTION replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum ActionResult {
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
    LongActionAborted = 15,
    NoLongActionInProgress = 16,
    OtherReason = 250,
}

impl ActionResult {
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
            15 => Some(Self::LongActionAborted),
            16 => Some(Self::NoLongActionInProgress),
            250 => Some(Self::OtherReason),
            _ => None,
        }
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ActionResult {
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
            Self::LongActionAborted => "long-action-aborted",
            Self::NoLongActionInProgress => "no-long-action-in-progress",
            Self::OtherReason => "other-reason",
        };
        f.write_str(name)
    }
}

/// ACTION service request (normal choice).
#[derive(Debug, Clone, PartialEq)]
pub enum ActionRequest {
    Normal(ActionRequestNormal),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequestNormal {
    pub invoke_id: u8,
    pub method: MethodDescriptor,
    pub parameters: Option<Data>,
}

impl ActionRequest {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let ActionRequest::Normal(req) = self;
        let mut out = vec![ACTION_REQUEST_TAG, 0x01, req.invoke_id];
        out.extend_from_slice(&req.method.encode());
        match &req.parameters {
            Some(parameters) => {
                out.push(0x01);
                out.extend_from_slice(&parameters.encode()?);
            }
            None => out.push(0x00),
        }
        Ok(out)
    }

    pub fn decode(input: &[u8]) -> Result<(Self, &[u8])> {
        let (header, rest) = axdr::split(input, 2)?;
        if header[0] != ACTION_REQUEST_TAG {
            return Err(Error::InvalidResponse("expected ACTION-Request"));
        }
        if header[1] != 0x01 {
            return Err(Error::InvalidResponse("unknown ACTION-Request choice"));
        }
        let (&invoke_id, rest) = rest.split_first().ok_or(Error::Truncated)?;
        let (method, rest) = MethodDescriptor::decode(rest)?;
        let (&present, rest) = rest.split_first().ok_or(Error::Truncated)?;
        let (parameters, rest) = if present != 0 {
            let (data, consumed) = Data::decode(rest)?;
            (Some(data), &rest[consumed..])
        } else {
            (None, rest)
        };
        Ok((ActionRequest::Normal(ActionRequestNormal { invoke_id, method, parameters }), rest))
    }
}

/// ACTION service response (normal choice).
#[derive(Debug, Clone, PartialEq)]
pub enum ActionResponse {
    Normal(ActionResponseNormal),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionResponseNormal {
    pub invoke_id: u8,
    pub result: ActionResult,
    /// Optional return parameters: data or a data-access-result.
    pub return_parameters: Option<GetDataResult>,
}

impl ActionResponse {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let ActionResponse::Normal(resp) = self;
        let mut out = vec![ACTION_RESPONSE_TAG, 0x01, resp.invoke_id, resp.result.as_u8()];
        match &resp.return_parameters {
            Some(GetDataResult::Data(data)) => {
                out.push(0x01);
                out.push(0x00);
                out.extend_from_slice(&data.encode()?);
            }
            Some(GetDataResult::AccessError(code)) => {
                out.push(0x01);
                out.push(0x01);
                out.push(code.as_u8());
            }
            None => out.push(0x00),
        }
        Ok(out)
    }

    pub fn decode(input: &[u8]) -> Result<(Self, &[u8])> {
        let (header, rest) = axdr::split(input, 2)?;
        if header[0] != ACTION_RESPONSE_TAG {
            return Err(Error::InvalidResponse("expected ACTION-Response"));
        }
        if header[1] != 0x01 {
            return Err(Error::InvalidResponse("unknown ACTION-Response choice"));
        }
        let (bytes, rest) = axdr::split(rest, 2)?;
        let invoke_id = bytes[0];
        let result =
            ActionResult::from_u8(bytes[1]).ok_or(Error::InvalidResponse("unknown action-result"))?;
        // The optional-data presence byte is absent in some meters' replies.
        let (return_parameters, rest) = match rest.split_first() {
            None => (None, rest),
            Some((&0x00, rest)) => (None, rest),
            Some((_, rest)) => {
                let (inner, rest) = GetDataResult::decode(rest)?;
                (Some(inner), rest)
            }
        };
        Ok((
            ActionResponse::Normal(ActionResponseNormal { invoke_id, result, return_parameters }),
            rest,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::get::DataAccessResult;

    const INVOKE: u8 = 0xC1;

    fn disconnect_method() -> MethodDescriptor {
        MethodDescriptor::new(70, ObisCode::new(0, 0, 96, 3, 10, 255), 1)
    }

    #[test]
    fn test_method_descriptor_fixed_width() {
        let method = disconnect_method();
        let encoded = method.encode();
        assert_eq!(encoded.len(), 9);
        assert_eq!(encoded, [0x00, 0x46, 0x00, 0x00, 0x60, 0x03, 0x0A, 0xFF, 0x01]);
        let (decoded, rest) = MethodDescriptor::decode(&encoded).unwrap();
        assert_eq!(decoded, method);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_action_request_without_parameters() {
        let request = ActionRequest::Normal(ActionRequestNormal {
            invoke_id: INVOKE,
            method: disconnect_method(),
            parameters: None,
        });
        assert_eq!(
            request.encode().unwrap(),
            [0xC3, 0x01, 0xC1, 0x00, 0x46, 0x00, 0x00, 0x60, 0x03, 0x0A, 0xFF, 0x01, 0x00]
        );
    }

    #[test]
    fn test_action_request_roundtrip() {
        let request = ActionRequest::Normal(ActionRequestNormal {
            invoke_id: INVOKE,
            method: disconnect_method(),
            parameters: Some(Data::Integer(0)),
        });
        let encoded = request.encode().unwrap();
        let (decoded, rest) = ActionRequest::decode(&encoded).unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_action_response_success_without_data() {
        let input = [0xC7, 0x01, 0xC1, 0x00, 0x00];
        let (response, rest) = ActionResponse::decode(&input).unwrap();
        assert!(rest.is_empty());
        assert_eq!(
            response,
            ActionResponse::Normal(ActionResponseNormal {
                invoke_id: INVOKE,
                result: ActionResult::Success,
                return_parameters: None,
            })
        );
    }

    #[test]
    fn test_action_response_truncated_presence_byte() {
        // Some meters omit the trailing presence byte entirely.
        let input = [0xC7, 0x01, 0xC1, 0x00];
        let (response, _) = ActionResponse::decode(&input).unwrap();
        assert_eq!(
            response,
            ActionResponse::Normal(ActionResponseNormal {
                invoke_id: INVOKE,
                result: ActionResult::Success,
                return_parameters: None,
            })
        );
    }

    #[test]
    fn test_action_response_with_data_roundtrip() {
        let response = ActionResponse::Normal(ActionResponseNormal {
            invoke_id: INVOKE,
            result: ActionResult::Success,
            return_parameters: Some(GetDataResult::Data(Data::OctetString(vec![1, 2, 3]))),
        });
        let encoded = response.encode().unwrap();
        let (decoded, rest) = ActionResponse::decode(&encoded).unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded, response);
    }

    #[test]
    fn test_action_response_with_access_error() {
        let response = ActionResponse::Normal(ActionResponseNormal {
            invoke_id: INVOKE,
            result: ActionResult::Success,
            return_parameters: Some(GetDataResult::AccessError(DataAccessResult::ObjectUnavailable)),
        });
        let (decoded, _) = ActionResponse::decode(&response.encode().unwrap()).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn test_action_response_rejected() {
        let input = [0xC7, 0x01, 0xC1, 0x03, 0x00];
        let (response, _) = ActionResponse::decode(&input).unwrap();
        let ActionResponse::Normal(normal) = response;
        assert_eq!(normal.result, ActionResult::ReadWriteDenied);
    }

    #[test]
    fn test_action_result_codes() {
        assert_eq!(ActionResult::from_u8(15), Some(ActionResult::LongActionAborted));
        assert_eq!(ActionResult::from_u8(5), None);
        assert_eq!(ActionResult::OtherReason.to_string(), "other-reason");
    }
}
