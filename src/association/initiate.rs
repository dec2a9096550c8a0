//! xDLMS InitiateRequest / InitiateResponse bodies, carried inside the
//! user-information field of AARQ and AARE.

use nom::bytes::complete::take;
use nom::error::{Error as NomError, ErrorKind};
use nom::number::complete::{be_u16, u8 as nom_u8};
use nom::IResult;

use super::{Conformance, DLMS_VERSION, INITIATE_REQUEST_TAG, INITIATE_RESPONSE_TAG};

/// Parameters the client proposes (tag 0x01).
///
/// Response-allowed and quality-of-service stay at their defaults, so both
/// encode as a zero usage flag. The conformance block is the fixed
/// [`Conformance::PROPOSED`] bitmap.
#[derive(Debug, Clone, PartialEq)]
pub struct InitiateRequest {
    /// Ciphering session key, present only on ciphered associations that use one.
    pub dedicated_key: Option<Vec<u8>>,
    pub proposed_conformance: Conformance,
    pub client_max_receive_pdu_size: u16,
}

impl InitiateRequest {
    pub fn new(max_pdu_size: u16) -> Self {
        Self {
            dedicated_key: None,
            proposed_conformance: Conformance::PROPOSED,
            client_max_receive_pdu_size: max_pdu_size,
        }
    }

    pub fn with_dedicated_key(max_pdu_size: u16, dedicated_key: Vec<u8>) -> Self {
        Self { dedicated_key: Some(dedicated_key), ..Self::new(max_pdu_size) }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![INITIATE_REQUEST_TAG];
        match &self.dedicated_key {
            Some(key) => {
                out.push(0x01);
                out.push(key.len() as u8);
                out.extend_from_slice(key);
            }
            None => out.push(0x00),
        }
        out.push(0x00); // response-allowed: default (true)
        out.push(0x00); // proposed-quality-of-service: absent
        out.push(DLMS_VERSION);
        out.extend_from_slice(&[0x5F, 0x1F, 0x04, 0x00]);
        out.extend_from_slice(&self.proposed_conformance.to_bytes());
        out.extend_from_slice(&self.client_max_receive_pdu_size.to_be_bytes());
        out
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, _) = expect_byte(input, INITIATE_REQUEST_TAG)?;
        let (input, key_present) = nom_u8(input)?;
        let (input, dedicated_key) = if key_present != 0 {
            let (input, length) = nom_u8(input)?;
            let (input, key) = take(length as usize)(input)?;
            (input, Some(key.to_vec()))
        } else {
            (input, None)
        };
        // response-allowed, explicit only when not the default
        let (input, response_used) = nom_u8(input)?;
        let (input, _) = if response_used != 0 { nom_u8(input)? } else { (input, 0) };
        // proposed-quality-of-service
        let (input, qos_used) = nom_u8(input)?;
        let (input, _) = if qos_used != 0 { nom_u8(input)? } else { (input, 0) };
        let (input, _version) = nom_u8(input)?;
        let (input, proposed_conformance) = parse_conformance_block(input)?;
        let (input, client_max_receive_pdu_size) = be_u16(input)?;
        Ok((input, Self { dedicated_key, proposed_conformance, client_max_receive_pdu_size }))
    }
}

/// Parameters the server granted (tag 0x08).
#[derive(Debug, Clone, PartialEq)]
pub struct InitiateResponse {
    pub negotiated_quality_of_service: Option<u8>,
    pub negotiated_dlms_version: u8,
    pub negotiated_conformance: Conformance,
    pub server_max_receive_pdu_size: u16,
    pub vaa_name: u16,
}

impl InitiateResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![INITIATE_RESPONSE_TAG];
        match self.negotiated_quality_of_service {
            Some(qos) => {
                out.push(0x01);
                out.push(qos);
            }
            None => out.push(0x00),
        }
        out.push(self.negotiated_dlms_version);
        out.extend_from_slice(&[0x5F, 0x1F, 0x04, 0x00]);
        out.extend_from_slice(&self.negotiated_conformance.to_bytes());
        out.extend_from_slice(&self.server_max_receive_pdu_size.to_be_bytes());
        out.extend_from_slice(&self.vaa_name.to_be_bytes());
        out
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, _) = expect_byte(input, INITIATE_RESPONSE_TAG)?;
        let (input, qos_used) = nom_u8(input)?;
        let (input, negotiated_quality_of_service) = if qos_used != 0 {
            let (input, qos) = nom_u8(input)?;
            (input, Some(qos))
        } else {
            (input, None)
        };
        let (input, negotiated_dlms_version) = nom_u8(input)?;
        let (input, negotiated_conformance) = parse_conformance_block(input)?;
        let (input, server_max_receive_pdu_size) = be_u16(input)?;
        let (input, vaa_name) = be_u16(input)?;
        Ok((
            input,
            Self {
                negotiated_quality_of_service,
                negotiated_dlms_version,
                negotiated_conformance,
                server_max_receive_pdu_size,
                vaa_name,
            },
        ))
    }
}

/// `5F 1F <len> <unused-bits> <3-byte bitmap>`.
fn parse_conformance_block(input: &[u8]) -> IResult<&[u8], Conformance> {
    let (input, _) = expect_byte(input, 0x5F)?;
    let (input, _) = expect_byte(input, 0x1F)?;
    let (input, length) = nom_u8(input)?;
    if length != 4 {
        return Err(nom::Err::Error(NomError::new(input, ErrorKind::LengthValue)));
    }
    let (input, _unused_bits) = nom_u8(input)?;
    let (input, bytes) = take(3usize)(input)?;
    Ok((input, Conformance::from_bytes([bytes[0], bytes[1], bytes[2]])))
}

fn expect_byte(input: &[u8], expected: u8) -> IResult<&[u8], u8> {
    let (rest, byte) = nom_u8(input)?;
    if byte != expected {
        return Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag)));
    }
    Ok((rest, byte))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initiate_request_bytes() {
        let request = InitiateRequest::new(256);
        assert_eq!(
            request.encode(),
            [0x01, 0x00, 0x00, 0x00, 0x06, 0x5F, 0x1F, 0x04, 0x00, 0x00, 0x18, 0x1F, 0x01, 0x00]
        );
    }

    #[test]
    fn test_initiate_request_with_dedicated_key() {
        let key = vec![0xE8, 0x03, 0x73, 0x9D];
        let request = InitiateRequest::with_dedicated_key(512, key.clone());
        let encoded = request.encode();
        assert_eq!(encoded[1], 0x01);
        assert_eq!(encoded[2], key.len() as u8);
        assert_eq!(&encoded[3..3 + key.len()], key.as_slice());
        assert_eq!(&encoded[encoded.len() - 2..], &[0x02, 0x00]);
    }

    #[test]
    fn test_initiate_request_roundtrip() {
        let request = InitiateRequest::with_dedicated_key(1024, vec![0xAA; 16]);
        let encoded = request.encode();
        let (rest, parsed) = InitiateRequest::parse(&encoded).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_initiate_response_parse() {
        // From an accepted AARE: conformance 00 10 1D, server max PDU 128, VAA 7.
        let input =
            [0x08, 0x00, 0x06, 0x5F, 0x1F, 0x04, 0x00, 0x00, 0x10, 0x1D, 0x00, 0x80, 0x00, 0x07];
        let (rest, response) = InitiateResponse::parse(&input).unwrap();
        assert!(rest.is_empty());
        assert_eq!(response.negotiated_dlms_version, 6);
        assert_eq!(response.negotiated_conformance.to_bytes(), [0x00, 0x10, 0x1D]);
        assert_eq!(response.server_max_receive_pdu_size, 128);
        assert_eq!(response.vaa_name, 0x0007);
    }

    #[test]
    fn test_initiate_response_roundtrip() {
        let response = InitiateResponse {
            negotiated_quality_of_service: None,
            negotiated_dlms_version: DLMS_VERSION,
            negotiated_conformance: Conformance::from_bytes([0x00, 0x10, 0x1D]),
            server_max_receive_pdu_size: 128,
            vaa_name: 0x0007,
        };
        let encoded = response.encode();
        let (rest, parsed) = InitiateResponse::parse(&encoded).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, response);
    }

    #[test]
    fn test_initiate_response_wrong_tag() {
        assert!(InitiateResponse::parse(&[0x01, 0x00]).is_err());
    }
}
