//! AARE parsing.
//!
//! The server's fields are context-tagged and may appear in any order;
//! unknown tags are skipped. The user-information octet string is kept raw
//! here because it may be glo-ciphered; the session decides how to read it.

use nom::IResult;

use super::ber::{
    parse_content, parse_integer, parse_object_identifier, parse_octet_string, parse_tag, TagClass,
};
use super::{ApplicationContext, AssociationResult, SourceDiagnostic, AARE_TAG};
use crate::error::{Error, Result};

/// Parsed A-Associate response.
#[derive(Debug, Clone, PartialEq)]
pub struct Aare {
    pub application_context: Option<ApplicationContext>,
    pub result: AssociationResult,
    pub source_diagnostic: SourceDiagnostic,
    /// The server's system title (responding-AP-title), when sent.
    pub responding_ap_title: Option<Vec<u8>>,
    /// HLS challenge (responding-authentication-value). Stored, not acted on.
    pub responding_authentication_value: Option<Vec<u8>>,
    /// Raw initiate-response bytes, possibly glo-ciphered.
    pub user_information: Option<Vec<u8>>,
}

impl Aare {
    /// Decode one AARE APDU.
    pub fn decode(input: &[u8]) -> Result<Self> {
        match Self::parse(input) {
            Ok((_, aare)) => Ok(aare),
            Err(nom::Err::Incomplete(_)) => Err(Error::Truncated),
            Err(_) => Err(Error::InvalidResponse("malformed AARE")),
        }
    }

    fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, tag) = nom::number::complete::u8(input)?;
        if tag != AARE_TAG {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Tag,
            )));
        }
        let (rest, mut content) = parse_content(input)?;

        let mut application_context = None;
        let mut result = None;
        let mut source_diagnostic = SourceDiagnostic::None;
        let mut responding_ap_title = None;
        let mut responding_authentication_value = None;
        let mut user_information = None;

        while !content.is_empty() {
            let (after_tag, (class, _, tag_number)) = parse_tag(content)?;
            if class != TagClass::ContextSpecific {
                return Err(nom::Err::Error(nom::error::Error::new(
                    content,
                    nom::error::ErrorKind::Tag,
                )));
            }
            let (next, field) = parse_content(after_tag)?;
            content = next;

            match tag_number {
                // A1: application-context-name
                1 => {
                    let (_, oid) = parse_object_identifier(field)?;
                    application_context = ApplicationContext::from_oid_bytes(oid);
                }
                // A2: result
                2 => {
                    let (_, value) = parse_integer(field)?;
                    result = AssociationResult::from_u8(value as u8);
                }
                // A3: result-source-diagnostic
                3 => {
                    let (after_choice, (class, _, choice)) = parse_tag(field)?;
                    if class == TagClass::ContextSpecific {
                        let (_, inner) = parse_content(after_choice)?;
                        let (_, value) = parse_integer(inner)?;
                        source_diagnostic = match choice {
                            1 => SourceDiagnostic::ServiceUser(value as u8),
                            2 => SourceDiagnostic::ServiceProvider(value as u8),
                            _ => SourceDiagnostic::None,
                        };
                    }
                }
                // A4: responding-AP-title
                4 => {
                    let (_, octets) = parse_octet_string(field)?;
                    responding_ap_title = Some(octets.to_vec());
                }
                // AA: responding-authentication-value (charstring choice)
                10 => {
                    let (after_choice, (class, _, choice)) = parse_tag(field)?;
                    if class == TagClass::ContextSpecific && choice == 0 {
                        let (_, value) = parse_content(after_choice)?;
                        responding_authentication_value = Some(value.to_vec());
                    }
                }
                // BE: user-information (octet string holding the initiate-response)
                30 => {
                    let (_, octets) = parse_octet_string(field)?;
                    user_information = Some(octets.to_vec());
                }
                // 88 responder-acse-requirements, 89 mechanism-name, others: skip
                _ => {}
            }
        }

        let result = result.ok_or(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Verify,
        )))?;

        Ok((
            rest,
            Self {
                application_context,
                result,
                source_diagnostic,
                responding_ap_title,
                responding_authentication_value,
                user_information,
            },
        ))
    }

    pub fn is_accepted(&self) -> bool {
        self.result == AssociationResult::Accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> Vec<u8> {
        let s: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        (0..s.len()).step_by(2).map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap()).collect()
    }

    #[test]
    fn test_decode_accepted() {
        let input = hex(
            "6129A109060760857405080101A203020100A305A103020100BE10040E0800065F1F040000101D00800007",
        );
        let aare = Aare::decode(&input).unwrap();
        assert!(aare.is_accepted());
        assert_eq!(aare.application_context, Some(ApplicationContext::LogicalName));
        assert_eq!(aare.source_diagnostic, SourceDiagnostic::ServiceUser(0));
        assert!(aare.responding_ap_title.is_none());

        let user_information = aare.user_information.unwrap();
        let (_, initiate) = super::super::InitiateResponse::parse(&user_information).unwrap();
        assert_eq!(initiate.server_max_receive_pdu_size, 0x0080);
        assert_eq!(initiate.negotiated_conformance.to_bytes(), [0x00, 0x10, 0x1D]);
    }

    #[test]
    fn test_decode_rejected_authentication_failure() {
        let input = hex("6117A109060760857405080101A203020101A305A10302010D");
        let aare = Aare::decode(&input).unwrap();
        assert_eq!(aare.result, AssociationResult::RejectedPermanent);
        assert_eq!(aare.source_diagnostic, SourceDiagnostic::ServiceUser(13));
        assert!(aare.user_information.is_none());
    }

    #[test]
    fn test_decode_reordered_fields() {
        // responding-AP-title ahead of the result fields
        let input = hex("6118A40A04084349520000000001A203020100A305A103020100");
        let aare = Aare::decode(&input).unwrap();
        assert!(aare.is_accepted());
        assert_eq!(
            aare.responding_ap_title.as_deref(),
            Some(&[0x43, 0x49, 0x52, 0x00, 0x00, 0x00, 0x00, 0x01][..])
        );
    }

    #[test]
    fn test_decode_missing_result_is_invalid() {
        let input = hex("610BA109060760857405080101");
        assert!(matches!(Aare::decode(&input), Err(Error::InvalidResponse(_))));
    }

    #[test]
    fn test_decode_wrong_tag() {
        assert!(Aare::decode(&hex("600312345678")).is_err());
    }
}
