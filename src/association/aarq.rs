//! AARQ assembly.
//!
//! Field order on the wire: `A1` application-context-name, `A6` calling-AP-
//! title (only with a system title), `8A`/`8B`/`AC` authentication fields
//! (only when authenticating), `BE` user-information with the (possibly
//! glo-ciphered) initiate-request. `8A` and `8B` use implicit tagging.

use super::ber::{encode_context, encode_object_identifier, encode_octet_string, encode_tlv, TagType};
use super::{ApplicationContext, Authentication, InitiateRequest, AARQ_TAG};
use crate::error::{Error, Result};
use crate::security::{self, GLO_INITIATE_REQUEST};
use crate::settings::Settings;

/// Build the AARQ for the given settings.
///
/// On a ciphered association the initiate-request is wrapped with the
/// unicast key and the invocation counter is incremented exactly once.
pub fn encode_aarq(settings: &mut Settings) -> Result<Vec<u8>> {
    let mut content = Vec::new();

    // A1: application-context-name
    let context = settings.application_context();
    let mut oid_bytes = ApplicationContext::OID_PREFIX.to_vec();
    oid_bytes.push(context.context_id());
    let mut context_name = Vec::with_capacity(9);
    encode_object_identifier(&oid_bytes, &mut context_name);
    encode_context(1, TagType::Constructed, &context_name, &mut content);

    // A6: calling-AP-title
    if let Some(system_title) = settings.ciphering.system_title {
        let mut title = Vec::with_capacity(10);
        encode_octet_string(&system_title, &mut title);
        encode_context(6, TagType::Constructed, &title, &mut content);
    }

    if settings.authentication != Authentication::None {
        // 8A: sender-ACSE-requirements, authentication bit set
        encode_context(10, TagType::Primitive, &[0x07, 0x80], &mut content);

        // 8B: mechanism-name (implicit OID content)
        let mut mechanism = Authentication::OID_PREFIX.to_vec();
        mechanism.push(settings.authentication.mechanism_id());
        encode_context(11, TagType::Primitive, &mechanism, &mut content);

        if settings.password.is_empty() {
            return Err(Error::InvalidParameter("authentication requires a password"));
        }

        // AC: calling-authentication-value, charstring choice
        let mut value = Vec::with_capacity(2 + settings.password.len());
        encode_context(0, TagType::Primitive, &settings.password, &mut value);
        encode_context(12, TagType::Constructed, &value, &mut content);
    }

    // BE: user-information
    let user_information = build_user_information(settings)?;
    let mut wrapped = Vec::with_capacity(2 + user_information.len());
    encode_octet_string(&user_information, &mut wrapped);
    encode_context(30, TagType::Constructed, &wrapped, &mut content);

    let mut out = Vec::with_capacity(2 + content.len());
    encode_tlv(AARQ_TAG, &content, &mut out);
    Ok(out)
}

fn build_user_information(settings: &mut Settings) -> Result<Vec<u8>> {
    let ciphered = !settings.ciphering.security.is_none();

    let initiate = match (&settings.ciphering.dedicated_key, ciphered) {
        (Some(key), true) => {
            InitiateRequest::with_dedicated_key(settings.max_pdu_size, key.to_vec())
        }
        _ => InitiateRequest::new(settings.max_pdu_size),
    };
    let initiate = initiate.encode();

    if !ciphered {
        return Ok(initiate);
    }

    let system_title = settings
        .ciphering
        .system_title
        .ok_or(Error::InvalidParameter("ciphering requires a system title"))?;
    let counter = settings.ciphering.invocation_counter;
    let wrapped = security::wrap(
        GLO_INITIATE_REQUEST,
        settings.ciphering.security,
        &system_title,
        &settings.ciphering.unicast_key,
        &settings.ciphering.authentication_key,
        counter,
        &initiate,
    )?;
    settings.ciphering.invocation_counter += 1;
    Ok(wrapped)
}
