//! Ciphered APDU protection: AES-128-GCM wrap/unwrap of inner APDUs.
//!
//! A glo- ciphered PDU is `glo-tag || length || security byte ||
//! invocation counter || ciphertext || auth tag`. The 12-byte IV is the
//! sender's system title followed by the big-endian invocation counter; the
//! GCM tag is truncated to 12 bytes. For authenticated encryption the
//! additional authenticated data is `security byte || authentication key`;
//! in authentication-only mode it additionally covers the plaintext.

use core::ops::BitOr;

use aes::Aes128;
use aes_gcm::aead::consts::U12;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::AeadInPlace;
use aes_gcm::{AesGcm, KeyInit};
use cipher::Key;

use crate::axdr;
use crate::error::{Error, Result};

/// AES-128-GCM with a 12-byte nonce and a 12-byte (truncated) tag.
type Gcm = AesGcm<Aes128, U12, U12>;

/// Truncated GCM tag length on the wire.
pub const AUTH_TAG_LEN: usize = 12;

// Ciphered APDU tags ("globally ciphered" set).
pub const GLO_INITIATE_REQUEST: u8 = 0x21;
pub const GLO_INITIATE_RESPONSE: u8 = 0x28;
pub const GLO_GET_REQUEST: u8 = 0xC8;
pub const GLO_SET_REQUEST: u8 = 0xC9;
pub const GLO_ACTION_REQUEST: u8 = 0xCB;
pub const GLO_GET_RESPONSE: u8 = 0xCC;
pub const GLO_SET_RESPONSE: u8 = 0xCD;
pub const GLO_ACTION_RESPONSE: u8 = 0xCF;

/// The glo- tag wrapping a given plain APDU tag.
pub fn glo_tag_for(apdu_tag: u8) -> Option<u8> {
    match apdu_tag {
        0x01 => Some(GLO_INITIATE_REQUEST),
        0x08 => Some(GLO_INITIATE_RESPONSE),
        0xC0 => Some(GLO_GET_REQUEST),
        0xC1 => Some(GLO_SET_REQUEST),
        0xC3 => Some(GLO_ACTION_REQUEST),
        0xC4 => Some(GLO_GET_RESPONSE),
        0xC5 => Some(GLO_SET_RESPONSE),
        0xC7 => Some(GLO_ACTION_RESPONSE),
        _ => None,
    }
}

pub fn is_glo_tag(tag: u8) -> bool {
    matches!(
        tag,
        GLO_INITIATE_REQUEST
            | GLO_INITIATE_RESPONSE
            | GLO_GET_REQUEST
            | GLO_SET_REQUEST
            | GLO_ACTION_REQUEST
            | GLO_GET_RESPONSE
            | GLO_SET_RESPONSE
            | GLO_ACTION_RESPONSE
    )
}

/// The security byte of a ciphered frame.
///
/// Bits 0-3 are the suite id; bit 4 enables authentication, bit 5
/// encryption, bit 6 signing. Signing is not performed by this core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityControl(u8);

impl SecurityControl {
    pub const NONE: Self = Self(0);
    pub const AUTHENTICATION: Self = Self(0x10);
    pub const ENCRYPTION: Self = Self(0x20);
    pub const SIGNING: Self = Self(0x40);

    pub const fn new(byte: u8) -> Self {
        Self(byte)
    }

    pub const fn value(self) -> u8 {
        self.0
    }

    pub const fn suite_id(self) -> u8 {
        self.0 & 0x0F
    }

    pub const fn authentication(self) -> bool {
        self.0 & Self::AUTHENTICATION.0 != 0
    }

    pub const fn encryption(self) -> bool {
        self.0 & Self::ENCRYPTION.0 != 0
    }

    pub const fn signing(self) -> bool {
        self.0 & Self::SIGNING.0 != 0
    }

    pub const fn is_none(self) -> bool {
        self.0 & (Self::AUTHENTICATION.0 | Self::ENCRYPTION.0 | Self::SIGNING.0) == 0
    }
}

impl BitOr for SecurityControl {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

fn cipher(key: &[u8; 16]) -> Gcm {
    Gcm::new(Key::<Aes128>::from_slice(key))
}

fn nonce(system_title: &[u8; 8], counter: u32) -> [u8; 12] {
    let mut iv = [0u8; 12];
    iv[..8].copy_from_slice(system_title);
    iv[8..].copy_from_slice(&counter.to_be_bytes());
    iv
}

fn aad(control: SecurityControl, auth_key: &[u8; 16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + auth_key.len());
    out.push(control.value());
    out.extend_from_slice(auth_key);
    out
}

/// Protect one plain APDU, producing the complete glo- frame.
///
/// The caller supplies the invocation counter to use; tracking and
/// incrementing it is the session's job.
pub fn wrap(
    glo_tag: u8,
    control: SecurityControl,
    system_title: &[u8; 8],
    key: &[u8; 16],
    auth_key: &[u8; 16],
    counter: u32,
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    if control.is_none() {
        return Err(Error::InvalidParameter("security control enables no protection"));
    }
    let gcm = cipher(key);
    let iv = nonce(system_title, counter);
    let iv = GenericArray::from_slice(&iv);

    let mut body = plaintext.to_vec();
    let tag = match (control.encryption(), control.authentication()) {
        (true, true) => {
            let aad = aad(control, auth_key);
            let tag = gcm
                .encrypt_in_place_detached(iv, &aad, &mut body)
                .map_err(|_| Error::CipherAuthFailure)?;
            Some(tag)
        }
        (true, false) => {
            gcm.encrypt_in_place_detached(iv, &[], &mut body)
                .map_err(|_| Error::CipherAuthFailure)?;
            None
        }
        (false, true) => {
            let mut aad = aad(control, auth_key);
            aad.extend_from_slice(plaintext);
            let tag = gcm
                .encrypt_in_place_detached(iv, &aad, &mut [])
                .map_err(|_| Error::CipherAuthFailure)?;
            Some(tag)
        }
        (false, false) => unreachable!(),
    };

    let body_len = 5 + body.len() + tag.as_ref().map_or(0, |_| AUTH_TAG_LEN);
    let mut out = Vec::with_capacity(2 + body_len);
    out.push(glo_tag);
    axdr::encode_length(body_len, &mut out)?;
    out.push(control.value());
    out.extend_from_slice(&counter.to_be_bytes());
    out.extend_from_slice(&body);
    if let Some(tag) = tag {
        out.extend_from_slice(&tag);
    }
    Ok(out)
}

/// Verify and strip the protection of one glo- frame.
///
/// `system_title` is the sender's title (for received frames, the server's,
/// learned from the AARE). Returns the glo tag, the frame's invocation
/// counter and the inner plaintext. Replay checking is the caller's job.
pub fn unwrap(
    input: &[u8],
    system_title: &[u8; 8],
    key: &[u8; 16],
    auth_key: &[u8; 16],
) -> Result<(u8, u32, Vec<u8>)> {
    let (&glo_tag, rest) = input.split_first().ok_or(Error::Truncated)?;
    if !is_glo_tag(glo_tag) {
        return Err(Error::UnknownTag(glo_tag));
    }
    let (length, rest) = axdr::decode_length(rest)?;
    let (frame, _) = axdr::split(rest, length)?;
    if frame.len() < 5 {
        return Err(Error::Truncated);
    }
    let control = SecurityControl::new(frame[0]);
    let counter = u32::from_be_bytes(frame[1..5].try_into().unwrap());
    let body = &frame[5..];

    let gcm = cipher(key);
    let iv = nonce(system_title, counter);
    let iv = GenericArray::from_slice(&iv);

    let plaintext = match (control.encryption(), control.authentication()) {
        (true, true) => {
            if body.len() < AUTH_TAG_LEN {
                return Err(Error::Truncated);
            }
            let (ciphertext, tag) = body.split_at(body.len() - AUTH_TAG_LEN);
            let mut buffer = ciphertext.to_vec();
            gcm.decrypt_in_place_detached(
                iv,
                &aad(control, auth_key),
                &mut buffer,
                GenericArray::from_slice(tag),
            )
            .map_err(|_| Error::CipherAuthFailure)?;
            buffer
        }
        (true, false) => {
            // GCM's keystream is its own inverse; re-encrypting decrypts.
            let mut buffer = body.to_vec();
            gcm.encrypt_in_place_detached(iv, &[], &mut buffer)
                .map_err(|_| Error::CipherAuthFailure)?;
            buffer
        }
        (false, true) => {
            if body.len() < AUTH_TAG_LEN {
                return Err(Error::Truncated);
            }
            let (plaintext, tag) = body.split_at(body.len() - AUTH_TAG_LEN);
            let mut aad = aad(control, auth_key);
            aad.extend_from_slice(plaintext);
            gcm.decrypt_in_place_detached(iv, &aad, &mut [], GenericArray::from_slice(tag))
                .map_err(|_| Error::CipherAuthFailure)?;
            plaintext.to_vec()
        }
        (false, false) => body.to_vec(),
    };

    Ok((glo_tag, counter, plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> Vec<u8> {
        let s: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        (0..s.len()).step_by(2).map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap()).collect()
    }

    const SYSTEM_TITLE: [u8; 8] = [0x43, 0x49, 0x52, 0x00, 0x00, 0x00, 0x00, 0x01];
    const KEY: [u8; 16] = [
        0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE,
        0xFF,
    ];

    #[test]
    fn test_security_control_bits() {
        let control = SecurityControl::AUTHENTICATION | SecurityControl::ENCRYPTION;
        assert_eq!(control.value(), 0x30);
        assert!(control.authentication());
        assert!(control.encryption());
        assert!(!control.signing());
        assert!(!control.is_none());
        assert_eq!(SecurityControl::new(0x31).suite_id(), 1);
        assert!(SecurityControl::NONE.is_none());
    }

    #[test]
    fn test_glo_tag_mapping() {
        assert_eq!(glo_tag_for(0xC0), Some(GLO_GET_REQUEST));
        assert_eq!(glo_tag_for(0xC4), Some(GLO_GET_RESPONSE));
        assert_eq!(glo_tag_for(0x01), Some(GLO_INITIATE_REQUEST));
        assert_eq!(glo_tag_for(0x62), None);
        assert!(is_glo_tag(0xCF));
        assert!(!is_glo_tag(0xC0));
    }

    #[test]
    fn test_wrap_known_vector() {
        // Ciphered initiate-request with a dedicated key, counter 0x107.
        let plaintext = hex("01 01 10 E803739DBE338C3A790D8D1B12C63FE2 00 00 06 5F1F04 0000181F 0200");
        let control = SecurityControl::AUTHENTICATION | SecurityControl::ENCRYPTION;
        let wrapped =
            wrap(GLO_INITIATE_REQUEST, control, &SYSTEM_TITLE, &KEY, &KEY, 0x0000_0107, &plaintext)
                .unwrap();
        let expected = hex(
            "21 30 30 00000107 8E6341442275404C816C6BED3E33AE809EC51E1D0E428BE8F5F643E26C3DD89FD2E3F2220097124F58E0F4",
        );
        assert_eq!(wrapped, expected);
    }

    #[test]
    fn test_wrap_unwrap_roundtrip_encrypted_authenticated() {
        let control = SecurityControl::AUTHENTICATION | SecurityControl::ENCRYPTION;
        let plaintext = hex("C0 01 C1 0003 010001 0800FF 02 00");
        let wrapped =
            wrap(GLO_GET_REQUEST, control, &SYSTEM_TITLE, &KEY, &KEY, 42, &plaintext).unwrap();
        assert_eq!(wrapped[0], GLO_GET_REQUEST);
        let (tag, counter, inner) = unwrap(&wrapped, &SYSTEM_TITLE, &KEY, &KEY).unwrap();
        assert_eq!(tag, GLO_GET_REQUEST);
        assert_eq!(counter, 42);
        assert_eq!(inner, plaintext);
    }

    #[test]
    fn test_wrap_unwrap_roundtrip_authentication_only() {
        let control = SecurityControl::AUTHENTICATION;
        let plaintext = b"plain body".to_vec();
        let wrapped =
            wrap(GLO_SET_REQUEST, control, &SYSTEM_TITLE, &KEY, &KEY, 7, &plaintext).unwrap();
        // Plaintext is visible on the wire in this mode.
        assert_eq!(&wrapped[7..7 + plaintext.len()], plaintext.as_slice());
        let (_, _, inner) = unwrap(&wrapped, &SYSTEM_TITLE, &KEY, &KEY).unwrap();
        assert_eq!(inner, plaintext);
    }

    #[test]
    fn test_wrap_unwrap_roundtrip_encryption_only() {
        let control = SecurityControl::ENCRYPTION;
        let plaintext = b"secret".to_vec();
        let wrapped =
            wrap(GLO_ACTION_REQUEST, control, &SYSTEM_TITLE, &KEY, &KEY, 1, &plaintext).unwrap();
        assert_ne!(&wrapped[7..], plaintext.as_slice());
        let (_, _, inner) = unwrap(&wrapped, &SYSTEM_TITLE, &KEY, &KEY).unwrap();
        assert_eq!(inner, plaintext);
    }

    #[test]
    fn test_unwrap_detects_tampering() {
        let control = SecurityControl::AUTHENTICATION | SecurityControl::ENCRYPTION;
        let mut wrapped =
            wrap(GLO_GET_RESPONSE, control, &SYSTEM_TITLE, &KEY, &KEY, 9, b"data").unwrap();
        let last = wrapped.len() - 1;
        wrapped[last] ^= 0x01;
        assert!(matches!(
            unwrap(&wrapped, &SYSTEM_TITLE, &KEY, &KEY),
            Err(Error::CipherAuthFailure)
        ));
    }

    #[test]
    fn test_unwrap_wrong_key() {
        let control = SecurityControl::AUTHENTICATION | SecurityControl::ENCRYPTION;
        let wrapped =
            wrap(GLO_GET_RESPONSE, control, &SYSTEM_TITLE, &KEY, &KEY, 9, b"data").unwrap();
        let mut other = KEY;
        other[0] ^= 0xFF;
        assert!(matches!(
            unwrap(&wrapped, &SYSTEM_TITLE, &other, &KEY),
            Err(Error::CipherAuthFailure)
        ));
    }

    #[test]
    fn test_unwrap_rejects_plain_tag() {
        assert!(matches!(
            unwrap(&[0xC4, 0x01, 0x00], &SYSTEM_TITLE, &KEY, &KEY),
            Err(Error::UnknownTag(0xC4))
        ));
    }

    #[test]
    fn test_wrap_requires_protection() {
        assert!(matches!(
            wrap(GLO_GET_REQUEST, SecurityControl::NONE, &SYSTEM_TITLE, &KEY, &KEY, 0, b""),
            Err(Error::InvalidParameter(_))
        ));
    }
}
