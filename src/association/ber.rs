//! Minimal ASN.1 BER helpers for the ACSE APDUs.
//!
//! Only the subset AARQ/AARE/RLRQ/RLRE need: single-byte tags, definite
//! lengths up to two octets, and the OCTET STRING / OBJECT IDENTIFIER /
//! INTEGER primitives.

use nom::error::{Error as NomError, ErrorKind};
use nom::number::complete::u8 as nom_u8;
use nom::IResult;

/// BER tag class (upper two bits of the identifier octet).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagClass {
    Universal,
    Application,
    ContextSpecific,
    Private,
}

impl TagClass {
    pub const fn from_bits(byte: u8) -> Self {
        match byte & 0b1100_0000 {
            0b0000_0000 => TagClass::Universal,
            0b0100_0000 => TagClass::Application,
            0b1000_0000 => TagClass::ContextSpecific,
            _ => TagClass::Private,
        }
    }

    pub const fn to_bits(self) -> u8 {
        match self {
            TagClass::Universal => 0b0000_0000,
            TagClass::Application => 0b0100_0000,
            TagClass::ContextSpecific => 0b1000_0000,
            TagClass::Private => 0b1100_0000,
        }
    }
}

/// Primitive or constructed encoding (bit 5 of the identifier octet).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagType {
    Primitive,
    Constructed,
}

impl TagType {
    pub const fn from_bit(byte: u8) -> Self {
        if byte & 0b0010_0000 != 0 { TagType::Constructed } else { TagType::Primitive }
    }

    pub const fn to_bit(self) -> u8 {
        match self {
            TagType::Primitive => 0b0000_0000,
            TagType::Constructed => 0b0010_0000,
        }
    }
}

/// Compose a single-byte identifier octet. Tag numbers above 30 need the
/// multi-byte form, which the ACSE subset never uses.
pub fn encode_tag(class: TagClass, tag_type: TagType, tag_number: u8) -> u8 {
    debug_assert!(tag_number <= 30);
    class.to_bits() | tag_type.to_bit() | tag_number
}

/// Parse a single-byte identifier octet into (class, type, number).
pub fn parse_tag(input: &[u8]) -> IResult<&[u8], (TagClass, TagType, u8)> {
    let (input, byte) = nom_u8(input)?;
    let tag_number = byte & 0b0001_1111;
    if tag_number == 31 {
        return Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag)));
    }
    Ok((input, (TagClass::from_bits(byte), TagType::from_bit(byte), tag_number)))
}

/// Encode a definite-form length (up to two length octets).
pub fn encode_length(length: usize, out: &mut Vec<u8>) {
    if length <= 0x7F {
        out.push(length as u8);
    } else if length <= 0xFF {
        out.push(0x81);
        out.push(length as u8);
    } else {
        debug_assert!(length <= 0xFFFF);
        out.push(0x82);
        out.extend_from_slice(&(length as u16).to_be_bytes());
    }
}

/// Parse a definite-form length (up to two length octets).
pub fn parse_length(input: &[u8]) -> IResult<&[u8], usize> {
    let (input, first) = nom_u8(input)?;
    if first & 0x80 == 0 {
        return Ok((input, first as usize));
    }
    let octets = (first & 0x7F) as usize;
    if octets == 0 || octets > 2 {
        return Err(nom::Err::Error(NomError::new(input, ErrorKind::LengthValue)));
    }
    let mut length = 0usize;
    let mut input = input;
    for _ in 0..octets {
        let (rest, byte) = nom_u8(input)?;
        length = (length << 8) | byte as usize;
        input = rest;
    }
    Ok((input, length))
}

/// Take a length-prefixed content slice.
pub fn parse_content(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, length) = parse_length(input)?;
    if input.len() < length {
        return Err(nom::Err::Error(NomError::new(input, ErrorKind::Eof)));
    }
    Ok((&input[length..], &input[..length]))
}

/// TLV with the given identifier octet.
pub fn encode_tlv(tag: u8, content: &[u8], out: &mut Vec<u8>) {
    out.push(tag);
    encode_length(content.len(), out);
    out.extend_from_slice(content);
}

/// Context-specific TLV.
pub fn encode_context(tag_number: u8, tag_type: TagType, content: &[u8], out: &mut Vec<u8>) {
    encode_tlv(encode_tag(TagClass::ContextSpecific, tag_type, tag_number), content, out);
}

/// Universal OCTET STRING TLV (`04 len bytes`).
pub fn encode_octet_string(octets: &[u8], out: &mut Vec<u8>) {
    encode_tlv(0x04, octets, out);
}

/// Universal OBJECT IDENTIFIER TLV (`06 len bytes`).
pub fn encode_object_identifier(oid: &[u8], out: &mut Vec<u8>) {
    encode_tlv(0x06, oid, out);
}

/// Parse a universal OCTET STRING TLV.
pub fn parse_octet_string(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, tag) = nom_u8(input)?;
    if tag != 0x04 {
        return Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag)));
    }
    parse_content(input)
}

/// Parse a universal OBJECT IDENTIFIER TLV, returning the OID bytes.
pub fn parse_object_identifier(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, tag) = nom_u8(input)?;
    if tag != 0x06 {
        return Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag)));
    }
    parse_content(input)
}

/// Parse a universal INTEGER TLV into a u32 (the ACSE fields are small).
pub fn parse_integer(input: &[u8]) -> IResult<&[u8], u32> {
    let (input, tag) = nom_u8(input)?;
    if tag != 0x02 {
        return Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag)));
    }
    let (input, content) = parse_content(input)?;
    if content.is_empty() || content.len() > 4 {
        return Err(nom::Err::Error(NomError::new(input, ErrorKind::LengthValue)));
    }
    let mut value = 0u32;
    for &byte in content {
        value = (value << 8) | byte as u32;
    }
    Ok((input, value))
}
