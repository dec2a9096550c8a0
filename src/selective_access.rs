//! Selective access descriptors: filters attached to GET/SET requests that
//! select a subset of an array-valued attribute (typically a ProfileGeneric
//! buffer).
//!
//! Wire form is `selector byte || A-XDR parameter tree`; inside a request the
//! pair sits behind a one-byte presence flag.

use crate::axdr::{Data, DateTime};
use crate::error::{Error, Result};
use crate::get::AttributeDescriptor;
use crate::obis_code::ObisCode;

/// One capture-object reference inside a Range descriptor: the 9-byte
/// attribute address plus the wire-level data index.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CaptureObject {
    pub attribute: AttributeDescriptor,
    pub data_index: u16,
}

impl CaptureObject {
    pub fn new(attribute: AttributeDescriptor, data_index: u16) -> Self {
        Self { attribute, data_index }
    }

    /// The Clock time attribute, the usual restricting object of a load
    /// profile buffer.
    pub fn clock() -> Self {
        Self::new(AttributeDescriptor::new(8, ObisCode::new(0, 0, 1, 0, 0, 255), 2), 0)
    }

    fn to_data(&self) -> Data {
        Data::Structure(vec![
            Data::LongUnsigned(self.attribute.class_id),
            Data::OctetString(self.attribute.instance_id.encode().to_vec()),
            Data::Integer(self.attribute.attribute_id),
            Data::LongUnsigned(self.data_index),
        ])
    }

    fn from_data(data: &Data) -> Result<Self> {
        let fields = match data {
            Data::Structure(fields) if fields.len() == 4 => fields,
            _ => return Err(Error::InvalidResponse("capture object definition shape")),
        };
        match (&fields[0], &fields[1], &fields[2], &fields[3]) {
            (
                Data::LongUnsigned(class_id),
                Data::OctetString(obis),
                Data::Integer(attribute_id),
                Data::LongUnsigned(data_index),
            ) if obis.len() == 6 => {
                let instance_id = ObisCode::decode(obis)?.0;
                Ok(Self::new(
                    AttributeDescriptor::new(*class_id, instance_id, *attribute_id),
                    *data_index,
                ))
            }
            _ => Err(Error::InvalidResponse("capture object definition shape")),
        }
    }
}

/// Selective access filter, selector id 1 (range) or 2 (entry).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum SelectiveAccess {
    /// Filter rows by a closed date-time interval over the restricting
    /// object (selector 1).
    Range {
        restricting_object: CaptureObject,
        from_value: DateTime,
        to_value: DateTime,
        /// Columns to return; empty selects all of them.
        selected_values: Vec<CaptureObject>,
    },
    /// Filter rows by buffer entry numbers (selector 2).
    Entry {
        from_entry: u32,
        to_entry: u32,
        from_selected: u16,
        to_selected: u16,
    },
}

impl SelectiveAccess {
    pub const RANGE_SELECTOR: u8 = 1;
    pub const ENTRY_SELECTOR: u8 = 2;

    /// Range descriptor restricted by the Clock attribute, all columns.
    pub fn range(from_value: DateTime, to_value: DateTime) -> Self {
        SelectiveAccess::Range {
            restricting_object: CaptureObject::clock(),
            from_value,
            to_value,
            selected_values: Vec::new(),
        }
    }

    /// Entry descriptor over `[from_entry, to_entry]`, all columns.
    pub fn entry(from_entry: u32, to_entry: u32) -> Self {
        SelectiveAccess::Entry { from_entry, to_entry, from_selected: 0, to_selected: 0 }
    }

    pub fn selector(&self) -> u8 {
        match self {
            SelectiveAccess::Range { .. } => Self::RANGE_SELECTOR,
            SelectiveAccess::Entry { .. } => Self::ENTRY_SELECTOR,
        }
    }

    /// The access parameter tree (without the selector byte).
    pub fn to_data(&self) -> Data {
        match self {
            SelectiveAccess::Range { restricting_object, from_value, to_value, selected_values } => {
                Data::Structure(vec![
                    restricting_object.to_data(),
                    Data::OctetString(from_value.encode().to_vec()),
                    Data::OctetString(to_value.encode().to_vec()),
                    Data::Array(selected_values.iter().map(CaptureObject::to_data).collect()),
                ])
            }
            SelectiveAccess::Entry { from_entry, to_entry, from_selected, to_selected } => {
                Data::Structure(vec![
                    Data::DoubleLongUnsigned(*from_entry),
                    Data::DoubleLongUnsigned(*to_entry),
                    Data::LongUnsigned(*from_selected),
                    Data::LongUnsigned(*to_selected),
                ])
            }
        }
    }

    /// `selector byte || A-XDR parameters`.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = vec![self.selector()];
        out.extend_from_slice(&self.to_data().encode()?);
        Ok(out)
    }

    /// Inverse of [`SelectiveAccess::encode`]. Nothing is consumed on error.
    pub fn decode(input: &[u8]) -> Result<(Self, usize)> {
        let (&selector, rest) = input.split_first().ok_or(Error::Truncated)?;
        let (parameters, consumed) = Data::decode(rest)?;
        let descriptor = Self::from_parts(selector, &parameters)?;
        Ok((descriptor, 1 + consumed))
    }

    fn from_parts(selector: u8, parameters: &Data) -> Result<Self> {
        let fields = match parameters {
            Data::Structure(fields) if fields.len() == 4 => fields,
            _ => return Err(Error::InvalidResponse("selective access parameter shape")),
        };
        match selector {
            Self::RANGE_SELECTOR => {
                let restricting_object = CaptureObject::from_data(&fields[0])?;
                let from_value = range_bound(&fields[1])?;
                let to_value = range_bound(&fields[2])?;
                let selected = match &fields[3] {
                    Data::Array(items) => items,
                    _ => return Err(Error::InvalidResponse("selective access parameter shape")),
                };
                let selected_values =
                    selected.iter().map(CaptureObject::from_data).collect::<Result<Vec<_>>>()?;
                Ok(SelectiveAccess::Range {
                    restricting_object,
                    from_value,
                    to_value,
                    selected_values,
                })
            }
            Self::ENTRY_SELECTOR => match (&fields[0], &fields[1], &fields[2], &fields[3]) {
                (
                    Data::DoubleLongUnsigned(from_entry),
                    Data::DoubleLongUnsigned(to_entry),
                    Data::LongUnsigned(from_selected),
                    Data::LongUnsigned(to_selected),
                ) => Ok(SelectiveAccess::Entry {
                    from_entry: *from_entry,
                    to_entry: *to_entry,
                    from_selected: *from_selected,
                    to_selected: *to_selected,
                }),
                _ => Err(Error::InvalidResponse("selective access parameter shape")),
            },
            _ => Err(Error::InvalidResponse("unknown access selector")),
        }
    }
}

fn range_bound(data: &Data) -> Result<DateTime> {
    match data {
        Data::OctetString(bytes) if bytes.len() == 12 => Ok(DateTime::decode(bytes)?.0),
        Data::DateTime(value) => Ok(*value),
        _ => Err(Error::InvalidResponse("selective access range bound")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_encode() {
        let access = SelectiveAccess::entry(0, 5);
        assert_eq!(
            access.encode().unwrap(),
            [2, 2, 4, 6, 0, 0, 0, 0, 6, 0, 0, 0, 5, 18, 0, 0, 18, 0, 0]
        );
    }

    #[test]
    fn test_range_encode() {
        let from = DateTime::from_calendar(2020, 1, 1, 10, 0, 0, 0);
        let to = DateTime::from_calendar(2020, 1, 1, 11, 0, 0, 0);
        let access = SelectiveAccess::range(from, to);
        assert_eq!(
            access.encode().unwrap(),
            [
                1, 2, 4, 2, 4, 18, 0, 8, 9, 6, 0, 0, 1, 0, 0, 255, 15, 2, 18, 0, 0, 9, 12, 7, 228,
                1, 1, 3, 10, 0, 0, 0, 0, 0, 0, 9, 12, 7, 228, 1, 1, 3, 11, 0, 0, 0, 0, 0, 0, 1, 0
            ]
        );
    }

    #[test]
    fn test_entry_roundtrip() {
        let access = SelectiveAccess::Entry {
            from_entry: 1,
            to_entry: 1440,
            from_selected: 2,
            to_selected: 5,
        };
        let encoded = access.encode().unwrap();
        let (decoded, consumed) = SelectiveAccess::decode(&encoded).unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(decoded, access);
    }

    #[test]
    fn test_range_roundtrip() {
        let from = DateTime::from_calendar(2024, 6, 1, 0, 0, 0, 60);
        let to = DateTime::from_calendar(2024, 6, 2, 0, 0, 0, 60);
        let access = SelectiveAccess::range(from, to);
        let encoded = access.encode().unwrap();
        let (decoded, consumed) = SelectiveAccess::decode(&encoded).unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(decoded, access);
    }

    #[test]
    fn test_decode_poisoned_buffer_consumes_nothing() {
        // Entry descriptor with the third field's tag clobbered.
        let src = [2, 2, 4, 6, 0, 0, 0, 0, 6, 0, 0, 0, 5, 255, 0, 0, 18, 0, 0];
        assert!(SelectiveAccess::decode(&src).is_err());
        // The caller's buffer is untouched; a cursor into it would still
        // point at the selector byte.
        assert_eq!(src[0], 2);
    }

    #[test]
    fn test_decode_unknown_selector() {
        let mut src = SelectiveAccess::entry(0, 5).encode().unwrap();
        src[0] = 9;
        assert!(matches!(
            SelectiveAccess::decode(&src),
            Err(Error::InvalidResponse("unknown access selector"))
        ));
    }
}
