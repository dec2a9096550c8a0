//! The crate-wide error type.

use core::fmt;

use crate::action::ActionResult;
use crate::association::{AssociationResult, SourceDiagnostic};
use crate::get::DataAccessResult;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Every failure the client core can report.
///
/// Codec errors surface to the caller verbatim; protocol and security
/// errors carry enough context to decide whether the association survived.
#[derive(Debug)]
pub enum Error {
    /// Caller misuse: nil descriptor, unparseable OBIS, bad settings combination.
    InvalidParameter(&'static str),
    /// The reply was well-formed but not the PDU kind this operation expects.
    InvalidResponse(&'static str),
    /// Input ended before one complete value.
    Truncated,
    /// A length prefix used more than four octets or claimed more bytes than available.
    LengthOverflow,
    /// A-XDR tag byte outside the standard table.
    UnknownTag(u8),
    /// Payload shape does not match the declared tag (e.g. bit-string byte count).
    TagMismatch,
    /// BOOLEAN payload was neither 0x00 nor 0xFF.
    InvalidBoolean(u8),
    /// Date/time sub-field outside its permitted range and not the wildcard sentinel.
    InvalidDateTime,
    /// UTF8-STRING payload was not valid UTF-8.
    InvalidUtf8,
    /// OBIS string not of the `A.B.C.D.E.F` form.
    InvalidObis,
    /// ARRAY/STRUCTURE nesting beyond the supported depth.
    NestingTooDeep,
    /// The server answered the AARQ with a non-accepted result.
    AssociationRejected {
        result: AssociationResult,
        diagnostic: SourceDiagnostic,
    },
    /// GET reply carried a data-access-result other than success.
    GetRejected(DataAccessResult),
    /// SET reply carried a data-access-result other than success.
    SetRejected(DataAccessResult),
    /// ACTION reply carried an action-result other than success.
    ActionRejected(ActionResult),
    /// A bulk set landed some writes and failed others.
    SetPartial(Box<Error>),
    /// Block transfer delivered an out-of-order or repeated block number.
    BlockSequence { expected: u32, received: u32 },
    /// GCM authentication tag did not verify. Fatal for the association.
    CipherAuthFailure,
    /// Ciphered frame reused an invocation counter. Fatal for the association.
    ReplayDetected,
    /// The underlying transport failed.
    Transport(Box<dyn std::error::Error + Send + Sync>),
    /// Operation requires an open transport.
    NotConnected,
    /// Operation requires an established association.
    NotAssociated,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidParameter(what) => write!(f, "invalid parameter: {what}"),
            Error::InvalidResponse(what) => write!(f, "invalid response: {what}"),
            Error::Truncated => write!(f, "input truncated"),
            Error::LengthOverflow => write!(f, "length prefix overflows the buffer"),
            Error::UnknownTag(tag) => write!(f, "unknown A-XDR tag 0x{tag:02X}"),
            Error::TagMismatch => write!(f, "payload does not match its tag"),
            Error::InvalidBoolean(byte) => write!(f, "invalid boolean byte 0x{byte:02X}"),
            Error::InvalidDateTime => write!(f, "date/time field out of range"),
            Error::InvalidUtf8 => write!(f, "UTF8-STRING payload is not valid UTF-8"),
            Error::InvalidObis => write!(f, "OBIS code must be six dot-separated octets"),
            Error::NestingTooDeep => write!(f, "array/structure nesting too deep"),
            Error::AssociationRejected { result, diagnostic } => {
                write!(f, "association rejected: {result} ({diagnostic})")
            }
            Error::GetRejected(code) => write!(f, "get rejected: {code}"),
            Error::SetRejected(code) => write!(f, "set rejected: {code}"),
            Error::ActionRejected(code) => write!(f, "action rejected: {code}"),
            Error::SetPartial(cause) => write!(f, "partial set: {cause}"),
            Error::BlockSequence { expected, received } => {
                write!(f, "block sequence error: expected {expected}, received {received}")
            }
            Error::CipherAuthFailure => write!(f, "cipher authentication failure"),
            Error::ReplayDetected => write!(f, "invocation counter replay detected"),
            Error::Transport(inner) => write!(f, "transport error: {inner}"),
            Error::NotConnected => write!(f, "not connected"),
            Error::NotAssociated => write!(f, "not associated"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Transport(inner) => Some(inner.as_ref()),
            Error::SetPartial(cause) => Some(cause.as_ref()),
            _ => None,
        }
    }
}

impl Error {
    /// Wrap a transport error.
    pub fn transport<E>(inner: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Transport(Box::new(inner))
    }
}
