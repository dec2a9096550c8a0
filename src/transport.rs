//! The byte transport contract this client consumes.
//!
//! Framing (HDLC, wrapper, TCP length prefix) is the transport's concern:
//! one `send` call carries exactly one request APDU and must return exactly
//! one complete response APDU.

/// A caller-supplied request/response byte transport.
pub trait Transport {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open the underlying connection.
    fn connect(&mut self) -> Result<(), Self::Error>;

    /// Close the underlying connection.
    fn disconnect(&mut self) -> Result<(), Self::Error>;

    /// Send one request APDU and block until its complete response APDU
    /// arrives or the transport's timeout expires.
    fn send(&mut self, request: &[u8]) -> Result<Vec<u8>, Self::Error>;
}
