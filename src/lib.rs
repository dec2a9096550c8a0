//! DLMS/COSEM application-layer client.
//!
//! This crate speaks the DLMS/COSEM protocol used by electricity, gas and
//! water meters: it opens an association with a remote meter over a
//! caller-supplied byte transport, negotiates authentication and optional
//! GCM protection, and performs attribute-level GET and SET operations plus
//! method invocations against COSEM objects addressed by class, OBIS
//! instance and attribute index.
//!
//! The building blocks, leaves first:
//!
//! - [`axdr`]: the A-XDR codec for the tagged value tree carried in every
//!   payload
//! - [`obis_code`], [`get`], [`set`], [`action`], [`selective_access`]:
//!   addressing and the service PDU codecs
//! - [`security`]: AES-128-GCM wrap/unwrap of glo- ciphered APDUs
//! - [`association`]: AARQ/AARE and RLRQ/RLRE handling
//! - [`client`]: the blocking session tying it all together
//!
//! # Example
//!
//! ```no_run
//! use dlms_client::{AttributeDescriptor, Client, ObisCode, Settings, Transport};
//!
//! # #[derive(Debug)]
//! # struct MyTransport;
//! # #[derive(Debug)]
//! # struct MyError;
//! # impl std::fmt::Display for MyError {
//! #     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//! #         f.write_str("transport error")
//! #     }
//! # }
//! # impl std::error::Error for MyError {}
//! # impl Transport for MyTransport {
//! #     type Error = MyError;
//! #     fn connect(&mut self) -> Result<(), MyError> { Ok(()) }
//! #     fn disconnect(&mut self) -> Result<(), MyError> { Ok(()) }
//! #     fn send(&mut self, _request: &[u8]) -> Result<Vec<u8>, MyError> { Ok(Vec::new()) }
//! # }
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::new(Settings::without_authentication(), MyTransport);
//! client.connect()?;
//! client.associate()?;
//!
//! // Total active energy import, Register.value
//! let energy = AttributeDescriptor::new(3, "1.0.1.8.0.255".parse::<ObisCode>()?, 2);
//! let value = client.get(&energy, None)?;
//! println!("1.0.1.8.0.255 = {value:?}");
//!
//! client.release()?;
//! client.disconnect()?;
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod association;
pub mod axdr;
pub mod client;
pub mod error;
pub mod get;
pub mod obis_code;
pub mod security;
pub mod selective_access;
pub mod set;
pub mod settings;
pub mod transport;

pub use action::{ActionResult, MethodDescriptor};
pub use association::{AssociationResult, Authentication, Conformance, SourceDiagnostic};
pub use axdr::{Data, Date, DateTime, Time};
pub use client::{Association, Client};
pub use error::{Error, Result};
pub use get::{AttributeDescriptor, DataAccessResult};
pub use obis_code::ObisCode;
pub use security::SecurityControl;
pub use selective_access::SelectiveAccess;
pub use settings::{Ciphering, Settings};
pub use transport::Transport;
