//! Asynchronous JDWP wire client.
//!
//! `argus-wire` speaks the JDWP binary protocol over TCP: the 14-byte
//! handshake, 11-byte packet framing, request/reply correlation, and
//! dispatch of unsolicited composite event packets. Payload layouts are not
//! hardcoded; they are driven by a protocol schema parsed by `argus-spec`,
//! so commands are invoked by name and arguments travel as dynamic
//! [`Value`] records.
//!
//! ```no_run
//! # async fn demo() -> argus_wire::Result<()> {
//! use argus_wire::{JdwpClient, Record, Value};
//!
//! let schema = std::fs::read_to_string("jdwp.spec").unwrap();
//! let spec = argus_spec::Spec::parse(&schema)?;
//! let client = JdwpClient::connect("127.0.0.1:5005".parse().unwrap(), spec).await?;
//!
//! let mut request = Record::new();
//! request.insert("thread".to_string(), Value::Id(0x42));
//! let reply = client.invoke("ThreadReference", "Name", &request).await?;
//! # Ok(())
//! # }
//! ```

mod poison;

pub mod client;
pub mod codec;
pub mod error_table;
#[cfg(any(test, feature = "wire-test-support"))]
pub mod mock;
pub mod types;

use std::io;

use thiserror::Error;

pub use client::{CallbackId, JdwpClient, JdwpClientConfig};
pub use codec::{DecodeError, EncodeError, EVENT_MAGIC, HANDSHAKE, HEADER_LEN};
pub use types::{IdSizes, Location, Record, Value};

#[derive(Debug, Error)]
pub enum JdwpError {
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    /// Nonzero error code in a reply packet, resolved against the protocol's
    /// fixed error table.
    #[error("JDWP error {code} ({name}): {description}")]
    Remote {
        code: u16,
        name: &'static str,
        description: &'static str,
    },
    #[error("request timed out")]
    Timeout,
    #[error("client is shut down")]
    Cancelled,
    #[error("connection closed")]
    ConnectionClosed,
    #[error("identifier sizes have not been negotiated yet")]
    IdSizesUnavailable,
    #[error(transparent)]
    Spec(#[from] argus_spec::ParseError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl JdwpError {
    pub fn remote(code: u16) -> Self {
        let (name, description) =
            error_table::lookup(code).unwrap_or(("UNKNOWN", "Unrecognized error code."));
        JdwpError::Remote {
            code,
            name,
            description,
        }
    }
}

pub type Result<T> = std::result::Result<T, JdwpError>;
