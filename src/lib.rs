//! Message-processing core for a (D)TLS endpoint.
//!
//! This crate implements the buffer-brokerage engine (a [`Writer`]/[`Reader`]
//! pair, and their bounded-group-aware [`WriterExt`]/[`ReaderExt`] wrappers)
//! together with [`Layer3`], a state machine that sits above an abstract
//! record layer ([`RecordLayer`]) and below a handshake/application caller.
//! Layer 3 parses and emits the four (D)TLS content types -- handshake,
//! alert, change-cipher-spec and application-data -- including TLS's
//! pause/resume handling for handshake messages that span record
//! boundaries and DTLS's handshake fragmentation header.
//!
//! Record-layer cryptography, key schedule, session state, the underlying
//! transport and the handshake protocol itself are all out of scope; see
//! [`RecordLayer`] for the abstract boundary this crate is built against.

#![allow(clippy::upper_case_acronyms)]

#[macro_use]
mod log_macros;

mod codec;
mod error;
mod layer3;
mod reader;
mod record_layer;
mod writer;

pub use crate::error::Error;
pub use crate::layer3::{
    AlertIn, AlertLevel, AlertOut, AppIn, AppOut, CcsIn, CcsOut, HandshakeIn, HandshakeOut, Layer3,
    Mode,
};
pub use crate::reader::{Reader, ReaderExt};
pub use crate::record_layer::{IncomingRecord, OutgoingRecord, RecordLayer};
pub use crate::writer::{Writer, WriterExt};

/// The content types multiplexed by Layer 3, and accepted by [`RecordLayer`].
///
/// Numeric values match the TLS `ContentType` registry (RFC 8446 §B.1);
/// `Ack` is the DTLS 1.3 placeholder content type (RFC 9147 §4), currently
/// always rejected by Layer 3's reader with [`Error::InvalidContent`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ContentType {
    ChangeCipherSpec,
    Alert,
    Handshake,
    ApplicationData,
    Ack,
}

/// The four (D)TLS handshake message types this crate's header framing
/// cares about the numeric tag of; the body is opaque to Layer 3.
///
/// Only the numeric `msg_type` tag is meaningful here -- Layer 3 never
/// interprets handshake bodies, so this is a thin newtype rather than an
/// enumeration of every `HandshakeType` the full protocol defines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandshakeType(pub u8);

/// A size that may not yet be known at the time a write or read begins.
///
/// This replaces the `MBEDTLS_MPS_SIZE_UNKNOWN` sentinel pattern of the
/// source implementation with a tagged variant, per spec.md §9's own
/// recommendation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MpsSize {
    Known(u32),
    Unknown,
}

impl MpsSize {
    pub fn is_unknown(self) -> bool {
        matches!(self, MpsSize::Unknown)
    }

    pub fn known(self) -> Option<u32> {
        match self {
            MpsSize::Known(n) => Some(n),
            MpsSize::Unknown => None,
        }
    }
}

/// An opaque identifier for the cryptographic context under which a
/// record is protected. Forwarded by Layer 3 to the [`RecordLayer`]
/// without interpretation.
pub type Epoch = u64;
