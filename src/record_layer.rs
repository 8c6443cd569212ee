//! The abstract boundary below Layer 3: a collaborator that turns
//! transport datagrams/streams into decrypted records and back. Its
//! implementation -- record-layer cryptography, sequence numbers, replay
//! windows, the key schedule -- is entirely out of scope for this crate;
//! [`RecordLayer`] is the seam Layer 3 is built against, the Rust
//! expression of mbedtls's `mps_l2` collaborator.

use crate::{ContentType, Epoch, Error, Reader, Writer};

/// An incoming record, already decrypted and handed to Layer 3 for
/// content-type dispatch.
pub struct IncomingRecord {
    pub content_type: ContentType,
    pub epoch: Epoch,
    pub reader: Reader,
}

/// An outgoing record in progress. Layer 3 writes a message's bytes into
/// `writer` and hands it back via [`RecordLayer::write_done`] still in
/// consuming state, fully committed -- the implementation is responsible
/// for reclaiming it (recovering the transport buffer to dispatch and,
/// for a real implementation, the queue to carry into the next cycle).
pub struct OutgoingRecord {
    pub writer: Writer,
}

/// The record layer collaborator Layer 3 is built against.
///
/// A real implementation multiplexes this onto a transport (TCP for TLS,
/// UDP for DTLS), handling record headers, padding, and AEAD
/// encryption/decryption; for testing, an in-memory fake is enough to
/// drive Layer 3 through every framing scenario it needs to handle.
pub trait RecordLayer {
    /// Begins consuming the next incoming record. Returns
    /// [`Error::Retry`] if no record is currently available and the
    /// caller should try again once more transport data has arrived.
    fn read_start(&mut self) -> Result<IncomingRecord, Error>;

    /// Signals that Layer 3 is done with the record's reader (it has been
    /// fully consumed, or partially consumed with the remainder parked in
    /// an accumulator by a paused handshake read).
    fn read_done(&mut self, record: IncomingRecord) -> Result<(), Error>;

    /// Begins a new outgoing record for `content_type` under `epoch`.
    /// Returns [`Error::Retry`] if no record is currently available (e.g.
    /// the previous one is still being flushed) and the caller should
    /// retry after [`RecordLayer::write_flush`].
    fn write_start(&mut self, content_type: ContentType, epoch: Epoch) -> Result<OutgoingRecord, Error>;

    /// Hands a completed (or deliberately short) record back for
    /// dispatch onto the transport.
    fn write_done(&mut self, record: OutgoingRecord) -> Result<(), Error>;

    /// Forces any buffered outgoing records onto the transport.
    fn write_flush(&mut self) -> Result<(), Error>;
}
