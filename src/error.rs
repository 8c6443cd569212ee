use std::fmt;

/// Every error this crate can return.
///
/// Variants partition into the three kinds spec.md §7 describes. The
/// grouping below is documentation only -- there is deliberately one flat
/// enum, not a hierarchy of per-subsystem error types, matching how
/// rustls's own `Error` is a single enum rather than nested error types
/// per module.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    // --- Expected flow-control signals: non-fatal, caller retries or
    // supplies more data. Object state remains well-defined.
    /// A `Writer::reclaim` found unconsumed space in the output buffer
    /// and `force` was not set.
    DataLeft,
    /// A `Writer::feed` found the provided buffer fully absorbed by
    /// previously queued data; the caller must dispatch it and feed a
    /// fresh buffer before more can be written.
    NeedMore,
    /// A `Writer`/`Reader` `get` could not serve the exact amount
    /// requested and the caller demanded an exact-size buffer.
    OutOfData,
    /// Layer 3 could not acquire or continue a write because the
    /// underlying record is full; the caller must retry the same logical
    /// write after the record layer has drained the pending record.
    Retry,

    // --- Programming errors: caller misused the state machine. Object
    // state is unchanged and remains usable.
    /// An operation was invoked while the object was in a state that
    /// does not support it (e.g. `get` on a providing-state `Writer`).
    OperationUnexpected,
    /// An argument violated a documented precondition (e.g. `omit`
    /// larger than the uncommitted region).
    InvalidArg,
    /// `write_handshake` was called to resume a paused message with
    /// parameters that don't match the paused one.
    InvalidArgs,
    /// A `WriterExt`/`ReaderExt` operation would read or write outside
    /// the bounds of the current group.
    BoundsViolation,
    /// `group_open` was called while already nested to the maximum
    /// supported depth.
    TooManyGroups,
    /// An outgoing non-handshake message was attempted while a handshake
    /// message is paused, and interleaving is disabled.
    NoInterleaving,

    // --- Protocol / integrity errors: peer sent malformed data, or an
    // internal invariant was violated. Object state afterwards is
    // unspecified; the object must not be used again.
    /// A handshake message was closed (`dispatch`/`consume`) before all
    /// of its declared length was written or read.
    UnfinishedHandshakeMessage,
    /// Incoming wire data violated a content-type-specific invariant
    /// (bad alert level, bad CCS value, DTLS fragment bounds overflow,
    /// or any record the record layer reported as truncated in DTLS
    /// mode, where there is no re-aggregation across records).
    InvalidContent,
    /// An internal invariant was violated; this should be unreachable in
    /// a correct implementation and indicates a bug rather than
    /// something a caller or peer did.
    Internal,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::DataLeft => "writer has uncommitted space left and force was not set",
            Error::NeedMore => "fed buffer was entirely absorbed by queued data",
            Error::OutOfData => "not enough data available to serve the request",
            Error::Retry => "operation must be retried once the record layer makes progress",
            Error::OperationUnexpected => "operation is not valid in the current state",
            Error::InvalidArg => "argument violates a precondition of this operation",
            Error::InvalidArgs => "resumed write parameters don't match the paused message",
            Error::BoundsViolation => "operation would cross a group or message boundary",
            Error::TooManyGroups => "maximum group nesting depth exceeded",
            Error::NoInterleaving => "cannot interleave a message while a handshake is paused",
            Error::UnfinishedHandshakeMessage => {
                "handshake message closed before it was fully written or read"
            }
            Error::InvalidContent => "incoming data violates the wire format for its content type",
            Error::Internal => "internal invariant violation",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for Error {}
