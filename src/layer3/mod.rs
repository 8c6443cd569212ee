//! Layer 3: the state machine that sits above [`crate::RecordLayer`] and
//! frames the four (D)TLS content types -- handshake, alert,
//! change-cipher-spec and application-data -- onto records, including
//! TLS's implicit handshake pause/resume across record boundaries and
//! DTLS's explicit per-fragment handshake header.
//!
//! Ported from mbedtls's `mps/layer3.c`. Record-layer cryptography, the
//! key schedule, session state, and handshake protocol semantics above
//! the header are all out of scope -- this module only ever looks at the
//! four header shapes in `wire`, never at a handshake body's contents.

mod wire;

pub use wire::AlertLevel;

use crate::reader::{Reader, ReaderExt};
use crate::record_layer::{IncomingRecord, OutgoingRecord, RecordLayer};
use crate::writer::{Passthrough, Writer, WriterExt};
use crate::{ContentType, Epoch, Error, HandshakeType, MpsSize};

/// Selects TLS or DTLS framing: whether a handshake message can pause and
/// resume implicitly across records (TLS), or is instead split into
/// explicitly headered fragments the caller manages (DTLS).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Tls,
    Dtls,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OutState {
    None,
    Hs,
    Alert,
    Ccs,
    App,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HsState {
    None,
    Active,
    Paused,
}

struct HsOut {
    state: HsState,
    epoch: Epoch,
    msg_type: HandshakeType,
    len: MpsSize,
    message_seq: u16,
    fragment_offset: u32,
    fragment_length: MpsSize,
    hdr_len: usize,
    hdr_pending: bool,
    body: WriterExt,
}

impl HsOut {
    fn new() -> Self {
        HsOut {
            state: HsState::None,
            epoch: 0,
            msg_type: HandshakeType(0),
            len: MpsSize::Unknown,
            message_seq: 0,
            fragment_offset: 0,
            fragment_length: MpsSize::Unknown,
            hdr_len: 0,
            hdr_pending: false,
            body: WriterExt::new(MpsSize::Unknown),
        }
    }
}

#[derive(Default)]
struct Out {
    raw: Option<Writer>,
}

struct HsIn {
    state: HsState,
    epoch: Epoch,
    msg_type: HandshakeType,
    len: u32,
    message_seq: u16,
    fragment_offset: u32,
    fragment_length: u32,
    body: ReaderExt,
}

impl HsIn {
    fn new() -> Self {
        HsIn {
            state: HsState::None,
            epoch: 0,
            msg_type: HandshakeType(0),
            len: 0,
            message_seq: 0,
            fragment_offset: 0,
            fragment_length: 0,
            body: ReaderExt::new(MpsSize::Unknown),
        }
    }
}

#[derive(Default)]
struct In {
    raw: Option<Reader>,
    pending_alert: Option<(AlertLevel, u8)>,
}

/// Parameters for starting (or resuming) an outgoing handshake message.
/// `message_seq`/`fragment_offset`/`fragment_length` only apply in DTLS
/// mode and are ignored in TLS mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandshakeOut {
    pub epoch: Epoch,
    pub msg_type: HandshakeType,
    pub len: MpsSize,
    pub message_seq: u16,
    pub fragment_offset: u32,
    pub fragment_length: MpsSize,
}

/// The metadata of an incoming handshake message, together with the
/// length-bounded reader its body can be read from.
pub struct HandshakeIn<'a> {
    pub epoch: Epoch,
    pub msg_type: HandshakeType,
    pub len: u32,
    pub message_seq: u16,
    pub fragment_offset: u32,
    pub fragment_length: u32,
    pub body: &'a mut ReaderExt,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AlertOut {
    pub epoch: Epoch,
    pub level: AlertLevel,
    pub description: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AlertIn {
    pub level: AlertLevel,
    pub description: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CcsOut {
    pub epoch: Epoch,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CcsIn {
    pub epoch: Epoch,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AppOut {
    pub epoch: Epoch,
}

pub struct AppIn<'a> {
    pub epoch: Epoch,
    pub reader: &'a mut Reader,
}

/// The content-framing state machine. One `Layer3` is shared by both
/// directions of a connection; each public method takes the
/// [`RecordLayer`] it should drive as an explicit parameter rather than
/// storing one, matching how `MessageDeframer::pop` in the crate this is
/// built on takes its record layer per call.
pub struct Layer3 {
    mode: Mode,
    out_state: OutState,
    out: Out,
    hs_out: HsOut,
    in_content_type: Option<ContentType>,
    in_epoch: Epoch,
    in_: In,
    hs_in: HsIn,
}

impl Layer3 {
    pub fn new(mode: Mode) -> Self {
        Layer3 {
            mode,
            out_state: OutState::None,
            out: Out::default(),
            hs_out: HsOut::new(),
            in_content_type: None,
            in_epoch: 0,
            in_: In::default(),
            hs_in: HsIn::new(),
        }
    }

    fn check_interleaving(&self) -> Result<(), Error> {
        if self.hs_out.state == HsState::Paused {
            return Err(Error::NoInterleaving);
        }
        Ok(())
    }

    fn hs_hdr_len(&self) -> usize {
        match self.mode {
            Mode::Tls => wire::TLS_HS_HDR_LEN,
            Mode::Dtls => wire::DTLS_HS_HDR_LEN,
        }
    }

    /// `total_len`/`frag_len` are the header's `len`/`fragment_length`
    /// fields, resolved by the caller -- either the values the caller
    /// originally supplied (if known up front) or the body's actual
    /// committed length (if discovered only at dispatch time). The two
    /// resolve independently: a DTLS message can have its total length
    /// known in advance while its fragment length is only pinned down at
    /// dispatch, or vice versa.
    fn write_hs_header(&self, hdr_bytes: &mut [u8], total_len: u32, frag_len: u32) {
        match self.mode {
            Mode::Tls => wire::TlsHsHeader {
                msg_type: self.hs_out.msg_type,
                len: total_len,
            }
            .write(hdr_bytes),
            Mode::Dtls => wire::DtlsHsHeader {
                msg_type: self.hs_out.msg_type,
                len: total_len,
                message_seq: self.hs_out.message_seq,
                fragment_offset: self.hs_out.fragment_offset,
                fragment_length: frag_len,
            }
            .write(hdr_bytes),
        }
    }

    /// Whether enough of the header's fields are known at
    /// `write_handshake` time to write it immediately: the total length
    /// for TLS, or both the total and fragment lengths for DTLS (the
    /// DTLS header encodes both).
    fn hs_header_ready(&self, req: &HandshakeOut) -> bool {
        match self.mode {
            Mode::Tls => req.len.known().is_some(),
            Mode::Dtls => req.len.known().is_some() && req.fragment_length.known().is_some(),
        }
    }

    /// Starts writing a new handshake message, or resumes one paused by
    /// [`Layer3::pause_handshake`] (TLS only; the resuming call must
    /// supply the exact same `epoch`/`msg_type`/`len`). Returns the
    /// length-bounded extended writer the caller serialises the message
    /// body into.
    pub fn write_handshake(
        &mut self,
        rl: &mut impl RecordLayer,
        req: HandshakeOut,
    ) -> Result<&mut WriterExt, Error> {
        if self.out_state != OutState::None {
            return Err(Error::OperationUnexpected);
        }

        let resuming = self.hs_out.state == HsState::Paused;
        if resuming {
            if self.mode != Mode::Tls
                || self.hs_out.epoch != req.epoch
                || self.hs_out.msg_type != req.msg_type
                || self.hs_out.len != req.len
            {
                return Err(Error::InvalidArgs);
            }
        } else if self.hs_out.state != HsState::None {
            return Err(Error::OperationUnexpected);
        }

        let bound = match self.mode {
            Mode::Tls => req.len,
            Mode::Dtls => req.fragment_length,
        };

        let record = rl.write_start(ContentType::Handshake, req.epoch)?;
        let mut writer = record.writer;
        let hdr_len = self.hs_hdr_len();

        if !resuming {
            match writer.get(hdr_len, false) {
                Ok(_) => {}
                Err(Error::OutOfData) => {
                    rl.write_done(OutgoingRecord { writer })?;
                    return Err(Error::Retry);
                }
                Err(e) => return Err(e),
            }

            if self.mode == Mode::Dtls {
                if req.len.is_unknown() {
                    // If the total length isn't specified, then the
                    // fragment offset must be 0 and the fragment length
                    // must be unspecified too.
                    if req.fragment_offset != 0 || !req.fragment_length.is_unknown() {
                        return Err(Error::InvalidArg);
                    }
                } else if let (Some(total_len), Some(frag_len)) =
                    (req.len.known(), req.fragment_length.known())
                {
                    if req
                        .fragment_offset
                        .checked_add(frag_len)
                        .map_or(true, |end| end > total_len)
                    {
                        return Err(Error::InvalidArg);
                    }
                }
            }

            self.hs_out.hdr_len = hdr_len;
            self.hs_out.epoch = req.epoch;
            self.hs_out.msg_type = req.msg_type;
            self.hs_out.len = req.len;
            self.hs_out.message_seq = req.message_seq;
            self.hs_out.fragment_offset = req.fragment_offset;
            self.hs_out.fragment_length = req.fragment_length;

            if self.hs_header_ready(&req) {
                let known_len = req.len.known().expect("hs_header_ready implies len known");
                let frag_len = req.fragment_length.known().unwrap_or(known_len);
                let hdr_bytes = writer.header_slot(hdr_len);
                self.write_hs_header(hdr_bytes, known_len, frag_len);
                self.hs_out.hdr_pending = false;
            } else {
                self.hs_out.hdr_pending = true;
            }

            self.hs_out.body = WriterExt::new(bound);
        }

        let passthrough = if bound.is_unknown() {
            Passthrough::Hold
        } else {
            Passthrough::Pass
        };
        self.hs_out.body.attach(writer, passthrough)?;
        self.hs_out.state = HsState::Active;
        self.out_state = OutState::Hs;

        Ok(&mut self.hs_out.body)
    }

    /// Detaches the handshake body's writer, flushes the record it was
    /// attached to, and marks the message paused. Only valid in TLS mode,
    /// and only once the message's total length is known.
    pub fn pause_handshake(&mut self, rl: &mut impl RecordLayer) -> Result<(), Error> {
        if self.mode != Mode::Tls {
            return Err(Error::OperationUnexpected);
        }
        if self.out_state != OutState::Hs {
            return Err(Error::OperationUnexpected);
        }
        if self.hs_out.len.is_unknown() {
            return Err(Error::OperationUnexpected);
        }

        let (mut writer, _committed, _uncommitted) = self.hs_out.body.detach()?;
        writer.commit()?;
        rl.write_done(OutgoingRecord { writer })?;
        self.hs_out.state = HsState::Paused;
        self.out_state = OutState::None;
        trace!("layer3: paused outgoing handshake message type {:?}", self.hs_out.msg_type);
        Ok(())
    }

    /// Abandons a handshake message before any of its bytes have been
    /// committed. Used for error recovery; a partially-committed message
    /// can't be taken back once bytes have left the writer.
    pub fn abort_handshake(&mut self, rl: &mut impl RecordLayer) -> Result<(), Error> {
        if self.out_state != OutState::Hs {
            return Err(Error::OperationUnexpected);
        }
        let (writer, committed, _uncommitted) = self.hs_out.body.detach()?;
        if committed != 0 {
            return Err(Error::OperationUnexpected);
        }
        rl.write_done(OutgoingRecord { writer })?;
        self.out_state = OutState::None;
        self.hs_out.state = HsState::None;
        Ok(())
    }

    pub fn write_app(&mut self, rl: &mut impl RecordLayer, req: AppOut) -> Result<&mut Writer, Error> {
        if self.out_state != OutState::None {
            return Err(Error::OperationUnexpected);
        }
        self.check_interleaving()?;
        let record = rl.write_start(ContentType::ApplicationData, req.epoch)?;
        self.out.raw = Some(record.writer);
        self.out_state = OutState::App;
        Ok(self.out.raw.as_mut().expect("just stored"))
    }

    pub fn write_alert(&mut self, rl: &mut impl RecordLayer, req: AlertOut) -> Result<(), Error> {
        if self.out_state != OutState::None {
            return Err(Error::OperationUnexpected);
        }
        self.check_interleaving()?;
        let record = rl.write_start(ContentType::Alert, req.epoch)?;
        let mut writer = record.writer;
        let got = writer.get(wire::ALERT_LEN, false);
        let (buf, _) = match got {
            Ok(v) => v,
            Err(Error::OutOfData) => {
                rl.write_done(OutgoingRecord { writer })?;
                return Err(Error::Retry);
            }
            Err(e) => return Err(e),
        };
        buf[0] = req.level as u8;
        buf[1] = req.description;
        writer.commit()?;
        self.out.raw = Some(writer);
        self.out_state = OutState::Alert;
        Ok(())
    }

    pub fn write_ccs(&mut self, rl: &mut impl RecordLayer, req: CcsOut) -> Result<(), Error> {
        if self.out_state != OutState::None {
            return Err(Error::OperationUnexpected);
        }
        self.check_interleaving()?;
        let record = rl.write_start(ContentType::ChangeCipherSpec, req.epoch)?;
        let mut writer = record.writer;
        let got = writer.get(wire::CCS_LEN, false);
        let (buf, _) = match got {
            Ok(v) => v,
            Err(Error::OutOfData) => {
                rl.write_done(OutgoingRecord { writer })?;
                return Err(Error::Retry);
            }
            Err(e) => return Err(e),
        };
        buf[0] = wire::CCS_VALUE;
        writer.commit()?;
        self.out.raw = Some(writer);
        self.out_state = OutState::Ccs;
        Ok(())
    }

    /// Finishes the currently open outgoing message: fills in a handshake
    /// header that was deferred because its length(s) weren't known up
    /// front, commits everything written so far minus whatever the last
    /// `commit_partial_ext` call omitted, and hands the record back to
    /// the record layer.
    pub fn dispatch(&mut self, rl: &mut impl RecordLayer) -> Result<(), Error> {
        match self.out_state {
            OutState::None => Err(Error::OperationUnexpected),
            OutState::Hs => {
                self.hs_out.body.check_done()?;
                let (mut writer, committed, uncommitted) = self.hs_out.body.detach()?;

                if self.hs_out.hdr_pending {
                    // Whichever length(s) weren't known at write_handshake
                    // time are now pinned down by how much the consumer
                    // actually committed.
                    let final_total = self.hs_out.len.known().unwrap_or(committed as u32);
                    let final_frag = self.hs_out.fragment_length.known().unwrap_or(committed as u32);
                    let hdr_len = self.hs_out.hdr_len;
                    let hdr_bytes = writer.header_slot(hdr_len);
                    self.write_hs_header(hdr_bytes, final_total, final_frag);
                    self.hs_out.hdr_pending = false;
                }

                writer.commit_partial(uncommitted)?;
                rl.write_done(OutgoingRecord { writer })?;
                self.out_state = OutState::None;
                self.hs_out.state = HsState::None;
                debug!("layer3: dispatched handshake message type {:?}, {} bytes", self.hs_out.msg_type, committed);
                Ok(())
            }
            OutState::Alert | OutState::Ccs | OutState::App => {
                let writer = self.out.raw.take().ok_or(Error::Internal)?;
                rl.write_done(OutgoingRecord { writer })?;
                trace!("layer3: dispatched outgoing {:?}", self.out_state);
                self.out_state = OutState::None;
                Ok(())
            }
        }
    }

    /// Forces any records the record layer is still holding onto the
    /// transport.
    pub fn flush(&mut self, rl: &mut impl RecordLayer) -> Result<(), Error> {
        rl.write_flush()
    }

    /// Advances to the next incoming message, or returns the content type
    /// of one already in progress. A handshake message paused across a
    /// record boundary resumes transparently here.
    pub fn read(&mut self, rl: &mut impl RecordLayer) -> Result<ContentType, Error> {
        if let Some(ct) = self.in_content_type {
            return Ok(ct);
        }

        if self.hs_in.state == HsState::Paused {
            let record = rl.read_start()?;
            if record.content_type != ContentType::Handshake {
                rl.read_done(record)?;
                return Err(Error::NoInterleaving);
            }
            self.hs_in.epoch = record.epoch;
            self.hs_in.body.attach(record.reader)?;
            self.hs_in.state = HsState::Active;
            self.in_content_type = Some(ContentType::Handshake);
            return Ok(ContentType::Handshake);
        }

        let mut record = rl.read_start()?;
        self.in_epoch = record.epoch;

        match record.content_type {
            ContentType::Handshake => {
                let hdr_len = self.hs_hdr_len();
                let (msg_type, len, message_seq, fragment_offset, fragment_length) = {
                    let (hdr, _) = match record.reader.get(hdr_len, false) {
                        Ok(got) => got,
                        Err(Error::OutOfData) => {
                            return match self.mode {
                                Mode::Dtls => Err(Error::InvalidContent),
                                Mode::Tls => {
                                    rl.read_done(record)?;
                                    Err(Error::Retry)
                                }
                            };
                        }
                        Err(_) => return Err(Error::InvalidContent),
                    };
                    match self.mode {
                        Mode::Tls => {
                            let h = wire::TlsHsHeader::parse(hdr);
                            (h.msg_type, h.len, 0u16, 0u32, h.len)
                        }
                        Mode::Dtls => {
                            let h = wire::DtlsHsHeader::parse(hdr);
                            if h.fragment_offset
                                .checked_add(h.fragment_length)
                                .map_or(true, |end| end > h.len)
                            {
                                return Err(Error::InvalidContent);
                            }
                            (h.msg_type, h.len, h.message_seq, h.fragment_offset, h.fragment_length)
                        }
                    }
                };
                record.reader.commit()?;

                self.hs_in.epoch = record.epoch;
                self.hs_in.msg_type = msg_type;
                self.hs_in.len = len;
                self.hs_in.message_seq = message_seq;
                self.hs_in.fragment_offset = fragment_offset;
                self.hs_in.fragment_length = fragment_length;
                self.hs_in.body = ReaderExt::new(MpsSize::Known(fragment_length));
                self.hs_in.body.attach(record.reader)?;
                self.hs_in.state = HsState::Active;
                self.in_content_type = Some(ContentType::Handshake);
                trace!("layer3: incoming handshake header type={:?} len={}", msg_type, len);
            }
            ContentType::Alert => {
                let (buf, _) = match record.reader.get(wire::ALERT_LEN, false) {
                    Ok(got) => got,
                    Err(Error::OutOfData) => {
                        return match self.mode {
                            Mode::Dtls => Err(Error::InvalidContent),
                            Mode::Tls => {
                                rl.read_done(record)?;
                                Err(Error::Retry)
                            }
                        };
                    }
                    Err(_) => return Err(Error::InvalidContent),
                };
                let level = wire::AlertLevel::from_u8(buf[0]).ok_or(Error::InvalidContent)?;
                let description = buf[1];
                record.reader.commit()?;
                record.reader.reclaim()?;
                self.in_.pending_alert = Some((level, description));
                rl.read_done(record)?;
                self.in_content_type = Some(ContentType::Alert);
            }
            ContentType::ChangeCipherSpec => {
                let (buf, _) = record
                    .reader
                    .get(wire::CCS_LEN, false)
                    .map_err(|_| Error::InvalidContent)?;
                if buf[0] != wire::CCS_VALUE {
                    return Err(Error::InvalidContent);
                }
                record.reader.commit()?;
                record.reader.reclaim()?;
                rl.read_done(record)?;
                self.in_content_type = Some(ContentType::ChangeCipherSpec);
            }
            ContentType::ApplicationData => {
                self.in_.raw = Some(record.reader);
                self.in_content_type = Some(ContentType::ApplicationData);
            }
            ContentType::Ack => return Err(Error::InvalidContent),
        }

        Ok(self.in_content_type.expect("set above"))
    }

    pub fn read_handshake(&mut self) -> Result<HandshakeIn<'_>, Error> {
        if self.in_content_type != Some(ContentType::Handshake) {
            return Err(Error::OperationUnexpected);
        }
        Ok(HandshakeIn {
            epoch: self.hs_in.epoch,
            msg_type: self.hs_in.msg_type,
            len: self.hs_in.len,
            message_seq: self.hs_in.message_seq,
            fragment_offset: self.hs_in.fragment_offset,
            fragment_length: self.hs_in.fragment_length,
            body: &mut self.hs_in.body,
        })
    }

    pub fn read_alert(&self) -> Result<AlertIn, Error> {
        if self.in_content_type != Some(ContentType::Alert) {
            return Err(Error::OperationUnexpected);
        }
        let (level, description) = self.in_.pending_alert.ok_or(Error::Internal)?;
        Ok(AlertIn { level, description })
    }

    pub fn read_ccs(&self) -> Result<CcsIn, Error> {
        if self.in_content_type != Some(ContentType::ChangeCipherSpec) {
            return Err(Error::OperationUnexpected);
        }
        Ok(CcsIn { epoch: self.in_epoch })
    }

    pub fn read_app(&mut self) -> Result<AppIn<'_>, Error> {
        if self.in_content_type != Some(ContentType::ApplicationData) {
            return Err(Error::OperationUnexpected);
        }
        Ok(AppIn {
            epoch: self.in_epoch,
            reader: self.in_.raw.as_mut().ok_or(Error::Internal)?,
        })
    }

    /// Pauses the currently-open incoming handshake message across a
    /// record boundary (TLS only): flushes the record back to the record
    /// layer and remembers where reading left off, to resume
    /// transparently on the next [`Layer3::read`].
    pub fn read_pause_handshake(&mut self, rl: &mut impl RecordLayer) -> Result<(), Error> {
        if self.mode != Mode::Tls {
            return Err(Error::OperationUnexpected);
        }
        if self.in_content_type != Some(ContentType::Handshake) {
            return Err(Error::OperationUnexpected);
        }
        let mut reader = self.hs_in.body.detach()?;
        reader.reclaim()?;
        rl.read_done(IncomingRecord {
            content_type: ContentType::Handshake,
            epoch: self.hs_in.epoch,
            reader,
        })?;
        self.hs_in.state = HsState::Paused;
        self.in_content_type = None;
        trace!("layer3: paused incoming handshake message at epoch {}", self.hs_in.epoch);
        Ok(())
    }

    /// Finishes consuming the currently open incoming message: for a
    /// handshake message this requires its full declared length to have
    /// been read.
    pub fn read_consume(&mut self, rl: &mut impl RecordLayer) -> Result<(), Error> {
        match self.in_content_type.ok_or(Error::OperationUnexpected)? {
            ContentType::Handshake => {
                self.hs_in.body.check_done()?;
                let mut reader = self.hs_in.body.detach()?;
                reader.reclaim()?;
                rl.read_done(IncomingRecord {
                    content_type: ContentType::Handshake,
                    epoch: self.hs_in.epoch,
                    reader,
                })?;
                self.hs_in.state = HsState::None;
                self.in_content_type = None;
            }
            ContentType::Alert | ContentType::ChangeCipherSpec => {
                self.in_content_type = None;
            }
            ContentType::ApplicationData => {
                let mut reader = self.in_.raw.take().ok_or(Error::Internal)?;
                reader.reclaim()?;
                rl.read_done(IncomingRecord {
                    content_type: ContentType::ApplicationData,
                    epoch: self.in_epoch,
                    reader,
                })?;
                self.in_content_type = None;
            }
            ContentType::Ack => return Err(Error::InvalidContent),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
