//! Exercises [`Layer3`] end to end against an in-memory [`RecordLayer`]
//! fake, in the spirit of `deframer.rs`'s own scenario-based test module:
//! concrete byte sequences pushed through the state machine, not
//! generated ones.

use std::collections::VecDeque;

use super::*;
use crate::writer::Writer;

/// A `RecordLayer` that keeps its writer/reader (and their queue /
/// accumulator) alive across calls, the way a real record layer would,
/// and lets a test push raw incoming record payloads and inspect
/// dispatched outgoing ones.
struct FakeRecordLayer {
    out_buf_size: usize,
    out_writer: Option<Writer>,
    dispatched: Vec<(ContentType, Epoch, Vec<u8>)>,

    in_buf_size: usize,
    in_reader: Option<Reader>,
    incoming: VecDeque<(ContentType, Epoch, Vec<u8>)>,
}

impl FakeRecordLayer {
    fn new(out_buf_size: usize, in_buf_size: usize) -> Self {
        FakeRecordLayer {
            out_buf_size,
            out_writer: Some(Writer::new(Some(vec![0u8; out_buf_size * 4]))),
            dispatched: Vec::new(),
            in_buf_size,
            in_reader: Some(Reader::new(Some(vec![0u8; in_buf_size * 4]))),
            incoming: VecDeque::new(),
        }
    }

    fn push_incoming(&mut self, content_type: ContentType, epoch: Epoch, data: &[u8]) {
        self.incoming.push_back((content_type, epoch, data.to_vec()));
    }

    /// The last outgoing record's content type and payload.
    fn last_dispatched(&self) -> &(ContentType, Epoch, Vec<u8>) {
        self.dispatched.last().expect("no record dispatched yet")
    }
}

impl RecordLayer for FakeRecordLayer {
    fn read_start(&mut self) -> Result<IncomingRecord, Error> {
        let (content_type, epoch, data) = self.incoming.pop_front().ok_or(Error::Retry)?;
        let mut reader = self.in_reader.take().expect("reader is always returned via read_done");
        // Incoming records are delivered to the transport in chunks of
        // `in_buf_size` to exercise both the non-fragmented and
        // accumulator-spanning paths with the same fake.
        let mut chunks = data.chunks(self.in_buf_size.max(1));
        let first = chunks.next().unwrap_or(&[]).to_vec();
        for rest in chunks {
            self.incoming
                .push_front((content_type, epoch, rest.to_vec()));
        }
        reader.feed(first)?;
        Ok(IncomingRecord {
            content_type,
            epoch,
            reader,
        })
    }

    fn read_done(&mut self, record: IncomingRecord) -> Result<(), Error> {
        self.in_reader = Some(record.reader);
        Ok(())
    }

    fn write_start(&mut self, content_type: ContentType, epoch: Epoch) -> Result<OutgoingRecord, Error> {
        let mut writer = self.out_writer.take().expect("writer is always returned via write_done");
        match writer.feed(vec![0u8; self.out_buf_size]) {
            Ok(()) => {}
            Err(Error::NeedMore) => {
                // The queue alone filled this buffer; dispatch it (as a
                // continuation of whatever was last written) and feed a
                // fresh one.
                self.out_writer = Some(writer);
                self.flush_one()?;
                writer = self.out_writer.take().expect("just stored");
                writer.feed(vec![0u8; self.out_buf_size])?;
            }
            Err(e) => return Err(e),
        }
        let _ = (content_type, epoch);
        Ok(OutgoingRecord { writer })
    }

    fn write_done(&mut self, record: OutgoingRecord) -> Result<(), Error> {
        self.out_writer = Some(record.writer);
        Ok(())
    }

    fn write_flush(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

impl FakeRecordLayer {
    fn flush_one(&mut self) -> Result<(), Error> {
        let mut writer = self.out_writer.take().expect("just stored");
        let outcome = writer.reclaim(true)?;
        self.dispatched
            .push((ContentType::Handshake, 0, outcome.buf[..outcome.written].to_vec()));
        self.out_writer = Some(writer);
        Ok(())
    }
}

/// Every write test needs the record's content dispatched, which in this
/// fake only happens when `write_done` is followed by an explicit drain
/// (since `write_start`/`write_done` alone just cycle the writer through
/// a buffer, exactly as Layer 3 would see on a real connection with
/// multiple records in flight). `drain` performs that step, tagging the
/// dispatched bytes with the content type/epoch Layer 3 asked for.
impl FakeRecordLayer {
    fn drain(&mut self, content_type: ContentType, epoch: Epoch) {
        let mut writer = self.out_writer.take().expect("writer present between calls");
        let outcome = writer.reclaim(true).expect("nothing left uncommitted after dispatch");
        if outcome.written > 0 {
            self.dispatched
                .push((content_type, epoch, outcome.buf[..outcome.written].to_vec()));
        }
        self.out_writer = Some(writer);
    }
}

fn dispatch_and_drain(
    l3: &mut Layer3,
    rl: &mut FakeRecordLayer,
    content_type: ContentType,
    epoch: Epoch,
) {
    l3.dispatch(rl).unwrap();
    rl.drain(content_type, epoch);
}

#[test]
fn tls_handshake_single_record() {
    let mut l3 = Layer3::new(Mode::Tls);
    let mut rl = FakeRecordLayer::new(256, 256);

    let ext = l3
        .write_handshake(
            &mut rl,
            HandshakeOut {
                epoch: 0,
                msg_type: HandshakeType(1),
                len: MpsSize::Known(5),
                message_seq: 0,
                fragment_offset: 0,
                fragment_length: MpsSize::Unknown,
            },
        )
        .unwrap();
    let (buf, n) = ext.get_ext(5, false).unwrap();
    buf.copy_from_slice(b"HELLO");
    assert_eq!(n, 5);
    ext.commit_ext().unwrap();
    dispatch_and_drain(&mut l3, &mut rl, ContentType::Handshake, 0);

    let (_, _, payload) = rl.last_dispatched();
    assert_eq!(payload[0], 1);
    assert_eq!(&payload[1..4], &[0, 0, 5]);
    assert_eq!(&payload[4..9], b"HELLO");
}

#[test]
fn tls_handshake_pause_resume_across_records() {
    let mut l3 = Layer3::new(Mode::Tls);
    let mut rl = FakeRecordLayer::new(8, 8);

    let ext = l3
        .write_handshake(
            &mut rl,
            HandshakeOut {
                epoch: 0,
                msg_type: HandshakeType(2),
                len: MpsSize::Known(10),
                message_seq: 0,
                fragment_offset: 0,
                fragment_length: MpsSize::Unknown,
            },
        )
        .unwrap();
    // the 8-byte record holds the 4-byte header plus 4 body bytes.
    let (buf, n) = ext.get_ext(4, false).unwrap();
    buf.copy_from_slice(b"ABCD");
    assert_eq!(n, 4);
    ext.commit_ext().unwrap();
    l3.pause_handshake(&mut rl).unwrap();
    rl.drain(ContentType::Handshake, 0);

    let ext = l3
        .write_handshake(
            &mut rl,
            HandshakeOut {
                epoch: 0,
                msg_type: HandshakeType(2),
                len: MpsSize::Known(10),
                message_seq: 0,
                fragment_offset: 0,
                fragment_length: MpsSize::Unknown,
            },
        )
        .unwrap();
    let (buf, n) = ext.get_ext(6, false).unwrap();
    buf.copy_from_slice(b"EFGHIJ");
    assert_eq!(n, 6);
    ext.commit_ext().unwrap();
    dispatch_and_drain(&mut l3, &mut rl, ContentType::Handshake, 0);

    assert_eq!(rl.dispatched.len(), 2);
    let first = &rl.dispatched[0].2;
    assert_eq!(first[0], 2);
    assert_eq!(&first[1..4], &[0, 0, 10]);
    assert_eq!(&first[4..8], b"ABCD");
    let second = &rl.dispatched[1].2;
    assert_eq!(second, b"EFGHIJ");
}

#[test]
fn dtls_handshake_two_fragments() {
    let mut l3 = Layer3::new(Mode::Dtls);
    let mut rl = FakeRecordLayer::new(64, 64);

    let ext = l3
        .write_handshake(
            &mut rl,
            HandshakeOut {
                epoch: 0,
                msg_type: HandshakeType(3),
                len: MpsSize::Known(10),
                message_seq: 1,
                fragment_offset: 0,
                fragment_length: MpsSize::Known(4),
            },
        )
        .unwrap();
    let (buf, _) = ext.get_ext(4, false).unwrap();
    buf.copy_from_slice(b"ABCD");
    ext.commit_ext().unwrap();
    dispatch_and_drain(&mut l3, &mut rl, ContentType::Handshake, 0);

    let ext = l3
        .write_handshake(
            &mut rl,
            HandshakeOut {
                epoch: 0,
                msg_type: HandshakeType(3),
                len: MpsSize::Known(10),
                message_seq: 1,
                fragment_offset: 4,
                fragment_length: MpsSize::Known(6),
            },
        )
        .unwrap();
    let (buf, _) = ext.get_ext(6, false).unwrap();
    buf.copy_from_slice(b"EFGHIJ");
    ext.commit_ext().unwrap();
    dispatch_and_drain(&mut l3, &mut rl, ContentType::Handshake, 0);

    let first = &rl.dispatched[0].2;
    assert_eq!(first[0], 3);
    assert_eq!(&first[1..4], &[0, 0, 10]); // total length
    assert_eq!(&first[4..6], &[0, 1]); // message_seq
    assert_eq!(&first[6..9], &[0, 0, 0]); // fragment_offset
    assert_eq!(&first[9..12], &[0, 0, 4]); // fragment_length
    assert_eq!(&first[12..16], b"ABCD");

    let second = &rl.dispatched[1].2;
    assert_eq!(&second[6..9], &[0, 0, 4]); // fragment_offset
    assert_eq!(&second[9..12], &[0, 0, 6]); // fragment_length
    assert_eq!(&second[12..18], b"EFGHIJ");
}

#[test]
fn dtls_handshake_unknown_length_deferred_to_dispatch() {
    // Scenario 5 of spec.md §8: a DTLS handshake message written with
    // both total and fragment length unknown up front. The header is
    // held back until dispatch, where both lengths resolve to however
    // much the caller actually wrote.
    let mut l3 = Layer3::new(Mode::Dtls);
    let mut rl = FakeRecordLayer::new(64, 64);

    let ext = l3
        .write_handshake(
            &mut rl,
            HandshakeOut {
                epoch: 0,
                msg_type: HandshakeType(3),
                len: MpsSize::Unknown,
                message_seq: 2,
                fragment_offset: 0,
                fragment_length: MpsSize::Unknown,
            },
        )
        .unwrap();
    let (buf, n) = ext.get_ext(7, false).unwrap();
    buf.copy_from_slice(b"PAYLOAD");
    assert_eq!(n, 7);
    ext.commit_ext().unwrap();
    dispatch_and_drain(&mut l3, &mut rl, ContentType::Handshake, 0);

    let (_, _, payload) = rl.last_dispatched();
    assert_eq!(payload[0], 3);
    assert_eq!(&payload[1..4], &[0, 0, 7]); // total length, resolved from committed bytes
    assert_eq!(&payload[4..6], &[0, 2]); // message_seq
    assert_eq!(&payload[6..9], &[0, 0, 0]); // fragment_offset
    assert_eq!(&payload[9..12], &[0, 0, 7]); // fragment_length, resolved the same way
    assert_eq!(&payload[12..19], b"PAYLOAD");
}

#[test]
fn dtls_fragment_bounds_violation_rejected() {
    let mut l3 = Layer3::new(Mode::Dtls);
    let mut rl = FakeRecordLayer::new(64, 64);

    let err = l3
        .write_handshake(
            &mut rl,
            HandshakeOut {
                epoch: 0,
                msg_type: HandshakeType(3),
                len: MpsSize::Known(10),
                message_seq: 1,
                fragment_offset: 8,
                fragment_length: MpsSize::Known(4),
            },
        )
        .unwrap_err();
    assert_eq!(err, Error::InvalidArg);
}

#[test]
fn alert_round_trip() {
    let mut l3 = Layer3::new(Mode::Tls);
    let mut rl = FakeRecordLayer::new(64, 64);

    l3.write_alert(
        &mut rl,
        AlertOut {
            epoch: 0,
            level: AlertLevel::Fatal,
            description: 10,
        },
    )
    .unwrap();
    dispatch_and_drain(&mut l3, &mut rl, ContentType::Alert, 0);

    let (_, _, payload) = rl.last_dispatched();
    assert_eq!(payload, &[2, 10]);

    rl.push_incoming(ContentType::Alert, 0, payload);
    let ct = l3.read(&mut rl).unwrap();
    assert_eq!(ct, ContentType::Alert);
    let alert = l3.read_alert().unwrap();
    assert_eq!(alert.level, AlertLevel::Fatal);
    assert_eq!(alert.description, 10);
    l3.read_consume(&mut rl).unwrap();
}

#[test]
fn bad_alert_level_rejected() {
    let mut l3 = Layer3::new(Mode::Tls);
    let mut rl = FakeRecordLayer::new(64, 64);
    rl.push_incoming(ContentType::Alert, 0, &[3, 0]);
    assert_eq!(l3.read(&mut rl).unwrap_err(), Error::InvalidContent);
}

#[test]
fn ccs_round_trip() {
    let mut l3 = Layer3::new(Mode::Tls);
    let mut rl = FakeRecordLayer::new(64, 64);

    l3.write_ccs(&mut rl, CcsOut { epoch: 0 }).unwrap();
    dispatch_and_drain(&mut l3, &mut rl, ContentType::ChangeCipherSpec, 0);
    let (_, _, payload) = rl.last_dispatched();
    assert_eq!(payload, &[1]);

    rl.push_incoming(ContentType::ChangeCipherSpec, 0, payload);
    let ct = l3.read(&mut rl).unwrap();
    assert_eq!(ct, ContentType::ChangeCipherSpec);
    l3.read_ccs().unwrap();
    l3.read_consume(&mut rl).unwrap();
}

#[test]
fn bad_ccs_value_rejected() {
    let mut l3 = Layer3::new(Mode::Tls);
    let mut rl = FakeRecordLayer::new(64, 64);
    rl.push_incoming(ContentType::ChangeCipherSpec, 0, &[0x02]);
    assert_eq!(l3.read(&mut rl).unwrap_err(), Error::InvalidContent);
}

#[test]
fn application_data_round_trip() {
    let mut l3 = Layer3::new(Mode::Tls);
    let mut rl = FakeRecordLayer::new(64, 64);

    let writer = l3.write_app(&mut rl, AppOut { epoch: 3 }).unwrap();
    let (buf, _) = writer.get(11, false).unwrap();
    buf.copy_from_slice(b"hello world");
    writer.commit().unwrap();
    dispatch_and_drain(&mut l3, &mut rl, ContentType::ApplicationData, 3);

    let (_, epoch, payload) = rl.last_dispatched();
    assert_eq!(*epoch, 3);
    assert_eq!(payload, b"hello world");

    rl.push_incoming(ContentType::ApplicationData, 3, payload);
    let ct = l3.read(&mut rl).unwrap();
    assert_eq!(ct, ContentType::ApplicationData);
    let app = l3.read_app().unwrap();
    let (data, n) = app.reader.get(11, false).unwrap();
    assert_eq!(data, b"hello world");
    assert_eq!(n, 11);
    app.reader.commit().unwrap();
    l3.read_consume(&mut rl).unwrap();
}

#[test]
fn incoming_handshake_message_spans_two_records() {
    let mut l3 = Layer3::new(Mode::Tls);
    let mut rl = FakeRecordLayer::new(4, 4);

    // A 4-byte header (msg_type=4, len=6) plus a 6-byte body split 4+2
    // across transport-sized chunks of 4 bytes each.
    let mut wire = vec![4u8, 0, 0, 6];
    wire.extend_from_slice(b"ABCDEF");
    rl.push_incoming(ContentType::Handshake, 0, &wire);

    let ct = l3.read(&mut rl).unwrap();
    assert_eq!(ct, ContentType::Handshake);
    {
        let hs = l3.read_handshake().unwrap();
        assert_eq!(hs.msg_type, HandshakeType(4));
        assert_eq!(hs.len, 6);
        let (data, n) = hs.body.get_ext(4, false).unwrap();
        assert_eq!(data, b"ABCD");
        assert_eq!(n, 4);
        hs.body.commit_ext().unwrap();
    }
    l3.read_pause_handshake(&mut rl).unwrap();

    let ct = l3.read(&mut rl).unwrap();
    assert_eq!(ct, ContentType::Handshake);
    let hs = l3.read_handshake().unwrap();
    let (data, n) = hs.body.get_ext(2, false).unwrap();
    assert_eq!(data, b"EF");
    assert_eq!(n, 2);
    hs.body.commit_ext().unwrap();
    drop(hs);
    l3.read_consume(&mut rl).unwrap();
}

#[test]
fn write_handshake_rejects_resume_with_mismatched_params() {
    let mut l3 = Layer3::new(Mode::Tls);
    let mut rl = FakeRecordLayer::new(8, 8);

    let ext = l3
        .write_handshake(
            &mut rl,
            HandshakeOut {
                epoch: 0,
                msg_type: HandshakeType(1),
                len: MpsSize::Known(10),
                message_seq: 0,
                fragment_offset: 0,
                fragment_length: MpsSize::Unknown,
            },
        )
        .unwrap();
    ext.get_ext(4, false).unwrap().0.copy_from_slice(b"ABCD");
    ext.commit_ext().unwrap();
    l3.pause_handshake(&mut rl).unwrap();
    rl.drain(ContentType::Handshake, 0);

    let err = l3
        .write_handshake(
            &mut rl,
            HandshakeOut {
                epoch: 0,
                msg_type: HandshakeType(1),
                len: MpsSize::Known(999),
                message_seq: 0,
                fragment_offset: 0,
                fragment_length: MpsSize::Unknown,
            },
        )
        .unwrap_err();
    assert_eq!(err, Error::InvalidArgs);
}

#[test]
fn no_interleaving_while_handshake_paused() {
    let mut l3 = Layer3::new(Mode::Tls);
    let mut rl = FakeRecordLayer::new(8, 8);

    let ext = l3
        .write_handshake(
            &mut rl,
            HandshakeOut {
                epoch: 0,
                msg_type: HandshakeType(1),
                len: MpsSize::Known(10),
                message_seq: 0,
                fragment_offset: 0,
                fragment_length: MpsSize::Unknown,
            },
        )
        .unwrap();
    ext.get_ext(4, false).unwrap().0.copy_from_slice(b"ABCD");
    ext.commit_ext().unwrap();
    l3.pause_handshake(&mut rl).unwrap();
    rl.drain(ContentType::Handshake, 0);

    let err = l3.write_app(&mut rl, AppOut { epoch: 0 }).unwrap_err();
    assert_eq!(err, Error::NoInterleaving);
}
