//! Wire formats for the four header shapes Layer 3 frames: the TLS and
//! DTLS handshake headers, the TLS alert, and the TLS change-cipher-spec
//! body. Grounded directly on `l3_parse_hs_header_tls`/`_dtls`,
//! `l3_parse_alert`, `l3_parse_ccs` and their `l3_write_hs_header_*`
//! counterparts.

use crate::codec::{read_u16, read_u24, read_u8, write_u16, write_u24, write_u8};
use crate::HandshakeType;

pub const TLS_HS_HDR_LEN: usize = 4;
pub const DTLS_HS_HDR_LEN: usize = 13;
pub const ALERT_LEN: usize = 2;
pub const CCS_LEN: usize = 1;
pub const CCS_VALUE: u8 = 0x01;

/// TLS handshake header: 1-byte `msg_type`, 3-byte `uint24 length`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TlsHsHeader {
    pub msg_type: HandshakeType,
    pub len: u32,
}

impl TlsHsHeader {
    pub fn parse(buf: &[u8]) -> TlsHsHeader {
        TlsHsHeader {
            msg_type: HandshakeType(read_u8(&buf[0..1])),
            len: read_u24(&buf[1..4]),
        }
    }

    pub fn write(&self, buf: &mut [u8]) {
        write_u8(self.msg_type.0, &mut buf[0..1]);
        write_u24(self.len, &mut buf[1..4]);
    }
}

/// DTLS handshake header: the TLS header plus a 2-byte `message_seq` and
/// 3-byte `fragment_offset`/`fragment_length`, per RFC 9147 §5.2.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DtlsHsHeader {
    pub msg_type: HandshakeType,
    pub len: u32,
    pub message_seq: u16,
    pub fragment_offset: u32,
    pub fragment_length: u32,
}

impl DtlsHsHeader {
    pub fn parse(buf: &[u8]) -> DtlsHsHeader {
        DtlsHsHeader {
            msg_type: HandshakeType(read_u8(&buf[0..1])),
            len: read_u24(&buf[1..4]),
            message_seq: read_u16(&buf[4..6]),
            fragment_offset: read_u24(&buf[6..9]),
            fragment_length: read_u24(&buf[9..12]),
        }
    }

    pub fn write(&self, buf: &mut [u8]) {
        write_u8(self.msg_type.0, &mut buf[0..1]);
        write_u24(self.len, &mut buf[1..4]);
        write_u16(self.message_seq, &mut buf[4..6]);
        write_u24(self.fragment_offset, &mut buf[6..9]);
        write_u24(self.fragment_length, &mut buf[9..12]);
    }
}

/// TLS alert level. Numbered per RFC 8446 §6 (`warning(1)`, `fatal(2)`) --
/// the source this crate is ported from has these reversed, a bug this
/// crate deliberately does not carry over (see DESIGN.md).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertLevel {
    Warning = 1,
    Fatal = 2,
}

impl AlertLevel {
    pub fn from_u8(v: u8) -> Option<AlertLevel> {
        match v {
            1 => Some(AlertLevel::Warning),
            2 => Some(AlertLevel::Fatal),
            _ => None,
        }
    }
}
