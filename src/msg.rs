//! Request and response messages for the Doozer RPC protocol.
//!
//! Both messages are proto2-style: every field is optional on the wire,
//! and many are legitimately absent depending on the verb. The structs
//! here model that with explicit `Option` presence rather than sentinel
//! values.
//!
//! # Wire Layout
//!
//! Each TCP frame is `[u32 big-endian length] [protobuf message]`. The
//! field numbers are fixed by the Doozer `msg.proto` schema and recorded
//! in [`field`].

use bytes::{BufMut, Bytes};
use num_derive::FromPrimitive;

use crate::encode::{put_bytes_field, put_varint_field, ToWire};
use crate::error::{ErrCode, Result};

/// Protobuf field numbers for [`Request`] and [`Response`].
pub mod field {
    pub const REQUEST_TAG: u32 = 1;
    pub const REQUEST_VERB: u32 = 2;
    pub const REQUEST_PATH: u32 = 4;
    pub const REQUEST_VALUE: u32 = 5;
    pub const REQUEST_OTHER_TAG: u32 = 6;
    pub const REQUEST_OFFSET: u32 = 7;
    pub const REQUEST_REV: u32 = 9;

    pub const RESPONSE_TAG: u32 = 1;
    pub const RESPONSE_FLAGS: u32 = 2;
    pub const RESPONSE_REV: u32 = 3;
    pub const RESPONSE_PATH: u32 = 5;
    pub const RESPONSE_VALUE: u32 = 6;
    pub const RESPONSE_LEN: u32 = 8;
    pub const RESPONSE_ERR_CODE: u32 = 100;
    pub const RESPONSE_ERR_DETAIL: u32 = 101;
}

/// Operations understood by a Doozer server.
///
/// The numeric values are the wire representation (`verb` field of a
/// request).
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, Default)]
pub enum Verb {
    /// Read a file at an optional revision.
    Get = 1,
    /// Compare-and-set write. Non-idempotent: never retransmitted.
    Set = 2,
    /// Compare-and-set delete. Non-idempotent: never retransmitted.
    Del = 3,
    /// Read the store's current revision.
    Rev = 5,
    /// Block until the path changes at or after a revision.
    Wait = 6,
    /// No-op round trip, useful as a liveness probe.
    #[default]
    Nop = 7,
    /// Glob-match paths, one match per call driven by `offset`.
    Walk = 9,
    /// List one directory entry per call driven by `offset`.
    Getdir = 14,
    /// Read a path's metadata (length and revision).
    Stat = 16,
    /// Present an access token to the server.
    Access = 99,
}

/// A single RPC request.
///
/// `tag` is assigned by the connection at send time; all other fields are
/// set by the verb builders in [`Client`](crate::Client). Fields that are
/// `None` are not emitted on the wire.
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// Correlates this request with its eventual response on a shared
    /// connection. Assigned by [`Connection::send`](crate::Connection::send).
    pub tag: i32,
    pub verb: Verb,
    pub path: Option<String>,
    pub value: Option<Bytes>,
    pub other_tag: Option<i32>,
    pub offset: Option<i32>,
    pub rev: Option<i64>,
}

impl Request {
    /// Start a request for the given verb with all optional fields absent.
    pub fn new(verb: Verb) -> Self {
        Request {
            verb,
            ..Default::default()
        }
    }
}

impl ToWire for Request {
    fn encode<B: BufMut>(&self, buffer: &mut B) -> Result<()> {
        put_varint_field(buffer, field::REQUEST_TAG, self.tag as i64);
        put_varint_field(buffer, field::REQUEST_VERB, self.verb as i64);
        if let Some(path) = &self.path {
            put_bytes_field(buffer, field::REQUEST_PATH, path.as_bytes());
        }
        if let Some(value) = &self.value {
            put_bytes_field(buffer, field::REQUEST_VALUE, value);
        }
        if let Some(other_tag) = self.other_tag {
            put_varint_field(buffer, field::REQUEST_OTHER_TAG, other_tag as i64);
        }
        if let Some(offset) = self.offset {
            put_varint_field(buffer, field::REQUEST_OFFSET, offset as i64);
        }
        if let Some(rev) = self.rev {
            put_varint_field(buffer, field::REQUEST_REV, rev);
        }
        Ok(())
    }
}

/// A single RPC response.
///
/// `err_code` is present only on failure; [`Connection::send`] maps it to
/// a typed [`ResponseError`](crate::ResponseError) before the response
/// reaches the caller, so a `Response` returned from the client API never
/// carries an error code.
///
/// [`Connection::send`]: crate::Connection::send
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub tag: i32,
    pub flags: i32,
    pub rev: Option<i64>,
    pub path: Option<String>,
    pub value: Option<Bytes>,
    pub len: Option<i32>,
    pub err_code: Option<ErrCode>,
    pub err_detail: Option<String>,
}

impl ToWire for Response {
    fn encode<B: BufMut>(&self, buffer: &mut B) -> Result<()> {
        put_varint_field(buffer, field::RESPONSE_TAG, self.tag as i64);
        if self.flags != 0 {
            put_varint_field(buffer, field::RESPONSE_FLAGS, self.flags as i64);
        }
        if let Some(rev) = self.rev {
            put_varint_field(buffer, field::RESPONSE_REV, rev);
        }
        if let Some(path) = &self.path {
            put_bytes_field(buffer, field::RESPONSE_PATH, path.as_bytes());
        }
        if let Some(value) = &self.value {
            put_bytes_field(buffer, field::RESPONSE_VALUE, value);
        }
        if let Some(len) = self.len {
            put_varint_field(buffer, field::RESPONSE_LEN, len as i64);
        }
        if let Some(err_code) = self.err_code {
            put_varint_field(buffer, field::RESPONSE_ERR_CODE, err_code as i64);
        }
        if let Some(err_detail) = &self.err_detail {
            put_bytes_field(buffer, field::RESPONSE_ERR_DETAIL, err_detail.as_bytes());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verb_wire_values() {
        assert_eq!(Verb::Get as i32, 1);
        assert_eq!(Verb::Set as i32, 2);
        assert_eq!(Verb::Del as i32, 3);
        assert_eq!(Verb::Rev as i32, 5);
        assert_eq!(Verb::Wait as i32, 6);
        assert_eq!(Verb::Nop as i32, 7);
        assert_eq!(Verb::Walk as i32, 9);
        assert_eq!(Verb::Getdir as i32, 14);
        assert_eq!(Verb::Stat as i32, 16);
        assert_eq!(Verb::Access as i32, 99);
    }

    #[test]
    fn request_encodes_known_bytes() {
        let request = Request {
            path: Some("/a".to_string()),
            ..Request::new(Verb::Get)
        };
        let packet = request.to_packet().unwrap();
        // frame length 8, then: tag=0, verb=GET, path="/a"
        assert_eq!(
            packet.as_ref(),
            &[
                0x00, 0x00, 0x00, 0x08, // length prefix
                0x08, 0x00, // tag = 0
                0x10, 0x01, // verb = GET
                0x22, 0x02, b'/', b'a', // path = "/a"
            ]
        );
    }

    #[test]
    fn absent_fields_are_not_emitted() {
        let mut explicit = Vec::new();
        Request::new(Verb::Rev).encode(&mut explicit).unwrap();
        // Just the tag and verb fields.
        assert_eq!(explicit, vec![0x08, 0x00, 0x10, 0x05]);
    }
}
