//! Deserialize messages from the protobuf wire format.
//!
//! The parsers walk a message field by field: each field starts with a
//! varint key holding `(field_number << 3) | wire_type`. Unknown field
//! numbers are skipped by wire type, which is what keeps the client
//! compatible with newer servers.

use bytes::{Buf, Bytes};
use nom::{bytes::complete::take, IResult, InputLength};
use nombytes::NomBytes;
use num_traits::FromPrimitive;

use crate::error::{ErrCode, Error, Result};
use crate::msg::{field, Request, Response, Verb};

/// Parse an unsigned base-128 varint.
pub fn parse_uvarint(s: NomBytes) -> IResult<NomBytes, u64> {
    let mut result: u64 = 0;
    let mut shift = 0;
    let mut remaining = s;

    loop {
        let (s, byte) = take(1usize)(remaining)?;
        let b = byte.into_bytes()[0];
        remaining = s;

        result |= ((b & 0x7F) as u64) << shift;

        if (b & 0x80) == 0 {
            break;
        }

        shift += 7;
        if shift > 63 {
            // Overflow protection
            return Err(nom::Err::Failure(nom::error::Error::new(
                remaining,
                nom::error::ErrorKind::TooLarge,
            )));
        }
    }

    Ok((remaining, result))
}

/// Parse a length-delimited field body: varint length followed by that
/// many bytes.
pub fn parse_len_delimited(s: NomBytes) -> IResult<NomBytes, Bytes> {
    let (s, length) = parse_uvarint(s)?;
    let (s, data) = take(length as usize)(s)?;
    Ok((s, data.into_bytes()))
}

/// Decoded value of a single protobuf field.
enum WireValue {
    Varint(u64),
    Delimited(Bytes),
}

/// Parse one field: key, then the value for its wire type.
///
/// Fixed32/fixed64 fields do not occur in the Doozer schema but are
/// consumed correctly so unknown fields never desynchronize the stream.
fn parse_field(s: NomBytes) -> IResult<NomBytes, (u32, WireValue)> {
    let (s, key) = parse_uvarint(s)?;
    let number = (key >> 3) as u32;
    match key & 0x7 {
        0 => {
            let (s, value) = parse_uvarint(s)?;
            Ok((s, (number, WireValue::Varint(value))))
        }
        1 => {
            let (s, raw) = take(8usize)(s)?;
            let mut raw = raw.into_bytes();
            let value = raw.get_u64_le();
            Ok((s, (number, WireValue::Varint(value))))
        }
        2 => {
            let (s, data) = parse_len_delimited(s)?;
            Ok((s, (number, WireValue::Delimited(data))))
        }
        5 => {
            let (s, raw) = take(4usize)(s)?;
            let mut raw = raw.into_bytes();
            let value = raw.get_u32_le() as u64;
            Ok((s, (number, WireValue::Varint(value))))
        }
        _ => Err(nom::Err::Failure(nom::error::Error::new(
            s,
            nom::error::ErrorKind::Tag,
        ))),
    }
}

fn delimited_to_string(data: Bytes, raw: &Bytes) -> Result<String> {
    std::str::from_utf8(&data)
        .map(|s| s.to_string())
        .map_err(|_| Error::ParsingError(raw.clone()))
}

/// Parse a complete response message (the frame body, without the length
/// prefix).
pub fn parse_response(data: Bytes) -> Result<Response> {
    let mut input = NomBytes::new(data.clone());
    let mut response = Response::default();

    while input.input_len() > 0 {
        let (rest, (number, value)) =
            parse_field(input).map_err(|_| Error::ParsingError(data.clone()))?;
        input = rest;

        match (number, value) {
            (field::RESPONSE_TAG, WireValue::Varint(v)) => response.tag = v as i32,
            (field::RESPONSE_FLAGS, WireValue::Varint(v)) => response.flags = v as i32,
            (field::RESPONSE_REV, WireValue::Varint(v)) => response.rev = Some(v as i64),
            (field::RESPONSE_PATH, WireValue::Delimited(b)) => {
                response.path = Some(delimited_to_string(b, &data)?);
            }
            (field::RESPONSE_VALUE, WireValue::Delimited(b)) => response.value = Some(b),
            (field::RESPONSE_LEN, WireValue::Varint(v)) => response.len = Some(v as i32),
            (field::RESPONSE_ERR_CODE, WireValue::Varint(v)) => {
                // Unknown codes from newer servers degrade to Other.
                response.err_code =
                    Some(ErrCode::from_i64(v as i64).unwrap_or(ErrCode::Other));
            }
            (field::RESPONSE_ERR_DETAIL, WireValue::Delimited(b)) => {
                response.err_detail = Some(delimited_to_string(b, &data)?);
            }
            _ => {} // unknown field, skipped
        }
    }

    Ok(response)
}

/// Parse a complete request message (the frame body, without the length
/// prefix).
///
/// The client never receives requests; this is the server half of the
/// codec, used by in-process test servers.
pub fn parse_request(data: Bytes) -> Result<Request> {
    let mut input = NomBytes::new(data.clone());
    let mut request = Request::default();

    while input.input_len() > 0 {
        let (rest, (number, value)) =
            parse_field(input).map_err(|_| Error::ParsingError(data.clone()))?;
        input = rest;

        match (number, value) {
            (field::REQUEST_TAG, WireValue::Varint(v)) => request.tag = v as i32,
            (field::REQUEST_VERB, WireValue::Varint(v)) => {
                request.verb = Verb::from_i64(v as i64)
                    .ok_or_else(|| Error::ParsingError(data.clone()))?;
            }
            (field::REQUEST_PATH, WireValue::Delimited(b)) => {
                request.path = Some(delimited_to_string(b, &data)?);
            }
            (field::REQUEST_VALUE, WireValue::Delimited(b)) => request.value = Some(b),
            (field::REQUEST_OTHER_TAG, WireValue::Varint(v)) => {
                request.other_tag = Some(v as i32);
            }
            (field::REQUEST_OFFSET, WireValue::Varint(v)) => request.offset = Some(v as i32),
            (field::REQUEST_REV, WireValue::Varint(v)) => request.rev = Some(v as i64),
            _ => {} // unknown field, skipped
        }
    }

    Ok(request)
}
