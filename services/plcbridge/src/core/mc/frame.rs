//! 3E binary frame encoding and decoding
//!
//! Request layout (all multi-byte fields little-endian):
//!
//! ```text
//! ┌──────────┬─────┬────┬─────────┬─────────┬────────┬───────┬─────────┬────────┬──────┬──────┬────────┬─────────┐
//! │subheader │ net │ pc │ io (2)  │ station │ len(2) │ timer │ command │ subcmd │ head │ code │ points │ payload │
//! │  50 00   │ 00  │ FF │  FF 03  │   00    │        │  (2)  │   (2)   │  (2)   │ (3)  │ (1)  │  (2)   │         │
//! └──────────┴─────┴────┴─────────┴─────────┴────────┴───────┴─────────┴────────┴──────┴──────┴────────┴─────────┘
//! ```
//!
//! `len` counts everything from the monitoring timer onwards. Responses start
//! with `D0 00`, echo the routing fields, carry their own length and a 2-byte
//! end code in front of the data.

use bytes::{BufMut, Bytes, BytesMut};
use std::time::Duration;

use super::address::DeviceAddress;
use crate::core::transport::TransportError;

pub const SUBHEADER_REQUEST: [u8; 2] = [0x50, 0x00];
pub const SUBHEADER_RESPONSE: [u8; 2] = [0xD0, 0x00];

/// Fixed part of a response before the length-delimited body
pub const RESPONSE_HEADER_LEN: usize = 9;

/// Batch limits for Q/L-series batch access
pub const MAX_WORD_POINTS: usize = 960;
pub const MAX_BIT_POINTS: usize = 7168;

const CMD_BATCH_READ: u16 = 0x0401;
const CMD_BATCH_WRITE: u16 = 0x1401;
const SUBCMD_WORD_UNITS: u16 = 0x0000;
const SUBCMD_BIT_UNITS: u16 = 0x0001;

/// Bytes between the length field and the payload
const REQUEST_FIXED_BODY: usize = 12;

/// Monitoring timer resolution
const TIMER_UNIT_MS: u128 = 250;

/// Access unit for a batch command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Units {
    Word,
    Bit,
}

impl Units {
    fn subcommand(self) -> u16 {
        match self {
            Units::Word => SUBCMD_WORD_UNITS,
            Units::Bit => SUBCMD_BIT_UNITS,
        }
    }

    fn max_points(self) -> usize {
        match self {
            Units::Word => MAX_WORD_POINTS,
            Units::Bit => MAX_BIT_POINTS,
        }
    }
}

/// Routing fields of the 3E header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub network: u8,
    pub pc: u8,
    pub module_io: u16,
    pub station: u8,
}

impl Default for Route {
    fn default() -> Self {
        Self {
            network: 0x00,
            pc: 0xFF,
            module_io: 0x03FF,
            station: 0x00,
        }
    }
}

/// Monitoring timer value for a client-side timeout (units of 250 ms)
pub fn monitoring_timer(timeout: Duration) -> u16 {
    let units = timeout.as_millis() / TIMER_UNIT_MS;
    units.clamp(1, u16::MAX as u128) as u16
}

fn check_points(units: Units, points: usize) -> Result<u16, TransportError> {
    if points == 0 || points > units.max_points() {
        return Err(TransportError::InvalidRequest(format!(
            "{:?} batch of {} points (allowed 1..={})",
            units,
            points,
            units.max_points()
        )));
    }
    Ok(points as u16)
}

fn encode_request(
    route: Route,
    timer: u16,
    command: u16,
    units: Units,
    head: &DeviceAddress,
    points: u16,
    payload: &[u8],
) -> Bytes {
    let body_len = REQUEST_FIXED_BODY + payload.len();
    let mut buf = BytesMut::with_capacity(9 + body_len);

    buf.put_slice(&SUBHEADER_REQUEST);
    buf.put_u8(route.network);
    buf.put_u8(route.pc);
    buf.put_u16_le(route.module_io);
    buf.put_u8(route.station);
    buf.put_u16_le(body_len as u16);

    buf.put_u16_le(timer);
    buf.put_u16_le(command);
    buf.put_u16_le(units.subcommand());
    // 3-byte head device number
    buf.put_uint_le(u64::from(head.number), 3);
    buf.put_u8(head.device.code());
    buf.put_u16_le(points);
    buf.put_slice(payload);

    buf.freeze()
}

/// Batch read request for `points` units starting at `head`
pub fn encode_batch_read(
    route: Route,
    timer: u16,
    head: &DeviceAddress,
    units: Units,
    points: usize,
) -> Result<Bytes, TransportError> {
    let points = check_points(units, points)?;
    Ok(encode_request(
        route,
        timer,
        CMD_BATCH_READ,
        units,
        head,
        points,
        &[],
    ))
}

/// Batch write request in word units
pub fn encode_batch_write_words(
    route: Route,
    timer: u16,
    head: &DeviceAddress,
    values: &[u16],
) -> Result<Bytes, TransportError> {
    let points = check_points(Units::Word, values.len())?;
    let mut payload = Vec::with_capacity(values.len() * 2);
    for value in values {
        payload.extend_from_slice(&value.to_le_bytes());
    }
    Ok(encode_request(
        route,
        timer,
        CMD_BATCH_WRITE,
        Units::Word,
        head,
        points,
        &payload,
    ))
}

/// Batch write request in bit units
pub fn encode_batch_write_bits(
    route: Route,
    timer: u16,
    head: &DeviceAddress,
    values: &[bool],
) -> Result<Bytes, TransportError> {
    let points = check_points(Units::Bit, values.len())?;
    Ok(encode_request(
        route,
        timer,
        CMD_BATCH_WRITE,
        Units::Bit,
        head,
        points,
        &pack_bits(values),
    ))
}

/// Pack bit-unit values two per byte, high nibble first
pub fn pack_bits(values: &[bool]) -> Vec<u8> {
    values
        .chunks(2)
        .map(|pair| {
            let high = if pair[0] { 0x10 } else { 0x00 };
            let low = match pair.get(1) {
                Some(true) => 0x01,
                _ => 0x00,
            };
            high | low
        })
        .collect()
}

/// Validate the fixed response header and return the body length that follows
pub fn parse_response_header(head: &[u8; RESPONSE_HEADER_LEN]) -> Result<usize, TransportError> {
    if head[..2] != SUBHEADER_RESPONSE {
        return Err(TransportError::ProtocolError(format!(
            "Unexpected response subheader {:02X} {:02X}",
            head[0], head[1]
        )));
    }
    let len = u16::from_le_bytes([head[7], head[8]]) as usize;
    if len < 2 {
        return Err(TransportError::ProtocolError(format!(
            "Response body too short: {} bytes",
            len
        )));
    }
    Ok(len)
}

/// Split the end code off a response body; non-zero end codes are errors
pub fn check_end_code(body: &[u8]) -> Result<&[u8], TransportError> {
    if body.len() < 2 {
        return Err(TransportError::ProtocolError(
            "Response body missing end code".to_string(),
        ));
    }
    let end_code = u16::from_le_bytes([body[0], body[1]]);
    if end_code != 0 {
        return Err(TransportError::EndCode(end_code));
    }
    Ok(&body[2..])
}

/// Decode exactly `count` little-endian words
pub fn decode_words(data: &[u8], count: usize) -> Result<Vec<u16>, TransportError> {
    if data.len() != count * 2 {
        return Err(TransportError::ProtocolError(format!(
            "Expected {} word bytes, got {}",
            count * 2,
            data.len()
        )));
    }
    Ok(data
        .chunks_exact(2)
        .map(|w| u16::from_le_bytes([w[0], w[1]]))
        .collect())
}

/// Decode exactly `count` nibble-packed bit values
pub fn decode_bits(data: &[u8], count: usize) -> Result<Vec<bool>, TransportError> {
    let expected = count.div_ceil(2);
    if data.len() != expected {
        return Err(TransportError::ProtocolError(format!(
            "Expected {} bit bytes, got {}",
            expected,
            data.len()
        )));
    }
    let mut bits = Vec::with_capacity(count);
    for byte in data {
        bits.push(byte & 0xF0 != 0);
        bits.push(byte & 0x0F != 0);
    }
    bits.truncate(count);
    Ok(bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> DeviceAddress {
        s.parse().unwrap()
    }

    #[test]
    fn test_encode_batch_read_words() {
        let frame =
            encode_batch_read(Route::default(), 0x0010, &addr("D100"), Units::Word, 3).unwrap();
        assert_eq!(
            frame.as_ref(),
            &[
                0x50, 0x00, // subheader
                0x00, 0xFF, 0xFF, 0x03, 0x00, // route
                0x0C, 0x00, // length
                0x10, 0x00, // timer
                0x01, 0x04, // batch read
                0x00, 0x00, // word units
                0x64, 0x00, 0x00, // D100
                0xA8, // D
                0x03, 0x00, // points
            ]
        );
    }

    #[test]
    fn test_encode_batch_write_bits() {
        let frame = encode_batch_write_bits(
            Route::default(),
            4,
            &addr("M100"),
            &[true, false, true],
        )
        .unwrap();
        // length covers 12 fixed bytes + 2 packed bytes
        assert_eq!(&frame[7..9], &[0x0E, 0x00]);
        assert_eq!(&frame[11..15], &[0x01, 0x14, 0x01, 0x00]);
        assert_eq!(frame[18], 0x90);
        assert_eq!(&frame[19..21], &[0x03, 0x00]);
        assert_eq!(&frame[21..], &[0x10, 0x10]);
    }

    #[test]
    fn test_encode_write_words_payload_little_endian() {
        let frame =
            encode_batch_write_words(Route::default(), 4, &addr("D51"), &[0x1234, 0xFFFF]).unwrap();
        assert_eq!(&frame[21..], &[0x34, 0x12, 0xFF, 0xFF]);
    }

    #[test]
    fn test_point_limits() {
        assert!(encode_batch_read(Route::default(), 4, &addr("D0"), Units::Word, 0).is_err());
        assert!(encode_batch_read(Route::default(), 4, &addr("D0"), Units::Word, 961).is_err());
        assert!(encode_batch_read(Route::default(), 4, &addr("M0"), Units::Bit, 7168).is_ok());
    }

    #[test]
    fn test_response_header_and_end_code() {
        let head = [0xD0, 0x00, 0x00, 0xFF, 0xFF, 0x03, 0x00, 0x06, 0x00];
        assert_eq!(parse_response_header(&head).unwrap(), 6);

        let bad = [0x50, 0x00, 0x00, 0xFF, 0xFF, 0x03, 0x00, 0x06, 0x00];
        assert!(parse_response_header(&bad).is_err());

        let body = [0x00, 0x00, 0x01, 0x00, 0x02, 0x00];
        assert_eq!(check_end_code(&body).unwrap(), &[0x01, 0x00, 0x02, 0x00]);

        let failed = [0x51, 0xC0];
        assert!(matches!(
            check_end_code(&failed),
            Err(TransportError::EndCode(0xC051))
        ));
    }

    #[test]
    fn test_decode_words_exact_count() {
        assert_eq!(
            decode_words(&[0x01, 0x00, 0xFF, 0xFF], 2).unwrap(),
            vec![1, 0xFFFF]
        );
        assert!(decode_words(&[0x01, 0x00], 2).is_err());
    }

    #[test]
    fn test_bits_pack_and_decode() {
        let bits = [true, true, false, true, true];
        let packed = pack_bits(&bits);
        assert_eq!(packed, vec![0x11, 0x01, 0x10]);
        assert_eq!(decode_bits(&packed, 5).unwrap(), bits.to_vec());
        assert!(decode_bits(&packed, 7).is_err());
    }

    #[test]
    fn test_monitoring_timer() {
        assert_eq!(monitoring_timer(Duration::from_secs(4)), 16);
        assert_eq!(monitoring_timer(Duration::from_millis(10)), 1);
    }
}
