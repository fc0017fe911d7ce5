//! Fixed-length request frames and length-prefixed response frames.
//!
//! Request frame (big-endian numerics, total length fixed per deployment):
//! - byte 0: request type code
//! - REGISTRATION: `[1..13)` r,g,b as f32, `[13..29)` name, `[29]` agent type
//! - REQUEST_FOR_TASK / TASK_COMPLETE / DEREGISTRATION: `[1..17)` name
//! - POSITION_UPDATE: `[1..5)` start u32, `[5..9)` end u32, `[9..13)` fraction f32, `[13..29)` name
//! - STATUS_UPDATE: `[1..32)` status text, `[32..48)` name
//!
//! Response frame: u32 length of everything after itself, one status byte,
//! then the type-specific payload.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::constants::*;
use crate::messages::{Request, RequestKind, Response, ResponsePayload, StatusCode};
use crate::types::{AgentType, GraphIndex, Rgb};
use crate::ProtocolError;

/// Decode one request frame. Any frame whose length differs from
/// `frame_len` is rejected before the type code is looked at.
pub fn decode_request(frame: &[u8], frame_len: usize) -> Result<Request, ProtocolError> {
    if frame.len() != frame_len {
        return Err(ProtocolError::WrongLength {
            expected: frame_len,
            got: frame.len(),
        });
    }

    let kind = RequestKind::from_code(frame[0])?;
    let request = match kind {
        RequestKind::Registration => {
            let mut color = &frame[REG_COLOR_OFFSET..REG_NAME_OFFSET];
            let r = finite(color.get_f32(), "color")?;
            let g = finite(color.get_f32(), "color")?;
            let b = finite(color.get_f32(), "color")?;
            Request::Registration {
                color: Rgb::new(r, g, b),
                name: read_name(frame, REG_NAME_OFFSET)?,
                agent_type: AgentType::from_code(frame[REG_AGENT_TYPE_OFFSET])?,
            }
        }
        RequestKind::RequestForTask => Request::RequestForTask {
            name: read_name(frame, NAME_ONLY_OFFSET)?,
        },
        RequestKind::TaskComplete => Request::TaskComplete {
            name: read_name(frame, NAME_ONLY_OFFSET)?,
        },
        RequestKind::Deregistration => Request::Deregistration {
            name: read_name(frame, NAME_ONLY_OFFSET)?,
        },
        RequestKind::PositionUpdate => {
            let mut fields = &frame[POS_START_OFFSET..POS_NAME_OFFSET];
            let start = GraphIndex(fields.get_u32() as usize);
            let end = GraphIndex(fields.get_u32() as usize);
            let fraction = finite(fields.get_f32(), "fraction")?;
            Request::PositionUpdate {
                name: read_name(frame, POS_NAME_OFFSET)?,
                start,
                end,
                fraction,
            }
        }
        RequestKind::StatusUpdate => Request::StatusUpdate {
            status: read_ascii(
                &frame[STATUS_TEXT_OFFSET..STATUS_TEXT_OFFSET + STATUS_FIELD_LEN],
                "status",
            )?,
            name: read_name(frame, STATUS_NAME_OFFSET)?,
        },
    };

    Ok(request)
}

/// Encode a request into a zero-padded frame of exactly `frame_len` bytes.
pub fn encode_request(request: &Request, frame_len: usize) -> Result<Vec<u8>, ProtocolError> {
    if frame_len < MIN_FRAME_LEN {
        return Err(ProtocolError::WrongLength {
            expected: MIN_FRAME_LEN,
            got: frame_len,
        });
    }

    let mut buf = BytesMut::with_capacity(frame_len);
    buf.put_u8(request.kind().code());

    match request {
        Request::Registration {
            color,
            name,
            agent_type,
        } => {
            buf.put_f32(color.r);
            buf.put_f32(color.g);
            buf.put_f32(color.b);
            put_ascii(&mut buf, name, NAME_FIELD_LEN, "name")?;
            buf.put_u8(agent_type.code());
        }
        Request::RequestForTask { name }
        | Request::TaskComplete { name }
        | Request::Deregistration { name } => {
            put_ascii(&mut buf, name, NAME_FIELD_LEN, "name")?;
        }
        Request::PositionUpdate {
            name,
            start,
            end,
            fraction,
        } => {
            buf.put_u32(index_to_u32(*start)?);
            buf.put_u32(index_to_u32(*end)?);
            buf.put_f32(*fraction);
            put_ascii(&mut buf, name, NAME_FIELD_LEN, "name")?;
        }
        Request::StatusUpdate { name, status } => {
            put_ascii(&mut buf, status, STATUS_FIELD_LEN, "status")?;
            put_ascii(&mut buf, name, NAME_FIELD_LEN, "name")?;
        }
    }

    buf.resize(frame_len, 0);
    Ok(buf.to_vec())
}

/// Encode a response, including its length prefix.
pub fn encode_response(response: &Response) -> Bytes {
    let mut body = BytesMut::new();
    body.put_u8(response.status.code());

    match &response.payload {
        ResponsePayload::Empty => {}
        ResponsePayload::Registration { node, map } => {
            body.put_u32(node.0 as u32);
            body.put_slice(map.as_bytes());
        }
        ResponsePayload::Work {
            task_name,
            destination,
        } => {
            let mut name: Vec<u8> = task_name
                .bytes()
                .map(|b| if b.is_ascii() { b } else { b'?' })
                .take(TASK_NAME_FIELD_LEN)
                .collect();
            name.resize(TASK_NAME_FIELD_LEN, b' ');
            body.put_slice(&name);
            body.put_u32(destination.0 as u32);
        }
    }

    let mut frame = BytesMut::with_capacity(RESPONSE_LEN_PREFIX + body.len());
    frame.put_u32(body.len() as u32);
    frame.put_slice(&body);
    frame.freeze()
}

/// Decode a full response frame (length prefix included) for a request of `kind`.
pub fn decode_response(kind: RequestKind, frame: &[u8]) -> Result<Response, ProtocolError> {
    if frame.len() < RESPONSE_LEN_PREFIX + 1 {
        return Err(ProtocolError::Truncated(format!(
            "{} bytes is shorter than a status frame",
            frame.len()
        )));
    }

    let mut cur = frame;
    let declared = cur.get_u32() as usize;
    if declared != cur.len() {
        return Err(ProtocolError::Truncated(format!(
            "length prefix says {declared} bytes, {} present",
            cur.len()
        )));
    }

    let status = StatusCode::from_code(cur.get_u8())?;
    if status != StatusCode::Success {
        return Ok(Response::failure(status));
    }

    match kind {
        RequestKind::Registration => {
            if cur.len() < 4 {
                return Err(ProtocolError::Truncated("registration node index".into()));
            }
            let node = GraphIndex(cur.get_u32() as usize);
            if !cur.is_ascii() {
                return Err(ProtocolError::NonAscii { field: "map" });
            }
            let map = String::from_utf8_lossy(cur).into_owned();
            Ok(Response::registered(node, map))
        }
        RequestKind::RequestForTask => {
            if cur.len() != TASK_NAME_FIELD_LEN + 4 {
                return Err(ProtocolError::Truncated(format!(
                    "work payload is {} bytes, expected {}",
                    cur.len(),
                    TASK_NAME_FIELD_LEN + 4
                )));
            }
            let task_name = read_ascii(&cur[..TASK_NAME_FIELD_LEN], "task_name")?;
            cur.advance(TASK_NAME_FIELD_LEN);
            let destination = GraphIndex(cur.get_u32() as usize);
            Ok(Response::work(task_name, destination))
        }
        _ => Ok(Response::ok()),
    }
}

fn read_name(frame: &[u8], offset: usize) -> Result<String, ProtocolError> {
    let name = read_ascii(&frame[offset..offset + NAME_FIELD_LEN], "name")?;
    if name.is_empty() {
        return Err(ProtocolError::EmptyField { field: "name" });
    }
    Ok(name)
}

/// Read an ASCII field, trimming space and NUL padding on both ends.
fn read_ascii(raw: &[u8], field: &'static str) -> Result<String, ProtocolError> {
    let trimmed = raw
        .iter()
        .position(|b| *b != b' ' && *b != 0)
        .map(|start| {
            let end = raw.iter().rposition(|b| *b != b' ' && *b != 0).unwrap_or(start);
            &raw[start..=end]
        })
        .unwrap_or(&[]);

    if trimmed.iter().any(|b| !b.is_ascii() || b.is_ascii_control()) {
        return Err(ProtocolError::NonAscii { field });
    }
    Ok(String::from_utf8_lossy(trimmed).into_owned())
}

fn put_ascii(
    buf: &mut BytesMut,
    value: &str,
    width: usize,
    field: &'static str,
) -> Result<(), ProtocolError> {
    if !value.is_ascii() {
        return Err(ProtocolError::NonAscii { field });
    }
    if value.len() > width {
        return Err(ProtocolError::FieldTooLong {
            field,
            len: value.len(),
            limit: width,
        });
    }
    buf.put_slice(value.as_bytes());
    buf.put_bytes(b' ', width - value.len());
    Ok(())
}

fn finite(value: f32, field: &'static str) -> Result<f32, ProtocolError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ProtocolError::NonFinite { field })
    }
}

fn index_to_u32(index: GraphIndex) -> Result<u32, ProtocolError> {
    u32::try_from(index.0).map_err(|_| ProtocolError::FieldTooLong {
        field: "node_index",
        len: 8,
        limit: 4,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_ascii_trims_spaces_and_nuls() {
        assert_eq!(read_ascii(b"  bob\0\0  ", "name").unwrap(), "bob");
        assert_eq!(read_ascii(b"\0\0\0\0", "name").unwrap(), "");
        assert_eq!(read_ascii(b"a b ", "name").unwrap(), "a b");
    }

    #[test]
    fn test_read_ascii_rejects_high_bytes() {
        assert_eq!(
            read_ascii(&[b'a', 0xC3, 0xA9], "name"),
            Err(ProtocolError::NonAscii { field: "name" })
        );
    }

    #[test]
    fn test_put_ascii_pads_with_spaces() {
        let mut buf = BytesMut::new();
        put_ascii(&mut buf, "ab", 4, "name").unwrap();
        assert_eq!(&buf[..], b"ab  ");
    }

    #[test]
    fn test_put_ascii_rejects_overlong() {
        let mut buf = BytesMut::new();
        let err = put_ascii(&mut buf, "seventeen-chars!!", NAME_FIELD_LEN, "name").unwrap_err();
        assert!(matches!(err, ProtocolError::FieldTooLong { limit: 16, .. }));
    }
}
