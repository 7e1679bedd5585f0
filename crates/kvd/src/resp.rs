//! RESP2 framing: decoding requests and encoding replies

use bytes::{Buf, BufMut, BytesMut};

use crate::error::ProtocolError;

/// Maximum bulk string size (512MB) - prevents memory exhaustion
const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Maximum array size (1M elements)
const MAX_ARRAY_LEN: usize = 1024 * 1024;

/// Deepest array nesting accepted; commands are flat arrays
const MAX_DEPTH: usize = 32;

/// A single RESP value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `+OK\r\n`
    Simple(String),
    /// `-ERR message\r\n`
    Error(String),
    /// `:42\r\n`
    Integer(i64),
    /// `$3\r\nfoo\r\n`
    Bulk(Vec<u8>),
    /// `$-1\r\n` (also decoded from `*-1\r\n`)
    Null,
    /// `*2\r\n...`
    Array(Vec<Frame>),
}

impl Frame {
    /// `+OK`
    pub fn ok() -> Frame {
        Frame::Simple("OK".to_string())
    }

    /// Decode one frame from the front of `buf`
    ///
    /// Returns `Ok(None)` and leaves `buf` untouched when more input is
    /// needed; on success the consumed bytes are removed. Values are only
    /// built once the whole frame has arrived.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
        if frame_end(&buf[..], 0, 0)?.is_none() {
            return Ok(None);
        }

        let (frame, end) = parse(&buf[..], 0)?;
        buf.advance(end);
        Ok(Some(frame))
    }

    /// Append the wire form of this frame to `dst`
    pub fn encode(&self, dst: &mut BytesMut) {
        match self {
            Frame::Simple(s) => {
                dst.put_u8(b'+');
                dst.put_slice(s.as_bytes());
                dst.put_slice(b"\r\n");
            }
            Frame::Error(msg) => {
                dst.put_u8(b'-');
                dst.put_slice(msg.as_bytes());
                dst.put_slice(b"\r\n");
            }
            Frame::Integer(n) => {
                dst.put_u8(b':');
                dst.put_slice(n.to_string().as_bytes());
                dst.put_slice(b"\r\n");
            }
            Frame::Bulk(data) => {
                dst.put_u8(b'$');
                dst.put_slice(data.len().to_string().as_bytes());
                dst.put_slice(b"\r\n");
                dst.put_slice(data);
                dst.put_slice(b"\r\n");
            }
            Frame::Null => dst.put_slice(b"$-1\r\n"),
            Frame::Array(items) => {
                dst.put_u8(b'*');
                dst.put_slice(items.len().to_string().as_bytes());
                dst.put_slice(b"\r\n");
                for item in items {
                    item.encode(dst);
                }
            }
        }
    }
}

/// Offset just past the frame at `pos`, or `None` if it is incomplete
///
/// Validates framing without allocating and bounds array nesting, so
/// `parse` only ever sees complete frames of limited depth.
fn frame_end(buf: &[u8], pos: usize, depth: usize) -> Result<Option<usize>, ProtocolError> {
    if depth > MAX_DEPTH {
        return Err(ProtocolError::NestingTooDeep);
    }
    let (tag, line, next) = match header(buf, pos)? {
        Some(found) => found,
        None => return Ok(None),
    };

    match tag {
        b'+' | b'-' => Ok(Some(next)),
        b':' => integer(line).map(|_| Some(next)),
        b'$' => {
            let len = match bulk_len(line)? {
                Some(len) => len,
                None => return Ok(Some(next)),
            };
            let end = next + len;
            if buf.len() < end + 2 {
                return Ok(None);
            }
            if &buf[end..end + 2] != b"\r\n" {
                return Err(ProtocolError::MissingCrlf);
            }
            Ok(Some(end + 2))
        }
        _ => {
            let len = match array_len(line)? {
                Some(len) => len,
                None => return Ok(Some(next)),
            };
            let mut cursor = next;
            for _ in 0..len {
                cursor = match frame_end(buf, cursor, depth + 1)? {
                    Some(after) => after,
                    None => return Ok(None),
                };
            }
            Ok(Some(cursor))
        }
    }
}

/// Build the frame at `pos`; the input must already have passed `frame_end`
fn parse(buf: &[u8], pos: usize) -> Result<(Frame, usize), ProtocolError> {
    let (tag, line, next) = header(buf, pos)?.ok_or(ProtocolError::MissingCrlf)?;

    match tag {
        b'+' => Ok((Frame::Simple(utf8(line)?), next)),
        b'-' => Ok((Frame::Error(utf8(line)?), next)),
        b':' => Ok((Frame::Integer(integer(line)?), next)),
        b'$' => match bulk_len(line)? {
            Some(len) => {
                let data = buf.get(next..next + len).ok_or(ProtocolError::MissingCrlf)?;
                Ok((Frame::Bulk(data.to_vec()), next + len + 2))
            }
            None => Ok((Frame::Null, next)),
        },
        _ => match array_len(line)? {
            Some(len) => {
                let mut items = Vec::with_capacity(len.min(64));
                let mut cursor = next;
                for _ in 0..len {
                    let (item, after) = parse(buf, cursor)?;
                    items.push(item);
                    cursor = after;
                }
                Ok((Frame::Array(items), cursor))
            }
            None => Ok((Frame::Null, next)),
        },
    }
}

/// Type byte and header line of the frame at `pos`, plus the offset after it
fn header(buf: &[u8], pos: usize) -> Result<Option<(u8, &[u8], usize)>, ProtocolError> {
    let tag = match buf.get(pos) {
        Some(&tag) => tag,
        None => return Ok(None),
    };
    if !matches!(tag, b'+' | b'-' | b':' | b'$' | b'*') {
        return Err(ProtocolError::UnknownType(tag));
    }

    Ok(read_line(buf, pos + 1).map(|(line, next)| (tag, line, next)))
}

fn bulk_len(line: &[u8]) -> Result<Option<usize>, ProtocolError> {
    match length(integer(line)?)? {
        Some(len) if len > MAX_BULK_LEN => Err(ProtocolError::BulkTooLarge(len)),
        len => Ok(len),
    }
}

fn array_len(line: &[u8]) -> Result<Option<usize>, ProtocolError> {
    match length(integer(line)?)? {
        Some(len) if len > MAX_ARRAY_LEN => Err(ProtocolError::ArrayTooLarge(len)),
        len => Ok(len),
    }
}

/// Line starting at `pos` without its CRLF, and the offset after the CRLF
fn read_line(buf: &[u8], pos: usize) -> Option<(&[u8], usize)> {
    let rest = buf.get(pos..)?;
    rest.windows(2)
        .position(|w| w == b"\r\n")
        .map(|i| (&rest[..i], pos + i + 2))
}

fn utf8(line: &[u8]) -> Result<String, ProtocolError> {
    String::from_utf8(line.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)
}

fn integer(line: &[u8]) -> Result<i64, ProtocolError> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ProtocolError::InvalidInteger(String::from_utf8_lossy(line).into_owned()))
}

/// `-1` means null; any other negative length is an error
fn length(n: i64) -> Result<Option<usize>, ProtocolError> {
    match n {
        -1 => Ok(None),
        n if n < 0 => Err(ProtocolError::InvalidLength(n)),
        n => Ok(Some(n as usize)),
    }
}
