//! Binary codec for variant values.
//!
//! Layout (all integers big-endian):
//! ```text
//! [tag:1][payload]
//!   0x00 null       -
//!   0x01 bool       [0|1]
//!   0x02 integer    [i64:8]
//!   0x03 float      [f64:8]
//!   0x04 datetime   [i64:8]          epoch milliseconds
//!   0x05 string     [len:8][utf8:N]
//!   0x06 bytes      [len:8][raw:N]
//!   0x07 list       [count:8]([tag][payload])*
//!   0x08 map        [count:8]([len:8][key:N][tag][payload])*
//! ```
//!
//! # Invariants
//! - Every encoding starts with a tag in `0x00..=0x08`, so no encoding can
//!   begin with the overflow sentinel's first byte (`0xDE`).
//! - `decode` consumes the whole input; trailing bytes are an error.
//! - Values nested deeper than `MAX_DECODE_DEPTH` are rejected by
//!   `check_depth` before they are written and by `decode` when read.

mod reader;

use crate::model::data::{Data, DataMap};
use reader::ByteReader;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const TAG_NULL: u8 = 0x00;
pub const TAG_BOOL: u8 = 0x01;
pub const TAG_INTEGER: u8 = 0x02;
pub const TAG_FLOAT: u8 = 0x03;
pub const TAG_DATETIME: u8 = 0x04;
pub const TAG_STRING: u8 = 0x05;
pub const TAG_BYTES: u8 = 0x06;
pub const TAG_LIST: u8 = 0x07;
pub const TAG_MAP: u8 = 0x08;

/// Nesting limit applied to stored values and to decoded bytes.
pub const MAX_DECODE_DEPTH: usize = 256;

const LEN_SIZE: usize = 8;

pub type CodecResult<T> = Result<T, CodecError>;

/// Errors raised while decoding stored bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    UnexpectedEof { offset: usize, needed: usize },
    UnknownTag { offset: usize, tag: u8 },
    InvalidBool { offset: usize, value: u8 },
    InvalidUtf8 { offset: usize },
    LengthOverflow { offset: usize, len: u64 },
    TrailingBytes { offset: usize, remaining: usize },
    DepthLimitExceeded { limit: usize },
}

impl Display for CodecError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnexpectedEof { offset, needed } => {
                write!(f, "unexpected EOF at offset {offset}, need {needed} bytes")
            }
            Self::UnknownTag { offset, tag } => {
                write!(f, "unknown value tag 0x{tag:02x} at offset {offset}")
            }
            Self::InvalidBool { offset, value } => {
                write!(f, "invalid bool byte 0x{value:02x} at offset {offset}")
            }
            Self::InvalidUtf8 { offset } => write!(f, "invalid UTF-8 text at offset {offset}"),
            Self::LengthOverflow { offset, len } => {
                write!(f, "length {len} at offset {offset} exceeds remaining input")
            }
            Self::TrailingBytes { offset, remaining } => {
                write!(f, "{remaining} trailing bytes after value ending at offset {offset}")
            }
            Self::DepthLimitExceeded { limit } => {
                write!(f, "value nesting exceeds limit of {limit}")
            }
        }
    }
}

impl Error for CodecError {}

/// Encodes one value into a fresh buffer.
pub fn encode(value: &Data) -> Vec<u8> {
    let mut buf = Vec::with_capacity(encoded_len(value));
    encode_into(&mut buf, value);
    buf
}

/// Checks that `value` nests no deeper than `decode` accepts.
///
/// The top-level value sits at depth 0 and every list or map entry one
/// level below its container, matching the count `decode` keeps.
///
/// # Errors
/// - `DepthLimitExceeded` when any value sits below `MAX_DECODE_DEPTH`.
pub fn check_depth(value: &Data) -> CodecResult<()> {
    fn within_limit(value: &Data, depth: usize) -> bool {
        if depth > MAX_DECODE_DEPTH {
            return false;
        }
        match value {
            Data::List(items) => items.iter().all(|item| within_limit(item, depth + 1)),
            Data::Map(entries) => entries.values().all(|item| within_limit(item, depth + 1)),
            _ => true,
        }
    }

    if within_limit(value, 0) {
        Ok(())
    } else {
        Err(CodecError::DepthLimitExceeded {
            limit: MAX_DECODE_DEPTH,
        })
    }
}

/// Appends the encoding of `value` to `buf`.
pub fn encode_into(buf: &mut Vec<u8>, value: &Data) {
    match value {
        Data::Null => buf.push(TAG_NULL),
        Data::Bool(flag) => {
            buf.push(TAG_BOOL);
            buf.push(u8::from(*flag));
        }
        Data::Integer(number) => {
            buf.push(TAG_INTEGER);
            buf.extend_from_slice(&number.to_be_bytes());
        }
        Data::Float(number) => {
            buf.push(TAG_FLOAT);
            buf.extend_from_slice(&number.to_be_bytes());
        }
        Data::DateTime(epoch_ms) => {
            buf.push(TAG_DATETIME);
            buf.extend_from_slice(&epoch_ms.to_be_bytes());
        }
        Data::String(text) => {
            buf.push(TAG_STRING);
            encode_prefixed(buf, text.as_bytes());
        }
        Data::Bytes(raw) => {
            buf.push(TAG_BYTES);
            encode_prefixed(buf, raw);
        }
        Data::List(items) => {
            buf.push(TAG_LIST);
            encode_len(buf, items.len());
            for item in items {
                encode_into(buf, item);
            }
        }
        Data::Map(entries) => {
            buf.push(TAG_MAP);
            encode_len(buf, entries.len());
            for (key, item) in entries {
                encode_prefixed(buf, key.as_bytes());
                encode_into(buf, item);
            }
        }
    }
}

/// Returns the exact number of bytes `encode(value)` produces.
pub fn encoded_len(value: &Data) -> usize {
    1 + match value {
        Data::Null => 0,
        Data::Bool(_) => 1,
        Data::Integer(_) | Data::Float(_) | Data::DateTime(_) => 8,
        Data::String(text) => LEN_SIZE + text.len(),
        Data::Bytes(raw) => LEN_SIZE + raw.len(),
        Data::List(items) => LEN_SIZE + items.iter().map(encoded_len).sum::<usize>(),
        Data::Map(entries) => {
            LEN_SIZE
                + entries
                    .iter()
                    .map(|(key, item)| LEN_SIZE + key.len() + encoded_len(item))
                    .sum::<usize>()
        }
    }
}

/// Decodes one value; the input must contain exactly one encoding.
pub fn decode(bytes: &[u8]) -> CodecResult<Data> {
    let mut reader = ByteReader::new(bytes);
    let value = decode_value(&mut reader, 0)?;
    if reader.remaining() > 0 {
        return Err(CodecError::TrailingBytes {
            offset: reader.position(),
            remaining: reader.remaining(),
        });
    }
    Ok(value)
}

fn encode_len(buf: &mut Vec<u8>, len: usize) {
    buf.extend_from_slice(&(len as u64).to_be_bytes());
}

fn encode_prefixed(buf: &mut Vec<u8>, data: &[u8]) {
    encode_len(buf, data.len());
    buf.extend_from_slice(data);
}

fn decode_value(reader: &mut ByteReader<'_>, depth: usize) -> CodecResult<Data> {
    if depth > MAX_DECODE_DEPTH {
        return Err(CodecError::DepthLimitExceeded {
            limit: MAX_DECODE_DEPTH,
        });
    }

    let offset = reader.position();
    let tag = reader.read_u8()?;
    match tag {
        TAG_NULL => Ok(Data::Null),
        TAG_BOOL => {
            let value_offset = reader.position();
            match reader.read_u8()? {
                0 => Ok(Data::Bool(false)),
                1 => Ok(Data::Bool(true)),
                value => Err(CodecError::InvalidBool {
                    offset: value_offset,
                    value,
                }),
            }
        }
        TAG_INTEGER => Ok(Data::Integer(reader.read_i64()?)),
        TAG_FLOAT => Ok(Data::Float(reader.read_f64()?)),
        TAG_DATETIME => Ok(Data::DateTime(reader.read_i64()?)),
        TAG_STRING => Ok(Data::String(read_text(reader)?)),
        TAG_BYTES => Ok(Data::Bytes(reader.read_prefixed()?.to_vec())),
        TAG_LIST => {
            let count = reader.read_len(1)?;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(decode_value(reader, depth + 1)?);
            }
            Ok(Data::List(items))
        }
        TAG_MAP => {
            let count = reader.read_len(LEN_SIZE + 1)?;
            let mut entries = DataMap::new();
            for _ in 0..count {
                let key = read_text(reader)?;
                let item = decode_value(reader, depth + 1)?;
                entries.insert(key, item);
            }
            Ok(Data::Map(entries))
        }
        tag => Err(CodecError::UnknownTag { offset, tag }),
    }
}

fn read_text(reader: &mut ByteReader<'_>) -> CodecResult<String> {
    let offset = reader.position();
    let raw = reader.read_prefixed()?;
    String::from_utf8(raw.to_vec()).map_err(|_| CodecError::InvalidUtf8 { offset })
}
