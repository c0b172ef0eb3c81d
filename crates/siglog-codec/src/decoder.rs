use thiserror::Error;

use crate::entry::{LogEntry, Value};
use crate::format::{self, tag};
use crate::varint;

/// Decoding failures. Unlike the encoder, the decoder operates on untrusted
/// bytes and checks everything.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("bad magic marker")]
    BadMagic,
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u8),
    #[error("truncated buffer at offset {0}")]
    Truncated(usize),
    #[error("invalid varint at offset {0}")]
    BadVarint(usize),
    #[error("string index {0} out of range")]
    BadStringIndex(u32),
    #[error("string at offset {0} is not valid UTF-8")]
    InvalidUtf8(usize),
    #[error("unknown value tag {0}")]
    UnknownValueTag(u8),
    #[error("header offsets inconsistent")]
    BadOffsets,
}

/// Mirror of [`crate::encoder::encode`]: recover the exact entry sequence
/// from an encoded buffer.
pub fn decode(data: &[u8]) -> Result<Vec<LogEntry>, DecodeError> {
    let mut cur = Cursor::new(data);

    if cur.take(4)? != format::MAGIC {
        return Err(DecodeError::BadMagic);
    }
    let version = cur.take_u8()?;
    if version != format::VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }
    let _flags = cur.take_u8()?;
    let entry_count = cur.take_u32()? as usize;
    let table_offset = cur.take_u32()? as usize;
    let data_offset = cur.take_u32()? as usize;
    let first_ts = cur.take_i64()?;

    if table_offset != format::HEADER_LEN || data_offset < table_offset || data_offset > data.len()
    {
        return Err(DecodeError::BadOffsets);
    }

    let strings = read_table(&mut cur)?;
    if cur.pos != data_offset {
        return Err(DecodeError::BadOffsets);
    }

    let mut entries = Vec::with_capacity(entry_count);
    let mut prev_ts = first_ts;
    for _ in 0..entry_count {
        let delta = read_delta(&mut cur)?;
        let ts = prev_ts + delta;
        prev_ts = ts;

        let device_id = resolve(&strings, cur.take_varint()?)?.to_string();
        let signal_name = resolve(&strings, cur.take_varint()?)?.to_string();
        let value = read_value(&mut cur, &strings)?;

        entries.push(LogEntry {
            timestamp: ts,
            device_id,
            signal_name,
            value,
        });
    }

    Ok(entries)
}

fn read_table(cur: &mut Cursor<'_>) -> Result<Vec<String>, DecodeError> {
    let count = cur.take_varint()? as usize;
    let mut strings = Vec::with_capacity(count);
    for _ in 0..count {
        let len = cur.take_varint()? as usize;
        let at = cur.pos;
        let bytes = cur.take(len)?;
        let s = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8(at))?;
        strings.push(s.to_string());
    }
    Ok(strings)
}

/// 2-byte form unless the first byte is the extended marker, in which case a
/// 4-byte two's-complement i32 follows — including negative deltas from
/// out-of-order entries.
fn read_delta(cur: &mut Cursor<'_>) -> Result<i64, DecodeError> {
    let first = cur.take_u8()?;
    if first == format::DELTA_EXT_MARKER {
        let bytes = cur.take(4)?;
        Ok(i32::from_be_bytes(bytes.try_into().expect("4 bytes")) as i64)
    } else {
        let second = cur.take_u8()?;
        Ok(u16::from_be_bytes([first, second]) as i64)
    }
}

fn read_value(cur: &mut Cursor<'_>, strings: &[String]) -> Result<Value, DecodeError> {
    let t = cur.take_u8()?;
    match t {
        tag::BOOL_FALSE => Ok(Value::Bool(false)),
        tag::BOOL_TRUE => Ok(Value::Bool(true)),
        tag::INT8 => Ok(Value::Int(cur.take_u8()? as i8 as i32)),
        tag::INT16 => {
            let bytes = cur.take(2)?;
            Ok(Value::Int(
                i16::from_be_bytes(bytes.try_into().expect("2 bytes")) as i32,
            ))
        }
        tag::INT32 => {
            let bytes = cur.take(4)?;
            Ok(Value::Int(i32::from_be_bytes(
                bytes.try_into().expect("4 bytes"),
            )))
        }
        tag::STRING_INDEX => {
            let idx = cur.take_varint()?;
            Ok(Value::Text(resolve(strings, idx)?.to_string()))
        }
        tag::STRING_RAW => {
            let len = cur.take_varint()? as usize;
            let at = cur.pos;
            let bytes = cur.take(len)?;
            let s = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8(at))?;
            Ok(Value::Text(s.to_string()))
        }
        other => Err(DecodeError::UnknownValueTag(other)),
    }
}

fn resolve(strings: &[String], idx: u32) -> Result<&str, DecodeError> {
    strings
        .get(idx as usize)
        .map(String::as_str)
        .ok_or(DecodeError::BadStringIndex(idx))
}

/// Bounds-checked reader over the input slice.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&e| e <= self.data.len())
            .ok_or(DecodeError::Truncated(self.pos))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn take_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn take_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_be_bytes(self.take(4)?.try_into().expect("4 bytes")))
    }

    fn take_i64(&mut self) -> Result<i64, DecodeError> {
        Ok(i64::from_be_bytes(self.take(8)?.try_into().expect("8 bytes")))
    }

    fn take_varint(&mut self) -> Result<u32, DecodeError> {
        let at = self.pos;
        let (value, used) =
            varint::read(&self.data[self.pos..]).ok_or(DecodeError::BadVarint(at))?;
        self.pos += used;
        Ok(value)
    }
}
