use bytes::Bytes;

use crate::entry::{LogEntry, Value};
use crate::format::{self, tag};
use crate::table::StringTable;
use crate::varint;

/// Encode an ordered sequence of entries into one self-contained buffer:
/// header, string table, then one variable-length record per entry.
///
/// Infallible by design: the codec trusts well-typed input. The only hard
/// limits are the varint bounds (string table and indices below 2^28) and
/// timestamp deltas within the i32 range, both far beyond real logs.
pub fn encode(entries: &[LogEntry]) -> Bytes {
    let table = StringTable::build(entries);

    let first_ts = entries.first().map_or(0, |e| e.timestamp);
    let table_len = table.encoded_len();
    let data_offset = format::HEADER_LEN + table_len;

    let mut buf = Vec::with_capacity(data_offset + entries.len() * 8);

    // Header
    buf.extend_from_slice(&format::MAGIC);
    buf.push(format::VERSION);
    buf.push(0); // flags, reserved
    buf.extend_from_slice(&(entries.len() as u32).to_be_bytes());
    buf.extend_from_slice(&(format::HEADER_LEN as u32).to_be_bytes());
    buf.extend_from_slice(&(data_offset as u32).to_be_bytes());
    buf.extend_from_slice(&first_ts.to_be_bytes());
    debug_assert_eq!(buf.len(), format::HEADER_LEN);

    table.write_to(&mut buf);
    debug_assert_eq!(buf.len(), data_offset);

    let mut prev_ts = first_ts;
    for entry in entries {
        write_delta(&mut buf, entry.timestamp - prev_ts);
        prev_ts = entry.timestamp;

        // Both interned during the build scan.
        let device_idx = table.lookup(&entry.device_id).unwrap_or(0);
        let signal_idx = table.lookup(&entry.signal_name).unwrap_or(0);
        varint::write(&mut buf, device_idx);
        varint::write(&mut buf, signal_idx);

        write_value(&mut buf, &entry.value, &table);
    }

    Bytes::from(buf)
}

/// Short form: 2 bytes BE for `0 <= delta < 0xFF00`. Anything else — large
/// jumps, and negative deltas from out-of-order entries — takes the marker
/// byte plus a 4-byte two's-complement i32.
fn write_delta(buf: &mut Vec<u8>, delta: i64) {
    if (0..format::DELTA_SHORT_LIMIT).contains(&delta) {
        buf.extend_from_slice(&(delta as u16).to_be_bytes());
    } else {
        debug_assert!(i32::try_from(delta).is_ok(), "timestamp delta exceeds i32");
        buf.push(format::DELTA_EXT_MARKER);
        buf.extend_from_slice(&(delta as i32).to_be_bytes());
    }
}

fn write_value(buf: &mut Vec<u8>, value: &Value, table: &StringTable) {
    match value {
        Value::Bool(false) => buf.push(tag::BOOL_FALSE),
        Value::Bool(true) => buf.push(tag::BOOL_TRUE),
        Value::Int(n) => {
            // Minimal signed width.
            if let Ok(v) = i8::try_from(*n) {
                buf.push(tag::INT8);
                buf.push(v as u8);
            } else if let Ok(v) = i16::try_from(*n) {
                buf.push(tag::INT16);
                buf.extend_from_slice(&v.to_be_bytes());
            } else {
                buf.push(tag::INT32);
                buf.extend_from_slice(&n.to_be_bytes());
            }
        }
        Value::Text(s) => match table.lookup(s) {
            Some(idx) => {
                buf.push(tag::STRING_INDEX);
                varint::write(buf, idx);
            }
            // Unreachable when the table was built from the same entries,
            // but the inline form keeps the writer total.
            None => {
                buf.push(tag::STRING_RAW);
                varint::write(buf, s.len() as u32);
                buf.extend_from_slice(s.as_bytes());
            }
        },
    }
}
