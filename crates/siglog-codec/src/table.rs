use std::collections::HashMap;

use crate::entry::{LogEntry, Value};
use crate::varint;

/// Deduplicated string dictionary for one encoding unit.
///
/// Strings are stored in encounter order and that order is part of the wire
/// format: decoders resolve indices positionally, so building the table from
/// the same entry sequence must always produce the same layout.
#[derive(Debug, Default, Clone)]
pub struct StringTable {
    strings: Vec<String>,
    index: HashMap<String, u32>,
}

impl StringTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan `entries` once and intern every device id, signal name, and
    /// string-typed value in encounter order.
    pub fn build(entries: &[LogEntry]) -> Self {
        let mut table = Self::new();
        for entry in entries {
            table.intern(&entry.device_id);
            table.intern(&entry.signal_name);
            if let Value::Text(s) = &entry.value {
                table.intern(s);
            }
        }
        table
    }

    /// Insert `s` if unseen; returns its stable index either way.
    pub fn intern(&mut self, s: &str) -> u32 {
        if let Some(&idx) = self.index.get(s) {
            return idx;
        }
        let idx = self.strings.len() as u32;
        self.strings.push(s.to_string());
        self.index.insert(s.to_string(), idx);
        idx
    }

    /// Index of an already-interned string.
    pub fn lookup(&self, s: &str) -> Option<u32> {
        self.index.get(s).copied()
    }

    pub fn get(&self, idx: u32) -> Option<&str> {
        self.strings.get(idx as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Serialize as `count` varint then per-string `len` varint + UTF-8
    /// bytes, appended to `buf`.
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        varint::write(buf, self.strings.len() as u32);
        for s in &self.strings {
            varint::write(buf, s.len() as u32);
            buf.extend_from_slice(s.as_bytes());
        }
    }

    /// Serialized size in bytes.
    pub fn encoded_len(&self) -> usize {
        let mut n = varint::encoded_len(self.strings.len() as u32);
        for s in &self.strings {
            n += varint::encoded_len(s.len() as u32) + s.len();
        }
        n
    }
}
