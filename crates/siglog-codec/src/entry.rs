use serde::{Deserialize, Serialize};

/// A signal value at one point in time. Integers outside the i32 range and
/// floats are not representable in the binary format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i32),
    Text(String),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// One observed signal change. Timestamps are Unix milliseconds, usually
/// non-decreasing across a log but not guaranteed to be — merged multi-source
/// logs can jump backwards, which the codec's delta encoding handles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: i64,
    pub device_id: String,
    pub signal_name: String,
    pub value: Value,
}

impl LogEntry {
    pub fn new(
        timestamp: i64,
        device_id: impl Into<String>,
        signal_name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            timestamp,
            device_id: device_id.into(),
            signal_name: signal_name.into(),
            value: value.into(),
        }
    }
}
