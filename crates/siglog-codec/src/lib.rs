//! Binary codec for industrial signal-change logs.
//!
//! Large PLC logs are dominated by a small vocabulary of device ids and
//! signal names repeated across hundreds of thousands of entries, with
//! near-sequential timestamps. The format exploits both:
//! - a deduplicated string table replaces repeated strings with varint
//!   indices
//! - timestamps are stored as deltas from the previous entry (2 bytes in the
//!   common case)
//! - values carry a one-byte tag and the minimal width for their type
//!
//! The output is still worth running through general-purpose compression;
//! this layer exists to strip the structural redundancy gzip is bad at.

pub mod decoder;
pub mod encoder;
pub mod entry;
pub mod format;
pub mod stream;
pub mod table;
pub mod varint;

pub use decoder::{DecodeError, decode};
pub use encoder::encode;
pub use entry::{LogEntry, Value};
pub use stream::StreamingEncoder;
pub use table::StringTable;
