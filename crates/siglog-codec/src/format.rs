/// Binary layout of an encoded log buffer.
///
/// ```text
/// [0..4]    Magic "SLOG"
/// [4]       Format version
/// [5]       Flags (reserved, 0)
/// [6..10]   Entry count (u32 BE)
/// [10..14]  String table offset (u32 BE, always HEADER_LEN)
/// [14..18]  Entry data offset (u32 BE)
/// [18..26]  First absolute timestamp (i64 BE, Unix milliseconds)
/// ```
///
/// String table: `count` varint, then per string a `len` varint followed by
/// raw UTF-8 bytes, in intern order.
///
/// Entry record: `delta(2 or 5) | device_idx(varint) | signal_idx(varint) |
/// value_tag(1) | value_bytes(0..n)`.

/// Magic marker at the start of every encoded buffer.
pub const MAGIC: [u8; 4] = *b"SLOG";

/// Current format version.
pub const VERSION: u8 = 1;

/// Fixed header length in bytes.
pub const HEADER_LEN: usize = 26;

/// First byte of the 5-byte extended delta form.
///
/// The short form is 2 bytes big-endian, so any short delta whose high byte
/// is 0xFF would be indistinguishable from the marker. Deltas in
/// `DELTA_SHORT_LIMIT..=u16::MAX` therefore take the extended form even
/// though they would fit in 16 bits.
pub const DELTA_EXT_MARKER: u8 = 0xFF;

/// Exclusive upper bound for the 2-byte delta form.
pub const DELTA_SHORT_LIMIT: i64 = 0xFF00;

/// Value tag bytes.
pub mod tag {
    pub const BOOL_FALSE: u8 = 0;
    pub const BOOL_TRUE: u8 = 1;
    pub const INT8: u8 = 2;
    pub const INT16: u8 = 3;
    pub const INT32: u8 = 4;
    /// Varint index into the string table.
    pub const STRING_INDEX: u8 = 5;
    /// Inline string: varint length + raw UTF-8. The encoder interns every
    /// string value, so it never emits this, but decoders must accept it.
    pub const STRING_RAW: u8 = 6;
}
