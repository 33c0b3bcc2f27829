/// A growable little-endian byte buffer with an implicit write cursor at the end.
///
/// All writes append; once a byte has been written it is never revisited. Callers that
/// need to place a value computed later (such as a message integrity code) re-encode the
/// whole message with the value known instead of patching the buffer in place.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct Buffer {
    bytes: Vec<u8>,
}

impl Buffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Creates an empty buffer with space preallocated for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { bytes: Vec::with_capacity(capacity) }
    }

    /// Returns the number of bytes written so far.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns whether nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Appends a single byte.
    pub fn put_u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    /// Appends a 16-bit unsigned integer in little-endian byte order.
    pub fn put_u16(&mut self, value: u16) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    /// Appends a 32-bit unsigned integer in little-endian byte order.
    pub fn put_u32(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    /// Appends a 64-bit unsigned integer in little-endian byte order.
    pub fn put_u64(&mut self, value: u64) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    /// Appends a slice of bytes verbatim.
    pub fn put_raw_bytes(&mut self, data: &[u8]) {
        self.bytes.extend_from_slice(data);
    }

    /// Appends `count` zero bytes, for reserved parts of messages and headers.
    pub fn put_reserved(&mut self, count: usize) {
        self.bytes.resize(self.bytes.len() + count, 0x00);
    }

    /// Appends a string as UTF-16 code units in little-endian byte order.
    ///
    /// No terminator is written; callers wanting one append it explicitly.
    pub fn put_utf16_string(&mut self, string: &str) {
        for unit in string.encode_utf16() {
            self.bytes.extend_from_slice(&unit.to_le_bytes());
        }
    }

    /// Consumes the buffer, returning the written bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Borrows the written bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}
