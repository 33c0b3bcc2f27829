use crate::buffer::Buffer;


/// An NTLM security buffer, pointing at data contained later in the message.
///
/// The descriptor occupies 8 bytes in the fixed part of a message: a 16-bit length, a
/// 16-bit maximum length (always equal to the length when writing) and a 32-bit offset
/// counted from the start of the message.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SecurityBuffer {
    pub length: u16,
    pub max_length: u16,
    pub offset: u32,
}

impl SecurityBuffer {
    /// Generates a security buffer describing the given slice at the given offset.
    ///
    /// The length and maximum length are both set to the length of the slice, which must
    /// fit into a u16; callers enforce this before encoding begins.
    pub fn for_slice_at(slice: &[u8], offset: u32) -> Self {
        let len_u16: u16 = slice.len()
            .try_into().expect("buffer too long for u16 length");
        Self {
            length: len_u16,
            max_length: len_u16,
            offset,
        }
    }

    /// Writes the descriptor into the target buffer.
    pub fn write_to(&self, buffer: &mut Buffer) {
        buffer.put_u16(self.length);
        buffer.put_u16(self.max_length);
        buffer.put_u32(self.offset);
    }
}

/// A running-offset accumulator emitting one security buffer per payload field.
///
/// The accumulator is seeded with the size of the fixed part of the message (everything
/// before the first payload byte), so the offsets it hands out are known before any
/// payload bytes are written. Every field produces a descriptor, including empty ones:
/// a logically absent field is represented by a zero-length descriptor pointing at the
/// current offset, never by omitting the descriptor.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct FieldLayout {
    running_offset: u32,
}

impl FieldLayout {
    /// Creates a layout whose first descriptor will point at `prefix_size`.
    pub fn starting_at(prefix_size: u32) -> Self {
        Self { running_offset: prefix_size }
    }

    /// Emits the descriptor for the next payload field and advances the running offset.
    pub fn put_field(&mut self, buffer: &mut Buffer, data: &[u8]) {
        let descriptor = SecurityBuffer::for_slice_at(data, self.running_offset);
        descriptor.write_to(buffer);
        self.running_offset += u32::from(descriptor.length);
    }

    /// Returns the offset the next descriptor would receive.
    pub fn next_offset(&self) -> u32 {
        self.running_offset
    }
}
