//! Little-endian integer access at arbitrary buffer offsets.
//!
//! None of these functions check bounds on their own beyond what slice indexing does: the caller
//! sizes the buffer for the command it builds or decodes, and an offset that does not leave room for
//! the integer is a bug at the call site (and panics).

use byteorder::{ByteOrder, LittleEndian};

/// Reads a `u16` stored at `buf[offset..offset + 2]`.
pub(crate) fn get_u16(buf: &[u8], offset: usize) -> u16 {
    LittleEndian::read_u16(&buf[offset..offset + 2])
}

/// Stores `value` at `buf[offset..offset + 2]`.
pub(crate) fn set_u16(buf: &mut [u8], value: u16, offset: usize) {
    LittleEndian::write_u16(&mut buf[offset..offset + 2], value);
}

/// Reads a `u32` stored at `buf[offset..offset + 4]`.
pub(crate) fn get_u32(buf: &[u8], offset: usize) -> u32 {
    LittleEndian::read_u32(&buf[offset..offset + 4])
}

/// Stores `value` at `buf[offset..offset + 4]`.
pub(crate) fn set_u32(buf: &mut [u8], value: u32, offset: usize) {
    LittleEndian::write_u32(&mut buf[offset..offset + 4], value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unaligned_offsets() {
        let mut buf = [0xAA; 7];
        set_u32(&mut buf, 0x1234_5678, 1);
        assert_eq!(buf, [0xAA, 0x78, 0x56, 0x34, 0x12, 0xAA, 0xAA]);
        assert_eq!(get_u32(&buf, 1), 0x1234_5678);

        set_u16(&mut buf, 0xBEEF, 5);
        assert_eq!(&buf[5..], &[0xEF, 0xBE]);
        assert_eq!(get_u16(&buf, 5), 0xBEEF);
        assert_eq!(get_u16(&buf, 0), 0x78AA);
    }

    #[test]
    #[should_panic]
    fn short_buffer_is_a_caller_bug() {
        get_u32(&[0; 3], 0);
    }
}
