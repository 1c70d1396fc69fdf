//! Bounds checked little-endian access to chunk data.
//!
//! All multi-byte integers in resource files are stored little-endian.
//! Readers take an absolute offset into a byte slice and fail with
//! [`Error::Format`] instead of panicking when the data is too short.

use crate::error::{Error, Result};

pub(crate) fn u8_at(bytes: &[u8], offset: usize) -> Result<u8> {
    bytes
        .get(offset)
        .copied()
        .ok_or_else(|| out_of_bounds(offset, 1, bytes.len()))
}

pub(crate) fn u16_at(bytes: &[u8], offset: usize) -> Result<u16> {
    let raw = slice_at(bytes, offset, 2)?;
    Ok(u16::from_le_bytes([raw[0], raw[1]]))
}

pub(crate) fn u32_at(bytes: &[u8], offset: usize) -> Result<u32> {
    let raw = slice_at(bytes, offset, 4)?;
    Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

pub(crate) fn slice_at(bytes: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    offset
        .checked_add(len)
        .and_then(|end| bytes.get(offset..end))
        .ok_or_else(|| out_of_bounds(offset, len, bytes.len()))
}

fn out_of_bounds(offset: usize, len: usize, available: usize) -> Error {
    Error::Format(format!(
        "{:#08x}: read of {} bytes past end of data ({} bytes)",
        offset, len, available
    ))
}

pub(crate) fn push_u8(buf: &mut Vec<u8>, value: u8) {
    buf.push(value);
}

pub(crate) fn push_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn push_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn patch_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn align4(buf: &mut Vec<u8>) {
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}
