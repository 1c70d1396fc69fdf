use crate::chunks::{begin_chunk, finish_chunk, Chunk, ChunkType};
use crate::endianness::{push_u16, push_u32, push_u8, slice_at, u16_at, u32_at, u8_at};
use crate::error::{Error, Result};
use bitflags::bitflags;
use std::collections::HashMap;

/// Size of `ResStringPool_header`.
const HEADER_SIZE: u16 = 28;

bitflags! {
    pub struct StringPoolFlags: u32 {
        const SORTED = 1 << 0;
        const UTF8 = 1 << 8;
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Encoding {
    Utf8,
    Utf16,
}

#[derive(Debug, Clone)]
pub struct LoadedStringPool<'bytes> {
    encoding: Encoding,
    bytes: &'bytes [u8],
    string_count: usize,
    offsets_start: usize,
    strings_start: usize,
    style_count: usize,
}

impl<'bytes> LoadedStringPool<'bytes> {
    pub fn from_chunk(chunk: &Chunk<'bytes>) -> Result<LoadedStringPool<'bytes>> {
        let bytes = match *chunk {
            Chunk::StringPool(bytes) => bytes,
            ref other => {
                return Err(Error::format(format!(
                    "expected string pool, found {:?}",
                    other.header().map(|h| h.type_)
                )))
            }
        };
        let header = chunk.header()?;

        if (header.size as usize) < HEADER_SIZE as usize {
            return Err(Error::format(format!("size {} too small", header.size)));
        }
        if header.header_size < HEADER_SIZE {
            return Err(Error::format(format!(
                "header size {} too small",
                header.header_size
            )));
        }

        let string_count = u32_at(bytes, 8)? as usize;
        let style_count = u32_at(bytes, 12)? as usize;
        let flags = StringPoolFlags::from_bits_truncate(u32_at(bytes, 16)?);
        let strings_start = u32_at(bytes, 20)? as usize;
        let offsets_start = header.header_size as usize;

        // both offset arrays must fit in the chunk
        let offsets_len = string_count
            .checked_add(style_count)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| Error::format("string pool counts overflow"))?;
        slice_at(bytes, offsets_start, offsets_len).map_err(|_| {
            Error::format(format!("truncated string pool: {} strings", string_count))
        })?;
        if string_count > 0 && strings_start >= bytes.len() {
            return Err(Error::format(format!(
                "strings start {:#x} outside of chunk of {} bytes",
                strings_start,
                bytes.len()
            )));
        }

        Ok(LoadedStringPool {
            encoding: if flags.contains(StringPoolFlags::UTF8) {
                Encoding::Utf8
            } else {
                Encoding::Utf16
            },
            bytes,
            string_count,
            offsets_start,
            strings_start,
            style_count,
        })
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn string_count(&self) -> usize {
        self.string_count
    }

    #[allow(dead_code)]
    pub fn style_count(&self) -> usize {
        self.style_count
    }

    pub fn string_at(&self, i: usize) -> Result<String> {
        if i >= self.string_count {
            return Err(Error::format(format!(
                "string index {} out of range ({} strings)",
                i, self.string_count
            )));
        }
        let offset = u32_at(self.bytes, self.offsets_start + i * 4)? as usize;
        let start = self
            .strings_start
            .checked_add(offset)
            .ok_or_else(|| Error::format("string offset overflow"))?;
        match self.encoding {
            Encoding::Utf8 => self.string_at_utf8(start),
            Encoding::Utf16 => self.string_at_utf16(start),
        }
    }

    /// Decode every string, in index order.
    pub fn strings(&self) -> Result<Vec<String>> {
        (0..self.string_count).map(|i| self.string_at(i)).collect()
    }

    fn string_at_utf8(&self, start: usize) -> Result<String> {
        fn decode_len(bytes: &[u8], offset: usize) -> Result<(usize, usize)> {
            let len = u8_at(bytes, offset)? as usize;
            if (len & 0x80) != 0 {
                let len = (len & 0x7f) << 8 | u8_at(bytes, offset + 1)? as usize;
                Ok((2, len))
            } else {
                Ok((1, len))
            }
        }

        // length is encoded twice (UTF-16 units, then UTF-8 bytes), so fast
        // forward over the first instance
        let (bump, _) = decode_len(self.bytes, start)?;
        let (bump2, len) = decode_len(self.bytes, start + bump)?;
        let data = slice_at(self.bytes, start + bump + bump2, len)?;
        Ok(String::from_utf8_lossy(data).into_owned())
    }

    fn string_at_utf16(&self, start: usize) -> Result<String> {
        fn decode_len(bytes: &[u8], offset: usize) -> Result<(usize, usize)> {
            let len = u16_at(bytes, offset)? as usize;
            if (len & 0x8000) != 0 {
                let len = (len & 0x7fff) << 16 | u16_at(bytes, offset + 2)? as usize;
                Ok((4, len))
            } else {
                Ok((2, len))
            }
        }

        let (bump, len) = decode_len(self.bytes, start)?;
        let byte_len = len
            .checked_mul(2)
            .ok_or_else(|| Error::format("UTF-16 string length overflow"))?;
        let data = slice_at(self.bytes, start + bump, byte_len)?;
        let units = data
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect::<Vec<_>>();
        Ok(String::from_utf16_lossy(&units))
    }
}

/// Collects unique strings and serializes them as a string pool chunk.
#[derive(Debug, Clone)]
pub struct StringPoolBuilder {
    encoding: Encoding,
    strings: Vec<String>,
    indices: HashMap<String, u32>,
}

impl StringPoolBuilder {
    pub fn new(encoding: Encoding) -> StringPoolBuilder {
        StringPoolBuilder {
            encoding,
            strings: Vec::new(),
            indices: HashMap::new(),
        }
    }

    /// Index of `value`, appending it if it is not in the pool yet.
    pub fn intern(&mut self, value: &str) -> u32 {
        if let Some(&idx) = self.indices.get(value) {
            return idx;
        }
        let idx = self.strings.len() as u32;
        self.strings.push(value.to_owned());
        self.indices.insert(value.to_owned(), idx);
        idx
    }

    pub fn index_of(&self, value: &str) -> Option<u32> {
        self.indices.get(value).copied()
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn write(&self, buf: &mut Vec<u8>) {
        let mut data = Vec::new();
        let mut offsets = Vec::with_capacity(self.strings.len());
        for s in &self.strings {
            offsets.push(data.len() as u32);
            match self.encoding {
                Encoding::Utf8 => write_utf8(&mut data, s),
                Encoding::Utf16 => write_utf16(&mut data, s),
            }
        }
        crate::endianness::align4(&mut data);

        let flags = match self.encoding {
            Encoding::Utf8 => StringPoolFlags::UTF8,
            Encoding::Utf16 => StringPoolFlags::empty(),
        };
        let start = begin_chunk(buf, ChunkType::StringPool, HEADER_SIZE);
        push_u32(buf, self.strings.len() as u32);
        push_u32(buf, 0); // style count
        push_u32(buf, flags.bits());
        push_u32(buf, HEADER_SIZE as u32 + self.strings.len() as u32 * 4);
        push_u32(buf, 0); // styles start
        for offset in offsets {
            push_u32(buf, offset);
        }
        buf.extend_from_slice(&data);
        finish_chunk(buf, start);
    }
}

fn write_utf8(buf: &mut Vec<u8>, s: &str) {
    fn push_len(buf: &mut Vec<u8>, len: usize) {
        if len > 0x7f {
            push_u8(buf, 0x80 | ((len >> 8) & 0x7f) as u8);
        }
        push_u8(buf, (len & 0xff) as u8);
    }

    push_len(buf, s.encode_utf16().count());
    push_len(buf, s.len());
    buf.extend_from_slice(s.as_bytes());
    push_u8(buf, 0);
}

fn write_utf16(buf: &mut Vec<u8>, s: &str) {
    let units = s.encode_utf16().collect::<Vec<_>>();
    if units.len() > 0x7fff {
        push_u16(buf, 0x8000 | ((units.len() >> 16) & 0x7fff) as u16);
    }
    push_u16(buf, (units.len() & 0xffff) as u16);
    for unit in units {
        push_u16(buf, unit);
    }
    push_u16(buf, 0);
}
