use crate::endianness::{u16_at, u32_at};
use crate::error::{Error, Result};
use num_enum::TryFromPrimitive;
use std::convert::TryFrom;

#[derive(Debug, Clone, Copy, Eq, PartialEq, TryFromPrimitive)]
#[repr(u16)]
pub enum ChunkType {
    Null = 0x0000,
    StringPool = 0x0001,
    Table = 0x0002,
    Xml = 0x0003,

    // Xml chunk types
    XmlStartNamespace = 0x0100,
    XmlEndNamespace = 0x0101,
    XmlStartElement = 0x0102,
    XmlEndElement = 0x0103,
    XmlCdata = 0x0104,
    XmlResourceMap = 0x0180,

    // Chunk types following Table
    Package = 0x0200,
    Type = 0x0201,
    Spec = 0x0202,
    Library = 0x0203,
    Overlayable = 0x0204,
    OverlayablePolicy = 0x0205,
    StagedAlias = 0x0206,
}

/// Size of the common chunk header: type, header size and chunk size.
pub const HEADER_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Header {
    pub type_: u16,
    pub header_size: u16,
    pub size: u32,
}

impl Header {
    pub fn parse(bytes: &[u8]) -> Result<Header> {
        Ok(Header {
            type_: u16_at(bytes, 0)?,
            header_size: u16_at(bytes, 2)?,
            size: u32_at(bytes, 4)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Chunk<'bytes> {
    Table(&'bytes [u8]),
    Package(&'bytes [u8]),
    StringPool(&'bytes [u8]),
    Spec(&'bytes [u8]),
    Type(&'bytes [u8]),
    Xml(&'bytes [u8]),
    XmlStartNamespace(&'bytes [u8]),
    XmlEndNamespace(&'bytes [u8]),
    XmlStartElement(&'bytes [u8]),
    XmlEndElement(&'bytes [u8]),
    XmlCdata(&'bytes [u8]),
    XmlResourceMap(&'bytes [u8]),
    /// Any chunk this crate does not interpret: the raw type and the bytes.
    Unknown(u16, &'bytes [u8]),
    Error(String),
}

impl<'bytes> Chunk<'bytes> {
    /// The complete chunk, header included.
    pub fn bytes(&self) -> Option<&'bytes [u8]> {
        match *self {
            Chunk::Table(b)
            | Chunk::Package(b)
            | Chunk::StringPool(b)
            | Chunk::Spec(b)
            | Chunk::Type(b)
            | Chunk::Xml(b)
            | Chunk::XmlStartNamespace(b)
            | Chunk::XmlEndNamespace(b)
            | Chunk::XmlStartElement(b)
            | Chunk::XmlEndElement(b)
            | Chunk::XmlCdata(b)
            | Chunk::XmlResourceMap(b)
            | Chunk::Unknown(_, b) => Some(b),
            Chunk::Error(_) => None,
        }
    }

    pub fn header(&self) -> Result<Header> {
        match self {
            Chunk::Error(msg) => Err(Error::Format(msg.clone())),
            _ => Header::parse(self.bytes().unwrap_or_default()),
        }
    }

    /// Turn an iteration error into an `Err`, pass every other chunk through.
    pub fn into_result(self) -> Result<Chunk<'bytes>> {
        match self {
            Chunk::Error(msg) => Err(Error::Format(msg)),
            chunk => Ok(chunk),
        }
    }

    /// Iterate over the child chunks of a container chunk.
    pub fn iter(&self) -> Option<ChunkIterator<'bytes>> {
        match *self {
            Chunk::Table(bytes) | Chunk::Package(bytes) | Chunk::Xml(bytes) => {
                let header_size = u16_at(bytes, 2).ok()? as usize;
                let inner = bytes.get(header_size..)?;
                Some(ChunkIterator::new(inner))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChunkIterator<'bytes> {
    data: &'bytes [u8],
    offset: usize,
}

impl<'bytes> ChunkIterator<'bytes> {
    pub fn new(data: &'bytes [u8]) -> ChunkIterator<'bytes> {
        ChunkIterator { data, offset: 0 }
    }

    fn invalidate(&mut self) {
        self.offset = self.data.len();
    }
}

impl<'bytes> Iterator for ChunkIterator<'bytes> {
    type Item = Chunk<'bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        // check if iteration is already done
        if self.offset >= self.data.len() {
            return None;
        }

        // read header
        let bytes_left = self.data.len() - self.offset;
        if bytes_left < HEADER_SIZE {
            let offset = self.offset;
            self.invalidate();
            return Some(Chunk::Error(format!(
                "{:#08x}: {} bytes left cannot contain header",
                offset, bytes_left
            )));
        }
        let header = match Header::parse(&self.data[self.offset..]) {
            Ok(header) => header,
            Err(e) => {
                self.invalidate();
                return Some(Chunk::Error(e.to_string()));
            }
        };
        let size = header.size as usize;
        let header_size = header.header_size as usize;
        if header_size < HEADER_SIZE {
            let offset = self.offset;
            self.invalidate();
            return Some(Chunk::Error(format!(
                "{:#08x}: header size {} too small",
                offset, header_size
            )));
        }
        if size < header_size {
            let offset = self.offset;
            self.invalidate();
            return Some(Chunk::Error(format!(
                "{:#08x}: chunk size {} less than header size {}",
                offset, size, header_size
            )));
        }
        if bytes_left < size {
            let offset = self.offset;
            self.invalidate();
            return Some(Chunk::Error(format!(
                "{:#08x}: {} bytes left cannot contain chunk of {} bytes",
                offset, bytes_left, size
            )));
        }

        // advance to next chunk and return
        let bytes = &self.data[self.offset..self.offset + size];
        let chunk = match ChunkType::try_from(header.type_) {
            Ok(ChunkType::Table) => Chunk::Table(bytes),
            Ok(ChunkType::Package) => Chunk::Package(bytes),
            Ok(ChunkType::StringPool) => Chunk::StringPool(bytes),
            Ok(ChunkType::Spec) => Chunk::Spec(bytes),
            Ok(ChunkType::Type) => Chunk::Type(bytes),
            Ok(ChunkType::Xml) => Chunk::Xml(bytes),
            Ok(ChunkType::XmlStartNamespace) => Chunk::XmlStartNamespace(bytes),
            Ok(ChunkType::XmlEndNamespace) => Chunk::XmlEndNamespace(bytes),
            Ok(ChunkType::XmlStartElement) => Chunk::XmlStartElement(bytes),
            Ok(ChunkType::XmlEndElement) => Chunk::XmlEndElement(bytes),
            Ok(ChunkType::XmlCdata) => Chunk::XmlCdata(bytes),
            Ok(ChunkType::XmlResourceMap) => Chunk::XmlResourceMap(bytes),
            _ => Chunk::Unknown(header.type_, bytes),
        };
        self.offset += size;
        Some(chunk)
    }
}

/// Writes a chunk header with a zero size; see [`finish_chunk`].
pub(crate) fn begin_chunk(buf: &mut Vec<u8>, type_: ChunkType, header_size: u16) -> usize {
    let start = buf.len();
    crate::endianness::push_u16(buf, type_ as u16);
    crate::endianness::push_u16(buf, header_size);
    crate::endianness::push_u32(buf, 0);
    start
}

/// Pads the chunk started at `start` to four bytes and patches its size.
pub(crate) fn finish_chunk(buf: &mut Vec<u8>, start: usize) {
    crate::endianness::align4(buf);
    let size = (buf.len() - start) as u32;
    crate::endianness::patch_u32(buf, start + 4, size);
}
