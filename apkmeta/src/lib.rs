//! Decoders for the Android package formats needed to read APK metadata:
//! the zip container, binary XML and the compiled resource table.

mod archive;
mod chunks;
mod config;
mod endianness;
mod error;
mod extract;
mod manifest;
mod resources;
mod size;
mod stringpool;
mod table;
mod value;
mod xml;
mod xml_writer;

#[cfg(test)]
mod fixtures;

pub use archive::{Archive, EntryInfo, Mapped};
pub use chunks::{Chunk, ChunkIterator, ChunkType, Header};
pub use config::{
    best_match, Configuration, DENSITY_ANY, DENSITY_HDPI, DENSITY_LDPI, DENSITY_MDPI, DENSITY_NONE,
    DENSITY_TVDPI, DENSITY_XHDPI, DENSITY_XXHDPI, DENSITY_XXXHDPI, HDR_NO, HDR_YES, SCREEN_ROUND_NO,
    SCREEN_ROUND_YES, WIDE_COLOR_GAMUT_NO, WIDE_COLOR_GAMUT_YES,
};
pub use error::{Error, ErrorKind, Result};
pub use extract::{
    extract, extract_file, ExtractOptions, Metadata, ICON_DENSITIES, MANIFEST_ENTRY,
    RESOURCES_ENTRY,
};
pub use manifest::{Activity, ActivityKind, Manifest};
pub use resources::ResourceId;
pub use size::format_size;
pub use stringpool::{Encoding, LoadedStringPool, StringPoolBuilder};
pub use table::{Entry, ResourceTable};
pub use value::{DataType, TypedValue, Value};
pub use xml::{
    decode as decode_xml, AndroidAttr, Attribute, Descendants, Document, Element, Namespace,
    ANDROID_NAMESPACE,
};
