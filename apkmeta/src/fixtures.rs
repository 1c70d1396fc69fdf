//! Builders for test inputs: resource tables, manifests and archives.

use crate::chunks::{begin_chunk, finish_chunk, ChunkType};
use crate::config::Configuration;
use crate::endianness::{patch_u32, push_u16, push_u32, push_u8};
use crate::resources::ResourceId;
use crate::stringpool::{Encoding, StringPoolBuilder};
use crate::table::{Entry, EntryFlags, TypeFlags};
use crate::value::TypedValue;
use crate::xml::{Attribute, Document, Element};
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::ZipWriter;

const PACKAGE_HEADER_SIZE: u16 = 288;
const TYPE_HEADER_SIZE: u16 = 20 + 64;
const NO_ENTRY: u32 = 0xffff_ffff;
const NO_ENTRY16: u16 = 0xffff;
const UNKNOWN_CHUNK: u16 = 0x0777;

/// How a type chunk lays out its entry offsets.
#[derive(Clone, Copy, PartialEq)]
enum Layout {
    Dense,
    Offset16,
    Sparse,
}

struct FixtureEntry {
    key: String,
    values: Vec<(Configuration, Entry)>,
}

/// Writes a single-package `resources.arsc` the way aapt2 lays it out.
pub(crate) struct TableBuilder {
    package_id: u8,
    package_name: String,
    types: Vec<(String, Vec<FixtureEntry>)>,
    layout: Layout,
    compact: bool,
    extra_chunks: bool,
}

impl TableBuilder {
    pub(crate) fn new(package_name: &str) -> TableBuilder {
        TableBuilder {
            package_id: 0x7f,
            package_name: package_name.to_owned(),
            types: Vec::new(),
            layout: Layout::Dense,
            compact: false,
            extra_chunks: false,
        }
    }

    /// Emit sparse type chunks instead of dense offset arrays.
    pub(crate) fn sparse(mut self) -> TableBuilder {
        self.layout = Layout::Sparse;
        self
    }

    /// Emit 16-bit offset arrays (`FLAG_OFFSET16`).
    pub(crate) fn offset16(mut self) -> TableBuilder {
        self.layout = Layout::Offset16;
        self
    }

    /// Write simple values as 8 byte compact entries.
    pub(crate) fn compact(mut self) -> TableBuilder {
        self.compact = true;
        self
    }

    /// Add a library chunk to the package and an unknown chunk after it.
    pub(crate) fn extra_chunks(mut self) -> TableBuilder {
        self.extra_chunks = true;
        self
    }

    pub(crate) fn add<V: Into<TypedValue>>(
        &mut self,
        type_name: &str,
        key: &str,
        config: Configuration,
        value: V,
    ) -> ResourceId {
        self.add_entry(type_name, key, config, Entry::Simple(value.into()))
    }

    pub(crate) fn add_bag(
        &mut self,
        type_name: &str,
        key: &str,
        config: Configuration,
        items: Vec<(ResourceId, TypedValue)>,
    ) -> ResourceId {
        let entry = Entry::Bag {
            parent: None,
            items,
        };
        self.add_entry(type_name, key, config, entry)
    }

    fn add_entry(
        &mut self,
        type_name: &str,
        key: &str,
        config: Configuration,
        entry: Entry,
    ) -> ResourceId {
        let type_index = match self.types.iter().position(|(name, _)| name == type_name) {
            Some(i) => i,
            None => {
                self.types.push((type_name.to_owned(), Vec::new()));
                self.types.len() - 1
            }
        };
        let entries = &mut self.types[type_index].1;
        let entry_index = match entries.iter().position(|e| e.key == key) {
            Some(i) => i,
            None => {
                entries.push(FixtureEntry {
                    key: key.to_owned(),
                    values: Vec::new(),
                });
                entries.len() - 1
            }
        };
        entries[entry_index].values.push((config, entry));
        ResourceId::from_parts(self.package_id, type_index as u8 + 1, entry_index as u16)
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        let mut values = StringPoolBuilder::new(Encoding::Utf8);
        let package = self.build_package(&mut values);

        let mut buf = Vec::new();
        let start = begin_chunk(&mut buf, ChunkType::Table, 12);
        push_u32(&mut buf, 1);
        values.write(&mut buf);
        buf.extend_from_slice(&package);
        if self.extra_chunks {
            push_unknown_chunk(&mut buf);
        }
        finish_chunk(&mut buf, start);
        buf
    }

    fn build_package(&self, values: &mut StringPoolBuilder) -> Vec<u8> {
        let mut type_strings = StringPoolBuilder::new(Encoding::Utf16);
        let mut key_strings = StringPoolBuilder::new(Encoding::Utf16);
        for (name, entries) in &self.types {
            type_strings.intern(name);
            for e in entries {
                key_strings.intern(&e.key);
            }
        }
        let mut type_pool = Vec::new();
        type_strings.write(&mut type_pool);
        let mut key_pool = Vec::new();
        key_strings.write(&mut key_pool);

        let mut buf = Vec::new();
        let start = begin_chunk(&mut buf, ChunkType::Package, PACKAGE_HEADER_SIZE);
        push_u32(&mut buf, self.package_id as u32);
        let mut name = self.package_name.encode_utf16().collect::<Vec<_>>();
        name.resize(128, 0);
        for unit in name {
            push_u16(&mut buf, unit);
        }
        push_u32(&mut buf, PACKAGE_HEADER_SIZE as u32);
        push_u32(&mut buf, self.types.len() as u32);
        push_u32(&mut buf, PACKAGE_HEADER_SIZE as u32 + type_pool.len() as u32);
        push_u32(&mut buf, key_strings.len() as u32);
        push_u32(&mut buf, 0);
        buf.extend_from_slice(&type_pool);
        buf.extend_from_slice(&key_pool);

        for (type_index, (_, entries)) in self.types.iter().enumerate() {
            let type_id = type_index as u8 + 1;
            self.write_spec(&mut buf, type_id, entries.len());

            let mut configs: Vec<&Configuration> = Vec::new();
            for e in entries {
                for (c, _) in &e.values {
                    if !configs.contains(&c) {
                        configs.push(c);
                    }
                }
            }
            for config in configs {
                let present = entries
                    .iter()
                    .enumerate()
                    .filter_map(|(i, e)| {
                        e.values
                            .iter()
                            .find(|(c, _)| c == config)
                            .map(|(_, entry)| (i, &e.key, entry))
                    })
                    .collect::<Vec<_>>();
                self.write_type(
                    &mut buf,
                    type_id,
                    entries.len(),
                    config,
                    &present,
                    &key_strings,
                    values,
                );
            }
        }
        if self.extra_chunks {
            // a dynamic reference table naming one shared library
            let library = begin_chunk(&mut buf, ChunkType::Library, 12);
            push_u32(&mut buf, 1);
            push_u32(&mut buf, 0x02);
            let mut name = "com.example.shared".encode_utf16().collect::<Vec<_>>();
            name.resize(128, 0);
            for unit in name {
                push_u16(&mut buf, unit);
            }
            finish_chunk(&mut buf, library);
        }
        finish_chunk(&mut buf, start);
        buf
    }

    fn write_spec(&self, buf: &mut Vec<u8>, type_id: u8, entry_count: usize) {
        let start = begin_chunk(buf, ChunkType::Spec, 16);
        push_u8(buf, type_id);
        push_u8(buf, 0);
        push_u16(buf, 0);
        push_u32(buf, entry_count as u32);
        for _ in 0..entry_count {
            push_u32(buf, 0);
        }
        finish_chunk(buf, start);
    }

    #[allow(clippy::too_many_arguments)]
    fn write_type(
        &self,
        buf: &mut Vec<u8>,
        type_id: u8,
        entry_count: usize,
        config: &Configuration,
        present: &[(usize, &String, &Entry)],
        keys: &StringPoolBuilder,
        values: &mut StringPoolBuilder,
    ) {
        let mut data = Vec::new();
        let mut offsets = Vec::new();
        for (index, key, entry) in present {
            offsets.push((*index, data.len()));
            let key = keys.index_of(key).unwrap_or(0);
            match entry {
                Entry::Simple(value) if self.compact => {
                    // key in the size field, data type in the high flag byte
                    let mut raw = Vec::new();
                    value.write(&mut raw, values);
                    push_u16(&mut data, key as u16);
                    push_u16(&mut data, EntryFlags::COMPACT.bits() | (raw[3] as u16) << 8);
                    data.extend_from_slice(&raw[4..8]);
                }
                Entry::Simple(value) => {
                    push_u16(&mut data, 8);
                    push_u16(&mut data, 0);
                    push_u32(&mut data, key);
                    value.write(&mut data, values);
                }
                Entry::Bag { parent, items } => {
                    push_u16(&mut data, 16);
                    push_u16(&mut data, EntryFlags::COMPLEX.bits());
                    push_u32(&mut data, key);
                    push_u32(&mut data, parent.map(u32::from).unwrap_or(0));
                    push_u32(&mut data, items.len() as u32);
                    for (name, value) in items {
                        push_u32(&mut data, u32::from(*name));
                        value.write(&mut data, values);
                    }
                }
            }
        }

        let start = begin_chunk(buf, ChunkType::Type, TYPE_HEADER_SIZE);
        push_u8(buf, type_id);
        let flags = match self.layout {
            Layout::Dense => 0,
            Layout::Offset16 => TypeFlags::OFFSET16.bits(),
            Layout::Sparse => TypeFlags::SPARSE.bits(),
        };
        push_u8(buf, flags);
        push_u16(buf, 0);
        let count = match self.layout {
            Layout::Sparse => present.len(),
            _ => entry_count,
        };
        push_u32(buf, count as u32);
        push_u32(buf, 0); // entries start, patched below
        config.write(buf);
        let offset_of = |i: usize| {
            offsets
                .iter()
                .find(|(index, _)| *index == i)
                .map(|(_, offset)| *offset)
        };
        match self.layout {
            Layout::Sparse => {
                for (index, offset) in &offsets {
                    push_u16(buf, *index as u16);
                    push_u16(buf, (*offset / 4) as u16);
                }
            }
            Layout::Offset16 => {
                for i in 0..entry_count {
                    match offset_of(i) {
                        Some(offset) => push_u16(buf, (offset / 4) as u16),
                        None => push_u16(buf, NO_ENTRY16),
                    }
                }
            }
            Layout::Dense => {
                for i in 0..entry_count {
                    match offset_of(i) {
                        Some(offset) => push_u32(buf, offset as u32),
                        None => push_u32(buf, NO_ENTRY),
                    }
                }
            }
        }
        let entries_start = (buf.len() - start) as u32;
        patch_u32(buf, start + 16, entries_start);
        buf.extend_from_slice(&data);
        finish_chunk(buf, start);
    }
}

/// A 12 byte chunk of a type no decoder knows about.
pub(crate) fn push_unknown_chunk(buf: &mut Vec<u8>) {
    push_u16(buf, UNKNOWN_CHUNK);
    push_u16(buf, 8);
    push_u32(buf, 12);
    push_u32(buf, 0xdead_beef);
}

pub(crate) const ANDROID_NS: &str = crate::xml::ANDROID_NAMESPACE;

/// An attribute in the android namespace with its well-known resource id.
pub(crate) fn android_attr<V: Into<TypedValue>>(
    name: &str,
    resource_id: u32,
    value: V,
) -> Attribute {
    Attribute {
        namespace: Some(ANDROID_NS.to_owned()),
        name: name.to_owned(),
        resource_id: Some(ResourceId::from(resource_id)),
        value: value.into(),
    }
}

pub(crate) fn plain_attr<V: Into<TypedValue>>(name: &str, value: V) -> Attribute {
    Attribute {
        namespace: None,
        name: name.to_owned(),
        resource_id: None,
        value: value.into(),
    }
}

pub(crate) fn element(tag: &str, attributes: Vec<Attribute>, children: Vec<Element>) -> Element {
    Element {
        namespace: None,
        name: tag.to_owned(),
        attributes,
        children,
    }
}

/// `<activity android:name=...>` with an optional MAIN/LAUNCHER intent filter.
pub(crate) fn activity(tag: &str, attributes: Vec<Attribute>, launcher: bool) -> Element {
    let mut children = Vec::new();
    if launcher {
        children.push(element(
            "intent-filter",
            vec![],
            vec![
                element(
                    "action",
                    vec![android_attr("name", 0x0101_0003, "android.intent.action.MAIN")],
                    vec![],
                ),
                element(
                    "category",
                    vec![android_attr("name", 0x0101_0003, "android.intent.category.LAUNCHER")],
                    vec![],
                ),
            ],
        ));
    }
    element(tag, attributes, children)
}

pub(crate) fn manifest_document(root: Element) -> Document {
    Document {
        namespaces: vec![crate::xml::Namespace {
            prefix: "android".to_owned(),
            uri: ANDROID_NS.to_owned(),
        }],
        root,
    }
}

/// Zip the given entries into an in-memory archive.
pub(crate) fn zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer
            .start_file(*name, FileOptions::default())
            .expect("start zip entry");
        writer.write_all(data).expect("write zip entry");
    }
    writer.finish().expect("finish zip").into_inner()
}
