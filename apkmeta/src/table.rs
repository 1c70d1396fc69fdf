use crate::chunks::{Chunk, ChunkIterator};
use crate::config::{best_match, Configuration};
use crate::endianness::{slice_at, u16_at, u32_at, u8_at};
use crate::error::{Error, Result};
use crate::resources::ResourceId;
use crate::stringpool::LoadedStringPool;
use crate::value::{TypedValue, Value};
use bitflags::bitflags;
use std::collections::BTreeMap;
use tracing::{debug, trace, warn};

const NO_ENTRY: u32 = 0xffff_ffff;
const NO_ENTRY16: u16 = 0xffff;
const MAX_REFERENCE_DEPTH: usize = 16;

/// Offset of the configuration inside a type chunk header.
const TYPE_CONFIG_OFFSET: usize = 20;
/// Fixed part of the package header: header, id, name, four offsets.
const PACKAGE_HEADER_MIN: usize = 8 + 4 + 256 + 16;

bitflags! {
    pub struct TypeFlags: u8 {
        const SPARSE = 0x01;
        const OFFSET16 = 0x02;
    }
}

bitflags! {
    pub struct EntryFlags: u16 {
        const COMPLEX = 0x0001;
        const PUBLIC = 0x0002;
        const WEAK = 0x0004;
        const COMPACT = 0x0008;
    }
}

/// The value of one resource in one configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Simple(TypedValue),
    /// A complex entry (style, plural, array...): ordered name/value pairs.
    Bag {
        parent: Option<ResourceId>,
        items: Vec<(ResourceId, TypedValue)>,
    },
}

#[derive(Debug, Clone)]
struct ConfigAndValue(Configuration, Entry);

#[derive(Debug, Clone, Default)]
struct LoadedEntry {
    key: Option<String>,
    values: Vec<ConfigAndValue>,
}

#[derive(Debug)]
struct LoadedType {
    id: u8,
    name: String,
    entries: Vec<LoadedEntry>,
}

#[derive(Debug)]
struct LoadedPackage {
    id: u8,
    name: String,
    types: BTreeMap<u8, LoadedType>,
}

/// A decoded `resources.arsc`.
#[derive(Debug)]
pub struct ResourceTable {
    packages: Vec<LoadedPackage>,
}

impl ResourceTable {
    pub fn decode(bytes: &[u8]) -> Result<ResourceTable> {
        let mut iter = ChunkIterator::new(bytes);
        let chunk = match iter.next() {
            Some(Chunk::Table(b)) => Chunk::Table(b),
            Some(Chunk::Error(msg)) => return Err(Error::Format(msg)),
            Some(x) => {
                return Err(Error::format(format!(
                    "not a table chunk: {:?}",
                    x.header().map(|h| h.type_)
                )))
            }
            None => return Err(Error::format("no data to traverse")),
        };
        if iter.next().is_some() {
            debug!("ignoring trailing data after resource table");
        }
        let packages = ResourceTable::parse_table(&chunk)?;
        debug!(
            "decoded resource table: {} package(s), {} type(s)",
            packages.len(),
            packages.iter().map(|p| p.types.len()).sum::<usize>()
        );
        Ok(ResourceTable { packages })
    }

    fn parse_table(chunk: &Chunk) -> Result<Vec<LoadedPackage>> {
        let bytes = chunk.bytes().unwrap_or_default();
        let package_count = u32_at(bytes, 8)? as usize;
        let mut packages = Vec::new();
        let mut value_strings: Option<LoadedStringPool> = None;

        let iter = chunk
            .iter()
            .ok_or_else(|| Error::format("cannot iterate over table"))?;
        for child in iter {
            match child.into_result()? {
                child @ Chunk::StringPool(_) => {
                    if value_strings.is_some() {
                        return Err(Error::format("multiple string pools in table"));
                    }
                    value_strings = Some(LoadedStringPool::from_chunk(&child)?);
                }
                child @ Chunk::Package(_) => {
                    let strings = value_strings
                        .as_ref()
                        .ok_or_else(|| Error::format("package before table string pool"))?;
                    packages.push(ResourceTable::parse_package(&child, strings)?);
                }
                other => trace!("skipping table child {:?}", other.header()),
            }
        }

        if value_strings.is_none() {
            return Err(Error::format("missing string pool in table"));
        }

        if packages.len() != package_count {
            return Err(Error::format(format!(
                "expected {} packages, found {}",
                package_count,
                packages.len()
            )));
        }

        Ok(packages)
    }

    fn parse_package(chunk: &Chunk, value_strings: &LoadedStringPool) -> Result<LoadedPackage> {
        let bytes = chunk.bytes().unwrap_or_default();
        let header = chunk.header()?;
        if (header.header_size as usize) < PACKAGE_HEADER_MIN {
            return Err(Error::format(format!(
                "package header size {} too small",
                header.header_size
            )));
        }
        let id = u32_at(bytes, 8)?;
        let name = decode_package_name(slice_at(bytes, 12, 256)?);
        let type_strings_offset = u32_at(bytes, 268)? as usize;
        let key_strings_offset = u32_at(bytes, 276)? as usize;

        let mut type_strings: Option<LoadedStringPool> = None;
        let mut key_strings: Option<LoadedStringPool> = None;
        let mut types: BTreeMap<u8, LoadedType> = BTreeMap::new();

        let iter = chunk
            .iter()
            .ok_or_else(|| Error::format("cannot iterate over package"))?;
        for child in iter {
            match child.into_result()? {
                child @ Chunk::StringPool(_) => {
                    let child_bytes = child.bytes().unwrap_or_default();
                    let offset = child_bytes.as_ptr() as usize - bytes.as_ptr() as usize;
                    let pool = LoadedStringPool::from_chunk(&child)?;

                    if offset == type_strings_offset && type_strings.is_none() {
                        type_strings = Some(pool);
                    } else if offset == key_strings_offset && key_strings.is_none() {
                        key_strings = Some(pool);
                    } else if type_strings.is_none() {
                        debug!("type string pool at unexpected offset {:#x}", offset);
                        type_strings = Some(pool);
                    } else if key_strings.is_none() {
                        debug!("key string pool at unexpected offset {:#x}", offset);
                        key_strings = Some(pool);
                    } else {
                        return Err(Error::format("unexpected string pool in package"));
                    }
                }
                child @ Chunk::Spec(_) => {
                    let (type_id, entry_count) = ResourceTable::parse_spec(&child)?;
                    let loaded = types.entry(type_id).or_insert_with(|| LoadedType {
                        id: type_id,
                        name: String::new(),
                        entries: Vec::new(),
                    });
                    if loaded.entries.len() < entry_count {
                        loaded.entries.resize_with(entry_count, LoadedEntry::default);
                    }
                }
                child @ Chunk::Type(_) => {
                    let keys = key_strings
                        .as_ref()
                        .ok_or_else(|| Error::format("type chunk before key string pool"))?;
                    let (type_id, config, values) =
                        ResourceTable::parse_type(&child, value_strings)?;
                    let loaded = types.entry(type_id).or_insert_with(|| LoadedType {
                        id: type_id,
                        name: String::new(),
                        entries: Vec::new(),
                    });
                    for (index, key, entry) in values {
                        loaded.insert(index, key, &config, entry, keys)?;
                    }
                }
                other => trace!("skipping package child {:?}", other.header()),
            }
        }

        let type_strings =
            type_strings.ok_or_else(|| Error::format("missing type string pool in package"))?;
        if key_strings.is_none() {
            return Err(Error::format("missing key string pool in package"));
        }

        for loaded in types.values_mut() {
            // type ids are 1-based indices into the type string pool
            loaded.name = match loaded.id.checked_sub(1) {
                Some(index) => type_strings.string_at(index as usize)?,
                None => return Err(Error::format("type id 0 is invalid")),
            };
        }

        Ok(LoadedPackage {
            id: (id & 0xff) as u8,
            name,
            types,
        })
    }

    fn parse_spec(chunk: &Chunk) -> Result<(u8, usize)> {
        let bytes = chunk.bytes().unwrap_or_default();
        let id = u8_at(bytes, 8)?;
        let entry_count = u32_at(bytes, 12)? as usize;
        // one u32 of flags per entry follows the header
        let header = chunk.header()?;
        slice_at(bytes, header.header_size as usize, entry_count.saturating_mul(4))?;
        Ok((id, entry_count))
    }

    #[allow(clippy::type_complexity)]
    fn parse_type(
        chunk: &Chunk,
        strings: &LoadedStringPool,
    ) -> Result<(u8, Configuration, Vec<(usize, u32, Entry)>)> {
        let bytes = chunk.bytes().unwrap_or_default();
        let header = chunk.header()?;
        let id = u8_at(bytes, 8)?;
        let flags = TypeFlags::from_bits_truncate(u8_at(bytes, 9)?);
        let entry_count = u32_at(bytes, 12)? as usize;
        let entries_start = u32_at(bytes, 16)? as usize;
        let (config, _) = Configuration::parse(bytes, TYPE_CONFIG_OFFSET)?;
        let offsets_start = header.header_size as usize;

        let mut offsets = Vec::new();
        if flags.contains(TypeFlags::SPARSE) {
            slice_at(bytes, offsets_start, entry_count.saturating_mul(4))?;
            for i in 0..entry_count {
                let at = offsets_start + i * 4;
                let index = u16_at(bytes, at)? as usize;
                let offset = u16_at(bytes, at + 2)? as usize * 4;
                offsets.push((index, offset));
            }
        } else if flags.contains(TypeFlags::OFFSET16) {
            slice_at(bytes, offsets_start, entry_count.saturating_mul(2))?;
            for i in 0..entry_count {
                let offset = u16_at(bytes, offsets_start + i * 2)?;
                if offset != NO_ENTRY16 {
                    offsets.push((i, offset as usize * 4));
                }
            }
        } else {
            slice_at(bytes, offsets_start, entry_count.saturating_mul(4))?;
            for i in 0..entry_count {
                let offset = u32_at(bytes, offsets_start + i * 4)?;
                if offset != NO_ENTRY {
                    offsets.push((i, offset as usize));
                }
            }
        }

        let mut values = Vec::with_capacity(offsets.len());
        for (index, offset) in offsets {
            let addr = entries_start
                .checked_add(offset)
                .ok_or_else(|| Error::format("entry offset overflow"))?;
            let (key, entry) = ResourceTable::parse_entry(bytes, addr, strings)?;
            values.push((index, key, entry));
        }
        trace!(
            "type {:#04x} [{}]: {} of {} entries",
            id,
            config,
            values.len(),
            entry_count
        );
        Ok((id, config, values))
    }

    fn parse_entry(bytes: &[u8], addr: usize, strings: &LoadedStringPool) -> Result<(u32, Entry)> {
        let size = u16_at(bytes, addr)? as usize;
        let raw_flags = u16_at(bytes, addr + 2)?;
        let flags = EntryFlags::from_bits_truncate(raw_flags);

        if flags.contains(EntryFlags::COMPACT) {
            // key in the size field, data type in the high byte of the flags
            let data_type = (raw_flags >> 8) as u8;
            let data = u32_at(bytes, addr + 4)?;
            let value = TypedValue::from_raw(data_type, data, strings)?;
            return Ok((size as u32, Entry::Simple(value)));
        }

        let key = u32_at(bytes, addr + 4)?;
        if flags.contains(EntryFlags::COMPLEX) {
            let parent = u32_at(bytes, addr + 8)?;
            let count = u32_at(bytes, addr + 12)? as usize;
            let start = addr + size;
            slice_at(bytes, start, count.saturating_mul(12))?;
            let mut items = Vec::with_capacity(count);
            for i in 0..count {
                let at = start + i * 12;
                let name = ResourceId::from(u32_at(bytes, at)?);
                items.push((name, TypedValue::parse(bytes, at + 4, strings)?));
            }
            let parent = if parent == 0 {
                None
            } else {
                Some(ResourceId::from(parent))
            };
            Ok((key, Entry::Bag { parent, items }))
        } else {
            let value = TypedValue::parse(bytes, addr + size, strings)?;
            Ok((key, Entry::Simple(value)))
        }
    }

    fn find(&self, id: ResourceId) -> Option<&LoadedEntry> {
        self.packages
            .iter()
            .find(|p| p.id == id.package_id())?
            .types
            .get(&id.type_id())?
            .entries
            .get(id.entry_id() as usize)
    }

    /// Name of the (first) package, e.g. `com.example.app`.
    pub fn package_name(&self) -> Option<&str> {
        self.packages.first().map(|p| p.name.as_str())
    }

    /// `type/key` name of a resource, e.g. `string/app_name`.
    pub fn name_of(&self, id: ResourceId) -> Option<String> {
        let package = self.packages.iter().find(|p| p.id == id.package_id())?;
        let type_ = package.types.get(&id.type_id())?;
        let key = type_.entries.get(id.entry_id() as usize)?.key.as_ref()?;
        Some(format!("{}/{}", type_.name, key))
    }

    /// All configurations a resource has a value for, in table order.
    pub fn configurations(&self, id: ResourceId) -> Vec<&Configuration> {
        self.find(id)
            .map(|e| e.values.iter().map(|ConfigAndValue(c, _)| c).collect())
            .unwrap_or_default()
    }

    /// The entry best matching `requested`, without following references.
    pub fn resolve_entry(&self, id: ResourceId, requested: &Configuration) -> Result<&Entry> {
        let entry = self
            .find(id)
            .filter(|e| !e.values.is_empty())
            .ok_or_else(|| Error::not_found(format!("resource {}", id)))?;
        best_match(
            entry.values.iter().map(|ConfigAndValue(c, v)| (c, v)),
            requested,
        )
        .ok_or_else(|| {
            Error::not_found(format!(
                "resource {} has no value for configuration {}",
                id, requested
            ))
        })
    }

    /// Resolve a resource to a literal, following references.
    pub fn resolve(&self, id: ResourceId, requested: &Configuration) -> Result<Value> {
        let mut current = id;
        for _ in 0..MAX_REFERENCE_DEPTH {
            match self.resolve_entry(current, requested)? {
                Entry::Simple(TypedValue::Literal(value)) => return Ok(value.clone()),
                Entry::Simple(TypedValue::Reference(next)) => current = *next,
                Entry::Bag { .. } => {
                    return Err(Error::not_found(format!(
                        "resource {} is a bag, not a simple value",
                        current
                    )))
                }
            }
        }
        Err(Error::format(format!(
            "reference chain starting at {} is too deep",
            id
        )))
    }

    pub fn resolve_value(&self, value: &TypedValue, requested: &Configuration) -> Result<Value> {
        match value {
            TypedValue::Literal(v) => Ok(v.clone()),
            TypedValue::Reference(id) => self.resolve(*id, requested),
        }
    }
}

impl LoadedType {
    fn insert(
        &mut self,
        index: usize,
        key: u32,
        config: &Configuration,
        entry: Entry,
        keys: &LoadedStringPool,
    ) -> Result<()> {
        if index > u16::MAX as usize {
            return Err(Error::format(format!("entry index {} out of range", index)));
        }
        if self.entries.len() <= index {
            self.entries.resize_with(index + 1, LoadedEntry::default);
        }
        let loaded = &mut self.entries[index];
        if loaded.key.is_none() {
            loaded.key = Some(keys.string_at(key as usize)?);
        }
        match loaded.values.iter_mut().find(|ConfigAndValue(c, _)| c == config) {
            Some(existing) => {
                warn!(
                    "duplicate value for entry {} of type {:#04x} in configuration {}",
                    index, self.id, config
                );
                existing.1 = entry;
            }
            None => loaded.values.push(ConfigAndValue(config.clone(), entry)),
        }
        Ok(())
    }
}

fn decode_package_name(raw: &[u8]) -> String {
    let units = raw
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|&u| u != 0)
        .collect::<Vec<_>>();
    String::from_utf16_lossy(&units)
}
