//! Android binary XML (`AndroidManifest.xml` as stored in an APK).

use crate::chunks::{Chunk, ChunkIterator};
use crate::endianness::{u16_at, u32_at};
use crate::error::{Error, Result};
use crate::resources::ResourceId;
use crate::stringpool::LoadedStringPool;
use crate::value::{TypedValue, Value};
use tracing::{debug, trace};

pub const ANDROID_NAMESPACE: &str = "http://schemas.android.com/apk/res/android";

/// Index value meaning "no string".
pub(crate) const NO_INDEX: u32 = 0xffff_ffff;
/// Line number and comment index following the chunk header of every node.
pub(crate) const NODE_HEADER_SIZE: u16 = 16;
/// Size of `ResXMLTree_attribute`.
pub(crate) const ATTRIBUTE_SIZE: u16 = 20;

/// Framework attributes the manifest projection cares about.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum AndroidAttr {
    Label,
    Icon,
    Name,
    Value,
    MinSdkVersion,
    TargetActivity,
    VersionCode,
    VersionName,
    TargetSdkVersion,
}

impl AndroidAttr {
    pub fn name(self) -> &'static str {
        match self {
            AndroidAttr::Label => "label",
            AndroidAttr::Icon => "icon",
            AndroidAttr::Name => "name",
            AndroidAttr::Value => "value",
            AndroidAttr::MinSdkVersion => "minSdkVersion",
            AndroidAttr::TargetActivity => "targetActivity",
            AndroidAttr::VersionCode => "versionCode",
            AndroidAttr::VersionName => "versionName",
            AndroidAttr::TargetSdkVersion => "targetSdkVersion",
        }
    }

    /// The `android.R.attr` id of the attribute.
    pub fn resource_id(self) -> ResourceId {
        ResourceId::from(match self {
            AndroidAttr::Label => 0x0101_0001,
            AndroidAttr::Icon => 0x0101_0002,
            AndroidAttr::Name => 0x0101_0003,
            AndroidAttr::Value => 0x0101_0024,
            AndroidAttr::MinSdkVersion => 0x0101_020c,
            AndroidAttr::TargetActivity => 0x0101_0202,
            AndroidAttr::VersionCode => 0x0101_021b,
            AndroidAttr::VersionName => 0x0101_021c,
            AndroidAttr::TargetSdkVersion => 0x0101_0270,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Namespace {
    pub prefix: String,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    /// Namespace URI, not prefix.
    pub namespace: Option<String>,
    pub name: String,
    /// Attribute id from the resource map, if the name has one.
    pub resource_id: Option<ResourceId>,
    pub value: TypedValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub namespace: Option<String>,
    pub name: String,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Element>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub namespaces: Vec<Namespace>,
    pub root: Element,
}

pub fn decode(bytes: &[u8]) -> Result<Document> {
    Document::decode(bytes)
}

impl Document {
    pub fn decode(bytes: &[u8]) -> Result<Document> {
        let mut iter = ChunkIterator::new(bytes);
        let chunk = match iter.next() {
            Some(Chunk::Xml(b)) => Chunk::Xml(b),
            Some(Chunk::Error(msg)) => return Err(Error::Format(msg)),
            Some(x) => {
                return Err(Error::format(format!(
                    "not an XML chunk: {:?}",
                    x.header().map(|h| h.type_)
                )))
            }
            None => return Err(Error::format("no data to traverse")),
        };

        let mut strings: Option<LoadedStringPool> = None;
        let mut resource_map: Vec<u32> = Vec::new();
        let mut namespaces: Vec<Namespace> = Vec::new();
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        let children = chunk
            .iter()
            .ok_or_else(|| Error::format("cannot iterate over XML document"))?;
        for child in children {
            match child.into_result()? {
                child @ Chunk::StringPool(_) => {
                    if strings.is_some() {
                        return Err(Error::format("multiple string pools in XML document"));
                    }
                    strings = Some(LoadedStringPool::from_chunk(&child)?);
                }
                Chunk::XmlResourceMap(b) => {
                    let header_size = u16_at(b, 2)? as usize;
                    resource_map = b
                        .get(header_size..)
                        .unwrap_or_default()
                        .chunks_exact(4)
                        .map(|id| u32::from_le_bytes([id[0], id[1], id[2], id[3]]))
                        .collect();
                }
                Chunk::XmlStartNamespace(b) => {
                    let pool = pool(&strings)?;
                    let at = u16_at(b, 2)? as usize;
                    let namespace = Namespace {
                        prefix: optional_string(pool, u32_at(b, at)?)?.unwrap_or_default(),
                        uri: optional_string(pool, u32_at(b, at + 4)?)?.unwrap_or_default(),
                    };
                    if !namespaces.contains(&namespace) {
                        namespaces.push(namespace);
                    }
                }
                Chunk::XmlEndNamespace(_) => {}
                Chunk::XmlStartElement(b) => {
                    let element = parse_start_element(b, pool(&strings)?, &resource_map)?;
                    if stack.is_empty() && root.is_some() {
                        return Err(Error::format(format!(
                            "second root element <{}>",
                            element.name
                        )));
                    }
                    stack.push(element);
                }
                Chunk::XmlEndElement(b) => {
                    let pool = pool(&strings)?;
                    let at = u16_at(b, 2)? as usize;
                    let name = pool.string_at(u32_at(b, at + 4)? as usize)?;
                    let element = stack.pop().ok_or_else(|| {
                        Error::format(format!("end element </{}> without start", name))
                    })?;
                    if element.name != name {
                        return Err(Error::format(format!(
                            "end element </{}> does not match <{}>",
                            name, element.name
                        )));
                    }
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(element),
                        None => root = Some(element),
                    }
                }
                Chunk::XmlCdata(_) => trace!("ignoring character data"),
                other => trace!("skipping XML child {:?}", other.header()),
            }
        }

        if let Some(open) = stack.last() {
            return Err(Error::format(format!("element <{}> left open", open.name)));
        }
        let root = root.ok_or_else(|| Error::format("XML document has no root element"))?;
        debug!(
            "decoded XML document: <{}> with {} namespace(s)",
            root.name,
            namespaces.len()
        );
        Ok(Document { namespaces, root })
    }
}

fn pool<'a, 'bytes>(
    strings: &'a Option<LoadedStringPool<'bytes>>,
) -> Result<&'a LoadedStringPool<'bytes>> {
    strings
        .as_ref()
        .ok_or_else(|| Error::format("XML node before string pool"))
}

fn optional_string(pool: &LoadedStringPool, index: u32) -> Result<Option<String>> {
    if index == NO_INDEX {
        Ok(None)
    } else {
        pool.string_at(index as usize).map(Some)
    }
}

fn parse_start_element(
    bytes: &[u8],
    pool: &LoadedStringPool,
    resource_map: &[u32],
) -> Result<Element> {
    let at = u16_at(bytes, 2)? as usize;
    let namespace = optional_string(pool, u32_at(bytes, at)?)?;
    let name = pool.string_at(u32_at(bytes, at + 4)? as usize)?;
    let attribute_start = u16_at(bytes, at + 8)? as usize;
    let attribute_size = u16_at(bytes, at + 10)? as usize;
    let attribute_count = u16_at(bytes, at + 12)? as usize;
    if attribute_count > 0 && attribute_size < ATTRIBUTE_SIZE as usize {
        return Err(Error::format(format!(
            "attribute size {} too small in <{}>",
            attribute_size, name
        )));
    }

    let mut attributes = Vec::with_capacity(attribute_count);
    for i in 0..attribute_count {
        let offset = at + attribute_start + i * attribute_size;
        let name_index = u32_at(bytes, offset + 4)?;
        let raw_value = u32_at(bytes, offset + 8)?;
        let value = if raw_value != NO_INDEX {
            TypedValue::Literal(Value::String(pool.string_at(raw_value as usize)?))
        } else {
            TypedValue::parse(bytes, offset + 12, pool)?
        };
        attributes.push(Attribute {
            namespace: optional_string(pool, u32_at(bytes, offset)?)?,
            name: pool.string_at(name_index as usize)?,
            resource_id: resource_map
                .get(name_index as usize)
                .filter(|&&id| id != 0)
                .map(|&id| ResourceId::from(id)),
            value,
        });
    }

    Ok(Element {
        namespace,
        name,
        attributes,
        children: Vec::new(),
    })
}

impl Element {
    /// First attribute with this local name, in any namespace.
    pub fn attribute(&self, name: &str) -> Option<&TypedValue> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| &a.value)
    }

    /// A framework attribute, found by id or by android namespace and name;
    /// obfuscated manifests may carry only one of the two.
    pub fn android_attribute(&self, attr: AndroidAttr) -> Option<&TypedValue> {
        let id = attr.resource_id();
        self.attributes
            .iter()
            .find(|a| a.resource_id == Some(id))
            .or_else(|| {
                self.attributes.iter().find(|a| {
                    a.resource_id.is_none()
                        && a.namespace.as_deref() == Some(ANDROID_NAMESPACE)
                        && a.name == attr.name()
                })
            })
            .map(|a| &a.value)
    }

    pub fn children<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == tag)
    }

    pub fn child(&self, tag: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == tag)
    }

    /// Every element below this one, in document order.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            stack: self.children.iter().rev().collect(),
        }
    }
}

pub struct Descendants<'a> {
    stack: Vec<&'a Element>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.stack.pop()?;
        self.stack.extend(next.children.iter().rev());
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::{AndroidAttr, Document, ANDROID_NAMESPACE, NO_INDEX};
    use crate::chunks::{begin_chunk, finish_chunk, ChunkType};
    use crate::endianness::{push_u16, push_u32, push_u8};
    use crate::error::ErrorKind;
    use crate::fixtures::{
        android_attr, element, manifest_document, plain_attr, push_unknown_chunk,
    };
    use crate::resources::ResourceId;
    use crate::stringpool::{Encoding, StringPoolBuilder};
    use crate::value::{DataType, TypedValue, Value};

    /// Hand-assembled document: `strings` form the pool, `nodes` follow it.
    fn document(strings: &[&str], resource_map: &[u32], nodes: &[Vec<u8>]) -> Vec<u8> {
        let mut pool = StringPoolBuilder::new(Encoding::Utf16);
        for s in strings {
            pool.intern(s);
        }
        let mut buf = Vec::new();
        let start = begin_chunk(&mut buf, ChunkType::Xml, 8);
        pool.write(&mut buf);
        if !resource_map.is_empty() {
            let map = begin_chunk(&mut buf, ChunkType::XmlResourceMap, 8);
            for id in resource_map {
                push_u32(&mut buf, *id);
            }
            finish_chunk(&mut buf, map);
        }
        for node in nodes {
            buf.extend_from_slice(node);
        }
        finish_chunk(&mut buf, start);
        buf
    }

    /// `(namespace, name, raw value, data type, data)` per attribute.
    fn start(name: u32, attributes: &[(u32, u32, u32, DataType, u32)]) -> Vec<u8> {
        let mut buf = Vec::new();
        let start = begin_chunk(&mut buf, ChunkType::XmlStartElement, 16);
        push_u32(&mut buf, 1);
        push_u32(&mut buf, NO_INDEX);
        push_u32(&mut buf, NO_INDEX);
        push_u32(&mut buf, name);
        push_u16(&mut buf, 20);
        push_u16(&mut buf, 20);
        push_u16(&mut buf, attributes.len() as u16);
        push_u16(&mut buf, 0);
        push_u16(&mut buf, 0);
        push_u16(&mut buf, 0);
        for (ns, name, raw, data_type, data) in attributes {
            push_u32(&mut buf, *ns);
            push_u32(&mut buf, *name);
            push_u32(&mut buf, *raw);
            push_u16(&mut buf, 8);
            push_u8(&mut buf, 0);
            push_u8(&mut buf, *data_type as u8);
            push_u32(&mut buf, *data);
        }
        finish_chunk(&mut buf, start);
        buf
    }

    fn end(name: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        let start = begin_chunk(&mut buf, ChunkType::XmlEndElement, 16);
        push_u32(&mut buf, 1);
        push_u32(&mut buf, NO_INDEX);
        push_u32(&mut buf, NO_INDEX);
        push_u32(&mut buf, name);
        finish_chunk(&mut buf, start);
        buf
    }

    #[test]
    fn decode_hand_assembled_document() {
        // 0: versionCode, 1: manifest, 2: package, 3: com.example, 4: application
        let bytes = document(
            &["versionCode", "manifest", "package", "com.example", "application"],
            &[0x0101_021b],
            &[
                start(
                    1,
                    &[
                        (NO_INDEX, 0, NO_INDEX, DataType::IntDec, 7),
                        (NO_INDEX, 2, 3, DataType::String, 3),
                    ],
                ),
                start(4, &[]),
                end(4),
                end(1),
            ],
        );
        let doc = Document::decode(&bytes).unwrap();

        assert_eq!(doc.root.name, "manifest");
        assert_eq!(doc.root.children.len(), 1);
        assert_eq!(doc.root.child("application").unwrap().name, "application");
        // name-stripped attribute still found through the resource map
        assert_eq!(
            doc.root.android_attribute(AndroidAttr::VersionCode),
            Some(&TypedValue::Literal(Value::Integer(7)))
        );
        assert_eq!(
            doc.root.attribute("package"),
            Some(&TypedValue::from("com.example"))
        );
        assert_eq!(
            doc.root.attributes[0].resource_id,
            Some(ResourceId::from(0x0101_021b))
        );
        assert_eq!(doc.root.attributes[1].resource_id, None);
    }

    #[test]
    fn raw_string_wins_over_typed_value() {
        let bytes = document(
            &["a", "text", "42"],
            &[],
            &[
                start(0, &[(NO_INDEX, 1, 2, DataType::IntDec, 42)]),
                end(0),
            ],
        );
        let doc = Document::decode(&bytes).unwrap();
        assert_eq!(doc.root.attribute("text"), Some(&TypedValue::from("42")));
    }

    #[test]
    fn unknown_chunks_and_text_are_skipped() {
        let mut unknown = Vec::new();
        push_unknown_chunk(&mut unknown);
        let mut cdata = Vec::new();
        let text = begin_chunk(&mut cdata, ChunkType::XmlCdata, 16);
        push_u32(&mut cdata, 1);
        push_u32(&mut cdata, NO_INDEX);
        push_u32(&mut cdata, 2);
        push_u16(&mut cdata, 8);
        push_u8(&mut cdata, 0);
        push_u8(&mut cdata, DataType::Null as u8);
        push_u32(&mut cdata, 0);
        finish_chunk(&mut cdata, text);

        let mut bytes = document(
            &["manifest", "application", "hello"],
            &[],
            &[
                unknown.clone(),
                start(0, &[]),
                cdata,
                start(1, &[]),
                unknown.clone(),
                end(1),
                end(0),
                unknown.clone(),
            ],
        );
        let doc = Document::decode(&bytes).unwrap();
        assert_eq!(doc.root.name, "manifest");
        assert_eq!(doc.root.children.len(), 1);
        assert!(doc.root.child("application").unwrap().children.is_empty());

        // a chunk after the document itself
        bytes.extend_from_slice(&unknown);
        assert_eq!(Document::decode(&bytes).unwrap(), doc);
    }

    #[test]
    fn structural_errors() {
        let strings = ["a", "b"];

        let mismatched = document(&strings, &[], &[start(0, &[]), end(1)]);
        let unclosed = document(&strings, &[], &[start(0, &[]), start(1, &[]), end(1)]);
        let no_root = document(&strings, &[], &[]);
        let two_roots = document(&strings, &[], &[start(0, &[]), end(0), start(1, &[]), end(1)]);
        let bad_index = document(&strings, &[], &[start(9, &[]), end(9)]);

        for bytes in &[mismatched, unclosed, no_root, two_roots, bad_index] {
            let err = Document::decode(bytes).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Format, "{}", err);
        }
    }

    #[test]
    fn rejects_non_xml_input() {
        assert!(Document::decode(&[]).is_err());
        assert!(Document::decode(b"PK\x03\x04 not binary xml").is_err());

        let mut pool = Vec::new();
        StringPoolBuilder::new(Encoding::Utf8).write(&mut pool);
        assert_eq!(
            Document::decode(&pool).unwrap_err().kind(),
            ErrorKind::Format
        );
    }

    #[test]
    fn truncated_document() {
        let bytes = document(&["a"], &[], &[start(0, &[]), end(0)]);
        let err = Document::decode(&bytes[..bytes.len() - 6]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn lookup_helpers() {
        let doc = manifest_document(element(
            "manifest",
            vec![plain_attr("package", "com.example")],
            vec![
                element("uses-permission", vec![], vec![]),
                element(
                    "application",
                    vec![],
                    vec![element(
                        "activity",
                        vec![],
                        vec![element("intent-filter", vec![], vec![])],
                    )],
                ),
                element("uses-permission", vec![], vec![]),
            ],
        ));

        assert_eq!(doc.root.children("uses-permission").count(), 2);
        let names = doc
            .root
            .descendants()
            .map(|e| e.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            ["uses-permission", "application", "activity", "intent-filter", "uses-permission"]
        );
    }

    #[test]
    fn android_attribute_by_name() {
        let mut attr = android_attr("label", 0x0101_0001, "Example");
        attr.resource_id = None;
        let e = element("application", vec![attr], vec![]);
        assert_eq!(
            e.android_attribute(AndroidAttr::Label),
            Some(&TypedValue::from("Example"))
        );

        // same local name outside the android namespace does not count
        let e = element("application", vec![plain_attr("label", "x")], vec![]);
        assert_eq!(e.android_attribute(AndroidAttr::Label), None);
        assert_eq!(e.attribute("label"), Some(&TypedValue::from("x")));
        assert_eq!(ANDROID_NAMESPACE, "http://schemas.android.com/apk/res/android");
    }
}
