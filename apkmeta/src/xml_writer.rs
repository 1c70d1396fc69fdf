//! Binary XML encoding of a [`Document`].

use crate::chunks::{begin_chunk, finish_chunk, ChunkType};
use crate::endianness::{push_u16, push_u32};
use crate::stringpool::{Encoding, StringPoolBuilder};
use crate::value::{TypedValue, Value};
use crate::xml::{
    Attribute, Document, Element, Namespace, ATTRIBUTE_SIZE, NODE_HEADER_SIZE, NO_INDEX,
};

impl Document {
    /// Encode the document the way aapt2 does: attribute names that carry a
    /// resource id come first in the string pool so the resource map can
    /// index them directly.
    ///
    /// String pool entries are shared, so a plain attribute named like an
    /// id-carrying one picks up that id when decoded again.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut strings = StringPoolBuilder::new(Encoding::Utf16);
        let mut resource_map = Vec::new();
        collect_resource_ids(&self.root, &mut strings, &mut resource_map);

        let mut body = Vec::new();
        for ns in &self.namespaces {
            write_namespace(&mut body, ChunkType::XmlStartNamespace, ns, &mut strings);
        }
        write_element(&mut body, &self.root, &mut strings);
        for ns in self.namespaces.iter().rev() {
            write_namespace(&mut body, ChunkType::XmlEndNamespace, ns, &mut strings);
        }

        let mut buf = Vec::new();
        let start = begin_chunk(&mut buf, ChunkType::Xml, 8);
        strings.write(&mut buf);
        if !resource_map.is_empty() {
            let map = begin_chunk(&mut buf, ChunkType::XmlResourceMap, 8);
            for id in resource_map {
                push_u32(&mut buf, id);
            }
            finish_chunk(&mut buf, map);
        }
        buf.extend_from_slice(&body);
        finish_chunk(&mut buf, start);
        buf
    }
}

fn collect_resource_ids(element: &Element, strings: &mut StringPoolBuilder, ids: &mut Vec<u32>) {
    for attr in &element.attributes {
        if let Some(id) = attr.resource_id {
            if strings.intern(&attr.name) as usize == ids.len() {
                ids.push(u32::from(id));
            }
        }
    }
    for child in &element.children {
        collect_resource_ids(child, strings, ids);
    }
}

fn optional_index(value: Option<&str>, strings: &mut StringPoolBuilder) -> u32 {
    value.map(|s| strings.intern(s)).unwrap_or(NO_INDEX)
}

fn begin_node(buf: &mut Vec<u8>, type_: ChunkType) -> usize {
    let start = begin_chunk(buf, type_, NODE_HEADER_SIZE);
    push_u32(buf, 1); // line number
    push_u32(buf, NO_INDEX); // comment
    start
}

fn write_namespace(
    buf: &mut Vec<u8>,
    type_: ChunkType,
    ns: &Namespace,
    strings: &mut StringPoolBuilder,
) {
    let start = begin_node(buf, type_);
    push_u32(buf, strings.intern(&ns.prefix));
    push_u32(buf, strings.intern(&ns.uri));
    finish_chunk(buf, start);
}

fn write_element(buf: &mut Vec<u8>, element: &Element, strings: &mut StringPoolBuilder) {
    let start = begin_node(buf, ChunkType::XmlStartElement);
    push_u32(buf, optional_index(element.namespace.as_deref(), strings));
    push_u32(buf, strings.intern(&element.name));
    push_u16(buf, ATTRIBUTE_SIZE); // attribute start, relative to this extension
    push_u16(buf, ATTRIBUTE_SIZE);
    push_u16(buf, element.attributes.len() as u16);
    push_u16(buf, 0); // id index
    push_u16(buf, 0); // class index
    push_u16(buf, 0); // style index
    for attr in &element.attributes {
        write_attribute(buf, attr, strings);
    }
    finish_chunk(buf, start);

    for child in &element.children {
        write_element(buf, child, strings);
    }

    let start = begin_node(buf, ChunkType::XmlEndElement);
    push_u32(buf, optional_index(element.namespace.as_deref(), strings));
    push_u32(buf, strings.intern(&element.name));
    finish_chunk(buf, start);
}

fn write_attribute(buf: &mut Vec<u8>, attr: &Attribute, strings: &mut StringPoolBuilder) {
    push_u32(buf, optional_index(attr.namespace.as_deref(), strings));
    push_u32(buf, strings.intern(&attr.name));
    let raw = match &attr.value {
        TypedValue::Literal(Value::String(s)) => strings.intern(s),
        _ => NO_INDEX,
    };
    push_u32(buf, raw);
    attr.value.write(buf, strings);
}

#[cfg(test)]
mod tests {
    use crate::chunks::{Chunk, ChunkIterator};
    use crate::fixtures::{activity, android_attr, element, manifest_document, plain_attr};
    use crate::resources::ResourceId;
    use crate::stringpool::LoadedStringPool;
    use crate::value::{TypedValue, Value};
    use crate::xml::{Document, Namespace};

    fn sample() -> Document {
        manifest_document(element(
            "manifest",
            vec![
                android_attr("versionCode", 0x0101_021b, Value::Integer(7)),
                android_attr("versionName", 0x0101_021c, "1.2.3"),
                plain_attr("package", "com.example.app"),
            ],
            vec![
                element(
                    "uses-sdk",
                    vec![
                        android_attr("minSdkVersion", 0x0101_020c, Value::Integer(21)),
                        android_attr("targetSdkVersion", 0x0101_0270, Value::Integer(33)),
                    ],
                    vec![],
                ),
                element(
                    "application",
                    vec![
                        android_attr("label", 0x0101_0001, ResourceId::from(0x7f01_0000)),
                        android_attr("icon", 0x0101_0002, ResourceId::from(0x7f02_0000)),
                        plain_attr("debuggable", Value::Boolean(true)),
                        plain_attr("ratio", Value::Float(1.5)),
                        plain_attr("tint", Value::Color(0xff00_ff00)),
                        plain_attr("nothing", Value::Null),
                    ],
                    vec![activity(
                        "activity",
                        vec![android_attr("name", 0x0101_0003, ".MainActivity")],
                        true,
                    )],
                ),
            ],
        ))
    }

    #[test]
    fn round_trip() {
        let doc = sample();
        let decoded = Document::decode(&doc.to_bytes()).unwrap();
        assert_eq!(decoded, doc);
    }

    #[test]
    fn round_trip_without_namespaces() {
        let doc = Document {
            namespaces: vec![],
            root: element(
                "root",
                vec![plain_attr("a", "b")],
                vec![element("leaf", vec![], vec![])],
            ),
        };
        assert_eq!(Document::decode(&doc.to_bytes()).unwrap(), doc);

        let doc = Document {
            namespaces: vec![
                Namespace {
                    prefix: "android".to_owned(),
                    uri: crate::xml::ANDROID_NAMESPACE.to_owned(),
                },
                Namespace {
                    prefix: "tools".to_owned(),
                    uri: "http://schemas.android.com/tools".to_owned(),
                },
            ],
            root: element("root", vec![], vec![]),
        };
        assert_eq!(Document::decode(&doc.to_bytes()).unwrap(), doc);
    }

    #[test]
    fn resource_id_names_lead_the_pool() {
        let bytes = sample().to_bytes();
        let xml = ChunkIterator::new(&bytes).next().unwrap();
        let children = xml.iter().unwrap().collect::<Vec<_>>();

        let pool = LoadedStringPool::from_chunk(&children[0]).unwrap();
        let strings = pool.strings().unwrap();
        assert_eq!(
            &strings[..4],
            &["versionCode", "versionName", "minSdkVersion", "targetSdkVersion"]
        );

        match children[1] {
            Chunk::XmlResourceMap(b) => {
                // label, icon and name follow the four manifest/uses-sdk ids
                assert_eq!(b.len(), 8 + 7 * 4);
                assert_eq!(&b[8..12], &0x0101_021bu32.to_le_bytes());
            }
            ref other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(children[2], Chunk::XmlStartNamespace(_)));
        assert!(matches!(children.last(), Some(Chunk::XmlEndNamespace(_))));
    }

    #[test]
    fn references_stay_unresolved() {
        let doc = Document::decode(&sample().to_bytes()).unwrap();
        let application = doc.root.child("application").unwrap();
        assert_eq!(
            application.attribute("label"),
            Some(&TypedValue::Reference(ResourceId::from(0x7f01_0000)))
        );
    }
}
