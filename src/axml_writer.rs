//! Text XML to binary XML.
//!
//! The text is parsed with quick-xml, every name and string value is
//! interned into one pool and the element tree is written as a flat list of
//! node chunks carrying the source line of each tag.

use std::collections::HashMap;
use byteorder::{
    LittleEndian,
    WriteBytesExt,
};
use log::debug;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::chunk_header::{begin_chunk, finalize_chunk, MINIMUM_HEADER_SIZE};
use crate::chunk_type::ChunkType;
use crate::data_value_type::DataValueType;
use crate::error::{Error, Result};
use crate::res_package::ResId;
use crate::res_table::ARSCData;
use crate::res_value::ResValue;
use crate::res_xml_encoders::decode_res_xml_attr_value;
use crate::resource_map::ResourceMap;
use crate::string_pool::StringPoolBuilder;

/* Index value meaning "no string" */
const NO_INDEX: u32 = 0xFFFF_FFFF;

pub const RES_NAMESPACE_PREFIX: &str = "http://schemas.android.com/apk/res/";
pub const RES_AUTO_NAMESPACE: &str = "http://schemas.android.com/apk/res-auto";

/* ResXMLTree_node */
const NODE_HEADER_SIZE: u16 = 16;

/* ResXMLTree_attrExt and ResXMLTree_attribute */
const ATTR_EXT_SIZE: u16 = 20;
const ATTRIBUTE_SIZE: u16 = 20;

#[derive(Debug)]
struct Attribute {
    namespace: Option<String>,
    name: String,
    value: String,
    id: Option<ResId>,
}

#[derive(Debug)]
enum Node {
    StartNamespace { line: i32, prefix: String, uri: String },
    EndNamespace { line: i32, prefix: String, uri: String },
    Start { line: i32, namespace: Option<String>, name: String, attributes: Vec<Attribute> },
    End { line: i32, namespace: Option<String>, name: String },
    Text { line: i32, text: String },
}

/// Running line counter over the source text.
struct LineCounter<'a> {
    text: &'a str,
    offset: usize,
    line: i32,
}

impl<'a> LineCounter<'a> {
    fn new(text: &'a str) -> Self {
        LineCounter { text, offset: 0, line: 1 }
    }

    fn line_at(&mut self, position: usize) -> i32 {
        let position = position.min(self.text.len());
        if position < self.offset {
            self.offset = 0;
            self.line = 1;
        }
        self.line += self.text.as_bytes()[self.offset..position].iter()
            .filter(|b| **b == b'\n')
            .count() as i32;
        self.offset = position;
        self.line
    }

    /// Line of the `<` opening the tag that ends at `end`.
    fn tag_line(&mut self, end: usize) -> i32 {
        let end = end.min(self.text.len());
        let start = self.text.as_bytes()[..end].iter()
            .rposition(|b| *b == b'<')
            .unwrap_or(end);
        self.line_at(start)
    }
}

fn utf8(bytes: &[u8]) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(|s| s.to_string())
        .map_err(|e| Error::InvalidXml(e.to_string()))
}

fn split_name(qname: &str) -> (&str, &str) {
    match qname.split_once(':') {
        Some((prefix, name)) => (prefix, name),
        None => ("", qname),
    }
}

/// Encoder from text XML to the binary XML format.
#[derive(Debug, Clone, Default)]
pub struct AXmlWriter {
    utf8: bool,

    /* (namespace uri, attribute name) -> attr resource id */
    attribute_ids: HashMap<(String, String), ResId>,
}

impl AXmlWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write the string pool as UTF-8 instead of UTF-16.
    pub fn utf8(mut self, utf8: bool) -> Self {
        self.utf8 = utf8;
        self
    }

    /// Bind an attribute name to its resource id. Bound attributes are
    /// listed in the resource map.
    pub fn map_attribute(mut self, namespace: &str, name: &str, id: ResId) -> Self {
        self.attribute_ids.insert((namespace.to_string(), name.to_string()), id);
        self
    }

    /// Bind every attribute defined in `table`. Attributes of a package
    /// live in `http://schemas.android.com/apk/res/<package>`; those of the
    /// main package are also reachable through `res-auto`.
    pub fn map_table_attributes(mut self, table: &ARSCData) -> Self {
        let main = table.get_one_package().ok().map(|p| p.name.clone());

        for package in table.packages.iter() {
            let mut namespaces = vec![format!("{}{}", RES_NAMESPACE_PREFIX, package.name)];
            if main.as_deref() == Some(package.name.as_str()) {
                namespaces.push(RES_AUTO_NAMESPACE.to_string());
            }

            for spec in package.specs().filter(|s| s.type_name == "attr") {
                for namespace in namespaces.iter() {
                    self.attribute_ids.insert((namespace.clone(), spec.name.clone()), spec.id);
                }
            }
        }

        self
    }

    pub fn encode(&self, text: &str) -> Result<Vec<u8>> {
        let nodes = self.read_nodes(text)?;
        self.write_nodes(&nodes)
    }

    fn read_nodes(&self, text: &str) -> Result<Vec<Node>> {
        let mut reader = Reader::from_str(text);
        reader.trim_text(true);

        let mut lines = LineCounter::new(text);
        let mut scopes: Vec<Vec<(String, String)>> = Vec::new();
        let mut nodes = Vec::new();

        loop {
            let before = reader.buffer_position();
            match reader.read_event()? {
                Event::Start(e) => {
                    let line = lines.tag_line(reader.buffer_position());
                    self.start_element(&e, line, &mut scopes, &mut nodes)?;
                },
                Event::Empty(e) => {
                    let line = lines.tag_line(reader.buffer_position());
                    let name = utf8(e.name().as_ref())?;
                    self.start_element(&e, line, &mut scopes, &mut nodes)?;
                    end_element(&name, line, &mut scopes, &mut nodes)?;
                },
                Event::End(e) => {
                    let line = lines.tag_line(reader.buffer_position());
                    end_element(&utf8(e.name().as_ref())?, line, &mut scopes, &mut nodes)?;
                },
                Event::Text(e) => {
                    let line = lines.line_at(before);
                    let text = e.unescape()?.into_owned();
                    if !text.is_empty() {
                        nodes.push(Node::Text { line, text });
                    }
                },
                Event::CData(e) => {
                    let line = lines.line_at(before);
                    nodes.push(Node::Text { line, text: utf8(&e.into_inner())? });
                },
                Event::Eof => break,
                _ => {},
            }
        }

        if !scopes.is_empty() {
            return Err(Error::InvalidXml(format!("{} element(s) not closed", scopes.len())));
        }

        Ok(nodes)
    }

    fn start_element(&self,
                     e: &BytesStart,
                     line: i32,
                     scopes: &mut Vec<Vec<(String, String)>>,
                     nodes: &mut Vec<Node>) -> Result<()> {
        let qname = utf8(e.name().as_ref())?;

        let mut declared = Vec::new();
        let mut raw = Vec::new();
        for attr in e.attributes() {
            let attr = attr.map_err(quick_xml::Error::from)?;
            let key = utf8(attr.key.as_ref())?;
            let value = attr.unescape_value()?.into_owned();

            if key == "xmlns" {
                declared.push((String::new(), value));
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                declared.push((prefix.to_string(), value));
            } else {
                raw.push((key, value));
            }
        }

        for (prefix, uri) in declared.iter() {
            nodes.push(Node::StartNamespace { line, prefix: prefix.clone(), uri: uri.clone() });
        }
        scopes.push(declared);

        let (prefix, name) = split_name(&qname);
        let namespace = lookup(scopes, prefix)?;

        let mut attributes = Vec::with_capacity(raw.len());
        for (key, value) in raw {
            let (prefix, name) = split_name(&key);
            let namespace = if prefix.is_empty() { None } else { lookup(scopes, prefix)? };
            let id = self.attribute_ids
                .get(&(namespace.clone().unwrap_or_default(), name.to_string()))
                .copied();
            attributes.push(Attribute { namespace, name: name.to_string(), value, id });
        }

        /* The runtime looks attributes up by id with a binary search */
        attributes.sort_by_key(|a| (a.id.is_none(), a.id));

        nodes.push(Node::Start { line, namespace, name: name.to_string(), attributes });
        Ok(())
    }

    fn write_nodes(&self, nodes: &[Node]) -> Result<Vec<u8>> {
        let mut pool = StringPoolBuilder::new(self.utf8);

        /* Names backed by a resource id take the first pool slots, in the
         * order of the resource map */
        let mut id_slots: HashMap<(String, ResId), u32> = HashMap::new();
        let mut ids = Vec::new();
        for node in nodes {
            if let Node::Start { attributes, .. } = node {
                for attr in attributes {
                    if let Some(id) = attr.id {
                        id_slots.entry((attr.name.clone(), id)).or_insert_with(|| {
                            ids.push(id.0);
                            pool.push_unique(&attr.name)
                        });
                    }
                }
            }
        }

        let mut strings = Interner {
            mapped: ids.len() as u32,
            pool,
            plain: HashMap::new(),
        };

        let mut body = Vec::new();
        for node in nodes {
            match node {
                Node::StartNamespace { line, prefix, uri } | Node::EndNamespace { line, prefix, uri } => {
                    let chunk_type = if matches!(node, Node::StartNamespace { .. }) {
                        ChunkType::XmlStartNamespace
                    } else {
                        ChunkType::XmlEndNamespace
                    };
                    let start = begin_node(&mut body, chunk_type, *line)?;
                    body.write_u32::<LittleEndian>(strings.intern(prefix))?;
                    body.write_u32::<LittleEndian>(strings.intern(uri))?;
                    finalize_chunk(&mut body, start);
                },
                Node::Start { line, namespace, name, attributes } => {
                    let start = begin_node(&mut body, ChunkType::XmlStartElement, *line)?;
                    body.write_u32::<LittleEndian>(strings.optional(namespace.as_deref()))?;
                    body.write_u32::<LittleEndian>(strings.intern(name))?;
                    body.write_u16::<LittleEndian>(ATTR_EXT_SIZE)?;
                    body.write_u16::<LittleEndian>(ATTRIBUTE_SIZE)?;
                    body.write_u16::<LittleEndian>(attributes.len() as u16)?;

                    /* 1-based positions of the plain id, class and style attributes */
                    for special in ["id", "class", "style"] {
                        let position = attributes.iter()
                            .position(|a| a.namespace.is_none() && a.name == special)
                            .map_or(0, |p| p + 1);
                        body.write_u16::<LittleEndian>(position as u16)?;
                    }

                    for attr in attributes {
                        let name = match attr.id {
                            Some(id) => id_slots.get(&(attr.name.clone(), id)).copied()
                                .unwrap_or(NO_INDEX),
                            None => strings.intern(&attr.name),
                        };
                        body.write_u32::<LittleEndian>(strings.optional(attr.namespace.as_deref()))?;
                        body.write_u32::<LittleEndian>(name)?;

                        let (raw, value) = match ResValue::parse_typed(&attr.value) {
                            Some(value) => (NO_INDEX, value),
                            None => {
                                let index = strings.intern(&decode_res_xml_attr_value(&attr.value));
                                (index, ResValue::string(index))
                            },
                        };
                        body.write_u32::<LittleEndian>(raw)?;
                        value.write(&mut body)?;
                    }
                    finalize_chunk(&mut body, start);
                },
                Node::End { line, namespace, name } => {
                    let start = begin_node(&mut body, ChunkType::XmlEndElement, *line)?;
                    body.write_u32::<LittleEndian>(strings.optional(namespace.as_deref()))?;
                    body.write_u32::<LittleEndian>(strings.intern(name))?;
                    finalize_chunk(&mut body, start);
                },
                Node::Text { line, text } => {
                    let start = begin_node(&mut body, ChunkType::XmlCData, *line)?;
                    body.write_u32::<LittleEndian>(strings.intern(text))?;
                    ResValue::new(DataValueType::TypeNull, 0).write(&mut body)?;
                    finalize_chunk(&mut body, start);
                },
            }
        }

        let mut buf = Vec::new();
        let root = begin_chunk(&mut buf, ChunkType::Xml, MINIMUM_HEADER_SIZE)?;
        buf.extend(strings.pool.to_chunk()?);
        if !ids.is_empty() {
            buf.extend(ResourceMap::new(ids).to_chunk()?);
        }
        buf.extend(body);
        finalize_chunk(&mut buf, root);

        debug!("Encoded {} nodes into {} bytes", nodes.len(), buf.len());
        Ok(buf)
    }
}

/// Pool indices for everything except resource-mapped attribute names.
struct Interner {
    pool: StringPoolBuilder,

    /* Slots below this index belong to the resource map */
    mapped: u32,
    plain: HashMap<String, u32>,
}

impl Interner {
    fn intern(&mut self, value: &str) -> u32 {
        let index = self.pool.intern(value);
        if index >= self.mapped {
            return index;
        }
        if let Some(index) = self.plain.get(value) {
            return *index;
        }
        let index = self.pool.push_unique(value);
        self.plain.insert(value.to_string(), index);
        index
    }

    fn optional(&mut self, value: Option<&str>) -> u32 {
        value.map_or(NO_INDEX, |v| self.intern(v))
    }
}

fn lookup(scopes: &[Vec<(String, String)>], prefix: &str) -> Result<Option<String>> {
    let found = scopes.iter().rev()
        .flat_map(|scope| scope.iter().rev())
        .find(|(p, _)| p == prefix)
        .map(|(_, uri)| uri.clone());

    match found {
        Some(uri) => Ok(Some(uri)),
        None if prefix.is_empty() => Ok(None),
        None => Err(Error::InvalidXml(format!("undeclared namespace prefix {:?}", prefix))),
    }
}

fn end_element(qname: &str,
               line: i32,
               scopes: &mut Vec<Vec<(String, String)>>,
               nodes: &mut Vec<Node>) -> Result<()> {
    let (prefix, name) = split_name(qname);
    let namespace = lookup(scopes, prefix)?;
    nodes.push(Node::End { line, namespace, name: name.to_string() });

    let declared = scopes.pop()
        .ok_or_else(|| Error::InvalidXml(format!("end of {} without a start", qname)))?;
    for (prefix, uri) in declared.into_iter().rev() {
        nodes.push(Node::EndNamespace { line, prefix, uri });
    }

    Ok(())
}

fn begin_node(buf: &mut Vec<u8>, chunk_type: ChunkType, line: i32) -> Result<usize> {
    let start = begin_chunk(buf, chunk_type, NODE_HEADER_SIZE)?;
    buf.write_u32::<LittleEndian>(line as u32)?;
    buf.write_u32::<LittleEndian>(NO_INDEX)?;
    Ok(start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{AXmlDocument, XmlEvent};

    const ANDROID: &str = "http://schemas.android.com/apk/res/android";

    #[test]
    fn writes_namespaces_attributes_and_lines() {
        let text = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
                    <manifest xmlns:android=\"http://schemas.android.com/apk/res/android\" package=\"com.example\">\n\
                    \n    <uses-sdk android:minSdkVersion=\"21\"/>\n\
                    </manifest>";
        let bytes = AXmlWriter::new()
            .map_attribute(ANDROID, "minSdkVersion", ResId(0x0101_020c))
            .encode(text)
            .unwrap();
        let doc = AXmlDocument::from_bytes(&bytes).unwrap();

        assert_eq!(doc.resource_map.get(0), Some(ResId(0x0101_020c)));
        assert_eq!(doc.strings.get(0), Some("minSdkVersion"));
        assert_eq!(doc.first_line(), 2);

        match &doc.events[2] {
            XmlEvent::StartElement { line, prefix, name, attributes, .. } => {
                assert_eq!(*line, 4);
                assert_eq!(prefix, &None);
                assert_eq!(name, "uses-sdk");
                assert_eq!(attributes[0].prefix.as_deref(), Some("android"));
                assert_eq!(attributes[0].resource_id, Some(ResId(0x0101_020c)));
                assert_eq!(attributes[0].value, ResValue::new(DataValueType::TypeIntDec, 21));
                assert_eq!(attributes[0].raw_value, None);
            },
            other => panic!("unexpected event {:?}", other),
        }
        assert!(matches!(&doc.events[5], XmlEvent::EndNamespace { prefix, .. } if prefix == "android"));
    }

    #[test]
    fn plain_names_do_not_share_mapped_slots() {
        let text = "<a xmlns:android=\"http://schemas.android.com/apk/res/android\" \
                    android:name=\"x\" name=\"y\"/>";
        let bytes = AXmlWriter::new()
            .map_attribute(ANDROID, "name", ResId(0x0101_0003))
            .encode(text)
            .unwrap();
        let doc = AXmlDocument::from_bytes(&bytes).unwrap();

        match &doc.events[1] {
            XmlEvent::StartElement { attributes, .. } => {
                assert_eq!(attributes.len(), 2);
                assert_eq!(attributes[0].resource_id, Some(ResId(0x0101_0003)));
                assert_eq!(attributes[1].name, "name");
                assert_eq!(attributes[1].resource_id, None);
                assert_eq!(attributes[1].raw_value.as_deref(), Some("y"));
            },
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn undeclared_prefix_is_rejected() {
        let result = AXmlWriter::new().encode("<a foo:b=\"1\"/>");
        assert!(matches!(result, Err(Error::InvalidXml(_))));
    }
}
