use std::io::{
    Cursor,
    Write,
};
use byteorder::{
    LittleEndian,
    ReadBytesExt,
};
use log::warn;

use crate::chunk_header::{ChunkHeader, MINIMUM_HEADER_SIZE};
use crate::chunk_type::{ChunkType, chunk_name};
use crate::error::{Error, Result};
use crate::namespace_stack::NamespaceStack;
use crate::res_attr::{ResourceResolver, resolve_reference};
use crate::res_package::ResId;
use crate::res_value::ResValue;
use crate::res_xml_encoders::{encode_as_res_xml_attr_value, escape_xml_chars};
use crate::resource_map::ResourceMap;
use crate::serializer::{
    LineNumberSerializer,
    MxSerializer,
    SerializerOptions,
    XmlSink,
};
use crate::string_pool::StringPool;

/* Index value meaning "no string" */
const NO_INDEX: u32 = 0xFFFF_FFFF;

/* Size of ResXMLTree_attribute */
const MIN_ATTRIBUTE_SIZE: u16 = 20;

/// Attribute of a start element, as stored in the binary document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    /* Namespace URI, if any */
    pub namespace: Option<String>,
    pub prefix: Option<String>,
    pub name: String,

    /* Original string value, kept by aapt for strings */
    pub raw_value: Option<String>,

    pub value: ResValue,

    /* Attribute resource id from the resource map */
    pub resource_id: Option<ResId>,
}

impl XmlAttribute {
    /// `prefix:name`. A name stripped from the string pool is recovered
    /// from the attribute's resource id.
    pub fn qualified_name(&self, resolver: &dyn ResourceResolver) -> String {
        let name = if self.name.is_empty() {
            match self.resource_id {
                Some(id) => resolver.spec_name(id)
                    .unwrap_or_else(|| format!("APKTOOL_MISSING_{}", id)),
                None => self.name.clone(),
            }
        } else {
            self.name.clone()
        };

        qualify(self.prefix.as_deref(), &name)
    }

    /// Value text ready to be written between quotes: strings are escaped,
    /// enum and flag values are named through their attribute, references
    /// are resolved.
    pub fn render(&self, strings: &StringPool, resolver: &dyn ResourceResolver) -> String {
        if self.value.is_string() {
            let text = self.raw_value.clone()
                .or_else(|| strings.get(self.value.data).map(|s| s.to_string()))
                .unwrap_or_default();
            return encode_as_res_xml_attr_value(&escape_xml_chars(&text));
        }

        if let Some(attr) = self.resource_id.and_then(|id| resolver.attribute(id)) {
            if let Some(text) = attr.convert_to_res_xml_format(&self.value, resolver) {
                return text;
            }
        }

        if let Some(text) = resolve_reference(&self.value, resolver) {
            return text;
        }

        match (self.value.coerce_to_string(), &self.raw_value) {
            (Some(text), _) => text,
            (None, Some(raw)) => encode_as_res_xml_attr_value(&escape_xml_chars(raw)),
            (None, None) => format!("0x{:08x}", self.value.data),
        }
    }
}

/// Node of a binary XML document, in stream order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlEvent {
    StartNamespace {
        line: i32,
        prefix: String,
        uri: String,
    },
    EndNamespace {
        line: i32,
        prefix: String,
        uri: String,
    },
    StartElement {
        line: i32,
        namespace: Option<String>,
        prefix: Option<String>,
        name: String,

        /* (prefix, uri) pairs declared on this element */
        namespaces: Vec<(String, String)>,

        attributes: Vec<XmlAttribute>,
    },
    EndElement {
        line: i32,
        namespace: Option<String>,
        prefix: Option<String>,
        name: String,
    },
    Text {
        line: i32,
        text: String,
    },
}

impl XmlEvent {
    pub fn line(&self) -> i32 {
        match self {
            XmlEvent::StartNamespace { line, .. }
            | XmlEvent::EndNamespace { line, .. }
            | XmlEvent::StartElement { line, .. }
            | XmlEvent::EndElement { line, .. }
            | XmlEvent::Text { line, .. } => *line,
        }
    }
}

fn qualify(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(prefix) if !prefix.is_empty() => format!("{}:{}", prefix, name),
        _ => name.to_string(),
    }
}

/// A decoded binary XML document.
#[derive(Debug, Clone, Default)]
pub struct AXmlDocument {
    pub strings: StringPool,
    pub resource_map: ResourceMap,
    pub events: Vec<XmlEvent>,
}

impl AXmlDocument {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_buff(&mut Cursor::new(bytes))
    }

    pub fn from_buff<T: AsRef<[u8]>>(axml_buff: &mut Cursor<T>) -> Result<Self> {
        let mut parser = AXmlParser::new();
        parser.parse(axml_buff)?;

        Ok(AXmlDocument {
            strings: parser.strings,
            resource_map: parser.resource_map,
            events: parser.events,
        })
    }

    /// Line of the root element, `-1` when the document has none.
    pub fn first_line(&self) -> i32 {
        self.events.iter()
            .find_map(|e| match e {
                XmlEvent::StartElement { line, .. } => Some(*line),
                _ => None,
            })
            .unwrap_or(-1)
    }

    /// Replay the document into `sink`.
    pub fn write_to<S: XmlSink>(&self, sink: &mut S, resolver: &dyn ResourceResolver) -> Result<()> {
        sink.start_document(self.first_line())?;

        for event in self.events.iter() {
            match event {
                XmlEvent::StartElement { line, prefix, name, namespaces, attributes, .. } => {
                    sink.start_tag(*line, &qualify(prefix.as_deref(), name), namespaces)?;
                    for attribute in attributes {
                        sink.attribute(&attribute.qualified_name(resolver),
                                       &attribute.render(&self.strings, resolver))?;
                    }
                },
                XmlEvent::EndElement { line, prefix, name, .. } => {
                    sink.end_tag(*line, &qualify(prefix.as_deref(), name))?;
                },
                XmlEvent::Text { line, text } => sink.text(*line, text)?,
                XmlEvent::StartNamespace { .. } | XmlEvent::EndNamespace { .. } => {},
            }
        }

        sink.end_document()
    }
}

/// Flat chunk walker building the event list.
struct AXmlParser {
    strings: StringPool,
    resource_map: ResourceMap,
    namespaces: NamespaceStack,
    events: Vec<XmlEvent>,

    /* (namespace, name) string indices of the open elements */
    open: Vec<(u32, u32)>,

    /* The depth frame of an element is dropped on the node after its end */
    decrease_depth: bool,
}

impl AXmlParser {
    fn new() -> Self {
        AXmlParser {
            strings: StringPool::default(),
            resource_map: ResourceMap::default(),
            namespaces: NamespaceStack::new(),
            events: Vec::new(),
            open: Vec::new(),
            decrease_depth: false,
        }
    }

    fn parse<T: AsRef<[u8]>>(&mut self, axml_buff: &mut Cursor<T>) -> Result<()> {
        self.namespaces.reset();

        let root = ChunkHeader::read(axml_buff)?;
        /* Some tools label the root with the string pool tag */
        let broken_root = root.is(ChunkType::StringPool) && root.header_size == MINIMUM_HEADER_SIZE;
        if !broken_root {
            root.expect_type(ChunkType::Xml)?;
        }
        root.check_for_unread_header(axml_buff)?;

        while axml_buff.position() < root.end {
            let header = ChunkHeader::read(axml_buff)?;
            if header.is_none() {
                warn!("Document ends before the end of its root chunk");
                break;
            }

            match header.kind() {
                Some(ChunkType::StringPool) => {
                    self.strings = StringPool::from_chunk(axml_buff, &header)?;
                },
                Some(ChunkType::XmlResourceMap) => {
                    self.resource_map = ResourceMap::from_chunk(axml_buff, &header)?;
                },
                Some(ChunkType::XmlStartNamespace)
                | Some(ChunkType::XmlEndNamespace)
                | Some(ChunkType::XmlStartElement)
                | Some(ChunkType::XmlEndElement)
                | Some(ChunkType::XmlCData) => self.parse_node(axml_buff, &header)?,
                _ if (ChunkType::XmlStartNamespace.as_u16()..=ChunkType::XmlLastChunk.as_u16())
                    .contains(&header.chunk_type) => {
                    warn!("Skipping unknown XML node {}", header);
                    header.skip_chunk(axml_buff)?;
                },
                _ => {
                    return Err(Error::UnexpectedChunk {
                        offset: header.start,
                        expected: "XML node".to_string(),
                        found: chunk_name(header.chunk_type),
                    });
                },
            }
        }

        if !self.open.is_empty() {
            warn!("{} element(s) left open at the end of the document", self.open.len());
            while let Some((namespace, name)) = self.open.pop() {
                let event = self.end_element_event(-1, namespace, name)?;
                self.events.push(event);
            }
        }

        Ok(())
    }

    fn optional_string(&self, index: u32) -> Option<String> {
        if index == NO_INDEX {
            return None;
        }
        match self.strings.get(index) {
            Some(s) => Some(s.to_string()),
            None => {
                warn!("String index {} out of range ({} strings)", index, self.strings.len());
                None
            },
        }
    }

    fn prefix_for(&self, namespace: u32) -> Option<String> {
        if namespace == NO_INDEX {
            return None;
        }
        let prefix = self.namespaces.find_prefix(namespace as i32);
        if prefix < 0 {
            warn!("No prefix declared for namespace {:?}", self.optional_string(namespace));
            return None;
        }
        self.optional_string(prefix as u32)
    }

    fn end_element_event(&self, line: i32, namespace: u32, name: u32) -> Result<XmlEvent> {
        Ok(XmlEvent::EndElement {
            line,
            namespace: self.optional_string(namespace),
            prefix: self.prefix_for(namespace),
            name: self.strings.string(name)?.to_string(),
        })
    }

    /// Every node starts with ResXMLTree_node: chunk header, line number
    /// and comment index.
    fn parse_node<T: AsRef<[u8]>>(&mut self, axml_buff: &mut Cursor<T>, header: &ChunkHeader) -> Result<()> {
        let line = axml_buff.read_u32::<LittleEndian>()? as i32;
        let _comment = axml_buff.read_u32::<LittleEndian>()?;
        header.check_for_unread_header(axml_buff)?;

        if self.decrease_depth {
            self.namespaces.decrease_depth();
            self.decrease_depth = false;
        }

        match header.kind() {
            Some(ChunkType::XmlStartNamespace) => {
                let prefix = axml_buff.read_u32::<LittleEndian>()?;
                let uri = axml_buff.read_u32::<LittleEndian>()?;
                self.namespaces.push(prefix as i32, uri as i32);
                self.events.push(XmlEvent::StartNamespace {
                    line,
                    prefix: self.optional_string(prefix).unwrap_or_default(),
                    uri: self.optional_string(uri).unwrap_or_default(),
                });
            },
            Some(ChunkType::XmlEndNamespace) => {
                let prefix = axml_buff.read_u32::<LittleEndian>()?;
                let uri = axml_buff.read_u32::<LittleEndian>()?;
                if !self.namespaces.pop() {
                    warn!("End of namespace {:?} that was never started", self.optional_string(uri));
                }
                self.events.push(XmlEvent::EndNamespace {
                    line,
                    prefix: self.optional_string(prefix).unwrap_or_default(),
                    uri: self.optional_string(uri).unwrap_or_default(),
                });
            },
            Some(ChunkType::XmlStartElement) => self.parse_start_element(axml_buff, header, line)?,
            Some(ChunkType::XmlEndElement) => {
                let namespace = axml_buff.read_u32::<LittleEndian>()?;
                let name = axml_buff.read_u32::<LittleEndian>()?;
                match self.open.pop() {
                    Some(open) if open == (namespace, name) => {},
                    Some((_, open_name)) => {
                        return Err(Error::format(header.start, format!(
                            "end element {:?} does not match open element {:?}",
                            self.optional_string(name), self.optional_string(open_name))));
                    },
                    None => {
                        return Err(Error::format(header.start, format!(
                            "end element {:?} without a start", self.optional_string(name))));
                    },
                }
                let event = self.end_element_event(line, namespace, name)?;
                self.events.push(event);
                self.decrease_depth = true;
            },
            Some(ChunkType::XmlCData) => {
                let data = axml_buff.read_u32::<LittleEndian>()?;
                let typed = ResValue::from_buff(axml_buff)?;
                let text = self.optional_string(data)
                    .or_else(|| typed.coerce_to_string())
                    .unwrap_or_default();
                self.events.push(XmlEvent::Text { line, text });
            },
            _ => {},
        }

        header.skip_chunk(axml_buff)
    }

    fn parse_start_element<T: AsRef<[u8]>>(&mut self,
                                           axml_buff: &mut Cursor<T>,
                                           header: &ChunkHeader,
                                           line: i32) -> Result<()> {
        let ext_start = axml_buff.position();
        let namespace = axml_buff.read_u32::<LittleEndian>()?;
        let name = axml_buff.read_u32::<LittleEndian>()?;
        let attribute_start = axml_buff.read_u16::<LittleEndian>()?;
        let attribute_size = axml_buff.read_u16::<LittleEndian>()?;
        let attribute_count = axml_buff.read_u16::<LittleEndian>()?;
        let _id_index = axml_buff.read_u16::<LittleEndian>()?;
        let _class_index = axml_buff.read_u16::<LittleEndian>()?;
        let _style_index = axml_buff.read_u16::<LittleEndian>()?;

        if attribute_count > 0 && attribute_size < MIN_ATTRIBUTE_SIZE {
            return Err(Error::format(header.start, format!(
                "attribute size {} is below {}", attribute_size, MIN_ATTRIBUTE_SIZE)));
        }

        /* Declarations pushed since the parent element opened */
        let depth = self.namespaces.get_depth() as i32;
        let first = self.namespaces.get_accumulated_count(depth - 1);
        let last = self.namespaces.get_accumulated_count(depth);
        let mut namespaces = Vec::new();
        for i in first..last {
            let prefix = self.namespaces.get_prefix(i);
            let uri = self.namespaces.get_uri(i);
            namespaces.push((
                self.optional_string(prefix as u32).unwrap_or_default(),
                self.optional_string(uri as u32).unwrap_or_default(),
            ));
        }
        self.namespaces.increase_depth();

        let mut attributes = Vec::with_capacity(attribute_count as usize);
        for i in 0..u64::from(attribute_count) {
            axml_buff.set_position(ext_start + u64::from(attribute_start) + i * u64::from(attribute_size));
            let attr_namespace = axml_buff.read_u32::<LittleEndian>()?;
            let attr_name = axml_buff.read_u32::<LittleEndian>()?;
            let raw_value = axml_buff.read_u32::<LittleEndian>()?;
            let value = ResValue::from_buff(axml_buff)?;

            attributes.push(XmlAttribute {
                namespace: self.optional_string(attr_namespace),
                prefix: self.prefix_for(attr_namespace),
                name: self.optional_string(attr_name).unwrap_or_default(),
                raw_value: self.optional_string(raw_value),
                value,
                resource_id: self.resource_map.get(attr_name),
            });
        }

        self.open.push((namespace, name));
        self.events.push(XmlEvent::StartElement {
            line,
            namespace: self.optional_string(namespace),
            prefix: self.prefix_for(namespace),
            name: self.strings.string(name)?.to_string(),
            namespaces,
            attributes,
        });

        Ok(())
    }
}

/// Binary XML to text XML.
pub struct XmlStreamDecoder<'r> {
    resolver: &'r dyn ResourceResolver,
    options: SerializerOptions,
}

impl<'r> XmlStreamDecoder<'r> {
    pub fn new(resolver: &'r dyn ResourceResolver, options: SerializerOptions) -> Self {
        XmlStreamDecoder { resolver, options }
    }

    /// Decode the document at the cursor into `out` and hand `out` back.
    pub fn decode<T: AsRef<[u8]>, W: Write>(&self, axml_buff: &mut Cursor<T>, out: W) -> Result<W> {
        let document = AXmlDocument::from_buff(axml_buff)?;

        /* Attribute values come out of `render` already escaped */
        let options = SerializerOptions {
            escape_attributes: false,
            ..self.options.clone()
        };
        let serializer = MxSerializer::new(out, options);

        if self.options.line_alignment {
            let mut sink = LineNumberSerializer::new(serializer);
            document.write_to(&mut sink, self.resolver)?;
            Ok(sink.into_inner().into_inner())
        } else {
            let mut sink = serializer;
            document.write_to(&mut sink, self.resolver)?;
            Ok(sink.into_inner())
        }
    }

    pub fn decode_to_string(&self, bytes: &[u8]) -> Result<String> {
        let out = self.decode(&mut Cursor::new(bytes), Vec::new())?;
        String::from_utf8(out).map_err(|e| Error::InvalidXml(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use crate::chunk_header::{begin_chunk, finalize_chunk};
    use crate::res_attr::NoResolver;
    use crate::string_pool::StringPoolBuilder;

    fn node(buf: &mut Vec<u8>, chunk_type: ChunkType, line: u32, ext: &[u32]) {
        let start = begin_chunk(buf, chunk_type, 16).unwrap();
        buf.write_u32::<LittleEndian>(line).unwrap();
        buf.write_u32::<LittleEndian>(NO_INDEX).unwrap();
        for value in ext {
            buf.write_u32::<LittleEndian>(*value).unwrap();
        }
        finalize_chunk(buf, start);
    }

    /* <a><b/></a> with an optional mismatching end */
    fn document(root_type: ChunkType, close_with: u32) -> Vec<u8> {
        let mut strings = StringPoolBuilder::new(true);
        strings.intern("a");
        strings.intern("b");

        let mut buf = Vec::new();
        let root = begin_chunk(&mut buf, root_type, 8).unwrap();
        buf.extend(strings.to_chunk().unwrap());
        /* ns, name, attrStart, attrSize, attrCount, id, class, style */
        let element = |name: u32| [NO_INDEX, name, 0x0014_0014, 0, 0];
        node(&mut buf, ChunkType::XmlStartElement, 1, &element(0));
        node(&mut buf, ChunkType::XmlStartElement, 2, &element(1));
        node(&mut buf, ChunkType::XmlEndElement, 2, &[NO_INDEX, 1]);
        node(&mut buf, ChunkType::XmlEndElement, 3, &[NO_INDEX, close_with]);
        finalize_chunk(&mut buf, root);
        buf
    }

    #[test]
    fn decodes_nested_elements() {
        let doc = AXmlDocument::from_bytes(&document(ChunkType::Xml, 0)).unwrap();
        assert_eq!(doc.events.len(), 4);
        assert_eq!(doc.first_line(), 1);

        let decoder = XmlStreamDecoder::new(&NoResolver, SerializerOptions {
            line_alignment: false,
            ..Default::default()
        });
        let text = decoder.decode_to_string(&document(ChunkType::Xml, 0)).unwrap();
        assert_eq!(text, "<?xml version=\"1.0\" encoding=\"utf-8\" standalone=\"no\"?><a>\n    <b />\n</a>");
    }

    #[test]
    fn accepts_string_pool_tagged_root() {
        let doc = AXmlDocument::from_bytes(&document(ChunkType::StringPool, 0)).unwrap();
        assert_eq!(doc.events.len(), 4);
    }

    #[test]
    fn unmatched_end_is_format_error() {
        let result = AXmlDocument::from_bytes(&document(ChunkType::Xml, 1));
        assert!(matches!(result, Err(Error::Format { .. })));
    }

    #[test]
    fn end_without_start_is_format_error() {
        let mut strings = StringPoolBuilder::new(true);
        strings.intern("a");

        let mut buf = Vec::new();
        let root = begin_chunk(&mut buf, ChunkType::Xml, 8).unwrap();
        buf.extend(strings.to_chunk().unwrap());
        node(&mut buf, ChunkType::XmlEndElement, 1, &[NO_INDEX, 0]);
        finalize_chunk(&mut buf, root);

        assert!(matches!(AXmlDocument::from_bytes(&buf), Err(Error::Format { .. })));
    }

    #[test]
    fn namespace_end_without_start_is_tolerated() {
        let mut strings = StringPoolBuilder::new(true);
        strings.intern("a");
        strings.intern("x");
        strings.intern("urn:x");

        let mut buf = Vec::new();
        let root = begin_chunk(&mut buf, ChunkType::Xml, 8).unwrap();
        buf.extend(strings.to_chunk().unwrap());
        node(&mut buf, ChunkType::XmlStartElement, 1, &[NO_INDEX, 0, 0x0014_0014, 0, 0]);
        node(&mut buf, ChunkType::XmlEndElement, 1, &[NO_INDEX, 0]);
        node(&mut buf, ChunkType::XmlEndNamespace, 1, &[1, 2]);
        finalize_chunk(&mut buf, root);

        let doc = AXmlDocument::from_bytes(&buf).unwrap();
        assert_eq!(doc.events.len(), 3);
        assert_eq!(doc.events[2], XmlEvent::EndNamespace {
            line: 1,
            prefix: "x".to_string(),
            uri: "urn:x".to_string(),
        });
    }

    #[test]
    fn unexpected_chunk_is_rejected() {
        let mut buf = Vec::new();
        let root = begin_chunk(&mut buf, ChunkType::Xml, 8).unwrap();
        let table = begin_chunk(&mut buf, ChunkType::TablePackage, 8).unwrap();
        finalize_chunk(&mut buf, table);
        finalize_chunk(&mut buf, root);
        assert!(matches!(AXmlDocument::from_bytes(&buf), Err(Error::UnexpectedChunk { .. })));
    }
}
