use std::fmt;

/* Type identifiers for chunks, as found in the first two bytes of every
 * chunk header. Table and XML sub-chunk identifiers share the same space. */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ChunkType {
    /* Sentinel returned when the stream ends cleanly on a chunk boundary */
    None = 0xFFFF,

    Null = 0x0000,
    StringPool = 0x0001,
    Table = 0x0002,
    Xml = 0x0003,

    /* Chunk types in RES_XML_TYPE. RES_XML_FIRST_CHUNK_TYPE shares its
     * value with StartNamespace. */
    XmlStartNamespace = 0x0100,
    XmlEndNamespace = 0x0101,
    XmlStartElement = 0x0102,
    XmlEndElement = 0x0103,
    XmlCData = 0x0104,
    XmlLastChunk = 0x017F,

    /* This contains a uint32_t array mapping strings in the string
     * pool back to resource identifiers. It is optional. */
    XmlResourceMap = 0x0180,

    /* Chunk types in RES_TABLE_TYPE */
    TablePackage = 0x0200,
    TableType = 0x0201,
    TableTypeSpec = 0x0202,
    TableLibrary = 0x0203,
    TableOverlayable = 0x0204,
    TableOverlayablePolicy = 0x0205,
    TableStagedAlias = 0x0206,
}

impl ChunkType {
    pub fn from_u16(value: u16) -> Option<Self> {
        let chunk_type = match value {
            0xFFFF => ChunkType::None,
            0x0000 => ChunkType::Null,
            0x0001 => ChunkType::StringPool,
            0x0002 => ChunkType::Table,
            0x0003 => ChunkType::Xml,
            0x0100 => ChunkType::XmlStartNamespace,
            0x0101 => ChunkType::XmlEndNamespace,
            0x0102 => ChunkType::XmlStartElement,
            0x0103 => ChunkType::XmlEndElement,
            0x0104 => ChunkType::XmlCData,
            0x017F => ChunkType::XmlLastChunk,
            0x0180 => ChunkType::XmlResourceMap,
            0x0200 => ChunkType::TablePackage,
            0x0201 => ChunkType::TableType,
            0x0202 => ChunkType::TableTypeSpec,
            0x0203 => ChunkType::TableLibrary,
            0x0204 => ChunkType::TableOverlayable,
            0x0205 => ChunkType::TableOverlayablePolicy,
            0x0206 => ChunkType::TableStagedAlias,
            _ => return None,
        };

        Some(chunk_type)
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn name(self) -> &'static str {
        match self {
            ChunkType::None => "NONE",
            ChunkType::Null => "NULL",
            ChunkType::StringPool => "STRING_POOL",
            ChunkType::Table => "TABLE",
            ChunkType::Xml => "XML",
            ChunkType::XmlStartNamespace => "XML_START_NAMESPACE",
            ChunkType::XmlEndNamespace => "XML_END_NAMESPACE",
            ChunkType::XmlStartElement => "XML_START_ELEMENT",
            ChunkType::XmlEndElement => "XML_END_ELEMENT",
            ChunkType::XmlCData => "XML_CDATA",
            ChunkType::XmlLastChunk => "XML_LAST_CHUNK",
            ChunkType::XmlResourceMap => "XML_RESOURCE_MAP",
            ChunkType::TablePackage => "TABLE_PACKAGE",
            ChunkType::TableType => "TABLE_TYPE",
            ChunkType::TableTypeSpec => "TABLE_TYPE_SPEC",
            ChunkType::TableLibrary => "TABLE_LIBRARY",
            ChunkType::TableOverlayable => "TABLE_OVERLAYABLE",
            ChunkType::TableOverlayablePolicy => "TABLE_OVERLAYABLE_POLICY",
            ChunkType::TableStagedAlias => "TABLE_STAGED_ALIAS",
        }
    }
}

/// Readable name for a raw chunk tag, used in diagnostics.
pub fn chunk_name(value: u16) -> String {
    match ChunkType::from_u16(value) {
        Some(chunk_type) => chunk_type.name().to_string(),
        None => format!("UNKNOWN(0x{:04X})", value),
    }
}

/* Implementation of the UpperHex trait for ChunkType */
impl fmt::UpperHex for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::UpperHex::fmt(&self.as_u16(), f)
    }
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
