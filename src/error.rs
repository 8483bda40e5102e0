use std::io;
use thiserror::Error;

/// Errors raised while decoding or encoding binary resources.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(io::Error),

    /// The stream ended in the middle of a field.
    #[error("unexpected end of stream")]
    Truncated,

    /// A structural invariant of the chunk format does not hold.
    #[error("malformed data at offset 0x{offset:08X}: {message}")]
    Format { offset: u64, message: String },

    #[error("unexpected chunk at offset 0x{offset:08X}: expected {expected}, found {found}")]
    UnexpectedChunk {
        offset: u64,
        expected: String,
        found: String,
    },

    #[error("unresolved resource reference 0x{0:08x}")]
    UnresolvedReference(u32),

    #[error("string index {index} out of range (pool holds {count} strings)")]
    StringIndex { index: u32, count: usize },

    #[error("nine-patch chunk not found")]
    NinePatchNotFound,

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("invalid XML: {0}")]
    InvalidXml(String),

    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Error::Truncated
        } else {
            Error::Io(err)
        }
    }
}

impl Error {
    pub fn format(offset: u64, message: impl Into<String>) -> Self {
        Error::Format {
            offset,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
