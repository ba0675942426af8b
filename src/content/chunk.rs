use bytes::Bytes;

/// One immutable unit of received request body content.
///
/// A chunk is either a run of body bytes or one of two terminal sentinels:
/// normal end-of-stream, or abnormal/truncated end-of-stream. Chunks are
/// produced by the connection's payload decoding and owned by the content
/// queue from the moment they are pushed until consumed or discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    /// A run of body bytes.
    Data(Bytes),
    /// Marks the normal end of the content stream.
    Eof,
    /// Marks an abnormal end of the content stream, before all expected
    /// bytes arrived.
    EarlyEof,
}

impl Chunk {
    /// Returns true if this chunk carries body bytes
    #[inline]
    pub fn is_data(&self) -> bool {
        matches!(self, Chunk::Data(_))
    }

    /// Returns true if this chunk is one of the terminal sentinels
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Chunk::Eof | Chunk::EarlyEof)
    }

    /// Returns a reference to the contained bytes if this is a data chunk
    ///
    /// Returns None for the terminal sentinels
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Chunk::Data(bytes) => Some(bytes),
            Chunk::Eof | Chunk::EarlyEof => None,
        }
    }

    /// Consumes the chunk and returns the contained bytes if this is a data
    /// chunk
    ///
    /// Returns None for the terminal sentinels
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            Chunk::Data(bytes) => Some(bytes),
            Chunk::Eof | Chunk::EarlyEof => None,
        }
    }
}

/// Converts bytes directly into a data chunk.
impl From<Bytes> for Chunk {
    fn from(bytes: Bytes) -> Self {
        Self::Data(bytes)
    }
}

impl From<&'static [u8]> for Chunk {
    fn from(bytes: &'static [u8]) -> Self {
        Self::Data(Bytes::from_static(bytes))
    }
}
