use filestream_protocol::{DownloadChunk, UploadChunk};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{DEFAULT_CHUNK_SIZE, TransferError};

/// A slice of the source, at most one chunk size long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Byte offset within the source.
    pub offset: u64,
    /// Raw chunk data.
    pub data: Vec<u8>,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<Chunk> for UploadChunk {
    fn from(chunk: Chunk) -> Self {
        UploadChunk { data: chunk.data }
    }
}

impl From<Chunk> for DownloadChunk {
    fn from(chunk: Chunk) -> Self {
        DownloadChunk { data: chunk.data }
    }
}

/// Reads a byte source in fixed-size chunks.
///
/// Every chunk except the last is exactly `chunk_size` bytes, however the
/// underlying reader splits its reads.
pub struct ChunkReader<R> {
    reader: R,
    chunk_size: usize,
    offset: u64,
    eof: bool,
}

impl<R: AsyncRead + Unpin> ChunkReader<R> {
    /// Wraps `reader`.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] is used.
    pub fn new(reader: R, chunk_size: usize) -> Self {
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Self {
            reader,
            chunk_size,
            offset: 0,
            eof: false,
        }
    }

    /// Reads the next chunk. Returns `None` at end of source.
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>, TransferError> {
        if self.eof {
            return Ok(None);
        }

        let mut buf = vec![0u8; self.chunk_size];
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]).await {
                Ok(0) => {
                    self.eof = true;
                    break;
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        if filled == 0 {
            return Ok(None);
        }
        buf.truncate(filled);

        let chunk = Chunk {
            offset: self.offset,
            data: buf,
        };
        self.offset += filled as u64;
        Ok(Some(chunk))
    }

    /// Bytes read so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}
