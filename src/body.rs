use std::io::{self, Read, Seek, SeekFrom};

use bytes::Bytes;
use sha2::{Digest, Sha256};

use crate::util::encode_hex_lower;

/// A request payload stream.
///
/// Streams that cannot seek report `is_repositionable() == false`; requests
/// carrying them are never retried.
pub trait PayloadStream: Read + Send {
    fn is_repositionable(&self) -> bool;

    fn position(&mut self) -> io::Result<u64>;

    fn reposition(&mut self, position: u64) -> io::Result<()>;

    /// Hex digest of the bytes read so far, for hashing decorators only.
    fn payload_digest(&self) -> Option<String> {
        None
    }
}

pub struct SeekableStream<R> {
    inner: R,
}

impl<R> SeekableStream<R>
where
    R: Read + Seek + Send,
{
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for SeekableStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R> PayloadStream for SeekableStream<R>
where
    R: Read + Seek + Send,
{
    fn is_repositionable(&self) -> bool {
        true
    }

    fn position(&mut self) -> io::Result<u64> {
        self.inner.stream_position()
    }

    fn reposition(&mut self, position: u64) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(position)).map(|_| ())
    }
}

/// Adapter for readers that can only be consumed once.
pub struct ForwardOnlyStream<R> {
    inner: R,
    consumed: u64,
}

impl<R> ForwardOnlyStream<R>
where
    R: Read + Send,
{
    pub fn new(inner: R) -> Self {
        Self { inner, consumed: 0 }
    }
}

impl<R: Read> Read for ForwardOnlyStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.consumed = self.consumed.saturating_add(read as u64);
        Ok(read)
    }
}

impl<R> PayloadStream for ForwardOnlyStream<R>
where
    R: Read + Send,
{
    fn is_repositionable(&self) -> bool {
        false
    }

    fn position(&mut self) -> io::Result<u64> {
        Ok(self.consumed)
    }

    fn reposition(&mut self, _position: u64) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "forward-only payload stream cannot be repositioned",
        ))
    }
}

/// SHA-256 decorator over a payload stream.
pub struct HashingStream {
    inner: Box<dyn PayloadStream>,
    hasher: Sha256,
}

impl HashingStream {
    pub fn new(inner: Box<dyn PayloadStream>) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }
}

impl Read for HashingStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.hasher.update(&buf[..read]);
        Ok(read)
    }
}

impl PayloadStream for HashingStream {
    fn is_repositionable(&self) -> bool {
        self.inner.is_repositionable()
    }

    fn position(&mut self) -> io::Result<u64> {
        self.inner.position()
    }

    fn reposition(&mut self, position: u64) -> io::Result<()> {
        self.inner.reposition(position)?;
        self.hasher = Sha256::new();
        Ok(())
    }

    fn payload_digest(&self) -> Option<String> {
        Some(encode_hex_lower(&self.hasher.clone().finalize()))
    }
}

/// A stream body together with the position it started at.
pub struct StreamBody {
    stream: Box<dyn PayloadStream>,
    original_position: u64,
    hashing: bool,
}

impl StreamBody {
    pub fn new<S>(stream: S) -> io::Result<Self>
    where
        S: PayloadStream + 'static,
    {
        Self::from_boxed(Box::new(stream))
    }

    pub fn from_boxed(mut stream: Box<dyn PayloadStream>) -> io::Result<Self> {
        let original_position = stream.position()?;
        Ok(Self {
            stream,
            original_position,
            hashing: false,
        })
    }

    pub fn original_position(&self) -> u64 {
        self.original_position
    }

    pub fn is_repositionable(&self) -> bool {
        self.stream.is_repositionable()
    }

    pub fn is_hashing(&self) -> bool {
        self.hashing
    }

    pub fn payload_digest(&self) -> Option<String> {
        self.stream.payload_digest()
    }

    /// Wraps the stream in a [`HashingStream`] unless it already is one.
    pub(crate) fn enable_hashing(&mut self) {
        if self.hashing {
            return;
        }
        let placeholder: Box<dyn PayloadStream> = Box::new(ForwardOnlyStream::new(io::empty()));
        let inner = std::mem::replace(&mut self.stream, placeholder);
        self.stream = Box::new(HashingStream::new(inner));
        self.hashing = true;
    }

    pub fn rewind(&mut self) -> io::Result<()> {
        if !self.stream.is_repositionable() {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "payload stream is not repositionable",
            ));
        }
        self.stream.reposition(self.original_position)
    }

    pub(crate) fn read_remaining(&mut self) -> io::Result<Bytes> {
        let mut collected = Vec::new();
        self.stream.read_to_end(&mut collected)?;
        Ok(Bytes::from(collected))
    }
}

impl std::fmt::Debug for StreamBody {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("StreamBody")
            .field("original_position", &self.original_position)
            .field("repositionable", &self.stream.is_repositionable())
            .field("hashing", &self.hashing)
            .finish()
    }
}

#[derive(Debug, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Bytes(Bytes),
    Stream(StreamBody),
}

impl RequestBody {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Bytes(bytes) => bytes.is_empty(),
            Self::Stream(_) => false,
        }
    }

    pub fn is_repositionable(&self) -> bool {
        match self {
            Self::Empty | Self::Bytes(_) => true,
            Self::Stream(stream) => stream.is_repositionable(),
        }
    }

    /// Resets the body for a resend. In-memory bodies need no work.
    pub fn rewind(&mut self) -> io::Result<()> {
        match self {
            Self::Empty | Self::Bytes(_) => Ok(()),
            Self::Stream(stream) => stream.rewind(),
        }
    }

    pub(crate) fn collect_bytes(&mut self) -> io::Result<Bytes> {
        match self {
            Self::Empty => Ok(Bytes::new()),
            Self::Bytes(bytes) => Ok(bytes.clone()),
            Self::Stream(stream) => stream.read_remaining(),
        }
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<StreamBody> for RequestBody {
    fn from(stream: StreamBody) -> Self {
        Self::Stream(stream)
    }
}
