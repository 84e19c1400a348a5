//! Where records come from and where bytes go.
//!
//! The pipeline only ever sees a [`RecordSource`] (pull one record, detect
//! end-of-stream) and a [`RecordSink`] (push opaque blocks). What backs them
//! (a file, standard input/output, an in-memory queue) is irrelevant to the
//! mediator.
//!
//! Stream-backed adapters retry transient conditions (`WouldBlock`,
//! `Interrupted`) in a yielding spin loop instead of surfacing them.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::PathBuf;

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace};

use crate::error::{AppResult, PipelineError, RecordError};
use crate::record::codec::{self, RECORD_HEADER_SIZE};
use crate::record::{FormatVersion, Record};

/// Largest record a [`StreamSource`] buffers by default (64 MiB).
pub const DEFAULT_MAX_RECORD_SIZE: usize = 64 * 1024 * 1024;

/// Supplies records one at a time.
pub trait RecordSource: Send {
    /// Block until a full record is available.
    ///
    /// Returns `Ok(None)` at end-of-stream, which is not an error.
    fn read_one(&mut self) -> AppResult<Option<Record>>;

    /// Whether end-of-stream has been observed.
    fn at_end(&self) -> bool;
}

/// Accepts serialized blocks.
pub trait RecordSink: Send {
    /// Write one block.
    fn put(&mut self, bytes: &[u8]) -> AppResult<()>;

    /// Write several buffers as one contiguous block.
    fn put_vectored(&mut self, parts: &[&[u8]]) -> AppResult<()> {
        let total = parts.iter().map(|p| p.len()).sum();
        let mut block = Vec::with_capacity(total);
        for part in parts {
            block.extend_from_slice(part);
        }
        self.put(&block)
    }

    /// Push buffered data downstream.
    fn flush(&mut self) -> AppResult<()> {
        Ok(())
    }
}

impl<T: RecordSource + ?Sized> RecordSource for Box<T> {
    fn read_one(&mut self) -> AppResult<Option<Record>> {
        (**self).read_one()
    }

    fn at_end(&self) -> bool {
        (**self).at_end()
    }
}

impl<T: RecordSink + ?Sized> RecordSink for Box<T> {
    fn put(&mut self, bytes: &[u8]) -> AppResult<()> {
        (**self).put(bytes)
    }

    fn put_vectored(&mut self, parts: &[&[u8]]) -> AppResult<()> {
        (**self).put_vectored(parts)
    }

    fn flush(&mut self) -> AppResult<()> {
        (**self).flush()
    }
}

/// Decodes length-prefixed records from any byte stream.
#[derive(Debug)]
pub struct StreamSource<R> {
    reader: R,
    version: FormatVersion,
    max_record_size: usize,
    at_end: bool,
}

impl<R: Read + Send> StreamSource<R> {
    /// Read records of `version` from `reader`.
    pub fn new(reader: R, version: FormatVersion) -> Self {
        Self {
            reader,
            version,
            max_record_size: DEFAULT_MAX_RECORD_SIZE,
            at_end: false,
        }
    }

    /// Refuse records larger than `limit` bytes.
    pub fn with_max_record_size(mut self, limit: usize) -> Self {
        self.max_record_size = limit;
        self
    }
}

impl<R: Read + Send> RecordSource for StreamSource<R> {
    fn read_one(&mut self) -> AppResult<Option<Record>> {
        if self.at_end {
            return Ok(None);
        }

        let mut size_word = [0u8; 4];
        let got = read_fully(&mut self.reader, &mut size_word)?;
        if got == 0 {
            debug!("source reached end of stream");
            self.at_end = true;
            return Ok(None);
        }
        if got < size_word.len() {
            self.at_end = true;
            return Err(RecordError::Truncated {
                declared: RECORD_HEADER_SIZE,
                available: got,
            }
            .into());
        }

        let declared = u32::from_le_bytes(size_word);
        if (declared as usize) < RECORD_HEADER_SIZE {
            return Err(RecordError::TooSmall(declared).into());
        }
        let declared = declared as usize;
        if declared > self.max_record_size {
            return Err(RecordError::TooLarge {
                declared,
                limit: self.max_record_size,
            }
            .into());
        }

        let mut buffer = BytesMut::zeroed(declared);
        buffer[..4].copy_from_slice(&size_word);
        let got = read_fully(&mut self.reader, &mut buffer[4..])?;
        if got < declared - 4 {
            self.at_end = true;
            return Err(RecordError::Truncated {
                declared,
                available: got + 4,
            }
            .into());
        }

        let record = codec::decode_owned(buffer.freeze(), self.version)?;
        trace!(kind = %record.kind(), size = declared, "record read");
        Ok(Some(record))
    }

    fn at_end(&self) -> bool {
        self.at_end
    }
}

/// Fill `buf` from `reader`, stopping early only at end-of-stream.
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if is_transient(&e) => std::thread::yield_now(),
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Writes blocks to any byte stream.
#[derive(Debug)]
pub struct StreamSink<W> {
    writer: W,
}

impl<W: Write + Send> StreamSink<W> {
    /// Write to `writer`.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Recover the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_block(&mut self, mut bytes: &[u8]) -> io::Result<()> {
        while !bytes.is_empty() {
            match self.writer.write(bytes) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
                Ok(n) => bytes = &bytes[n..],
                Err(e) if is_transient(&e) => std::thread::yield_now(),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl<W: Write + Send> RecordSink for StreamSink<W> {
    fn put(&mut self, bytes: &[u8]) -> AppResult<()> {
        self.write_block(bytes)?;
        Ok(())
    }

    fn put_vectored(&mut self, parts: &[&[u8]]) -> AppResult<()> {
        for part in parts {
            self.write_block(part)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> AppResult<()> {
        loop {
            match self.writer.flush() {
                Ok(()) => return Ok(()),
                Err(e) if is_transient(&e) => std::thread::yield_now(),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Serves records from memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    records: VecDeque<Record>,
    at_end: bool,
}

impl MemorySource {
    /// Serve `records` in order.
    pub fn new(records: impl IntoIterator<Item = Record>) -> Self {
        Self {
            records: records.into_iter().collect(),
            at_end: false,
        }
    }

    /// Decode back-to-back serialized records of `version`.
    pub fn from_bytes(bytes: &[u8], version: FormatVersion) -> Result<Self, RecordError> {
        let mut records = VecDeque::new();
        let mut rest = bytes;
        while !rest.is_empty() {
            let (record, used) = codec::decode_prefix(rest, version)?;
            records.push_back(record);
            rest = &rest[used..];
        }
        Ok(Self {
            records,
            at_end: false,
        })
    }

    /// Records not yet read.
    pub fn remaining(&self) -> usize {
        self.records.len()
    }
}

impl RecordSource for MemorySource {
    fn read_one(&mut self) -> AppResult<Option<Record>> {
        let next = self.records.pop_front();
        if next.is_none() {
            self.at_end = true;
        }
        Ok(next)
    }

    fn at_end(&self) -> bool {
        self.at_end
    }
}

/// Collects every block written to it.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    writes: Vec<Bytes>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks in the order they were written.
    pub fn writes(&self) -> &[Bytes] {
        &self.writes
    }

    /// All blocks concatenated.
    pub fn concatenated(&self) -> Vec<u8> {
        self.writes.iter().flat_map(|b| b.iter().copied()).collect()
    }

    /// Decode every block as one record of `version`.
    pub fn records(&self, version: FormatVersion) -> Result<Vec<Record>, RecordError> {
        self.writes
            .iter()
            .map(|block| Record::decode(block, version))
            .collect()
    }
}

impl RecordSink for MemorySink {
    fn put(&mut self, bytes: &[u8]) -> AppResult<()> {
        self.writes.push(Bytes::copy_from_slice(bytes));
        Ok(())
    }
}

/// Where a source or sink URI points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Standard input or output (`-`).
    Stdio,
    /// A file (`file:///path` or a bare path).
    File(PathBuf),
}

impl Endpoint {
    /// Parse a source or sink URI.
    ///
    /// Ring-buffer (`tcp://`) and other transports are not provided by this
    /// crate and are reported as configuration errors.
    pub fn parse(uri: &str) -> AppResult<Self> {
        if uri == "-" {
            return Ok(Endpoint::Stdio);
        }
        if let Some(path) = uri.strip_prefix("file://") {
            if path.is_empty() {
                return Err(PipelineError::Configuration(format!(
                    "URI '{}' names no file",
                    uri
                )));
            }
            return Ok(Endpoint::File(PathBuf::from(path)));
        }
        if let Some((scheme, _)) = uri.split_once("://") {
            return Err(PipelineError::Configuration(format!(
                "Unsupported transport '{}' in URI '{}'. Use '-' or file:///path",
                scheme, uri
            )));
        }
        if uri.is_empty() {
            return Err(PipelineError::Configuration("Empty URI".into()));
        }
        Ok(Endpoint::File(PathBuf::from(uri)))
    }
}

/// Open a record source for `uri`.
pub fn open_source(uri: &str, version: FormatVersion) -> AppResult<Box<dyn RecordSource>> {
    let source: Box<dyn RecordSource> = match Endpoint::parse(uri)? {
        Endpoint::Stdio => Box::new(StreamSource::new(BufReader::new(io::stdin()), version)),
        Endpoint::File(path) => {
            let file = File::open(&path)?;
            debug!(path = %path.display(), %version, "opened file source");
            Box::new(StreamSource::new(BufReader::new(file), version))
        }
    };
    Ok(source)
}

/// Open a sink for `uri`. Files are created or truncated.
pub fn open_sink(uri: &str) -> AppResult<Box<dyn RecordSink>> {
    let sink: Box<dyn RecordSink> = match Endpoint::parse(uri)? {
        Endpoint::Stdio => Box::new(StreamSink::new(BufWriter::new(io::stdout()))),
        Endpoint::File(path) => {
            let file = File::create(&path)?;
            debug!(path = %path.display(), "opened file sink");
            Box::new(StreamSink::new(BufWriter::new(file)))
        }
    };
    Ok(sink)
}
