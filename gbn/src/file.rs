//! File chunking
//!
//! A file travels as a sequence of chunks, each starting with a marker byte:
//! one or more `NAME` chunks carrying the file's base name, `DATA` chunks
//! carrying its content, and a single `END` chunk. Each chunk fits in one
//! frame payload, so a chunk carries at most `max_payload - 1` bytes after its
//! marker.

use crate::sink::{Completed, PayloadSink, SinkError};
use bytes::{BufMut, Bytes, BytesMut};
use gbn_protocol::{PayloadSource, PeerId};
use std::collections::{HashMap, VecDeque};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Chunk marker bytes
pub mod marker {
    pub const NAME: u8 = 0x81;
    pub const DATA: u8 = 0x99;
    pub const END: u8 = 0xBD;
    /// Filler chunk with no meaning to the receiver
    pub const NONE: u8 = 0xCD;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Data,
    Exhausted,
}

/// Reads a file as name, data and end chunks
#[derive(Debug)]
pub struct FileSource {
    name: String,
    size: u64,
    chunk_len: usize,
    names: VecDeque<Bytes>,
    reader: BufReader<File>,
    state: ReadState,
}

impl FileSource {
    /// Open `path` for sending with frames of at most `max_payload` bytes
    pub fn open(path: impl AsRef<Path>, max_payload: usize) -> io::Result<Self> {
        let path = path.as_ref();
        if max_payload < 2 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("payload size {} leaves no room for file data", max_payload),
            ));
        }
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{} has no UTF-8 file name", path.display()),
                )
            })?
            .to_string();

        let file = File::open(path)?;
        let size = file.metadata()?.len();
        let chunk_len = max_payload - 1;

        let names = name
            .as_bytes()
            .chunks(chunk_len)
            .map(|part| with_marker(marker::NAME, part))
            .collect();

        Ok(FileSource {
            name,
            size,
            chunk_len,
            names,
            reader: BufReader::new(file),
            state: ReadState::Data,
        })
    }

    /// Base name sent to the receiver
    pub fn name(&self) -> &str {
        &self.name
    }

    /// File size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Total chunks this source will produce
    pub fn chunk_count(&self) -> u64 {
        let chunk_len = self.chunk_len as u64;
        let names = (self.name.len() as u64 + chunk_len - 1) / chunk_len;
        let data = (self.size + chunk_len - 1) / chunk_len;
        names + data + 1
    }
}

fn with_marker(marker: u8, body: &[u8]) -> Bytes {
    let mut chunk = BytesMut::with_capacity(1 + body.len());
    chunk.put_u8(marker);
    chunk.put_slice(body);
    chunk.freeze()
}

impl PayloadSource for FileSource {
    fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        if let Some(name) = self.names.pop_front() {
            return Ok(Some(name));
        }
        if self.state == ReadState::Exhausted {
            return Ok(None);
        }

        let mut body = Vec::with_capacity(self.chunk_len);
        (&mut self.reader)
            .take(self.chunk_len as u64)
            .read_to_end(&mut body)?;

        if body.is_empty() {
            self.state = ReadState::Exhausted;
            Ok(Some(with_marker(marker::END, &[])))
        } else {
            Ok(Some(with_marker(marker::DATA, &body)))
        }
    }
}

/// A file being received from one source
#[derive(Debug, Default)]
struct Assembly {
    name: Vec<u8>,
    output: Option<(String, BufWriter<File>)>,
    chunks: u64,
}

/// Writes received files into a directory
#[derive(Debug)]
pub struct FileSink {
    output_dir: PathBuf,
    assemblies: HashMap<PeerId, Assembly>,
}

impl FileSink {
    /// Write into `output_dir`, creating it if needed
    pub fn new(output_dir: impl Into<PathBuf>) -> io::Result<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir)?;
        Ok(FileSink {
            output_dir,
            assemblies: HashMap::new(),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Files currently being received
    pub fn in_progress(&self) -> usize {
        self.assemblies.len()
    }

    fn create(&self, name: Vec<u8>) -> Result<(String, BufWriter<File>), SinkError> {
        let name = String::from_utf8(name)
            .map_err(|e| SinkError::InvalidName(String::from_utf8_lossy(e.as_bytes()).into()))?;
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(|c| matches!(c, '/' | '\\' | '\0'))
        {
            return Err(SinkError::InvalidName(name));
        }

        let path = self.output_dir.join(&name);
        let file = File::create(&path)?;
        info!(path = %path.display(), "receiving file");
        Ok((name, BufWriter::new(file)))
    }

    fn write(
        &mut self,
        source: PeerId,
        kind: u8,
        body: &[u8],
    ) -> Result<Option<Completed>, SinkError> {
        let pending_name = {
            let assembly = self.assemblies.entry(source).or_default();
            assembly.chunks += 1;
            if assembly.output.is_some() {
                None
            } else if kind == marker::NAME {
                assembly.name.extend_from_slice(body);
                return Ok(None);
            } else {
                Some(std::mem::take(&mut assembly.name))
            }
        };

        if let Some(name) = pending_name {
            let output = self.create(name)?;
            if let Some(assembly) = self.assemblies.get_mut(&source) {
                assembly.output = Some(output);
            }
        }

        let Some(assembly) = self.assemblies.get_mut(&source) else {
            return Ok(None);
        };
        let Some((_, writer)) = assembly.output.as_mut() else {
            return Ok(None);
        };

        match kind {
            marker::DATA => {
                writer.write_all(body)?;
                Ok(None)
            }
            marker::END => {
                writer.flush()?;
                let chunks = assembly.chunks;
                let name = assembly
                    .output
                    .take()
                    .map(|(name, _)| name)
                    .unwrap_or_default();
                self.assemblies.remove(&source);
                Ok(Some(Completed { name, chunks }))
            }
            _ => {
                debug!(peer = %source, "name chunk after file opened, ignored");
                Ok(None)
            }
        }
    }
}

impl PayloadSink for FileSink {
    fn accept(&mut self, source: PeerId, chunk: &[u8]) -> Result<Option<Completed>, SinkError> {
        let (&kind, body) = chunk.split_first().ok_or(SinkError::EmptyChunk)?;
        match kind {
            marker::NONE => Ok(None),
            marker::NAME | marker::DATA | marker::END => {
                let result = self.write(source, kind, body);
                if result.is_err() {
                    self.assemblies.remove(&source);
                }
                result
            }
            other => Err(SinkError::UnknownMarker(other)),
        }
    }

    fn reset(&mut self, source: PeerId) {
        if let Some(assembly) = self.assemblies.remove(&source) {
            if let Some((name, _)) = assembly.output {
                warn!(peer = %source, file = %name, "sender restarted, partial file abandoned");
            }
        }
    }
}
