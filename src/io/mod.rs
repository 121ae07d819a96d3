//! Sequencing file readers
//!
//! A reader is constructed from a forward path and an optional reverse
//! path and yields read records until exhaustion. Compression is sniffed
//! from the stream content, not the file name: gzip decoding is attempted
//! first and plain bytes are the fallback.

pub mod fasta;
pub mod fastq;

use crate::core::{ReaderType, SequencingRead};
use crate::Result;
use anyhow::Context;
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::info;

pub use fasta::FastaReader;
pub use fastq::FastqReader;

/// Lazy source of sequencing reads. Streams are released when the source
/// is dropped.
pub trait ReadSource: Send {
    /// Next record, or `None` once the input is exhausted
    fn next_read(&mut self) -> Result<Option<SequencingRead>>;
}

/// Opens the reader backend selected by the configuration.
pub fn open_read_source(
    backend: ReaderType,
    forward: &Path,
    reverse: Option<&Path>,
) -> Result<Box<dyn ReadSource>> {
    match backend {
        ReaderType::Fastq => Ok(Box::new(FastqReader::open(forward, reverse)?)),
        ReaderType::Fasta => Ok(Box::new(FastaReader::open(forward, reverse)?)),
    }
}

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// A line-oriented text stream over a possibly gzip-compressed file.
pub(crate) enum SequenceStream {
    Plain(BufReader<File>),
    Gzipped(BufReader<MultiGzDecoder<File>>),
}

impl SequenceStream {
    /// Opens a file, sniffing the gzip magic bytes to pick the decoder.
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)
            .with_context(|| format!("could not open sequencing file {}", path.display()))?;

        let mut magic = [0u8; 2];
        let sniffed = file.read(&mut magic).unwrap_or(0);
        file.seek(SeekFrom::Start(0))
            .with_context(|| format!("could not rewind {}", path.display()))?;

        if sniffed == 2 && magic == GZIP_MAGIC {
            info!(path = %path.display(), "opened gzip-compressed sequencing file");
            Ok(SequenceStream::Gzipped(BufReader::new(MultiGzDecoder::new(
                file,
            ))))
        } else {
            info!(path = %path.display(), "opened plain-text sequencing file");
            Ok(SequenceStream::Plain(BufReader::new(file)))
        }
    }

    /// Reads one line without its terminator. `None` at end of stream.
    pub(crate) fn read_line(&mut self) -> Result<Option<Vec<u8>>> {
        let mut line = Vec::new();
        let bytes = match self {
            SequenceStream::Plain(reader) => reader.read_until(b'\n', &mut line)?,
            SequenceStream::Gzipped(reader) => reader.read_until(b'\n', &mut line)?,
        };
        if bytes == 0 {
            return Ok(None);
        }
        while line.last().is_some_and(|&b| b == b'\n' || b == b'\r') {
            line.pop();
        }
        Ok(Some(line))
    }
}
