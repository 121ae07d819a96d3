//! FASTA reader
//!
//! Sibling of the FASTQ backend for quality-less input. Records start with
//! a `>` header line; sequences may span multiple lines. Reads produced
//! here carry empty quality strings, which downstream quality accumulation
//! treats as a no-op.

use crate::core::SequencingRead;
use crate::io::{ReadSource, SequenceStream};
use crate::Result;
use std::path::Path;

struct FastaStream {
    stream: SequenceStream,
    /// Header of the next record, read while scanning the previous one
    pending_header: Option<Vec<u8>>,
}

impl FastaStream {
    fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            stream: SequenceStream::open(path)?,
            pending_header: None,
        })
    }

    fn next_sequence(&mut self) -> Result<Option<Vec<u8>>> {
        // Position on a header line
        if self.pending_header.is_none() {
            loop {
                match self.stream.read_line()? {
                    None => return Ok(None),
                    Some(line) if line.first() == Some(&b'>') => {
                        self.pending_header = Some(line);
                        break;
                    }
                    // Leading junk before the first header is skipped
                    Some(_) => continue,
                }
            }
        }

        self.pending_header = None;
        let mut sequence = Vec::new();
        loop {
            match self.stream.read_line()? {
                None => break,
                Some(line) if line.first() == Some(&b'>') => {
                    self.pending_header = Some(line);
                    break;
                }
                Some(line) => sequence.extend_from_slice(&line),
            }
        }

        Ok(Some(sequence))
    }
}

pub struct FastaReader {
    forward: FastaStream,
    reverse: Option<FastaStream>,
}

impl FastaReader {
    pub fn open(forward: &Path, reverse: Option<&Path>) -> Result<Self> {
        Ok(Self {
            forward: FastaStream::open(forward)?,
            reverse: reverse.map(|path| FastaStream::open(path)).transpose()?,
        })
    }
}

impl ReadSource for FastaReader {
    fn next_read(&mut self) -> Result<Option<SequencingRead>> {
        let Some(forward_sequence) = self.forward.next_sequence()? else {
            return Ok(None);
        };

        let mut read = SequencingRead {
            forward_sequence,
            forward_quality: Vec::new(),
            ..Default::default()
        };

        if let Some(reverse) = self.reverse.as_mut() {
            let Some(reverse_sequence) = reverse.next_sequence()? else {
                return Ok(None);
            };
            read.reverse_sequence = Some(reverse_sequence);
            read.reverse_quality = Some(Vec::new());
        }

        Ok(Some(read))
    }
}
