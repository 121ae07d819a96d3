//! FASTQ reader
//!
//! Four lines per record: `@header`, sequence, `+` separator, Phred+33
//! quality. Paired-end input uses two parallel files advanced in lockstep;
//! the pairing is positional.

use crate::core::SequencingRead;
use crate::io::{ReadSource, SequenceStream};
use crate::Result;
use anyhow::bail;
use std::path::Path;

pub struct FastqReader {
    forward: SequenceStream,
    reverse: Option<SequenceStream>,
}

impl FastqReader {
    pub fn open(forward: &Path, reverse: Option<&Path>) -> Result<Self> {
        Ok(Self {
            forward: SequenceStream::open(forward)?,
            reverse: reverse.map(SequenceStream::open).transpose()?,
        })
    }

    /// Reads one 4-line record from a stream. `None` when the stream is
    /// exhausted at a record boundary.
    fn next_record(stream: &mut SequenceStream) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let Some(_header) = stream.read_line()? else {
            return Ok(None);
        };
        let Some(sequence) = stream.read_line()? else {
            bail!("truncated FASTQ record: missing sequence line");
        };
        let Some(_separator) = stream.read_line()? else {
            bail!("truncated FASTQ record: missing separator line");
        };
        let Some(quality) = stream.read_line()? else {
            bail!("truncated FASTQ record: missing quality line");
        };
        Ok(Some((sequence, quality)))
    }
}

impl ReadSource for FastqReader {
    fn next_read(&mut self) -> Result<Option<SequencingRead>> {
        let Some((forward_sequence, forward_quality)) = Self::next_record(&mut self.forward)?
        else {
            return Ok(None);
        };

        let mut read = SequencingRead {
            forward_sequence,
            forward_quality,
            ..Default::default()
        };

        if let Some(reverse) = self.reverse.as_mut() {
            // Lockstep pairing; a shorter reverse file ends the iteration
            let Some((reverse_sequence, reverse_quality)) = Self::next_record(reverse)? else {
                return Ok(None);
            };
            read.reverse_sequence = Some(reverse_sequence);
            read.reverse_quality = Some(reverse_quality);
        }

        Ok(Some(read))
    }
}
