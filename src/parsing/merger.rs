//! Paired-end read merging
//!
//! Builds a consensus contig from a forward/reverse read pair. The reverse
//! read is reverse-complemented (and its quality string reversed), then
//! overlap lengths are tried from the longest possible down to the
//! configured minimum. The first overlap whose mismatch count stays within
//! the tolerance is accepted and the contig is the consensus of the
//! overlapped region only.
//!
//! Consensus rules per overlap column: the higher-quality base wins; when
//! the bases agree the qualities are summed, when they disagree the loser
//! is subtracted from the winner. Either way the result is capped at the
//! configured maximum score.

use crate::core::reverse_complement;
use tracing::trace;

/// Phred+33 offset of FASTQ quality strings
const PHRED_OFFSET: u8 = 33;

/// Result of a successful merge: consensus sequence and quality of the
/// overlapped region, both of the same length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedContig {
    pub sequence: Vec<u8>,
    pub quality: Vec<u8>,
}

/// Mismatch-only merger for paired-end reads.
#[derive(Debug, Clone)]
pub struct PairedEndMerger {
    min_overlap: usize,
    max_mutations: u32,
    max_score_value: u8,
}

impl PairedEndMerger {
    pub fn new(min_overlap: usize, max_mutations: u32, max_score_value: u8) -> Self {
        Self {
            min_overlap: min_overlap.max(1),
            max_mutations,
            max_score_value,
        }
    }

    /// Attempts to merge a read pair into an overlap consensus.
    ///
    /// `reverse_sequence` and `reverse_quality` are taken as read from the
    /// sequencer; the reverse complement is computed here. Returns `None`
    /// when no overlap of at least `min_overlap` bases satisfies the
    /// mismatch tolerance.
    pub fn merge(
        &self,
        forward_sequence: &[u8],
        forward_quality: &[u8],
        reverse_sequence: &[u8],
        reverse_quality: &[u8],
    ) -> Option<MergedContig> {
        if forward_sequence.len() != forward_quality.len()
            || reverse_sequence.len() != reverse_quality.len()
        {
            trace!("sequence/quality length mismatch, rejecting pair");
            return None;
        }

        let transcribed = reverse_complement(reverse_sequence);
        let mut transcribed_quality = reverse_quality.to_vec();
        transcribed_quality.reverse();

        let max_overlap = forward_sequence.len().min(transcribed.len());
        if max_overlap < self.min_overlap {
            return None;
        }

        // The forward 3' end overlaps the transcribed reverse 5' end; try
        // the longest overlap first
        for overlap in (self.min_overlap..=max_overlap).rev() {
            let forward_offset = forward_sequence.len() - overlap;
            let mismatches = forward_sequence[forward_offset..]
                .iter()
                .zip(&transcribed[..overlap])
                .filter(|(a, b)| a != b)
                .count() as u32;

            if mismatches <= self.max_mutations {
                return Some(self.consensus(
                    &forward_sequence[forward_offset..],
                    &forward_quality[forward_offset..],
                    &transcribed[..overlap],
                    &transcribed_quality[..overlap],
                ));
            }
        }

        None
    }

    /// Builds the per-column consensus of two aligned overlap slices.
    fn consensus(
        &self,
        forward: &[u8],
        forward_quality: &[u8],
        reverse: &[u8],
        reverse_quality: &[u8],
    ) -> MergedContig {
        let mut sequence = Vec::with_capacity(forward.len());
        let mut quality = Vec::with_capacity(forward.len());

        for column in 0..forward.len() {
            let forward_score = forward_quality[column].saturating_sub(PHRED_OFFSET);
            let reverse_score = reverse_quality[column].saturating_sub(PHRED_OFFSET);

            let (winner_base, merged_score) = if forward[column] == reverse[column] {
                (
                    forward[column],
                    forward_score.saturating_add(reverse_score),
                )
            } else if forward_score >= reverse_score {
                (forward[column], forward_score - reverse_score)
            } else {
                (reverse[column], reverse_score - forward_score)
            };

            sequence.push(winner_base);
            quality.push(PHRED_OFFSET + merged_score.min(self.max_score_value));
        }

        MergedContig { sequence, quality }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merger() -> PairedEndMerger {
        PairedEndMerger::new(4, 0, 40)
    }

    #[test]
    fn test_identical_full_overlap() {
        // reverse read is the reverse complement of the forward read, so
        // the transcribed reverse equals the forward read exactly
        let forward = b"ACGTAC";
        let reverse = b"GTACGT";
        let contig = merger()
            .merge(forward, b"IIIIII", reverse, b"IIIIII")
            .expect("identical pair must merge");
        assert_eq!(contig.sequence, b"ACGTAC");
        assert_eq!(contig.sequence.len(), contig.quality.len());
    }

    #[test]
    fn test_consensus_quality_is_capped() {
        let forward = b"ACGTAC";
        let reverse = b"GTACGT";
        // I = Q40; agreement sums to 80 which must cap at 40
        let contig = merger()
            .merge(forward, b"IIIIII", reverse, b"IIIIII")
            .unwrap();
        assert!(contig.quality.iter().all(|&q| q - 33 == 40));
    }

    #[test]
    fn test_higher_quality_base_wins() {
        // Transcribed reverse disagrees with the forward read at column 0:
        // forward has A at Q20 ('5'), reverse complement has G at Q30 ('?')
        let merger = PairedEndMerger::new(4, 1, 40);
        let forward = b"ACGT";
        // rc of "ACGC" is "GCGT", disagreeing at the first column
        let reverse = b"ACGC";
        let contig = merger
            .merge(forward, b"5III", reverse, b"III?")
            .expect("single mismatch within tolerance");
        assert_eq!(contig.sequence[0], b'G');
        // Sum-subtraction: |30 - 20| = 10
        assert_eq!(contig.quality[0] - 33, 10);
    }

    #[test]
    fn test_mismatch_tolerance_exceeded() {
        let merger = PairedEndMerger::new(4, 0, 40);
        let forward = b"ACGT";
        let reverse = b"ACGC"; // transcribes to GCGT, one mismatch
        assert!(merger.merge(forward, b"IIII", reverse, b"IIII").is_none());
    }

    #[test]
    fn test_partial_overlap() {
        // forward: ACGTACGT, transcribed reverse: ACGTTTTT shifted so that
        // only the last four forward bases align with the first four
        // transcribed bases
        let forward = b"TTTTACGT";
        // rc of "AAAAACGT" = "ACGTTTTT"; overlap of 4 matches forward tail
        let reverse = b"AAAAACGT";
        let contig = merger()
            .merge(forward, b"IIIIIIII", reverse, b"IIIIIIII")
            .expect("four-base overlap must merge");
        assert_eq!(contig.sequence, b"ACGT");
    }

    #[test]
    fn test_reads_shorter_than_min_overlap() {
        assert!(merger().merge(b"ACG", b"III", b"CGT", b"III").is_none());
    }

    #[test]
    fn test_length_mismatch_rejected() {
        assert!(merger().merge(b"ACGT", b"III", b"ACGT", b"IIII").is_none());
    }
}
