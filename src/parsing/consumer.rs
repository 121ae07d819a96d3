//! Consumer half of the parsing pipeline
//!
//! Each consumer thread takes reads off the shared queue, assembles a
//! contig, anchors the primers, demultiplexes by barcode when required and
//! registers the extracted randomized region with its selection cycle.
//!
//! Three processing modes:
//! - batch mode: the contig already is the randomized region
//! - randomized-region-only: primers are prepended/appended synthetically
//! - full parsing: primers and barcodes are located by approximate match
//!
//! Per-read problems are counted and the read is dropped; they never stop
//! the pipeline. A consumer that observes the poison pill re-enqueues it
//! for its siblings and terminates.

use crate::core::{
    is_valid_sequence, reverse_complement, QueueItem, SequencingRead,
};
use crate::experiment::{Experiment, Metadata, SelectionCycle};
use crate::parsing::distance::{
    count_mismatches, BitapDistance, Distance, EditDistance, MatchResult, BITAP_MAX_PATTERN_LEN,
};
use crate::parsing::merger::PairedEndMerger;
use crate::parsing::progress::{ParserProgress, ReadFailure};
use crate::utils::configuration::ExperimentConfiguration;
use crate::Result;
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Phred+33 offset of FASTQ quality strings
const PHRED_OFFSET: u8 = 33;

pub struct Consumer {
    receiver: Receiver<QueueItem>,
    sender: Sender<QueueItem>,
    progress: Arc<ParserProgress>,
    metadata: Arc<Metadata>,
    cycles: Vec<Option<Arc<SelectionCycle>>>,

    // Mode flags
    batch_mode: bool,
    is_per_file: bool,
    only_randomized_region_in_data: bool,
    store_reverse_complement: bool,
    check_reverse_complement: bool,

    // Primers and barcodes
    primer5: Vec<u8>,
    /// 5' primer reversed, matched against the reversed contig so the hit
    /// anchors near the 3' end
    primer5_reversed: Vec<u8>,
    primer3: Vec<u8>,
    barcodes5: Vec<Vec<u8>>,
    barcodes3: Vec<Vec<u8>>,

    // Randomized region size constraints; the exact bound wins when set
    exact_size: Option<usize>,
    lower_bound: Option<usize>,
    upper_bound: Option<usize>,

    // Matching
    bitap: BitapDistance,
    edit: EditDistance,
    primer_tolerance: u32,
    barcode_tolerance: u32,

    merger: PairedEndMerger,
}

impl Consumer {
    pub fn new(
        configuration: &ExperimentConfiguration,
        experiment: &Experiment,
        receiver: Receiver<QueueItem>,
        sender: Sender<QueueItem>,
        progress: Arc<ParserProgress>,
    ) -> Self {
        let parser = &configuration.parser;

        let primer5 = configuration.experiment.primer5.as_bytes().to_vec();
        let mut primer5_reversed = primer5.clone();
        primer5_reversed.reverse();

        // Batch mode has no primers in the data at all
        let primer3 = if parser.batch_mode {
            Vec::new()
        } else {
            configuration.experiment.primer3.as_bytes().to_vec()
        };

        Self {
            receiver,
            sender,
            progress,
            metadata: Arc::clone(experiment.metadata()),
            cycles: experiment.cycles().to_vec(),
            batch_mode: parser.batch_mode,
            is_per_file: parser.is_per_file,
            only_randomized_region_in_data: parser.only_randomized_region_in_data,
            store_reverse_complement: parser.store_reverse_complement,
            check_reverse_complement: parser.check_reverse_complement,
            primer5,
            primer5_reversed,
            primer3,
            barcodes5: configuration.barcodes5(),
            barcodes3: configuration.barcodes3(),
            exact_size: configuration.experiment.randomized_region_size,
            lower_bound: parser.randomized_region_size_lower_bound,
            upper_bound: parser.randomized_region_size_upper_bound,
            bitap: BitapDistance,
            edit: EditDistance,
            primer_tolerance: parser.primer_tolerance,
            barcode_tolerance: parser.barcode_tolerance,
            merger: PairedEndMerger::new(
                parser.paired_end_min_overlap,
                parser.paired_end_max_mutations,
                parser.paired_end_max_score_value,
            ),
        }
    }

    /// Consumes queue items until the poison pill arrives. One bad record
    /// never kills the pipeline: unexpected per-read errors are logged with
    /// their source context and swallowed.
    pub fn run(&self) {
        debug!("consumer thread started");
        loop {
            match self.receiver.recv() {
                Ok(QueueItem::EndOfStream) => {
                    // Pass the pill on so sibling consumers terminate too
                    let _ = self.sender.send(QueueItem::EndOfStream);
                    debug!("observed end of stream, terminating consumer");
                    return;
                }
                Ok(QueueItem::Read(read)) => {
                    self.progress.record_processed();
                    if let Err(problem) = self.process(&read) {
                        error!(
                            source = ?read.source_forward,
                            %problem,
                            "unexpected error while processing read, skipping"
                        );
                    }
                }
                Err(_) => {
                    warn!("parsing queue disconnected before end of stream");
                    return;
                }
            }
        }
    }

    /// Full handling of one dequeued read.
    pub(crate) fn process(&self, read: &SequencingRead) -> Result<()> {
        // Contig assembly: merge paired reads, or take the forward bytes
        let contig = match (&read.reverse_sequence, &read.reverse_quality) {
            (Some(reverse_sequence), Some(reverse_quality)) => {
                match self.merger.merge(
                    &read.forward_sequence,
                    &read.forward_quality,
                    reverse_sequence,
                    reverse_quality,
                ) {
                    Some(merged) => merged.sequence,
                    None => {
                        self.progress.record_failure(ReadFailure::ContigAssembly);
                        return Ok(());
                    }
                }
            }
            _ => read.forward_sequence.clone(),
        };

        // Alphabet gate: anything outside ACGT is rejected here
        if !is_valid_sequence(&contig) {
            self.progress.record_failure(ReadFailure::InvalidAlphabet);
            return Ok(());
        }

        if self.batch_mode {
            self.process_batch(read, contig);
        } else if self.only_randomized_region_in_data {
            self.process_randomized_region_only(read, contig);
        } else {
            self.process_full(read, contig);
        }

        Ok(())
    }

    /// Batch mode: the contig is the randomized region itself; only its
    /// length is validated.
    fn process_batch(&self, read: &SequencingRead, contig: Vec<u8>) {
        let Some(cycle) = self.cycle_for(read) else {
            self.progress.record_failure(ReadFailure::InvalidCycle);
            return;
        };

        if !self.region_size_acceptable(contig.len()) {
            self.progress.record_failure(ReadFailure::ContigAssembly);
            return;
        }

        let stored = if self.store_reverse_complement {
            reverse_complement(&contig)
        } else {
            contig
        };

        cycle.add(&stored, 0, stored.len());
        self.add_accepted_distribution(&cycle, &stored, 0, stored.len());
        self.add_nucleotide_distributions(&cycle, read);
        self.add_quality_scores(&cycle, read);
        self.progress.record_accepted();
    }

    /// Randomized-region-only mode: the primers were never sequenced, so
    /// they are added synthetically around the contig.
    fn process_randomized_region_only(&self, read: &SequencingRead, contig: Vec<u8>) {
        let Some(cycle) = self.cycle_for(read) else {
            self.progress.record_failure(ReadFailure::InvalidCycle);
            return;
        };

        let region_length = contig.len();
        let mut flanked =
            Vec::with_capacity(self.primer5.len() + region_length + self.primer3.len());
        flanked.extend_from_slice(&self.primer5);
        flanked.extend_from_slice(&contig);
        flanked.extend_from_slice(&self.primer3);

        let mut rr_start = self.primer5.len();
        let mut rr_end = self.primer5.len() + region_length;

        if self.store_reverse_complement {
            flanked = reverse_complement(&flanked);
            rr_start = flanked.len() - (self.primer5.len() + region_length);
            rr_end = flanked.len() - self.primer5.len();
        }

        cycle.add(&flanked, rr_start, rr_end);
        self.add_accepted_distribution(&cycle, &flanked, rr_start, rr_end);
        self.add_nucleotide_distributions(&cycle, read);
        self.add_quality_scores(&cycle, read);
        self.progress.record_accepted();
    }

    /// Full mode with an optional second attempt on the reverse complement.
    /// The retry retracts the first attempt's counter so that at most one
    /// error is attributed per read.
    fn process_full(&self, read: &SequencingRead, contig: Vec<u8>) {
        if let Err(failure) = self.attempt_full(read, &contig) {
            if self.check_reverse_complement {
                let complemented = reverse_complement(&contig);
                let retry = self.attempt_full(read, &complemented);
                self.progress.retract_failure(failure);
                if retry.is_err() {
                    debug!("read failed on both orientations");
                }
            }
        }
    }

    /// One full-mode parsing attempt over a fixed contig orientation.
    /// Failures are recorded before returning.
    fn attempt_full(&self, read: &SequencingRead, contig: &[u8]) -> std::result::Result<(), ReadFailure> {
        // The 5' primer is anchored near the 3' end: search the reversed
        // contig with the reversed primer and map the hit back
        let mut contig_reversed = contig.to_vec();
        contig_reversed.reverse();

        let primer5_match = self
            .match_primer(&contig_reversed, &self.primer5_reversed)
            .map(|hit| MatchResult {
                index: contig.len() - hit.index - self.primer5.len(),
                errors: hit.errors,
            });
        let Some(primer5_match) = primer5_match else {
            return Err(self.fail(ReadFailure::Unmatched5Prime));
        };

        // The 3' primer lies downstream of the 5' match; a hit that still
        // lands inside the 5' primer region is caught by the overlap check
        let mut primer3_match = None;
        if !self.primer3.is_empty() {
            primer3_match =
                self.match_primer_in(contig, &self.primer3, primer5_match.index, contig.len());
            if primer3_match.is_none() {
                return Err(self.fail(ReadFailure::Unmatched3Prime));
            }
        }

        // Resolve the selection cycle: file position in per-file mode,
        // barcodes otherwise
        let cycle_index = if self.is_per_file {
            read.cycle_index
        } else {
            self.match_barcodes(contig, &primer5_match, primer3_match.as_ref())
        };
        let cycle = cycle_index.and_then(|index| self.cycles.get(index).cloned().flatten());
        let Some(cycle) = cycle else {
            return Err(self.fail(ReadFailure::InvalidCycle));
        };

        if let Some(primer3_hit) = &primer3_match {
            if intervals_overlap(
                primer5_match.index,
                self.primer5.len(),
                primer3_hit.index,
                self.primer3.len(),
            ) {
                return Err(self.fail(ReadFailure::PrimerOverlap));
            }
        }

        // Randomized region boundaries
        let rr_start = primer5_match.index + self.primer5.len();
        let rr_end = match &primer3_match {
            Some(primer3_hit) => primer3_hit.index,
            // Validated at configuration time: no 3' primer implies an
            // exact region size
            None => rr_start + self.exact_size.unwrap_or(0),
        };

        if !self.extraction_valid(contig, rr_start, rr_end) {
            // The 5' anchor cannot undershoot by construction, so a failed
            // extraction is attributed to the 3' boundary
            return Err(self.fail(ReadFailure::Unmatched3Prime));
        }

        // Copy the primer-flanked subrange and register it
        let extracted = contig[rr_start - self.primer5.len()..rr_end + self.primer3.len()].to_vec();

        if self.store_reverse_complement {
            let stored = reverse_complement(&extracted);
            let start = stored.len() - (self.primer5.len() + (rr_end - rr_start));
            let end = stored.len() - self.primer5.len();
            cycle.add(&stored, start, end);
            self.add_accepted_distribution(&cycle, &stored, start, end);
        } else {
            cycle.add(
                &extracted,
                self.primer5.len(),
                self.primer5.len() + (rr_end - rr_start),
            );
            self.add_accepted_distribution(&cycle, contig, rr_start, rr_end);
        }

        self.add_nucleotide_distributions(&cycle, read);
        self.add_quality_scores(&cycle, read);
        self.progress.record_accepted();
        Ok(())
    }

    fn fail(&self, failure: ReadFailure) -> ReadFailure {
        self.progress.record_failure(failure);
        failure
    }

    /// Approximate primer search over the whole haystack.
    fn match_primer(&self, haystack: &[u8], primer: &[u8]) -> Option<MatchResult> {
        self.match_primer_in(haystack, primer, 0, haystack.len())
    }

    /// Approximate primer search in a window, with the refinement pass for
    /// bit-parallel hits.
    fn match_primer_in(
        &self,
        haystack: &[u8],
        primer: &[u8],
        start: usize,
        end: usize,
    ) -> Option<MatchResult> {
        if primer.len() > BITAP_MAX_PATTERN_LEN {
            return self
                .edit
                .index_of(haystack, primer, self.primer_tolerance, start, end);
        }

        let best = self
            .bitap
            .index_of(haystack, primer, self.primer_tolerance, start, end)?;
        if best.errors == 0 {
            return Some(best);
        }
        self.refine_primer_match(haystack, primer, best)
    }

    /// Re-counts aligned mismatches at the reported start and probes its
    /// left neighbourhood. A kernel hit that bridged skipped characters
    /// ends right of the aligned window, so the aligned start can only lie
    /// to the left; the probe is deliberately one-sided, coupled with the
    /// reversed-search convention for the 5' primer.
    fn refine_primer_match(
        &self,
        haystack: &[u8],
        primer: &[u8],
        initial: MatchResult,
    ) -> Option<MatchResult> {
        let mismatches = count_mismatches(haystack, primer, initial.index as isize);
        if initial.errors == mismatches {
            return Some(initial);
        }

        let mut best_mismatches = mismatches;
        let mut best_index = initial.index as isize;

        for offset in 1..self.primer_tolerance as isize {
            let candidate = initial.index as isize - offset;
            let current = count_mismatches(haystack, primer, candidate);
            if current < best_mismatches {
                best_mismatches = current;
                best_index = candidate;
            }
        }

        if best_mismatches <= self.primer_tolerance && best_index >= 0 {
            Some(MatchResult {
                index: best_index as usize,
                errors: best_mismatches,
            })
        } else {
            None
        }
    }

    /// Picks the selection cycle by barcode. 5' barcodes are searched left
    /// of the 5' primer, 3' barcodes right of the 3' primer. The winning
    /// index must be strictly best: an equally close second barcode means
    /// the read does not demultiplex.
    fn match_barcodes(
        &self,
        contig: &[u8],
        primer5_match: &MatchResult,
        primer3_match: Option<&MatchResult>,
    ) -> Option<usize> {
        let index5 = self.best_barcode(&self.barcodes5, contig, 0, primer5_match.index);

        let index3 = match (self.barcodes3.is_empty(), primer3_match) {
            (false, Some(primer3_hit)) => self.best_barcode(
                &self.barcodes3,
                contig,
                primer3_hit.index + self.primer3.len(),
                contig.len(),
            ),
            _ => None,
        };

        match (self.barcodes5.is_empty(), self.barcodes3.is_empty()) {
            // Both sides configured: both must agree on the same cycle
            (false, false) => match (index5, index3) {
                (Some(five), Some(three)) if five == three => Some(five),
                _ => None,
            },
            (false, true) => index5,
            (true, false) => index3,
            (true, true) => None,
        }
    }

    /// Strictly best-scoring barcode index within the tolerance, or `None`
    /// when no barcode matches or the best score is tied.
    fn best_barcode(
        &self,
        barcodes: &[Vec<u8>],
        contig: &[u8],
        start: usize,
        end: usize,
    ) -> Option<usize> {
        let mut best: Option<(usize, u32)> = None;
        let mut tied = false;

        for (index, barcode) in barcodes.iter().enumerate() {
            let Some(hit) = self
                .bitap
                .index_of(contig, barcode, self.barcode_tolerance, start, end)
            else {
                continue;
            };
            match best {
                None => {
                    best = Some((index, hit.errors));
                    tied = false;
                }
                Some((_, best_errors)) if hit.errors < best_errors => {
                    best = Some((index, hit.errors));
                    tied = false;
                }
                Some((_, best_errors)) if hit.errors == best_errors => {
                    tied = true;
                }
                _ => {}
            }
        }

        if tied {
            None
        } else {
            best.map(|(index, _)| index)
        }
    }

    fn region_size_acceptable(&self, length: usize) -> bool {
        if let Some(exact) = self.exact_size {
            return length == exact;
        }
        if let (Some(lower), Some(upper)) = (self.lower_bound, self.upper_bound) {
            return lower <= length && length <= upper;
        }
        true
    }

    fn extraction_valid(&self, contig: &[u8], rr_start: usize, rr_end: usize) -> bool {
        if rr_start >= rr_end || rr_end > contig.len() {
            return false;
        }
        // The flanking primers must fit inside the contig
        if rr_start < self.primer5.len() || rr_end + self.primer3.len() > contig.len() {
            return false;
        }
        self.region_size_acceptable(rr_end - rr_start)
    }

    fn cycle_for(&self, read: &SequencingRead) -> Option<Arc<SelectionCycle>> {
        read.cycle_index
            .and_then(|index| self.cycles.get(index).cloned().flatten())
    }

    /// Folds the bases of the accepted randomized region into the
    /// length-keyed accepted distribution.
    fn add_accepted_distribution(
        &self,
        cycle: &SelectionCycle,
        sequence: &[u8],
        rr_start: usize,
        rr_end: usize,
    ) {
        let region_length = rr_end - rr_start;
        for (position, &base) in sequence[rr_start..rr_end].iter().enumerate() {
            self.metadata
                .add_accepted_nucleotide(cycle.name(), region_length, position, base);
        }
    }

    /// Per-position nucleotide counts of the read as it came off the
    /// sequencer, forward and reverse lanes separately.
    fn add_nucleotide_distributions(&self, cycle: &SelectionCycle, read: &SequencingRead) {
        for (position, &base) in read.forward_sequence.iter().enumerate() {
            self.metadata
                .add_forward_nucleotide(cycle.name(), position, base);
        }
        if let Some(reverse_sequence) = &read.reverse_sequence {
            for (position, &base) in reverse_sequence.iter().enumerate() {
                self.metadata
                    .add_reverse_nucleotide(cycle.name(), position, base);
            }
        }
    }

    /// Per-position Phred-adjusted quality scores, forward and reverse
    /// lanes separately.
    fn add_quality_scores(&self, cycle: &SelectionCycle, read: &SequencingRead) {
        for (position, &quality) in read.forward_quality.iter().enumerate() {
            self.metadata.add_forward_quality(
                cycle.name(),
                position,
                quality.saturating_sub(PHRED_OFFSET) as u64,
            );
        }
        if let Some(reverse_quality) = &read.reverse_quality {
            for (position, &quality) in reverse_quality.iter().enumerate() {
                self.metadata.add_reverse_quality(
                    cycle.name(),
                    position,
                    quality.saturating_sub(PHRED_OFFSET) as u64,
                );
            }
        }
    }
}

/// Closed-interval overlap of two matched regions on the contig.
fn intervals_overlap(start_a: usize, len_a: usize, start_b: usize, len_b: usize) -> bool {
    if len_a == 0 || len_b == 0 {
        return false;
    }
    let end_a = start_a + len_a - 1;
    let end_b = start_b + len_b - 1;
    start_a <= end_b && start_b <= end_a
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::configuration::{ExperimentConfiguration, SelectionCycleSection};
    use crossbeam_channel::bounded;
    use std::path::PathBuf;

    fn base_configuration() -> ExperimentConfiguration {
        let mut configuration = ExperimentConfiguration::default();
        configuration.experiment.name = "test".into();
        configuration.experiment.primer5 = "AC".into();
        configuration.experiment.primer3 = "GT".into();
        configuration.experiment.randomized_region_size = Some(2);
        configuration.cycles = vec![SelectionCycleSection {
            name: "round0".into(),
            round: 0,
            ..Default::default()
        }];
        configuration.parser.forward_files = vec![PathBuf::from("forward.fastq")];
        configuration.parser.primer_tolerance = 1;
        configuration
    }

    struct Harness {
        consumer: Consumer,
        experiment: Experiment,
        progress: Arc<ParserProgress>,
    }

    fn harness(configuration: &ExperimentConfiguration) -> Harness {
        configuration.validate().expect("test configuration valid");
        let experiment = Experiment::from_configuration(configuration).unwrap();
        let progress = Arc::new(ParserProgress::new());
        let (sender, receiver) = bounded(4);
        let consumer = Consumer::new(
            configuration,
            &experiment,
            receiver,
            sender,
            Arc::clone(&progress),
        );
        Harness {
            consumer,
            experiment,
            progress,
        }
    }

    fn single_end_read(sequence: &[u8], cycle_index: Option<usize>) -> SequencingRead {
        SequencingRead {
            forward_sequence: sequence.to_vec(),
            forward_quality: vec![b'I'; sequence.len()],
            cycle_index,
            ..Default::default()
        }
    }

    #[test]
    fn test_full_mode_extraction() {
        let harness = harness(&base_configuration());
        harness
            .consumer
            .process(&single_end_read(b"ACAAGT", Some(0)))
            .unwrap();

        assert_eq!(harness.progress.accepted_reads(), 1);
        let pool = harness.experiment.pool();
        assert_eq!(pool.len(), 1);
        let id = pool.id_for(b"ACAAGT").expect("flanked sequence stored");
        let bounds = pool.bounds_for(id).unwrap();
        assert_eq!((bounds.start, bounds.end), (2, 4));
        let cycle = harness.experiment.cycle(0).unwrap();
        assert_eq!(cycle.cardinality_of_id(id), 1);
        assert_eq!(cycle.size(), 1);
        assert_eq!(cycle.unique_size(), 1);
    }

    #[test]
    fn test_invalid_alphabet_is_counted() {
        let harness = harness(&base_configuration());
        harness
            .consumer
            .process(&single_end_read(b"ACNNGT", Some(0)))
            .unwrap();

        assert_eq!(harness.progress.accepted_reads(), 0);
        assert_eq!(harness.progress.snapshot().invalid_alphabet, 1);
        assert_eq!(harness.experiment.pool().len(), 0);
    }

    #[test]
    fn test_unmatched_primer5_is_counted() {
        let harness = harness(&base_configuration());
        // No window of "GGGGGGGG" comes within one mismatch of primer "AC"
        harness
            .consumer
            .process(&single_end_read(b"GGGGGGGG", Some(0)))
            .unwrap();
        assert_eq!(harness.progress.accepted_reads(), 0);
        assert_eq!(harness.progress.snapshot().unmatchable_primer5, 1);
    }

    #[test]
    fn test_primer_tolerance_boundary() {
        let mut configuration = base_configuration();
        configuration.experiment.primer5 = "ACGT".into();
        configuration.experiment.primer3 = "TTTT".into();
        configuration.experiment.randomized_region_size = Some(4);
        configuration.parser.primer_tolerance = 1;
        let harness = harness(&configuration);

        // One mutation in the 5' primer stays within tolerance
        harness
            .consumer
            .process(&single_end_read(b"GCGTAAAATTTT", Some(0)))
            .unwrap();
        assert_eq!(harness.progress.accepted_reads(), 1);

        // One mismatch in the 3' primer is accepted as well
        harness
            .consumer
            .process(&single_end_read(b"ACGTAAAATATT", Some(0)))
            .unwrap();
        assert_eq!(harness.progress.accepted_reads(), 2);

        // Two mismatches in the 3' primer exceed the tolerance
        harness
            .consumer
            .process(&single_end_read(b"ACGTAAAATAAT", Some(0)))
            .unwrap();
        assert_eq!(harness.progress.accepted_reads(), 2);
        assert_eq!(harness.progress.snapshot().unmatchable_primer3, 1);
    }

    #[test]
    fn test_batch_mode_counts_region_directly() {
        let mut configuration = base_configuration();
        configuration.experiment.primer3.clear();
        configuration.experiment.randomized_region_size = Some(4);
        configuration.parser.batch_mode = true;
        let harness = harness(&configuration);

        harness
            .consumer
            .process(&single_end_read(b"ACGT", Some(0)))
            .unwrap();

        assert_eq!(harness.progress.accepted_reads(), 1);
        let pool = harness.experiment.pool();
        let id = pool.id_for(b"ACGT").unwrap();
        assert_eq!(pool.bounds_for(id).unwrap(), crate::core::AptamerBounds::new(0, 4));
        let cycle = harness.experiment.cycle(0).unwrap();
        assert_eq!(cycle.iter().collect::<Vec<_>>(), vec![(id, 1)]);
    }

    #[test]
    fn test_batch_mode_size_violation() {
        let mut configuration = base_configuration();
        configuration.experiment.primer3.clear();
        configuration.experiment.randomized_region_size = Some(4);
        configuration.parser.batch_mode = true;
        let harness = harness(&configuration);

        harness
            .consumer
            .process(&single_end_read(b"ACGTA", Some(0)))
            .unwrap();

        assert_eq!(harness.progress.accepted_reads(), 0);
        assert_eq!(harness.progress.snapshot().contig_assembly_fails, 1);
    }

    #[test]
    fn test_randomized_region_only_synthesizes_primers() {
        let mut configuration = base_configuration();
        configuration.parser.only_randomized_region_in_data = true;
        let harness = harness(&configuration);

        harness
            .consumer
            .process(&single_end_read(b"AA", Some(0)))
            .unwrap();

        let pool = harness.experiment.pool();
        let id = pool.id_for(b"ACAAGT").expect("primers prepended/appended");
        let bounds = pool.bounds_for(id).unwrap();
        assert_eq!((bounds.start, bounds.end), (2, 4));
    }

    #[test]
    fn test_store_reverse_complement_recomputes_bounds() {
        let mut configuration = base_configuration();
        configuration.parser.store_reverse_complement = true;
        let harness = harness(&configuration);

        harness
            .consumer
            .process(&single_end_read(b"ACAAGT", Some(0)))
            .unwrap();

        let pool = harness.experiment.pool();
        // rc("ACAAGT") = "ACTTGT"; the randomized region "AA" becomes "TT"
        let id = pool.id_for(b"ACTTGT").expect("reverse complement stored");
        let bounds = pool.bounds_for(id).unwrap();
        let stored = pool.sequence_for(id).unwrap();
        assert_eq!(&stored[bounds.start..bounds.end], b"TT");
        assert_eq!((bounds.start, bounds.end), (2, 4));
    }

    #[test]
    fn test_reverse_complement_retry_attributes_one_error() {
        let mut configuration = base_configuration();
        configuration.experiment.primer5 = "AAGG".into();
        configuration.experiment.primer3 = "TTGG".into();
        configuration.experiment.randomized_region_size = Some(4);
        configuration.parser.primer_tolerance = 0;
        configuration.parser.check_reverse_complement = true;
        let harness = harness(&configuration);

        // rc("CCAAACGTCCTT") = "AAGGACGTTTGG" parses cleanly, the forward
        // orientation has no 5' primer
        harness
            .consumer
            .process(&single_end_read(b"CCAAACGTCCTT", Some(0)))
            .unwrap();

        assert_eq!(harness.progress.accepted_reads(), 1);
        // The first attempt's error was retracted by the retry
        assert_eq!(harness.progress.snapshot().error_total(), 0);
        assert!(harness.experiment.pool().id_for(b"AAGGACGTTTGG").is_some());
    }

    #[test]
    fn test_refinement_recounts_shifted_kernel_hits() {
        let mut configuration = base_configuration();
        configuration.parser.primer_tolerance = 2;
        let harness = harness(&configuration);

        // The kernel bridges the interrupting T for one error; the
        // refinement replaces that with the aligned mismatch count at the
        // reported start
        let hit = harness
            .consumer
            .match_primer_in(b"ACTGT", b"ACGT", 0, 5)
            .expect("within tolerance after recount");
        assert_eq!(hit.index, 1);
        assert_eq!(hit.errors, 2);
    }

    #[test]
    fn test_refinement_probes_left_of_shifted_hit() {
        let mut configuration = base_configuration();
        configuration.parser.primer_tolerance = 2;
        let harness = harness(&configuration);

        // An inserted base shifts the kernel hit one position right; the
        // left-neighbourhood probe recovers the aligned window
        let hit = harness
            .consumer
            .match_primer_in(b"ACGATA", b"ACGTA", 0, 6)
            .expect("probe must recover the aligned window");
        assert_eq!(hit.index, 0);
        assert_eq!(hit.errors, 2);
    }

    #[test]
    fn test_barcode_demultiplexing() {
        let mut configuration = base_configuration();
        configuration.experiment.primer5 = "ACGG".into();
        configuration.experiment.primer3 = "TTCC".into();
        configuration.experiment.randomized_region_size = Some(4);
        configuration.parser.is_per_file = false;
        configuration.parser.barcodes5_prime = Some("AAAA,GGGG".into());
        configuration.cycles.push(SelectionCycleSection {
            name: "round1".into(),
            round: 1,
            ..Default::default()
        });
        let harness = harness(&configuration);

        // Barcode GGGG sits left of the 5' primer: cycle index 1
        harness
            .consumer
            .process(&single_end_read(b"GGGGACGGTTTTTTCC", None))
            .unwrap();

        assert_eq!(harness.progress.accepted_reads(), 1);
        let round1 = harness.experiment.cycle(1).unwrap();
        assert_eq!(round1.size(), 1);
        assert_eq!(harness.experiment.cycle(0).unwrap().size(), 0);
    }

    #[test]
    fn test_unmatched_barcode_is_invalid_cycle() {
        let mut configuration = base_configuration();
        configuration.experiment.primer5 = "ACGG".into();
        configuration.experiment.primer3 = "TTCC".into();
        configuration.experiment.randomized_region_size = Some(4);
        configuration.parser.is_per_file = false;
        configuration.parser.barcodes5_prime = Some("AAAA,GGGG".into());
        configuration.cycles.push(SelectionCycleSection {
            name: "round1".into(),
            round: 1,
            ..Default::default()
        });
        let harness = harness(&configuration);

        // No barcode region before the 5' primer at all
        harness
            .consumer
            .process(&single_end_read(b"ACGGTTTTTTCC", None))
            .unwrap();

        assert_eq!(harness.progress.snapshot().invalid_cycle, 1);
    }

    #[test]
    fn test_primer_overlap_detection() {
        let mut configuration = base_configuration();
        // Exact size forces rr_end past the 3' hit; craft a contig where
        // the primers land adjacent and overlapping
        configuration.experiment.primer5 = "AAAA".into();
        configuration.experiment.primer3 = "AAGT".into();
        configuration.experiment.randomized_region_size = None;
        configuration.parser.primer_tolerance = 0;
        let harness = harness(&configuration);

        // 5' primer at index 0..4, 3' primer found at index 2..6: overlap
        harness
            .consumer
            .process(&single_end_read(b"AAAAGT", Some(0)))
            .unwrap();

        assert_eq!(harness.progress.snapshot().primer_overlaps, 1);
        assert_eq!(harness.progress.accepted_reads(), 0);
    }

    #[test]
    fn test_paired_read_contig_failure() {
        let configuration = base_configuration();
        let harness = harness(&configuration);

        let read = SequencingRead {
            forward_sequence: b"ACGTACGTACGTACGT".to_vec(),
            forward_quality: vec![b'I'; 16],
            reverse_sequence: Some(b"GGGGGGGGGGGGGGGG".to_vec()),
            reverse_quality: Some(vec![b'I'; 16]),
            cycle_index: Some(0),
            ..Default::default()
        };
        harness.consumer.process(&read).unwrap();

        assert_eq!(harness.progress.snapshot().contig_assembly_fails, 1);
    }

    #[test]
    fn test_intervals_overlap() {
        assert!(intervals_overlap(0, 4, 3, 4));
        assert!(intervals_overlap(3, 4, 0, 4));
        assert!(!intervals_overlap(0, 4, 4, 4));
        assert!(!intervals_overlap(0, 0, 0, 4));
    }
}
