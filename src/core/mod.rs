//! Core data types for the parsing pipeline

pub mod data_structures;

pub use data_structures::{
    complement, is_valid_sequence, reverse_complement, reverse_complement_in_place, AptamerBounds,
    AptamerId, QueueItem, ReaderType, SequencingRead,
};
