//! Experiment domain: aptamer pool, selection cycles and metadata

pub mod experiment;
pub mod metadata;
pub mod pool;
pub mod selection_cycle;

pub use experiment::Experiment;
pub use metadata::{Metadata, MetadataSnapshot, ParserStat, QualitySummary};
pub use pool::AptamerPool;
pub use selection_cycle::SelectionCycle;
