#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate quickcheck;

mod aggregator;
mod collate;
mod emitter;
mod exporter_flamegraph;
mod ingest;
mod reader;
mod recorder;
mod stack_key;
mod util;

pub use crate::aggregator::Aggregator;
pub use crate::collate::{fold, rank, RankedLine};
pub use crate::emitter::write_collapsed;
pub use crate::exporter_flamegraph::lines_to_svg;
pub use crate::ingest::{ingest_file, ingest_stream, CountingMode, IngestOptions};
pub use crate::reader::parse_events;
pub use crate::recorder::{default_artifact_path, Recorder};
pub use crate::stack_key::{translate_descriptor, ClassRef, StackKey, StackTraceRef, RUNTIME_PREFIX};
pub use crate::util::source_pid;

pub use common::event;
