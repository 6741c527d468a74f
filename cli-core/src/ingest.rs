use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::bounded;

use common::event::{Event, ALLOC_IN_NEW_TLAB, ALLOC_OUTSIDE_TLAB};

use crate::aggregator::Aggregator;
use crate::reader::parse_events;
use crate::stack_key::{ClassRef, StackKey, StackTraceRef};

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CountingMode {
    Bytes,
    Objects
}

#[derive(Clone, Debug)]
pub struct IngestOptions {
    pub threads: usize,
    pub mode: CountingMode,
    pub includes: HashSet< String >
}

impl Default for IngestOptions {
    fn default() -> Self {
        IngestOptions {
            threads: 1,
            mode: CountingMode::Bytes,
            includes: HashSet::new()
        }
    }
}

// The constant pools of a single recording. Pool ids are only meaningful
// within the recording which defined them, so every source gets a fresh
// set of pools, and keys built from different sources never compare equal
// even when their contents match.
struct SourcePools {
    stack_traces: HashMap< u64, Arc< StackTraceRef > >,
    classes: HashMap< u64, Arc< ClassRef > >,
    skipped: u64
}

impl SourcePools {
    fn new() -> Self {
        SourcePools {
            stack_traces: HashMap::new(),
            classes: HashMap::new(),
            skipped: 0
        }
    }

    // Turns one event into a unit of work, if it qualifies: a recognized
    // allocation kind, all fields present, both pool references resolvable
    // and a non-empty stack. Everything else is silently skipped.
    fn qualify( &mut self, event: Event, mode: CountingMode ) -> Option< (StackKey, u64) > {
        match event {
            Event::StackTrace { id, frames } => {
                self.stack_traces.insert( id, Arc::new( StackTraceRef { frames } ) );
                None
            },
            Event::Class { id, descriptor } => {
                self.classes.insert( id, Arc::new( ClassRef { descriptor: descriptor.into_owned() } ) );
                None
            },
            Event::Alloc { kind, stack_trace, class, size } => {
                if kind != ALLOC_IN_NEW_TLAB && kind != ALLOC_OUTSIDE_TLAB {
                    self.skipped += 1;
                    return None;
                }

                let unit = (|| {
                    let stack = self.stack_traces.get( &stack_trace.get()? )?.clone();
                    let class = self.classes.get( &class.get()? )?.clone();
                    let size = size.get()?;
                    if stack.frames.is_empty() {
                        return None;
                    }

                    let weight = match mode {
                        CountingMode::Bytes => size,
                        CountingMode::Objects => 1
                    };

                    Some( (StackKey::new( stack, class ), weight) )
                })();

                if unit.is_none() {
                    self.skipped += 1;
                }

                unit
            },
            Event::Header( .. ) | Event::Marker { .. } => None
        }
    }
}

#[inline]
fn process( aggregator: &Aggregator, includes: &HashSet< String >, key: StackKey, weight: u64 ) {
    if key.should_include( includes ) {
        aggregator.record( key, weight );
    }
}

/// Drains a single recording stream into the aggregator.
///
/// With one thread the events are processed inline, in order. With more
/// the qualifying events are fanned out over a bounded channel to a pool
/// of workers, and the call doesn't return until the stream is exhausted
/// and every worker has drained its backlog.
pub fn ingest_stream< T >( aggregator: &Aggregator, options: &IngestOptions, fp: T ) -> io::Result< () > where T: Read {
    let (header, events) = parse_events( fp )?;
    debug!( "Ingesting a recording made by PID {}", header.pid );

    let mut pools = SourcePools::new();
    let mut result = Ok(());

    if options.threads <= 1 {
        for event in events {
            let event = event?;
            if let Some( (key, weight) ) = pools.qualify( event, options.mode ) {
                process( aggregator, &options.includes, key, weight );
            }
        }
    } else {
        let (tx, rx) = bounded( options.threads * 128 );
        thread::scope( |scope| {
            for _ in 0..options.threads {
                let rx = rx.clone();
                scope.spawn( move || {
                    for (key, weight) in rx {
                        process( aggregator, &options.includes, key, weight );
                    }
                });
            }

            for event in events {
                let event = match event {
                    Ok( event ) => event,
                    Err( err ) => {
                        result = Err( err );
                        break;
                    }
                };

                if let Some( unit ) = pools.qualify( event, options.mode ) {
                    if tx.send( unit ).is_err() {
                        break;
                    }
                }
            }

            drop( tx );
        });
    }

    if pools.skipped > 0 {
        debug!( "Skipped {} event(s) which didn't qualify", pools.skipped );
    }

    result
}

/// Opens and drains a single recording file. An unreadable file is fatal;
/// the error names the file which failed.
pub fn ingest_file( aggregator: &Aggregator, options: &IngestOptions, path: &Path ) -> io::Result< () > {
    let fp = File::open( path ).map_err( |err| {
        io::Error::new( err.kind(), format!( "cannot open {}: {}", path.display(), err ) )
    })?;

    info!( "Ingesting {}...", path.display() );
    ingest_stream( aggregator, options, BufReader::new( fp ) )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collate::{fold, rank};
    use crate::recorder::Recorder;
    use common::event::{FieldValue, FrameRecord, HeaderBody, FORMAT_VERSION};
    use common::speedy::{Endianness, Writable};

    fn frames( names: &[&str] ) -> Vec< FrameRecord > {
        names.iter().map( |&name| FrameRecord {
            declaring_type: name.to_owned(),
            method: "m".to_owned()
        }).collect()
    }

    fn write_event( buffer: &mut Vec< u8 >, event: Event ) {
        event.write_to_stream( Endianness::LittleEndian, buffer ).unwrap();
    }

    fn header( buffer: &mut Vec< u8 > ) {
        write_event( buffer, Event::Header( HeaderBody {
            version: FORMAT_VERSION,
            pid: 0,
            wall_clock_secs: 0
        }));
    }

    fn collapse( aggregator: Aggregator, cutoff: u64 ) -> Vec< String > {
        rank( fold( aggregator.into_totals() ), cutoff )
            .into_iter()
            .map( |line| line.to_string() )
            .collect()
    }

    #[test]
    fn test_end_to_end_byte_totals() {
        // Two samples sharing a three frame stack; leaf-first capture
        // order comes out reversed in the collapsed line.
        let mut recorder = Recorder::new( Vec::new(), 0, 0, None ).unwrap();
        recorder.record_allocation( ALLOC_IN_NEW_TLAB, &frames( &[ "Frame1", "Frame2", "Frame3" ] ), "LType;", 1000 ).unwrap();
        recorder.record_allocation( ALLOC_OUTSIDE_TLAB, &frames( &[ "Frame1", "Frame2", "Frame3" ] ), "LType;", 2000 ).unwrap();
        let recording = recorder.finish().unwrap();

        let aggregator = Aggregator::new();
        ingest_stream( &aggregator, &IngestOptions::default(), &recording[..] ).unwrap();

        let lines = collapse( aggregator, 0 );
        assert_eq!( lines, vec![ "java;Frame3:.m;Frame2:.m;Frame1:.m;Type 3000".to_owned() ] );
    }

    #[test]
    fn test_object_counting_mode() {
        let mut recorder = Recorder::new( Vec::new(), 0, 0, None ).unwrap();
        recorder.record_allocation( ALLOC_IN_NEW_TLAB, &frames( &[ "A" ] ), "B", 1000 ).unwrap();
        recorder.record_allocation( ALLOC_IN_NEW_TLAB, &frames( &[ "A" ] ), "B", 2000 ).unwrap();
        let recording = recorder.finish().unwrap();

        let options = IngestOptions {
            mode: CountingMode::Objects,
            ..IngestOptions::default()
        };

        let aggregator = Aggregator::new();
        ingest_stream( &aggregator, &options, &recording[..] ).unwrap();

        let lines = collapse( aggregator, 0 );
        assert_eq!( lines, vec![ "java;A:.m;byte 2".to_owned() ] );
    }

    #[test]
    fn test_fold_merges_across_sources() {
        let make_recording = || {
            let mut recorder = Recorder::new( Vec::new(), 0, 0, None ).unwrap();
            recorder.record_allocation( ALLOC_IN_NEW_TLAB, &frames( &[ "A" ] ), "I", 10 ).unwrap();
            recorder.finish().unwrap()
        };

        let aggregator = Aggregator::new();
        ingest_stream( &aggregator, &IngestOptions::default(), &make_recording()[..] ).unwrap();
        ingest_stream( &aggregator, &IngestOptions::default(), &make_recording()[..] ).unwrap();

        // Distinct pool entries before the fold, one line after it.
        assert_eq!( aggregator.site_count(), 2 );
        let lines = collapse( aggregator, 0 );
        assert_eq!( lines, vec![ "java;A:.m;int 20".to_owned() ] );
    }

    #[test]
    fn test_worker_counts_agree() {
        let mut recorder = Recorder::new( Vec::new(), 0, 0, None ).unwrap();
        for nth in 0..100 {
            let name = format!( "Class{}", nth % 7 );
            recorder.record_allocation( ALLOC_IN_NEW_TLAB, &frames( &[ name.as_str() ] ), "J", nth + 1 ).unwrap();
        }
        let recording = recorder.finish().unwrap();

        let mut outputs = Vec::new();
        for &threads in &[ 1, 2, 8 ] {
            let options = IngestOptions {
                threads,
                ..IngestOptions::default()
            };

            let aggregator = Aggregator::new();
            ingest_stream( &aggregator, &options, &recording[..] ).unwrap();
            outputs.push( collapse( aggregator, 0 ) );
        }

        assert_eq!( outputs[ 0 ], outputs[ 1 ] );
        assert_eq!( outputs[ 0 ], outputs[ 2 ] );
    }

    #[test]
    fn test_include_filter_drops_before_aggregation() {
        let mut recorder = Recorder::new( Vec::new(), 0, 0, None ).unwrap();
        recorder.record_allocation( ALLOC_IN_NEW_TLAB, &frames( &[ "a/B" ] ), "I", 100 ).unwrap();
        recorder.record_allocation( ALLOC_IN_NEW_TLAB, &frames( &[ "x/Y" ] ), "I", 100 ).unwrap();
        let recording = recorder.finish().unwrap();

        let mut includes = HashSet::new();
        includes.insert( "a/B".to_owned() );
        let options = IngestOptions {
            includes,
            ..IngestOptions::default()
        };

        let aggregator = Aggregator::new();
        ingest_stream( &aggregator, &options, &recording[..] ).unwrap();

        // The rejected key never reaches the aggregator, so a cutoff can't
        // sweep it into the filtered bucket either.
        assert_eq!( aggregator.site_count(), 1 );
        let lines = collapse( aggregator, 1000 );
        assert_eq!( lines, vec![ "java;Filtered 100".to_owned() ] );
    }

    #[test]
    fn test_malformed_events_are_skipped() {
        let mut buffer = Vec::new();
        header( &mut buffer );
        write_event( &mut buffer, Event::StackTrace { id: 1, frames: frames( &[ "A" ] ) } );
        write_event( &mut buffer, Event::StackTrace { id: 2, frames: Vec::new() } );
        write_event( &mut buffer, Event::Class { id: 1, descriptor: "I".into() } );

        // Unrecognized kind.
        write_event( &mut buffer, Event::Alloc {
            kind: 77,
            stack_trace: FieldValue::Value( 1 ),
            class: FieldValue::Value( 1 ),
            size: FieldValue::Value( 10 )
        });
        // Missing size field.
        write_event( &mut buffer, Event::Alloc {
            kind: ALLOC_IN_NEW_TLAB,
            stack_trace: FieldValue::Value( 1 ),
            class: FieldValue::Value( 1 ),
            size: FieldValue::Missing
        });
        // Missing stack trace field.
        write_event( &mut buffer, Event::Alloc {
            kind: ALLOC_IN_NEW_TLAB,
            stack_trace: FieldValue::Missing,
            class: FieldValue::Value( 1 ),
            size: FieldValue::Value( 10 )
        });
        // Dangling pool reference.
        write_event( &mut buffer, Event::Alloc {
            kind: ALLOC_OUTSIDE_TLAB,
            stack_trace: FieldValue::Value( 99 ),
            class: FieldValue::Value( 1 ),
            size: FieldValue::Value( 10 )
        });
        // Empty stack.
        write_event( &mut buffer, Event::Alloc {
            kind: ALLOC_IN_NEW_TLAB,
            stack_trace: FieldValue::Value( 2 ),
            class: FieldValue::Value( 1 ),
            size: FieldValue::Value( 10 )
        });
        // Stray marker.
        write_event( &mut buffer, Event::Marker { value: 0 } );
        // The only qualifying sample.
        write_event( &mut buffer, Event::Alloc {
            kind: ALLOC_IN_NEW_TLAB,
            stack_trace: FieldValue::Value( 1 ),
            class: FieldValue::Value( 1 ),
            size: FieldValue::Value( 42 )
        });

        let aggregator = Aggregator::new();
        ingest_stream( &aggregator, &IngestOptions::default(), &buffer[..] ).unwrap();

        let lines = collapse( aggregator, 0 );
        assert_eq!( lines, vec![ "java;A:.m;int 42".to_owned() ] );
    }

    #[test]
    fn test_truncated_recording_is_fatal() {
        let mut recorder = Recorder::new( Vec::new(), 0, 0, None ).unwrap();
        recorder.record_allocation( ALLOC_IN_NEW_TLAB, &frames( &[ "A" ] ), "I", 10 ).unwrap();
        recorder.record_allocation( ALLOC_IN_NEW_TLAB, &frames( &[ "B" ] ), "I", 10 ).unwrap();
        let recording = recorder.finish().unwrap();
        let cut = &recording[ ..recording.len() - 2 ];

        for &threads in &[ 1, 8 ] {
            let options = IngestOptions {
                threads,
                ..IngestOptions::default()
            };

            let aggregator = Aggregator::new();
            assert!( ingest_stream( &aggregator, &options, cut ).is_err() );
        }
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let aggregator = Aggregator::new();
        let result = ingest_file( &aggregator, &IngestOptions::default(), Path::new( "/nonexistent/recording.jfr" ) );
        let error = result.unwrap_err().to_string();
        assert!( error.contains( "/nonexistent/recording.jfr" ) );
    }
}
