use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use common::event::{Event, FieldValue, FrameRecord, HeaderBody, FORMAT_VERSION};
use common::speedy::{Endianness, Writable};

/// Where a recording for a given process goes by default.
pub fn default_artifact_path( pid: u32 ) -> PathBuf {
    PathBuf::from( format!( "memflame-{}.jfr", pid ) )
}

/// Writes a recording artifact.
///
/// Stack traces and classes are interned into the recording's constant
/// pools as they are first seen, so repeated samples from the same
/// allocation site only carry a pool reference. Samples arriving before
/// the configured delay has elapsed, or after the recording window has
/// closed, are dropped.
pub struct Recorder< W: Write > {
    fp: Option< W >,
    created_at: Instant,
    delay: Duration,
    deadline: Option< Duration >,
    stack_trace_ids: HashMap< Vec< FrameRecord >, u64 >,
    class_ids: HashMap< String, u64 >,
    next_id: u64
}

impl Recorder< BufWriter< File > > {
    /// Creates a recording file and writes its header.
    pub fn create( path: &Path, pid: u32, delay_ms: u64, duration_ms: Option< u64 > ) -> io::Result< Self > {
        let fp = File::create( path ).map_err( |err| {
            io::Error::new( err.kind(), format!( "cannot create {}: {}", path.display(), err ) )
        })?;

        info!( "Recording allocations to {}...", path.display() );
        Recorder::new( BufWriter::new( fp ), pid, delay_ms, duration_ms )
    }
}

impl< W: Write > Recorder< W > {
    pub fn new( fp: W, pid: u32, delay_ms: u64, duration_ms: Option< u64 > ) -> io::Result< Self > {
        let mut fp = fp;
        let wall_clock_secs = SystemTime::now()
            .duration_since( UNIX_EPOCH )
            .map( |elapsed| elapsed.as_secs() )
            .unwrap_or( 0 );

        Event::Header( HeaderBody {
            version: FORMAT_VERSION,
            pid,
            wall_clock_secs
        }).write_to_stream( Endianness::LittleEndian, &mut fp )?;

        let delay = Duration::from_millis( delay_ms );
        let deadline = duration_ms.map( |duration_ms| delay + Duration::from_millis( duration_ms ) );

        Ok( Recorder {
            fp: Some( fp ),
            created_at: Instant::now(),
            delay,
            deadline,
            stack_trace_ids: HashMap::new(),
            class_ids: HashMap::new(),
            next_id: 1
        })
    }

    fn is_active( &self ) -> bool {
        let elapsed = self.created_at.elapsed();
        if elapsed < self.delay {
            return false;
        }

        match self.deadline {
            Some( deadline ) => elapsed < deadline,
            None => true
        }
    }

    /// Appends one allocation sample, emitting constant-pool entries
    /// first if the stack or the class wasn't seen yet. Samples outside
    /// the recording window are dropped.
    pub fn record_allocation( &mut self, kind: u32, frames: &[ FrameRecord ], descriptor: &str, size: u64 ) -> io::Result< () > {
        if !self.is_active() {
            return Ok(());
        }

        let fp = match self.fp.as_mut() {
            Some( fp ) => fp,
            None => return Ok(())
        };

        let stack_trace = match self.stack_trace_ids.get( frames ) {
            Some( &id ) => id,
            None => {
                let id = self.next_id;
                self.next_id += 1;
                Event::StackTrace { id, frames: frames.to_vec() }
                    .write_to_stream( Endianness::LittleEndian, &mut *fp )?;
                self.stack_trace_ids.insert( frames.to_vec(), id );
                id
            }
        };

        let class = match self.class_ids.get( descriptor ) {
            Some( &id ) => id,
            None => {
                let id = self.next_id;
                self.next_id += 1;
                Event::Class { id, descriptor: descriptor.into() }
                    .write_to_stream( Endianness::LittleEndian, &mut *fp )?;
                self.class_ids.insert( descriptor.to_owned(), id );
                id
            }
        };

        Event::Alloc {
            kind,
            stack_trace: FieldValue::Value( stack_trace ),
            class: FieldValue::Value( class ),
            size: FieldValue::Value( size )
        }.write_to_stream( Endianness::LittleEndian, &mut *fp )
    }

    /// Flushes and hands back the underlying sink.
    pub fn finish( mut self ) -> io::Result< W > {
        let mut fp = match self.fp.take() {
            Some( fp ) => fp,
            None => return Err( io::Error::new( io::ErrorKind::Other, "recorder already finished" ) )
        };

        fp.flush()?;
        Ok( fp )
    }
}

impl< W: Write > Drop for Recorder< W > {
    fn drop( &mut self ) {
        // Matches the dump-on-exit guarantee of the recording agent.
        if let Some( fp ) = self.fp.as_mut() {
            let _ = fp.flush();
        }
    }
}
