#[macro_use]
extern crate log;

use std::collections::HashSet;
use std::env;
use std::error::Error;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process;

use structopt::StructOpt;

use cli_core::{
    fold,
    ingest_file,
    lines_to_svg,
    rank,
    source_pid,
    write_collapsed,
    Aggregator,
    CountingMode,
    IngestOptions
};

#[derive(StructOpt, Debug)]
#[structopt(name = "memflame", about = "Generates flamegraph data for JVM memory allocations")]
struct Opt {
    /// Output format
    #[structopt(short = "o", long = "output", default_value = "svg", possible_values = &["svg", "txt"])]
    output: String,

    /// Title of the rendered flamegraph
    #[structopt(long = "title", default_value = "Flamegraph")]
    title: String,

    /// Count allocated objects instead of allocated bytes
    #[structopt(short = "n", long = "count-objects")]
    count_objects: bool,

    /// The number of worker threads used during ingestion
    #[structopt(short = "t", long = "threads", default_value = "1")]
    threads: usize,

    /// Totals below this threshold are folded into a single "Filtered" entry
    #[structopt(short = "c", long = "cutoff", default_value = "0")]
    cutoff: u64,

    /// A comma-separated list of packages to include, e.g. "com.example,org.acme"
    #[structopt(short = "i", long = "include", use_delimiter = true)]
    includes: Vec< String >,

    /// The recording file(s) to aggregate
    #[structopt(parse(from_os_str), required = true)]
    inputs: Vec< PathBuf >
}

fn run( opt: Opt ) -> Result< (), Box< dyn Error > > {
    // Includes are given as dotted package names and matched against
    // slash-qualified collapsed-stack text.
    let includes: HashSet< String > = opt.includes.iter().map( |include| include.replace( '.', "/" ) ).collect();

    let options = IngestOptions {
        threads: opt.threads.max( 1 ),
        mode: if opt.count_objects { CountingMode::Objects } else { CountingMode::Bytes },
        includes
    };

    let aggregator = Aggregator::new();
    for path in &opt.inputs {
        ingest_file( &aggregator, &options, path )?;
    }

    let lines = rank( fold( aggregator.into_totals() ), opt.cutoff );

    let pid = if opt.inputs.len() == 1 {
        source_pid( &opt.inputs[ 0 ] )
    } else {
        0
    };

    if opt.output == "svg" {
        let path = format!( "memflame-{}.svg", pid );
        let count_name = if opt.count_objects { "objects" } else { "bytes" };

        // Rendered into memory first so that an export failure can't
        // leave a half-written file behind.
        let mut buffer = Vec::new();
        lines_to_svg( &lines, &opt.title, count_name, &mut buffer );
        std::fs::write( &path, buffer )?;

        info!( "Flamegraph written to '{}'", path );
    } else {
        let path = format!( "memflame-{}.txt", pid );
        let fp = File::create( &path )?;
        write_collapsed( &lines, BufWriter::new( fp ) )?;

        info!( "Collapsed stacks written to '{}'", path );
    }

    Ok(())
}

fn main() {
    if env::var( "RUST_LOG" ).is_err() {
        env::set_var( "RUST_LOG", "info" );
    }

    env_logger::init();

    let opt = Opt::from_args();
    let result = run( opt );
    if let Err( error ) = result {
        error!( "{}", error );
        if !log_enabled!( log::Level::Error ) {
            println!( "ERROR: {}", error );
        }

        process::exit( 1 );
    }
}
