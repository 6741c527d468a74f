use std::path::Path;

/// Extracts the PID embedded in a recording's file name, e.g.
/// `memflame-1234.jfr` yields 1234. Returns 0 when the name carries no
/// parsable `-<pid>.` segment.
pub fn source_pid( path: &Path ) -> u32 {
    let name = match path.file_name().and_then( |name| name.to_str() ) {
        Some( name ) => name,
        None => return 0
    };

    let start = match name.find( '-' ) {
        Some( index ) => index + 1,
        None => return 0
    };

    let end = match name.find( '.' ) {
        Some( index ) => index,
        None => return 0
    };

    if end <= start {
        return 0;
    }

    name[ start..end ].parse().unwrap_or( 0 )
}
