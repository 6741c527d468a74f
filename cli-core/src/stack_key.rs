use std::collections::HashSet;
use std::fmt::Write;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use common::event::FrameRecord;

/// Prepended to every collapsed-stack line, marking the profiled runtime.
pub const RUNTIME_PREFIX: &str = "java;";

/// A constant-pool stack trace resolved during ingestion. Frames are kept
/// in capture order, which is leaf-first.
#[derive(Debug)]
pub struct StackTraceRef {
    pub frames: Vec< FrameRecord >
}

/// A constant-pool class resolved during ingestion; the descriptor is kept
/// in its raw JVM internal form.
#[derive(Debug)]
pub struct ClassRef {
    pub descriptor: String
}

/// The identity of one allocation site: a stack trace plus the allocated
/// class.
///
/// Equality and hashing go by the identity of the underlying pool entries,
/// not by their contents. Two keys which happen to render to the same
/// collapsed-stack text are still distinct here; merging them is the fold
/// pass's job. This keeps hashing and comparison on the per-event hot path
/// as cheap as two pointer operations.
#[derive(Clone, Debug)]
pub struct StackKey {
    stack: Arc< StackTraceRef >,
    class: Arc< ClassRef >
}

impl StackKey {
    #[inline]
    pub fn new( stack: Arc< StackTraceRef >, class: Arc< ClassRef > ) -> Self {
        StackKey { stack, class }
    }

    /// Whether this key passes the include filter. An empty filter set
    /// accepts everything; otherwise at least one member has to occur
    /// somewhere in the collapsed-stack text.
    pub fn should_include( &self, includes: &HashSet< String > ) -> bool {
        if includes.is_empty() {
            return true;
        }

        let text = self.canonical_text();
        includes.iter().any( |include| text.contains( include.as_str() ) )
    }

    /// Renders the collapsed-stack text: the runtime prefix, the frames
    /// root-first as `Type:.method;`, then the translated allocated-class
    /// descriptor, with no trailing separator.
    pub fn canonical_text( &self ) -> String {
        let mut output = String::with_capacity( 32 + self.stack.frames.len() * 32 );
        output.push_str( RUNTIME_PREFIX );

        for frame in self.stack.frames.iter().rev() {
            // Producers normally hand us slash-qualified names already;
            // dotted ones are normalized here so both fold identically.
            if frame.declaring_type.contains( '.' ) {
                write!( &mut output, "{}:.{};", frame.declaring_type.replace( '.', "/" ), frame.method ).unwrap();
            } else {
                write!( &mut output, "{}:.{};", frame.declaring_type, frame.method ).unwrap();
            }
        }

        output.push_str( &translate_descriptor( &self.class.descriptor ) );
        output
    }
}

impl PartialEq for StackKey {
    #[inline]
    fn eq( &self, other: &Self ) -> bool {
        Arc::ptr_eq( &self.stack, &other.stack ) && Arc::ptr_eq( &self.class, &other.class )
    }
}

impl Eq for StackKey {}

impl Hash for StackKey {
    #[inline]
    fn hash< H: Hasher >( &self, state: &mut H ) {
        (Arc::as_ptr( &self.stack ) as usize).hash( state );
        (Arc::as_ptr( &self.class ) as usize).hash( state );
    }
}

/// Translates a raw JVM type descriptor into a human readable name:
/// `[[I` becomes `int[][]`, `Ljava/lang/String;` becomes
/// `java/lang/String`, `B` becomes `byte`. Anything unrecognized is
/// passed through unchanged.
pub fn translate_descriptor( descriptor: &str ) -> String {
    let mut dimensions = 0;
    let bytes = descriptor.as_bytes();
    while dimensions < bytes.len() && bytes[ dimensions ] == b'[' {
        dimensions += 1;
    }

    let element = &descriptor[ dimensions.. ];
    let mut output = String::with_capacity( element.len() + dimensions * 2 );
    match element.as_bytes().first() {
        Some( b'Z' ) => output.push_str( "boolean" ),
        Some( b'B' ) => output.push_str( "byte" ),
        Some( b'C' ) => output.push_str( "char" ),
        Some( b'D' ) => output.push_str( "double" ),
        Some( b'F' ) => output.push_str( "float" ),
        Some( b'I' ) => output.push_str( "int" ),
        Some( b'J' ) => output.push_str( "long" ),
        Some( b'S' ) => output.push_str( "short" ),
        Some( b'L' ) if element.len() >= 2 => {
            // Unwraps `L<name>;` by dropping the marker and the final
            // character. The final character is usually `;`, but it can
            // be anything, so trim it on a char boundary.
            let inner = &element[ 1.. ];
            let end = inner.len() - inner.chars().next_back().map( char::len_utf8 ).unwrap_or( 0 );
            output.push_str( &inner[ ..end ] );
        },
        _ => output.push_str( element )
    }

    for _ in 0..dimensions {
        output.push_str( "[]" );
    }

    output
}
