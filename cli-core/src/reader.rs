use std::io::{self, Read};

use common::event::{
    Event,
    HeaderBody,
    FORMAT_VERSION
};

use common::speedy::{Readable, Endianness};

pub struct Iter< T: Read > {
    fp: T,
    done: bool
}

impl< T > Iterator for Iter< T > where T: Read {
    type Item = io::Result< Event< 'static > >;

    fn next( &mut self ) -> Option< Self::Item > {
        if self.done {
            return None;
        }

        // Only an EOF which hits before the first byte of an event is a
        // clean end of the stream; an EOF in the middle of one means the
        // recording was cut short, and a partially aggregated result
        // must not pass as a complete one.
        let mut first_byte = [ 0 ];
        loop {
            match self.fp.read( &mut first_byte ) {
                Ok( 0 ) => {
                    self.done = true;
                    return None;
                },
                Ok( _ ) => break,
                Err( ref err ) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err( err ) => {
                    self.done = true;
                    return Some( Err( err ) );
                }
            }
        }

        let mut fp = (&first_byte[..]).chain( &mut self.fp );
        match Event::read_from_stream( Endianness::LittleEndian, &mut fp ) {
            Ok( event ) => Some( Ok( event ) ),
            Err( err ) => {
                self.done = true;
                if err.kind() == io::ErrorKind::UnexpectedEof {
                    Some( Err( io::Error::new( io::ErrorKind::UnexpectedEof, "recording is truncated" ) ) )
                } else {
                    Some( Err( err ) )
                }
            }
        }
    }
}

pub fn parse_events< T >( fp: T ) -> io::Result< (HeaderBody, Iter< T >) > where T: Read {
    let mut fp = fp;

    let event = Event::read_from_stream( Endianness::LittleEndian, &mut fp )?;
    let header = match event {
        Event::Header( header ) => {
            header
        },
        _ => {
            return Err( io::Error::new( io::ErrorKind::Other, "recording doesn't start with a proper header" ) );
        }
    };

    if header.version > FORMAT_VERSION {
        return Err( io::Error::new( io::ErrorKind::Other, format!( "unsupported recording version: {}", header.version ) ) );
    }

    let iter = Iter { fp, done: false };
    Ok( (header, iter) )
}
