use std::borrow::Cow;
use std::io;

use speedy::{Context, Readable, Reader, Writable, Writer};

/// Bumped whenever the on-disk layout of `Event` changes.
pub const FORMAT_VERSION: u32 = 1;

// The two allocation sample kinds the profiler records; everything else
// found in a recording is skipped by the consumer.
pub const ALLOC_IN_NEW_TLAB: u32 = 1;
pub const ALLOC_OUTSIDE_TLAB: u32 = 2;

#[derive(Clone, PartialEq, Debug, Readable, Writable)]
pub struct HeaderBody {
    pub version: u32,
    pub pid: u32,
    pub wall_clock_secs: u64,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug, Readable, Writable)]
pub struct FrameRecord {
    /// Slash-qualified declaring type, e.g. `java/util/ArrayList`.
    pub declaring_type: String,
    pub method: String,
}

/// A field which the producer may have omitted from a sample.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum FieldValue {
    Missing,
    Value(u64),
}

impl FieldValue {
    #[inline]
    pub fn get(self) -> Option<u64> {
        match self {
            FieldValue::Missing => None,
            FieldValue::Value(value) => Some(value),
        }
    }
}

impl From<Option<u64>> for FieldValue {
    #[inline]
    fn from(value: Option<u64>) -> Self {
        match value {
            None => FieldValue::Missing,
            Some(value) => FieldValue::Value(value),
        }
    }
}

impl<'a, C: Context> Readable<'a, C> for FieldValue {
    fn read_from<R: Reader<'a, C>>(reader: &mut R) -> io::Result<Self> {
        let is_present = reader.read_u8()?;
        if is_present == 0 {
            Ok(FieldValue::Missing)
        } else {
            Ok(FieldValue::Value(reader.read_u64()?))
        }
    }
}

impl<C: Context> Writable<C> for FieldValue {
    fn write_to<'this, T: ?Sized + Writer<'this, C>>(
        &'this self,
        writer: &mut T,
    ) -> io::Result<()> {
        match *self {
            FieldValue::Missing => writer.write_u8(0),
            FieldValue::Value(value) => {
                writer.write_u8(1)?;
                writer.write_u64(value)
            }
        }
    }
}

#[derive(Clone, PartialEq, Debug, Readable, Writable)]
pub enum Event<'a> {
    Header(HeaderBody),
    /// A constant-pool entry; frames are ordered leaf-first, exactly
    /// as captured.
    StackTrace {
        id: u64,
        frames: Vec<FrameRecord>,
    },
    /// A constant-pool entry; the descriptor is in JVM internal form,
    /// e.g. `[[I` or `Ljava/lang/String;`.
    Class {
        id: u64,
        descriptor: Cow<'a, str>,
    },
    /// One allocation sample. `stack_trace` and `class` reference
    /// constant-pool entries emitted earlier in the same recording.
    Alloc {
        kind: u32,
        stack_trace: FieldValue,
        class: FieldValue,
        size: FieldValue,
    },
    Marker {
        value: u32,
    },
}

#[test]
fn test_field_value_roundtrip() {
    use speedy::Endianness;

    let mut buffer = Vec::new();
    FieldValue::Missing
        .write_to_stream(Endianness::LittleEndian, &mut buffer)
        .unwrap();
    FieldValue::Value(0xDEAD_BEEF)
        .write_to_stream(Endianness::LittleEndian, &mut buffer)
        .unwrap();

    let missing = FieldValue::read_from_buffer(Endianness::LittleEndian, &buffer).unwrap();
    let value = FieldValue::read_from_buffer(Endianness::LittleEndian, &buffer[1..]).unwrap();
    assert_eq!(missing, FieldValue::Missing);
    assert_eq!(value, FieldValue::Value(0xDEAD_BEEF));
}
