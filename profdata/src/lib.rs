//! # profdata - Event and Recording Data Model
//!
//! Fixed-size event records, interned identifiers, and the immutable
//! recording aggregate produced when a capture session stops. Everything here
//! is rkyv-archivable; a persisted recording carries its own string tables
//! and resolved-object table, so it can be reconstructed without the live
//! process's interning state.
//!
//! ## Persisting a recording
//!
//! ```rust
//! use profdata::Recording;
//!
//! let recording = Recording {
//!     name: "session".to_string(),
//!     started_unix_ns: 0,
//!     num_frames: 0,
//!     groups: Vec::new(),
//!     event_names: Vec::new(),
//!     strings: Vec::new(),
//!     objects: Vec::new(),
//! };
//!
//! let mut buf = Vec::new();
//! recording.write_to(&mut buf)?;
//! let restored = Recording::read_from(buf.as_slice())?;
//! assert_eq!(restored.name, "session");
//! # Ok::<(), profdata::FormatError>(())
//! ```

use rkyv::rancor;
use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize};
use std::io::{Read, Write};
use thiserror::Error;

/// Interned scope name. Globally unique within one process run, never
/// reused; not portable across runs.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[rkyv(compare(PartialEq), derive(Debug, Clone, Copy, PartialEq, Eq, Hash))]
pub struct Key(pub u32);

/// Interned generic payload string (category labels and the like).
#[derive(Archive, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[rkyv(compare(PartialEq), derive(Debug, Clone, Copy, PartialEq, Eq, Hash))]
pub struct StringId(pub u32);

/// Index into an object table. At capture time this points into the owning
/// group's raw-reference table; the resolution pass rewrites it to point into
/// the recording's resolved-object table.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[rkyv(compare(PartialEq), derive(Debug, Clone, Copy, PartialEq, Eq, Hash))]
pub struct ObjectRef(pub u32);

pub mod flags {
    /// Event carries memory counters in `mem_before`/`mem_after`.
    pub const MEMORY_TRACKED: u8 = 1 << 0;
    /// Instantaneous marker: `end_ticks == start_ticks` by construction.
    pub const SINGLE_POINT: u8 = 1 << 1;
}

/// Optional payload attached to an event. Non-object variants carry their
/// value inline; nothing here allocates.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[rkyv(compare(PartialEq), derive(Debug, Clone, Copy, PartialEq))]
pub enum ExtraValue {
    None,
    Object(ObjectRef),
    Long(i64),
    Double(f64),
    Float(f32),
    Category {
        label: StringId,
        object: Option<ObjectRef>,
    },
}

/// One span or instant. Fixed size; references interned keys rather than
/// strings. Invariant once closed: `end_ticks >= start_ticks`.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[rkyv(compare(PartialEq), derive(Debug, Clone, Copy, PartialEq))]
pub struct Event {
    pub name_key: Key,
    pub flags: u8,
    pub depth: u16,
    pub start_ticks: u64,
    pub end_ticks: u64,
    pub mem_before: i64,
    pub mem_after: i64,
    pub extra: ExtraValue,
}

impl Event {
    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    pub fn is_single_point(&self) -> bool {
        self.has_flag(flags::SINGLE_POINT)
    }

    pub fn duration_ticks(&self) -> u64 {
        self.end_ticks.saturating_sub(self.start_ticks)
    }
}

/// Serializable snapshot of a live object, produced by the resolution pass.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[rkyv(compare(PartialEq))]
pub struct ResolvedObject {
    pub type_name: String,
    pub display: String,
}

/// One group's slice of a recording: its events in allocation order plus the
/// frame boundaries and outlier markers expressed as event indices.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GroupRecording {
    pub name: String,
    pub events: Vec<Event>,
    pub frame_start_indices: Vec<u64>,
    pub frame_end_indices: Vec<u64>,
    pub outlier_frames: Vec<u64>,
}

/// Immutable aggregate of one completed capture session. Built at stop time;
/// never mutated afterward except by the resolution pass filling
/// lazily-resolved references before persistence.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Recording {
    pub name: String,
    pub started_unix_ns: u64,
    pub num_frames: u32,
    pub groups: Vec<GroupRecording>,
    pub event_names: Vec<String>,
    pub strings: Vec<String>,
    pub objects: Vec<ResolvedObject>,
}

pub const FORMAT_MAGIC: u32 = 0x5450_5246; // "TPRF"
pub const FORMAT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("archive error: {0}")]
    Archive(#[from] rancor::Error),
    #[error("not a recording file (magic {0:#010x})")]
    BadMagic(u32),
    #[error("unsupported recording version {0}, newest known is {FORMAT_VERSION}")]
    UnsupportedVersion(u32),
}

impl Recording {
    pub fn to_bytes(&self) -> Result<AlignedVec, rancor::Error> {
        rkyv::to_bytes::<rancor::Error>(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Recording, rancor::Error> {
        let archived = rkyv::access::<ArchivedRecording, rancor::Error>(bytes)?;
        rkyv::deserialize::<Recording, rancor::Error>(archived)
    }

    /// Write `magic, version, payload`. New format revisions append fields in
    /// trailing structs gated on `version`; readers of version N accept any
    /// version `<= N`.
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<(), FormatError> {
        let payload = self.to_bytes()?;
        writer.write_all(&FORMAT_MAGIC.to_le_bytes())?;
        writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
        writer.write_all(&payload)?;
        Ok(())
    }

    pub fn read_from<R: Read>(mut reader: R) -> Result<Recording, FormatError> {
        let mut word = [0u8; 4];
        reader.read_exact(&mut word)?;
        let magic = u32::from_le_bytes(word);
        if magic != FORMAT_MAGIC {
            return Err(FormatError::BadMagic(magic));
        }
        reader.read_exact(&mut word)?;
        let version = u32::from_le_bytes(word);
        if version == 0 || version > FORMAT_VERSION {
            return Err(FormatError::UnsupportedVersion(version));
        }

        let mut raw = Vec::new();
        reader.read_to_end(&mut raw)?;
        let mut payload = AlignedVec::<16>::new();
        payload.extend_from_slice(&raw);
        Ok(Recording::from_bytes(&payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[fixture]
    fn sample_event() -> Event {
        Event {
            name_key: Key(7),
            flags: flags::MEMORY_TRACKED,
            depth: 2,
            start_ticks: 1_000,
            end_ticks: 5_500,
            mem_before: 4096,
            mem_after: 8192,
            extra: ExtraValue::Long(-42),
        }
    }

    #[fixture]
    fn sample_recording(sample_event: Event) -> Recording {
        let marker = Event {
            name_key: Key(8),
            flags: flags::SINGLE_POINT,
            depth: 3,
            start_ticks: 2_000,
            end_ticks: 2_000,
            mem_before: 0,
            mem_after: 0,
            extra: ExtraValue::Category {
                label: StringId(0),
                object: Some(ObjectRef(0)),
            },
        };
        Recording {
            name: "tick capture".to_string(),
            started_unix_ns: 1_700_000_000_000_000_000,
            num_frames: 2,
            groups: vec![GroupRecording {
                name: "Main".to_string(),
                events: vec![sample_event, marker],
                frame_start_indices: vec![0, 1],
                frame_end_indices: vec![1, 2],
                outlier_frames: vec![1],
            }],
            event_names: vec!["<unused>".to_string(); 9],
            strings: vec!["Physics".to_string()],
            objects: vec![ResolvedObject {
                type_name: "Entity".to_string(),
                display: "player#1".to_string(),
            }],
        }
    }

    #[rstest]
    fn test_event_flags(sample_event: Event) {
        assert!(sample_event.has_flag(flags::MEMORY_TRACKED));
        assert!(!sample_event.is_single_point());
        assert_eq!(sample_event.duration_ticks(), 4_500);
    }

    #[rstest]
    fn test_event_roundtrip_is_bit_exact(sample_event: Event) {
        let bytes = rkyv::to_bytes::<rancor::Error>(&sample_event).unwrap();
        let archived = rkyv::access::<ArchivedEvent, rancor::Error>(&bytes).unwrap();

        assert_eq!(archived.name_key, sample_event.name_key);
        assert_eq!(archived.flags, sample_event.flags);
        assert_eq!(archived.depth.to_native(), sample_event.depth);
        assert_eq!(archived.start_ticks.to_native(), sample_event.start_ticks);
        assert_eq!(archived.end_ticks.to_native(), sample_event.end_ticks);

        let restored = rkyv::deserialize::<Event, rancor::Error>(archived).unwrap();
        assert_eq!(restored, sample_event);
    }

    #[rstest]
    #[case(ExtraValue::None)]
    #[case(ExtraValue::Object(ObjectRef(3)))]
    #[case(ExtraValue::Long(i64::MIN))]
    #[case(ExtraValue::Double(std::f64::consts::PI))]
    #[case(ExtraValue::Float(-0.5))]
    #[case(ExtraValue::Category { label: StringId(1), object: None })]
    fn test_extra_value_roundtrip(#[case] extra: ExtraValue) {
        let bytes = rkyv::to_bytes::<rancor::Error>(&extra).unwrap();
        let archived = rkyv::access::<ArchivedExtraValue, rancor::Error>(&bytes).unwrap();
        let restored = rkyv::deserialize::<ExtraValue, rancor::Error>(archived).unwrap();
        assert_eq!(restored, extra);
    }

    #[rstest]
    fn test_recording_roundtrip(sample_recording: Recording) {
        let bytes = sample_recording.to_bytes().unwrap();
        let restored = Recording::from_bytes(&bytes).unwrap();
        assert_eq!(restored, sample_recording);
    }

    #[rstest]
    fn test_file_roundtrip(sample_recording: Recording) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.tprf");

        let file = std::fs::File::create(&path).unwrap();
        sample_recording.write_to(file).unwrap();

        let file = std::fs::File::open(&path).unwrap();
        let restored = Recording::read_from(file).unwrap();

        assert_eq!(restored, sample_recording);
        assert_eq!(restored.groups[0].events.len(), 2);
        assert_eq!(restored.strings, sample_recording.strings);
        assert_eq!(restored.event_names, sample_recording.event_names);
    }

    #[rstest]
    fn test_rejects_bad_magic(sample_recording: Recording) {
        let mut buf = Vec::new();
        sample_recording.write_to(&mut buf).unwrap();
        buf[0] ^= 0xff;

        match Recording::read_from(buf.as_slice()) {
            Err(FormatError::BadMagic(_)) => {}
            other => panic!("expected BadMagic, got {:?}", other.map(|r| r.name)),
        }
    }

    #[rstest]
    fn test_rejects_future_version(sample_recording: Recording) {
        let mut buf = Vec::new();
        sample_recording.write_to(&mut buf).unwrap();
        buf[4..8].copy_from_slice(&(FORMAT_VERSION + 1).to_le_bytes());

        match Recording::read_from(buf.as_slice()) {
            Err(FormatError::UnsupportedVersion(v)) => assert_eq!(v, FORMAT_VERSION + 1),
            other => panic!("expected UnsupportedVersion, got {:?}", other.map(|r| r.name)),
        }
    }
}
