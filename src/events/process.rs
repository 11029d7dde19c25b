//! Process creation events and their fixed-size record layout.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::types::{Error, ProcessId, Result};

/// Capacity of the image name field, in UTF-16 code units.
pub const MAX_IMAGE_NAME_UNITS: usize = 260;

/// Executable path of a created process, bounded to [`MAX_IMAGE_NAME_UNITS`]
/// UTF-16 code units.
///
/// Longer inputs are truncated at the bound, never rejected. Truncation counts
/// code units, so a surrogate pair straddling the bound is cut in half;
/// [`ImageName::to_string_lossy`] renders the dangling half as U+FFFD.
///
/// NUL units are kept in memory, but the record layout is NUL-terminated:
/// after [`ProcessEvent::to_record`] and back, the name ends at its first NUL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ImageName {
    units: Vec<u16>,
}

impl ImageName {
    /// Build from UTF-16 code units, keeping at most the first 260.
    pub fn from_utf16(units: &[u16]) -> Self {
        let len = units.len().min(MAX_IMAGE_NAME_UNITS);
        Self {
            units: units[..len].to_vec(),
        }
    }

    /// Build from a path string, keeping at most the first 260 code units.
    ///
    /// Only the retained prefix is encoded, so the cost is bounded regardless
    /// of the input length.
    pub fn from_path(path: &str) -> Self {
        Self {
            units: path.encode_utf16().take(MAX_IMAGE_NAME_UNITS).collect(),
        }
    }

    pub fn as_utf16(&self) -> &[u16] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf16_lossy(&self.units)
    }
}

impl From<&str> for ImageName {
    fn from(path: &str) -> Self {
        Self::from_path(path)
    }
}

impl fmt::Display for ImageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl Serialize for ImageName {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string_lossy())
    }
}

impl<'de> Deserialize<'de> for ImageName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let path = String::deserialize(deserializer)?;
        Ok(Self::from_path(&path))
    }
}

/// One process creation, produced by the event source adapter and consumed
/// exactly once by whichever waiter is registered at delivery time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessEvent {
    pub process_id: ProcessId,
    pub parent_process_id: ProcessId,
    pub image_name: ImageName,
}

impl ProcessEvent {
    pub fn new(
        process_id: impl Into<ProcessId>,
        parent_process_id: impl Into<ProcessId>,
        image_name: ImageName,
    ) -> Self {
        Self {
            process_id: process_id.into(),
            parent_process_id: parent_process_id.into(),
            image_name,
        }
    }

    /// Copy into the fixed-size record layout.
    pub fn to_record(&self) -> ProcessEventRecord {
        let mut image_name = [0u16; MAX_IMAGE_NAME_UNITS];
        let units = self.image_name.as_utf16();
        image_name[..units.len()].copy_from_slice(units);
        ProcessEventRecord {
            process_id: self.process_id.as_raw(),
            parent_process_id: self.parent_process_id.as_raw(),
            image_name,
        }
    }
}

/// Fixed-size layout handed across a marshalling boundary.
///
/// ```text
/// ┌────────────┬───────────────────┬──────────────────────────┐
/// │ pid u64 LE │ parent pid u64 LE │ image name [u16; 260] LE │
/// └────────────┴───────────────────┴──────────────────────────┘
/// ```
/// The name is zero-filled past its length. A name of exactly 260 units
/// carries no terminator. A name with an embedded NUL reads back truncated
/// at that NUL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct ProcessEventRecord {
    pub process_id: u64,
    pub parent_process_id: u64,
    pub image_name: [u16; MAX_IMAGE_NAME_UNITS],
}

impl ProcessEventRecord {
    pub const SIZE: usize = 8 + 8 + 2 * MAX_IMAGE_NAME_UNITS;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        out.extend_from_slice(&self.process_id.to_le_bytes());
        out.extend_from_slice(&self.parent_process_id.to_le_bytes());
        for unit in &self.image_name {
            out.extend_from_slice(&unit.to_le_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::SIZE {
            return Err(Error::validation(format!(
                "process event record must be {} bytes, got {}",
                Self::SIZE,
                bytes.len()
            )));
        }

        let mut word = [0u8; 8];
        word.copy_from_slice(&bytes[0..8]);
        let process_id = u64::from_le_bytes(word);
        word.copy_from_slice(&bytes[8..16]);
        let parent_process_id = u64::from_le_bytes(word);

        let mut image_name = [0u16; MAX_IMAGE_NAME_UNITS];
        for (unit, pair) in image_name.iter_mut().zip(bytes[16..].chunks_exact(2)) {
            *unit = u16::from_le_bytes([pair[0], pair[1]]);
        }

        Ok(Self {
            process_id,
            parent_process_id,
            image_name,
        })
    }

    /// Units up to the first NUL, or all 260. Anything after an embedded NUL
    /// is not recoverable.
    pub fn image_name_units(&self) -> &[u16] {
        let len = self
            .image_name
            .iter()
            .position(|&u| u == 0)
            .unwrap_or(MAX_IMAGE_NAME_UNITS);
        &self.image_name[..len]
    }

    pub fn to_event(&self) -> ProcessEvent {
        ProcessEvent {
            process_id: ProcessId::new(self.process_id),
            parent_process_id: ProcessId::new(self.parent_process_id),
            image_name: ImageName::from_utf16(self.image_name_units()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_short_path_kept_whole() {
        let name = ImageName::from_path(r"C:\app.exe");
        assert_eq!(name.len(), 10);
        assert_eq!(name.to_string_lossy(), r"C:\app.exe");
    }

    #[test]
    fn test_300_unit_path_truncated_to_prefix() {
        let source: String = (0..300).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let name = ImageName::from_path(&source);

        assert_eq!(name.len(), MAX_IMAGE_NAME_UNITS);
        let expected: Vec<u16> = source.encode_utf16().take(MAX_IMAGE_NAME_UNITS).collect();
        assert_eq!(name.as_utf16(), expected.as_slice());
    }

    #[test]
    fn test_truncation_counts_code_units_not_chars() {
        // U+1F600 is two UTF-16 units; 131 of them is 262 units.
        let source = "\u{1F600}".repeat(131);
        let name = ImageName::from_path(&source);
        assert_eq!(name.len(), MAX_IMAGE_NAME_UNITS);
        assert_eq!(name.to_string_lossy(), "\u{1F600}".repeat(130));
    }

    #[test]
    fn test_empty_image_name() {
        let name = ImageName::default();
        assert!(name.is_empty());
        assert_eq!(name.to_string(), "");
    }

    #[test]
    fn test_event_serializes_image_name_as_string() {
        let event = ProcessEvent::new(1234u64, 1u64, ImageName::from_path(r"C:\app.exe"));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "process_id": 1234,
                "parent_process_id": 1,
                "image_name": r"C:\app.exe",
            })
        );
    }

    #[test]
    fn test_record_layout_and_back() {
        let event = ProcessEvent::new(0x0102_0304u64, 7u64, ImageName::from_path("ab"));
        let bytes = event.to_record().to_bytes();

        assert_eq!(bytes.len(), ProcessEventRecord::SIZE);
        assert_eq!(&bytes[0..8], &0x0102_0304u64.to_le_bytes());
        assert_eq!(&bytes[8..16], &7u64.to_le_bytes());
        assert_eq!(&bytes[16..20], &[b'a', 0, b'b', 0]);
        assert!(bytes[20..].iter().all(|&b| b == 0));

        let decoded = ProcessEventRecord::from_bytes(&bytes).unwrap().to_event();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_full_record_has_no_terminator() {
        let event = ProcessEvent::new(1u64, 0u64, ImageName::from_path(&"x".repeat(400)));
        let record = event.to_record();
        assert_eq!(record.image_name_units().len(), MAX_IMAGE_NAME_UNITS);
    }

    #[test]
    fn test_embedded_nul_ends_name_in_record() {
        let units: Vec<u16> = "svc\0host.exe".encode_utf16().collect();
        let event = ProcessEvent::new(3u64, 1u64, ImageName::from_utf16(&units));
        assert_eq!(event.image_name.len(), 12);

        let back = ProcessEventRecord::from_bytes(&event.to_record().to_bytes())
            .unwrap()
            .to_event();
        assert_eq!(back.image_name.to_string_lossy(), "svc");
        assert_eq!(back.process_id, event.process_id);
    }

    #[test]
    fn test_record_rejects_wrong_size() {
        let err = ProcessEventRecord::from_bytes(&[0u8; 12]).unwrap_err();
        assert!(err.to_string().contains("536"));
    }
}
