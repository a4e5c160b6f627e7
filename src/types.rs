// Shared types module - Wire-level types exchanged with the clock's JSON API

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// Operation tag carried by every JSON request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    ClockRead,
    ClockSet,
    SetupRead,
    SetupSet,
    WavList,
    TimeRead,
    TimeSet,
    FileList,
    DeleteFile,
}

impl RequestType {
    /// Tag from its wire name; unknown names give None
    pub fn parse(tag: &str) -> Option<Self> {
        serde_json::from_value(Value::String(tag.to_string())).ok()
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_value(self) {
            Ok(Value::String(tag)) => f.write_str(&tag),
            _ => Err(fmt::Error),
        }
    }
}

/// Request payload plus its transport tag.
///
/// The payload is borrowed and serialized flat next to `RequestType`, so the
/// document itself never carries the tag.
#[derive(Debug, Serialize)]
pub struct Envelope<'a, T: Serialize> {
    #[serde(flatten)]
    pub payload: &'a T,
    #[serde(rename = "RequestType")]
    pub request_type: RequestType,
}

impl<'a, T: Serialize> Envelope<'a, T> {
    pub fn new(request_type: RequestType, payload: &'a T) -> Self {
        Envelope { payload, request_type }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// Body for requests that carry nothing but the tag
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct NoPayload {}

pub const NO_PAYLOAD: NoPayload = NoPayload {};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeStamp {
    pub utctimestamp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileListRequest {
    pub filesystem: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteFileRequest {
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub filename: String,
    pub filesize: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectoryListing {
    #[serde(default)]
    pub directory: Vec<FileEntry>,
}

impl DirectoryListing {
    /// Entries ordered case-insensitively by file name
    pub fn sorted(&self) -> Vec<FileEntry> {
        let mut files = self.directory.clone();
        files.sort_by_key(|f| f.filename.to_lowercase());
        files
    }
}

// Acknowledgement returned by the network setup write
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Acknowledgement {
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Sample {
        brightness: u8,
        name: String,
    }

    #[test]
    fn test_envelope_flattens_payload_next_to_tag() {
        let sample = Sample { brightness: 4, name: "Esp32".to_string() };
        let json = Envelope::new(RequestType::ClockSet, &sample).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["RequestType"], "ClockSet");
        assert_eq!(value["brightness"], 4);
        assert_eq!(value["name"], "Esp32");
    }

    #[test]
    fn test_tag_only_request() {
        let json = Envelope::new(RequestType::WavList, &NO_PAYLOAD).to_json().unwrap();
        assert_eq!(json, r#"{"RequestType":"WavList"}"#);
    }

    #[test]
    fn test_request_type_names_round_trip() {
        for tag in ["ClockRead", "SetupSet", "WavList", "TimeSet", "DeleteFile"] {
            assert_eq!(RequestType::parse(tag).unwrap().to_string(), tag);
        }
        assert!(RequestType::parse("Reboot").is_none());
        assert_eq!(RequestType::SetupSet.to_string(), "SetupSet");
    }

    #[test]
    fn test_directory_sorted_ignores_case() {
        let listing: DirectoryListing = serde_json::from_str(
            r#"{"directory":[{"filename":"/www/clock.js","filesize":10},{"filename":"/www/Bird1.wav","filesize":2},{"filename":"/www/alarm.wav","filesize":3}]}"#,
        )
        .unwrap();
        let names: Vec<String> = listing.sorted().into_iter().map(|f| f.filename).collect();
        assert_eq!(names, vec!["/www/alarm.wav", "/www/Bird1.wav", "/www/clock.js"]);
    }
}
