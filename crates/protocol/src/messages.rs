use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ListFiles
// ---------------------------------------------------------------------------

/// Requests the names of the files in the server's storage directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListFilesRequest {}

/// File names in the storage directory (sub-directories excluded).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListFilesResponse {
    #[serde(default)]
    pub filenames: Vec<String>,
}

// ---------------------------------------------------------------------------
// Download
// ---------------------------------------------------------------------------

/// Requests a file from the storage directory by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub filename: String,
}

/// One chunk of a downloaded file.
///
/// The `data` field is base64-encoded in JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadChunk {
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Upload / UploadAndNotifyProgress
// ---------------------------------------------------------------------------

/// One chunk of an uploaded file.
///
/// The `data` field is base64-encoded in JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadChunk {
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

/// Final response of a plain upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSummary {
    pub size: u64,
}

/// Running-total acknowledgement, one per chunk received by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressAck {
    pub total_bytes: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl ProgressAck {
    /// Builds the acknowledgement for a new running total.
    pub fn received(total_bytes: u64) -> Self {
        Self {
            total_bytes,
            message: format!("received {total_bytes} bytes"),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Serde helper: serialize `Vec<u8>` as base64 string.
mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(data).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_chunk_is_base64_in_json() {
        let chunk = UploadChunk {
            data: b"hello".to_vec(),
        };
        let json = serde_json::to_string(&chunk).unwrap();
        assert_eq!(json, r#"{"data":"aGVsbG8="}"#);

        let parsed: UploadChunk = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, chunk);
    }

    #[test]
    fn download_chunk_rejects_invalid_base64() {
        let result: Result<DownloadChunk, _> = serde_json::from_str(r#"{"data":"!!!"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn progress_ack_uses_camel_case() {
        let ack = ProgressAck::received(10);
        let json = serde_json::to_string(&ack).unwrap();
        assert!(json.contains("\"totalBytes\":10"));
        assert!(json.contains("received 10 bytes"));
    }

    #[test]
    fn progress_ack_message_is_optional() {
        let ack: ProgressAck = serde_json::from_str(r#"{"totalBytes":12}"#).unwrap();
        assert_eq!(ack.total_bytes, 12);
        assert!(ack.message.is_empty());
    }

    #[test]
    fn list_files_response_defaults_to_empty() {
        let resp: ListFilesResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.filenames.is_empty());
    }
}
