// Device Module - Typed operations on top of a clock transport
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};

use crate::binding::BindingError;
use crate::dropdown::ReferenceList;
use crate::settings::SettingsDocument;
use crate::transport::{Transport, TransportError};
use crate::types::{
    Acknowledgement, DeleteFileRequest, DirectoryListing, Envelope, FileEntry, FileListRequest,
    RequestType, TimeStamp, NO_PAYLOAD,
};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("malformed device response: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error(transparent)]
    Binding(#[from] BindingError),
    #[error("no document loaded yet")]
    NotLoaded,
    #[error("'{0}' has no file name to upload under")]
    InvalidFileName(String),
}

/// Last path component, accepting both separator styles
pub fn device_file_name(path: &str) -> Option<&str> {
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Write answers are either a `{ message }` object or free text
pub fn acknowledgement(raw: &str) -> Acknowledgement {
    serde_json::from_str(raw).unwrap_or_else(|_| Acknowledgement {
        message: raw.trim().to_string(),
    })
}

#[derive(Debug, Clone)]
pub struct DeviceClient<T: Transport> {
    transport: T,
}

impl<T: Transport> DeviceClient<T> {
    pub fn new(transport: T) -> Self {
        DeviceClient { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send an already serialized request body
    pub async fn send(&self, request_type: RequestType, body: String) -> Result<String, SyncError> {
        debug!(request = %request_type, "device request");
        self.transport.call(body).await.map_err(|e| {
            error!(request = %request_type, error = %e, "device request failed");
            SyncError::Transport(e)
        })
    }

    async fn request<P: Serialize>(&self, request_type: RequestType, payload: &P) -> Result<String, SyncError> {
        let body = Envelope::new(request_type, payload).to_json()?;
        self.send(request_type, body).await
    }

    pub async fn read_settings<D: SettingsDocument>(&self) -> Result<D, SyncError> {
        let raw = self.request(D::READ, &NO_PAYLOAD).await?;
        Ok(D::load(&raw)?)
    }

    pub async fn write_settings<D: SettingsDocument>(&self, document: &D) -> Result<Acknowledgement, SyncError> {
        let raw = self.request(D::WRITE, document).await?;
        Ok(acknowledgement(&raw))
    }

    pub async fn read_reference_list(&self) -> Result<ReferenceList, SyncError> {
        let raw = self.request(RequestType::WavList, &NO_PAYLOAD).await?;
        Ok(ReferenceList::from_response(&raw)?)
    }

    /// Device clock as UTC epoch seconds
    pub async fn read_time(&self) -> Result<i64, SyncError> {
        let raw = self.request(RequestType::TimeRead, &NO_PAYLOAD).await?;
        let stamp: TimeStamp = serde_json::from_str(&raw)?;
        Ok(stamp.utctimestamp)
    }

    pub async fn set_time(&self, utctimestamp: i64) -> Result<(), SyncError> {
        self.request(RequestType::TimeSet, &TimeStamp { utctimestamp }).await?;
        Ok(())
    }

    pub async fn list_files(&self, filesystem: &str) -> Result<Vec<FileEntry>, SyncError> {
        let request = FileListRequest {
            filesystem: filesystem.to_string(),
        };
        let raw = self.request(RequestType::FileList, &request).await?;
        let listing: DirectoryListing = serde_json::from_str(&raw)?;
        Ok(listing.sorted())
    }

    pub async fn delete_file(&self, filename: &str) -> Result<(), SyncError> {
        let request = DeleteFileRequest {
            filename: filename.to_string(),
        };
        self.request(RequestType::DeleteFile, &request).await?;
        Ok(())
    }

    /// Upload under the last component of `local_path`. Returns the device file name.
    pub async fn upload_file(&self, local_path: &str, bytes: Vec<u8>) -> Result<String, SyncError> {
        let name = device_file_name(local_path)
            .ok_or_else(|| SyncError::InvalidFileName(local_path.to_string()))?
            .to_string();
        debug!(file = %name, bytes = bytes.len(), "uploading");
        self.transport.upload(&name, bytes).await.map_err(|e| {
            error!(file = %name, error = %e, "upload failed");
            SyncError::Transport(e)
        })?;
        Ok(name)
    }
}
