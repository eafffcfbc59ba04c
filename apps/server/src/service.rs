//! The file service: storage-backed handlers for every method.

use std::path::PathBuf;

use filestream_file_ops::{FileOpsError, create_upload_file, list_entries, open_for_read};
use filestream_protocol::{
    DownloadRequest, ListFilesRequest, ListFilesResponse, Method, Status, UploadSummary,
};
use filestream_transfer::{
    TransferConfig, TransferError, UploadAccumulator, collect_upload, serve_download,
};
use filestream_transport::{ServerCall, Service, ServiceFuture, TransportError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Serves `ListFiles`, `Download`, `Upload` and `UploadAndNotifyProgress`
/// from one storage directory.
pub struct FileService {
    storage: PathBuf,
    transfer: TransferConfig,
    cancel: CancellationToken,
}

impl FileService {
    pub fn new(storage: PathBuf, transfer: TransferConfig, cancel: CancellationToken) -> Self {
        Self {
            storage,
            transfer,
            cancel,
        }
    }

    async fn list_files(&self, call: &mut ServerCall) -> Result<(), Status> {
        let _req: ListFilesRequest = call.request().await?;
        info!("ListFiles was invoked");

        let filenames = list_entries(&self.storage).await.map_err(file_status)?;
        call.writer()
            .send_message(&ListFilesResponse { filenames })
            .await
            .map_err(transport_status)
    }

    async fn download(&self, call: &mut ServerCall) -> Result<(), Status> {
        let req: DownloadRequest = call.request().await?;
        info!(filename = %req.filename, "Download was invoked");

        let file = open_for_read(&self.storage, &req.filename)
            .await
            .map_err(file_status)?;
        serve_download(file, call.writer(), &self.transfer, &self.cancel)
            .await
            .map_err(transfer_status)?;
        Ok(())
    }

    async fn upload(&self, call: &mut ServerCall) -> Result<(), Status> {
        info!(peer = %call.peer(), "Upload was invoked");

        let (path, mut file) = create_upload_file(&self.storage)
            .await
            .map_err(file_status)?;
        let partial = PartialUpload::new(path);
        let report = collect_upload(call.reader(), &mut file)
            .await
            .map_err(transfer_status)?;
        drop(file);

        let path = partial.commit();
        info!(path = %path.display(), size = report.total_bytes, "upload stored");
        call.writer()
            .send_message(&UploadSummary {
                size: report.total_bytes,
            })
            .await
            .map_err(transport_status)
    }

    async fn upload_with_progress(&self, call: &mut ServerCall) -> Result<(), Status> {
        info!(peer = %call.peer(), "UploadAndNotifyProgress was invoked");

        let (path, file) = create_upload_file(&self.storage)
            .await
            .map_err(file_status)?;
        let partial = PartialUpload::new(path);
        let (reader, writer) = call.streams();
        let mut acc = UploadAccumulator::new(file);
        let report = acc.run(reader, writer).await.map_err(transfer_status)?;
        drop(acc);

        let path = partial.commit();
        info!(path = %path.display(), size = report.total_bytes, "upload stored");
        Ok(())
    }
}

impl Service for FileService {
    fn call<'a>(&'a self, call: &'a mut ServerCall) -> ServiceFuture<'a> {
        Box::pin(async move {
            match call.method() {
                Method::ListFiles => self.list_files(call).await,
                Method::Download => self.download(call).await,
                Method::Upload => self.upload(call).await,
                Method::UploadAndNotifyProgress => self.upload_with_progress(call).await,
                Method::Unknown => Err(Status::unimplemented("unknown method")),
            }
        })
    }
}

/// Upload target that is removed on drop unless committed.
///
/// Covers every way an upload handler can end early: an error return, or the
/// handler future being dropped when the server shuts down.
struct PartialUpload {
    path: Option<PathBuf>,
}

impl PartialUpload {
    fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    /// Keeps the file and hands back its path.
    fn commit(mut self) -> PathBuf {
        self.path.take().unwrap_or_default()
    }
}

impl Drop for PartialUpload {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        match std::fs::remove_file(&path) {
            Ok(()) => debug!(path = %path.display(), "partial upload removed"),
            Err(e) => warn!(path = %path.display(), "failed to remove partial upload: {e}"),
        }
    }
}

fn file_status(e: FileOpsError) -> Status {
    match e {
        FileOpsError::NotFound(name) => Status::not_found(name),
        FileOpsError::InvalidPath(msg) => Status::invalid_argument(msg),
        other => Status::internal(other.to_string()),
    }
}

fn transport_status(e: TransportError) -> Status {
    match e {
        TransportError::Status(status) => status,
        other => Status::aborted(other.to_string()),
    }
}

fn transfer_status(e: TransferError) -> Status {
    match e {
        TransferError::Io(e) => Status::internal(e.to_string()),
        TransferError::Transport(e) => transport_status(e),
        TransferError::ProtocolViolation(msg) => Status::invalid_argument(msg),
        TransferError::Cancelled => Status::aborted("transfer cancelled"),
        TransferError::TaskFailed(msg) => Status::internal(msg),
    }
}
