//! In-process file service for exercising both ends of a transfer.

use std::sync::{Arc, Mutex};

use filestream_protocol::{DownloadRequest, Method, Status, UploadSummary};
use filestream_transport::{ServerCall, Service, ServiceFuture, serve_connection};
use tokio::io::DuplexStream;
use tokio_util::sync::CancellationToken;

use crate::{TransferConfig, UploadAccumulator, collect_upload, serve_download};

/// Stores uploads in memory and serves downloads from a fixed payload.
#[derive(Default)]
pub(crate) struct MemoryService {
    pub stored: Arc<Mutex<Vec<u8>>>,
    pub download: Vec<u8>,
    pub config: TransferConfig,
}

impl Service for MemoryService {
    fn call<'a>(&'a self, call: &'a mut ServerCall) -> ServiceFuture<'a> {
        Box::pin(async move {
            match call.method() {
                Method::UploadAndNotifyProgress => {
                    let (reader, writer) = call.streams();
                    let mut acc = UploadAccumulator::new(Vec::new());
                    acc.run(reader, writer)
                        .await
                        .map_err(|e| Status::aborted(e.to_string()))?;
                    *self.stored.lock().unwrap() = acc.into_inner();
                    Ok(())
                }
                Method::Upload => {
                    let mut buf = Vec::new();
                    let report = collect_upload(call.reader(), &mut buf)
                        .await
                        .map_err(|e| Status::aborted(e.to_string()))?;
                    *self.stored.lock().unwrap() = buf;
                    call.writer()
                        .send_message(&UploadSummary {
                            size: report.total_bytes,
                        })
                        .await
                        .map_err(|e| Status::aborted(e.to_string()))
                }
                Method::Download => {
                    let req: DownloadRequest = call.request().await?;
                    if req.filename != "payload.bin" {
                        return Err(Status::not_found(req.filename));
                    }
                    serve_download(
                        &self.download[..],
                        call.writer(),
                        &self.config,
                        &CancellationToken::new(),
                    )
                    .await
                    .map(|_| ())
                    .map_err(|e| Status::aborted(e.to_string()))
                }
                other => Err(Status::unimplemented(format!("{other} not supported"))),
            }
        })
    }
}

/// Serves one call of `service` on a duplex pipe; returns the client end.
pub(crate) fn spawn_service(service: Arc<MemoryService>) -> DuplexStream {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let (reader, writer) = tokio::io::split(server);
    tokio::spawn(async move {
        let _ = serve_connection(
            service,
            Box::new(reader),
            Box::new(writer),
            "duplex".into(),
            CancellationToken::new(),
        )
        .await;
    });
    client
}
