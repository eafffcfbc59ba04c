//! Server side of an upload: reassembles chunks and acknowledges them.

use filestream_protocol::{ProgressAck, UploadChunk};
use filestream_transport::{MessageSink, MessageSource};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, trace};

use crate::TransferError;

/// Lifecycle of an [`UploadAccumulator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorState {
    /// Waiting for the next chunk.
    Receiving,
    /// A chunk was counted; its ack is being sent.
    Acknowledging,
    /// The client ended its direction; flushing the output.
    Closing,
    /// Done, successfully or not.
    Terminal,
}

/// What an upload delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub total_bytes: u64,
    pub chunks: u64,
}

/// Reassembles one upload, one chunk at a time.
///
/// Each chunk is written to the output and counted before its ack goes
/// out, so an ack never reports bytes that were not received.
pub struct UploadAccumulator<W> {
    out: W,
    state: AccumulatorState,
    report: UploadReport,
}

impl<W: AsyncWrite + Unpin + Send> UploadAccumulator<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            state: AccumulatorState::Receiving,
            report: UploadReport::default(),
        }
    }

    pub fn state(&self) -> AccumulatorState {
        self.state
    }

    /// Bytes and chunks accepted so far.
    pub fn report(&self) -> UploadReport {
        self.report
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Runs the upload until the client's end-of-stream.
    ///
    /// Returns once the inbound direction ended cleanly; closing the
    /// outbound direction is left to the caller (the RPC runtime).
    pub async fn run<S, A>(
        &mut self,
        source: &mut S,
        acks: &mut A,
    ) -> Result<UploadReport, TransferError>
    where
        S: MessageSource<UploadChunk> + ?Sized,
        A: MessageSink<ProgressAck> + ?Sized,
    {
        let result = self.drive(source, acks).await;
        self.state = AccumulatorState::Terminal;
        match &result {
            Ok(report) => info!(
                total_bytes = report.total_bytes,
                chunks = report.chunks,
                "upload received"
            ),
            Err(e) => debug!(total_bytes = self.report.total_bytes, "upload aborted: {e}"),
        }
        result
    }

    async fn drive<S, A>(&mut self, source: &mut S, acks: &mut A) -> Result<UploadReport, TransferError>
    where
        S: MessageSource<UploadChunk> + ?Sized,
        A: MessageSink<ProgressAck> + ?Sized,
    {
        loop {
            self.state = AccumulatorState::Receiving;
            let Some(chunk) = source.recv().await? else {
                break;
            };

            self.accept(&chunk.data).await?;

            self.state = AccumulatorState::Acknowledging;
            acks.send(ProgressAck::received(self.report.total_bytes))
                .await?;
        }

        self.state = AccumulatorState::Closing;
        self.out.flush().await?;
        Ok(self.report)
    }

    async fn accept(&mut self, data: &[u8]) -> Result<(), TransferError> {
        self.out.write_all(data).await?;
        self.report.total_bytes += data.len() as u64;
        self.report.chunks += 1;
        trace!(
            seq = self.report.chunks,
            len = data.len(),
            total_bytes = self.report.total_bytes,
            "chunk received"
        );
        Ok(())
    }
}

/// Reassembles an upload without per-chunk acknowledgements.
///
/// The caller answers with a single summary once this returns.
pub async fn collect_upload<S, W>(source: &mut S, out: &mut W) -> Result<UploadReport, TransferError>
where
    S: MessageSource<UploadChunk> + ?Sized,
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    let mut report = UploadReport::default();
    while let Some(chunk) = source.recv().await? {
        out.write_all(&chunk.data).await?;
        report.total_bytes += chunk.data.len() as u64;
        report.chunks += 1;
        trace!(seq = report.chunks, len = chunk.data.len(), "chunk received");
    }
    out.flush().await?;
    info!(total_bytes = report.total_bytes, chunks = report.chunks, "upload received");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Arc;

    use filestream_protocol::Method;
    use filestream_transport::{TransportError, TransportFuture, start_call};
    use proptest::prelude::*;

    use crate::testing::{MemoryService, spawn_service};
    use crate::{TransferConfig, TransferCoordinator};

    struct Chunks(VecDeque<Result<Option<UploadChunk>, TransportError>>);

    impl Chunks {
        fn of(parts: &[&[u8]]) -> Self {
            let mut script: VecDeque<_> = parts
                .iter()
                .map(|p| Ok(Some(UploadChunk { data: p.to_vec() })))
                .collect();
            script.push_back(Ok(None));
            Self(script)
        }
    }

    impl MessageSource<UploadChunk> for Chunks {
        fn recv(&mut self) -> TransportFuture<'_, Option<UploadChunk>> {
            let next = self.0.pop_front().unwrap_or(Ok(None));
            Box::pin(async move { next })
        }
    }

    #[derive(Default)]
    struct Acks {
        totals: Vec<u64>,
        messages: Vec<String>,
        fail: bool,
    }

    impl MessageSink<ProgressAck> for Acks {
        fn send(&mut self, msg: ProgressAck) -> TransportFuture<'_, ()> {
            Box::pin(async move {
                if self.fail {
                    return Err(TransportError::ConnectionLost);
                }
                self.totals.push(msg.total_bytes);
                self.messages.push(msg.message);
                Ok(())
            })
        }

        fn half_close(&mut self) -> TransportFuture<'_, ()> {
            Box::pin(async { Ok::<_, TransportError>(()) })
        }
    }

    #[tokio::test]
    async fn acknowledges_running_total_per_chunk() {
        let mut source = Chunks::of(&[b"hello", b" worl", b"d!"]);
        let mut acks = Acks::default();
        let mut acc = UploadAccumulator::new(Vec::new());

        let report = acc.run(&mut source, &mut acks).await.unwrap();

        assert_eq!(report, UploadReport { total_bytes: 12, chunks: 3 });
        assert_eq!(acks.totals, vec![5, 10, 12]);
        assert_eq!(acks.messages[2], "received 12 bytes");
        assert_eq!(acc.state(), AccumulatorState::Terminal);
        assert_eq!(acc.into_inner(), b"hello world!");
    }

    #[tokio::test]
    async fn empty_upload_sends_no_acks() {
        let mut source = Chunks::of(&[]);
        let mut acks = Acks::default();
        let mut acc = UploadAccumulator::new(Vec::new());

        let report = acc.run(&mut source, &mut acks).await.unwrap();
        assert_eq!(report, UploadReport::default());
        assert!(acks.totals.is_empty());
    }

    #[tokio::test]
    async fn ack_failure_is_fatal() {
        let mut source = Chunks::of(&[b"hello", b" worl"]);
        let mut acks = Acks {
            fail: true,
            ..Default::default()
        };
        let mut acc = UploadAccumulator::new(Vec::new());

        let result = acc.run(&mut source, &mut acks).await;
        assert!(matches!(result, Err(TransferError::Transport(_))));
        assert_eq!(acc.state(), AccumulatorState::Terminal);
        // The chunk was counted before the ack was attempted.
        assert_eq!(acc.report().total_bytes, 5);
    }

    #[tokio::test]
    async fn severed_stream_is_fatal() {
        let mut source = Chunks(VecDeque::from([
            Ok(Some(UploadChunk {
                data: b"hello".to_vec(),
            })),
            Err(TransportError::ConnectionLost),
        ]));
        let mut acks = Acks::default();
        let mut acc = UploadAccumulator::new(Vec::new());

        let result = acc.run(&mut source, &mut acks).await;
        assert!(matches!(
            result,
            Err(TransferError::Transport(TransportError::ConnectionLost))
        ));
        assert_eq!(acks.totals, vec![5]);
    }

    #[tokio::test]
    async fn writes_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.bin");
        let file = tokio::fs::File::create(&path).await.unwrap();

        let mut source = Chunks::of(&[b"abc", b"def"]);
        let mut acc = UploadAccumulator::new(file);
        acc.run(&mut source, &mut Acks::default()).await.unwrap();
        drop(acc);

        assert_eq!(std::fs::read(&path).unwrap(), b"abcdef");
    }

    #[tokio::test]
    async fn collect_upload_reassembles_without_acks() {
        let mut source = Chunks::of(&[b"hello", b" worl", b"d!"]);
        let mut out = Vec::new();
        let report = collect_upload(&mut source, &mut out).await.unwrap();

        assert_eq!(report.total_bytes, 12);
        assert_eq!(report.chunks, 3);
        assert_eq!(out, b"hello world!");
    }

    async fn round_trip(data: Vec<u8>, chunk_size: usize) -> (Vec<u8>, Vec<u64>) {
        let service = Arc::new(MemoryService::default());
        let client = spawn_service(Arc::clone(&service));
        let (sink, stream) = start_call(client, Method::UploadAndNotifyProgress)
            .await
            .unwrap();

        let acks = Arc::new(std::sync::Mutex::new(Vec::new()));
        let observer = {
            let acks = Arc::clone(&acks);
            move |ack: &ProgressAck| acks.lock().unwrap().push(ack.total_bytes)
        };
        TransferCoordinator::new(TransferConfig::new(chunk_size))
            .run(std::io::Cursor::new(data), sink, stream, observer)
            .await
            .unwrap();

        let stored = service.stored.lock().unwrap().clone();
        let acks = acks.lock().unwrap().clone();
        (stored, acks)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn reassembly_matches_source(
            data in proptest::collection::vec(any::<u8>(), 0..512),
            chunk_size in 1usize..64,
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let (stored, acks) = rt.block_on(round_trip(data.clone(), chunk_size));

            prop_assert_eq!(&stored, &data);
            prop_assert_eq!(acks.len(), data.len().div_ceil(chunk_size));
            prop_assert!(acks.windows(2).all(|w| w[0] <= w[1]));
            prop_assert_eq!(acks.last().copied().unwrap_or(0), data.len() as u64);
        }
    }
}
