use presence_core::{BatchReport, Clock, Detection, EmbeddingProvider, ProviderError, SessionError};
use presence_store::{AttendanceService, ServiceError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// How long shutdown waits for a `detect()` call that is still running.
const RELEASE_GRACE: Duration = Duration::from_millis(500);

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to start provider thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("poller task failed: {0}")]
    TaskFailed(String),
}

/// Outcome of one polling pass, published to the event channel.
#[derive(Debug)]
pub enum PollEvent {
    Report(BatchReport),
    NothingDetected,
    NoFacesRegistered,
    Failed(String),
}

/// Handle to a running poller.
pub struct PollerHandle<C: Clock> {
    cancel: Option<oneshot::Sender<()>>,
    task: JoinHandle<AttendanceService<C>>,
}

impl<C: Clock + 'static> PollerHandle<C> {
    /// Stop polling and return the service.
    ///
    /// An idle provider is dropped before this returns. A provider stuck in
    /// `detect()` (e.g. waiting on an idle pipe) gets [`RELEASE_GRACE`] to
    /// finish; after that it is abandoned and dropped whenever its call
    /// returns.
    pub async fn cancel(mut self) -> Result<AttendanceService<C>, EngineError> {
        if let Some(tx) = self.cancel.take() {
            let _ = tx.send(());
        }
        self.task
            .await
            .map_err(|e| EngineError::TaskFailed(e.to_string()))
    }
}

/// Provider running on its own OS thread, one `detect()` per request.
struct ProviderWorker {
    requests: mpsc::Sender<()>,
    results: mpsc::Receiver<Result<Vec<Detection>, ProviderError>>,
    released: oneshot::Receiver<()>,
}

impl ProviderWorker {
    fn spawn<P: EmbeddingProvider + 'static>(mut provider: P) -> std::io::Result<Self> {
        let (requests, mut request_rx) = mpsc::channel::<()>(1);
        let (result_tx, results) = mpsc::channel(1);
        let (released_tx, released) = oneshot::channel();

        std::thread::Builder::new()
            .name("presence-provider".into())
            .spawn(move || {
                tracing::debug!("provider thread started");
                while request_rx.blocking_recv().is_some() {
                    if result_tx.blocking_send(provider.detect()).is_err() {
                        break;
                    }
                }
                drop(provider);
                tracing::debug!("provider released");
                let _ = released_tx.send(());
            })?;

        Ok(Self {
            requests,
            results,
            released,
        })
    }

    /// Stop issuing requests and wait for the provider to be dropped.
    async fn shutdown(self, in_flight: bool) {
        let Self {
            requests, released, ..
        } = self;
        drop(requests);
        if !in_flight {
            let _ = released.await;
            return;
        }
        if tokio::time::timeout(RELEASE_GRACE, released).await.is_err() {
            tracing::warn!("provider still blocked in detect; abandoning it");
        }
    }
}

/// Spawn the attendance poller.
///
/// Every `period` one frame's detections are pulled from `provider`, which
/// runs on a dedicated thread, and run through `mark_attendance`. Missed
/// ticks are skipped rather than bursted. Dropping the handle without
/// calling `cancel` also stops the poller.
pub fn spawn_poller<P, C>(
    mut service: AttendanceService<C>,
    provider: P,
    period: Duration,
) -> Result<(PollerHandle<C>, mpsc::Receiver<PollEvent>), EngineError>
where
    P: EmbeddingProvider + 'static,
    C: Clock + 'static,
{
    let mut worker = ProviderWorker::spawn(provider)?;
    let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
    let (event_tx, event_rx) = mpsc::channel::<PollEvent>(16);

    let task = tokio::spawn(async move {
        tracing::info!(period_ms = period.as_millis() as u64, "poller started");
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight = false;

        loop {
            tokio::select! {
                biased;
                _ = &mut cancel_rx => break,
                _ = ticker.tick() => {}
            }

            if worker.requests.send(()).await.is_err() {
                tracing::error!("provider thread exited; stopping poller");
                break;
            }
            in_flight = true;
            let detected = tokio::select! {
                biased;
                _ = &mut cancel_rx => break,
                reply = worker.results.recv() => match reply {
                    Some(detected) => detected,
                    None => {
                        tracing::error!("provider thread exited; stopping poller");
                        break;
                    }
                },
            };
            in_flight = false;

            let event = match detected {
                Ok(detections) => classify(service.mark_attendance(&detections)),
                Err(e) => {
                    tracing::warn!(error = %e, "embedding provider failed");
                    PollEvent::Failed(e.to_string())
                }
            };

            tokio::select! {
                biased;
                _ = &mut cancel_rx => break,
                sent = event_tx.send(event) => {
                    if sent.is_err() {
                        tracing::debug!("event receiver dropped; stopping poller");
                        break;
                    }
                }
            }
        }

        worker.shutdown(in_flight).await;
        tracing::info!("poller stopped");
        service
    });

    Ok((
        PollerHandle {
            cancel: Some(cancel_tx),
            task,
        },
        event_rx,
    ))
}

fn classify(result: Result<BatchReport, ServiceError>) -> PollEvent {
    match result {
        Ok(report) => PollEvent::Report(report),
        Err(ServiceError::Session(SessionError::NoFaceDetected)) => PollEvent::NothingDetected,
        Err(ServiceError::NoFacesRegistered) => PollEvent::NoFacesRegistered,
        Err(e) => {
            tracing::error!(error = %e, "attendance pass failed");
            PollEvent::Failed(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use presence_core::{
        BoundingBox, Detection, Embedding, ManualClock, Outcome, ProviderError, EMBEDDING_DIM,
    };
    use presence_store::MemoryStore;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct ScriptedProvider {
        frames: VecDeque<Result<Vec<Detection>, ProviderError>>,
        dropped: Arc<AtomicBool>,
    }

    impl EmbeddingProvider for ScriptedProvider {
        fn detect(&mut self) -> Result<Vec<Detection>, ProviderError> {
            self.frames.pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    impl Drop for ScriptedProvider {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    fn embedding(head: f32) -> Embedding {
        let mut values = vec![0.0; EMBEDDING_DIM];
        values[0] = head;
        Embedding::new(values).unwrap()
    }

    fn detection(head: f32) -> Detection {
        Detection {
            bounding_box: BoundingBox::default(),
            embedding: embedding(head),
        }
    }

    fn service() -> AttendanceService<ManualClock> {
        let service =
            AttendanceService::with_clock(Arc::new(MemoryStore::new()), ManualClock::default())
                .unwrap();
        service.register("E1", "Alice", embedding(0.0)).unwrap();
        service
    }

    #[tokio::test]
    async fn test_poller_publishes_events_and_releases_provider() {
        let dropped = Arc::new(AtomicBool::new(false));
        let provider = ScriptedProvider {
            frames: VecDeque::from([
                Ok(vec![detection(0.1), detection(5.0)]),
                Ok(vec![detection(0.1)]),
                Err(ProviderError::Unavailable("camera unplugged".into())),
                Ok(Vec::new()),
            ]),
            dropped: dropped.clone(),
        };

        let (handle, mut events) = spawn_poller(service(), provider, Duration::from_millis(5)).unwrap();

        match events.recv().await.unwrap() {
            PollEvent::Report(report) => {
                assert_eq!(report.admitted_count(), 1);
                assert_eq!(report.unknown_count(), 1);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        match events.recv().await.unwrap() {
            PollEvent::Report(report) => {
                assert!(matches!(report.outcomes[0], Outcome::Throttled { .. }));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(events.recv().await.unwrap(), PollEvent::Failed(_)));
        assert!(matches!(events.recv().await.unwrap(), PollEvent::NothingDetected));

        let service = handle.cancel().await.unwrap();
        assert!(dropped.load(Ordering::SeqCst));
        assert_eq!(service.attendance_logs(None).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_poller_reports_empty_gallery() {
        let provider = ScriptedProvider {
            frames: VecDeque::from([Ok(vec![detection(0.0)])]),
            dropped: Arc::new(AtomicBool::new(false)),
        };
        let empty = AttendanceService::with_clock(
            Arc::new(MemoryStore::new()),
            ManualClock::default(),
        )
        .unwrap();

        let (handle, mut events) = spawn_poller(empty, provider, Duration::from_millis(5)).unwrap();
        assert!(matches!(
            events.recv().await.unwrap(),
            PollEvent::NoFacesRegistered
        ));
        handle.cancel().await.unwrap();
    }

    #[tokio::test]
    async fn test_poller_stops_when_receiver_dropped() {
        let dropped = Arc::new(AtomicBool::new(false));
        let provider = ScriptedProvider {
            frames: VecDeque::new(),
            dropped: dropped.clone(),
        };
        let (handle, events) = spawn_poller(service(), provider, Duration::from_millis(5)).unwrap();
        drop(events);

        handle.task.await.unwrap();
        assert!(dropped.load(Ordering::SeqCst));
    }

    struct BlockedProvider {
        entered: std::sync::mpsc::Sender<()>,
        gate: std::sync::mpsc::Receiver<()>,
        dropped: Arc<AtomicBool>,
    }

    impl EmbeddingProvider for BlockedProvider {
        fn detect(&mut self) -> Result<Vec<Detection>, ProviderError> {
            let _ = self.entered.send(());
            // Blocks like a read on an idle pipe until the gate closes.
            let _ = self.gate.recv();
            Ok(Vec::new())
        }
    }

    impl Drop for BlockedProvider {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_cancel_returns_while_provider_is_blocked() {
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (gate_tx, gate_rx) = std::sync::mpsc::channel::<()>();
        let dropped = Arc::new(AtomicBool::new(false));
        let provider = BlockedProvider {
            entered: entered_tx,
            gate: gate_rx,
            dropped: dropped.clone(),
        };
        let (handle, _events) =
            spawn_poller(service(), provider, Duration::from_millis(5)).unwrap();

        tokio::task::spawn_blocking(move || entered_rx.recv())
            .await
            .unwrap()
            .unwrap();
        let service = tokio::time::timeout(Duration::from_secs(2), handle.cancel())
            .await
            .expect("cancel waited on the blocked provider")
            .unwrap();
        assert!(service.attendance_logs(None).unwrap().is_empty());
        assert!(!dropped.load(Ordering::SeqCst));

        drop(gate_tx);
        for _ in 0..200 {
            if dropped.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(dropped.load(Ordering::SeqCst));
    }
}
