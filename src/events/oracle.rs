// Inference oracle abstraction
// The pitch-detection model is an external, expensive, single-instance resource

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;

use super::raw::RawEvents;

/// Errors reported by an inference backend
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Model not loaded: {0}")]
    NotLoaded(String),

    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("Inference task aborted: {0}")]
    TaskAborted(String),
}

/// Audio to note-event transcription backend
pub trait PitchOracle: Send {
    /// Backend name for logs and health output
    fn name(&self) -> &str;

    /// Whether the backend can accept requests
    fn is_ready(&self) -> bool {
        true
    }

    /// Transcribe raw audio bytes into note events
    fn transcribe(&mut self, audio: &[u8]) -> Result<RawEvents, OracleError>;
}

/// Placeholder used when no model is configured
pub struct UnavailableOracle;

impl PitchOracle for UnavailableOracle {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn is_ready(&self) -> bool {
        false
    }

    fn transcribe(&mut self, _audio: &[u8]) -> Result<RawEvents, OracleError> {
        Err(OracleError::NotLoaded(
            "no transcription backend configured".to_string(),
        ))
    }
}

/// Serializes access to a shared oracle.
/// At most one transcription runs at a time; waiting callers queue on the lock.
/// Name and readiness are cached so status checks never wait behind inference.
#[derive(Clone)]
pub struct OracleGate {
    oracle: Arc<Mutex<Box<dyn PitchOracle>>>,
    name: Arc<str>,
    ready: Arc<AtomicBool>,
}

impl OracleGate {
    pub fn new(oracle: Box<dyn PitchOracle>) -> Self {
        let name = Arc::from(oracle.name());
        let ready = Arc::new(AtomicBool::new(oracle.is_ready()));
        OracleGate {
            oracle: Arc::new(Mutex::new(oracle)),
            name,
            ready,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Readiness as of the last time the oracle was idle
    pub fn is_ready(&self) -> bool {
        match self.oracle.try_lock() {
            Ok(oracle) => {
                let ready = oracle.is_ready();
                self.ready.store(ready, Ordering::SeqCst);
                ready
            }
            Err(_) => self.ready.load(Ordering::SeqCst),
        }
    }

    /// True while a transcription holds the oracle
    pub fn is_busy(&self) -> bool {
        self.oracle.try_lock().is_err()
    }

    /// Run one transcription under the gate.
    /// The lock is held for the whole blocking call.
    pub async fn transcribe(&self, audio: Vec<u8>) -> Result<RawEvents, OracleError> {
        let mut guard = Arc::clone(&self.oracle).lock_owned().await;
        let ready = Arc::clone(&self.ready);

        tokio::task::spawn_blocking(move || {
            log::info!("Running transcription with {}", guard.name());
            let result = guard.transcribe(&audio);
            ready.store(guard.is_ready(), Ordering::SeqCst);
            result
        })
        .await
        .map_err(|e| OracleError::TaskAborted(e.to_string()))?
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Returns a fixed event stream and tracks overlapping calls
    pub(crate) struct ReplayOracle {
        pub events: RawEvents,
        pub in_flight: Arc<AtomicUsize>,
        pub max_in_flight: Arc<AtomicUsize>,
        pub calls: Arc<AtomicUsize>,
        pub delay: Duration,
    }

    impl ReplayOracle {
        pub(crate) fn new(events: RawEvents) -> Self {
            ReplayOracle {
                events,
                in_flight: Arc::new(AtomicUsize::new(0)),
                max_in_flight: Arc::new(AtomicUsize::new(0)),
                calls: Arc::new(AtomicUsize::new(0)),
                delay: Duration::from_millis(0),
            }
        }
    }

    impl PitchOracle for ReplayOracle {
        fn name(&self) -> &str {
            "replay"
        }

        fn transcribe(&mut self, audio: &[u8]) -> Result<RawEvents, OracleError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if audio.is_empty() {
                return Err(OracleError::TranscriptionFailed("empty audio".to_string()));
            }
            Ok(self.events.clone())
        }
    }

    #[tokio::test]
    async fn test_unavailable_oracle() {
        let gate = OracleGate::new(Box::new(UnavailableOracle));
        assert!(!gate.is_ready());
        assert_eq!(gate.name(), "unavailable");
        let result = gate.transcribe(vec![1, 2, 3]).await;
        assert!(matches!(result, Err(OracleError::NotLoaded(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_gate_allows_one_call_at_a_time() {
        let mut oracle = ReplayOracle::new(RawEvents::default());
        oracle.delay = Duration::from_millis(20);
        let max_in_flight = Arc::clone(&oracle.max_in_flight);
        let calls = Arc::clone(&oracle.calls);
        let gate = OracleGate::new(Box::new(oracle));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let gate = gate.clone();
            handles.push(tokio::spawn(async move { gate.transcribe(vec![0u8; 4]).await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_status_does_not_wait_for_inference() {
        let gate = OracleGate::new(Box::new(ReplayOracle::new(RawEvents::default())));
        assert!(!gate.is_busy());

        // Hold the oracle as an in-flight transcription would
        let guard = Arc::clone(&gate.oracle).lock_owned().await;
        assert!(gate.is_busy());
        assert!(gate.is_ready());
        assert_eq!(gate.name(), "replay");
        drop(guard);

        assert!(!gate.is_busy());
    }
}
