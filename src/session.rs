//! Warm inference session.
//!
//! Wraps one ONNX Runtime session behind a readiness state machine:
//!
//! ```text
//! Unconstructed → Constructing → WarmingUp → Ready
//! ```
//!
//! Transitions are one-directional. `construct` walks the resolved backend
//! candidates in order, keeps the first one that initializes, then runs a
//! fixed number of synthetic warm-up inferences to force any lazy kernel
//! compilation (and populate the on-disk engine cache) before flipping to
//! Ready. Construction failures propagate; the process must not serve
//! traffic without a Ready session.
//!
//! After Ready, `infer` is a pure input → logits transformation. A failing
//! call reports an inference error and leaves the session state and the
//! recorded active backend untouched.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

use ndarray::Array2;

use crate::provider::{BackendCandidate, BackendKind};
use crate::{Error, Result};

#[cfg(feature = "onnx")]
use {
    ort::session::builder::GraphOptimizationLevel,
    ort::session::Session,
    ort::value::Tensor,
    std::fs,
    std::sync::Mutex,
};

/// Number of synthetic warm-up inferences run before declaring Ready.
pub const WARMUP_RUNS: usize = 3;

/// Sequence length of the all-ones warm-up input.
pub const WARMUP_SEQ_LEN: usize = 128;

/// Lifecycle state of an [`InferenceSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// No engine exists yet.
    Unconstructed = 0,
    /// Building the execution context from the candidate list.
    Constructing = 1,
    /// Engine built; synthetic warm-up inferences in flight.
    WarmingUp = 2,
    /// Warm-up complete; serving inference requests.
    Ready = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Unconstructed,
            1 => SessionState::Constructing,
            2 => SessionState::WarmingUp,
            _ => SessionState::Ready,
        }
    }

    /// Human-readable state name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Unconstructed => "unconstructed",
            SessionState::Constructing => "constructing",
            SessionState::WarmingUp => "warming_up",
            SessionState::Ready => "ready",
        }
    }
}

/// A single long-lived inference session shared across all request handlers.
///
/// Created once per process. The session exclusively owns the execution
/// context; readiness is a lock-free atomic read, so `is_ready` and
/// `active_backend` are always truthful snapshots for health reporting.
pub struct InferenceSession {
    model_path: PathBuf,
    cache_dir: PathBuf,
    state: AtomicU8,
    active: OnceLock<BackendKind>,
    #[cfg(feature = "onnx")]
    engine: Mutex<Option<Session>>,
}

impl InferenceSession {
    /// Create an unconstructed session for the given model artifact and
    /// engine cache directory. No filesystem access happens here.
    pub fn new(model_path: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            cache_dir: cache_dir.into(),
            state: AtomicU8::new(SessionState::Unconstructed as u8),
            active: OnceLock::new(),
            #[cfg(feature = "onnx")]
            engine: Mutex::new(None),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the session has completed construction and warm-up.
    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    /// The backend that actually initialized, once construction succeeded.
    ///
    /// This is the observed winner of the candidate attempt loop, which may
    /// rank below the highest-priority requested backend.
    pub fn active_backend(&self) -> Option<BackendKind> {
        self.active.get().copied()
    }

    /// Path of the model artifact this session loads.
    pub fn model_path(&self) -> &std::path::Path {
        &self.model_path
    }

    /// Engine cache directory this session guarantees to exist.
    pub fn cache_dir(&self) -> &std::path::Path {
        &self.cache_dir
    }

    fn begin_construction(&self) -> Result<()> {
        self.state
            .compare_exchange(
                SessionState::Unconstructed as u8,
                SessionState::Constructing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(|actual| {
                Error::model_init(format!(
                    "construct called in state '{}'; a session is constructed exactly once",
                    SessionState::from_u8(actual).as_str()
                ))
            })
    }

    #[cfg(feature = "onnx")]
    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Build the execution context and warm it up.
    ///
    /// Ensures the engine cache directory exists, attempts each candidate in
    /// order until one initializes, records the winning backend, then runs
    /// [`WARMUP_RUNS`] synthetic inferences of shape `[1, WARMUP_SEQ_LEN]`.
    /// The first warm-up run against an empty cache may take minutes while
    /// TensorRT compiles engines.
    ///
    /// Any failure here is a fatal startup error and propagates to the
    /// caller; the session never reaches Ready.
    #[cfg(feature = "onnx")]
    pub fn construct(&self, candidates: &[BackendCandidate]) -> Result<()> {
        self.begin_construction()?;
        log::info!("Loading model from {}", self.model_path.display());

        fs::create_dir_all(&self.cache_dir)?;

        let (kind, session) = self.build_engine(candidates)?;
        log::info!("Active execution backend: {kind}");

        *self
            .engine
            .lock()
            .map_err(|_| Error::model_init("engine lock poisoned"))? = Some(session);
        let _ = self.active.set(kind);

        self.set_state(SessionState::WarmingUp);
        self.warm_up()?;
        self.set_state(SessionState::Ready);

        log::info!("Model loaded and ready on {kind}");
        Ok(())
    }

    /// Stub when built without the `onnx` feature.
    #[cfg(not(feature = "onnx"))]
    pub fn construct(&self, _candidates: &[BackendCandidate]) -> Result<()> {
        self.begin_construction()?;
        Err(Error::feature_not_available(
            "inference requires the 'onnx' feature",
        ))
    }

    /// Attempt candidates in order; the first that initializes wins.
    #[cfg(feature = "onnx")]
    fn build_engine(&self, candidates: &[BackendCandidate]) -> Result<(BackendKind, Session)> {
        let mut last_err = Error::model_init("empty backend candidate list");

        for candidate in candidates {
            let kind = candidate.kind();
            match self.try_build(candidate) {
                Ok(session) => return Ok((kind, session)),
                Err(err) => {
                    log::warn!("Backend {kind} failed to initialize: {err}");
                    last_err = err;
                }
            }
        }

        Err(last_err)
    }

    #[cfg(feature = "onnx")]
    fn try_build(&self, candidate: &BackendCandidate) -> Result<Session> {
        let dispatch = candidate.dispatch()?;
        Session::builder()
            .map_err(|e| Error::model_init(format!("Failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| Error::model_init(format!("Failed to set optimization level: {e}")))?
            .with_execution_providers([dispatch])
            .map_err(|e| {
                Error::model_init(format!(
                    "Failed to register {} execution provider: {e}",
                    candidate.kind()
                ))
            })?
            .commit_from_file(&self.model_path)
            .map_err(|e| Error::model_init(format!("Failed to load ONNX model: {e}")))
    }

    /// Run the synthetic warm-up inferences, discarding results.
    #[cfg(feature = "onnx")]
    fn warm_up(&self) -> Result<()> {
        log::info!(
            "Running {WARMUP_RUNS} warm-up inferences \
             (first run may compile and cache kernels)"
        );
        let filler = vec![1i64; WARMUP_SEQ_LEN];

        for run in 1..=WARMUP_RUNS {
            self.run_engine(&filler, &filler)
                .map_err(|e| Error::model_init(format!("Warm-up run {run} failed: {e}")))?;
            log::info!("Warm-up run {run}/{WARMUP_RUNS} completed");
        }
        Ok(())
    }

    /// Run inference on pre-tokenized input.
    ///
    /// Valid only in the Ready state; earlier states yield
    /// [`Error::NotReady`] without touching the execution context. The
    /// inputs get an implicit batch dimension of 1; the returned logits have
    /// it stripped, giving shape `[seq_len, num_labels]`.
    pub fn infer(&self, token_ids: &[i64], attention_mask: &[i64]) -> Result<Array2<f32>> {
        if self.state() != SessionState::Ready {
            return Err(Error::NotReady);
        }
        if token_ids.is_empty() {
            return Err(Error::invalid_input("input_ids must not be empty"));
        }
        if token_ids.len() != attention_mask.len() {
            return Err(Error::invalid_input(format!(
                "input_ids length {} does not match attention_mask length {}",
                token_ids.len(),
                attention_mask.len()
            )));
        }
        self.run_engine(token_ids, attention_mask)
    }

    #[cfg(feature = "onnx")]
    fn run_engine(&self, token_ids: &[i64], attention_mask: &[i64]) -> Result<Array2<f32>> {
        let seq_len = token_ids.len();

        let input_ids = Array2::from_shape_vec((1, seq_len), token_ids.to_vec())
            .map_err(|e| Error::inference(format!("Failed to shape input_ids: {e}")))?;
        let mask = Array2::from_shape_vec((1, seq_len), attention_mask.to_vec())
            .map_err(|e| Error::inference(format!("Failed to shape attention_mask: {e}")))?;

        let input_ids_tensor = Tensor::from_array(input_ids)
            .map_err(|e| Error::inference(format!("Failed to create input_ids tensor: {e}")))?;
        let mask_tensor = Tensor::from_array(mask).map_err(|e| {
            Error::inference(format!("Failed to create attention_mask tensor: {e}"))
        })?;

        let mut engine = self
            .engine
            .lock()
            .map_err(|_| Error::inference("engine lock poisoned"))?;
        let session = engine.as_mut().ok_or(Error::NotReady)?;

        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_tensor.into_dyn(),
                "attention_mask" => mask_tensor.into_dyn(),
            ])
            .map_err(|e| Error::inference(format!("ONNX inference failed: {e}")))?;

        // Token-classification models name their output "logits"; fall back
        // to the first output for models exported without names.
        let logits = match outputs.get("logits") {
            Some(value) => value,
            None => outputs
                .iter()
                .next()
                .map(|(_, value)| value)
                .ok_or_else(|| Error::inference("model produced no outputs"))?,
        };

        let (shape, data) = logits
            .try_extract_tensor::<f32>()
            .map_err(|e| Error::inference(format!("Failed to extract logits tensor: {e}")))?;

        if shape.len() != 3 || shape[0] != 1 {
            return Err(Error::inference(format!(
                "Unexpected logits shape: {shape:?}"
            )));
        }

        let rows = shape[1] as usize;
        let num_labels = shape[2] as usize;
        Array2::from_shape_vec((rows, num_labels), data.to_vec())
            .map_err(|e| Error::inference(format!("Failed to reshape logits: {e}")))
    }

    #[cfg(not(feature = "onnx"))]
    fn run_engine(&self, _token_ids: &[i64], _attention_mask: &[i64]) -> Result<Array2<f32>> {
        Err(Error::feature_not_available(
            "inference requires the 'onnx' feature",
        ))
    }
}

impl std::fmt::Debug for InferenceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceSession")
            .field("model_path", &self.model_path)
            .field("cache_dir", &self.cache_dir)
            .field("state", &self.state())
            .field("active_backend", &self.active_backend())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_unconstructed() {
        let session = InferenceSession::new("/models/model.onnx", "/models/trt_cache");
        assert_eq!(session.state(), SessionState::Unconstructed);
        assert!(!session.is_ready());
        assert_eq!(session.active_backend(), None);
    }

    #[test]
    fn infer_before_ready_is_rejected() {
        let session = InferenceSession::new("/models/model.onnx", "/models/trt_cache");
        let err = session.infer(&[1, 2, 3], &[1, 1, 0]).unwrap_err();
        assert!(matches!(err, Error::NotReady));
    }

    #[test]
    fn state_names() {
        assert_eq!(SessionState::Unconstructed.as_str(), "unconstructed");
        assert_eq!(SessionState::Constructing.as_str(), "constructing");
        assert_eq!(SessionState::WarmingUp.as_str(), "warming_up");
        assert_eq!(SessionState::Ready.as_str(), "ready");
    }

    #[test]
    fn state_round_trips_through_u8() {
        for state in [
            SessionState::Unconstructed,
            SessionState::Constructing,
            SessionState::WarmingUp,
            SessionState::Ready,
        ] {
            assert_eq!(SessionState::from_u8(state as u8), state);
        }
    }
}
