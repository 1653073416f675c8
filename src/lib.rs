//! # rehydra-infer
//!
//! Named-entity-recognition inference over HTTP, with automatic selection
//! among hardware execution backends.
//!
//! The service loads one ONNX token-classification model and serves raw
//! logits for pre-tokenized input. At startup it probes which execution
//! backends the build can reach, constructs a priority-ordered fallback
//! chain (TensorRT → CUDA → CPU), builds the session from the first backend
//! that initializes, and runs synthetic warm-up inferences so the first real
//! request never pays compilation latency. Only then does it start serving.
//!
//! - [`provider`] — backend probing and the ordered candidate list
//! - [`session`] — the warm session and its readiness state machine
//! - [`server`] — HTTP routes, wire schema, and error mapping
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rehydra_infer::{provider, InferenceSession};
//!
//! # fn main() -> rehydra_infer::Result<()> {
//! let session = Arc::new(InferenceSession::new(
//!     "/models/model.onnx",
//!     "/models/trt_cache",
//! ));
//! let candidates = provider::resolve(true, session.cache_dir());
//! session.construct(&candidates)?;
//!
//! let logits = session.infer(&[101, 2054, 102], &[1, 1, 1])?;
//! assert_eq!(logits.nrows(), 3);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//!
//! | Feature | Default | Effect |
//! |---------|---------|--------|
//! | `onnx` | yes | ONNX Runtime inference (CPU provider) |
//! | `tensorrt` | no | TensorRT execution provider with engine caching |
//! | `cuda` | no | CUDA execution provider |
//!
//! Without `onnx` the crate still builds; construction reports the missing
//! feature and the session never becomes ready.

#![warn(missing_docs)]

mod error;
pub mod provider;
pub mod server;
pub mod session;

pub use error::{Error, Result};
pub use provider::{candidates, resolve, Availability, BackendCandidate, BackendKind};
pub use session::{InferenceSession, SessionState, WARMUP_RUNS, WARMUP_SEQ_LEN};
