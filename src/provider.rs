//! Execution backend resolution.
//!
//! Builds the priority-ordered list of execution backends the inference
//! session will attempt: TensorRT first (compiled engines, persisted to an
//! on-disk cache), then CUDA, then the CPU provider which is always present
//! and terminates the chain.
//!
//! Resolution is a read-only probe. Nothing here touches the filesystem;
//! creating the engine cache directory is the session's job.

use std::fmt;
use std::path::{Path, PathBuf};

#[cfg(feature = "onnx")]
use ort::execution_providers::{CPUExecutionProvider, ExecutionProviderDispatch};
#[cfg(any(feature = "tensorrt", feature = "cuda"))]
use ort::execution_providers::ExecutionProvider;
#[cfg(feature = "cuda")]
use ort::execution_providers::{ArenaExtendStrategy, CUDAExecutionProvider};
#[cfg(feature = "tensorrt")]
use ort::execution_providers::TensorRTExecutionProvider;

/// TensorRT workspace ceiling (2 GiB).
pub const TRT_MAX_WORKSPACE_BYTES: usize = 2 * 1024 * 1024 * 1024;

/// TensorRT builder optimization level.
pub const TRT_BUILDER_OPT_LEVEL: u8 = 3;

/// Identity of an execution backend, in fixed priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// NVIDIA TensorRT: compiled kernels with a persistent engine cache.
    TensorRt,
    /// Generic CUDA execution.
    Cuda,
    /// CPU execution, universally present.
    Cpu,
}

impl BackendKind {
    /// Stable name used in health reporting and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::TensorRt => "tensorrt",
            BackendKind::Cuda => "cuda",
            BackendKind::Cpu => "cpu",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// TensorRT tuning knobs. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorRtConfig {
    /// Permit reduced-precision (FP16) kernels.
    pub fp16: bool,
    /// Directory where compiled engines are cached across restarts.
    pub engine_cache_dir: PathBuf,
    /// Upper bound on the builder workspace, in bytes.
    pub max_workspace_bytes: usize,
    /// Builder optimization aggressiveness.
    pub builder_optimization_level: u8,
}

/// CUDA memory-arena growth strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArenaGrowth {
    /// Round each extension up to the next power of two.
    NextPowerOfTwo,
    /// Extend by exactly the requested amount.
    SameAsRequested,
}

/// CUDA tuning knobs. Immutable once resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CudaConfig {
    /// CUDA device ordinal.
    pub device_id: i32,
    /// Arena extension behavior for device allocations.
    pub arena_growth: ArenaGrowth,
}

/// One entry of the resolved fallback chain: a backend plus its config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCandidate {
    /// TensorRT with engine caching.
    TensorRt(TensorRtConfig),
    /// CUDA with arena tuning.
    Cuda(CudaConfig),
    /// CPU with default configuration.
    Cpu,
}

impl BackendCandidate {
    /// The backend this candidate selects.
    pub fn kind(&self) -> BackendKind {
        match self {
            BackendCandidate::TensorRt(_) => BackendKind::TensorRt,
            BackendCandidate::Cuda(_) => BackendKind::Cuda,
            BackendCandidate::Cpu => BackendKind::Cpu,
        }
    }
}

#[cfg(feature = "cuda")]
impl From<ArenaGrowth> for ArenaExtendStrategy {
    fn from(growth: ArenaGrowth) -> Self {
        match growth {
            ArenaGrowth::NextPowerOfTwo => ArenaExtendStrategy::NextPowerOfTwo,
            ArenaGrowth::SameAsRequested => ArenaExtendStrategy::SameAsRequested,
        }
    }
}

#[cfg(feature = "onnx")]
impl BackendCandidate {
    /// Build the `ort` provider registration for this candidate.
    ///
    /// Accelerated providers are registered with error-on-failure so that a
    /// provider which cannot engage fails the construction attempt outright
    /// instead of silently degrading; the session's attempt loop then moves
    /// on to the next candidate. An accelerated candidate whose provider is
    /// not compiled into this build fails the attempt the same way, so the
    /// recorded active backend can never name a provider that did not run.
    pub(crate) fn dispatch(&self) -> crate::Result<ExecutionProviderDispatch> {
        match self {
            #[cfg(feature = "tensorrt")]
            BackendCandidate::TensorRt(config) => Ok(TensorRTExecutionProvider::default()
                .with_fp16(config.fp16)
                .with_engine_cache(true)
                .with_engine_cache_path(config.engine_cache_dir.display().to_string())
                .with_max_workspace_size(config.max_workspace_bytes)
                .with_builder_optimization_level(config.builder_optimization_level)
                .build()
                .error_on_failure()),
            #[cfg(feature = "cuda")]
            BackendCandidate::Cuda(config) => Ok(CUDAExecutionProvider::default()
                .with_device_id(config.device_id)
                .with_arena_extend_strategy(config.arena_growth.into())
                .build()
                .error_on_failure()),
            BackendCandidate::Cpu => Ok(CPUExecutionProvider::default().build()),
            #[cfg(not(all(feature = "tensorrt", feature = "cuda")))]
            #[allow(unreachable_patterns)]
            other => Err(crate::Error::feature_not_available(format!(
                "{} execution provider is not compiled into this build",
                other.kind()
            ))),
        }
    }
}

/// Which accelerated backends the current build can reach.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Availability {
    /// TensorRT provider compiled in and usable.
    pub tensorrt: bool,
    /// CUDA provider compiled in and usable.
    pub cuda: bool,
}

impl Availability {
    /// Probe the runtime for usable accelerated providers.
    ///
    /// Providers whose crate feature is absent probe as unavailable.
    pub fn detect() -> Self {
        Self {
            tensorrt: probe_tensorrt(),
            cuda: probe_cuda(),
        }
    }
}

#[cfg(feature = "tensorrt")]
fn probe_tensorrt() -> bool {
    TensorRTExecutionProvider::default()
        .is_available()
        .unwrap_or(false)
}

#[cfg(not(feature = "tensorrt"))]
fn probe_tensorrt() -> bool {
    false
}

#[cfg(feature = "cuda")]
fn probe_cuda() -> bool {
    CUDAExecutionProvider::default()
        .is_available()
        .unwrap_or(false)
}

#[cfg(not(feature = "cuda"))]
fn probe_cuda() -> bool {
    false
}

/// Build the ordered candidate list for a known availability set.
///
/// Accelerated backends are emitted in fixed priority order (TensorRT, then
/// CUDA) when available; the CPU backend is always appended last. Resolution
/// cannot fail: with no accelerator present the list is just `[Cpu]`.
pub fn candidates(
    avail: Availability,
    enable_fp16: bool,
    cache_dir: &Path,
) -> Vec<BackendCandidate> {
    let mut list = Vec::with_capacity(3);

    if avail.tensorrt {
        list.push(BackendCandidate::TensorRt(TensorRtConfig {
            fp16: enable_fp16,
            engine_cache_dir: cache_dir.to_path_buf(),
            max_workspace_bytes: TRT_MAX_WORKSPACE_BYTES,
            builder_optimization_level: TRT_BUILDER_OPT_LEVEL,
        }));
    }

    if avail.cuda {
        list.push(BackendCandidate::Cuda(CudaConfig {
            device_id: 0,
            arena_growth: ArenaGrowth::SameAsRequested,
        }));
    }

    list.push(BackendCandidate::Cpu);
    list
}

/// Probe the runtime and build the ordered candidate list.
pub fn resolve(enable_fp16: bool, cache_dir: &Path) -> Vec<BackendCandidate> {
    let avail = Availability::detect();
    log::info!(
        "Available execution backends: tensorrt={}, cuda={}, cpu=true",
        avail.tensorrt,
        avail.cuda
    );
    candidates(avail, enable_fp16, cache_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_are_stable() {
        assert_eq!(BackendKind::TensorRt.as_str(), "tensorrt");
        assert_eq!(BackendKind::Cuda.as_str(), "cuda");
        assert_eq!(BackendKind::Cpu.as_str(), "cpu");
    }

    #[test]
    fn cpu_only_when_nothing_available() {
        let list = candidates(Availability::default(), true, Path::new("/tmp/cache"));
        assert_eq!(list, vec![BackendCandidate::Cpu]);
    }

    #[test]
    fn full_chain_in_priority_order() {
        let avail = Availability {
            tensorrt: true,
            cuda: true,
        };
        let list = candidates(avail, false, Path::new("/var/cache/engines"));
        let kinds: Vec<_> = list.iter().map(BackendCandidate::kind).collect();
        assert_eq!(
            kinds,
            vec![BackendKind::TensorRt, BackendKind::Cuda, BackendKind::Cpu]
        );
    }

    #[cfg(all(feature = "onnx", not(feature = "tensorrt")))]
    #[test]
    fn dispatch_rejects_feature_absent_tensorrt() {
        let candidate = BackendCandidate::TensorRt(TensorRtConfig {
            fp16: true,
            engine_cache_dir: PathBuf::from("/tmp/cache"),
            max_workspace_bytes: TRT_MAX_WORKSPACE_BYTES,
            builder_optimization_level: TRT_BUILDER_OPT_LEVEL,
        });
        let err = candidate.dispatch().unwrap_err();
        assert!(matches!(err, crate::Error::FeatureNotAvailable(_)));
    }

    #[cfg(all(feature = "onnx", not(feature = "cuda")))]
    #[test]
    fn dispatch_rejects_feature_absent_cuda() {
        let candidate = BackendCandidate::Cuda(CudaConfig {
            device_id: 0,
            arena_growth: ArenaGrowth::SameAsRequested,
        });
        let err = candidate.dispatch().unwrap_err();
        assert!(matches!(err, crate::Error::FeatureNotAvailable(_)));
    }

    #[test]
    fn tensorrt_config_mirrors_inputs() {
        let avail = Availability {
            tensorrt: true,
            cuda: false,
        };
        let list = candidates(avail, true, Path::new("/models/trt_cache"));
        match &list[0] {
            BackendCandidate::TensorRt(config) => {
                assert!(config.fp16);
                assert_eq!(config.engine_cache_dir, Path::new("/models/trt_cache"));
                assert_eq!(config.max_workspace_bytes, TRT_MAX_WORKSPACE_BYTES);
                assert_eq!(config.builder_optimization_level, TRT_BUILDER_OPT_LEVEL);
            }
            other => panic!("expected TensorRT candidate, got {other:?}"),
        }
    }
}
