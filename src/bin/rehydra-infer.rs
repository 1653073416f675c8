//! Rehydra NER inference service.
//!
//! Loads an ONNX token-classification model, warms it up on the best
//! available execution backend, then serves inference over HTTP.
//!
//! ```bash
//! MODEL_PATH=/models/model.onnx TRT_CACHE_PATH=/models/trt_cache rehydra-infer
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use rehydra_infer::{provider, server, InferenceSession};

#[derive(Parser, Debug)]
#[command(
    name = "rehydra-infer",
    version,
    about = "GPU-accelerated NER inference service"
)]
struct Args {
    /// Path to the ONNX model artifact.
    #[arg(long, env = "MODEL_PATH", default_value = "/models/model.onnx")]
    model_path: PathBuf,

    /// Directory for compiled engine cache artifacts (created if missing).
    #[arg(long, env = "TRT_CACHE_PATH", default_value = "/models/trt_cache")]
    cache_dir: PathBuf,

    /// Allow reduced-precision (FP16) execution on accelerated backends.
    #[arg(
        long,
        env = "ENABLE_FP16",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    enable_fp16: bool,

    /// Listen address.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Listen port.
    #[arg(long, env = "PORT", default_value_t = 8000)]
    port: u16,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    log::info!("Initializing inference engine");
    log::info!("  Model path: {}", args.model_path.display());
    log::info!("  Engine cache: {}", args.cache_dir.display());
    log::info!("  FP16 enabled: {}", args.enable_fp16);

    let session = Arc::new(InferenceSession::new(&args.model_path, &args.cache_dir));
    let candidates = provider::resolve(args.enable_fp16, &args.cache_dir);

    // Construction and warm-up must finish before the listener is bound, so
    // no request can observe a session that is not Ready.
    let startup = Arc::clone(&session);
    match tokio::task::spawn_blocking(move || startup.construct(&candidates)).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            log::error!("Startup failed: {err}");
            return ExitCode::FAILURE;
        }
        Err(err) => {
            log::error!("Startup task panicked: {err}");
            return ExitCode::FAILURE;
        }
    }

    let addr = format!("{}:{}", args.host, args.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            log::error!("Failed to bind {addr}: {err}");
            return ExitCode::FAILURE;
        }
    };
    log::info!("Serving on http://{addr}");

    if let Err(err) = axum::serve(listener, server::router(session)).await {
        log::error!("Server error: {err}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
