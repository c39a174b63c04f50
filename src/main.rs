use clap::Parser;
use dotenvy::dotenv;
use skeleton_form_backend::config::AnalysisConfig;
use skeleton_form_backend::infrastructure::{pose, storage};
use skeleton_form_backend::services::analysis::AnalysisService;
use skeleton_form_backend::services::worker::BackgroundWorker;
use skeleton_form_backend::{AppState, create_app};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind the API server to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port for the API server
    #[arg(short, long, default_value_t = 8000)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initial Environment & Logging Setup
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skeleton_form_backend=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting Skeleton Form Backend...");

    // 2. Configuration & Infrastructure
    let config = AnalysisConfig::from_env();
    info!(
        "🛡️  Upload Config: Max Size={}MB, Extensions={}, Retention={}s/{}s",
        config.max_upload_size_mb,
        config.allowed_extensions.join(","),
        config.upload_retention_seconds,
        config.result_retention_seconds
    );

    storage::setup_storage(&config).await?;
    let detector = pose::setup_pose_detector(&config)?;
    let analysis = Arc::new(AnalysisService::new(config.clone(), detector));
    if !analysis.codec_tools_available() {
        tracing::warn!(
            "⚠️  {} / {} not executable, every analysis will fail",
            config.ffmpeg_path,
            config.ffprobe_path
        );
    }

    // 3. Startup sweep of leftovers from a previous run
    let (uploads, results) = analysis.sweep_all().await;
    info!(
        "🧹 Startup sweep removed {} uploads and {} results",
        uploads.deleted.len(),
        results.deleted.len()
    );

    // 4. Periodic janitor
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let worker_handle = if config.sweep_interval_seconds > 0 {
        let worker = BackgroundWorker::new(
            analysis.clone(),
            Duration::from_secs(config.sweep_interval_seconds),
            shutdown_rx,
        );
        Some(tokio::spawn(worker.run()))
    } else {
        info!("Periodic sweeps disabled");
        None
    };

    let state = AppState {
        config: config.clone(),
        analysis,
    };

    let app = create_app(state).layer(
        TraceLayer::new_for_http()
            .make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            })
            .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
                info!("📥 {} {}", request.method(), request.uri());
            })
            .on_response(
                |response: &axum::http::Response<_>,
                 latency: std::time::Duration,
                 _span: &tracing::Span| {
                    info!(
                        "📤 Finished in {:?} with status {}",
                        latency,
                        response.status()
                    );
                },
            ),
    );

    // 5. Serve
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    info!("✅ Server ready at http://{}", addr);
    info!("📖 Swagger UI: http://{}/swagger-ui", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await?;

    if let Some(handle) = worker_handle {
        if let Err(e) = handle.await {
            error!("Background worker ended abnormally: {}", e);
        }
    }

    info!("🛑 Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, starting graceful shutdown...");
        },
    }
}
