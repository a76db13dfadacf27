use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use clap::{Parser, Subcommand};
use echofs_core::{
    handle_get_mode, handle_set_hint, spawn_sampler_loop, ClusterMetrics, ControllerOutcome,
    EchoConfig, GetModeRequest, InterfaceError, MetricsBundle, MetricsSource, ModeController,
    ObjectStore, Result as EchoResult, SetHintRequest, TelemetrySampler, WorkerPool,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "echofs-coordinator")]
#[command(about = "EchoFS adaptive consistency coordinator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Starts the coordinator's HTTP surface and background controller loop (default).
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 8080)]
        port: u16,
        #[arg(long)]
        poll_interval_ms: Option<u64>,
        #[arg(long)]
        replication_factor: Option<usize>,
    },
    /// Prints the effective configuration (env overrides applied) and exits.
    ShowConfig,
}

/// Metrics source with no real telemetry backend wired up; returns the
/// "unknown" values the Policy Engine already normalizes conservatively
/// (spec §4.2). Production deployments supply their own `MetricsSource`.
struct NoopMetricsSource;

#[async_trait]
impl MetricsSource for NoopMetricsSource {
    async fn sample_object(&self, _object_id: &str) -> EchoResult<MetricsBundle> {
        Ok(MetricsBundle::default())
    }

    async fn sample_cluster(&self) -> EchoResult<ClusterMetrics> {
        Ok(ClusterMetrics::default())
    }
}

struct AppState {
    store: Arc<ObjectStore>,
    sampler: Arc<TelemetrySampler<NoopMetricsSource>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve {
        host: "127.0.0.1".into(),
        port: 8080,
        poll_interval_ms: None,
        replication_factor: None,
    }) {
        Command::ShowConfig => {
            let cfg = EchoConfig::from_env();
            println!(
                "{}",
                serde_json::to_string_pretty(&cfg).context("serializing effective config")?
            );
            Ok(())
        }
        Command::Serve {
            host,
            port,
            poll_interval_ms,
            replication_factor,
        } => {
            let mut config = EchoConfig::from_env();
            if let Some(ms) = poll_interval_ms {
                config.poll_interval = std::time::Duration::from_millis(ms);
            }
            if let Some(r) = replication_factor {
                config = config.replication_factor(r);
            }
            config.validate().context("validating effective config")?;

            run_server(host, port, config).await
        }
    }
}

async fn run_server(host: String, port: u16, config: EchoConfig) -> Result<()> {
    let store = Arc::new(ObjectStore::new());
    let _workers = Arc::new(WorkerPool::new(config.degraded_after_failures));
    let controller = Arc::new(ModeController::new(store.clone(), config.clone()));
    let sampler = Arc::new(TelemetrySampler::new(
        Arc::new(NoopMetricsSource),
        config.clone(),
    ));

    let loop_store = store.clone();
    let loop_controller = controller.clone();
    let loop_config = config.clone();
    let state_sampler = sampler.clone();
    let _sampler_loop = spawn_sampler_loop(
        sampler,
        {
            let store = loop_store.clone();
            move || {
                let store = store.clone();
                async move { store.list_ids().await }
            }
        },
        move |tick| {
            let store = loop_store.clone();
            let controller = loop_controller.clone();
            let config = loop_config.clone();
            async move {
                let now = Utc::now();
                let cluster = tick.cluster;
                for (object_id, bundle) in tick.per_object {
                    if store.get(&object_id).await.is_none() {
                        continue;
                    }
                    let normalized = bundle.normalize(&cluster, &config);
                    match controller.evaluate_object(&object_id, &normalized, now).await {
                        Ok(ControllerOutcome::Committed { previous, new, reason }) => {
                            info!(object_id = %object_id, ?previous, ?new, reason = %reason, "mode transition committed");
                        }
                        Ok(_) => {}
                        Err(err) => warn!(object_id = %object_id, error = %err, "controller tick failed"),
                    }
                }
            }
        },
    );

    let state = Arc::new(AppState {
        store,
        sampler: state_sampler,
    });
    let app = Router::new()
        .route("/objects/{id}/mode", get(get_mode_handler))
        .route("/objects/{id}/hint", post(set_hint_handler))
        .with_state(state);

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("parsing listen address {host}:{port}"))?;
    info!(%addr, "echofs-coordinator listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding listener on {addr}"))?;
    axum::serve(listener, app)
        .await
        .context("serving echofs-coordinator http surface")?;
    Ok(())
}

async fn get_mode_handler(
    State(state): State<Arc<AppState>>,
    Path(object_id): Path<String>,
) -> Response {
    let degraded = state.sampler.is_degraded(&object_id).await;
    match handle_get_mode(&state.store, GetModeRequest { object_id }, degraded).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => problem_response(err),
    }
}

async fn set_hint_handler(
    State(state): State<Arc<AppState>>,
    Path(object_id): Path<String>,
    Json(body): Json<SetHintBody>,
) -> Response {
    let request = SetHintRequest {
        object_id,
        hint: body.hint,
    };
    match handle_set_hint(&state.store, request).await {
        Ok(ack) => (StatusCode::OK, Json(ack)).into_response(),
        Err(err) => problem_response(err),
    }
}

#[derive(serde::Deserialize)]
struct SetHintBody {
    hint: echofs_core::ModeHint,
}

fn problem_response(err: InterfaceError) -> Response {
    let status = match &err {
        InterfaceError::NotFound(_) => StatusCode::NOT_FOUND,
        InterfaceError::Validation(_) => StatusCode::BAD_REQUEST,
        InterfaceError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string()).into_response()
}
