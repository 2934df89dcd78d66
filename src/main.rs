use restart_hook::api;
use restart_hook::logging::setup_logging;
use restart_hook::runtime::{ContainerRuntime, DockerRuntime};
use restart_hook::{AppState, RestartHookConfig, load_config};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

const DEFAULT_CONFIG_PATH: &str = "restart_hook.toml";

fn exit_with(message: impl std::fmt::Display) -> ! {
    eprintln!("{}", message);
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let config_path =
        std::env::var("RESTART_HOOK_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let config: RestartHookConfig = match load_config(Path::new(&config_path)) {
        Ok(cfg) => cfg.apply_env_overrides(|key| std::env::var(key).ok()),
        Err(e) => exit_with(format!("Configuration error: {}", e)),
    };
    if let Err(e) = config.validate() {
        exit_with(format!("Configuration error: {}", e));
    }

    // Keep the guard alive so buffered file logs get flushed on exit
    let _log_guard = match setup_logging(&config) {
        Ok(guard) => guard,
        Err(e) => exit_with(e),
    };

    let runtime = match DockerRuntime::connect() {
        Ok(runtime) => runtime,
        Err(e) => exit_with(format!("Failed to create Docker client: {}", e)),
    };
    // An unreachable daemon only fails individual restarts
    if let Err(e) = runtime.ping().await {
        warn!("Docker daemon is not reachable yet: {}", e);
    }

    let state = Arc::new(AppState::from_config(&config, Arc::new(runtime)));
    if state.auth.is_open() {
        warn!("WEBHOOK_SECRET is not set: signature verification is DISABLED (open mode)");
    }

    let app = api::router(state);

    info!("Listening on {}", config.bind_address);
    info!("Using config at {:?}", config_path);
    let listener = match tokio::net::TcpListener::bind(&config.bind_address).await {
        Ok(listener) => listener,
        Err(e) => exit_with(format!("Failed to bind {}: {}", config.bind_address, e)),
    };
    if let Err(e) = axum::serve(listener, app).await {
        exit_with(format!("Server error: {}", e));
    }
}
