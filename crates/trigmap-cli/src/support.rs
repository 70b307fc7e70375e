use crate::cli::CommonArgs;
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use trigmap_kernel::{ApiError, FrontendConfig, Principal, RenderContext, UserId};
use trigmap_store::{MemoryStore, store_snapshot_ref};

const DEFAULT_LOG_FILTER: &str = "warn";

/// Log to stderr so JSON on stdout stays parseable.
pub fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(directive) => EnvFilter::try_new(directive).unwrap_or_else(|e| {
            eprintln!("error: invalid --log-level `{directive}`: {e}");
            std::process::exit(1);
        }),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub fn store_path_or_exit(common: &CommonArgs) -> PathBuf {
    let path = PathBuf::from(&common.store);
    if !path.exists() {
        eprintln!("error: store snapshot not found: {}", path.display());
        std::process::exit(1);
    }
    path
}

pub fn load_store_or_exit(common: &CommonArgs) -> (MemoryStore, PathBuf) {
    let path = store_path_or_exit(common);
    let store = MemoryStore::load_jsonl(&path).unwrap_or_else(|e| {
        eprintln!("error: failed to load {}: {e}", path.display());
        std::process::exit(1);
    });
    debug!(path = %path.display(), "store snapshot loaded");
    (store, path)
}

pub fn render_context_or_exit(common: &CommonArgs) -> RenderContext {
    let config = FrontendConfig::load_or_default(&common.config).unwrap_or_else(|e| {
        eprintln!("error: failed to load config {}: {e}", common.config);
        std::process::exit(1);
    });
    let now = common.now.unwrap_or_else(|| chrono::Utc::now().timestamp());
    RenderContext::new(config, now)
}

/// The principal for `--user`, or the trusted internal one when none is given.
pub fn resolve_principal(store: &MemoryStore, user: Option<UserId>) -> Result<Principal, ApiError> {
    let Some(userid) = user else {
        return Ok(Principal::super_admin());
    };
    store
        .user(userid)
        .map(Principal::from)
        .ok_or_else(|| ApiError::Parameters(format!("unknown user {userid}")))
}

pub fn principal_or_exit(store: &MemoryStore, common: &CommonArgs) -> Principal {
    resolve_principal(store, common.user).unwrap_or_else(|e| {
        eprintln!("error: {e}");
        std::process::exit(1);
    })
}

pub fn snapshot_ref_or_exit(store: &MemoryStore) -> String {
    store_snapshot_ref(store).unwrap_or_else(|e| {
        eprintln!("error: failed to compute store reference: {e}");
        std::process::exit(1);
    })
}

pub fn render_json<T: Serialize>(payload: &T) -> Result<String, serde_json::Error> {
    let mut rendered = serde_json::to_string_pretty(payload)?;
    rendered.push('\n');
    Ok(rendered)
}

pub fn print_json<T: Serialize>(payload: &T) {
    let rendered = render_json(payload).unwrap_or_else(|e| {
        eprintln!("error: failed to serialize output: {e}");
        std::process::exit(1);
    });
    print!("{rendered}");
}
