use crate::ipc::error::{app_err, err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "backend": state.repo.as_ref().map(|r| r.store().backend_name()),
            "storePath": state.store_dir.as_ref().map(|p| p.to_string_lossy().to_string()),
            "signedIn": state.session.is_some(),
        }),
    )
}

fn handle_store_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match state.open_local(&path) {
        Ok(()) => ok(&req.id, json!({ "storePath": path.to_string_lossy() })),
        Err(e) => app_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "store.select" => Some(handle_store_select(state, req)),
        _ => None,
    }
}
