use crate::backup;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_backup_export(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store_dir) = state.store_dir.clone() else {
        return err(
            &req.id,
            "no_store",
            "backups are only available for a local store",
            None,
        );
    };
    let Some(out_path) = req.params.get("outPath").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing params.outPath", None);
    };

    match backup::export_store_bundle(&store_dir, &PathBuf::from(out_path)) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "bundleFormat": summary.bundle_format,
                "entryCount": summary.entry_count,
                "sha256": summary.sha256,
            }),
        ),
        Err(e) => err(&req.id, "backup_failed", format!("{e:?}"), None),
    }
}

fn handle_backup_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store_dir) = state.store_dir.clone() else {
        return err(
            &req.id,
            "no_store",
            "backups are only available for a local store",
            None,
        );
    };
    let Some(in_path) = req.params.get("inPath").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing params.inPath", None);
    };

    let prepared = match backup::prepare_import(&PathBuf::from(in_path)) {
        Ok(p) => p,
        Err(e) => return err(&req.id, "backup_failed", format!("{e:?}"), None),
    };

    // The store keeps the file open; release it before swapping files.
    state.close_store();
    let imported = prepared.install(&store_dir);
    let reopened = state.open_local(&store_dir);

    match (imported, reopened) {
        (Ok(summary), Ok(())) => ok(
            &req.id,
            json!({ "bundleFormatDetected": summary.bundle_format_detected }),
        ),
        (Err(e), _) => err(&req.id, "backup_failed", format!("{e:?}"), None),
        (Ok(_), Err(e)) => err(&req.id, e.code(), e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.export" => Some(handle_backup_export(state, req)),
        "backup.import" => Some(handle_backup_import(state, req)),
        _ => None,
    }
}
