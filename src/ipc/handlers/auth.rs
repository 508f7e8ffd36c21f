use crate::auth;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{map_app, reply, repo, required_str, Reply};
use crate::ipc::types::{AppState, Request};
use crate::model::Role;
use serde_json::json;

async fn handle_sign_up(state: &mut AppState, req: &Request) -> Reply<serde_json::Value> {
    let repo = repo(state, req)?;
    let email = required_str(req, "email")?;
    let password = required_str(req, "password")?;
    let role_raw = required_str(req, "role")?;
    let Some(role) = Role::parse(role_raw) else {
        return Err(err(
            &req.id,
            "bad_params",
            format!("role must be teacher or student, got {}", role_raw),
            None,
        ));
    };

    // Sign-up ends whatever session was open.
    state.dashboard = None;
    state.session = None;
    let user = map_app(req, auth::sign_up(&repo, email, password, role).await)?;
    Ok(json!({
        "userId": user.id,
        "role": user.role,
        "studentCode": user.student_code,
    }))
}

async fn handle_sign_in(state: &mut AppState, req: &Request) -> Reply<serde_json::Value> {
    let repo = repo(state, req)?;
    let email = required_str(req, "email")?;
    let password = required_str(req, "password")?;

    state.dashboard = None;
    state.session = None;
    let session = map_app(req, auth::sign_in(&repo, email, password).await)?;
    let result = json!({
        "userId": session.user_id,
        "role": session.role,
        "route": session.route,
        "studentCode": session.student_code,
    });
    state.session = Some(session);
    Ok(result)
}

fn handle_sign_out(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(repo) = state.repo() {
        auth::sign_out(&repo);
    }
    state.dashboard = None;
    state.session = None;
    ok(&req.id, json!({}))
}

fn handle_current(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, json!({ "session": state.session }))
}

pub async fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.signUp" => Some(reply(&req.id, handle_sign_up(state, req).await)),
        "auth.signIn" => Some(reply(&req.id, handle_sign_in(state, req).await)),
        "auth.signOut" => Some(handle_sign_out(state, req)),
        "auth.current" => Some(handle_current(state, req)),
        _ => None,
    }
}
