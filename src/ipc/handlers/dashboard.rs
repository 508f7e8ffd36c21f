use crate::error::AppError;
use crate::ipc::error::app_err;
use crate::ipc::helpers::{map_app, reply, repo, required_str, Reply};
use crate::ipc::types::{AppState, Request};
use crate::presenter::{Dashboard, TeacherDashboard};
use serde_json::json;

fn mounted<'a>(state: &'a AppState, req: &Request) -> Reply<&'a Dashboard> {
    state.dashboard.as_ref().ok_or_else(|| {
        app_err(
            &req.id,
            &AppError::Validation("open the dashboard first".into()),
        )
    })
}

fn teacher<'a>(state: &'a AppState, req: &Request) -> Reply<&'a TeacherDashboard> {
    map_app(req, mounted(state, req)?.teacher())
}

fn view(state: &AppState, req: &Request) -> Reply<serde_json::Value> {
    map_app(req, mounted(state, req)?.view())
}

/// Mount the signed-in user's screen and load it.
async fn handle_open(state: &mut AppState, req: &Request) -> Reply<serde_json::Value> {
    let repo = repo(state, req)?;
    let session = map_app(req, state.session(None))?.clone();
    state.dashboard = Some(Dashboard::for_session(repo, &session));
    tracing::debug!("mounted {} dashboard for {}", session.role, session.user_id);
    if let Some(d) = &state.dashboard {
        d.refresh().await;
    }
    view(state, req)
}

async fn handle_refresh(state: &mut AppState, req: &Request) -> Reply<serde_json::Value> {
    mounted(state, req)?.refresh().await;
    view(state, req)
}

async fn handle_select_group(state: &mut AppState, req: &Request) -> Reply<serde_json::Value> {
    let group_id = required_str(req, "groupId")?;
    map_app(req, teacher(state, req)?.select_group(group_id).await)?;
    view(state, req)
}

fn handle_back(state: &mut AppState, req: &Request) -> Reply<serde_json::Value> {
    teacher(state, req)?.back();
    view(state, req)
}

async fn handle_create_group(state: &mut AppState, req: &Request) -> Reply<serde_json::Value> {
    let name = required_str(req, "name")?;
    let grade = required_str(req, "grade")?;
    let subject = required_str(req, "subject")?;
    let group_id = map_app(req, teacher(state, req)?.create_group(name, grade, subject).await)?;
    let view = view(state, req)?;
    Ok(json!({ "groupId": group_id, "view": view }))
}

async fn handle_delete_group(state: &mut AppState, req: &Request) -> Reply<serde_json::Value> {
    let group_id = required_str(req, "groupId")?;
    map_app(req, teacher(state, req)?.delete_group(group_id).await)?;
    view(state, req)
}

async fn handle_add_student(state: &mut AppState, req: &Request) -> Reply<serde_json::Value> {
    let student_id = required_str(req, "studentId")?;
    map_app(req, teacher(state, req)?.add_student(student_id).await)?;
    view(state, req)
}

async fn handle_remove_student(state: &mut AppState, req: &Request) -> Reply<serde_json::Value> {
    let student_id = required_str(req, "studentId")?;
    map_app(req, teacher(state, req)?.remove_student(student_id).await)?;
    view(state, req)
}

pub async fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "dashboard.open" => handle_open(state, req).await,
        "dashboard.view" => view(state, req),
        "dashboard.refresh" => handle_refresh(state, req).await,
        "dashboard.selectGroup" => handle_select_group(state, req).await,
        "dashboard.back" => handle_back(state, req),
        "dashboard.createGroup" => handle_create_group(state, req).await,
        "dashboard.deleteGroup" => handle_delete_group(state, req).await,
        "dashboard.addStudent" => handle_add_student(state, req).await,
        "dashboard.removeStudent" => handle_remove_student(state, req).await,
        _ => return None,
    };
    Some(reply(&req.id, res))
}
