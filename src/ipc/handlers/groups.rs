use crate::ipc::helpers::{
    ensure_owner, map_app, optional_str, reply, repo, required_str, session_user, Reply,
};
use crate::ipc::types::{AppState, Request};
use crate::model::Role;
use serde_json::json;

async fn handle_groups_create(state: &mut AppState, req: &Request) -> Reply<serde_json::Value> {
    let repo = repo(state, req)?;
    let teacher_id = session_user(state, req, Some(Role::Teacher))?;
    let name = required_str(req, "name")?;
    let grade = required_str(req, "grade")?;
    let subject = required_str(req, "subject")?;

    let group_id = map_app(req, repo.create_group(&teacher_id, name, grade, subject).await)?;
    refresh_dashboard(state).await;
    Ok(json!({ "groupId": group_id }))
}

async fn handle_groups_delete(state: &mut AppState, req: &Request) -> Reply<serde_json::Value> {
    let repo = repo(state, req)?;
    let teacher_id = session_user(state, req, Some(Role::Teacher))?;
    let group_id = required_str(req, "groupId")?;

    ensure_owner(&repo, req, group_id, &teacher_id).await?;
    map_app(req, repo.delete_group(group_id).await)?;
    if let Some(crate::presenter::Dashboard::Teacher(d)) = &state.dashboard {
        if d.selected_group().as_deref() == Some(group_id) {
            d.back();
        }
    }
    refresh_dashboard(state).await;
    Ok(json!({}))
}

async fn handle_list_for_teacher(state: &mut AppState, req: &Request) -> Reply<serde_json::Value> {
    let repo = repo(state, req)?;
    let teacher_id = match optional_str(req, "teacherId") {
        Some(id) => id.to_string(),
        None => session_user(state, req, Some(Role::Teacher))?,
    };
    let groups = map_app(req, repo.list_groups_for_teacher(&teacher_id).await)?;
    Ok(json!({ "groups": groups }))
}

async fn handle_list_for_student(state: &mut AppState, req: &Request) -> Reply<serde_json::Value> {
    let repo = repo(state, req)?;
    let student_id = match optional_str(req, "studentId") {
        Some(id) => id.to_string(),
        None => session_user(state, req, Some(Role::Student))?,
    };
    let groups = map_app(req, repo.list_groups_for_student(&student_id).await)?;
    Ok(json!({ "groups": groups }))
}

/// Keep a mounted dashboard in step with changes made outside it.
pub(crate) async fn refresh_dashboard(state: &AppState) {
    if let Some(d) = &state.dashboard {
        d.refresh().await;
    }
}

pub async fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "groups.create" => Some(reply(&req.id, handle_groups_create(state, req).await)),
        "groups.delete" => Some(reply(&req.id, handle_groups_delete(state, req).await)),
        "groups.listForTeacher" => Some(reply(&req.id, handle_list_for_teacher(state, req).await)),
        "groups.listForStudent" => Some(reply(&req.id, handle_list_for_student(state, req).await)),
        _ => None,
    }
}
