use crate::ipc::handlers::groups::refresh_dashboard;
use crate::ipc::helpers::{ensure_owner, map_app, reply, repo, required_str, session_user, Reply};
use crate::ipc::types::{AppState, Request};
use crate::model::Role;
use serde_json::json;

async fn handle_members_add(state: &mut AppState, req: &Request) -> Reply<serde_json::Value> {
    let repo = repo(state, req)?;
    let teacher_id = session_user(state, req, Some(Role::Teacher))?;
    let group_id = required_str(req, "groupId")?;
    let student_id = required_str(req, "studentId")?;

    ensure_owner(&repo, req, group_id, &teacher_id).await?;
    map_app(req, repo.add_membership(group_id, student_id).await)?;
    refresh_dashboard(state).await;
    Ok(json!({}))
}

async fn handle_members_remove(state: &mut AppState, req: &Request) -> Reply<serde_json::Value> {
    let repo = repo(state, req)?;
    let teacher_id = session_user(state, req, Some(Role::Teacher))?;
    let group_id = required_str(req, "groupId")?;
    let student_id = required_str(req, "studentId")?;

    ensure_owner(&repo, req, group_id, &teacher_id).await?;
    map_app(req, repo.remove_membership(group_id, student_id).await)?;
    refresh_dashboard(state).await;
    Ok(json!({}))
}

async fn handle_members_list(state: &mut AppState, req: &Request) -> Reply<serde_json::Value> {
    let repo = repo(state, req)?;
    let teacher_id = session_user(state, req, Some(Role::Teacher))?;
    let group_id = required_str(req, "groupId")?;

    ensure_owner(&repo, req, group_id, &teacher_id).await?;
    let students = map_app(req, repo.list_assigned_students(group_id).await)?;
    Ok(json!({ "students": students }))
}

async fn handle_list_unassigned(state: &mut AppState, req: &Request) -> Reply<serde_json::Value> {
    let repo = repo(state, req)?;
    let teacher_id = session_user(state, req, Some(Role::Teacher))?;
    let group_id = required_str(req, "groupId")?;

    ensure_owner(&repo, req, group_id, &teacher_id).await?;
    let students = map_app(req, repo.list_unassigned_students(group_id).await)?;
    Ok(json!({ "students": students }))
}

async fn handle_list_registered(state: &mut AppState, req: &Request) -> Reply<serde_json::Value> {
    let repo = repo(state, req)?;
    session_user(state, req, Some(Role::Teacher))?;
    let students = map_app(req, repo.list_registered_students().await)?;
    Ok(json!({ "students": students }))
}

pub async fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "members.add" => Some(reply(&req.id, handle_members_add(state, req).await)),
        "members.remove" => Some(reply(&req.id, handle_members_remove(state, req).await)),
        "members.list" => Some(reply(&req.id, handle_members_list(state, req).await)),
        "students.listUnassigned" => Some(reply(&req.id, handle_list_unassigned(state, req).await)),
        "students.listRegistered" => Some(reply(&req.id, handle_list_registered(state, req).await)),
        _ => None,
    }
}
