use crate::error::AppError;
use crate::ipc::error::{app_err, err, ok};
use crate::ipc::types::{AppState, Request};
use crate::model::Role;
use crate::repository::GroupRepository;

/// Handlers carry the finished error response on the `Err` side so they
/// can bail out with `?`.
pub type Reply<T> = Result<T, serde_json::Value>;

pub fn reply(id: &str, r: Reply<serde_json::Value>) -> serde_json::Value {
    match r {
        Ok(result) => ok(id, result),
        Err(resp) => resp,
    }
}

pub fn required_str<'a>(req: &'a Request, key: &str) -> Reply<&'a str> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing params.{}", key), None))
}

pub fn optional_str<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params.get(key).and_then(|v| v.as_str())
}

pub fn repo(state: &AppState, req: &Request) -> Reply<GroupRepository> {
    state
        .repo()
        .ok_or_else(|| err(&req.id, "no_store", "open a store first", None))
}

/// The signed-in user's id, optionally requiring a role.
pub fn session_user(state: &AppState, req: &Request, role: Option<Role>) -> Reply<String> {
    state
        .session(role)
        .map(|s| s.user_id.clone())
        .map_err(|e| app_err(&req.id, &e))
}

pub fn map_app<T>(req: &Request, res: Result<T, AppError>) -> Reply<T> {
    res.map_err(|e| app_err(&req.id, &e))
}

/// Access to a group is limited to its owner. Groups without an owner
/// (missing, or left partial by a concurrent write) pass so deletes stay
/// idempotent.
pub async fn ensure_owner(
    repo: &GroupRepository,
    req: &Request,
    group_id: &str,
    teacher_id: &str,
) -> Reply<()> {
    let owner = map_app(req, repo.group_owner(group_id).await)?;
    match owner {
        Some(o) if o != teacher_id => Err(app_err(
            &req.id,
            &AppError::Forbidden(format!("group {} belongs to another teacher", group_id)),
        )),
        _ => Ok(()),
    }
}
