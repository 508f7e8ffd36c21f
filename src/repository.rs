//! Typed access to users, groups and memberships on top of a [`Store`].
//!
//! Group queries scan the whole `groups` collection; there is no server
//! side index to lean on.

use crate::config::RetryPolicy;
use crate::error::{AppError, Result};
use crate::model::{Group, GroupDoc, Role, StudentEntry, User, UserDoc};
use crate::retry;
use crate::store::{Store, StorePath};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const MISSING_CODE: &str = "N/A";

#[derive(Clone)]
pub struct GroupRepository {
    store: Arc<dyn Store>,
    policy: RetryPolicy,
}

impl GroupRepository {
    pub fn new(store: Arc<dyn Store>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn read(&self, path: &StorePath) -> Result<Option<Value>> {
        let what = format!("read {}", path);
        retry::read(&self.policy, &what, || self.store.get(path)).await
    }

    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let path = StorePath::users().child(user_id)?;
        let Some(v) = self.read(&path).await? else {
            return Ok(None);
        };
        let doc: UserDoc = serde_json::from_value(v)?;
        Ok(Some(User::from_doc(user_id.to_string(), doc)))
    }

    pub async fn put_user(&self, user: &User) -> Result<()> {
        let path = StorePath::users().child(&user.id)?;
        let doc = UserDoc {
            role: user.role,
            email: user.email.clone(),
            student_code: user.student_code.clone(),
        };
        let value = serde_json::to_value(&doc)?;
        retry::write(&self.policy, "write user", self.store.set(&path, &value)).await?;
        tracing::info!("stored profile for user {} ({})", user.id, user.role);
        Ok(())
    }

    /// Every well-formed user document; malformed ones are skipped.
    pub async fn all_users(&self) -> Result<Vec<User>> {
        let tree = self.read(&StorePath::users()).await?;
        Ok(children(tree)
            .into_iter()
            .filter_map(|(id, v)| match serde_json::from_value::<UserDoc>(v) {
                Ok(doc) => Some(User::from_doc(id, doc)),
                Err(e) => {
                    tracing::debug!("skipping malformed user {}: {}", id, e);
                    None
                }
            })
            .collect())
    }

    pub async fn get_group(&self, group_id: &str) -> Result<Option<Group>> {
        let path = StorePath::groups().child(group_id)?;
        let Some(v) = self.read(&path).await? else {
            return Ok(None);
        };
        let doc: GroupDoc = serde_json::from_value(v)?;
        Ok(Some(Group::from_doc(group_id.to_string(), doc)))
    }

    /// Owner of the group, read from `teacherId` alone so that a partial
    /// document (e.g. only a `students` entry) still answers.
    pub async fn group_owner(&self, group_id: &str) -> Result<Option<String>> {
        let path = StorePath::groups().child(group_id)?.child("teacherId")?;
        Ok(match self.read(&path).await? {
            Some(Value::String(owner)) => Some(owner),
            _ => None,
        })
    }

    async fn require_group(&self, group_id: &str) -> Result<Group> {
        self.get_group(group_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("group {}", group_id)))
    }

    /// Every well-formed group document; entries without a `teacherId`
    /// or that are not objects are skipped.
    pub async fn all_groups(&self) -> Result<Vec<Group>> {
        let tree = self.read(&StorePath::groups()).await?;
        let mut groups: Vec<Group> = children(tree)
            .into_iter()
            .filter_map(|(id, v)| match serde_json::from_value::<GroupDoc>(v) {
                Ok(doc) => Some(Group::from_doc(id, doc)),
                Err(e) => {
                    tracing::debug!("skipping malformed group {}: {}", id, e);
                    None
                }
            })
            .collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(groups)
    }

    pub async fn list_groups_for_teacher(&self, teacher_id: &str) -> Result<Vec<Group>> {
        let groups: Vec<Group> = self
            .all_groups()
            .await?
            .into_iter()
            .filter(|g| g.teacher_id == teacher_id)
            .collect();
        tracing::debug!("teacher {} owns {} groups", teacher_id, groups.len());
        Ok(groups)
    }

    pub async fn list_groups_for_student(&self, student_id: &str) -> Result<Vec<Group>> {
        let groups: Vec<Group> = self
            .all_groups()
            .await?
            .into_iter()
            .filter(|g| g.has_member(student_id))
            .collect();
        tracing::debug!("student {} belongs to {} groups", student_id, groups.len());
        Ok(groups)
    }

    pub async fn list_registered_students(&self) -> Result<Vec<StudentEntry>> {
        let mut out: Vec<StudentEntry> = self
            .all_users()
            .await?
            .into_iter()
            .filter(|u| u.role == Role::Student)
            .map(|u| StudentEntry {
                code: u.student_code.unwrap_or_else(|| MISSING_CODE.to_string()),
                student_id: u.id,
            })
            .collect();
        sort_students(&mut out);
        Ok(out)
    }

    /// Students not yet in the group, ready for an "add" list.
    pub async fn list_unassigned_students(&self, group_id: &str) -> Result<Vec<StudentEntry>> {
        let group = self.require_group(group_id).await?;
        let out: Vec<StudentEntry> = self
            .list_registered_students()
            .await?
            .into_iter()
            .filter(|s| !group.has_member(&s.student_id))
            .collect();
        Ok(out)
    }

    /// Members of the group with their stored codes. A member whose user
    /// record is gone still shows up so it can be removed.
    pub async fn list_assigned_students(&self, group_id: &str) -> Result<Vec<StudentEntry>> {
        let group = self.require_group(group_id).await?;
        let mut out: Vec<StudentEntry> = group
            .members
            .into_iter()
            .map(|m| StudentEntry {
                student_id: m.student_id,
                code: m.student_code,
            })
            .collect();
        sort_students(&mut out);
        Ok(out)
    }

    pub async fn create_group(
        &self,
        teacher_id: &str,
        name: &str,
        grade: &str,
        subject: &str,
    ) -> Result<String> {
        let (name, grade, subject) = (name.trim(), grade.trim(), subject.trim());
        if name.is_empty() || grade.is_empty() || subject.is_empty() {
            return Err(AppError::Validation(
                "please fill in name, grade and subject".into(),
            ));
        }
        match self.get_user(teacher_id).await? {
            Some(u) if u.role == Role::Teacher => {}
            Some(_) => {
                return Err(AppError::Validation(format!(
                    "user {} is not a teacher",
                    teacher_id
                )))
            }
            None => return Err(AppError::NotFound(format!("teacher {}", teacher_id))),
        }

        let group_id = self.store.push_key();
        let doc = GroupDoc {
            name: name.to_string(),
            grade: grade.to_string(),
            subject: subject.to_string(),
            teacher_id: teacher_id.to_string(),
            students: BTreeMap::new(),
        };
        let path = StorePath::groups().child(&group_id)?;
        let value = serde_json::to_value(&doc)?;
        retry::write(&self.policy, "create group", self.store.set(&path, &value)).await?;
        tracing::info!("group '{}' created as {} by {}", name, group_id, teacher_id);
        Ok(group_id)
    }

    /// Removes the group and every membership under it. Missing groups are
    /// not an error.
    pub async fn delete_group(&self, group_id: &str) -> Result<()> {
        let path = StorePath::groups().child(group_id)?;
        retry::write(&self.policy, "delete group", self.store.remove(&path)).await?;
        tracing::info!("group {} deleted", group_id);
        Ok(())
    }

    pub async fn add_membership(&self, group_id: &str, student_id: &str) -> Result<()> {
        let Some(student) = self.get_user(student_id).await? else {
            return Err(AppError::NotFound(format!("student {}", student_id)));
        };
        if student.role != Role::Student {
            return Err(AppError::Validation(format!(
                "user {} is not a student",
                student_id
            )));
        }
        let Some(code) = student.student_code else {
            return Err(AppError::NotFound(format!("code for student {}", student_id)));
        };
        self.require_group(group_id).await?;

        let path = StorePath::groups()
            .child(group_id)?
            .child("students")?
            .child(student_id)?;
        retry::write(
            &self.policy,
            "add membership",
            self.store.set(&path, &Value::String(code.clone())),
        )
        .await?;
        tracing::info!("student {} ({}) added to group {}", student_id, code, group_id);
        Ok(())
    }

    pub async fn remove_membership(&self, group_id: &str, student_id: &str) -> Result<()> {
        let path = StorePath::groups()
            .child(group_id)?
            .child("students")?
            .child(student_id)?;
        retry::write(&self.policy, "remove membership", self.store.remove(&path)).await?;
        tracing::info!("student {} removed from group {}", student_id, group_id);
        Ok(())
    }
}

fn children(tree: Option<Value>) -> Vec<(String, Value)> {
    match tree {
        Some(Value::Object(map)) => map.into_iter().collect(),
        _ => Vec::new(),
    }
}

fn sort_students(list: &mut [StudentEntry]) {
    list.sort_by(|a, b| {
        a.code
            .cmp(&b.code)
            .then_with(|| a.student_id.cmp(&b.student_id))
    });
}
