use super::{ListSlot, ListView, Phase, Ticket};
use crate::error::{AppError, Result};
use crate::model::{Group, StudentEntry};
use crate::repository::GroupRepository;
use serde::Serialize;
use std::cell::RefCell;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupItem {
    pub group_id: String,
    pub name: String,
    pub grade: String,
    pub subject: String,
    pub student_count: usize,
    pub label: String,
}

impl From<Group> for GroupItem {
    fn from(g: Group) -> Self {
        Self {
            label: format!("- {} | {} | {} -", g.name, g.grade, g.subject),
            student_count: g.members.len(),
            group_id: g.id,
            name: g.name,
            grade: g.grade,
            subject: g.subject,
        }
    }
}

/// The "manage group" panel. Each opening gets a new epoch so results
/// fetched for an earlier opening never land in a later one.
struct Panel {
    epoch: u64,
    group_id: String,
    group_name: String,
    assigned: ListSlot<StudentEntry>,
    unassigned: ListSlot<StudentEntry>,
}

#[derive(Default)]
struct TeacherState {
    groups: ListSlot<GroupItem>,
    panel: Option<Panel>,
    epochs: u64,
}

impl TeacherState {
    fn panel_for(&mut self, epoch: u64) -> Option<&mut Panel> {
        self.panel.as_mut().filter(|p| p.epoch == epoch)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelView {
    pub group_id: String,
    pub title: String,
    pub assigned: ListView<StudentEntry>,
    pub unassigned: ListView<StudentEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherView {
    pub role: &'static str,
    pub teacher_id: String,
    pub phase: Phase,
    pub groups: ListView<GroupItem>,
    pub panel: Option<PanelView>,
}

pub struct TeacherDashboard {
    repo: GroupRepository,
    teacher_id: String,
    state: RefCell<TeacherState>,
}

impl TeacherDashboard {
    pub fn new(repo: GroupRepository, teacher_id: String) -> Self {
        Self {
            repo,
            teacher_id,
            state: RefCell::new(TeacherState::default()),
        }
    }

    pub fn teacher_id(&self) -> &str {
        &self.teacher_id
    }

    pub fn view(&self) -> TeacherView {
        let st = self.state.borrow();
        TeacherView {
            role: "teacher",
            teacher_id: self.teacher_id.clone(),
            phase: Phase::of(st.groups.state()),
            groups: st.groups.view(),
            panel: st.panel.as_ref().map(|p| PanelView {
                group_id: p.group_id.clone(),
                title: format!("Managing: {}", p.group_name),
                assigned: p.assigned.view(),
                unassigned: p.unassigned.view(),
            }),
        }
    }

    pub fn selected_group(&self) -> Option<String> {
        self.state.borrow().panel.as_ref().map(|p| p.group_id.clone())
    }

    /// Re-fetch the group list. Returns whether this fetch's result was
    /// the one applied.
    pub async fn refresh_groups(&self) -> bool {
        let ticket = self.state.borrow_mut().groups.begin();
        let result = self
            .repo
            .list_groups_for_teacher(&self.teacher_id)
            .await
            .map(|gs| gs.into_iter().map(GroupItem::from).collect());
        let applied = self.state.borrow_mut().groups.complete(ticket, result);
        if !applied {
            tracing::debug!("discarded stale group list {:?}", ticket);
        }
        applied
    }

    /// Re-fetch both student lists of the open panel, if any.
    pub async fn refresh_panel(&self) {
        let started: Option<(u64, String, Ticket, Ticket)> = {
            let mut st = self.state.borrow_mut();
            st.panel.as_mut().map(|p| {
                (
                    p.epoch,
                    p.group_id.clone(),
                    p.assigned.begin(),
                    p.unassigned.begin(),
                )
            })
        };
        let Some((epoch, group_id, t_assigned, t_unassigned)) = started else {
            return;
        };

        let (assigned, unassigned) = tokio::join!(
            self.repo.list_assigned_students(&group_id),
            self.repo.list_unassigned_students(&group_id),
        );

        let mut st = self.state.borrow_mut();
        match st.panel_for(epoch) {
            Some(p) => {
                p.assigned.complete(t_assigned, assigned);
                p.unassigned.complete(t_unassigned, unassigned);
            }
            None => tracing::debug!("panel for {} closed, dropping its lists", group_id),
        }
    }

    pub async fn refresh(&self) {
        tokio::join!(self.refresh_groups(), self.refresh_panel());
    }

    pub async fn select_group(&self, group_id: &str) -> Result<()> {
        let name = {
            let st = self.state.borrow();
            st.groups
                .items()
                .and_then(|gs| gs.iter().find(|g| g.group_id == group_id))
                .map(|g| g.name.clone())
        };
        let name = match name {
            Some(n) => n,
            None => match self.repo.get_group(group_id).await? {
                Some(g) if g.teacher_id == self.teacher_id => g.name,
                Some(_) => {
                    return Err(AppError::Forbidden(format!(
                        "group {} belongs to another teacher",
                        group_id
                    )))
                }
                None => return Err(AppError::NotFound(format!("group {}", group_id))),
            },
        };
        {
            let mut st = self.state.borrow_mut();
            st.epochs += 1;
            let epoch = st.epochs;
            st.panel = Some(Panel {
                epoch,
                group_id: group_id.to_string(),
                group_name: name,
                assigned: ListSlot::new(),
                unassigned: ListSlot::new(),
            });
        }
        self.refresh_panel().await;
        Ok(())
    }

    /// Close the panel. Anything still in flight for it is ignored.
    pub fn back(&self) {
        let mut st = self.state.borrow_mut();
        if let Some(mut p) = st.panel.take() {
            p.assigned.cancel();
            p.unassigned.cancel();
        }
    }

    pub async fn create_group(&self, name: &str, grade: &str, subject: &str) -> Result<String> {
        let id = self
            .repo
            .create_group(&self.teacher_id, name, grade, subject)
            .await?;
        self.refresh_groups().await;
        Ok(id)
    }

    pub async fn delete_group(&self, group_id: &str) -> Result<()> {
        if let Some(owner) = self.repo.group_owner(group_id).await? {
            if owner != self.teacher_id {
                return Err(AppError::Forbidden(format!(
                    "group {} belongs to another teacher",
                    group_id
                )));
            }
        }
        self.repo.delete_group(group_id).await?;
        if self.selected_group().as_deref() == Some(group_id) {
            self.back();
        }
        self.state.borrow_mut().groups.patch(|gs| {
            gs.retain(|g| g.group_id != group_id);
        });
        self.refresh_groups().await;
        Ok(())
    }

    pub async fn add_student(&self, student_id: &str) -> Result<()> {
        let group_id = self.require_panel()?;
        self.move_student(student_id, true);
        let res = self.repo.add_membership(&group_id, student_id).await;
        self.refresh_panel().await;
        self.refresh_groups().await;
        res
    }

    pub async fn remove_student(&self, student_id: &str) -> Result<()> {
        let group_id = self.require_panel()?;
        self.move_student(student_id, false);
        let res = self.repo.remove_membership(&group_id, student_id).await;
        self.refresh_panel().await;
        self.refresh_groups().await;
        res
    }

    fn require_panel(&self) -> Result<String> {
        self.selected_group()
            .ok_or_else(|| AppError::Validation("no group selected".into()))
    }

    /// Optimistically move a student between the panel's two lists.
    fn move_student(&self, student_id: &str, into_group: bool) {
        let mut st = self.state.borrow_mut();
        let Some(p) = st.panel.as_mut() else {
            return;
        };
        let (from, to) = if into_group {
            (&mut p.unassigned, &mut p.assigned)
        } else {
            (&mut p.assigned, &mut p.unassigned)
        };
        let mut moved = None;
        from.patch(|items| {
            if let Some(i) = items.iter().position(|s| s.student_id == student_id) {
                moved = Some(items.remove(i));
            }
        });
        if let Some(entry) = moved {
            to.patch(|items| {
                if !items.iter().any(|s| s.student_id == entry.student_id) {
                    items.push(entry);
                }
            });
        }
    }
}
