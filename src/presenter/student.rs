use super::{ListSlot, ListView, Phase};
use crate::model::Group;
use crate::repository::GroupRepository;
use serde::Serialize;
use std::cell::RefCell;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentGroupItem {
    pub group_id: String,
    pub name: String,
    pub grade: String,
    pub subject: String,
    pub student_count: usize,
    pub label: String,
    pub count_label: String,
}

impl From<Group> for StudentGroupItem {
    fn from(g: Group) -> Self {
        let count = g.members.len();
        Self {
            label: format!("{} | Grade: {} | Subject: {}", g.name, g.grade, g.subject),
            count_label: format!("Students: {}", count),
            student_count: count,
            group_id: g.id,
            name: g.name,
            grade: g.grade,
            subject: g.subject,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentView {
    pub role: &'static str,
    pub student_id: String,
    pub phase: Phase,
    pub groups: ListView<StudentGroupItem>,
}

/// Read-only screen: the groups a student has been added to.
pub struct StudentDashboard {
    repo: GroupRepository,
    student_id: String,
    groups: RefCell<ListSlot<StudentGroupItem>>,
}

impl StudentDashboard {
    pub fn new(repo: GroupRepository, student_id: String) -> Self {
        Self {
            repo,
            student_id,
            groups: RefCell::new(ListSlot::new()),
        }
    }

    pub async fn refresh(&self) -> bool {
        let ticket = self.groups.borrow_mut().begin();
        let result = self
            .repo
            .list_groups_for_student(&self.student_id)
            .await
            .map(|gs| gs.into_iter().map(StudentGroupItem::from).collect());
        let applied = self.groups.borrow_mut().complete(ticket, result);
        if !applied {
            tracing::debug!("discarded stale student group list {:?}", ticket);
        }
        applied
    }

    pub fn view(&self) -> StudentView {
        let slot = self.groups.borrow();
        StudentView {
            role: "student",
            student_id: self.student_id.clone(),
            phase: Phase::of(slot.state()),
            groups: slot.view(),
        }
    }
}
