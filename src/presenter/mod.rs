//! Screen state for the two dashboards.
//!
//! Presenters are driven from a single thread. State lives in a `RefCell`
//! that is never borrowed across an `.await`, so two refreshes of the same
//! screen may interleave; [`ListSlot`] tickets decide which result wins.

mod student;
mod teacher;

use crate::auth::Session;
use crate::error::{AppError, Result};
use crate::model::Role;
use crate::repository::GroupRepository;
use serde::Serialize;

pub use student::{StudentDashboard, StudentGroupItem, StudentView};
pub use teacher::{GroupItem, PanelView, TeacherDashboard, TeacherView};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ListState<T> {
    Idle,
    Loading,
    Ready { items: Vec<T> },
    Failed { message: String, retryable: bool },
}

/// One fetched list plus the bookkeeping that keeps late results from
/// overwriting newer ones.
#[derive(Debug)]
pub struct ListSlot<T> {
    issued: u64,
    applied: u64,
    state: ListState<T>,
}

impl<T> Default for ListSlot<T> {
    fn default() -> Self {
        Self {
            issued: 0,
            applied: 0,
            state: ListState::Idle,
        }
    }
}

impl<T: Clone> ListSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fetch. Items already on screen stay visible until the
    /// result lands.
    pub fn begin(&mut self) -> Ticket {
        self.issued += 1;
        if matches!(self.state, ListState::Idle | ListState::Failed { .. }) {
            self.state = ListState::Loading;
        }
        Ticket(self.issued)
    }

    /// Apply a fetch result unless a newer one was already applied or the
    /// slot was cancelled since the ticket was issued. Returns whether the
    /// result was applied.
    pub fn complete(&mut self, ticket: Ticket, result: Result<Vec<T>>) -> bool {
        if ticket.0 <= self.applied {
            return false;
        }
        self.applied = ticket.0;
        self.state = match result {
            Ok(items) => ListState::Ready { items },
            Err(e) => ListState::Failed {
                retryable: e.is_retryable(),
                message: e.to_string(),
            },
        };
        true
    }

    /// Invalidate every outstanding ticket.
    pub fn cancel(&mut self) {
        self.applied = self.issued;
        if matches!(self.state, ListState::Loading) {
            self.state = ListState::Idle;
        }
    }

    pub fn is_pending(&self) -> bool {
        self.issued > self.applied
    }

    pub fn state(&self) -> &ListState<T> {
        &self.state
    }

    pub fn items(&self) -> Option<&[T]> {
        match &self.state {
            ListState::Ready { items } => Some(items),
            _ => None,
        }
    }

    /// Optimistic local edit; only meaningful once the list is loaded.
    pub fn patch(&mut self, f: impl FnOnce(&mut Vec<T>)) {
        if let ListState::Ready { items } = &mut self.state {
            f(items);
        }
    }

    pub fn view(&self) -> ListView<T> {
        ListView {
            state: self.state.clone(),
            refreshing: self.is_pending(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListView<T> {
    #[serde(flatten)]
    pub state: ListState<T>,
    pub refreshing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Loading,
    Ready,
    Failed,
}

impl Phase {
    fn of<T>(state: &ListState<T>) -> Self {
        match state {
            ListState::Idle | ListState::Loading => Phase::Loading,
            ListState::Ready { .. } => Phase::Ready,
            ListState::Failed { .. } => Phase::Failed,
        }
    }
}

/// The screen a signed-in user lands on.
pub enum Dashboard {
    Teacher(TeacherDashboard),
    Student(StudentDashboard),
}

impl Dashboard {
    pub fn for_session(repo: GroupRepository, session: &Session) -> Self {
        match session.role {
            Role::Teacher => {
                Dashboard::Teacher(TeacherDashboard::new(repo, session.user_id.clone()))
            }
            Role::Student => {
                Dashboard::Student(StudentDashboard::new(repo, session.user_id.clone()))
            }
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Dashboard::Teacher(_) => Role::Teacher,
            Dashboard::Student(_) => Role::Student,
        }
    }

    pub async fn refresh(&self) {
        match self {
            Dashboard::Teacher(d) => d.refresh().await,
            Dashboard::Student(d) => {
                d.refresh().await;
            }
        }
    }

    pub fn view(&self) -> Result<serde_json::Value> {
        let v = match self {
            Dashboard::Teacher(d) => serde_json::to_value(d.view())?,
            Dashboard::Student(d) => serde_json::to_value(d.view())?,
        };
        Ok(v)
    }

    pub fn teacher(&self) -> Result<&TeacherDashboard> {
        match self {
            Dashboard::Teacher(d) => Ok(d),
            Dashboard::Student(_) => Err(AppError::Forbidden(
                "only teachers can manage groups".into(),
            )),
        }
    }
}
