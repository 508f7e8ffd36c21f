use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Teacher,
    Student,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "teacher" => Some(Role::Teacher),
            "student" => Some(Role::Student),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `users/{userId}` as stored. The short code keeps its historical wire
/// name `studentId`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDoc {
    pub role: Role,
    pub email: String,
    #[serde(rename = "studentId", default, skip_serializing_if = "Option::is_none")]
    pub student_code: Option<String>,
}

/// `groups/{groupId}` as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDoc {
    pub name: String,
    pub grade: String,
    pub subject: String,
    pub teacher_id: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub students: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub student_code: Option<String>,
}

impl User {
    pub fn from_doc(id: String, doc: UserDoc) -> Self {
        Self {
            id,
            email: doc.email,
            role: doc.role,
            student_code: doc.student_code,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub group_id: String,
    pub student_id: String,
    /// Copy of the student's code taken when the membership was written.
    pub student_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    pub name: String,
    pub grade: String,
    pub subject: String,
    pub teacher_id: String,
    pub members: Vec<Membership>,
}

impl Group {
    pub fn from_doc(id: String, doc: GroupDoc) -> Self {
        let members = doc
            .students
            .into_iter()
            .map(|(student_id, student_code)| Membership {
                group_id: id.clone(),
                student_id,
                student_code,
            })
            .collect();
        Self {
            id,
            name: doc.name,
            grade: doc.grade,
            subject: doc.subject,
            teacher_id: doc.teacher_id,
            members,
        }
    }

    pub fn has_member(&self, student_id: &str) -> bool {
        self.members.iter().any(|m| m.student_id == student_id)
    }
}

/// A student as shown in the add/remove lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentEntry {
    pub student_id: String,
    pub code: String,
}
