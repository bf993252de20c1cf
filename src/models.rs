use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::Serialize;

pub const SEMESTERS: [&str; 8] = [
    "Semester 1",
    "Semester 2",
    "Semester 3",
    "Semester 4",
    "Semester 5",
    "Semester 6",
    "Semester 7",
    "Semester 8",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Student,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Student => "student",
        }
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "admin" => Ok(Role::Admin),
            "student" => Ok(Role::Student),
            other => Err(FromSqlError::Other(format!("unknown role {other}").into())),
        }
    }
}

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

/// The signed-in user. Passed explicitly into every operation that needs to
/// know who is asking.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subject {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub semester: String,
    pub description: Option<String>,
    pub task_count: usize,
    pub completed_tasks: usize,
}

/// Subject columns fetched together with a task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectSummary {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub semester: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskType {
    Tugas,
    Project,
    Quiz,
    #[serde(rename = "UTS")]
    Uts,
    #[serde(rename = "UAS")]
    Uas,
    Presentasi,
    Praktikum,
}

impl TaskType {
    pub const ALL: [TaskType; 7] = [
        TaskType::Project,
        TaskType::Quiz,
        TaskType::Uts,
        TaskType::Uas,
        TaskType::Tugas,
        TaskType::Praktikum,
        TaskType::Presentasi,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Tugas => "Tugas",
            TaskType::Project => "Project",
            TaskType::Quiz => "Quiz",
            TaskType::Uts => "UTS",
            TaskType::Uas => "UAS",
            TaskType::Presentasi => "Presentasi",
            TaskType::Praktikum => "Praktikum",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskType::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown task type {s:?}"))
    }
}

impl FromSql for TaskType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|err: String| FromSqlError::Other(err.into()))
    }
}

impl ToSql for TaskType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub deadline: DateTime<Utc>,
    pub task_type: TaskType,
    pub subject_id: i64,
    pub subject: Option<SubjectSummary>,
    pub completed: bool,
    pub user_id: Option<i64>,
    pub created_by: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAnalysis {
    pub subject: String,
    pub completion: usize,
    pub total: usize,
    pub percentage: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsData {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub total_subjects: usize,
    pub overdue_tasks: usize,
    pub subject_analysis: Vec<SubjectAnalysis>,
}

/// Validated input for creating or updating a subject.
#[derive(Debug, Clone)]
pub struct SubjectDraft {
    pub name: String,
    pub code: String,
    pub semester: String,
    pub description: Option<String>,
}

/// Validated input for creating or fully updating a task.
#[derive(Debug, Clone)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub deadline: DateTime<Utc>,
    pub task_type: TaskType,
    pub subject_id: i64,
}
