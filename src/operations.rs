//! Writes issued from the page. Each operation checks the caller, performs
//! one store write and reports the outcome as a notice. The page is reloaded
//! from the store after every write, so no local state is patched here.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::TaskCreation;
use crate::db::Database;
use crate::error::AppError;
use crate::models::{SubjectDraft, TaskDraft, TaskType, User, SEMESTERS};
use crate::notice::Notice;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ToggleFollow,
    AddSubject,
    UpdateSubject,
    DeleteSubject,
    AddTask,
    UpdateTask,
    DeleteTask,
    ToggleComplete,
    UpdateDeadline,
}

impl Operation {
    pub fn failure(self) -> Notice {
        match self {
            Operation::ToggleFollow => Notice::FollowFailed,
            Operation::AddSubject => Notice::SubjectAddFailed,
            Operation::UpdateSubject => Notice::SubjectUpdateFailed,
            Operation::DeleteSubject => Notice::SubjectDeleteFailed,
            Operation::AddTask => Notice::TaskAddFailed,
            Operation::UpdateTask => Notice::TaskUpdateFailed,
            Operation::DeleteTask => Notice::TaskDeleteFailed,
            Operation::ToggleComplete => Notice::TaskToggleFailed,
            Operation::UpdateDeadline => Notice::DeadlineUpdateFailed,
        }
    }
}

/// Collapses an operation result into the notice shown to the user.
pub fn settle(op: Operation, user: &User, result: Result<Notice, AppError>) -> Notice {
    match result {
        Ok(notice) => notice,
        Err(err) => {
            warn!(?op, user_id = user.id, error = %err, "operation failed");
            op.failure()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SubjectForm {
    pub name: String,
    pub code: String,
    pub semester: String,
    #[serde(default)]
    pub description: String,
}

impl SubjectForm {
    pub fn validate(&self) -> Result<SubjectDraft, AppError> {
        let name = required(&self.name, "name")?;
        let code = required(&self.code, "code")?;
        let semester = required(&self.semester, "semester")?;
        if !SEMESTERS.contains(&semester.as_str()) {
            return Err(AppError::Validation(format!("unknown semester {semester:?}")));
        }
        let description = Some(self.description.trim().to_string()).filter(|d| !d.is_empty());
        Ok(SubjectDraft {
            name,
            code,
            semester,
            description,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct TaskForm {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub deadline: String,
    pub task_type: String,
    pub subject_id: i64,
}

impl TaskForm {
    pub fn validate(&self) -> Result<TaskDraft, AppError> {
        Ok(TaskDraft {
            title: required(&self.title, "title")?,
            description: self.description.trim().to_string(),
            deadline: parse_deadline(&self.deadline)?,
            task_type: self.task_type.parse::<TaskType>().map_err(AppError::Validation)?,
            subject_id: self.subject_id,
        })
    }
}

fn required(value: &str, field: &str) -> Result<String, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}

/// Accepts `YYYY-MM-DD` (due at the end of that day) or `YYYY-MM-DDTHH:MM`,
/// both read as UTC.
pub fn parse_deadline(value: &str) -> Result<DateTime<Utc>, AppError> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(end_of_day) = date.and_hms_opt(23, 59, 59) {
            return Ok(end_of_day.and_utc());
        }
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M")
        .map(|dt| dt.and_utc())
        .map_err(|_| AppError::Validation(format!("invalid deadline {value:?}")))
}

fn require_admin(user: &User, action: &'static str) -> Result<(), AppError> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden(action))
    }
}

pub fn can_create_tasks(user: &User, policy: TaskCreation) -> bool {
    user.is_admin() || policy == TaskCreation::Everyone
}

pub fn toggle_follow(db: &Database, user: &User, subject_id: i64) -> Result<Notice, AppError> {
    db.get_subject(subject_id)?.ok_or(AppError::NotFound("subject"))?;
    if db.followed_subject_ids(user.id)?.contains(&subject_id) {
        db.unfollow(user.id, subject_id)?;
        info!(user_id = user.id, subject_id, "unfollowed subject");
        Ok(Notice::Unfollowed)
    } else {
        db.follow(user.id, subject_id)?;
        info!(user_id = user.id, subject_id, "followed subject");
        Ok(Notice::Followed)
    }
}

pub fn add_subject(db: &Database, user: &User, form: &SubjectForm) -> Result<Notice, AppError> {
    require_admin(user, "add subjects")?;
    let subject = db.add_subject(&form.validate()?, user.id)?;
    info!(subject_id = subject.id, code = %subject.code, "added subject");
    Ok(Notice::SubjectAdded)
}

pub fn update_subject(db: &Database, user: &User, subject_id: i64, form: &SubjectForm) -> Result<Notice, AppError> {
    require_admin(user, "edit subjects")?;
    let draft = form.validate()?;
    db.get_subject(subject_id)?.ok_or(AppError::NotFound("subject"))?;
    db.update_subject(subject_id, &draft)?;
    info!(subject_id, "updated subject");
    Ok(Notice::SubjectUpdated)
}

pub fn delete_subject(db: &Database, user: &User, subject_id: i64) -> Result<Notice, AppError> {
    require_admin(user, "delete subjects")?;
    db.get_subject(subject_id)?.ok_or(AppError::NotFound("subject"))?;
    db.delete_subject(subject_id)?;
    info!(subject_id, "deleted subject");
    Ok(Notice::SubjectDeleted)
}

/// Admins may file a task under any subject, students only under one they
/// follow and only when the policy lets students create tasks.
pub fn add_task(db: &Database, user: &User, policy: TaskCreation, form: &TaskForm) -> Result<Notice, AppError> {
    if !can_create_tasks(user, policy) {
        return Err(AppError::Forbidden("create tasks"));
    }
    let draft = form.validate()?;
    db.get_subject(draft.subject_id)?
        .ok_or(AppError::NotFound("subject"))?;
    if !user.is_admin() && !db.followed_subject_ids(user.id)?.contains(&draft.subject_id) {
        return Err(AppError::Forbidden("add tasks to an unfollowed subject"));
    }
    let task_id = db.add_task(&draft, user.id)?;
    info!(task_id, subject_id = draft.subject_id, "added task");
    Ok(Notice::TaskAdded)
}

pub fn update_task(db: &Database, user: &User, task_id: i64, form: &TaskForm) -> Result<Notice, AppError> {
    require_admin(user, "edit tasks")?;
    let draft = form.validate()?;
    db.get_task_for(user, task_id)?.ok_or(AppError::NotFound("task"))?;
    db.get_subject(draft.subject_id)?
        .ok_or(AppError::NotFound("subject"))?;
    db.update_task(task_id, &draft)?;
    info!(task_id, "updated task");
    Ok(Notice::TaskUpdated)
}

pub fn delete_task(db: &Database, user: &User, task_id: i64) -> Result<Notice, AppError> {
    require_admin(user, "delete tasks")?;
    db.get_task_for(user, task_id)?.ok_or(AppError::NotFound("task"))?;
    db.delete_task(task_id)?;
    info!(task_id, "deleted task");
    Ok(Notice::TaskDeleted)
}

pub fn toggle_complete(db: &Database, user: &User, task_id: i64) -> Result<Notice, AppError> {
    let task = db.get_task_for(user, task_id)?.ok_or(AppError::NotFound("task"))?;
    db.set_completed(task_id, !task.completed)?;
    info!(task_id, completed = !task.completed, "toggled task");
    Ok(if task.completed {
        Notice::TaskReopened
    } else {
        Notice::TaskCompleted
    })
}

pub fn update_deadline(db: &Database, user: &User, task_id: i64, deadline: &str) -> Result<Notice, AppError> {
    let deadline = parse_deadline(deadline)?;
    db.get_task_for(user, task_id)?.ok_or(AppError::NotFound("task"))?;
    db.set_deadline(task_id, deadline)?;
    info!(task_id, %deadline, "moved deadline");
    Ok(Notice::DeadlineUpdated)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::models::Role;

    struct Fixture {
        db: Database,
        admin: User,
        student: User,
        subject_id: i64,
    }

    fn fixture() -> Fixture {
        let db = Database::connect(":memory:").unwrap();
        let admin = db.create_user("admin", "x", Role::Admin).unwrap();
        let student = db.create_user("sari", "x", Role::Student).unwrap();
        add_subject(&db, &admin, &subject_form("Basis Data", "TIF-302")).unwrap();
        let subject_id = db.list_subjects().unwrap()[0].id;
        Fixture {
            db,
            admin,
            student,
            subject_id,
        }
    }

    fn subject_form(name: &str, code: &str) -> SubjectForm {
        SubjectForm {
            name: name.to_string(),
            code: code.to_string(),
            semester: "Semester 5".to_string(),
            description: String::new(),
        }
    }

    fn task_form(subject_id: i64) -> TaskForm {
        TaskForm {
            title: "Quiz Normalisasi".to_string(),
            description: "Bab 3".to_string(),
            deadline: "2024-06-10".to_string(),
            task_type: "Quiz".to_string(),
            subject_id,
        }
    }

    #[test]
    fn deadline_formats() {
        assert_eq!(
            parse_deadline("2024-06-10").unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 10, 23, 59, 59).unwrap()
        );
        assert_eq!(
            parse_deadline("2024-06-10T08:30").unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 10, 8, 30, 0).unwrap()
        );
        assert!(parse_deadline("10/06/2024").is_err());
        assert!(parse_deadline("").is_err());
    }

    #[test]
    fn blank_fields_are_rejected() {
        let mut form = subject_form("  ", "TIF-1");
        assert!(matches!(form.validate(), Err(AppError::Validation(_))));
        form.name = "Jaringan Komputer".into();
        form.semester = "Semester 9".into();
        assert!(matches!(form.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn follow_toggles() {
        let f = fixture();
        assert_eq!(toggle_follow(&f.db, &f.student, f.subject_id).unwrap(), Notice::Followed);
        assert_eq!(f.db.followed_subject_ids(f.student.id).unwrap(), vec![f.subject_id]);
        assert_eq!(toggle_follow(&f.db, &f.student, f.subject_id).unwrap(), Notice::Unfollowed);
        assert!(f.db.followed_subject_ids(f.student.id).unwrap().is_empty());
        assert!(matches!(toggle_follow(&f.db, &f.student, 999), Err(AppError::NotFound(_))));
    }

    #[test]
    fn catalog_is_admin_only() {
        let f = fixture();
        let form = subject_form("Sistem Operasi", "TIF-401");
        assert!(matches!(add_subject(&f.db, &f.student, &form), Err(AppError::Forbidden(_))));
        assert!(matches!(delete_subject(&f.db, &f.student, f.subject_id), Err(AppError::Forbidden(_))));
        assert_eq!(
            update_subject(&f.db, &f.admin, f.subject_id, &form).unwrap(),
            Notice::SubjectUpdated
        );
        assert_eq!(f.db.get_subject(f.subject_id).unwrap().unwrap().code, "TIF-401");
        assert_eq!(delete_subject(&f.db, &f.admin, f.subject_id).unwrap(), Notice::SubjectDeleted);
    }

    #[test]
    fn task_creation_follows_policy() {
        let f = fixture();
        let form = task_form(f.subject_id);

        assert!(matches!(
            add_task(&f.db, &f.student, TaskCreation::AdminOnly, &form),
            Err(AppError::Forbidden(_))
        ));
        // open policy still requires following the subject
        assert!(matches!(
            add_task(&f.db, &f.student, TaskCreation::Everyone, &form),
            Err(AppError::Forbidden(_))
        ));
        toggle_follow(&f.db, &f.student, f.subject_id).unwrap();
        assert_eq!(
            add_task(&f.db, &f.student, TaskCreation::Everyone, &form).unwrap(),
            Notice::TaskAdded
        );
        assert_eq!(
            add_task(&f.db, &f.admin, TaskCreation::AdminOnly, &form).unwrap(),
            Notice::TaskAdded
        );
        assert_eq!(f.db.list_tasks_for(&f.admin).unwrap().len(), 2);
    }

    #[test]
    fn toggling_twice_restores_task() {
        let f = fixture();
        add_task(&f.db, &f.admin, TaskCreation::AdminOnly, &task_form(f.subject_id)).unwrap();
        let original = f.db.list_tasks_for(&f.admin).unwrap().remove(0);

        assert_eq!(toggle_complete(&f.db, &f.admin, original.id).unwrap(), Notice::TaskCompleted);
        assert!(f.db.get_task_for(&f.admin, original.id).unwrap().unwrap().completed);
        assert_eq!(toggle_complete(&f.db, &f.admin, original.id).unwrap(), Notice::TaskReopened);
        assert_eq!(f.db.get_task_for(&f.admin, original.id).unwrap().unwrap(), original);
    }

    #[test]
    fn students_touch_only_visible_tasks() {
        let f = fixture();
        add_task(&f.db, &f.admin, TaskCreation::AdminOnly, &task_form(f.subject_id)).unwrap();
        let task_id = f.db.list_tasks_for(&f.admin).unwrap()[0].id;

        assert!(matches!(toggle_complete(&f.db, &f.student, task_id), Err(AppError::NotFound(_))));
        toggle_follow(&f.db, &f.student, f.subject_id).unwrap();
        assert_eq!(
            update_deadline(&f.db, &f.student, task_id, "2024-07-01").unwrap(),
            Notice::DeadlineUpdated
        );
        assert!(matches!(delete_task(&f.db, &f.student, task_id), Err(AppError::Forbidden(_))));
        assert!(matches!(
            update_task(&f.db, &f.student, task_id, &task_form(f.subject_id)),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn admin_updates_and_deletes_tasks() {
        let f = fixture();
        add_task(&f.db, &f.admin, TaskCreation::AdminOnly, &task_form(f.subject_id)).unwrap();
        let task_id = f.db.list_tasks_for(&f.admin).unwrap()[0].id;

        let mut form = task_form(f.subject_id);
        form.title = "UAS Basis Data".into();
        form.task_type = "UAS".into();
        assert_eq!(update_task(&f.db, &f.admin, task_id, &form).unwrap(), Notice::TaskUpdated);
        let task = f.db.get_task_for(&f.admin, task_id).unwrap().unwrap();
        assert_eq!(task.title, "UAS Basis Data");
        assert_eq!(task.task_type, TaskType::Uas);

        assert_eq!(delete_task(&f.db, &f.admin, task_id).unwrap(), Notice::TaskDeleted);
        assert!(matches!(delete_task(&f.db, &f.admin, task_id), Err(AppError::NotFound(_))));
    }

    #[test]
    fn failures_settle_into_operation_notice() {
        let f = fixture();
        let result = delete_task(&f.db, &f.admin, 42);
        assert_eq!(settle(Operation::DeleteTask, &f.admin, result), Notice::TaskDeleteFailed);
    }
}
