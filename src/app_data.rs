use chrono::{DateTime, Utc};
use tracing::debug;

use crate::db::Database;
use crate::models::{AnalyticsData, Subject, Task, User};
use crate::processing;

/// Everything one page render needs, read fresh from the store.
#[derive(Debug, Default)]
pub struct AppData {
    pub subjects: Vec<Subject>,
    pub followed: Vec<i64>,
    pub tasks: Vec<Task>,
}

impl AppData {
    pub fn load(db: &Database, viewer: &User) -> anyhow::Result<Self> {
        let subjects = db.list_subjects()?;
        let followed = db.followed_subject_ids(viewer.id)?;
        let tasks = db.list_tasks_for(viewer)?;
        debug!(
            user_id = viewer.id,
            subjects = subjects.len(),
            followed = followed.len(),
            tasks = tasks.len(),
            "loaded app data"
        );
        Ok(Self {
            subjects,
            followed,
            tasks,
        })
    }

    pub fn is_following(&self, subject_id: i64) -> bool {
        self.followed.contains(&subject_id)
    }

    pub fn my_subjects(&self) -> Vec<Subject> {
        processing::process_subject_data(&self.subjects, &self.followed, &self.tasks)
    }

    pub fn subject(&self, id: i64) -> Option<&Subject> {
        self.subjects.iter().find(|subject| subject.id == id)
    }

    pub fn task(&self, id: i64) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    /// Subjects whose open tasks make up the unfiltered task list. Admins
    /// manage every subject, students only see what they follow.
    pub fn task_scope(&self, viewer: &User) -> Vec<i64> {
        if viewer.is_admin() {
            self.subjects.iter().map(|subject| subject.id).collect()
        } else {
            self.followed.clone()
        }
    }

    pub fn visible_tasks(&self, viewer: &User, selected_subject: Option<i64>) -> Vec<Task> {
        processing::filter_tasks(&self.tasks, selected_subject, &self.task_scope(viewer))
    }

    pub fn analytics(&self, now: DateTime<Utc>) -> AnalyticsData {
        processing::generate_analytics_data(&self.tasks, &self.my_subjects(), &self.followed, now)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::models::{Role, SubjectDraft, TaskDraft, TaskType};

    fn seeded() -> (Database, User, User) {
        let db = Database::connect(":memory:").unwrap();
        let admin = db.create_user("admin", "x", Role::Admin).unwrap();
        let student = db.create_user("sari", "x", Role::Student).unwrap();
        for (name, code) in [("Pemrograman Web", "TIF-301"), ("Basis Data", "TIF-302")] {
            let subject = db
                .add_subject(
                    &SubjectDraft {
                        name: name.to_string(),
                        code: code.to_string(),
                        semester: "Semester 5".to_string(),
                        description: None,
                    },
                    admin.id,
                )
                .unwrap();
            db.add_task(
                &TaskDraft {
                    title: format!("Quiz {name}"),
                    description: String::new(),
                    deadline: Utc.with_ymd_and_hms(2024, 6, 10, 23, 59, 59).unwrap(),
                    task_type: TaskType::Quiz,
                    subject_id: subject.id,
                },
                admin.id,
            )
            .unwrap();
        }
        (db, admin, student)
    }

    #[test]
    fn student_snapshot_is_limited_to_followed_subjects() {
        let (db, _, student) = seeded();
        let basis = db.list_subjects().unwrap().into_iter().find(|s| s.code == "TIF-302").unwrap();
        db.follow(student.id, basis.id).unwrap();

        let data = AppData::load(&db, &student).unwrap();
        assert_eq!(data.subjects.len(), 2);
        assert_eq!(data.tasks.len(), 1);
        assert_eq!(data.visible_tasks(&student, None).len(), 1);

        let mine = data.my_subjects();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].task_count, 1);

        let analytics = data.analytics(Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap());
        assert_eq!(analytics.total_tasks, 1);
        assert_eq!(analytics.overdue_tasks, 1);
    }

    #[test]
    fn admin_task_list_covers_every_subject() {
        let (db, admin, _) = seeded();
        let data = AppData::load(&db, &admin).unwrap();
        assert_eq!(data.visible_tasks(&admin, None).len(), 2);
        // analytics still follow the admin's own subscriptions
        assert_eq!(data.analytics(Utc::now()).total_tasks, 0);
    }
}
