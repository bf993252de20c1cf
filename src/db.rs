use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::{Role, Subject, SubjectDraft, SubjectSummary, Task, TaskDraft, User};

const TASK_COLUMNS: &str = "t.id, t.title, t.description, t.deadline, t.task_type, t.subject_id, \
     t.completed, t.user_id, t.created_by, s.id, s.name, s.code, s.semester";

const SUBJECT_COLUMNS: &str = "id, name, code, semester, description";

const USER_COLUMNS: &str = "id, username, role, created_at";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn connect<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("opening database at {}", path.as_ref().display()))?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("enabling foreign keys")?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> anyhow::Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'student',
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                expires_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS subjects (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                code TEXT NOT NULL,
                semester TEXT NOT NULL,
                description TEXT,
                created_by INTEGER REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE TABLE IF NOT EXISTS user_subjects (
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                subject_id INTEGER NOT NULL REFERENCES subjects(id) ON DELETE CASCADE,
                PRIMARY KEY (user_id, subject_id)
            );
            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                deadline TEXT NOT NULL,
                task_type TEXT NOT NULL,
                subject_id INTEGER NOT NULL REFERENCES subjects(id) ON DELETE CASCADE,
                completed INTEGER NOT NULL DEFAULT 0,
                user_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
                created_by INTEGER REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS tasks_subject_idx ON tasks(subject_id);
            "#,
        )?;
        Ok(())
    }

    // users & sessions

    pub fn create_user(&self, username: &str, password_hash: &str, role: Role) -> anyhow::Result<User> {
        let now = Utc::now();
        self.conn
            .execute(
                "INSERT INTO users (username, password_hash, role, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![username, password_hash, role, format_datetime(now)],
            )
            .with_context(|| format!("creating user {username}"))?;
        Ok(User {
            id: self.conn.last_insert_rowid(),
            username: username.to_string(),
            role,
            created_at: parse_datetime(&format_datetime(now))?,
        })
    }

    /// The user together with their stored password hash.
    pub fn find_credentials(&self, username: &str) -> anyhow::Result<Option<(User, String)>> {
        let found = self
            .conn
            .query_row(
                &format!("SELECT {USER_COLUMNS}, password_hash FROM users WHERE username = ?1"),
                params![username],
                |row| Ok((user_from_row(row)?, row.get::<_, String>(4)?)),
            )
            .optional()?;
        Ok(found)
    }

    pub fn set_role(&self, user_id: i64, role: Role) -> anyhow::Result<()> {
        let updated = self
            .conn
            .execute("UPDATE users SET role = ?1 WHERE id = ?2", params![role, user_id])?;
        if updated == 0 {
            anyhow::bail!("user {user_id} not found");
        }
        Ok(())
    }

    pub fn set_password_hash(&self, user_id: i64, password_hash: &str) -> anyhow::Result<()> {
        self.conn.execute(
            "UPDATE users SET password_hash = ?1 WHERE id = ?2",
            params![password_hash, user_id],
        )?;
        Ok(())
    }

    pub fn create_session(&self, token: &str, user_id: i64, expires_at: DateTime<Utc>) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
            params![token, user_id, format_datetime(expires_at)],
        )?;
        Ok(())
    }

    pub fn session_user(&self, token: &str, now: DateTime<Utc>) -> anyhow::Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT u.id, u.username, u.role, u.created_at FROM sessions s \
                 JOIN users u ON u.id = s.user_id \
                 WHERE s.token = ?1 AND s.expires_at > ?2",
                params![token, format_datetime(now)],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn delete_session(&self, token: &str) -> anyhow::Result<()> {
        self.conn
            .execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
        Ok(())
    }

    pub fn purge_expired_sessions(&self, now: DateTime<Utc>) -> anyhow::Result<usize> {
        let purged = self.conn.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            params![format_datetime(now)],
        )?;
        Ok(purged)
    }

    // subjects

    pub fn list_subjects(&self) -> anyhow::Result<Vec<Subject>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SUBJECT_COLUMNS} FROM subjects ORDER BY semester ASC, name ASC"
        ))?;
        let rows = stmt.query_map([], subject_from_row)?;

        let mut subjects = Vec::new();
        for subject in rows {
            subjects.push(subject?);
        }
        Ok(subjects)
    }

    pub fn get_subject(&self, id: i64) -> anyhow::Result<Option<Subject>> {
        let subject = self
            .conn
            .query_row(
                &format!("SELECT {SUBJECT_COLUMNS} FROM subjects WHERE id = ?1"),
                params![id],
                subject_from_row,
            )
            .optional()?;
        Ok(subject)
    }

    pub fn add_subject(&self, draft: &SubjectDraft, created_by: i64) -> anyhow::Result<Subject> {
        self.conn.execute(
            "INSERT INTO subjects (name, code, semester, description, created_by) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![draft.name, draft.code, draft.semester, draft.description, created_by],
        )?;
        Ok(Subject {
            id: self.conn.last_insert_rowid(),
            name: draft.name.clone(),
            code: draft.code.clone(),
            semester: draft.semester.clone(),
            description: draft.description.clone(),
            task_count: 0,
            completed_tasks: 0,
        })
    }

    pub fn update_subject(&self, id: i64, draft: &SubjectDraft) -> anyhow::Result<()> {
        let updated = self.conn.execute(
            "UPDATE subjects SET name = ?1, code = ?2, semester = ?3, description = ?4 WHERE id = ?5",
            params![draft.name, draft.code, draft.semester, draft.description, id],
        )?;
        if updated == 0 {
            anyhow::bail!("subject {id} not found");
        }
        Ok(())
    }

    /// Tasks and follow relations go with the subject.
    pub fn delete_subject(&self, id: i64) -> anyhow::Result<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM subjects WHERE id = ?1", params![id])?;
        if deleted == 0 {
            anyhow::bail!("subject {id} not found");
        }
        Ok(())
    }

    // follows

    pub fn followed_subject_ids(&self, user_id: i64) -> anyhow::Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT subject_id FROM user_subjects WHERE user_id = ?1 ORDER BY subject_id")?;
        let rows = stmt.query_map(params![user_id], |row| row.get(0))?;

        let mut ids = Vec::new();
        for id in rows {
            ids.push(id?);
        }
        Ok(ids)
    }

    pub fn follow(&self, user_id: i64, subject_id: i64) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT INTO user_subjects (user_id, subject_id) VALUES (?1, ?2)",
            params![user_id, subject_id],
        )?;
        Ok(())
    }

    pub fn unfollow(&self, user_id: i64, subject_id: i64) -> anyhow::Result<()> {
        let deleted = self.conn.execute(
            "DELETE FROM user_subjects WHERE user_id = ?1 AND subject_id = ?2",
            params![user_id, subject_id],
        )?;
        if deleted == 0 {
            anyhow::bail!("user {user_id} does not follow subject {subject_id}");
        }
        Ok(())
    }

    // tasks

    /// Tasks the viewer may see: everything for admins, only tasks of
    /// followed subjects for everyone else. Ordered by deadline.
    pub fn list_tasks_for(&self, viewer: &User) -> anyhow::Result<Vec<Task>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks t LEFT JOIN subjects s ON s.id = t.subject_id \
             WHERE ?1 OR t.subject_id IN (SELECT subject_id FROM user_subjects WHERE user_id = ?2) \
             ORDER BY t.deadline ASC, t.id ASC"
        ))?;
        let rows = stmt.query_map(params![viewer.is_admin(), viewer.id], task_from_row)?;

        let mut tasks = Vec::new();
        for task in rows {
            tasks.push(task?);
        }
        Ok(tasks)
    }

    /// A single task, subject to the same visibility rule as `list_tasks_for`.
    pub fn get_task_for(&self, viewer: &User, id: i64) -> anyhow::Result<Option<Task>> {
        let task = self
            .conn
            .query_row(
                &format!(
                    "SELECT {TASK_COLUMNS} FROM tasks t LEFT JOIN subjects s ON s.id = t.subject_id \
                     WHERE t.id = ?1 AND (?2 OR t.subject_id IN \
                     (SELECT subject_id FROM user_subjects WHERE user_id = ?3))"
                ),
                params![id, viewer.is_admin(), viewer.id],
                task_from_row,
            )
            .optional()?;
        Ok(task)
    }

    pub fn add_task(&self, draft: &TaskDraft, owner: i64) -> anyhow::Result<i64> {
        self.conn.execute(
            "INSERT INTO tasks (title, description, deadline, task_type, subject_id, completed, user_id, created_by) \
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)",
            params![
                draft.title,
                draft.description,
                format_datetime(draft.deadline),
                draft.task_type,
                draft.subject_id,
                owner
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn update_task(&self, id: i64, draft: &TaskDraft) -> anyhow::Result<()> {
        let updated = self.conn.execute(
            "UPDATE tasks SET title = ?1, description = ?2, deadline = ?3, task_type = ?4, subject_id = ?5 \
             WHERE id = ?6",
            params![
                draft.title,
                draft.description,
                format_datetime(draft.deadline),
                draft.task_type,
                draft.subject_id,
                id
            ],
        )?;
        if updated == 0 {
            anyhow::bail!("task {id} not found");
        }
        Ok(())
    }

    pub fn set_completed(&self, id: i64, completed: bool) -> anyhow::Result<()> {
        let updated = self.conn.execute(
            "UPDATE tasks SET completed = ?1 WHERE id = ?2",
            params![completed, id],
        )?;
        if updated == 0 {
            anyhow::bail!("task {id} not found");
        }
        Ok(())
    }

    pub fn set_deadline(&self, id: i64, deadline: DateTime<Utc>) -> anyhow::Result<()> {
        let updated = self.conn.execute(
            "UPDATE tasks SET deadline = ?1 WHERE id = ?2",
            params![format_datetime(deadline), id],
        )?;
        if updated == 0 {
            anyhow::bail!("task {id} not found");
        }
        Ok(())
    }

    pub fn delete_task(&self, id: i64) -> anyhow::Result<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        if deleted == 0 {
            anyhow::bail!("task {id} not found");
        }
        Ok(())
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let created_at: String = row.get(3)?;
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        role: row.get(2)?,
        created_at: datetime_column(3, &created_at)?,
    })
}

fn subject_from_row(row: &Row<'_>) -> rusqlite::Result<Subject> {
    Ok(Subject {
        id: row.get(0)?,
        name: row.get(1)?,
        code: row.get(2)?,
        semester: row.get(3)?,
        description: row.get(4)?,
        task_count: 0,
        completed_tasks: 0,
    })
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let deadline: String = row.get(3)?;
    let subject = match row.get::<_, Option<i64>>(9)? {
        Some(id) => Some(SubjectSummary {
            id,
            name: row.get(10)?,
            code: row.get(11)?,
            semester: row.get(12)?,
        }),
        None => None,
    };
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        deadline: datetime_column(3, &deadline)?,
        task_type: row.get(4)?,
        subject_id: row.get(5)?,
        completed: row.get(6)?,
        user_id: row.get(7)?,
        created_by: row.get(8)?,
        subject,
    })
}

fn datetime_column(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    parse_datetime(value).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, err.into())
    })
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering.
pub fn format_datetime(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_datetime(value: &str) -> anyhow::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("invalid timestamp {value:?}"))
}
