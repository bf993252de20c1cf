use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use axum::{
    extract::{Form, Query, State},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use clap::Parser;
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod app_data;
mod auth;
mod config;
mod db;
mod error;
mod models;
mod notice;
mod operations;
mod page;
mod processing;
mod views;

use app_data::AppData;
use auth::CurrentUser;
use config::{Config, TaskCreation};
use db::Database;
use error::AppError;
use models::AnalyticsData;
use notice::{set_flash, take_flash, Notice};
use operations::{Operation, SubjectForm, TaskForm};
use page::{safe_back, PageQuery, PageState};

#[derive(Clone)]
struct AppState {
    db_path: PathBuf,
    task_creation: TaskCreation,
    session_hours: i64,
}

impl AppState {
    fn db(&self) -> Result<Database, AppError> {
        Ok(Database::connect(&self.db_path)?)
    }
}

/// Record id and return page of a form post, carried in the action URL.
#[derive(Deserialize)]
struct Target {
    id: Option<i64>,
    back: Option<String>,
}

impl Target {
    fn back(&self) -> String {
        safe_back(self.back.as_deref())
    }

    fn id(&self, what: &'static str) -> Result<i64, AppError> {
        self.id.ok_or(AppError::NotFound(what))
    }
}

#[derive(Deserialize)]
struct ConfirmForm {
    confirmed: Option<String>,
}

#[derive(Deserialize)]
struct DeadlineForm {
    deadline: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    init_tracing(&config.log_level)?;

    let db = Database::connect(&config.db_path)?;
    let purged = db.purge_expired_sessions(Utc::now())?;
    debug!(purged, "purged expired sessions");
    if let (Some(user), Some(password)) = (&config.admin_user, &config.admin_password) {
        auth::ensure_admin(&db, user, password)?;
    }
    drop(db);

    let state = AppState {
        db_path: config.db_path.clone(),
        task_creation: config.task_creation,
        session_hours: config.session_hours,
    };
    let app = router(state);

    info!(
        addr = %config.bind,
        db = %config.db_path.display(),
        task_creation = ?config.task_creation,
        "studytrack running"
    );

    axum::serve(tokio::net::TcpListener::bind(config.bind).await?, app).await?;

    Ok(())
}

fn init_tracing(default_level: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/login", get(auth::login_page).post(auth::handle_login))
        .route("/register", get(auth::register_page).post(auth::handle_register))
        .route("/logout", post(auth::handle_logout))
        .route("/subjects/follow", post(toggle_follow))
        .route("/subjects/add", post(add_subject))
        .route("/subjects/update", post(update_subject))
        .route("/subjects/delete", get(confirm_delete_subject).post(delete_subject))
        .route("/tasks/add", post(add_task))
        .route("/tasks/update", post(update_task))
        .route("/tasks/toggle", post(toggle_complete))
        .route("/tasks/deadline", post(update_deadline))
        .route("/tasks/delete", get(confirm_delete_task).post(delete_task))
        .route("/api/analytics", get(analytics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
    Query(query): Query<PageQuery>,
) -> impl IntoResponse {
    let (jar, mut notice) = take_flash(jar);
    let page = PageState::from_query(&query, &user);

    let loaded = state
        .db()
        .and_then(|db| AppData::load(&db, &user).map_err(AppError::from));
    let data = match loaded {
        Ok(data) => data,
        Err(err) => {
            warn!(user_id = user.id, error = %err, "loading app data failed");
            notice = Some(Notice::LoadFailed);
            AppData::default()
        }
    };

    let html = views::index_page(&views::PageView {
        user: &user,
        state: &page,
        data: &data,
        notice,
        now: Utc::now(),
        can_create_tasks: operations::can_create_tasks(&user, state.task_creation),
    });
    (jar, Html(html))
}

async fn analytics(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<AnalyticsData>, AppError> {
    let data = AppData::load(&state.db()?, &user)?;
    Ok(Json(data.analytics(Utc::now())))
}

/// Runs one operation, turns its outcome into a flash notice and sends the
/// browser back to the page it came from, which reloads from the store.
fn finish<F>(op: Operation, state: &AppState, user: &models::User, jar: CookieJar, back: String, run: F) -> Response
where
    F: FnOnce(&Database) -> Result<Notice, AppError>,
{
    let result = state.db().and_then(|db| run(&db));
    let notice = operations::settle(op, user, result);
    (set_flash(jar, notice), Redirect::to(&back)).into_response()
}

async fn toggle_follow(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
    Query(target): Query<Target>,
) -> Response {
    finish(Operation::ToggleFollow, &state, &user, jar, target.back(), |db| {
        operations::toggle_follow(db, &user, target.id("subject")?)
    })
}

async fn add_subject(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
    Query(target): Query<Target>,
    Form(form): Form<SubjectForm>,
) -> Response {
    finish(Operation::AddSubject, &state, &user, jar, target.back(), |db| {
        operations::add_subject(db, &user, &form)
    })
}

async fn update_subject(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
    Query(target): Query<Target>,
    Form(form): Form<SubjectForm>,
) -> Response {
    finish(Operation::UpdateSubject, &state, &user, jar, target.back(), |db| {
        operations::update_subject(db, &user, target.id("subject")?, &form)
    })
}

async fn confirm_delete_subject(CurrentUser(user): CurrentUser, Query(target): Query<Target>) -> Response {
    confirm_delete(
        &user,
        &target,
        "Yakin ingin menghapus mata kuliah ini? Semua tugas terkait akan terhapus.",
        "/subjects/delete",
    )
}

async fn delete_subject(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
    Query(target): Query<Target>,
    Form(form): Form<ConfirmForm>,
) -> Response {
    if form.confirmed.as_deref() != Some("yes") {
        return Redirect::to(&target.back()).into_response();
    }
    finish(Operation::DeleteSubject, &state, &user, jar, target.back(), |db| {
        operations::delete_subject(db, &user, target.id("subject")?)
    })
}

async fn add_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
    Query(target): Query<Target>,
    Form(form): Form<TaskForm>,
) -> Response {
    let policy = state.task_creation;
    finish(Operation::AddTask, &state, &user, jar, target.back(), |db| {
        operations::add_task(db, &user, policy, &form)
    })
}

async fn update_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
    Query(target): Query<Target>,
    Form(form): Form<TaskForm>,
) -> Response {
    finish(Operation::UpdateTask, &state, &user, jar, target.back(), |db| {
        operations::update_task(db, &user, target.id("task")?, &form)
    })
}

async fn toggle_complete(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
    Query(target): Query<Target>,
) -> Response {
    finish(Operation::ToggleComplete, &state, &user, jar, target.back(), |db| {
        operations::toggle_complete(db, &user, target.id("task")?)
    })
}

async fn update_deadline(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
    Query(target): Query<Target>,
    Form(form): Form<DeadlineForm>,
) -> Response {
    finish(Operation::UpdateDeadline, &state, &user, jar, target.back(), |db| {
        operations::update_deadline(db, &user, target.id("task")?, &form.deadline)
    })
}

async fn confirm_delete_task(CurrentUser(user): CurrentUser, Query(target): Query<Target>) -> Response {
    confirm_delete(&user, &target, "Yakin ingin menghapus tugas ini?", "/tasks/delete")
}

async fn delete_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
    Query(target): Query<Target>,
    Form(form): Form<ConfirmForm>,
) -> Response {
    if form.confirmed.as_deref() != Some("yes") {
        return Redirect::to(&target.back()).into_response();
    }
    finish(Operation::DeleteTask, &state, &user, jar, target.back(), |db| {
        operations::delete_task(db, &user, target.id("task")?)
    })
}

fn confirm_delete(user: &models::User, target: &Target, question: &str, post_path: &str) -> Response {
    match target.id {
        Some(id) if user.is_admin() => Html(views::confirm_page(question, post_path, id, &target.back())).into_response(),
        _ => Redirect::to(&target.back()).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::models::Role;

    struct TestApp {
        _dir: tempfile::TempDir,
        state: AppState,
    }

    impl TestApp {
        fn new(task_creation: TaskCreation) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let state = AppState {
                db_path: dir.path().join("studytrack.db"),
                task_creation,
                session_hours: 1,
            };
            Self { _dir: dir, state }
        }

        fn db(&self) -> Database {
            Database::connect(&self.state.db_path).unwrap()
        }

        /// Creates an account and returns its session cookie.
        fn session(&self, username: &str, role: Role) -> String {
            let db = self.db();
            auth::register(&db, username, "rahasia123").unwrap();
            if role == Role::Admin {
                auth::ensure_admin(&db, username, "rahasia123").unwrap();
            }
            let (_, token) = auth::login(&db, username, "rahasia123", chrono::Duration::hours(1)).unwrap();
            format!("{}={token}", auth::SESSION_COOKIE)
        }

        async fn send(&self, request: Request<Body>) -> Response {
            router(self.state.clone()).oneshot(request).await.unwrap()
        }

        async fn get(&self, uri: &str, cookie: &str) -> Response {
            self.send(
                Request::get(uri)
                    .header(header::COOKIE, cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
        }

        async fn post(&self, uri: &str, cookie: &str, form: &str) -> Response {
            self.send(
                Request::post(uri)
                    .header(header::COOKIE, cookie)
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from(form.to_string()))
                    .unwrap(),
            )
            .await
        }
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn location(response: &Response) -> &str {
        response.headers()[header::LOCATION].to_str().unwrap()
    }

    fn flash(response: &Response) -> Option<Notice> {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| value.strip_prefix("flash="))
            .filter_map(|value| value.split(';').next())
            .find_map(Notice::from_code)
    }

    #[tokio::test]
    async fn anonymous_visitors_are_sent_to_login() {
        let app = TestApp::new(TaskCreation::AdminOnly);
        let response = app.get("/", "").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/login");

        let response = app.get("/api/analytics", "session=bogus").await;
        assert_eq!(location(&response), "/login");
    }

    #[tokio::test]
    async fn login_form_sets_session_cookie() {
        let app = TestApp::new(TaskCreation::AdminOnly);
        auth::register(&app.db(), "sari", "rahasia123").unwrap();

        let response = app.post("/login", "", "username=sari&password=rahasia123").await;
        assert_eq!(location(&response), "/");
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("session="));

        let response = app.post("/login", "", "username=sari&password=salah").await;
        assert_eq!(location(&response), "/login");
        assert_eq!(flash(&response), Some(Notice::LoginFailed));
    }

    #[tokio::test]
    async fn follow_then_see_tasks_and_analytics() {
        let app = TestApp::new(TaskCreation::AdminOnly);
        let admin = app.session("dosen", Role::Admin);
        let student = app.session("sari", Role::Student);

        let response = app
            .post(
                "/subjects/add?back=%2F%3Ftab%3Dsubjects",
                &admin,
                "name=Basis+Data&code=TIF-302&semester=Semester+5&description=",
            )
            .await;
        assert_eq!(location(&response), "/?tab=subjects");
        assert_eq!(flash(&response), Some(Notice::SubjectAdded));
        let subject_id = app.db().list_subjects().unwrap()[0].id;

        let response = app
            .post(
                "/tasks/add",
                &admin,
                &format!("title=Quiz+Normalisasi&description=&deadline=2030-01-01&task_type=Quiz&subject_id={subject_id}"),
            )
            .await;
        assert_eq!(flash(&response), Some(Notice::TaskAdded));

        let html = body_text(app.get("/", &student).await).await;
        assert!(!html.contains("Quiz Normalisasi"));

        let response = app.post(&format!("/subjects/follow?id={subject_id}"), &student, "").await;
        assert_eq!(flash(&response), Some(Notice::Followed));

        let html = body_text(app.get("/", &student).await).await;
        assert!(html.contains("Quiz Normalisasi"));

        let json = body_text(app.get("/api/analytics", &student).await).await;
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["totalTasks"], 1);
        assert_eq!(value["totalSubjects"], 1);
        assert_eq!(value["overdueTasks"], 0);
    }

    #[tokio::test]
    async fn students_get_failure_notice_for_admin_actions() {
        let app = TestApp::new(TaskCreation::AdminOnly);
        let student = app.session("sari", Role::Student);

        let response = app
            .post("/subjects/add", &student, "name=Hack&code=X-1&semester=Semester+1")
            .await;
        assert_eq!(flash(&response), Some(Notice::SubjectAddFailed));
        assert!(app.db().list_subjects().unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_requires_confirmation() {
        let app = TestApp::new(TaskCreation::AdminOnly);
        let admin = app.session("dosen", Role::Admin);
        let admin_user = app.db().find_credentials("dosen").unwrap().unwrap().0;
        operations::add_subject(
            &app.db(),
            &admin_user,
            &SubjectForm {
                name: "Sistem Operasi".into(),
                code: "TIF-401".into(),
                semester: "Semester 7".into(),
                description: String::new(),
            },
        )
        .unwrap();
        let subject_id = app.db().list_subjects().unwrap()[0].id;

        let page = body_text(app.get(&format!("/subjects/delete?id={subject_id}"), &admin).await).await;
        assert!(page.contains("Semua tugas terkait akan terhapus"));

        let response = app.post(&format!("/subjects/delete?id={subject_id}"), &admin, "").await;
        assert_eq!(flash(&response), None);
        assert_eq!(app.db().list_subjects().unwrap().len(), 1);

        let response = app
            .post(&format!("/subjects/delete?id={subject_id}"), &admin, "confirmed=yes")
            .await;
        assert_eq!(flash(&response), Some(Notice::SubjectDeleted));
        assert!(app.db().list_subjects().unwrap().is_empty());
    }

    #[tokio::test]
    async fn open_policy_lets_students_post_tasks() {
        let app = TestApp::new(TaskCreation::Everyone);
        let admin_user = {
            app.session("dosen", Role::Admin);
            app.db().find_credentials("dosen").unwrap().unwrap().0
        };
        let student = app.session("sari", Role::Student);
        operations::add_subject(
            &app.db(),
            &admin_user,
            &SubjectForm {
                name: "Jaringan Komputer".into(),
                code: "TIF-402".into(),
                semester: "Semester 7".into(),
                description: String::new(),
            },
        )
        .unwrap();
        let subject_id = app.db().list_subjects().unwrap()[0].id;
        app.post(&format!("/subjects/follow?id={subject_id}"), &student, "").await;

        let response = app
            .post(
                "/tasks/add",
                &student,
                &format!("title=Laporan&deadline=2030-02-01T10:00&task_type=Praktikum&subject_id={subject_id}"),
            )
            .await;
        assert_eq!(flash(&response), Some(Notice::TaskAdded));

        let task = app.db().list_tasks_for(&admin_user).unwrap().remove(0);
        let response = app.post(&format!("/tasks/toggle?id={}", task.id), &student, "").await;
        assert_eq!(flash(&response), Some(Notice::TaskCompleted));
    }

    #[tokio::test]
    async fn flash_is_shown_once_on_the_page() {
        let app = TestApp::new(TaskCreation::AdminOnly);
        let student = app.session("sari", Role::Student);
        let cookie = format!("{student}; flash={}", Notice::Followed.code());

        let response = app.get("/?tab=subjects", &cookie).await;
        assert!(response.headers()[header::SET_COOKIE].to_str().unwrap().starts_with("flash="));
        let html = body_text(response).await;
        assert!(html.contains("Mulai mengikuti mata kuliah"));
    }
}
