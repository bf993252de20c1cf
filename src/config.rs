use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Who may create tasks. Earlier revisions of the course board let every
/// signed-in student post tasks; later ones restricted it to admins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TaskCreation {
    AdminOnly,
    Everyone,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "studytrack", version, about = "Coursework tracker for students and course admins")]
pub struct Config {
    /// SQLite database file
    #[arg(long, env = "STUDYTRACK_DB", default_value = "studytrack.db")]
    pub db_path: PathBuf,

    #[arg(long, env = "STUDYTRACK_BIND", default_value = "0.0.0.0:5876")]
    pub bind: SocketAddr,

    /// Default tracing filter, overridden by RUST_LOG
    #[arg(long, env = "STUDYTRACK_LOG", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "STUDYTRACK_TASK_CREATION", value_enum, default_value_t = TaskCreation::AdminOnly)]
    pub task_creation: TaskCreation,

    /// Session lifetime in hours
    #[arg(long, env = "STUDYTRACK_SESSION_HOURS", default_value_t = 168)]
    pub session_hours: i64,

    /// Admin account created or promoted at startup
    #[arg(long, env = "STUDYTRACK_ADMIN_USER", requires = "admin_password")]
    pub admin_user: Option<String>,

    #[arg(long, env = "STUDYTRACK_ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: Option<String>,
}
