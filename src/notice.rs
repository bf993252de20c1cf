//! User-visible notices. A notice survives the post/redirect round trip as a
//! short code in the `flash` cookie and is shown once on the next render.

use axum_extra::extract::cookie::{Cookie, CookieJar};

pub const FLASH_COOKIE: &str = "flash";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    LoadFailed,
    Followed,
    Unfollowed,
    FollowFailed,
    SubjectAdded,
    SubjectAddFailed,
    SubjectUpdated,
    SubjectUpdateFailed,
    SubjectDeleted,
    SubjectDeleteFailed,
    TaskAdded,
    TaskAddFailed,
    TaskUpdated,
    TaskUpdateFailed,
    TaskDeleted,
    TaskDeleteFailed,
    TaskCompleted,
    TaskReopened,
    TaskToggleFailed,
    DeadlineUpdated,
    DeadlineUpdateFailed,
    LoginFailed,
    Registered,
    RegisterFailed,
    LoggedOut,
}

// (notice, cookie code, message, is error)
const NOTICES: &[(Notice, &str, &str, bool)] = &[
    (Notice::LoadFailed, "load-failed", "Gagal memuat data", true),
    (Notice::Followed, "followed", "Mulai mengikuti mata kuliah", false),
    (Notice::Unfollowed, "unfollowed", "Berhenti mengikuti mata kuliah", false),
    (Notice::FollowFailed, "follow-failed", "Gagal mengupdate mata kuliah", true),
    (Notice::SubjectAdded, "subject-added", "Mata kuliah berhasil ditambahkan", false),
    (Notice::SubjectAddFailed, "subject-add-failed", "Gagal menambahkan mata kuliah", true),
    (Notice::SubjectUpdated, "subject-updated", "Mata kuliah berhasil diperbarui", false),
    (Notice::SubjectUpdateFailed, "subject-update-failed", "Gagal memperbarui mata kuliah", true),
    (Notice::SubjectDeleted, "subject-deleted", "Mata kuliah berhasil dihapus", false),
    (Notice::SubjectDeleteFailed, "subject-delete-failed", "Gagal menghapus mata kuliah", true),
    (Notice::TaskAdded, "task-added", "Tugas berhasil ditambahkan", false),
    (Notice::TaskAddFailed, "task-add-failed", "Gagal menambahkan tugas", true),
    (Notice::TaskUpdated, "task-updated", "Tugas berhasil diperbarui", false),
    (Notice::TaskUpdateFailed, "task-update-failed", "Gagal memperbarui tugas", true),
    (Notice::TaskDeleted, "task-deleted", "Tugas berhasil dihapus", false),
    (Notice::TaskDeleteFailed, "task-delete-failed", "Gagal menghapus tugas", true),
    (Notice::TaskCompleted, "task-completed", "Tugas diselesaikan", false),
    (Notice::TaskReopened, "task-reopened", "Tugas dibatalkan", false),
    (Notice::TaskToggleFailed, "task-toggle-failed", "Gagal mengupdate tugas", true),
    (Notice::DeadlineUpdated, "deadline-updated", "Deadline berhasil diperbarui", false),
    (Notice::DeadlineUpdateFailed, "deadline-update-failed", "Gagal mengupdate deadline", true),
    (Notice::LoginFailed, "login-failed", "Username atau password salah", true),
    (Notice::Registered, "registered", "Akun berhasil dibuat, silakan masuk", false),
    (Notice::RegisterFailed, "register-failed", "Gagal membuat akun", true),
    (Notice::LoggedOut, "logged-out", "Anda telah keluar", false),
];

impl Notice {
    fn entry(self) -> &'static (Notice, &'static str, &'static str, bool) {
        NOTICES
            .iter()
            .find(|entry| entry.0 == self)
            .unwrap_or(&NOTICES[0])
    }

    pub fn code(self) -> &'static str {
        self.entry().1
    }

    pub fn message(self) -> &'static str {
        self.entry().2
    }

    pub fn is_error(self) -> bool {
        self.entry().3
    }

    pub fn title(self) -> &'static str {
        if self.is_error() {
            "Error"
        } else {
            "Berhasil"
        }
    }

    pub fn from_code(code: &str) -> Option<Notice> {
        NOTICES
            .iter()
            .find(|entry| entry.1 == code)
            .map(|entry| entry.0)
    }
}

pub fn set_flash(jar: CookieJar, notice: Notice) -> CookieJar {
    jar.add(
        Cookie::build((FLASH_COOKIE, notice.code()))
            .path("/")
            .http_only(true),
    )
}

/// Reads and clears the pending notice, if any.
pub fn take_flash(jar: CookieJar) -> (CookieJar, Option<Notice>) {
    let notice = jar
        .get(FLASH_COOKIE)
        .and_then(|cookie| Notice::from_code(cookie.value()));
    match notice {
        Some(_) => (jar.remove(Cookie::build(FLASH_COOKIE).path("/")), notice),
        None => (jar, None),
    }
}
