//! Server-rendered HTML. Every page is a plain string built with `format!`;
//! all user-supplied text goes through `html_escape`.

use chrono::{DateTime, Datelike, Utc};

use crate::app_data::AppData;
use crate::models::{Subject, Task, TaskType, User, SEMESTERS};
use crate::notice::Notice;
use crate::page::{Modal, PageState, Tab};
use crate::processing::{completion_percentage, filter_subjects, is_overdue};

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "Mei", "Jun", "Jul", "Agu", "Sep", "Okt", "Nov", "Des",
];

const STYLE: &str = r#"
    :root {
      color-scheme: light;
      font-family: "Inter", system-ui, -apple-system, sans-serif;
      background: #f4f5f7;
    }
    body {
      margin: 0;
      padding: 32px;
      display: flex;
      justify-content: center;
    }
    a { color: inherit; }
    .app {
      width: min(1080px, 100%);
      background: #ffffff;
      border-radius: 16px;
      box-shadow: 0 24px 48px rgba(15, 23, 42, 0.08);
      padding: 28px;
    }
    .narrow { width: min(420px, 100%); }
    header {
      display: flex;
      justify-content: space-between;
      align-items: flex-start;
      gap: 16px;
    }
    h1 {
      margin: 0 0 8px 0;
      font-size: 28px;
      letter-spacing: -0.02em;
    }
    h2 { font-size: 20px; margin: 0 0 16px 0; }
    .subtitle {
      color: #64748b;
      margin-bottom: 24px;
    }
    .who { font-size: 14px; color: #64748b; display: flex; gap: 8px; align-items: center; }
    .notice {
      padding: 12px 16px;
      border-radius: 12px;
      margin-bottom: 20px;
      background: #dcfce7;
      color: #166534;
    }
    .notice.error { background: #fee2e2; color: #991b1b; }
    .tabs {
      display: grid;
      grid-template-columns: repeat(3, 1fr);
      gap: 4px;
      background: #f1f5f9;
      border-radius: 12px;
      padding: 4px;
      margin-bottom: 24px;
    }
    .tabs a {
      text-align: center;
      text-decoration: none;
      padding: 10px;
      border-radius: 10px;
      font-weight: 600;
      color: #64748b;
    }
    .tabs a.active { background: #ffffff; color: #0f172a; }
    .toolbar {
      display: flex;
      justify-content: space-between;
      align-items: center;
      gap: 12px;
      margin-bottom: 16px;
    }
    form { margin: 0; }
    form.inline { display: inline; }
    form.search { display: flex; gap: 12px; margin-bottom: 16px; }
    form.stack { display: grid; gap: 12px; }
    label { font-size: 13px; font-weight: 600; color: #334155; }
    input[type="text"], input[type="password"], input[type="datetime-local"], textarea, select {
      width: 100%;
      box-sizing: border-box;
      padding: 12px 14px;
      border-radius: 10px;
      border: 1px solid #e2e8f0;
      font-size: 15px;
      font-family: inherit;
    }
    form.search input[type="text"] { flex: 1; }
    form.search select { width: auto; }
    button, .button {
      border: none;
      border-radius: 10px;
      padding: 12px 16px;
      background: #111827;
      color: white;
      font-weight: 600;
      cursor: pointer;
      text-decoration: none;
      display: inline-block;
      font-size: 14px;
    }
    .button.secondary, button.secondary { background: #e2e8f0; color: #0f172a; }
    .button.delete, button.delete { background: #fee2e2; color: #991b1b; }
    .grid {
      display: grid;
      grid-template-columns: repeat(auto-fill, minmax(300px, 1fr));
      gap: 12px;
    }
    .card {
      padding: 16px;
      border-radius: 12px;
      background: #f8fafc;
      border: 1px solid #e2e8f0;
      display: flex;
      flex-direction: column;
      gap: 8px;
    }
    .card.done { background: #f0fdf4; border-color: #bbf7d0; }
    .card.overdue { background: #fef2f2; border-color: #fecaca; }
    .card .title { font-weight: 600; text-decoration: none; }
    .card .meta { font-size: 13px; color: #64748b; }
    .card .actions { display: flex; gap: 8px; flex-wrap: wrap; }
    .card .actions button, .card .actions .button { padding: 8px 12px; }
    .badge {
      font-size: 12px;
      text-transform: uppercase;
      letter-spacing: 0.08em;
      color: #0f172a;
      background: #e2e8f0;
      padding: 4px 8px;
      border-radius: 999px;
      align-self: flex-start;
    }
    .deadline { font-size: 13px; font-weight: 600; color: #2563eb; }
    .deadline.overdue { color: #dc2626; }
    .deadline.done { color: #16a34a; }
    .progress { height: 10px; background: #e2e8f0; border-radius: 999px; overflow: hidden; }
    .progress span { display: block; height: 100%; background: #111827; }
    .stats { display: grid; grid-template-columns: repeat(auto-fit, minmax(200px, 1fr)); gap: 12px; margin-bottom: 16px; }
    .stat .value { font-size: 28px; font-weight: 700; }
    .stat .value.green { color: #16a34a; }
    .stat .value.blue { color: #2563eb; }
    .stat .value.red { color: #dc2626; }
    .empty {
      text-align: center;
      padding: 32px;
      color: #64748b;
      border: 2px dashed #e2e8f0;
      border-radius: 12px;
    }
    section { margin-bottom: 32px; }
    .overlay {
      position: fixed;
      inset: 0;
      background: rgba(15, 23, 42, 0.4);
      display: flex;
      align-items: center;
      justify-content: center;
      padding: 16px;
    }
    .modal {
      width: min(520px, 100%);
      max-height: 90vh;
      overflow-y: auto;
      background: #ffffff;
      border-radius: 16px;
      padding: 24px;
      display: grid;
      gap: 12px;
    }
    .row { display: grid; grid-template-columns: 1fr 1fr; gap: 12px; }
"#;

pub fn html_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// `dd MMM yyyy` with Indonesian month abbreviations.
pub fn format_date(value: DateTime<Utc>) -> String {
    format!(
        "{:02} {} {}",
        value.day(),
        MONTHS[value.month0() as usize],
        value.year()
    )
}

fn input_datetime(value: DateTime<Utc>) -> String {
    value.format("%Y-%m-%dT%H:%M").to_string()
}

/// Post target carrying the record id and the page to come back to.
fn action(path: &str, id: Option<i64>, back: &str) -> String {
    let mut url = format!("{path}?");
    if let Some(id) = id {
        url.push_str(&format!("id={id}&"));
    }
    url.push_str(&format!("back={}", urlencoding::encode(back)));
    html_escape(&url)
}

fn layout(title: &str, narrow: bool, body: &str) -> String {
    format!(
        r#"<!doctype html>
<html lang="id">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>{title}</title>
  <style>{STYLE}</style>
</head>
<body>
  <div class="app{narrow}">
{body}
  </div>
</body>
</html>"#,
        title = html_escape(title),
        narrow = if narrow { " narrow" } else { "" },
    )
}

fn notice_banner(notice: Option<Notice>) -> String {
    match notice {
        Some(notice) => format!(
            r#"<div class="notice{class}"><strong>{title}</strong> {message}</div>"#,
            class = if notice.is_error() { " error" } else { "" },
            title = notice.title(),
            message = notice.message(),
        ),
        None => String::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Login,
    Register,
}

pub fn auth_page(mode: AuthMode, notice: Option<Notice>) -> String {
    let (heading, action, button, switch) = match mode {
        AuthMode::Login => (
            "Masuk",
            "/login",
            "Masuk",
            r#"Belum punya akun? <a href="/register">Daftar</a>"#,
        ),
        AuthMode::Register => (
            "Daftar Akun",
            "/register",
            "Daftar",
            r#"Sudah punya akun? <a href="/login">Masuk</a>"#,
        ),
    };

    let body = format!(
        r#"    <h1>{heading}</h1>
    <div class="subtitle">Manajemen Tugas Kuliah</div>
    {notice}
    <form class="stack" method="post" action="{action}">
      <label for="username">Username</label>
      <input type="text" id="username" name="username" required autofocus />
      <label for="password">Password</label>
      <input type="password" id="password" name="password" required />
      <button type="submit">{button}</button>
    </form>
    <p class="subtitle">{switch}</p>
"#,
        notice = notice_banner(notice),
    );
    layout(heading, true, &body)
}

/// Everything the main page renders from.
pub struct PageView<'a> {
    pub user: &'a User,
    pub state: &'a PageState,
    pub data: &'a AppData,
    pub notice: Option<Notice>,
    pub now: DateTime<Utc>,
    pub can_create_tasks: bool,
}

pub fn index_page(view: &PageView<'_>) -> String {
    let mut body = String::new();
    body.push_str(&format!(
        r#"    <header>
      <div>
        <h1>Manajemen Tugas Kuliah</h1>
        <div class="subtitle">Kelola tugas dan mata kuliah Anda dengan mudah</div>
      </div>
      <div class="who">
        <span>{username}</span>
        <span class="badge">{role}</span>
        <form class="inline" method="post" action="/logout">
          <button class="secondary" type="submit">Keluar</button>
        </form>
      </div>
    </header>
"#,
        username = html_escape(&view.user.username),
        role = view.user.role.as_str(),
    ));
    body.push_str(&notice_banner(view.notice));

    body.push_str("    <nav class=\"tabs\">\n");
    for tab in Tab::ALL {
        body.push_str(&format!(
            "      <a class=\"{class}\" href=\"{href}\">{label}</a>\n",
            class = if tab == view.state.tab { "active" } else { "" },
            href = html_escape(&view.state.with_tab(tab).href()),
            label = tab.label(),
        ));
    }
    body.push_str("    </nav>\n");

    match view.state.tab {
        Tab::Tasks => tasks_tab(&mut body, view),
        Tab::Subjects => subjects_tab(&mut body, view),
        Tab::Analytics => analytics_tab(&mut body, view),
    }

    modal(&mut body, view);
    layout("Manajemen Tugas Kuliah", false, &body)
}

fn tasks_tab(body: &mut String, view: &PageView<'_>) {
    let selected = view
        .state
        .selected_subject
        .and_then(|id| view.data.subject(id));
    let heading = match selected {
        Some(subject) => format!("Tugas {}", html_escape(&subject.name)),
        None => "Semua Tugas".to_string(),
    };

    body.push_str(&format!(
        "    <div class=\"toolbar\">\n      <h2>{heading}</h2>\n      <div class=\"actions\">\n"
    ));
    if selected.is_some() {
        body.push_str(&format!(
            "        <a class=\"button secondary\" href=\"{}\">Lihat Semua Tugas</a>\n",
            html_escape(&view.state.select_subject(None).href())
        ));
    }
    if view.can_create_tasks {
        body.push_str(&format!(
            "        <a class=\"button\" href=\"{}\">Tambah Tugas</a>\n",
            html_escape(&view.state.with_modal(Modal::AddTask).href())
        ));
    }
    body.push_str("      </div>\n    </div>\n");

    let tasks = view
        .data
        .visible_tasks(view.user, selected.map(|subject| subject.id));
    if tasks.is_empty() {
        let text = match selected {
            Some(subject) => format!("Belum ada tugas untuk {}", html_escape(&subject.name)),
            None => "Belum ada tugas yang tersedia".to_string(),
        };
        body.push_str(&format!("    <div class=\"empty\">{text}</div>\n"));
        return;
    }

    body.push_str("    <div class=\"grid\">\n");
    for task in &tasks {
        task_card(body, view, task);
    }
    body.push_str("    </div>\n");
}

fn task_card(body: &mut String, view: &PageView<'_>, task: &Task) {
    let overdue = is_overdue(task, view.now);
    let state_class = if task.completed {
        " done"
    } else if overdue {
        " overdue"
    } else {
        ""
    };
    let open = if view.user.is_admin() {
        Modal::AdminTaskEdit(task.id)
    } else {
        Modal::TaskView(task.id)
    };
    let subject_name = task
        .subject
        .as_ref()
        .map(|subject| html_escape(&subject.name))
        .unwrap_or_default();

    body.push_str(&format!(
        r#"      <div class="card{state_class}">
        <span class="badge">{kind}</span>
        <a class="title" href="{open}">{title}</a>
        <div class="meta">{subject_name}</div>
        <div class="deadline{state_class}">Deadline: {deadline}{late}</div>
        <div class="actions">
          <form class="inline" method="post" action="{toggle}">
            <button class="secondary" type="submit">{toggle_label}</button>
          </form>
        </div>
      </div>
"#,
        kind = task.task_type,
        open = html_escape(&view.state.with_modal(open).href()),
        title = html_escape(&task.title),
        deadline = format_date(task.deadline),
        late = if overdue { " (terlambat)" } else { "" },
        toggle = action("/tasks/toggle", Some(task.id), &view.state.back_href()),
        toggle_label = if task.completed { "Batalkan" } else { "Selesai" },
    ));
}

fn subjects_tab(body: &mut String, view: &PageView<'_>) {
    let back = view.state.back_href();
    let my_subjects = view.data.my_subjects();

    body.push_str("    <section>\n      <h2>Mata Kuliah yang Diikuti</h2>\n");
    if my_subjects.is_empty() {
        body.push_str(
            "      <div class=\"empty\">Belum ada mata kuliah yang diikuti. Pilih mata kuliah di bawah ini.</div>\n",
        );
    } else {
        body.push_str("      <div class=\"grid\">\n");
        for subject in &my_subjects {
            subject_card(body, view, subject, true, &back);
        }
        body.push_str("      </div>\n");
    }
    body.push_str("    </section>\n");

    body.push_str("    <section>\n      <div class=\"toolbar\">\n        <h2>Mata Kuliah Tersedia</h2>\n");
    if view.user.is_admin() {
        body.push_str(&format!(
            "        <a class=\"button\" href=\"{}\">Tambah Mata Kuliah</a>\n",
            html_escape(&view.state.with_modal(Modal::AddSubject).href())
        ));
    }
    body.push_str("      </div>\n");

    body.push_str(&format!(
        r#"      <form class="search" method="get" action="/">
        <input type="hidden" name="tab" value="subjects" />
        <input type="text" name="q" value="{query}" placeholder="Cari nama atau kode mata kuliah" />
        <select name="semester">
          <option value="all">Semua Semester</option>
"#,
        query = html_escape(&view.state.search),
    ));
    for semester in SEMESTERS {
        body.push_str(&format!(
            "          <option value=\"{semester}\"{selected}>{semester}</option>\n",
            selected = if view.state.semester == semester { " selected" } else { "" },
        ));
    }
    body.push_str("        </select>\n        <button type=\"submit\">Cari</button>\n      </form>\n");

    let catalog = filter_subjects(&view.data.subjects, &view.state.search, &view.state.semester);
    if catalog.is_empty() {
        body.push_str("      <div class=\"empty\">Tidak ada mata kuliah yang cocok</div>\n");
    } else {
        body.push_str("      <div class=\"grid\">\n");
        for subject in &catalog {
            subject_card(body, view, subject, false, &back);
        }
        body.push_str("      </div>\n");
    }
    body.push_str("    </section>\n");
}

fn subject_card(body: &mut String, view: &PageView<'_>, subject: &Subject, with_progress: bool, back: &str) {
    let followed = view.data.is_following(subject.id);
    body.push_str(&format!(
        r#"        <div class="card">
          <span class="badge">{semester}</span>
          <div class="title">{name}</div>
          <div class="meta">{code}</div>
"#,
        semester = html_escape(&subject.semester),
        name = html_escape(&subject.name),
        code = html_escape(&subject.code),
    ));
    if let Some(description) = &subject.description {
        body.push_str(&format!("          <div class=\"meta\">{}</div>\n", html_escape(description)));
    }
    if with_progress {
        let percentage = completion_percentage(subject.completed_tasks, subject.task_count);
        body.push_str(&format!(
            r#"          <div class="meta">{done}/{total} tugas selesai ({percentage}%)</div>
          <div class="progress"><span style="width: {percentage}%"></span></div>
"#,
            done = subject.completed_tasks,
            total = subject.task_count,
        ));
    }

    body.push_str("          <div class=\"actions\">\n");
    if with_progress {
        body.push_str(&format!(
            "            <a class=\"button secondary\" href=\"{}\">Lihat Tugas</a>\n",
            html_escape(&view.state.select_subject(Some(subject.id)).href())
        ));
    }
    body.push_str(&format!(
        r#"            <form class="inline" method="post" action="{follow}">
              <button class="{class}" type="submit">{label}</button>
            </form>
"#,
        follow = action("/subjects/follow", Some(subject.id), back),
        class = if followed { "secondary" } else { "" },
        label = if followed { "Berhenti Ikuti" } else { "Ikuti" },
    ));
    if view.user.is_admin() && !with_progress {
        body.push_str(&format!(
            r#"            <a class="button secondary" href="{edit}">Edit</a>
            <a class="button delete" href="{delete}">Hapus</a>
"#,
            edit = html_escape(&view.state.with_modal(Modal::EditSubject(subject.id)).href()),
            delete = action("/subjects/delete", Some(subject.id), back),
        ));
    }
    body.push_str("          </div>\n        </div>\n");
}

fn analytics_tab(body: &mut String, view: &PageView<'_>) {
    let data = view.data.analytics(view.now);
    let overall = completion_percentage(data.completed_tasks, data.total_tasks);

    body.push_str(&format!(
        r#"    <h2>Analisis Akademik</h2>
    <div class="stats">
      <div class="card stat"><div class="meta">Total Tugas</div><div class="value">{total}</div></div>
      <div class="card stat"><div class="meta">Tugas Selesai</div><div class="value green">{completed}</div><div class="meta">{overall}% dari total tugas</div></div>
      <div class="card stat"><div class="meta">Mata Kuliah</div><div class="value blue">{subjects}</div><div class="meta">Mata kuliah terdaftar</div></div>
      <div class="card stat"><div class="meta">Terlambat</div><div class="value red">{overdue}</div><div class="meta">Tugas melewati deadline</div></div>
    </div>
    <section class="card">
      <h2>Progress Keseluruhan</h2>
      <div class="toolbar"><span>Penyelesaian Tugas</span><strong>{overall}%</strong></div>
      <div class="progress"><span style="width: {overall}%"></span></div>
    </section>
    <section class="card">
      <h2>Progress per Mata Kuliah</h2>
"#,
        total = data.total_tasks,
        completed = data.completed_tasks,
        subjects = data.total_subjects,
        overdue = data.overdue_tasks,
    ));

    if data.subject_analysis.is_empty() {
        body.push_str("      <div class=\"empty\">Belum ada mata kuliah yang diikuti</div>\n");
    }
    for entry in &data.subject_analysis {
        body.push_str(&format!(
            r#"      <div class="toolbar"><span>{subject}</span><span class="meta">{done}/{total} tugas ({percentage}%)</span></div>
      <div class="progress"><span style="width: {percentage}%"></span></div>
"#,
            subject = html_escape(&entry.subject),
            done = entry.completion,
            total = entry.total,
            percentage = entry.percentage,
        ));
    }
    body.push_str("    </section>\n");
}

fn modal(body: &mut String, view: &PageView<'_>) {
    let back = view.state.back_href();
    let content = match view.state.modal {
        Modal::None => return,
        Modal::TaskView(id) => match view.data.task(id) {
            Some(task) => task_view_modal(view, task, &back),
            None => return,
        },
        Modal::AdminTaskEdit(id) => match view.data.task(id) {
            Some(task) => admin_task_modal(view, task, &back),
            None => return,
        },
        Modal::AddTask if view.can_create_tasks => add_task_modal(view, &back),
        Modal::AddTask => return,
        Modal::AddSubject => subject_modal(None, &back),
        Modal::EditSubject(id) => match view.data.subject(id) {
            Some(subject) => subject_modal(Some(subject), &back),
            None => return,
        },
    };
    body.push_str(&format!(
        "    <div class=\"overlay\">\n      <div class=\"modal\">\n{content}      </div>\n    </div>\n"
    ));
}

fn task_view_modal(view: &PageView<'_>, task: &Task, back: &str) -> String {
    let overdue = is_overdue(task, view.now);
    let status = if task.completed {
        "Selesai"
    } else if overdue {
        "Terlambat"
    } else {
        "Belum selesai"
    };
    let subject = task
        .subject
        .as_ref()
        .map(|subject| format!("{} ({})", html_escape(&subject.name), html_escape(&subject.code)))
        .unwrap_or_default();

    format!(
        r#"        <span class="badge">{kind}</span>
        <h2>{title}</h2>
        <div class="meta">{subject}</div>
        <p>{description}</p>
        <div class="meta">Status: {status}</div>
        <div class="deadline">Deadline: {deadline}</div>
        <form class="stack" method="post" action="{deadline_action}">
          <label for="deadline">Ubah Deadline</label>
          <input type="datetime-local" id="deadline" name="deadline" value="{deadline_value}" required />
          <button type="submit">Simpan Deadline</button>
        </form>
        <form method="post" action="{toggle}">
          <button class="secondary" type="submit">{toggle_label}</button>
        </form>
        <a class="button secondary" href="{back_href}">Tutup</a>
"#,
        kind = task.task_type,
        title = html_escape(&task.title),
        description = html_escape(&task.description),
        deadline = format_date(task.deadline),
        deadline_action = action("/tasks/deadline", Some(task.id), back),
        deadline_value = input_datetime(task.deadline),
        toggle = action("/tasks/toggle", Some(task.id), back),
        toggle_label = if task.completed {
            "Tandai Belum Selesai"
        } else {
            "Tandai Selesai"
        },
        back_href = html_escape(back),
    )
}

fn task_type_options(selected: Option<TaskType>) -> String {
    TaskType::ALL
        .iter()
        .map(|kind| {
            format!(
                "<option value=\"{kind}\"{sel}>{kind}</option>",
                sel = if Some(*kind) == selected { " selected" } else { "" },
            )
        })
        .collect()
}

fn subject_options(subjects: &[Subject], selected: Option<i64>) -> String {
    subjects
        .iter()
        .map(|subject| {
            format!(
                "<option value=\"{id}\"{sel}>{name}</option>",
                id = subject.id,
                sel = if Some(subject.id) == selected { " selected" } else { "" },
                name = html_escape(&subject.name),
            )
        })
        .collect()
}

fn task_fields(task: Option<&Task>, subjects: &[Subject], selected_subject: Option<i64>) -> String {
    format!(
        r#"          <label for="title">Judul Tugas</label>
          <input type="text" id="title" name="title" value="{title}" placeholder="Masukkan judul tugas" required />
          <label for="description">Deskripsi</label>
          <textarea id="description" name="description" rows="3" placeholder="Masukkan deskripsi tugas">{description}</textarea>
          <div class="row">
            <div>
              <label for="task_type">Jenis Tugas</label>
              <select id="task_type" name="task_type" required>{types}</select>
            </div>
            <div>
              <label for="subject_id">Mata Kuliah</label>
              <select id="subject_id" name="subject_id" required>{subjects}</select>
            </div>
          </div>
          <label for="deadline">Deadline</label>
          <input type="datetime-local" id="deadline" name="deadline" value="{deadline}" required />
"#,
        title = task.map(|t| html_escape(&t.title)).unwrap_or_default(),
        description = task.map(|t| html_escape(&t.description)).unwrap_or_default(),
        types = task_type_options(task.map(|t| t.task_type)),
        subjects = subject_options(subjects, task.map(|t| t.subject_id).or(selected_subject)),
        deadline = task.map(|t| input_datetime(t.deadline)).unwrap_or_default(),
    )
}

fn admin_task_modal(view: &PageView<'_>, task: &Task, back: &str) -> String {
    format!(
        r#"        <h2>Edit Tugas</h2>
        <form class="stack" method="post" action="{save}">
{fields}          <button type="submit">Simpan Perubahan</button>
        </form>
        <form method="post" action="{toggle}">
          <button class="secondary" type="submit">{toggle_label}</button>
        </form>
        <a class="button delete" href="{delete}">Hapus</a>
        <a class="button secondary" href="{back_href}">Batal</a>
"#,
        save = action("/tasks/update", Some(task.id), back),
        fields = task_fields(Some(task), &view.data.subjects, None),
        toggle = action("/tasks/toggle", Some(task.id), back),
        toggle_label = if task.completed {
            "Tandai Belum Selesai"
        } else {
            "Tandai Selesai"
        },
        delete = action("/tasks/delete", Some(task.id), back),
        back_href = html_escape(back),
    )
}

fn add_task_modal(view: &PageView<'_>, back: &str) -> String {
    let choices = if view.user.is_admin() {
        view.data.subjects.clone()
    } else {
        view.data.my_subjects()
    };
    if choices.is_empty() {
        return format!(
            r#"        <h2>Tambah Tugas Baru</h2>
        <div class="empty">Ikuti mata kuliah terlebih dahulu untuk menambahkan tugas</div>
        <a class="button secondary" href="{}">Tutup</a>
"#,
            html_escape(back)
        );
    }
    format!(
        r#"        <h2>Tambah Tugas Baru</h2>
        <form class="stack" method="post" action="{add}">
{fields}          <button type="submit">Tambah Tugas</button>
        </form>
        <a class="button secondary" href="{back_href}">Batal</a>
"#,
        add = action("/tasks/add", None, back),
        fields = task_fields(None, &choices, view.state.selected_subject),
        back_href = html_escape(back),
    )
}

fn subject_modal(subject: Option<&Subject>, back: &str) -> String {
    let (heading, target, button) = match subject {
        Some(subject) => (
            "Edit Mata Kuliah",
            action("/subjects/update", Some(subject.id), back),
            "Simpan Perubahan",
        ),
        None => (
            "Daftarkan Mata Kuliah Baru",
            action("/subjects/add", None, back),
            "Daftarkan Mata Kuliah",
        ),
    };
    let current_semester = subject.map(|s| s.semester.as_str());
    let semesters: String = SEMESTERS
        .iter()
        .map(|semester| {
            format!(
                "<option value=\"{semester}\"{sel}>{semester}</option>",
                sel = if Some(*semester) == current_semester { " selected" } else { "" },
            )
        })
        .collect();

    format!(
        r#"        <h2>{heading}</h2>
        <form class="stack" method="post" action="{target}">
          <label for="name">Nama Mata Kuliah</label>
          <input type="text" id="name" name="name" value="{name}" placeholder="contoh: Pemrograman Web" required />
          <label for="code">Kode Mata Kuliah</label>
          <input type="text" id="code" name="code" value="{code}" placeholder="contoh: TIF-101" required />
          <label for="semester">Semester</label>
          <select id="semester" name="semester" required>{semesters}</select>
          <label for="description">Deskripsi</label>
          <textarea id="description" name="description" rows="3">{description}</textarea>
          <button type="submit">{button}</button>
        </form>
        <a class="button secondary" href="{back_href}">Batal</a>
"#,
        name = subject.map(|s| html_escape(&s.name)).unwrap_or_default(),
        code = subject.map(|s| html_escape(&s.code)).unwrap_or_default(),
        description = subject
            .and_then(|s| s.description.as_deref())
            .map(html_escape)
            .unwrap_or_default(),
        back_href = html_escape(back),
    )
}

/// Blocking confirmation before a delete goes through.
pub fn confirm_page(question: &str, post_path: &str, id: i64, back: &str) -> String {
    let body = format!(
        r#"    <h1>Konfirmasi</h1>
    <p>{question}</p>
    <div class="toolbar">
      <form method="post" action="{target}">
        <input type="hidden" name="confirmed" value="yes" />
        <button class="delete" type="submit">Hapus</button>
      </form>
      <a class="button secondary" href="{back_href}">Batal</a>
    </div>
"#,
        question = html_escape(question),
        target = action(post_path, Some(id), back),
        back_href = html_escape(back),
    );
    layout("Konfirmasi", true, &body)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::models::Role;
    use crate::processing::tests::{subject, task};

    fn user(role: Role) -> User {
        User {
            id: 1,
            username: "sari <3".into(),
            role,
            created_at: Utc::now(),
        }
    }

    fn data() -> AppData {
        AppData {
            subjects: vec![
                subject(1, "Pemrograman Web", "TIF-301", "Semester 5"),
                subject(2, "Basis Data", "TIF-302", "Semester 5"),
            ],
            followed: vec![2],
            tasks: vec![
                task(1, 2, false, Utc.with_ymd_and_hms(2024, 6, 10, 23, 59, 59).unwrap()),
                task(2, 2, true, Utc.with_ymd_and_hms(2024, 6, 1, 23, 59, 59).unwrap()),
            ],
        }
    }

    fn render(role: Role, state: PageState) -> String {
        let user = user(role);
        let data = data();
        index_page(&PageView {
            user: &user,
            state: &state,
            data: &data,
            notice: Some(Notice::TaskAdded),
            now: Utc.with_ymd_and_hms(2024, 6, 15, 0, 0, 0).unwrap(),
            can_create_tasks: role == Role::Admin,
        })
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(html_escape("<a href=\"x\">&'"), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }

    #[test]
    fn dates_use_indonesian_months() {
        assert_eq!(format_date(Utc.with_ymd_and_hms(2024, 8, 5, 0, 0, 0).unwrap()), "05 Agu 2024");
    }

    #[test]
    fn task_tab_lists_open_tasks_with_overdue_marker() {
        let html = render(Role::Student, PageState::default());
        assert!(html.contains("sari &lt;3"));
        assert!(html.contains("Tugas berhasil ditambahkan"));
        assert!(html.contains("Tugas 1"));
        assert!(!html.contains("Tugas 2"));
        assert!(html.contains("(terlambat)"));
        assert!(!html.contains("Tambah Tugas"));
    }

    #[test]
    fn analytics_tab_shows_totals() {
        let state = PageState::default().with_tab(Tab::Analytics);
        let html = render(Role::Student, state);
        assert!(html.contains("Analisis Akademik"));
        assert!(html.contains("1/2 tugas (50%)"));
    }

    #[test]
    fn admin_sees_catalog_controls() {
        let state = PageState::default().with_tab(Tab::Subjects);
        let html = render(Role::Admin, state.clone());
        assert!(html.contains("Tambah Mata Kuliah"));
        assert!(html.contains("/subjects/delete?id=1"));

        let html = render(Role::Student, state);
        assert!(!html.contains("Tambah Mata Kuliah"));
        assert!(html.contains("Berhenti Ikuti"));
    }

    #[test]
    fn admin_task_modal_offers_delete() {
        let state = PageState::default().with_modal(Modal::AdminTaskEdit(1));
        let html = render(Role::Admin, state);
        assert!(html.contains("Edit Tugas"));
        assert!(html.contains("/tasks/delete?id=1"));
        assert!(html.contains("value=\"2024-06-10T23:59\""));
    }

    #[test]
    fn confirm_page_posts_confirmation() {
        let html = confirm_page("Yakin ingin menghapus tugas ini?", "/tasks/delete", 4, "/?tab=tasks");
        assert!(html.contains("name=\"confirmed\" value=\"yes\""));
        assert!(html.contains("/tasks/delete?id=4&amp;back=%2F%3Ftab%3Dtasks"));
    }
}
