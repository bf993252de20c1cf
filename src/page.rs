use serde::Deserialize;

use crate::models::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Tasks,
    Subjects,
    Analytics,
}

impl Tab {
    pub const ALL: [Tab; 3] = [Tab::Tasks, Tab::Subjects, Tab::Analytics];

    pub fn as_str(self) -> &'static str {
        match self {
            Tab::Tasks => "tasks",
            Tab::Subjects => "subjects",
            Tab::Analytics => "analytics",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Tab::Tasks => "Semua Tugas",
            Tab::Subjects => "Mata Kuliah",
            Tab::Analytics => "Analisis",
        }
    }

    fn parse(value: &str) -> Option<Tab> {
        Tab::ALL.into_iter().find(|tab| tab.as_str() == value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modal {
    None,
    TaskView(i64),
    AdminTaskEdit(i64),
    AddTask,
    AddSubject,
    EditSubject(i64),
}

/// Raw query string of `GET /`. Everything is optional and parsed leniently
/// so that a stale or hand-edited link still renders a page.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub tab: Option<String>,
    pub subject: Option<String>,
    pub task: Option<String>,
    pub modal: Option<String>,
    pub edit: Option<String>,
    pub q: Option<String>,
    pub semester: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageState {
    pub tab: Tab,
    pub modal: Modal,
    pub selected_subject: Option<i64>,
    pub search: String,
    pub semester: String,
}

impl Default for PageState {
    fn default() -> Self {
        Self {
            tab: Tab::Tasks,
            modal: Modal::None,
            selected_subject: None,
            search: String::new(),
            semester: "all".to_string(),
        }
    }
}

impl PageState {
    pub fn from_query(query: &PageQuery, viewer: &User) -> Self {
        let selected_subject = parse_id(query.subject.as_deref());
        let tab = query.tab.as_deref().and_then(Tab::parse).unwrap_or(Tab::Tasks);

        let modal = match (parse_id(query.task.as_deref()), query.modal.as_deref()) {
            (Some(task_id), _) if viewer.is_admin() => Modal::AdminTaskEdit(task_id),
            (Some(task_id), _) => Modal::TaskView(task_id),
            (None, Some("add-task")) => Modal::AddTask,
            (None, Some("add-subject")) if viewer.is_admin() => Modal::AddSubject,
            (None, Some("edit-subject")) if viewer.is_admin() => {
                parse_id(query.edit.as_deref()).map_or(Modal::None, Modal::EditSubject)
            }
            _ => Modal::None,
        };

        let semester = query
            .semester
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("all")
            .to_string();

        Self {
            tab,
            modal,
            selected_subject,
            search: query.q.as_deref().unwrap_or_default().trim().to_string(),
            semester,
        }
    }

    pub fn with_tab(&self, tab: Tab) -> Self {
        Self {
            tab,
            modal: Modal::None,
            ..self.clone()
        }
    }

    pub fn with_modal(&self, modal: Modal) -> Self {
        Self {
            modal,
            ..self.clone()
        }
    }

    pub fn select_subject(&self, subject: Option<i64>) -> Self {
        Self {
            tab: Tab::Tasks,
            modal: Modal::None,
            selected_subject: subject,
            ..self.clone()
        }
    }

    /// Link that reproduces this state.
    pub fn href(&self) -> String {
        let mut params = vec![format!("tab={}", self.tab.as_str())];
        if let Some(subject) = self.selected_subject {
            params.push(format!("subject={subject}"));
        }
        match self.modal {
            Modal::None => {}
            Modal::TaskView(id) | Modal::AdminTaskEdit(id) => params.push(format!("task={id}")),
            Modal::AddTask => params.push("modal=add-task".to_string()),
            Modal::AddSubject => params.push("modal=add-subject".to_string()),
            Modal::EditSubject(id) => {
                params.push("modal=edit-subject".to_string());
                params.push(format!("edit={id}"));
            }
        }
        if !self.search.is_empty() {
            params.push(format!("q={}", urlencoding::encode(&self.search)));
        }
        if self.semester != "all" {
            params.push(format!("semester={}", urlencoding::encode(&self.semester)));
        }
        format!("/?{}", params.join("&"))
    }

    /// Where a form post returns to: this page with any modal closed.
    pub fn back_href(&self) -> String {
        self.with_modal(Modal::None).href()
    }
}

/// Only same-site relative paths are accepted as redirect targets.
pub fn safe_back(back: Option<&str>) -> String {
    match back {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path.to_string()
        }
        _ => "/".to_string(),
    }
}

fn parse_id(value: Option<&str>) -> Option<i64> {
    value.and_then(|v| v.trim().parse().ok())
}
