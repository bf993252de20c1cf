//! Views derived from the subject, task and follow sets. Nothing here is
//! stored; every page render recomputes these from a fresh snapshot.

use chrono::{DateTime, Utc};

use crate::models::{AnalyticsData, Subject, SubjectAnalysis, Task};

/// Followed subjects in catalog order, annotated with their task counts.
pub fn process_subject_data(
    all_subjects: &[Subject],
    followed_ids: &[i64],
    tasks: &[Task],
) -> Vec<Subject> {
    all_subjects
        .iter()
        .filter(|subject| followed_ids.contains(&subject.id))
        .map(|subject| {
            let (total, completed) = count_tasks(tasks, subject.id);
            Subject {
                task_count: total,
                completed_tasks: completed,
                ..subject.clone()
            }
        })
        .collect()
}

pub fn filter_subjects(all_subjects: &[Subject], query: &str, semester_filter: &str) -> Vec<Subject> {
    let needle = query.to_lowercase();
    all_subjects
        .iter()
        .filter(|subject| {
            let matches_search = subject.name.to_lowercase().contains(&needle)
                || subject.code.to_lowercase().contains(&needle);
            let matches_semester = semester_filter == "all" || subject.semester == semester_filter;
            matches_search && matches_semester
        })
        .cloned()
        .collect()
}

/// With a selected subject, every task of that subject. Without one, the
/// open tasks of the subjects in `scope`. Sorted by deadline, earliest first.
pub fn filter_tasks(tasks: &[Task], selected_subject: Option<i64>, scope: &[i64]) -> Vec<Task> {
    let mut filtered: Vec<Task> = match selected_subject {
        Some(subject_id) => tasks
            .iter()
            .filter(|task| task.subject_id == subject_id)
            .cloned()
            .collect(),
        None => tasks
            .iter()
            .filter(|task| !task.completed && scope.contains(&task.subject_id))
            .cloned()
            .collect(),
    };
    filtered.sort_by_key(|task| task.deadline);
    filtered
}

pub fn generate_analytics_data(
    tasks: &[Task],
    my_subjects: &[Subject],
    my_subject_ids: &[i64],
    now: DateTime<Utc>,
) -> AnalyticsData {
    let my_tasks: Vec<&Task> = tasks
        .iter()
        .filter(|task| my_subject_ids.contains(&task.subject_id))
        .collect();

    AnalyticsData {
        total_tasks: my_tasks.len(),
        completed_tasks: my_tasks.iter().filter(|task| task.completed).count(),
        total_subjects: my_subjects.len(),
        overdue_tasks: my_tasks.iter().filter(|task| is_overdue(task, now)).count(),
        subject_analysis: my_subjects
            .iter()
            .map(|subject| {
                let (total, completed) = count_tasks(tasks, subject.id);
                SubjectAnalysis {
                    subject: subject.name.clone(),
                    completion: completed,
                    total,
                    percentage: completion_percentage(completed, total),
                }
            })
            .collect(),
    }
}

/// Rounded percentage; zero when there is nothing to complete.
pub fn completion_percentage(completed: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((completed as f64 / total as f64) * 100.0).round() as u32
}

pub fn is_overdue(task: &Task, now: DateTime<Utc>) -> bool {
    !task.completed && now > task.deadline
}

fn count_tasks(tasks: &[Task], subject_id: i64) -> (usize, usize) {
    tasks
        .iter()
        .filter(|task| task.subject_id == subject_id)
        .fold((0, 0), |(total, completed), task| {
            (total + 1, completed + usize::from(task.completed))
        })
}
