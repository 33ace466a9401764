//! Script export for tasks that still need downloading.
//!
//! Pure text transformations over [`DownloadTask`] lists; no network, no
//! filesystem. Only tasks that are not yet complete are exported, so a
//! partially successful batch yields a script covering exactly the
//! remainder.

use serde::Serialize;

use crate::config::Credentials;
use crate::download::{DownloadTask, TaskState};

/// Output syntax for the exported script.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    /// One `wget -c` invocation per task, resumable and authenticated.
    Wget,
    /// Bare download URLs, one per line.
    Urls,
    /// A JSON array of task records.
    Json,
}

#[derive(Serialize)]
struct TaskRecord<'a> {
    id: &'a str,
    title: &'a str,
    url: &'a str,
    path: String,
    size: u64,
}

/// Renders the tasks that still need downloading (Pending or Failed) into
/// the requested format. Complete tasks are omitted.
pub fn export_tasks(
    tasks: &[DownloadTask],
    credentials: &Credentials,
    format: ExportFormat,
) -> Result<String, serde_json::Error> {
    let remaining: Vec<&DownloadTask> = tasks
        .iter()
        .filter(|t| matches!(t.state, TaskState::Pending | TaskState::Failed))
        .collect();

    let text = match format {
        ExportFormat::Wget => {
            let mut lines: Vec<String> = remaining
                .iter()
                .map(|t| {
                    format!(
                        "wget -c -T120 --user=\"{}\" --password=\"{}\" -O \"{}\" \"{}\"",
                        shell_escape(&credentials.username),
                        shell_escape(&credentials.password),
                        shell_escape(&t.target.display().to_string()),
                        t.scene.url,
                    )
                })
                .collect();
            lines.push(String::new());
            lines.join("\n")
        }
        ExportFormat::Urls => {
            let mut lines: Vec<String> =
                remaining.iter().map(|t| t.scene.url.clone()).collect();
            lines.push(String::new());
            lines.join("\n")
        }
        ExportFormat::Json => {
            let records: Vec<TaskRecord<'_>> = remaining
                .iter()
                .map(|t| TaskRecord {
                    id: &t.scene.id,
                    title: &t.scene.title,
                    url: &t.scene.url,
                    path: t.target.display().to_string(),
                    size: t.scene.size,
                })
                .collect();
            serde_json::to_string_pretty(&records)?
        }
    };
    Ok(text)
}

/// Escapes characters that would break out of a double-quoted shell word.
fn shell_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
