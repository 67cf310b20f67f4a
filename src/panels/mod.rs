//! Console panels
//!
//! One panel per resource type. Each panel owns its view state (the loaded
//! records and an optional form), performs its calls through the shared
//! [`AdminApi`](crate::api::AdminApi) and reports every outcome as a toast.
//! Failures are also returned to the caller so one-shot commands can set an
//! exit status, but none of them is fatal and none is retried.

pub mod clients;
pub mod notifications;
pub mod rate_limits;
pub mod system_limits;

pub use clients::{ClientForm, ClientManagementPanel};
pub use notifications::{NotificationResult, NotificationTestPanel, ResultSlot};
pub use rate_limits::{RateLimitConfigPanel, RateLimitForm};
pub use system_limits::SystemLimitPanel;

use std::future::Future;
use std::io::{self, BufRead, Write};
use std::pin::Pin;

/// Future returned by panel lifecycle hooks
pub type PanelFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// A console tab bound to one resource type
pub trait Panel: Send {
    fn title(&self) -> &'static str;

    /// Periodic refresh; does nothing while a form is open
    fn poll(&mut self) -> PanelFuture<'_>;

    /// Called when the operator switches to this panel's tab
    fn on_activated(&mut self) -> PanelFuture<'_> {
        Box::pin(async {})
    }

    fn is_form_open(&self) -> bool;

    fn render(&self) -> String;
}

/// Whether a submitted form creates or updates a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMode {
    Create,
    Edit,
}

/// Asks the operator to confirm a destructive action
#[cfg_attr(test, mockall::automock)]
pub trait Confirm: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Confirms everything (`--yes`)
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

/// Prompts on stderr and reads the answer from stdin
///
/// Anything but `y`/`yes` declines, including EOF and read errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        let mut stderr = io::stderr();
        if write!(stderr, "{} [y/N] ", prompt).and_then(|_| stderr.flush()).is_err() {
            return false;
        }

        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => is_yes(&answer),
            Err(_) => false,
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// `None` for blank input, so optional fields stay off the wire
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Render rows as a plain-text table with padded columns
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let mut lines = vec![format_row(headers, &widths)];
    lines.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("  "),
    );
    for row in rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        lines.push(format_row(&cells, &widths));
    }
    lines.join("\n")
}

fn format_row(cells: &[&str], widths: &[usize]) -> String {
    cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes("n"));
        assert!(!is_yes(""));
        assert!(!is_yes("yep"));
    }

    #[test]
    fn test_assume_yes() {
        assert!(AssumeYes.confirm("Delete everything?"));
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  ".to_string())), None);
        assert_eq!(non_blank(None), None);
        assert_eq!(non_blank(Some("x".to_string())), Some("x".to_string()));
    }

    #[test]
    fn test_render_table_pads_columns() {
        let table = render_table(
            &["ID", "Name"],
            &[
                vec!["acme".to_string(), "Acme Corp".to_string()],
                vec!["b".to_string(), "Beta".to_string()],
            ],
        );
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "ID    Name");
        assert_eq!(lines[1], "----  ---------");
        assert_eq!(lines[2], "acme  Acme Corp");
        assert_eq!(lines[3], "b     Beta");
    }

    #[test]
    fn test_render_table_without_rows() {
        let table = render_table(&["Status", "Message"], &[]);
        assert_eq!(table.lines().count(), 2);
    }
}
