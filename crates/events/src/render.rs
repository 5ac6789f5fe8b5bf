//! Default markdown digest renderer.

use std::fmt::Write as _;

use crate::{DigestRenderer, EventKind, StagedEvent, Transition};

/// Renders a burst as a markdown block: a per-kind heading, one bullet group
/// per staged record, then the operator.
#[derive(Debug, Clone, Default)]
pub struct MarkdownDigestRenderer {
    issue_base_url: Option<String>,
}

impl MarkdownDigestRenderer {
    /// Creates a renderer. With a base URL, subjects link to
    /// `{issue_base_url}/browse/{subject}`.
    pub fn new(issue_base_url: Option<String>) -> Self {
        Self {
            issue_base_url: issue_base_url.map(|url| url.trim_end_matches('/').to_string()),
        }
    }

    fn subject_line(&self, event: &StagedEvent) -> String {
        let text = format!("{} {}", event.subject, event.summary);
        if matches!(event.transition, Transition::Deleted) {
            return format!("~~{text}~~");
        }
        match &self.issue_base_url {
            Some(base) => format!("[{text}]({base}/browse/{})", event.subject),
            None => text,
        }
    }
}

/// Heading shown for a digest of `kind`.
pub fn digest_title(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Created => "New issue created",
        EventKind::Deleted => "Issue deleted",
        EventKind::ReporterChanged => "Reporter changed",
        EventKind::AssigneeChanged => "Assignee changed",
        EventKind::StatusChanged => "Status changed",
    }
}

fn transition_line(transition: &Transition) -> Option<String> {
    match transition {
        Transition::Created | Transition::Deleted => None,
        Transition::ReporterChanged { from, to } => {
            Some(format!("**Reporter**: ~~{from}~~ → **{to}**"))
        }
        Transition::AssigneeChanged { from: None, to } => Some(format!("**Assignee**: → **{to}**")),
        Transition::AssigneeChanged { from: Some(from), to } => {
            Some(format!("**Assignee**: ~~{from}~~ → **{to}**"))
        }
        Transition::StatusChanged { from, to } => Some(format!("**Status**: ~~{from}~~ → **{to}**")),
    }
}

impl DigestRenderer for MarkdownDigestRenderer {
    fn render(&self, kind: EventKind, events: &[StagedEvent]) -> String {
        let mut body = format!("### Change notification: {}\n", digest_title(kind));
        for event in events {
            // Writing into a String cannot fail.
            let _ = writeln!(body, "- **Summary**: {}", self.subject_line(event));
            if let Some(line) = transition_line(&event.transition) {
                let _ = writeln!(body, "- {line}");
            }
        }
        if let Some(first) = events.first() {
            let _ = writeln!(body, "- **Operator**: {}", first.actor);
        }
        body
    }
}
