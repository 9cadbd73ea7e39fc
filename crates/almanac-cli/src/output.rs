//! Stdout notification sink.

use std::io::Write;

use almanac_core::reminder::NotificationSink;
use almanac_core::storage::{NotificationFormat, NotificationsConfig};
use almanac_core::DueReminder;
use chrono::Local;

pub struct StdoutSink {
    enabled: bool,
    format: NotificationFormat,
}

impl StdoutSink {
    pub fn new(config: &NotificationsConfig) -> Self {
        Self {
            enabled: config.enabled,
            format: config.format,
        }
    }

    pub fn format(&self) -> NotificationFormat {
        self.format
    }
}

pub fn render_text(due: &DueReminder) -> String {
    format!(
        "[{} {}] {} ({}, #{})",
        due.effective_date,
        due.time_of_day.format("%H:%M"),
        due.message,
        due.repeat_kind,
        due.id
    )
}

impl NotificationSink for StdoutSink {
    fn deliver(&mut self, batch: &[DueReminder]) {
        if !self.enabled {
            tracing::info!(count = batch.len(), "notifications disabled, batch not shown");
            return;
        }

        let mut out = std::io::stdout().lock();
        for due in batch {
            let line = match self.format {
                NotificationFormat::Text => render_text(due),
                NotificationFormat::Json => match serde_json::to_string(due) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::warn!(id = due.id, error = %e, "failed to encode reminder");
                        continue;
                    }
                },
            };
            if let Err(e) = writeln!(out, "{line}") {
                tracing::warn!(error = %e, "failed to write reminder");
                return;
            }
        }
        let _ = out.flush();
        tracing::debug!(count = batch.len(), at = %Local::now().format("%H:%M:%S"), "batch delivered");
    }
}
