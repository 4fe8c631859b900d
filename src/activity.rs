//! User activity events, emitted as structured log records.

use tracing::info;

pub fn track_command(command: &str) {
    info!(target: "domain_appraiser::activity", command, "command");
}

pub fn track_event(action: &str, category: &str, label: &str, value: Option<f64>) {
    info!(
        target: "domain_appraiser::activity",
        action,
        category,
        label,
        value,
        "event"
    );
}
