use crate::panic::PanicReport;
use log::{debug, warn};

/// Notification display duration.
/// Unit: milliseconds
const NOTIFICATION_TIMEOUT_MS: u32 = 5000;

/// Body of the single confirmation shown after a panic run.
///
/// Per-step failures are deliberately absent; the user is not in a position
/// to act on them.
pub fn help_sent_message(report: &PanicReport) -> &'static str {
    if report.alerts_sent > 0 {
        "Help request sent."
    } else {
        "Help request could not be delivered. Call emergency services if you can."
    }
}

/// Show the "help request sent" confirmation. Best-effort: failures are
/// logged and otherwise ignored.
pub fn show_help_sent_notification(report: &PanicReport) {
    let result = notify_rust::Notification::new()
        .summary("Guardian")
        .body(help_sent_message(report))
        .timeout(notify_rust::Timeout::Milliseconds(NOTIFICATION_TIMEOUT_MS))
        .show();

    match result {
        Ok(_) => debug!("Help-sent confirmation shown"),
        Err(e) => warn!("Could not show confirmation: {}", e),
    }
}
