use tracing::error;

/// Longest diagnostic body a dialog shows before the rest is cut off.
const DIALOG_TEXT_LIMIT: usize = 4000;

/// Where recoverable diagnostics are shown to the user.
pub trait DiagnosticSink: Send {
    fn report(&mut self, title: &str, message: &str);
}

/// Reports diagnostics through the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDiagnostics;

impl DiagnosticSink for LogDiagnostics {
    fn report(&mut self, title: &str, message: &str) {
        error!(title, "{message}");
    }
}

/// Logs each diagnostic, then shows it in a modal error dialog.
///
/// The dialog blocks the reporting thread until dismissed, so a broken edit
/// leaves the last good frame on screen while the message is up.
#[derive(Debug, Default, Clone, Copy)]
pub struct DialogDiagnostics;

impl DiagnosticSink for DialogDiagnostics {
    fn report(&mut self, title: &str, message: &str) {
        LogDiagnostics.report(title, message);
        show_message_box(title, message);
    }
}

/// Shows a modal error dialog with a single OK button.
pub(crate) fn show_message_box(title: &str, message: &str) {
    let _ = rfd::MessageDialog::new()
        .set_level(rfd::MessageLevel::Error)
        .set_title(title)
        .set_description(dialog_text(message))
        .set_buttons(rfd::MessageButtons::Ok)
        .show();
}

/// Compiler output can run to pages; dialogs get the head of it.
fn dialog_text(message: &str) -> String {
    if message.len() <= DIALOG_TEXT_LIMIT {
        return message.to_string();
    }
    let mut end = DIALOG_TEXT_LIMIT;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n\n(truncated; see the log for the full message)", &message[..end])
}
