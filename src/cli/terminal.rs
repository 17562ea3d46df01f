//! Line-oriented terminal: text prompts and the dialog presenter.

use std::io::Write;
use std::sync::Arc;

use curator::dialog::{DialogAction, DialogKind, DialogQueue, DialogRequest, Focus, Tone};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use super::CliError;

pub struct Terminal {
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl Terminal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        })
    }

    /// Print `prompt` and read one line; `None` at end of input.
    pub async fn read_line(&self, prompt: &str) -> Result<Option<String>, CliError> {
        let mut stderr = std::io::stderr();
        write!(stderr, "{prompt}")?;
        stderr.flush()?;
        let mut lines = self.lines.lock().await;
        Ok(lines.next_line().await?)
    }

    /// Render every prompt raised on `dialogs`, one at a time, until the
    /// returned task is aborted.
    pub fn present(self: &Arc<Self>, dialogs: Arc<DialogQueue>) -> JoinHandle<()> {
        let terminal = Arc::clone(self);
        tokio::spawn(async move {
            let mut active = dialogs.subscribe();
            loop {
                let current = active.borrow_and_update().clone();
                let Some(request) = current else {
                    if active.changed().await.is_err() {
                        break;
                    }
                    continue;
                };

                let answer = match terminal.read_line(&render(&request)).await {
                    Ok(Some(line)) => parse_answer(&request, &line),
                    Ok(None) | Err(_) => DialogAction::Escape,
                };
                debug!(dialog_id = %request.id, ?answer, "Dialog answered");
                dialogs.respond(request.id, answer);
            }
        })
    }
}

fn render(request: &DialogRequest) -> String {
    let marker = match request.tone {
        Tone::Danger => "!! ",
        Tone::Default => "",
    };
    let mut out = format!("\n{marker}{}\n{}\n", request.title, request.message);
    match (&request.kind, &request.cancel_label) {
        (DialogKind::Confirm, Some(cancel)) => {
            let (confirm, cancel) = match request.default_focus {
                Focus::Confirm => (
                    format!("[{}]", request.confirm_label),
                    cancel.to_string(),
                ),
                Focus::Cancel => (request.confirm_label.clone(), format!("[{cancel}]")),
            };
            out.push_str(&format!("{confirm} (y) / {cancel} (n), q to dismiss: "));
        }
        _ => out.push_str(&format!("[{}] press Enter: ", request.confirm_label)),
    }
    out
}

/// Map a typed answer to a dialog action.
///
/// An empty line or `q` dismisses the prompt like Escape; anything
/// unrecognised on a confirm does the same.
fn parse_answer(request: &DialogRequest, line: &str) -> DialogAction {
    let answer = line.trim().to_lowercase();
    if answer.is_empty() || answer == "q" {
        return DialogAction::Escape;
    }
    match request.kind {
        DialogKind::Alert => DialogAction::Confirm,
        DialogKind::Confirm => {
            let cancel = request.cancel_label.as_deref().map(str::to_lowercase);
            if answer == "y" || answer == "yes" || answer == request.confirm_label.to_lowercase()
            {
                DialogAction::Confirm
            } else if answer == "n" || answer == "no" || Some(&answer) == cancel.as_ref() {
                DialogAction::Cancel
            } else {
                DialogAction::Escape
            }
        }
    }
}
