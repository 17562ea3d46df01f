//! The `curator` command-line console.

pub mod handlers;
mod print;
mod terminal;

use std::sync::Arc;

use curator::config::{LoadError, Settings};
use curator::dialog::{DialogOptions, DialogQueue};
use curator::telemetry::TelemetryError;
use curator::{Console, SyncError};
use thiserror::Error;
use tokio::task::JoinHandle;

pub use terminal::Terminal;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] LoadError),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error("{0}")]
    Sync(#[from] SyncError),
    #[error("terminal I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to render output: {0}")]
    Output(#[from] serde_json::Error),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Console plus the terminal that answers its dialogs.
pub struct Ctx {
    pub console: Console,
    pub terminal: Arc<Terminal>,
    presenter: JoinHandle<()>,
}

impl Ctx {
    pub async fn new(settings: &Settings) -> Result<Self, CliError> {
        Ok(Self::with_console(Console::new(settings)?).await)
    }

    /// Restore the persisted session and start presenting dialogs.
    pub async fn with_console(console: Console) -> Self {
        console.session().restore().await;
        let terminal = Terminal::new();
        let presenter = terminal.present(Arc::clone(console.dialogs()));
        Self {
            console,
            terminal,
            presenter,
        }
    }

    pub fn dialogs(&self) -> &Arc<DialogQueue> {
        self.console.dialogs()
    }

    /// Ask before a destructive action unless `assume_yes` is set.
    pub async fn confirm_danger(&self, message: String, assume_yes: bool) -> bool {
        if assume_yes {
            return true;
        }
        self.dialogs()
            .confirm(message, DialogOptions::default().confirm_label("Delete").danger())
            .await
    }
}

impl Drop for Ctx {
    fn drop(&mut self) {
        self.presenter.abort();
    }
}
