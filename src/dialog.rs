//! Serialized alert and confirm prompts.
//!
//! Any task may raise a prompt; requests queue FIFO and exactly one is active
//! at a time. The presenter watches [`DialogQueue::subscribe`] and answers
//! the active request with [`DialogQueue::respond`].

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use tokio::sync::{oneshot, watch};
use tracing::{debug, info};

use crate::cache::LockExt;

const OWNER: &str = "dialog";

const DEFAULT_ALERT_TITLE: &str = "Notice";
const DEFAULT_CONFIRM_TITLE: &str = "Confirm";
const DEFAULT_ALERT_LABEL: &str = "OK";
const DEFAULT_CONFIRM_LABEL: &str = "Confirm";
const DEFAULT_CANCEL_LABEL: &str = "Cancel";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DialogId(u64);

impl fmt::Display for DialogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogKind {
    Alert,
    Confirm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tone {
    #[default]
    Default,
    Danger,
}

/// Button that receives initial focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Confirm,
    Cancel,
}

/// How the user dismissed the active prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogAction {
    Confirm,
    Cancel,
    Escape,
}

/// Overrides for a single prompt; unset fields fall back per kind.
#[derive(Debug, Clone, Default)]
pub struct DialogOptions {
    pub title: Option<String>,
    pub confirm_label: Option<String>,
    pub cancel_label: Option<String>,
    pub tone: Option<Tone>,
    pub default_focus: Option<Focus>,
}

impl DialogOptions {
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn confirm_label(mut self, label: impl Into<String>) -> Self {
        self.confirm_label = Some(label.into());
        self
    }

    pub fn cancel_label(mut self, label: impl Into<String>) -> Self {
        self.cancel_label = Some(label.into());
        self
    }

    pub fn danger(mut self) -> Self {
        self.tone = Some(Tone::Danger);
        self
    }

    pub fn focus(mut self, focus: Focus) -> Self {
        self.default_focus = Some(focus);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogRequest {
    pub id: DialogId,
    pub kind: DialogKind,
    pub title: String,
    pub message: String,
    pub confirm_label: String,
    /// Only confirms have a cancel button.
    pub cancel_label: Option<String>,
    pub tone: Tone,
    pub default_focus: Focus,
}

impl DialogRequest {
    fn build(id: DialogId, kind: DialogKind, message: String, options: DialogOptions) -> Self {
        match kind {
            DialogKind::Alert => Self {
                id,
                kind,
                title: options.title.unwrap_or_else(|| DEFAULT_ALERT_TITLE.to_owned()),
                message,
                confirm_label: options
                    .confirm_label
                    .unwrap_or_else(|| DEFAULT_ALERT_LABEL.to_owned()),
                cancel_label: None,
                tone: options.tone.unwrap_or_default(),
                default_focus: options.default_focus.unwrap_or(Focus::Confirm),
            },
            DialogKind::Confirm => Self {
                id,
                kind,
                title: options
                    .title
                    .unwrap_or_else(|| DEFAULT_CONFIRM_TITLE.to_owned()),
                message,
                confirm_label: options
                    .confirm_label
                    .unwrap_or_else(|| DEFAULT_CONFIRM_LABEL.to_owned()),
                cancel_label: Some(
                    options
                        .cancel_label
                        .unwrap_or_else(|| DEFAULT_CANCEL_LABEL.to_owned()),
                ),
                tone: options.tone.unwrap_or_default(),
                default_focus: options.default_focus.unwrap_or(Focus::Cancel),
            },
        }
    }

    /// Answer produced by `action`. An alert only has a confirm button.
    pub fn result_for(&self, action: DialogAction) -> bool {
        match (self.kind, action) {
            (_, DialogAction::Confirm) => true,
            (DialogKind::Alert, _) => true,
            (DialogKind::Confirm, _) => false,
        }
    }
}

/// Answer to one prompt. Resolves with the Escape result if the queue is
/// dropped before the prompt is answered.
pub struct DialogReply {
    id: DialogId,
    receiver: oneshot::Receiver<bool>,
    fallback: bool,
}

impl DialogReply {
    pub fn id(&self) -> DialogId {
        self.id
    }
}

impl Future for DialogReply {
    type Output = bool;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<bool> {
        let fallback = self.fallback;
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|answer| answer.unwrap_or(fallback))
    }
}

struct Pending {
    request: DialogRequest,
    reply: oneshot::Sender<bool>,
}

#[derive(Default)]
struct QueueState {
    active: Option<Pending>,
    waiting: VecDeque<Pending>,
}

pub struct DialogQueue {
    state: Mutex<QueueState>,
    next_id: AtomicU64,
    active: watch::Sender<Option<DialogRequest>>,
}

impl Default for DialogQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl DialogQueue {
    pub fn new() -> Self {
        let (active, _) = watch::channel(None);
        Self {
            state: Mutex::new(QueueState::default()),
            next_id: AtomicU64::new(1),
            active,
        }
    }

    /// Queue a notice; resolves to `true` once dismissed.
    pub fn alert(&self, message: impl fmt::Display, options: DialogOptions) -> DialogReply {
        self.enqueue(DialogKind::Alert, message.to_string(), options)
    }

    /// Queue a yes/no question.
    pub fn confirm(&self, message: impl fmt::Display, options: DialogOptions) -> DialogReply {
        self.enqueue(DialogKind::Confirm, message.to_string(), options)
    }

    fn enqueue(&self, kind: DialogKind, message: String, options: DialogOptions) -> DialogReply {
        let id = DialogId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let request = DialogRequest::build(id, kind, message, options);
        let fallback = request.result_for(DialogAction::Escape);
        let (reply, receiver) = oneshot::channel();
        let pending = Pending { request, reply };

        let mut state = self.state.lock_or_recover(OWNER, "enqueue");
        if state.active.is_none() {
            self.activate(&mut state, pending);
        } else {
            debug!(dialog_id = %id, queued = state.waiting.len() + 1, "Dialog queued");
            state.waiting.push_back(pending);
        }

        DialogReply {
            id,
            receiver,
            fallback,
        }
    }

    fn activate(&self, state: &mut QueueState, pending: Pending) {
        info!(
            dialog_id = %pending.request.id,
            kind = ?pending.request.kind,
            title = %pending.request.title,
            "Dialog shown"
        );
        self.active.send_replace(Some(pending.request.clone()));
        state.active = Some(pending);
    }

    /// The prompt currently shown, if any.
    pub fn active(&self) -> Option<DialogRequest> {
        self.active.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<DialogRequest>> {
        self.active.subscribe()
    }

    /// Prompts waiting behind the active one.
    pub fn waiting(&self) -> usize {
        self.state.lock_or_recover(OWNER, "waiting").waiting.len()
    }

    /// Answer the active prompt and show the next one.
    ///
    /// Returns the delivered result, or `None` if `id` is not active.
    pub fn respond(&self, id: DialogId, action: DialogAction) -> Option<bool> {
        let mut state = self.state.lock_or_recover(OWNER, "respond");
        if state.active.as_ref().map(|pending| pending.request.id) != Some(id) {
            debug!(dialog_id = %id, "Ignoring response for inactive dialog");
            return None;
        }
        let answered = state.active.take()?;
        let result = answered.request.result_for(action);
        // The caller may have stopped waiting; the prompt is still answered.
        let _ = answered.reply.send(result);
        info!(dialog_id = %id, action = ?action, result, "Dialog answered");

        match state.waiting.pop_front() {
            Some(next) => self.activate(&mut state, next),
            None => {
                self.active.send_replace(None);
            }
        }
        Some(result)
    }

    /// Answer the active prompt, whichever it is.
    pub fn respond_active(&self, action: DialogAction) -> Option<bool> {
        let id = self.active()?.id;
        self.respond(id, action)
    }

    /// Escape every queued prompt, active one first.
    pub fn dismiss_all(&self) -> usize {
        let mut dismissed = 0;
        while self.respond_active(DialogAction::Escape).is_some() {
            dismissed += 1;
        }
        dismissed
    }
}
