//! Session lifecycle.
//!
//! A session is the only durable state of the console. It is valid while
//! `now < expires_at - buffer`; a one-shot timer logs out when the buffer
//! is reached. Persisted state that is unreadable or already expired is
//! treated as no session and cleared.

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use curator_api_types::{LoginRequest, LoginResponse, User};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::LockExt;
use crate::error::SyncError;

const OWNER: &str = "session";

const DEFAULT_EXPIRY_BUFFER_SECS: u64 = 300;
/// File name of the persisted session record inside the state directory.
pub const SESSION_FILE_NAME: &str = "payload_auth.json";

/// Session settings from `curator.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Margin before token expiry at which the session is dropped.
    pub expiry_buffer_secs: u64,
    /// Directory holding the persisted session; platform default when unset.
    pub state_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            expiry_buffer_secs: DEFAULT_EXPIRY_BUFFER_SECS,
            state_dir: None,
        }
    }
}

impl SessionConfig {
    pub fn expiry_buffer(&self) -> Duration {
        Duration::seconds(self.expiry_buffer_secs as i64)
    }
}

// ============================================================================
// Session data
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    pub expires_at: OffsetDateTime,
    pub user: User,
}

impl Session {
    pub fn from_login(response: LoginResponse) -> Result<Self, SyncError> {
        let expires_at = OffsetDateTime::from_unix_timestamp(response.exp)
            .map_err(|err| SyncError::decode(format!("invalid token expiry: {err}")))?;
        Ok(Self {
            token: response.token,
            expires_at,
            user: response.user,
        })
    }

    pub fn is_valid_at(&self, now: OffsetDateTime, buffer: Duration) -> bool {
        is_valid(&self.token, self.expires_at, now, buffer)
    }
}

/// `token` is present and `now` is before the buffered expiry.
///
/// An expiry too close to the representable minimum to subtract `buffer`
/// from is treated as already expired.
pub fn is_valid(token: &str, expires_at: OffsetDateTime, now: OffsetDateTime, buffer: Duration) -> bool {
    !token.is_empty() && logout_deadline(expires_at, buffer).is_some_and(|deadline| now < deadline)
}

fn logout_deadline(expires_at: OffsetDateTime, buffer: Duration) -> Option<OffsetDateTime> {
    expires_at.checked_sub(buffer)
}

/// On-disk record; `expiresAt` is in unix milliseconds.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSession {
    token: String,
    expires_at: i64,
    user: User,
}

impl From<&Session> for StoredSession {
    fn from(session: &Session) -> Self {
        Self {
            token: session.token.clone(),
            expires_at: (session.expires_at.unix_timestamp_nanos() / 1_000_000) as i64,
            user: session.user.clone(),
        }
    }
}

impl StoredSession {
    fn into_session(self) -> Option<Session> {
        let nanos = i128::from(self.expires_at).checked_mul(1_000_000)?;
        let expires_at = OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()?;
        Some(Session {
            token: self.token,
            expires_at,
            user: self.user,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionState {
    #[default]
    Unauthenticated,
    Authenticated(Session),
}

impl SessionState {
    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::Authenticated(session) => Some(session),
            Self::Unauthenticated => None,
        }
    }
}

// ============================================================================
// Collaborators
// ============================================================================

pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<OffsetDateTime>,
}

impl ManualClock {
    pub fn new(now: OffsetDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: OffsetDateTime) {
        *self.now.lock_or_recover(OWNER, "clock_set") = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock_or_recover(OWNER, "clock_advance");
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock_or_recover(OWNER, "clock_now")
    }
}

/// Durable storage for the raw session record.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self) -> io::Result<Option<String>>;
    async fn save(&self, raw: &str) -> io::Result<()>;
    async fn clear(&self) -> io::Result<()>;
}

/// Stores the session record as a JSON file.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new(dir.into().join(SESSION_FILE_NAME))
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self) -> io::Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn save(&self, raw: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, raw).await
    }

    async fn clear(&self) -> io::Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    raw: Mutex<Option<String>>,
}

impl MemorySessionStore {
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            raw: Mutex::new(Some(raw.into())),
        }
    }

    pub fn raw(&self) -> Option<String> {
        self.raw.lock_or_recover(OWNER, "memory_raw").clone()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self) -> io::Result<Option<String>> {
        Ok(self.raw())
    }

    async fn save(&self, raw: &str) -> io::Result<()> {
        *self.raw.lock_or_recover(OWNER, "memory_save") = Some(raw.to_owned());
        Ok(())
    }

    async fn clear(&self) -> io::Result<()> {
        *self.raw.lock_or_recover(OWNER, "memory_clear") = None;
        Ok(())
    }
}

/// The external auth service.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn login(&self, credentials: &LoginRequest) -> Result<LoginResponse, SyncError>;
}

// ============================================================================
// Manager
// ============================================================================

struct Inner {
    backend: Arc<dyn AuthBackend>,
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    buffer: Duration,
    state: watch::Sender<SessionState>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

/// Owns the current session and its expiry timer.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn AuthBackend>,
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        buffer: Duration,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Unauthenticated);
        Self {
            inner: Arc::new(Inner {
                backend,
                store,
                clock,
                buffer,
                state,
                timer: Mutex::new(None),
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    pub fn buffer(&self) -> Duration {
        self.inner.buffer
    }

    /// The current session while it is still valid.
    pub fn session(&self) -> Option<Session> {
        let now = self.inner.clock.now();
        self.state()
            .session()
            .filter(|session| session.is_valid_at(now, self.inner.buffer))
            .cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session().is_some()
    }

    pub fn token(&self) -> Option<String> {
        self.session().map(|session| session.token)
    }

    /// The current session, or `StaleSession` when there is none.
    pub fn require(&self) -> Result<Session, SyncError> {
        self.session().ok_or(SyncError::StaleSession)
    }

    /// Load the persisted session, dropping it if unreadable or expired.
    pub async fn restore(&self) -> Option<Session> {
        let raw = match self.inner.store.load().await {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(error = %err, "Failed to read persisted session; treating as logged out");
                self.clear_persisted().await;
                return None;
            }
        };

        let now = self.inner.clock.now();
        let session = serde_json::from_str::<StoredSession>(&raw)
            .ok()
            .and_then(StoredSession::into_session)
            .filter(|session| session.is_valid_at(now, self.inner.buffer));

        match session {
            Some(session) => {
                info!(user = %session.user.email, expires_at = %session.expires_at, "Session restored");
                self.establish(session.clone());
                Some(session)
            }
            None => {
                debug!("Persisted session invalid or expired; clearing");
                self.clear_persisted().await;
                None
            }
        }
    }

    /// Authenticate against the auth service and persist the session.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, SyncError> {
        let credentials = LoginRequest {
            email: email.to_owned(),
            password: password.to_owned(),
        };
        let response = self.inner.backend.login(&credentials).await?;
        let session = Session::from_login(response)?;
        if logout_deadline(session.expires_at, self.inner.buffer).is_none() {
            return Err(SyncError::decode("token expiry out of range"));
        }

        let record = serde_json::to_string(&StoredSession::from(&session))?;
        if let Err(err) = self.inner.store.save(&record).await {
            warn!(error = %err, "Failed to persist session; it will not survive a restart");
        }

        info!(user = %session.user.email, expires_at = %session.expires_at, "Session established");
        self.establish(session.clone());
        Ok(session)
    }

    pub async fn logout(&self) {
        self.inner.cancel_timer();
        self.clear_persisted().await;
        self.inner.state.send_replace(SessionState::Unauthenticated);
        info!("Session ended");
    }

    fn establish(&self, session: Session) {
        self.inner.cancel_timer();
        let delay = logout_deadline(session.expires_at, self.inner.buffer)
            .map(|deadline| deadline - self.inner.clock.now())
            .and_then(|remaining| std::time::Duration::try_from(remaining).ok())
            .unwrap_or_default();
        let token = session.token.clone();
        self.inner
            .state
            .send_replace(SessionState::Authenticated(session));

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                let manager = SessionManager { inner };
                manager.expire(&token).await;
            }
        });
        *self.inner.timer.lock_or_recover(OWNER, "schedule") = Some(handle);
        debug!(delay_ms = delay.as_millis() as u64, "Session expiry scheduled");
    }

    async fn expire(&self, token: &str) {
        let current = self.state();
        if current.session().map(|session| session.token.as_str()) != Some(token) {
            return;
        }
        // Detach first so logout does not abort the task running it.
        self.inner.timer.lock_or_recover(OWNER, "expire").take();
        info!("Session expired");
        self.clear_persisted().await;
        self.inner.state.send_replace(SessionState::Unauthenticated);
    }

    async fn clear_persisted(&self) {
        if let Err(err) = self.inner.store.clear().await {
            warn!(error = %err, "Failed to clear persisted session");
        }
    }
}

impl Inner {
    fn cancel_timer(&self) {
        if let Some(handle) = self.timer.lock_or_recover(OWNER, "cancel").take() {
            handle.abort();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}
