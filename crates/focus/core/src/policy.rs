//! Focus policy types and the decision function.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

use crate::error::ConfigurationError;
use crate::event::ForegroundEvent;

/// Identifier of an application on the host (bundle or package id).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApplicationId(String);

impl ApplicationId {
    /// Parse and validate an identifier.
    pub fn parse(raw: impl Into<String>) -> Result<Self, ConfigurationError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(ConfigurationError::EmptyApplicationId);
        }
        if raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(ConfigurationError::InvalidApplicationId(raw));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ApplicationId {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ApplicationId> for String {
    fn from(id: ApplicationId) -> Self {
        id.0
    }
}

impl std::borrow::Borrow<str> for ApplicationId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ApplicationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Current enforcement policy.
///
/// A published policy is never mutated; updates replace the whole value.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PolicyState {
    /// When false the blocked set is inert.
    #[serde(default)]
    pub lock_mode_enabled: bool,
    /// Applications blocked while lock mode is on.
    #[serde(default)]
    pub blocked_applications: BTreeSet<ApplicationId>,
}

impl PolicyState {
    pub fn new(
        lock_mode_enabled: bool,
        blocked_applications: impl IntoIterator<Item = ApplicationId>,
    ) -> Self {
        Self {
            lock_mode_enabled,
            blocked_applications: blocked_applications.into_iter().collect(),
        }
    }

    /// Build a policy from raw identifiers, rejecting the whole input if any
    /// entry is malformed.
    pub fn from_raw<I, S>(lock_mode_enabled: bool, blocked: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let blocked_applications = blocked
            .into_iter()
            .map(ApplicationId::parse)
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(Self {
            lock_mode_enabled,
            blocked_applications,
        })
    }

    pub fn is_listed(&self, application_id: &str) -> bool {
        self.blocked_applications.contains(application_id)
    }
}

/// Outcome of evaluating one foreground switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Block,
}

/// Identifiers that can never be blocked.
#[derive(Debug, Clone, Copy)]
pub struct ProtectedIdentifiers {
    exact: &'static [&'static str],
    prefixes: &'static [&'static str],
}

impl ProtectedIdentifiers {
    pub const fn new(exact: &'static [&'static str], prefixes: &'static [&'static str]) -> Self {
        Self { exact, prefixes }
    }

    pub fn contains(&self, application_id: &str) -> bool {
        self.exact.contains(&application_id)
            || self.prefixes.iter().any(|p| application_id.starts_with(p))
    }
}

/// System shells, the dialer and desktop essentials.
pub const PROTECTED: ProtectedIdentifiers = ProtectedIdentifiers::new(
    &[
        "com.android.systemui",
        "com.google.android.dialer",
        "com.apple.dock",
        "com.apple.loginwindow",
        "com.apple.SecurityAgent",
        "com.apple.WindowManager",
        "com.apple.systemuiserver",
        "com.apple.controlcenter",
        "com.apple.notificationcenterui",
    ],
    &["com.android"],
);

/// Decide whether the newly foregrounded application may stay.
///
/// Self and protected identifiers win over policy, and the blocked set only
/// applies while lock mode is on.
pub fn decide(policy: &PolicyState, event: &ForegroundEvent, self_id: &ApplicationId) -> Decision {
    let app = event.application_id.as_str();

    if app == self_id.as_str() || PROTECTED.contains(app) {
        return Decision::Allow;
    }

    if policy.lock_mode_enabled && policy.is_listed(app) {
        Decision::Block
    } else {
        Decision::Allow
    }
}

/// Owner of the published policy snapshot.
///
/// Readers take an `Arc` of the current value; writers publish a complete new
/// value, so a reader never sees a half-applied update.
#[derive(Debug, Clone)]
pub struct PolicyHandle {
    tx: Arc<watch::Sender<Arc<PolicyState>>>,
}

impl PolicyHandle {
    pub fn new(initial: PolicyState) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(initial));
        Self { tx: Arc::new(tx) }
    }

    /// The policy in force right now.
    pub fn snapshot(&self) -> Arc<PolicyState> {
        self.tx.borrow().clone()
    }

    pub fn replace(&self, policy: PolicyState) {
        tracing::info!(
            lock_mode = policy.lock_mode_enabled,
            blocked = policy.blocked_applications.len(),
            "policy replaced"
        );
        self.tx.send_replace(Arc::new(policy));
    }

    pub fn set_lock_mode(&self, enabled: bool) {
        self.tx.send_modify(|current| {
            *current = Arc::new(PolicyState {
                lock_mode_enabled: enabled,
                blocked_applications: current.blocked_applications.clone(),
            });
        });
        tracing::info!(lock_mode = enabled, "lock mode set");
    }

    pub fn set_blocked_applications(&self, blocked: BTreeSet<ApplicationId>) {
        let count = blocked.len();
        self.tx.send_modify(|current| {
            *current = Arc::new(PolicyState {
                lock_mode_enabled: current.lock_mode_enabled,
                blocked_applications: blocked,
            });
        });
        tracing::info!(blocked = count, "blocked applications updated");
    }
}

impl Default for PolicyHandle {
    fn default() -> Self {
        Self::new(PolicyState::default())
    }
}
