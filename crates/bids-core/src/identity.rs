use serde_json::Value;
use std::fmt;
use thiserror::Error;

const DROPPED_SEPARATORS: [char; 4] = [' ', '_', '-', '.'];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("{role} identifier is locked")]
    Locked { role: IdRole },
    #[error("{role} identifier must be a string or null, found {found}")]
    InvalidType { role: IdRole, found: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdRole {
    Subject,
    Session,
}

impl IdRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Subject => "subject",
            Self::Session => "session",
        }
    }

    pub fn prefix(self) -> &'static str {
        match self {
            Self::Subject => "sub-",
            Self::Session => "ses-",
        }
    }
}

impl fmt::Display for IdRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Turns a raw identifier into a BIDS label: `" 0_01.a "` becomes
/// `"sub-001a"`. Labels already carrying `prefix` are not prefixed twice, and
/// input that cleans down to nothing yields an empty string.
pub fn sanitize(raw: &str, prefix: &str) -> String {
    let trimmed = raw.trim();
    let body = trimmed.strip_prefix(prefix).unwrap_or(trimmed);
    let cleaned: String = body
        .chars()
        .filter(|ch| !DROPPED_SEPARATORS.contains(ch))
        .filter(|ch| ch.is_alphanumeric())
        .collect();
    if cleaned.is_empty() {
        String::new()
    } else {
        format!("{prefix}{cleaned}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SlotState {
    #[default]
    Unset,
    Set(Option<String>),
    Locked(Option<String>),
}

/// One lockable identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierSlot {
    role: IdRole,
    state: SlotState,
}

impl IdentifierSlot {
    pub fn new(role: IdRole) -> Self {
        Self {
            role,
            state: SlotState::Unset,
        }
    }

    pub fn role(&self) -> IdRole {
        self.role
    }

    pub fn state(&self) -> &SlotState {
        &self.state
    }

    pub fn value(&self) -> Option<&str> {
        match &self.state {
            SlotState::Unset => None,
            SlotState::Set(value) | SlotState::Locked(value) => value.as_deref(),
        }
    }

    pub fn is_locked(&self) -> bool {
        matches!(self.state, SlotState::Locked(_))
    }

    pub fn set(&mut self, raw: Option<&str>) -> Result<(), IdentityError> {
        if self.is_locked() {
            return Err(IdentityError::Locked { role: self.role });
        }
        self.state = SlotState::Set(raw.map(str::to_string));
        Ok(())
    }

    pub fn set_value(&mut self, raw: &Value) -> Result<(), IdentityError> {
        if self.is_locked() {
            return Err(IdentityError::Locked { role: self.role });
        }
        match raw {
            Value::Null => self.set(None),
            Value::String(value) => self.set(Some(value)),
            other => Err(IdentityError::InvalidType {
                role: self.role,
                found: json_kind(other),
            }),
        }
    }

    /// Locks and canonicalizes. Locking a locked slot changes nothing.
    pub fn lock(&mut self) {
        let next = match &self.state {
            SlotState::Locked(_) => return,
            SlotState::Unset => None,
            SlotState::Set(value) => value
                .as_deref()
                .map(|raw| sanitize(raw, self.role.prefix())),
        };
        self.state = SlotState::Locked(next);
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionPolicy {
    #[default]
    Required,
    Optional,
}

/// Subject and session identity of one processing unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    subject: IdentifierSlot,
    session: IdentifierSlot,
    policy: SessionPolicy,
}

impl Default for Identity {
    fn default() -> Self {
        Self::new(SessionPolicy::default())
    }
}

impl Identity {
    pub fn new(policy: SessionPolicy) -> Self {
        Self {
            subject: IdentifierSlot::new(IdRole::Subject),
            session: IdentifierSlot::new(IdRole::Session),
            policy,
        }
    }

    /// Sets and locks whichever identifiers are given.
    pub fn with_ids(subject: Option<&str>, session: Option<&str>, policy: SessionPolicy) -> Self {
        let mut identity = Self::new(policy);
        if subject.is_some() {
            identity.subject.state = SlotState::Set(subject.map(str::to_string));
            identity.subject.lock();
        }
        if session.is_some() {
            identity.session.state = SlotState::Set(session.map(str::to_string));
            identity.session.lock();
        }
        identity
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.value()
    }

    pub fn session(&self) -> Option<&str> {
        self.session.value()
    }

    pub fn subject_slot(&self) -> &IdentifierSlot {
        &self.subject
    }

    pub fn session_slot(&self) -> &IdentifierSlot {
        &self.session
    }

    pub fn set_subject(&mut self, raw: Option<&str>) -> Result<(), IdentityError> {
        self.subject.set(raw)
    }

    pub fn set_session(&mut self, raw: Option<&str>) -> Result<(), IdentityError> {
        self.session.set(raw)
    }

    pub fn set_subject_value(&mut self, raw: &Value) -> Result<(), IdentityError> {
        self.subject.set_value(raw)
    }

    pub fn set_session_value(&mut self, raw: &Value) -> Result<(), IdentityError> {
        self.session.set_value(raw)
    }

    pub fn lock_subject(&mut self) {
        self.subject.lock();
    }

    pub fn lock_session(&mut self) {
        self.session.lock();
    }

    pub fn lock(&mut self) {
        self.lock_subject();
        self.lock_session();
    }

    pub fn is_locked(&self) -> bool {
        self.subject.is_locked() && self.session.is_locked()
    }

    pub fn is_subject_valid(&self) -> bool {
        self.subject.is_locked() && self.subject().is_some_and(|label| !label.is_empty())
    }

    pub fn is_session_valid(&self) -> bool {
        match (self.policy, self.session.state()) {
            (SessionPolicy::Optional, SlotState::Unset) => true,
            (SessionPolicy::Optional, SlotState::Locked(_)) => true,
            (SessionPolicy::Required, SlotState::Locked(value)) => value.is_some(),
            (_, _) => false,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_subject_valid() && self.is_session_valid()
    }
}
