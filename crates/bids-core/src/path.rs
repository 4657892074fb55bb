use crate::identity::{IdRole, Identity};
use std::path::PathBuf;

pub const UNKNOWN_LABEL: &str = "Unknown";

/// Derives output names from a locked identity.
pub struct PathBuilder;

impl PathBuilder {
    /// `sub-001_ses-01`, or just the subject when there is no session label.
    pub fn prefix(identity: &Identity) -> String {
        let mut prefix = identity.subject().unwrap_or(UNKNOWN_LABEL).to_string();
        if let Some(session) = identity.session().filter(|label| !label.is_empty()) {
            prefix.push('_');
            prefix.push_str(session);
        }
        prefix
    }

    pub fn relative_path(identity: &Identity, include_empty_session: bool) -> PathBuf {
        let mut path = PathBuf::from(identity.subject().unwrap_or(UNKNOWN_LABEL));
        match identity.session() {
            Some(session) if !session.is_empty() => path.push(session),
            Some(_) if include_empty_session => path.push(IdRole::Session.prefix()),
            None if include_empty_session => path.push(UNKNOWN_LABEL),
            _ => {}
        }
        path
    }
}
