//! Signed-in identity and its change channel.
//!
//! # Responsibility
//! - Model the identity yielded by the external authentication flow.
//! - Publish the current identity (or none) to interested components.
//!
//! # Invariants
//! - `OwnerId` is never blank.
//! - Re-announcing the same owner does not notify subscribers.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use tokio::sync::watch;

const DEVICE_OWNER_ID: &str = "device";

/// Key that scopes one user's task collection in a store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerId(String);

impl OwnerId {
    /// Creates an owner id from trimmed, non-empty input.
    ///
    /// # Errors
    /// - Returns `InvalidOwnerId` when the trimmed value is empty.
    pub fn new(value: impl AsRef<str>) -> Result<Self, InvalidOwnerId> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(InvalidOwnerId);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Bucket used by local stores when nobody is signed in.
    pub fn device() -> Self {
        Self(DEVICE_OWNER_ID.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for OwnerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for OwnerId {
    type Error = InvalidOwnerId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<OwnerId> for String {
    fn from(value: OwnerId) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidOwnerId;

impl Display for InvalidOwnerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "owner id must not be empty")
    }
}

impl Error for InvalidOwnerId {}

/// Signed-in user as reported by the authentication flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub owner_id: OwnerId,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

impl Identity {
    pub fn new(owner_id: OwnerId) -> Self {
        Self {
            owner_id,
            display_name: None,
            email: None,
        }
    }

    /// Identity for single-user, local-only setups.
    pub fn device() -> Self {
        Self::new(OwnerId::device())
    }
}

/// Current identity plus change notifications.
#[derive(Debug)]
pub struct IdentityHub {
    tx: watch::Sender<Option<Identity>>,
}

impl Default for IdentityHub {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityHub {
    /// Starts signed out.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Replaces the current identity. Same-owner sign-ins are silent.
    pub fn sign_in(&self, identity: Identity) {
        self.tx.send_if_modified(|current| {
            let changed = current
                .as_ref()
                .map_or(true, |existing| existing.owner_id != identity.owner_id);
            *current = Some(identity);
            changed
        });
    }

    pub fn sign_out(&self) {
        self.tx.send_if_modified(|current| current.take().is_some());
    }

    pub fn current(&self) -> Option<Identity> {
        self.tx.borrow().clone()
    }

    /// Receiver that observes every owner change.
    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.tx.subscribe()
    }
}
