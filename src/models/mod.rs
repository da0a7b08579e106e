use serde::{Deserialize, Serialize};

/// Id of an entry that was created locally and has not been assigned a
/// server id yet.
pub(crate) const SENTINEL_ID: &str = "";

/// Snapshot of a user at the time an entry was created, edited or voted on.
///
/// Not re-synced on rename; labels only change when the owning entry is refetched.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub(crate) struct UserRef {
    #[serde(default)]
    pub id: String,
    pub username: String,
}

impl UserRef {
    /// A reference that only knows the name (optimistic local rows).
    pub fn local(username: &str) -> Self {
        Self {
            id: String::new(),
            username: username.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Entry {
    pub id: String,
    pub text: String,

    #[serde(rename = "createdBy")]
    pub created_by: UserRef,

    #[serde(rename = "updatedBy")]
    pub updated_by: UserRef,

    /// Ordered set: no username appears twice.
    #[serde(default)]
    pub voters: Vec<UserRef>,

    /// Epoch milliseconds.
    #[serde(rename = "createdAt", default)]
    pub created_at: i64,
    #[serde(rename = "updatedAt", default)]
    pub updated_at: i64,
}

impl Entry {
    /// Empty placeholder shown immediately after "add".
    pub fn placeholder(username: &str, now_ms: i64) -> Self {
        Self {
            id: SENTINEL_ID.to_string(),
            text: String::new(),
            created_by: UserRef::local(username),
            updated_by: UserRef::local(username),
            voters: vec![],
            created_at: now_ms,
            updated_at: now_ms,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.id == SENTINEL_ID
    }

    pub fn has_voter(&self, username: &str) -> bool {
        self.voters.iter().any(|v| v.username == username)
    }

    /// Copy of this entry with `username` added to or removed from the voters.
    pub fn with_vote(&self, username: &str, voting: bool) -> Self {
        let mut next = self.clone();
        if voting {
            if !next.has_voter(username) {
                next.voters.push(UserRef::local(username));
            }
        } else {
            next.voters.retain(|v| v.username != username);
        }
        next
    }

    /// The editor label is only shown when someone other than the author edited.
    pub fn edited_by_other(&self) -> Option<&UserRef> {
        let differs = if self.updated_by.id.is_empty() || self.created_by.id.is_empty() {
            self.updated_by.username != self.created_by.username
        } else {
            self.updated_by.id != self.created_by.id
        };
        differs.then_some(&self.updated_by)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub(crate) struct CreateEntryRequest {
    pub text: String,
    pub username: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub(crate) struct CreateEntryResponse {
    pub id: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub(crate) struct UpdateEntryRequest {
    pub text: String,
    pub username: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub(crate) struct ClaimUsernameRequest {
    pub username: String,
    #[serde(rename = "previousUsername")]
    pub previous_username: String,
}

/// Result of `claim_username`; `error` is a user-facing message.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub(crate) struct ClaimResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ClaimResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
        }
    }
}
