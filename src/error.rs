use std::fmt;

use thiserror::Error;

use crate::schemas::{ExpenseId, Username};

/// Failure of a single call against the remote API.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request rejected ({status}): {message}")]
    Status { status: u16, message: String },

    #[error("not authenticated")]
    Unauthenticated,

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("invalid payload: {0}")]
    Invalid(#[from] ValidationError),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

impl From<reqwest::Error> for RemoteError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            RemoteError::Decode(error.to_string())
        } else {
            RemoteError::Network(error.to_string())
        }
    }
}

/// Local preconditions, checked before anything is sent.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("please enter a title for the expense")]
    EmptyTitle,

    #[error("please enter a valid total amount")]
    InvalidTotal,

    #[error("please add at least one participant")]
    NoParticipants,

    #[error("usernames cannot be empty")]
    EmptyUsername,

    #[error("please enter a valid amount for {username}")]
    InvalidAmount { username: Username },

    #[error("please name the item for {username}")]
    MissingItem { username: Username },

    #[error("nothing to update")]
    EmptyUpdate,
}

/// Remote operation named in error reports and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ListParticipants,
    AddParticipant,
    UpdateParticipant,
    RemoveParticipant,
    CreateExpense,
    UpdateExpense,
    DeleteExpense,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::ListParticipants => "listing participants",
            Operation::AddParticipant => "adding participant",
            Operation::UpdateParticipant => "updating participant",
            Operation::RemoveParticipant => "removing participant",
            Operation::CreateExpense => "creating expense",
            Operation::UpdateExpense => "updating expense",
            Operation::DeleteExpense => "deleting expense",
        };
        f.write_str(name)
    }
}

/// What the user should do after a failed save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    FixInput,
    Retry,
    Recreate,
    DeleteManually,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SaveError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("expense {0} is already being saved")]
    Busy(ExpenseId),

    #[error("{operation} failed for {subject}: {source}")]
    Remote {
        operation: Operation,
        subject: String,
        #[source]
        source: RemoteError,
    },

    #[error("could not remove {} from expense {expense_id}", .usernames.join(", "))]
    StaleParticipants {
        expense_id: ExpenseId,
        usernames: Vec<Username>,
    },

    #[error("failed to add participant {username}; the expense has been deleted")]
    CreateAborted {
        expense_id: ExpenseId,
        username: Username,
        #[source]
        source: RemoteError,
    },

    #[error("failed to update participants; the original participants have been restored")]
    Restored {
        expense_id: ExpenseId,
        #[source]
        source: RemoteError,
    },

    #[error("failed to update participants; the expense was deleted to keep data consistent")]
    Integrity {
        expense_id: ExpenseId,
        #[source]
        source: RemoteError,
        restore_error: RemoteError,
    },

    #[error("could not clean up expense {expense_id} ({cleanup_error}); delete it manually")]
    CleanupFailed {
        expense_id: ExpenseId,
        #[source]
        source: RemoteError,
        cleanup_error: RemoteError,
    },
}

impl SaveError {
    pub fn remote(operation: Operation, subject: impl Into<String>, source: RemoteError) -> Self {
        SaveError::Remote {
            operation,
            subject: subject.into(),
            source,
        }
    }

    pub fn next_action(&self) -> NextAction {
        match self {
            SaveError::Validation(_) => NextAction::FixInput,
            SaveError::Busy(_)
            | SaveError::Remote { .. }
            | SaveError::StaleParticipants { .. }
            | SaveError::Restored { .. } => NextAction::Retry,
            SaveError::CreateAborted { .. } | SaveError::Integrity { .. } => NextAction::Recreate,
            SaveError::CleanupFailed { .. } => NextAction::DeleteManually,
        }
    }

    /// True when the remote call failed because the session is no longer valid.
    pub fn is_unauthenticated(&self) -> bool {
        match self {
            SaveError::Remote { source, .. }
            | SaveError::CreateAborted { source, .. }
            | SaveError::Restored { source, .. }
            | SaveError::Integrity { source, .. }
            | SaveError::CleanupFailed { source, .. } => *source == RemoteError::Unauthenticated,
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("invalid token received")]
    EmptyToken,

    #[error("could not persist session: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_failure_names_a_next_action() {
        let cause = RemoteError::Network("reset".into());
        assert_eq!(
            SaveError::from(ValidationError::EmptyTitle).next_action(),
            NextAction::FixInput
        );
        assert_eq!(
            SaveError::Restored {
                expense_id: "e".into(),
                source: cause.clone()
            }
            .next_action(),
            NextAction::Retry
        );
        assert_eq!(
            SaveError::Integrity {
                expense_id: "e".into(),
                source: cause.clone(),
                restore_error: cause.clone()
            }
            .next_action(),
            NextAction::Recreate
        );
        assert_eq!(
            SaveError::CleanupFailed {
                expense_id: "e".into(),
                source: cause.clone(),
                cleanup_error: cause
            }
            .next_action(),
            NextAction::DeleteManually
        );
    }

    #[test]
    fn stale_participants_lists_usernames() {
        let err = SaveError::StaleParticipants {
            expense_id: "e9".into(),
            usernames: vec!["ann".into(), "ben".into()],
        };
        assert_eq!(err.to_string(), "could not remove ann, ben from expense e9");
    }

    #[test]
    fn restore_message_only_claims_participants() {
        let err = SaveError::Restored {
            expense_id: "e1".into(),
            source: RemoteError::Network("reset".into()),
        };
        assert_eq!(
            err.to_string(),
            "failed to update participants; the original participants have been restored"
        );
    }
}
