//! Collaborators the reconciler talks to. Transport, auth and encoding live
//! behind these traits; `client::ApiClient` is the HTTP implementation.

use async_trait::async_trait;

use crate::error::RemoteResult;
use crate::schemas::{
    AddParticipant, CreateExpense, Expense, ExpenseId, Participant, UpdateExpense,
    UpdateParticipant,
};

#[async_trait]
pub trait ParticipantCollection: Send + Sync {
    /// Participants of an expense, in the order the remote keeps them.
    async fn list_participants(&self, expense_id: &str) -> RemoteResult<Vec<Participant>>;

    /// Returns the identifier of the new participant entry.
    async fn add_participant(
        &self,
        expense_id: &str,
        payload: &AddParticipant,
    ) -> RemoteResult<String>;

    async fn update_participant(
        &self,
        expense_id: &str,
        username: &str,
        payload: &UpdateParticipant,
    ) -> RemoteResult<()>;

    async fn remove_participant(&self, expense_id: &str, username: &str) -> RemoteResult<()>;
}

#[async_trait]
pub trait ExpenseCollection: Send + Sync {
    async fn list_expenses(&self) -> RemoteResult<Vec<Expense>>;

    async fn create_expense(&self, payload: &CreateExpense) -> RemoteResult<ExpenseId>;

    async fn update_expense(&self, expense_id: &str, payload: &UpdateExpense) -> RemoteResult<()>;

    async fn delete_expense(&self, expense_id: &str) -> RemoteResult<()>;

    async fn get_expense(&self, expense_id: &str) -> RemoteResult<Expense>;
}
