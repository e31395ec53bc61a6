use std::collections::HashSet;

use chrono::NaiveDate;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{Operation, SaveError, ValidationError};
use crate::reconcile::{EqualSplit, Reconciler};
use crate::remote::{ExpenseCollection, ParticipantCollection};
use crate::schemas::{CreateExpense, Entry, ExpenseId, SplitMethod, UpdateExpense};
use crate::totals::total;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaveMode {
    Create,
    Edit(ExpenseId),
}

#[derive(Clone, Debug, PartialEq)]
pub enum DesiredState {
    Equal(EqualSplit),
    Unequal(Vec<Entry>),
}

/// Everything the user filled in, not yet persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct ExpenseDraft {
    pub title: String,
    pub date: Option<NaiveDate>,
    pub desired: DesiredState,
}

impl ExpenseDraft {
    pub fn split_method(&self) -> SplitMethod {
        match self.desired {
            DesiredState::Equal(_) => SplitMethod::Equal,
            DesiredState::Unequal(_) => SplitMethod::Unequal,
        }
    }

    /// The given total for an equal split, the sum of the entries otherwise.
    pub fn total_amount(&self) -> f64 {
        match &self.desired {
            DesiredState::Equal(split) => split.total_amount(),
            DesiredState::Unequal(entries) => total(entries),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        match &self.desired {
            DesiredState::Equal(split) => {
                if split.usernames().is_empty() {
                    return Err(ValidationError::NoParticipants);
                }
                if split.usernames().iter().any(String::is_empty) {
                    return Err(ValidationError::EmptyUsername);
                }
                let total = split.total_amount();
                if !total.is_finite() || total <= 0.0 {
                    return Err(ValidationError::InvalidTotal);
                }
            }
            DesiredState::Unequal(entries) => {
                if entries.is_empty() {
                    return Err(ValidationError::NoParticipants);
                }
                for entry in entries {
                    if entry.username.is_empty() {
                        return Err(ValidationError::EmptyUsername);
                    }
                    if entry.item.trim().is_empty() {
                        return Err(ValidationError::MissingItem {
                            username: entry.username.clone(),
                        });
                    }
                    if !entry.amount.is_finite() || entry.amount <= 0.0 {
                        return Err(ValidationError::InvalidAmount {
                            username: entry.username.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn payload(&self) -> CreateExpense {
        CreateExpense {
            title: self.title.trim().to_string(),
            total_amount: self.total_amount(),
            date: self.date,
            split_method: Some(self.split_method()),
        }
    }
}

struct InFlight<'a> {
    ids: &'a Mutex<HashSet<ExpenseId>>,
    expense_id: ExpenseId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.ids.lock().remove(&self.expense_id);
    }
}

/// Saves expenses for one client session. A given expense is never
/// reconciled by two saves at once; a second attempt gets `SaveError::Busy`.
pub struct ExpenseSaver<'a, R: ?Sized> {
    remote: &'a R,
    in_flight: Mutex<HashSet<ExpenseId>>,
}

impl<'a, R> ExpenseSaver<'a, R>
where
    R: ParticipantCollection + ExpenseCollection + ?Sized,
{
    pub fn new(remote: &'a R) -> Self {
        ExpenseSaver {
            remote,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    fn claim(&self, expense_id: &str) -> Result<InFlight<'_>, SaveError> {
        let mut ids = self.in_flight.lock();
        if !ids.insert(expense_id.to_string()) {
            return Err(SaveError::Busy(expense_id.to_string()));
        }
        Ok(InFlight {
            ids: &self.in_flight,
            expense_id: expense_id.to_string(),
        })
    }

    pub fn is_saving(&self, expense_id: &str) -> bool {
        self.in_flight.lock().contains(expense_id)
    }

    pub async fn save_expense(
        &self,
        mode: SaveMode,
        draft: &ExpenseDraft,
    ) -> Result<ExpenseId, SaveError> {
        draft.validate()?;
        let payload = draft.payload();
        let reconciler = Reconciler::new(self.remote);

        match mode {
            SaveMode::Create => {
                let expense_id = self
                    .remote
                    .create_expense(&payload)
                    .await
                    .map_err(|source| {
                        SaveError::remote(Operation::CreateExpense, &payload.title, source)
                    })?;
                let _guard = self.claim(&expense_id)?;
                info!(expense_id = %expense_id, split = %draft.split_method(), "expense created");

                let journal = match &draft.desired {
                    DesiredState::Equal(split) => {
                        reconciler.reconcile_equal(&expense_id, split).await?
                    }
                    DesiredState::Unequal(entries) => {
                        reconciler.populate(&expense_id, entries).await?
                    }
                };
                debug!(
                    expense_id = %expense_id,
                    steps = journal.completed.len(),
                    "participants saved"
                );
                Ok(expense_id)
            }
            SaveMode::Edit(expense_id) => {
                let _guard = self.claim(&expense_id)?;
                self.remote
                    .update_expense(&expense_id, &UpdateExpense::from(&payload))
                    .await
                    .map_err(|source| {
                        SaveError::remote(Operation::UpdateExpense, &expense_id, source)
                    })?;

                let journal = match &draft.desired {
                    DesiredState::Equal(split) => {
                        reconciler.reconcile_equal(&expense_id, split).await?
                    }
                    DesiredState::Unequal(entries) => {
                        reconciler.replace(&expense_id, entries).await?
                    }
                };
                info!(expense_id = %expense_id, steps = journal.completed.len(), "expense updated");
                Ok(expense_id)
            }
        }
    }
}

/// One-off save outside a long-lived [`ExpenseSaver`].
pub async fn save_expense<R>(
    remote: &R,
    mode: SaveMode,
    draft: &ExpenseDraft,
) -> Result<ExpenseId, SaveError>
where
    R: ParticipantCollection + ExpenseCollection + ?Sized,
{
    ExpenseSaver::new(remote).save_expense(mode, draft).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteResult;
    use crate::schemas::{AddParticipant, Expense, Participant, UpdateParticipant};
    use async_trait::async_trait;

    struct Offline;

    #[async_trait]
    impl ParticipantCollection for Offline {
        async fn list_participants(&self, _: &str) -> RemoteResult<Vec<Participant>> {
            unreachable!()
        }
        async fn add_participant(&self, _: &str, _: &AddParticipant) -> RemoteResult<String> {
            unreachable!()
        }
        async fn update_participant(
            &self,
            _: &str,
            _: &str,
            _: &UpdateParticipant,
        ) -> RemoteResult<()> {
            unreachable!()
        }
        async fn remove_participant(&self, _: &str, _: &str) -> RemoteResult<()> {
            unreachable!()
        }
    }

    #[async_trait]
    impl ExpenseCollection for Offline {
        async fn list_expenses(&self) -> RemoteResult<Vec<Expense>> {
            unreachable!()
        }
        async fn create_expense(&self, _: &CreateExpense) -> RemoteResult<ExpenseId> {
            unreachable!()
        }
        async fn update_expense(&self, _: &str, _: &UpdateExpense) -> RemoteResult<()> {
            unreachable!()
        }
        async fn delete_expense(&self, _: &str) -> RemoteResult<()> {
            unreachable!()
        }
        async fn get_expense(&self, _: &str) -> RemoteResult<Expense> {
            unreachable!()
        }
    }

    fn equal(title: &str, usernames: &[&str], total: f64) -> ExpenseDraft {
        ExpenseDraft {
            title: title.to_string(),
            date: None,
            desired: DesiredState::Equal(EqualSplit::new(usernames.iter().copied(), total)),
        }
    }

    fn unequal(entries: Vec<Entry>) -> ExpenseDraft {
        ExpenseDraft {
            title: "Groceries".to_string(),
            date: None,
            desired: DesiredState::Unequal(entries),
        }
    }

    #[test]
    fn validation_rules() {
        assert_eq!(equal("", &["a"], 10.0).validate(), Err(ValidationError::EmptyTitle));
        assert_eq!(equal("Rent", &[], 10.0).validate(), Err(ValidationError::NoParticipants));
        assert_eq!(equal("Rent", &["a"], 0.0).validate(), Err(ValidationError::InvalidTotal));
        assert_eq!(
            equal("Rent", &["a", " "], 10.0).validate(),
            Err(ValidationError::EmptyUsername)
        );
        assert!(equal("Rent", &["a"], 10.0).validate().is_ok());

        assert_eq!(unequal(vec![]).validate(), Err(ValidationError::NoParticipants));
        assert_eq!(
            unequal(vec![Entry::new("a", "", 3.0)]).validate(),
            Err(ValidationError::MissingItem { username: "a".into() })
        );
        assert_eq!(
            unequal(vec![Entry::new("a", "Milk", -3.0)]).validate(),
            Err(ValidationError::InvalidAmount { username: "a".into() })
        );
    }

    #[test]
    fn unequal_total_is_sum_of_entries() {
        let draft = unequal(vec![Entry::new("a", "Milk", 3.0), Entry::new("b", "Eggs", 4.5)]);
        let payload = draft.payload();
        assert_eq!(payload.total_amount, 7.5);
        assert_eq!(payload.split_method, Some(SplitMethod::Unequal));
    }

    #[tokio::test]
    async fn invalid_drafts_never_reach_the_remote() {
        let err = save_expense(&Offline, SaveMode::Create, &equal(" ", &["a"], 5.0))
            .await
            .unwrap_err();
        assert_eq!(err, SaveError::Validation(ValidationError::EmptyTitle));
    }

    #[test]
    fn a_second_save_of_the_same_expense_is_busy() {
        let saver = ExpenseSaver::new(&Offline);
        let first = saver.claim("e1").unwrap();
        assert!(saver.is_saving("e1"));
        assert_eq!(saver.claim("e1").err(), Some(SaveError::Busy("e1".into())));
        assert!(saver.claim("e2").is_ok());
        drop(first);
        assert!(!saver.is_saving("e1"));
        assert!(saver.claim("e1").is_ok());
    }
}
