//! Converges the participants of one remote expense onto a desired state.
//!
//! Planning is pure: the current remote participants and the desired state go
//! in, an ordered list of [`Step`]s comes out. Execution then issues the steps
//! one at a time, awaiting each and recording its outcome in a [`Journal`]
//! before the next one starts, so a failure always stops forward progress at a
//! known point.
//!
//! Failure policy differs per path:
//!
//! - equal split: removals of people no longer in the split are best-effort;
//!   the first failing add/update aborts with no compensation, which may leave
//!   the expense partially updated.
//! - unequal split, new expense: any failing add deletes the whole expense.
//! - unequal split, existing expense: the participants fetched before any
//!   destructive step are kept as a backup. On failure the remote list is
//!   cleared and the backup re-added in order; if that fails too the expense
//!   is deleted.

use std::collections::HashSet;

use tracing::{debug, error, info, warn};

use crate::error::{Operation, RemoteError, RemoteResult, SaveError};
use crate::remote::{ExpenseCollection, ParticipantCollection};
use crate::schemas::{
    normalize_username, AddParticipant, Entry, Participant, UpdateParticipant, Username,
    EQUAL_SHARE_ITEM,
};
use crate::totals::{per_person_amount, unique_usernames};

#[derive(Clone, Debug, PartialEq)]
pub enum Step {
    Remove {
        username: Username,
    },
    Update {
        username: Username,
        payload: UpdateParticipant,
    },
    Add {
        payload: AddParticipant,
    },
}

impl Step {
    pub fn operation(&self) -> Operation {
        match self {
            Step::Remove { .. } => Operation::RemoveParticipant,
            Step::Update { .. } => Operation::UpdateParticipant,
            Step::Add { .. } => Operation::AddParticipant,
        }
    }

    pub fn username(&self) -> &str {
        match self {
            Step::Remove { username } | Step::Update { username, .. } => username,
            Step::Add { payload } => &payload.username,
        }
    }

    fn equal_share(username: &str, amount: f64) -> Step {
        Step::Add {
            payload: AddParticipant {
                username: username.to_string(),
                amount: Some(amount),
                item: Some(EQUAL_SHARE_ITEM.to_string()),
            },
        }
    }
}

/// Outcome of every step issued during one reconciliation, in issue order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Journal {
    pub completed: Vec<Step>,
    pub failed: Vec<(Step, RemoteError)>,
}

impl Journal {
    fn record(&mut self, step: Step, result: &RemoteResult<()>) {
        match result {
            Ok(()) => self.completed.push(step),
            Err(err) => self.failed.push((step, err.clone())),
        }
    }
}

/// Desired state of an equally split expense: lowercase, de-duplicated
/// usernames in the order they were given.
#[derive(Clone, Debug, PartialEq)]
pub struct EqualSplit {
    usernames: Vec<Username>,
    total_amount: f64,
}

impl EqualSplit {
    pub fn new<I, S>(usernames: I, total_amount: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let usernames = usernames
            .into_iter()
            .map(|username| normalize_username(username.as_ref()))
            .filter(|username| seen.insert(username.clone()))
            .collect();
        EqualSplit {
            usernames,
            total_amount,
        }
    }

    pub fn usernames(&self) -> &[Username] {
        &self.usernames
    }

    pub fn total_amount(&self) -> f64 {
        self.total_amount
    }

    pub fn per_person_amount(&self) -> f64 {
        per_person_amount(self.total_amount, self.usernames.len())
    }
}

/// Steps for an equal split, split by failure policy.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EqualPlan {
    /// People no longer in the split. Best-effort.
    pub removals: Vec<Step>,
    /// One or two steps per desired username, in desired order. Abort on failure.
    pub writes: Vec<Step>,
}

impl EqualPlan {
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.removals.iter().chain(self.writes.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.removals.is_empty() && self.writes.is_empty()
    }
}

fn normalized(current: &[Participant]) -> Vec<Participant> {
    current
        .iter()
        .map(|participant| Participant {
            username: normalize_username(&participant.username),
            ..participant.clone()
        })
        .collect()
}

pub fn plan_equal_split(current: &[Participant], split: &EqualSplit) -> EqualPlan {
    let current = normalized(current);
    let amount = split.per_person_amount();
    let desired: HashSet<&str> = split.usernames.iter().map(String::as_str).collect();

    let removals = unique_usernames(&current)
        .into_iter()
        .filter(|username| !desired.contains(username.as_str()))
        .map(|username| Step::Remove { username })
        .collect();

    let mut writes = Vec::new();
    for username in &split.usernames {
        let existing: Vec<&Participant> = current
            .iter()
            .filter(|participant| &participant.username == username)
            .collect();
        match existing.as_slice() {
            [] => writes.push(Step::equal_share(username, amount)),
            [only] if only.amount == amount && only.item.as_deref() == Some(EQUAL_SHARE_ITEM) => {}
            [_] => writes.push(Step::Update {
                username: username.clone(),
                payload: UpdateParticipant {
                    amount: Some(amount),
                    item: Some(EQUAL_SHARE_ITEM.to_string()),
                },
            }),
            // Left over from an unequal split: collapse to a single entry
            _ => {
                writes.push(Step::Remove {
                    username: username.clone(),
                });
                writes.push(Step::equal_share(username, amount));
            }
        }
    }

    EqualPlan { removals, writes }
}

/// One removal per distinct username, since a removal drops every entry of
/// that username.
pub fn plan_clear(current: &[Participant]) -> Vec<Step> {
    unique_usernames(&normalized(current))
        .into_iter()
        .map(|username| Step::Remove { username })
        .collect()
}

pub fn plan_additions(entries: &[Entry]) -> Vec<Step> {
    entries
        .iter()
        .map(|entry| Step::Add {
            payload: entry.into(),
        })
        .collect()
}

fn plan_restore(backup: &[Participant]) -> Vec<Step> {
    backup
        .iter()
        .map(|participant| {
            let mut payload = AddParticipant::from(participant);
            // The remote defaults a missing amount to zero
            payload.amount = payload.amount.filter(|amount| *amount > 0.0);
            Step::Add { payload }
        })
        .collect()
}

pub struct Reconciler<'a, R: ?Sized> {
    remote: &'a R,
}

impl<'a, R> Reconciler<'a, R>
where
    R: ParticipantCollection + ExpenseCollection + ?Sized,
{
    pub fn new(remote: &'a R) -> Self {
        Reconciler { remote }
    }

    async fn run_step(
        &self,
        expense_id: &str,
        step: Step,
        journal: &mut Journal,
    ) -> RemoteResult<()> {
        debug!(expense_id, step = ?step, "applying participant step");
        let result = match &step {
            Step::Remove { username } => self.remote.remove_participant(expense_id, username).await,
            Step::Update { username, payload } => {
                self.remote
                    .update_participant(expense_id, username, payload)
                    .await
            }
            Step::Add { payload } => self
                .remote
                .add_participant(expense_id, payload)
                .await
                .map(drop),
        };
        if let Err(err) = &result {
            warn!(
                expense_id,
                username = step.username(),
                error = %err,
                "{} failed",
                step.operation()
            );
        }
        journal.record(step, &result);
        result
    }

    /// Runs steps in order, stopping at the first failure.
    async fn run_all(
        &self,
        expense_id: &str,
        steps: Vec<Step>,
        journal: &mut Journal,
    ) -> Result<(), (Step, RemoteError)> {
        for step in steps {
            if let Err(err) = self.run_step(expense_id, step.clone(), journal).await {
                return Err((step, err));
            }
        }
        Ok(())
    }

    async fn current(&self, expense_id: &str) -> Result<Vec<Participant>, SaveError> {
        self.remote
            .list_participants(expense_id)
            .await
            .map_err(|source| SaveError::remote(Operation::ListParticipants, expense_id, source))
    }

    /// Equal split: every desired username ends with exactly one entry of
    /// `total / n` labelled "Equal share", and nobody else remains.
    pub async fn reconcile_equal(
        &self,
        expense_id: &str,
        split: &EqualSplit,
    ) -> Result<Journal, SaveError> {
        let current = self.current(expense_id).await?;
        let plan = plan_equal_split(&current, split);
        let mut journal = Journal::default();

        let mut stale = Vec::new();
        for step in plan.removals {
            let username = step.username().to_string();
            if self.run_step(expense_id, step, &mut journal).await.is_err() {
                stale.push(username);
            }
        }

        if let Err((step, source)) = self.run_all(expense_id, plan.writes, &mut journal).await {
            return Err(SaveError::remote(step.operation(), step.username(), source));
        }

        if !stale.is_empty() {
            return Err(SaveError::StaleParticipants {
                expense_id: expense_id.to_string(),
                usernames: stale,
            });
        }

        info!(expense_id, steps = journal.completed.len(), "equal split reconciled");
        Ok(journal)
    }

    /// Unequal split on a freshly created expense. The expense and its
    /// participants stand or fall together: a failing add deletes the expense.
    pub async fn populate(
        &self,
        expense_id: &str,
        entries: &[Entry],
    ) -> Result<Journal, SaveError> {
        let mut journal = Journal::default();
        let Err((step, source)) = self
            .run_all(expense_id, plan_additions(entries), &mut journal)
            .await
        else {
            info!(expense_id, entries = entries.len(), "participants added");
            return Ok(journal);
        };

        match self.remote.delete_expense(expense_id).await {
            Ok(()) => {
                warn!(expense_id, username = step.username(), "expense deleted after failed add");
                Err(SaveError::CreateAborted {
                    expense_id: expense_id.to_string(),
                    username: step.username().to_string(),
                    source,
                })
            }
            Err(cleanup_error) => {
                error!(
                    expense_id,
                    error = %cleanup_error,
                    "could not delete expense after failed add"
                );
                Err(SaveError::CleanupFailed {
                    expense_id: expense_id.to_string(),
                    source,
                    cleanup_error,
                })
            }
        }
    }

    /// Unequal split on an existing expense: the new entries wholly replace
    /// the current participants, with restore-then-delete compensation.
    pub async fn replace(&self, expense_id: &str, entries: &[Entry]) -> Result<Journal, SaveError> {
        let backup = self.current(expense_id).await?;
        let mut journal = Journal::default();

        let mut steps = plan_clear(&backup);
        steps.extend(plan_additions(entries));
        let Err((step, source)) = self.run_all(expense_id, steps, &mut journal).await else {
            info!(expense_id, entries = entries.len(), "participants replaced");
            return Ok(journal);
        };
        warn!(
            expense_id,
            username = step.username(),
            backup = backup.len(),
            "participant replacement failed, restoring backup"
        );

        let restore_error = match self.restore(expense_id, &backup, &mut journal).await {
            Ok(()) => {
                info!(expense_id, "original participants restored");
                return Err(SaveError::Restored {
                    expense_id: expense_id.to_string(),
                    source,
                });
            }
            Err(err) => err,
        };
        error!(expense_id, error = %restore_error, "restore failed, deleting expense");

        match self.remote.delete_expense(expense_id).await {
            Ok(()) => Err(SaveError::Integrity {
                expense_id: expense_id.to_string(),
                source,
                restore_error,
            }),
            Err(cleanup_error) => {
                error!(
                    expense_id,
                    error = %cleanup_error,
                    "could not delete expense after failed restore"
                );
                Err(SaveError::CleanupFailed {
                    expense_id: expense_id.to_string(),
                    source,
                    cleanup_error,
                })
            }
        }
    }

    async fn restore(
        &self,
        expense_id: &str,
        backup: &[Participant],
        journal: &mut Journal,
    ) -> RemoteResult<()> {
        let partial = self.remote.list_participants(expense_id).await?;
        let mut steps = plan_clear(&partial);
        steps.extend(plan_restore(backup));
        self.run_all(expense_id, steps, journal)
            .await
            .map_err(|(_, err)| err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(username: &str, amount: f64, item: &str) -> Participant {
        Participant {
            username: username.to_string(),
            name: None,
            amount,
            item: Some(item.to_string()),
            is_payer: None,
        }
    }

    #[test]
    fn equal_split_normalizes_and_dedups() {
        let split = EqualSplit::new(["Alice", "bob", "alice", " BOB "], 50.0);
        assert_eq!(split.usernames(), ["alice", "bob"]);
        assert_eq!(split.per_person_amount(), 25.0);
    }

    #[test]
    fn plan_from_nothing_adds_everyone() {
        let split = EqualSplit::new(["a", "b", "c"], 90.0);
        let plan = plan_equal_split(&[], &split);
        assert!(plan.removals.is_empty());
        assert_eq!(
            plan.writes,
            vec![
                Step::equal_share("a", 30.0),
                Step::equal_share("b", 30.0),
                Step::equal_share("c", 30.0),
            ]
        );
    }

    #[test]
    fn plan_removes_outsiders_and_updates_members() {
        let split = EqualSplit::new(["a", "b"], 20.0);
        let current = vec![participant("A", 5.0, "Pizza"), participant("d", 5.0, "Pizza")];
        let plan = plan_equal_split(&current, &split);

        assert_eq!(plan.removals, vec![Step::Remove { username: "d".into() }]);
        assert_eq!(
            plan.writes,
            vec![
                Step::Update {
                    username: "a".into(),
                    payload: UpdateParticipant {
                        amount: Some(10.0),
                        item: Some(EQUAL_SHARE_ITEM.into()),
                    },
                },
                Step::equal_share("b", 10.0),
            ]
        );
    }

    #[test]
    fn plan_skips_entries_already_in_place() {
        let split = EqualSplit::new(["a", "b"], 20.0);
        let current = vec![
            participant("a", 10.0, EQUAL_SHARE_ITEM),
            participant("b", 10.0, EQUAL_SHARE_ITEM),
        ];
        assert!(plan_equal_split(&current, &split).is_empty());
    }

    #[test]
    fn plan_collapses_repeated_entries() {
        let split = EqualSplit::new(["a"], 12.0);
        let current = vec![participant("a", 5.0, "Soup"), participant("a", 7.0, "Bread")];
        let plan = plan_equal_split(&current, &split);
        assert!(plan.removals.is_empty());
        assert_eq!(
            plan.writes,
            vec![Step::Remove { username: "a".into() }, Step::equal_share("a", 12.0)]
        );
    }

    #[test]
    fn clearing_removes_each_username_once() {
        let current = vec![
            participant("a", 1.0, "x"),
            participant("b", 1.0, "y"),
            participant("A", 1.0, "z"),
        ];
        assert_eq!(
            plan_clear(&current),
            vec![
                Step::Remove { username: "a".into() },
                Step::Remove { username: "b".into() },
            ]
        );
    }

    #[test]
    fn restore_drops_zero_amounts() {
        let steps = plan_restore(&[participant("a", 0.0, "x")]);
        let Step::Add { payload } = &steps[0] else {
            panic!("expected an add step");
        };
        assert_eq!(payload.amount, None);
        assert_eq!(payload.item.as_deref(), Some("x"));
    }
}
