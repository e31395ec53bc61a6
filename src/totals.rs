use std::collections::{HashMap, HashSet};

use crate::schemas::{Expense, LineItem, Username};

pub fn total<E: LineItem>(entries: &[E]) -> f64 {
    entries.iter().map(LineItem::amount).sum()
}

/// Usernames in order of first appearance, without duplicates.
pub fn unique_usernames<E: LineItem>(entries: &[E]) -> Vec<Username> {
    let mut seen = HashSet::new();
    entries
        .iter()
        .map(LineItem::username)
        .filter(|username| seen.insert(*username))
        .map(str::to_string)
        .collect()
}

// Compares the already-normalized value, so callers pass lowercase names
pub fn person_total<E: LineItem>(entries: &[E], username: &str) -> f64 {
    entries
        .iter()
        .filter(|entry| entry.username() == username)
        .map(LineItem::amount)
        .sum()
}

/// Per-person sums in first-seen order.
pub fn person_totals<E: LineItem>(entries: &[E]) -> Vec<(Username, f64)> {
    let mut sums: HashMap<&str, f64> = HashMap::new();
    for entry in entries {
        sums.entry(entry.username())
            .and_modify(|sum| *sum += entry.amount())
            .or_insert(entry.amount());
    }
    unique_usernames(entries)
        .into_iter()
        .map(|username| {
            let sum = sums.get(username.as_str()).copied().unwrap_or_default();
            (username, sum)
        })
        .collect()
}

/// What each person owes across a list of expenses, in first-seen order.
pub fn totals_across(expenses: &[Expense]) -> Vec<(Username, f64)> {
    let participants: Vec<_> = expenses
        .iter()
        .flat_map(|expense| expense.participants.iter().cloned())
        .collect();
    person_totals(&participants)
}

/// Expenses in which both users take part, as payer or participant.
pub fn shared_between<'a>(
    expenses: &'a [Expense],
    first: &str,
    second: &str,
) -> Vec<&'a Expense> {
    expenses
        .iter()
        .filter(|expense| expense.involves(first) && expense.involves(second))
        .collect()
}

/// The share each of `count` people pays. Floating-point division with no
/// rounding: residual cents are not redistributed.
pub fn per_person_amount(total_amount: f64, count: usize) -> f64 {
    total_amount / count as f64
}
