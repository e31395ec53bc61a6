use proptest::prelude::*;

use splitex::reconcile::{plan_equal_split, Step};
use splitex::schemas::{Entry, Participant, EQUAL_SHARE_ITEM};
use splitex::totals::{person_totals, total, unique_usernames};
use splitex::EqualSplit;

fn username() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["amy", "ben", "cal", "dan", "eve"]).prop_map(String::from)
}

// Whole amounts keep the sums exact regardless of order
fn entries() -> impl Strategy<Value = Vec<Entry>> {
    prop::collection::vec(
        (username(), "[a-z]{1,8}", 1u32..500).prop_map(|(username, item, amount)| {
            Entry::new(&username, &item, f64::from(amount))
        }),
        0..12,
    )
}

fn participants() -> impl Strategy<Value = Vec<Participant>> {
    prop::collection::vec(
        (username(), prop::bool::ANY, 1u32..100).prop_map(|(username, upper, amount)| Participant {
            username: if upper { username.to_uppercase() } else { username },
            name: None,
            amount: f64::from(amount),
            item: Some("Pizza".to_string()),
            is_payer: None,
        }),
        0..8,
    )
}

/// Applies steps the way the API server does.
fn apply(state: &mut Vec<Participant>, step: &Step) {
    match step {
        Step::Remove { username } => state.retain(|p| &p.username.to_lowercase() != username),
        Step::Update { username, payload } => {
            for p in state.iter_mut().filter(|p| &p.username.to_lowercase() == username) {
                if let Some(amount) = payload.amount {
                    p.amount = amount;
                }
                if let Some(item) = &payload.item {
                    p.item = Some(item.clone());
                }
            }
        }
        Step::Add { payload } => state.push(Participant {
            username: payload.username.clone(),
            name: None,
            amount: payload.amount.unwrap_or_default(),
            item: payload.item.clone(),
            is_payer: None,
        }),
    }
}

proptest! {
    #[test]
    fn total_ignores_order(mut entries in entries()) {
        let before = total(&entries);
        entries.reverse();
        prop_assert_eq!(total(&entries), before);
    }

    #[test]
    fn person_totals_add_up_to_the_total(entries in entries()) {
        let sums = person_totals(&entries);
        let people: Vec<String> = sums.iter().map(|(username, _)| username.clone()).collect();
        prop_assert_eq!(people, unique_usernames(&entries));
        prop_assert_eq!(sums.iter().map(|(_, sum)| sum).sum::<f64>(), total(&entries));
    }

    #[test]
    fn unique_usernames_follow_first_appearance(entries in entries()) {
        let unique = unique_usernames(&entries);
        let mut positions = unique
            .iter()
            .map(|username| entries.iter().position(|e| &e.username == username));
        prop_assert!(positions.all(|position| position.is_some()));
        let firsts: Vec<usize> = unique
            .iter()
            .filter_map(|username| entries.iter().position(|e| &e.username == username))
            .collect();
        prop_assert!(firsts.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn equal_plan_converges(
        current in participants(),
        desired in prop::collection::vec(username(), 1..5),
        total_amount in 1u32..1000,
    ) {
        let split = EqualSplit::new(&desired, f64::from(total_amount));
        let plan = plan_equal_split(&current, &split);

        let mut state = current.clone();
        for step in plan.steps() {
            apply(&mut state, step);
        }

        prop_assert_eq!(state.len(), split.usernames().len());
        for username in split.usernames() {
            let mine: Vec<&Participant> = state
                .iter()
                .filter(|p| &p.username.to_lowercase() == username)
                .collect();
            prop_assert_eq!(mine.len(), 1);
            prop_assert_eq!(mine[0].amount, split.per_person_amount());
            prop_assert_eq!(mine[0].item.as_deref(), Some(EQUAL_SHARE_ITEM));
        }

        // Reconciling again is a no-op
        prop_assert!(plan_equal_split(&state, &split).is_empty());
    }
}

#[test]
fn empty_entries_total_zero() {
    let entries: Vec<Entry> = Vec::new();
    assert_eq!(total(&entries), 0.0);
    assert!(person_totals(&entries).is_empty());
}
