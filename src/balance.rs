//! Net balances derived from the full expense history and the current
//! roster. Always recomputed from the source of truth; nothing here is
//! persisted or incrementally maintained.

use std::collections::HashMap;

use crate::error::SplitError;
use crate::schemas::{Expense, UserId};

/// Positive: net owed to the member. Negative: net owed by the member.
pub type Balances = HashMap<UserId, f64>;

/// Splits every expense equally across the current roster and credits the
/// payer with the full amount. A payer who has since left the group keeps
/// no entry in the output; their credit is dropped with them.
pub fn calculate_balances(
    expenses: &[Expense],
    member_ids: &[UserId],
) -> Result<Balances, SplitError> {
    let mut balances: Balances = member_ids.iter().map(|id| (id.clone(), 0.0)).collect();
    if balances.is_empty() {
        return Err(SplitError::NoMembers);
    }
    let roster_size = balances.len() as f64;
    for expense in expenses {
        let share = expense.amount / roster_size;
        for balance in balances.values_mut() {
            *balance -= share;
        }
        if let Some(balance) = balances.get_mut(&expense.payer_id) {
            *balance += expense.amount;
        }
    }
    Ok(balances)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const TOLERANCE: f64 = 1e-9;

    fn expense(payer: &str, amount: f64) -> Expense {
        Expense {
            id: format!("expense-{payer}-{amount}"),
            group_id: "group".to_string(),
            title: "groceries".to_string(),
            amount,
            payer_id: payer.to_string(),
            payer_name: payer.to_string(),
            created_at: Utc::now(),
        }
    }

    fn roster(ids: &[&str]) -> Vec<UserId> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn equal_split_credits_payer_with_amount_minus_share() {
        let balances =
            calculate_balances(&[expense("ana", 90.0)], &roster(&["ana", "bea", "carl"]))
                .unwrap();

        assert!((balances["ana"] - 60.0).abs() < TOLERANCE);
        assert!((balances["bea"] + 30.0).abs() < TOLERANCE);
        assert!((balances["carl"] + 30.0).abs() < TOLERANCE);
    }

    #[test]
    fn stable_membership_sums_to_zero() {
        let expenses = vec![
            expense("ana", 42.5),
            expense("bea", 17.33),
            expense("carl", 99.99),
            expense("ana", 3.07),
        ];
        let balances = calculate_balances(&expenses, &roster(&["ana", "bea", "carl"])).unwrap();

        let total: f64 = balances.values().sum();
        assert!(total.abs() < TOLERANCE);
    }

    #[test]
    fn expense_order_does_not_matter() {
        let members = roster(&["ana", "bea", "carl"]);
        let forward = vec![expense("ana", 10.0), expense("bea", 25.0), expense("carl", 7.5)];
        let backward: Vec<Expense> = forward.iter().rev().cloned().collect();

        let first = calculate_balances(&forward, &members).unwrap();
        let second = calculate_balances(&backward, &members).unwrap();

        for (id, balance) in first {
            assert!((balance - second[&id]).abs() < TOLERANCE);
        }
    }

    #[test]
    fn empty_roster_is_rejected_before_dividing() {
        let result = calculate_balances(&[expense("ana", 10.0)], &[]);
        assert!(matches!(result, Err(SplitError::NoMembers)));

        let result = calculate_balances(&[], &[]);
        assert!(matches!(result, Err(SplitError::NoMembers)));
    }

    #[test]
    fn no_expenses_means_everyone_is_settled() {
        let balances = calculate_balances(&[], &roster(&["ana", "bea"])).unwrap();
        assert_eq!(balances.len(), 2);
        assert!(balances.values().all(|balance| *balance == 0.0));
    }

    #[test]
    fn departed_payer_keeps_no_entry_and_their_credit_is_dropped() {
        let balances =
            calculate_balances(&[expense("gone", 100.0)], &roster(&["bea", "carl"])).unwrap();

        assert!(!balances.contains_key("gone"));
        assert!((balances["bea"] + 50.0).abs() < TOLERANCE);
        assert!((balances["carl"] + 50.0).abs() < TOLERANCE);
    }
}
