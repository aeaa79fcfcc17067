use serde::Serialize;

use crate::balance::Balances;
use crate::schemas::UserId;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub from: UserId,
    pub to: UserId,
    pub amount: f64,
}

#[derive(Clone, Debug)]
struct OpenAmount {
    id: UserId,
    amount: f64,
}

// Greedily matches the largest debtor against the largest creditor, so a
// group of n members settles in at most n - 1 transfers.
pub fn suggest_settlements(balances: &Balances) -> Vec<Settlement> {
    let mut debtors = Vec::new();
    let mut creditors = Vec::new();

    for (id, &balance) in balances {
        let open = OpenAmount {
            id: id.clone(),
            amount: balance.abs(),
        };
        if balance < 0.0 {
            debtors.push(open);
        } else if balance > 0.0 {
            creditors.push(open);
        }
    }

    debtors.sort_by(|a, b| a.amount.partial_cmp(&b.amount).unwrap());
    creditors.sort_by(|a, b| a.amount.partial_cmp(&b.amount).unwrap());

    let mut settlements = Vec::new();

    while let (Some(debtor), Some(creditor)) = (debtors.last_mut(), creditors.last_mut()) {
        let amount = round_to_2_decimals(debtor.amount.min(creditor.amount));
        if amount > 0.0 {
            settlements.push(Settlement {
                from: debtor.id.clone(),
                to: creditor.id.clone(),
                amount,
            });
        }

        debtor.amount = round_to_2_decimals(debtor.amount - amount);
        creditor.amount = round_to_2_decimals(creditor.amount - amount);
        if debtor.amount <= 0.0 {
            debtors.pop();
        }
        if creditor.amount <= 0.0 {
            creditors.pop();
        }
    }

    settlements
}

fn round_to_2_decimals(n: f64) -> f64 {
    (n * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn balances(entries: &[(&str, f64)]) -> Balances {
        entries
            .iter()
            .map(|(id, amount)| (id.to_string(), *amount))
            .collect()
    }

    #[test]
    fn one_creditor_collects_from_each_debtor() {
        let settlements =
            suggest_settlements(&balances(&[("ana", 60.0), ("bea", -30.0), ("carl", -30.0)]));

        assert_eq!(settlements.len(), 2);
        assert!(settlements.iter().all(|settlement| settlement.to == "ana"));
        assert!(settlements
            .iter()
            .all(|settlement| settlement.amount == 30.0));
    }

    #[test]
    fn settlements_zero_out_the_balances() {
        let input = balances(&[("ana", 75.5), ("bea", -20.5), ("carl", -40.0), ("dan", -15.0)]);
        let settlements = suggest_settlements(&input);

        let mut after: HashMap<String, f64> = input;
        for settlement in &settlements {
            *after.get_mut(&settlement.from).unwrap() += settlement.amount;
            *after.get_mut(&settlement.to).unwrap() -= settlement.amount;
        }
        assert!(after.values().all(|amount| amount.abs() < 0.01));
    }

    #[test]
    fn settled_groups_need_no_transfers() {
        assert!(suggest_settlements(&balances(&[])).is_empty());
        assert!(suggest_settlements(&balances(&[("ana", 0.0), ("bea", 0.0)])).is_empty());
    }

    #[test]
    fn never_more_transfers_than_open_balances() {
        let input = balances(&[("ana", 50.0), ("bea", 10.0), ("carl", -35.0), ("dan", -25.0)]);
        let settlements = suggest_settlements(&input);
        assert!(settlements.len() <= 3);
    }
}
