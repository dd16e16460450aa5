use serde::Serialize;

use crate::balance::{MemberBalance, SETTLED_EPSILON};
use crate::schemas::Member;

/// A suggested payment from a member who owes to a member who is owed.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SettlementTransfer {
    pub debtor: Member,
    pub creditor: Member,
    pub amount: f64,
}

/// Pairs every debtor with every creditor, both in input order.
///
/// Each pair transfers `min(|debtor balance|, creditor balance)` computed from
/// the original balances. This is a greedy suggestion: it does not look for
/// the fewest transfers, and with several debtors and creditors the plan can
/// move more money than strictly needed.
pub fn compute_settlement_plan(balances: &[MemberBalance]) -> Vec<SettlementTransfer> {
    // Members within epsilon of zero are settled and take no part
    let debtors: Vec<&MemberBalance> = balances
        .iter()
        .filter(|b| b.balance < -SETTLED_EPSILON)
        .collect();
    let creditors: Vec<&MemberBalance> = balances
        .iter()
        .filter(|b| b.balance > SETTLED_EPSILON)
        .collect();

    let mut transfers = Vec::new();
    for debtor in &debtors {
        for creditor in &creditors {
            let amount = debtor.balance.abs().min(creditor.balance);
            if amount <= 0.0 {
                continue;
            }
            transfers.push(SettlementTransfer {
                debtor: debtor.member.clone(),
                creditor: creditor.member.clone(),
                amount,
            });
        }
    }
    transfers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::is_group_settled;
    use crate::schemas::fixtures::member;

    fn balance(id: &str, balance: f64) -> MemberBalance {
        MemberBalance {
            member: member(id),
            paid: 0.0,
            share: 0.0,
            balance,
        }
    }

    fn pairs(plan: &[SettlementTransfer]) -> Vec<(&str, &str, f64)> {
        plan.iter()
            .map(|t| (t.debtor.id.as_str(), t.creditor.id.as_str(), t.amount))
            .collect()
    }

    #[test]
    fn one_debtor_two_creditors_in_input_order() {
        let plan = compute_settlement_plan(&[
            balance("a", -30.0),
            balance("b", 10.0),
            balance("c", 20.0),
        ]);
        assert_eq!(pairs(&plan), vec![("a", "b", 10.0), ("a", "c", 20.0)]);
    }

    #[test]
    fn creditor_order_follows_input() {
        let plan = compute_settlement_plan(&[
            balance("c", 20.0),
            balance("a", -30.0),
            balance("b", 10.0),
        ]);
        assert_eq!(pairs(&plan), vec![("a", "c", 20.0), ("a", "b", 10.0)]);
    }

    #[test]
    fn settled_members_are_left_out() {
        let plan = compute_settlement_plan(&[
            balance("a", -10.0),
            balance("b", 0.004),
            balance("c", -0.009),
            balance("d", 10.0),
        ]);
        assert_eq!(pairs(&plan), vec![("a", "d", 10.0)]);
    }

    #[test]
    fn all_settled_gives_empty_plan() {
        let balances = [balance("a", 0.005), balance("b", -0.005), balance("c", 0.0)];
        assert!(compute_settlement_plan(&balances).is_empty());
        assert!(is_group_settled(&balances));
    }

    #[test]
    fn greedy_pairing_is_not_minimal() {
        // Every pair gets a transfer, even when fewer would do
        let plan = compute_settlement_plan(&[
            balance("a", -15.0),
            balance("b", -15.0),
            balance("c", 20.0),
            balance("d", 10.0),
        ]);
        assert_eq!(
            pairs(&plan),
            vec![
                ("a", "c", 15.0),
                ("a", "d", 10.0),
                ("b", "c", 15.0),
                ("b", "d", 10.0),
            ]
        );
    }
}
