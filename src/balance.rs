//! Per-member balances of a group and the personal balance summary.
//!
//! Everything here is a pure function of the snapshot it is given: the caller
//! fetches a group and its expenses once and passes them in.
use std::collections::HashMap;

use serde::Serialize;

use crate::error::EngineError;
use crate::exchange::{compute_settlement_plan, SettlementTransfer};
use crate::schemas::{Expense, ExpenseScope, Group, Member, SplitStrategy};

/// Balances closer to zero than this are considered settled.
pub const SETTLED_EPSILON: f64 = 0.01;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MemberBalance {
    pub member: Member,
    pub paid: f64,
    pub share: f64,
    /// Positive when the group owes the member, negative when the member owes.
    pub balance: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GroupSummary {
    pub group_id: String,
    pub total_expenses: f64,
    pub your_share: Option<f64>,
    pub balances: Vec<MemberBalance>,
    pub settlement: Vec<SettlementTransfer>,
    pub is_settled: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PersonalSummary {
    pub initial_balance: f64,
    pub total_expenses: f64,
    pub current_balance: f64,
    pub total_owed: f64,
    pub total_lent: f64,
}

/// Returns the expenses that count towards `group`, in `(date, id)` order.
///
/// Expenses from elsewhere and expenses paid by non-members are skipped.
pub(crate) fn group_expenses<'a>(group: &Group, expenses: &'a [Expense]) -> Vec<&'a Expense> {
    let mut selected: Vec<&Expense> = expenses
        .iter()
        .filter(|expense| {
            if expense.group_id() != Some(group.id.as_str()) {
                tracing::debug!(expense = %expense.id, group = %group.id, "skipping expense from another scope");
                return false;
            }
            if group.member(&expense.paid_by.id).is_none() {
                tracing::debug!(expense = %expense.id, payer = %expense.paid_by.id, "skipping expense paid by a non-member");
                return false;
            }
            true
        })
        .collect();
    selected.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
    selected
}

/// Computes paid, share and balance for every member of `group`, in member
/// order.
///
/// Equal splits divide the sum of their amounts by the member count; percentage
/// and fixed splits add their portion to the named members.
pub fn compute_member_balances(
    group: &Group,
    expenses: &[Expense],
) -> Result<Vec<MemberBalance>, EngineError> {
    if group.members.is_empty() {
        return Err(EngineError::InvalidGroupState(format!(
            "group \"{}\" has no members",
            group.id
        )));
    }

    let mut paid: HashMap<&str, f64> = HashMap::new();
    let mut portions: HashMap<&str, f64> = HashMap::new();
    let mut equal_total = 0.0;

    for expense in group_expenses(group, expenses) {
        let ExpenseScope::Group { split, .. } = &expense.scope else {
            continue;
        };
        split.validate(expense.amount, &group.members)?;

        *paid.entry(expense.paid_by.id.as_str()).or_insert(0.0) += expense.amount;
        match split {
            SplitStrategy::Equal => equal_total += expense.amount,
            SplitStrategy::Percentage(percentages) => {
                for (id, pct) in percentages.iter() {
                    *portions.entry(id.as_str()).or_insert(0.0) += expense.amount * pct / 100.0;
                }
            }
            SplitStrategy::FixedAmount(amounts) => {
                for (id, amount) in amounts.iter() {
                    *portions.entry(id.as_str()).or_insert(0.0) += amount;
                }
            }
        }
    }

    let equal_share = equal_total / group.members.len() as f64;
    Ok(group
        .members
        .iter()
        .map(|member| {
            let paid = paid.get(member.id.as_str()).copied().unwrap_or(0.0);
            let share = match portions.get(member.id.as_str()) {
                Some(portion) => equal_share + portion,
                None => equal_share,
            };
            MemberBalance {
                member: member.clone(),
                paid,
                share,
                balance: paid - share,
            }
        })
        .collect())
}

pub fn is_group_settled(balances: &[MemberBalance]) -> bool {
    balances
        .iter()
        .all(|balance| balance.balance.abs() < SETTLED_EPSILON)
}

/// Balances, settlement plan and totals of a group as seen by `viewer`.
pub fn summarize_group(
    group: &Group,
    expenses: &[Expense],
    viewer: Option<&str>,
) -> Result<GroupSummary, EngineError> {
    let balances = compute_member_balances(group, expenses)?;
    let total_expenses = group_expenses(group, expenses)
        .iter()
        .map(|expense| expense.amount)
        .sum();
    let your_share = viewer.and_then(|viewer| {
        balances
            .iter()
            .find(|balance| balance.member.id == viewer)
            .map(|balance| balance.share)
    });
    let settlement = compute_settlement_plan(&balances);
    let is_settled = is_group_settled(&balances);

    Ok(GroupSummary {
        group_id: group.id.clone(),
        total_expenses,
        your_share,
        balances,
        settlement,
        is_settled,
    })
}

/// Summary of the user's own money outside of group balances.
///
/// The current balance only moves with personal expenses the user paid; group
/// expenses are reported as lent (paid by the user) or owed (paid by others).
pub fn personal_summary(expenses: &[Expense], user_id: &str, initial_balance: f64) -> PersonalSummary {
    let mut total_expenses = 0.0;
    let mut total_owed = 0.0;
    let mut total_lent = 0.0;

    for expense in expenses {
        let paid_by_user = expense.paid_by.id == user_id;
        match (expense.is_personal(), paid_by_user) {
            (true, true) => total_expenses += expense.amount,
            (true, false) => {}
            (false, true) => total_lent += expense.amount,
            (false, false) => total_owed += expense.amount,
        }
    }

    PersonalSummary {
        initial_balance,
        total_expenses,
        current_balance: initial_balance - total_expenses,
        total_owed,
        total_lent,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;

    use super::*;
    use crate::schemas::fixtures::*;
    use crate::schemas::{FixedAmounts, Percentages};

    fn balance_of<'a>(balances: &'a [MemberBalance], id: &str) -> &'a MemberBalance {
        balances.iter().find(|b| b.member.id == id).unwrap()
    }

    fn with_split(mut expense: Expense, new_split: SplitStrategy) -> Expense {
        if let ExpenseScope::Group { split, .. } = &mut expense.scope {
            *split = new_split;
        }
        expense
    }

    #[test]
    fn two_member_scenario() {
        let group = group("flat", &["alice", "bob"]);
        let mut transport = expense("e2", &group, "bob", 20.0);
        transport.category = crate::schemas::Category::Transport;
        let expenses = vec![expense("e1", &group, "alice", 100.0), transport];

        let summary = summarize_group(&group, &expenses, Some("alice")).unwrap();
        assert_eq!(summary.total_expenses, 120.0);
        assert_eq!(summary.your_share, Some(60.0));

        let alice = balance_of(&summary.balances, "alice");
        assert_eq!((alice.paid, alice.share, alice.balance), (100.0, 60.0, 40.0));
        let bob = balance_of(&summary.balances, "bob");
        assert_eq!((bob.paid, bob.share, bob.balance), (20.0, 60.0, -40.0));

        assert_eq!(summary.settlement.len(), 1);
        assert_eq!(summary.settlement[0].debtor.id, "bob");
        assert_eq!(summary.settlement[0].creditor.id, "alice");
        assert_eq!(summary.settlement[0].amount, 40.0);
        assert!(!summary.is_settled);
    }

    #[test]
    fn single_member_pays_own_share() {
        let group = group("solo", &["alice"]);
        let balances =
            compute_member_balances(&group, &[expense("e1", &group, "alice", 42.5)]).unwrap();
        assert_eq!(balances.len(), 1);
        assert_eq!(balances[0].balance, 0.0);
        assert!(is_group_settled(&balances));
    }

    #[test]
    fn empty_group_is_rejected() {
        let group = group("empty", &[]);
        let err = compute_member_balances(&group, &[]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidGroupState(_)));
    }

    #[test]
    fn group_without_expenses_is_settled() {
        let group = group("new", &["alice", "bob", "carol"]);
        let summary = summarize_group(&group, &[], None).unwrap();
        assert!(summary.balances.iter().all(|b| b.balance == 0.0));
        assert!(summary.settlement.is_empty());
        assert!(summary.is_settled);
        assert_eq!(summary.your_share, None);
    }

    #[test]
    fn unrelated_expenses_are_filtered() {
        let group = group("flat", &["alice", "bob"]);
        let other = crate::schemas::fixtures::group("other", &["alice", "bob"]);
        let expenses = vec![
            expense("e1", &group, "alice", 10.0),
            expense("e2", &other, "bob", 500.0),
            expense("e3", &group, "mallory", 70.0),
            personal("p1", "bob", 30.0),
        ];
        let balances = compute_member_balances(&group, &expenses).unwrap();
        assert_eq!(balance_of(&balances, "alice").balance, 5.0);
        assert_eq!(balance_of(&balances, "bob").balance, -5.0);
    }

    #[test]
    fn percentage_and_fixed_splits() {
        let group = group("trip", &["alice", "bob", "carol"]);
        let percent: BTreeMap<String, f64> =
            [("alice".to_string(), 50.0), ("bob".to_string(), 50.0)].into();
        let fixed: BTreeMap<String, f64> =
            [("carol".to_string(), 30.0)].into();
        let expenses = vec![
            expense("e1", &group, "alice", 30.0),
            with_split(
                expense("e2", &group, "carol", 40.0),
                SplitStrategy::Percentage(Percentages::try_from(percent).unwrap()),
            ),
            with_split(
                expense("e3", &group, "bob", 30.0),
                SplitStrategy::FixedAmount(FixedAmounts::try_from(fixed).unwrap()),
            ),
        ];
        let balances = compute_member_balances(&group, &expenses).unwrap();
        // equal: 10 each; percentage: alice 20, bob 20; fixed: carol 30
        assert_eq!(balance_of(&balances, "alice").share, 30.0);
        assert_eq!(balance_of(&balances, "bob").share, 30.0);
        assert_eq!(balance_of(&balances, "carol").share, 40.0);
        let total: f64 = balances.iter().map(|b| b.balance).sum();
        assert!(total.abs() < 1e-9);
    }

    #[test]
    fn invalid_stored_split_is_reported() {
        let group = group("trip", &["alice", "bob"]);
        let fixed: BTreeMap<String, f64> = [("bob".to_string(), 5.0)].into();
        let expenses = vec![with_split(
            expense("e1", &group, "alice", 30.0),
            SplitStrategy::FixedAmount(FixedAmounts::try_from(fixed).unwrap()),
        )];
        assert!(matches!(
            compute_member_balances(&group, &expenses),
            Err(EngineError::InvalidSplit(_))
        ));
    }

    #[test]
    fn personal_summary_totals() {
        let group = group("flat", &["alice", "bob"]);
        let expenses = vec![
            personal("p1", "alice", 25.0),
            personal("p2", "bob", 99.0),
            expense("e1", &group, "alice", 40.0),
            expense("e2", &group, "bob", 15.0),
        ];
        let summary = personal_summary(&expenses, "alice", 1000.0);
        assert_eq!(
            summary,
            PersonalSummary {
                initial_balance: 1000.0,
                total_expenses: 25.0,
                current_balance: 975.0,
                total_owed: 15.0,
                total_lent: 40.0,
            }
        );
    }

    fn scenario() -> impl Strategy<Value = (Group, Vec<Expense>)> {
        (1usize..8)
            .prop_flat_map(|members| {
                let payments = prop::collection::vec((0..members, 0.01f64..10_000.0), 0..40);
                (Just(members), payments)
            })
            .prop_map(|(members, payments)| {
                let ids: Vec<String> = (0..members).map(|i| format!("m{i}")).collect();
                let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
                let group = group("g", &refs);
                let expenses = payments
                    .into_iter()
                    .enumerate()
                    .map(|(n, (payer, amount))| expense(&format!("e{n}"), &group, &ids[payer], amount))
                    .collect();
                (group, expenses)
            })
    }

    proptest! {
        #[test]
        fn prop_balances_sum_to_zero((group, expenses) in scenario()) {
            let balances = compute_member_balances(&group, &expenses).unwrap();
            prop_assert_eq!(balances.len(), group.members.len());
            let total: f64 = balances.iter().map(|b| b.balance).sum();
            // Rounding error grows with the magnitude of the amounts, so the
            // per-member tolerance is taken relative to total spend
            let scale = expenses.iter().map(|e| e.amount).sum::<f64>().max(1.0);
            prop_assert!(total.abs() <= 1e-9 * group.members.len() as f64 * scale);
        }

        #[test]
        fn prop_balances_are_deterministic((group, expenses) in scenario()) {
            let first = compute_member_balances(&group, &expenses).unwrap();
            let mut reversed = expenses.clone();
            reversed.reverse();
            prop_assert_eq!(&first, &compute_member_balances(&group, &expenses).unwrap());
            prop_assert_eq!(&first, &compute_member_balances(&group, &reversed).unwrap());
        }
    }
}
