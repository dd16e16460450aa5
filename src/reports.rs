//! Spending reports for a group over a date range.
use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, Months, TimeZone, Utc};
use serde::Serialize;

use crate::balance::group_expenses;
use crate::schemas::{Category, Expense, Group, Member};

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Inclusive date range.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DateRange {
    /// From the start of the previous month to the end of the month of `now`.
    pub fn around(now: DateTime<Utc>) -> Option<Self> {
        let month_start = now.date_naive().with_day(1)?;
        let from = month_start.checked_sub_months(Months::new(1))?;
        let next_month = month_start.checked_add_months(Months::new(1))?;
        Some(Self {
            from: Utc.from_utc_datetime(&from.and_hms_opt(0, 0, 0)?),
            to: Utc.from_utc_datetime(&next_month.and_hms_opt(0, 0, 0)?) - Duration::milliseconds(1),
        })
    }

    pub fn contains(&self, date: DateTime<Utc>) -> bool {
        self.from <= date && date <= self.to
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: Category,
    pub total: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MemberTotal {
    pub member: Member,
    pub total: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MonthTotal {
    pub month: &'static str,
    pub total: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GroupReport {
    pub range: DateRange,
    pub count: usize,
    pub total: f64,
    pub average: f64,
    pub highest: f64,
    pub most_common_category: Option<Category>,
    pub by_category: Vec<CategoryTotal>,
    pub by_member: Vec<MemberTotal>,
    pub by_month: Vec<MonthTotal>,
}

pub fn group_report(group: &Group, expenses: &[Expense], range: DateRange) -> GroupReport {
    // Same selection as the balances, narrowed to the range
    let selected: Vec<&Expense> = group_expenses(group, expenses)
        .into_iter()
        .filter(|e| range.contains(e.date))
        .collect();

    let total: f64 = selected.iter().map(|e| e.amount).sum();
    let count = selected.len();
    let average = if count > 0 { total / count as f64 } else { 0.0 };
    let highest = selected.iter().map(|e| e.amount).fold(0.0, f64::max);

    // Categories keep first-seen order
    let mut by_category: Vec<CategoryTotal> = Vec::new();
    let mut counts: Vec<(Category, usize)> = Vec::new();
    for expense in &selected {
        match by_category.iter_mut().find(|c| c.category == expense.category) {
            Some(entry) => entry.total += expense.amount,
            None => by_category.push(CategoryTotal {
                category: expense.category,
                total: expense.amount,
            }),
        }
        match counts.iter_mut().find(|(c, _)| *c == expense.category) {
            Some((_, n)) => *n += 1,
            None => counts.push((expense.category, 1)),
        }
    }
    let mut most_common_category = None;
    let mut best = 0;
    for (category, n) in counts {
        if n > best {
            best = n;
            most_common_category = Some(category);
        }
    }

    let mut paid: HashMap<&str, f64> = HashMap::new();
    for expense in &selected {
        *paid.entry(expense.paid_by.id.as_str()).or_insert(0.0) += expense.amount;
    }
    let by_member = group
        .members
        .iter()
        .map(|member| MemberTotal {
            member: member.clone(),
            total: paid.get(member.id.as_str()).copied().unwrap_or(0.0),
        })
        .collect();

    let mut months = [0.0; 12];
    for expense in &selected {
        months[expense.date.month0() as usize] += expense.amount;
    }
    let by_month = MONTHS
        .into_iter()
        .zip(months)
        .map(|(month, total)| MonthTotal { month, total })
        .collect();

    GroupReport {
        range,
        count,
        total,
        average,
        highest,
        most_common_category,
        by_category,
        by_member,
        by_month,
    }
}
