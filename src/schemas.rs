use std::collections::{BTreeMap, HashSet};

use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, EngineError};

pub type MemberId = String;

/// Tolerance used when checking that split portions add up.
const SPLIT_TOLERANCE: f64 = 1e-6;

/// Generates a new storage id.
pub fn new_id() -> String {
    ObjectId::new().to_hex()
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Member {
    pub id: MemberId,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub avatar: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Category {
    Food,
    Transport,
    Entertainment,
    Rent,
    Utilities,
    Shopping,
    Travel,
    Others,
    Settlement,
}

/// Denormalized pointer from an expense to the group it belongs to.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct GroupRef {
    pub id: String,
    pub name: String,
}

/// Percentage of an expense owed by each listed member.
///
/// Always sums to 100, deserialization included.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(
    try_from = "BTreeMap<MemberId, f64>",
    into = "BTreeMap<MemberId, f64>"
)]
pub struct Percentages(BTreeMap<MemberId, f64>);

impl Percentages {
    pub fn iter(&self) -> impl Iterator<Item = (&MemberId, f64)> {
        self.0.iter().map(|(id, pct)| (id, *pct))
    }
}

impl TryFrom<BTreeMap<MemberId, f64>> for Percentages {
    type Error = EngineError;

    fn try_from(shares: BTreeMap<MemberId, f64>) -> Result<Self, Self::Error> {
        if let Some((id, _)) = shares.iter().find(|(_, pct)| !pct.is_finite() || **pct < 0.0) {
            return Err(EngineError::InvalidSplit(format!(
                "percentage for \"{id}\" must be a non-negative number"
            )));
        }
        let total: f64 = shares.values().sum();
        if (total - 100.0).abs() > SPLIT_TOLERANCE {
            return Err(EngineError::InvalidSplit(format!(
                "percentages sum to {total}, expected 100"
            )));
        }
        Ok(Self(shares))
    }
}

impl From<Percentages> for BTreeMap<MemberId, f64> {
    fn from(percentages: Percentages) -> Self {
        percentages.0
    }
}

/// Fixed amount of an expense owed by each listed member.
///
/// The amounts must add up to the expense amount; that is checked by
/// [`SplitStrategy::validate`] since it depends on the expense.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(
    try_from = "BTreeMap<MemberId, f64>",
    into = "BTreeMap<MemberId, f64>"
)]
pub struct FixedAmounts(BTreeMap<MemberId, f64>);

impl FixedAmounts {
    pub fn iter(&self) -> impl Iterator<Item = (&MemberId, f64)> {
        self.0.iter().map(|(id, amount)| (id, *amount))
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }
}

impl TryFrom<BTreeMap<MemberId, f64>> for FixedAmounts {
    type Error = EngineError;

    fn try_from(shares: BTreeMap<MemberId, f64>) -> Result<Self, Self::Error> {
        match shares.iter().find(|(_, amount)| !amount.is_finite() || **amount < 0.0) {
            Some((id, _)) => Err(EngineError::InvalidSplit(format!(
                "amount for \"{id}\" must be a non-negative number"
            ))),
            None => Ok(Self(shares)),
        }
    }
}

impl From<FixedAmounts> for BTreeMap<MemberId, f64> {
    fn from(amounts: FixedAmounts) -> Self {
        amounts.0
    }
}

/// How a group expense is divided among the members.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", content = "shares", rename_all = "snake_case")]
pub enum SplitStrategy {
    #[default]
    Equal,
    Percentage(Percentages),
    FixedAmount(FixedAmounts),
}

impl SplitStrategy {
    /// Checks the split against the expense amount and the group members.
    pub fn validate(&self, amount: f64, members: &[Member]) -> Result<(), EngineError> {
        let ids: Vec<&MemberId> = match self {
            SplitStrategy::Equal => return Ok(()),
            SplitStrategy::Percentage(percentages) => percentages.iter().map(|(id, _)| id).collect(),
            SplitStrategy::FixedAmount(amounts) => {
                let total = amounts.total();
                if (total - amount).abs() > SPLIT_TOLERANCE {
                    return Err(EngineError::InvalidSplit(format!(
                        "fixed amounts sum to {total}, expected {amount}"
                    )));
                }
                amounts.iter().map(|(id, _)| id).collect()
            }
        };
        match ids.into_iter().find(|id| !members.iter().any(|m| &m.id == *id)) {
            Some(id) => Err(EngineError::InvalidSplit(format!(
                "\"{id}\" is not a member of the group"
            ))),
            None => Ok(()),
        }
    }
}

/// Whether an expense is personal or shared within a group.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExpenseScope {
    #[default]
    Personal,
    Group {
        group: GroupRef,
        #[serde(default)]
        split: SplitStrategy,
    },
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Expense {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub amount: f64,
    pub date: DateTime<Utc>,
    pub category: Category,
    pub paid_by: Member,
    #[serde(default)]
    pub scope: ExpenseScope,
}

impl Expense {
    pub fn group_id(&self) -> Option<&str> {
        match &self.scope {
            ExpenseScope::Personal => None,
            ExpenseScope::Group { group, .. } => Some(group.id.as_str()),
        }
    }

    pub fn is_personal(&self) -> bool {
        matches!(self.scope, ExpenseScope::Personal)
    }

    /// Checks the expense before it is stored.
    ///
    /// `group` is the group the expense claims to belong to, looked up by the
    /// caller.
    pub fn validate(&self, group: Option<&Group>) -> Result<(), ApiError> {
        if self.title.trim().is_empty() {
            return Err(ApiError::Validation("title is required".to_string()));
        }
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(ApiError::Validation(
                "amount must be a positive number".to_string(),
            ));
        }
        let ExpenseScope::Group { group: reference, split } = &self.scope else {
            return Ok(());
        };
        let group = group
            .filter(|group| group.id == reference.id)
            .ok_or_else(|| ApiError::NotFound(format!("group \"{}\"", reference.id)))?;
        if group.member(&self.paid_by.id).is_none() {
            return Err(ApiError::Validation(format!(
                "\"{}\" is not a member of group \"{}\"",
                self.paid_by.name, group.name
            )));
        }
        split.validate(self.amount, &group.members)?;
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub members: Vec<Member>,
}

impl Group {
    /// Creates a group with a fresh id, rejecting empty or duplicated members.
    pub fn new(name: String, description: String, members: Vec<Member>) -> Result<Self, EngineError> {
        validate_members(&members)?;
        Ok(Self {
            id: new_id(),
            name,
            description,
            members,
        })
    }

    pub fn member(&self, id: &str) -> Option<&Member> {
        self.members.iter().find(|member| member.id == id)
    }

    pub fn reference(&self) -> GroupRef {
        GroupRef {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }

    /// Checks that every stored expense of this group still refers to
    /// members: payers and split keys alike.
    pub fn check_members_against(&self, expenses: &[Expense]) -> Result<(), ApiError> {
        for expense in expenses {
            let ExpenseScope::Group { group, split } = &expense.scope else {
                continue;
            };
            if group.id != self.id {
                continue;
            }
            if self.member(&expense.paid_by.id).is_none() {
                return Err(ApiError::Validation(format!(
                    "\"{}\" paid for \"{}\" and cannot leave the group",
                    expense.paid_by.id, expense.title
                )));
            }
            split.validate(expense.amount, &self.members).map_err(|err| {
                ApiError::Validation(format!("expense \"{}\": {err}", expense.title))
            })?;
        }
        Ok(())
    }
}

pub fn validate_members(members: &[Member]) -> Result<(), EngineError> {
    if members.is_empty() {
        return Err(EngineError::InvalidGroupState(
            "a group needs at least one member".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    match members.iter().find(|member| !seen.insert(member.id.as_str())) {
        Some(member) => Err(EngineError::InvalidGroupState(format!(
            "member \"{}\" is listed twice",
            member.id
        ))),
        None => Ok(()),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeFilter {
    Personal,
    Group,
}

/// Optional criteria for listing expenses; unset fields match everything.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ExpenseFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub category: Option<Category>,
    pub paid_by: Option<MemberId>,
    /// Case-insensitive text searched in title and description.
    pub q: Option<String>,
    pub scope: Option<ScopeFilter>,
}

impl ExpenseFilter {
    pub fn matches(&self, expense: &Expense) -> bool {
        if self.from.is_some_and(|from| expense.date < from)
            || self.to.is_some_and(|to| expense.date > to)
        {
            return false;
        }
        if self.category.is_some_and(|category| expense.category != category) {
            return false;
        }
        if let Some(paid_by) = &self.paid_by {
            if &expense.paid_by.id != paid_by {
                return false;
            }
        }
        match self.scope {
            Some(ScopeFilter::Personal) if !expense.is_personal() => return false,
            Some(ScopeFilter::Group) if expense.is_personal() => return false,
            _ => {}
        }
        match self.q.as_deref().map(str::trim) {
            Some(q) if !q.is_empty() => {
                let q = q.to_lowercase();
                expense.title.to_lowercase().contains(&q)
                    || expense.description.to_lowercase().contains(&q)
            }
            _ => true,
        }
    }

    pub fn apply(&self, expenses: Vec<Expense>) -> Vec<Expense> {
        expenses.into_iter().filter(|e| self.matches(e)).collect()
    }
}

/// Per-user settings backing the personal balance summary.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct UserSettings {
    pub user_id: String,
    pub initial_balance: f64,
    pub currency: String,
}

impl UserSettings {
    pub const DEFAULT_CURRENCY: &'static str = "INR";

    pub fn new(user_id: String) -> Self {
        Self {
            user_id,
            initial_balance: 0.0,
            currency: Self::DEFAULT_CURRENCY.to_string(),
        }
    }
}
