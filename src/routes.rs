use actix_web::{delete, get, post, put, web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::balance::{personal_summary, summarize_group, GroupSummary};
use crate::error::ApiError;
use crate::format::format_currency;
use crate::reports::{group_report, DateRange};
use crate::schemas::{
    new_id, validate_members, Category, Expense, ExpenseFilter, ExpenseScope, Group, Member,
    ScopeFilter, SplitStrategy, UserSettings,
};
use crate::store::Store;

type ApiResult = Result<HttpResponse, ApiError>;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(create_group)
        .service(list_groups)
        .service(get_balance)
        .service(get_reports)
        .service(get_group)
        .service(update_group)
        .service(delete_group)
        .service(create_expense)
        .service(list_expenses)
        .service(update_expense)
        .service(delete_expense)
        .service(get_settings)
        .service(put_settings)
        .service(get_summary);
}

#[derive(Deserialize)]
struct GroupPayload {
    name: String,
    #[serde(default)]
    description: String,
    members: Vec<Member>,
}

#[derive(Deserialize)]
struct ViewerQuery {
    user_id: Option<String>,
}

/// A group with its derived totals.
#[derive(Serialize)]
struct GroupView {
    #[serde(flatten)]
    group: Group,
    total_expenses: f64,
    your_share: Option<f64>,
    is_settled: bool,
}

impl GroupView {
    fn build(group: Group, expenses: &[Expense], viewer: Option<&str>) -> Result<Self, ApiError> {
        let summary = summarize_group(&group, expenses, viewer)?;
        Ok(Self {
            group,
            total_expenses: summary.total_expenses,
            your_share: summary.your_share,
            is_settled: summary.is_settled,
        })
    }
}

#[post("/groups")]
async fn create_group(store: web::Data<Store>, json: web::Json<GroupPayload>) -> ApiResult {
    let payload = json.into_inner();
    let group = Group::new(payload.name, payload.description, payload.members)
        .map_err(|err| ApiError::Validation(err.to_string()))?;
    store.insert_group(&group).await?;
    tracing::info!("Created group {} with {} members", group.id, group.members.len());
    Ok(HttpResponse::Created().json(GroupView::build(group, &[], None)?))
}

#[get("/groups")]
async fn list_groups(store: web::Data<Store>, query: web::Query<ViewerQuery>) -> ApiResult {
    let groups = store.list_groups().await?;
    let expenses = store.list_expenses(None).await?;
    let views = groups
        .into_iter()
        .map(|group| GroupView::build(group, &expenses, query.user_id.as_deref()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(HttpResponse::Ok().json(views))
}

#[get("/groups/{id}")]
async fn get_group(
    store: web::Data<Store>,
    id: web::Path<String>,
    query: web::Query<ViewerQuery>,
) -> ApiResult {
    let id = id.into_inner();
    let (group, expenses) = store
        .group_snapshot(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("group \"{id}\"")))?;
    Ok(HttpResponse::Ok().json(GroupView::build(group, &expenses, query.user_id.as_deref())?))
}

#[put("/groups/{id}")]
async fn update_group(
    store: web::Data<Store>,
    id: web::Path<String>,
    json: web::Json<GroupPayload>,
) -> ApiResult {
    let payload = json.into_inner();
    validate_members(&payload.members).map_err(|err| ApiError::Validation(err.to_string()))?;
    let id = id.into_inner();
    let (current, expenses) = store
        .group_snapshot(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("group \"{id}\"")))?;
    let group = Group {
        id,
        name: payload.name,
        description: payload.description,
        members: payload.members,
    };
    // Members still referenced by stored expenses cannot be removed
    group.check_members_against(&expenses)?;
    let view = GroupView::build(group.clone(), &expenses, None)?;

    if !store.replace_group(&group).await? {
        return Err(ApiError::NotFound(format!("group \"{}\"", group.id)));
    }
    if current.name != group.name {
        store.rename_group_in_expenses(&group.reference()).await?;
    }
    Ok(HttpResponse::Ok().json(view))
}

#[delete("/groups/{id}")]
async fn delete_group(store: web::Data<Store>, id: web::Path<String>) -> ApiResult {
    let id = id.into_inner();
    if !store.delete_group(&id).await? {
        return Err(ApiError::NotFound(format!("group \"{id}\"")));
    }
    Ok(HttpResponse::Ok().body("Group deleted"))
}

#[derive(Deserialize)]
struct BalanceQuery {
    user_id: Option<String>,
    currency: Option<String>,
}

#[derive(Serialize)]
struct BalanceView {
    #[serde(flatten)]
    summary: GroupSummary,
    /// "A pays B" lines for the settlement cards.
    cards: Vec<String>,
}

#[get("/groups/{id}/balance")]
async fn get_balance(
    store: web::Data<Store>,
    id: web::Path<String>,
    query: web::Query<BalanceQuery>,
) -> ApiResult {
    let id = id.into_inner();
    let (group, expenses) = store
        .group_snapshot(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("group \"{id}\"")))?;
    let summary = summarize_group(&group, &expenses, query.user_id.as_deref())?;
    let currency = query
        .currency
        .as_deref()
        .unwrap_or(UserSettings::DEFAULT_CURRENCY);
    let cards = summary
        .settlement
        .iter()
        .map(|t| {
            format!(
                "{} pays {} {}",
                t.debtor.name,
                t.creditor.name,
                format_currency(t.amount, currency)
            )
        })
        .collect();
    Ok(HttpResponse::Ok().json(BalanceView { summary, cards }))
}

#[derive(Deserialize)]
struct ReportQuery {
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

#[get("/groups/{id}/reports")]
async fn get_reports(
    store: web::Data<Store>,
    id: web::Path<String>,
    query: web::Query<ReportQuery>,
) -> ApiResult {
    let id = id.into_inner();
    let (group, expenses) = store
        .group_snapshot(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("group \"{id}\"")))?;
    let default = DateRange::around(Utc::now())
        .ok_or_else(|| ApiError::Validation("current date is out of range".to_string()))?;
    let range = DateRange {
        from: query.from.unwrap_or(default.from),
        to: query.to.unwrap_or(default.to),
    };
    if range.from > range.to {
        return Err(ApiError::Validation("`from` is after `to`".to_string()));
    }
    Ok(HttpResponse::Ok().json(group_report(&group, &expenses, range)))
}

#[derive(Deserialize)]
struct ExpensePayload {
    title: String,
    #[serde(default)]
    description: String,
    amount: f64,
    date: Option<DateTime<Utc>>,
    category: Category,
    paid_by: Member,
    group_id: Option<String>,
    split: Option<SplitStrategy>,
}

#[derive(Deserialize)]
struct ExpenseQuery {
    group_id: Option<String>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    category: Option<Category>,
    paid_by: Option<String>,
    q: Option<String>,
    scope: Option<ScopeFilter>,
}

impl ExpenseQuery {
    fn filter(&self) -> ExpenseFilter {
        ExpenseFilter {
            from: self.from,
            to: self.to,
            category: self.category,
            paid_by: self.paid_by.clone(),
            q: self.q.clone(),
            scope: self.scope,
        }
    }
}

/// Builds and validates the expense described by `payload`.
async fn resolve_expense(store: &Store, id: String, payload: ExpensePayload) -> Result<Expense, ApiError> {
    let group = match &payload.group_id {
        Some(group_id) => Some(
            store
                .find_group(group_id)
                .await?
                .ok_or_else(|| ApiError::NotFound(format!("group \"{group_id}\"")))?,
        ),
        None if payload.split.is_some() => {
            return Err(ApiError::Validation(
                "a split needs a group".to_string(),
            ))
        }
        None => None,
    };
    let scope = match &group {
        Some(group) => ExpenseScope::Group {
            group: group.reference(),
            split: payload.split.unwrap_or_default(),
        },
        None => ExpenseScope::Personal,
    };
    let expense = Expense {
        id,
        title: payload.title,
        description: payload.description,
        amount: payload.amount,
        date: payload.date.unwrap_or_else(Utc::now),
        category: payload.category,
        paid_by: payload.paid_by,
        scope,
    };
    expense.validate(group.as_ref())?;
    Ok(expense)
}

#[post("/expenses")]
async fn create_expense(store: web::Data<Store>, json: web::Json<ExpensePayload>) -> ApiResult {
    let expense = resolve_expense(&store, new_id(), json.into_inner()).await?;
    store.insert_expense(&expense).await?;
    tracing::info!("Added expense {} of {}", expense.id, expense.amount);
    Ok(HttpResponse::Created().json(expense))
}

#[get("/expenses")]
async fn list_expenses(store: web::Data<Store>, query: web::Query<ExpenseQuery>) -> ApiResult {
    let expenses = store.list_expenses(query.group_id.as_deref()).await?;
    Ok(HttpResponse::Ok().json(query.filter().apply(expenses)))
}

#[put("/expenses/{id}")]
async fn update_expense(
    store: web::Data<Store>,
    id: web::Path<String>,
    json: web::Json<ExpensePayload>,
) -> ApiResult {
    let id = id.into_inner();
    if store.find_expense(&id).await?.is_none() {
        return Err(ApiError::NotFound(format!("expense \"{id}\"")));
    }
    let expense = resolve_expense(&store, id, json.into_inner()).await?;
    if !store.replace_expense(&expense).await? {
        return Err(ApiError::NotFound(format!("expense \"{}\"", expense.id)));
    }
    Ok(HttpResponse::Ok().json(expense))
}

#[delete("/expenses/{id}")]
async fn delete_expense(store: web::Data<Store>, id: web::Path<String>) -> ApiResult {
    let id = id.into_inner();
    if !store.delete_expense(&id).await? {
        return Err(ApiError::NotFound(format!("expense \"{id}\"")));
    }
    Ok(HttpResponse::Ok().body("Expense deleted"))
}

#[derive(Deserialize)]
struct SettingsPayload {
    initial_balance: f64,
    currency: Option<String>,
}

#[get("/users/{id}/settings")]
async fn get_settings(store: web::Data<Store>, id: web::Path<String>) -> ApiResult {
    Ok(HttpResponse::Ok().json(store.find_settings(&id).await?))
}

#[put("/users/{id}/settings")]
async fn put_settings(
    store: web::Data<Store>,
    id: web::Path<String>,
    json: web::Json<SettingsPayload>,
) -> ApiResult {
    let payload = json.into_inner();
    if !payload.initial_balance.is_finite() {
        return Err(ApiError::Validation(
            "initial balance must be a number".to_string(),
        ));
    }
    let mut settings = store.find_settings(&id).await?;
    settings.initial_balance = payload.initial_balance;
    if let Some(currency) = payload.currency {
        settings.currency = currency.to_ascii_uppercase();
    }
    store.save_settings(&settings).await?;
    Ok(HttpResponse::Ok().json(settings))
}

#[get("/users/{id}/summary")]
async fn get_summary(store: web::Data<Store>, id: web::Path<String>) -> ApiResult {
    let settings = store.find_settings(&id).await?;
    let expenses = store.list_expenses(None).await?;
    Ok(HttpResponse::Ok().json(personal_summary(&expenses, &id, settings.initial_balance)))
}
