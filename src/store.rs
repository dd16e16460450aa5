//! MongoDB persistence for groups, expenses and user settings.
use futures::TryStreamExt;
use mongodb::{
    bson::doc,
    error::Result,
    options::ReplaceOptions,
    Client, Collection, Database,
};

use crate::schemas::{Expense, Group, GroupRef, UserSettings};

#[derive(Clone)]
pub struct Store {
    db: Database,
}

impl Store {
    pub async fn connect(uri: &str, database: &str) -> Result<Self> {
        let client = Client::with_uri_str(uri).await?;
        Ok(Self {
            db: client.database(database),
        })
    }

    fn groups(&self) -> Collection<Group> {
        self.db.collection("groups")
    }

    fn expenses(&self) -> Collection<Expense> {
        self.db.collection("expenses")
    }

    fn settings(&self) -> Collection<UserSettings> {
        self.db.collection("user_settings")
    }

    pub async fn insert_group(&self, group: &Group) -> Result<()> {
        self.groups().insert_one(group, None).await?;
        Ok(())
    }

    pub async fn list_groups(&self) -> Result<Vec<Group>> {
        self.groups().find(None, None).await?.try_collect().await
    }

    pub async fn find_group(&self, id: &str) -> Result<Option<Group>> {
        self.groups().find_one(doc! { "id": id }, None).await
    }

    /// Returns `false` when no group has the id.
    pub async fn replace_group(&self, group: &Group) -> Result<bool> {
        let result = self
            .groups()
            .replace_one(doc! { "id": group.id.as_str() }, group, None)
            .await?;
        Ok(result.matched_count > 0)
    }

    /// Deletes the group together with its expenses.
    pub async fn delete_group(&self, id: &str) -> Result<bool> {
        let result = self.groups().delete_one(doc! { "id": id }, None).await?;
        if result.deleted_count == 0 {
            return Ok(false);
        }
        let expenses = self
            .expenses()
            .delete_many(doc! { "scope.group.id": id }, None)
            .await?;
        tracing::info!("Deleted group {id} and {} expenses", expenses.deleted_count);
        Ok(true)
    }

    /// Refreshes the group name copied into the group's expenses.
    pub async fn rename_group_in_expenses(&self, group: &GroupRef) -> Result<()> {
        let result = self
            .expenses()
            .update_many(
                doc! { "scope.group.id": group.id.as_str() },
                doc! { "$set": { "scope.group.name": group.name.as_str() } },
                None,
            )
            .await?;
        tracing::debug!("Renamed group {} in {} expenses", group.id, result.modified_count);
        Ok(())
    }

    pub async fn insert_expense(&self, expense: &Expense) -> Result<()> {
        self.expenses().insert_one(expense, None).await?;
        Ok(())
    }

    /// All expenses, or only those of `group_id`.
    pub async fn list_expenses(&self, group_id: Option<&str>) -> Result<Vec<Expense>> {
        let filter = group_id.map(|id| doc! { "scope.group.id": id });
        self.expenses().find(filter, None).await?.try_collect().await
    }

    pub async fn find_expense(&self, id: &str) -> Result<Option<Expense>> {
        self.expenses().find_one(doc! { "id": id }, None).await
    }

    pub async fn replace_expense(&self, expense: &Expense) -> Result<bool> {
        let result = self
            .expenses()
            .replace_one(doc! { "id": expense.id.as_str() }, expense, None)
            .await?;
        Ok(result.matched_count > 0)
    }

    pub async fn delete_expense(&self, id: &str) -> Result<bool> {
        let result = self.expenses().delete_one(doc! { "id": id }, None).await?;
        Ok(result.deleted_count > 0)
    }

    /// Stored settings of the user, or the defaults when there are none.
    pub async fn find_settings(&self, user_id: &str) -> Result<UserSettings> {
        let settings = self
            .settings()
            .find_one(doc! { "user_id": user_id }, None)
            .await?;
        Ok(settings.unwrap_or_else(|| UserSettings::new(user_id.to_string())))
    }

    pub async fn save_settings(&self, settings: &UserSettings) -> Result<()> {
        let options = ReplaceOptions::builder().upsert(true).build();
        self.settings()
            .replace_one(doc! { "user_id": settings.user_id.as_str() }, settings, options)
            .await?;
        Ok(())
    }

    /// A group together with its expenses, read once for the engine.
    pub async fn group_snapshot(&self, id: &str) -> Result<Option<(Group, Vec<Expense>)>> {
        let Some(group) = self.find_group(id).await? else {
            return Ok(None);
        };
        let expenses = self.list_expenses(Some(id)).await?;
        Ok(Some((group, expenses)))
    }
}
