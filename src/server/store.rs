use std::collections::HashMap;

use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, NaiveDate, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::options::{IndexOptions, UpdateOptions};
use mongodb::{Client, Collection, IndexModel};
use serde::{Deserialize, Serialize};

use crate::config::ServerConfig;
use crate::schemas::{
    Expense, LineItem, Participant, SplitMethod, UpdateExpense, UpdateParticipant, User, Username,
};
use crate::server::error::ApiResult;

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct UserDocument {
    pub id: String,
    pub email: String,
    pub username: Username,
    pub name: Option<String>,
    pub password_hash: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl From<&UserDocument> for User {
    fn from(user: &UserDocument) -> Self {
        User {
            email: user.email.clone(),
            username: user.username.clone(),
            name: user.name.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ParticipantDocument {
    pub id: String,
    pub username: Username,
    pub amount: f64,
    pub item: Option<String>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl LineItem for ParticipantDocument {
    fn username(&self) -> &str {
        &self.username
    }

    fn amount(&self) -> f64 {
        self.amount
    }
}

/// An expense with its participants embedded, so deleting the expense
/// deletes them too.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ExpenseDocument {
    pub id: String,
    pub title: String,
    pub date: NaiveDate,
    pub split_method: SplitMethod,
    pub total_amount: f64,
    pub payer: Option<Username>,
    pub members: Vec<Username>,
    pub participants: Vec<ParticipantDocument>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl ExpenseDocument {
    pub fn is_payer(&self, username: &str) -> bool {
        self.payer.as_deref() == Some(username)
    }

    pub fn is_member(&self, username: &str) -> bool {
        self.is_payer(username) || self.members.iter().any(|member| member == username)
    }

    pub fn has_participant(&self, username: &str) -> bool {
        self.participants.iter().any(|p| p.username == username)
    }
}

impl From<&ExpenseDocument> for Expense {
    fn from(expense: &ExpenseDocument) -> Self {
        Expense {
            id: expense.id.clone(),
            title: expense.title.clone(),
            date: expense.date,
            split_method: expense.split_method,
            total_amount: expense.total_amount,
            created_at: expense.created_at.naive_utc(),
            paid_by: expense.payer.clone(),
            participants: expense
                .participants
                .iter()
                .map(|p| Participant {
                    username: p.username.clone(),
                    name: None,
                    amount: p.amount,
                    item: p.item.clone(),
                    is_payer: None,
                })
                .collect(),
        }
    }
}

/// `$set` document for the fields present in a partial expense update.
fn expense_changes(update: &UpdateExpense, now: DateTime<Utc>) -> ApiResult<Document> {
    let mut changes = doc! { "updated_at": bson::DateTime::from_chrono(now) };
    if let Some(title) = &update.title {
        changes.insert("title", title.trim());
    }
    if let Some(total_amount) = update.total_amount {
        changes.insert("total_amount", total_amount);
    }
    if let Some(date) = update.date {
        changes.insert("date", bson::to_bson(&date)?);
    }
    if let Some(split_method) = update.split_method {
        changes.insert("split_method", bson::to_bson(&split_method)?);
    }
    Ok(changes)
}

/// `$set` document touching every entry of one username.
fn participant_changes(update: &UpdateParticipant) -> Document {
    let mut changes = Document::new();
    if let Some(amount) = update.amount {
        changes.insert("participants.$[entry].amount", amount);
    }
    if let Some(item) = &update.item {
        changes.insert("participants.$[entry].item", item.as_str());
    }
    changes
}

#[derive(Clone)]
pub struct Store {
    users: Collection<UserDocument>,
    expenses: Collection<ExpenseDocument>,
}

impl Store {
    pub async fn connect(config: &ServerConfig) -> ApiResult<Self> {
        let client = Client::with_uri_str(&config.mongodb_uri).await?;
        let database = client.database(&config.database);
        Ok(Store {
            users: database.collection("Users"),
            expenses: database.collection("Expenses"),
        })
    }

    pub async fn ensure_indexes(&self) -> ApiResult<()> {
        for key in ["email", "username", "id"] {
            let mut keys = Document::new();
            keys.insert(key, 1);
            let index = IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().unique(true).build())
                .build();
            self.users.create_index(index, None).await?;
        }
        let index = IndexModel::builder()
            .keys(doc! { "id": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.expenses.create_index(index, None).await?;
        Ok(())
    }

    pub async fn insert_user(&self, user: &UserDocument) -> ApiResult<()> {
        self.users.insert_one(user, None).await?;
        Ok(())
    }

    pub async fn user_by_id(&self, id: &str) -> ApiResult<Option<UserDocument>> {
        Ok(self.users.find_one(doc! { "id": id }, None).await?)
    }

    pub async fn user_by_email(&self, email: &str) -> ApiResult<Option<UserDocument>> {
        Ok(self.users.find_one(doc! { "email": email }, None).await?)
    }

    pub async fn user_by_username(&self, username: &str) -> ApiResult<Option<UserDocument>> {
        Ok(self.users.find_one(doc! { "username": username }, None).await?)
    }

    /// Display names keyed by username.
    pub async fn names_of(
        &self,
        usernames: &[Username],
    ) -> ApiResult<HashMap<Username, Option<String>>> {
        let users: Vec<UserDocument> = self
            .users
            .find(doc! { "username": { "$in": usernames.to_vec() } }, None)
            .await?
            .try_collect()
            .await?;
        Ok(users.into_iter().map(|user| (user.username, user.name)).collect())
    }

    pub async fn insert_expense(&self, expense: &ExpenseDocument) -> ApiResult<()> {
        self.expenses.insert_one(expense, None).await?;
        Ok(())
    }

    pub async fn expense(&self, id: &str) -> ApiResult<Option<ExpenseDocument>> {
        Ok(self.expenses.find_one(doc! { "id": id }, None).await?)
    }

    pub async fn expenses_of(&self, username: &str) -> ApiResult<Vec<ExpenseDocument>> {
        let filter = doc! { "$or": [ { "payer": username }, { "members": username } ] };
        Ok(self.expenses.find(filter, None).await?.try_collect().await?)
    }

    pub async fn update_expense(&self, id: &str, update: &UpdateExpense) -> ApiResult<()> {
        let changes = expense_changes(update, Utc::now())?;
        self.expenses
            .update_one(doc! { "id": id }, doc! { "$set": changes }, None)
            .await?;
        Ok(())
    }

    pub async fn delete_expense(&self, id: &str) -> ApiResult<bool> {
        let result = self.expenses.delete_one(doc! { "id": id }, None).await?;
        Ok(result.deleted_count > 0)
    }

    pub async fn push_participant(
        &self,
        id: &str,
        participant: &ParticipantDocument,
    ) -> ApiResult<()> {
        let update = doc! {
            "$push": { "participants": bson::to_bson(participant)? },
            "$addToSet": { "members": participant.username.as_str() },
        };
        self.expenses.update_one(doc! { "id": id }, update, None).await?;
        Ok(())
    }

    pub async fn update_participant(
        &self,
        id: &str,
        username: &str,
        update: &UpdateParticipant,
    ) -> ApiResult<()> {
        let changes = participant_changes(update);
        if changes.is_empty() {
            return Ok(());
        }
        let options = UpdateOptions::builder()
            .array_filters(vec![doc! { "entry.username": username }])
            .build();
        self.expenses
            .update_one(doc! { "id": id }, doc! { "$set": changes }, options)
            .await?;
        Ok(())
    }

    /// Drops every entry of `username` and their membership.
    pub async fn pull_participant(&self, id: &str, username: &str) -> ApiResult<()> {
        let update = doc! {
            "$pull": {
                "participants": { "username": username },
                "members": username,
            },
        };
        self.expenses.update_one(doc! { "id": id }, update, None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn expense() -> ExpenseDocument {
        let created_at = Utc.with_ymd_and_hms(2024, 5, 4, 12, 30, 0).unwrap();
        ExpenseDocument {
            id: "e1".into(),
            title: "Lunch".into(),
            date: NaiveDate::from_ymd_opt(2024, 5, 4).unwrap(),
            split_method: SplitMethod::Unequal,
            total_amount: 25.0,
            payer: Some("amy".into()),
            members: vec!["amy".into(), "ben".into()],
            participants: vec![ParticipantDocument {
                id: "p1".into(),
                username: "ben".into(),
                amount: 25.0,
                item: Some("Noodles".into()),
                created_at,
            }],
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn membership() {
        let expense = expense();
        assert!(expense.is_payer("amy"));
        assert!(expense.is_member("amy"));
        assert!(expense.is_member("ben"));
        assert!(!expense.is_member("cal"));
        assert!(expense.has_participant("ben"));
        assert!(!expense.has_participant("amy"));
    }

    #[test]
    fn documents_become_wire_expenses() {
        let wire = Expense::from(&expense());
        assert_eq!(wire.paid_by.as_deref(), Some("amy"));
        assert_eq!(wire.participants.len(), 1);
        assert_eq!(wire.participants[0].item.as_deref(), Some("Noodles"));
        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["created_at"], "2024-05-04 12:30:00");
        assert_eq!(json["date"], "2024-05-04");
    }

    #[test]
    fn only_present_fields_are_set() {
        let now = Utc::now();
        let update = UpdateExpense {
            title: Some(" Dinner ".into()),
            total_amount: None,
            date: None,
            split_method: Some(SplitMethod::Equal),
        };
        let changes = expense_changes(&update, now).unwrap();
        assert_eq!(changes.get_str("title").unwrap(), "Dinner");
        assert_eq!(changes.get_str("split_method").unwrap(), "equal");
        assert!(!changes.contains_key("total_amount"));
        assert!(changes.contains_key("updated_at"));

        let changes = participant_changes(&UpdateParticipant {
            amount: Some(7.5),
            item: None,
        });
        assert_eq!(changes.get_f64("participants.$[entry].amount").unwrap(), 7.5);
        assert!(!changes.contains_key("participants.$[entry].item"));
    }
}
