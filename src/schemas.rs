use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub type Username = String;
pub type ExpenseId = String;

/// Item label written on every participant of an equally split expense.
pub const EQUAL_SHARE_ITEM: &str = "Equal share";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitMethod {
    #[default]
    Equal,
    Unequal,
}

impl fmt::Display for SplitMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitMethod::Equal => f.write_str("equal"),
            SplitMethod::Unequal => f.write_str("unequal"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Participant {
    pub username: Username,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub amount: f64,
    #[serde(default)]
    pub item: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_payer: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub title: String,
    pub date: NaiveDate,
    pub split_method: SplitMethod,
    pub total_amount: f64,
    #[serde(with = "timestamp")]
    pub created_at: NaiveDateTime,
    pub paid_by: Option<Username>,
    #[serde(default)]
    pub participants: Vec<Participant>,
}

impl Expense {
    /// The recorded payer, falling back to the participant flagged as payer.
    pub fn payer(&self) -> Option<&str> {
        self.paid_by.as_deref().or_else(|| {
            self.participants
                .iter()
                .find(|p| p.is_payer == Some(true))
                .map(|p| p.username.as_str())
        })
    }

    pub fn involves(&self, username: &str) -> bool {
        self.paid_by.as_deref() == Some(username)
            || self.participants.iter().any(|p| p.username == username)
    }
}

/// One line of an unequal split: who owes what for which item.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Entry {
    pub username: Username,
    pub item: String,
    pub amount: f64,
}

impl Entry {
    pub fn new(username: &str, item: &str, amount: f64) -> Self {
        Entry {
            username: normalize_username(username),
            item: item.trim().to_string(),
            amount,
        }
    }
}

/// Anything carrying a username and an amount, so the totals helpers work on
/// both remote participants and local entries.
pub trait LineItem {
    fn username(&self) -> &str;
    fn amount(&self) -> f64;
}

impl LineItem for Participant {
    fn username(&self) -> &str {
        &self.username
    }

    fn amount(&self) -> f64 {
        self.amount
    }
}

impl LineItem for Entry {
    fn username(&self) -> &str {
        &self.username
    }

    fn amount(&self) -> f64 {
        self.amount
    }
}

pub fn normalize_username(username: &str) -> Username {
    username.trim().to_lowercase()
}

fn positive(amount: f64) -> bool {
    amount.is_finite() && amount > 0.0
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct CreateExpense {
    pub title: String,
    pub total_amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_method: Option<SplitMethod>,
}

impl CreateExpense {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        if !positive(self.total_amount) {
            return Err(ValidationError::InvalidTotal);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct UpdateExpense {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_method: Option<SplitMethod>,
}

impl UpdateExpense {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.is_none()
            && self.total_amount.is_none()
            && self.date.is_none()
            && self.split_method.is_none()
        {
            return Err(ValidationError::EmptyUpdate);
        }
        if matches!(&self.title, Some(title) if title.trim().is_empty()) {
            return Err(ValidationError::EmptyTitle);
        }
        if matches!(self.total_amount, Some(total) if !positive(total)) {
            return Err(ValidationError::InvalidTotal);
        }
        Ok(())
    }
}

impl From<&CreateExpense> for UpdateExpense {
    fn from(create: &CreateExpense) -> Self {
        UpdateExpense {
            title: Some(create.title.clone()),
            total_amount: Some(create.total_amount),
            date: create.date,
            split_method: create.split_method,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct AddParticipant {
    pub username: Username,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<String>,
}

impl AddParticipant {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.username.trim().is_empty() {
            return Err(ValidationError::EmptyUsername);
        }
        if matches!(self.amount, Some(amount) if !positive(amount)) {
            return Err(ValidationError::InvalidAmount {
                username: self.username.clone(),
            });
        }
        Ok(())
    }
}

impl From<&Entry> for AddParticipant {
    fn from(entry: &Entry) -> Self {
        AddParticipant {
            username: normalize_username(&entry.username),
            amount: Some(entry.amount),
            item: Some(entry.item.clone()),
        }
    }
}

impl From<&Participant> for AddParticipant {
    fn from(participant: &Participant) -> Self {
        AddParticipant {
            username: normalize_username(&participant.username),
            amount: Some(participant.amount),
            item: participant.item.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct UpdateParticipant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<String>,
}

impl UpdateParticipant {
    pub fn validate(&self, username: &str) -> Result<(), ValidationError> {
        if self.amount.is_none() && self.item.is_none() {
            return Err(ValidationError::EmptyUpdate);
        }
        if matches!(self.amount, Some(amount) if !positive(amount)) {
            return Err(ValidationError::InvalidAmount {
                username: username.to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct User {
    pub email: String,
    pub username: Username,
    pub name: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

/// `created_at` travels as `YYYY-MM-DD HH:MM:SS`.
pub mod timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(
        value: &NaiveDateTime,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }
}
