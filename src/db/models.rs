use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::store::{Document, ID_FIELD};
use crate::error::StoreError;

pub const CAMPAIGNS: &str = "campaigns";
pub const POTS: &str = "pots";
pub const DONATIONS: &str = "donations";

/// Vaccination or blood-drive campaign as submitted by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCampaign {
    pub name: String,
    pub center: String,
    pub latitude: f64,
    pub longitude: f64,
    pub vaccine_stock: i64,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub blood_bags: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: String,
    pub name: String,
    pub center: String,
    pub latitude: f64,
    pub longitude: f64,
    pub vaccine_stock: i64,
    pub category: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub blood_bags: Option<i64>,
}

impl Campaign {
    pub fn from_new(new: NewCampaign) -> Self {
        Self {
            id: String::new(),
            name: new.name,
            center: new.center,
            latitude: new.latitude,
            longitude: new.longitude,
            vaccine_stock: new.vaccine_stock,
            category: new.category,
            start_date: new.start_date,
            end_date: new.end_date,
            blood_bags: new.blood_bags,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPot {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub goal: f64,
}

/// Fundraising pot. `collected` is the running total of its donations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pot {
    pub id: String,
    pub title: String,
    pub description: String,
    pub goal: f64,
    pub collected: f64,
    pub created_at: DateTime<Utc>,
}

impl Pot {
    pub fn new(new: NewPot) -> Self {
        Self {
            id: String::new(),
            title: new.title,
            description: new.description,
            goal: new.goal,
            collected: 0.0,
            created_at: Utc::now(),
        }
    }
}

/// Partial update of a pot's descriptive fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PotUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDonation {
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Donation {
    pub id: String,
    pub pot_id: String,
    pub amount: f64,
    pub donated_at: DateTime<Utc>,
}

impl Donation {
    pub fn new(pot_id: &str, amount: f64) -> Self {
        Self {
            id: String::new(),
            pot_id: pot_id.to_string(),
            amount,
            donated_at: Utc::now(),
        }
    }
}

/// Serializes a model into a storable document, leaving the id to the store.
pub fn to_document<T: Serialize>(model: &T) -> Result<Document, StoreError> {
    match serde_json::to_value(model).map_err(|e| StoreError::InvalidDocument(e.to_string()))? {
        Value::Object(mut document) => {
            document.remove("id");
            Ok(document)
        }
        other => Err(StoreError::InvalidDocument(format!("expected an object, got {}", other))),
    }
}

/// Reads a stored document back into a model, exposing `_id` as `id`.
pub fn from_document<T: DeserializeOwned>(mut document: Document) -> Result<T, StoreError> {
    if let Some(id) = document.remove(ID_FIELD) {
        document.insert("id".to_string(), id);
    }
    serde_json::from_value(Value::Object(document)).map_err(|e| StoreError::Decode(e.to_string()))
}
