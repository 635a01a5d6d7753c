use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::db::models::{
    from_document, to_document, Campaign, Donation, NewCampaign, NewDonation, NewPot, Pot,
    PotUpdate, CAMPAIGNS, DONATIONS, POTS,
};
use crate::db::store::{id_filter, Document, DocumentStore};
use crate::error::AppError;
use crate::Result;

/// Typed campaign, pot and donation operations over a [`DocumentStore`].
#[derive(Clone)]
pub struct DbOperations {
    store: Arc<dyn DocumentStore>,
}

fn operator(op: &str, fields: Document) -> Document {
    let mut update = Document::new();
    update.insert(op.to_string(), Value::Object(fields));
    update
}

fn collected_delta(amount: f64) -> Document {
    let mut increment = Document::new();
    increment.insert("collected".to_string(), json!(amount));
    operator("$inc", increment)
}

fn decode_all<T: DeserializeOwned>(documents: Vec<Document>) -> Result<Vec<T>> {
    documents
        .into_iter()
        .map(|document| from_document(document).map_err(AppError::from))
        .collect()
}

fn validate_amount(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(AppError::ValidationError(format!("{} must be a positive number", field)));
    }
    Ok(())
}

fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(AppError::ValidationError("title must not be empty".to_string()));
    }
    Ok(())
}

impl DbOperations {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn list_campaigns(&self) -> Result<Vec<Campaign>> {
        let documents = self.store.find(CAMPAIGNS, Document::new()).await?;
        decode_all(documents)
    }

    pub async fn create_campaign(&self, new: NewCampaign) -> Result<Campaign> {
        if new.name.trim().is_empty() {
            return Err(AppError::ValidationError("name must not be empty".to_string()));
        }
        if let (Some(start), Some(end)) = (new.start_date, new.end_date) {
            if end < start {
                return Err(AppError::ValidationError(
                    "endDate must not be before startDate".to_string(),
                ));
            }
        }

        let mut campaign = Campaign::from_new(new);
        campaign.id = self.store.insert_one(CAMPAIGNS, to_document(&campaign)?).await?;
        info!("Created campaign {} ({})", campaign.id, campaign.name);
        Ok(campaign)
    }

    pub async fn list_pots(&self) -> Result<Vec<Pot>> {
        let documents = self.store.find(POTS, Document::new()).await?;
        decode_all(documents)
    }

    pub async fn get_pot(&self, id: &str) -> Result<Option<Pot>> {
        let documents = self.store.find(POTS, id_filter(id)).await?;
        match documents.into_iter().next() {
            Some(document) => Ok(Some(from_document(document)?)),
            None => Ok(None),
        }
    }

    pub async fn create_pot(&self, new: NewPot) -> Result<Pot> {
        validate_title(&new.title)?;
        validate_amount("goal", new.goal)?;

        let mut pot = Pot::new(new);
        pot.id = self.store.insert_one(POTS, to_document(&pot)?).await?;
        info!("Created pot {} ({})", pot.id, pot.title);
        Ok(pot)
    }

    pub async fn update_pot(&self, id: &str, update: PotUpdate) -> Result<Pot> {
        if let Some(title) = &update.title {
            validate_title(title)?;
        }
        if let Some(goal) = update.goal {
            validate_amount("goal", goal)?;
        }

        let fields = to_document(&update)?;
        if !fields.is_empty() {
            let matched = self
                .store
                .update_one(POTS, id_filter(id), operator("$set", fields))
                .await?;
            if !matched {
                return Err(AppError::NotFound(format!("pot {}", id)));
            }
        }

        self.get_pot(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("pot {}", id)))
    }

    /// Records a donation and adds its amount to the pot's collected total.
    pub async fn add_donation(&self, pot_id: &str, new: NewDonation) -> Result<Donation> {
        validate_amount("amount", new.amount)?;
        let pot = self
            .get_pot(pot_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("pot {}", pot_id)))?;
        if !(pot.collected + new.amount).is_finite() {
            return Err(AppError::ValidationError(format!(
                "amount would overflow the total of pot {}",
                pot_id
            )));
        }

        // The total moves first so a rejected increment never leaves a donation behind.
        let matched = self
            .store
            .update_one(POTS, id_filter(pot_id), collected_delta(new.amount))
            .await?;
        if !matched {
            warn!("Pot {} vanished while recording a donation", pot_id);
            return Err(AppError::NotFound(format!("pot {}", pot_id)));
        }

        let mut donation = Donation::new(pot_id, new.amount);
        let inserted = match to_document(&donation) {
            Ok(document) => self.store.insert_one(DONATIONS, document).await.map_err(AppError::from),
            Err(e) => Err(AppError::from(e)),
        };
        match inserted {
            Ok(id) => donation.id = id,
            Err(e) => {
                warn!("Failed to store donation to pot {}, reverting its total: {}", pot_id, e);
                if let Err(revert) = self
                    .store
                    .update_one(POTS, id_filter(pot_id), collected_delta(-new.amount))
                    .await
                {
                    error!("Failed to revert total of pot {}: {}", pot_id, revert);
                }
                return Err(e);
            }
        }

        info!("Recorded donation {} of {} to pot {}", donation.id, donation.amount, pot_id);
        Ok(donation)
    }

    pub async fn donations_for_pot(&self, pot_id: &str) -> Result<Vec<Donation>> {
        if self.get_pot(pot_id).await?.is_none() {
            return Err(AppError::NotFound(format!("pot {}", pot_id)));
        }

        let mut filter = Document::new();
        filter.insert("potId".to_string(), Value::String(pot_id.to_string()));
        let documents = self.store.find(DONATIONS, filter).await?;
        decode_all(documents)
    }
}
