//! Campaign, pot and donation storage.
//!
//! Everything goes through the [`DocumentStore`] collaborator; the relay
//! does not depend on this module.

pub mod models;
pub mod operations;
pub mod store;

pub use models::{Campaign, Donation, NewCampaign, NewDonation, NewPot, Pot, PotUpdate};
pub use operations::DbOperations;
pub use store::{Document, DocumentStore, InMemoryStore};
