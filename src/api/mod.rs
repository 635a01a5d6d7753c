//! HTTP handlers for campaigns, pots and donations.

pub mod handlers;
