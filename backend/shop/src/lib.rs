//! # Shop
//!
//! Documents shared by the storefront server and the catalog tooling.
//!
//! ## Documents
//! - [`devices::Device`]: catalog entry, the only document seeded from outside
//! - [`orders::Order`]: placed order with line snapshots
//! - [`carts::Cart`]: per-user cart, keyed by user id
//! - [`users::User`]: storefront customer or staff account
//! - [`roles::CustomRole`]: named permission set
//! - [`tickets::ResetTicket`]: pending password reset, keyed by user id
//!
//! Every document serializes its id as `_id` with camelCase fields.
//!
//! ## Catalog Files
//! A catalog is a JSON array of [`devices::DeviceFields`], read from disk or a remote URL.
use std::{fs, path::Path};

use thiserror::Error;

pub mod carts;
pub mod devices;
pub mod orders;
pub mod roles;
pub mod tickets;
pub mod users;

use devices::DeviceFields;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to fetch catalog: {0}")]
    Remote(#[from] reqwest::Error),

    #[error("Malformed catalog: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub fn get_catalog(path: impl AsRef<Path>) -> Result<Vec<DeviceFields>, CatalogError> {
    let data = fs::read(path)?;

    Ok(serde_json::from_slice(&data)?)
}

pub async fn get_catalog_remote(url: &str) -> Result<Vec<DeviceFields>, CatalogError> {
    let response = reqwest::get(url).await?.error_for_status()?;
    let bytes = response.bytes().await?;

    Ok(serde_json::from_slice(&bytes)?)
}
