//! # Devices
//!
//! Catalog entries sold by the storefront.
//!
//! - Strings are trimmed on the way in
//! - Price and stock are never negative
//! - `imageUrl` falls back to a placeholder when not provided
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const PLACEHOLDER_IMAGE: &str = "https://via.placeholder.com/150";

#[derive(Error, Debug, PartialEq)]
pub enum FieldError {
    #[error("Please include all required fields: name, brand, model, price, stockQuantity")]
    MissingRequired,

    #[error("{0} must not be negative")]
    Negative(&'static str),

    #[error("{0} is out of range")]
    OutOfRange(&'static str),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub name: String,
    pub brand: String,
    pub model: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub image_url: String,
    pub stock_quantity: u32,
    #[serde(default)]
    pub specifications: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

/// Incoming device attributes, shared by create, update and catalog seeding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceFields {
    pub name: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub price: Option<f64>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub stock_quantity: Option<i64>,
    pub specifications: Option<BTreeMap<String, String>>,
}

/// Compact view embedded in orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSummary {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub name: String,
    pub price: f64,
    pub image_url: String,
}

impl Device {
    pub fn create(fields: DeviceFields, now: DateTime<Utc>) -> Result<Self, FieldError> {
        let name = non_empty(fields.name).ok_or(FieldError::MissingRequired)?;
        let brand = non_empty(fields.brand).ok_or(FieldError::MissingRequired)?;
        let model = non_empty(fields.model).ok_or(FieldError::MissingRequired)?;

        // zero counts as missing for both numbers
        let price = fields
            .price
            .filter(|price| *price != 0.0)
            .ok_or(FieldError::MissingRequired)?;
        let stock = fields
            .stock_quantity
            .filter(|stock| *stock != 0)
            .ok_or(FieldError::MissingRequired)?;

        Ok(Self {
            id: Uuid::new_v4(),
            name,
            brand,
            model,
            price: check_price(price)?,
            description: non_empty(fields.description),
            image_url: non_empty(fields.image_url).unwrap_or_else(|| PLACEHOLDER_IMAGE.to_string()),
            stock_quantity: check_stock(stock)?,
            specifications: fields.specifications.unwrap_or_default(),
            created_at: now,
        })
    }

    /// Overwrites every provided, non-empty field. Stock is applied whenever present.
    pub fn apply(&mut self, fields: DeviceFields) -> Result<(), FieldError> {
        let price = fields
            .price
            .filter(|price| *price != 0.0)
            .map(check_price)
            .transpose()?;
        let stock = fields.stock_quantity.map(check_stock).transpose()?;

        if let Some(name) = non_empty(fields.name) {
            self.name = name;
        }
        if let Some(brand) = non_empty(fields.brand) {
            self.brand = brand;
        }
        if let Some(model) = non_empty(fields.model) {
            self.model = model;
        }
        if let Some(price) = price {
            self.price = price;
        }
        if let Some(description) = non_empty(fields.description) {
            self.description = Some(description);
        }
        if let Some(image_url) = non_empty(fields.image_url) {
            self.image_url = image_url;
        }
        if let Some(stock) = stock {
            self.stock_quantity = stock;
        }
        if let Some(specifications) = fields.specifications.filter(|specs| !specs.is_empty()) {
            self.specifications = specifications;
        }

        Ok(())
    }

    pub fn summary(&self) -> DeviceSummary {
        DeviceSummary {
            id: self.id,
            name: self.name.clone(),
            price: self.price,
            image_url: self.image_url.clone(),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn check_price(price: f64) -> Result<f64, FieldError> {
    if !price.is_finite() {
        return Err(FieldError::OutOfRange("price"));
    }
    if price < 0.0 {
        return Err(FieldError::Negative("price"));
    }

    Ok(price)
}

fn check_stock(stock: i64) -> Result<u32, FieldError> {
    if stock < 0 {
        return Err(FieldError::Negative("stockQuantity"));
    }

    u32::try_from(stock).map_err(|_| FieldError::OutOfRange("stockQuantity"))
}
