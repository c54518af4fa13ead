//! # Carts
//!
//! One cart per user, keyed by the user's id.
//!
//! - Adding a device already in the cart adds to its quantity
//! - Quantities never drop below 1 through an update; use remove instead
//! - Lines carry the price seen when the device was added
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::devices::Device;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub device: Uuid,
    pub name: String,
    pub image_url: String,
    pub price: f64,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    #[serde(rename = "_id")]
    pub user: Uuid,
    pub items: Vec<CartItem>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn empty(user: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            user,
            items: Vec::new(),
            updated_at: now,
        }
    }

    pub fn add(&mut self, device: &Device, quantity: u32, now: DateTime<Utc>) {
        match self.items.iter_mut().find(|item| item.device == device.id) {
            Some(item) => item.quantity = item.quantity.saturating_add(quantity),
            None => self.items.push(CartItem {
                device: device.id,
                name: device.name.clone(),
                image_url: device.image_url.clone(),
                price: device.price,
                quantity,
            }),
        }

        self.updated_at = now;
    }

    /// Returns false when the device is not in the cart.
    pub fn update_quantity(&mut self, device: Uuid, quantity: u32, now: DateTime<Utc>) -> bool {
        let Some(item) = self.items.iter_mut().find(|item| item.device == device) else {
            return false;
        };

        item.quantity = quantity.max(1);
        self.updated_at = now;
        true
    }

    pub fn remove(&mut self, device: Uuid, now: DateTime<Utc>) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.device != device);
        self.updated_at = now;

        self.items.len() != before
    }

    pub fn clear(&mut self, now: DateTime<Utc>) {
        self.items.clear();
        self.updated_at = now;
    }

    pub fn total_amount(&self) -> f64 {
        self.items
            .iter()
            .map(|item| item.price * f64::from(item.quantity))
            .sum()
    }

    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }
}
