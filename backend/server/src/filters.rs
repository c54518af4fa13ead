//! # Catalog Queries
//!
//! `GET /api/devices` query parameters.
//!
//! - `brand`, `model`: case-insensitive regular expressions matched anywhere in the field
//! - `minPrice`, `maxPrice`: inclusive bounds
//! - `sortBy`: `field:asc` or `field:desc`, anything but `desc` sorts ascending
//!
//! Empty parameters are ignored. Without `sortBy`, newest devices come first.
use std::cmp::Ordering;

use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use shop::devices::Device;

use crate::{error::AppError, utils::non_empty};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceQuery {
    pub brand: Option<String>,
    pub model: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub sort_by: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Name,
    Brand,
    Model,
    Price,
    StockQuantity,
    CreatedAt,
}

#[derive(Debug)]
pub struct DeviceFilter {
    brand: Option<Regex>,
    model: Option<Regex>,
    min_price: Option<f64>,
    max_price: Option<f64>,
    sort: SortField,
    descending: bool,
}

impl TryFrom<DeviceQuery> for DeviceFilter {
    type Error = AppError;

    fn try_from(query: DeviceQuery) -> Result<Self, Self::Error> {
        let (sort, descending) = match non_empty(query.sort_by) {
            Some(sort_by) => parse_sort(&sort_by)?,
            None => (SortField::CreatedAt, true),
        };

        Ok(Self {
            brand: pattern("brand", query.brand)?,
            model: pattern("model", query.model)?,
            min_price: price("minPrice", query.min_price)?,
            max_price: price("maxPrice", query.max_price)?,
            sort,
            descending,
        })
    }
}

impl DeviceFilter {
    pub fn matches(&self, device: &Device) -> bool {
        self.brand.as_ref().is_none_or(|re| re.is_match(&device.brand))
            && self.model.as_ref().is_none_or(|re| re.is_match(&device.model))
            && self.min_price.is_none_or(|min| device.price >= min)
            && self.max_price.is_none_or(|max| device.price <= max)
    }

    pub fn apply(&self, devices: Vec<Device>) -> Vec<Device> {
        let mut devices: Vec<Device> = devices
            .into_iter()
            .filter(|device| self.matches(device))
            .collect();

        devices.sort_by(|a, b| {
            let ordering = compare(self.sort, a, b);
            if self.descending {
                ordering.reverse()
            } else {
                ordering
            }
        });

        devices
    }
}

fn compare(field: SortField, a: &Device, b: &Device) -> Ordering {
    match field {
        SortField::Name => a.name.cmp(&b.name),
        SortField::Brand => a.brand.cmp(&b.brand),
        SortField::Model => a.model.cmp(&b.model),
        SortField::Price => a.price.total_cmp(&b.price),
        SortField::StockQuantity => a.stock_quantity.cmp(&b.stock_quantity),
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
    }
}

fn parse_sort(sort_by: &str) -> Result<(SortField, bool), AppError> {
    let mut parts = sort_by.splitn(2, ':');
    let field = match parts.next().unwrap_or_default() {
        "name" => SortField::Name,
        "brand" => SortField::Brand,
        "model" => SortField::Model,
        "price" => SortField::Price,
        "stockQuantity" => SortField::StockQuantity,
        "createdAt" => SortField::CreatedAt,
        other => return Err(AppError::Validation(format!("Cannot sort by {other}"))),
    };

    Ok((field, parts.next() == Some("desc")))
}

fn pattern(name: &str, value: Option<String>) -> Result<Option<Regex>, AppError> {
    non_empty(value)
        .map(|source| {
            RegexBuilder::new(&source)
                .case_insensitive(true)
                .size_limit(1 << 16)
                .build()
                .map_err(|_| AppError::Validation(format!("Invalid {name} pattern")))
        })
        .transpose()
}

fn price(name: &str, value: Option<String>) -> Result<Option<f64>, AppError> {
    non_empty(value)
        .map(|raw| {
            raw.parse::<f64>()
                .ok()
                .filter(|price| price.is_finite())
                .ok_or_else(|| AppError::Validation(format!("Invalid {name} value")))
        })
        .transpose()
}
