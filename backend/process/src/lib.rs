//! # Catalog Seeding
//!
//! Loads devices into the storefront store from a JSON catalog.
//!
//! ## Catalog format
//! A JSON array of device objects using the same camelCase fields as `POST /api/devices`:
//! `name`, `brand`, `model`, `price`, `stockQuantity`, and optionally `description`, `imageUrl`
//! and `specifications`.
//!
//! ## Steps
//! 1. With `--replace`, drop every stored device first
//! 2. Collect the brand/model keys already stored, see [`utils::catalog_key`]
//! 3. Validate each entry exactly like the create endpoint does
//! 4. Skip entries whose key is already stored or appeared earlier in the same catalog
//! 5. Store the rest with fresh ids and report counts
//!
//! ## Notes
//! - Rejected entries are reported by their position in the catalog, nothing is stored for them.
//! - Seeding never touches orders, carts or users.
use std::collections::HashSet;

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use shop::devices::{Device, DeviceFields, FieldError};
use storefront::database::{Database, DatabaseError};

pub mod utils;

use utils::catalog_key;

#[derive(Debug, Default)]
pub struct SeedReport {
    pub inserted: usize,
    pub duplicates: usize,
    pub rejected: Vec<(usize, FieldError)>,
}

pub async fn seed_catalog(
    database: &Database,
    entries: Vec<DeviceFields>,
    replace: bool,
) -> Result<SeedReport, DatabaseError> {
    if replace {
        database.clear::<Device>().await?;
    }

    let stored: Vec<Device> = database.all().await?;
    let mut keys: HashSet<String> = stored
        .iter()
        .map(|device| catalog_key(&device.brand, &device.model))
        .collect();

    let pb = ProgressBar::new(entries.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> "),
    );

    let mut report = SeedReport::default();

    for (index, fields) in entries.into_iter().enumerate() {
        pb.inc(1);

        let device = match Device::create(fields, Utc::now()) {
            Ok(device) => device,
            Err(e) => {
                report.rejected.push((index, e));
                continue;
            }
        };

        if !keys.insert(catalog_key(&device.brand, &device.model)) {
            #[cfg(feature = "verbose")]
            pb.println(format!("Duplicate! {} {}", device.brand, device.model));

            report.duplicates += 1;
            continue;
        }

        pb.set_message(device.name.clone());
        database.put(&device).await?;
        report.inserted += 1;
    }

    pb.finish_with_message("Done");

    Ok(report)
}
