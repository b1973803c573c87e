pub mod auth;
pub mod identity;
pub mod pricing;
pub mod storage;
pub mod usage;
pub mod utils;
pub mod web;

use std::{env, str::FromStr, sync::Arc};

use once_cell::sync::Lazy;
use rust_decimal::Decimal;

use auth::Gate;
use identity::IdentityService;
use usage::{Aggregator, Recorder};

pub struct AppContext {
    pub gate: Arc<Gate>,
    pub recorder: Arc<Recorder>,
    pub aggregator: Arc<Aggregator>,
    pub identity: Arc<IdentityService>,
}

const SENTINEL_SQLITE_PATH: &str = "sqlite://./sentinel_data/database/storage.db?mode=rwc";
const SENTINEL_UNIT_RATE: &str = "0.002";
const SENTINEL_SESSION_SECRET: &str = "sentinel-dev-secret";

pub static SQLITE_PATH: Lazy<String> = Lazy::new(|| {
    match env::var("SENTINEL_SQLITE_PATH") {
        Ok(path) => path,
        Err(_) => {
            dotenv::var("SENTINEL_SQLITE_PATH").unwrap_or_else(|_| SENTINEL_SQLITE_PATH.to_string())
        }
    }
});

pub static SESSION_SECRET: Lazy<String> = Lazy::new(|| {
    match env::var("SENTINEL_SESSION_SECRET") {
        Ok(secret) => secret,
        Err(_) => {
            dotenv::var("SENTINEL_SESSION_SECRET")
                .unwrap_or_else(|_| SENTINEL_SESSION_SECRET.to_string())
        }
    }
});

// Flat per-unit rate for the default cost policy. Falls back to the built-in
// rate when the env value does not parse as a decimal.
pub static UNIT_RATE: Lazy<Decimal> = Lazy::new(|| {
    let raw = match env::var("SENTINEL_UNIT_RATE") {
        Ok(rate) => rate,
        Err(_) => {
            dotenv::var("SENTINEL_UNIT_RATE").unwrap_or_else(|_| SENTINEL_UNIT_RATE.to_string())
        }
    };
    Decimal::from_str(&raw)
        .unwrap_or_else(|_| Decimal::from_str(SENTINEL_UNIT_RATE).unwrap_or_default())
});

pub fn init_env() {
    dotenv::dotenv().ok();

    if let Some(db_path) = SQLITE_PATH.strip_prefix("sqlite://") {
        let db_path = db_path.split('?').next().unwrap_or(db_path);
        if let Some(dir) = std::path::Path::new(db_path).parent() {
            std::fs::create_dir_all(dir).unwrap_or_else(|e| {
                eprintln!("Failed to create database directory: {}", e);
            });
        }
    }
}
