//! Client for a utility provider's customer portal.
//!
//! Signs in through the provider's multi-hop SSO flow, discovers the
//! customer's electricity meters and fetches daily consumption, pricing each
//! day with a two-block seasonal tariff.

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod fixtures;
pub mod logging;
pub mod models;
pub mod pricing;
pub mod scrape;
pub mod transport;
pub mod usage;

pub use client::{ClientOptions, UtilityClient};
pub use error::AppError;
pub use models::{Account, Bill, Meter, MeterUsage, Rates};
pub use pricing::BlockSchedule;
