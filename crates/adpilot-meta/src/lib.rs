//! Client for the Meta Marketing API.
//!
//! Fetches campaign, ad set, and ad collections and their insights, applies
//! status and budget mutations, and tracks quota usage per ad account.

pub mod client;
pub mod error;
pub mod filter;
pub mod pagination;
pub mod time_range;
pub mod types;
pub mod usage;

pub use client::{ClientSettings, MetaClient, INSIGHTS_BATCH_SIZE};
pub use error::MetaError;
pub use filter::ObjectFilter;
pub use time_range::DateRange;
pub use types::{ActionEntry, AdObject, Credentials, Insight};
pub use usage::{CallKind, UsageLevel, UsageSnapshot, UsageTracker, UsageTrend};
