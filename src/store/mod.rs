//! Store abstraction for the ingestion pipeline.
//!
//! The pipeline receives its store as an explicit dependency rather than a
//! process-wide handle, so it runs unchanged against Postgres in production
//! and an in-memory store in tests.

pub mod memory;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;

use crate::normalization::fields::CampaignStatus;

/// A client row to insert; `name` is the natural key.
#[derive(Debug, Clone)]
pub struct NewClient {
    pub name: String,
}

/// A resolved client: store-assigned id plus the natural key it was looked
/// up by.
#[derive(Debug, Clone)]
pub struct ClientRef {
    pub id: i64,
    pub name: String,
}

/// A campaign row to insert. `campaign_id` is the caller-supplied primary
/// key; `client_id` must reference an existing client.
#[derive(Debug, Clone)]
pub struct NewCampaign {
    pub campaign_id: String,
    pub campaign_name: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub budget: BigDecimal,
    pub channel: String,
    pub impressions: Option<i64>,
    pub clicks: Option<i64>,
    pub conversions: Option<i64>,
    pub revenue_generated: Option<BigDecimal>,
    pub target_audience: String,
    pub status: CampaignStatus,
    pub client_id: i64,
}

/// Relational store surface the ingestion pipeline depends on.
///
/// Both bulk inserts are duplicate-skip on their natural key (client name,
/// campaign id): rows whose key already exists are silently left alone and
/// the call reports no per-row outcome. Implementations must keep that
/// contract — the pipeline's idempotence rests on it. Neither insert returns
/// ids, which is why client resolution re-queries by name afterwards.
#[async_trait]
pub trait CampaignStore: Send + Sync {
    async fn insert_clients_skip_duplicates(&self, clients: &[NewClient]) -> Result<()>;

    /// Fetch id + name for every client whose name is in `names`.
    async fn clients_by_names(&self, names: &[String]) -> Result<Vec<ClientRef>>;

    async fn insert_campaigns_skip_duplicates(&self, campaigns: &[NewCampaign]) -> Result<()>;

    async fn count_clients(&self) -> Result<i64>;

    async fn count_campaigns(&self) -> Result<i64>;

    /// Campaigns whose client_id resolves to an existing client row.
    async fn count_campaigns_with_client(&self) -> Result<i64>;
}
