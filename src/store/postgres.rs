use anyhow::Result;
use async_trait::async_trait;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions, PgSslMode},
    PgPool, QueryBuilder,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

use crate::store::{CampaignStore, ClientRef, NewCampaign, NewClient};
use crate::util::env as env_util;

#[derive(Clone)]
pub struct Db {
    pub pool: PgPool,
}

impl Db {
    // SECURITY: never include raw DSNs in tracing spans (they may contain credentials).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let use_prepared = env_util::env_flag("USE_PREPARED", false);
        let mut connect_options = PgConnectOptions::from_str(database_url)?;

        // Ensure TLS is enabled when DSN contains sslmode=require
        if database_url.contains("sslmode=require") && !database_url.contains("sslmode=disable") {
            connect_options = connect_options.ssl_mode(PgSslMode::Require);
        }

        if !use_prepared {
            // PgBouncer txn mode safe
            connect_options = connect_options.statement_cache_capacity(0);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect_with(connect_options)
            .await?;
        info!("connected to db");
        Ok(Self { pool })
    }

    /// Create the clients/campaigns tables when absent. Safe to run on every
    /// start; uses raw_sql so it stays prepared-statement-free under PgBouncer.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(
            "CREATE TABLE IF NOT EXISTS clients (
                id BIGSERIAL PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
             )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::raw_sql(
            "CREATE TABLE IF NOT EXISTS campaigns (
                campaign_id TEXT PRIMARY KEY,
                campaign_name TEXT NOT NULL,
                start_date DATE,
                end_date DATE,
                budget NUMERIC NOT NULL DEFAULT 0,
                channel TEXT NOT NULL DEFAULT '',
                impressions BIGINT,
                clicks BIGINT,
                conversions BIGINT,
                revenue_generated NUMERIC,
                target_audience TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT 'Planned',
                client_id BIGINT NOT NULL REFERENCES clients(id),
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
             )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CampaignStore for Db {
    #[instrument(skip(self, clients))]
    async fn insert_clients_skip_duplicates(&self, clients: &[NewClient]) -> Result<()> {
        if clients.is_empty() {
            return Ok(());
        }
        let mut qb: QueryBuilder<'_, sqlx::Postgres> =
            QueryBuilder::new("INSERT INTO clients (name) ");
        qb.push_values(clients, |mut b, c| {
            b.push_bind(&c.name);
        });
        qb.push(" ON CONFLICT (name) DO NOTHING");
        qb.build().persistent(false).execute(&self.pool).await?;
        Ok(())
    }

    async fn clients_by_names(&self, names: &[String]) -> Result<Vec<ClientRef>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT id, name FROM clients WHERE name = ANY($1)")
                .bind(names)
                .persistent(false)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(id, name)| ClientRef { id, name })
            .collect())
    }

    #[instrument(skip(self, campaigns))]
    async fn insert_campaigns_skip_duplicates(&self, campaigns: &[NewCampaign]) -> Result<()> {
        if campaigns.is_empty() {
            return Ok(());
        }
        let mut qb: QueryBuilder<'_, sqlx::Postgres> = QueryBuilder::new(
            "INSERT INTO campaigns (campaign_id, campaign_name, start_date, end_date, budget, \
             channel, impressions, clicks, conversions, revenue_generated, target_audience, \
             status, client_id) ",
        );
        qb.push_values(campaigns, |mut b, c| {
            b.push_bind(&c.campaign_id)
                .push_bind(&c.campaign_name)
                .push_bind(c.start_date)
                .push_bind(c.end_date)
                .push_bind(&c.budget)
                .push_bind(&c.channel)
                .push_bind(c.impressions)
                .push_bind(c.clicks)
                .push_bind(c.conversions)
                .push_bind(c.revenue_generated.as_ref())
                .push_bind(&c.target_audience)
                .push_bind(c.status.as_str())
                .push_bind(c.client_id);
        });
        qb.push(" ON CONFLICT (campaign_id) DO NOTHING");
        qb.build().persistent(false).execute(&self.pool).await?;
        info!("submitted {} campaign rows", campaigns.len());
        Ok(())
    }

    async fn count_clients(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT count(*) FROM clients")
            .persistent(false)
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    async fn count_campaigns(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT count(*) FROM campaigns")
            .persistent(false)
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    async fn count_campaigns_with_client(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar(
            "SELECT count(*) FROM campaigns c JOIN clients cl ON cl.id = c.client_id",
        )
        .persistent(false)
        .fetch_one(&self.pool)
        .await?;
        Ok(n)
    }
}
