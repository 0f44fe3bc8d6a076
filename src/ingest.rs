//! CSV ingestion pipeline: uploaded campaign spreadsheets in, client and
//! campaign rows out.
//!
//! The pipeline runs two sequential bulk writes (clients, then campaigns)
//! with no spanning transaction. Both writes are duplicate-skip on a natural
//! key, so re-running the same file after a partial failure converges
//! instead of erroring or double-counting. Every failure is converted into an
//! [`IngestionResult`] here; nothing escapes the public entry points as a raw
//! error.

use std::collections::{BTreeSet, HashMap};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::normalization::fields::{
    parse_budget, parse_count, parse_date, parse_decimal, CampaignStatus,
};
use crate::store::{CampaignStore, NewCampaign, NewClient};

const MSG_NO_VALID_RECORDS: &str = "No valid records found in CSV";
const MSG_CLIENTS_FAILED: &str = "Failed to create clients";
const MSG_CAMPAIGNS_FAILED: &str = "Failed to create campaigns";
const MSG_GENERIC_FAILURE: &str = "Failed to process CSV file";

/// One raw CSV row, keyed by header name. Everything arrives as text; the
/// normalization layer owns turning it into typed values.
#[derive(Debug, Clone, Deserialize)]
pub struct CsvRecord {
    pub campaign_id: String,
    pub campaign_name: String,
    pub client_name: String,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
    #[serde(default)]
    pub budget: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub impressions: String,
    #[serde(default)]
    pub clicks: String,
    #[serde(default)]
    pub conversions: String,
    #[serde(default)]
    pub revenue_generated: String,
    #[serde(default)]
    pub target_audience: String,
    #[serde(default)]
    pub status: String,
}

impl CsvRecord {
    /// A row is worth processing iff all three identifying fields are present.
    fn is_valid(&self) -> bool {
        !self.campaign_id.is_empty()
            && !self.campaign_name.is_empty()
            && !self.client_name.is_empty()
    }
}

/// Outcome summary of one ingestion call. Serializes to the JSON shape the
/// upload surface expects; `error` appears only on failure.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionResult {
    pub success: bool,
    #[serde(rename = "clientsCount")]
    pub clients_count: u64,
    #[serde(rename = "campaignsCount")]
    pub campaigns_count: u64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IngestionResult {
    fn imported(clients_count: u64, campaigns_count: u64) -> Self {
        Self {
            success: true,
            clients_count,
            campaigns_count,
            message: format!(
                "Successfully imported {clients_count} clients and {campaigns_count} campaigns"
            ),
            error: None,
        }
    }

    fn failed(message: &str, clients_count: u64) -> Self {
        Self {
            success: false,
            clients_count,
            campaigns_count: 0,
            message: message.to_string(),
            error: Some(message.to_string()),
        }
    }
}

/// Upload adapter: decode file bytes as UTF-8 and run the pipeline.
pub async fn process_csv_bytes(store: &dyn CampaignStore, bytes: &[u8]) -> IngestionResult {
    match std::str::from_utf8(bytes) {
        Ok(text) => process_csv_data(store, text).await,
        Err(e) => {
            error!(error = %e, "uploaded file is not valid UTF-8");
            IngestionResult::failed(MSG_GENERIC_FAILURE, 0)
        }
    }
}

/// Run the full pipeline over raw CSV text against the given store.
///
/// Client creation and campaign creation are two independent duplicate-skip
/// bulk writes with no spanning transaction: a failure in the second phase
/// leaves already-created clients persisted. Re-running the same file is safe
/// and converges.
pub async fn process_csv_data(store: &dyn CampaignStore, csv_text: &str) -> IngestionResult {
    match run_pipeline(store, csv_text).await {
        Ok(result) => result,
        Err(e) => {
            error!(error = %e, "csv processing failed");
            IngestionResult::failed(MSG_GENERIC_FAILURE, 0)
        }
    }
}

async fn run_pipeline(store: &dyn CampaignStore, csv_text: &str) -> Result<IngestionResult> {
    let records = parse_records(csv_text)?;
    let valid: Vec<CsvRecord> = records.into_iter().filter(CsvRecord::is_valid).collect();
    if valid.is_empty() {
        return Ok(IngestionResult::failed(MSG_NO_VALID_RECORDS, 0));
    }
    info!(rows = valid.len(), "parsed valid csv rows");

    // Phase 1: upsert the distinct client set, then re-query to learn ids.
    // The bulk insert reports no ids (neither for inserted nor skipped rows),
    // so the follow-up query is what builds the name -> id map.
    let names: Vec<String> = valid
        .iter()
        .map(|r| r.client_name.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let new_clients: Vec<NewClient> = names
        .iter()
        .map(|name| NewClient { name: name.clone() })
        .collect();

    let client_map: HashMap<String, i64> =
        match resolve_clients(store, &new_clients, &names).await {
            Ok(map) => map,
            Err(e) => {
                error!(error = %e, "client upsert failed");
                return Ok(IngestionResult::failed(MSG_CLIENTS_FAILED, 0));
            }
        };
    let clients_count = client_map.len() as u64;
    if client_map.len() < names.len() {
        warn!(
            resolved = client_map.len(),
            distinct = names.len(),
            "some client names did not resolve after upsert"
        );
    }

    // Phase 2: build one campaign per valid row and bulk-insert. A name that
    // fails to resolve would mean a dangling client reference; fail the batch
    // rather than submit it.
    let mut campaigns: Vec<NewCampaign> = Vec::with_capacity(valid.len());
    for rec in &valid {
        let Some(&client_id) = client_map.get(&rec.client_name) else {
            error!(
                client = %rec.client_name,
                campaign = %rec.campaign_id,
                "client missing from lookup after upsert; aborting campaign load"
            );
            return Ok(IngestionResult::failed(MSG_CAMPAIGNS_FAILED, clients_count));
        };
        campaigns.push(build_campaign(rec, client_id));
    }

    if let Err(e) = store.insert_campaigns_skip_duplicates(&campaigns).await {
        error!(error = %e, "campaign bulk insert failed");
        return Ok(IngestionResult::failed(MSG_CAMPAIGNS_FAILED, clients_count));
    }
    // Submitted count, not newly-inserted count: the duplicate-skip insert
    // reports no per-row outcome.
    let campaigns_count = campaigns.len() as u64;

    info!(clients = clients_count, campaigns = campaigns_count, "ingestion complete");
    Ok(IngestionResult::imported(clients_count, campaigns_count))
}

fn parse_records(csv_text: &str) -> Result<Vec<CsvRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .trim(csv::Trim::All)
        .from_reader(csv_text.as_bytes());
    let mut records = Vec::new();
    for record in rdr.deserialize::<CsvRecord>() {
        records.push(record?);
    }
    Ok(records)
}

async fn resolve_clients(
    store: &dyn CampaignStore,
    new_clients: &[NewClient],
    names: &[String],
) -> Result<HashMap<String, i64>> {
    store.insert_clients_skip_duplicates(new_clients).await?;
    let resolved = store.clients_by_names(names).await?;
    Ok(resolved.into_iter().map(|c| (c.name, c.id)).collect())
}

fn build_campaign(rec: &CsvRecord, client_id: i64) -> NewCampaign {
    NewCampaign {
        campaign_id: rec.campaign_id.clone(),
        campaign_name: rec.campaign_name.clone(),
        start_date: parse_date(&rec.start_date),
        end_date: parse_date(&rec.end_date),
        budget: parse_budget(&rec.budget),
        channel: rec.channel.clone(),
        impressions: parse_count(&rec.impressions),
        clicks: parse_count(&rec.clicks),
        conversions: parse_count(&rec.conversions),
        revenue_generated: parse_decimal(&rec.revenue_generated),
        target_audience: rec.target_audience.clone(),
        status: CampaignStatus::from_raw(&rec.status),
        client_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "campaign_id,campaign_name,client_name,start_date,end_date,budget,\
channel,impressions,clicks,conversions,revenue_generated,target_audience,status";

    #[test]
    fn ragged_rows_fail_parsing() {
        let text = format!("{HEADER}\nC1,Spring Sale,Acme,,,,,,,,,,Active,EXTRA\n");
        assert!(parse_records(&text).is_err());
    }

    #[test]
    fn empty_lines_are_skipped() {
        let text = format!("{HEADER}\n\nC1,Spring Sale,Acme,,,,,,,,,,\n\n");
        let records = parse_records(&text).expect("parse");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].campaign_id, "C1");
    }

    #[test]
    fn validity_requires_all_three_identifiers() {
        let text = format!(
            "{HEADER}\nC1,Spring Sale,,,,,,,,,,,\n,Spring Sale,Acme,,,,,,,,,,\nC2,Summer,Acme,,,,,,,,,,\n"
        );
        let records = parse_records(&text).expect("parse");
        let valid: Vec<_> = records.iter().filter(|r| r.is_valid()).collect();
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].campaign_id, "C2");
    }

    #[test]
    fn result_serializes_with_camel_case_counts() {
        let ok = IngestionResult::imported(2, 5);
        let v = serde_json::to_value(&ok).expect("serialize");
        assert_eq!(v["clientsCount"], 2);
        assert_eq!(v["campaignsCount"], 5);
        assert_eq!(
            v["message"],
            "Successfully imported 2 clients and 5 campaigns"
        );
        assert!(v.get("error").is_none());

        let failed = IngestionResult::failed(MSG_CLIENTS_FAILED, 0);
        let v = serde_json::to_value(&failed).expect("serialize");
        assert_eq!(v["success"], false);
        assert_eq!(v["error"], MSG_CLIENTS_FAILED);
    }
}
