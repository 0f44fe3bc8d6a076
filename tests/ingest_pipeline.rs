use std::io::Write as _;
use std::str::FromStr;

use anyhow::{bail, Result};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;

use campaign_ingest::ingest::{process_csv_bytes, process_csv_data};
use campaign_ingest::normalization::fields::CampaignStatus;
use campaign_ingest::store::memory::MemoryStore;
use campaign_ingest::store::{CampaignStore, ClientRef, NewCampaign, NewClient};

const HEADER: &str = "campaign_id,campaign_name,client_name,start_date,end_date,budget,\
channel,impressions,clicks,conversions,revenue_generated,target_audience,status";

/// Store double layered over [`MemoryStore`]: can be told to fail either bulk
/// insert, or to withhold a client from name resolution so the lookup map
/// comes back incomplete.
#[derive(Default)]
struct FaultyStore {
    inner: MemoryStore,
    fail_client_insert: bool,
    fail_campaign_insert: bool,
    withhold_client: Option<String>,
}

#[async_trait]
impl CampaignStore for FaultyStore {
    async fn insert_clients_skip_duplicates(&self, clients: &[NewClient]) -> Result<()> {
        if self.fail_client_insert {
            bail!("connection reset by peer");
        }
        self.inner.insert_clients_skip_duplicates(clients).await
    }

    async fn clients_by_names(&self, names: &[String]) -> Result<Vec<ClientRef>> {
        let mut resolved = self.inner.clients_by_names(names).await?;
        if let Some(withheld) = &self.withhold_client {
            resolved.retain(|c| &c.name != withheld);
        }
        Ok(resolved)
    }

    async fn insert_campaigns_skip_duplicates(&self, campaigns: &[NewCampaign]) -> Result<()> {
        if self.fail_campaign_insert {
            bail!("connection reset by peer");
        }
        self.inner.insert_campaigns_skip_duplicates(campaigns).await
    }

    async fn count_clients(&self) -> Result<i64> {
        self.inner.count_clients().await
    }

    async fn count_campaigns(&self) -> Result<i64> {
        self.inner.count_campaigns().await
    }

    async fn count_campaigns_with_client(&self) -> Result<i64> {
        self.inner.count_campaigns_with_client().await
    }
}

fn csv_with(rows: &[&str]) -> String {
    let mut text = String::from(HEADER);
    for row in rows {
        text.push('\n');
        text.push_str(row);
    }
    text.push('\n');
    text
}

#[tokio::test]
async fn imports_single_row_with_normalized_fields() {
    let store = MemoryStore::new();
    let text = csv_with(&[
        r#"C1,Spring Sale,Acme,2024-01-15,2024-02-15,"$5,000",Google,"10,000",500,25,"2,500.50",18-35,Active"#,
    ]);

    let result = process_csv_data(&store, &text).await;
    assert!(result.success, "unexpected failure: {:?}", result.error);
    assert_eq!(result.clients_count, 1);
    assert_eq!(result.campaigns_count, 1);
    assert_eq!(
        result.message,
        "Successfully imported 1 clients and 1 campaigns"
    );

    let stored = store.campaign("C1").expect("campaign persisted");
    assert_eq!(stored.campaign_name, "Spring Sale");
    assert_eq!(
        stored.start_date,
        Some(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())
    );
    assert_eq!(
        stored.end_date,
        Some(NaiveDate::from_ymd_opt(2024, 2, 15).unwrap())
    );
    assert_eq!(stored.budget, BigDecimal::from_str("5000").unwrap());
    assert_eq!(stored.channel, "Google");
    assert_eq!(stored.impressions, Some(10_000));
    assert_eq!(stored.clicks, Some(500));
    assert_eq!(stored.conversions, Some(25));
    assert_eq!(
        stored.revenue_generated,
        Some(BigDecimal::from_str("2500.50").unwrap())
    );
    assert_eq!(stored.target_audience, "18-35");
    assert_eq!(stored.status, CampaignStatus::Active);
    assert_eq!(Some(stored.client_id), store.client_id("Acme"));
}

#[tokio::test]
async fn row_missing_client_name_is_excluded() {
    let store = MemoryStore::new();
    let text = csv_with(&["C1,Spring Sale,,,,,,,,,,,"]);

    let result = process_csv_data(&store, &text).await;
    assert!(!result.success);
    assert_eq!(result.clients_count, 0);
    assert_eq!(result.campaigns_count, 0);
    assert_eq!(result.message, "No valid records found in CSV");
    assert_eq!(store.count_clients().await.unwrap(), 0);
    assert_eq!(store.count_campaigns().await.unwrap(), 0);
}

#[tokio::test]
async fn shared_client_name_creates_one_client() {
    let store = MemoryStore::new();
    let text = csv_with(&[
        "C1,Spring Sale,Acme,,,,,,,,,,Active",
        "C2,Summer Sale,Acme,,,,,,,,,,Planned",
    ]);

    let result = process_csv_data(&store, &text).await;
    assert!(result.success);
    assert_eq!(result.clients_count, 1);
    assert_eq!(result.campaigns_count, 2);

    let first = store.campaign("C1").expect("C1 persisted");
    let second = store.campaign("C2").expect("C2 persisted");
    assert_eq!(first.client_id, second.client_id);
    assert_eq!(store.count_clients().await.unwrap(), 1);
}

#[tokio::test]
async fn reingesting_the_same_file_is_idempotent() {
    let store = MemoryStore::new();
    let text = csv_with(&[
        "C1,Spring Sale,Acme,2024-01-15,,100,,,,,,,Active",
        "C2,Summer Sale,Initech,,,200,,,,,,,Planned",
    ]);

    let first = process_csv_data(&store, &text).await;
    assert!(first.success);
    assert_eq!(first.clients_count, 2);
    assert_eq!(first.campaigns_count, 2);

    let second = process_csv_data(&store, &text).await;
    assert!(second.success);
    // Counts report the distinct names resolved and the rows submitted, not
    // rows newly inserted; the store itself must not grow.
    assert_eq!(second.clients_count, 2);
    assert_eq!(second.campaigns_count, 2);
    assert_eq!(store.count_clients().await.unwrap(), 2);
    assert_eq!(store.count_campaigns().await.unwrap(), 2);
    assert_eq!(store.count_campaigns_with_client().await.unwrap(), 2);
}

#[tokio::test]
async fn malformed_csv_fails_the_whole_operation() {
    let store = MemoryStore::new();
    // 14 fields on a 13-column header: ragged row, rejected by the parser.
    let text = csv_with(&["C1,Spring Sale,Acme,,,,,,,,,,Active,EXTRA"]);

    let result = process_csv_data(&store, &text).await;
    assert!(!result.success);
    assert_eq!(result.clients_count, 0);
    assert_eq!(result.campaigns_count, 0);
    assert_eq!(result.error.as_deref(), Some("Failed to process CSV file"));
    assert_eq!(store.count_clients().await.unwrap(), 0);
}

#[tokio::test]
async fn empty_input_reports_no_valid_records() {
    let store = MemoryStore::new();
    let result = process_csv_data(&store, "").await;
    assert!(!result.success);
    assert_eq!(result.message, "No valid records found in CSV");
}

#[tokio::test]
async fn day_first_dates_and_field_defaults() {
    let store = MemoryStore::new();
    let text = csv_with(&["C1,Spring Sale,Acme,15/01/2024,31/12/2024,,,N/A,n/a,,,,paused"]);

    let result = process_csv_data(&store, &text).await;
    assert!(result.success);

    let stored = store.campaign("C1").expect("campaign persisted");
    assert_eq!(
        stored.start_date,
        Some(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())
    );
    assert_eq!(
        stored.end_date,
        Some(NaiveDate::from_ymd_opt(2024, 12, 31).unwrap())
    );
    assert_eq!(stored.budget, BigDecimal::from(0));
    assert_eq!(stored.channel, "");
    assert_eq!(stored.impressions, None);
    assert_eq!(stored.clicks, None);
    assert_eq!(stored.conversions, None);
    assert_eq!(stored.revenue_generated, None);
    assert_eq!(stored.target_audience, "");
    assert_eq!(stored.status, CampaignStatus::Planned);
}

#[tokio::test]
async fn client_insert_failure_reports_failed_clients() {
    let store = FaultyStore {
        fail_client_insert: true,
        ..Default::default()
    };
    let text = csv_with(&["C1,Spring Sale,Acme,,,,,,,,,,Active"]);

    let result = process_csv_data(&store, &text).await;
    assert!(!result.success);
    assert_eq!(result.clients_count, 0);
    assert_eq!(result.campaigns_count, 0);
    assert_eq!(result.message, "Failed to create clients");
    assert_eq!(result.error.as_deref(), Some("Failed to create clients"));
    assert_eq!(store.count_clients().await.unwrap(), 0);
    assert_eq!(store.count_campaigns().await.unwrap(), 0);
}

#[tokio::test]
async fn unresolved_client_name_aborts_the_campaign_load() {
    let store = FaultyStore {
        withhold_client: Some("Initech".to_string()),
        ..Default::default()
    };
    let text = csv_with(&[
        "C1,Spring Sale,Acme,,,,,,,,,,Active",
        "C2,Summer Sale,Initech,,,,,,,,,,Planned",
    ]);

    let result = process_csv_data(&store, &text).await;
    assert!(!result.success);
    assert_eq!(result.message, "Failed to create campaigns");
    // Only the resolvable name counts, and no campaign row — not even the
    // resolvable C1 — is submitted once the batch is doomed.
    assert_eq!(result.clients_count, 1);
    assert_eq!(result.campaigns_count, 0);
    assert_eq!(store.count_campaigns().await.unwrap(), 0);
}

#[tokio::test]
async fn campaign_insert_failure_keeps_established_clients_count() {
    let store = FaultyStore {
        fail_campaign_insert: true,
        ..Default::default()
    };
    let text = csv_with(&[
        "C1,Spring Sale,Acme,,,,,,,,,,Active",
        "C2,Summer Sale,Initech,,,,,,,,,,Planned",
    ]);

    let result = process_csv_data(&store, &text).await;
    assert!(!result.success);
    assert_eq!(result.clients_count, 2);
    assert_eq!(result.campaigns_count, 0);
    assert_eq!(result.message, "Failed to create campaigns");
    // The two bulk writes share no transaction: clients created in phase one
    // stay persisted when phase two fails.
    assert_eq!(store.count_clients().await.unwrap(), 2);
    assert_eq!(store.count_campaigns().await.unwrap(), 0);
}

#[tokio::test]
async fn upload_bytes_roundtrip_through_a_temp_file() {
    let store = MemoryStore::new();
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    write!(file, "{}", csv_with(&["C1,Spring Sale,Acme,,,,,,,,,,Active"])).expect("write csv");

    let bytes = std::fs::read(file.path()).expect("read csv");
    let result = process_csv_bytes(&store, &bytes).await;
    assert!(result.success);
    assert_eq!(result.clients_count, 1);
    assert_eq!(result.campaigns_count, 1);
}

#[tokio::test]
async fn invalid_utf8_upload_fails_generically() {
    let store = MemoryStore::new();
    let result = process_csv_bytes(&store, &[0xff, 0xfe, 0x00, 0x41]).await;
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Failed to process CSV file"));
    assert_eq!(store.count_clients().await.unwrap(), 0);
}
