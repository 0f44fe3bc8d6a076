//! In-memory [`CampaignStore`] with the same duplicate-skip semantics as the
//! Postgres implementation. Used by the integration tests; also handy for
//! dry-running an upload without a database.

use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::store::{CampaignStore, ClientRef, NewCampaign, NewClient};

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_client_id: i64,
    clients: BTreeMap<String, i64>,
    campaigns: BTreeMap<String, NewCampaign>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a stored campaign by its primary key.
    pub fn campaign(&self, campaign_id: &str) -> Option<NewCampaign> {
        self.inner
            .lock()
            .ok()
            .and_then(|g| g.campaigns.get(campaign_id).cloned())
    }

    /// Look up a client id by name.
    pub fn client_id(&self, name: &str) -> Option<i64> {
        self.inner.lock().ok().and_then(|g| g.clients.get(name).copied())
    }
}

impl Inner {
    fn has_client_id(&self, id: i64) -> bool {
        self.clients.values().any(|&v| v == id)
    }
}

#[async_trait]
impl CampaignStore for MemoryStore {
    async fn insert_clients_skip_duplicates(&self, clients: &[NewClient]) -> Result<()> {
        let mut g = self.inner.lock().map_err(|_| anyhow!("store mutex poisoned"))?;
        for c in clients {
            if !g.clients.contains_key(&c.name) {
                g.next_client_id += 1;
                let id = g.next_client_id;
                g.clients.insert(c.name.clone(), id);
            }
        }
        Ok(())
    }

    async fn clients_by_names(&self, names: &[String]) -> Result<Vec<ClientRef>> {
        let g = self.inner.lock().map_err(|_| anyhow!("store mutex poisoned"))?;
        Ok(names
            .iter()
            .filter_map(|name| {
                g.clients.get(name).map(|&id| ClientRef {
                    id,
                    name: name.clone(),
                })
            })
            .collect())
    }

    async fn insert_campaigns_skip_duplicates(&self, campaigns: &[NewCampaign]) -> Result<()> {
        let mut g = self.inner.lock().map_err(|_| anyhow!("store mutex poisoned"))?;
        for c in campaigns {
            // Enforce the same referential integrity the FK constraint would.
            if !g.has_client_id(c.client_id) {
                return Err(anyhow!(
                    "campaign {} references unknown client id {}",
                    c.campaign_id,
                    c.client_id
                ));
            }
            if !g.campaigns.contains_key(&c.campaign_id) {
                g.campaigns.insert(c.campaign_id.clone(), c.clone());
            }
        }
        Ok(())
    }

    async fn count_clients(&self) -> Result<i64> {
        let g = self.inner.lock().map_err(|_| anyhow!("store mutex poisoned"))?;
        Ok(g.clients.len() as i64)
    }

    async fn count_campaigns(&self) -> Result<i64> {
        let g = self.inner.lock().map_err(|_| anyhow!("store mutex poisoned"))?;
        Ok(g.campaigns.len() as i64)
    }

    async fn count_campaigns_with_client(&self) -> Result<i64> {
        let g = self.inner.lock().map_err(|_| anyhow!("store mutex poisoned"))?;
        Ok(g.campaigns
            .values()
            .filter(|c| g.has_client_id(c.client_id))
            .count() as i64)
    }
}
