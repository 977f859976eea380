use std::{collections::HashMap, sync::Arc, time::Duration};

use reqwest::Client;
use serde_json::Value;
use shared::TechTree;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::CatalogError;

/// Fetches per-platform tech trees and keeps them for the session.
pub struct CatalogClient {
    http: Client,
    api_url: String,
    cache: Mutex<HashMap<String, Arc<TechTree>>>,
}

impl CatalogClient {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self, CatalogError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            cache: Mutex::new(HashMap::new()),
        })
    }

    pub async fn tech_tree(&self, platform: &str) -> Result<Arc<TechTree>, CatalogError> {
        if let Some(tree) = self.cache.lock().await.get(platform) {
            return Ok(Arc::clone(tree));
        }

        let document: Value = self
            .http
            .get(format!("{}/tech_tree/{platform}", self.api_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let (tree, rejected) = TechTree::from_value(document)?;
        for build in &rejected {
            warn!(
                platform = %platform,
                index = build.index,
                diagnostic = %build.error,
                "dropping invalid recommended build"
            );
        }
        info!(
            platform = %platform,
            techs = tree.techs().count(),
            builds = tree.recommended_builds.len(),
            "loaded tech tree"
        );

        let tree = Arc::new(tree);
        self.cache
            .lock()
            .await
            .insert(platform.to_string(), Arc::clone(&tree));
        Ok(tree)
    }

    pub async fn invalidate(&self, platform: &str) {
        self.cache.lock().await.remove(platform);
    }
}
