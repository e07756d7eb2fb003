//! Remote data service: the hosted relational API that is the system of record.
//!
//! The rest of the crate only sees [`RemoteService`]; [`HttpRemote`] speaks the
//! PostgREST dialect over HTTPS.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::config::Config;
use crate::model::{Area, InventoryRecord, PendingInventoryRecord, SignCatalogEntry, Site, ALL_AREAS};
use crate::remote::model::{NewSession, SessionRow, SignDescription};

pub mod model;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),
    #[error("service error {status}: {body}")]
    Service { status: u16, body: String },
    #[error("invalid response: {0}")]
    Decode(String),
    #[error("invalid request: {0}")]
    Request(String),
}

impl RemoteError {
    /// True when the service could not be reached at all.
    pub fn is_network(&self) -> bool {
        matches!(self, RemoteError::Network(_))
    }
}

/// Client-side ordering applied after the catalog is fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogSort {
    #[default]
    SignNumber,
    SignTypeCode,
    Description,
}

#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Catalog for a site, optionally narrowed to signs whose level matches `area_name`.
    async fn fetch_catalog(
        &self,
        site_id: &str,
        area_name: Option<&str>,
        sort: CatalogSort,
    ) -> Result<Vec<SignCatalogEntry>, RemoteError>;

    async fn fetch_sites(&self) -> Result<Vec<Site>, RemoteError>;

    async fn fetch_areas(&self, site_id: &str) -> Result<Vec<Area>, RemoteError>;

    /// Returns the id of the new inventory session.
    async fn create_session(&self, site_id: &str, label: &str) -> Result<String, RemoteError>;

    /// Insert the whole batch or nothing.
    async fn insert_inventory_records(
        &self,
        records: &[PendingInventoryRecord],
    ) -> Result<Vec<InventoryRecord>, RemoteError>;
}

#[derive(Clone)]
pub struct HttpRemote {
    http: Client,
    base_url: Url,
    api_key: String,
    access_token: Option<String>,
}

impl fmt::Debug for HttpRemote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRemote")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpRemote {
    pub fn new(
        base_url: Url,
        api_key: String,
        access_token: Option<String>,
        timeout: Option<Duration>,
    ) -> anyhow::Result<Self> {
        let mut builder = Client::builder().user_agent("sign-inventory-sync/0.1");
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url,
            api_key,
            access_token,
        })
    }

    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let base_url = Url::parse(&cfg.remote.base_url).context("invalid remote.base_url")?;
        Self::new(
            base_url,
            cfg.remote.api_key.clone(),
            cfg.remote.access_token.clone(),
            cfg.remote.request_timeout_secs.map(Duration::from_secs),
        )
    }

    fn endpoint(&self, table: &str) -> Result<Url, RemoteError> {
        self.base_url
            .join(&format!("rest/v1/{table}"))
            .map_err(|err| RemoteError::Request(format!("bad endpoint for {table}: {err}")))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);
        self.http
            .request(method, url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {bearer}"))
    }

    pub fn build_select(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<reqwest::Request, RemoteError> {
        self.request(Method::GET, self.endpoint(table)?)
            .query(query)
            .build()
            .map_err(|err| RemoteError::Request(err.to_string()))
    }

    pub fn build_insert<B: Serialize + ?Sized>(
        &self,
        table: &str,
        body: &B,
    ) -> Result<reqwest::Request, RemoteError> {
        self.request(Method::POST, self.endpoint(table)?)
            .header("Content-Type", "application/json")
            .header("Prefer", "return=representation")
            .json(body)
            .build()
            .map_err(|err| RemoteError::Request(err.to_string()))
    }

    async fn execute<T: DeserializeOwned>(&self, request: reqwest::Request) -> Result<T, RemoteError> {
        debug!(method = %request.method(), url = %request.url(), "remote request");
        let res = self
            .http
            .execute(request)
            .await
            .map_err(RemoteError::Network)?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(%status, %body, "remote service rejected request");
            return Err(RemoteError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let body = res.text().await.map_err(RemoteError::Network)?;
        serde_json::from_str(&body).map_err(|err| RemoteError::Decode(err.to_string()))
    }

    /// Succeeds when the service answers at all, whatever the status.
    pub async fn probe(&self) -> Result<(), RemoteError> {
        let url = self.endpoint("")?;
        self.request(Method::GET, url)
            .send()
            .await
            .map(|_| ())
            .map_err(RemoteError::Network)
    }

    async fn fetch_descriptions(&self) -> Result<Vec<SignDescription>, RemoteError> {
        let request = self.build_select("sign_descriptions", &[("select", "*".to_string())])?;
        self.execute(request).await
    }
}

/// PostgREST query for the catalog of `site_id`, optionally narrowed by level name.
pub fn catalog_query(site_id: &str, area_name: Option<&str>) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("select", "*".to_string()),
        ("site_id", format!("eq.{site_id}")),
    ];
    if let Some(name) = area_name.filter(|n| !n.is_empty() && *n != ALL_AREAS) {
        query.push(("original_csv_level_no", format!("ilike.*{name}*")));
    }
    query.push(("order", "sign_number".to_string()));
    query
}

/// Fill `description` and `sign_type_code` from the description table.
pub fn join_descriptions(entries: &mut [SignCatalogEntry], descriptions: &[SignDescription]) {
    let by_id: HashMap<&str, &SignDescription> =
        descriptions.iter().map(|d| (d.id.as_str(), d)).collect();
    for entry in entries.iter_mut() {
        let found = entry
            .description_id
            .as_deref()
            .and_then(|id| by_id.get(id).copied());
        if entry.description_id.is_some() && found.is_none() {
            debug!(sign = %entry.sign_number, "no description for sign");
        }
        entry.description = Some(
            found
                .and_then(|d| d.description.clone())
                .unwrap_or_default(),
        );
        entry.sign_type_code = Some(
            found
                .and_then(|d| d.sign_type_code.clone())
                .unwrap_or_default(),
        );
    }
}

/// Stable client-side sort of a fetched catalog.
pub fn sort_catalog(entries: &mut [SignCatalogEntry], sort: CatalogSort) {
    match sort {
        CatalogSort::SignNumber => entries.sort_by(|a, b| a.sign_number.cmp(&b.sign_number)),
        CatalogSort::SignTypeCode => entries.sort_by(|a, b| {
            a.sign_type_code
                .as_deref()
                .unwrap_or("")
                .cmp(b.sign_type_code.as_deref().unwrap_or(""))
        }),
        CatalogSort::Description => entries.sort_by(|a, b| {
            a.description
                .as_deref()
                .unwrap_or("")
                .cmp(b.description.as_deref().unwrap_or(""))
        }),
    }
}

#[async_trait]
impl RemoteService for HttpRemote {
    #[instrument(skip_all)]
    async fn fetch_catalog(
        &self,
        site_id: &str,
        area_name: Option<&str>,
        sort: CatalogSort,
    ) -> Result<Vec<SignCatalogEntry>, RemoteError> {
        let request = self.build_select("project_sign_catalog", &catalog_query(site_id, area_name))?;
        let mut entries: Vec<SignCatalogEntry> = self.execute(request).await?;

        // Descriptions are decoration; a failure here still returns the catalog.
        match self.fetch_descriptions().await {
            Ok(descriptions) => join_descriptions(&mut entries, &descriptions),
            Err(err) => warn!(?err, "failed to fetch sign descriptions"),
        }
        sort_catalog(&mut entries, sort);
        Ok(entries)
    }

    #[instrument(skip_all)]
    async fn fetch_sites(&self) -> Result<Vec<Site>, RemoteError> {
        let request = self.build_select(
            "sites",
            &[("select", "*".to_string()), ("order", "name".to_string())],
        )?;
        self.execute(request).await
    }

    #[instrument(skip_all)]
    async fn fetch_areas(&self, site_id: &str) -> Result<Vec<Area>, RemoteError> {
        let request = self.build_select(
            "project_areas",
            &[
                ("select", "*".to_string()),
                ("site_id", format!("eq.{site_id}")),
                ("order", "area_name".to_string()),
            ],
        )?;
        self.execute(request).await
    }

    #[instrument(skip_all)]
    async fn create_session(&self, site_id: &str, label: &str) -> Result<String, RemoteError> {
        let request = self.build_insert(
            "inventory_sessions",
            &NewSession {
                site_id,
                session_name: label,
            },
        )?;
        let rows: Vec<SessionRow> = self.execute(request).await?;
        rows.into_iter()
            .next()
            .map(|row| row.id)
            .ok_or_else(|| RemoteError::Decode("session insert returned no rows".into()))
    }

    #[instrument(skip_all)]
    async fn insert_inventory_records(
        &self,
        records: &[PendingInventoryRecord],
    ) -> Result<Vec<InventoryRecord>, RemoteError> {
        let request = self.build_insert("inventory_log", records)?;
        self.execute(request).await
    }
}
