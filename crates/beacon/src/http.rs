//! HTTP/JSON implementation of [`BeaconNode`].
use std::time::Duration;

use async_stream::try_stream;
use async_trait::async_trait;
use derive_more::Debug;
use eyre::{Result, WrapErr, bail};
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::{
    node::{BeaconNode, HeadStream, QueryFilter},
    wire::{
        AssignmentsPage, BalancesPage, BlocksPage, ChainHeadFrame, ChainHeadResponse, DataResponse,
        GenesisResponse, ParticipationResponse, StateBalance, StateSyncCommittee, StateValidator,
        ValidatorQueueResponse,
    },
};

/// Fixed timeout of every non-streaming request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const ALPHA: &str = "eth/v1alpha1";

/// Beacon node reachable over its JSON gateway and standard REST API.
#[derive(Debug, Clone)]
pub struct HttpBeaconNode {
    #[debug(skip)]
    client: Client,
    base: Url,
}

impl HttpBeaconNode {
    /// Create a client for the node at `base`.
    pub fn new(mut base: Url) -> Result<Self> {
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client =
            Client::builder().build().wrap_err("failed to build consensus HTTP client")?;
        Ok(Self { client, base })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base.join(path).wrap_err_with(|| format!("invalid consensus API path {path}"))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = self.url(path)?;
        let response = self
            .client
            .get(url.clone())
            .query(query)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .wrap_err_with(|| format!("request to {url} failed"))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            bail!("not found 404");
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("url: {url}, error-response: {body}");
        }
        debug!(%url, "Consensus API request succeeded");
        response.json().await.wrap_err_with(|| format!("error parsing response of {url}"))
    }

    async fn get_page<T: DeserializeOwned>(
        &self,
        path: &str,
        filter: QueryFilter,
        page_size: u32,
        page_token: &str,
    ) -> Result<T> {
        let (key, value) = filter.query_param();
        let mut query = vec![(key, value), ("page_size", page_size.to_string())];
        if !page_token.is_empty() {
            query.push(("page_token", page_token.to_owned()));
        }
        self.get(path, &query).await
    }
}

#[async_trait]
impl BeaconNode for HttpBeaconNode {
    async fn genesis(&self) -> Result<GenesisResponse> {
        self.get(&format!("{ALPHA}/node/genesis"), &[]).await
    }

    async fn chain_head(&self) -> Result<ChainHeadResponse> {
        self.get(&format!("{ALPHA}/beacon/chainhead"), &[]).await
    }

    async fn stream_chain_head(&self) -> Result<HeadStream> {
        let url = self.url(&format!("{ALPHA}/beacon/chainhead/stream"))?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .wrap_err_with(|| format!("error opening chain head stream at {url}"))?;

        let mut chunks = Box::pin(response.bytes_stream());
        let stream = try_stream! {
            let mut buf: Vec<u8> = Vec::new();
            while let Some(chunk) = chunks.next().await {
                buf.extend_from_slice(&chunk?);
                while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buf.drain(..=pos).collect();
                    let line = line.trim_ascii();
                    if line.is_empty() {
                        continue;
                    }
                    let frame: ChainHeadFrame = serde_json::from_slice(line)?;
                    if let Some(head) = frame.into_result()? {
                        yield head;
                    }
                }
            }
        };
        let stream: HeadStream = stream.boxed();
        Ok(stream)
    }

    async fn validator_queue(&self) -> Result<ValidatorQueueResponse> {
        self.get(&format!("{ALPHA}/validators/queue"), &[]).await
    }

    async fn list_assignments(
        &self,
        filter: QueryFilter,
        page_size: u32,
        page_token: &str,
    ) -> Result<AssignmentsPage> {
        self.get_page(&format!("{ALPHA}/validators/assignments"), filter, page_size, page_token)
            .await
    }

    async fn list_blocks(
        &self,
        filter: QueryFilter,
        page_size: u32,
        page_token: &str,
    ) -> Result<BlocksPage> {
        self.get_page(&format!("{ALPHA}/beacon/blocks"), filter, page_size, page_token).await
    }

    async fn list_balances(
        &self,
        filter: QueryFilter,
        page_size: u32,
        page_token: &str,
    ) -> Result<BalancesPage> {
        self.get_page(&format!("{ALPHA}/validators/balances"), filter, page_size, page_token)
            .await
    }

    async fn participation(&self, filter: QueryFilter) -> Result<ParticipationResponse> {
        self.get(&format!("{ALPHA}/validators/participation"), &[filter.query_param()]).await
    }

    async fn state_validators(&self, state_id: &str) -> Result<Vec<StateValidator>> {
        let resp: DataResponse<Vec<StateValidator>> =
            self.get(&format!("eth/v1/beacon/states/{state_id}/validators"), &[]).await?;
        Ok(resp.data)
    }

    async fn state_balances(&self, state_id: &str) -> Result<Vec<StateBalance>> {
        let resp: DataResponse<Vec<StateBalance>> =
            self.get(&format!("eth/v1/beacon/states/{state_id}/validator_balances"), &[]).await?;
        Ok(resp.data)
    }

    async fn sync_committee(&self, state_id: &str, epoch: u64) -> Result<StateSyncCommittee> {
        let resp: DataResponse<StateSyncCommittee> = self
            .get(
                &format!("eth/v1/beacon/states/{state_id}/sync_committees"),
                &[("epoch", epoch.to_string())],
            )
            .await
            .wrap_err_with(|| {
                format!("error retrieving sync_committees for epoch {epoch} (state: {state_id})")
            })?;
        Ok(resp.data)
    }
}
