// Edge Engine — HTTP Backend
// `EdgeBackend` over the edge REST API. JSON bodies, camelCase fields.
//
//   POST /api/edge/devices/register        → [EdgeModel]
//   POST /api/edge/sync                    {deviceId, operation}
//   POST /api/edge/inference               {modelType, inputData, deviceId}
//   PUT  /api/edge/cache                   {contentType, contentId, content, options}
//   GET  /api/edge/cache/{type}/{id}?deviceId=…
//   POST /api/edge/analytics               {deviceId, sessionId, events}
//   PUT  /api/edge/devices/{id}/state      {isOnline, lastActivity, networkInfo}
//   POST /api/edge/final                   FinalTransmission (shutdown, not awaited)

use crate::atoms::error::{EdgeError, EdgeResult};
use crate::atoms::traits::EdgeBackend;
use crate::atoms::types::*;
use crate::engine::config::EdgeConfig;
use crate::engine::http::{pinned_client, CircuitBreaker};
use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

pub struct HttpBackend {
    client: Client,
    base_url: String,
    breaker: Arc<CircuitBreaker>,
    final_timeout: Duration,
}

impl HttpBackend {
    pub fn new(config: &EdgeConfig) -> EdgeResult<Self> {
        let client = pinned_client(
            Duration::from_millis(config.network.connect_timeout_ms),
            config.request_timeout(),
        )?;
        Ok(HttpBackend {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            breaker: Arc::new(CircuitBreaker::new(
                config.network.breaker_threshold,
                config.network.breaker_cooldown_secs,
            )),
            final_timeout: Duration::from_millis(config.network.final_transmission_timeout_ms),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send through the breaker; non-2xx becomes `EdgeError::Remote`.
    async fn send(&self, path: &str, request: RequestBuilder) -> EdgeResult<reqwest::Response> {
        self.breaker.check()?;
        match request.send().await {
            Ok(resp) if resp.status().is_success() || resp.status() == StatusCode::NOT_FOUND => {
                self.breaker.record_success();
                Ok(resp)
            }
            Ok(resp) => {
                // 4xx other than 404 means the server is reachable; only 5xx
                // and transport errors count against the breaker.
                if resp.status().is_server_error() {
                    self.breaker.record_failure();
                } else {
                    self.breaker.record_success();
                }
                Err(EdgeError::remote(path, resp.status().as_u16()))
            }
            Err(e) => {
                self.breaker.record_failure();
                Err(e.into())
            }
        }
    }

    async fn send_json<B: serde::Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> EdgeResult<reqwest::Response> {
        let req = self.client.request(method, self.url(path)).json(body);
        let resp = self.send(path, req).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(EdgeError::remote(path, 404));
        }
        Ok(resp)
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> EdgeResult<T> {
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl EdgeBackend for HttpBackend {
    async fn register_device(&self, registration: &DeviceRegistration) -> EdgeResult<Vec<EdgeModel>> {
        let path = "/api/edge/devices/register";
        let resp = self.send_json(Method::POST, path, registration).await?;
        let body: Value = Self::decode(resp).await?;
        // Accept either a bare list or {"models": [...]}.
        let models = match body.get("models") {
            Some(list) => serde_json::from_value(list.clone())?,
            None => serde_json::from_value(body)?,
        };
        Ok(models)
    }

    async fn submit_operation(&self, device_id: &str, op: &SyncOperation) -> EdgeResult<()> {
        let body = json!({ "deviceId": device_id, "operation": op });
        self.send_json(Method::POST, "/api/edge/sync", &body).await?;
        debug!("[http] Sync ack for {} ({})", op.id, op.entity_type);
        Ok(())
    }

    async fn infer(&self, request: &RemoteInferenceRequest) -> EdgeResult<RemoteInferenceResponse> {
        let resp = self.send_json(Method::POST, "/api/edge/inference", request).await?;
        Self::decode(resp).await
    }

    async fn put_content(&self, entry: &CacheEntry) -> EdgeResult<()> {
        let body = json!({
            "contentType": entry.key.content_type,
            "contentId": entry.key.content_id,
            "content": entry.payload,
            "options": {
                "priority": entry.priority,
                "expiresAt": entry.expires_at,
            },
        });
        self.send_json(Method::PUT, "/api/edge/cache", &body).await?;
        Ok(())
    }

    async fn get_content(&self, key: &CacheKey, device_id: &str) -> EdgeResult<Option<RemoteContent>> {
        let path = format!(
            "/api/edge/cache/{}/{}",
            urlencoding::encode(&key.content_type),
            urlencoding::encode(&key.content_id)
        );
        let req = self
            .client
            .get(self.url(&path))
            .query(&[("deviceId", device_id)]);
        let resp = self.send(&path, req).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(Self::decode(resp).await?))
    }

    async fn send_analytics(&self, batch: &AnalyticsBatch) -> EdgeResult<()> {
        self.send_json(Method::POST, "/api/edge/analytics", batch).await?;
        Ok(())
    }

    async fn update_status(&self, device_id: &str, status: &DeviceStatus) -> EdgeResult<()> {
        let path = format!("/api/edge/devices/{}/state", urlencoding::encode(device_id));
        self.send_json(Method::PUT, &path, status).await?;
        Ok(())
    }

    fn dispatch_final(&self, payload: FinalTransmission) {
        if payload.is_empty() {
            return;
        }
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(h) => h,
            Err(_) => {
                warn!(
                    "[http] No runtime at shutdown — dropping final transmission ({} ops, {} events)",
                    payload.operations.len(),
                    payload.events.len()
                );
                return;
            }
        };

        info!(
            "[http] Final transmission: {} ops, {} events (not awaited)",
            payload.operations.len(),
            payload.events.len()
        );
        let request = self
            .client
            .post(self.url("/api/edge/final"))
            .timeout(self.final_timeout)
            .json(&payload);
        // Detached: the process may exit before this completes.
        handle.spawn(async move {
            if let Err(e) = request.send().await {
                debug!("[http] Final transmission not delivered: {}", e);
            }
        });
    }
}
