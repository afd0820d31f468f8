//! JSON-RPC 1.1 clients for the host services.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::{
    CirclePlotRequest, CirclePlotService, FileStore, ObjectInfo, ObjectStore, ReportInfo,
    ReportRequest, ReportService, SaveRequest, StoredObject,
};

/// Environment variable holding the host auth token.
pub const TOKEN_VAR: &str = "KB_AUTH_TOKEN";

/// A JSON-RPC endpoint. Methods are addressed as `Module.method`.
pub struct RpcClient {
    url: String,
    token: Option<String>,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(url: &str, token: Option<String>) -> Self {
        Self {
            url: url.to_string(),
            token,
            next_id: AtomicU64::new(1),
        }
    }

    /// Client authenticated with the token from the environment, if set.
    pub fn from_env(url: &str) -> Self {
        Self::new(url, std::env::var(TOKEN_VAR).ok().filter(|t| !t.is_empty()))
    }

    /// Calls `method` with a single parameter object and returns the first result.
    pub fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "version": "1.1",
            "id": id.to_string(),
            "method": method,
            "params": [params],
        });

        let mut request = ureq::post(&self.url)
            .config()
            .http_status_as_error(false)
            .build();
        if let Some(token) = &self.token {
            request = request.header("Authorization", token);
        }
        let mut response = request
            .send_json(&body)
            .with_context(|| format!("HTTP request failed for {method} at {}", self.url))?;
        let status = response.status();
        let reply: Value = response
            .body_mut()
            .read_json()
            .with_context(|| format!("invalid JSON-RPC response from {method} (HTTP {status})"))?;

        if let Some(error) = reply.get("error").filter(|e| !e.is_null()) {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            bail!("{method} failed: {message}");
        }
        let first = reply
            .get("result")
            .and_then(|r| r.get(0))
            .cloned()
            .ok_or_else(|| anyhow!("{method} returned no result (HTTP {status})"))?;
        serde_json::from_value(first).with_context(|| format!("unexpected result from {method}"))
    }
}

/// The object store, reached through the workspace service.
pub struct WorkspaceClient {
    rpc: RpcClient,
}

impl WorkspaceClient {
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }
}

#[derive(Deserialize)]
struct ObjectsReply {
    data: Vec<StoredObject>,
}

impl ObjectStore for WorkspaceClient {
    fn get_object(&self, reference: &str) -> Result<StoredObject> {
        let reply: ObjectsReply = self
            .rpc
            .call("Workspace.get_objects2", json!({ "objects": [{ "ref": reference }] }))
            .with_context(|| format!("failed to fetch object {reference}"))?;
        reply
            .data
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("object {reference} not found"))
    }

    fn save_object(&self, request: &SaveRequest) -> Result<ObjectInfo> {
        let infos: Vec<ObjectInfo> = self
            .rpc
            .call(
                "Workspace.save_objects",
                json!({
                    "workspace": request.workspace,
                    "objects": [{
                        "type": request.object_type,
                        "name": request.name,
                        "data": request.data,
                        "provenance": request.provenance,
                    }],
                }),
            )
            .with_context(|| format!("failed to save object {}", request.name))?;
        infos
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("saving {} returned no object info", request.name))
    }
}

/// File, report and plotting services behind the callback endpoint.
pub struct CallbackClient {
    rpc: RpcClient,
}

impl CallbackClient {
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }
}

#[derive(Deserialize)]
struct UploadReply {
    shock_id: String,
}

#[derive(Deserialize)]
struct CirclePlotReply {
    report_ref: String,
}

impl FileStore for CallbackClient {
    fn upload_archive(&self, dir: &Path) -> Result<String> {
        let reply: UploadReply = self.rpc.call(
            "DataFileUtil.file_to_shock",
            json!({ "file_path": dir.display().to_string(), "make_handle": 0, "pack": "zip" }),
        )?;
        Ok(reply.shock_id)
    }
}

impl ReportService for CallbackClient {
    fn create_report(&self, request: &ReportRequest) -> Result<ReportInfo> {
        self.rpc
            .call("KBaseReport.create_extended_report", serde_json::to_value(request)?)
    }
}

impl CirclePlotService for CallbackClient {
    fn circle_plot(&self, request: &CirclePlotRequest) -> Result<String> {
        let reply: CirclePlotReply = self
            .rpc
            .call("kb_phylogenomics.view_pan_circle_plot", serde_json::to_value(request)?)?;
        Ok(reply.report_ref)
    }
}
