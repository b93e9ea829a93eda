//! Database admin endpoint for the cluster's own server counts.
//!
//! The database exposes the number of coordinators and DB servers its
//! web UI lets users pick under `/_admin/cluster/numberOfServers`. A
//! `null` count means the UI may not change that group.

use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE, HOST, USER_AGENT};
use http::{Method, Request};
use http_body_util::{BodyExt, Full};
use serde::{Deserialize, Serialize};
use tracing::debug;

use tessera_core::Timeout;

use crate::error::{AdminError, AdminResult};

pub const NUMBER_OF_SERVERS_PATH: &str = "/_admin/cluster/numberOfServers";

/// Server counts as reported by, or pushed to, the cluster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberOfServers {
    #[serde(rename = "numberOfCoordinators", default)]
    pub coordinators: Option<u32>,
    #[serde(rename = "numberOfDBServers", default)]
    pub dbservers: Option<u32>,
}

impl NumberOfServers {
    pub fn new(coordinators: Option<u32>, dbservers: Option<u32>) -> Self {
        Self {
            coordinators,
            dbservers,
        }
    }
}

#[async_trait]
pub trait ClusterAdmin: Send + Sync {
    async fn get_number_of_servers(&self) -> AdminResult<NumberOfServers>;

    async fn set_number_of_servers(
        &self,
        coordinators: Option<u32>,
        dbservers: Option<u32>,
    ) -> AdminResult<()>;
}

// ── HTTP client ────────────────────────────────────────────────────

/// Admin client speaking HTTP/1 to one coordinator.
#[derive(Debug, Clone)]
pub struct HttpClusterAdmin {
    /// `host:port` of the coordinator.
    addr: String,
    token: Option<String>,
    timeout: Timeout,
}

impl HttpClusterAdmin {
    pub fn new(addr: impl Into<String>, timeout: Timeout) -> Self {
        Self {
            addr: addr.into(),
            token: None,
            timeout,
        }
    }

    /// Authenticate with a bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    async fn request(&self, method: Method, body: Vec<u8>) -> AdminResult<Bytes> {
        self.timeout.run(self.send(method, body)).await?
    }

    async fn send(&self, method: Method, body: Vec<u8>) -> AdminResult<Bytes> {
        let stream = tokio::net::TcpStream::connect(&self.addr)
            .await
            .map_err(|e| AdminError::Connect {
                addr: self.addr.clone(),
                reason: e.to_string(),
            })?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| AdminError::Http(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "admin connection closed");
            }
        });

        let mut builder = Request::builder()
            .method(method)
            .uri(NUMBER_OF_SERVERS_PATH)
            .header(HOST, &self.addr)
            .header(USER_AGENT, "tessera-operator/0.1")
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = &self.token {
            builder = builder.header(AUTHORIZATION, format!("bearer {token}"));
        }
        let req = builder
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| AdminError::Http(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| AdminError::Http(e.to_string()))?;
        let status = resp.status();
        let bytes = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| AdminError::Http(e.to_string()))?
            .to_bytes();

        if !status.is_success() {
            return Err(AdminError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        Ok(bytes)
    }
}

#[async_trait]
impl ClusterAdmin for HttpClusterAdmin {
    async fn get_number_of_servers(&self) -> AdminResult<NumberOfServers> {
        let bytes = self.request(Method::GET, Vec::new()).await?;
        serde_json::from_slice(&bytes).map_err(|e| AdminError::Decode(e.to_string()))
    }

    async fn set_number_of_servers(
        &self,
        coordinators: Option<u32>,
        dbservers: Option<u32>,
    ) -> AdminResult<()> {
        let body = serde_json::to_vec(&NumberOfServers::new(coordinators, dbservers))
            .map_err(|e| AdminError::Decode(e.to_string()))?;
        self.request(Method::PUT, body).await?;
        Ok(())
    }
}

// ── In-memory admin ────────────────────────────────────────────────

#[derive(Debug, Default)]
struct MemoryAdminState {
    live: NumberOfServers,
    puts: Vec<NumberOfServers>,
    failing: bool,
}

/// Cluster admin held in memory; the cluster "UI" is [`MemoryAdmin::set_live`].
#[derive(Debug, Default)]
pub struct MemoryAdmin {
    state: Mutex<MemoryAdminState>,
}

impl MemoryAdmin {
    pub fn new(live: NumberOfServers) -> Self {
        Self {
            state: Mutex::new(MemoryAdminState {
                live,
                ..Default::default()
            }),
        }
    }

    /// Change the counts as a user of the database UI would.
    pub fn set_live(&self, live: NumberOfServers) {
        if let Ok(mut s) = self.state.lock() {
            s.live = live;
        }
    }

    pub fn live(&self) -> NumberOfServers {
        self.state.lock().map(|s| s.live).unwrap_or_default()
    }

    /// Every count pushed so far, oldest first.
    pub fn puts(&self) -> Vec<NumberOfServers> {
        self.state.lock().map(|s| s.puts.clone()).unwrap_or_default()
    }

    /// Make every call fail until reset.
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut s) = self.state.lock() {
            s.failing = failing;
        }
    }

    fn check(&self) -> AdminResult<()> {
        match self.state.lock() {
            Ok(s) if s.failing => Err(AdminError::Connect {
                addr: "memory".to_string(),
                reason: "unavailable".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ClusterAdmin for MemoryAdmin {
    async fn get_number_of_servers(&self) -> AdminResult<NumberOfServers> {
        self.check()?;
        Ok(self.live())
    }

    async fn set_number_of_servers(
        &self,
        coordinators: Option<u32>,
        dbservers: Option<u32>,
    ) -> AdminResult<()> {
        self.check()?;
        if let Ok(mut s) = self.state.lock() {
            let pushed = NumberOfServers::new(coordinators, dbservers);
            s.puts.push(pushed);
            s.live = pushed;
        }
        Ok(())
    }
}
