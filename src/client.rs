//! WM server client: request building, caching and invalidation.

use parking_lot::{Mutex, RwLock};
use reqwest::header::HeaderMap;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::cache::{BoundedCache, DEVICE_DEFAULT_CACHE_SIZE, header_cache_key};
use crate::capabilities::{CapabilityRegistry, RequestedCapabilities, RequestedUpdate};
use crate::config::ClientConfig;
use crate::error::{Result, WmError};
use crate::invalidation::{LoadTimeToken, LoadTimeTracker};
use crate::model::{DeviceData, DeviceOsVersion, InfoData, LookupRequest, MakeModel, ModelMarketingName};
use crate::tables::{AuxIndex, AuxTable};
use crate::transport::{
    CLIENT_API_VERSION, DEFAULT_CONNECT_TIMEOUT, DEFAULT_TRANSFER_TIMEOUT, Endpoint, HttpTransport,
    Transport,
};

const USER_AGENT_HEADER: &str = "User-Agent";

const INFO_PATH: &str = "/v2/getinfo/json";
const LOOKUP_REQUEST_PATH: &str = "/v2/lookuprequest/json";
const LOOKUP_USER_AGENT_PATH: &str = "/v2/lookupuseragent/json";
const LOOKUP_DEVICE_ID_PATH: &str = "/v2/lookupdeviceid/json";
const ALL_DEVICES_PATH: &str = "/v2/alldevices/json";
const ALL_OS_VERSIONS_PATH: &str = "/v2/alldeviceosversions/json";

/// Number of entries currently held by each lookup cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheSizes {
    pub device: usize,
    pub header: usize,
}

/// Client for a WURFL Microservice server.
///
/// Cheap lookups are served from two LRU caches (one keyed by a fingerprint
/// of the detection headers, one keyed by device id). Each cache, each
/// auxiliary table and the requested-capability lists sit behind their own
/// lock, and no lock is held while a request is in flight. Share one client
/// between tasks with an `Arc`.
pub struct WmClient {
    endpoint: Option<Endpoint>,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    info: InfoData,
    registry: CapabilityRegistry,
    requested: Mutex<RequestedCapabilities>,
    header_cache: BoundedCache<DeviceData>,
    device_cache: BoundedCache<DeviceData>,
    make_models: AuxTable<ModelMarketingName>,
    os_versions: AuxTable<String>,
    load_time: LoadTimeTracker,
}

impl std::fmt::Debug for WmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WmClient")
            .field("endpoint", &self.endpoint)
            .field("wm_version", &self.info.wm_version)
            .field("cache_sizes", &self.actual_cache_sizes())
            .finish_non_exhaustive()
    }
}

impl WmClient {
    /// Connect to a WM server and load its capability and header lists.
    ///
    /// An empty `scheme` means `http`. Fails if the endpoint is invalid or the
    /// server cannot be reached.
    pub async fn create(scheme: &str, host: &str, port: &str, base_uri: &str) -> Result<Self> {
        let endpoint = Endpoint::new(scheme, host, port, base_uri)?;
        let transport = HttpTransport::new(
            endpoint.clone(),
            DEFAULT_CONNECT_TIMEOUT,
            DEFAULT_TRANSFER_TIMEOUT,
        )?;
        Self::connect(Some(endpoint), Arc::new(transport)).await
    }

    /// Create a client from loaded configuration, applying timeouts and cache sizes
    pub async fn from_config(config: &ClientConfig) -> Result<Self> {
        let endpoint = Endpoint::new(&config.scheme, &config.host, &config.port, &config.base_uri)?;
        let transport = HttpTransport::new(
            endpoint.clone(),
            config.connect_timeout,
            config.transfer_timeout,
        )?;
        let client = Self::connect(Some(endpoint), Arc::new(transport)).await?;
        client.apply_cache_config(config);
        Ok(client)
    }

    /// Create a client over a custom transport
    pub async fn with_transport(transport: Arc<dyn Transport>) -> Result<Self> {
        Self::connect(None, transport).await
    }

    async fn connect(endpoint: Option<Endpoint>, transport: Arc<dyn Transport>) -> Result<Self> {
        let info = fetch_info(transport.as_ref()).await?;

        tracing::info!(
            "Connected to WM server {} (WURFL API {}, {} static / {} virtual capabilities)",
            info.wm_version,
            info.wurfl_api_version,
            info.static_caps.len(),
            info.virtual_caps.len()
        );

        let registry = CapabilityRegistry::new(info.static_caps.clone(), info.virtual_caps.clone());
        let load_time = LoadTimeTracker::default();
        load_time.observe(&info.ltime);

        Ok(Self {
            endpoint,
            transport: RwLock::new(Some(transport)),
            info,
            registry,
            requested: Mutex::new(RequestedCapabilities::default()),
            header_cache: BoundedCache::disabled("header"),
            device_cache: BoundedCache::disabled("device"),
            make_models: AuxTable::new("make/model"),
            os_versions: AuxTable::new("os/version"),
            load_time,
        })
    }

    /// Version of this client API
    pub fn api_version() -> &'static str {
        CLIENT_API_VERSION
    }

    /// Server info captured when the client was created
    pub fn server_info(&self) -> &InfoData {
        &self.info
    }

    /// Header names the server uses for detection, in server order
    pub fn important_headers(&self) -> &[String] {
        &self.info.important_headers
    }

    pub fn static_capabilities(&self) -> &[String] {
        self.registry.static_caps()
    }

    pub fn virtual_capabilities(&self) -> &[String] {
        self.registry.virtual_caps()
    }

    pub fn has_static_capability(&self, name: &str) -> bool {
        self.registry.has_static(name)
    }

    pub fn has_virtual_capability(&self, name: &str) -> bool {
        self.registry.has_virtual(name)
    }

    /// Snapshot of the capability names sent with each lookup
    pub fn requested_capabilities(&self) -> RequestedCapabilities {
        self.requested.lock().clone()
    }

    /// Last server data load time seen by this client
    pub fn load_time(&self) -> LoadTimeToken {
        self.load_time.current()
    }

    /// Restrict lookups to the given static capabilities.
    ///
    /// Unknown names are dropped. If no name survives the filter the call
    /// changes nothing; otherwise the list is replaced and caches are cleared.
    pub fn set_requested_static_capabilities<I, S>(&self, names: I) -> RequestedUpdate
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let filtered = self.registry.filter_static(names);
        if filtered.accepted.is_empty() {
            return RequestedUpdate::Ignored {
                rejected: filtered.rejected,
            };
        }
        let accepted = filtered.accepted.len();
        self.requested.lock().static_caps = filtered.accepted;
        self.clear_cache();
        RequestedUpdate::Committed {
            accepted,
            rejected: filtered.rejected,
        }
    }

    /// Restrict lookups to the given virtual capabilities. Same rules as
    /// [`set_requested_static_capabilities`](Self::set_requested_static_capabilities).
    pub fn set_requested_virtual_capabilities<I, S>(&self, names: I) -> RequestedUpdate
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let filtered = self.registry.filter_virtual(names);
        if filtered.accepted.is_empty() {
            return RequestedUpdate::Ignored {
                rejected: filtered.rejected,
            };
        }
        let accepted = filtered.accepted.len();
        self.requested.lock().virtual_caps = filtered.accepted;
        self.clear_cache();
        RequestedUpdate::Committed {
            accepted,
            rejected: filtered.rejected,
        }
    }

    /// Sort names into the static and virtual requested lists.
    ///
    /// Both lists are replaced when at least one name is known; otherwise
    /// nothing changes.
    pub fn set_requested_capabilities<I, S>(&self, names: I) -> RequestedUpdate
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let (statics, virtuals) = self.registry.split(names);
        let accepted = statics.accepted.len() + virtuals.len();
        if accepted == 0 {
            return RequestedUpdate::Ignored {
                rejected: statics.rejected,
            };
        }
        {
            let mut requested = self.requested.lock();
            requested.static_caps = statics.accepted;
            requested.virtual_caps = virtuals;
        }
        self.clear_cache();
        RequestedUpdate::Committed {
            accepted,
            rejected: statics.rejected,
        }
    }

    /// Go back to receiving every static capability
    pub fn clear_requested_static_capabilities(&self) -> RequestedUpdate {
        self.requested.lock().static_caps.clear();
        self.clear_cache();
        RequestedUpdate::Cleared
    }

    /// Go back to receiving every virtual capability
    pub fn clear_requested_virtual_capabilities(&self) -> RequestedUpdate {
        self.requested.lock().virtual_caps.clear();
        self.clear_cache();
        RequestedUpdate::Cleared
    }

    /// Go back to receiving every capability
    pub fn clear_requested_capabilities(&self) -> RequestedUpdate {
        *self.requested.lock() = RequestedCapabilities::default();
        self.clear_cache();
        RequestedUpdate::Cleared
    }

    /// Enable caching: the header cache holds `header_entries` results and the
    /// device cache the default 20000. Existing entries are dropped.
    pub fn set_cache_size(&self, header_entries: usize) {
        self.set_cache_sizes(header_entries, DEVICE_DEFAULT_CACHE_SIZE);
    }

    /// Size both caches explicitly; zero disables a cache
    pub fn set_cache_sizes(&self, header_entries: usize, device_entries: usize) {
        self.header_cache.resize(header_entries);
        self.device_cache.resize(device_entries);
    }

    /// Size the caches from configuration. Either cache can be enabled alone;
    /// the device cache falls back to its default size when only the header
    /// cache is configured.
    fn apply_cache_config(&self, config: &ClientConfig) {
        match (config.header_cache_size, config.device_cache_size) {
            (None, None) => {}
            (Some(header_entries), device_entries) => self.set_cache_sizes(
                header_entries,
                device_entries.unwrap_or(DEVICE_DEFAULT_CACHE_SIZE),
            ),
            (None, Some(device_entries)) => self.set_cache_sizes(0, device_entries),
        }
    }

    pub fn actual_cache_sizes(&self) -> CacheSizes {
        CacheSizes {
            device: self.device_cache.size(),
            header: self.header_cache.size(),
        }
    }

    /// Clear caches and tables if `ltime` differs from the last load time seen.
    /// Returns true when caches were cleared.
    pub fn clear_caches_if_needed(&self, ltime: &str) -> bool {
        let stale = self.load_time.observe(ltime);
        if stale {
            self.clear_cache();
        }
        stale
    }

    fn clear_cache(&self) {
        self.header_cache.clear();
        self.device_cache.clear();
        self.make_models.invalidate();
        self.os_versions.invalidate();
    }

    /// Set connection and transfer timeouts. `None` or zero restores the
    /// default (10s connect, 60s transfer). Rebuilds the HTTP client.
    pub fn set_http_timeout(&self, connect: Option<Duration>, transfer: Option<Duration>) -> Result<()> {
        let connect = connect
            .filter(|d| !d.is_zero())
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        let transfer = transfer
            .filter(|d| !d.is_zero())
            .unwrap_or(DEFAULT_TRANSFER_TIMEOUT);

        let Some(endpoint) = &self.endpoint else {
            tracing::debug!("Custom transport in use, ignoring timeout change");
            return Ok(());
        };

        let mut slot = self.transport.write();
        if slot.is_none() {
            return Err(WmError::Closed);
        }
        let transport = HttpTransport::new(endpoint.clone(), connect, transfer)?;
        *slot = Some(Arc::new(transport));
        tracing::debug!("HTTP timeouts set to {:?} connect / {:?} transfer", connect, transfer);
        Ok(())
    }

    /// Release the connection and drop cached data. Safe to call repeatedly;
    /// later network operations fail with [`WmError::Closed`].
    pub fn destroy_connection(&self) {
        if self.transport.write().take().is_some() {
            tracing::debug!("WM client connection destroyed");
        }
        self.header_cache.resize(0);
        self.device_cache.resize(0);
        self.make_models.reset();
        self.os_versions.reset();
    }

    fn transport(&self) -> Result<Arc<dyn Transport>> {
        self.transport.read().clone().ok_or(WmError::Closed)
    }

    /// Fetch information about the running WM server
    pub async fn get_info(&self) -> Result<InfoData> {
        let transport = self.transport()?;
        let info = fetch_info(transport.as_ref()).await?;
        self.clear_caches_if_needed(&info.ltime);
        Ok(info)
    }

    /// Detect a device from the headers of an incoming HTTP request
    pub async fn lookup_request(&self, headers: &HeaderMap) -> Result<Arc<DeviceData>> {
        let lookup_headers =
            self.select_headers(|name| headers.get(name).map(|value| header_text(value.as_bytes())));
        self.lookup_by_headers(lookup_headers, LOOKUP_REQUEST_PATH).await
    }

    /// Detect a device from a header name -> value map. Names match
    /// case-insensitively.
    pub async fn lookup_headers(&self, headers: &HashMap<String, String>) -> Result<Arc<DeviceData>> {
        let lowered: HashMap<String, &str> = headers
            .iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value.as_str()))
            .collect();
        let lookup_headers = self.select_headers(|name| {
            lowered
                .get(&name.to_ascii_lowercase())
                .map(|value| value.to_string())
        });
        self.lookup_by_headers(lookup_headers, LOOKUP_REQUEST_PATH).await
    }

    /// Detect a device from its user-agent string. An empty user-agent is
    /// sent as is; the server decides what it maps to.
    pub async fn lookup_user_agent(&self, user_agent: &str) -> Result<Arc<DeviceData>> {
        let mut lookup_headers = HashMap::new();
        lookup_headers.insert(USER_AGENT_HEADER.to_string(), user_agent.to_string());
        self.lookup_by_headers(lookup_headers, LOOKUP_USER_AGENT_PATH).await
    }

    /// Fetch device data by `wurfl_id`
    pub async fn lookup_device_id(&self, device_id: &str) -> Result<Arc<DeviceData>> {
        if let Some(hit) = self.device_cache.get(device_id) {
            return Ok(hit);
        }

        let request = self.build_request(HashMap::new(), device_id.to_string());
        let device = self.post_lookup(LOOKUP_DEVICE_ID_PATH, &request).await?;

        self.clear_caches_if_needed(&device.ltime);
        self.device_cache.put(device_id.to_string(), device.clone());
        Ok(device)
    }

    /// Copy the important headers found by `lookup`, keyed by their canonical name
    fn select_headers(&self, lookup: impl Fn(&str) -> Option<String>) -> HashMap<String, String> {
        self.info
            .important_headers
            .iter()
            .filter_map(|name| {
                lookup(name)
                    .filter(|value| !value.is_empty())
                    .map(|value| (name.clone(), value))
            })
            .collect()
    }

    async fn lookup_by_headers(
        &self,
        lookup_headers: HashMap<String, String>,
        path: &str,
    ) -> Result<Arc<DeviceData>> {
        let key = header_cache_key(&self.info.important_headers, &lookup_headers);
        if let Some(hit) = self.header_cache.get(&key) {
            return Ok(hit);
        }

        let request = self.build_request(lookup_headers, String::new());
        let device = self.post_lookup(path, &request).await?;

        self.clear_caches_if_needed(&device.ltime);
        self.header_cache.put(key, device.clone());
        Ok(device)
    }

    fn build_request(&self, lookup_headers: HashMap<String, String>, wurfl_id: String) -> LookupRequest {
        let requested = self.requested.lock().clone();
        LookupRequest {
            lookup_headers,
            requested_caps: requested.static_caps,
            requested_vcaps: requested.virtual_caps,
            wurfl_id,
            tac_code: String::new(),
        }
    }

    async fn post_lookup(&self, path: &str, request: &LookupRequest) -> Result<Arc<DeviceData>> {
        let transport = self.transport()?;
        let response = transport.post_json(path, request).await?;
        let mut device: DeviceData = if response.is_success() {
            response.json()?
        } else {
            // keep the server's message when the error body carries one
            match serde_json::from_slice::<DeviceData>(&response.body) {
                Ok(device) if !device.error.is_empty() => device,
                _ => return Err(response.status_error()),
            }
        };

        if !device.error.is_empty() {
            let message = std::mem::take(&mut device.error);
            tracing::debug!("WM server reported an error for {}: {}", path, message);
            return Err(WmError::Server {
                message,
                device: Arc::new(device),
            });
        }
        Ok(Arc::new(device))
    }

    /// All device brand names known to the server, in server order
    pub async fn get_all_device_makes(&self) -> Result<Vec<String>> {
        Ok(self.make_model_index().await?.keys().to_vec())
    }

    /// Model and marketing names of every device of `brand_name`
    pub async fn get_all_devices_for_make(&self, brand_name: &str) -> Result<Vec<ModelMarketingName>> {
        let index = self.make_model_index().await?;
        index
            .values(brand_name)
            .map(<[ModelMarketingName]>::to_vec)
            .ok_or_else(|| WmError::NotFound {
                kind: "brand",
                key: brand_name.to_string(),
            })
    }

    /// All device OS names known to the server, in server order
    pub async fn get_all_oses(&self) -> Result<Vec<String>> {
        Ok(self.os_version_index().await?.keys().to_vec())
    }

    /// Versions of `os_name`, without blank entries
    pub async fn get_all_versions_for_os(&self, os_name: &str) -> Result<Vec<String>> {
        let index = self.os_version_index().await?;
        let versions = index.values(os_name).ok_or_else(|| WmError::NotFound {
            kind: "OS",
            key: os_name.to_string(),
        })?;
        Ok(versions.iter().filter(|v| !v.is_empty()).cloned().collect())
    }

    async fn make_model_index(&self) -> Result<Arc<AuxIndex<ModelMarketingName>>> {
        self.make_models.get_or_load(|| self.fetch_make_models()).await
    }

    async fn os_version_index(&self) -> Result<Arc<AuxIndex<String>>> {
        self.os_versions.get_or_load(|| self.fetch_os_versions()).await
    }

    async fn fetch_make_models(&self) -> Result<AuxIndex<ModelMarketingName>> {
        let transport = self.transport()?;
        let entries: Vec<MakeModel> = transport.get(ALL_DEVICES_PATH).await?.json()?;
        Ok(AuxIndex::build(entries.into_iter().map(|entry| {
            (
                entry.brand_name,
                ModelMarketingName {
                    model_name: entry.model_name,
                    marketing_name: entry.marketing_name,
                },
            )
        })))
    }

    async fn fetch_os_versions(&self) -> Result<AuxIndex<String>> {
        let transport = self.transport()?;
        let entries: Vec<DeviceOsVersion> = transport.get(ALL_OS_VERSIONS_PATH).await?.json()?;
        Ok(AuxIndex::build(
            entries
                .into_iter()
                .map(|entry| (entry.os_name, entry.os_version)),
        ))
    }
}

/// Header value as text. Bytes that are not UTF-8 are read as ISO-8859-1, so
/// distinct raw values never map to the same string.
fn header_text(raw: &[u8]) -> String {
    match std::str::from_utf8(raw) {
        Ok(text) => text.to_string(),
        Err(_) => raw.iter().map(|&b| char::from(b)).collect(),
    }
}

async fn fetch_info(transport: &dyn Transport) -> Result<InfoData> {
    let info: InfoData = transport.get(INFO_PATH).await?.json()?;
    if !info.is_valid() {
        return Err(WmError::InvalidServerInfo);
    }
    Ok(info)
}

/// Run a client operation until it completes or `token` is cancelled.
///
/// Cancelling drops the in-flight request.
pub async fn with_cancel<F, T>(token: &CancellationToken, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(WmError::Cancelled),
        result = operation => result,
    }
}
