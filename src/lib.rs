//! WURFL Microservice client library
//!
//! This crate talks to a WURFL Microservice (WM) server over HTTP/JSON:
//! - Device lookups by user-agent, HTTP headers or `wurfl_id`
//! - Two independently locked LRU caches for lookup results
//! - Automatic cache invalidation when the server reloads its data
//! - Lazily loaded make/model and OS/version tables
//!
//! The library never classifies devices itself; the server is the authority.
//!
//! # Example
//!
//! ```no_run
//! use wmclient::WmClient;
//!
//! #[tokio::main]
//! async fn main() -> wmclient::Result<()> {
//!     let client = WmClient::create("http", "localhost", "8080", "").await?;
//!     client.set_cache_size(100_000);
//!     client.set_requested_capabilities(["brand_name", "model_name", "is_smartphone"]);
//!
//!     let device = client.lookup_user_agent("Mozilla/5.0 (iPhone; CPU iPhone OS 10_2_1 like Mac OS X)").await?;
//!     println!("{:?}", device.capability("brand_name"));
//!
//!     for os in client.get_all_oses().await? {
//!         println!("{}: {:?}", os, client.get_all_versions_for_os(&os).await?);
//!     }
//!
//!     client.destroy_connection();
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod capabilities;
mod client;
pub mod config;
mod error;
pub mod invalidation;
pub mod model;
pub mod tables;
pub mod transport;

// Re-export commonly used types
pub use capabilities::{RequestedCapabilities, RequestedUpdate};
pub use client::{CacheSizes, WmClient, with_cancel};
pub use config::{ClientConfig, ConfigSource, load_client_config, load_client_config_from};
pub use error::{Result, WmError};
pub use invalidation::LoadTimeToken;
pub use model::{DeviceData, InfoData, ModelMarketingName};
pub use transport::{HttpResponse, Transport};
