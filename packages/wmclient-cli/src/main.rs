//! WM client CLI - query a WURFL Microservice server from the command line
//!
//! This binary can:
//! - Show server information and available capabilities
//! - Detect devices by user-agent, HTTP headers or wurfl_id
//! - List device makes/models and OS versions known to the server

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::HashMap;
use wmclient::{ClientConfig, DeviceData, WmClient, config};

#[derive(Parser)]
#[command(name = "wmclient")]
#[command(author = "ScientiaMobile")]
#[command(version)]
#[command(about = "Query a WURFL Microservice server")]
#[command(long_about = "
wmclient talks to a running WURFL Microservice server and prints
device detection results.

Quick start:
  1. Check the server:   wmclient info
  2. Detect a device:    wmclient lookup-ua \"Mozilla/5.0 (iPhone; ...)\"
  3. Fewer fields:       wmclient --caps brand_name,is_smartphone lookup-ua \"...\"

The server endpoint comes from --host/--port, WMCLIENT_* environment
variables, or ~/.config/wmclient/config.toml (see: wmclient config).
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Server scheme (http or https)
    #[arg(long, global = true)]
    pub scheme: Option<String>,

    /// Server host
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Server port
    #[arg(long, global = true)]
    pub port: Option<String>,

    /// Base path the server is mounted under
    #[arg(long, global = true)]
    pub base_uri: Option<String>,

    /// Capabilities to request (comma separated), all when omitted
    #[arg(long, global = true, value_delimiter = ',')]
    pub caps: Vec<String>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show server and API information
    Info,

    /// Detect a device from a user-agent string
    #[command(alias = "ua")]
    LookupUa {
        /// User-agent to detect (may be empty)
        user_agent: String,
    },

    /// Fetch device data by wurfl_id
    #[command(alias = "id")]
    LookupId {
        /// WURFL device identifier, e.g. nokia_generic_series40
        device_id: String,
    },

    /// Detect a device from a set of HTTP headers
    LookupHeaders {
        /// Headers as "Name: value"
        #[arg(required = true)]
        headers: Vec<String>,
    },

    /// List device brands, or the models of one brand
    Makes {
        /// Brand to list models for
        brand: Option<String>,
    },

    /// List device operating systems, or the versions of one OS
    Oses {
        /// OS to list versions for
        os: Option<String>,
    },

    /// Show configuration paths and settings
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("wmclient={},wmclient_cli={}", log_level, log_level).into()),
        )
        .with_target(false)
        .init();

    match &cli.command {
        Commands::Info => cmd_info(&cli).await,
        Commands::LookupUa { user_agent } => {
            let client = connect(&cli).await?;
            let device = client.lookup_user_agent(user_agent).await;
            print_device(&cli, device)
        }
        Commands::LookupId { device_id } => {
            let client = connect(&cli).await?;
            let device = client.lookup_device_id(device_id).await;
            print_device(&cli, device)
        }
        Commands::LookupHeaders { headers } => {
            let headers = parse_headers(headers)?;
            let client = connect(&cli).await?;
            let device = client.lookup_headers(&headers).await;
            print_device(&cli, device)
        }
        Commands::Makes { brand } => cmd_makes(&cli, brand.as_deref()).await,
        Commands::Oses { os } => cmd_oses(&cli, os.as_deref()).await,
        Commands::Config => cmd_config(&cli),
    }
}

fn client_config(cli: &Cli) -> ClientConfig {
    let mut config = wmclient::load_client_config();
    if let Some(scheme) = &cli.scheme {
        config.scheme = scheme.clone();
    }
    if let Some(host) = &cli.host {
        config.host = host.clone();
    }
    if let Some(port) = &cli.port {
        config.port = port.clone();
    }
    if let Some(base_uri) = &cli.base_uri {
        config.base_uri = base_uri.clone();
    }
    config
}

async fn connect(cli: &Cli) -> Result<WmClient> {
    let config = client_config(cli);
    let client = WmClient::from_config(&config).await.with_context(|| {
        format!(
            "Failed to connect to WM server at {}://{}:{}",
            config.scheme, config.host, config.port
        )
    })?;

    if !cli.caps.is_empty() {
        let update = client.set_requested_capabilities(&cli.caps);
        tracing::debug!("Requested capabilities: {:?}", update);
    }
    Ok(client)
}

fn parse_headers(raw: &[String]) -> Result<HashMap<String, String>> {
    raw.iter()
        .map(|header| -> Result<(String, String)> {
            let (name, value) = header
                .split_once(':')
                .with_context(|| format!("Header '{}' is not in 'Name: value' form", header))?;
            Ok((name.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

async fn cmd_info(cli: &Cli) -> Result<()> {
    let client = connect(cli).await?;
    let info = client.get_info().await.context("Failed to get server info")?;

    match cli.format {
        OutputFormat::Text => {
            println!("WM server:        {}", info.wm_version);
            println!("WURFL API:        {}", info.wurfl_api_version);
            println!("WURFL info:       {}", info.wurfl_info);
            println!("Last load time:   {}", info.ltime);
            println!("Client API:       {}", WmClient::api_version());
            println!();
            println!("Important headers: {}", info.important_headers.join(", "));
            println!("Static capabilities:  {}", info.static_caps.len());
            println!("Virtual capabilities: {}", info.virtual_caps.len());
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "info": info,
                "client_api_version": WmClient::api_version(),
            }));
        }
    }

    Ok(())
}

fn print_device(cli: &Cli, result: wmclient::Result<std::sync::Arc<DeviceData>>) -> Result<()> {
    let (device, error) = match result {
        Ok(device) => (device, None),
        Err(e) => {
            let Some(device) = e.device_data().cloned() else {
                return Err(anyhow::Error::new(e).context("Lookup failed"));
            };
            (device, Some(e.to_string()))
        }
    };

    match cli.format {
        OutputFormat::Text => {
            if let Some(error) = &error {
                eprintln!("Error: {}", error);
            }
            println!("API version: {}", device.api_version);
            if let Some(created) = device.created_at() {
                println!("Created:     {}", created.to_rfc3339());
            }
            println!("Load time:   {}", device.ltime);
            println!();

            let mut names: Vec<_> = device.capabilities.keys().collect();
            names.sort();
            let width = names.iter().map(|n| n.len()).max().unwrap_or(0);
            for name in names {
                println!("  {:width$}  {}", name, device.capabilities[name], width = width);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "device": &*device,
                "error": error,
            }));
        }
    }

    Ok(())
}

async fn cmd_makes(cli: &Cli, brand: Option<&str>) -> Result<()> {
    let client = connect(cli).await?;

    match brand {
        None => {
            let makes = client.get_all_device_makes().await.context("Failed to list device makes")?;
            match cli.format {
                OutputFormat::Text => {
                    println!("{} brands:", makes.len());
                    for make in &makes {
                        println!("  {}", make);
                    }
                }
                OutputFormat::Json => println!("{}", serde_json::json!({ "makes": makes })),
            }
        }
        Some(brand) => {
            let models = client.get_all_devices_for_make(brand).await?;
            match cli.format {
                OutputFormat::Text => {
                    println!("{} models for {}:", models.len(), brand);
                    for model in &models {
                        if model.marketing_name.is_empty() {
                            println!("  {}", model.model_name);
                        } else {
                            println!("  {} ({})", model.model_name, model.marketing_name);
                        }
                    }
                }
                OutputFormat::Json => {
                    println!("{}", serde_json::json!({ "brand": brand, "models": models }));
                }
            }
        }
    }

    Ok(())
}

async fn cmd_oses(cli: &Cli, os: Option<&str>) -> Result<()> {
    let client = connect(cli).await?;

    match os {
        None => {
            let oses = client.get_all_oses().await.context("Failed to list operating systems")?;
            match cli.format {
                OutputFormat::Text => {
                    println!("{} operating systems:", oses.len());
                    for os in &oses {
                        println!("  {}", os);
                    }
                }
                OutputFormat::Json => println!("{}", serde_json::json!({ "oses": oses })),
            }
        }
        Some(os) => {
            let versions = client.get_all_versions_for_os(os).await?;
            match cli.format {
                OutputFormat::Text => {
                    println!("{} versions of {}:", versions.len(), os);
                    for version in &versions {
                        println!("  {}", version);
                    }
                }
                OutputFormat::Json => {
                    println!("{}", serde_json::json!({ "os": os, "versions": versions }));
                }
            }
        }
    }

    Ok(())
}

fn cmd_config(cli: &Cli) -> Result<()> {
    let client_config = client_config(cli);
    let config_path = config::get_config_file_path_string();
    let header_cache = client_config
        .header_cache_size
        .map(|n| n.to_string())
        .unwrap_or_else(|| "disabled".to_string());

    match cli.format {
        OutputFormat::Text => {
            println!("Configuration");
            println!("=============");
            println!();
            println!("Config file:      {}", config_path);
            println!(
                "Server:           {}://{}:{}/{} (from {})",
                client_config.scheme,
                client_config.host,
                client_config.port,
                client_config.base_uri,
                client_config.source
            );
            println!(
                "Timeouts:         {:?} connect, {:?} transfer",
                client_config.connect_timeout, client_config.transfer_timeout
            );
            println!("Header cache:     {}", header_cache);
            println!();
            println!("Environment variables:");
            println!("  WMCLIENT_SCHEME, WMCLIENT_HOST, WMCLIENT_PORT, WMCLIENT_BASE_URI");
            println!();
            println!("Example config.toml:");
            println!();
            println!("{}", config::generate_example_config());
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "config_file": config_path,
                "scheme": client_config.scheme,
                "host": client_config.host,
                "port": client_config.port,
                "base_uri": client_config.base_uri,
                "source": format!("{}", client_config.source),
                "connect_timeout_ms": client_config.connect_timeout.as_millis() as u64,
                "transfer_timeout_ms": client_config.transfer_timeout.as_millis() as u64,
                "header_cache": header_cache,
            }));
        }
    }

    Ok(())
}
