//! Runs the reqwest transport against a local HTTP responder.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use wmclient::{WmClient, WmError};

#[derive(Debug, Clone)]
struct Seen {
    method: String,
    path: String,
    user_agent: Option<String>,
    body: String,
}

#[derive(Default)]
struct Responder {
    seen: Mutex<Vec<Seen>>,
    hang_lookups: bool,
}

impl Responder {
    fn route(&self, path: &str) -> (u16, String) {
        if path.ends_with("/v2/getinfo/json") {
            let body = serde_json::json!({
                "wurfl_api_version": "1.11.2.0",
                "wurfl_info": "Root:/usr/share/wurfl/wurfl.zip",
                "wm_version": "2.1.0",
                "important_headers": ["User-Agent", "Device-Stock-UA"],
                "static_caps": ["brand_name", "model_name", "is_mobile"],
                "virtual_caps": ["form_factor", "is_ios"],
                "ltime": "2019-09-10 10:00:00",
            });
            (200, body.to_string())
        } else if path.ends_with("/v2/lookupdeviceid/json") {
            let body = serde_json::json!({
                "apiVersion": "WURFL API 1.11.2.0",
                "capabilities": {
                    "wurfl_id": "nokia_generic_series40",
                    "is_mobile": "true",
                    "form_factor": "Feature Phone",
                },
                "mtime": 1568109600,
                "ltime": "2019-09-10 10:00:00",
            });
            (200, body.to_string())
        } else {
            (404, "not found".to_string())
        }
    }
}

async fn read_request(stream: &mut TcpStream) -> Option<(String, String, Option<String>, String)> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();

    let mut content_length = 0usize;
    let mut user_agent = None;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim().to_ascii_lowercase();
            let value = value.trim().to_string();
            if name == "content-length" {
                content_length = value.parse().unwrap_or(0);
            } else if name == "user-agent" {
                user_agent = Some(value);
            }
        }
    }

    let mut body = buf[header_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Some((method, path, user_agent, String::from_utf8_lossy(&body).to_string()))
}

async fn serve(responder: Arc<Responder>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            let responder = responder.clone();
            tokio::spawn(async move {
                let Some((method, path, user_agent, body)) = read_request(&mut stream).await else {
                    return;
                };
                responder.seen.lock().push(Seen {
                    method: method.clone(),
                    path: path.clone(),
                    user_agent,
                    body,
                });

                if responder.hang_lookups && method == "POST" {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    return;
                }

                let (status, body) = responder.route(&path);
                let response = format!(
                    "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    if status == 200 { "OK" } else { "Not Found" },
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    port
}

#[tokio::test]
async fn test_create_and_lookup_over_http() {
    let responder = Arc::new(Responder::default());
    let port = serve(responder.clone()).await;

    let client = WmClient::create("http", "127.0.0.1", &port.to_string(), "")
        .await
        .unwrap();
    assert_eq!(client.important_headers(), ["User-Agent", "Device-Stock-UA"]);
    assert!(client.has_static_capability("is_mobile"));
    assert!(client.has_virtual_capability("form_factor"));

    client.set_cache_size(1000);
    client.set_requested_capabilities(["is_mobile", "form_factor"]);

    let device = client.lookup_device_id("nokia_generic_series40").await.unwrap();
    assert_eq!(device.capability("is_mobile"), Some("true"));
    assert_eq!(device.capability("form_factor"), Some("Feature Phone"));
    client.lookup_device_id("nokia_generic_series40").await.unwrap();

    let seen = responder.seen.lock().clone();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].method, "GET");
    assert_eq!(seen[0].path, "/v2/getinfo/json");
    assert_eq!(seen[1].method, "POST");
    assert_eq!(seen[1].path, "/v2/lookupdeviceid/json");

    let body: serde_json::Value = serde_json::from_str(&seen[1].body).unwrap();
    assert_eq!(body["wurfl_id"], "nokia_generic_series40");
    assert_eq!(body["requested_caps"], serde_json::json!(["is_mobile"]));
    assert_eq!(body["requested_vcaps"], serde_json::json!(["form_factor"]));

    let user_agent = seen[1].user_agent.clone().unwrap();
    assert!(user_agent.ends_with(&format!("rust-wmclient-api-{}", WmClient::api_version())));

    client.destroy_connection();
}

#[tokio::test]
async fn test_base_uri_prefixes_paths() {
    let responder = Arc::new(Responder::default());
    let port = serve(responder.clone()).await;

    WmClient::create("", "127.0.0.1", &port.to_string(), "/wm/")
        .await
        .unwrap();
    assert_eq!(responder.seen.lock()[0].path, "/wm/v2/getinfo/json");
}

#[tokio::test]
async fn test_missing_route_reports_status() {
    let responder = Arc::new(Responder::default());
    let port = serve(responder.clone()).await;

    let client = WmClient::create("http", "127.0.0.1", &port.to_string(), "")
        .await
        .unwrap();
    let err = client.lookup_user_agent("Mozilla/5.0").await.unwrap_err();
    assert!(matches!(err, WmError::Status { status: 404, .. }));
}

#[tokio::test]
async fn test_server_down_fails_create() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let err = WmClient::create("http", "127.0.0.1", &port.to_string(), "")
        .await
        .unwrap_err();
    assert!(err.is_connectivity());
}

#[tokio::test]
async fn test_transfer_timeout() {
    let responder = Arc::new(Responder {
        hang_lookups: true,
        ..Default::default()
    });
    let port = serve(responder.clone()).await;

    let client = WmClient::create("http", "127.0.0.1", &port.to_string(), "")
        .await
        .unwrap();
    client
        .set_http_timeout(Some(Duration::from_secs(1)), Some(Duration::from_millis(300)))
        .unwrap();

    let err = client.lookup_device_id("nokia_generic_series40").await.unwrap_err();
    assert!(err.is_connectivity());
}
