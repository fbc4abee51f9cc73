//! Data structures exchanged with the WM server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Server and API information returned by `/v2/getinfo/json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InfoData {
    pub wurfl_api_version: String,
    pub wurfl_info: String,
    pub wm_version: String,
    pub important_headers: Vec<String>,
    pub static_caps: Vec<String>,
    pub virtual_caps: Vec<String>,
    /// Time of the last WURFL data load on the server
    pub ltime: String,
}

impl InfoData {
    /// Checks that the server sent usable data
    pub fn is_valid(&self) -> bool {
        !self.wm_version.is_empty()
            && !self.wurfl_api_version.is_empty()
            && !self.wurfl_info.is_empty()
            && (!self.static_caps.is_empty() || !self.virtual_caps.is_empty())
    }
}

/// Body of the POST lookup requests
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LookupRequest {
    pub lookup_headers: HashMap<String, String>,
    pub requested_caps: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requested_vcaps: Vec<String>,
    #[serde(default)]
    pub wurfl_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tac_code: String,
}

/// Device data as returned by the lookup endpoints, every value as a string
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceData {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub capabilities: HashMap<String, String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
    /// Creation time of this result on the server (unix seconds)
    pub mtime: i64,
    /// Time of the last WURFL data load on the server
    pub ltime: String,
}

impl DeviceData {
    pub fn capability(&self, name: &str) -> Option<&str> {
        self.capabilities.get(name).map(String::as_str)
    }

    /// `wurfl_id` of the detected device, always present in successful lookups
    pub fn wurfl_id(&self) -> Option<&str> {
        self.capability("wurfl_id")
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.mtime, 0)
    }
}

/// Brand/model identity entry from `/v2/alldevices/json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MakeModel {
    pub brand_name: String,
    pub model_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub marketing_name: String,
}

/// Model and marketing name of a device of a given brand
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelMarketingName {
    pub model_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub marketing_name: String,
}

/// OS name and version entry from `/v2/alldeviceosversions/json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceOsVersion {
    #[serde(rename = "device_os")]
    pub os_name: String,
    #[serde(rename = "device_os_version")]
    pub os_version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_validation() {
        let mut info = InfoData {
            wurfl_api_version: "1.9.4.1".to_string(),
            wurfl_info: "Root:/wurfl.zip".to_string(),
            wm_version: "2.1.0".to_string(),
            static_caps: vec!["brand_name".to_string()],
            ..Default::default()
        };
        assert!(info.is_valid());

        info.static_caps.clear();
        assert!(!info.is_valid());

        info.virtual_caps.push("is_ios".to_string());
        assert!(info.is_valid());

        info.wm_version.clear();
        assert!(!info.is_valid());
    }

    #[test]
    fn test_device_id_request_omits_empty_fields() {
        let req = LookupRequest {
            wurfl_id: "nokia_generic_series40".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["wurfl_id"], "nokia_generic_series40");
        assert_eq!(json["requested_caps"], serde_json::json!([]));
        assert!(json.get("requested_vcaps").is_none());
        assert!(json.get("tac_code").is_none());
    }

    #[test]
    fn test_empty_wurfl_id_is_sent() {
        let json = serde_json::to_value(LookupRequest::default()).unwrap();
        assert_eq!(json["wurfl_id"], "");
    }

    #[test]
    fn test_device_data_decodes_partial_response() {
        let data: DeviceData = serde_json::from_str(
            r#"{"apiVersion":"WURFL API 1.9","mtime":1500000000,"ltime":"2019-09-10","error":"no device"}"#,
        )
        .unwrap();
        assert_eq!(data.api_version, "WURFL API 1.9");
        assert!(data.capabilities.is_empty());
        assert_eq!(data.error, "no device");
        assert_eq!(data.created_at().unwrap().timestamp(), 1_500_000_000);
    }

    #[test]
    fn test_os_version_field_names() {
        let entries: Vec<DeviceOsVersion> = serde_json::from_str(
            r#"[{"device_os":"Android","device_os_version":"7.0"},{"device_os":"iOS"}]"#,
        )
        .unwrap();
        assert_eq!(entries[0].os_name, "Android");
        assert_eq!(entries[0].os_version, "7.0");
        assert_eq!(entries[1].os_version, "");
    }
}
