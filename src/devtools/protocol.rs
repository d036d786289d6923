//! Wire shapes shared by the panel, the port relay and the inspected page.
//!
//! Port messages are JSON objects tagged by `name`. Control block payloads
//! use the PascalCase field names the page exposes.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

pub use crate::runtime::{LogCategory, SutilOptions};

/// Name of the long-lived port between panel and page.
pub const PORT_NAME: &str = "devtools-page";

/// Expression naming the page's control block.
pub const CONTROL_BLOCK: &str = "document.__sutil_cb";

/// A DevTools-visible store and its current value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StoreInfo {
    pub id: usize,
    pub name: String,
    pub value: Value,
}

/// A registered mount point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MountPointInfo {
    pub id: String,
    pub mount_id: u64,
}

/// Panel to page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "kebab-case")]
pub enum OutboundMessage {
    Hello,
    Init {
        #[serde(rename = "tabId")]
        tab_id: u64,
    },
}

/// Page to panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "kebab-case")]
pub enum InboundMessage {
    ContentPageConnected,
    SutilNewStore {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<usize>,
    },
    SutilUpdateStore {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<usize>,
    },
}

/// Serialize a port message.
pub fn encode<M: Serialize>(message: &M) -> Result<String> {
    Ok(serde_json::to_string(message)?)
}

/// Parse a port message.
pub fn decode<M: DeserializeOwned>(text: &str) -> Result<M> {
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outbound_shapes() {
        assert_eq!(encode(&OutboundMessage::Hello).unwrap(), r#"{"name":"hello"}"#);
        assert_eq!(
            encode(&OutboundMessage::Init { tab_id: 12 }).unwrap(),
            r#"{"name":"init","tabId":12}"#
        );
    }

    #[test]
    fn test_inbound_parsing() {
        let msg: InboundMessage = decode(r#"{"name":"content-page-connected"}"#).unwrap();
        assert_eq!(msg, InboundMessage::ContentPageConnected);

        let msg: InboundMessage = decode(r#"{"name":"sutil-update-store","id":3}"#).unwrap();
        assert_eq!(msg, InboundMessage::SutilUpdateStore { id: Some(3) });

        let msg: InboundMessage = decode(r#"{"name":"sutil-new-store"}"#).unwrap();
        assert_eq!(msg, InboundMessage::SutilNewStore { id: None });

        assert!(decode::<InboundMessage>(r#"{"name":"bogus"}"#).is_err());
    }

    #[test]
    fn test_pascal_case_payloads() {
        let info = StoreInfo { id: 1, name: "count".into(), value: json!(5) };
        assert_eq!(serde_json::to_value(&info).unwrap(), json!({"Id": 1, "Name": "count", "Value": 5}));

        let mount = MountPointInfo { id: "app".into(), mount_id: 2 };
        assert_eq!(serde_json::to_value(&mount).unwrap(), json!({"Id": "app", "MountId": 2}));

        let options: SutilOptions = serde_json::from_value(json!({"SlowAnimations": true, "LoggingEnabled": false})).unwrap();
        assert!(options.slow_animations);

        let category = LogCategory("each".into(), true);
        assert_eq!(serde_json::to_value(&category).unwrap(), json!(["each", true]));
    }
}
