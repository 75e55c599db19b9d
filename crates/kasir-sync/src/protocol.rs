//! # Wire Messages
//!
//! JSON frames between the till and the backing store, tagged as
//! `{ "type": "...", "payload": { ... } }` with camelCase fields.
//!
//! ```text
//!   till                                   backing store
//!    │── Hello { deviceId, storeId } ────────────►│
//!    │◄─────────────────── Welcome { serverTime } ─│
//!    │                                             │
//!    │── OutboxBatch { batchSeq, entries } ───────►│  oldest first
//!    │◄──── BatchAck { batchSeq, ackedIds, failed }│  per-entry verdict
//!    │                                             │
//!    │◄────────── EntityUpdate { version, data } ──│  menu / hold edits
//!    │                                             │  made elsewhere
//!    │◄── Ping / Pong ───────────────────────────►│
//!    │◄── Error { code, message } ───────────────►│
//! ```
//!
//! A frame whose `type` is unknown fails to decode and is skipped by the
//! link.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kasir_core::SyncOutboxEntry;

pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum SyncMessage {
    Hello(HelloPayload),
    Welcome(WelcomePayload),
    OutboxBatch(OutboxBatch),
    BatchAck(BatchAck),
    EntityUpdate(EntityUpdate),
    #[serde(rename_all = "camelCase")]
    Ping { timestamp: String },
    #[serde(rename_all = "camelCase")]
    Pong {
        ping_timestamp: String,
        pong_timestamp: String,
    },
    Error { code: String, message: String },
}

// =============================================================================
// Handshake Payloads
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloPayload {
    pub device_id: String,
    pub device_name: String,
    /// Tenant partition this till writes into.
    pub store_id: String,
    pub protocol_version: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomePayload {
    pub store_id: String,
    /// Server clock, for reference only.
    pub server_time: String,
}

// =============================================================================
// Outbox Payloads
// =============================================================================

/// One outbox row as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxEntry {
    pub id: String,
    pub store_id: String,
    /// `transaction`, `inventory_delta`, `hold_order`, `menu_item`.
    pub entity_type: String,
    pub entity_id: String,
    pub record_id: String,
    /// `create`, `upsert`, `delete`, `refund`, `settle_debt`, `delta`.
    pub operation: String,
    /// Entity JSON exactly as queued.
    pub payload: String,
    pub created_at: DateTime<Utc>,
}

impl From<&SyncOutboxEntry> for OutboxEntry {
    fn from(e: &SyncOutboxEntry) -> Self {
        OutboxEntry {
            id: e.id.clone(),
            store_id: e.store_id.clone(),
            entity_type: e.entity_type.clone(),
            entity_id: e.entity_id.clone(),
            record_id: e.record_id.clone(),
            operation: e.operation.clone(),
            payload: e.payload.clone(),
            created_at: e.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxBatch {
    pub device_id: String,
    pub entries: Vec<OutboxEntry>,
    /// Echoed back in the matching `BatchAck`.
    pub batch_seq: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchAck {
    pub batch_seq: u64,

    /// Entries the backing store durably applied.
    pub acked_ids: Vec<String>,

    #[serde(default)]
    pub failed: Vec<FailedEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedEntry {
    pub id: String,
    pub error: String,

    /// False means the write is refused for good and its record is Failed.
    #[serde(default)]
    pub retryable: bool,
}

// =============================================================================
// Entity Update Payloads
// =============================================================================

/// A change made elsewhere (another till, the back office).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityUpdate {
    /// `menu_item` or `hold_order`.
    pub entity_type: String,
    pub entity_id: String,
    pub store_id: String,
    /// `upsert` or `delete`.
    pub operation: String,
    /// Full entity on upsert, ignored on delete.
    #[serde(default)]
    pub data: serde_json::Value,
    /// Remote `sync_version`; higher wins.
    pub version: i64,
}

// =============================================================================
// Constructors
// =============================================================================

impl SyncMessage {
    pub fn type_name(&self) -> &'static str {
        match self {
            SyncMessage::Hello(_) => "Hello",
            SyncMessage::Welcome(_) => "Welcome",
            SyncMessage::OutboxBatch(_) => "OutboxBatch",
            SyncMessage::BatchAck(_) => "BatchAck",
            SyncMessage::EntityUpdate(_) => "EntityUpdate",
            SyncMessage::Ping { .. } => "Ping",
            SyncMessage::Pong { .. } => "Pong",
            SyncMessage::Error { .. } => "Error",
        }
    }

    pub fn hello(device_id: &str, device_name: &str, store_id: &str) -> Self {
        SyncMessage::Hello(HelloPayload {
            device_id: device_id.to_string(),
            device_name: device_name.to_string(),
            store_id: store_id.to_string(),
            protocol_version: PROTOCOL_VERSION,
        })
    }

    pub fn outbox_batch(device_id: &str, batch_seq: u64, entries: &[SyncOutboxEntry]) -> Self {
        SyncMessage::OutboxBatch(OutboxBatch {
            device_id: device_id.to_string(),
            entries: entries.iter().map(OutboxEntry::from).collect(),
            batch_seq,
        })
    }

    pub fn pong(ping_timestamp: &str) -> Self {
        SyncMessage::Pong {
            ping_timestamp: ping_timestamp.to_string(),
            pong_timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn error(code: &str, message: &str) -> Self {
        SyncMessage::Error {
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn outbox_row(id: &str) -> SyncOutboxEntry {
        SyncOutboxEntry {
            id: id.into(),
            store_id: "owner-1".into(),
            entity_type: "transaction".into(),
            entity_id: "t-1".into(),
            record_id: "t-1".into(),
            operation: "create".into(),
            payload: r#"{"id":"t-1"}"#.into(),
            attempts: 2,
            last_error: Some("timeout".into()),
            created_at: Utc::now(),
            attempted_at: None,
            synced_at: None,
            rejected_at: None,
        }
    }

    #[test]
    fn test_hello_wire_shape() {
        let json = SyncMessage::hello("dev-123", "Kasir Depan", "owner-1")
            .to_json()
            .unwrap();
        assert!(json.contains("\"type\":\"Hello\""));
        assert!(json.contains("\"payload\":{"));
        assert!(json.contains("\"deviceId\":\"dev-123\""));
        assert!(json.contains("\"protocolVersion\":1"));
    }

    #[test]
    fn test_batch_carries_record_id_but_not_local_bookkeeping() {
        let msg = SyncMessage::outbox_batch("dev-1", 7, &[outbox_row("o-1")]);
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"recordId\":\"t-1\""));
        assert!(json.contains("\"batchSeq\":7"));
        assert!(!json.contains("attempts"));
        assert!(!json.contains("lastError"));
    }

    #[test]
    fn test_batch_ack_from_remote() {
        let json = r#"{
            "type": "BatchAck",
            "payload": {
                "batchSeq": 3,
                "ackedIds": ["o-1", "o-2"],
                "failed": [{ "id": "o-3", "error": "schema", "retryable": false }]
            }
        }"#;

        match SyncMessage::from_json(json).unwrap() {
            SyncMessage::BatchAck(ack) => {
                assert_eq!(ack.batch_seq, 3);
                assert_eq!(ack.acked_ids, vec!["o-1", "o-2"]);
                assert_eq!(ack.failed.len(), 1);
                assert!(!ack.failed[0].retryable);
            }
            other => panic!("Expected BatchAck, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_ack_without_failures_defaults_empty() {
        let json = r#"{"type":"BatchAck","payload":{"batchSeq":1,"ackedIds":[]}}"#;
        match SyncMessage::from_json(json).unwrap() {
            SyncMessage::BatchAck(ack) => assert!(ack.failed.is_empty()),
            other => panic!("Expected BatchAck, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_entity_delete_needs_no_data() {
        let json = r#"{
            "type": "EntityUpdate",
            "payload": {
                "entityType": "hold_order",
                "entityId": "h-1",
                "storeId": "owner-1",
                "operation": "delete",
                "version": 4
            }
        }"#;

        match SyncMessage::from_json(json).unwrap() {
            SyncMessage::EntityUpdate(update) => {
                assert_eq!(update.operation, "delete");
                assert!(update.data.is_null());
            }
            other => panic!("Expected EntityUpdate, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_keepalive_and_error() {
        let pong = SyncMessage::pong("2024-09-01T00:00:00Z").to_json().unwrap();
        assert!(pong.contains("\"pingTimestamp\""));

        let error = SyncMessage::error("STORE_MISMATCH", "Store ID does not match");
        let json = error.to_json().unwrap();
        assert!(json.contains("STORE_MISMATCH"));
        assert_eq!(SyncMessage::from_json(&json).unwrap(), error);
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(SyncMessage::from_json(r#"{"type":"Heartbeat","payload":{}}"#).is_err());
    }
}
