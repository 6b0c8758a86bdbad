//! Event parser (C2): maps a chain-agnostic [`RawTransaction`] into
//! normalized [`Event`] records. Returns `Ok(None)` for unrecognized event
//! kinds, `Err` only when a *recognized* kind's attributes are malformed --
//! the contract in §4.3.
//!
//! For external chains the recognized kinds and their mapping to
//! [`EventType`] come entirely from the chain's configured
//! `gateway_methods`; nothing is hard-coded. For the home chain the two
//! predicates (`tss_process_initiated`, `outbound_created`) are fixed by
//! the protocol itself, independent of any gateway config.

use shared_types::{ChainConfig, ChainId, ConfirmationType, Event, EventStatus, EventType, GatewayMethod, VmType};

use crate::error::ParseError;
use crate::source::{RawEvent, RawTransaction};

/// Outbound events (Sign) expire 400 blocks after they were observed, per
/// the `expiry_block_height` field description in §3.
const SIGN_EXPIRY_WINDOW: u64 = 400;

/// Key-protocol events (Keygen/Keyrefresh/QuorumChange) need a longer
/// window to organize every eligible validator's participation; chosen here
/// as a documented implementation decision (see DESIGN.md).
const KEY_PROTOCOL_EXPIRY_WINDOW: u64 = 1_000;

/// Parses every recognized event in `tx` into normalized [`Event`] records,
/// for the chain described by `chain`. Unrecognized events within the
/// transaction are silently skipped; a malformed recognized event aborts
/// the whole transaction with `Err` (the poller then logs and retries the
/// surrounding chunk on the next tick -- it never partially ingests a tx).
pub fn parse_transaction(chain: &ChainConfig, tx: &RawTransaction) -> Result<Vec<Event>, ParseError> {
    let mut events = Vec::new();
    for raw in &tx.events {
        let parsed = match chain.vm_type {
            VmType::Native => parse_native_event(raw, tx)?,
            VmType::Evm | VmType::Svm => parse_external_event(raw, tx, &chain.chain_id, &chain.gateway_methods)?,
        };
        if let Some(event) = parsed {
            events.push(event);
        }
    }
    Ok(events)
}

fn parse_native_event(raw: &RawEvent, tx: &RawTransaction) -> Result<Option<Event>, ParseError> {
    match raw.kind.as_str() {
        "tss_process_initiated" => {
            let process_id = raw.attributes.get("process_id").ok_or_else(|| ParseError::MalformedAttributes {
                kind: raw.kind.clone(),
                tx_hash: tx.tx_hash.clone(),
                reason: "missing process_id".into(),
            })?;
            let process_type = raw.attributes.get("process_type").map(String::as_str).unwrap_or("keygen");
            let event_type = match process_type {
                "keyrefresh" => EventType::Keyrefresh,
                "quorum_change" => EventType::QuorumChange,
                _ => EventType::Keygen,
            };
            Ok(Some(Event {
                event_id: process_id.clone(),
                chain_id: ChainId::from(ChainId::PUSH),
                block_height: tx.block_height,
                expiry_block_height: tx.block_height + KEY_PROTOCOL_EXPIRY_WINDOW,
                event_type,
                confirmation_type: ConfirmationType::Instant,
                status: EventStatus::Pending,
                event_data: attributes_to_json(&raw.attributes),
                broadcasted_tx_hash: None,
                vote_tx_hash: None,
                terminal_at: None,
            }))
        }
        "outbound_created" => {
            let tx_id = raw.attributes.get("tx_id").ok_or_else(|| ParseError::MalformedAttributes {
                kind: raw.kind.clone(),
                tx_hash: tx.tx_hash.clone(),
                reason: "missing tx_id".into(),
            })?;
            let mut event_data = attributes_to_json(&raw.attributes);
            if let Some(destination) = raw.attributes.get("destination_chain") {
                event_data["destination_chain_id"] = serde_json::Value::String(destination.clone());
            }
            Ok(Some(Event {
                event_id: tx_id.clone(),
                chain_id: ChainId::from(ChainId::PUSH),
                block_height: tx.block_height,
                expiry_block_height: tx.block_height + SIGN_EXPIRY_WINDOW,
                event_type: EventType::Sign,
                confirmation_type: ConfirmationType::Instant,
                status: EventStatus::Pending,
                event_data,
                broadcasted_tx_hash: None,
                vote_tx_hash: None,
                terminal_at: None,
            }))
        }
        _ => Ok(None),
    }
}

fn parse_external_event(
    raw: &RawEvent,
    tx: &RawTransaction,
    chain_id: &ChainId,
    methods: &[GatewayMethod],
) -> Result<Option<Event>, ParseError> {
    let Some(method) = methods.iter().find(|m| m.event_identifier == raw.kind) else {
        return Ok(None);
    };

    let log_index = raw.log_index.ok_or_else(|| ParseError::MalformedAttributes {
        kind: raw.kind.clone(),
        tx_hash: tx.tx_hash.clone(),
        reason: "missing log index for external chain event".into(),
    })?;

    let name_lower = method.name.to_ascii_lowercase();
    let event_type = if name_lower.contains("keygen") {
        EventType::Keygen
    } else if name_lower.contains("keyrefresh") {
        EventType::Keyrefresh
    } else if name_lower.contains("quorum") {
        EventType::QuorumChange
    } else {
        EventType::Sign
    };
    let confirmation_type = if name_lower.contains("fast") { ConfirmationType::Fast } else { ConfirmationType::Standard };
    let expiry_window = if event_type.is_key_protocol() { KEY_PROTOCOL_EXPIRY_WINDOW } else { SIGN_EXPIRY_WINDOW };

    Ok(Some(Event {
        event_id: format!("{}:{}", tx.tx_hash, log_index),
        chain_id: chain_id.clone(),
        block_height: tx.block_height,
        expiry_block_height: tx.block_height + expiry_window,
        event_type,
        confirmation_type,
        status: EventStatus::Pending,
        event_data: attributes_to_json(&raw.attributes),
        broadcasted_tx_hash: None,
        vote_tx_hash: None,
        terminal_at: None,
    }))
}

fn attributes_to_json(attrs: &std::collections::HashMap<String, String>) -> serde_json::Value {
    serde_json::to_value(attrs).expect("string map always serializes")
}
