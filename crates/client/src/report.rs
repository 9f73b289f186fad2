//! Assembling and submitting bad-block reports.
//!
//! Every consensus-level failure produces a structured report carrying the
//! raw block and whatever hints the collaborator attached. The report is
//! always logged; if a sentinel endpoint is configured it is additionally
//! submitted as a JSON-RPC `eth_badBlock` call. Reporting failures are logged
//! and swallowed, never surfaced to the caller.

use cinder_interfaces::BadBlockReport;
use cinder_primitives::constants::{DATABASE_VERSION, PROTOCOL_VERSION};
use serde_json::json;
use tracing::warn;

/// The client name included in reports.
const CLIENT_NAME: &str = "cinder";

/// Builds the JSON body of a bad-block report.
pub(crate) fn report_body(report: &BadBlockReport) -> serde_json::Value {
    json!({
        "client": CLIENT_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "protocolVersion": PROTOCOL_VERSION,
        "databaseVersion": DATABASE_VERSION,
        "errortype": report.error,
        "block": format!("0x{}", hex_encode(&report.block)),
        "hints": serde_json::Value::Object(
            report.hints.iter().map(|(tag, value)| (tag.clone(), value.clone())).collect()
        ),
    })
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Logs a bad-block report and submits it to the sentinel, if one is
/// configured.
pub(crate) fn submit_report(sentinel_url: Option<&str>, report: &BadBlockReport) {
    let body = report_body(report);
    warn!(target: "client", error = %report.error, hints = report.hints.len(), "bad block encountered");

    let Some(url) = sentinel_url else { return };
    let envelope = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "eth_badBlock",
        "params": [body],
    });

    let outcome = reqwest::blocking::Client::new().post(url).json(&envelope).send();
    if let Err(err) = outcome {
        warn!(target: "client", %url, %err, "failed to submit bad block report to sentinel");
    }
}
