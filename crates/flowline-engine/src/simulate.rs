//! Simulation payloads
//!
//! Simulation runs real flow definitions against a synthetic channel and
//! contact so nothing is sent anywhere. The engine only sees asset
//! definitions, so the fake channel is declared here.

use serde_json::{json, Value};

/// Fixed UUID of the simulation channel
pub const TEST_CHANNEL_UUID: &str = "440099cf-200c-4d45-a8e7-4a564f4a0e8b";

/// Name of the simulation channel
pub const TEST_CHANNEL_NAME: &str = "Test Channel";

/// Address of the simulation channel
pub const TEST_CHANNEL_ADDRESS: &str = "+18005551212";

/// The channel definition injected into simulation assets
pub fn test_channel_def(is_voice: bool) -> Value {
    let mut channel = json!({
        "uuid": TEST_CHANNEL_UUID,
        "name": TEST_CHANNEL_NAME,
        "address": TEST_CHANNEL_ADDRESS,
        "schemes": ["tel"],
        "roles": ["send", "receive", "call"],
        "country": "US",
    });

    if is_voice {
        channel["roles"] = json!(["send", "receive", "call", "answer"]);
    }

    channel
}

/// Build the payload to start a simulation session.
///
/// `flows` are the migrated definitions of the flow under test and any
/// flows it can enter. Voice flows get a synthetic call connection on the
/// trigger so the engine treats the session as IVR.
pub fn start_payload(
    environment: &Value,
    contact: &Value,
    flows: &[Value],
    flow_uuid: &str,
    is_voice: bool,
) -> Value {
    let mut trigger = json!({
        "type": "manual",
        "environment": environment,
        "contact": contact,
        "flow": { "uuid": flow_uuid },
    });

    if is_voice {
        trigger["connection"] = json!({
            "channel": { "uuid": TEST_CHANNEL_UUID, "name": TEST_CHANNEL_NAME },
            "urn": format!("tel:{}", TEST_CHANNEL_ADDRESS),
        });
    }

    json!({
        "trigger": trigger,
        "flows": flows,
        "assets": { "channels": [test_channel_def(is_voice)] },
    })
}

/// Build the payload to resume a simulation session with a message or dial
/// resume from the user
pub fn resume_payload(session: &Value, resume: &Value, flows: &[Value], is_voice: bool) -> Value {
    json!({
        "session": session,
        "resume": resume,
        "flows": flows,
        "assets": { "channels": [test_channel_def(is_voice)] },
    })
}
