// ── Remote registry commands ──
//
// The three commands a remote operator can invoke, and the handlers that
// run them against the registry. Handlers never fail on bad input: empty
// or malformed identifiers come back as a negative response. The only
// error a handler returns is a persistence failure, which the dispatcher
// escalates.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::DeviceId;
use crate::error::CoreError;
use crate::registry::DeviceRegistry;

/// A command understood by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceCommand {
    Add,
    Remove,
    List,
}

impl DeviceCommand {
    pub const ALL: [Self; 3] = [Self::Add, Self::Remove, Self::List];

    /// Name the command is invoked by remotely.
    pub fn name(self) -> &'static str {
        match self {
            Self::Add => "AddRuuviTag",
            Self::Remove => "RemoveRuuviTag",
            Self::List => "GetRuuviTags",
        }
    }

    /// Run the command against `registry`.
    pub async fn execute(
        self,
        payload: &Value,
        registry: &DeviceRegistry,
    ) -> Result<CommandResponse, CoreError> {
        match self {
            Self::Add => add_device(payload, registry).await,
            Self::Remove => remove_device(payload, registry).await,
            Self::List => Ok(list_devices(registry).await),
        }
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One inbound invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub request_id: String,
    pub command: String,
    #[serde(default)]
    pub payload: Value,
}

/// Outcome of a command, as sent back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub result: bool,
    pub data: Value,
}

impl CommandResponse {
    pub fn ok(data: impl Into<Value>) -> Self {
        Self {
            result: true,
            data: data.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            result: false,
            data: Value::String(message.into()),
        }
    }

    /// 200 for a positive result, 400 otherwise.
    pub fn status(&self) -> u16 {
        if self.result { 200 } else { 400 }
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({ "result": self.result, "data": self.data })
    }
}

// ── Handlers ─────────────────────────────────────────────────────────

enum Target {
    Empty,
    Malformed(String),
    Device(DeviceId),
}

fn decode_target(payload: &Value) -> Target {
    match payload {
        Value::Null => Target::Empty,
        Value::String(s) if s.is_empty() => Target::Empty,
        Value::String(s) => match DeviceId::parse(s.as_str()) {
            Ok(id) => Target::Device(id),
            Err(_) => Target::Malformed(s.clone()),
        },
        other => Target::Malformed(other.to_string()),
    }
}

async fn add_device(payload: &Value, registry: &DeviceRegistry) -> Result<CommandResponse, CoreError> {
    let id = match decode_target(payload) {
        Target::Empty => return Ok(CommandResponse::rejected("Cannot add empty MAC")),
        Target::Malformed(raw) => {
            warn!(mac = %raw, "got illegal RuuviTag MAC");
            return Ok(CommandResponse::rejected("Not a valid MAC address"));
        }
        Target::Device(id) => id,
    };

    info!(mac = %id, "adding RuuviTag");
    if registry.add(id.clone()).await? {
        Ok(CommandResponse::ok(format!("RuuviTag {id} added")))
    } else {
        Ok(CommandResponse::rejected(format!("RuuviTag {id} already exists")))
    }
}

async fn remove_device(
    payload: &Value,
    registry: &DeviceRegistry,
) -> Result<CommandResponse, CoreError> {
    let id = match decode_target(payload) {
        Target::Empty => return Ok(CommandResponse::rejected("Cannot add empty MAC")),
        Target::Malformed(raw) => {
            warn!(mac = %raw, "got illegal RuuviTag MAC");
            return Ok(CommandResponse::rejected("Not a valid MAC address"));
        }
        Target::Device(id) => id,
    };

    info!(mac = %id, "removing RuuviTag");
    if registry.remove(&id).await? {
        Ok(CommandResponse::ok(format!("RuuviTag {id} removed")))
    } else {
        Ok(CommandResponse::rejected(format!("RuuviTag {id} doesn't exist")))
    }
}

async fn list_devices(registry: &DeviceRegistry) -> CommandResponse {
    info!("returning RuuviTags");
    let ids: Vec<Value> = registry
        .list()
        .await
        .into_iter()
        .map(|id| Value::String(id.into()))
        .collect();
    CommandResponse::ok(ids)
}
