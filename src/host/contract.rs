//! Versioned control command/event envelopes exchanged with frontends.

use serde::{Deserialize, Serialize};

/// Contract version for control command/event envelopes.
pub const EVENT_VERSION: u32 = 1;

/// Control messages a frontend may send to the background scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandName {
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "sendAyahNow")]
    SendAyahNow,
    #[serde(rename = "testNotification")]
    TestNotification,
    #[serde(rename = "forceNewAyah")]
    ForceNewAyah,
    #[serde(rename = "getSettings")]
    GetSettings,
    #[serde(rename = "updateSettings")]
    UpdateSettings,
    #[serde(rename = "checkWakeUp")]
    CheckWakeUp,
    #[serde(rename = "getStatus")]
    GetStatus,
    #[serde(rename = "checkTimerExpired")]
    CheckTimerExpired,
    #[serde(rename = "debugAlarms")]
    DebugAlarms,
    #[serde(rename = "debugStorage")]
    DebugStorage,
    #[serde(rename = "getLastAyah")]
    GetLastAyah,
    #[serde(rename = "sendAyahByReference")]
    SendAyahByReference,
    #[serde(rename = "shutdown")]
    Shutdown,
}

impl CommandName {
    /// Every command, in wire order.
    pub const ALL: [Self; 14] = [
        Self::Ping,
        Self::SendAyahNow,
        Self::TestNotification,
        Self::ForceNewAyah,
        Self::GetSettings,
        Self::UpdateSettings,
        Self::CheckWakeUp,
        Self::GetStatus,
        Self::CheckTimerExpired,
        Self::DebugAlarms,
        Self::DebugStorage,
        Self::GetLastAyah,
        Self::SendAyahByReference,
        Self::Shutdown,
    ];

    /// Render command name to wire format.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::SendAyahNow => "sendAyahNow",
            Self::TestNotification => "testNotification",
            Self::ForceNewAyah => "forceNewAyah",
            Self::GetSettings => "getSettings",
            Self::UpdateSettings => "updateSettings",
            Self::CheckWakeUp => "checkWakeUp",
            Self::GetStatus => "getStatus",
            Self::CheckTimerExpired => "checkTimerExpired",
            Self::DebugAlarms => "debugAlarms",
            Self::DebugStorage => "debugStorage",
            Self::GetLastAyah => "getLastAyah",
            Self::SendAyahByReference => "sendAyahByReference",
            Self::Shutdown => "shutdown",
        }
    }

    /// Parse a command name from wire format.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|command| command.as_str() == raw)
    }
}

/// A versioned response envelope from scheduler -> frontend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub v: u32,
    pub request_id: String,
    pub ok: bool,
    pub payload: serde_json::Value,
    pub error: Option<String>,
}

impl ResponseEnvelope {
    /// Build a successful response envelope.
    #[must_use]
    pub fn ok(request_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            ok: true,
            payload,
            error: None,
        }
    }

    /// Build a transport-level error envelope (unparseable or undeliverable
    /// request) with a null payload.
    #[must_use]
    pub fn error(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            ok: false,
            payload: serde_json::Value::Null,
            error: Some(message.into()),
        }
    }

    /// Build a failed-operation envelope. The payload carries
    /// `{success: false, error}` so views can render it like a normal reply.
    #[must_use]
    pub fn failure(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            ok: false,
            payload: serde_json::json!({"success": false, "error": message}),
            error: Some(message),
        }
    }
}

/// A versioned command envelope from frontend -> scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub v: u32,
    pub request_id: String,
    pub command: CommandName,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl CommandEnvelope {
    /// Build a v1 command envelope.
    #[must_use]
    pub fn new(
        request_id: impl Into<String>,
        command: CommandName,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            command,
            payload,
        }
    }

    /// Validate envelope version and required identifiers.
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.v != EVENT_VERSION {
            return Err(ContractError::new(
                ContractErrorKind::UnsupportedVersion,
                format!(
                    "unsupported contract version {}; expected {}",
                    self.v, EVENT_VERSION
                ),
            ));
        }
        if self.request_id.trim().is_empty() {
            return Err(ContractError::new(
                ContractErrorKind::InvalidEnvelope,
                "request_id cannot be empty".to_owned(),
            ));
        }
        Ok(())
    }
}

/// A versioned event envelope from scheduler -> frontend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub v: u32,
    pub event_id: String,
    pub event: String,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    #[must_use]
    pub fn new(
        event_id: impl Into<String>,
        event: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            v: EVENT_VERSION,
            event_id: event_id.into(),
            event: event.into(),
            payload,
        }
    }
}

/// Contract validation error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractErrorKind {
    UnsupportedVersion,
    InvalidEnvelope,
}

/// Contract validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractError {
    pub kind: ContractErrorKind,
    pub message: String,
}

impl ContractError {
    #[must_use]
    pub fn new(kind: ContractErrorKind, message: String) -> Self {
        Self { kind, message }
    }
}

impl std::fmt::Display for ContractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ContractError {}
