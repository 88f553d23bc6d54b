use anyhow::Error;
use serde::Serialize;

use crate::opc::OpcError;

/// Coarse classification of a failure, used to pick a recovery strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Connection refused, reset or write failure: a reconnect may help.
    Transport,
    /// The frame could not be produced or encoded.
    Render,
    /// Bad layout, config file or argument; fatal before the loop starts.
    Config,
}

impl FailureKind {
    pub fn code(self) -> &'static str {
        match self {
            Self::Transport => "E_TRANSPORT",
            Self::Render => "E_RENDER",
            Self::Config => "E_CONFIG",
        }
    }
}

/// Marker attached (as context) to startup errors so they classify as
/// [`FailureKind::Config`].
#[derive(Debug, Clone)]
pub struct ConfigError(pub String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ConfigError {}

pub fn find_opc_error(error: &Error) -> Option<&OpcError> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<OpcError>())
}

pub fn classify(error: &Error) -> FailureKind {
    if let Some(opc) = find_opc_error(error) {
        if opc.is_connection_failure() {
            return FailureKind::Transport;
        }
        return FailureKind::Render;
    }
    // Context values are only reachable through anyhow's own downcast.
    if error.downcast_ref::<ConfigError>().is_some() {
        return FailureKind::Config;
    }
    FailureKind::Render
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub ok: bool,
    pub error: ErrorEnvelopeBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelopeBody {
    pub code: &'static str,
    pub kind: FailureKind,
    pub message: String,
}

pub fn envelope(error: &Error) -> ErrorEnvelope {
    let kind = classify(error);
    ErrorEnvelope {
        ok: false,
        error: ErrorEnvelopeBody {
            code: kind.code(),
            kind,
            message: format!("{error:#}"),
        },
    }
}
