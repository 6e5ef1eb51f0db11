use serde::{Deserialize, Serialize};
use waymark_types::ControlState;

/// Shared body for `pause`/`resume`/`cancel` control endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlEndpointRequest {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub by: Option<String>,
}

/// Response of `GET control-state`. Mirrors `ControlState` directly since the
/// record itself carries no private reasoning fields.
pub type ControlStateResponse = ControlState;
