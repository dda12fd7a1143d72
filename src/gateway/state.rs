use serde::{Deserialize, Serialize};

use super::channel::{CodeFragment, ExecutionChannel};
use super::session::Session;
use crate::utils::StateError;

/// Lua query serializing the six runtime properties as one JSON line
pub const STATE_QUERY: &str = r#"return json.encode({
    output_level = params:get("output_level"),
    engine_ready = engine.ready,
    clock_beats = clock.get_beats(),
    clock_tempo = clock.get_tempo(),
    screen_dirty = screen.dirty or false,
    midi_ports = #midi.vports
})"#;

/// Snapshot of the device runtime. Every field is optional; the empty
/// record (all `None`) is the fallback when a query fails.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_level: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_ready: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clock_beats: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clock_tempo: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_dirty: Option<bool>,
    #[serde(
        rename = "midi_ports",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub midi_port_count: Option<i64>,
}

impl DeviceState {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Parse the REPL answer to [`STATE_QUERY`].
///
/// The REPL may surround the JSON with prompt noise, so when the whole text
/// is not a document the last line that looks like one is tried.
pub fn parse_state(raw: &str) -> Result<DeviceState, StateError> {
    let trimmed = raw.trim();
    match serde_json::from_str(trimmed) {
        Ok(state) => Ok(state),
        Err(e) => {
            let candidate = trimmed
                .lines()
                .rev()
                .map(str::trim)
                .find(|line| line.starts_with('{'));
            match candidate {
                Some(line) if line != trimmed => Ok(serde_json::from_str(line)?),
                _ => Err(StateError::Parse(e)),
            }
        }
    }
}

/// Run the state query. Fallible: the caller decides how to recover.
pub async fn query_state(
    channel: &ExecutionChannel,
    session: &mut Session,
) -> Result<DeviceState, StateError> {
    let raw = channel
        .execute(session, &CodeFragment::from(STATE_QUERY))
        .await?;
    parse_state(&raw)
}
