//! Typed view of server-pushed events and client lifecycle notifications.

use serde_json::Value;

use super::protocol::Event;

/// Events emitted by OBS that the daemon reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum ObsEvent {
    RecordStateChanged {
        active: bool,
        state: String,
        output_path: Option<String>,
    },
    InputCreated {
        input_name: String,
        input_kind: String,
    },
    InputRemoved {
        input_name: String,
    },
    SceneItemCreated {
        scene_name: String,
        source_name: String,
        scene_item_id: i64,
    },
    SceneItemRemoved {
        scene_name: String,
        source_name: String,
        scene_item_id: i64,
    },
    SceneItemEnableStateChanged {
        scene_name: String,
        scene_item_id: i64,
        enabled: bool,
    },
    CurrentProgramSceneChanged {
        scene_name: String,
    },
    ExitStarted,
    Other {
        event_type: String,
        data: Option<Value>,
    },
}

impl ObsEvent {
    pub fn from_wire(event: &Event) -> Self {
        let data = event.event_data.as_ref();
        let str_field = |key: &str| {
            data.and_then(|d| d.get(key))
                .and_then(|v| v.as_str())
                .map(String::from)
        };
        let item_id = || {
            data.and_then(|d| d.get("sceneItemId"))
                .and_then(|v| v.as_i64())
                .unwrap_or_default()
        };
        let bool_field = |key: &str| {
            data.and_then(|d| d.get(key))
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
        };

        match event.event_type.as_str() {
            "RecordStateChanged" => Self::RecordStateChanged {
                active: bool_field("outputActive"),
                state: str_field("outputState").unwrap_or_default(),
                output_path: str_field("outputPath"),
            },
            "InputCreated" => Self::InputCreated {
                input_name: str_field("inputName").unwrap_or_default(),
                input_kind: str_field("inputKind").unwrap_or_default(),
            },
            "InputRemoved" => Self::InputRemoved {
                input_name: str_field("inputName").unwrap_or_default(),
            },
            "SceneItemCreated" => Self::SceneItemCreated {
                scene_name: str_field("sceneName").unwrap_or_default(),
                source_name: str_field("sourceName").unwrap_or_default(),
                scene_item_id: item_id(),
            },
            "SceneItemRemoved" => Self::SceneItemRemoved {
                scene_name: str_field("sceneName").unwrap_or_default(),
                source_name: str_field("sourceName").unwrap_or_default(),
                scene_item_id: item_id(),
            },
            "SceneItemEnableStateChanged" => Self::SceneItemEnableStateChanged {
                scene_name: str_field("sceneName").unwrap_or_default(),
                scene_item_id: item_id(),
                enabled: bool_field("sceneItemEnabled"),
            },
            "CurrentProgramSceneChanged" => Self::CurrentProgramSceneChanged {
                scene_name: str_field("sceneName").unwrap_or_default(),
            },
            "ExitStarted" => Self::ExitStarted,
            _ => Self::Other {
                event_type: event.event_type.clone(),
                data: event.event_data.clone(),
            },
        }
    }
}

/// Notification delivered to client observers.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Handshake completed.
    Connected { rpc_version: u32 },
    /// Transport lost; the client is reconnecting.
    Disconnected { reason: String },
    Engine(ObsEvent),
}
