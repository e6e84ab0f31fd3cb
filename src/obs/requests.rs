//! Typed requests on top of [`ObsClient::request`] and the engine seams the
//! rest of the daemon depends on.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::client::ObsClient;
use super::error::ObsError;
use super::protocol::status_code;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub obs_version: String,
    pub obs_web_socket_version: String,
    pub rpc_version: u32,
    #[serde(default)]
    pub platform: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordStatus {
    pub output_active: bool,
    #[serde(default)]
    pub output_paused: bool,
    #[serde(default)]
    pub output_duration: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneItem {
    pub scene_item_id: i64,
    pub source_name: String,
    pub scene_item_enabled: bool,
    #[serde(default)]
    pub input_kind: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SceneItemList {
    scene_items: Vec<SceneItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentScene {
    #[serde(alias = "sceneName")]
    current_program_scene_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedInput {
    scene_item_id: i64,
}

fn parse<T: serde::de::DeserializeOwned>(request_type: &str, data: Option<Value>) -> Result<T, ObsError> {
    let data = data.ok_or_else(|| ObsError::Protocol(format!("{} returned no data", request_type)))?;
    serde_json::from_value(data).map_err(|e| ObsError::Protocol(format!("{}: {}", request_type, e)))
}

/// Parse the leading `major.minor.patch` of an OBS version string.
/// OBS reports versions like `30.1.2` or `31.0.0-beta1`.
pub fn parse_obs_version(raw: &str) -> Option<semver::Version> {
    let mut parts = raw
        .trim()
        .split(|c: char| !c.is_ascii_digit() && c != '.')
        .next()?
        .split('.')
        .map(|p| p.parse::<u64>().ok());
    let major = parts.next()??;
    let minor = parts.next().flatten().unwrap_or(0);
    let patch = parts.next().flatten().unwrap_or(0);
    Some(semver::Version::new(major, minor, patch))
}

impl ObsClient {
    pub async fn get_version(&self) -> Result<VersionInfo, ObsError> {
        let data = self.request("GetVersion", None).await?;
        parse("GetVersion", data)
    }

    pub async fn get_record_status(&self) -> Result<RecordStatus, ObsError> {
        let data = self.request("GetRecordStatus", None).await?;
        parse("GetRecordStatus", data)
    }

    /// Start recording. An output that is already running counts as started.
    pub async fn start_record(&self) -> Result<(), ObsError> {
        match self.request("StartRecord", None).await {
            Ok(_) => Ok(()),
            Err(e) if e.code() == Some(status_code::OUTPUT_RUNNING) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Stop recording. An output that is already stopped counts as stopped.
    pub async fn stop_record(&self) -> Result<Option<String>, ObsError> {
        match self.request("StopRecord", None).await {
            Ok(data) => Ok(data
                .as_ref()
                .and_then(|d| d.get("outputPath"))
                .and_then(|p| p.as_str())
                .map(String::from)),
            Err(e) if e.code() == Some(status_code::OUTPUT_NOT_RUNNING) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn get_current_program_scene(&self) -> Result<String, ObsError> {
        let data = self.request("GetCurrentProgramScene", None).await?;
        let scene: CurrentScene = parse("GetCurrentProgramScene", data)?;
        Ok(scene.current_program_scene_name)
    }

    pub async fn get_scene_item_list(&self, scene_name: &str) -> Result<Vec<SceneItem>, ObsError> {
        let data = self
            .request("GetSceneItemList", Some(json!({ "sceneName": scene_name })))
            .await?;
        let list: SceneItemList = parse("GetSceneItemList", data)?;
        Ok(list.scene_items)
    }

    /// Create an input in `scene_name` and return its scene item id.
    pub async fn create_input(
        &self,
        scene_name: &str,
        input_name: &str,
        input_kind: &str,
    ) -> Result<i64, ObsError> {
        let data = self
            .request(
                "CreateInput",
                Some(json!({
                    "sceneName": scene_name,
                    "inputName": input_name,
                    "inputKind": input_kind,
                    "inputSettings": {},
                    "sceneItemEnabled": true,
                })),
            )
            .await?;
        let created: CreatedInput = parse("CreateInput", data)?;
        Ok(created.scene_item_id)
    }

    pub async fn set_scene_item_enabled(
        &self,
        scene_name: &str,
        scene_item_id: i64,
        enabled: bool,
    ) -> Result<(), ObsError> {
        self.request(
            "SetSceneItemEnabled",
            Some(json!({
                "sceneName": scene_name,
                "sceneItemId": scene_item_id,
                "sceneItemEnabled": enabled,
            })),
        )
        .await?;
        Ok(())
    }

    /// Compare the engine version against the configured minimum.
    ///
    /// Old engines are logged and tolerated; the daemon keeps running in
    /// degraded mode.
    pub async fn check_version(&self) -> Option<bool> {
        let info = match self.get_version().await {
            Ok(info) => info,
            Err(e) => {
                warn!("Could not query OBS version: {}", e);
                return None;
            }
        };

        let minimum = self.min_obs_version().clone();
        let compatible = match parse_obs_version(&info.obs_version) {
            Some(version) => version >= minimum,
            None => {
                warn!("Unrecognised OBS version string '{}'", info.obs_version);
                false
            }
        };

        if compatible {
            info!(
                "OBS {} (obs-websocket {}) on {}",
                info.obs_version, info.obs_web_socket_version, info.platform
            );
        } else {
            warn!(
                "OBS {} is older than the supported minimum {}; continuing in degraded mode",
                info.obs_version, minimum
            );
        }

        self.update_state(|state| {
            state.engine_version = Some(info.obs_version.clone());
            state.version_compatible = Some(compatible);
        });
        Some(compatible)
    }
}

/// Recording control used by the state machine.
#[async_trait]
pub trait RecordingEngine: Send + Sync {
    fn is_connected(&self) -> bool;
    async fn start_recording(&self) -> Result<(), ObsError>;
    async fn stop_recording(&self) -> Result<(), ObsError>;
    async fn recording_active(&self) -> Result<bool, ObsError>;
}

/// Scene inspection and mutation used by the source reconciler.
#[async_trait]
pub trait SceneControl: Send + Sync {
    async fn current_scene(&self) -> Result<String, ObsError>;
    async fn scene_items(&self, scene_name: &str) -> Result<Vec<SceneItem>, ObsError>;
    async fn create_input(&self, scene_name: &str, input_name: &str, input_kind: &str) -> Result<i64, ObsError>;
    async fn set_item_enabled(&self, scene_name: &str, scene_item_id: i64, enabled: bool) -> Result<(), ObsError>;
}

#[async_trait]
impl RecordingEngine for ObsClient {
    fn is_connected(&self) -> bool {
        self.is_ready()
    }

    async fn start_recording(&self) -> Result<(), ObsError> {
        self.start_record().await
    }

    async fn stop_recording(&self) -> Result<(), ObsError> {
        if let Some(path) = self.stop_record().await? {
            info!("Recording saved to {}", path);
        }
        Ok(())
    }

    async fn recording_active(&self) -> Result<bool, ObsError> {
        Ok(self.get_record_status().await?.output_active)
    }
}

#[async_trait]
impl SceneControl for ObsClient {
    async fn current_scene(&self) -> Result<String, ObsError> {
        self.get_current_program_scene().await
    }

    async fn scene_items(&self, scene_name: &str) -> Result<Vec<SceneItem>, ObsError> {
        self.get_scene_item_list(scene_name).await
    }

    async fn create_input(&self, scene_name: &str, input_name: &str, input_kind: &str) -> Result<i64, ObsError> {
        ObsClient::create_input(self, scene_name, input_name, input_kind).await
    }

    async fn set_item_enabled(&self, scene_name: &str, scene_item_id: i64, enabled: bool) -> Result<(), ObsError> {
        self.set_scene_item_enabled(scene_name, scene_item_id, enabled).await
    }
}
