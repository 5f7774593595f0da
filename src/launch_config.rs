//! Rewrites a simulated-player launch configuration before deployment.
//!
//! Two document shapes are understood. The compact (`*.pb.json`) shape keeps
//! worker flags under `worker_flagz` and the load balancer layout as a JSON
//! string inside the `loadbalancer_v2_config_json` flag. The verbose shape
//! keeps worker flags under `workers` and the layout under
//! `load_balancing.layer_configurations`.

use crate::error::LaunchError;
use serde_json::{json, Map, Value};
use std::path::Path;
use tracing::warn;

pub const COORDINATOR_WORKER: &str = "SimulatedPlayerCoordinator";

const LOADBALANCER_CONFIG_FLAG: &str = "loadbalancer_v2_config_json";
const DEV_AUTH_TOKEN_FLAG: &str = "simulated_players_dev_auth_token";
const TARGET_DEPLOYMENT_FLAG: &str = "simulated_players_target_deployment";
const PLAYER_COUNT_FLAG: &str = "total_num_simulated_players";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVariant {
    Compact,
    Verbose,
}

impl SchemaVariant {
    pub fn from_path(path: &Path) -> Self {
        if path.to_string_lossy().ends_with(".pb.json") {
            SchemaVariant::Compact
        } else {
            SchemaVariant::Verbose
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerFlagPatch {
    pub name: String,
    pub value: String,
}

impl WorkerFlagPatch {
    fn to_json(&self) -> Value {
        json!({ "name": self.name, "value": self.value })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancingGridTarget {
    pub layer: String,
    pub cols: u32,
    pub rows: u32,
}

/// Everything needed to point a simulated-player launch configuration at
/// its target deployment.
#[derive(Debug, Clone)]
pub struct SimulatedPlayerPatch<'a> {
    pub coordinator_worker: &'a str,
    pub dev_auth_token: &'a str,
    pub target_deployment: &'a str,
    pub simulated_player_count: u32,
}

impl SimulatedPlayerPatch<'_> {
    pub fn worker_flags(&self) -> Vec<WorkerFlagPatch> {
        [
            (DEV_AUTH_TOKEN_FLAG, self.dev_auth_token.to_string()),
            (TARGET_DEPLOYMENT_FLAG, self.target_deployment.to_string()),
            (PLAYER_COUNT_FLAG, self.simulated_player_count.to_string()),
        ]
        .into_iter()
        .map(|(name, value)| WorkerFlagPatch {
            name: name.to_string(),
            value,
        })
        .collect()
    }

    /// One coordinator per column, all in a single row.
    pub fn grid_target(&self) -> LoadBalancingGridTarget {
        LoadBalancingGridTarget {
            layer: self.coordinator_worker.to_string(),
            cols: self.simulated_player_count,
            rows: 1,
        }
    }
}

/// What a patch actually changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchReport {
    pub flags_injected: bool,
    pub grid_resized: bool,
}

/// A parsed launch configuration in one of the two known shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum LaunchConfigDocument {
    Compact(Map<String, Value>),
    Verbose(Map<String, Value>),
}

impl LaunchConfigDocument {
    pub fn parse(text: &str, variant: SchemaVariant) -> Result<Self, LaunchError> {
        let root = match serde_json::from_str::<Value>(text)? {
            Value::Object(root) => root,
            _ => return Err(shape_error("document root is not an object")),
        };

        Ok(match variant {
            SchemaVariant::Compact => LaunchConfigDocument::Compact(root),
            SchemaVariant::Verbose => LaunchConfigDocument::Verbose(root),
        })
    }

    /// Appends flags to the flag list of the first worker entry of
    /// `worker_type`. Returns false if there is no such worker.
    pub fn inject_worker_flags(
        &mut self,
        worker_type: &str,
        flags: &[WorkerFlagPatch],
    ) -> Result<bool, LaunchError> {
        let (workers_key, flags_key) = match self {
            LaunchConfigDocument::Compact(_) => ("worker_flagz", "flagz"),
            LaunchConfigDocument::Verbose(_) => ("workers", "flags"),
        };

        let workers = array_field(self.root_mut(), workers_key)?;
        let worker = match find_entry(workers, "worker_type", worker_type) {
            Some(worker) => worker,
            None => return Ok(false),
        };

        let worker = object(worker, workers_key)?;
        let worker_flags = array_field(worker, flags_key)?;
        worker_flags.extend(flags.iter().map(WorkerFlagPatch::to_json));
        Ok(true)
    }

    /// Overwrites the rectangular grid of `target.layer`. Returns false if
    /// the document has no such layer.
    pub fn resize_grid(&mut self, target: &LoadBalancingGridTarget) -> Result<bool, LaunchError> {
        match self {
            LaunchConfigDocument::Compact(root) => resize_compact_grid(root, target),
            LaunchConfigDocument::Verbose(root) => {
                let load_balancing = match root.get_mut("load_balancing") {
                    Some(value) => object(value, "load_balancing")?,
                    None => return Err(shape_error("missing `load_balancing`")),
                };
                let layers = array_field(load_balancing, "layer_configurations")?;
                set_layer_grid(layers, "rectangle_grid", target)
            }
        }
    }

    pub fn to_json_string(&self) -> Result<String, LaunchError> {
        let root = match self {
            LaunchConfigDocument::Compact(root) | LaunchConfigDocument::Verbose(root) => root,
        };
        Ok(serde_json::to_string_pretty(root)?)
    }

    fn root_mut(&mut self) -> &mut Map<String, Value> {
        match self {
            LaunchConfigDocument::Compact(root) | LaunchConfigDocument::Verbose(root) => root,
        }
    }
}

/// The compact layout stores the load balancer config as a JSON string in
/// a top-level flag, so it is decoded, edited and encoded again.
fn resize_compact_grid(
    root: &mut Map<String, Value>,
    target: &LoadBalancingGridTarget,
) -> Result<bool, LaunchError> {
    let flags = array_field(root, "flagz")?;
    let flag = match find_entry(flags, "name", LOADBALANCER_CONFIG_FLAG) {
        Some(flag) => object(flag, "flagz")?,
        None => return Ok(false),
    };

    let encoded = match flag.get("value") {
        Some(Value::String(encoded)) => encoded,
        _ => {
            return Err(shape_error(format!(
                "`{}` value is not a string",
                LOADBALANCER_CONFIG_FLAG
            )))
        }
    };

    let mut lb_config = match serde_json::from_str::<Value>(encoded)? {
        Value::Object(lb_config) => lb_config,
        _ => {
            return Err(shape_error(format!(
                "`{}` is not a JSON object",
                LOADBALANCER_CONFIG_FLAG
            )))
        }
    };

    let layers = array_field(&mut lb_config, "layerConfigurations")?;
    let resized = set_layer_grid(layers, "rectangleGrid", target)?;
    flag.insert(
        "value".to_string(),
        Value::String(serde_json::to_string(&lb_config)?),
    );
    Ok(resized)
}

fn set_layer_grid(
    layers: &mut [Value],
    grid_key: &str,
    target: &LoadBalancingGridTarget,
) -> Result<bool, LaunchError> {
    let layer = match find_entry(layers, "layer", &target.layer) {
        Some(layer) => object(layer, "layer configuration")?,
        None => return Ok(false),
    };

    let grid = layer
        .entry(grid_key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    let grid = object(grid, grid_key)?;
    grid.insert("cols".to_string(), Value::from(target.cols));
    grid.insert("rows".to_string(), Value::from(target.rows));
    Ok(true)
}

fn find_entry<'v>(entries: &'v mut [Value], key: &str, wanted: &str) -> Option<&'v mut Value> {
    entries
        .iter_mut()
        .find(|entry| entry.get(key).and_then(Value::as_str) == Some(wanted))
}

fn array_field<'v>(
    parent: &'v mut Map<String, Value>,
    key: &str,
) -> Result<&'v mut Vec<Value>, LaunchError> {
    match parent.get_mut(key) {
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(shape_error(format!("`{}` is not a list", key))),
        None => Err(shape_error(format!("missing `{}`", key))),
    }
}

fn object<'v>(value: &'v mut Value, what: &str) -> Result<&'v mut Map<String, Value>, LaunchError> {
    value
        .as_object_mut()
        .ok_or_else(|| shape_error(format!("`{}` entry is not an object", what)))
}

fn shape_error(message: impl Into<String>) -> LaunchError {
    LaunchError::LaunchConfigShape(message.into())
}

/// Injects the coordinator flags and resizes the coordinator layer.
///
/// A missing coordinator worker or layer is not an error: the rest of the
/// patch still applies and the gap is logged.
pub fn patch_launch_config(
    text: &str,
    variant: SchemaVariant,
    patch: &SimulatedPlayerPatch<'_>,
) -> Result<(String, PatchReport), LaunchError> {
    let mut document = LaunchConfigDocument::parse(text, variant)?;

    let flags_injected = document.inject_worker_flags(patch.coordinator_worker, &patch.worker_flags())?;
    if !flags_injected {
        warn!(
            worker = patch.coordinator_worker,
            "launch configuration has no entry for the coordinator worker, flags not injected"
        );
    }

    let grid_resized = document.resize_grid(&patch.grid_target())?;
    if !grid_resized {
        warn!(
            layer = patch.coordinator_worker,
            "launch configuration has no load balancing layer for the coordinator worker, grid not resized"
        );
    }

    Ok((
        document.to_json_string()?,
        PatchReport {
            flags_injected,
            grid_resized,
        },
    ))
}
