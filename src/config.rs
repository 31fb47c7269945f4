//! Configuration for the labeld service.
//!
//! Two layers live here. `ServerConfig` is the process-level runtime
//! configuration, built by stacking built-in defaults under command-line
//! overrides. The parameter resolver below it merges caller-supplied
//! overrides from a control message into the built-in model defaults,
//! producing the two immutable parameter groups (construction vs. per-call
//! execution) and a JSON-safe diagnostic echo.

use std::collections::BTreeMap;

use clap::Parser;
use config::Config;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{EngineError, ServerError};
use crate::protocol::Framing;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Listen address, e.g. ipc:///tmp/reqrep.ipc or tcp://0.0.0.0:5555
    pub listen: String,

    /// Receive timeout in seconds; the loop logs and keeps waiting when it fires
    #[arg(long, value_name = "SECS")]
    pub recv_timeout: Option<u64>,

    /// Accept the original untagged wire format
    #[arg(long)]
    pub legacy_framing: bool,

    /// Tracing filter (overrides RUST_LOG)
    #[arg(long)]
    pub log_filter: Option<String>,
}

/// Runtime configuration for the responder.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub listen: String,
    pub recv_timeout_secs: u64,
    pub framing: Framing,
}

impl ServerConfig {
    /// Layer built-in defaults under CLI overrides.
    pub fn from_cli(cli: &Cli) -> Result<Self, ServerError> {
        let cfg = Config::builder()
            .set_default("recv_timeout_secs", 300i64)?
            .set_default("framing", "tagged")?
            .set_override("listen", cli.listen.clone())?
            .set_override_option("recv_timeout_secs", cli.recv_timeout.map(|s| s as i64))?
            .set_override_option("framing", cli.legacy_framing.then_some("legacy"))?
            .build()?;
        Ok(cfg.try_deserialize()?)
    }
}

fn setup_defaults() -> BTreeMap<String, Value> {
    BTreeMap::from([
        ("model".to_string(), json!("threshold")),
        // First accelerator, matching the upstream engine's default.
        ("device".to_string(), json!("cuda:0")),
        ("gpu".to_string(), json!(true)),
    ])
}

fn execution_defaults() -> BTreeMap<String, Value> {
    BTreeMap::from([
        ("z_axis".to_string(), json!(0)),
        ("stitch_threshold".to_string(), json!(0.1)),
        ("project_2d".to_string(), json!(true)),
        ("batch_axis".to_string(), json!(false)),
    ])
}

/// Resolved per-session parameters, split by group.
///
/// Values stay as raw JSON; type errors surface only when the engine
/// factory consumes them, so a sloppy caller still gets a faithful echo.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedParams {
    pub setup: BTreeMap<String, Value>,
    pub execution: BTreeMap<String, Value>,
}

impl ResolvedParams {
    /// JSON-safe diagnostic echo: every value stringified, grouped under
    /// `"setup"` and `"execution"`, deterministically ordered.
    pub fn echo(&self) -> Value {
        json!({
            "setup": stringify_group(&self.setup),
            "execution": stringify_group(&self.execution),
        })
    }

    /// The echo rendered as reply bytes.
    pub fn echo_bytes(&self) -> Vec<u8> {
        self.echo().to_string().into_bytes()
    }
}

/// Merge caller-supplied parameters into the built-in defaults.
///
/// Top-level keys override whichever group recognizes them; the nested
/// `setup_kwargs` and `execution_kwargs` objects override their own group.
/// The two nested carriers are distinct sources (the original read both
/// groups from `setup_kwargs`, which was a defect). Unrecognized keys are
/// ignored. Pure; never fails.
pub fn resolve(caller: &Value) -> ResolvedParams {
    let mut setup = setup_defaults();
    let mut execution = execution_defaults();
    if let Some(obj) = caller.as_object() {
        apply_overrides(&mut setup, obj);
        apply_overrides(&mut execution, obj);
        if let Some(nested) = obj.get("setup_kwargs").and_then(Value::as_object) {
            apply_overrides(&mut setup, nested);
        }
        if let Some(nested) = obj.get("execution_kwargs").and_then(Value::as_object) {
            apply_overrides(&mut execution, nested);
        }
    }
    ResolvedParams { setup, execution }
}

fn apply_overrides(group: &mut BTreeMap<String, Value>, src: &serde_json::Map<String, Value>) {
    for (key, value) in src {
        if let Some(slot) = group.get_mut(key) {
            *slot = value.clone();
        }
    }
}

fn stringify_group(group: &BTreeMap<String, Value>) -> Value {
    Value::Object(
        group
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(stringify_value(v))))
            .collect(),
    )
}

fn stringify_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Typed construction parameters, validated when the engine is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub model: String,
    pub device: String,
    pub gpu: bool,
}

impl EngineConfig {
    pub fn from_params(params: &ResolvedParams) -> Result<Self, EngineError> {
        let model = match params.setup.get("model") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => {
                return Err(EngineError::InvalidParameter {
                    key: "model",
                    reason: format!("expected string, got {other}"),
                })
            }
            None => "threshold".to_string(),
        };
        let device = match params.setup.get("device") {
            Some(Value::String(s)) => s.clone(),
            // Bare index means accelerator ordinal.
            Some(Value::Number(n)) => format!("cuda:{n}"),
            Some(other) => {
                return Err(EngineError::InvalidParameter {
                    key: "device",
                    reason: format!("expected string or index, got {other}"),
                })
            }
            None => "cuda:0".to_string(),
        };
        let gpu = match params.setup.get("gpu") {
            Some(Value::Bool(b)) => *b,
            Some(other) => {
                return Err(EngineError::InvalidParameter {
                    key: "gpu",
                    reason: format!("expected boolean, got {other}"),
                })
            }
            None => true,
        };
        Ok(Self { model, device, gpu })
    }
}

/// Typed execution parameters, bound once on the configure transition and
/// read on every process call.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecConfig {
    pub z_axis: usize,
    pub stitch_threshold: f64,
    pub project_2d: bool,
    pub batch_axis: bool,
}

impl ExecConfig {
    pub fn from_params(params: &ResolvedParams) -> Result<Self, EngineError> {
        Ok(Self {
            z_axis: exec_u64(&params.execution, "z_axis", 0)? as usize,
            stitch_threshold: exec_f64(&params.execution, "stitch_threshold", 0.1)?,
            project_2d: exec_bool(&params.execution, "project_2d", true)?,
            batch_axis: exec_bool(&params.execution, "batch_axis", false)?,
        })
    }
}

fn exec_u64(
    group: &BTreeMap<String, Value>,
    key: &'static str,
    default: u64,
) -> Result<u64, EngineError> {
    match group.get(key) {
        Some(v) => v.as_u64().ok_or_else(|| EngineError::InvalidExecParameter {
            key,
            reason: format!("expected non-negative integer, got {v}"),
        }),
        None => Ok(default),
    }
}

fn exec_f64(
    group: &BTreeMap<String, Value>,
    key: &'static str,
    default: f64,
) -> Result<f64, EngineError> {
    match group.get(key) {
        Some(v) => v.as_f64().ok_or_else(|| EngineError::InvalidExecParameter {
            key,
            reason: format!("expected number, got {v}"),
        }),
        None => Ok(default),
    }
}

fn exec_bool(
    group: &BTreeMap<String, Value>,
    key: &'static str,
    default: bool,
) -> Result<bool, EngineError> {
    match group.get(key) {
        Some(v) => v.as_bool().ok_or_else(|| EngineError::InvalidExecParameter {
            key,
            reason: format!("expected boolean, got {v}"),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_caller_params_echo_the_defaults() {
        let params = resolve(&json!({}));
        let echo = params.echo();
        assert_eq!(echo["setup"]["model"], "threshold");
        assert_eq!(echo["setup"]["device"], "cuda:0");
        assert_eq!(echo["setup"]["gpu"], "true");
        assert_eq!(echo["execution"]["z_axis"], "0");
        assert_eq!(echo["execution"]["stitch_threshold"], "0.1");
        assert_eq!(echo["execution"]["project_2d"], "true");
        assert_eq!(echo["execution"]["batch_axis"], "false");
    }

    #[test]
    fn echo_is_byte_identical_across_resolutions() {
        let caller = json!({"device": 1, "execution_kwargs": {"z_axis": 2}});
        assert_eq!(resolve(&caller).echo_bytes(), resolve(&caller).echo_bytes());
    }

    #[test]
    fn top_level_construction_key_overrides() {
        let params = resolve(&json!({"device": 0}));
        assert_eq!(params.setup["device"], json!(0));
        assert_eq!(params.echo()["setup"]["device"], "0");
    }

    #[test]
    fn nested_override_sources_are_distinct() {
        let params = resolve(&json!({
            "setup_kwargs": {"gpu": false},
            "execution_kwargs": {"stitch_threshold": 0.4},
        }));
        assert_eq!(params.setup["gpu"], json!(false));
        // Defaults untouched where the other group's kwargs named a key.
        assert_eq!(params.execution["stitch_threshold"], json!(0.4));
        assert_eq!(params.setup["model"], json!("threshold"));
    }

    #[test]
    fn execution_kwargs_do_not_leak_into_setup() {
        let params = resolve(&json!({"execution_kwargs": {"gpu": false}}));
        assert_eq!(params.setup["gpu"], json!(true));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let params = resolve(&json!({"flow_threshold": 0.7, "setup_kwargs": {"nope": 1}}));
        assert_eq!(params, resolve(&json!({})));
    }

    #[test]
    fn non_object_caller_params_fall_back_to_defaults() {
        assert_eq!(resolve(&json!([1, 2, 3])), resolve(&json!({})));
    }

    #[test]
    fn numeric_device_becomes_accelerator_ordinal() {
        let cfg = EngineConfig::from_params(&resolve(&json!({"device": 1}))).unwrap();
        assert_eq!(cfg.device, "cuda:1");
    }

    #[test]
    fn bad_construction_types_fail_at_the_typed_view_not_resolve() {
        let params = resolve(&json!({"gpu": "maybe"}));
        // Resolver passes the value through; the echo still works.
        assert_eq!(params.echo()["setup"]["gpu"], "maybe");
        assert!(EngineConfig::from_params(&params).is_err());
    }

    #[test]
    fn exec_config_reads_overrides() {
        let params = resolve(&json!({
            "execution_kwargs": {"z_axis": 1, "stitch_threshold": 0.25, "batch_axis": true}
        }));
        let exec = ExecConfig::from_params(&params).unwrap();
        assert_eq!(exec.z_axis, 1);
        assert_eq!(exec.stitch_threshold, 0.25);
        assert!(exec.batch_axis);
        assert!(exec.project_2d);
    }
}
