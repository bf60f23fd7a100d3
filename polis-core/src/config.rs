//! Typed run configuration.
//!
//! The YAML loader itself is a thin `serde_yaml` deserialization; the
//! recognized key set is exactly the declared fields, and every struct
//! rejects unknown keys, so an unrecognized key is a fatal
//! [`ConfigError`] naming the offender.

use crate::error::ConfigError;
use crate::schema::{VariableDefinition, VariableSchema};
use crate::state::POPULATION_CAP;
use crate::value::ScalarValue;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Root configuration for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    /// Run identity, length, checkpointing, termination, seed.
    pub simulation: SimulationSection,
    /// Declared agent and global variables.
    pub state_variables: StateVariablesSection,
    /// Initial population.
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
    /// Concrete engine selection (resolved by the embedding binary).
    pub engine: EngineSection,
    /// Concrete validator selection.
    pub validator: ValidatorSection,
    /// Spatial topology, absent for aspatial runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spatial: Option<SpatialConfig>,
    /// Per-agent view restrictions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
    /// LLM adapter settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm: Option<LlmConfig>,
    /// Logging bootstrap settings (renderer is external).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// `simulation` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationSection {
    /// Run-id prefix.
    pub name: String,
    /// Hard turn limit.
    pub max_turns: u64,
    /// Save `turn_{N}.json` every N turns. Absent = final only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_interval: Option<u64>,
    /// Optional early-termination predicate over global state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination: Option<TerminationRule>,
    /// Root of per-agent seed derivation. Two runs with the same seed
    /// and the same scripted responses are bytewise identical.
    #[serde(default)]
    pub seed: u64,
}

/// Comparison operators for the termination predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Strictly less.
    Lt,
    /// Less or equal.
    Le,
    /// Strictly greater.
    Gt,
    /// Greater or equal.
    Ge,
}

/// `simulation.termination`: end the run once a global variable
/// crosses a threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TerminationRule {
    /// The global variable to watch.
    pub var: String,
    /// The comparison.
    pub op: CmpOp,
    /// The right-hand side (scalar).
    pub value: serde_json::Value,
}

impl TerminationRule {
    /// Evaluate the predicate against global state. A missing
    /// variable or incomparable value pair never terminates.
    #[must_use]
    pub fn is_met(&self, global: &BTreeMap<String, ScalarValue>) -> bool {
        let Some(current) = global.get(&self.var) else {
            return false;
        };
        let Some(target) = ScalarValue::from_json(&self.value) else {
            return false;
        };
        match (current.as_f64(), target.as_f64()) {
            (Some(lhs), Some(rhs)) => match self.op {
                CmpOp::Eq => lhs == rhs,
                CmpOp::Ne => lhs != rhs,
                CmpOp::Lt => lhs < rhs,
                CmpOp::Le => lhs <= rhs,
                CmpOp::Gt => lhs > rhs,
                CmpOp::Ge => lhs >= rhs,
            },
            // Non-numeric values support equality only.
            _ => match self.op {
                CmpOp::Eq => *current == target,
                CmpOp::Ne => *current != target,
                _ => false,
            },
        }
    }
}

/// `state_variables` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateVariablesSection {
    /// Per-agent variable declarations.
    #[serde(default)]
    pub agent_vars: BTreeMap<String, VariableDefinition>,
    /// Global variable declarations.
    #[serde(default)]
    pub global_vars: BTreeMap<String, VariableDefinition>,
}

/// One initial agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Unique non-empty name.
    pub name: String,
    /// Concrete strategy selector (resolved by the embedding binary).
    #[serde(rename = "type")]
    pub kind: String,
    /// Starting location id; requires a spatial topology.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_location: Option<String>,
    /// Overrides merged over schema defaults, schema-validated.
    #[serde(default)]
    pub initial_state: BTreeMap<String, serde_json::Value>,
}

/// `engine` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    /// Concrete engine selector.
    #[serde(rename = "type")]
    pub kind: String,
}

/// `validator` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidatorSection {
    /// Concrete validator selector.
    #[serde(rename = "type")]
    pub kind: String,
    /// Accept any action with a legitimate in-domain effect.
    #[serde(default = "default_true")]
    pub permissive: bool,
}

/// `spatial.topology` — one of the four topology families.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "topology_type", rename_all = "snake_case", deny_unknown_fields)]
pub enum TopologyConfig {
    /// Rectangular grid, ids `"x,y"`.
    Grid {
        /// Columns.
        width: u32,
        /// Rows.
        height: u32,
        /// 4 (orthogonal) or 8 (plus diagonals).
        #[serde(default = "default_connectivity")]
        connectivity: u8,
        /// Wrap neighbours modulo width/height.
        #[serde(default)]
        wrapping: bool,
    },
    /// Hexagonal grid in axial coordinates, ids `"q,r"`.
    HexGrid {
        /// Inclusive axial radius.
        radius: u32,
    },
    /// Graph loaded from a JSON `{nodes, edges, attributes?}` file.
    Network {
        /// Path to the edges file.
        edges_file: PathBuf,
    },
    /// Regions loaded from a GeoJSON FeatureCollection.
    Regions {
        /// Path to the GeoJSON file.
        geojson_file: PathBuf,
    },
}

/// An extra named network layered over the topology's locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkConfig {
    /// Network name (must not be `"default"`).
    pub name: String,
    /// Unordered location-id pairs.
    #[serde(default)]
    pub edges: Vec<[String; 2]>,
    /// Network attributes.
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

/// `spatial` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpatialConfig {
    /// The topology family and its parameters.
    pub topology: TopologyConfig,
    /// Location id → attribute overrides applied after construction.
    #[serde(default)]
    pub location_attributes: BTreeMap<String, BTreeMap<String, serde_json::Value>>,
    /// Additional networks constructed after the topology.
    #[serde(default)]
    pub additional_networks: Vec<NetworkConfig>,
}

/// `observability` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObservabilityConfig {
    /// Restrict views to locations within this many hops of the
    /// observer. Absent = no spatial restriction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<u32>,
    /// Agent variables hidden from other agents' views. Everything
    /// not listed is public.
    #[serde(default)]
    pub private_agent_vars: Vec<String>,
}

/// `llm` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// Model server base URL. Absent = `OLLAMA_HOST` or the local
    /// default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Per-call timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout: u64,
    /// Retries after the first failure. The policy is at most one.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            host: None,
            timeout: default_timeout_secs(),
            max_retries: default_max_retries(),
            temperature: default_temperature(),
        }
    }
}

/// Log severities accepted in config (and `LOG_LEVEL`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevelConfig {
    /// Debug and above.
    Debug,
    /// Info and above.
    Info,
    /// Warnings and errors.
    Warning,
    /// Errors only.
    Error,
}

impl LogLevelConfig {
    /// The `tracing` filter directive for this level.
    #[must_use]
    pub fn as_filter(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warn",
            Self::Error => "error",
        }
    }
}

/// Output format of the log renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Structured JSON lines.
    Json,
    /// Human-readable console output.
    Console,
    /// Console on a TTY, JSON otherwise.
    Auto,
}

/// `logging` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Minimum severity.
    pub level: LogLevelConfig,
    /// Renderer format.
    pub format: LogFormat,
}

impl SimulationConfig {
    /// Parse a YAML document. Unknown keys anywhere are fatal.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read and parse a YAML file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Cross-field validation; returns the variable schema on success.
    pub fn validate(&self) -> Result<VariableSchema, ConfigError> {
        if self.simulation.name.trim().is_empty() {
            return Err(ConfigError::Invalid("simulation.name must be non-empty".into()));
        }
        if self.simulation.max_turns == 0 {
            return Err(ConfigError::Invalid("simulation.max_turns must be positive".into()));
        }
        if self.simulation.checkpoint_interval == Some(0) {
            return Err(ConfigError::Invalid(
                "simulation.checkpoint_interval must be positive".into(),
            ));
        }
        if let Some(llm) = &self.llm {
            if llm.max_retries > 1 {
                return Err(ConfigError::Invalid(
                    "llm.max_retries: the retry policy allows at most one retry".into(),
                ));
            }
            if llm.timeout == 0 {
                return Err(ConfigError::Invalid("llm.timeout must be positive".into()));
            }
        }
        if let Some(spatial) = &self.spatial {
            if let TopologyConfig::Grid { connectivity, width, height, .. } = &spatial.topology {
                if !matches!(connectivity, 4 | 8) {
                    return Err(ConfigError::Invalid(format!(
                        "spatial.topology.connectivity must be 4 or 8, got {connectivity}"
                    )));
                }
                if *width == 0 || *height == 0 {
                    return Err(ConfigError::Invalid(
                        "spatial grid dimensions must be positive".into(),
                    ));
                }
            }
            for net in &spatial.additional_networks {
                if net.name == crate::spatial::DEFAULT_NETWORK {
                    return Err(ConfigError::Invalid(
                        "additional_networks may not redefine \"default\"".into(),
                    ));
                }
            }
        }
        if self.agents.len() > POPULATION_CAP {
            return Err(ConfigError::Invalid(format!(
                "{} initial agents exceed the population cap {POPULATION_CAP}",
                self.agents.len()
            )));
        }
        let mut seen = BTreeSet::new();
        for agent in &self.agents {
            if !seen.insert(agent.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate agent name: {}",
                    agent.name
                )));
            }
        }

        let schema = VariableSchema::new(
            self.state_variables.agent_vars.clone(),
            self.state_variables.global_vars.clone(),
        )?;

        if let Some(observability) = &self.observability {
            for var in &observability.private_agent_vars {
                if !schema.agent_vars.contains_key(var) {
                    return Err(ConfigError::Invalid(format!(
                        "observability.private_agent_vars names undeclared variable {var}"
                    )));
                }
            }
        }
        if let Some(rule) = &self.simulation.termination {
            if !schema.global_vars.contains_key(&rule.var) {
                return Err(ConfigError::Invalid(format!(
                    "simulation.termination.var names undeclared variable {}",
                    rule.var
                )));
            }
        }
        Ok(schema)
    }

    /// The config as a JSON value, for `RunMetadata.config_snapshot`.
    #[must_use]
    pub fn snapshot_value(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("config serialization is infallible")
    }
}

fn default_true() -> bool {
    true
}

fn default_connectivity() -> u8 {
    4
}

fn default_model() -> String {
    "llama3.2".to_owned()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    1
}

fn default_temperature() -> f64 {
    0.7
}
