use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::DomainError;

// ── State machines ───────────────────────────────────────────────────────────

/// Electrical power state of a node, as last observed or targeted.
///
/// `NoState` doubles as "unknown" for `power_state` and "no transition in
/// progress" for `target_power_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    #[default]
    NoState,
    PowerOn,
    PowerOff,
}

impl PowerState {
    /// States a caller may request through `change_node_power_state`.
    pub fn is_valid_target(&self) -> bool {
        matches!(self, PowerState::PowerOn | PowerState::PowerOff)
    }
}

impl std::fmt::Display for PowerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerState::NoState => write!(f, "no_state"),
            PowerState::PowerOn => write!(f, "power_on"),
            PowerState::PowerOff => write!(f, "power_off"),
        }
    }
}

impl FromStr for PowerState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "power_on" | "on" => Ok(PowerState::PowerOn),
            "power_off" | "off" => Ok(PowerState::PowerOff),
            "no_state" => Ok(PowerState::NoState),
            other => Err(DomainError::InvalidPowerTarget(other.to_string())),
        }
    }
}

/// Deployment lifecycle state of a node.
///
/// Transitions driven by the conductor:
///   NoState → Deploying → Active          (deploy, terminal)
///   NoState → Deploying → ...             (driver pending, callback completes)
///   Active | DeployFail | Error → Deleting → NoState   (tear-down)
///   Deploying | Deleting → Error          (driver failure)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionState {
    #[default]
    NoState,
    Deploying,
    DeployDone,
    Active,
    Deleting,
    Deleted,
    DeployFail,
    Error,
}

impl std::fmt::Display for ProvisionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProvisionState::NoState => "no_state",
            ProvisionState::Deploying => "deploying",
            ProvisionState::DeployDone => "deploy_done",
            ProvisionState::Active => "active",
            ProvisionState::Deleting => "deleting",
            ProvisionState::Deleted => "deleted",
            ProvisionState::DeployFail => "deploy_fail",
            ProvisionState::Error => "error",
        };
        write!(f, "{}", s)
    }
}

// ── Node ─────────────────────────────────────────────────────────────────────

/// A physical machine under management.
///
/// `id` is store-assigned and is the reservation lock key; `uuid` is the
/// stable external identifier. `reservation` holds the hostname of the
/// conductor currently owning the exclusive lock, or `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: i64,
    pub uuid: Uuid,
    pub chassis_uuid: Option<Uuid>,
    /// Name of the driver bundle that controls this node's hardware.
    pub driver: String,
    /// Driver-specific connection settings (addresses, credentials, ...).
    #[serde(default)]
    pub driver_info: HashMap<String, Value>,
    pub power_state: PowerState,
    /// Non-`NoState` while a power transition is in flight.
    pub target_power_state: PowerState,
    pub provision_state: ProvisionState,
    /// Non-`NoState` while a provisioning transition is in flight.
    pub target_provision_state: ProvisionState,
    /// The logical workload bound to this node, if any.
    pub instance_uuid: Option<Uuid>,
    /// Human-readable message from the most recent failed operation.
    pub last_error: Option<String>,
    /// Hostname of the conductor holding the exclusive lock.
    pub reservation: Option<String>,
    #[serde(default)]
    pub extra: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Node {
    /// A fresh, unprovisioned node. The store assigns `id` on create.
    pub fn new(driver: impl Into<String>) -> Self {
        Node {
            id: 0,
            uuid: Uuid::new_v4(),
            chassis_uuid: None,
            driver: driver.into(),
            driver_info: HashMap::new(),
            power_state: PowerState::NoState,
            target_power_state: PowerState::NoState,
            provision_state: ProvisionState::NoState,
            target_provision_state: ProvisionState::NoState,
            instance_uuid: None,
            last_error: None,
            reservation: None,
            extra: HashMap::new(),
            created_at: Utc::now(),
            updated_at: None,
        }
    }
}

// ── NodePatch ────────────────────────────────────────────────────────────────

// Distinguishes an absent field from an explicit `null`: absent deserializes
// to `None`, `null` to `Some(None)`.
fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

/// Pending field changes for `update_node`.
///
/// Each `Option` field is a change when `Some`; `instance_uuid` and
/// `chassis_uuid` use a second `Option` level so a patch can clear them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodePatch {
    pub uuid: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_info: Option<HashMap<String, Value>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub instance_uuid: Option<Option<Uuid>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub chassis_uuid: Option<Option<Uuid>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<HashMap<String, Value>>,
    /// Carried so `update_node` can refuse it; never applied. Power state is
    /// only ever mutated by `change_node_power_state`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_state: Option<PowerState>,
}

impl NodePatch {
    pub fn new(uuid: Uuid) -> Self {
        NodePatch {
            uuid,
            driver: None,
            driver_info: None,
            instance_uuid: None,
            chassis_uuid: None,
            extra: None,
            power_state: None,
        }
    }

    /// True when the patch would set `instance_uuid` to a value.
    pub fn associates_instance(&self) -> bool {
        matches!(self.instance_uuid, Some(Some(_)))
    }

    /// Write every changed field except `power_state` onto `node`.
    pub fn apply(&self, node: &mut Node) {
        if let Some(driver) = &self.driver {
            node.driver = driver.clone();
        }
        if let Some(info) = &self.driver_info {
            node.driver_info = info.clone();
        }
        if let Some(instance) = &self.instance_uuid {
            node.instance_uuid = *instance;
        }
        if let Some(chassis) = &self.chassis_uuid {
            node.chassis_uuid = *chassis;
        }
        if let Some(extra) = &self.extra {
            node.extra = extra.clone();
        }
    }
}

// ── Chassis ──────────────────────────────────────────────────────────────────

/// A labeling container grouping nodes. Destroying a chassis that still has
/// nodes attached is refused by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chassis {
    pub uuid: Uuid,
    pub description: Option<String>,
    #[serde(default)]
    pub extra: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Chassis {
    pub fn new(description: Option<String>) -> Self {
        Chassis {
            uuid: Uuid::new_v4(),
            description,
            extra: HashMap::new(),
            created_at: Utc::now(),
            updated_at: None,
        }
    }
}

// ── Port ─────────────────────────────────────────────────────────────────────

/// A MAC address owned by exactly one node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Port {
    pub uuid: Uuid,
    /// MAC address, lowercase colon-separated.
    pub address: String,
    pub node_id: i64,
    #[serde(default)]
    pub extra: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Port {
    pub fn new(address: impl Into<String>, node_id: i64) -> Self {
        Port {
            uuid: Uuid::new_v4(),
            address: address.into(),
            node_id,
            extra: HashMap::new(),
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    /// Accepts `aa:bb:cc:dd:ee:ff` (case-insensitive hex).
    pub fn validate_address(address: &str) -> Result<(), DomainError> {
        let octets: Vec<&str> = address.split(':').collect();
        let ok = octets.len() == 6
            && octets
                .iter()
                .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()));
        if ok {
            Ok(())
        } else {
            Err(DomainError::InvalidMacAddress(address.to_string()))
        }
    }
}

// ── Conductor ────────────────────────────────────────────────────────────────

/// Fleet membership row for one conductor process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conductor {
    pub hostname: String,
    /// Driver bundles this conductor currently loads, sorted by name.
    pub drivers: Vec<String>,
    /// Heartbeat; refreshed by the keepalive task.
    pub updated_at: DateTime<Utc>,
}

impl Conductor {
    /// A conductor is alive iff its heartbeat is younger than
    /// `max_time_interval_secs`.
    pub fn is_alive(&self, now: DateTime<Utc>, max_time_interval_secs: u64) -> bool {
        now.signed_duration_since(self.updated_at) < Duration::seconds(max_time_interval_secs as i64)
    }
}

// ── List parameters ──────────────────────────────────────────────────────────

/// Columns a listing may sort on. A closed set so stores can splice the name
/// into SQL safely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Id,
    Uuid,
    CreatedAt,
    UpdatedAt,
}

impl SortKey {
    pub fn column(&self) -> &'static str {
        match self {
            SortKey::Id => "id",
            SortKey::Uuid => "uuid",
            SortKey::CreatedAt => "created_at",
            SortKey::UpdatedAt => "updated_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

/// Marker pagination: `marker` is the uuid of the last row of the previous
/// page; results resume strictly after it in the requested order.
#[derive(Debug, Clone, Default)]
pub struct ListParams {
    pub limit: Option<u64>,
    pub marker: Option<Uuid>,
    pub sort_key: SortKey,
    pub sort_dir: SortDir,
}
