/// Conductor service settings, constructed at startup and injected into the
/// components that need them.
#[derive(Debug, Clone)]
pub struct ConductorConfig {
    /// Fleet-unique hostname; doubles as the reservation holder id.
    pub hostname: String,
    /// Seconds since the last heartbeat after which peers consider this
    /// conductor dead.
    pub max_time_interval: u64,
    /// Heartbeat period in seconds; must be well under `max_time_interval`.
    pub heartbeat_interval: u64,
    /// Advertised API endpoint, used only when no service catalog answers.
    pub api_url: Option<String>,
}

impl ConductorConfig {
    pub fn new(hostname: impl Into<String>) -> Self {
        ConductorConfig {
            hostname: hostname.into(),
            max_time_interval: 120,
            heartbeat_interval: 30,
            api_url: None,
        }
    }
}
