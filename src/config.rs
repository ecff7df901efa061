use std::time::Duration;

/// Configuration for the workflow manager and the demo binary.
///
/// Replaces ad-hoc top-level host/port variables: everything the workflow
/// needs is passed in explicitly at construction time.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Base URL of the Milvus v2 REST endpoint, e.g. "http://localhost:19530".
    /// None means the in-memory store is used (offline mode).
    pub milvus_endpoint: Option<String>,
    /// How often `load` polls the collection load state
    pub load_poll_interval: Duration,
    /// How long `load` waits for the Loaded state before giving up
    pub load_timeout: Duration,
    /// Bounded wait used by read-after-write verification
    pub visibility_timeout: Duration,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            milvus_endpoint: None,
            load_poll_interval: Duration::from_millis(200),
            load_timeout: Duration::from_secs(60),
            visibility_timeout: Duration::from_secs(10),
        }
    }
}

impl WorkflowConfig {
    /// Reads configuration from environment variables, falling back to
    /// defaults. `.env` loading is the binary's concern and happens before
    /// this is called.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(endpoint) = std::env::var("MILVUS_ENDPOINT") {
            if !endpoint.is_empty() {
                config.milvus_endpoint = Some(endpoint);
            }
        }
        if let Some(ms) = read_millis("MILVUS_LOAD_POLL_MS") {
            config.load_poll_interval = ms;
        }
        if let Some(ms) = read_millis("MILVUS_LOAD_TIMEOUT_MS") {
            config.load_timeout = ms;
        }
        if let Some(ms) = read_millis("MILVUS_VISIBILITY_TIMEOUT_MS") {
            config.visibility_timeout = ms;
        }

        config
    }
}

fn read_millis(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
}
