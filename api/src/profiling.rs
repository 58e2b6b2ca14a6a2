//! Continuous profiling agent start-up
//!
//! Started once at boot and left running for the life of the process. With
//! the `profiling` feature the samples go to a Pyroscope server; without it
//! the call only records what would have been started.

use anyhow::Result;
use tracing::{info, warn};

use crate::config::ProfilingConfig;

/// Keeps the agent alive; dropping it does not wait for the sampler
#[derive(Default)]
pub struct ProfilingHandle {
    #[cfg(feature = "profiling")]
    _agent: Option<pyroscope::PyroscopeAgent<pyroscope::pyroscope::PyroscopeAgentRunning>>,
}

impl ProfilingHandle {
    pub fn is_running(&self) -> bool {
        #[cfg(feature = "profiling")]
        {
            self._agent.is_some()
        }
        #[cfg(not(feature = "profiling"))]
        {
            false
        }
    }
}

/// Start the profiling agent if configured
///
/// Failure to start is logged and otherwise ignored; the server runs the same
/// with or without a profiler attached.
pub fn start_profiling(config: &ProfilingConfig) -> ProfilingHandle {
    if !config.enabled {
        return ProfilingHandle::default();
    }

    match start_agent(config) {
        Ok(handle) => handle,
        Err(e) => {
            warn!(
                server_address = %config.server_address,
                error = %e,
                "Failed to start profiling agent"
            );
            ProfilingHandle::default()
        }
    }
}

#[cfg(feature = "profiling")]
fn start_agent(config: &ProfilingConfig) -> Result<ProfilingHandle> {
    use pyroscope::PyroscopeAgent;
    use pyroscope_pprofrs::{PprofConfig, pprof_backend};

    let tags: Vec<(&str, &str)> = config
        .tags
        .iter()
        .map(|(key, value)| (key.as_str(), value.as_str()))
        .collect();

    let agent = PyroscopeAgent::builder(
        config.server_address.as_str(),
        config.application_name.as_str(),
    )
    .backend(pprof_backend(
        PprofConfig::new().sample_rate(config.sample_rate),
    ))
    .tags(tags)
    .build()?;
    let running = agent.start()?;

    info!(
        application = %config.application_name,
        server_address = %config.server_address,
        sample_rate = config.sample_rate,
        "Profiling agent started"
    );

    Ok(ProfilingHandle {
        _agent: Some(running),
    })
}

#[cfg(not(feature = "profiling"))]
fn start_agent(config: &ProfilingConfig) -> Result<ProfilingHandle> {
    info!(
        application = %config.application_name,
        server_address = %config.server_address,
        sample_rate = config.sample_rate,
        tags = ?config.tags,
        "Profiling requested but this build has no profiler, rebuild with --features profiling"
    );
    Ok(ProfilingHandle::default())
}
