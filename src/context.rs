//! The query API.
//!
//! A [`Context`] starts out collecting configuration. The first query
//! freezes it: the engine is built from the configuration and every later
//! configuration call fails with [`ConfigError::AlreadyStarted`]. Local
//! zones and data stay editable for the context's whole life.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{info, warn};

use crate::cache::{self, Cache};
use crate::config::{Config, ConfigBuilder};
use crate::dns::{Name, Question};
use crate::error::{ConfigError, ResolveError};
use crate::resolver::{LocalZones, ResolutionResult, Resolver, ZoneType};
use crate::scheduler::{QueryHandle, Scheduler};
use crate::stats::{Stats, StatsSnapshot};
use crate::transport::{NetTransport, Transport};
use crate::trust::TrustStore;

const CACHE_SWEEP_PERIOD: Duration = Duration::from_secs(60);

enum Phase {
    Configuring {
        local: LocalZones,
        transport: Option<Arc<dyn Transport>>,
    },
    Running(Arc<Scheduler>),
}

struct State {
    builder: ConfigBuilder,
    phase: Phase,
}

pub struct Context {
    state: Mutex<State>,
    stats: Arc<Stats>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_name(name: &str) -> Result<Name, ConfigError> {
    name.parse().map_err(|_| ConfigError::InvalidValue {
        option: "name".to_string(),
        value: name.to_string(),
    })
}

impl Context {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                builder: ConfigBuilder::new(),
                phase: Phase::Configuring {
                    local: LocalZones::with_defaults(),
                    transport: None,
                },
            }),
            stats: Arc::new(Stats::new()),
        }
    }

    /// Use `transport` instead of the host's UDP and TCP sockets.
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        let context = Self::new();
        if let Phase::Configuring { transport: slot, .. } = &mut context.lock().phase {
            *slot = Some(transport);
        }
        context
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn configure<R>(
        &self,
        f: impl FnOnce(&mut ConfigBuilder) -> Result<R, ConfigError>,
    ) -> Result<R, ConfigError> {
        let mut state = self.lock();
        match state.phase {
            Phase::Configuring { .. } => f(&mut state.builder),
            Phase::Running(_) => Err(ConfigError::AlreadyStarted),
        }
    }

    fn local_zones<R>(&self, f: impl FnOnce(&mut LocalZones) -> R) -> R {
        let mut state = self.lock();
        match &mut state.phase {
            Phase::Configuring { local, .. } => f(local),
            Phase::Running(scheduler) => scheduler.resolver().with_local_zones(f),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.lock().phase, Phase::Running(_))
    }

    pub fn set_option(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.configure(|builder| builder.set_option(key, value))
    }

    pub fn get_option(&self, key: &str) -> Result<String, ConfigError> {
        self.lock().builder.get_option(key)
    }

    pub fn has_option(&self, key: &str) -> bool {
        self.lock().builder.has_option(key)
    }

    /// Set `key` if it is a recognised option. Returns whether it was;
    /// a recognised key with a bad value is still an error.
    pub fn try_option(&self, key: &str, value: &str) -> Result<bool, ConfigError> {
        if !self.has_option(key) {
            return Ok(false);
        }
        self.set_option(key, value)?;
        Ok(true)
    }

    /// The configuration as it stands, built the same way the engine
    /// builds it on first use.
    pub fn config(&self) -> Result<Config, ConfigError> {
        self.lock().builder.build()
    }

    pub fn set_forward(&self, addr: &str) -> Result<(), ConfigError> {
        self.configure(|builder| builder.set_forward(addr))
    }

    pub fn set_stub(&self, zone: &str, addr: &str, prime: bool) -> Result<(), ConfigError> {
        self.configure(|builder| builder.set_stub(zone, addr, prime))
    }

    pub fn set_resolv_conf(&self, path: Option<&Path>) -> Result<usize, ConfigError> {
        self.configure(|builder| builder.set_resolv_conf(path))
    }

    pub fn set_hosts(&self, path: Option<&Path>) -> Result<usize, ConfigError> {
        self.configure(|builder| builder.set_hosts(path))
    }

    pub fn add_trust_anchor(&self, text: &str) -> Result<usize, ConfigError> {
        self.configure(|builder| builder.add_trust_anchor(text))
    }

    pub fn add_trust_anchor_file(&self, path: &Path, autr: bool) -> Result<usize, ConfigError> {
        self.configure(|builder| builder.add_trust_anchor_file(path, autr))
    }

    pub fn add_trusted_keys(&self, path: &Path) -> Result<usize, ConfigError> {
        self.configure(|builder| builder.add_trusted_keys(path))
    }

    pub fn add_zone(&self, name: &str, kind: &str) -> Result<(), ConfigError> {
        let name = parse_name(name)?;
        let kind: ZoneType = kind.parse()?;
        self.local_zones(|zones| zones.add_zone(name, kind));
        Ok(())
    }

    /// Returns whether the zone existed.
    pub fn remove_zone(&self, name: &str) -> Result<bool, ConfigError> {
        let name = parse_name(name)?;
        Ok(self.local_zones(|zones| zones.remove_zone(&name)))
    }

    /// Add local data from a record in presentation format.
    pub fn add_data(&self, record: &str) -> Result<(), ConfigError> {
        self.local_zones(|zones| zones.add_data_text(record))
    }

    /// Returns whether any data was held for the name.
    pub fn remove_data(&self, name: &str) -> Result<bool, ConfigError> {
        let name = parse_name(name)?;
        Ok(self.local_zones(|zones| zones.remove_data(&name)))
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Submit a query, starting the engine on first use. Must be called from
    /// within a tokio runtime.
    pub fn submit(&self, name: &str, qtype: u16, qclass: u16) -> Result<QueryHandle, ResolveError> {
        let qname: Name = name
            .parse()
            .map_err(|_| ResolveError::InvalidName(name.to_string()))?;
        let scheduler = self.start()?;
        scheduler.submit(Question::new(qname, qtype, qclass))
    }

    pub async fn resolve(
        &self,
        name: &str,
        qtype: u16,
        qclass: u16,
    ) -> Result<ResolutionResult, ResolveError> {
        self.submit(name, qtype, qclass)?.await
    }

    /// The running scheduler, building it from the configuration first if
    /// needed.
    fn start(&self) -> Result<Arc<Scheduler>, ResolveError> {
        let mut state = self.lock();
        let State { builder, phase } = &mut *state;
        let (local, transport) = match phase {
            Phase::Running(scheduler) => return Ok(scheduler.clone()),
            Phase::Configuring { local, transport } => (local, transport),
        };

        let config = builder.build().map_err(|e| {
            warn!(error = %e, "configuration rejected at startup");
            ResolveError::NotRunning
        })?;

        let mut local = std::mem::take(local);
        for record in &config.hosts {
            local.add_data(record.clone());
        }
        let transport = transport
            .take()
            .unwrap_or_else(|| Arc::new(NetTransport::new(config.transport)));
        let cache = Arc::new(Cache::new(config.cache));
        cache::spawn_sweeper(&cache, CACHE_SWEEP_PERIOD);

        let resolver = Resolver::new(
            config.resolver,
            cache,
            TrustStore::new(config.anchors, config.validator),
            local,
            transport,
            self.stats.clone(),
        );
        let scheduler = Arc::new(Scheduler::new(Arc::new(resolver)));
        info!(version = crate::version(), "resolver started");
        *phase = Phase::Running(scheduler.clone());
        Ok(scheduler)
    }
}
