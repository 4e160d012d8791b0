//! Bootstrap: turns the plugin catalog into running plugins.
//!
//! ```rust,ignore
//! let table = Arc::new(MemoryDispatchTable::new());
//! let runtime = Runtime::builder()
//!     .config_file("switchyard.toml")
//!     .build(table.clone())?;
//!
//! runtime.start().await?;
//! table.dispatch(Update::message("/sign")).await;
//! runtime.shutdown().await?;
//! ```

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use switchyard_core::{DispatchTable, Scheduler};
use switchyard_framework::{HostSetup, Lifecycle, PluginFactory, catalog_all};
use tokio::signal;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigLoader, SwitchyardConfig};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use crate::scheduler::TokioScheduler;

/// Owns one host per enabled plugin, in catalog order.
pub struct Runtime {
    config: SwitchyardConfig,
    scheduler: Arc<dyn Scheduler>,
    hosts: Vec<Box<dyn Lifecycle>>,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("plugins", &self.plugin_names())
            .finish()
    }
}

impl Runtime {
    /// Instantiates every catalog plugin not listed in `plugins.disabled`.
    ///
    /// Jobs run on a [`TokioScheduler`] unless replaced with
    /// [`with_scheduler`](Self::with_scheduler).
    pub fn new(config: SwitchyardConfig, table: Arc<dyn DispatchTable>) -> Self {
        Self::from_factories(config, table, catalog_all())
    }

    /// Like [`new`](Self::new), over an explicit set of factories.
    pub fn from_factories<I>(config: SwitchyardConfig, table: Arc<dyn DispatchTable>, factories: I) -> Self
    where
        I: IntoIterator<Item = &'static PluginFactory>,
    {
        let factories: Vec<_> = factories.into_iter().collect();
        for name in &config.plugins.disabled {
            if !factories.iter().any(|f| f.name == name.as_str()) {
                warn!(plugin = %name, "disabled plugin is not registered");
            }
        }

        let hosts: Vec<Box<dyn Lifecycle>> = factories
            .into_iter()
            .filter(|factory| {
                let disabled = config.plugins.is_disabled(factory.name);
                if disabled {
                    debug!(plugin = factory.name, "plugin disabled by configuration");
                }
                !disabled
            })
            .map(|factory| {
                let setup = HostSetup::new(Arc::clone(&table))
                    .with_config(config.plugins.section(factory.name));
                factory.create(setup)
            })
            .collect();

        info!(plugins = hosts.len(), "runtime created");
        Self {
            config,
            scheduler: Arc::new(TokioScheduler::new()),
            hosts,
        }
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn config(&self) -> &SwitchyardConfig {
        &self.config
    }

    /// Names of the instantiated plugins, in start order.
    pub fn plugin_names(&self) -> Vec<&'static str> {
        self.hosts.iter().map(|host| host.name()).collect()
    }

    pub fn plugin(&self, name: &str) -> Option<&dyn Lifecycle> {
        self.hosts
            .iter()
            .find(|host| host.name() == name)
            .map(|host| host.as_ref())
    }

    /// Installs every plugin, then its jobs.
    ///
    /// A plugin that fails is logged and skipped; the others still start.
    /// The first failure is returned.
    pub async fn start(&self) -> RuntimeResult {
        info!(plugins = self.hosts.len(), "starting plugins");
        let mut first_error = None;

        for host in &self.hosts {
            let result = match host.install().await {
                Ok(()) => host.install_jobs(self.scheduler.as_ref()).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => debug!(plugin = host.name(), group = %host.group(), "plugin started"),
                Err(e) => {
                    error!(plugin = host.name(), error = %e, "plugin failed to start");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => {
                info!("all plugins started");
                Ok(())
            }
        }
    }

    /// Reloads one plugin by name.
    pub async fn reload(&self, name: &str) -> RuntimeResult {
        let host = self
            .plugin(name)
            .ok_or_else(|| RuntimeError::UnknownPlugin(name.to_string()))?;
        info!(plugin = name, "reloading plugin");
        host.reload().await?;
        Ok(())
    }

    /// Cancels jobs and uninstalls every plugin, in reverse start order.
    ///
    /// Keeps going past failures and returns the first one.
    pub async fn shutdown(&self) -> RuntimeResult {
        info!("shutting down plugins");
        let mut first_error = None;

        for host in self.hosts.iter().rev() {
            host.uninstall_jobs(self.scheduler.as_ref()).await;
            if let Err(e) = host.uninstall().await {
                error!(plugin = host.name(), error = %e, "plugin failed to shut down cleanly");
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), |e| Err(e.into()))
    }

    /// Starts, waits for Ctrl+C or SIGTERM, then shuts down.
    pub async fn run(&self) -> RuntimeResult {
        self.run_until(wait_for_signal()).await
    }

    /// Starts, waits for `shutdown`, then shuts down.
    ///
    /// Plugins that failed to start are reported but do not stop the others
    /// from running.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult
    where
        F: Future<Output = ()>,
    {
        if let Err(e) = self.start().await {
            warn!(error = %e, "running with some plugins not started");
        }
        shutdown.await;
        self.shutdown().await
    }
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal as unix_signal};

        match unix_signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("received Ctrl+C, shutting down"),
                    _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
                }
                return;
            }
            Err(e) => warn!(error = %e, "failed to register SIGTERM handler"),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl+C, shutting down"),
        Err(e) => error!(error = %e, "failed to listen for Ctrl+C, shutting down"),
    }
}

/// Loads configuration, sets up logging and creates a [`Runtime`].
pub struct RuntimeBuilder {
    loader: ConfigLoader,
    init_logging: bool,
    scheduler: Option<Arc<dyn Scheduler>>,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            loader: ConfigLoader::new(),
            init_logging: true,
            scheduler: None,
        }
    }

    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.loader = self.loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.loader = self.loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.loader = self.loader.search_path(path);
        self
    }

    pub fn without_env(mut self) -> Self {
        self.loader = self.loader.without_env();
        self
    }

    pub fn merge(mut self, config: SwitchyardConfig) -> Self {
        self.loader = self.loader.merge(config);
        self
    }

    /// Skips installing the global log subscriber.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn build(self, table: Arc<dyn DispatchTable>) -> RuntimeResult<Runtime> {
        let config = self.loader.load()?;
        if self.init_logging {
            logging::init_from_config(&config.logging);
        }
        info!(
            log_level = %config.logging.level,
            log_format = ?config.logging.format,
            "runtime configuration loaded"
        );

        let runtime = Runtime::new(config, table);
        Ok(match self.scheduler {
            Some(scheduler) => runtime.with_scheduler(scheduler),
            None => runtime,
        })
    }
}
