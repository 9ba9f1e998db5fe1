use super::worker::{FetchWorker, WorkerContext};
use super::{Handler, HttpTransport, LinkExtractor, MimeMatcher, Transport};
use crate::config::Config;
use crate::lifecycle::{Lifecycle, RunState};
use crate::storage::Datastore;
use crate::{Result, RillError};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Owns the fetch workers of one process
///
/// Configure with [`add_handler`](Self::add_handler),
/// [`set_datastore`](Self::set_datastore) and optionally
/// [`set_transport`](Self::set_transport), then run [`start`](Self::start)
/// on a background task and end it with [`stop`](Self::stop).
///
/// # Example
///
/// ```no_run
/// use rill::config::Config;
/// use rill::fetcher::{FetchManager, LoggingHandler};
/// use rill::storage::SqliteDatastore;
/// use std::sync::Arc;
///
/// # async fn example() -> rill::Result<()> {
/// let config = Config::default();
/// let manager = Arc::new(FetchManager::new(config.clone()));
/// manager.set_datastore(Arc::new(SqliteDatastore::open(&config.datastore)?))?;
/// manager.add_handler(Arc::new(LoggingHandler))?;
///
/// let running = tokio::spawn({
///     let manager = Arc::clone(&manager);
///     async move { manager.start().await }
/// });
///
/// // ... later
/// manager.stop().await?;
/// running.await.ok();
/// # Ok(())
/// # }
/// ```
pub struct FetchManager {
    config: Config,
    handlers: Mutex<Vec<Arc<dyn Handler>>>,
    store: Mutex<Option<Arc<dyn Datastore>>>,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    lifecycle: Lifecycle,
}

impl FetchManager {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            handlers: Mutex::new(Vec::new()),
            store: Mutex::new(None),
            transport: Mutex::new(None),
            lifecycle: Lifecycle::new("fetch manager"),
        }
    }

    pub fn state(&self) -> RunState {
        self.lifecycle.state()
    }

    pub fn add_handler(&self, handler: Arc<dyn Handler>) -> Result<()> {
        self.lifecycle.ensure_idle()?;
        self.handlers.lock().push(handler);
        Ok(())
    }

    pub fn set_datastore(&self, store: Arc<dyn Datastore>) -> Result<()> {
        self.lifecycle.ensure_idle()?;
        *self.store.lock() = Some(store);
        Ok(())
    }

    /// Replaces the default reqwest transport
    pub fn set_transport(&self, transport: Arc<dyn Transport>) -> Result<()> {
        self.lifecycle.ensure_idle()?;
        *self.transport.lock() = Some(transport);
        Ok(())
    }

    /// Runs `num-fetchers` workers until [`stop`](Self::stop) is called
    ///
    /// Fails immediately if no datastore was set or the manager was already
    /// started. On the way out every claim held by the datastore is released.
    pub async fn start(&self) -> Result<()> {
        self.lifecycle.ensure_idle()?;

        let store = self
            .store
            .lock()
            .clone()
            .ok_or_else(|| RillError::InvalidState("no datastore set".to_string()))?;

        let configured = self.transport.lock().clone();
        let transport = match configured {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(
                &self.config.user_agent,
                &self.config.fetcher,
            )?) as Arc<dyn Transport>,
        };

        let ctx = Arc::new(WorkerContext {
            store: Arc::clone(&store),
            transport,
            handlers: self.handlers.lock().clone(),
            config: self.config.fetcher.clone(),
            agent: self.config.user_agent.robots_name().to_string(),
            mime: MimeMatcher::new(&self.config.fetcher.accept_formats)?,
            links: LinkExtractor::new(&self.config.fetcher),
        });

        let stop = self.lifecycle.begin()?;
        let num_fetchers = self.config.fetcher.num_fetchers;
        tracing::info!(workers = num_fetchers, handlers = ctx.handlers.len(), "Fetch manager started");

        let mut workers = JoinSet::new();
        for id in 0..num_fetchers {
            workers.spawn(FetchWorker::new(id, Arc::clone(&ctx), stop.clone()).run());
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Fetch worker panicked");
            }
        }

        if let Err(e) = store.unclaim_all().await {
            tracing::warn!(error = %e, "Failed to release claims on shutdown");
        }

        self.lifecycle.finish();
        tracing::info!("Fetch manager stopped");
        Ok(())
    }

    /// Signals every worker and waits until all of them have exited
    pub async fn stop(&self) -> Result<()> {
        self.lifecycle.request_stop()?;
        tracing::info!("Stopping fetch manager");
        self.lifecycle.wait_stopped().await;
        Ok(())
    }
}
