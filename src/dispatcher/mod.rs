//! Segment dispatcher
//!
//! Scans the datastore for domains that are neither claimed nor dispatched,
//! and for each one writes the next segment of uncrawled links and marks it
//! dispatched. Domains flow through a bounded channel to a fixed pool of
//! generator tasks; on stop the channel is closed, the generators drain it
//! and are joined.

mod segment;

pub use segment::select_segment;

use crate::config::DispatcherConfig;
use crate::lifecycle::{Lifecycle, RunState, StopSignal};
use crate::storage::{DispatchStore, StoreResult};
use crate::Result;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;

pub struct Dispatcher {
    config: DispatcherConfig,
    store: Arc<dyn DispatchStore>,
    lifecycle: Lifecycle,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig, store: Arc<dyn DispatchStore>) -> Self {
        Self {
            config,
            store,
            lifecycle: Lifecycle::new("dispatcher"),
        }
    }

    pub fn state(&self) -> RunState {
        self.lifecycle.state()
    }

    /// Scans and dispatches every `dispatch-interval` until stopped
    pub async fn start(&self) -> Result<()> {
        let mut stop = self.lifecycle.begin()?;
        tracing::info!(
            generators = self.config.num_concurrent_domains,
            cap = self.config.max_links_per_segment,
            "Dispatcher started"
        );

        let (tx, generators) = self.spawn_generators();

        loop {
            self.scan(&tx, &mut stop).await;

            if !stop.sleep(self.config.dispatch_interval()).await {
                break;
            }
        }

        drop(tx);
        let dispatched = join_generators(generators).await;

        self.lifecycle.finish();
        tracing::info!(dispatched, "Dispatcher stopped");
        Ok(())
    }

    /// Signals the scan loop and waits for the generators to drain
    pub async fn stop(&self) -> Result<()> {
        self.lifecycle.request_stop()?;
        self.lifecycle.wait_stopped().await;
        Ok(())
    }

    /// Runs a single scan-and-generate pass
    ///
    /// Returns the number of domains dispatched.
    pub async fn dispatch_once(&self) -> Result<usize> {
        let domains = self.store.undispatched_domains().await?;
        let (tx, generators) = self.spawn_generators();

        for domain in domains {
            if tx.send(domain).await.is_err() {
                break;
            }
        }

        drop(tx);
        Ok(join_generators(generators).await)
    }

    /// Generates and writes the segment of one domain
    ///
    /// Returns `false` if the domain was claimed or dispatched concurrently.
    pub async fn generate_segment(&self, domain: &str) -> Result<bool> {
        let written = generate(
            self.store.as_ref(),
            domain,
            self.config.max_links_per_segment,
        )
        .await?;
        Ok(written.is_some())
    }

    async fn scan(&self, tx: &mpsc::Sender<String>, stop: &mut StopSignal) {
        let domains = match self.store.undispatched_domains().await {
            Ok(domains) => domains,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list undispatched domains");
                return;
            }
        };

        if !domains.is_empty() {
            tracing::debug!(count = domains.len(), "Found undispatched domains");
        }

        for domain in domains {
            tokio::select! {
                sent = tx.send(domain) => {
                    if sent.is_err() {
                        return;
                    }
                }
                _ = stop.stopped() => return,
            }
        }
    }

    fn spawn_generators(&self) -> (mpsc::Sender<String>, JoinSet<usize>) {
        let workers = self.config.num_concurrent_domains.max(1);
        let (tx, rx) = mpsc::channel::<String>(workers * 2);
        let rx = Arc::new(Mutex::new(rx));

        let mut generators = JoinSet::new();
        for _ in 0..workers {
            let rx = Arc::clone(&rx);
            let store = Arc::clone(&self.store);
            let cap = self.config.max_links_per_segment;

            generators.spawn(async move {
                let mut dispatched = 0;
                loop {
                    let next = rx.lock().await.recv().await;
                    let Some(domain) = next else {
                        break;
                    };

                    match generate(store.as_ref(), &domain, cap).await {
                        Ok(Some(_)) => dispatched += 1,
                        Ok(None) => {}
                        Err(e) => {
                            tracing::warn!(domain = %domain, error = %e, "Segment generation failed")
                        }
                    }
                }
                dispatched
            });
        }

        (tx, generators)
    }
}

async fn join_generators(mut generators: JoinSet<usize>) -> usize {
    let mut total = 0;
    while let Some(joined) = generators.join_next().await {
        match joined {
            Ok(count) => total += count,
            Err(e) => tracing::error!(error = %e, "Segment generator panicked"),
        }
    }
    total
}

async fn generate(store: &dyn DispatchStore, domain: &str, cap: usize) -> StoreResult<Option<usize>> {
    let history = store.link_history(domain).await?;
    let links = select_segment(&history, cap);

    if !store.write_segment(domain, &links).await? {
        tracing::debug!(domain, "Domain changed hands, segment not written");
        return Ok(None);
    }

    tracing::debug!(domain, links = links.len(), "Dispatched segment");
    Ok(Some(links.len()))
}
