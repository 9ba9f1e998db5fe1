//! Start/stop state shared by the fetch manager and the dispatcher
//!
//! A component moves `Idle -> Running -> Stopping -> Stopped` exactly once.
//! Its tasks hold a [`StopSignal`] and check it at loop boundaries.

use crate::{Result, RillError};
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

pub struct Lifecycle {
    component: &'static str,
    state: watch::Sender<RunState>,
}

impl Lifecycle {
    pub fn new(component: &'static str) -> Self {
        let (state, _) = watch::channel(RunState::Idle);
        Self { component, state }
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// Fails unless the component is still idle
    pub fn ensure_idle(&self) -> Result<()> {
        match self.state() {
            RunState::Idle => Ok(()),
            _ => Err(RillError::InvalidState(format!(
                "{} has already been started",
                self.component
            ))),
        }
    }

    /// Moves `Idle -> Running` and hands out the signal tasks watch
    pub fn begin(&self) -> Result<StopSignal> {
        let mut started = false;
        self.state.send_if_modified(|state| {
            if *state == RunState::Idle {
                *state = RunState::Running;
                started = true;
            }
            started
        });

        if !started {
            return Err(RillError::InvalidState(format!(
                "{} has already been started",
                self.component
            )));
        }
        Ok(StopSignal(self.state.subscribe()))
    }

    /// Moves `Running -> Stopping`
    pub fn request_stop(&self) -> Result<()> {
        let mut requested = false;
        self.state.send_if_modified(|state| {
            if *state == RunState::Running {
                *state = RunState::Stopping;
                requested = true;
            }
            requested
        });

        if !requested {
            return Err(RillError::InvalidState(format!(
                "{} is not running",
                self.component
            )));
        }
        Ok(())
    }

    pub fn finish(&self) {
        self.state.send_replace(RunState::Stopped);
    }

    pub async fn wait_stopped(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|state| *state == RunState::Stopped).await;
    }
}

/// Observed by every task of a running component
#[derive(Debug, Clone)]
pub struct StopSignal(watch::Receiver<RunState>);

impl StopSignal {
    pub fn is_stopping(&self) -> bool {
        *self.0.borrow() != RunState::Running
    }

    /// Resolves once stop has been requested
    pub async fn stopped(&mut self) {
        let _ = self.0.wait_for(|state| *state != RunState::Running).await;
    }

    /// Sleeps for `duration` unless stopped first
    ///
    /// Returns `false` if the sleep was interrupted.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.stopped() => false,
        }
    }
}
