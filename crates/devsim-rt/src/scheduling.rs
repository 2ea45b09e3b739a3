//! ---
//! devsim_section: "01-core-functionality"
//! devsim_subsection: "module"
//! devsim_type: "source"
//! devsim_scope: "code"
//! devsim_description: "Runtime helpers supporting the simulation scheduler."
//! devsim_version: "v0.1.0"
//! devsim_owner: "tbd"
//! ---
use std::time::Duration;

use anyhow::Result;
use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::error;

/// Fixed-period ticker. Late ticks are delayed rather than burst.
#[derive(Debug)]
pub struct RateLimiter {
    interval: tokio::time::Interval,
}

impl RateLimiter {
    /// First tick completes immediately.
    pub fn new(period: Duration) -> Self {
        Self::starting_at(Instant::now(), period)
    }

    /// First tick completes one full period from now, like a timer with an
    /// initial due time equal to its period.
    pub fn delayed(period: Duration) -> Self {
        Self::starting_at(Instant::now() + period, period)
    }

    fn starting_at(start: Instant, period: Duration) -> Self {
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }

    pub fn period(&self) -> Duration {
        self.interval.period()
    }

    pub async fn tick(&mut self) -> Instant {
        self.interval.tick().await
    }
}

/// Tracks long-lived tasks so they can be joined at shutdown.
#[derive(Debug, Default)]
pub struct TaskSet {
    label: &'static str,
    tasks: Vec<JoinHandle<()>>,
}

impl TaskSet {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            tasks: Vec::new(),
        }
    }

    pub fn spawn<F>(&mut self, fut: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.tasks.push(tokio::spawn(fut));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every task. Join failures are logged; the first one is returned
    /// after all tasks have been awaited.
    pub async fn join(self) -> Result<usize> {
        let label = self.label;
        let total = self.tasks.len();
        let mut first_failure = None;
        for outcome in join_all(self.tasks).await {
            if let Err(err) = outcome {
                error!(tasks = label, error = %err, "task join error");
                first_failure.get_or_insert(err);
            }
        }
        match first_failure {
            Some(err) => Err(anyhow::anyhow!("{} task join failure: {}", label, err)),
            None => Ok(total),
        }
    }
}
