//! Host loop for the wall scheduler.
//!
//! One task owns the [`Scheduler`]. Timers, user lines and finished flavor
//! fetches all arrive through a single `select!`, so scheduler state has
//! exactly one writer.

pub mod input;
pub mod sink;

pub use input::{UserLine, parse_line, spawn_stdin_reader};
pub use sink::{ConsoleSink, WallSink};

use crate::config::Config;
use crate::drip::{load_drip, persist_drip};
use crate::flavor::{FlavorResolver, create_resolver};
use crate::observability::{Observer, ObserverEvent, ObserverMetric, create_observer};
use crate::scheduler::{Commit, PostRequest, Scheduler, SchedulerEvent, WallId};
use crate::storage::{KeyValueStore, create_store};
use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const FETCH_CHANNEL_CAPACITY: usize = 64;

/// What a finished run did.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub duration: Duration,
    pub posts: u64,
    pub drip: f64,
}

pub struct WallRuntime {
    scheduler: Scheduler,
    resolver: Arc<FlavorResolver>,
    store: Arc<dyn KeyValueStore>,
    sink: Arc<dyn WallSink>,
    observer: Arc<dyn Observer>,
    context_limit: usize,
    seed: Option<u64>,
    posts: u64,
}

impl WallRuntime {
    pub fn new(
        scheduler: Scheduler,
        resolver: FlavorResolver,
        store: Arc<dyn KeyValueStore>,
        sink: Arc<dyn WallSink>,
        observer: Arc<dyn Observer>,
    ) -> Self {
        Self {
            scheduler,
            resolver: Arc::new(resolver),
            store,
            sink,
            observer,
            context_limit: 10,
            seed: None,
            posts: 0,
        }
    }

    /// Wire scheduler, flavor sources, store and observer from config.
    pub fn from_config(config: &Config, sink: Arc<dyn WallSink>) -> Result<Self> {
        let observer = create_observer(&config.observability);
        let scheduler = Scheduler::with_seed(
            config.bot_ids(),
            config.scheduler_settings(),
            config.scheduler.seed,
            observer.clone(),
        )?;
        let resolver = create_resolver(config, observer.clone())?;
        let store = create_store(&config.storage, &config.workspace_dir);
        Ok(Self::new(scheduler, resolver, store, sink, observer)
            .with_context_limit(config.scheduler.context_limit)
            .with_seed(config.scheduler.seed))
    }

    pub fn with_context_limit(mut self, limit: usize) -> Self {
        self.context_limit = limit;
        self
    }

    /// Recorded in the run-start event only; the scheduler is seeded at
    /// construction.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Run until `shutdown` resolves. Closing `input` does not stop the loop.
    pub async fn run<F>(mut self, mut input: mpsc::Receiver<String>, shutdown: F) -> Result<RunSummary>
    where
        F: Future<Output = ()>,
    {
        self.restore_drip().await;

        let started = Instant::now();
        self.observer.record_event(&ObserverEvent::RunStart {
            walls: self.scheduler.walls().len(),
            seed: self.seed,
        });
        info!(
            walls = self.scheduler.walls().len(),
            "Walls are live. Type \"<Wall>: <message>\" to post."
        );
        self.scheduler.start(Duration::ZERO);

        let (fetch_tx, mut fetch_rx) =
            mpsc::channel::<(PostRequest, String)>(FETCH_CHANNEL_CAPACITY);
        let mut input_open = true;
        tokio::pin!(shutdown);

        loop {
            let deadline = self.scheduler.next_due().map(|due| started + due);
            tokio::select! {
                () = &mut shutdown => break,
                () = sleep_until(deadline) => {
                    self.advance(started, &fetch_tx).await;
                }
                line = input.recv(), if input_open => match line {
                    Some(line) => {
                        self.advance(started, &fetch_tx).await;
                        self.handle_line(&line).await;
                    }
                    None => {
                        debug!("User input closed");
                        input_open = false;
                    }
                },
                Some((request, text)) = fetch_rx.recv() => {
                    self.advance(started, &fetch_tx).await;
                    self.commit_post(&request, text).await;
                }
            }
        }

        let drip = self.scheduler.drip().value();
        self.save_drip(drip).await;
        let duration = started.elapsed();
        self.observer.record_event(&ObserverEvent::RunEnd {
            duration,
            posts: self.posts,
        });
        self.observer.flush();
        info!(posts = self.posts, drip, "Walls stopped");

        Ok(RunSummary {
            duration,
            posts: self.posts,
            drip,
        })
    }

    async fn restore_drip(&mut self) {
        match load_drip(self.store.as_ref()).await {
            Ok(value) => {
                self.scheduler.drip_mut().set(value);
                debug!(value, "Restored drip accumulator");
            }
            Err(e) => warn!("Failed to restore drip value, starting from zero: {e:#}"),
        }
    }

    async fn advance(&mut self, started: Instant, fetch_tx: &mpsc::Sender<(PostRequest, String)>) {
        for event in self.scheduler.advance(started.elapsed()) {
            match event {
                SchedulerEvent::PostDue(request) => self.spawn_fetch(request, fetch_tx),
                SchedulerEvent::DripAccrued { value } => {
                    self.observer
                        .record_metric(&ObserverMetric::DripValue(value));
                    self.save_drip(value).await;
                }
            }
        }
    }

    fn spawn_fetch(&self, request: PostRequest, fetch_tx: &mpsc::Sender<(PostRequest, String)>) {
        let context = self
            .scheduler
            .walls()
            .context(&request.wall, self.context_limit)
            .unwrap_or_default();
        let resolver = self.resolver.clone();
        let tx = fetch_tx.clone();
        tokio::spawn(async move {
            let text = resolver.resolve(&request.bot, &context).await;
            if tx.send((request, text)).await.is_err() {
                debug!("Runtime stopped before a fetched post could be committed");
            }
        });
    }

    async fn handle_line(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        let Some(parsed) = parse_line(line) else {
            warn!("Expected \"<Wall>: <message>\", got {line:?}");
            return;
        };
        let Some(wall) = self.scheduler.walls().resolve(parsed.wall).cloned() else {
            warn!("Unknown wall '{}'", parsed.wall);
            return;
        };
        match self.scheduler.submit_user(&wall, parsed.text) {
            Ok(Some(commit)) => self.committed(&wall, commit).await,
            Ok(None) => {}
            Err(e) => warn!("Failed to post on {wall}: {e}"),
        }
    }

    async fn commit_post(&mut self, request: &PostRequest, text: String) {
        match self.scheduler.commit_post(request, text) {
            Ok(commit) => self.committed(&request.wall, commit).await,
            Err(e) => {
                warn!("Dropping {} post by {} on {}: {e}", request.tag, request.bot, request.wall);
                self.observer.record_event(&ObserverEvent::Error {
                    component: "scheduler".into(),
                    message: e.to_string(),
                });
            }
        }
    }

    async fn committed(&mut self, wall: &WallId, commit: Commit) {
        self.posts += 1;
        self.sink.on_post(wall, &commit.message);
        if let Some(grant) = &commit.reward {
            self.sink.on_reward(grant);
            let value = self.scheduler.drip().value();
            self.save_drip(value).await;
        }
    }

    async fn save_drip(&self, value: f64) {
        if let Err(e) = persist_drip(self.store.as_ref(), value).await {
            warn!("Failed to persist drip value: {e:#}");
            self.observer.record_event(&ObserverEvent::Error {
                component: "store".into(),
                message: format!("{e:#}"),
            });
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
