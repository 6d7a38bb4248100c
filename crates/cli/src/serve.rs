//! `deckbg serve`: feed JSON-lines upload events into the orchestrator.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use deckbg_core::UserId;
use deckbg_service::{FileRef, Orchestrator, ServiceConfig};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;

use crate::local::LocalTransport;

/// One input line.
#[derive(Debug, Deserialize, PartialEq)]
pub struct Event {
    pub user: UserId,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    Start,
    Deck {
        /// Name the file was uploaded under. Defaults to the file name of
        /// `path`.
        #[serde(default)]
        name: Option<String>,
        path: PathBuf,
    },
    Image {
        path: PathBuf,
    },
}

type Service = Orchestrator<LocalTransport>;

pub fn run(config: ServiceConfig, outbox: PathBuf) -> Result<()> {
    config
        .prepare()
        .with_context(|| format!("Failed to create {}", config.work_dir.display()))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(serve(config, outbox))
}

async fn serve(config: ServiceConfig, outbox: PathBuf) -> Result<()> {
    log::info!(
        "Serving from {} with {} transform worker(s)",
        config.work_dir.display(),
        config.max_concurrent_transforms
    );

    let service = Arc::new(Orchestrator::new(config, LocalTransport::new(outbox)));
    let mut queues = UserQueues::default();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }

        let event: Event = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                log::warn!("Ignoring malformed event {:?}: {}", line, e);
                continue;
            }
        };

        let service = Arc::clone(&service);
        queues.push(event.user, async move {
            handle(&service, event.user, event.kind).await;
        });
    }

    queues.drain().await;
    Ok(())
}

/// The newest event task of each user still running.
///
/// Every task first waits for the one before it, so a user's events run in
/// arrival order while different users run in parallel. Finished tasks are
/// dropped on the next push.
#[derive(Default)]
struct UserQueues {
    tails: HashMap<UserId, JoinHandle<()>>,
}

impl UserQueues {
    fn push<F>(&mut self, user: UserId, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tails.retain(|_, task| !task.is_finished());

        let previous = self.tails.remove(&user);
        let task = tokio::spawn(async move {
            if let Some(previous) = previous {
                if let Err(e) = previous.await {
                    log::error!("Event task for user {} failed: {}", user, e);
                }
            }
            work.await;
        });
        self.tails.insert(user, task);
    }

    async fn drain(self) {
        for (user, task) in self.tails {
            if let Err(e) = task.await {
                log::error!("Event task for user {} failed: {}", user, e);
            }
        }
    }
}

async fn handle(service: &Service, user: UserId, kind: EventKind) {
    match kind {
        EventKind::Start => service.start(user).await,
        EventKind::Deck { name, path } => {
            let name = name.unwrap_or_else(|| {
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });
            let file = FileRef(path.to_string_lossy().into_owned());
            let outcome = service.deck_received(user, &name, &file).await;
            log::debug!("User {}: deck {} -> {:?}", user, name, outcome);
        }
        EventKind::Image { path } => {
            let file = FileRef(path.to_string_lossy().into_owned());
            let outcome = service.image_received(user, &file).await;
            log::debug!("User {}: image -> {:?}", user, outcome);
        }
    }
}
