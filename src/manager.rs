//! Latest-wins suggestion recomputation
//!
//! The command line changes on every keystroke. Each submission gets a
//! generation number; results of an older generation are never published
//! once a newer one has been submitted.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::engine::CompletionEngine;
use crate::suggestion::SuggestionBlob;

/// Published result of one submission
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SuggestionUpdate {
    pub generation: u64,
    pub command: String,
    pub blob: Option<SuggestionBlob>,
}

pub struct SuggestionManager {
    engine: Arc<CompletionEngine>,
    cwd: PathBuf,
    generation: Arc<AtomicU64>,
    in_flight: Mutex<Option<JoinHandle<()>>>,
    updates: Arc<watch::Sender<SuggestionUpdate>>,
}

impl SuggestionManager {
    pub fn new(engine: Arc<CompletionEngine>, cwd: impl Into<PathBuf>) -> Self {
        let (updates, _) = watch::channel(SuggestionUpdate::default());
        Self {
            engine,
            cwd: cwd.into(),
            generation: Arc::new(AtomicU64::new(0)),
            in_flight: Mutex::new(None),
            updates: Arc::new(updates),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SuggestionUpdate> {
        self.updates.subscribe()
    }

    /// Most recently published update
    pub fn current(&self) -> SuggestionUpdate {
        self.updates.borrow().clone()
    }

    /// Recompute suggestions for `command` in the background, superseding
    /// any computation still in flight. Must be called within a tokio
    /// runtime.
    pub fn submit(&self, command: impl Into<String>) -> u64 {
        let command = command.into();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let engine = Arc::clone(&self.engine);
        let cwd = self.cwd.clone();
        let latest = Arc::clone(&self.generation);
        let updates = Arc::clone(&self.updates);
        let task = tokio::spawn(async move {
            let blob = engine.suggest(&command, &cwd).await;
            publish(
                &updates,
                &latest,
                SuggestionUpdate {
                    generation,
                    command,
                    blob,
                },
            );
        });

        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = in_flight.replace(task) {
            previous.abort();
        }
        generation
    }

    /// Compute suggestions for `command` directly. Returns `None` when a
    /// newer request was made while this one was running.
    pub async fn suggest_latest(&self, command: &str) -> Option<SuggestionBlob> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let blob = self.engine.suggest(command, &self.cwd).await;
        if self.generation.load(Ordering::SeqCst) != generation {
            log::debug!("dropping stale suggestions for `{}`", command);
            return None;
        }
        blob
    }
}

/// Publish `update` unless a newer generation exists or was already published
fn publish(updates: &watch::Sender<SuggestionUpdate>, latest: &AtomicU64, update: SuggestionUpdate) {
    updates.send_if_modified(|current| {
        if update.generation != latest.load(Ordering::SeqCst) || update.generation <= current.generation {
            return false;
        }
        *current = update;
        true
    });
}

impl Drop for SuggestionManager {
    fn drop(&mut self) {
        if let Some(task) = self
            .in_flight
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::AliasTable;
    use crate::shell::ShellType;
    use crate::spec::{ArgSpec, Generator, StaticRegistry, Subcommand, SuggestionSpec};
    use futures_util::FutureExt;
    use std::time::Duration;

    /// `echo <word>` suggests the word back, taking 300ms for "slow"
    fn engine() -> Arc<CompletionEngine> {
        let generator = Generator::custom(|tokens, _, _| {
            async move {
                let word = tokens.last().cloned().unwrap_or_default();
                if word == "slow" {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                }
                Ok::<_, anyhow::Error>(vec![SuggestionSpec::new(word)])
            }
            .boxed()
        });
        let spec = Subcommand::new("echo").arg(ArgSpec::new("word").generator(generator));
        let registry = StaticRegistry::new().with_spec(spec);
        Arc::new(
            CompletionEngine::new(Arc::new(registry), ShellType::Bash).with_aliases(AliasTable::new()),
        )
    }

    #[tokio::test]
    async fn test_stale_result_never_published() {
        let manager = SuggestionManager::new(engine(), ".");
        let mut rx = manager.subscribe();

        let observed = tokio::spawn(async move {
            let mut seen = vec![];
            while let Ok(Ok(())) = tokio::time::timeout(Duration::from_millis(800), rx.changed()).await {
                seen.push(rx.borrow_and_update().command.clone());
            }
            seen
        });

        manager.submit("echo slow");
        tokio::time::sleep(Duration::from_millis(20)).await;
        let latest = manager.submit("echo fast");

        let seen = observed.await.unwrap();
        assert_eq!(seen, vec!["echo fast"]);

        let current = manager.current();
        assert_eq!(current.generation, latest);
        let blob = current.blob.unwrap();
        assert_eq!(blob.suggestions[0].name, "fast");
    }

    #[tokio::test]
    async fn test_suggest_latest_drops_superseded_request() {
        let manager = SuggestionManager::new(engine(), ".");
        let (slow, fast) = tokio::join!(manager.suggest_latest("echo slow"), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            manager.suggest_latest("echo fast").await
        });
        assert!(slow.is_none());
        assert_eq!(fast.unwrap().suggestions[0].name, "fast");
    }

    #[tokio::test]
    async fn test_single_submission_is_published() {
        let manager = SuggestionManager::new(engine(), ".");
        let mut rx = manager.subscribe();
        let generation = manager.submit("echo hi");
        rx.changed().await.unwrap();
        let update = rx.borrow().clone();
        assert_eq!(update.generation, generation);
        assert_eq!(update.command, "echo hi");
    }
}
