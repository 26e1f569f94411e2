//! Background checkpoint I/O.
//!
//! The worker thread owns the [`CheckpointStore`]. The tick thread sends it
//! jobs and drains completions without blocking. Loads carry a generation
//! number; only the newest requested load is ever delivered.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chronosta_common::EraId;
use chronosta_kernel::World;

use crate::CheckpointError;
use crate::record::{CheckpointRecord, SlotId, SlotSummary};
use crate::store::CheckpointStore;

enum Job {
    Save {
        slot: SlotId,
        world: Arc<World>,
        era: EraId,
    },
    Load {
        slot: SlotId,
        generation: u64,
    },
    Shutdown,
}

/// Outcome of a finished job.
#[derive(Debug)]
pub enum Completion {
    Saved {
        slot: SlotId,
        result: Result<SlotSummary, CheckpointError>,
    },
    Loaded {
        slot: SlotId,
        generation: u64,
        result: Result<CheckpointRecord, CheckpointError>,
    },
}

/// Handle to the checkpoint thread.
pub struct CheckpointWorker {
    jobs: Sender<Job>,
    done: Receiver<Completion>,
    latest_load: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl CheckpointWorker {
    /// Move `store` onto a new worker thread.
    pub fn spawn(store: CheckpointStore) -> Result<Self, CheckpointError> {
        let (jobs, job_rx) = mpsc::channel::<Job>();
        let (done_tx, done) = mpsc::channel::<Completion>();
        let latest_load = Arc::new(AtomicU64::new(0));
        let latest = Arc::clone(&latest_load);

        let handle = thread::Builder::new()
            .name("checkpoint-io".into())
            .spawn(move || run(store, job_rx, done_tx, latest))?;

        Ok(Self {
            jobs,
            done,
            latest_load,
            handle: Some(handle),
        })
    }

    /// Queue a save. Fire and forget: the outcome arrives as
    /// [`Completion::Saved`].
    pub fn save(&self, slot: SlotId, world: Arc<World>, era: EraId) -> Result<(), CheckpointError> {
        self.jobs
            .send(Job::Save { slot, world, era })
            .map_err(|_| CheckpointError::WorkerGone)
    }

    /// Queue a load and return its generation. Any earlier load still
    /// pending is superseded.
    pub fn request_load(&self, slot: SlotId) -> Result<u64, CheckpointError> {
        let generation = self.latest_load.fetch_add(1, Ordering::SeqCst) + 1;
        self.jobs
            .send(Job::Load { slot, generation })
            .map_err(|_| CheckpointError::WorkerGone)?;
        tracing::debug!(%slot, generation, "load requested");
        Ok(generation)
    }

    /// Generation of the newest load request, 0 before the first.
    pub fn latest_load(&self) -> u64 {
        self.latest_load.load(Ordering::SeqCst)
    }

    /// Drain finished jobs without blocking. Superseded loads are dropped.
    pub fn poll(&self) -> Vec<Completion> {
        let mut out = Vec::new();
        loop {
            match self.done.try_recv() {
                Ok(c) => {
                    if self.is_current(&c) {
                        out.push(c);
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tracing::warn!("checkpoint worker disconnected");
                    break;
                }
            }
        }
        out
    }

    /// Block up to `timeout` for the next deliverable completion.
    pub fn wait(&self, timeout: Duration) -> Option<Completion> {
        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.done.recv_timeout(left) {
                Ok(c) if self.is_current(&c) => return Some(c),
                Ok(_) => continue,
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    /// Finish queued jobs and join the thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn is_current(&self, c: &Completion) -> bool {
        match c {
            Completion::Loaded { generation, .. } => {
                let current = *generation == self.latest_load();
                if !current {
                    tracing::debug!(generation, "dropping superseded load");
                }
                current
            }
            Completion::Saved { .. } => true,
        }
    }

    fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.jobs.send(Job::Shutdown);
            if handle.join().is_err() {
                tracing::error!("checkpoint worker panicked");
            }
        }
    }
}

impl Drop for CheckpointWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    store: CheckpointStore,
    jobs: Receiver<Job>,
    done: Sender<Completion>,
    latest_load: Arc<AtomicU64>,
) {
    let _span = tracing::info_span!("checkpoint_worker").entered();
    for job in jobs {
        let completion = match job {
            Job::Save { slot, world, era } => Completion::Saved {
                slot,
                result: store.save(slot, &world, era),
            },
            Job::Load { slot, generation } => {
                if generation < latest_load.load(Ordering::SeqCst) {
                    tracing::debug!(%slot, generation, "skipping stale load");
                    continue;
                }
                Completion::Loaded {
                    slot,
                    generation,
                    result: match slot {
                        SlotId::Suspend => store.resume(),
                        _ => store.load_with_fallback(slot),
                    },
                }
            }
            Job::Shutdown => break,
        };
        if let Completion::Saved {
            result: Err(e), ..
        }
        | Completion::Loaded {
            result: Err(e), ..
        } = &completion
        {
            tracing::warn!(error = %e, fatal = e.is_fatal(), "checkpoint job failed");
        }
        if done.send(completion).is_err() {
            break;
        }
    }
    tracing::debug!("checkpoint worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{other_world, sample_world};

    const WAIT: Duration = Duration::from_secs(10);

    fn worker(dir: &tempfile::TempDir) -> CheckpointWorker {
        let store = CheckpointStore::open(dir.path(), 3).unwrap();
        CheckpointWorker::spawn(store).unwrap()
    }

    #[test]
    fn save_then_load_through_worker() {
        let tmp = tempfile::tempdir().unwrap();
        let w = worker(&tmp);
        let world = Arc::new(sample_world());
        w.save(SlotId::Quick(0), Arc::clone(&world), world.era()).unwrap();
        match w.wait(WAIT) {
            Some(Completion::Saved { slot, result }) => {
                assert_eq!(slot, SlotId::Quick(0));
                assert_eq!(result.unwrap().tick, world.tick());
            }
            other => panic!("expected save completion, got {other:?}"),
        }

        let generation = w.request_load(SlotId::Quick(0)).unwrap();
        match w.wait(WAIT) {
            Some(Completion::Loaded {
                generation: g,
                result,
                ..
            }) => {
                assert_eq!(g, generation);
                assert_eq!(result.unwrap().world, *world);
            }
            other => panic!("expected load completion, got {other:?}"),
        }
    }

    #[test]
    fn only_newest_load_is_delivered() {
        let tmp = tempfile::tempdir().unwrap();
        let w = worker(&tmp);
        let first = sample_world();
        let second = other_world();
        w.save(SlotId::Quick(0), Arc::new(first), EraId::Medieval).unwrap();
        w.save(SlotId::Quick(1), Arc::new(second.clone()), EraId::Futuristic)
            .unwrap();

        let g1 = w.request_load(SlotId::Quick(0)).unwrap();
        let g2 = w.request_load(SlotId::Quick(1)).unwrap();
        assert!(g2 > g1);
        assert_eq!(w.latest_load(), g2);

        let mut loads = Vec::new();
        let deadline = Instant::now() + WAIT;
        while loads.is_empty() && Instant::now() < deadline {
            for c in w.poll() {
                if let Completion::Loaded { generation, result, .. } = c {
                    loads.push((generation, result));
                }
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(loads.len(), 1);
        let (generation, result) = loads.remove(0);
        assert_eq!(generation, g2);
        assert_eq!(result.unwrap().world, second);
    }

    #[test]
    fn failed_load_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let w = worker(&tmp);
        w.request_load(SlotId::Manual(2)).unwrap();
        match w.wait(WAIT) {
            Some(Completion::Loaded { result, .. }) => {
                let err = result.unwrap_err();
                assert!(matches!(err, CheckpointError::NotFound(SlotId::Manual(2))));
                assert!(!err.is_fatal());
            }
            other => panic!("expected load completion, got {other:?}"),
        }
    }

    #[test]
    fn suspend_load_removes_the_save() {
        let tmp = tempfile::tempdir().unwrap();
        let w = worker(&tmp);
        let world = sample_world();
        w.save(SlotId::Suspend, Arc::new(world.clone()), EraId::Medieval)
            .unwrap();
        assert!(matches!(w.wait(WAIT), Some(Completion::Saved { .. })));

        w.request_load(SlotId::Suspend).unwrap();
        match w.wait(WAIT) {
            Some(Completion::Loaded { result, .. }) => assert_eq!(result.unwrap().world, world),
            other => panic!("expected load completion, got {other:?}"),
        }
        w.shutdown();
        let store = CheckpointStore::open(tmp.path(), 3).unwrap();
        assert!(matches!(
            store.load(SlotId::Suspend),
            Err(CheckpointError::NotFound(SlotId::Suspend))
        ));
    }

    #[test]
    fn shutdown_finishes_queued_saves() {
        let tmp = tempfile::tempdir().unwrap();
        let w = worker(&tmp);
        w.save(SlotId::Manual(0), Arc::new(sample_world()), EraId::Medieval)
            .unwrap();
        w.shutdown();
        let store = CheckpointStore::open(tmp.path(), 3).unwrap();
        assert!(store.load(SlotId::Manual(0)).is_ok());
    }
}
