//! Background ingestion: documents -> chunks -> embeddings -> collection.
//!
//! Triggering never waits on index writes: it bumps the agent's generation,
//! cancels any older run, records `IN_PROGRESS` and queues a job. Jobs are
//! consumed by a bounded pool of workers. A run prepares everything in
//! memory and then swaps the agent's collection under a per-agent commit
//! lock, only if its generation is still the newest. The last trigger wins
//! and readers never see a half-written index.
//!
//! Status writes take a second per-agent lock held just around the
//! generation check and the store write, so a stale run cannot overwrite
//! the status of a newer one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, Instrument};

use crate::domain::{
    ports::{DocumentSource, EmbeddingService, RegistryNotifier, StatusStore, VectorStore},
    AgentName, ChunkMetadata, DocumentChunk, DomainError, Embedding, EmbeddingsStatus,
    IngestionStatus, TokenChunker,
};

const SHUTDOWN_REASON: &str = "cancelled by shutdown";

#[derive(Debug, Clone)]
pub struct IngestionSettings {
    pub collection_prefix: String,
    pub workers: usize,
    pub queue_capacity: usize,
    pub replace_existing: bool,
    pub embed_timeout: Duration,
    /// Bounds waiting for the agent's commit lock plus the index write.
    pub commit_timeout: Duration,
    pub status_timeout: Duration,
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            collection_prefix: "agent_".to_string(),
            workers: 4,
            queue_capacity: 64,
            replace_existing: true,
            embed_timeout: Duration::from_secs(120),
            commit_timeout: Duration::from_secs(300),
            status_timeout: Duration::from_secs(10),
        }
    }
}

/// Collaborators of the coordinator, constructed by the caller.
#[derive(Clone)]
pub struct IngestionDeps {
    pub documents: Arc<dyn DocumentSource>,
    pub embedding: Arc<dyn EmbeddingService>,
    pub vector_store: Arc<dyn VectorStore>,
    pub status_store: Arc<dyn StatusStore>,
    pub notifier: Option<Arc<dyn RegistryNotifier>>,
}

#[derive(Debug)]
struct IngestionJob {
    agent: AgentName,
    generation: u64,
    cancel: CancellationToken,
}

struct AgentRun {
    generation: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct AgentLocks {
    status: tokio::sync::Mutex<()>,
    commit: tokio::sync::Mutex<()>,
}

struct Inner {
    deps: IngestionDeps,
    chunker: TokenChunker,
    settings: IngestionSettings,
    /// Only agents with a run or deletion in flight have an entry.
    runs: Mutex<HashMap<AgentName, AgentRun>>,
    locks: Mutex<HashMap<AgentName, Arc<AgentLocks>>>,
    /// Shared by all agents so an agent's generations keep rising after its
    /// entry in `runs` is dropped.
    generations: AtomicU64,
    workers: Arc<Semaphore>,
    worker_permits: u32,
    shutdown: CancellationToken,
}

pub struct IngestionCoordinator {
    inner: Arc<Inner>,
    sender: mpsc::Sender<IngestionJob>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl IngestionCoordinator {
    /// Builds the coordinator and spawns its job consumer on the current
    /// tokio runtime.
    pub fn start(
        deps: IngestionDeps,
        chunker: TokenChunker,
        settings: IngestionSettings,
    ) -> Result<Self, DomainError> {
        if settings.workers == 0 || settings.queue_capacity == 0 {
            return Err(DomainError::configuration(
                "ingestion workers and queue capacity must be positive",
            ));
        }
        let worker_permits = u32::try_from(settings.workers)
            .map_err(|_| DomainError::configuration("too many ingestion workers"))?;
        if deps.embedding.dimension() != deps.vector_store.dimension() {
            return Err(DomainError::dimension_mismatch(
                deps.vector_store.dimension(),
                deps.embedding.dimension(),
            ));
        }

        let (sender, receiver) = mpsc::channel(settings.queue_capacity);
        let inner = Arc::new(Inner {
            deps,
            chunker,
            workers: Arc::new(Semaphore::new(settings.workers)),
            worker_permits,
            settings,
            runs: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
            generations: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        });

        let consumer = tokio::spawn(consume(inner.clone(), receiver));

        Ok(Self {
            inner,
            sender,
            consumer: Mutex::new(Some(consumer)),
        })
    }

    /// Marks the agent `IN_PROGRESS` and queues a fresh ingestion run.
    ///
    /// Returns once the status is written; the run itself happens in the
    /// background. Unknown agents fail with `NotFound` and a full queue with
    /// `Unavailable`, both before any state changes.
    #[instrument(skip_all, fields(agent = %agent))]
    pub async fn trigger(&self, agent: &AgentName) -> Result<IngestionStatus, DomainError> {
        self.inner.deps.documents.list(agent).await?;

        let permit = self.sender.try_reserve().map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DomainError::unavailable("ingestion queue full"),
            mpsc::error::TrySendError::Closed(_) => {
                DomainError::unavailable("ingestion coordinator stopped")
            }
        })?;

        let (generation, cancel) = self.inner.begin_generation(agent)?;
        let status = IngestionStatus::in_progress(agent.clone(), generation);
        let written = self.inner.write_status(&status).await;
        self.inner.release_locks(agent);

        if let Err(e) = written {
            cancel.cancel();
            self.inner.finish_run(agent, generation);
            return Err(e);
        }

        permit.send(IngestionJob {
            agent: agent.clone(),
            generation,
            cancel,
        });

        tracing::info!(generation, "ingestion queued");
        Ok(status)
    }

    pub async fn status(&self, agent: &AgentName) -> Result<Option<IngestionStatus>, DomainError> {
        self.inner.deps.status_store.get(agent).await
    }

    /// Drops the agent's whole collection, cancelling any run in flight so it
    /// cannot recreate it.
    #[instrument(skip_all, fields(agent = %agent))]
    pub async fn delete_collection(&self, agent: &AgentName) -> Result<(), DomainError> {
        let (generation, _) = self.inner.begin_generation(agent)?;
        let result = self.inner.clear(agent, generation).await;

        self.inner.finish_run(agent, generation);
        self.inner.release_locks(agent);
        result
    }

    /// Cancels every run, marks unfinished ones `FAILED` and waits up to
    /// `grace` for the workers to wind down.
    pub async fn shutdown(&self, grace: Duration) {
        self.inner.shutdown.cancel();

        let consumer = self.consumer.lock().ok().and_then(|mut c| c.take());
        let inner = &self.inner;
        let drained = async {
            if let Some(handle) = consumer {
                if let Err(e) = handle.await {
                    tracing::error!(error = %e, "ingestion consumer panicked");
                }
            }
            let _ = inner.workers.acquire_many(inner.worker_permits).await;
        };

        match tokio::time::timeout(grace, drained).await {
            Ok(()) => tracing::info!("ingestion stopped"),
            Err(_) => tracing::warn!(?grace, "ingestion runs still active after grace period"),
        }
    }

    #[cfg(test)]
    fn tracked_agents(&self) -> (usize, usize) {
        let runs = self.inner.runs.lock().map_or(0, |r| r.len());
        let locks = self.inner.locks.lock().map_or(0, |l| l.len());
        (runs, locks)
    }
}

impl Drop for IngestionCoordinator {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

async fn consume(inner: Arc<Inner>, mut receiver: mpsc::Receiver<IngestionJob>) {
    let shutdown = inner.shutdown.clone();
    tracing::info!(workers = inner.settings.workers, "ingestion consumer started");

    loop {
        let job = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            job = receiver.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        let permit = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                inner.abandon(&job).await;
                break;
            }
            permit = inner.workers.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let inner = inner.clone();
        let span = tracing::info_span!("ingestion_run", agent = %job.agent, generation = job.generation);

        tokio::spawn(
            async move {
                let _permit = permit;
                inner.process(job).await;
            }
            .instrument(span),
        );
    }

    receiver.close();
    while let Ok(job) = receiver.try_recv() {
        inner.abandon(&job).await;
    }

    tracing::info!("ingestion consumer stopped");
}

impl Inner {
    fn collection(&self, agent: &AgentName) -> String {
        agent.collection(&self.settings.collection_prefix)
    }

    fn agent_locks(&self, agent: &AgentName) -> Result<Arc<AgentLocks>, DomainError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|e| DomainError::internal(e.to_string()))?;
        Ok(locks.entry(agent.clone()).or_default().clone())
    }

    /// Forgets the agent's locks once nobody holds or waits on them.
    fn release_locks(&self, agent: &AgentName) {
        if let Ok(mut locks) = self.locks.lock() {
            if locks.get(agent).is_some_and(|l| Arc::strong_count(l) == 1) {
                locks.remove(agent);
            }
        }
    }

    /// Supersedes whatever run the agent had and returns the new generation.
    fn begin_generation(
        &self,
        agent: &AgentName,
    ) -> Result<(u64, CancellationToken), DomainError> {
        let mut runs = self
            .runs
            .lock()
            .map_err(|e| DomainError::internal(e.to_string()))?;

        if let Some(previous) = runs.get(agent) {
            previous.cancel.cancel();
        }

        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = self.shutdown.child_token();
        runs.insert(
            agent.clone(),
            AgentRun {
                generation,
                cancel: cancel.clone(),
            },
        );

        Ok((generation, cancel))
    }

    fn finish_run(&self, agent: &AgentName, generation: u64) {
        if let Ok(mut runs) = self.runs.lock() {
            if runs.get(agent).is_some_and(|r| r.generation == generation) {
                runs.remove(agent);
            }
        }
    }

    fn current_generation(&self, agent: &AgentName) -> Result<u64, DomainError> {
        let runs = self
            .runs
            .lock()
            .map_err(|e| DomainError::internal(e.to_string()))?;
        Ok(runs.get(agent).map_or(0, |r| r.generation))
    }

    /// Writes `status` only while its generation is the agent's newest.
    async fn write_status(&self, status: &IngestionStatus) -> Result<bool, DomainError> {
        let locks = self.agent_locks(&status.agent_name)?;
        let _guard = locks.status.lock().await;

        if self.current_generation(&status.agent_name)? != status.generation {
            return Ok(false);
        }

        tokio::time::timeout(
            self.settings.status_timeout,
            self.deps.status_store.set(status),
        )
        .await
        .map_err(|_| DomainError::timeout("status write"))??;
        Ok(true)
    }

    async fn clear(&self, agent: &AgentName, generation: u64) -> Result<(), DomainError> {
        let locks = self.agent_locks(agent)?;
        let _commit = locks.commit.lock().await;

        self.deps
            .vector_store
            .delete_collection(&self.collection(agent))
            .await?;
        self.write_status(&IngestionStatus::idle(agent.clone(), generation, 0))
            .await?;
        Ok(())
    }

    async fn process(self: Arc<Self>, job: IngestionJob) {
        tracing::info!("ingestion started");

        match self.run(&job).await {
            Ok(chunks) => {
                tracing::info!(chunks, "ingestion completed");
                self.notify(&job.agent, EmbeddingsStatus::Idle);
            }
            Err(e) if e.is_superseded() && self.shutdown.is_cancelled() => {
                tracing::warn!("ingestion interrupted by shutdown");
                self.fail(&job, &DomainError::cancelled(SHUTDOWN_REASON)).await;
            }
            Err(e) if e.is_superseded() => {
                tracing::info!(reason = %e, "ingestion abandoned");
            }
            Err(e) => {
                tracing::error!(error = %e, "ingestion failed");
                self.fail(&job, &e).await;
            }
        }

        self.finish_run(&job.agent, job.generation);
        self.release_locks(&job.agent);
    }

    /// Settles a job that shutdown kept from ever reaching a worker.
    async fn abandon(&self, job: &IngestionJob) {
        tracing::warn!(agent = %job.agent, generation = job.generation, "queued ingestion dropped by shutdown");
        self.fail(job, &DomainError::cancelled(SHUTDOWN_REASON)).await;
        self.finish_run(&job.agent, job.generation);
        self.release_locks(&job.agent);
    }

    async fn run(&self, job: &IngestionJob) -> Result<usize, DomainError> {
        let chunks = self.prepare_chunks(job).await?;
        self.ensure_live(job)?;

        let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        let embeddings = tokio::select! {
            biased;
            _ = job.cancel.cancelled() => return Err(Self::cancelled(job)),
            result = tokio::time::timeout(
                self.settings.embed_timeout,
                self.deps.embedding.embed_batch(&texts),
            ) => result.map_err(|_| DomainError::timeout("embedding batch"))??,
        };

        if embeddings.len() != chunks.len() {
            return Err(DomainError::ingestion(format!(
                "embedder returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }
        let expected = self.deps.vector_store.dimension();
        if let Some(bad) = embeddings.iter().find(|e| e.dimension() != expected) {
            return Err(DomainError::dimension_mismatch(expected, bad.dimension()));
        }

        self.ensure_live(job)?;
        let points: Vec<_> = chunks.into_iter().zip(embeddings).collect();
        tokio::time::timeout(self.settings.commit_timeout, self.commit(job, &points))
            .await
            .map_err(|_| DomainError::timeout("index commit"))??;

        Ok(points.len())
    }

    /// Reads and splits every document, checking for cancellation between
    /// documents. Chunk indices run agent-wide across documents.
    async fn prepare_chunks(&self, job: &IngestionJob) -> Result<Vec<DocumentChunk>, DomainError> {
        let names = self.deps.documents.list(&job.agent).await?;
        let mut chunks = Vec::new();

        for name in names {
            self.ensure_live(job)?;

            let document = self.deps.documents.read(&job.agent, &name).await?;
            let pieces = self.chunker.split(&document.content);
            tracing::debug!(document = %name, chunks = pieces.len(), "document split");

            for text in pieces {
                let index = chunks.len() as u64;
                chunks.push(
                    DocumentChunk::new(job.agent.clone(), index, text).with_metadata(
                        ChunkMetadata {
                            source: Some(name.clone()),
                            generation: Some(job.generation),
                        },
                    ),
                );
            }
        }

        Ok(chunks)
    }

    fn cancelled(job: &IngestionJob) -> DomainError {
        DomainError::cancelled(format!("generation {} of {}", job.generation, job.agent))
    }

    fn ensure_live(&self, job: &IngestionJob) -> Result<(), DomainError> {
        if job.cancel.is_cancelled() {
            return Err(Self::cancelled(job));
        }
        Ok(())
    }

    async fn commit(
        &self,
        job: &IngestionJob,
        points: &[(DocumentChunk, Embedding)],
    ) -> Result<(), DomainError> {
        let locks = self.agent_locks(&job.agent)?;
        let _commit = locks.commit.lock().await;

        let current = self.current_generation(&job.agent)?;
        if current != job.generation {
            return Err(DomainError::Superseded(current));
        }

        let collection = self.collection(&job.agent);
        if self.settings.replace_existing {
            self.deps.vector_store.replace(&collection, points).await?;
        } else {
            self.deps.vector_store.get_or_create(&collection).await?;
            if !points.is_empty() {
                self.deps.vector_store.upsert_batch(&collection, points).await?;
            }
        }

        let settled = IngestionStatus::idle(job.agent.clone(), job.generation, points.len());
        if !self.write_status(&settled).await? {
            return Err(DomainError::Superseded(self.current_generation(&job.agent)?));
        }
        Ok(())
    }

    /// Records `FAILED` and tells the registry, unless a newer run owns the
    /// agent by now.
    async fn fail(&self, job: &IngestionJob, error: &DomainError) {
        let failed = IngestionStatus::failed(job.agent.clone(), job.generation, error.to_string());
        match self.write_status(&failed).await {
            Ok(true) => self.notify(&job.agent, EmbeddingsStatus::Failed),
            Ok(false) => {}
            Err(status_err) => {
                tracing::error!(error = %status_err, "could not record failed status")
            }
        }
    }

    fn notify(&self, agent: &AgentName, status: EmbeddingsStatus) {
        let Some(notifier) = self.deps.notifier.clone() else {
            return;
        };
        let agent = agent.clone();

        tokio::spawn(async move {
            if let Err(e) = notifier.notify(&agent, status).await {
                tracing::warn!(agent = %agent, status = status.as_str(), error = %e, "registry notification dropped");
            }
        });
    }
}
