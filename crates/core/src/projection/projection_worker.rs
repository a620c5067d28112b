//! Projection worker.
//!
//! Receives committed envelopes from the event sink channel and folds them
//! into the query store, one at a time, so each taxonomy sees its events in
//! order. Redelivered events are skipped; gaps are back-filled from the log.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{
    FoldOutcome, ProjectionError, TaxonomyProjection, TaxonomyView, TaxonomyViewStoreTrait,
};
use crate::config::EngineConfig;
use crate::errors::Error;
use crate::events::EventEnvelope;
use crate::taxonomies::TaxonomyEventLogTrait;
use crate::Result;

/// Taxonomies whose read model stopped after a divergence.
#[derive(Debug, Default)]
pub struct ProjectionHealth {
    halted: RwLock<HashMap<String, ProjectionError>>,
}

impl ProjectionHealth {
    pub fn is_halted(&self, taxonomy_id: &str) -> bool {
        self.halted
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(taxonomy_id)
    }

    /// Halted taxonomies with the error that stopped them, sorted by id.
    pub fn halted(&self) -> Vec<(String, ProjectionError)> {
        let halted = self.halted.read().unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<_> = halted
            .iter()
            .map(|(id, err)| (id.clone(), err.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    fn halt(&self, taxonomy_id: &str, err: ProjectionError) {
        self.halted
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(taxonomy_id.to_string(), err);
    }

    fn clear(&self, taxonomy_id: &str) -> bool {
        self.halted
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(taxonomy_id)
            .is_some()
    }
}

pub struct ProjectionWorker {
    view_store: Arc<dyn TaxonomyViewStoreTrait>,
    event_log: Arc<dyn TaxonomyEventLogTrait>,
    replay_on_gap: bool,
    health: Arc<ProjectionHealth>,
}

impl ProjectionWorker {
    pub fn new(
        view_store: Arc<dyn TaxonomyViewStoreTrait>,
        event_log: Arc<dyn TaxonomyEventLogTrait>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            view_store,
            event_log,
            replay_on_gap: config.projection_replay_on_gap,
            health: Arc::new(ProjectionHealth::default()),
        }
    }

    pub fn health(&self) -> Arc<ProjectionHealth> {
        self.health.clone()
    }

    /// Folds one delivered envelope into the stored view.
    pub async fn handle_envelope(&self, envelope: EventEnvelope) -> Result<()> {
        let taxonomy_id = envelope.aggregate_id.clone();
        if self.health.is_halted(&taxonomy_id) {
            debug!(
                "taxonomy={} seq={} projection halted, event ignored",
                taxonomy_id, envelope.sequence
            );
            return Err(ProjectionError::Halted { taxonomy_id }.into());
        }

        let current = self.view_store.get_view(&taxonomy_id)?;
        let outcome = TaxonomyProjection::apply(current.as_ref(), &envelope)
            .map_err(|err| self.diverge(&taxonomy_id, err))?;

        match outcome {
            FoldOutcome::Duplicate => {
                debug!(
                    "taxonomy={} seq={} duplicate delivery skipped",
                    taxonomy_id, envelope.sequence
                );
                Ok(())
            }
            FoldOutcome::Applied(view) => self.store(view).await,
            FoldOutcome::Gap { expected, received } => {
                if !self.replay_on_gap {
                    let err = ProjectionError::diverged(
                        &taxonomy_id,
                        received,
                        format!("expected event #{}", expected),
                    );
                    return Err(self.diverge(&taxonomy_id, err));
                }
                warn!(
                    "taxonomy={} seq={} gap after #{}, back-filling from the log",
                    taxonomy_id,
                    received,
                    expected - 1
                );
                let missing = self.event_log.load_events_after(&taxonomy_id, expected - 1)?;
                match self.fold_all(&taxonomy_id, current, &missing)? {
                    Some(view) => self.store(view).await,
                    None => Ok(()),
                }
            }
        }
    }

    /// Drops the stored view and rebuilds it from the full log.
    ///
    /// Also lifts a halt, so this is the way back after a divergence has
    /// been repaired at the source.
    pub async fn rebuild_view(&self, taxonomy_id: &str) -> Result<Option<TaxonomyView>> {
        let deleted = self.view_store.delete_view(taxonomy_id).await?;
        if self.health.clear(taxonomy_id) {
            info!("taxonomy={} projection halt lifted for rebuild", taxonomy_id);
        }

        let envelopes = self.event_log.load_events(taxonomy_id)?;
        let view = self.fold_all(taxonomy_id, None, &envelopes)?;
        if let Some(view) = &view {
            self.store(view.clone()).await?;
        }
        info!(
            "taxonomy={} projection rebuilt from {} event(s), {} old view(s) dropped",
            taxonomy_id,
            envelopes.len(),
            deleted
        );
        Ok(view)
    }

    /// Folds a run of envelopes. Gaps inside the run are divergences.
    fn fold_all(
        &self,
        taxonomy_id: &str,
        start: Option<TaxonomyView>,
        envelopes: &[EventEnvelope],
    ) -> Result<Option<TaxonomyView>> {
        let mut view = start;
        for envelope in envelopes {
            match TaxonomyProjection::apply(view.as_ref(), envelope) {
                Ok(FoldOutcome::Applied(next)) => view = Some(next),
                Ok(FoldOutcome::Duplicate) => {}
                Ok(FoldOutcome::Gap { expected, received }) => {
                    let err = ProjectionError::diverged(
                        taxonomy_id,
                        received,
                        format!("log is missing event #{}", expected),
                    );
                    return Err(self.diverge(taxonomy_id, err));
                }
                Err(err) => return Err(self.diverge(taxonomy_id, err)),
            }
        }
        Ok(view)
    }

    async fn store(&self, view: TaxonomyView) -> Result<()> {
        if let Err(reason) = view.check_links() {
            let err = ProjectionError::diverged(&view.id, view.last_sequence, reason);
            return Err(self.diverge(&view.id, err));
        }

        let taxonomy_id = view.id.clone();
        let sequence = view.last_sequence;
        self.view_store.upsert_view(view).await.map_err(|e| {
            error!(
                "taxonomy={} seq={} failed to store view: {}",
                taxonomy_id, sequence, e
            );
            Error::Projection(ProjectionError::Store(e.to_string()))
        })?;
        debug!("taxonomy={} seq={} view stored", taxonomy_id, sequence);
        Ok(())
    }

    fn diverge(&self, taxonomy_id: &str, err: ProjectionError) -> Error {
        error!("taxonomy={} projection halted: {}", taxonomy_id, err);
        self.health.halt(taxonomy_id, err.clone());
        Error::Projection(err)
    }
}

/// Runs the projection worker until the sending side of the feed is dropped.
pub async fn run_projection_worker(
    mut rx: mpsc::UnboundedReceiver<EventEnvelope>,
    worker: Arc<ProjectionWorker>,
) {
    info!("Taxonomy projection worker started");

    while let Some(envelope) = rx.recv().await {
        let taxonomy_id = envelope.aggregate_id.clone();
        let sequence = envelope.sequence;
        if let Err(e) = worker.handle_envelope(envelope).await {
            // Divergences were already logged and recorded in the health map.
            warn!(
                "taxonomy={} seq={} projection did not apply event: {}",
                taxonomy_id, sequence, e
            );
        }
    }

    info!("Taxonomy projection worker shutting down");
}

pub fn start_projection_worker(
    rx: mpsc::UnboundedReceiver<EventEnvelope>,
    worker: Arc<ProjectionWorker>,
) -> JoinHandle<()> {
    tokio::spawn(run_projection_worker(rx, worker))
}
