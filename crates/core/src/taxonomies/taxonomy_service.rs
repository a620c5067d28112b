//! Taxonomy command service.
//!
//! Routes every command for a given taxonomy id to one sequential task that
//! owns that id's aggregate. Different ids run in parallel. A task that sees
//! no request for the configured idle period releases its aggregate and
//! exits; the next request reloads it from the log.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::config::{EngineConfig, DEFAULT_AGGREGATE_IDLE_TIMEOUT, DEFAULT_MAILBOX_CAPACITY};
use crate::errors::{DatabaseError, Error};
use crate::events::{DomainEventSink, EventEnvelope};
use crate::Result;

use super::{
    ApplyError, CommandReceipt, NewRow, RowId, RowUpdate, Taxonomy, TaxonomyAggregate,
    TaxonomyCommand, TaxonomyCreate, TaxonomyEventLogTrait, TaxonomyServiceTrait, TaxonomyStatus,
};

/// Requests handled by an aggregate's owning task.
enum AggregateRequest {
    Execute {
        command: TaxonomyCommand,
        reply: oneshot::Sender<Result<CommandReceipt>>,
    },
    Snapshot {
        reply: oneshot::Sender<Result<Taxonomy>>,
    },
}

/// In-memory state held by an aggregate's owning task.
enum AggregateSlot {
    /// Not loaded yet, or dropped after an append conflict.
    Unloaded,
    Ready(TaxonomyAggregate),
    /// A persisted event could not be folded; the id is fenced off.
    Poisoned(ApplyError),
}

type Mailboxes = Mutex<HashMap<String, mpsc::Sender<AggregateRequest>>>;

pub struct TaxonomyService {
    event_log: Arc<dyn TaxonomyEventLogTrait>,
    event_sink: Arc<dyn DomainEventSink>,
    mailboxes: Arc<Mailboxes>,
    mailbox_capacity: usize,
    idle_timeout: Duration,
}

impl TaxonomyService {
    pub fn new(
        event_log: Arc<dyn TaxonomyEventLogTrait>,
        event_sink: Arc<dyn DomainEventSink>,
    ) -> Self {
        Self {
            event_log,
            event_sink,
            mailboxes: Arc::new(Mutex::new(HashMap::new())),
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            idle_timeout: DEFAULT_AGGREGATE_IDLE_TIMEOUT,
        }
    }

    pub fn with_config(
        event_log: Arc<dyn TaxonomyEventLogTrait>,
        event_sink: Arc<dyn DomainEventSink>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            mailbox_capacity: config.mailbox_capacity.max(1),
            idle_timeout: config.aggregate_idle_timeout,
            ..Self::new(event_log, event_sink)
        }
    }

    /// Number of aggregates currently held in memory by a running task.
    pub async fn active_aggregates(&self) -> usize {
        self.mailboxes
            .lock()
            .await
            .values()
            .filter(|sender| !sender.is_closed())
            .count()
    }

    /// Returns the mailbox of `taxonomy_id`, spawning its task if needed.
    async fn mailbox(&self, taxonomy_id: &str) -> mpsc::Sender<AggregateRequest> {
        let mut mailboxes = self.mailboxes.lock().await;
        if let Some(sender) = mailboxes.get(taxonomy_id) {
            if !sender.is_closed() {
                return sender.clone();
            }
            warn!("taxonomy={} aggregate task stopped, respawning", taxonomy_id);
        }

        let (tx, rx) = mpsc::channel(self.mailbox_capacity);
        let task = AggregateTask {
            taxonomy_id: taxonomy_id.to_string(),
            event_log: self.event_log.clone(),
            event_sink: self.event_sink.clone(),
            slot: AggregateSlot::Unloaded,
        };
        tokio::spawn(task.run(rx, Arc::downgrade(&self.mailboxes), self.idle_timeout));
        debug!("taxonomy={} aggregate task spawned", taxonomy_id);
        mailboxes.insert(taxonomy_id.to_string(), tx.clone());
        tx
    }

    /// Whether `taxonomy_id` has a running task to ask.
    async fn is_resident(&self, taxonomy_id: &str) -> bool {
        self.mailboxes
            .lock()
            .await
            .get(taxonomy_id)
            .is_some_and(|sender| !sender.is_closed())
    }

    async fn dispatch(&self, taxonomy_id: &str, request: AggregateRequest) -> Result<()> {
        let mut request = request;
        // A second attempt covers a task that stopped between lookup and send.
        for _ in 0..2 {
            let sender = self.mailbox(taxonomy_id).await;
            match sender.send(request).await {
                Ok(()) => return Ok(()),
                Err(mpsc::error::SendError(returned)) => request = returned,
            }
        }
        Err(Error::Unexpected(format!(
            "taxonomy '{}' aggregate task is not accepting requests",
            taxonomy_id
        )))
    }
}

#[async_trait]
impl TaxonomyServiceTrait for TaxonomyService {
    async fn execute(&self, taxonomy_id: &str, command: TaxonomyCommand) -> Result<CommandReceipt> {
        let (reply, rx) = oneshot::channel();
        self.dispatch(taxonomy_id, AggregateRequest::Execute { command, reply })
            .await?;
        rx.await.map_err(|_| {
            Error::Unexpected(format!(
                "taxonomy '{}' aggregate task dropped the command",
                taxonomy_id
            ))
        })?
    }

    async fn create_taxonomy(
        &self,
        taxonomy_id: &str,
        create: TaxonomyCreate,
    ) -> Result<CommandReceipt> {
        self.execute(taxonomy_id, TaxonomyCommand::Create(create))
            .await
    }

    async fn publish_taxonomy(
        &self,
        taxonomy_id: &str,
        is_published: bool,
    ) -> Result<CommandReceipt> {
        self.execute(taxonomy_id, TaxonomyCommand::Publish { is_published })
            .await
    }

    async fn remove_taxonomy(&self, taxonomy_id: &str) -> Result<CommandReceipt> {
        self.execute(taxonomy_id, TaxonomyCommand::Remove).await
    }

    async fn add_row(&self, taxonomy_id: &str, row: NewRow) -> Result<CommandReceipt> {
        self.execute(taxonomy_id, TaxonomyCommand::AddRow(row)).await
    }

    async fn add_rows(
        &self,
        taxonomy_id: &str,
        rows: Vec<NewRow>,
        is_replace: bool,
    ) -> Result<CommandReceipt> {
        self.execute(taxonomy_id, TaxonomyCommand::AddRows { rows, is_replace })
            .await
    }

    async fn remove_row(&self, taxonomy_id: &str, row_id: &str) -> Result<CommandReceipt> {
        self.execute(
            taxonomy_id,
            TaxonomyCommand::RemoveRow {
                row_id: row_id.to_string(),
            },
        )
        .await
    }

    async fn remove_rows(&self, taxonomy_id: &str, row_ids: Vec<RowId>) -> Result<CommandReceipt> {
        self.execute(taxonomy_id, TaxonomyCommand::RemoveRows { row_ids })
            .await
    }

    async fn update_row(
        &self,
        taxonomy_id: &str,
        row_id: &str,
        update: RowUpdate,
    ) -> Result<CommandReceipt> {
        self.execute(
            taxonomy_id,
            TaxonomyCommand::UpdateRow {
                row_id: row_id.to_string(),
                update,
            },
        )
        .await
    }

    async fn get_taxonomy(&self, taxonomy_id: &str) -> Result<Option<Taxonomy>> {
        // An empty stream has nothing to load; no task is started for it.
        if !self.is_resident(taxonomy_id).await
            && self.event_log.current_version(taxonomy_id)? == 0
        {
            return Ok(None);
        }

        let (reply, rx) = oneshot::channel();
        self.dispatch(taxonomy_id, AggregateRequest::Snapshot { reply })
            .await?;
        let taxonomy = rx.await.map_err(|_| {
            Error::Unexpected(format!(
                "taxonomy '{}' aggregate task dropped the request",
                taxonomy_id
            ))
        })??;
        Ok((taxonomy.status != TaxonomyStatus::Empty).then_some(taxonomy))
    }
}

/// Owning task of one aggregate. Processes requests strictly one at a time.
struct AggregateTask {
    taxonomy_id: String,
    event_log: Arc<dyn TaxonomyEventLogTrait>,
    event_sink: Arc<dyn DomainEventSink>,
    slot: AggregateSlot,
}

impl AggregateTask {
    async fn run(
        mut self,
        mut rx: mpsc::Receiver<AggregateRequest>,
        mailboxes: Weak<Mailboxes>,
        idle_timeout: Duration,
    ) {
        loop {
            match tokio::time::timeout(idle_timeout, rx.recv()).await {
                Ok(Some(request)) => self.serve(request).await,
                Ok(None) => break,
                Err(_) => {
                    // Without a registry the service is gone and so are the senders.
                    if let Some(mailboxes) = mailboxes.upgrade() {
                        self.passivate(&mut rx, &mailboxes).await;
                    }
                    break;
                }
            }
        }
        debug!("taxonomy={} aggregate task finished", self.taxonomy_id);
    }

    /// Closes the mailbox and deregisters it.
    ///
    /// Runs under the registry lock so no replacement task can start while
    /// requests that slipped in before the close are still being served.
    async fn passivate(
        &mut self,
        rx: &mut mpsc::Receiver<AggregateRequest>,
        mailboxes: &Mailboxes,
    ) {
        let mut mailboxes = mailboxes.lock().await;
        rx.close();
        while let Ok(request) = rx.try_recv() {
            self.serve(request).await;
        }
        if mailboxes
            .get(&self.taxonomy_id)
            .is_some_and(|sender| sender.is_closed())
        {
            mailboxes.remove(&self.taxonomy_id);
        }
        debug!(
            "taxonomy={} aggregate idle, released from memory",
            self.taxonomy_id
        );
    }

    async fn serve(&mut self, request: AggregateRequest) {
        match request {
            AggregateRequest::Execute { command, reply } => {
                let result = execute_command(
                    &self.taxonomy_id,
                    self.event_log.as_ref(),
                    self.event_sink.as_ref(),
                    &mut self.slot,
                    command,
                )
                .await;
                // The caller may have gone away; the command outcome stands.
                let _ = reply.send(result);
            }
            AggregateRequest::Snapshot { reply } => {
                let result = load(&self.taxonomy_id, self.event_log.as_ref(), &mut self.slot)
                    .map(|aggregate| aggregate.state().clone());
                let _ = reply.send(result);
            }
        }
    }
}

/// Loads the aggregate from the log unless it is already in memory.
fn load<'a>(
    taxonomy_id: &str,
    event_log: &dyn TaxonomyEventLogTrait,
    slot: &'a mut AggregateSlot,
) -> Result<&'a mut TaxonomyAggregate> {
    if let AggregateSlot::Poisoned(err) = slot {
        return Err(Error::Replay(err.clone()));
    }
    if let AggregateSlot::Unloaded = slot {
        let envelopes = event_log.load_events(taxonomy_id)?;
        match TaxonomyAggregate::from_events(taxonomy_id, &envelopes) {
            Ok(aggregate) => *slot = AggregateSlot::Ready(aggregate),
            Err(err) => {
                error!(
                    "taxonomy={} seq={} replay failed, aggregate poisoned: {}",
                    taxonomy_id, err.sequence, err
                );
                *slot = AggregateSlot::Poisoned(err.clone());
                return Err(Error::Replay(err));
            }
        }
    }
    match slot {
        AggregateSlot::Ready(aggregate) => Ok(aggregate),
        _ => Err(Error::Unexpected(format!(
            "taxonomy '{}' aggregate failed to load",
            taxonomy_id
        ))),
    }
}

async fn execute_command(
    taxonomy_id: &str,
    event_log: &dyn TaxonomyEventLogTrait,
    event_sink: &dyn DomainEventSink,
    slot: &mut AggregateSlot,
    command: TaxonomyCommand,
) -> Result<CommandReceipt> {
    let command_name = command.name();

    let (expected_version, events) = {
        let aggregate = load(taxonomy_id, event_log, slot)?;
        let events = aggregate.handle(command).map_err(|e| {
            warn!(
                "taxonomy={} command={} rejected: {}",
                taxonomy_id, command_name, e
            );
            Error::Taxonomy(e)
        })?;
        (aggregate.version(), events)
    };

    if events.is_empty() {
        debug!(
            "taxonomy={} command={} accepted as no-op",
            taxonomy_id, command_name
        );
        return Ok(CommandReceipt {
            taxonomy_id: taxonomy_id.to_string(),
            version: expected_version,
            events: Vec::new(),
        });
    }

    let envelopes = match event_log
        .append(taxonomy_id, expected_version, events)
        .await
    {
        Ok(envelopes) => envelopes,
        Err(err) => {
            if let Error::Database(DatabaseError::Conflict { actual, .. }) = &err {
                warn!(
                    "taxonomy={} command={} append conflict at version {} (log at {}), reloading",
                    taxonomy_id, command_name, expected_version, actual
                );
                *slot = AggregateSlot::Unloaded;
            } else {
                error!(
                    "taxonomy={} command={} append failed: {}",
                    taxonomy_id, command_name, err
                );
            }
            return Err(err);
        }
    };

    let fold_result = match slot {
        AggregateSlot::Ready(aggregate) => envelopes
            .iter()
            .try_for_each(|envelope| aggregate.apply(envelope)),
        _ => Ok(()),
    };

    // Appended events are committed regardless of what the fold says; the
    // projection gets them either way.
    event_sink.emit_batch(envelopes.clone());

    if let Err(err) = fold_result {
        error!(
            "taxonomy={} seq={} committed event could not be applied, aggregate poisoned: {}",
            taxonomy_id, err.sequence, err
        );
        *slot = AggregateSlot::Poisoned(err.clone());
        return Err(Error::Replay(err));
    }

    let version = last_sequence(&envelopes).unwrap_or(expected_version);
    info!(
        "taxonomy={} command={} seq={} events={} committed",
        taxonomy_id,
        command_name,
        version,
        envelopes.len()
    );

    Ok(CommandReceipt {
        taxonomy_id: taxonomy_id.to_string(),
        version,
        events: envelopes,
    })
}

fn last_sequence(envelopes: &[EventEnvelope]) -> Option<u64> {
    envelopes.last().map(|envelope| envelope.sequence)
}
