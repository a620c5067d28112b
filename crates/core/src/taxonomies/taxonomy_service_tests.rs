#[cfg(test)]
mod tests {
    use crate::config::EngineConfig;
    use crate::errors::{DatabaseError, Error, Result};
    use crate::events::{EventEnvelope, MockDomainEventSink, TaxonomyEvent};
    use crate::taxonomies::{
        NewRow, RowUpdate, TaxonomyCreate, TaxonomyError, TaxonomyEventLogTrait, TaxonomyService,
        TaxonomyServiceTrait, TaxonomyStatus,
    };
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const ID: &str = "D1.T1.1.0";

    // --- Mock event log ---
    #[derive(Clone, Default)]
    struct MockEventLog {
        streams: Arc<Mutex<HashMap<String, Vec<EventEnvelope>>>>,
    }

    impl MockEventLog {
        fn new() -> Self {
            Self::default()
        }

        /// Appends behind the service's back, as another writer would.
        fn push_raw(&self, envelope: EventEnvelope) {
            self.streams
                .lock()
                .unwrap()
                .entry(envelope.aggregate_id.clone())
                .or_default()
                .push(envelope);
        }

        fn stream(&self, aggregate_id: &str) -> Vec<EventEnvelope> {
            self.streams
                .lock()
                .unwrap()
                .get(aggregate_id)
                .cloned()
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl TaxonomyEventLogTrait for MockEventLog {
        async fn append(
            &self,
            aggregate_id: &str,
            expected_version: u64,
            events: Vec<TaxonomyEvent>,
        ) -> Result<Vec<EventEnvelope>> {
            let mut streams = self.streams.lock().unwrap();
            let stream = streams.entry(aggregate_id.to_string()).or_default();
            let actual = stream.len() as u64;
            if actual != expected_version {
                return Err(DatabaseError::Conflict {
                    aggregate_id: aggregate_id.to_string(),
                    expected: expected_version,
                    actual,
                }
                .into());
            }
            let envelopes: Vec<EventEnvelope> = events
                .into_iter()
                .enumerate()
                .map(|(i, event)| EventEnvelope::new(aggregate_id, actual + 1 + i as u64, event))
                .collect();
            stream.extend(envelopes.clone());
            Ok(envelopes)
        }

        fn load_events(&self, aggregate_id: &str) -> Result<Vec<EventEnvelope>> {
            Ok(self.stream(aggregate_id))
        }

        fn load_events_after(
            &self,
            aggregate_id: &str,
            after_sequence: u64,
        ) -> Result<Vec<EventEnvelope>> {
            Ok(self
                .stream(aggregate_id)
                .into_iter()
                .filter(|e| e.sequence > after_sequence)
                .collect())
        }

        fn current_version(&self, aggregate_id: &str) -> Result<u64> {
            Ok(self.stream(aggregate_id).len() as u64)
        }
    }

    fn setup() -> (TaxonomyService, MockEventLog, MockDomainEventSink) {
        let log = MockEventLog::new();
        let sink = MockDomainEventSink::new();
        let service = TaxonomyService::new(Arc::new(log.clone()), Arc::new(sink.clone()));
        (service, log, sink)
    }

    fn row(id: &str, value: &str) -> NewRow {
        NewRow::new(value).with_id(id)
    }

    #[tokio::test]
    async fn test_commands_are_appended_and_emitted() {
        let (service, log, sink) = setup();

        let receipt = service
            .create_taxonomy(ID, TaxonomyCreate::new("T1", "D1"))
            .await
            .unwrap();
        assert_eq!(receipt.version, 1);
        assert_eq!(receipt.events[0].event_type(), "taxonomy-created");

        service.add_row(ID, row("r1", "Revenue")).await.unwrap();
        let receipt = service
            .add_row(ID, row("r2", "COGS").with_parent("r1"))
            .await
            .unwrap();
        assert_eq!(receipt.version, 3);

        assert_eq!(log.current_version(ID).unwrap(), 3);
        let emitted: Vec<u64> = sink.events().iter().map(|e| e.sequence).collect();
        assert_eq!(emitted, vec![1, 2, 3]);

        let taxonomy = service.get_taxonomy(ID).await.unwrap().unwrap();
        assert_eq!(taxonomy.status, TaxonomyStatus::Initialized);
        assert_eq!(taxonomy.children_of("r1"), vec!["r2".to_string()]);
    }

    #[tokio::test]
    async fn test_rejection_appends_nothing() {
        let (service, log, sink) = setup();
        service
            .create_taxonomy(ID, TaxonomyCreate::new("T1", "D1"))
            .await
            .unwrap();
        service.publish_taxonomy(ID, true).await.unwrap();

        let err = service.add_row(ID, row("r1", "Revenue")).await.unwrap_err();
        assert_eq!(
            err.as_taxonomy_error(),
            Some(&TaxonomyError::incorrect_add(
                "addRow",
                "taxonomy is published"
            ))
        );
        assert_eq!(log.current_version(ID).unwrap(), 2);
        assert_eq!(sink.len(), 2);
    }

    #[tokio::test]
    async fn test_no_op_command_returns_empty_receipt() {
        let (service, log, _sink) = setup();
        service
            .create_taxonomy(ID, TaxonomyCreate::new("T1", "D1"))
            .await
            .unwrap();

        let receipt = service.remove_rows(ID, Vec::new()).await.unwrap();
        assert!(receipt.events.is_empty());
        assert_eq!(receipt.version, 1);
        assert_eq!(log.current_version(ID).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_taxonomy_reads_as_none() {
        let (service, _log, _sink) = setup();
        assert!(service.get_taxonomy("nope").await.unwrap().is_none());
        assert_eq!(service.active_aggregates().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_commands_for_same_id_are_serialized() {
        let (service, log, _sink) = setup();
        let service = Arc::new(service);
        service
            .create_taxonomy(ID, TaxonomyCreate::new("T1", "D1"))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service
                    .add_row(ID, row(&format!("r{}", i), &format!("Value {}", i)))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let sequences: Vec<u64> = log.stream(ID).iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, (1..=21).collect::<Vec<u64>>());
        let taxonomy = service.get_taxonomy(ID).await.unwrap().unwrap();
        assert_eq!(taxonomy.rows.len(), 20);
    }

    #[tokio::test]
    async fn test_independent_ids_do_not_interfere() {
        let (service, _log, _sink) = setup();
        for id in ["D1.A.1.0", "D1.B.1.0"] {
            service
                .create_taxonomy(id, TaxonomyCreate::new("T", "D1"))
                .await
                .unwrap();
            service.add_row(id, row("r1", "Revenue")).await.unwrap();
        }
        service.publish_taxonomy("D1.A.1.0", true).await.unwrap();

        let a = service.get_taxonomy("D1.A.1.0").await.unwrap().unwrap();
        let b = service.get_taxonomy("D1.B.1.0").await.unwrap().unwrap();
        assert_eq!(a.status, TaxonomyStatus::Published);
        assert_eq!(b.status, TaxonomyStatus::Initialized);
    }

    #[tokio::test]
    async fn test_conflict_reloads_aggregate() {
        let (service, log, _sink) = setup();
        service
            .create_taxonomy(ID, TaxonomyCreate::new("T1", "D1"))
            .await
            .unwrap();

        log.push_raw(EventEnvelope::new(
            ID,
            2,
            TaxonomyEvent::row_added(row("r9", "Foreign").into_row()),
        ));

        let err = service.add_row(ID, row("r1", "Revenue")).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Database(DatabaseError::Conflict {
                expected: 1,
                actual: 2,
                ..
            })
        ));

        // The retry sees the foreign row.
        let err = service.add_row(ID, row("r1", "Foreign")).await.unwrap_err();
        assert!(matches!(err, Error::Taxonomy(TaxonomyError::IncorrectAdd { .. })));
        let receipt = service.add_row(ID, row("r1", "Revenue")).await.unwrap();
        assert_eq!(receipt.version, 3);
    }

    #[tokio::test]
    async fn test_corrupt_history_poisons_aggregate() {
        let (service, log, _sink) = setup();
        log.push_raw(EventEnvelope::new(
            ID,
            1,
            TaxonomyEvent::row_added(row("r1", "Revenue").into_row()),
        ));

        let err = service
            .create_taxonomy(ID, TaxonomyCreate::new("T1", "D1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Replay(ref e) if e.sequence == 1));

        // Every later request is refused without touching the log again.
        let err = service.get_taxonomy(ID).await.unwrap_err();
        assert!(matches!(err, Error::Replay(_)));
        assert_eq!(log.stream(ID).len(), 1);
    }

    #[tokio::test]
    async fn test_update_and_remove_through_service() {
        let log = MockEventLog::new();
        let sink = MockDomainEventSink::new();
        let config = EngineConfig {
            mailbox_capacity: 1,
            ..EngineConfig::default()
        };
        let service =
            TaxonomyService::with_config(Arc::new(log.clone()), Arc::new(sink.clone()), &config);

        service
            .create_taxonomy(ID, TaxonomyCreate::new("T1", "D1"))
            .await
            .unwrap();
        service
            .add_rows(
                ID,
                vec![row("r1", "Revenue"), row("r2", "COGS").with_parent("r1")],
                false,
            )
            .await
            .unwrap();
        service
            .update_row(
                ID,
                "r2",
                RowUpdate {
                    value: "Cost of sales".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        service.remove_row(ID, "r1").await.unwrap();
        service.remove_taxonomy(ID).await.unwrap();

        let taxonomy = service.get_taxonomy(ID).await.unwrap().unwrap();
        assert_eq!(taxonomy.status, TaxonomyStatus::Disabled);
        assert!(taxonomy.rows.is_empty());
        assert_eq!(sink.len(), 5);
    }

    #[tokio::test]
    async fn test_idle_aggregate_is_released_and_reloaded() {
        let log = MockEventLog::new();
        let sink = MockDomainEventSink::new();
        let config = EngineConfig {
            aggregate_idle_timeout: Duration::from_millis(50),
            ..EngineConfig::default()
        };
        let service =
            TaxonomyService::with_config(Arc::new(log.clone()), Arc::new(sink.clone()), &config);

        service
            .create_taxonomy(ID, TaxonomyCreate::new("T1", "D1"))
            .await
            .unwrap();
        assert_eq!(service.active_aggregates().await, 1);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(service.active_aggregates().await, 0);

        // Written while nothing was resident; a fresh load must see it.
        log.push_raw(EventEnvelope::new(
            ID,
            2,
            TaxonomyEvent::row_added(row("r1", "Revenue").into_row()),
        ));

        let receipt = service
            .add_row(ID, row("r2", "COGS").with_parent("r1"))
            .await
            .unwrap();
        assert_eq!(receipt.version, 3);
        assert_eq!(service.active_aggregates().await, 1);

        let taxonomy = service.get_taxonomy(ID).await.unwrap().unwrap();
        assert_eq!(taxonomy.rows.len(), 2);
    }
}
