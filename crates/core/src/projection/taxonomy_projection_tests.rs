#[cfg(test)]
mod tests {
    use crate::events::{EventEnvelope, TaxonomyEvent};
    use crate::projection::{
        build_tree, FoldOutcome, ProjectionError, TaxonomyFilter, TaxonomyProjection, TaxonomyView,
    };
    use crate::taxonomies::{NewRow, RowUpdate, TaxonomyStatus, TaxonomyVersion};
    use std::collections::BTreeMap;

    const ID: &str = "D1.T1.1.0";

    /// Folds a sequence of events starting at sequence 1.
    fn fold(events: Vec<TaxonomyEvent>) -> Result<TaxonomyView, ProjectionError> {
        let mut view: Option<TaxonomyView> = None;
        for (i, event) in events.into_iter().enumerate() {
            let envelope = EventEnvelope::new(ID, i as u64 + 1, event);
            match TaxonomyProjection::apply(view.as_ref(), &envelope)? {
                FoldOutcome::Applied(next) => view = Some(next),
                other => panic!("unexpected outcome {:?}", other),
            }
        }
        Ok(view.expect("at least one event"))
    }

    fn created() -> TaxonomyEvent {
        TaxonomyEvent::TaxonomyCreated {
            name: "T1".to_string(),
            description: Some("chart of accounts".to_string()),
            dimension: "D1".to_string(),
            version: TaxonomyVersion::default(),
        }
    }

    fn added(id: &str, value: &str, parent: Option<&str>) -> TaxonomyEvent {
        let mut row = NewRow::new(value).with_id(id);
        row.parent = parent.map(str::to_string);
        TaxonomyEvent::row_added(row.into_row())
    }

    fn updated(id: &str, value: &str, parent: Option<&str>) -> TaxonomyEvent {
        TaxonomyEvent::TaxonomyTaxRowUpdated {
            row_id: id.to_string(),
            update: RowUpdate {
                value: value.to_string(),
                parent: parent.map(str::to_string),
                ..Default::default()
            },
        }
    }

    /// One batch of `depth` rows, each parented by the row before it.
    fn chain(depth: usize) -> TaxonomyEvent {
        let rows = (0..depth)
            .map(|i| {
                let mut row = NewRow::new(format!("Level {}", i)).with_id(format!("n{}", i));
                if i > 0 {
                    row.parent = Some(format!("n{}", i - 1));
                }
                row.into_row()
            })
            .collect();
        TaxonomyEvent::TaxonomyTaxRowsAdded {
            rows,
            is_replace: false,
        }
    }

    fn children(view: &TaxonomyView, id: &str) -> Vec<String> {
        view.row(id).unwrap().children.clone()
    }

    // ==================== Fold Tests ====================

    #[test]
    fn test_created_view_mirrors_metadata() {
        let view = fold(vec![created()]).unwrap();
        assert_eq!(view.status, TaxonomyStatus::Initialized);
        assert_eq!(view.name, "T1");
        assert_eq!(view.dimension, "D1");
        assert_eq!(view.description.as_deref(), Some("chart of accounts"));
        assert!(!view.is_published);
        assert_eq!(view.last_sequence, 1);
    }

    #[test]
    fn test_children_follow_row_additions_and_removals() {
        let view = fold(vec![
            created(),
            added("r1", "Revenue", None),
            added("r2", "COGS", Some("r1")),
        ])
        .unwrap();
        assert_eq!(children(&view, "r1"), vec!["r2"]);
        assert!(children(&view, "r2").is_empty());
        view.check_links().unwrap();

        let view = fold(vec![
            created(),
            added("r1", "Revenue", None),
            added("r2", "COGS", Some("r1")),
            TaxonomyEvent::row_removed("r2"),
            TaxonomyEvent::row_removed("r1"),
        ])
        .unwrap();
        assert!(view.rows.is_empty());
    }

    #[test]
    fn test_children_are_ordered_by_insertion() {
        let view = fold(vec![
            created(),
            added("root", "Root", None),
            added("z", "Z", Some("root")),
            added("a", "A", Some("root")),
            added("m", "M", None),
            updated("m", "M", Some("root")),
        ])
        .unwrap();
        assert_eq!(children(&view, "root"), vec!["z", "a", "m"]);
        view.check_links().unwrap();
    }

    #[test]
    fn test_update_moves_row_between_parents() {
        let view = fold(vec![
            created(),
            added("r1", "Revenue", None),
            added("r2", "COGS", Some("r1")),
            added("r3", "Opex", None),
            updated("r2", "COGS", Some("r3")),
        ])
        .unwrap();
        assert!(children(&view, "r1").is_empty());
        assert_eq!(children(&view, "r3"), vec!["r2"]);

        let view = fold(vec![
            created(),
            added("r1", "Revenue", None),
            added("r2", "COGS", Some("r1")),
            updated("r2", "COGS", None),
        ])
        .unwrap();
        assert!(children(&view, "r1").is_empty());
        assert!(view.row("r2").unwrap().parent.is_none());
    }

    #[test]
    fn test_replace_batch_clears_rows() {
        let batch = vec![
            NewRow::new("A").with_id("rA").into_row(),
            NewRow::new("B").with_id("rB").with_parent("rA").into_row(),
        ];
        let view = fold(vec![
            created(),
            added("r1", "Revenue", None),
            TaxonomyEvent::TaxonomyTaxRowsAdded {
                rows: batch,
                is_replace: true,
            },
        ])
        .unwrap();

        let ids: Vec<&String> = view.rows.keys().collect();
        assert_eq!(ids, vec!["rA", "rB"]);
        assert_eq!(children(&view, "rA"), vec!["rB"]);
    }

    #[test]
    fn test_batch_removal_of_subtree() {
        let view = fold(vec![
            created(),
            added("r1", "Revenue", None),
            added("r2", "COGS", Some("r1")),
            added("r3", "Opex", None),
            TaxonomyEvent::TaxonomyTaxRowsRemoved {
                row_ids: vec!["r1".to_string(), "r2".to_string()],
            },
        ])
        .unwrap();
        let ids: Vec<&String> = view.rows.keys().collect();
        assert_eq!(ids, vec!["r3"]);
    }

    #[test]
    fn test_publish_flag_is_mirrored() {
        let view = fold(vec![created(), TaxonomyEvent::published(true)]).unwrap();
        assert!(view.is_published);
        assert_eq!(view.status, TaxonomyStatus::Published);

        let view = fold(vec![
            created(),
            TaxonomyEvent::published(true),
            TaxonomyEvent::published(false),
        ])
        .unwrap();
        assert!(!view.is_published);
        assert_eq!(view.status, TaxonomyStatus::Initialized);
    }

    #[test]
    fn test_removal_leaves_tombstone() {
        let view = fold(vec![
            created(),
            added("r1", "Revenue", None),
            TaxonomyEvent::TaxonomyRemoved,
        ])
        .unwrap();
        assert_eq!(view.status, TaxonomyStatus::Disabled);
        assert!(view.rows.is_empty());
        assert_eq!(view.name, "T1");
        assert!(!TaxonomyFilter::by_dimension_and_name("D1", "T1").matches(&view));
    }

    // ==================== Dedup and Gap Tests ====================

    #[test]
    fn test_redelivery_is_a_duplicate() {
        let view = fold(vec![created(), added("r1", "Revenue", None)]).unwrap();
        let redelivered = EventEnvelope::new(ID, 2, added("r1", "Revenue", None));
        assert_eq!(
            TaxonomyProjection::apply(Some(&view), &redelivered).unwrap(),
            FoldOutcome::Duplicate
        );
    }

    #[test]
    fn test_gap_is_reported() {
        let view = fold(vec![created()]).unwrap();
        let ahead = EventEnvelope::new(ID, 4, added("r1", "Revenue", None));
        assert_eq!(
            TaxonomyProjection::apply(Some(&view), &ahead).unwrap(),
            FoldOutcome::Gap {
                expected: 2,
                received: 4
            }
        );

        let first = EventEnvelope::new(ID, 2, created());
        assert_eq!(
            TaxonomyProjection::apply(None, &first).unwrap(),
            FoldOutcome::Gap {
                expected: 1,
                received: 2
            }
        );
    }

    // ==================== Divergence Tests ====================

    #[test]
    fn test_dangling_parent_diverges() {
        let err = fold(vec![created(), added("r2", "COGS", Some("r1"))]).unwrap_err();
        match err {
            ProjectionError::Diverged {
                taxonomy_id,
                sequence,
                reason,
            } => {
                assert_eq!(taxonomy_id, ID);
                assert_eq!(sequence, 2);
                assert!(reason.contains("parent row 'r1' not found"));
            }
            other => panic!("Expected Diverged, got {:?}", other),
        }
    }

    #[test]
    fn test_removing_parent_diverges() {
        let err = fold(vec![
            created(),
            added("r1", "Revenue", None),
            added("r2", "COGS", Some("r1")),
            TaxonomyEvent::row_removed("r1"),
        ])
        .unwrap_err();
        assert!(matches!(err, ProjectionError::Diverged { sequence: 4, .. }));
    }

    #[test]
    fn test_row_event_on_published_view_diverges() {
        let err = fold(vec![
            created(),
            TaxonomyEvent::published(true),
            added("r1", "Revenue", None),
        ])
        .unwrap_err();
        assert!(matches!(err, ProjectionError::Diverged { sequence: 3, .. }));
    }

    #[test]
    fn test_failed_batch_leaves_view_untouched() {
        let view = fold(vec![created(), added("r1", "Revenue", None)]).unwrap();
        let batch = EventEnvelope::new(
            ID,
            3,
            TaxonomyEvent::TaxonomyTaxRowsAdded {
                rows: vec![
                    NewRow::new("A").with_id("a").into_row(),
                    NewRow::new("Revenue").with_id("b").into_row(),
                ],
                is_replace: false,
            },
        );
        assert!(TaxonomyProjection::apply(Some(&view), &batch).is_err());
        assert_eq!(view.rows.len(), 1);
        assert_eq!(view.last_sequence, 2);
    }

    #[test]
    fn test_check_links_detects_stale_cache() {
        let mut view = fold(vec![
            created(),
            added("r1", "Revenue", None),
            added("r2", "COGS", Some("r1")),
        ])
        .unwrap();
        view.rows.get_mut("r1").unwrap().children.clear();
        assert!(view.check_links().is_err());
    }

    #[test]
    fn test_large_batch_keeps_children_in_insertion_order() {
        // Ids descend so the arena's key order disagrees with insertion order.
        let mut rows = vec![NewRow::new("Root").with_id("root").into_row()];
        rows.extend((0..5_000).map(|i| {
            NewRow::new(format!("Leaf {}", i))
                .with_id(format!("leaf{:05}", 4_999 - i))
                .with_parent("root")
                .into_row()
        }));
        let batch = TaxonomyEvent::TaxonomyTaxRowsAdded {
            rows,
            is_replace: false,
        };

        let view = fold(vec![created(), batch.clone()]).unwrap();
        let leaves = children(&view, "root");
        assert_eq!(leaves.len(), 5_000);
        assert_eq!(leaves[0], "leaf04999");
        assert_eq!(leaves[4_999], "leaf00000");
        view.check_links().unwrap();

        // A moved row regains its original slot when it comes back.
        let view = fold(vec![
            created(),
            batch.clone(),
            updated("leaf02500", "Leaf 2499", None),
            updated("leaf02500", "Leaf 2499", Some("root")),
            TaxonomyEvent::row_removed("leaf00000"),
        ])
        .unwrap();
        let leaves = children(&view, "root");
        assert_eq!(leaves.len(), 4_999);
        assert_eq!(leaves[2_499], "leaf02500");
        assert_eq!(leaves.last().map(String::as_str), Some("leaf00001"));
        view.check_links().unwrap();
    }

    // ==================== Tree Tests ====================

    #[test]
    fn test_build_tree_handles_deep_chain() {
        const DEPTH: usize = 20_000;
        let view = fold(vec![created(), chain(DEPTH)]).unwrap();
        view.check_links().unwrap();

        let tree = build_tree(&view);
        assert_eq!(tree.len(), 1);

        let mut node = &tree[0];
        let mut depth = 1;
        while let Some(child) = node.children.first() {
            assert_eq!(node.children.len(), 1);
            node = child;
            depth += 1;
        }
        assert_eq!(depth, DEPTH);
        assert_eq!(node.value, format!("Level {}", DEPTH - 1));

        drop(tree);
    }

    #[test]
    fn test_build_tree_nests_children() {
        let view = fold(vec![
            created(),
            added("r1", "Revenue", None),
            added("r2", "COGS", Some("r1")),
            added("r3", "Freight", Some("r2")),
            added("r4", "Opex", None),
        ])
        .unwrap();

        let tree = build_tree(&view);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].row_id, "r1");
        assert_eq!(tree[1].row_id, "r4");
        assert_eq!(tree[0].children[0].row_id, "r2");
        assert_eq!(tree[0].children[0].children[0].value, "Freight");
        assert!(tree[1].children.is_empty());
    }

    #[test]
    fn test_source_hint_pairs() {
        let mut hints = BTreeMap::new();
        hints.insert(
            "gl".to_string(),
            vec!["account".to_string(), "sub_account".to_string()],
        );
        hints.insert("erp".to_string(), vec!["code".to_string()]);
        let mut row = NewRow::new("Revenue").with_id("r1");
        row.dimension_src_hints = hints;

        let view = fold(vec![created(), TaxonomyEvent::row_added(row.into_row())]).unwrap();
        assert_eq!(
            view.row("r1").unwrap().source_hint_pairs(),
            vec![
                ("erp", "code"),
                ("gl", "account"),
                ("gl", "sub_account")
            ]
        );
    }

    // ==================== Filter Tests ====================

    #[test]
    fn test_filter_matches() {
        let view = fold(vec![created()]).unwrap();
        assert!(TaxonomyFilter::by_dimension_and_name("D1", "T1").matches(&view));
        assert!(!TaxonomyFilter::by_dimension_and_name("D1", "T2").matches(&view));
        assert!(!TaxonomyFilter::by_dimension_and_name("D1", "T1")
            .published()
            .matches(&view));
        assert!(TaxonomyFilter::default().matches(&view));

        let published = fold(vec![created(), TaxonomyEvent::published(true)]).unwrap();
        assert!(TaxonomyFilter::by_dimension_and_name("D1", "T1")
            .published()
            .matches(&published));
    }
}
