//! Integration tests for the conflict ledger.

use agent_coord::Coordinator;
use agent_coord::db::Database;
use agent_coord::error::ErrorCode;
use agent_coord::types::{ClaimStatus, ConflictStatus, ConflictType, NewConflict};
use serde_json::json;

/// Helper to create a fresh in-memory database for testing.
fn setup_db() -> Database {
    Database::open_in_memory().expect("Failed to create in-memory database")
}

fn setup() -> Coordinator {
    Coordinator::new(setup_db())
}

fn file_conflict(feature: &str, agents: &[&str]) -> NewConflict {
    NewConflict::new(
        feature,
        ConflictType::FileModification,
        agents.iter().copied(),
        "both agents edited the same file",
    )
    .file_path("src/foo.ts")
}

mod report_conflict_tests {
    use super::*;

    #[test]
    fn report_creates_pending_conflict() {
        let coord = setup();

        let conflict = coord
            .conflicts
            .report_conflict(file_conflict("F", &["A", "B"]))
            .unwrap();

        assert!(!conflict.id.is_empty());
        assert_eq!(conflict.feature_id, "F");
        assert_eq!(conflict.conflict_type, ConflictType::FileModification);
        assert_eq!(conflict.involved_agents, vec!["A", "B"]);
        assert_eq!(conflict.file_path.as_deref(), Some("src/foo.ts"));
        assert_eq!(conflict.status, ConflictStatus::Pending);
        assert!(conflict.resolution.is_none());

        let stored = coord.conflicts.get_conflict(&conflict.id).unwrap().unwrap();
        assert_eq!(stored, conflict);
    }

    #[test]
    fn involved_agents_are_sorted_and_deduplicated() {
        let coord = setup();

        let conflict = coord
            .conflicts
            .report_conflict(file_conflict("F", &["C", "A", "C", "B"]))
            .unwrap();

        assert_eq!(conflict.involved_agents, vec!["A", "B", "C"]);
        assert!(conflict.involves("C"));
        assert!(!conflict.involves("D"));
    }

    #[test]
    fn missing_required_fields_are_rejected() {
        let coord = setup();

        let no_agents = NewConflict::new("F", ConflictType::TestFailure, Vec::<String>::new(), "red build");
        let err = coord.conflicts.report_conflict(no_agents).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let no_description = NewConflict::new("F", ConflictType::TestFailure, ["A"], "");
        let err = coord.conflicts.report_conflict(no_description).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let blank_agent = NewConflict::new("F", ConflictType::TestFailure, ["A", " "], "red build");
        let err = coord.conflicts.report_conflict(blank_agent).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        assert!(coord.conflicts.list_conflicts_by_feature("F").unwrap().is_empty());
    }

    #[test]
    fn metadata_is_preserved() {
        let coord = setup();
        let metadata = json!({ "failing_test": "parser::roundtrip" })
            .as_object()
            .cloned()
            .unwrap();

        let conflict = coord
            .conflicts
            .report_conflict(
                NewConflict::new("F", ConflictType::TestFailure, ["A"], "test broke")
                    .metadata(metadata.clone()),
            )
            .unwrap();

        let stored = coord.conflicts.get_conflict(&conflict.id).unwrap().unwrap();
        assert_eq!(stored.metadata, Some(metadata));
        assert!(stored.file_path.is_none());
    }

    #[test]
    fn get_unknown_conflict_is_none() {
        let coord = setup();
        assert!(coord.conflicts.get_conflict("no-such-id").unwrap().is_none());
    }
}

mod resolve_conflict_tests {
    use super::*;

    /// Report on foo.ts; it is pending; resolve it; it leaves the pending list.
    #[test]
    fn resolve_removes_from_pending() {
        let coord = setup();

        let conflict = coord
            .conflicts
            .report_conflict(file_conflict("F", &["A", "B"]))
            .unwrap();

        let pending = coord.conflicts.list_pending_conflicts("F").unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, conflict.id);

        let resolved = coord
            .conflicts
            .resolve_conflict(&conflict.id, "kept A's version", "lead")
            .unwrap();

        assert_eq!(resolved.status, ConflictStatus::Resolved);
        let resolution = resolved.resolution.as_ref().unwrap();
        assert_eq!(resolution.resolution, "kept A's version");
        assert_eq!(resolution.resolved_by, "lead");
        assert!(resolution.resolved_at >= resolved.reported_at);

        assert!(coord.conflicts.list_pending_conflicts("F").unwrap().is_empty());
        assert_eq!(coord.conflicts.list_conflicts_by_feature("F").unwrap().len(), 1);
    }

    #[test]
    fn second_resolution_fails_and_keeps_first() {
        let coord = setup();

        let conflict = coord
            .conflicts
            .report_conflict(file_conflict("F", &["A", "B"]))
            .unwrap();
        let first = coord
            .conflicts
            .resolve_conflict(&conflict.id, "kept A's version", "lead")
            .unwrap();

        let err = coord
            .conflicts
            .resolve_conflict(&conflict.id, "kept B's version", "other-lead")
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::AlreadyResolved);

        let stored = coord.conflicts.get_conflict(&conflict.id).unwrap().unwrap();
        assert_eq!(stored, first);
    }

    #[test]
    fn resolve_unknown_conflict_is_not_found() {
        let coord = setup();

        let err = coord
            .conflicts
            .resolve_conflict("no-such-id", "n/a", "lead")
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[test]
    fn resolve_requires_resolution_and_resolver() {
        let coord = setup();
        let conflict = coord
            .conflicts
            .report_conflict(file_conflict("F", &["A"]))
            .unwrap();

        let err = coord.conflicts.resolve_conflict(&conflict.id, "", "lead").unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
        let err = coord.conflicts.resolve_conflict(&conflict.id, "merged", "").unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        assert!(coord.conflicts.get_conflict(&conflict.id).unwrap().unwrap().is_pending());
    }

    #[test]
    fn resolved_conflict_serializes_flat() {
        let coord = setup();
        let conflict = coord
            .conflicts
            .report_conflict(file_conflict("F", &["A"]))
            .unwrap();
        let resolved = coord
            .conflicts
            .resolve_conflict(&conflict.id, "merged", "lead")
            .unwrap();

        let value = serde_json::to_value(&resolved).unwrap();
        assert_eq!(value["status"], "resolved");
        assert_eq!(value["resolution"], "merged");
        assert_eq!(value["resolved_by"], "lead");
    }
}

mod resolve_and_release_tests {
    use super::*;

    #[test]
    fn resolution_releases_named_claims() {
        let coord = setup();

        coord.claims.claim_task("F", "impl", "T1", "A").unwrap();
        coord.claims.claim_task("F", "impl", "T2", "B").unwrap();
        coord.claims.claim_task("OTHER", "impl", "T1", "C").unwrap();
        let conflict = coord
            .conflicts
            .report_conflict(file_conflict("F", &["A", "B"]))
            .unwrap();

        let (resolved, released) = coord
            .conflicts
            .resolve_and_release(
                &conflict.id,
                "B redoes T2 after A lands",
                "lead",
                &["T2".to_string(), "T7".to_string()],
            )
            .unwrap();

        assert_eq!(resolved.status, ConflictStatus::Resolved);
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].task_id, "T2");
        assert_eq!(released[0].agent_id, "B");
        assert_eq!(released[0].status, ClaimStatus::Abandoned);
        assert_eq!(released[0].released_by.as_deref(), Some("lead"));
        assert!(released[0].release_reason.as_deref().unwrap().contains(&conflict.id));

        // Untouched: other task in the feature, same task id in another feature
        assert!(coord.claims.get_active_claim("F", "T1").unwrap().is_some());
        assert!(coord.claims.get_active_claim("OTHER", "T1").unwrap().is_some());
        assert!(coord.claims.get_active_claim("F", "T2").unwrap().is_none());
    }

    #[test]
    fn already_resolved_releases_nothing() {
        let coord = setup();

        coord.claims.claim_task("F", "impl", "T1", "A").unwrap();
        let conflict = coord
            .conflicts
            .report_conflict(file_conflict("F", &["A", "B"]))
            .unwrap();
        coord
            .conflicts
            .resolve_conflict(&conflict.id, "merged", "lead")
            .unwrap();

        let err = coord
            .conflicts
            .resolve_and_release(&conflict.id, "again", "lead", &["T1".to_string()])
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::AlreadyResolved);
        assert!(coord.claims.get_active_claim("F", "T1").unwrap().is_some());
    }
}

mod list_conflict_tests {
    use super::*;

    #[test]
    fn pending_is_oldest_first_and_scoped_to_feature() {
        let coord = setup();

        let first = coord
            .conflicts
            .report_conflict(file_conflict("F", &["A", "B"]))
            .unwrap();
        let second = coord
            .conflicts
            .report_conflict(NewConflict::new(
                "F",
                ConflictType::ImplementationDisagreement,
                ["B", "C"],
                "two designs for the cache",
            ))
            .unwrap();
        coord
            .conflicts
            .report_conflict(file_conflict("OTHER", &["A"]))
            .unwrap();

        let pending = coord.conflicts.list_pending_conflicts("F").unwrap();
        let ids: Vec<&str> = pending.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec![first.id.as_str(), second.id.as_str()]);

        let all = coord.conflicts.list_conflicts_by_feature("F").unwrap();
        let ids: Vec<&str> = all.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);
    }

    #[test]
    fn by_agent_includes_resolved_and_other_features() {
        let coord = setup();

        let in_f = coord
            .conflicts
            .report_conflict(file_conflict("F", &["A", "B"]))
            .unwrap();
        let in_other = coord
            .conflicts
            .report_conflict(file_conflict("OTHER", &["A"]))
            .unwrap();
        coord
            .conflicts
            .report_conflict(file_conflict("F", &["C"]))
            .unwrap();
        coord
            .conflicts
            .resolve_conflict(&in_f.id, "merged", "lead")
            .unwrap();

        let for_a = coord.conflicts.list_conflicts_by_agent("A").unwrap();
        let ids: Vec<&str> = for_a.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec![in_other.id.as_str(), in_f.id.as_str()]);
        assert!(for_a.iter().all(|c| c.involves("A")));

        assert_eq!(coord.conflicts.list_conflicts_by_agent("B").unwrap().len(), 1);
        assert!(coord.conflicts.list_conflicts_by_agent("Z").unwrap().is_empty());
    }
}
