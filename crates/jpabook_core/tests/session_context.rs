use jpabook_core::{
    EntityState, Member, PersistenceUnit, PersistenceUnitConfig, RepoError, SchemaMode,
    SessionError, TransactionError, TransactionState,
};

fn memory_unit() -> PersistenceUnit {
    PersistenceUnit::open(PersistenceUnitConfig::in_memory("session-test")).unwrap()
}

fn seed(unit: &PersistenceUnit, member: Member) {
    let mut session = unit.session().unwrap();
    session.begin().unwrap();
    session.persist(member).unwrap();
    session.commit().unwrap();
    session.close().unwrap();
}

#[test]
fn find_returns_managed_instance_with_pending_changes() {
    let unit = memory_unit();
    let mut session = unit.session().unwrap();
    session.begin().unwrap();

    let member = session.persist(Member::new("id1", "kangho", 29)).unwrap();
    member.age = 19;

    let found = session.find("id1").unwrap().unwrap();
    assert_eq!(found.age, 19);
    assert_eq!(found.username, "kangho");
    assert!(session.contains("id1"));
}

#[test]
fn persisting_a_managed_id_twice_fails() {
    let unit = memory_unit();
    let mut session = unit.session().unwrap();

    session.persist(Member::new("id1", "kangho", 29)).unwrap();
    let err = session
        .persist(Member::new("id1", "other", 30))
        .unwrap_err();
    assert!(matches!(err, SessionError::EntityExists(ref id) if id == "id1"));
}

#[test]
fn persist_rejects_invalid_member() {
    let unit = memory_unit();
    let mut session = unit.session().unwrap();

    let err = session.persist(Member::new("  ", "kangho", 29)).unwrap_err();
    assert!(matches!(err, SessionError::Validation(_)));
    assert!(!session.contains("  "));
}

#[test]
fn list_all_flushes_pending_inserts_inside_transaction() {
    let unit = memory_unit();
    let mut session = unit.session().unwrap();
    session.begin().unwrap();

    session.persist(Member::new("id1", "kangho", 29)).unwrap();
    session.persist(Member::new("id2", "minji", 31)).unwrap();

    let members = session.list_all().unwrap();
    assert_eq!(members.len(), 2);
    assert_eq!(members[0].id, "id1");
}

#[test]
fn list_all_outside_transaction_sees_only_stored_rows() {
    let unit = memory_unit();
    seed(&unit, Member::new("id1", "kangho", 29));

    let mut session = unit.session().unwrap();
    session.persist(Member::new("id2", "minji", 31)).unwrap();

    let members = session.list_all().unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].id, "id1");
}

#[test]
fn dirty_managed_member_is_updated_at_commit() {
    let unit = memory_unit();
    seed(&unit, Member::new("id1", "kangho", 29));

    let mut session = unit.session().unwrap();
    session.begin().unwrap();
    session.find_mut("id1").unwrap().unwrap().age = 19;
    session.commit().unwrap();
    session.close().unwrap();

    let mut reader = unit.session().unwrap();
    assert_eq!(reader.find("id1").unwrap().unwrap().age, 19);
}

#[test]
fn unchanged_managed_member_issues_no_update() {
    let unit = memory_unit();
    seed(&unit, Member::new("id1", "kangho", 29));

    let mut session = unit.session().unwrap();
    session.begin().unwrap();
    session.find("id1").unwrap().unwrap();
    let stats = session.flush().unwrap();
    assert!(stats.is_empty());

    session.find_mut("id1").unwrap().unwrap().username = "kangho lee".to_string();
    let stats = session.flush().unwrap();
    assert_eq!(stats.updated, 1);
    assert_eq!(stats.inserted + stats.deleted, 0);
}

#[test]
fn flush_requires_active_transaction() {
    let unit = memory_unit();
    let mut session = unit.session().unwrap();

    assert!(matches!(
        session.flush(),
        Err(SessionError::TransactionNotActive)
    ));
    assert!(matches!(
        session.commit(),
        Err(SessionError::TransactionNotActive)
    ));
    assert!(matches!(
        session.rollback(),
        Err(SessionError::TransactionNotActive)
    ));
}

#[test]
fn begin_twice_is_rejected() {
    let unit = memory_unit();
    let mut session = unit.session().unwrap();

    session.begin().unwrap();
    assert!(matches!(
        session.begin(),
        Err(SessionError::TransactionAlreadyActive)
    ));
    assert_eq!(session.transaction_state(), TransactionState::Active);
}

#[test]
fn rollback_discards_flushed_changes_and_detaches() {
    let unit = memory_unit();
    let mut session = unit.session().unwrap();
    session.begin().unwrap();

    session.persist(Member::new("id1", "kangho", 29)).unwrap();
    session.flush().unwrap();
    session.rollback().unwrap();

    assert_eq!(session.transaction_state(), TransactionState::RolledBack);
    assert!(!session.contains("id1"));
    assert!(session.find("id1").unwrap().is_none());
}

#[test]
fn removing_unwritten_member_never_touches_store() {
    let unit = memory_unit();
    let mut session = unit.session().unwrap();
    session.begin().unwrap();

    session.persist(Member::new("id1", "kangho", 29)).unwrap();
    session.remove("id1").unwrap();
    let stats = session.flush().unwrap();

    assert!(stats.is_empty());
    assert!(session.list_all().unwrap().is_empty());
}

#[test]
fn removed_member_is_deleted_at_commit_and_hidden_before() {
    let unit = memory_unit();
    seed(&unit, Member::new("id1", "kangho", 29));

    let mut session = unit.session().unwrap();
    session.begin().unwrap();
    session.find("id1").unwrap().unwrap();
    session.remove("id1").unwrap();
    assert!(session.find("id1").unwrap().is_none());
    session.commit().unwrap();
    session.close().unwrap();

    let mut reader = unit.session().unwrap();
    assert!(reader.find("id1").unwrap().is_none());
}

#[test]
fn re_persisting_removed_member_cancels_delete() {
    let unit = memory_unit();
    seed(&unit, Member::new("id1", "kangho", 29));

    let mut session = unit.session().unwrap();
    session.begin().unwrap();
    session.find("id1").unwrap().unwrap();
    session.remove("id1").unwrap();
    session.persist(Member::new("id1", "kangho", 30)).unwrap();
    session.commit().unwrap();
    session.close().unwrap();

    let mut reader = unit.session().unwrap();
    assert_eq!(reader.find("id1").unwrap().unwrap().age, 30);
}

#[test]
fn removing_unknown_member_fails() {
    let unit = memory_unit();
    let mut session = unit.session().unwrap();

    let err = session.remove("ghost").unwrap_err();
    assert!(matches!(err, SessionError::NotManaged(ref id) if id == "ghost"));
}

#[test]
fn reassigned_identifier_is_rejected_at_flush() {
    let unit = memory_unit();
    let mut session = unit.session().unwrap();
    session.begin().unwrap();

    session.persist(Member::new("id1", "kangho", 29)).unwrap().id = "id9".to_string();
    let err = session.flush().unwrap_err();
    assert!(matches!(
        err,
        SessionError::IdentifierChanged { ref original, ref current }
            if original == "id1" && current == "id9"
    ));
}

#[test]
fn commit_failure_rolls_back_every_pending_change() {
    let unit = memory_unit();
    seed(&unit, Member::new("id1", "kangho", 29));

    let mut session = unit.session().unwrap();
    session.begin().unwrap();
    session.persist(Member::new("id2", "minji", 31)).unwrap();
    session.persist(Member::new("id1", "duplicate", 50)).unwrap();

    let err = session.commit().unwrap_err();
    assert!(matches!(err, SessionError::Repo(RepoError::Db(_))));
    assert_eq!(session.transaction_state(), TransactionState::RolledBack);
    session.close().unwrap();

    let mut reader = unit.session().unwrap();
    let members = reader.list_all().unwrap();
    assert_eq!(members, vec![Member::new("id1", "kangho", 29)]);
}

#[test]
fn run_in_transaction_returns_aborted_error_after_rollback() {
    let unit = memory_unit();
    let mut session = unit.session().unwrap();

    let result: Result<(), TransactionError<SessionError>> =
        session.run_in_transaction(|session| {
            session.persist(Member::new("id1", "kangho", 29))?;
            session.flush()?;
            Err(SessionError::NotManaged("forced".to_string()))
        });

    let err = result.unwrap_err();
    assert!(matches!(
        err.aborted(),
        Some(SessionError::NotManaged(id)) if id == "forced"
    ));
    assert_eq!(session.transaction_state(), TransactionState::RolledBack);
    assert!(session.list_all().unwrap().is_empty());
}

#[test]
fn run_in_transaction_commits_on_success() {
    let unit = memory_unit();
    let mut session = unit.session().unwrap();

    let count = session
        .run_in_transaction(|session| -> Result<usize, SessionError> {
            session.persist(Member::new("id1", "kangho", 29))?;
            Ok(session.list_all()?.len())
        })
        .unwrap();

    assert_eq!(count, 1);
    assert_eq!(session.transaction_state(), TransactionState::Committed);
}

#[test]
fn sessions_are_released_exactly_once() {
    let unit = memory_unit();

    let first = unit.session().unwrap();
    let mut second = unit.session().unwrap();
    assert_eq!(unit.open_sessions(), 2);

    first.close().unwrap();
    assert_eq!(unit.open_sessions(), 1);

    second.begin().unwrap();
    drop(second);
    assert_eq!(unit.open_sessions(), 0);

    unit.close();
}

#[test]
fn closing_session_with_active_transaction_rolls_back() {
    let unit = memory_unit();

    let mut session = unit.session().unwrap();
    session.begin().unwrap();
    session.persist(Member::new("id1", "kangho", 29)).unwrap();
    session.flush().unwrap();
    session.close().unwrap();

    let mut reader = unit.session().unwrap();
    assert!(reader.find("id1").unwrap().is_none());
}

#[test]
fn in_memory_units_do_not_share_data() {
    let first = memory_unit();
    let second = memory_unit();
    seed(&first, Member::new("id1", "kangho", 29));

    let mut session = second.session().unwrap();
    assert!(session.find("id1").unwrap().is_none());
}

#[test]
fn file_unit_in_update_mode_keeps_rows_between_units() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jpabook.db");

    let unit = PersistenceUnit::open(PersistenceUnitConfig::file("file-test", &path)).unwrap();
    seed(&unit, Member::new("id1", "kangho", 29));
    unit.close();

    let reopened = PersistenceUnit::open(PersistenceUnitConfig {
        schema_mode: SchemaMode::Validate,
        show_sql: true,
        ..PersistenceUnitConfig::file("file-test", &path)
    })
    .unwrap();
    let mut session = reopened.session().unwrap();
    assert_eq!(
        session.find("id1").unwrap().cloned(),
        Some(Member::new("id1", "kangho", 29))
    );
}

#[test]
fn file_unit_in_create_mode_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jpabook.db");

    let unit = PersistenceUnit::open(PersistenceUnitConfig::file("file-test", &path)).unwrap();
    seed(&unit, Member::new("id1", "kangho", 29));
    unit.close();

    let recreated = PersistenceUnit::open(PersistenceUnitConfig {
        schema_mode: SchemaMode::Create,
        ..PersistenceUnitConfig::file("file-test", &path)
    })
    .unwrap();
    let mut session = recreated.session().unwrap();
    assert!(session.list_all().unwrap().is_empty());
}

#[test]
fn entity_state_follows_member_lifecycle() {
    let unit = memory_unit();
    let mut session = unit.session().unwrap();
    session.begin().unwrap();

    session.persist(Member::new("id1", "kangho", 29)).unwrap();
    assert_eq!(session.entity_state("id1"), Some(EntityState::New));

    session.flush().unwrap();
    assert_eq!(session.entity_state("id1"), Some(EntityState::Managed));

    session.remove("id1").unwrap();
    assert_eq!(session.entity_state("id1"), Some(EntityState::Removed));

    session.flush().unwrap();
    assert_eq!(session.entity_state("id1"), None);

    session.persist(Member::new("id2", "minji", 31)).unwrap();
    session.clear();
    assert_eq!(session.entity_state("id2"), None);
}
