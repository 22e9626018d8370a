use jpabook_core::workflow::{self, DEMO_MEMBER_ID};
use jpabook_core::{
    run_member_workflow, Member, PersistenceUnit, PersistenceUnitConfig, RepoError, RunError,
    SchemaMode, SessionError, TransactionError, WorkflowError,
};
use std::io::{self, Write};

fn memory_unit() -> PersistenceUnit {
    PersistenceUnit::open(PersistenceUnitConfig::in_memory("workflow-test")).unwrap()
}

fn seed(unit: &PersistenceUnit, member: Member) {
    let mut session = unit.session().unwrap();
    session
        .run_in_transaction(|session| session.persist(member).map(|_| ()))
        .unwrap();
    session.close().unwrap();
}

fn stored_members(unit: &PersistenceUnit) -> Vec<Member> {
    let mut session = unit.session().unwrap();
    let members = session.list_all().unwrap();
    session.close().unwrap();
    members
}

struct FailingWriter;

impl Write for FailingWriter {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn walkthrough_prints_lookup_and_count_on_fresh_store() {
    let unit = memory_unit();
    let mut out = Vec::new();

    let report = workflow::run(&unit, &mut out).unwrap();

    assert_eq!(
        String::from_utf8(out).unwrap(),
        "19 , kangho\nmember size : 1\n"
    );
    assert_eq!(report.found_age, 19);
    assert_eq!(report.found_username, "kangho");
    assert_eq!(report.member_count, 1);
}

#[test]
fn removed_member_does_not_survive_commit() {
    let unit = memory_unit();
    workflow::run(&unit, &mut io::sink()).unwrap();

    let mut session = unit.session().unwrap();
    assert!(session.find(DEMO_MEMBER_ID).unwrap().is_none());
    drop(session);
    assert_eq!(unit.open_sessions(), 0);
}

#[test]
fn query_counts_members_already_in_store() {
    let unit = memory_unit();
    seed(&unit, Member::new("id0", "minji", 31));

    let mut session = unit.session().unwrap();
    session.begin().unwrap();
    let report = run_member_workflow(&mut session, &mut io::sink()).unwrap();
    session.commit().unwrap();
    session.close().unwrap();

    assert_eq!(report.member_count, 2);
    assert_eq!(stored_members(&unit), vec![Member::new("id0", "minji", 31)]);
}

#[test]
fn duplicate_identifier_rolls_back_without_partial_state() {
    let unit = memory_unit();
    seed(&unit, Member::new(DEMO_MEMBER_ID, "original", 50));
    let mut out = Vec::new();

    let err = workflow::run(&unit, &mut out).unwrap_err();

    assert!(matches!(
        err,
        RunError::Transaction(TransactionError::Aborted {
            source: WorkflowError::Session(SessionError::Repo(RepoError::Db(_)))
        })
    ));
    assert_eq!(String::from_utf8(out).unwrap(), "19 , kangho\n");
    assert_eq!(
        stored_members(&unit),
        vec![Member::new(DEMO_MEMBER_ID, "original", 50)]
    );
    assert_eq!(unit.open_sessions(), 0);
}

#[test]
fn error_chain_names_constraint_failure_once() {
    let unit = memory_unit();
    seed(&unit, Member::new(DEMO_MEMBER_ID, "original", 50));

    let err = workflow::run(&unit, &mut io::sink()).unwrap_err();
    let report = format!("{:#}", anyhow::Error::from(err));

    assert_eq!(
        report.matches("UNIQUE constraint failed: members.id").count(),
        1,
        "{report}"
    );
    assert!(report.starts_with("member transaction failed: transaction rolled back"));
}

#[test]
fn error_chain_names_schema_mismatch_once() {
    let dir = tempfile::tempdir().unwrap();
    let opened = PersistenceUnit::open(PersistenceUnitConfig {
        schema_mode: SchemaMode::Validate,
        ..PersistenceUnitConfig::file("validate-test", dir.path().join("empty.db"))
    });
    let Err(err) = opened else {
        panic!("validate mode must reject an unmigrated store");
    };
    let report = format!("{:#}", anyhow::Error::from(RunError::from(err)));

    assert_eq!(
        report
            .matches("database schema version 0 does not match expected 1")
            .count(),
        1,
        "{report}"
    );
}

#[test]
fn output_failure_aborts_and_releases_session() {
    let unit = memory_unit();

    let err = workflow::run(&unit, &mut FailingWriter).unwrap_err();

    assert!(matches!(
        err,
        RunError::Transaction(TransactionError::Aborted {
            source: WorkflowError::Output(_)
        })
    ));
    assert!(stored_members(&unit).is_empty());
    assert_eq!(unit.open_sessions(), 0);
}

#[test]
fn walkthrough_is_repeatable_on_the_same_unit() {
    let unit = memory_unit();

    let first = workflow::run(&unit, &mut io::sink()).unwrap();
    let second = workflow::run(&unit, &mut io::sink()).unwrap();

    assert_eq!(first, second);
    unit.close();
}
