use fundbook_core::repo::warning_repo::insert_duplicate_warning;
use fundbook_core::{
    list_duplicate_warnings, open_db, open_db_in_memory, spawn_notifier, CoreConfig,
    DuplicateFundWarning, FundDraft, FundService, InMemoryTaggedCache, ListenerError,
    NotifyError, SqliteFundRepository, SqliteWarningListener, WarningListener,
};
use rusqlite::Connection;

#[derive(Default)]
struct RecordingListener {
    received: Vec<DuplicateFundWarning>,
}

impl WarningListener for RecordingListener {
    fn on_warning(&mut self, warning: &DuplicateFundWarning) -> Result<(), ListenerError> {
        self.received.push(warning.clone());
        Ok(())
    }
}

struct ExplodingListener;

impl WarningListener for ExplodingListener {
    fn on_warning(&mut self, _warning: &DuplicateFundWarning) -> Result<(), ListenerError> {
        panic!("warning sink crashed");
    }
}

fn seed_directory(conn: &Connection) {
    conn.execute_batch(
        "INSERT INTO fund_managers (id, name) VALUES (7, 'Northwind'), (9, 'Contoso');
         INSERT INTO companies (id, name) VALUES (3, 'Initech'), (5, 'Globex');",
    )
    .unwrap();
}

fn acme_growth() -> FundDraft {
    FundDraft::new("Acme Growth", 2015)
        .with_manager(7)
        .with_aliases(["Acme Growth Fund"])
        .with_companies([3, 5])
}

#[test]
fn same_manager_alias_collision_enqueues_one_warning() {
    let mut conn = open_db_in_memory().unwrap();
    seed_directory(&conn);
    let (notifier, handle) = spawn_notifier(8, RecordingListener::default()).unwrap();

    let (original, duplicate) = {
        let repo = SqliteFundRepository::try_new(&mut conn).unwrap();
        let mut service = FundService::new(repo, InMemoryTaggedCache::new(), &CoreConfig::default())
            .with_notifier(notifier);

        let original = service.create_fund(&acme_growth()).unwrap();
        assert_eq!(original.aliases.len(), 1);
        assert_eq!(original.companies.len(), 2);
        assert!(!service.check_for_duplicates(&original).unwrap());

        let duplicate = service
            .create_fund(&FundDraft::new("Acme Growth Fund", 2015).with_manager(7))
            .unwrap();
        assert!(service.check_for_duplicates(&duplicate).unwrap());
        assert!(service.check_for_duplicates(&original).unwrap());

        let elsewhere = service
            .create_fund(&FundDraft::new("Acme Growth Fund", 2015).with_manager(9))
            .unwrap();
        assert!(!service.check_for_duplicates(&elsewhere).unwrap());

        (original, duplicate)
    };

    let (listener, stats) = handle.join().unwrap();
    assert_eq!(stats.delivered, 1);
    assert_eq!(listener.received.len(), 1);

    let warning = &listener.received[0];
    assert_eq!(warning.fund_id, duplicate.id());
    assert_ne!(warning.fund_id, original.id());
    assert_eq!(warning.fund_manager_id, Some(7));
    assert_eq!(
        warning.message(),
        "potential duplicate for fund 'Acme Growth Fund' with manager 7 detected"
    );
}

#[test]
fn detection_compares_names_and_aliases_exactly() {
    let mut conn = open_db_in_memory().unwrap();
    seed_directory(&conn);
    let repo = SqliteFundRepository::try_new(&mut conn).unwrap();
    let mut service = FundService::new(repo, InMemoryTaggedCache::new(), &CoreConfig::default());

    service.create_fund(&acme_growth()).unwrap();

    let alias_on_alias = service
        .create_fund(
            &FundDraft::new("Northwind Flagship", 2019)
                .with_manager(7)
                .with_aliases(["Acme Growth Fund"]),
        )
        .unwrap();
    assert!(service.check_for_duplicates(&alias_on_alias).unwrap());

    let different_case = service
        .create_fund(&FundDraft::new("acme growth", 2019).with_manager(7))
        .unwrap();
    assert!(!service.check_for_duplicates(&different_case).unwrap());

    let self_alias = service
        .create_fund(
            &FundDraft::new("Solo Value", 2019)
                .with_manager(9)
                .with_aliases(["Solo Value"]),
        )
        .unwrap();
    assert!(!service.check_for_duplicates(&self_alias).unwrap());
}

#[test]
fn funds_without_manager_are_compared_with_each_other() {
    let mut conn = open_db_in_memory().unwrap();
    seed_directory(&conn);
    let repo = SqliteFundRepository::try_new(&mut conn).unwrap();
    let mut service = FundService::new(repo, InMemoryTaggedCache::new(), &CoreConfig::default());

    let first = service
        .create_fund(&FundDraft::new("Orphan Fund", 2010))
        .unwrap();
    assert!(!service.check_for_duplicates(&first).unwrap());

    let managed = service
        .create_fund(&FundDraft::new("Orphan Fund", 2010).with_manager(7))
        .unwrap();
    assert!(!service.check_for_duplicates(&managed).unwrap());

    let second = service
        .create_fund(&FundDraft::new("Orphan Fund", 2011))
        .unwrap();
    assert!(service.check_for_duplicates(&second).unwrap());
}

#[test]
fn create_succeeds_when_warning_worker_is_gone() {
    let mut conn = open_db_in_memory().unwrap();
    seed_directory(&conn);
    let (notifier, handle) = spawn_notifier(4, ExplodingListener).unwrap();

    let repo = SqliteFundRepository::try_new(&mut conn).unwrap();
    let mut service = FundService::new(repo, InMemoryTaggedCache::new(), &CoreConfig::default())
        .with_notifier(notifier);

    service.create_fund(&acme_growth()).unwrap();
    service
        .create_fund(&FundDraft::new("Acme Growth Fund", 2015).with_manager(7))
        .unwrap();
    assert!(matches!(handle.join(), Err(NotifyError::WorkerPanicked)));

    let after_crash = service
        .create_fund(&FundDraft::new("Acme Growth", 2016).with_manager(7))
        .unwrap();
    assert_eq!(service.get_fund(after_crash.id()).unwrap(), after_crash);
}

#[test]
fn create_without_notifier_still_flags_and_commits() {
    let mut conn = open_db_in_memory().unwrap();
    seed_directory(&conn);
    let repo = SqliteFundRepository::try_new(&mut conn).unwrap();
    let mut service = FundService::new(repo, InMemoryTaggedCache::new(), &CoreConfig::default());

    service.create_fund(&acme_growth()).unwrap();
    let duplicate = service
        .create_fund(&FundDraft::new("Acme Growth", 2017).with_manager(7))
        .unwrap();
    assert_eq!(service.get_fund(duplicate.id()).unwrap(), duplicate);
}

#[test]
fn sqlite_listener_records_warnings_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fundbook.db");

    let mut conn = open_db(&path).unwrap();
    seed_directory(&conn);
    let listener = SqliteWarningListener::open(&path).unwrap();
    let (notifier, handle) = spawn_notifier(8, listener).unwrap();

    let duplicate = {
        let repo = SqliteFundRepository::try_new(&mut conn).unwrap();
        let mut service =
            FundService::new(repo, InMemoryTaggedCache::new(), &CoreConfig::default())
                .with_notifier(notifier);
        service.create_fund(&acme_growth()).unwrap();
        service
            .create_fund(&FundDraft::new("Acme Growth Fund", 2015).with_manager(7))
            .unwrap()
    };

    let (listener, stats) = handle.join().unwrap();
    assert_eq!(stats.delivered, 1);

    let stored = list_duplicate_warnings(listener.connection()).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].fund_id, duplicate.id());
    assert_eq!(stored[0].fund_name, "Acme Growth Fund");
    assert_eq!(stored[0].fund_manager_id, Some(7));

    let redelivered = DuplicateFundWarning {
        event_id: stored[0].event_id,
        fund_id: stored[0].fund_id,
        fund_name: stored[0].fund_name.clone(),
        fund_manager_id: stored[0].fund_manager_id,
        detected_at: stored[0].detected_at,
    };
    assert!(!insert_duplicate_warning(&conn, &redelivered).unwrap());
    assert_eq!(list_duplicate_warnings(&conn).unwrap().len(), 1);
}
