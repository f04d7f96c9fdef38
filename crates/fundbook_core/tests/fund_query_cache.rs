use fundbook_core::repo::directory_repo::{DirectoryRepository, SqliteDirectoryRepository};
use fundbook_core::service::fund_query_cache::FUNDS_CACHE_TAG;
use fundbook_core::{
    open_db_in_memory, CoreConfig, FundDraft, FundId, FundListQuery, FundManagerId, FundPage,
    FundPatch, FundRecord, FundRepository, FundService, InMemoryTaggedCache,
    NormalizedFundQuery, RepoResult, SqliteFundRepository,
};
use rusqlite::Connection;
use std::cell::Cell;
use std::sync::Arc;

/// Counts listing queries that reach the store.
struct CountingRepository<R> {
    inner: R,
    list_calls: Cell<u32>,
}

impl<R> CountingRepository<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            list_calls: Cell::new(0),
        }
    }
}

impl<R: FundRepository> FundRepository for CountingRepository<R> {
    fn create_fund(&mut self, draft: &FundDraft) -> RepoResult<FundRecord> {
        self.inner.create_fund(draft)
    }

    fn update_fund(&mut self, fund_id: FundId, patch: &FundPatch) -> RepoResult<FundRecord> {
        self.inner.update_fund(fund_id, patch)
    }

    fn delete_fund(&mut self, fund_id: FundId) -> RepoResult<()> {
        self.inner.delete_fund(fund_id)
    }

    fn get_fund(&self, fund_id: FundId) -> RepoResult<Option<FundRecord>> {
        self.inner.get_fund(fund_id)
    }

    fn list_funds(&self, query: &NormalizedFundQuery) -> RepoResult<FundPage> {
        self.list_calls.set(self.list_calls.get() + 1);
        self.inner.list_funds(query)
    }

    fn has_duplicate(
        &self,
        fund_id: FundId,
        fund_manager_id: Option<FundManagerId>,
        names: &[String],
    ) -> RepoResult<bool> {
        self.inner.has_duplicate(fund_id, fund_manager_id, names)
    }
}

type Service<'conn> =
    FundService<CountingRepository<SqliteFundRepository<'conn>>, Arc<InMemoryTaggedCache>>;

fn service(conn: &mut Connection, cache: Arc<InMemoryTaggedCache>) -> Service<'_> {
    configured_service(conn, cache, &CoreConfig::default())
}

fn configured_service<'conn>(
    conn: &'conn mut Connection,
    cache: Arc<InMemoryTaggedCache>,
    config: &CoreConfig,
) -> Service<'conn> {
    let repo = CountingRepository::new(SqliteFundRepository::try_new(conn).unwrap());
    FundService::new(repo, cache, config)
}

fn list_calls(service: &Service<'_>) -> u32 {
    service.repository().list_calls.get()
}

fn names(page: &FundPage) -> Vec<&str> {
    page.items
        .iter()
        .map(|record| record.fund.name.as_str())
        .collect()
}

fn by_name(name: &str) -> FundListQuery {
    FundListQuery {
        name: Some(name.to_string()),
        ..FundListQuery::default()
    }
}

#[test]
fn repeated_listing_is_served_from_cache() {
    let mut conn = open_db_in_memory().unwrap();
    let cache = Arc::new(InMemoryTaggedCache::new());
    let mut service = service(&mut conn, Arc::clone(&cache));
    service
        .create_fund(&FundDraft::new("Acme Growth", 2015))
        .unwrap();

    let first = service.list_funds(&FundListQuery::default()).unwrap();
    let second = service.list_funds(&FundListQuery::default()).unwrap();

    assert_eq!(first, second);
    assert_eq!(list_calls(&service), 1);
    assert_eq!(cache.entry_count(FUNDS_CACHE_TAG), 1);
}

#[test]
fn every_write_invalidates_cached_listings() {
    let mut conn = open_db_in_memory().unwrap();
    let cache = Arc::new(InMemoryTaggedCache::new());
    let mut service = service(&mut conn, Arc::clone(&cache));
    let query = FundListQuery::default();

    assert_eq!(service.list_funds(&query).unwrap().total, 0);
    service.list_funds(&by_name("Acme")).unwrap();
    assert_eq!(cache.entry_count(FUNDS_CACHE_TAG), 2);

    let created = service
        .create_fund(&FundDraft::new("Acme Growth", 2015))
        .unwrap();
    assert_eq!(cache.entry_count(FUNDS_CACHE_TAG), 0);
    assert_eq!(names(&service.list_funds(&query).unwrap()), vec!["Acme Growth"]);

    service
        .update_fund(
            created.id(),
            &FundPatch {
                name: Some("Acme Value".to_string()),
                ..FundPatch::default()
            },
        )
        .unwrap();
    assert_eq!(cache.entry_count(FUNDS_CACHE_TAG), 0);
    assert_eq!(names(&service.list_funds(&query).unwrap()), vec!["Acme Value"]);

    service.delete_fund(created.id()).unwrap();
    assert_eq!(cache.entry_count(FUNDS_CACHE_TAG), 0);
    assert_eq!(service.list_funds(&query).unwrap().total, 0);

    assert_eq!(list_calls(&service), 5);
}

#[test]
fn failed_write_keeps_cached_listings() {
    let mut conn = open_db_in_memory().unwrap();
    let cache = Arc::new(InMemoryTaggedCache::new());
    let mut service = service(&mut conn, Arc::clone(&cache));

    service.list_funds(&FundListQuery::default()).unwrap();
    service
        .create_fund(&FundDraft::new("Acme Growth", 2015).with_manager(999))
        .unwrap_err();

    assert_eq!(cache.entry_count(FUNDS_CACHE_TAG), 1);
}

#[test]
fn equivalent_queries_share_one_cache_entry() {
    let mut conn = open_db_in_memory().unwrap();
    let cache = Arc::new(InMemoryTaggedCache::new());
    let service = service(&mut conn, Arc::clone(&cache));

    let forward = FundListQuery::from_pairs([
        ("name", "acme"),
        ("start_year", "2015"),
        ("page", "1"),
    ])
    .unwrap();
    let reversed = FundListQuery::from_pairs([
        ("page", "1"),
        ("start_year", "2015"),
        ("utm_source", "newsletter"),
        ("name", " acme "),
    ])
    .unwrap();
    let defaults_spelled_out = FundListQuery {
        name: Some("acme".to_string()),
        start_year: Some(2015),
        per_page: Some(10),
        fund_manager_id: Some(0),
        page: None,
    };

    service.list_funds(&forward).unwrap();
    service.list_funds(&reversed).unwrap();
    service.list_funds(&defaults_spelled_out).unwrap();
    assert_eq!(list_calls(&service), 1);
    assert_eq!(cache.entry_count(FUNDS_CACHE_TAG), 1);

    service.list_funds(&by_name("acme ii")).unwrap();
    service
        .list_funds(&FundListQuery {
            page: Some(2),
            ..forward.clone()
        })
        .unwrap();
    assert_eq!(list_calls(&service), 3);
    assert_eq!(cache.entry_count(FUNDS_CACHE_TAG), 3);
}

#[test]
fn distinct_listings_stay_within_the_cache_bound() {
    let mut conn = open_db_in_memory().unwrap();
    let config = CoreConfig {
        cache_max_entries: 3,
        ..CoreConfig::default()
    };
    let cache = Arc::new(InMemoryTaggedCache::from_config(&config).unwrap());
    let service = configured_service(&mut conn, Arc::clone(&cache), &config);

    for index in 0..50 {
        service.list_funds(&by_name(&format!("fund {index}"))).unwrap();
    }
    assert_eq!(cache.entry_count(FUNDS_CACHE_TAG), 3);
    assert_eq!(list_calls(&service), 50);

    service.list_funds(&by_name("fund 49")).unwrap();
    assert_eq!(list_calls(&service), 50);
    service.list_funds(&by_name("fund 0")).unwrap();
    assert_eq!(list_calls(&service), 51);
}

#[test]
fn zero_page_size_settings_fall_back_to_single_item_pages() {
    let mut conn = open_db_in_memory().unwrap();
    let config = CoreConfig {
        default_per_page: 0,
        max_per_page: 0,
        ..CoreConfig::default()
    };
    let mut service = configured_service(&mut conn, Arc::new(InMemoryTaggedCache::new()), &config);

    let empty = service.list_funds(&FundListQuery::default()).unwrap();
    assert_eq!(empty.per_page, 1);
    assert!(empty.items.is_empty());

    service
        .create_fund(&FundDraft::new("Acme Growth", 2015))
        .unwrap();
    service
        .create_fund(&FundDraft::new("Blue Harbor", 2018))
        .unwrap();

    let page = service
        .list_funds(&FundListQuery {
            per_page: Some(25),
            ..FundListQuery::default()
        })
        .unwrap();
    assert_eq!(page.per_page, 1);
    assert_eq!(names(&page), vec!["Acme Growth"]);
    assert_eq!(page.total, 2);
    assert_eq!(page.last_page, 2);
}

#[test]
fn malformed_query_parameters_are_rejected() {
    let err = FundListQuery::from_pairs([("start_year", "twenty-fifteen")]).unwrap_err();
    assert!(err.to_string().contains("start_year"));
}

struct Catalog {
    northwind: FundManagerId,
    contoso: FundManagerId,
}

fn seed_catalog(conn: &mut Connection) -> Catalog {
    let (northwind, contoso) = {
        let directory = SqliteDirectoryRepository::new(conn);
        (
            directory.create_manager("Northwind").unwrap().id,
            directory.create_manager("Contoso").unwrap().id,
        )
    };

    let mut repo = SqliteFundRepository::try_new(conn).unwrap();
    let drafts = [
        FundDraft::new("Acme Growth", 2015)
            .with_manager(northwind)
            .with_aliases(["Acme G"]),
        FundDraft::new("Blue Harbor", 2018)
            .with_manager(northwind)
            .with_aliases(["Acme Coastal"]),
        FundDraft::new("Cedar Income", 2015).with_manager(contoso),
        FundDraft::new("100% Yield", 2020),
    ];
    for draft in &drafts {
        repo.create_fund(draft).unwrap();
    }

    Catalog { northwind, contoso }
}

#[test]
fn name_filter_matches_fund_names_and_aliases() {
    let mut conn = open_db_in_memory().unwrap();
    seed_catalog(&mut conn);
    let service = service(&mut conn, Arc::new(InMemoryTaggedCache::new()));

    let page = service.list_funds(&by_name("acme")).unwrap();
    assert_eq!(names(&page), vec!["Acme Growth", "Blue Harbor"]);
    assert_eq!(page.total, 2);

    let page = service.list_funds(&by_name("coastal")).unwrap();
    assert_eq!(names(&page), vec!["Blue Harbor"]);

    let page = service.list_funds(&by_name("100%")).unwrap();
    assert_eq!(names(&page), vec!["100% Yield"]);

    let page = service.list_funds(&by_name("0%y")).unwrap();
    assert!(page.items.is_empty());
}

#[test]
fn name_filter_ignores_case_beyond_ascii() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = service(&mut conn, Arc::new(InMemoryTaggedCache::new()));
    service
        .create_fund(&FundDraft::new("Élan Capital", 2016).with_aliases(["ÖSTERSJÖ PARTNERS"]))
        .unwrap();
    service
        .create_fund(&FundDraft::new("Elan Ventures", 2016))
        .unwrap();

    for needle in ["élan", "ÉLAN", "Élan capital"] {
        let page = service.list_funds(&by_name(needle)).unwrap();
        assert_eq!(names(&page), vec!["Élan Capital"], "needle {needle}");
    }

    let page = service.list_funds(&by_name("östersjö")).unwrap();
    assert_eq!(names(&page), vec!["Élan Capital"]);
}

#[test]
fn manager_and_year_filters_combine() {
    let mut conn = open_db_in_memory().unwrap();
    let catalog = seed_catalog(&mut conn);
    let service = service(&mut conn, Arc::new(InMemoryTaggedCache::new()));

    let page = service
        .list_funds(&FundListQuery {
            fund_manager_id: Some(catalog.northwind),
            ..FundListQuery::default()
        })
        .unwrap();
    assert_eq!(names(&page), vec!["Acme Growth", "Blue Harbor"]);

    let page = service
        .list_funds(&FundListQuery {
            start_year: Some(2015),
            ..FundListQuery::default()
        })
        .unwrap();
    assert_eq!(names(&page), vec!["Acme Growth", "Cedar Income"]);

    let page = service
        .list_funds(&FundListQuery {
            fund_manager_id: Some(catalog.contoso),
            start_year: Some(2015),
            ..FundListQuery::default()
        })
        .unwrap();
    assert_eq!(names(&page), vec!["Cedar Income"]);
    assert_eq!(page.items[0].fund_manager.as_ref().map(|m| m.id), Some(catalog.contoso));
}

#[test]
fn listing_paginates_with_totals() {
    let mut conn = open_db_in_memory().unwrap();
    seed_catalog(&mut conn);
    let service = service(&mut conn, Arc::new(InMemoryTaggedCache::new()));

    let first = service
        .list_funds(&FundListQuery {
            per_page: Some(3),
            ..FundListQuery::default()
        })
        .unwrap();
    assert_eq!(first.items.len(), 3);
    assert_eq!(first.total, 4);
    assert_eq!(first.page, 1);
    assert_eq!(first.last_page, 2);

    let second = service
        .list_funds(&FundListQuery {
            per_page: Some(3),
            page: Some(2),
            ..FundListQuery::default()
        })
        .unwrap();
    assert_eq!(names(&second), vec!["100% Yield"]);

    let beyond = service
        .list_funds(&FundListQuery {
            per_page: Some(3),
            page: Some(9),
            ..FundListQuery::default()
        })
        .unwrap();
    assert!(beyond.items.is_empty());
    assert_eq!(beyond.total, 4);

    let capped = service
        .list_funds(&FundListQuery {
            per_page: Some(10_000),
            ..FundListQuery::default()
        })
        .unwrap();
    assert_eq!(capped.per_page, 100);
}
