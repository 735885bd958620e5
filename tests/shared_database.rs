use graphite::construct::Database;
use graphite::interface::SharedDatabase;
use graphite::store::MemoryStore;

fn shared() -> SharedDatabase {
    let mut db = Database::open(MemoryStore::new()).expect("db");
    db.transact_str(
        r#"{:tx-attribute {:db/identity :movie/title
                           :db/attribute :db.attribute/string
                           :db/cardinality :db.cardinality/one}}"#,
    )
    .expect("schema");
    SharedDatabase::new(db)
}

#[test]
fn concurrent_writers_get_distinct_transactions() {
    let shared = shared();
    let mut tx_ids: Vec<u64> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let shared = shared.clone();
                scope.spawn(move || {
                    shared
                        .transact(&format!(r#"{{:tx-data {{:movie/title "Movie {i}"}}}}"#))
                        .expect("transact")
                        .tx_id
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("thread"))
            .collect()
    });
    tx_ids.sort();
    tx_ids.dedup();
    assert_eq!(tx_ids.len(), 8);
    let rows = shared
        .query("{:find [?t] :where [[_ :movie/title ?t]]}", None, &[])
        .expect("query ok")
        .expect("rows");
    assert_eq!(rows.len(), 8);
    let stats = shared.stats().expect("stats");
    assert_eq!(stats.max_transaction_id, tx_ids.last().copied());
}

#[test]
fn request_ids_increase_from_one() {
    let shared = shared();
    assert_eq!(shared.allocate_id(), 1);
    assert_eq!(shared.clone().allocate_id(), 2);
    assert_eq!(shared.allocate_id(), 3);
}

#[test]
fn snapshot_does_not_see_later_writes() {
    let shared = shared();
    shared
        .transact(r#"{:tx-data {:movie/title "Alien"}}"#)
        .expect("transact");
    let snapshot = shared.snapshot().expect("snapshot");
    shared
        .transact(r#"{:tx-data {:movie/title "Aliens"}}"#)
        .expect("transact");
    let titles = "{:find [?t] :where [[_ :movie/title ?t]]}";
    let rows = snapshot.query_str(titles, None, &[]).expect("ok").expect("rows");
    assert_eq!(rows.len(), 1);
    let rows = shared.query(titles, None, &[]).expect("ok").expect("rows");
    assert_eq!(rows.len(), 2);
}
