use graphite::construct::{Database, EntityId};
use graphite::datatype::Value;
use graphite::error::GraphiteError;
use graphite::store::MemoryStore;

const SCHEMA: &str = r#"
{:tx-attribute [{:db/identity :movie/title
                 :db/attribute :db.attribute/string
                 :db/cardinality :db.cardinality/one}
                {:db/identity :movie/genre
                 :db/attribute :db.attribute/string
                 :db/cardinality :db.cardinality/many}
                {:db/identity :movie/release-year
                 :db/attribute :db.attribute/number
                 :db/cardinality :db.cardinality/one}]}
"#;

fn setup() -> Database {
    let mut db = Database::open(MemoryStore::new()).expect("db");
    db.transact_str(SCHEMA).expect("schema");
    db
}

fn titles(db: &Database) -> Vec<String> {
    let mut titles: Vec<String> = db
        .query_str("{:find [?t] :where [[_ :movie/title ?t]]}", None, &[])
        .expect("query ok")
        .expect("rows")
        .into_iter()
        .filter_map(|row| match row.into_iter().next().flatten() {
            Some(Value::Text(s)) => Some(s),
            _ => None,
        })
        .collect();
    titles.sort();
    titles
}

fn entity_titled(db: &Database, title: &str) -> EntityId {
    let rows = db
        .query_str(
            &format!("{{:find [?e] :where [[?e :movie/title \"{title}\"]]}}"),
            None,
            &[],
        )
        .expect("query ok")
        .expect("rows");
    match rows.first().and_then(|row| row[0].as_ref()).and_then(Value::as_entity) {
        Some(e) => e,
        None => panic!("no entity titled {title}"),
    }
}

#[test]
fn map_shape_creates_one_entity_per_map() {
    let mut db = setup();
    let before = db.max_entity_id().expect("max").expect("some");
    let report = db
        .transact_str(r#"{:tx-data [{:movie/title "Commando" :movie/release-year 1985}
                                    {:movie/title "Repo Man"}]}"#)
        .expect("transact");
    assert_eq!(report.tx_id, before + 1);
    assert_eq!(report.tempids.len(), 2);
    // three facts and the timestamp
    assert_eq!(report.atom_count, 4);
    let mut ids: Vec<EntityId> = report.tempids.values().copied().collect();
    ids.sort();
    assert_eq!(ids, vec![report.tx_id + 1, report.tx_id + 2]);
    assert_eq!(titles(&db), vec!["Commando", "Repo Man"]);
}

#[test]
fn explicit_entity_key_targets_an_existing_entity() {
    let mut db = setup();
    db.transact_str(r#"{:tx-data {:movie/title "The Goonies"}}"#).expect("transact");
    let goonies = entity_titled(&db, "The Goonies");
    db.transact_str(&format!(r#"{{:tx-data {{:db/e {goonies} :movie/release-year 1985}}}}"#))
        .expect("transact");
    let rows = db
        .query_str(
            "{:find [?y] :in [?e] :where [[?e :movie/release-year ?y]]}",
            None,
            &[graphite::Datum::Entity(goonies)],
        )
        .expect("query ok")
        .expect("rows");
    assert_eq!(rows, vec![vec![Some(Value::Integer(1985))]]);
}

#[test]
fn tuple_placeholders_share_one_id_per_token() {
    let mut db = setup();
    let report = db
        .transact_str(
            r#"{:tx-data [[:db.operation/assert "gb" :movie/title "Ghostbusters"]
                          [:db.operation/assert "gb" :movie/release-year 1984]
                          [:db.operation/assert "gb" :movie/genre "comedy"]]}"#,
        )
        .expect("transact");
    assert_eq!(report.tempids.len(), 1);
    let gb = report.tempids["gb"];
    assert_eq!(gb, report.tx_id + 1);
    assert_eq!(db.store().count_atoms(gb).expect("count"), 3);
}

#[test]
fn single_tuple_data_section() {
    let mut db = setup();
    let report = db
        .transact_str(r#"{:tx-data [:db.operation/assert "x" :movie/title "Brazil"]}"#)
        .expect("transact");
    assert_eq!(report.atom_count, 2);
    assert_eq!(titles(&db), vec!["Brazil"]);
}

#[test]
fn retraction_hides_the_fact() {
    let mut db = setup();
    db.transact_str(r#"{:tx-data [{:movie/title "The Goonies" :movie/release-year 1985}
                                  {:movie/title "Commando" :movie/release-year 1985}]}"#)
        .expect("transact");
    let goonies = entity_titled(&db, "The Goonies");
    db.transact_str(&format!(
        r#"{{:tx-data [[:db.operation/retract {goonies} :movie/title "The Goonies"]
                       [:db.operation/retract {goonies} :movie/release-year 1985]]}}"#
    ))
    .expect("retract");
    assert_eq!(titles(&db), vec!["Commando"]);
    let rows = db
        .query_str("{:find [?e] :where [[?e :movie/release-year 1985]]}", None, &[])
        .expect("query ok")
        .expect("rows");
    assert_eq!(rows.len(), 1);
}

#[test]
fn assert_and_retract_in_one_transaction() {
    let mut db = setup();
    db.transact_str(r#"{:tx-data {:movie/title "The Goonies"}}"#).expect("transact");
    let goonies = entity_titled(&db, "The Goonies");
    db.transact_str(&format!(
        r#"{{:tx-data [{{:movie/title "Goonies 2"}}
                       [:db.operation/retract {goonies} :movie/title "The Goonies"]]}}"#
    ))
    .expect("transact");
    assert_eq!(titles(&db), vec!["Goonies 2"]);
}

#[test]
fn assert_and_retract_on_one_entity_in_one_transaction() {
    let mut db = setup();
    db.transact_str(r#"{:tx-data {:movie/title "The Goonies"}}"#).expect("transact");
    let goonies = entity_titled(&db, "The Goonies");
    db.transact_str(&format!(
        r#"{{:tx-data [[:db.operation/assert {goonies} :movie/title "The Goonies 2"]
                       [:db.operation/retract {goonies} :movie/title "The Goonies"]]}}"#
    ))
    .expect("transact");
    // the retraction only hides what was asserted before its transaction
    assert_eq!(titles(&db), vec!["The Goonies 2"]);
    assert_eq!(entity_titled(&db, "The Goonies 2"), goonies);
}

#[test]
fn retracting_an_entity_that_never_existed_changes_nothing() {
    let mut db = setup();
    let atoms = db.atom_count().expect("count");
    let report = db
        .transact_str(r#"{:tx-data [[:db.operation/retract 99999 :movie/title "Nope"]
                                    [:db.operation/retract "fresh" :movie/title "Nope"]]}"#)
        .expect("no-op retraction commits");
    assert_eq!(report.atom_count, 0);
    assert_eq!(db.atom_count().expect("count"), atoms);
    assert_eq!(db.store().count_atoms(99999).expect("count"), 0);
}

#[test]
fn keyword_placeholders_are_not_supported() {
    let mut db = setup();
    let atoms = db.atom_count().expect("count");
    let result = db
        .transact_str(r#"{:tx-data [[:db.operation/assert :movie/cult :movie/title "Repo Man"]]}"#);
    assert!(
        matches!(result, Err(GraphiteError::UnsupportedReference(ref token)) if token == ":movie/cult")
    );
    assert_eq!(db.atom_count().expect("count"), atoms);
}

#[test]
fn unknown_attribute_aborts_the_whole_transaction() {
    let mut db = setup();
    let atoms = db.atom_count().expect("count");
    let result = db.transact_str(
        r#"{:tx-data [{:movie/title "Brazil"} {:movie/title "Alien" :movie/rating 5}]}"#,
    );
    assert!(matches!(result, Err(GraphiteError::UnknownIdentity(name)) if name == ":movie/rating"));
    assert_eq!(db.atom_count().expect("count"), atoms);
    assert!(titles(&db).is_empty());
}

#[test]
fn incomplete_declarations_are_dropped() {
    let mut db = setup();
    db.transact_str(
        r#"{:tx-attribute [{:db/identity :movie/rating
                            :db/attribute :db.attribute/number}
                           {:db/identity :movie/studio
                            :db/attribute :db.attribute/string
                            :db/cardinality :db.cardinality/one
                            :db/history 3}]}"#,
    )
    .expect("transact");
    let resolver = db.resolver();
    assert!(matches!(
        resolver.resolve_or_fail(":movie/rating"),
        Err(GraphiteError::UnknownIdentity(_))
    ));
    let studio = resolver.resolve_or_fail(":movie/studio").expect("declared");
    assert_eq!(resolver.name_of(studio).expect("name").as_deref(), Some(":movie/studio"));
}

#[test]
fn transactions_are_monotone() {
    let mut db = setup();
    let mut previous = db.max_transaction_id().expect("max").expect("some");
    for title in ["Alien", "Aliens", "Alien 3"] {
        let report = db
            .transact_str(&format!(r#"{{:tx-data {{:movie/title "{title}"}}}}"#))
            .expect("transact");
        assert!(report.tx_id > previous);
        previous = report.tx_id;
    }
    assert_eq!(db.max_transaction_id().expect("max"), Some(previous));
}

#[test]
fn unallocated_entity_ids_are_rejected() {
    let mut db = Database::open_in_memory().expect("db");
    db.transact_str(SCHEMA).expect("schema");
    let atoms = db.atom_count().expect("count");
    let max_e = db.max_entity_id().expect("max");
    for id in [i64::MAX.to_string(), "1000000".to_string()] {
        let result = db.transact_str(&format!(
            r#"{{:tx-data [:db.operation/assert {id} :movie/title "Edge"]}}"#
        ));
        assert!(matches!(result, Err(GraphiteError::UnsupportedValue(_))));
    }
    assert_eq!(db.atom_count().expect("count"), atoms);
    assert_eq!(db.max_entity_id().expect("max"), max_e);
    let report = db
        .transact_str(r#"{:tx-data {:movie/title "After"}}"#)
        .expect("later transactions still commit");
    assert_eq!(Some(report.tx_id), max_e.map(|e| e + 1));
    assert_eq!(titles(&db), vec!["After"]);
}

#[test]
fn malformed_tuples_are_skipped() {
    let mut db = setup();
    let report = db
        .transact_str(r#"{:tx-data [[:db.operation/assert "x" :movie/title]
                                    [:db.operation/assert "y" :movie/title "Brazil"]]}"#)
        .expect("transact");
    assert_eq!(report.tempids.len(), 1);
    assert_eq!(titles(&db), vec!["Brazil"]);
}
