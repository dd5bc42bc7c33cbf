//! Statements rendered by the SQLite dialect run unchanged on SQLite.

use std::sync::Arc;
use tusk_core::{Connection, EntityDef, Property, Registry, Row, Value};
use tusk_query::{
    Aggregatable, Comparable, Dialect, Field, Path, Query, QueryOptions, Sortable, SqlTranslator,
};
use tusk_sqlite::SqliteConnection;

fn registry() -> Registry {
    Registry::builder()
        .entity(
            EntityDef::new("Group")
                .property(Property::string("name"))
                .has_many("users", "User"),
        )
        .entity(
            EntityDef::new("User")
                .property(Property::string("nickname").required())
                .property(Property::integer("group_id"))
                .property(Property::boolean("admin").default_value(false))
                .property(Property::datetime("joined_at"))
                .belongs_to("group", "Group"),
        )
        .build()
        .unwrap()
}

struct Fixture {
    registry: Registry,
    translator: SqlTranslator,
    conn: SqliteConnection,
}

impl Fixture {
    fn new() -> Self {
        let registry = registry();
        let translator = SqlTranslator::new(Dialect::Sqlite);
        let conn = SqliteConnection::open_memory().unwrap();
        for name in ["Group", "User"] {
            let entity = registry.entity(name).unwrap();
            let ddl = translator.create_table(&entity, &registry.table_properties(name));
            conn.execute_raw(&ddl.sql).unwrap();
        }
        let fixture = Self {
            registry,
            translator,
            conn,
        };
        fixture.insert("Group", &[("name", "Admin".into())]);
        fixture.insert("Group", &[("name", "Staff".into())]);
        fixture.insert("User", &[("nickname", "Lenny".into()), ("group_id", 1.into())]);
        fixture.insert("User", &[("nickname", "Carl".into()), ("group_id", 1.into())]);
        fixture.insert("User", &[("nickname", "100%".into()), ("group_id", 2.into())]);
        fixture
    }

    fn insert(&self, entity: &str, values: &[(&str, Value)]) -> i64 {
        let entity = self.registry.entity(entity).unwrap();
        let values: Vec<(Arc<Property>, Value)> = values
            .iter()
            .map(|(name, value)| (entity.property(name).unwrap().clone(), value.clone()))
            .collect();
        let stmt = self.translator.insert(&entity, &values);
        self.conn.insert(&stmt.sql, &stmt.params).unwrap()
    }

    fn run(&self, query: &Query) -> Vec<Row> {
        let stmt = self.translator.select(query);
        self.conn.query(&stmt.sql, &stmt.params).unwrap()
    }

    fn users(&self, options: QueryOptions) -> Query {
        Query::new(self.registry.entity("User").unwrap()).merge(&options)
    }

    fn prop(&self, name: &str) -> Arc<Property> {
        self.registry
            .entity("User")
            .unwrap()
            .property(name)
            .unwrap()
            .clone()
    }
}

fn nicknames(rows: &[Row]) -> Vec<String> {
    rows.iter()
        .map(|r| r.get_named::<String>("nickname").unwrap())
        .collect()
}

#[test]
fn serial_keys_and_defaults() {
    let f = Fixture::new();
    let rows = f.run(&f.users(QueryOptions::new().order_by(f.prop("id").asc())));
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2].get_named::<i64>("id").unwrap(), 3);
    assert_eq!(rows[0].get_by_name("admin"), Some(&Value::Int(0)));
}

#[test]
fn filters_order_and_offset() {
    let f = Fixture::new();
    let nickname = f.prop("nickname");
    let rows = f.run(&f.users(
        QueryOptions::new()
            .filter(f.prop("group_id").eq(1))
            .order_by(nickname.desc())
            .offset(1),
    ));
    assert_eq!(nicknames(&rows), ["Carl"]);
}

#[test]
fn like_escapes_wildcards() {
    let f = Fixture::new();
    let nickname = f.prop("nickname");
    assert_eq!(
        nicknames(&f.run(&f.users(QueryOptions::new().filter(nickname.like("100\\%"))))),
        ["100%"]
    );
    assert_eq!(
        nicknames(&f.run(&f.users(QueryOptions::new().filter(nickname.like("l%"))))),
        ["Lenny"]
    );
}

#[test]
fn empty_in_selects_nothing() {
    let f = Fixture::new();
    let rows = f.run(&f.users(QueryOptions::new().filter(f.prop("id").in_list(Vec::<i64>::new()))));
    assert!(rows.is_empty());
}

#[test]
fn path_conditions_join() {
    let f = Fixture::new();
    let group_name = Path::parse(&f.registry, "User", "group.name").unwrap();
    let rows = f.run(&f.users(
        QueryOptions::new()
            .filter(group_name.eq("Admin"))
            .order_by(f.prop("nickname").asc()),
    ));
    assert_eq!(nicknames(&rows), ["Carl", "Lenny"]);
}

#[test]
fn grouped_aggregates() {
    let f = Fixture::new();
    let group_id = f.prop("group_id");
    let rows = f.run(&f.users(
        QueryOptions::new()
            .fields(vec![Field::from(Arc::clone(&group_id)), Field::from(f.prop("id").count())])
            .unique(true)
            .order_by(group_id.asc()),
    ));
    let counts: Vec<(i64, i64)> = rows
        .iter()
        .map(|r| {
            (
                r.get_named::<i64>("group_id").unwrap(),
                r.get_named::<i64>("count_id").unwrap(),
            )
        })
        .collect();
    assert_eq!(counts, [(1, 2), (2, 1)]);
}

#[test]
fn update_and_delete_by_key() {
    let f = Fixture::new();
    let user = f.registry.entity("User").unwrap();
    let key = [(f.prop("id"), Value::BigInt(1))];
    let stmt = f
        .translator
        .update(&user, &[(f.prop("nickname"), "Homer".into())], &key);
    assert_eq!(f.conn.execute(&stmt.sql, &stmt.params).unwrap(), 1);

    let stmt = f.translator.delete(&user, &[(f.prop("id"), Value::BigInt(2))]);
    assert_eq!(f.conn.execute(&stmt.sql, &stmt.params).unwrap(), 1);

    let rows = f.run(&f.users(QueryOptions::new().order_by(f.prop("id").asc())));
    assert_eq!(nicknames(&rows), ["Homer", "100%"]);
}

#[test]
fn timestamps_round_trip_as_text() {
    let f = Fixture::new();
    let joined_at = f.prop("joined_at");
    let when = joined_at
        .deserialize(&Value::from("2011-03-04 05:06:07"))
        .unwrap();
    let user = f.registry.entity("User").unwrap();
    let stmt = f.translator.update(&user, &[(Arc::clone(&joined_at), when.clone())], &[(f.prop("id"), Value::BigInt(1))]);
    f.conn.execute(&stmt.sql, &stmt.params).unwrap();

    let rows = f.run(&f.users(QueryOptions::new().filter(joined_at.eq(when.clone()))));
    assert_eq!(rows.len(), 1);
    let raw = rows[0].get_by_name("joined_at").unwrap();
    assert_eq!(joined_at.deserialize(raw).unwrap(), when);
}
