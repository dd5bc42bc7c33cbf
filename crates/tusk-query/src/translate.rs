//! SQL generation.
//!
//! [`SqlTranslator`] renders queries and record writes into [`Statement`]s
//! with positional parameters for one [`Dialect`]. It never talks to a
//! database; data sources pair it with a connection.
//!
//! ```ignore
//! let translator = SqlTranslator::new(Dialect::Sqlite);
//! let stmt = translator.select(&query);
//! // SELECT "users"."id" AS "id", ... FROM "users" WHERE "users"."nickname" = ?1
//! ```

use crate::aggregate::Aggregator;
use crate::condition::{Comparison, Condition, Operator, Subject};
use crate::query::{Field, Query};
use std::collections::HashSet;
use std::sync::Arc;
use tusk_core::{EntityType, Property, PropertyKind, Value};

/// SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    /// `$1`, `$2` placeholders
    Postgres,
    /// `?1`, `?2` placeholders
    #[default]
    Sqlite,
    /// `?` placeholders
    Mysql,
}

impl Dialect {
    /// Placeholder for the given parameter index (1-based).
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Sqlite => format!("?{index}"),
            Dialect::Mysql => "?".to_string(),
        }
    }

    /// Quote an identifier, doubling embedded quote characters.
    pub fn quote_identifier(self, name: &str) -> String {
        match self {
            Dialect::Postgres | Dialect::Sqlite => format!("\"{}\"", name.replace('"', "\"\"")),
            Dialect::Mysql => format!("`{}`", name.replace('`', "``")),
        }
    }
}

/// A rendered statement and its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }
}

/// Renders queries and writes as SQL.
#[derive(Debug, Clone, Default)]
pub struct SqlTranslator {
    dialect: Dialect,
    table_prefix: Option<String>,
}

impl SqlTranslator {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            table_prefix: None,
        }
    }

    /// Prefix every table name with `prefix_`.
    #[must_use]
    pub fn with_table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = Some(prefix.into());
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Unquoted table name for an entity.
    pub fn table_name(&self, entity: &EntityType) -> String {
        match &self.table_prefix {
            Some(prefix) => format!("{prefix}_{}", entity.storage_name),
            None => entity.storage_name.clone(),
        }
    }

    fn quote(&self, name: &str) -> String {
        self.dialect.quote_identifier(name)
    }

    // ==================== Reads ====================

    /// Render a SELECT for `query`.
    pub fn select(&self, query: &Query) -> Statement {
        let table = self.table_name(&query.entity);
        let mut w = Writer::new(self, &table);

        let columns: Vec<String> = query
            .fields
            .iter()
            .map(|field| match field {
                Field::Property(p) => {
                    format!("{} AS {}", w.column(&table, &p.field_name), self.quote(&p.name))
                }
                Field::Aggregate(a) => {
                    format!("{} AS {}", w.aggregate(a), self.quote(&a.alias()))
                }
            })
            .collect();

        let mut sql = String::from("SELECT ");
        if columns.is_empty() {
            sql.push('1');
        } else {
            sql.push_str(&columns.join(", "));
        }
        sql.push_str(" FROM ");
        sql.push_str(&self.quote(&table));

        // INNER JOIN chain, one join per distinct hop prefix
        let mut joined = HashSet::new();
        for link in &query.links {
            for (i, hop) in link.hops.iter().enumerate() {
                let alias = link.alias(i + 1);
                if !joined.insert(alias.clone()) {
                    continue;
                }
                let previous = if i == 0 { table.clone() } else { link.alias(i) };
                let on: Vec<String> = hop
                    .join_keys()
                    .map(|(near, far)| {
                        format!(
                            "{} = {}",
                            w.column(&previous, &near.field_name),
                            w.column(&alias, &far.field_name)
                        )
                    })
                    .collect();
                sql.push_str(&format!(
                    " INNER JOIN {} AS {} ON {}",
                    self.quote(&self.table_name(&hop.entity)),
                    self.quote(&alias),
                    on.join(" AND ")
                ));
            }
        }

        if !query.conditions.is_null() {
            sql.push_str(" WHERE ");
            let clause = w.condition(&query.conditions);
            sql.push_str(&clause);
        }

        if query.unique {
            let grouped: Vec<String> = query
                .properties()
                .map(|p| w.column(&table, &p.field_name))
                .collect();
            if !grouped.is_empty() {
                sql.push_str(" GROUP BY ");
                sql.push_str(&grouped.join(", "));
            }
        }

        if !query.order.is_empty() {
            let terms: Vec<String> = query
                .order
                .iter()
                .map(|o| {
                    format!(
                        "{} {}",
                        w.column(&table, &o.property.field_name),
                        o.direction.as_sql()
                    )
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }

        match (query.limit, query.offset) {
            (Some(limit), 0) => sql.push_str(&format!(" LIMIT {limit}")),
            (Some(limit), offset) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (None, 0) => {}
            (None, offset) => match self.dialect {
                Dialect::Sqlite => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
                Dialect::Mysql => {
                    sql.push_str(&format!(" LIMIT 18446744073709551615 OFFSET {offset}"));
                }
                Dialect::Postgres => sql.push_str(&format!(" OFFSET {offset}")),
            },
        }

        tracing::trace!(sql = %sql, params = w.params.len(), "Rendered select");
        Statement {
            sql,
            params: w.params,
        }
    }

    // ==================== Writes ====================

    /// Render an INSERT of the given property values.
    pub fn insert(&self, entity: &EntityType, values: &[(Arc<Property>, Value)]) -> Statement {
        let table = self.quote(&self.table_name(entity));
        if values.is_empty() {
            let sql = match self.dialect {
                Dialect::Mysql => format!("INSERT INTO {table} () VALUES ()"),
                Dialect::Postgres | Dialect::Sqlite => format!("INSERT INTO {table} DEFAULT VALUES"),
            };
            return Statement::new(sql);
        }

        let mut params = Vec::with_capacity(values.len());
        let mut columns = Vec::with_capacity(values.len());
        let mut placeholders = Vec::with_capacity(values.len());
        for (property, value) in values {
            columns.push(self.quote(&property.field_name));
            params.push(property.serialize(value));
            placeholders.push(self.dialect.placeholder(params.len()));
        }
        Statement {
            sql: format!(
                "INSERT INTO {table} ({}) VALUES ({})",
                columns.join(", "),
                placeholders.join(", ")
            ),
            params,
        }
    }

    /// Render an UPDATE of `changes` on the row identified by `key`.
    pub fn update(
        &self,
        entity: &EntityType,
        changes: &[(Arc<Property>, Value)],
        key: &[(Arc<Property>, Value)],
    ) -> Statement {
        let mut params = Vec::new();
        let mut assignments = Vec::with_capacity(changes.len());
        for (property, value) in changes {
            params.push(property.serialize(value));
            assignments.push(format!(
                "{} = {}",
                self.quote(&property.field_name),
                self.dialect.placeholder(params.len())
            ));
        }
        let filter = self.key_filter(key, &mut params);
        Statement {
            sql: format!(
                "UPDATE {} SET {} WHERE {filter}",
                self.quote(&self.table_name(entity)),
                assignments.join(", ")
            ),
            params,
        }
    }

    /// Render a DELETE of the row identified by `key`.
    pub fn delete(&self, entity: &EntityType, key: &[(Arc<Property>, Value)]) -> Statement {
        let mut params = Vec::new();
        let filter = self.key_filter(key, &mut params);
        Statement {
            sql: format!(
                "DELETE FROM {} WHERE {filter}",
                self.quote(&self.table_name(entity))
            ),
            params,
        }
    }

    fn key_filter(&self, key: &[(Arc<Property>, Value)], params: &mut Vec<Value>) -> String {
        key.iter()
            .map(|(property, value)| {
                let column = self.quote(&property.field_name);
                if value.is_null() {
                    format!("{column} IS NULL")
                } else {
                    params.push(property.serialize(value));
                    format!("{column} = {}", self.dialect.placeholder(params.len()))
                }
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    // ==================== Schema ====================

    /// Render CREATE TABLE for an entity's table holding `properties`.
    pub fn create_table(&self, entity: &EntityType, properties: &[Arc<Property>]) -> Statement {
        let table = self.table_name(entity);
        let mut parts: Vec<String> = properties.iter().map(|p| self.column_definition(p)).collect();
        if !entity.keys.is_empty() {
            let keys: Vec<String> = entity
                .keys
                .iter()
                .map(|k| self.quote(&k.field_name))
                .collect();
            parts.push(format!(
                "CONSTRAINT {} PRIMARY KEY ({})",
                self.quote(&format!("{table}_PK")),
                keys.join(", ")
            ));
        }
        Statement::new(format!(
            "CREATE TABLE {} ({})",
            self.quote(&table),
            parts.join(", ")
        ))
    }

    pub fn drop_table(&self, entity: &EntityType) -> Statement {
        Statement::new(format!(
            "DROP TABLE IF EXISTS {}",
            self.quote(&self.table_name(entity))
        ))
    }

    fn column_definition(&self, property: &Property) -> String {
        let mut def = format!(
            "{} {}",
            self.quote(&property.field_name),
            self.column_type(property)
        );
        if property.required || property.key {
            def.push_str(" NOT NULL");
        }
        if property.serial && self.dialect == Dialect::Mysql {
            def.push_str(" AUTO_INCREMENT");
        }
        if property.unique && !property.key {
            def.push_str(" UNIQUE");
        }
        if let Some(default) = &property.default {
            def.push_str(" DEFAULT ");
            def.push_str(&sql_literal(&property.serialize(default)));
        }
        def
    }

    /// Column type for a property kind.
    pub fn column_type(&self, property: &Property) -> String {
        let postgres = self.dialect == Dialect::Postgres;
        match property.kind {
            PropertyKind::String | PropertyKind::Discriminator => {
                format!("VARCHAR({})", property.length.unwrap_or(50))
            }
            PropertyKind::Text => "TEXT".to_string(),
            PropertyKind::Integer if property.serial && postgres => "SERIAL".to_string(),
            PropertyKind::Integer => "INTEGER".to_string(),
            PropertyKind::Float if postgres => "DOUBLE PRECISION".to_string(),
            PropertyKind::Float => "FLOAT".to_string(),
            PropertyKind::Boolean => "BOOLEAN".to_string(),
            PropertyKind::DateTime if postgres => "TIMESTAMP".to_string(),
            PropertyKind::DateTime => "DATETIME".to_string(),
            PropertyKind::Binary => match self.dialect {
                Dialect::Postgres => "BYTEA".to_string(),
                Dialect::Mysql => "BLOB".to_string(),
                Dialect::Sqlite => "BINARY".to_string(),
            },
        }
    }
}

/// Inline literal for DDL defaults.
fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null | Value::Array(_) => "NULL".to_string(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Value::Int(v) => v.to_string(),
        Value::BigInt(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Bytes(b) => format!(
            "X'{}'",
            b.iter().map(|byte| format!("{byte:02X}")).collect::<String>()
        ),
        Value::Timestamp(_) => format!("'{}'", value.key_fragment()),
    }
}

/// Accumulates parameters while rendering one statement.
struct Writer<'a> {
    translator: &'a SqlTranslator,
    base: &'a str,
    params: Vec<Value>,
}

impl<'a> Writer<'a> {
    fn new(translator: &'a SqlTranslator, base: &'a str) -> Self {
        Self {
            translator,
            base,
            params: Vec::new(),
        }
    }

    fn column(&self, alias: &str, field: &str) -> String {
        format!(
            "{}.{}",
            self.translator.quote(alias),
            self.translator.quote(field)
        )
    }

    fn bind(&mut self, value: Value) -> String {
        self.params.push(value);
        self.translator.dialect.placeholder(self.params.len())
    }

    fn aggregate(&self, aggregator: &Aggregator) -> String {
        let target = match &aggregator.property {
            Some(p) => self.column(self.base, &p.field_name),
            None => "*".to_string(),
        };
        format!("{}({target})", aggregator.kind.as_sql())
    }

    fn subject(&mut self, subject: &Subject) -> String {
        match subject {
            Subject::Property(p) => self.column(self.base, &p.field_name),
            Subject::Path(path) => self.column(&path.alias(), &path.property.field_name),
            Subject::Value(v) => self.bind(v.clone()),
        }
    }

    fn operand(&mut self, subject: &Subject, value: &Value) -> String {
        let stored = match subject.property() {
            Some(p) => p.serialize(value),
            None => value.clone(),
        };
        self.bind(stored)
    }

    fn condition(&mut self, condition: &Condition) -> String {
        match condition {
            Condition::Null => "1 = 1".to_string(),
            Condition::Comparison(c) => self.comparison(c),
            Condition::And(operands) if operands.is_empty() => "1 = 1".to_string(),
            Condition::Or(operands) if operands.is_empty() => "1 = 0".to_string(),
            Condition::And(operands) => self.join(operands, " AND "),
            Condition::Or(operands) => self.join(operands, " OR "),
            Condition::Not(inner) => format!("NOT ({})", self.condition(inner)),
        }
    }

    fn join(&mut self, operands: &[Condition], separator: &str) -> String {
        let parts: Vec<String> = operands.iter().map(|c| self.condition(c)).collect();
        format!("({})", parts.join(separator))
    }

    fn comparison(&mut self, c: &Comparison) -> String {
        if c.operator == Operator::In {
            let items: &[Value] = match &c.value {
                Value::Array(items) => items,
                single => std::slice::from_ref(single),
            };
            if items.is_empty() {
                return "1 = 0".to_string();
            }
            let left = self.subject(&c.subject);
            let placeholders: Vec<String> =
                items.iter().map(|v| self.operand(&c.subject, v)).collect();
            return format!("{left} IN ({})", placeholders.join(", "));
        }

        let left = self.subject(&c.subject);
        match (c.operator, &c.value) {
            (Operator::Eq, Value::Null) => format!("{left} IS NULL"),
            (Operator::NotEq, Value::Null) => format!("{left} IS NOT NULL"),
            (Operator::Like, pattern) => {
                let pattern = self.bind(pattern.clone());
                match self.translator.dialect {
                    Dialect::Postgres => format!("{left} ILIKE {pattern} ESCAPE '\\'"),
                    Dialect::Sqlite => format!("{left} LIKE {pattern} ESCAPE '\\'"),
                    Dialect::Mysql => format!("{left} LIKE {pattern}"),
                }
            }
            (operator, value) => {
                let right = self.operand(&c.subject, value);
                format!("{left} {} {right}", operator.as_sql())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Aggregatable;
    use crate::condition::Comparable;
    use crate::order::Sortable;
    use crate::path::Path;
    use crate::query::QueryOptions;
    use tusk_core::{EntityDef, Registry};

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
                    .belongs_to("group", "Group"),
            )
            .build()
            .unwrap()
    }

    fn users(registry: &Registry) -> Query {
        Query::new(registry.entity("User").unwrap())
    }

    #[test]
    fn renders_filtered_select() {
        let registry = registry();
        let user = registry.entity("User").unwrap();
        let nickname = user.property("nickname").unwrap().clone();
        let query = users(&registry).merge(&QueryOptions::new().filter(nickname.eq("Lenny")));

        let stmt = SqlTranslator::new(Dialect::Sqlite).select(&query);
        assert_eq!(
            stmt.sql,
            "SELECT \"users\".\"id\" AS \"id\", \"users\".\"nickname\" AS \"nickname\", \
             \"users\".\"group_id\" AS \"group_id\", \"users\".\"admin\" AS \"admin\" \
             FROM \"users\" WHERE \"users\".\"nickname\" = ?1"
        );
        assert_eq!(stmt.params, vec![Value::from("Lenny")]);
    }

    #[test]
    fn empty_in_is_always_false() {
        let registry = registry();
        let id = registry.entity("User").unwrap().property("id").unwrap().clone();
        let query = users(&registry)
            .merge(&QueryOptions::new().filter(id.in_list(Vec::<i64>::new())));
        let stmt = SqlTranslator::new(Dialect::Sqlite).select(&query);
        assert!(stmt.sql.ends_with("WHERE 1 = 0"), "{}", stmt.sql);
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn joins_paths_and_nests_booleans() {
        let registry = registry();
        let user = registry.entity("User").unwrap();
        let id = user.property("id").unwrap().clone();
        let group_name = Path::parse(&registry, "User", "group.name").unwrap();
        let query = users(&registry).merge(
            &QueryOptions::new()
                .filter(group_name.eq("Admin").or(id.in_list([1, 2]).not()))
                .fields([Arc::clone(&id)]),
        );

        let stmt = SqlTranslator::new(Dialect::Postgres).select(&query);
        assert_eq!(
            stmt.sql,
            "SELECT \"users\".\"id\" AS \"id\" FROM \"users\" \
             INNER JOIN \"groups\" AS \"group\" ON \"users\".\"group_id\" = \"group\".\"id\" \
             WHERE (\"group\".\"name\" = $1 OR NOT (\"users\".\"id\" IN ($2, $3)))"
        );
        assert_eq!(stmt.params.len(), 3);
    }

    #[test]
    fn order_slice_and_grouping() {
        let registry = registry();
        let user = registry.entity("User").unwrap();
        let group_id = user.property("group_id").unwrap().clone();
        let nickname = user.property("nickname").unwrap().clone();

        let query = users(&registry).merge(
            &QueryOptions::new()
                .fields(vec![Field::from(Arc::clone(&group_id)), nickname.count().into()])
                .unique(true)
                .order_by(group_id.desc())
                .offset(5),
        );
        let stmt = SqlTranslator::new(Dialect::Sqlite).select(&query);
        assert_eq!(
            stmt.sql,
            "SELECT \"users\".\"group_id\" AS \"group_id\", \
             COUNT(\"users\".\"nickname\") AS \"count_nickname\" FROM \"users\" \
             GROUP BY \"users\".\"group_id\" ORDER BY \"users\".\"group_id\" DESC \
             LIMIT -1 OFFSET 5"
        );
    }

    #[test]
    fn null_comparisons_and_like() {
        let registry = registry();
        let user = registry.entity("User").unwrap();
        let group_id = user.property("group_id").unwrap().clone();
        let nickname = user.property("nickname").unwrap().clone();
        let query = users(&registry).merge(
            &QueryOptions::new()
                .filter(group_id.eq(Value::Null))
                .filter(nickname.like("L%"))
                .limit(2),
        );
        let stmt = SqlTranslator::new(Dialect::Sqlite).select(&query);
        assert!(stmt.sql.ends_with(
            "WHERE (\"users\".\"group_id\" IS NULL AND \"users\".\"nickname\" LIKE ?1 ESCAPE '\\') LIMIT 2"
        ));
    }

    #[test]
    fn writes() {
        let registry = registry();
        let user = registry.entity("User").unwrap();
        let id = user.property("id").unwrap().clone();
        let nickname = user.property("nickname").unwrap().clone();
        let admin = user.property("admin").unwrap().clone();
        let t = SqlTranslator::new(Dialect::Sqlite).with_table_prefix("app");

        let insert = t.insert(
            &user,
            &[
                (Arc::clone(&nickname), "Lenny".into()),
                (Arc::clone(&admin), Value::Bool(true)),
            ],
        );
        assert_eq!(
            insert.sql,
            "INSERT INTO \"app_users\" (\"nickname\", \"admin\") VALUES (?1, ?2)"
        );
        assert_eq!(insert.params[1], Value::BigInt(1));
        assert_eq!(
            t.insert(&user, &[]).sql,
            "INSERT INTO \"app_users\" DEFAULT VALUES"
        );

        let update = t.update(
            &user,
            &[(Arc::clone(&nickname), "Carl".into())],
            &[(Arc::clone(&id), Value::BigInt(3))],
        );
        assert_eq!(
            update.sql,
            "UPDATE \"app_users\" SET \"nickname\" = ?1 WHERE \"id\" = ?2"
        );

        let delete = t.delete(&user, &[(id, Value::BigInt(3))]);
        assert_eq!(delete.sql, "DELETE FROM \"app_users\" WHERE \"id\" = ?1");
        assert_eq!(delete.params, vec![Value::BigInt(3)]);
    }

    #[test]
    fn ddl() {
        let registry = registry();
        let user = registry.entity("User").unwrap();
        let t = SqlTranslator::new(Dialect::Sqlite);
        let create = t.create_table(&user, &registry.table_properties("User"));
        assert_eq!(
            create.sql,
            "CREATE TABLE \"users\" (\"id\" INTEGER NOT NULL, \
             \"nickname\" VARCHAR(50) NOT NULL, \"group_id\" INTEGER, \
             \"admin\" BOOLEAN DEFAULT 0, \
             CONSTRAINT \"users_PK\" PRIMARY KEY (\"id\"))"
        );
        assert_eq!(t.drop_table(&user).sql, "DROP TABLE IF EXISTS \"users\"");
    }

    #[test]
    fn quoting() {
        assert_eq!(Dialect::Sqlite.quote_identifier("a\"b"), "\"a\"\"b\"");
        assert_eq!(Dialect::Mysql.quote_identifier("a`b"), "`a``b`");
        assert_eq!(Dialect::Postgres.placeholder(3), "$3");
        assert_eq!(Dialect::Mysql.placeholder(3), "?");
    }
}
