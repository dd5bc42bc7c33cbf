//! Named data sources.
//!
//! A [`DataSource`] pairs a [`SqlTranslator`] with a [`Connection`]. It
//! renders every read, write and schema change, runs it, logs it with its
//! duration and keeps a bounded log of recent statements. The read counter
//! is what tests use to check that loads batch.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tusk_core::{Connection, EntityType, Property, Result, Row, Value};
use tusk_query::{Query, SqlTranslator, Statement};

/// Property values for a write, paired with their properties.
pub type Assignments = [(Arc<Property>, Value)];

/// A connection plus the dialect used to talk to it.
pub struct DataSource {
    name: String,
    translator: SqlTranslator,
    connection: Box<dyn Connection>,
    reads: Cell<usize>,
    writes: Cell<usize>,
    log: RefCell<VecDeque<String>>,
    log_limit: usize,
}

impl fmt::Debug for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSource")
            .field("name", &self.name)
            .field("dialect", &self.translator.dialect())
            .field("reads", &self.reads.get())
            .field("writes", &self.writes.get())
            .finish_non_exhaustive()
    }
}

impl DataSource {
    pub fn new(
        name: impl Into<String>,
        translator: SqlTranslator,
        connection: impl Connection + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            translator,
            connection: Box::new(connection),
            reads: Cell::new(0),
            writes: Cell::new(0),
            log: RefCell::new(VecDeque::new()),
            log_limit: 256,
        }
    }

    /// Keep at most `limit` statements in the log.
    #[must_use]
    pub fn with_log_limit(mut self, limit: usize) -> Self {
        self.log_limit = limit;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn translator(&self) -> &SqlTranslator {
        &self.translator
    }

    /// SELECT statements run so far.
    pub fn reads(&self) -> usize {
        self.reads.get()
    }

    /// INSERT, UPDATE and DELETE statements run so far.
    pub fn writes(&self) -> usize {
        self.writes.get()
    }

    /// Recent statements, oldest first.
    pub fn statements(&self) -> Vec<String> {
        self.log.borrow().iter().cloned().collect()
    }

    pub fn clear_log(&self) {
        self.log.borrow_mut().clear();
    }

    // ==================== Operations ====================

    /// Fetch the rows `query` selects.
    pub fn read(&self, query: &Query) -> Result<Vec<Row>> {
        let stmt = self.translator.select(query);
        self.reads.set(self.reads.get() + 1);
        self.run(&stmt, |conn| conn.query(&stmt.sql, &stmt.params))
    }

    /// Run an aggregate query. Rows hold one column per aggregator, plus
    /// the grouping properties for a unique query.
    pub fn aggregate(&self, query: &Query) -> Result<Vec<Row>> {
        self.read(query)
    }

    /// Insert one row and return the id storage assigned to it.
    pub fn create(&self, entity: &EntityType, values: &Assignments) -> Result<i64> {
        let stmt = self.translator.insert(entity, values);
        self.writes.set(self.writes.get() + 1);
        self.run(&stmt, |conn| conn.insert(&stmt.sql, &stmt.params))
    }

    /// Update the row identified by `key` and return the affected count.
    pub fn update(
        &self,
        entity: &EntityType,
        changes: &Assignments,
        key: &Assignments,
    ) -> Result<u64> {
        let stmt = self.translator.update(entity, changes, key);
        self.writes.set(self.writes.get() + 1);
        self.run(&stmt, |conn| conn.execute(&stmt.sql, &stmt.params))
    }

    /// Delete the row identified by `key` and return the affected count.
    pub fn delete(&self, entity: &EntityType, key: &Assignments) -> Result<u64> {
        let stmt = self.translator.delete(entity, key);
        self.writes.set(self.writes.get() + 1);
        self.run(&stmt, |conn| conn.execute(&stmt.sql, &stmt.params))
    }

    /// Create the table for a root entity holding `properties`.
    pub fn create_schema(&self, entity: &EntityType, properties: &[Arc<Property>]) -> Result<()> {
        let stmt = self.translator.create_table(entity, properties);
        tracing::debug!(data_source = %self.name, table = %self.translator.table_name(entity), "Creating table");
        self.run(&stmt, |conn| conn.execute_raw(&stmt.sql))
    }

    pub fn drop_schema(&self, entity: &EntityType) -> Result<()> {
        let stmt = self.translator.drop_table(entity);
        tracing::debug!(data_source = %self.name, table = %self.translator.table_name(entity), "Dropping table");
        self.run(&stmt, |conn| conn.execute_raw(&stmt.sql))
    }

    fn run<T>(&self, stmt: &Statement, f: impl FnOnce(&dyn Connection) -> Result<T>) -> Result<T> {
        let start = Instant::now();
        let result = f(self.connection.as_ref());
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        match &result {
            Ok(_) => tracing::info!(
                target: "tusk::sql",
                data_source = %self.name,
                params = stmt.params.len(),
                "SQL: ({elapsed_ms:.3} ms) {}",
                stmt.sql
            ),
            Err(e) => tracing::warn!(
                target: "tusk::sql",
                data_source = %self.name,
                error = %e,
                "SQL failed: ({elapsed_ms:.3} ms) {}",
                stmt.sql
            ),
        }

        if self.log_limit > 0 {
            let mut log = self.log.borrow_mut();
            if log.len() == self.log_limit {
                log.pop_front();
            }
            log.push_back(stmt.sql.clone());
        }
        result
    }
}
