//! SQL database abstraction trait.

use sea_query::{QueryBuilder, QueryStatementWriter};
use sea_query_binder::{SqlxBinder, SqlxValues};

use crate::storage::schema::SqlFunctions;

/// Trait for SQL database backends.
///
/// This trait abstracts over different SQL databases (PostgreSQL, SQLite)
/// by providing the pool type, dialect limits and query rendering.
pub trait SqlDatabase: Send + Sync + 'static {
    /// The connection pool type for this database.
    type Pool: Clone + Send + Sync;

    /// The sea-query dialect.
    type Builder: QueryBuilder;

    /// Dialect name used in logs.
    const NAME: &'static str;

    /// Upper bound on bind parameters in one statement.
    const MAX_BIND_PARAMETERS: usize;

    /// DDL for the journal, metadata and tag tables.
    const CREATE_TABLES: &'static str;

    /// Dialect spellings of the scalar functions the journal queries use.
    const FUNCTIONS: SqlFunctions;

    fn builder() -> Self::Builder;

    /// Render a statement with values inlined as literals.
    fn render<S: QueryStatementWriter>(stmt: &S) -> String {
        stmt.to_string(Self::builder())
    }

    /// Render a statement with placeholders plus the values to bind.
    fn bind<S: SqlxBinder>(stmt: &S) -> (String, SqlxValues) {
        stmt.build_sqlx(Self::builder())
    }
}
