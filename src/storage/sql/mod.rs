//! Unified SQL storage implementation.
//!
//! The journal DAO is shared between SQL backends (PostgreSQL, SQLite). It is
//! parameterized by database type using the `SqlDatabase` trait; the only
//! per-backend code is the dialect-native bulk insert, which lives in
//! `storage::sqlite` and `storage::postgres`.

mod journal_dao;
mod query;

pub(crate) use journal_dao::run;
pub use journal_dao::{InsertedKey, SqlJournalDao};
pub use query::SqlDatabase;

#[cfg(feature = "postgres")]
pub mod postgres {
    //! PostgreSQL database backend.

    use sea_query::PostgresQueryBuilder;
    use sqlx::PgPool;

    use crate::storage::schema::{SqlFunctions, POSTGRES_CREATE_TABLES, POSTGRES_FUNCTIONS};

    /// PostgreSQL database marker type.
    pub struct Postgres;

    impl super::SqlDatabase for Postgres {
        type Pool = PgPool;
        type Builder = PostgresQueryBuilder;

        const NAME: &'static str = "postgres";
        const MAX_BIND_PARAMETERS: usize = 65_535;
        const CREATE_TABLES: &'static str = POSTGRES_CREATE_TABLES;
        const FUNCTIONS: SqlFunctions = POSTGRES_FUNCTIONS;

        fn builder() -> Self::Builder {
            PostgresQueryBuilder
        }
    }

    /// PostgreSQL journal DAO.
    pub type PostgresJournalDao = super::SqlJournalDao<Postgres>;
}

#[cfg(feature = "sqlite")]
pub mod sqlite {
    //! SQLite database backend.

    use sea_query::SqliteQueryBuilder;
    use sqlx::SqlitePool;

    use crate::storage::schema::{SqlFunctions, SQLITE_CREATE_TABLES, SQLITE_FUNCTIONS};

    /// SQLite database marker type.
    pub struct Sqlite;

    impl super::SqlDatabase for Sqlite {
        type Pool = SqlitePool;
        type Builder = SqliteQueryBuilder;

        const NAME: &'static str = "sqlite";
        const MAX_BIND_PARAMETERS: usize = 32_766;
        const CREATE_TABLES: &'static str = SQLITE_CREATE_TABLES;
        const FUNCTIONS: SqlFunctions = SQLITE_FUNCTIONS;

        fn builder() -> Self::Builder {
            SqliteQueryBuilder
        }
    }

    /// SQLite journal DAO.
    pub type SqliteJournalDao = super::SqlJournalDao<Sqlite>;
}
