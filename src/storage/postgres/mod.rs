//! PostgreSQL journal backend.
//!
//! Connection bootstrap plus the dialect-native bulk insert: the whole chunk
//! goes in as one `INSERT ... SELECT * FROM UNNEST(...)` with one array
//! parameter per column, so the statement shape never depends on the chunk
//! size.

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool};
use tracing::info;

use crate::config::StorageConfig;
use crate::interfaces::Result;
use crate::storage::sql::postgres::Postgres;
use crate::storage::sql::{InsertedKey, SqlJournalDao};
use crate::storage::JournalRow;

const UNNEST_INSERT: &str = r#"
INSERT INTO journal (created, persistence_id, sequence_number, deleted, tags, message, identifier, manifest, writer_uuid)
SELECT * FROM UNNEST(
    $1::bigint[], $2::text[], $3::bigint[], $4::boolean[], $5::text[],
    $6::bytea[], $7::integer[], $8::text[], $9::text[]
)
RETURNING ordering, persistence_id, sequence_number
"#;

/// Column-major copy of a chunk, one vector per bound array.
#[derive(Default)]
struct Columns {
    created: Vec<i64>,
    persistence_id: Vec<String>,
    sequence_number: Vec<i64>,
    deleted: Vec<bool>,
    tags: Vec<Option<String>>,
    message: Vec<Vec<u8>>,
    identifier: Vec<Option<i32>>,
    manifest: Vec<String>,
    writer_uuid: Vec<String>,
}

impl SqlJournalDao<Postgres> {
    /// `UNNEST` array insert for `BulkCopyMode::Default`.
    ///
    /// Always bound; literal rendering does not apply to array parameters.
    pub(crate) async fn native_insert(
        &self,
        conn: &mut PgConnection,
        chunk: &[JournalRow],
    ) -> Result<Vec<InsertedKey>> {
        let mut columns = Columns::default();
        for row in chunk {
            columns.created.push(row.timestamp);
            columns.persistence_id.push(row.persistence_id.clone());
            columns.sequence_number.push(row.sequence_number);
            columns.deleted.push(row.deleted);
            columns.tags.push(self.queries().inline_tags(row));
            columns.message.push(row.message.clone());
            columns.identifier.push(row.identifier);
            columns.manifest.push(row.manifest.clone());
            columns.writer_uuid.push(row.writer_uuid.clone());
        }

        let records = sqlx::query(UNNEST_INSERT)
            .bind(columns.created)
            .bind(columns.persistence_id)
            .bind(columns.sequence_number)
            .bind(columns.deleted)
            .bind(columns.tags)
            .bind(columns.message)
            .bind(columns.identifier)
            .bind(columns.manifest)
            .bind(columns.writer_uuid)
            .fetch_all(&mut *conn)
            .await?;

        records.iter().map(Self::inserted_key).collect()
    }
}

/// Open a pool for the configured URI.
pub async fn connect(config: &StorageConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.uri)
        .await?;
    info!("Connected to PostgreSQL journal");
    Ok(pool)
}
