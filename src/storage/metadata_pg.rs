//! Postgres-backed [`MetadataGateway`].

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::{CoreError, CoreResult};
use crate::models::{File, FileRow, Node};

use super::metadata::MetadataGateway;

/// Default maximum number of pooled Postgres connections per node.
const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Pooled Postgres implementation of [`MetadataGateway`].
pub struct PgMetadataGateway {
    pool: PgPool,
}

impl PgMetadataGateway {
    /// Connects a bounded pool against `database_url`.
    pub async fn connect(database_url: &str) -> CoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .connect(database_url)
            .await
            .map_err(CoreError::from)?;
        Ok(Self { pool })
    }

    /// Wraps an already-constructed pool (used in tests against a real
    /// ephemeral Postgres instance).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetadataGateway for PgMetadataGateway {
    async fn create_node(&self, name: &str) -> CoreResult<Node> {
        const SQL: &str = r#"
            INSERT INTO node (name)
            VALUES ($1)
            RETURNING id, name, advertise_addr, lock
        "#;
        let node = sqlx::query_as::<_, Node>(SQL)
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(node)
    }

    async fn get_node_by_name(&self, name: &str) -> CoreResult<Option<Node>> {
        const SQL: &str = r#"
            SELECT id, name, advertise_addr, lock
            FROM node
            WHERE name = $1
        "#;
        let node = sqlx::query_as::<_, Node>(SQL)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(node)
    }

    async fn update_node_advertise_addr(&self, node_id: i64, addr: &str) -> CoreResult<()> {
        const SQL: &str = r#"
            UPDATE node
            SET advertise_addr = $2
            WHERE id = $1
        "#;
        let result = sqlx::query(SQL)
            .bind(node_id)
            .bind(addr)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() != 1 {
            return Err(CoreError::NotFound);
        }
        Ok(())
    }

    async fn take_node_lock(
        &self,
        node_id: i64,
        new_lease: i64,
        min_lease_exclusive: i64,
    ) -> CoreResult<u64> {
        const SQL: &str = r#"
            UPDATE node
            SET lock = $1
            WHERE id = $2 AND lock < $3
        "#;
        let result = sqlx::query(SQL)
            .bind(new_lease)
            .bind(node_id)
            .bind(min_lease_exclusive)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn update_node_lock(
        &self,
        node_id: i64,
        new_lease: i64,
        expected_old_lease: i64,
    ) -> CoreResult<u64> {
        const SQL: &str = r#"
            UPDATE node
            SET lock = $3
            WHERE id = $1 AND lock = $2
        "#;
        let result = sqlx::query(SQL)
            .bind(node_id)
            .bind(expected_old_lease)
            .bind(new_lease)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn release_node_lock(&self, node_id: i64, expected_old_lease: i64) -> CoreResult<u64> {
        const SQL: &str = r#"
            UPDATE node
            SET lock = 0
            WHERE id = $1 AND lock = $2
        "#;
        let result = sqlx::query(SQL)
            .bind(node_id)
            .bind(expected_old_lease)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn create_file(&self, uuid: &str, size: i64) -> CoreResult<File> {
        const SQL: &str = r#"
            INSERT INTO file (uuid, state, size, created_at)
            VALUES ($1, 0, $2, $3)
            RETURNING id, uuid, state, size, created_at
        "#;
        let now = chrono::Utc::now().timestamp();
        let row = sqlx::query_as::<_, FileRow>(SQL)
            .bind(uuid)
            .bind(size)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn update_file(&self, id: i64, state: i16, size: i64) -> CoreResult<File> {
        const SQL: &str = r#"
            UPDATE file
            SET state = $2, size = $3
            WHERE id = $1
            RETURNING id, uuid, state, size, created_at
        "#;
        let row = sqlx::query_as::<_, FileRow>(SQL)
            .bind(id)
            .bind(state)
            .bind(size)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn get_file_by_uuid_and_state(&self, uuid: &str, state: i16) -> CoreResult<Option<File>> {
        const SQL: &str = r#"
            SELECT id, uuid, state, size, created_at
            FROM file
            WHERE uuid = $1 AND state = $2
        "#;
        let row = sqlx::query_as::<_, FileRow>(SQL)
            .bind(uuid)
            .bind(state)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn get_not_synced_files(&self, node_id: i64) -> CoreResult<Vec<File>> {
        const SQL: &str = r#"
            SELECT file.id, file.uuid, file.state, file.size, file.created_at
            FROM file
            LEFT JOIN (
                SELECT file_id FROM node_file WHERE node_id = $1
            ) AS v ON file.id = v.file_id
            WHERE file.state = 1 AND v.file_id IS NULL
        "#;
        let rows = sqlx::query_as::<_, FileRow>(SQL)
            .bind(node_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_live_nodes_with_file(
        &self,
        uuid: &str,
        state: i16,
        lease_strictly_greater_than: i64,
    ) -> CoreResult<Vec<Node>> {
        const SQL: &str = r#"
            SELECT node.id, node.name, node.advertise_addr, node.lock
            FROM file
            JOIN node_file ON node_file.file_id = file.id
            JOIN node ON node.id = node_file.node_id
            WHERE file.uuid = $1 AND file.state = $2 AND node.lock > $3
        "#;
        let nodes = sqlx::query_as::<_, Node>(SQL)
            .bind(uuid)
            .bind(state)
            .bind(lease_strictly_greater_than)
            .fetch_all(&self.pool)
            .await?;
        Ok(nodes)
    }

    async fn add_file_to_node(&self, node_id: i64, file_id: i64) -> CoreResult<()> {
        const SQL: &str = r#"
            INSERT INTO node_file (node_id, file_id)
            VALUES ($1, $2)
        "#;
        sqlx::query(SQL)
            .bind(node_id)
            .bind(file_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn ping(&self) -> CoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
