use crate::entities::{Match, NewMatch, SubscriptionRow, User};
use crate::traits::{MatchStore, SubscriptionStore, UserStore};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, QueryBuilder};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

const MAX_OPEN_CONNECTIONS: u32 = 90;
const MIN_IDLE_CONNECTIONS: u32 = 25;
const MAX_CONNECTION_LIFETIME: Duration = Duration::from_secs(5 * 60);
const MAX_IDLE_TIME: Duration = Duration::from_secs(60);

/// PostgreSQL implementation of the datastore traits.
pub struct PostgresDatastore {
    pool: PgPool,
}

impl PostgresDatastore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with the service's bounded pool settings.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_OPEN_CONNECTIONS)
            .min_connections(MIN_IDLE_CONNECTIONS)
            .max_lifetime(MAX_CONNECTION_LIFETIME)
            .idle_timeout(MAX_IDLE_TIME)
            .connect(database_url)
            .await
            .context("connect to postgres")?;

        Ok(Self::new(pool))
    }

    pub async fn run_migrations(&self) -> Result<()> {
        info!(message = "running migrations");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!(message = "migrations complete");
        Ok(())
    }
}

#[async_trait::async_trait]
impl MatchStore for PostgresDatastore {
    async fn create_matches(&self, matches: &[NewMatch]) -> Result<()> {
        if matches.is_empty() {
            return Ok(());
        }

        let mut builder = QueryBuilder::<sqlx::Postgres>::new(
            "INSERT INTO matches (user_id, keyword_id, source, match_hash, data) ",
        );
        builder.push_values(matches, |mut row, m| {
            row.push_bind(m.user_id)
                .push_bind(m.keyword_id)
                .push_bind(m.source.as_str())
                .push_bind(&m.match_hash)
                .push_bind(&m.data);
        });
        builder.push(" ON CONFLICT (match_hash) DO NOTHING");

        builder
            .build()
            .execute(&self.pool)
            .await
            .context("create matches")?;

        Ok(())
    }

    async fn unnotified_matches(&self) -> Result<Vec<Match>> {
        let matches = sqlx::query_as::<_, Match>(
            r#"
            SELECT id, user_id, keyword_id, source, match_hash, data, notified_at, created_at
            FROM matches
            WHERE notified_at IS NULL
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("get unnotified matches")?;

        Ok(matches)
    }

    async fn mark_notified(&self, ids: &[i64], notified_at: DateTime<Utc>) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        sqlx::query(
            r#"
            UPDATE matches
            SET notified_at = $1
            WHERE id = ANY($2) AND notified_at IS NULL
            "#,
        )
        .bind(notified_at)
        .bind(ids)
        .execute(&self.pool)
        .await
        .context("mark notified")?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl SubscriptionStore for PostgresDatastore {
    async fn active_subscriptions_with_email(&self) -> Result<Vec<SubscriptionRow>> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT k.id, k.user_id, k.keyword, k.match_mode, k.filters, u.email
            FROM keywords k
            JOIN users u ON u.id = k.user_id
            WHERE k.active = true
            ORDER BY k.created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("get active subscriptions with emails")?;

        Ok(rows)
    }
}

#[async_trait::async_trait]
impl UserStore for PostgresDatastore {
    async fn users_by_ids(&self, ids: &[Uuid]) -> Result<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, display_name, email, avatar, created_at, updated_at
            FROM users
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .context("get users by ids")?;

        Ok(users)
    }
}
