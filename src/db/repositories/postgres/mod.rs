//! Postgres repository implementation using Diesel.
//!
//! This module implements the repository traits against a Postgres database.
//! The availability write paths follow the aggregate-maintenance contract:
//! every slot mutation runs inside one transaction together with the
//! recomputation of the affected aggregate rows, so readers observe both or
//! neither. Distinct dirty slot indices are recomputed once per transaction,
//! after all row mutations, each under a per-slot advisory lock
//! (`pg_advisory_xact_lock`) so concurrent recounts of the same slot cannot
//! lose updates.
//!
//! ## Features
//!
//! - Connection pooling with r2d2
//! - Automatic retry for transient failures
//! - Connection health monitoring
//! - Automatic migration execution
//!
//! ## Configuration
//!
//! Environment variables:
//! - `DATABASE_URL` or `PG_DATABASE_URL`: Connection string (required)
//! - `PG_POOL_MAX`: Maximum pool size (default: 10)
//! - `PG_POOL_MIN`: Minimum pool size (default: 1)
//! - `PG_CONN_TIMEOUT_SEC`: Connection timeout in seconds (default: 30)
//! - `PG_IDLE_TIMEOUT_SEC`: Idle connection timeout in seconds (default: 600)
//! - `PG_MAX_RETRIES`: Maximum retry attempts for transient failures (default: 3)
//! - `PG_RETRY_DELAY_MS`: Initial retry delay in milliseconds (default: 100)

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sql_query;
use diesel::upsert::excluded;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use serde_json::{json, Value};
use tokio::task;

use crate::api::{GroupId, InviteId, UserId};
use crate::db::repository::{
    AvailabilityRepository, ErrorContext, GroupRepository, RepositoryError, RepositoryResult,
    UserRepository,
};
use crate::models::{
    AggregateSlotCount, AvailabilitySlot, Confidence, Group, GroupInvite, GroupMember,
    InviteStatus, NewUser, ProfileUpdate, SlotFilter, SlotIndex, SlotState, User, UserFilter,
};

mod models;
mod schema;

use models::*;
use schema::*;

type PgPool = Pool<ConnectionManager<PgConnection>>;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("src/db/repositories/postgres/migrations");

/// Configuration for connecting to Postgres.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL
    pub database_url: String,
    /// Maximum number of connections in the pool
    pub max_pool_size: u32,
    /// Minimum number of connections in the pool
    pub min_pool_size: u32,
    /// Connection timeout in seconds
    pub connection_timeout_sec: u64,
    /// Idle connection timeout in seconds
    pub idle_timeout_sec: u64,
    /// Maximum number of retry attempts for transient failures
    pub max_retries: u32,
    /// Initial retry delay in milliseconds (doubles with each retry)
    pub retry_delay_ms: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_pool_size: 10,
            min_pool_size: 1,
            connection_timeout_sec: 30,
            idle_timeout_sec: 600,
            max_retries: 3,
            retry_delay_ms: 100,
        }
    }
}

impl PostgresConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `DATABASE_URL` or `PG_DATABASE_URL`: Connection string (required)
    /// - `PG_POOL_MAX`: Maximum pool size (default: 10)
    /// - `PG_POOL_MIN`: Minimum pool size (default: 1)
    /// - `PG_CONN_TIMEOUT_SEC`: Connection timeout in seconds (default: 30)
    /// - `PG_IDLE_TIMEOUT_SEC`: Idle connection timeout in seconds (default: 600)
    /// - `PG_MAX_RETRIES`: Maximum retry attempts (default: 3)
    /// - `PG_RETRY_DELAY_MS`: Initial retry delay in milliseconds (default: 100)
    pub fn from_env() -> Result<Self, String> {
        let database_url = std::env::var("DATABASE_URL")
            .or_else(|_| std::env::var("PG_DATABASE_URL"))
            .map_err(|_| "DATABASE_URL or PG_DATABASE_URL must be set".to_string())?;

        let max_pool_size = std::env::var("PG_POOL_MAX")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(10);

        let min_pool_size = std::env::var("PG_POOL_MIN")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(1);

        let connection_timeout_sec = std::env::var("PG_CONN_TIMEOUT_SEC")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30);

        let idle_timeout_sec = std::env::var("PG_IDLE_TIMEOUT_SEC")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(600);

        let max_retries = std::env::var("PG_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(3);

        let retry_delay_ms = std::env::var("PG_RETRY_DELAY_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(100);

        Ok(Self {
            database_url,
            max_pool_size,
            min_pool_size,
            connection_timeout_sec,
            idle_timeout_sec,
            max_retries,
            retry_delay_ms,
        })
    }

    /// Create a new configuration with a database URL.
    pub fn with_url(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Default::default()
        }
    }
}

/// Pool health statistics.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Number of connections currently in use
    pub connections_in_use: u32,
    /// Number of idle connections
    pub idle_connections: u32,
    /// Total number of connections in the pool
    pub total_connections: u32,
    /// Maximum pool size
    pub max_size: u32,
    /// Total successful queries executed
    pub total_queries: u64,
    /// Total failed queries
    pub failed_queries: u64,
    /// Total retried operations
    pub retried_operations: u64,
}

/// Diesel-backed repository for Postgres.
///
/// This repository implementation provides:
/// - Connection pooling with configurable limits
/// - Automatic retry for transient failures
/// - Health monitoring and statistics
/// - Automatic schema migrations
#[derive(Clone, Debug)]
pub struct PostgresRepository {
    pool: PgPool,
    config: PostgresConfig,
    // Metrics counters
    total_queries: std::sync::Arc<AtomicU64>,
    failed_queries: std::sync::Arc<AtomicU64>,
    retried_operations: std::sync::Arc<AtomicU64>,
}

impl PostgresRepository {
    /// Create a new repository and run pending migrations.
    ///
    /// # Arguments
    /// * `config` - Database configuration
    ///
    /// # Returns
    /// * `Ok(PostgresRepository)` on success
    /// * `Err(RepositoryError)` if connection or migration fails
    pub fn new(config: PostgresConfig) -> RepositoryResult<Self> {
        let manager = ConnectionManager::<PgConnection>::new(&config.database_url);

        let pool = Pool::builder()
            .max_size(config.max_pool_size)
            .min_idle(Some(config.min_pool_size))
            .connection_timeout(Duration::from_secs(config.connection_timeout_sec))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_sec)))
            .test_on_check_out(true) // Validate connections before use
            .build(manager)
            .map_err(|e| {
                RepositoryError::connection_with_context(
                    e.to_string(),
                    ErrorContext::new("create_pool")
                        .with_details(format!("max_size={}", config.max_pool_size)),
                )
            })?;

        // Run migrations once during initialization
        {
            let mut conn = pool.get().map_err(|e| {
                RepositoryError::connection_with_context(
                    e.to_string(),
                    ErrorContext::new("get_connection_for_migrations"),
                )
            })?;
            Self::run_migrations(&mut conn)?;
        }

        Ok(Self {
            pool,
            config,
            total_queries: std::sync::Arc::new(AtomicU64::new(0)),
            failed_queries: std::sync::Arc::new(AtomicU64::new(0)),
            retried_operations: std::sync::Arc::new(AtomicU64::new(0)),
        })
    }

    /// Run pending database migrations.
    fn run_migrations(conn: &mut PgConnection) -> RepositoryResult<()> {
        conn.run_pending_migrations(MIGRATIONS).map_err(|e| {
            RepositoryError::internal_with_context(
                format!("Migration failed: {}", e),
                ErrorContext::new("run_migrations"),
            )
        })?;

        Ok(())
    }

    /// Execute a database operation with automatic retry for transient failures.
    ///
    /// This method will retry the operation up to `max_retries` times if a
    /// retryable error occurs (connection errors, timeouts, serialization failures).
    async fn with_conn<T, F>(&self, f: F) -> RepositoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> RepositoryResult<T> + Send + 'static + Clone,
    {
        let pool = self.pool.clone();
        let max_retries = self.config.max_retries;
        let retry_delay_ms = self.config.retry_delay_ms;
        let total_queries = self.total_queries.clone();
        let failed_queries = self.failed_queries.clone();
        let retried_operations = self.retried_operations.clone();

        task::spawn_blocking(move || {
            let mut last_error = None;
            let mut retry_delay = Duration::from_millis(retry_delay_ms);

            for attempt in 0..=max_retries {
                if attempt > 0 {
                    retried_operations.fetch_add(1, Ordering::Relaxed);
                    std::thread::sleep(retry_delay);
                    retry_delay *= 2; // Exponential backoff
                }

                // Get connection
                let mut conn = match pool.get() {
                    Ok(c) => c,
                    Err(e) => {
                        let err = RepositoryError::connection_with_context(
                            e.to_string(),
                            ErrorContext::new("get_connection")
                                .with_details(format!("attempt={}", attempt + 1))
                                .retryable(),
                        );
                        if attempt < max_retries {
                            last_error = Some(err);
                            continue;
                        }
                        failed_queries.fetch_add(1, Ordering::Relaxed);
                        return Err(err);
                    }
                };

                // Execute the operation
                total_queries.fetch_add(1, Ordering::Relaxed);
                match f.clone()(&mut conn) {
                    Ok(result) => return Ok(result),
                    Err(e) if e.is_retryable() && attempt < max_retries => {
                        last_error = Some(e);
                        continue;
                    }
                    Err(e) => {
                        failed_queries.fetch_add(1, Ordering::Relaxed);
                        return Err(e);
                    }
                }
            }

            failed_queries.fetch_add(1, Ordering::Relaxed);
            Err(last_error.unwrap_or_else(|| {
                RepositoryError::internal("Max retries exceeded with no error captured")
            }))
        })
        .await
        .map_err(|e| {
            RepositoryError::internal_with_context(
                format!("Task join error: {}", e),
                ErrorContext::new("spawn_blocking"),
            )
        })?
    }

    /// Get pool health statistics.
    ///
    /// Returns current pool state and query statistics for monitoring.
    pub fn get_pool_stats(&self) -> PoolStats {
        let state = self.pool.state();
        PoolStats {
            connections_in_use: state.connections - state.idle_connections,
            idle_connections: state.idle_connections,
            total_connections: state.connections,
            max_size: self.config.max_pool_size,
            total_queries: self.total_queries.load(Ordering::Relaxed),
            failed_queries: self.failed_queries.load(Ordering::Relaxed),
            retried_operations: self.retried_operations.load(Ordering::Relaxed),
        }
    }

    /// Check if the database connection is healthy.
    ///
    /// Performs a simple query to verify connectivity.
    pub async fn is_healthy(&self) -> bool {
        self.health_check().await.unwrap_or(false)
    }

    /// Get detailed health information.
    ///
    /// Returns a tuple of (is_healthy, latency_ms, error_message).
    pub async fn health_check_detailed(&self) -> (bool, Option<u64>, Option<String>) {
        let start = Instant::now();
        match self.health_check().await {
            Ok(true) => (true, Some(start.elapsed().as_millis() as u64), None),
            Ok(false) => (
                false,
                Some(start.elapsed().as_millis() as u64),
                Some("Health check returned false".to_string()),
            ),
            Err(e) => (
                false,
                Some(start.elapsed().as_millis() as u64),
                Some(e.to_string()),
            ),
        }
    }
}

fn map_diesel_error(err: diesel::result::Error) -> RepositoryError {
    RepositoryError::from(err)
}

fn roles_to_json(roles: &[String]) -> Value {
    serde_json::to_value(roles).unwrap_or_else(|_| json!([]))
}

// =============================================================================
// Aggregate maintainer (transaction-scoped)
// =============================================================================

/// Apply one slot mutation inside an open transaction, recording the slot
/// index in `dirty` when a row actually changed.
///
/// Mirrors the storage rule: Unavailable deletes, other states insert or
/// update in place, and writing the already-stored state is a no-op.
fn apply_slot_mutation(
    tx: &mut PgConnection,
    user_id: i64,
    slot_index: i64,
    state: SlotState,
    dirty: &mut BTreeSet<i64>,
) -> RepositoryResult<bool> {
    let existing: Option<AvailabilitySlotRow> = availability_slots::table
        .filter(availability_slots::user_id.eq(user_id))
        .filter(availability_slots::slot_index.eq(slot_index))
        .select(AvailabilitySlotRow::as_select())
        .first(tx)
        .optional()
        .map_err(map_diesel_error)?;

    let changed = match (existing, state) {
        (Some(_), SlotState::Unavailable) => {
            diesel::delete(
                availability_slots::table
                    .filter(availability_slots::user_id.eq(user_id))
                    .filter(availability_slots::slot_index.eq(slot_index)),
            )
            .execute(tx)
            .map_err(map_diesel_error)?;
            true
        }
        (None, SlotState::Unavailable) => false,
        (Some(row), _) if row.state == state.as_i16() => false,
        (_, _) => {
            // Upsert instead of plain insert so a same-user concurrent write
            // cannot trip the unique constraint
            diesel::insert_into(availability_slots::table)
                .values(&NewAvailabilitySlotRow {
                    user_id,
                    slot_index,
                    state: state.as_i16(),
                })
                .on_conflict((
                    availability_slots::user_id,
                    availability_slots::slot_index,
                ))
                .do_update()
                .set((
                    availability_slots::state.eq(excluded(availability_slots::state)),
                    availability_slots::updated_at.eq(diesel::dsl::now),
                ))
                .execute(tx)
                .map_err(map_diesel_error)?;
            true
        }
    };

    if changed {
        dirty.insert(slot_index);
    }
    Ok(changed)
}

/// Recompute the aggregate row for every dirty slot index, once per distinct
/// index, inside the open transaction.
///
/// Indices are locked in ascending order (BTreeSet iteration) so concurrent
/// bulk writers cannot deadlock on their advisory locks. The lock serializes
/// recounts of one slot across transactions: the later writer blocks until
/// the earlier one commits, then recounts against its committed rows.
fn recompute_aggregates(tx: &mut PgConnection, dirty: &BTreeSet<i64>) -> RepositoryResult<()> {
    for &slot_index in dirty {
        recompute_aggregate(tx, slot_index)?;
    }
    Ok(())
}

/// Full recount of one slot index from the slot rows, upserting the
/// aggregate row.
fn recompute_aggregate(tx: &mut PgConnection, slot_index: i64) -> RepositoryResult<()> {
    sql_query("SELECT pg_advisory_xact_lock($1)")
        .bind::<diesel::sql_types::BigInt, _>(slot_index)
        .execute(tx)
        .map_err(map_diesel_error)?;

    let available_count: i64 = availability_slots::table
        .filter(availability_slots::slot_index.eq(slot_index))
        .filter(availability_slots::state.eq(SlotState::Available.as_i16()))
        .count()
        .get_result(tx)
        .map_err(map_diesel_error)?;
    let maybe_count: i64 = availability_slots::table
        .filter(availability_slots::slot_index.eq(slot_index))
        .filter(availability_slots::state.eq(SlotState::Maybe.as_i16()))
        .count()
        .get_result(tx)
        .map_err(map_diesel_error)?;

    if available_count + maybe_count > 0 {
        diesel::insert_into(aggregate_slot_counts::table)
            .values(&NewAggregateSlotCountRow {
                slot_index,
                available_count: available_count as i32,
                maybe_count: maybe_count as i32,
            })
            .on_conflict(aggregate_slot_counts::slot_index)
            .do_update()
            .set((
                aggregate_slot_counts::available_count.eq(available_count as i32),
                aggregate_slot_counts::maybe_count.eq(maybe_count as i32),
                aggregate_slot_counts::updated_at.eq(diesel::dsl::now),
            ))
            .execute(tx)
            .map_err(map_diesel_error)?;
    } else {
        // Counts at zero only update a row that already exists; a slot that
        // never had a count gets no row
        diesel::update(aggregate_slot_counts::table.find(slot_index))
            .set((
                aggregate_slot_counts::available_count.eq(0),
                aggregate_slot_counts::maybe_count.eq(0),
                aggregate_slot_counts::updated_at.eq(diesel::dsl::now),
            ))
            .execute(tx)
            .map_err(map_diesel_error)?;
    }
    Ok(())
}

#[async_trait]
impl AvailabilityRepository for PostgresRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        self.with_conn(|conn| {
            sql_query("SELECT 1")
                .execute(conn)
                .map(|_| true)
                .map_err(map_diesel_error)
        })
        .await
    }

    async fn set_slot(
        &self,
        user_id: UserId,
        slot_index: SlotIndex,
        state: SlotState,
    ) -> RepositoryResult<()> {
        self.with_conn(move |conn| {
            conn.transaction(|tx| {
                let mut dirty = BTreeSet::new();
                apply_slot_mutation(tx, user_id.value(), slot_index.value(), state, &mut dirty)?;
                recompute_aggregates(tx, &dirty)
            })
        })
        .await
    }

    async fn bulk_set_slots(
        &self,
        user_id: UserId,
        entries: &[(SlotIndex, SlotState)],
    ) -> RepositoryResult<usize> {
        let entries = entries.to_vec();
        self.with_conn(move |conn| {
            conn.transaction(|tx| {
                let mut dirty = BTreeSet::new();
                let mut applied = 0;
                for (slot_index, state) in &entries {
                    if apply_slot_mutation(
                        tx,
                        user_id.value(),
                        slot_index.value(),
                        *state,
                        &mut dirty,
                    )? {
                        applied += 1;
                    }
                }
                recompute_aggregates(tx, &dirty)?;
                Ok(applied)
            })
        })
        .await
    }

    async fn query_slots(&self, filter: &SlotFilter) -> RepositoryResult<Vec<AvailabilitySlot>> {
        let filter = filter.clone();
        self.with_conn(move |conn| {
            let mut query = availability_slots::table
                .select(AvailabilitySlotRow::as_select())
                .into_boxed();

            if let (Some(start), Some(end)) = (filter.start_slot, filter.end_slot) {
                query = query
                    .filter(availability_slots::slot_index.ge(start.value()))
                    .filter(availability_slots::slot_index.le(end.value()));
            }
            if let Some(ref user_ids) = filter.user_ids {
                let ids: Vec<i64> = user_ids.iter().map(|id| id.value()).collect();
                query = query.filter(availability_slots::user_id.eq_any(ids));
            }
            match filter.confidence {
                Confidence::All => {}
                Confidence::Available => {
                    query = query
                        .filter(availability_slots::state.eq(SlotState::Available.as_i16()));
                }
                Confidence::AvailableMaybe => {
                    query = query.filter(availability_slots::state.eq_any(vec![
                        SlotState::Maybe.as_i16(),
                        SlotState::Available.as_i16(),
                    ]));
                }
            }

            let rows: Vec<AvailabilitySlotRow> =
                query.load(conn).map_err(map_diesel_error)?;
            Ok(rows
                .into_iter()
                .filter_map(AvailabilitySlotRow::into_domain)
                .collect())
        })
        .await
    }

    async fn fetch_aggregates(
        &self,
        start_slot: Option<SlotIndex>,
        end_slot: Option<SlotIndex>,
    ) -> RepositoryResult<Vec<AggregateSlotCount>> {
        self.with_conn(move |conn| {
            let mut query = aggregate_slot_counts::table
                .select(AggregateSlotCountRow::as_select())
                .into_boxed();
            if let (Some(start), Some(end)) = (start_slot, end_slot) {
                query = query
                    .filter(aggregate_slot_counts::slot_index.ge(start.value()))
                    .filter(aggregate_slot_counts::slot_index.le(end.value()));
            }

            let rows: Vec<AggregateSlotCountRow> = query
                .order(aggregate_slot_counts::slot_index.asc())
                .load(conn)
                .map_err(map_diesel_error)?;
            Ok(rows.into_iter().map(Into::into).collect())
        })
        .await
    }

    async fn rebuild_aggregates(&self) -> RepositoryResult<usize> {
        self.with_conn(|conn| {
            conn.transaction(|tx| {
                diesel::delete(aggregate_slot_counts::table)
                    .execute(tx)
                    .map_err(map_diesel_error)?;

                let indices: Vec<i64> = availability_slots::table
                    .select(availability_slots::slot_index)
                    .distinct()
                    .load(tx)
                    .map_err(map_diesel_error)?;

                let dirty: BTreeSet<i64> = indices.into_iter().collect();
                recompute_aggregates(tx, &dirty)?;
                Ok(dirty.len())
            })
        })
        .await
    }
}

#[async_trait]
impl UserRepository for PostgresRepository {
    async fn create_user(&self, user: &NewUser) -> RepositoryResult<User> {
        if user.character_name.trim().is_empty() {
            return Err(RepositoryError::validation("Character name is required"));
        }

        let user = user.clone();
        self.with_conn(move |conn| {
            let row: UserRow = diesel::insert_into(users::table)
                .values(&NewUserRow {
                    character_name: user.character_name.clone(),
                    character_class: user.character_class.clone(),
                    roles_json: roles_to_json(&user.roles),
                    timezone: user.timezone.clone(),
                })
                .returning(UserRow::as_returning())
                .get_result(conn)
                .map_err(map_diesel_error)?;
            Ok(row.into())
        })
        .await
    }

    async fn get_user(&self, user_id: UserId) -> RepositoryResult<User> {
        self.find_user(user_id).await?.ok_or_else(|| {
            RepositoryError::not_found_with_context(
                "User not found",
                ErrorContext::new("get_user")
                    .with_entity("user")
                    .with_entity_id(user_id),
            )
        })
    }

    async fn find_user(&self, user_id: UserId) -> RepositoryResult<Option<User>> {
        self.with_conn(move |conn| {
            let row: Option<UserRow> = users::table
                .find(user_id.value())
                .select(UserRow::as_select())
                .first(conn)
                .optional()
                .map_err(map_diesel_error)?;
            Ok(row.map(Into::into))
        })
        .await
    }

    async fn list_users(&self, filter: &UserFilter) -> RepositoryResult<Vec<User>> {
        let filter = filter.clone();
        self.with_conn(move |conn| {
            let mut query = users::table.select(UserRow::as_select()).into_boxed();
            if let Some(ref class) = filter.character_class {
                query = query.filter(users::character_class.eq(class.clone()));
            }

            let rows: Vec<UserRow> = query
                .order(users::character_name.asc())
                .load(conn)
                .map_err(map_diesel_error)?;

            // Role membership is checked against the decoded role list; guild
            // rosters are small enough that pushdown buys nothing
            let users: Vec<User> = rows
                .into_iter()
                .map(User::from)
                .filter(|u| match filter.role {
                    Some(ref role) => u.roles.iter().any(|r| r == role),
                    None => true,
                })
                .collect();
            Ok(users)
        })
        .await
    }

    async fn update_profile(
        &self,
        user_id: UserId,
        update: &ProfileUpdate,
    ) -> RepositoryResult<User> {
        if update.character_class.is_none() && update.roles.is_none() && update.timezone.is_none()
        {
            // Nothing to change; Diesel rejects empty changesets
            return self.get_user(user_id).await;
        }

        let update = update.clone();
        self.with_conn(move |conn| {
            let changeset = ProfileChangeset {
                character_class: update.character_class.clone(),
                roles_json: update.roles.as_deref().map(roles_to_json),
                timezone: update.timezone.clone(),
            };
            let row: Option<UserRow> = diesel::update(users::table.find(user_id.value()))
                .set(&changeset)
                .returning(UserRow::as_returning())
                .get_result(conn)
                .optional()
                .map_err(map_diesel_error)?;
            row.map(Into::into).ok_or_else(|| {
                RepositoryError::not_found_with_context(
                    "User not found",
                    ErrorContext::new("update_profile")
                        .with_entity("user")
                        .with_entity_id(user_id),
                )
            })
        })
        .await
    }
}

#[async_trait]
impl GroupRepository for PostgresRepository {
    async fn create_group(&self, name: &str, leader_id: UserId) -> RepositoryResult<Group> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            conn.transaction(|tx| {
                let row: GroupRow = diesel::insert_into(groups::table)
                    .values(&NewGroupRow {
                        name: name.clone(),
                        leader_id: leader_id.value(),
                    })
                    .returning(GroupRow::as_returning())
                    .get_result(tx)
                    .map_err(map_diesel_error)?;

                diesel::insert_into(group_memberships::table)
                    .values(&NewGroupMembershipRow {
                        group_id: row.group_id,
                        user_id: leader_id.value(),
                    })
                    .execute(tx)
                    .map_err(map_diesel_error)?;

                Ok(row.into())
            })
        })
        .await
    }

    async fn get_group(&self, group_id: GroupId) -> RepositoryResult<Group> {
        self.with_conn(move |conn| {
            let row: Option<GroupRow> = groups::table
                .find(group_id.value())
                .select(GroupRow::as_select())
                .first(conn)
                .optional()
                .map_err(map_diesel_error)?;
            row.map(Into::into).ok_or_else(|| {
                RepositoryError::not_found_with_context(
                    "Group not found",
                    ErrorContext::new("get_group")
                        .with_entity("group")
                        .with_entity_id(group_id),
                )
            })
        })
        .await
    }

    async fn groups_for_user(&self, user_id: UserId) -> RepositoryResult<Vec<Group>> {
        self.with_conn(move |conn| {
            let rows: Vec<GroupRow> = group_memberships::table
                .inner_join(groups::table)
                .filter(group_memberships::user_id.eq(user_id.value()))
                .select(GroupRow::as_select())
                .load(conn)
                .map_err(map_diesel_error)?;
            Ok(rows.into_iter().map(Into::into).collect())
        })
        .await
    }

    async fn group_members(&self, group_id: GroupId) -> RepositoryResult<Vec<GroupMember>> {
        self.with_conn(move |conn| {
            let rows: Vec<GroupMembershipRow> = group_memberships::table
                .filter(group_memberships::group_id.eq(group_id.value()))
                .order(group_memberships::joined_at.asc())
                .select(GroupMembershipRow::as_select())
                .load(conn)
                .map_err(map_diesel_error)?;
            Ok(rows.into_iter().map(Into::into).collect())
        })
        .await
    }

    async fn is_member(&self, group_id: GroupId, user_id: UserId) -> RepositoryResult<bool> {
        self.with_conn(move |conn| {
            diesel::select(diesel::dsl::exists(
                group_memberships::table
                    .filter(group_memberships::group_id.eq(group_id.value()))
                    .filter(group_memberships::user_id.eq(user_id.value())),
            ))
            .get_result(conn)
            .map_err(map_diesel_error)
        })
        .await
    }

    async fn create_invite(
        &self,
        group_id: GroupId,
        inviter_id: UserId,
        invitee_id: UserId,
    ) -> RepositoryResult<GroupInvite> {
        self.with_conn(move |conn| {
            conn.transaction(|tx| {
                let pending_exists: bool = diesel::select(diesel::dsl::exists(
                    group_invites::table
                        .filter(group_invites::group_id.eq(group_id.value()))
                        .filter(group_invites::invitee_id.eq(invitee_id.value()))
                        .filter(group_invites::status.eq(InviteStatus::Pending.as_str())),
                ))
                .get_result(tx)
                .map_err(map_diesel_error)?;
                if pending_exists {
                    return Err(RepositoryError::validation(
                        "Invite already pending for this user",
                    ));
                }

                let row: GroupInviteRow = diesel::insert_into(group_invites::table)
                    .values(&NewGroupInviteRow {
                        group_id: group_id.value(),
                        inviter_id: inviter_id.value(),
                        invitee_id: invitee_id.value(),
                        status: InviteStatus::Pending.as_str().to_string(),
                    })
                    .returning(GroupInviteRow::as_returning())
                    .get_result(tx)
                    .map_err(map_diesel_error)?;
                Ok(row.into())
            })
        })
        .await
    }

    async fn get_invite(&self, invite_id: InviteId) -> RepositoryResult<GroupInvite> {
        self.with_conn(move |conn| {
            let row: Option<GroupInviteRow> = group_invites::table
                .find(invite_id.value())
                .select(GroupInviteRow::as_select())
                .first(conn)
                .optional()
                .map_err(map_diesel_error)?;
            row.map(Into::into).ok_or_else(|| {
                RepositoryError::not_found_with_context(
                    "Invite not found",
                    ErrorContext::new("get_invite")
                        .with_entity("invite")
                        .with_entity_id(invite_id),
                )
            })
        })
        .await
    }

    async fn pending_invites_for_group(
        &self,
        group_id: GroupId,
    ) -> RepositoryResult<Vec<GroupInvite>> {
        self.with_conn(move |conn| {
            let rows: Vec<GroupInviteRow> = group_invites::table
                .filter(group_invites::group_id.eq(group_id.value()))
                .filter(group_invites::status.eq(InviteStatus::Pending.as_str()))
                .select(GroupInviteRow::as_select())
                .load(conn)
                .map_err(map_diesel_error)?;
            Ok(rows.into_iter().map(Into::into).collect())
        })
        .await
    }

    async fn pending_invites_for_user(
        &self,
        user_id: UserId,
        created_after: DateTime<Utc>,
    ) -> RepositoryResult<Vec<GroupInvite>> {
        self.with_conn(move |conn| {
            let rows: Vec<GroupInviteRow> = group_invites::table
                .filter(group_invites::invitee_id.eq(user_id.value()))
                .filter(group_invites::status.eq(InviteStatus::Pending.as_str()))
                .filter(group_invites::created_at.ge(created_after))
                .order(group_invites::created_at.desc())
                .select(GroupInviteRow::as_select())
                .load(conn)
                .map_err(map_diesel_error)?;
            Ok(rows.into_iter().map(Into::into).collect())
        })
        .await
    }

    async fn expire_invites_before(&self, cutoff: DateTime<Utc>) -> RepositoryResult<usize> {
        self.with_conn(move |conn| {
            diesel::update(
                group_invites::table
                    .filter(group_invites::status.eq(InviteStatus::Pending.as_str()))
                    .filter(group_invites::created_at.lt(cutoff)),
            )
            .set((
                group_invites::status.eq(InviteStatus::Expired.as_str()),
                group_invites::responded_at.eq(diesel::dsl::now),
            ))
            .execute(conn)
            .map_err(map_diesel_error)
        })
        .await
    }

    async fn accept_invite(
        &self,
        invite_id: InviteId,
        invitee_id: UserId,
    ) -> RepositoryResult<Group> {
        self.with_conn(move |conn| {
            conn.transaction(|tx| {
                let invite: Option<GroupInviteRow> = group_invites::table
                    .find(invite_id.value())
                    .select(GroupInviteRow::as_select())
                    .for_update()
                    .first(tx)
                    .optional()
                    .map_err(map_diesel_error)?;
                let invite =
                    invite.ok_or_else(|| RepositoryError::not_found("Invite not found"))?;

                if invite.invitee_id != invitee_id.value() {
                    return Err(RepositoryError::validation(
                        "Invite is not addressed to this user",
                    ));
                }
                if invite.status != InviteStatus::Pending.as_str() {
                    return Err(RepositoryError::validation(format!(
                        "Invite is {}",
                        invite.status
                    )));
                }

                // Lock the group row so concurrent accepts serialize on the
                // member-count check
                let group: Option<GroupRow> = groups::table
                    .find(invite.group_id)
                    .select(GroupRow::as_select())
                    .for_update()
                    .first(tx)
                    .optional()
                    .map_err(map_diesel_error)?;
                let group =
                    group.ok_or_else(|| RepositoryError::not_found("Group not found"))?;

                let already_member: bool = diesel::select(diesel::dsl::exists(
                    group_memberships::table
                        .filter(group_memberships::group_id.eq(group.group_id))
                        .filter(group_memberships::user_id.eq(invitee_id.value())),
                ))
                .get_result(tx)
                .map_err(map_diesel_error)?;
                if already_member {
                    return Err(RepositoryError::validation(
                        "User is already a member of this group",
                    ));
                }

                let member_count: i64 = group_memberships::table
                    .filter(group_memberships::group_id.eq(group.group_id))
                    .count()
                    .get_result(tx)
                    .map_err(map_diesel_error)?;
                if member_count >= group.max_size as i64 {
                    return Err(RepositoryError::validation("Group is full"));
                }

                diesel::update(group_invites::table.find(invite_id.value()))
                    .set((
                        group_invites::status.eq(InviteStatus::Accepted.as_str()),
                        group_invites::responded_at.eq(diesel::dsl::now),
                    ))
                    .execute(tx)
                    .map_err(map_diesel_error)?;

                diesel::insert_into(group_memberships::table)
                    .values(&NewGroupMembershipRow {
                        group_id: group.group_id,
                        user_id: invitee_id.value(),
                    })
                    .execute(tx)
                    .map_err(map_diesel_error)?;

                Ok(group.into())
            })
        })
        .await
    }

    async fn decline_invite(
        &self,
        invite_id: InviteId,
        invitee_id: UserId,
    ) -> RepositoryResult<()> {
        self.with_conn(move |conn| {
            conn.transaction(|tx| {
                let invite: Option<GroupInviteRow> = group_invites::table
                    .find(invite_id.value())
                    .select(GroupInviteRow::as_select())
                    .for_update()
                    .first(tx)
                    .optional()
                    .map_err(map_diesel_error)?;
                let invite =
                    invite.ok_or_else(|| RepositoryError::not_found("Invite not found"))?;

                if invite.invitee_id != invitee_id.value() {
                    return Err(RepositoryError::validation(
                        "Invite is not addressed to this user",
                    ));
                }
                if invite.status != InviteStatus::Pending.as_str() {
                    return Err(RepositoryError::validation(format!(
                        "Invite is already {}",
                        invite.status
                    )));
                }

                diesel::update(group_invites::table.find(invite_id.value()))
                    .set((
                        group_invites::status.eq(InviteStatus::Declined.as_str()),
                        group_invites::responded_at.eq(diesel::dsl::now),
                    ))
                    .execute(tx)
                    .map_err(map_diesel_error)?;
                Ok(())
            })
        })
        .await
    }

    async fn leave_group(&self, group_id: GroupId, user_id: UserId) -> RepositoryResult<()> {
        self.with_conn(move |conn| {
            conn.transaction(|tx| {
                let group: Option<GroupRow> = groups::table
                    .find(group_id.value())
                    .select(GroupRow::as_select())
                    .for_update()
                    .first(tx)
                    .optional()
                    .map_err(map_diesel_error)?;
                let group =
                    group.ok_or_else(|| RepositoryError::not_found("Group not found"))?;

                let deleted = diesel::delete(
                    group_memberships::table
                        .filter(group_memberships::group_id.eq(group_id.value()))
                        .filter(group_memberships::user_id.eq(user_id.value())),
                )
                .execute(tx)
                .map_err(map_diesel_error)?;
                if deleted == 0 {
                    return Err(RepositoryError::validation(
                        "You are not a member of this group",
                    ));
                }

                if group.leader_id == user_id.value() {
                    // Promote the earliest remaining joiner, if any
                    let next_leader: Option<GroupMembershipRow> = group_memberships::table
                        .filter(group_memberships::group_id.eq(group_id.value()))
                        .order(group_memberships::joined_at.asc())
                        .select(GroupMembershipRow::as_select())
                        .first(tx)
                        .optional()
                        .map_err(map_diesel_error)?;
                    if let Some(next_leader) = next_leader {
                        diesel::update(groups::table.find(group_id.value()))
                            .set(groups::leader_id.eq(next_leader.user_id))
                            .execute(tx)
                            .map_err(map_diesel_error)?;
                    }
                }

                Ok(())
            })
        })
        .await
    }

    async fn disband_group(&self, group_id: GroupId) -> RepositoryResult<()> {
        self.with_conn(move |conn| {
            // Memberships and invites go with the group via ON DELETE CASCADE
            let deleted = diesel::delete(groups::table.find(group_id.value()))
                .execute(conn)
                .map_err(map_diesel_error)?;
            if deleted == 0 {
                return Err(RepositoryError::not_found_with_context(
                    "Group not found",
                    ErrorContext::new("disband_group")
                        .with_entity("group")
                        .with_entity_id(group_id),
                ));
            }
            Ok(())
        })
        .await
    }
}
