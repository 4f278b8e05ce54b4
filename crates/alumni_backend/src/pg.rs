//! Postgres implementations of the table ports.
//!
//! Each adapter is a newtype wrapping PgPool. All SQL is runtime-checked
//! (sqlx::query, not sqlx::query!) to avoid compile-time DB requirement.
//! Keys are parsed as uuids before querying; a malformed id matches no row.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Uuid;
use sqlx::PgPool;

use alumni_core::ports::{
    Claim, ClaimOutcome, PortError, PortResult, ProfileStore, RegistrationStore, UserStore,
};
use alumni_core::types::{NewUser, PendingRegistration, UserProfile};

const UNIQUE_VIOLATION: &str = "23505";

fn parse_key(id: &str) -> Option<Uuid> {
    Uuid::parse_str(id.trim()).ok()
}

/// Translate a sqlx failure into the port taxonomy.
pub(crate) fn map_sqlx(err: sqlx::Error) -> PortError {
    if let sqlx::Error::Database(db) = &err {
        let message = db.message().to_string();
        match db.code().as_deref() {
            Some(UNIQUE_VIOLATION) => return PortError::Conflict(message),
            // Data exceptions (22xxx) and other integrity violations (23xxx).
            Some(code) if code.starts_with("22") || code.starts_with("23") => {
                return PortError::Rejected(message)
            }
            _ => {}
        }
    }
    match err {
        sqlx::Error::RowNotFound => PortError::NotFound("row not found".to_string()),
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            PortError::Unavailable(err.to_string())
        }
        other => PortError::Other(other.into()),
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PendingRegistrationRow {
    id: String,
    email: String,
    first_name: Option<String>,
    last_name: Option<String>,
    student_id: Option<String>,
    graduation_year: Option<i32>,
    program: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    city: Option<String>,
    country: Option<String>,
    profile_image_url: Option<String>,
    current_job: Option<String>,
    company: Option<String>,
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, sqlx::FromRow)]
struct ClaimedRow {
    #[sqlx(flatten)]
    registration: PendingRegistrationRow,
    claim_token: Uuid,
}

impl From<PendingRegistrationRow> for PendingRegistration {
    fn from(row: PendingRegistrationRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            first_name: row.first_name.unwrap_or_default(),
            last_name: row.last_name.unwrap_or_default(),
            student_id: row.student_id,
            graduation_year: row.graduation_year,
            program: row.program,
            phone: row.phone,
            address: row.address,
            city: row.city,
            country: row.country,
            profile_image_url: row.profile_image_url,
            current_job: row.current_job,
            company: row.company,
            created_at: row.created_at,
        }
    }
}

// ── PgRegistrationStore ───────────────────────────────────────

pub struct PgRegistrationStore {
    pool: PgPool,
}

impl PgRegistrationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RegistrationStore for PgRegistrationStore {
    async fn claim(&self, id: &str, ttl: Duration) -> PortResult<ClaimOutcome> {
        let Some(key) = parse_key(id) else {
            return Ok(ClaimOutcome::Missing);
        };
        let claimed = sqlx::query_as::<_, ClaimedRow>(
            r#"
            UPDATE pending_registrations
               SET approval_claimed_at = now(),
                   approval_claim_token = gen_random_uuid()
             WHERE id = $1
               AND (approval_claimed_at IS NULL
                    OR approval_claimed_at < now() - make_interval(secs => $2))
            RETURNING id::text AS id, email, first_name, last_name, student_id,
                      graduation_year, program, phone, address, city, country,
                      profile_image_url, current_job, company, created_at,
                      approval_claim_token AS claim_token
            "#,
        )
        .bind(key)
        .bind(ttl.as_secs_f64())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if let Some(row) = claimed {
            return Ok(ClaimOutcome::Claimed(Claim {
                registration: row.registration.into(),
                token: row.claim_token.to_string(),
            }));
        }

        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (SELECT 1 FROM pending_registrations WHERE id = $1)
            "#,
        )
        .bind(key)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(if exists {
            ClaimOutcome::Busy
        } else {
            ClaimOutcome::Missing
        })
    }

    async fn release(&self, id: &str, token: &str) -> PortResult<()> {
        let (Some(key), Some(token)) = (parse_key(id), parse_key(token)) else {
            return Ok(());
        };
        sqlx::query(
            r#"
            UPDATE pending_registrations
               SET approval_claimed_at = NULL,
                   approval_claim_token = NULL
             WHERE id = $1
               AND approval_claim_token = $2
            "#,
        )
        .bind(key)
        .bind(token)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> PortResult<bool> {
        let Some(key) = parse_key(id) else {
            return Ok(false);
        };
        let result = sqlx::query(
            r#"
            DELETE FROM pending_registrations
             WHERE id = $1
            "#,
        )
        .bind(key)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, limit: i64) -> PortResult<Vec<PendingRegistration>> {
        let rows = sqlx::query_as::<_, PendingRegistrationRow>(
            r#"
            SELECT id::text AS id, email, first_name, last_name, student_id,
                   graduation_year, program, phone, address, city, country,
                   profile_image_url, current_job, company, created_at
            FROM pending_registrations
            ORDER BY created_at ASC, id ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

// ── PgUserStore ───────────────────────────────────────────────

pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, user: &NewUser) -> PortResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, role, status, is_verified)
            VALUES ($1::uuid, $2, $3, $4, $5)
            "#,
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(user.status.as_str())
        .bind(user.is_verified)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> PortResult<()> {
        let key = parse_key(user_id)
            .ok_or_else(|| PortError::NotFound(format!("user {}", user_id)))?;
        let result = sqlx::query(
            r#"
            DELETE FROM users WHERE id = $1
            "#,
        )
        .bind(key)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("user {}", user_id)));
        }
        Ok(())
    }
}

// ── PgProfileStore ────────────────────────────────────────────

pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn insert(&self, profile: &UserProfile) -> PortResult<()> {
        let fields = &profile.fields;
        sqlx::query(
            r#"
            INSERT INTO user_profiles (
                user_id, first_name, last_name, student_id, graduation_year,
                program, phone, address, city, country,
                current_job, company, profile_image_url
            )
            VALUES ($1::uuid, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(&profile.user_id)
        .bind(&fields.first_name)
        .bind(&fields.last_name)
        .bind(&fields.student_id)
        .bind(fields.graduation_year)
        .bind(&fields.program)
        .bind(&fields.phone)
        .bind(&fields.address)
        .bind(&fields.city)
        .bind(&fields.country)
        .bind(&fields.current_job)
        .bind(&fields.company)
        .bind(&fields.profile_image_url)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> PortResult<()> {
        let key = parse_key(user_id)
            .ok_or_else(|| PortError::NotFound(format!("profile {}", user_id)))?;
        let result = sqlx::query(
            r#"
            DELETE FROM user_profiles WHERE user_id = $1
            "#,
        )
        .bind(key)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("profile {}", user_id)));
        }
        Ok(())
    }
}

// ── PgStores ──────────────────────────────────────────────────

/// All table adapters sharing one pool.
pub struct PgStores {
    pub registrations: PgRegistrationStore,
    pub users: PgUserStore,
    pub profiles: PgProfileStore,
}

impl PgStores {
    pub fn new(pool: PgPool) -> Self {
        Self {
            registrations: PgRegistrationStore::new(pool.clone()),
            users: PgUserStore::new(pool.clone()),
            profiles: PgProfileStore::new(pool),
        }
    }
}
