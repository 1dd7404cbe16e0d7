//! User repository (数据库访问层)

use crate::{
    error::AppError,
    models::user::{User, UserStatus},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Credential store consumed by the auth service.
///
/// Lookups return `Ok(None)` when no live record matches.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new record. Unique violations surface as `AppError::Conflict`.
    async fn create(&self, user: &User) -> Result<User, AppError>;

    async fn get_by_id(&self, id: &Uuid) -> Result<Option<User>, AppError>;

    async fn get_by_username(&self, username: &str) -> Result<Option<User>, AppError>;

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    /// Overwrite a record. `AppError::NotFound` if it does not exist.
    async fn update(&self, user: &User) -> Result<(), AppError>;

    /// Remove a record. `AppError::NotFound` if it does not exist.
    async fn delete(&self, id: &Uuid) -> Result<(), AppError>;
}

macro_rules! user_columns {
    () => {
        "id, username, email, password_hash, full_name, phone_number, address, ktp_number, \
         monthly_income, status, failed_login_attempts, last_failed_login, locked_until, \
         created_at, updated_at"
    };
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    full_name: Option<String>,
    phone_number: Option<String>,
    address: Option<String>,
    ktp_number: Option<String>,
    monthly_income: f64,
    status: String,
    failed_login_attempts: i32,
    last_failed_login: Option<DateTime<Utc>>,
    locked_until: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            full_name: row.full_name,
            phone_number: row.phone_number,
            address: row.address,
            ktp_number: row.ktp_number,
            monthly_income: row.monthly_income,
            status: UserStatus::from(row.status),
            failed_login_attempts: u32::try_from(row.failed_login_attempts).unwrap_or(0),
            last_failed_login: row.last_failed_login,
            locked_until: row.locked_until,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// 唯一约束冲突映射为 Conflict
fn map_write_error(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            let message = match db_err.constraint() {
                Some(c) if c.contains("username") => "username already exists",
                Some(c) if c.contains("email") => "email already registered",
                _ => "user already exists",
            };
            return AppError::Conflict(message.to_string());
        }
    }
    AppError::Database(e)
}

fn attempts_to_db(attempts: u32) -> i32 {
    i32::try_from(attempts).unwrap_or(i32::MAX)
}

/// PostgreSQL implementation over a caller-managed pool
#[derive(Clone)]
pub struct PgUserRepository {
    db: PgPool,
}

impl PgUserRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn find_one(&self, query: &'static str, key: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(query)
            .bind(key)
            .fetch_optional(&self.db)
            .await?;

        Ok(row.map(User::from))
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: &User) -> Result<User, AppError> {
        let row = sqlx::query_as::<_, UserRow>(concat!(
            "INSERT INTO users (id, username, email, password_hash, full_name, phone_number, \
             address, ktp_number, monthly_income, status, failed_login_attempts, \
             last_failed_login, locked_until, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
             RETURNING ",
            user_columns!()
        ))
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.full_name)
        .bind(&user.phone_number)
        .bind(&user.address)
        .bind(&user.ktp_number)
        .bind(user.monthly_income)
        .bind(user.status.as_str())
        .bind(attempts_to_db(user.failed_login_attempts))
        .bind(user.last_failed_login)
        .bind(user.locked_until)
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(&self.db)
        .await
        .map_err(map_write_error)?;

        Ok(row.into())
    }

    async fn get_by_id(&self, id: &Uuid) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM users WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(User::from))
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        self.find_one(
            concat!(
                "SELECT ",
                user_columns!(),
                " FROM users WHERE username = $1 AND deleted_at IS NULL"
            ),
            username,
        )
        .await
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        self.find_one(
            concat!(
                "SELECT ",
                user_columns!(),
                " FROM users WHERE email = $1 AND deleted_at IS NULL"
            ),
            email,
        )
        .await
    }

    async fn update(&self, user: &User) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET
                username = $2,
                email = $3,
                password_hash = $4,
                full_name = $5,
                phone_number = $6,
                address = $7,
                ktp_number = $8,
                monthly_income = $9,
                status = $10,
                failed_login_attempts = $11,
                last_failed_login = $12,
                locked_until = $13,
                updated_at = $14
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.full_name)
        .bind(&user.phone_number)
        .bind(&user.address)
        .bind(&user.ktp_number)
        .bind(user.monthly_income)
        .bind(user.status.as_str())
        .bind(attempts_to_db(user.failed_login_attempts))
        .bind(user.last_failed_login)
        .bind(user.locked_until)
        .bind(user.updated_at)
        .execute(&self.db)
        .await
        .map_err(map_write_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("user".to_string()));
        }

        Ok(())
    }

    async fn delete(&self, id: &Uuid) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE users SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("user".to_string()));
        }

        Ok(())
    }
}
