//! PostgreSQL user store

use async_trait::async_trait;
use common::error::{DatabaseError, DatabaseResult};
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::{debug, info};
use uuid::Uuid;

use super::{UserLookup, UserStore};
use crate::models::{NewUser, Role, User, UserPatch, VerifyStatus};

const USER_COLUMNS: &str = "id, fullname, username, email, password_hash, role, verify, \
     refresh_token, email_verify_token, forgot_password_token, \
     phone, city, district, commune, address, created_at, updated_at";

/// User store backed by the `users` table
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    /// Create a new user store
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn lookup_column(lookup: &UserLookup<'_>) -> &'static str {
    match lookup {
        UserLookup::Id(_) => "id",
        UserLookup::Email(_) => "email",
        UserLookup::Username(_) => "username",
        UserLookup::RefreshToken(_) => "refresh_token",
    }
}

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    let role: String = row.try_get("role")?;
    let role = role
        .parse::<Role>()
        .map_err(|e| sqlx::Error::Decode(e.into()))?;

    let verify: i16 = row.try_get("verify")?;
    let verify = VerifyStatus::from_code(verify)
        .ok_or_else(|| sqlx::Error::Decode(format!("Unknown verify code: {}", verify).into()))?;

    Ok(User {
        id: row.try_get("id")?,
        fullname: row.try_get("fullname")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role,
        verify,
        refresh_token: row.try_get("refresh_token")?,
        email_verify_token: row.try_get("email_verify_token")?,
        forgot_password_token: row.try_get("forgot_password_token")?,
        phone: row.try_get("phone")?,
        city: row.try_get("city")?,
        district: row.try_get("district")?,
        commune: row.try_get("commune")?,
        address: row.try_get("address")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Split a nullable-slot patch into (touch, value) bind parameters
fn slot(value: Option<Option<String>>) -> (bool, Option<String>) {
    match value {
        Some(inner) => (true, inner),
        None => (false, None),
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by(&self, lookup: UserLookup<'_>) -> DatabaseResult<Option<User>> {
        debug!("Finding user by {}", lookup_column(&lookup));

        let sql = format!(
            "SELECT {} FROM users WHERE {} = $1",
            USER_COLUMNS,
            lookup_column(&lookup)
        );
        let query = sqlx::query(&sql);
        let query = match lookup {
            UserLookup::Id(id) => query.bind(id),
            UserLookup::Email(value)
            | UserLookup::Username(value)
            | UserLookup::RefreshToken(value) => query.bind(value),
        };

        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_query)?;

        row.as_ref()
            .map(user_from_row)
            .transpose()
            .map_err(DatabaseError::Query)
    }

    async fn insert(&self, user: NewUser) -> DatabaseResult<User> {
        info!("Creating new user: {}", user.username);

        let sql = format!(
            r#"
            INSERT INTO users (id, fullname, username, email, password_hash,
                               refresh_token, email_verify_token)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        let row = sqlx::query(&sql)
            .bind(user.id)
            .bind(&user.fullname)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.refresh_token)
            .bind(&user.email_verify_token)
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from_query)?;

        user_from_row(&row).map_err(DatabaseError::Query)
    }

    async fn update_fields(&self, id: Uuid, patch: UserPatch) -> DatabaseResult<Option<User>> {
        debug!("Updating user {}", id);

        let (touch_refresh, refresh_token) = slot(patch.refresh_token);
        let (touch_email_verify, email_verify_token) = slot(patch.email_verify_token);
        let (touch_forgot, forgot_password_token) = slot(patch.forgot_password_token);

        let sql = format!(
            r#"
            UPDATE users SET
                fullname = COALESCE($2, fullname),
                username = COALESCE($3, username),
                email = COALESCE($4, email),
                password_hash = COALESCE($5, password_hash),
                role = COALESCE($6, role),
                verify = COALESCE($7, verify),
                phone = COALESCE($8, phone),
                city = COALESCE($9, city),
                district = COALESCE($10, district),
                commune = COALESCE($11, commune),
                address = COALESCE($12, address),
                refresh_token = CASE WHEN $13 THEN $14 ELSE refresh_token END,
                email_verify_token = CASE WHEN $15 THEN $16 ELSE email_verify_token END,
                forgot_password_token = CASE WHEN $17 THEN $18 ELSE forgot_password_token END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        let row = sqlx::query(&sql)
            .bind(id)
            .bind(patch.fullname)
            .bind(patch.username)
            .bind(patch.email)
            .bind(patch.password_hash)
            .bind(patch.role.map(|role| role.as_str()))
            .bind(patch.verify.map(|verify| verify.code()))
            .bind(patch.phone)
            .bind(patch.city)
            .bind(patch.district)
            .bind(patch.commune)
            .bind(patch.address)
            .bind(touch_refresh)
            .bind(refresh_token)
            .bind(touch_email_verify)
            .bind(email_verify_token)
            .bind(touch_forgot)
            .bind(forgot_password_token)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_query)?;

        row.as_ref()
            .map(user_from_row)
            .transpose()
            .map_err(DatabaseError::Query)
    }

    async fn swap_refresh_token(
        &self,
        id: Uuid,
        expected: Option<&str>,
        next: Option<&str>,
    ) -> DatabaseResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET refresh_token = $3, updated_at = NOW()
            WHERE id = $1 AND refresh_token IS NOT DISTINCT FROM $2
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(next)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_query)?;

        Ok(result.rows_affected() == 1)
    }

    async fn consume_forgot_password_token(
        &self,
        id: Uuid,
        token: &str,
        password_hash: &str,
    ) -> DatabaseResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $3, forgot_password_token = NULL, updated_at = NOW()
            WHERE id = $1 AND forgot_password_token = $2
            "#,
        )
        .bind(id)
        .bind(token)
        .bind(password_hash)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_query)?;

        Ok(result.rows_affected() == 1)
    }

    async fn revoke_refresh_token(&self, token: &str) -> DatabaseResult<Option<Uuid>> {
        let row = sqlx::query(
            r#"
            UPDATE users
            SET refresh_token = NULL, updated_at = NOW()
            WHERE refresh_token = $1
            RETURNING id
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_query)?;

        row.map(|row| row.try_get("id"))
            .transpose()
            .map_err(DatabaseError::Query)
    }

    async fn list(&self) -> DatabaseResult<Vec<User>> {
        let sql = format!(
            "SELECT {} FROM users ORDER BY created_at DESC",
            USER_COLUMNS
        );

        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from_query)?;

        rows.iter()
            .map(user_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(DatabaseError::Query)
    }

    async fn delete(&self, id: Uuid) -> DatabaseResult<bool> {
        info!("Deleting user {}", id);

        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_query)?;

        Ok(result.rows_affected() > 0)
    }
}
