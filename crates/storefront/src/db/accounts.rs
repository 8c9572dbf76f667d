//! Account repository for the identity provider.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use right_water_core::types::{Email, Uid};

use super::{RepositoryError, conflict_or_database};
use crate::services::identity::{Account, AccountRepository};

#[derive(sqlx::FromRow)]
struct AccountRow {
    uid: Uid,
    email: String,
    display_name: Option<String>,
    password_hash: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = RepositoryError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;
        Ok(Self {
            uid: row.uid,
            email,
            display_name: row.display_name,
            password_hash: row.password_hash,
            created_at: row.created_at,
        })
    }
}

/// `PostgreSQL` implementation of [`AccountRepository`].
#[derive(Clone)]
pub struct PgAccounts {
    pool: PgPool,
}

impl PgAccounts {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_where(
        &self,
        column: &'static str,
        value: &str,
    ) -> Result<Option<Account>, RepositoryError> {
        let sql = format!(
            "SELECT uid, email, display_name, password_hash, created_at FROM accounts WHERE {column} = $1"
        );
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Account::try_from).transpose()
    }
}

#[async_trait]
impl AccountRepository for PgAccounts {
    async fn create(&self, account: &Account) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO accounts (uid, email, display_name, password_hash, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(&account.uid)
        .bind(account.email.as_str())
        .bind(account.display_name.as_deref())
        .bind(&account.password_hash)
        .bind(account.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or_database(e, "account"))?;
        Ok(())
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<Account>, RepositoryError> {
        self.find_where("email", email.as_str()).await
    }

    async fn find_by_uid(&self, uid: &Uid) -> Result<Option<Account>, RepositoryError> {
        self.find_where("uid", uid.as_str()).await
    }

    async fn set_display_name(&self, uid: &Uid, display_name: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE accounts SET display_name = $2 WHERE uid = $1")
            .bind(uid)
            .bind(display_name)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn set_password_hash(
        &self,
        uid: &Uid,
        password_hash: &str,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("UPDATE accounts SET password_hash = $2 WHERE uid = $1")
            .bind(uid)
            .bind(password_hash)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        // Outstanding reset codes die with the old password.
        sqlx::query("DELETE FROM password_resets WHERE uid = $1")
            .bind(uid)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn store_reset_code(
        &self,
        code: &str,
        uid: &Uid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query("INSERT INTO password_resets (code, uid, expires_at) VALUES ($1, $2, $3)")
            .bind(code)
            .bind(uid)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn take_reset_code(
        &self,
        code: &str,
    ) -> Result<Option<(Uid, DateTime<Utc>)>, RepositoryError> {
        let row = sqlx::query_as::<_, (Uid, DateTime<Utc>)>(
            "DELETE FROM password_resets WHERE code = $1 RETURNING uid, expires_at",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}
