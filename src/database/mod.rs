use chrono::{DateTime, Utc};
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::error::SqlState;
use tokio_postgres::NoTls;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::models::{Session, User, UserRole};

/// Database connection pool
pub type DbPool = Pool;

const USER_COLUMNS: &str = "id, name, email, email_verified, image, role, image_cld_pub_id, created_at, updated_at";
const SESSION_COLUMNS: &str = "id, user_id, token_hash, expires_at, ip_address, user_agent, created_at";

/// Database service
pub struct DatabaseService {
    pool: DbPool,
}

impl DatabaseService {
    /// Create a new database service with connection pool.
    ///
    /// Connections are opened on first use, so an unreachable server only
    /// fails the queries that need it.
    pub async fn new(config: &DatabaseConfig) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let mut cfg = Config::new();
        cfg.url = Some(config.url.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(PoolConfig::new(config.max_connections));

        let pool = cfg.create_pool(Some(Runtime::Tokio1), NoTls)?;

        Ok(Self { pool })
    }

    /// Round trip to the server
    pub async fn ping(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let client = self.get_client().await?;
        client.execute("SELECT 1", &[]).await?;
        Ok(())
    }

    /// Get a database client from the pool
    pub async fn get_client(&self) -> Result<deadpool_postgres::Client, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.pool.get().await?)
    }

    /// Create the classroom and auth tables if they are missing
    pub async fn init_schema(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let client = self.get_client().await?;

        client.batch_execute(SCHEMA_SQL).await?;

        log::info!("Database schema initialized");
        Ok(())
    }

    /// Create a user together with its credential account, atomically
    pub async fn create_user_with_password(
        &self,
        name: &str,
        email: &str,
        role: UserRole,
        image_cld_pub_id: Option<&str>,
        password_hash: &str,
    ) -> Result<User, Box<dyn std::error::Error + Send + Sync>> {
        let mut client = self.get_client().await?;
        let txn = client.transaction().await?;

        let id = Uuid::new_v4();
        let insert_user = format!(
            "INSERT INTO users (id, name, email, role, image_cld_pub_id) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            USER_COLUMNS
        );
        let row = txn.query_one(
            insert_user.as_str(),
            &[&id, &name, &email, &role.as_str(), &image_cld_pub_id],
        ).await?;

        txn.execute(
            "INSERT INTO accounts (id, user_id, provider_id, account_id, password) \
             VALUES ($1, $2, 'credential', $3, $4)",
            &[&Uuid::new_v4(), &id, &id.to_string(), &password_hash],
        ).await?;

        txn.commit().await?;

        Ok(Self::row_to_user(&row))
    }

    /// Get user by ID
    pub async fn get_user_by_id(&self, id: &Uuid) -> Result<Option<User>, Box<dyn std::error::Error + Send + Sync>> {
        let client = self.get_client().await?;

        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let row = client.query_opt(
            sql.as_str(),
            &[id],
        ).await?;

        Ok(row.as_ref().map(Self::row_to_user))
    }

    /// Get user by email (case-insensitive)
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, Box<dyn std::error::Error + Send + Sync>> {
        let client = self.get_client().await?;

        let sql = format!("SELECT {} FROM users WHERE lower(email) = lower($1)", USER_COLUMNS);
        let row = client.query_opt(
            sql.as_str(),
            &[&email],
        ).await?;

        Ok(row.as_ref().map(Self::row_to_user))
    }

    /// Password hash of the user's credential account, if any
    pub async fn get_password_hash(&self, user_id: &Uuid) -> Result<Option<String>, Box<dyn std::error::Error + Send + Sync>> {
        let client = self.get_client().await?;

        let row = client.query_opt(
            "SELECT password FROM accounts WHERE user_id = $1 AND provider_id = 'credential'",
            &[user_id],
        ).await?;

        Ok(row.and_then(|r| r.get::<_, Option<String>>(0)))
    }

    /// Create a new session
    pub async fn create_session(&self, session: &Session) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let client = self.get_client().await?;

        client.execute("
            INSERT INTO sessions (id, user_id, token_hash, expires_at, ip_address, user_agent, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        ", &[
            &session.id,
            &session.user_id,
            &session.token_hash,
            &session.expires_at,
            &session.ip_address,
            &session.user_agent,
            &session.created_at,
        ]).await?;

        Ok(())
    }

    /// Get an unexpired session by token hash
    pub async fn get_session_by_token_hash(&self, token_hash: &str) -> Result<Option<Session>, Box<dyn std::error::Error + Send + Sync>> {
        let client = self.get_client().await?;

        let sql = format!(
            "SELECT {} FROM sessions WHERE token_hash = $1 AND expires_at > NOW()",
            SESSION_COLUMNS
        );
        let row = client.query_opt(
            sql.as_str(),
            &[&token_hash],
        ).await?;

        Ok(row.as_ref().map(Self::row_to_session))
    }

    /// Delete a session by token hash
    pub async fn delete_session(&self, token_hash: &str) -> Result<u64, Box<dyn std::error::Error + Send + Sync>> {
        let client = self.get_client().await?;

        let removed = client.execute("DELETE FROM sessions WHERE token_hash = $1", &[&token_hash]).await?;
        Ok(removed)
    }

    /// Clean up expired sessions
    pub async fn cleanup_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, Box<dyn std::error::Error + Send + Sync>> {
        let client = self.get_client().await?;

        match client.execute("DELETE FROM sessions WHERE expires_at < $1", &[&now]).await {
            Ok(removed) => {
                log::debug!("cleanup_expired_sessions removed {} rows", removed);
                Ok(removed)
            }
            Err(e) => {
                log::error!("cleanup_expired_sessions db error: {}", e);
                Err(Box::new(e))
            }
        }
    }

    /// Helper to convert database row to User
    fn row_to_user(row: &tokio_postgres::Row) -> User {
        User {
            id: row.get(0),
            name: row.get(1),
            email: row.get(2),
            email_verified: row.get(3),
            image: row.get(4),
            role: UserRole::parse(row.get::<_, &str>(5)).unwrap_or_default(),
            image_cld_pub_id: row.get(6),
            created_at: row.get(7),
            updated_at: row.get(8),
        }
    }

    /// Helper to convert database row to Session
    fn row_to_session(row: &tokio_postgres::Row) -> Session {
        Session {
            id: row.get(0),
            user_id: row.get(1),
            token_hash: row.get(2),
            expires_at: row.get(3),
            ip_address: row.get(4),
            user_agent: row.get(5),
            created_at: row.get(6),
        }
    }
}

/// True when `err` is a Postgres unique-constraint violation
pub fn is_unique_violation(err: &(dyn std::error::Error + Send + Sync + 'static)) -> bool {
    err.downcast_ref::<tokio_postgres::Error>()
        .and_then(|e| e.code())
        .map_or(false, |code| *code == SqlState::UNIQUE_VIOLATION)
}

/// Idempotent schema for development databases; production uses `migrate`
pub const SCHEMA_SQL: &str = include_str!("../../migrations/V1__classroom_schema.sql");
