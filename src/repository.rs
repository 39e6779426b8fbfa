use crate::models::Profile;
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Repository Trait
///
/// Abstract contract for the persistence the portal's access layer needs: reading and
/// creating rows in `public.profiles`. Handlers and the session resolver only see this
/// trait, so tests can swap in an in-memory mock.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Fetches the profile mirrored for an identity-provider user, if one exists.
    async fn get_profile(&self, id: Uuid) -> Result<Option<Profile>, sqlx::Error>;

    /// Inserts the profile created alongside a new identity-provider account.
    async fn create_profile(&self, profile: Profile) -> Result<Profile, sqlx::Error>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// `Repository` backed by PostgreSQL.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_profile(&self, id: Uuid) -> Result<Option<Profile>, sqlx::Error> {
        sqlx::query_as::<_, Profile>("SELECT id, email, role FROM profiles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn create_profile(&self, profile: Profile) -> Result<Profile, sqlx::Error> {
        sqlx::query_as::<_, Profile>(
            "INSERT INTO profiles (id, email, role) VALUES ($1, $2, $3) \
             ON CONFLICT (id) DO UPDATE SET email = EXCLUDED.email \
             RETURNING id, email, role",
        )
        .bind(profile.id)
        .bind(&profile.email)
        .bind(&profile.role)
        .fetch_one(&self.pool)
        .await
    }
}
