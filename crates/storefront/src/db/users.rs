//! Postgres implementation of [`UserStore`].

use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};

use mypeteats_core::{Email, UserId, UserRole};

use super::{Page, Paginated, PgStore, RepositoryError, UserStore, like_pattern};
use crate::models::{NewUser, User, UserCounts, UserFilter};

const USER_COLUMNS: &str =
    "id, name, email, password_hash, role, phone, club_member, created_at, updated_at";

fn push_user_filter(query: &mut QueryBuilder<'_, Postgres>, filter: &UserFilter) {
    if let Some(role) = filter.role {
        query.push(" AND role = ").push_bind(role);
    }
    if let Some(club_member) = filter.club_member {
        query.push(" AND club_member = ").push_bind(club_member);
    }
    if let Some(search) = filter.search.as_deref() {
        let pattern = like_pattern(search);
        query
            .push(" AND (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR email ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        sqlx::query_as::<_, User>(&format!(
            r"
            INSERT INTO users (name, email, password_hash, role, phone, club_member)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role)
        .bind(&user.phone)
        .bind(user.club_member)
        .fetch_one(self.pool())
        .await
        .map_err(RepositoryError::from_write)
    }

    async fn user_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        Ok(user)
    }

    async fn user_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(self.pool())
        .await?;
        Ok(user)
    }

    async fn user_by_name(&self, name: &str) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE name = $1 ORDER BY id LIMIT 1"
        ))
        .bind(name)
        .fetch_optional(self.pool())
        .await?;
        Ok(user)
    }

    async fn list_users(
        &self,
        filter: &UserFilter,
        page: Page,
    ) -> Result<Paginated<User>, RepositoryError> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM users WHERE TRUE");
        push_user_filter(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(self.pool()).await?;

        let mut query = QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users WHERE TRUE"));
        push_user_filter(&mut query, filter);
        query
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(page.limit))
            .push(" OFFSET ")
            .push_bind(page.offset());
        let items = query.build_query_as::<User>().fetch_all(self.pool()).await?;

        Ok(Paginated { items, total })
    }

    async fn update_user(&self, user: &User) -> Result<User, RepositoryError> {
        sqlx::query_as::<_, User>(&format!(
            r"
            UPDATE users
            SET name = $2, email = $3, password_hash = $4, role = $5, phone = $6,
                club_member = $7, updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role)
        .bind(&user.phone)
        .bind(user.club_member)
        .fetch_optional(self.pool())
        .await
        .map_err(RepositoryError::from_write)?
        .ok_or(RepositoryError::NotFound)
    }

    async fn delete_user(&self, id: UserId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(RepositoryError::from_write)?;
        Ok(result.rows_affected() > 0)
    }

    async fn user_counts(&self) -> Result<UserCounts, RepositoryError> {
        let (total, admins, customers, club_members) =
            sqlx::query_as::<_, (i64, i64, i64, i64)>(
                r"
                SELECT COUNT(*),
                       COUNT(*) FILTER (WHERE role <> $1),
                       COUNT(*) FILTER (WHERE role = $1),
                       COUNT(*) FILTER (WHERE club_member)
                FROM users
                ",
            )
            .bind(UserRole::Customer)
            .fetch_one(self.pool())
            .await?;

        Ok(UserCounts {
            total,
            admins,
            customers,
            club_members,
        })
    }
}
