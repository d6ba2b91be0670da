//! User directory - Accounts that book spots, and the admin account.
//!
//! Credentials are handled by the auth layer; this module only stores the hash
//! it is given. Username and email uniqueness is enforced by the schema.

use crate::{
    entities::{Reservation, ReservationStatus, User, reservation, user},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, SqlErr, prelude::*};
use serde::Serialize;
use tracing::{info, instrument};

/// Input for registering a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Login name, must be unique
    pub username: String,
    /// Contact email, must be unique
    pub email: String,
    /// Credential hash produced by the auth layer
    pub password_hash: String,
    /// Optional phone number
    pub phone_number: Option<String>,
}

/// The administrator account created on first start.
#[derive(Debug, Clone)]
pub struct AdminAccount {
    /// Admin login name
    pub username: String,
    /// Admin email
    pub email: String,
    /// Credential hash produced by the auth layer
    pub password_hash: String,
    /// Optional phone number
    pub phone_number: Option<String>,
}

/// A regular user with booking counts, as listed on the admin screens.
#[derive(Debug, Clone, Serialize)]
pub struct UserOverview {
    /// The user
    pub user: user::Model,
    /// Reservations ever made
    pub total_reservations: u64,
    /// Reservations currently active (0 or 1)
    pub active_reservations: u64,
}

/// Registers a regular (non-admin) user.
///
/// # Errors
/// Returns `InvalidInput` when the username or email is blank or already taken.
#[instrument(skip(db, new_user), fields(username = %new_user.username))]
pub async fn create_user(db: &DatabaseConnection, new_user: NewUser) -> Result<user::Model> {
    insert_user(db, new_user, false).await
}

async fn insert_user(db: &DatabaseConnection, new_user: NewUser, is_admin: bool) -> Result<user::Model> {
    let username = new_user.username.trim().to_string();
    let email = new_user.email.trim().to_string();
    if username.is_empty() || email.is_empty() {
        return Err(Error::InvalidInput {
            message: "Username and email are required".to_string(),
        });
    }

    let model = user::ActiveModel {
        username: Set(username.clone()),
        email: Set(email),
        password_hash: Set(new_user.password_hash),
        phone_number: Set(new_user.phone_number),
        is_admin: Set(is_admin),
        is_active: Set(true),
        created_at: Set(Utc::now()),
        ..Default::default()
    };

    match model.insert(db).await {
        Ok(created) => {
            info!("Registered user '{}' (ID: {})", created.username, created.id);
            Ok(created)
        }
        Err(err) => match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => Err(Error::InvalidInput {
                message: format!("Username '{username}' or its email is already registered"),
            }),
            _ => Err(err.into()),
        },
    }
}

/// Retrieves a user by ID.
pub async fn get_user<C>(conn: &C, user_id: i64) -> Result<Option<user::Model>>
where
    C: ConnectionTrait,
{
    User::find_by_id(user_id)
        .one(conn)
        .await
        .map_err(Into::into)
}

/// Retrieves a user by ID, failing with `UserNotFound` if it does not exist.
pub async fn require_user<C>(conn: &C, user_id: i64) -> Result<user::Model>
where
    C: ConnectionTrait,
{
    get_user(conn, user_id)
        .await?
        .ok_or(Error::UserNotFound { user_id })
}

/// Finds a user by login name.
pub async fn find_user_by_username(
    db: &DatabaseConnection,
    username: &str,
) -> Result<Option<user::Model>> {
    User::find()
        .filter(user::Column::Username.eq(username))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Creates the admin account unless an admin already exists.
///
/// Returns the existing admin when there is one; the account details are not
/// re-applied to it.
#[instrument(skip(db, account), fields(username = %account.username))]
pub async fn ensure_admin(db: &DatabaseConnection, account: AdminAccount) -> Result<user::Model> {
    if let Some(existing) = User::find()
        .filter(user::Column::IsAdmin.eq(true))
        .order_by_asc(user::Column::Id)
        .one(db)
        .await?
    {
        return Ok(existing);
    }

    let admin = insert_user(
        db,
        NewUser {
            username: account.username,
            email: account.email,
            password_hash: account.password_hash,
            phone_number: account.phone_number,
        },
        true,
    )
    .await?;
    info!("Created admin account '{}'", admin.username);
    Ok(admin)
}

/// Lists regular users with their reservation counts, ordered by username.
pub async fn user_overviews(db: &DatabaseConnection) -> Result<Vec<UserOverview>> {
    let users = User::find()
        .filter(user::Column::IsAdmin.eq(false))
        .order_by_asc(user::Column::Username)
        .all(db)
        .await?;

    let mut overviews = Vec::with_capacity(users.len());
    for user in users {
        let total_reservations = Reservation::find()
            .filter(reservation::Column::UserId.eq(user.id))
            .count(db)
            .await?;
        let active_reservations = Reservation::find()
            .filter(reservation::Column::UserId.eq(user.id))
            .filter(reservation::Column::Status.eq(ReservationStatus::Active))
            .count(db)
            .await?;
        overviews.push(UserOverview {
            user,
            total_reservations,
            active_reservations,
        });
    }

    Ok(overviews)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::allocation;
    use crate::test_utils::*;

    fn admin_account() -> AdminAccount {
        AdminAccount {
            username: "admin".to_string(),
            email: "admin@parking.test".to_string(),
            password_hash: "admin-hash".to_string(),
            phone_number: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_find_user() -> Result<()> {
        let db = setup_test_db().await?;
        let created = create_test_user(&db, "alice").await?;
        assert!(!created.is_admin);
        assert!(created.is_active);

        let by_id = get_user(&db, created.id).await?.unwrap();
        assert_eq!(by_id.username, "alice");
        let by_name = find_user_by_username(&db, "alice").await?.unwrap();
        assert_eq!(by_name.id, created.id);

        assert!(find_user_by_username(&db, "bob").await?.is_none());
        assert!(matches!(
            require_user(&db, 999).await,
            Err(Error::UserNotFound { user_id: 999 })
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_create_user_validation_and_uniqueness() -> Result<()> {
        let db = setup_test_db().await?;
        create_test_user(&db, "alice").await?;

        let duplicate = create_test_user(&db, "alice").await;
        assert!(matches!(duplicate, Err(Error::InvalidInput { .. })));

        let blank = create_user(
            &db,
            NewUser {
                username: " ".to_string(),
                email: "blank@parking.test".to_string(),
                password_hash: "hash".to_string(),
                phone_number: None,
            },
        )
        .await;
        assert!(matches!(blank, Err(Error::InvalidInput { .. })));

        Ok(())
    }

    #[tokio::test]
    async fn test_ensure_admin_is_idempotent() -> Result<()> {
        let db = setup_test_db().await?;

        let first = ensure_admin(&db, admin_account()).await?;
        assert!(first.is_admin);

        let mut other = admin_account();
        other.username = "second_admin".to_string();
        let second = ensure_admin(&db, other).await?;
        assert_eq!(second.id, first.id);
        assert_eq!(second.username, "admin");

        Ok(())
    }

    #[tokio::test]
    async fn test_user_overviews_count_reservations() -> Result<()> {
        let (db, lot, user) = setup_with_lot_and_user(3).await?;
        ensure_admin(&db, admin_account()).await?;
        let idle = create_test_user(&db, "idle").await?;

        let booking = allocation::book_spot(&db, lot.id, user.id, None).await?;
        allocation::release_spot(&db, booking.reservation.id, user.id).await?;
        allocation::book_spot(&db, lot.id, user.id, None).await?;

        let overviews = user_overviews(&db).await?;
        assert_eq!(overviews.len(), 2);

        let busy = overviews.iter().find(|o| o.user.id == user.id).unwrap();
        assert_eq!(busy.total_reservations, 2);
        assert_eq!(busy.active_reservations, 1);

        let quiet = overviews.iter().find(|o| o.user.id == idle.id).unwrap();
        assert_eq!(quiet.total_reservations, 0);
        assert_eq!(quiet.active_reservations, 0);

        Ok(())
    }
}
