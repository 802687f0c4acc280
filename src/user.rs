//! The user directory boundary.
//!
//! The engine only needs users as account owners and transfer receivers;
//! registration, approval, and authentication live elsewhere. Receivers are
//! resolved by CRN (Customer Reference Number) or email.

use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Alias for the id of a user row.
pub type UserId = i64;

/// A bank customer (or the internal bank identity that owns the clearing
/// account).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// The id of the user row.
    pub id: UserId,
    /// Business-level customer reference number, unique.
    pub crn: String,
    /// The user's email address, unique.
    pub email: String,
    /// The user's first name.
    pub first_name: String,
    /// The user's last name.
    pub last_name: String,
}

impl User {
    /// The user's full name as used for receiver verification.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
    }
}

/// The fields required to create a user row.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Business-level customer reference number, unique.
    pub crn: String,
    /// The user's email address, unique.
    pub email: String,
    /// The user's first name.
    pub first_name: String,
    /// The user's last name.
    pub last_name: String,
}

/// Create the user table.
///
/// # Errors
/// Returns an error if there is an SQL error.
pub fn create_user_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS user (
            id INTEGER PRIMARY KEY,
            crn TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL
        )",
        (),
    )?;

    Ok(())
}

pub(crate) fn map_row_to_user(row: &Row) -> Result<User, rusqlite::Error> {
    Ok(User {
        id: row.get(0)?,
        crn: row.get(1)?,
        email: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
    })
}

/// Create a user row.
///
/// # Errors
/// Returns an [Error::SqlError] if the CRN or email already exists or there
/// is some other SQL error.
pub fn create_user(connection: &Connection, new_user: &NewUser) -> Result<User, Error> {
    let user = connection
        .prepare(
            "INSERT INTO user (crn, email, first_name, last_name)
             VALUES (?1, ?2, ?3, ?4)
             RETURNING id, crn, email, first_name, last_name",
        )?
        .query_row(
            (
                &new_user.crn,
                &new_user.email,
                &new_user.first_name,
                &new_user.last_name,
            ),
            map_row_to_user,
        )?;

    Ok(user)
}

/// Retrieve a user by its row id.
///
/// # Errors
/// Returns [Error::NotFound] if `id` does not refer to a user, or
/// [Error::SqlError] for other SQL errors.
pub fn get_user_by_id(connection: &Connection, id: UserId) -> Result<User, Error> {
    let user = connection
        .prepare("SELECT id, crn, email, first_name, last_name FROM user WHERE id = :id")?
        .query_row(&[(":id", &id)], map_row_to_user)?;

    Ok(user)
}

/// Look up a user by CRN; `None` when no such user exists.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an SQL error.
pub fn get_user_by_crn(connection: &Connection, crn: &str) -> Result<Option<User>, Error> {
    let user = connection
        .prepare("SELECT id, crn, email, first_name, last_name FROM user WHERE crn = :crn")?
        .query_row(&[(":crn", &crn)], map_row_to_user)
        .optional()?;

    Ok(user)
}

/// Look up a user by email; `None` when no such user exists.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an SQL error.
pub fn get_user_by_email(connection: &Connection, email: &str) -> Result<Option<User>, Error> {
    let user = connection
        .prepare("SELECT id, crn, email, first_name, last_name FROM user WHERE email = :email")?
        .query_row(&[(":email", &email)], map_row_to_user)
        .optional()?;

    Ok(user)
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use super::{NewUser, create_user, create_user_table, get_user_by_crn, get_user_by_email};

    fn get_test_connection() -> Connection {
        let connection =
            Connection::open_in_memory().expect("Could not initialise in-memory SQLite database");
        create_user_table(&connection).expect("Could not create user table");
        connection
    }

    fn alice() -> NewUser {
        NewUser {
            crn: "CRN1".to_string(),
            email: "alice@test.com".to_string(),
            first_name: "Alice".to_string(),
            last_name: "Wonder".to_string(),
        }
    }

    #[test]
    fn create_and_look_up_by_crn_and_email() {
        let connection = get_test_connection();

        let created = create_user(&connection, &alice()).expect("Could not create user");

        let by_crn = get_user_by_crn(&connection, "CRN1")
            .expect("Could not query by CRN")
            .expect("User not found by CRN");
        assert_eq!(by_crn, created);

        let by_email = get_user_by_email(&connection, "alice@test.com")
            .expect("Could not query by email")
            .expect("User not found by email");
        assert_eq!(by_email, created);
    }

    #[test]
    fn missing_user_returns_none() {
        let connection = get_test_connection();

        assert_eq!(Ok(None), get_user_by_crn(&connection, "CRN404"));
        assert_eq!(Ok(None), get_user_by_email(&connection, "ghost@test.com"));
    }

    #[test]
    fn full_name_trims_component_whitespace() {
        let user = super::User {
            id: 1,
            crn: "CRN1".to_string(),
            email: "alice@test.com".to_string(),
            first_name: " Alice ".to_string(),
            last_name: " Wonder ".to_string(),
        };

        assert_eq!(user.full_name(), "Alice Wonder");
    }
}
