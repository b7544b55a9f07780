use chrono::Utc;
use rusqlite::{params, Connection, ToSql};

use crate::models::{Profile, User, UserPatch};

use super::{map_constraint, parse_datetime, Store, StoreError, StoreResult};

impl Store {
    /// Insert a registration row. Assigns the new id and timestamps on the
    /// way in; the password hash is opaque to the store.
    pub fn create_user(&self, user: &mut User) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        user.created_at = now;
        user.updated_at = now;

        conn.execute(
            r#"INSERT INTO users (username, email, password_hash, bio, image, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            params![
                &user.username,
                &user.email,
                &user.password_hash,
                &user.bio,
                &user.image,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )
        .map_err(|e| map_constraint(e, "username or email"))?;
        user.id = conn.last_insert_rowid();
        Ok(())
    }

    pub fn get_user(&self, id: i64) -> StoreResult<User> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM users WHERE id = ?1", params![id], row_to_user)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    StoreError::NotFound(format!("user {}", id))
                }
                _ => StoreError::Database(e),
            })
    }

    pub fn get_user_by_username(&self, username: &str) -> StoreResult<User> {
        let conn = self.conn.lock().unwrap();
        user_by_username(&conn, username)
    }

    /// Apply a partial profile update. Only present, non-empty fields are
    /// written; duplicate username/email surfaces as a conflict.
    pub fn update_user(&self, id: i64, patch: &UserPatch) -> StoreResult<User> {
        {
            let conn = self.conn.lock().unwrap();

            let mut sets: Vec<&'static str> = Vec::new();
            let mut set_params: Vec<Box<dyn ToSql>> = Vec::new();
            for (clause, value) in [
                ("username = ?", &patch.username),
                ("email = ?", &patch.email),
                ("password_hash = ?", &patch.password_hash),
                ("bio = ?", &patch.bio),
                ("image = ?", &patch.image),
            ] {
                if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                    sets.push(clause);
                    set_params.push(Box::new(value.to_string()));
                }
            }

            if !sets.is_empty() {
                sets.push("updated_at = ?");
                set_params.push(Box::new(Utc::now().to_rfc3339()));
                set_params.push(Box::new(id));

                let sql = format!("UPDATE users SET {} WHERE id = ?", sets.join(", "));
                let refs: Vec<&dyn ToSql> = set_params.iter().map(|p| p.as_ref()).collect();
                let rows = conn
                    .execute(&sql, &refs[..])
                    .map_err(|e| map_constraint(e, "username or email"))?;
                if rows == 0 {
                    return Err(StoreError::NotFound(format!("user {}", id)));
                }
            }
        }
        self.get_user(id)
    }

    /// Profile view of a user: follow status is false for anonymous viewers
    /// and for the user looking at themselves.
    pub fn get_profile(&self, username: &str, viewer: Option<i64>) -> StoreResult<Profile> {
        let conn = self.conn.lock().unwrap();
        let user = user_by_username(&conn, username)?;
        let following = match viewer {
            Some(viewer_id) if viewer_id > 0 && viewer_id != user.id => {
                follow_exists(&conn, viewer_id, user.id)?
            }
            _ => false,
        };
        Ok(user.to_profile(following))
    }
}

pub(crate) fn user_by_username(conn: &Connection, username: &str) -> StoreResult<User> {
    conn.query_row(
        "SELECT * FROM users WHERE username = ?1",
        params![username],
        row_to_user,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(format!("user {}", username)),
        _ => StoreError::Database(e),
    })
}

pub(crate) fn follow_exists(
    conn: &Connection,
    follower_id: i64,
    following_id: i64,
) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM follows WHERE follower_id = ?1 AND following_id = ?2",
        params![follower_id, following_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        username: row.get("username")?,
        email: row.get("email")?,
        password_hash: row.get("password_hash")?,
        bio: row.get("bio")?,
        image: row.get("image")?,
        created_at: parse_datetime(row.get::<_, String>("created_at")?),
        updated_at: parse_datetime(row.get::<_, String>("updated_at")?),
    })
}
