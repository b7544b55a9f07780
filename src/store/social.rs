use rusqlite::params;

use crate::models::{Article, Profile};

use super::articles::article_id_by_slug;
use super::users::user_by_username;
use super::{Store, StoreError, StoreResult};

impl Store {
    /// Follow a user by username. Idempotent: following an already-followed
    /// user succeeds without creating a duplicate row. Self-follow is
    /// rejected before touching storage.
    pub fn follow(&self, follower_id: i64, username: &str) -> StoreResult<Profile> {
        let conn = self.conn.lock().unwrap();
        let target = user_by_username(&conn, username)?;
        if target.id == follower_id {
            return Err(StoreError::Validation("cannot follow yourself".to_string()));
        }

        conn.execute(
            "INSERT OR IGNORE INTO follows (follower_id, following_id) VALUES (?1, ?2)",
            params![follower_id, target.id],
        )?;
        Ok(target.to_profile(true))
    }

    /// Unfollow a user by username. Removing a relationship that does not
    /// exist is a silent no-op.
    pub fn unfollow(&self, follower_id: i64, username: &str) -> StoreResult<Profile> {
        let conn = self.conn.lock().unwrap();
        let target = user_by_username(&conn, username)?;

        conn.execute(
            "DELETE FROM follows WHERE follower_id = ?1 AND following_id = ?2",
            params![follower_id, target.id],
        )?;
        Ok(target.to_profile(false))
    }

    /// Favorite an article by slug and return the re-read, post-mutation
    /// view, so the favorite flag and count always reflect committed state.
    pub fn favorite(&self, user_id: i64, slug: &str) -> StoreResult<Article> {
        let conn = self.conn.lock().unwrap();
        let article_id = article_id_by_slug(&conn, slug)?;

        conn.execute(
            "INSERT OR IGNORE INTO favorites (user_id, article_id) VALUES (?1, ?2)",
            params![user_id, article_id],
        )?;
        drop(conn);
        self.get_article(slug, Some(user_id))
    }

    /// Unfavorite an article by slug; a no-op when the article was never
    /// favorited. Returns the re-read view like `favorite`.
    pub fn unfavorite(&self, user_id: i64, slug: &str) -> StoreResult<Article> {
        let conn = self.conn.lock().unwrap();
        let article_id = article_id_by_slug(&conn, slug)?;

        conn.execute(
            "DELETE FROM favorites WHERE user_id = ?1 AND article_id = ?2",
            params![user_id, article_id],
        )?;
        drop(conn);
        self.get_article(slug, Some(user_id))
    }
}
