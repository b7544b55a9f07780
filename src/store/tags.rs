use rusqlite::{params, Connection, OptionalExtension};

use super::{map_constraint, Store, StoreResult};

impl Store {
    /// Full tag vocabulary, sorted ascending. Tags are created lazily on
    /// first use and never deleted, even when no article links remain.
    pub fn list_tags(&self) -> StoreResult<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT name FROM tags ORDER BY name ASC")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }
}

/// Get-or-create a tag id by case-insensitive name. Runs on the caller's
/// write transaction so a rolled-back article write never leaves links
/// behind. A concurrent insert of the same name is decided by the unique
/// index; the loser sees a conflict.
pub(crate) fn resolve_tag(conn: &Connection, name: &str) -> StoreResult<i64> {
    let existing: Option<i64> = conn
        .query_row("SELECT id FROM tags WHERE name = ?1", params![name], |row| {
            row.get(0)
        })
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }

    conn.execute("INSERT INTO tags (name) VALUES (?1)", params![name])
        .map_err(|e| map_constraint(e, "tag name"))?;
    Ok(conn.last_insert_rowid())
}
