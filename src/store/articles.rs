use chrono::Utc;
use rusqlite::{params, Connection, ToSql};

use crate::models::{Article, ArticleFilters, ArticlePatch, NewArticle, Profile};
use crate::slug;

use super::users::follow_exists;
use super::{map_constraint, parse_datetime, tags, Store, StoreError, StoreResult};

/// Shared projection for article reads: the row joined with its author plus
/// the viewer-scoped favorite flag and the live favorites count, both
/// recomputed from the link table. First bound parameter is the viewer id
/// (0 for anonymous).
const ARTICLE_SELECT: &str = "SELECT DISTINCT \
     a.id, a.slug, a.title, a.description, a.body, a.author_id, \
     a.created_at, a.updated_at, \
     u.username, u.bio, u.image, \
     (SELECT COUNT(*) FROM favorites f WHERE f.article_id = a.id AND f.user_id = ?) > 0 AS favorited, \
     (SELECT COUNT(*) FROM favorites f WHERE f.article_id = a.id) AS favorites_count \
     FROM articles a \
     JOIN users u ON u.id = a.author_id";

// ==================== Write Transaction ====================

impl Store {
    /// Create an article with its tag links in one transaction: unique slug,
    /// article insert, tag get-or-create plus link per distinct name, then a
    /// full read-composition with the author as viewer.
    pub fn create_article(&self, author_id: i64, draft: &NewArticle) -> StoreResult<Article> {
        let slug;
        {
            let mut conn = self.conn.lock().unwrap();
            slug = slug::generate_unique_slug(&draft.title, |s| {
                slug_in_use(&conn, s, None).unwrap_or(false)
            });

            let now = Utc::now().to_rfc3339();
            let tx = conn.transaction()?;
            tx.execute(
                r#"INSERT INTO articles (slug, title, description, body, author_id, created_at, updated_at)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
                params![
                    &slug,
                    &draft.title,
                    &draft.description,
                    &draft.body,
                    author_id,
                    &now,
                    &now,
                ],
            )
            .map_err(|e| map_constraint(e, "article slug"))?;
            let article_id = tx.last_insert_rowid();

            link_tags(&tx, article_id, &draft.tag_list)?;
            tx.commit()?;
        }
        self.get_article(&slug, Some(author_id))
    }

    /// Apply a partial update. Ownership has already been verified by the
    /// caller. A changed title regenerates the slug (the article's own slug
    /// is allowed to pass the probe); a supplied tag list replaces the whole
    /// link set, an omitted one leaves it untouched.
    pub fn update_article(
        &self,
        slug: &str,
        author_id: i64,
        patch: &ArticlePatch,
    ) -> StoreResult<Article> {
        let new_slug;
        {
            let mut conn = self.conn.lock().unwrap();
            let (article_id, current_title): (i64, String) = conn
                .query_row(
                    "SELECT id, title FROM articles WHERE slug = ?1",
                    params![slug],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .map_err(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => {
                        StoreError::NotFound(format!("article {}", slug))
                    }
                    _ => StoreError::Database(e),
                })?;

            let mut sets: Vec<&'static str> = Vec::new();
            let mut set_params: Vec<Box<dyn ToSql>> = Vec::new();

            new_slug = match patch.title.as_deref() {
                Some(title) if !title.is_empty() && title != current_title => {
                    let regenerated = slug::generate_unique_slug(title, |s| {
                        slug_in_use(&conn, s, Some(article_id)).unwrap_or(false)
                    });
                    sets.push("title = ?");
                    set_params.push(Box::new(title.to_string()));
                    sets.push("slug = ?");
                    set_params.push(Box::new(regenerated.clone()));
                    regenerated
                }
                _ => slug.to_string(),
            };
            if let Some(description) = patch.description.as_deref().filter(|d| !d.is_empty()) {
                sets.push("description = ?");
                set_params.push(Box::new(description.to_string()));
            }
            if let Some(body) = patch.body.as_deref().filter(|b| !b.is_empty()) {
                sets.push("body = ?");
                set_params.push(Box::new(body.to_string()));
            }

            let tx = conn.transaction()?;
            if !sets.is_empty() {
                sets.push("updated_at = ?");
                set_params.push(Box::new(Utc::now().to_rfc3339()));
                set_params.push(Box::new(article_id));

                let sql = format!("UPDATE articles SET {} WHERE id = ?", sets.join(", "));
                let refs: Vec<&dyn ToSql> = set_params.iter().map(|p| p.as_ref()).collect();
                tx.execute(&sql, &refs[..])
                    .map_err(|e| map_constraint(e, "article slug"))?;
            }

            if let Some(tag_list) = &patch.tag_list {
                log::debug!("replacing tag set of article {}", article_id);
                tx.execute(
                    "DELETE FROM article_tags WHERE article_id = ?1",
                    params![article_id],
                )?;
                link_tags(&tx, article_id, tag_list)?;
                if sets.is_empty() {
                    tx.execute(
                        "UPDATE articles SET updated_at = ?1 WHERE id = ?2",
                        params![Utc::now().to_rfc3339(), article_id],
                    )?;
                }
            }
            tx.commit()?;
        }
        self.get_article(&new_slug, Some(author_id))
    }

    /// Delete an article. Tag links and favorites go with it via cascades;
    /// tag rows stay. Ownership is the caller's check, via `article_author`.
    pub fn delete_article(&self, slug: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute("DELETE FROM articles WHERE slug = ?1", params![slug])?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("article {}", slug)));
        }
        Ok(())
    }

    /// Author id of an article, for the authorization layer's ownership
    /// check ahead of update/delete.
    pub fn article_author(&self, slug: &str) -> StoreResult<i64> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT author_id FROM articles WHERE slug = ?1",
            params![slug],
            |row| row.get(0),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                StoreError::NotFound(format!("article {}", slug))
            }
            _ => StoreError::Database(e),
        })
    }
}

// ==================== Read Composer ====================

impl Store {
    /// Fetch one article with author profile, ordered tags and the
    /// viewer-scoped favorite/follow state. `None` viewer means anonymous.
    pub fn get_article(&self, slug: &str, viewer: Option<i64>) -> StoreResult<Article> {
        let conn = self.conn.lock().unwrap();
        let viewer_id = viewer.unwrap_or(0);

        let sql = format!("{} WHERE a.slug = ?", ARTICLE_SELECT);
        let mut article = conn
            .query_row(&sql, params![viewer_id, slug], row_to_article)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    StoreError::NotFound(format!("article {}", slug))
                }
                _ => StoreError::Database(e),
            })?;
        enrich_article(&conn, &mut article, viewer_id, None)?;
        Ok(article)
    }

    /// Filtered, paginated listing, newest first. Filters combine with AND;
    /// the count query runs over the same predicate without pagination, so
    /// every page reports the same total.
    pub fn list_articles(
        &self,
        filters: &ArticleFilters,
        viewer: Option<i64>,
    ) -> StoreResult<(Vec<Article>, i64)> {
        let conn = self.conn.lock().unwrap();
        let viewer_id = viewer.unwrap_or(0);
        let (limit, offset) = filters.page();

        // Fold present filters into join + predicate + parameter triples;
        // values are always bound, never spliced into the SQL.
        let mut joins = String::new();
        let mut conds: Vec<&'static str> = Vec::new();
        let mut filter_params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(tag) = filters.tag.as_deref().filter(|s| !s.is_empty()) {
            joins.push_str(
                " JOIN article_tags at ON at.article_id = a.id JOIN tags t ON t.id = at.tag_id",
            );
            conds.push("t.name = ?");
            filter_params.push(Box::new(tag.to_string()));
        }
        if let Some(author) = filters.author.as_deref().filter(|s| !s.is_empty()) {
            conds.push("u.username = ?");
            filter_params.push(Box::new(author.to_string()));
        }
        if let Some(favorited) = filters.favorited.as_deref().filter(|s| !s.is_empty()) {
            joins.push_str(
                " JOIN favorites fav ON fav.article_id = a.id JOIN users fav_user ON fav_user.id = fav.user_id",
            );
            conds.push("fav_user.username = ?");
            filter_params.push(Box::new(favorited.to_string()));
        }

        let where_clause = if conds.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conds.join(" AND "))
        };

        let count_sql = format!(
            "SELECT COUNT(DISTINCT a.id) FROM articles a JOIN users u ON u.id = a.author_id{}{}",
            joins, where_clause
        );
        let count_refs: Vec<&dyn ToSql> = filter_params.iter().map(|p| p.as_ref()).collect();
        let total: i64 = conn.query_row(&count_sql, &count_refs[..], |row| row.get(0))?;

        let data_sql = format!(
            "{}{}{} ORDER BY a.created_at DESC, a.id DESC LIMIT ? OFFSET ?",
            ARTICLE_SELECT, joins, where_clause
        );
        let mut data_params: Vec<Box<dyn ToSql>> = Vec::with_capacity(filter_params.len() + 3);
        data_params.push(Box::new(viewer_id));
        data_params.extend(filter_params);
        data_params.push(Box::new(limit));
        data_params.push(Box::new(offset));
        let data_refs: Vec<&dyn ToSql> = data_params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&data_sql)?;
        let rows = stmt.query_map(&data_refs[..], row_to_article)?;
        let mut articles = Vec::new();
        for row in rows {
            articles.push(row?);
        }
        drop(stmt);

        for article in &mut articles {
            enrich_article(&conn, article, viewer_id, None)?;
        }
        Ok((articles, total))
    }

    /// Personalized feed: articles by authors the viewer follows, same
    /// pagination and enrichment rules as the filtered listing. `following`
    /// is true for every row by definition.
    pub fn get_feed(
        &self,
        viewer_id: i64,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> StoreResult<(Vec<Article>, i64)> {
        let conn = self.conn.lock().unwrap();
        let (limit, offset) = ArticleFilters {
            limit,
            offset,
            ..Default::default()
        }
        .page();

        let total: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT a.id) FROM articles a \
             JOIN follows fw ON fw.following_id = a.author_id \
             WHERE fw.follower_id = ?",
            params![viewer_id],
            |row| row.get(0),
        )?;

        let data_sql = format!(
            "{} JOIN follows fw ON fw.following_id = a.author_id \
             WHERE fw.follower_id = ? \
             ORDER BY a.created_at DESC, a.id DESC LIMIT ? OFFSET ?",
            ARTICLE_SELECT
        );
        let mut stmt = conn.prepare(&data_sql)?;
        let rows = stmt.query_map(params![viewer_id, viewer_id, limit, offset], row_to_article)?;
        let mut articles = Vec::new();
        for row in rows {
            articles.push(row?);
        }
        drop(stmt);

        for article in &mut articles {
            enrich_article(&conn, article, viewer_id, Some(true))?;
        }
        Ok((articles, total))
    }
}

// ==================== Helpers ====================

/// Resolve and link every non-empty tag name; duplicates in the input
/// collapse on the link table's composite key.
fn link_tags(conn: &Connection, article_id: i64, names: &[String]) -> StoreResult<()> {
    for name in names {
        if name.is_empty() {
            continue;
        }
        let tag_id = tags::resolve_tag(conn, name)?;
        conn.execute(
            "INSERT OR IGNORE INTO article_tags (article_id, tag_id) VALUES (?1, ?2)",
            params![article_id, tag_id],
        )?;
    }
    Ok(())
}

pub(crate) fn slug_in_use(
    conn: &Connection,
    slug: &str,
    exclude_id: Option<i64>,
) -> rusqlite::Result<bool> {
    let count: i64 = match exclude_id {
        Some(id) => conn.query_row(
            "SELECT COUNT(*) FROM articles WHERE slug = ?1 AND id <> ?2",
            params![slug, id],
            |row| row.get(0),
        )?,
        None => conn.query_row(
            "SELECT COUNT(*) FROM articles WHERE slug = ?1",
            params![slug],
            |row| row.get(0),
        )?,
    };
    Ok(count > 0)
}

pub(crate) fn article_id_by_slug(conn: &Connection, slug: &str) -> StoreResult<i64> {
    conn.query_row(
        "SELECT id FROM articles WHERE slug = ?1",
        params![slug],
        |row| row.get(0),
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(format!("article {}", slug)),
        _ => StoreError::Database(e),
    })
}

fn row_to_article(row: &rusqlite::Row) -> rusqlite::Result<Article> {
    Ok(Article {
        id: row.get("id")?,
        slug: row.get("slug")?,
        title: row.get("title")?,
        description: row.get("description")?,
        body: row.get("body")?,
        author_id: row.get("author_id")?,
        created_at: parse_datetime(row.get::<_, String>("created_at")?),
        updated_at: parse_datetime(row.get::<_, String>("updated_at")?),
        favorited: row.get("favorited")?,
        favorites_count: row.get("favorites_count")?,
        tag_list: Vec::new(),
        author: Profile {
            username: row.get("username")?,
            bio: row.get("bio")?,
            image: row.get("image")?,
            following: false,
        },
    })
}

/// Fill in the per-row pieces the projection can't carry: the ordered tag
/// list and the follow status (overridden to a fixed value for the feed).
fn enrich_article(
    conn: &Connection,
    article: &mut Article,
    viewer_id: i64,
    following_override: Option<bool>,
) -> rusqlite::Result<()> {
    article.author.following = match following_override {
        Some(following) => following,
        None if viewer_id > 0 && viewer_id != article.author_id => {
            follow_exists(conn, viewer_id, article.author_id)?
        }
        None => false,
    };

    let mut stmt = conn.prepare(
        "SELECT t.name FROM tags t \
         JOIN article_tags at ON at.tag_id = t.id \
         WHERE at.article_id = ?1 \
         ORDER BY t.name ASC",
    )?;
    let rows = stmt.query_map(params![article.id], |row| row.get::<_, String>(0))?;
    let mut tag_list = Vec::new();
    for name in rows {
        tag_list.push(name?);
    }
    article.tag_list = tag_list;
    Ok(())
}
