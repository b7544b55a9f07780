use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User account: identity plus the free-form profile fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub bio: String,
    pub image: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Public profile view with the viewer-scoped follow flag.
    pub fn to_profile(&self, following: bool) -> Profile {
        Profile {
            username: self.username.clone(),
            bio: self.bio.clone(),
            image: self.image.clone(),
            following,
        }
    }
}

/// Public author view embedded in articles and returned by the social ops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub username: String,
    pub bio: String,
    pub image: String,
    pub following: bool,
}

/// Fully composed article: the stored row plus author profile, ordered tag
/// list and the viewer-scoped favorite/follow state. The derived fields are
/// recomputed from the link tables on every read, never cached in the row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub body: String,
    #[serde(skip_serializing)]
    pub author_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub favorited: bool,
    pub favorites_count: i64,
    pub tag_list: Vec<String>,
    pub author: Profile,
}

/// Payload for article creation. Tag names may repeat; empty names are
/// skipped.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewArticle {
    pub title: String,
    pub description: String,
    pub body: String,
    #[serde(default)]
    pub tag_list: Vec<String>,
}

/// Resolved field map for a partial article update. `None` (or an empty
/// string) leaves a field as-is. For the tag list, `None` keeps the existing
/// links while `Some(vec![])` clears them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticlePatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub body: Option<String>,
    pub tag_list: Option<Vec<String>>,
}

/// Resolved field map for a partial profile update; same conventions as
/// `ArticlePatch`. The password hash arrives pre-hashed from the auth layer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub bio: Option<String>,
    pub image: Option<String>,
}

/// Default page size for article listings.
pub const DEFAULT_LIMIT: i64 = 20;
/// Upper bound on the page size; larger requests fall back to the default.
pub const MAX_LIMIT: i64 = 100;

/// Listing filters, combinable with logical AND. Absent or empty strings
/// mean "no filter on this dimension".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArticleFilters {
    pub tag: Option<String>,
    pub author: Option<String>,
    pub favorited: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ArticleFilters {
    /// Resolve limit/offset: out-of-range values are silently replaced, not
    /// rejected.
    pub fn page(&self) -> (i64, i64) {
        let limit = match self.limit {
            Some(limit) if limit > 0 && limit <= MAX_LIMIT => limit,
            _ => DEFAULT_LIMIT,
        };
        let offset = match self.offset {
            Some(offset) if offset >= 0 => offset,
            _ => 0,
        };
        (limit, offset)
    }
}
