use serde::{Deserialize, Serialize};

/// Profile record returned by `GET /api/me/`.
///
/// Treated as opaque beyond the fields the admin surface displays;
/// unknown fields from the backend are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_staff: bool,
}
