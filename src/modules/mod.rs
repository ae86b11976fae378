//! Route groups (blueprints)
//!
//! Each group is a named router mounted under a URL prefix. The application
//! registers the five groups below by default:
//!
//! | name       | prefix      |
//! |------------|-------------|
//! | `blog`     | `/`         |
//! | `passport` | `/passport` |
//! | `profile`  | `/user`     |
//! | `admin`    | `/admin`    |
//! | `api`      | `/api`      |

pub mod admin;
pub mod api;
pub mod blog;
pub mod passport;
pub mod profile;

use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::api::AppState;

/// A named router mounted under a URL prefix
pub struct Blueprint {
    pub name: String,
    pub url_prefix: String,
    pub router: Router<AppState>,
}

impl std::fmt::Debug for Blueprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blueprint")
            .field("name", &self.name)
            .field("url_prefix", &self.url_prefix)
            .finish_non_exhaustive()
    }
}

impl Blueprint {
    pub fn new(
        name: impl Into<String>,
        url_prefix: impl Into<String>,
        router: Router<AppState>,
    ) -> Self {
        Self {
            name: name.into(),
            url_prefix: url_prefix.into(),
            router,
        }
    }

    /// Prefix in the form axum nests at: `""` for the root, otherwise a
    /// leading slash and no trailing slash
    pub fn mount_path(&self) -> String {
        let trimmed = self.url_prefix.trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{}", trimmed)
        }
    }
}

/// The route groups every application starts with
pub fn default_blueprints() -> Vec<Blueprint> {
    vec![
        blog::blueprint(),
        passport::blueprint(),
        profile::blueprint(),
        admin::blueprint(),
        api::blueprint(),
    ]
}

/// Body of a group's index route
#[derive(Debug, Serialize)]
pub struct BlueprintInfo {
    pub blueprint: &'static str,
    pub url_prefix: &'static str,
}

/// Router with a single index route describing the group
pub(crate) fn descriptor_router(name: &'static str, url_prefix: &'static str) -> Router<AppState> {
    Router::new().route(
        "/",
        get(move || async move {
            Json(BlueprintInfo {
                blueprint: name,
                url_prefix,
            })
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_path_normalization() {
        let cases = [
            ("/", ""),
            ("", ""),
            ("/passport", "/passport"),
            ("passport/", "/passport"),
            ("/user/", "/user"),
        ];
        for (prefix, expected) in cases {
            let bp = Blueprint::new("x", prefix, Router::new());
            assert_eq!(bp.mount_path(), expected, "{prefix}");
        }
    }

    #[test]
    fn test_default_blueprints() {
        let names: Vec<(String, String)> = default_blueprints()
            .into_iter()
            .map(|bp| (bp.name, bp.url_prefix))
            .collect();
        assert_eq!(
            names,
            vec![
                ("blog".to_string(), "/".to_string()),
                ("passport".to_string(), "/passport".to_string()),
                ("profile".to_string(), "/user".to_string()),
                ("admin".to_string(), "/admin".to_string()),
                ("api".to_string(), "/api".to_string()),
            ]
        );
    }
}
