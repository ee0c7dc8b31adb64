//! HTTP surface: the display endpoint the panels poll and a JSON
//! endpoint for debugging snapshots.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;

use crate::config::AppConfig;
use crate::render::{self, RenderConfig};
use crate::snapshot::{SnapshotStore, UserSnapshot};

/// Shared handler state.
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<SnapshotStore>,
    pub render: RenderConfig,
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/display/{user}", get(display))
        .route("/api/snapshot/{user}", get(api_snapshot))
        .with_state(state)
}

/// Resolve a user id to their current snapshot.
///
/// Unknown users are a 404; configured users whose first refresh has not
/// completed yet are a 503 so the panel retries instead of caching an
/// error image.
fn lookup(state: &AppState, user_id: &str) -> Result<Arc<UserSnapshot>, (StatusCode, &'static str)> {
    if !state.config.users.contains_key(user_id) {
        return Err((StatusCode::NOT_FOUND, "Unknown user\n"));
    }
    state
        .store
        .get(user_id)
        .ok_or((StatusCode::SERVICE_UNAVAILABLE, "Data not ready, retry shortly\n"))
}

/// `GET /display/{user}`: render the user's dashboard as a PNG.
async fn display(Path(user): Path<String>, State(state): State<Arc<AppState>>) -> Response {
    let snapshot = match lookup(&state, &user) {
        Ok(snapshot) => snapshot,
        Err(status) => return status.into_response(),
    };

    let now = Utc::now().with_timezone(&snapshot.timezone);
    let html = render::dashboard_html(&snapshot, now);

    match render::render_html_to_png(&html, &state.render).await {
        Ok(png) => ([(header::CONTENT_TYPE, "image/png")], png).into_response(),
        Err(err) => {
            tracing::error!(user = %user, "render failed: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, "Render failed\n").into_response()
        }
    }
}

/// `GET /api/snapshot/{user}`: the raw snapshot as JSON.
async fn api_snapshot(
    Path(user): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    match lookup(&state, &user) {
        Ok(snapshot) => Json((*snapshot).clone()).into_response(),
        Err(status) => status.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UserConfig;
    use chrono_tz::America::New_York;
    use std::collections::HashMap;
    use std::time::Duration;

    fn state_with_user(user_id: &str) -> AppState {
        let mut users = HashMap::new();
        users.insert(
            user_id.to_string(),
            UserConfig {
                weather_location: "New York".to_string(),
                timezone: New_York,
                caldav_urls: Vec::new(),
                calendar_filters: None,
            },
        );
        AppState {
            config: Arc::new(AppConfig {
                listen_addr: "127.0.0.1:5050".parse().unwrap(),
                refresh_interval: Duration::from_secs(600),
                render: RenderConfig::default(),
                users,
            }),
            store: Arc::new(SnapshotStore::new()),
            render: RenderConfig::default(),
        }
    }

    fn empty_snapshot() -> Arc<UserSnapshot> {
        Arc::new(UserSnapshot {
            weather: None,
            today: Vec::new(),
            tomorrow: Vec::new(),
            timezone: New_York,
            last_updated: Utc::now(),
        })
    }

    #[test]
    fn test_lookup_unknown_user_is_404() {
        let state = state_with_user("a1");
        let err = lookup(&state, "nobody").unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_lookup_before_first_refresh_is_503() {
        let state = state_with_user("a1");
        let err = lookup(&state, "a1").unwrap_err();
        assert_eq!(err.0, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_lookup_returns_published_snapshot() {
        let state = state_with_user("a1");
        let mut map = HashMap::new();
        map.insert("a1".to_string(), empty_snapshot());
        state.store.publish(map);

        assert!(lookup(&state, "a1").is_ok());
    }

    #[test]
    fn test_router_builds() {
        let state = state_with_user("a1");
        let _router = router(Arc::new(state));
    }
}
