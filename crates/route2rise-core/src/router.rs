//! Route table and navigation.
//!
//! `/login` is public. Everything else is gated: unauthenticated visitors
//! are sent to `/login`, authenticated ones see the dashboard or leads view,
//! and `/` or any unknown path lands on `/dashboard`.

use serde::Serialize;
use tracing::debug;

use crate::auth::AuthSnapshot;

pub const LOGIN_PATH: &str = "/login";
pub const DASHBOARD_PATH: &str = "/dashboard";
pub const LEADS_PATH: &str = "/leads";

/// Redirect chains longer than this indicate a broken route table.
const MAX_REDIRECTS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum View {
    /// Placeholder shown until the first auth check settles.
    Loading,
    Login,
    Dashboard,
    Leads,
}

impl View {
    /// Whether the view is part of the protected application shell.
    pub fn is_protected(&self) -> bool {
        matches!(self, View::Dashboard | View::Leads)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Render(View),
    /// Replace the current location with this path.
    Redirect(&'static str),
}

/// Strip the query, fragment, and trailing slashes so `/leads/?page=2`
/// matches `/leads`.
fn normalize(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

/// Decide what `path` shows for the given auth state.
pub fn resolve(path: &str, auth: &AuthSnapshot) -> Resolution {
    if auth.loading {
        return Resolution::Render(View::Loading);
    }

    let path = normalize(path);
    if path == LOGIN_PATH {
        return Resolution::Render(View::Login);
    }
    if !auth.authenticated() {
        return Resolution::Redirect(LOGIN_PATH);
    }

    match path {
        DASHBOARD_PATH => Resolution::Render(View::Dashboard),
        LEADS_PATH => Resolution::Render(View::Leads),
        _ => Resolution::Redirect(DASHBOARD_PATH),
    }
}

/// Current location with replace-style navigation.
#[derive(Debug, Clone)]
pub struct Navigator {
    location: String,
    view: View,
}

impl Navigator {
    pub fn new(path: &str, auth: &AuthSnapshot) -> Self {
        let mut navigator = Self {
            location: path.to_string(),
            view: View::Loading,
        };
        navigator.navigate(path, auth);
        navigator
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn view(&self) -> View {
        self.view
    }

    /// Go to `path`, following redirects until a view renders.
    pub fn navigate(&mut self, path: &str, auth: &AuthSnapshot) -> View {
        let mut target = path.to_string();
        for _ in 0..MAX_REDIRECTS {
            match resolve(&target, auth) {
                Resolution::Render(view) => {
                    debug!(location = %target, ?view, "Rendered");
                    self.location = target;
                    self.view = view;
                    return view;
                }
                Resolution::Redirect(next) => {
                    debug!(from = %target, to = next, "Redirect");
                    target = next.to_string();
                }
            }
        }
        // Unreachable with the route table above: every redirect target
        // renders for the state that produced it.
        self.location = target;
        self.view
    }

    /// Re-resolve the current location after the auth state changed.
    /// Returns the view now shown.
    pub fn sync(&mut self, auth: &AuthSnapshot) -> View {
        let location = self.location.clone();
        self.navigate(&location, auth)
    }
}
