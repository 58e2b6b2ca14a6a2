//! Path classification for the three page actions.
//!
//! Only `/{view|edit|save}/{id}` is accepted, where `id` is one or more ASCII
//! alphanumerics. Matching is case-sensitive, trailing slashes are not
//! normalized and nothing is percent-decoded.

use axum::routing::MethodFilter;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;

static VALID_PATH: OnceLock<Regex> = OnceLock::new();

fn valid_path() -> &'static Regex {
    VALID_PATH.get_or_init(|| {
        Regex::new(r"^/(edit|save|view)/([a-zA-Z0-9]+)$").expect("page path pattern is valid")
    })
}

/// The action addressed by a page URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    View,
    Edit,
    Save,
}

impl Action {
    pub const ALL: [Action; 3] = [Action::View, Action::Edit, Action::Save];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Edit => "edit",
            Action::Save => "save",
        }
    }

    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "view" => Some(Action::View),
            "edit" => Some(Action::Edit),
            "save" => Some(Action::Save),
            _ => None,
        }
    }

    /// Pattern registered with axum; the dispatcher re-validates the full path
    pub fn route_pattern(&self) -> &'static str {
        match self {
            Action::View => "/view/{*title}",
            Action::Edit => "/edit/{*title}",
            Action::Save => "/save/{*title}",
        }
    }

    /// HTTP methods accepted for this action
    pub fn methods(&self) -> MethodFilter {
        match self {
            Action::View => MethodFilter::GET,
            Action::Edit => MethodFilter::GET.or(MethodFilter::POST),
            Action::Save => MethodFilter::POST,
        }
    }

    /// Canonical path of this action for `title`
    pub fn path_for(&self, title: &str) -> String {
        format!("/{}/{}", self.as_str(), title)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a successful path match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub action: Action,
    pub resource_id: String,
}

impl RouteMatch {
    /// Path of `action` for the same resource
    pub fn redirect_to(&self, action: Action) -> String {
        action.path_for(&self.resource_id)
    }
}

/// Classify `path`, returning `None` for anything outside the grammar
pub fn match_path(path: &str) -> Option<RouteMatch> {
    let captures = valid_path().captures(path)?;
    let action = Action::from_segment(captures.get(1)?.as_str())?;
    let resource_id = captures.get(2)?.as_str().to_string();

    Some(RouteMatch {
        action,
        resource_id,
    })
}
