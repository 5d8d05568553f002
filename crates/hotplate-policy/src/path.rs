use hotplate_core::{DocPath, Uid};

use crate::error::{PolicyError, PolicyResult};
use crate::types::{NodeKind, SECRET_DOCUMENT_IDS};

/// What a document path addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathKind {
    Page,
    Widget,
    SubItem,
    MessageEntry,
    SignupSheet,
    SignupEntry,
    Settings,
    PrivateSettings,
    Theme,
    Documentation,
    Secret(String),
    AdminRoster(Uid),
    WebmasterRoster(Uid),
    Profile(Uid),
}

impl PathKind {
    pub fn node_kind(&self) -> NodeKind {
        match self {
            PathKind::Page => NodeKind::Page,
            PathKind::Widget => NodeKind::Widget,
            PathKind::SubItem => NodeKind::SubItem,
            PathKind::MessageEntry => NodeKind::MessageEntry,
            PathKind::SignupSheet => NodeKind::SignupSheet,
            PathKind::SignupEntry => NodeKind::SignupEntry,
            PathKind::Settings => NodeKind::Settings,
            PathKind::PrivateSettings => NodeKind::PrivateSettings,
            PathKind::Theme => NodeKind::Theme,
            PathKind::Documentation => NodeKind::Documentation,
            PathKind::Secret(_) => NodeKind::Secret,
            PathKind::AdminRoster(_) => NodeKind::AdminRoster,
            PathKind::WebmasterRoster(_) => NodeKind::WebmasterRoster,
            PathKind::Profile(_) => NodeKind::Profile,
        }
    }

    /// Whether the path lives under `pages/`.
    pub fn is_content(&self) -> bool {
        matches!(
            self,
            PathKind::Page
                | PathKind::Widget
                | PathKind::SubItem
                | PathKind::MessageEntry
                | PathKind::SignupSheet
                | PathKind::SignupEntry
        )
    }
}

/// Classify a document path by segment matching.
///
/// Unknown layouts are `PolicyError::InvalidPath`, never a denial.
pub fn classify(path: &DocPath) -> PolicyResult<PathKind> {
    let segs: Vec<&str> = path.segments().iter().map(String::as_str).collect();
    let invalid = || PolicyError::InvalidPath(path.to_string());

    match segs.as_slice() {
        ["pages", ..] => classify_content(&segs).ok_or_else(invalid),
        ["configuration", "settings"] => Ok(PathKind::Settings),
        ["configuration", "private-settings"] => Ok(PathKind::PrivateSettings),
        ["configuration", "theme"] => Ok(PathKind::Theme),
        ["configuration", "documentation"] => Ok(PathKind::Documentation),
        ["configuration", id] if SECRET_DOCUMENT_IDS.contains(id) => {
            Ok(PathKind::Secret(id.to_string()))
        }
        ["admins", uid] => Ok(PathKind::AdminRoster(Uid::new(*uid))),
        ["webmasters", uid] => Ok(PathKind::WebmasterRoster(Uid::new(*uid))),
        ["users", uid] => Ok(PathKind::Profile(Uid::new(*uid))),
        _ => Err(invalid()),
    }
}

fn classify_content(segs: &[&str]) -> Option<PathKind> {
    if segs.len() % 2 != 0 {
        return None;
    }
    match segs {
        ["pages", _] => Some(PathKind::Page),
        ["pages", _, "widgets", _] => Some(PathKind::Widget),
        ["pages", _, "widgets", _, "messages", _] => Some(PathKind::MessageEntry),
        ["pages", _, "widgets", _, "sheets", _] => Some(PathKind::SignupSheet),
        ["pages", _, "widgets", _, "sheets", _, "entries", _] => Some(PathKind::SignupEntry),
        ["pages", _, "widgets", _, "items", rest @ ..] => {
            // items nest arbitrarily: items/{i}/items/{j}/...
            let nested_ok = rest.iter().skip(1).step_by(2).all(|c| *c == "items");
            nested_ok.then_some(PathKind::SubItem)
        }
        _ => None,
    }
}
