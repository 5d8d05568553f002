use hotplate_core::Document;
use std::collections::BTreeSet;

use crate::types::NodeKind;

// ---------------------------------------------------------------------------
// Field allow-lists
//
// The allow-list is the only enforced contract on document shape: values
// are not type-checked, and unknown keys reject for every actor.
// ---------------------------------------------------------------------------

const PAGE_FIELDS: &[&str] = &["dbPath", "id", "index", "name", "permissions"];
const WIDGET_FIELDS: &[&str] = &["component", "data", "hidden", "index", "kind", "props"];
const SUB_ITEM_FIELDS: &[&str] = &["content", "data", "hidden", "id", "index"];
const MESSAGE_ENTRY_FIELDS: &[&str] = &[
    "comments",
    "content",
    "createdAt",
    "date",
    "files",
    "id",
    "img",
    "name",
    "uid",
];
const SIGNUP_SHEET_FIELDS: &[&str] = &[
    "created", "enabled", "header", "hidden", "id", "multiple", "roles", "text", "times",
    "useCard",
];
const SIGNUP_ENTRY_FIELDS: &[&str] = &[
    "comments", "email", "key", "name", "role", "shift", "time", "uid",
];
const SETTINGS_FIELDS: &[&str] = &[
    "calEdit",
    "calID",
    "calURL",
    "calView",
    "controlledAuth",
    "defaultPage",
    "email",
    "footerTxt",
    "mailURL",
    "useCalendar",
    "useEmail",
];
const PRIVATE_SETTINGS_FIELDS: &[&str] =
    &["addresses", "consoleURL", "linkHidden", "meetLink", "useMeeting"];
const THEME_FIELDS: &[&str] = &["dark", "light"];
const ROSTER_FIELDS: &[&str] = &["email", "name", "uid"];
const PROFILE_FIELDS: &[&str] = &[
    "address",
    "authorized",
    "bio",
    "contact",
    "disabled",
    "displayName",
    "email",
    "permissions",
    "phone",
    "photoURL",
    "rank",
    "type",
];
const SECRET_FIELDS: &[&str] = &["password"];

/// Profile fields the owner may never change.
pub const PROFILE_RESTRICTED_FIELDS: &[&str] = &["permissions", "disabled", "authorized", "email"];

/// Top-level keys a document of `kind` may carry.
pub fn allowed_fields(kind: NodeKind) -> &'static [&'static str] {
    match kind {
        NodeKind::Page => PAGE_FIELDS,
        NodeKind::Widget => WIDGET_FIELDS,
        NodeKind::SubItem => SUB_ITEM_FIELDS,
        NodeKind::MessageEntry => MESSAGE_ENTRY_FIELDS,
        NodeKind::SignupSheet => SIGNUP_SHEET_FIELDS,
        NodeKind::SignupEntry => SIGNUP_ENTRY_FIELDS,
        NodeKind::Settings => SETTINGS_FIELDS,
        NodeKind::PrivateSettings => PRIVATE_SETTINGS_FIELDS,
        NodeKind::Theme => THEME_FIELDS,
        NodeKind::Documentation => &[],
        NodeKind::Secret => SECRET_FIELDS,
        NodeKind::AdminRoster | NodeKind::WebmasterRoster => ROSTER_FIELDS,
        NodeKind::Profile => PROFILE_FIELDS,
    }
}

/// True iff every key of `body` is in the allow-list for `kind`.
pub fn validate_shape(kind: NodeKind, body: &Document) -> bool {
    let allowed = allowed_fields(kind);
    body.keys().all(|key| allowed.contains(&key.as_str()))
}

/// True iff every field in `changed` appears in `allowed`.
pub fn fields_within<S: AsRef<str>>(changed: &BTreeSet<String>, allowed: &[S]) -> bool {
    changed
        .iter()
        .all(|field| allowed.iter().any(|a| a.as_ref() == field))
}

/// True iff `changed` touches any profile field the owner may not edit.
pub fn touches_restricted_profile_fields(changed: &BTreeSet<String>) -> bool {
    changed
        .iter()
        .any(|field| PROFILE_RESTRICTED_FIELDS.contains(&field.as_str()))
}
