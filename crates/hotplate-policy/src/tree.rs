use hotplate_core::{bool_field, str_field, Document, Uid};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{NodeKind, PermissionGroup};

// ---------------------------------------------------------------------------
// Typed documents
//
// Views over stored bodies. Only the fields policy reads are typed; the
// rest stay in the body and are covered by the schema allow-lists.
// ---------------------------------------------------------------------------

/// Page metadata: one sitemap entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub id: String,
    pub permissions: PermissionGroup,
}

impl Page {
    pub fn from_document(id: &str, body: &Document) -> Self {
        Self {
            id: id.to_string(),
            permissions: PermissionGroup::parse(str_field(body, "permissions").unwrap_or("")),
        }
    }
}

/// What a widget holds underneath it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WidgetKind {
    Plain,
    MessageStream,
    SignupSheet,
}

impl WidgetKind {
    /// Unknown or absent kinds are plain widgets.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("message-stream") => WidgetKind::MessageStream,
            Some("signup-sheet") => WidgetKind::SignupSheet,
            _ => WidgetKind::Plain,
        }
    }

    /// Name of the nested collection this kind owns.
    pub fn child_collection(self) -> &'static str {
        match self {
            WidgetKind::Plain => "items",
            WidgetKind::MessageStream => "messages",
            WidgetKind::SignupSheet => "sheets",
        }
    }

    pub fn accepts(self, collection: &str) -> bool {
        self.child_collection() == collection
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Widget {
    pub id: String,
    pub hidden: bool,
    pub kind: WidgetKind,
}

impl Widget {
    pub fn from_document(id: &str, body: &Document) -> Self {
        Self {
            id: id.to_string(),
            hidden: bool_field(body, "hidden"),
            kind: WidgetKind::parse(str_field(body, "kind")),
        }
    }
}

/// Nested document under a plain widget. Visibility only, no owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubItem {
    pub id: String,
    pub hidden: bool,
}

impl SubItem {
    pub fn from_document(id: &str, body: &Document) -> Self {
        Self {
            id: id.to_string(),
            hidden: bool_field(body, "hidden"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignupSheet {
    pub id: String,
    pub hidden: bool,
    pub enabled: bool,
}

impl SignupSheet {
    pub fn from_document(id: &str, body: &Document) -> Self {
        Self {
            id: id.to_string(),
            hidden: bool_field(body, "hidden"),
            enabled: bool_field(body, "enabled"),
        }
    }
}

/// A post in a message stream, owned by `uid`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEntry {
    pub uid: Uid,
    pub content: String,
    #[serde(default)]
    pub files: Vec<Value>,
    #[serde(default)]
    pub comments: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl MessageEntry {
    pub fn new(uid: impl Into<Uid>, content: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            content: content.into(),
            files: Vec::new(),
            comments: Vec::new(),
            created_at: None,
        }
    }

    pub fn to_document(&self) -> Document {
        to_document(self)
    }
}

/// A signup against a sheet, owned by `uid`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignupEntry {
    pub uid: Uid,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub shift: String,
    #[serde(default)]
    pub comments: Vec<Value>,
}

impl SignupEntry {
    pub fn new(uid: impl Into<Uid>, role: impl Into<String>, shift: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            role: role.into(),
            shift: shift.into(),
            comments: Vec::new(),
        }
    }

    pub fn to_document(&self) -> Document {
        to_document(self)
    }
}

fn to_document<T: Serialize>(value: &T) -> Document {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map,
        _ => Document::new(),
    }
}

// ---------------------------------------------------------------------------
// Ancestor chain
// ---------------------------------------------------------------------------

/// Read gate of the owning page. A missing page is `Unset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageGate {
    pub group: PermissionGroup,
}

impl PageGate {
    pub fn new(group: PermissionGroup) -> Self {
        Self { group }
    }

    pub fn missing() -> Self {
        Self::new(PermissionGroup::Unset)
    }
}

impl From<&Page> for PageGate {
    fn from(page: &Page) -> Self {
        Self::new(page.permissions)
    }
}

/// One node on the way down from a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Segment {
    Widget { hidden: bool },
    Item { hidden: bool },
    Sheet { hidden: bool, enabled: bool },
}

impl Segment {
    pub fn hidden(self) -> bool {
        match self {
            Segment::Widget { hidden } | Segment::Item { hidden } => hidden,
            Segment::Sheet { hidden, .. } => hidden,
        }
    }
}

impl From<&Widget> for Segment {
    fn from(w: &Widget) -> Self {
        Segment::Widget { hidden: w.hidden }
    }
}

impl From<&SubItem> for Segment {
    fn from(i: &SubItem) -> Self {
        Segment::Item { hidden: i.hidden }
    }
}

impl From<&SignupSheet> for Segment {
    fn from(s: &SignupSheet) -> Self {
        Segment::Sheet {
            hidden: s.hidden,
            enabled: s.enabled,
        }
    }
}

/// Page gate plus the hidden flags from the page down.
///
/// Walking it is O(depth): the effective group is the page's, and the
/// effective hidden flag is the OR of every segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentPath {
    pub page: PageGate,
    pub chain: Vec<Segment>,
}

impl ContentPath {
    pub fn new(page: PageGate) -> Self {
        Self {
            page,
            chain: Vec::new(),
        }
    }

    pub fn under(group: PermissionGroup) -> Self {
        Self::new(PageGate::new(group))
    }

    pub fn push(&mut self, segment: Segment) {
        self.chain.push(segment);
    }

    pub fn widget(mut self, hidden: bool) -> Self {
        self.push(Segment::Widget { hidden });
        self
    }

    pub fn item(mut self, hidden: bool) -> Self {
        self.push(Segment::Item { hidden });
        self
    }

    pub fn sheet(mut self, hidden: bool, enabled: bool) -> Self {
        self.push(Segment::Sheet { hidden, enabled });
        self
    }

    pub fn group(&self) -> PermissionGroup {
        self.page.group
    }

    pub fn any_hidden(&self) -> bool {
        self.chain.iter().any(|s| s.hidden())
    }

    /// `(hidden, enabled)` of the closest sheet, if one is on the chain.
    pub fn parent_sheet(&self) -> Option<(bool, bool)> {
        self.chain.iter().rev().find_map(|s| match *s {
            Segment::Sheet { hidden, enabled } => Some((hidden, enabled)),
            _ => None,
        })
    }
}

// ---------------------------------------------------------------------------
// ContentNode: the decision target
// ---------------------------------------------------------------------------

/// Target of a decision.
///
/// For `Widget`, `SubItem` and `SignupSheet` the chain ends with the node
/// itself. For the owned leaves it ends with the parent, since entries
/// carry no hidden flag of their own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentNode {
    Page(PageGate),
    Widget(ContentPath),
    SubItem(ContentPath),
    MessageEntry(ContentPath),
    SignupSheet(ContentPath),
    SignupEntry(ContentPath),
    Settings,
    PrivateSettings,
    Theme,
    Documentation,
    Secret { id: String, group: PermissionGroup },
    AdminRoster,
    WebmasterRoster,
    Profile { owner: Uid },
}

impl ContentNode {
    pub fn kind(&self) -> NodeKind {
        match self {
            ContentNode::Page(_) => NodeKind::Page,
            ContentNode::Widget(_) => NodeKind::Widget,
            ContentNode::SubItem(_) => NodeKind::SubItem,
            ContentNode::MessageEntry(_) => NodeKind::MessageEntry,
            ContentNode::SignupSheet(_) => NodeKind::SignupSheet,
            ContentNode::SignupEntry(_) => NodeKind::SignupEntry,
            ContentNode::Settings => NodeKind::Settings,
            ContentNode::PrivateSettings => NodeKind::PrivateSettings,
            ContentNode::Theme => NodeKind::Theme,
            ContentNode::Documentation => NodeKind::Documentation,
            ContentNode::Secret { .. } => NodeKind::Secret,
            ContentNode::AdminRoster => NodeKind::AdminRoster,
            ContentNode::WebmasterRoster => NodeKind::WebmasterRoster,
            ContentNode::Profile { .. } => NodeKind::Profile,
        }
    }

    /// The ancestor chain for nodes under a page.
    pub fn content_path(&self) -> Option<&ContentPath> {
        match self {
            ContentNode::Widget(p)
            | ContentNode::SubItem(p)
            | ContentNode::MessageEntry(p)
            | ContentNode::SignupSheet(p)
            | ContentNode::SignupEntry(p) => Some(p),
            _ => None,
        }
    }
}
