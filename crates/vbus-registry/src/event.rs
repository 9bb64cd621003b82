use serde::{Deserialize, Serialize};
use vbus_tree::Path;

/// Kind of tree change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeEventKind {
    Added,
    Removed,
    Set,
}

impl TreeEventKind {
    /// Notification suffix used on the bus.
    pub fn notification(&self) -> &'static str {
        match self {
            Self::Added => "add",
            Self::Removed => "del",
            Self::Set => "value.set",
        }
    }
}

/// A change to the published tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEvent {
    pub kind: TreeEventKind,
    pub path: Path,
}

impl TreeEvent {
    pub fn new(kind: TreeEventKind, path: Path) -> Self {
        Self { kind, path }
    }

    /// Bus subject for this notification, e.g. `system.info.status.add`.
    pub fn subject(&self, service_id: &str) -> String {
        let mut subject = service_id.to_string();
        if !self.path.is_root() {
            subject.push('.');
            subject.push_str(&self.path.to_string());
        }
        subject.push('.');
        subject.push_str(self.kind.notification());
        subject
    }
}
