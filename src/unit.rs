//! Executable units - the items a document run executes, in order.

use serde::{Deserialize, Serialize};

/// What kind of operation a unit performs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    /// Place content as a file on the target
    File,
    /// Run a shell command on the target
    Command,
    /// Patch an existing file with a unified diff
    Edit,
    /// Anything else - executes as an explicit no-op
    #[default]
    #[serde(other)]
    Unknown,
}

impl UnitKind {
    /// Map a document node's `type` attribute onto a kind.
    ///
    /// Absent and unrecognized values both land on [`UnitKind::Unknown`],
    /// which runs as a no-op rather than failing the document.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("file") => Self::File,
            Some("command") => Self::Command,
            Some("edit") => Self::Edit,
            _ => Self::Unknown,
        }
    }
}

/// One executable item extracted from a rendered document.
///
/// Units carry their document order in `index` and are never reordered or
/// executed in parallel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Unit {
    /// Position among the document's executable nodes
    pub index: usize,
    /// Operation this unit performs
    #[serde(rename = "type")]
    pub kind: UnitKind,
    /// Trimmed node text - file content, command line, or diff
    pub content: String,
    /// Destination path, for file and edit units
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Run as this user (privilege-scoped via sudo)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Name of a persistent session to run inside
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistent: Option<String>,
    /// Elevate through the OS privilege prompt (local targets only)
    pub privileged: bool,
    /// Deliver output incrementally while the command runs
    pub stream: bool,
    /// Boolean expression over exitCode/stdout/stderr that marks failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_when: Option<String>,
    /// Comma-separated variable names that must be bound before this runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<String>,
    /// Name of a non-default connector to run against
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Mode bits to add to the written file (chmod +<permission>)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission: Option<String>,
}

impl Unit {
    /// A command unit with the given command line. Convenience for tests
    /// and embedding callers.
    pub fn command(content: impl Into<String>) -> Self {
        Self {
            kind: UnitKind::Command,
            content: content.into(),
            ..Self::default()
        }
    }

    /// A file unit placing `content` at `path`.
    pub fn file(content: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            kind: UnitKind::File,
            content: content.into(),
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// An edit unit applying `diff` to `path`.
    pub fn edit(diff: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            kind: UnitKind::Edit,
            content: diff.into(),
            path: Some(path.into()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_kinds() {
        assert_eq!(UnitKind::parse(Some("file")), UnitKind::File);
        assert_eq!(UnitKind::parse(Some("command")), UnitKind::Command);
        assert_eq!(UnitKind::parse(Some("edit")), UnitKind::Edit);
    }

    #[test]
    fn parse_absent_and_unrecognized_kinds() {
        assert_eq!(UnitKind::parse(None), UnitKind::Unknown);
        assert_eq!(UnitKind::parse(Some("quiz")), UnitKind::Unknown);
        assert_eq!(UnitKind::parse(Some("")), UnitKind::Unknown);
    }

    #[test]
    fn constructors_fill_in_kind_and_path() {
        let unit = Unit::file("hello", "/etc/motd");
        assert_eq!(unit.kind, UnitKind::File);
        assert_eq!(unit.path.as_deref(), Some("/etc/motd"));
        assert!(!unit.privileged);
        assert!(!unit.stream);
    }
}
