//! The plan: what Unison proposes to do for every changed path.
//!
//! Unison prints one row per item, e.g.
//!
//! ```text
//! changed  ---->            docs/notes.txt
//! new file <-?-> new file   draft.md
//! ```
//!
//! followed (after an `l` listing request) by one description line per
//! replica:
//!
//! ```text
//! left           : changed file       modified on 2021-02-07 at 16:48:46  size 1146   rw-r--r--
//! right          : unchanged file     modified on 2021-02-07 at 16:40:02  size 1020   rw-r--r--
//! ```

pub mod tree;

pub use tree::{apply_action, fold, Column, Node, SortRule, Tree};

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

// =============================================================================
// Content
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContentType {
    Absent,
    File,
    Directory,
    Symlink,
}

impl ContentType {
    fn from_word(word: &str) -> Option<Self> {
        match word {
            "file" => Some(Self::File),
            "dir" | "directory" => Some(Self::Directory),
            "symlink" | "link" => Some(Self::Symlink),
            "absent" => Some(Self::Absent),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::File => "file",
            Self::Directory => "directory",
            Self::Symlink => "symlink",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContentStatus {
    Unchanged,
    Created,
    Modified,
    PropsChanged,
    Deleted,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unchanged => "unchanged",
            Self::Created => "created",
            Self::Modified => "modified",
            Self::PropsChanged => "props-changed",
            Self::Deleted => "deleted",
        }
    }
}

/// One side of one plan entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    pub kind: ContentType,
    pub status: ContentStatus,
    /// Modification time, size, permissions. Opaque to the driver.
    pub props: String,
}

impl Content {
    pub fn absent() -> Self {
        Self {
            kind: ContentType::Absent,
            status: ContentStatus::Unchanged,
            props: String::new(),
        }
    }

    /// Parse the text after `<label> : ` on a listing description line.
    pub fn parse(description: &str) -> Option<Self> {
        let caps = DESCRIPTION.captures(description.trim())?;
        let status = match &caps["status"] {
            "unchanged" => ContentStatus::Unchanged,
            "new" => ContentStatus::Created,
            "changed" => ContentStatus::Modified,
            "deleted" => ContentStatus::Deleted,
            "absent" => return Some(Self::absent()),
            _ => ContentStatus::PropsChanged,
        };
        let kind = match caps.name("kind") {
            Some(word) => ContentType::from_word(word.as_str())?,
            None if status == ContentStatus::Deleted => ContentType::Absent,
            None => return None,
        };
        let props = caps
            .name("props")
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();
        Some(Self {
            kind,
            status,
            props,
        })
    }
}

static DESCRIPTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<status>absent|unchanged|new|changed props|props changed|changed|deleted)(?:\s+(?P<kind>file|dir|directory|symlink|link))?(?:\s+(?P<props>.*))?$",
    )
    .expect("description pattern")
});

// =============================================================================
// Action
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Action {
    Skip,
    LeftToRight,
    MaybeLeftToRight,
    RightToLeft,
    MaybeRightToLeft,
    Merge,
    /// Only for aggregate tree nodes whose children disagree.
    Mixed,
    Error,
}

impl Action {
    pub fn from_arrow(arrow: &str) -> Option<Self> {
        match arrow {
            "---->" | "====>" => Some(Self::LeftToRight),
            "<----" | "<====" => Some(Self::RightToLeft),
            "-?->" => Some(Self::MaybeLeftToRight),
            "<-?-" => Some(Self::MaybeRightToLeft),
            "<-?->" | "<=?=>" => Some(Self::Skip),
            "<-M->" => Some(Self::Merge),
            _ => None,
        }
    }

    /// Keystroke that selects this action at a plan prompt.
    pub fn directive(&self) -> Option<&'static [u8]> {
        match self {
            Self::LeftToRight | Self::MaybeLeftToRight => Some(b">"),
            Self::RightToLeft | Self::MaybeRightToLeft => Some(b"<"),
            Self::Skip | Self::Error => Some(b"/"),
            Self::Merge => Some(b"m"),
            Self::Mixed => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::LeftToRight => "left-to-right",
            Self::MaybeLeftToRight => "maybe-left-to-right",
            Self::RightToLeft => "right-to-left",
            Self::MaybeRightToLeft => "maybe-right-to-left",
            Self::Merge => "merge",
            Self::Mixed => "mixed",
            Self::Error => "error",
        }
    }

    pub fn arrow(&self) -> &'static str {
        match self {
            Self::Skip => "<-?->",
            Self::LeftToRight => "---->",
            Self::MaybeLeftToRight => "-?->",
            Self::RightToLeft => "<----",
            Self::MaybeRightToLeft => "<-?-",
            Self::Merge => "<-M->",
            Self::Mixed => "<-*->",
            Self::Error => "<-!->",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Item and plan rows
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Forward-slash separated, empty for the whole replica.
    pub path: String,
    pub left: Content,
    pub right: Content,
    pub action: Action,
}

/// A single plan row as printed at a prompt or in the listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRow {
    pub left_change: String,
    pub right_change: String,
    pub action: Action,
    pub path: String,
}

static ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?:(?P<lc>new file|new dir|new link|changed|deleted|props|error)\s+)?(?P<arrow><-\?->|<=\?=>|<-M->|---->|====>|<----|<====|-\?->|<-\?-)(?:\s+(?P<rc>new file|new dir|new link|changed|deleted|props|error))?(?:\s+(?P<path>.*?))?\s*$",
    )
    .expect("plan row pattern")
});

impl PlanRow {
    pub fn parse(line: &str) -> Option<Self> {
        let caps = ROW.captures(line)?;
        let left_change = caps.name("lc").map_or("", |m| m.as_str()).to_string();
        let right_change = caps.name("rc").map_or("", |m| m.as_str()).to_string();
        let mut action = Action::from_arrow(&caps["arrow"])?;
        if left_change == "error" || right_change == "error" {
            action = Action::Error;
        }
        let path = normalize_path(caps.name("path").map_or("", |m| m.as_str()));
        Some(Self {
            left_change,
            right_change,
            action,
            path,
        })
    }
}

/// Strip surrounding whitespace and trailing slashes.
pub fn normalize_path(path: &str) -> String {
    path.trim().trim_end_matches('/').to_string()
}
