//! Release notes segmentation.
//!
//! Splits free-form notes into display blocks. A line starting with
//! ASCII `<digits>. ` opens a numbered block; following non-blank lines join it;
//! a blank line closes whatever block is open.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static NUMBERED_ITEM_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]+\. ").unwrap());

/// One renderable unit of release notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotesBlock {
    pub content: String,
    pub is_numbered: bool,
}

impl NotesBlock {
    fn new(content: String, is_numbered: bool) -> Self {
        Self {
            content,
            is_numbered,
        }
    }
}

/// Segment release notes into ordered blocks.
///
/// `None` and text with no non-blank lines both yield an empty vector.
pub fn segment_release_notes(text: Option<&str>) -> Vec<NotesBlock> {
    let Some(text) = text else {
        return Vec::new();
    };

    let mut blocks = Vec::new();
    let mut current = String::new();
    let mut is_numbered = false;

    for raw in text.lines() {
        let line = raw.trim();

        if NUMBERED_ITEM_REGEX.is_match(line) {
            if !current.is_empty() {
                blocks.push(NotesBlock::new(std::mem::take(&mut current), is_numbered));
            }
            current.push_str(line);
            is_numbered = true;
        } else if !line.is_empty() {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
        } else if !current.is_empty() {
            blocks.push(NotesBlock::new(std::mem::take(&mut current), is_numbered));
            is_numbered = false;
        }
    }

    if !current.is_empty() {
        blocks.push(NotesBlock::new(current, is_numbered));
    }

    blocks
}
