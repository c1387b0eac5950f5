//! `/files` listing of the storage root as an HTML `<li>` fragment

use std::ffi::OsString;
use std::fmt::Write;
use std::fs::Metadata;
use std::io;
use std::path::Path;

use tokio::fs;
use tracing::{debug, warn};

pub const NOT_MOUNTED: &str = "<li>Storage not mounted.</li>";
pub const UNREADABLE: &str = "<li>Could not open root directory.</li>";
pub const EMPTY: &str = "<li>No files found.</li>";

struct Entry {
    name: String,
    is_dir: bool,
    size: u64,
}

/// List at most `max_entries` entries of `root`, sorted by name.
///
/// When more exist a notice is appended instead of the rest.
pub async fn render_file_list(root: Option<&Path>, max_entries: usize) -> String {
    let Some(root) = root else {
        return NOT_MOUNTED.to_string();
    };
    if !fs::try_exists(root).await.unwrap_or(false) {
        debug!(root = %root.display(), "Storage root missing");
        return NOT_MOUNTED.to_string();
    }

    let mut dir = match fs::read_dir(root).await {
        Ok(dir) => dir,
        Err(e) => {
            warn!(root = %root.display(), "Could not read storage root: {}", e);
            return UNREADABLE.to_string();
        }
    };

    // One past the limit tells us whether to print the notice
    let mut entries = Vec::new();
    while entries.len() <= max_entries {
        let entry = match dir.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!("Storage listing stopped early: {}", e);
                break;
            }
        };
        if let Some(entry) = describe(entry.file_name(), entry.metadata().await) {
            entries.push(entry);
        }
    }

    if entries.is_empty() {
        return EMPTY.to_string();
    }

    let truncated = entries.len() > max_entries;
    entries.truncate(max_entries);
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    let mut list = String::new();
    for entry in &entries {
        let name = escape_html(&entry.name);
        // Writing to a String cannot fail
        let _ = if entry.is_dir {
            write!(list, "<li><strong>{name}/</strong></li>")
        } else {
            write!(list, "<li>{name} ({} bytes)</li>", entry.size)
        };
    }
    if truncated {
        let _ = write!(list, "<li><em>... (showing first {max_entries} files)</em></li>");
    }
    list
}

/// `None` (and a log line) for an entry whose metadata cannot be read.
fn describe(name: OsString, meta: io::Result<Metadata>) -> Option<Entry> {
    match meta {
        Ok(meta) => Some(Entry {
            name: name.to_string_lossy().into_owned(),
            is_dir: meta.is_dir(),
            size: meta.len(),
        }),
        Err(e) => {
            warn!(entry = ?name, "Skipping unreadable storage entry: {}", e);
            None
        }
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
