//! Activity page parser.
//!
//! The server exposes no API for its activity feed, so the monitor scrapes the
//! HTML rendered at `<server>/activity/`. This module turns that page into an
//! ordered list of [`RawCommit`]s.
//!
//! This is a versioned contract with the server's page layout, not a general
//! HTML parser. Anything that does not match the expected layout is skipped:
//! a restructured page yields fewer (or zero) commits instead of an error.
//!
//! # Layout `gitblit-v1`
//!
//! | Step | Rule |
//! |------|------|
//! | Document | only the `<body>...</body>` fragment is considered |
//! | Groups | every `<table class="activity">` is one day group |
//! | Group date | `title` attribute of the nearest preceding `class="header"` element |
//! | Rows | every `<tr>` of the group, in page order |
//! | Row text | tabs removed, source line breaks folded to spaces, one line per `</td>`/`</th>` |
//! | Fields | fixed line indices, see [`RowLayout::GITBLIT_V1`] |
//! | Link | first `<a href="../commit/<path>" target` anchor of the row |
//!
//! Rows without a sha1 are dropped since they cannot be deduplicated.
//!
//! # Example
//!
//! ```
//! use commitfeed_monitor::parser::{parser_for, LayoutVersion};
//!
//! let html = r#"<html><body>
//! <div class="header" title="Tue, Mar 3"></div>
//! <table class="activity">
//!   <tr><td>14:32</td><td></td><td>demo.git</td><td>Fix login</td>
//!       <td>alice</td><td>a1b2c3d</td><td>master</td></tr>
//! </table>
//! </body></html>"#;
//!
//! let parser = parser_for(LayoutVersion::GitblitV1);
//! let commits = parser.parse(html, "https://git.example.com/");
//! assert_eq!(commits.len(), 1);
//! assert_eq!(commits[0].sha1, "a1b2c3d");
//! assert_eq!(commits[0].date, "Tue, Mar 3");
//! ```

use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::{debug, trace};

use crate::types::RawCommit;

static BODY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<body\b[^>]*>(.*)</body\s*>").expect("valid regex"));

static ACTIVITY_TABLE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<table\b[^>]*\bclass\s*=\s*"[^"]*\bactivity\b[^"]*"[^>]*>(.*?)</table\s*>"#)
        .expect("valid regex")
});

static HEADER_TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<[a-z][a-z0-9]*\b[^>]*\bclass\s*=\s*"[^"]*\bheader\b[^"]*"[^>]*>"#)
        .expect("valid regex")
});

static TITLE_ATTR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)\btitle\s*=\s*"([^"]*)""#).expect("valid regex"));

static ROW_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr\s*>").expect("valid regex"));

static CELL_END_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</t[dh]\s*>").expect("valid regex"));

static TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));

static ENTITY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").expect("valid regex")
});

static COMMIT_LINK_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<a href="\.\./commit/([^"]*)" target"#).expect("valid regex")
});

/// Known layouts of the activity page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LayoutVersion {
    /// Gitblit 1.x activity page.
    #[default]
    GitblitV1,
}

impl LayoutVersion {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GitblitV1 => "gitblit-v1",
        }
    }
}

/// Line offsets of each field inside a flattened activity row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowLayout {
    pub time: usize,
    pub project: usize,
    pub comment: usize,
    pub author: usize,
    pub sha1: usize,
    pub branch: usize,
}

impl RowLayout {
    /// Gitblit 1.x rows: time, icon, project, message, author, sha1, branch.
    pub const GITBLIT_V1: Self = Self {
        time: 0,
        project: 2,
        comment: 3,
        author: 4,
        sha1: 5,
        branch: 6,
    };
}

/// Turns an activity page into raw commit records.
pub trait ActivityParser: Send + Sync {
    /// The page layout this parser understands.
    fn layout(&self) -> LayoutVersion;

    /// Extracts commits in page order.
    ///
    /// `server_base` is the server URL with a trailing slash; it prefixes the
    /// commit links found in the page. Never fails: unrecognized markup is
    /// skipped.
    fn parse(&self, html: &str, server_base: &str) -> Vec<RawCommit>;
}

/// Returns the parser for a given layout version.
#[must_use]
pub fn parser_for(version: LayoutVersion) -> Box<dyn ActivityParser> {
    match version {
        LayoutVersion::GitblitV1 => Box::new(GitblitActivityParser::new(RowLayout::GITBLIT_V1)),
    }
}

/// Regex-driven parser for the Gitblit activity page.
#[derive(Debug, Clone)]
pub struct GitblitActivityParser {
    layout: RowLayout,
}

impl GitblitActivityParser {
    #[must_use]
    pub fn new(layout: RowLayout) -> Self {
        Self { layout }
    }

    fn parse_row(&self, row_html: &str, date: &str, server_base: &str) -> Option<RawCommit> {
        let lines = flatten_row(row_html);
        let field = |index: usize| lines.get(index).cloned().unwrap_or_default();

        let sha1 = field(self.layout.sha1);
        if sha1.is_empty() {
            trace!(cells = lines.len(), "Skipping activity row without sha1");
            return None;
        }

        let link = COMMIT_LINK_REGEX
            .captures(row_html)
            .map(|caps| format!("{server_base}commit/{}", &caps[1]))
            .unwrap_or_default();

        Some(RawCommit {
            date: date.to_string(),
            time: field(self.layout.time),
            project: field(self.layout.project),
            comment: field(self.layout.comment),
            author: field(self.layout.author),
            sha1,
            branch: field(self.layout.branch),
            link,
        })
    }
}

impl ActivityParser for GitblitActivityParser {
    fn layout(&self) -> LayoutVersion {
        LayoutVersion::GitblitV1
    }

    fn parse(&self, html: &str, server_base: &str) -> Vec<RawCommit> {
        let Some(body) = BODY_REGEX.captures(html).and_then(|caps| caps.get(1)) else {
            debug!("Activity page has no <body>, nothing to parse");
            return Vec::new();
        };
        let body = body.as_str();

        let mut commits = Vec::new();
        for group in ACTIVITY_TABLE_REGEX.captures_iter(body) {
            let (Some(table), Some(inner)) = (group.get(0), group.get(1)) else {
                continue;
            };
            let date = group_date(&body[..table.start()]);

            for row in ROW_REGEX.captures_iter(inner.as_str()) {
                if let Some(commit) = self.parse_row(&row[1], &date, server_base) {
                    commits.push(commit);
                }
            }
        }

        debug!(
            layout = self.layout().as_str(),
            commits = commits.len(),
            "Parsed activity page"
        );
        commits
    }
}

/// Date header of a group: `title` of the last header element before it.
fn group_date(preceding: &str) -> String {
    HEADER_TAG_REGEX
        .find_iter(preceding)
        .last()
        .and_then(|tag| TITLE_ATTR_REGEX.captures(tag.as_str()))
        .map(|caps| decode_entities(caps[1].trim()))
        .unwrap_or_default()
}

/// Flattens a row into one trimmed text line per table cell.
fn flatten_row(row_html: &str) -> Vec<String> {
    let single_line = row_html.replace('\t', "").replace(['\r', '\n'], " ");
    let with_breaks = CELL_END_REGEX.replace_all(&single_line, "\n");
    let text = TAG_REGEX.replace_all(&with_breaks, "");

    text.split('\n')
        .map(|line| {
            let decoded = decode_entities(line);
            decoded.split_whitespace().collect::<Vec<_>>().join(" ")
        })
        .collect()
}

/// Decodes the handful of HTML entities the server emits.
fn decode_entities(text: &str) -> String {
    ENTITY_REGEX
        .replace_all(text, |caps: &Captures<'_>| {
            let entity = &caps[1];
            let decoded = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}
