//! Changelog Markdown parser
//!
//! A single forward scan over the input lines. Level 1-2 headers that look like
//! version headers open a new entry; everything up to the next such header is
//! collected as the entry body. The parser never fails: malformed input yields
//! fewer entries and a warning in [`ParseMetadata::parse_warnings`].

use std::collections::BTreeSet;

use chrono::NaiveDate;
use url::Url;

use crate::detector::detect_format;
use crate::entry::{
    estimate_reading_time, ChangelogSection, EntryDate, EntryMetadata, ParseMetadata,
    ParsedChangelog, ParsedChangelogEntry,
};
use crate::patterns::{
    section_marker_tag, BRACKET_HEADER_PATTERN, BRACKET_PAREN_HEADER_PATTERN, CLI_HEADER_PATTERN,
    COMPARE_LINK_HEADER_PATTERN, DATE_PATTERNS, HEADER_PATTERN, STRICT_VERSION_PATTERN,
    UNRELEASED_PREFIX_PATTERN, VERSION_LINK_FOOTNOTE_PATTERN, VERSION_PATTERNS,
};

pub const NO_ENTRIES_WARNING: &str = "No valid changelog entries found";

/// Version, date and display title recovered from a header line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderInfo {
    pub version: Option<String>,
    pub date: Option<EntryDate>,
    pub title: String,
}

type HeaderExtractor = fn(&str) -> Option<HeaderInfo>;

/// Header shapes, most specific first. The first extractor returning `Some` wins.
const HEADER_EXTRACTORS: &[(&str, HeaderExtractor)] = &[
    ("cli_dash", extract_cli_dash),
    ("compare_link", extract_compare_link),
    ("bracket_paren", extract_bracket_paren),
    ("leading_bracket", extract_leading_bracket),
    ("generic", extract_generic),
];

/// Parse a changelog document into sections and entries
pub fn parse_changelog(content: &str) -> ParsedChangelog {
    let lines: Vec<&str> = content.lines().collect();
    let mut state = ScanState::default();

    for (index, line) in lines.iter().enumerate() {
        let trimmed = line.trim();

        if is_fence(trimmed) {
            state.in_fence = !state.in_fence;
            state.push_content(line);
            continue;
        }

        let header = if state.in_fence {
            None
        } else {
            HEADER_PATTERN
                .captures(trimmed)
                .map(|caps| (caps[1].len() as u8, caps[2].trim().to_string()))
        };

        match header {
            Some((level, text)) if level <= 2 => {
                if is_banner(&text, level, index) {
                    log::debug!("Skipping changelog banner on line {}", index + 1);
                    continue;
                }
                state.handle_top_header(level, &text, index, line);
            }
            Some((level, text)) => {
                if level == 3 {
                    state.record_section(&text, level, index);
                }
                state.push_content(line);
            }
            None => state.push_content(line),
        }
    }

    state.close_entry();
    state.finish(content, &lines)
}

#[derive(Debug)]
struct OpenEntry {
    header: HeaderInfo,
    level: u8,
    line: usize,
    section: usize,
    buffer: Vec<String>,
}

#[derive(Debug, Default)]
struct ScanState {
    entries: Vec<ParsedChangelogEntry>,
    /// (heading, level, line index, entry index)
    sections: Vec<(String, u8, usize, Option<usize>)>,
    open: Option<OpenEntry>,
    warnings: Vec<String>,
    in_fence: bool,
}

impl ScanState {
    fn record_section(&mut self, heading: &str, level: u8, line: usize) -> usize {
        self.sections.push((heading.to_string(), level, line, None));
        self.sections.len() - 1
    }

    fn handle_top_header(&mut self, level: u8, text: &str, index: usize, raw: &str) {
        let section = self.record_section(text, level, index);

        if !looks_like_version_header(text) {
            // A level-2 subsection below a level-1 version header stays inside that entry.
            if let Some(open) = self.open.as_mut() {
                if level > open.level {
                    log::debug!("Treating \"{}\" as a subsection of {}", text, open.header.title);
                    open.buffer.push(raw.to_string());
                    return;
                }
            }
            self.close_entry();
            log::debug!("Header \"{}\" is not a version header", text);
            return;
        }

        self.close_entry();
        let header = parse_header(text);
        if let Some(EntryDate::Uninterpretable(raw_date)) = &header.date {
            let warning = format!(
                "Line {}: could not interpret date \"{}\" in header \"{}\"",
                index + 1,
                raw_date,
                text
            );
            log::warn!("{}", warning);
            self.warnings.push(warning);
        }
        self.open = Some(OpenEntry {
            header,
            level,
            line: index,
            section,
            buffer: Vec::new(),
        });
    }

    fn push_content(&mut self, line: &str) {
        if let Some(open) = self.open.as_mut() {
            if open.buffer.is_empty() && line.trim().is_empty() {
                return;
            }
            open.buffer.push(line.to_string());
        }
    }

    fn close_entry(&mut self) {
        let Some(open) = self.open.take() else {
            return;
        };
        if open.header.title.trim().is_empty() {
            return;
        }
        let processed = process_content_buffer(&open.buffer);
        let entry = ParsedChangelogEntry {
            title: open.header.title,
            metadata: EntryMetadata {
                source_index: self.entries.len(),
                source_line: open.line + 1,
                reading_time_minutes: estimate_reading_time(&processed.content),
            },
            content: processed.content,
            version: open.header.version,
            published_at: open.header.date,
            tags: processed.tags,
        };
        self.sections[open.section].3 = Some(self.entries.len());
        self.entries.push(entry);
    }

    fn finish(mut self, content: &str, lines: &[&str]) -> ParsedChangelog {
        let sections = self
            .sections
            .iter()
            .enumerate()
            .map(|(i, (heading, level, line, entry))| {
                let end = self.sections[i + 1..]
                    .iter()
                    .find(|(_, next_level, _, _)| next_level <= level)
                    .map_or(lines.len(), |(_, _, next_line, _)| *next_line);
                ChangelogSection {
                    heading: heading.clone(),
                    level: *level,
                    content: lines[line + 1..end].join("\n").trim().to_string(),
                    entries: entry
                        .map(|idx| vec![self.entries[idx].clone()])
                        .unwrap_or_default(),
                }
            })
            .collect::<Vec<_>>();

        if self.entries.is_empty() {
            self.warnings.push(NO_ENTRIES_WARNING.to_string());
        }

        let metadata = ParseMetadata {
            total_sections: sections.len(),
            total_entries: self.entries.len(),
            has_versions: self.entries.iter().any(|e| e.version.is_some()),
            has_dates: self.entries.iter().any(|e| e.published_at.is_some()),
            original_format: detect_format(content).format,
            parse_warnings: self.warnings,
        };

        ParsedChangelog {
            sections,
            entries: self.entries,
            metadata,
        }
    }
}

fn is_fence(trimmed: &str) -> bool {
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

fn is_banner(text: &str, level: u8, index: usize) -> bool {
    level == 1
        && (text.to_lowercase().contains("changelog")
            || (index == 0 && !looks_like_version_header(text)))
}

/// Whether a header starts a new versioned entry rather than a structural subsection
pub fn looks_like_version_header(text: &str) -> bool {
    let text = text.trim();
    VERSION_PATTERNS.iter().any(|p| p.is_match(text))
        || CLI_HEADER_PATTERN.is_match(text)
        || COMPARE_LINK_HEADER_PATTERN.is_match(text)
        || BRACKET_PAREN_HEADER_PATTERN.is_match(text)
        || UNRELEASED_PREFIX_PATTERN.is_match(text)
}

/// Extract version, date and title from header text (without the leading hashes)
pub fn parse_header(text: &str) -> HeaderInfo {
    let text = text.trim();
    let extracted = HEADER_EXTRACTORS.iter().find_map(|(name, extractor)| {
        extractor(text).inspect(|_| log::debug!("Header \"{}\" matched {}", text, name))
    });

    let mut info = extracted.unwrap_or_else(|| HeaderInfo {
        title: text.to_string(),
        ..Default::default()
    });

    if info.title.trim().is_empty() {
        info.title = match (&info.version, &info.date) {
            (Some(version), _) => format!("Version {}", version),
            (None, Some(date)) => format!("Release {}", date),
            (None, None) => "Release".to_string(),
        };
    }
    info
}

/// `[1.2.3] - <date>`; a tail without a date is left to the leading-bracket form
fn extract_cli_dash(text: &str) -> Option<HeaderInfo> {
    let caps = CLI_HEADER_PATTERN.captures(text)?;
    let version = caps[1].to_string();
    let trailing = caps[2].trim();
    let date = parse_date_text(trailing)?;
    Some(HeaderInfo {
        title: format!("Version {} - {}", version, trailing),
        version: Some(version),
        date: Some(date),
    })
}

fn extract_compare_link(text: &str) -> Option<HeaderInfo> {
    let caps = COMPARE_LINK_HEADER_PATTERN.captures(text)?;
    let link_text = caps[1].trim();
    let paren = caps[3].trim();
    let version = version_token(link_text).or_else(|| scrape_compare_version(&caps[2]));
    let date = parse_date_text(paren);
    let date_label = date
        .as_ref()
        .map_or_else(|| paren.to_string(), ToString::to_string);
    Some(HeaderInfo {
        version,
        date,
        title: format!("Release {}", date_label),
    })
}

fn extract_bracket_paren(text: &str) -> Option<HeaderInfo> {
    let caps = BRACKET_PAREN_HEADER_PATTERN.captures(text)?;
    let bracket = caps[1].trim();
    let version = version_token(bracket);
    Some(HeaderInfo {
        title: if version.is_some() {
            String::new()
        } else {
            bracket.to_string()
        },
        version,
        date: parse_date_text(&caps[2]),
    })
}

fn extract_leading_bracket(text: &str) -> Option<HeaderInfo> {
    let caps = BRACKET_HEADER_PATTERN.captures(text)?;
    let bracket = caps[1].trim();
    let mut rest = caps[2].trim();
    // `[1.2.0](https://...)` without a date: drop the link target
    if rest.starts_with('(') {
        if let Some(close) = rest.find(')') {
            rest = rest[close + 1..].trim();
        }
    }
    let rest = rest.trim_start_matches(['-', '–', '—', ':']).trim();

    let (date, remainder) = match find_date(rest) {
        Some((date, start, end)) => (Some(date), format!("{}{}", &rest[..start], &rest[end..])),
        None => (None, rest.to_string()),
    };
    let remainder = clean_title(&remainder);

    let version = version_token(bracket);
    let title = match &version {
        Some(_) => remainder,
        None if remainder.is_empty() => bracket.to_string(),
        None => format!("{} {}", bracket, remainder),
    };
    Some(HeaderInfo {
        version,
        date,
        title,
    })
}

fn extract_generic(text: &str) -> Option<HeaderInfo> {
    let mut title = text.to_string();

    let version = VERSION_PATTERNS.iter().find_map(|pattern| {
        let caps = pattern.captures(&title)?;
        let whole = caps.get(0)?;
        let version = caps[1].to_string();
        Some((version, whole.start(), whole.end()))
    });
    let version = version.map(|(version, start, end)| {
        title.replace_range(start..end, " ");
        version
    });

    let date = find_date(&title).map(|(date, start, end)| {
        title.replace_range(start..end, " ");
        date
    });

    if version.is_none() && date.is_none() {
        return None;
    }
    Some(HeaderInfo {
        version,
        date,
        title: clean_title(&title),
    })
}

/// Strip separators and empty brackets left behind after removing versions and dates
fn clean_title(title: &str) -> String {
    let collapsed = title
        .replace("()", " ")
        .replace("[]", " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let cleaned = collapsed.trim_matches(|c: char| c.is_whitespace() || "-–—:|,()[]".contains(c));
    if cleaned.eq_ignore_ascii_case("version") || cleaned.eq_ignore_ascii_case("release") {
        return String::new();
    }
    cleaned.to_string()
}

/// `v1.2.3` or `1.2.3-beta` as written in a bracket or link text
fn version_token(text: &str) -> Option<String> {
    let text = text.trim();
    let stripped = text
        .strip_prefix('v')
        .or_else(|| text.strip_prefix('V'))
        .unwrap_or(text);
    stripped
        .chars()
        .next()
        .filter(char::is_ascii_digit)
        .map(|_| stripped.to_string())
}

/// Version on the right-hand side of a compare range, e.g. `.../compare/v1.0.0...v1.1.0`
fn scrape_compare_version(link: &str) -> Option<String> {
    let range = match Url::parse(link) {
        Ok(url) => {
            let segments: Vec<String> = url.path_segments()?.map(str::to_string).collect();
            let idx = segments.iter().position(|s| s == "compare")?;
            segments.get(idx + 1)?.clone()
        }
        Err(_) => link.split("/compare/").nth(1)?.to_string(),
    };
    let target = range.rsplit("..").next()?.trim_start_matches('.');
    let target = target.strip_prefix('v').unwrap_or(target);
    STRICT_VERSION_PATTERN
        .is_match(target)
        .then(|| target.to_string())
}

/// Locate the first date-shaped fragment of `text`, returning it with its byte range
fn find_date(text: &str) -> Option<(EntryDate, usize, usize)> {
    DATE_PATTERNS.iter().find_map(|(pattern, formats)| {
        let found = pattern.find(text)?;
        Some((
            interpret_date(found.as_str(), formats),
            found.start(),
            found.end(),
        ))
    })
}

/// Parse the first date-shaped fragment of `text`
pub fn parse_date_text(text: &str) -> Option<EntryDate> {
    find_date(text).map(|(date, _, _)| date)
}

fn interpret_date(raw: &str, formats: &[&str]) -> EntryDate {
    let normalized = raw
        .replace([',', '.'], " ")
        .split_whitespace()
        .map(|word| {
            if word.eq_ignore_ascii_case("sept") {
                "Sep"
            } else {
                word
            }
        })
        .collect::<Vec<_>>()
        .join(" ");
    formats
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(&normalized, format).ok())
        .map_or_else(|| EntryDate::Uninterpretable(raw.to_string()), EntryDate::Date)
}

/// Body text of an entry after sub-header rewriting
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessedContent {
    pub content: String,
    /// Tags implied by known section headings inside the body
    pub tags: BTreeSet<String>,
}

/// Rewrite sub-headers as bold labels, keep list items verbatim, trim blank edges.
///
/// Version link definitions (`[1.0.0]: https://...`) are dropped.
pub fn process_content_buffer<S: AsRef<str>>(lines: &[S]) -> ProcessedContent {
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut tags = BTreeSet::new();
    let mut in_fence = false;

    for line in lines {
        let line = line.as_ref();
        let trimmed = line.trim();

        if is_fence(trimmed) {
            in_fence = !in_fence;
            out.push(line.to_string());
            continue;
        }

        if !in_fence {
            if let Some(caps) = HEADER_PATTERN.captures(trimmed) {
                let label = caps[2].trim();
                if let Some(tag) = section_marker_tag(label) {
                    tags.insert(tag.to_string());
                }
                if out.last().is_some_and(|l| !l.trim().is_empty()) {
                    out.push(String::new());
                }
                out.push(format!("**{}**", label));
                out.push(String::new());
                continue;
            }
        }

        if !in_fence && VERSION_LINK_FOOTNOTE_PATTERN.is_match(trimmed) {
            continue;
        }
        if trimmed.is_empty() && out.last().is_some_and(|l| l.trim().is_empty()) {
            continue;
        }
        out.push(line.to_string());
    }

    while out.last().is_some_and(|l| l.trim().is_empty()) {
        out.pop();
    }
    let first = out.iter().position(|l| !l.trim().is_empty()).unwrap_or(out.len());

    ProcessedContent {
        content: out[first..].join("\n"),
        tags,
    }
}
