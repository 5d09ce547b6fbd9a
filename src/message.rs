//! Message parsing for milestone extraction and thread grouping.
//!
//! A message file's format is resolved once from its extension into a
//! [`MessageFormat`]; every variant produces the same [`ParsedMessage`]
//! (subject, sender, body, timestamp, participants).
//!
//! | Extension | Variant | Notes |
//! |-----------|---------|-------|
//! | `.txt` | [`MessageFormat::PlainText`] | `Subject:`/`From:`/`To:`/`Cc:`/`Date:` block ended by a blank line |
//! | `.eml` | [`MessageFormat::Eml`] | RFC 822 headers, RFC 2047 words, multipart `text/plain` walk |
//! | `.msg` | [`MessageFormat::OutlookMsg`] | no decoder is built in; always [`MessageError::UnsupportedFormat`] |
//!
//! Dates that cannot be parsed fall back to the current time.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use base64::Engine;
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageFormat {
    PlainText,
    Eml,
    OutlookMsg,
}

impl MessageFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "txt" => Some(MessageFormat::PlainText),
            "eml" => Some(MessageFormat::Eml),
            "msg" => Some(MessageFormat::OutlookMsg),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("no decoder available for {0}")]
    UnsupportedFormat(PathBuf),
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Normalized view of one message.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMessage {
    pub subject: String,
    pub sender: String,
    pub body: String,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub participants: Vec<String>,
    /// Path of the file the message came from.
    pub source_id: String,
    pub format: MessageFormat,
}

impl ParsedMessage {
    /// Subject and body joined the way the extractor scans them.
    pub fn full_text(&self) -> String {
        format!("{}\n\n{}", self.subject, self.body)
    }
}

/// List the message files directly inside `dir`, sorted by file name.
///
/// A missing directory yields an empty list; callers log it.
pub fn list_message_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| MessageFormat::from_path(path).is_some())
        .collect()
}

/// Parse a message file. Returns `Ok(None)` for files whose extension is
/// not a message format.
pub fn parse_message(path: &Path) -> Result<Option<ParsedMessage>, MessageError> {
    let Some(format) = MessageFormat::from_path(path) else {
        return Ok(None);
    };
    let source_id = path.to_string_lossy().into_owned();

    let parsed = match format {
        MessageFormat::PlainText => {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            parse_plain_text(&read_lossy(path)?, &file_name, source_id)
        }
        MessageFormat::Eml => parse_eml(&read_lossy(path)?, source_id),
        MessageFormat::OutlookMsg => {
            return Err(MessageError::UnsupportedFormat(path.to_path_buf()))
        }
    };
    Ok(Some(parsed))
}

fn read_lossy(path: &Path) -> Result<String, MessageError> {
    let bytes = fs::read(path).map_err(|source| MessageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

// ── Plain-text pseudo email ─────────────────────────────────────────────

/// Parse a text file with an optional email-like header block.
///
/// Without a `Subject:` or `From:` header the whole file is treated as
/// body text under a synthetic subject.
pub fn parse_plain_text(content: &str, file_name: &str, source_id: String) -> ParsedMessage {
    let lines: Vec<&str> = content.split('\n').collect();
    let mut subject = String::new();
    let mut sender = String::new();
    let mut date = String::new();
    let mut participants: Vec<String> = Vec::new();
    let mut body_start = 0;

    for (i, line) in lines.iter().enumerate() {
        if let Some(v) = header_value(line, "subject:") {
            subject = v.to_string();
        } else if let Some(v) = header_value(line, "from:") {
            sender = v.to_string();
            participants.push(v.to_string());
        } else if let Some(v) = header_value(line, "to:") {
            participants.extend(v.split(',').map(|a| a.trim().to_string()));
        } else if let Some(v) = header_value(line, "cc:") {
            participants.extend(v.split(',').map(|a| a.trim().to_string()));
        } else if let Some(v) = header_value(line, "date:") {
            date = v.to_string();
        } else if line.trim().is_empty() && i > 0 {
            body_start = i + 1;
            break;
        }
    }

    let (subject, body) = if subject.is_empty() && sender.is_empty() {
        (format!("Text file: {}", file_name), content.to_string())
    } else {
        (subject, lines[body_start.min(lines.len())..].join("\n"))
    };

    ParsedMessage {
        subject,
        sender,
        body,
        timestamp: parse_date(&date).unwrap_or_else(now_secs),
        participants: dedup_preserving_order(participants),
        source_id,
        format: MessageFormat::PlainText,
    }
}

fn header_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let line = line.trim_start();
    let prefix = line.get(..key.len())?;
    if prefix.eq_ignore_ascii_case(key) {
        Some(line[key.len()..].trim())
    } else {
        None
    }
}

const ZONED_FORMATS: &[&str] = &["%a, %d %b %Y %H:%M:%S %z"];
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%m/%d/%Y %H:%M", "%d/%m/%Y %H:%M"];

/// Parse the date formats seen in text emails. Naive times are read as UTC.
pub fn parse_date(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(to_secs(dt.with_timezone(&Utc)));
    }
    for fmt in ZONED_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(value, fmt) {
            return Some(to_secs(dt.with_timezone(&Utc)));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(to_secs(dt.and_utc()));
        }
    }
    None
}

fn to_secs(dt: DateTime<Utc>) -> f64 {
    dt.timestamp_millis() as f64 / 1000.0
}

pub(crate) fn now_secs() -> f64 {
    to_secs(Utc::now())
}

fn dedup_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    items
        .into_iter()
        .filter(|p| !p.is_empty())
        .filter(|p| seen.insert(p.clone()))
        .collect()
}

// ── RFC 822 (.eml) ──────────────────────────────────────────────────────

static RE_EMAIL_ADDRESS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[\w.-]+@[\w.-]+\.\w+").ok());

static RE_ENCODED_WORD: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"=\?([^?\s]+)\?([bBqQ])\?([^?\s]*)\?=").ok());

struct Headers(Vec<(String, String)>);

impl Headers {
    fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Split raw message text into unfolded headers and the remaining body.
fn split_headers(raw: &str) -> (Headers, &str) {
    // A leading blank line means the entity has no headers at all.
    let (head, body) = if let Some(rest) = raw.strip_prefix('\n') {
        ("", rest)
    } else {
        match raw.find("\n\n") {
            Some(pos) => (&raw[..pos], &raw[pos + 2..]),
            None => (raw, ""),
        }
    };

    let mut headers: Vec<(String, String)> = Vec::new();
    for line in head.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some((_, value)) = headers.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }
    (Headers(headers), body)
}

pub fn parse_eml(content: &str, source_id: String) -> ParsedMessage {
    let normalized = content.replace("\r\n", "\n");
    let (headers, body) = split_headers(&normalized);

    let subject = decode_header(headers.get("Subject").unwrap_or_default());
    let sender = decode_header(headers.get("From").unwrap_or_default());
    let timestamp = headers
        .get("Date")
        .and_then(parse_date)
        .unwrap_or_else(now_secs);

    let mut participants = BTreeSet::new();
    if let Some(re) = RE_EMAIL_ADDRESS.as_ref() {
        for name in ["From", "To", "Cc"] {
            if let Some(value) = headers.get(name) {
                participants.extend(re.find_iter(value).map(|m| m.as_str().to_string()));
            }
        }
    }

    ParsedMessage {
        subject,
        sender,
        body: text_body(&headers, body, true),
        timestamp,
        participants: participants.into_iter().collect(),
        source_id,
        format: MessageFormat::Eml,
    }
}

/// Collect `text/plain` content from a (possibly multipart) entity.
///
/// A single-part top-level message is returned whatever its content
/// type; inside multiparts only `text/plain` parts count.
fn text_body(headers: &Headers, body: &str, top_level: bool) -> String {
    let content_type = headers
        .get("Content-Type")
        .unwrap_or("text/plain")
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/") {
        let Some(boundary) = header_param(headers.get("Content-Type").unwrap_or_default(), "boundary")
        else {
            return String::new();
        };
        let mut out = String::new();
        for part in multipart_parts(body, &boundary) {
            let part = part.strip_prefix('\n').unwrap_or(part);
            let (part_headers, part_body) = split_headers(part);
            out.push_str(&text_body(&part_headers, part_body, false));
        }
        return out;
    }

    if !top_level && !content_type.starts_with("text/plain") {
        return String::new();
    }

    let encoding = headers
        .get("Content-Transfer-Encoding")
        .unwrap_or("7bit")
        .trim()
        .to_ascii_lowercase();
    let bytes = match encoding.as_str() {
        "base64" => {
            let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
            base64::engine::general_purpose::STANDARD
                .decode(compact.as_bytes())
                .unwrap_or_default()
        }
        "quoted-printable" => decode_quoted_printable(body, false),
        // already text; the file was read as UTF-8
        _ => return body.to_string(),
    };
    let charset = header_param(headers.get("Content-Type").unwrap_or_default(), "charset")
        .unwrap_or_else(|| "utf-8".to_string());
    decode_charset(&bytes, &charset)
}

fn multipart_parts<'a>(body: &'a str, boundary: &str) -> Vec<&'a str> {
    let delimiter = format!("--{}", boundary);
    let mut parts = Vec::new();
    // The preamble before the first delimiter is discarded.
    for segment in body.split(delimiter.as_str()).skip(1) {
        if segment.starts_with("--") {
            break;
        }
        parts.push(segment);
    }
    parts
}

fn header_param(value: &str, param: &str) -> Option<String> {
    value.split(';').skip(1).find_map(|piece| {
        let (key, val) = piece.split_once('=')?;
        if key.trim().eq_ignore_ascii_case(param) {
            Some(val.trim().trim_matches('"').to_string())
        } else {
            None
        }
    })
}

/// Decode RFC 2047 encoded words. Whitespace between two adjacent
/// encoded words is dropped.
pub fn decode_header(value: &str) -> String {
    let Some(re) = RE_ENCODED_WORD.as_ref() else {
        return value.trim().to_string();
    };

    let mut out = String::new();
    let mut last_end = 0;
    let mut previous_was_encoded = false;
    for caps in re.captures_iter(value) {
        let whole = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or((0, 0));
        let gap = &value[last_end..whole.0];
        if !(previous_was_encoded && gap.trim().is_empty()) {
            out.push_str(gap);
        }

        let charset = &caps[1];
        let payload = &caps[3];
        let bytes = if caps[2].eq_ignore_ascii_case("b") {
            base64::engine::general_purpose::STANDARD
                .decode(payload.as_bytes())
                .unwrap_or_default()
        } else {
            decode_quoted_printable(payload, true)
        };
        out.push_str(&decode_charset(&bytes, charset));

        last_end = whole.1;
        previous_was_encoded = true;
    }
    out.push_str(&value[last_end..]);
    out.trim().to_string()
}

fn decode_charset(bytes: &[u8], charset: &str) -> String {
    let encoding = encoding_rs::Encoding::for_label(charset.trim().as_bytes())
        .unwrap_or(encoding_rs::UTF_8);
    encoding.decode(bytes).0.into_owned()
}

/// Quoted-printable decoding. `header_mode` additionally maps `_` to space.
fn decode_quoted_printable(input: &str, header_mode: bool) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'=' if bytes.get(i + 1) == Some(&b'\n') => i += 2,
            b'=' if i + 2 < bytes.len() => {
                match hex_pair(bytes[i + 1], bytes[i + 2]) {
                    Some(b) => {
                        out.push(b);
                        i += 3;
                    }
                    None => {
                        out.push(b'=');
                        i += 1;
                    }
                }
            }
            b'_' if header_mode => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    out
}

fn hex_pair(hi: u8, lo: u8) -> Option<u8> {
    let hi = (hi as char).to_digit(16)?;
    let lo = (lo as char).to_digit(16)?;
    Some((hi * 16 + lo) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn plain_text_headers_and_body() {
        let content = "Subject: Kickoff\nFrom: alice@example.com\nTo: bob@example.com, carol@example.com\nDate: 2024-03-01 10:00:00\n\nHello team,\nThe report is due by March 5th.\n";
        let msg = parse_plain_text(content, "kickoff.txt", "inbox/kickoff.txt".into());
        assert_eq!(msg.subject, "Kickoff");
        assert_eq!(msg.sender, "alice@example.com");
        assert_eq!(
            msg.participants,
            vec!["alice@example.com", "bob@example.com", "carol@example.com"]
        );
        assert!(msg.body.starts_with("Hello team,"));
        assert_eq!(msg.timestamp, 1_709_287_200.0);
    }

    #[test]
    fn plain_text_without_headers_uses_whole_file() {
        let content = "just some notes\nwith no header block\n";
        let msg = parse_plain_text(content, "notes.txt", "notes.txt".into());
        assert_eq!(msg.subject, "Text file: notes.txt");
        assert_eq!(msg.body, content);
        assert!(msg.participants.is_empty());
    }

    #[test]
    fn date_formats() {
        assert_eq!(
            parse_date("Fri, 01 Mar 2024 10:00:00 +0000"),
            Some(1_709_287_200.0)
        );
        assert_eq!(parse_date("03/01/2024 10:00"), Some(1_709_287_200.0));
        assert_eq!(parse_date("13/01/2024 10:00"), Some(1_705_140_000.0));
        assert_eq!(parse_date("not a date"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn eml_multipart_collects_plain_text() {
        let raw = "From: Alice <alice@example.com>\r\n\
To: bob@example.com\r\n\
Cc: Carol <carol@example.com>, alice@example.com\r\n\
Subject: =?UTF-8?B?UmU6IEtpY2tvZmY=?=\r\n\
Date: Fri, 01 Mar 2024 10:00:00 +0000\r\n\
Content-Type: multipart/alternative;\r\n\
\tboundary=\"XYZ\"\r\n\
\r\n\
preamble\r\n\
--XYZ\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\
\r\n\
We decided to ship on Fri=\r\n\
day.\r\n\
--XYZ\r\n\
Content-Type: text/html\r\n\
\r\n\
<p>ignored</p>\r\n\
--XYZ--\r\n";
        let msg = parse_eml(raw, "a.eml".into());
        assert_eq!(msg.subject, "Re: Kickoff");
        assert_eq!(msg.sender, "Alice <alice@example.com>");
        assert_eq!(
            msg.participants,
            vec!["alice@example.com", "bob@example.com", "carol@example.com"]
        );
        assert!(msg.body.contains("We decided to ship on Friday."));
        assert!(!msg.body.contains("ignored"));
        assert_eq!(msg.timestamp, 1_709_287_200.0);
    }

    #[test]
    fn eml_base64_single_part() {
        let raw = "Subject: Status\nFrom: a@b.io\nContent-Transfer-Encoding: base64\n\nSGVsbG8gd29ybGQ=\n";
        let msg = parse_eml(raw, "b.eml".into());
        assert_eq!(msg.body, "Hello world");
    }

    #[test]
    fn encoded_words() {
        assert_eq!(decode_header("=?ISO-8859-1?Q?caf=E9_menu?="), "café menu");
        assert_eq!(decode_header("=?UTF-8?Q?a?= =?UTF-8?Q?b?="), "ab");
        assert_eq!(decode_header("plain subject"), "plain subject");
    }

    #[test]
    fn windows_1252_maps_smart_punctuation() {
        assert_eq!(decode_header("=?windows-1252?Q?It=92s_done?="), "It\u{2019}s done");
        assert_eq!(decode_header("=?cp1252?Q?=80_5?="), "\u{20ac} 5");
        assert_eq!(decode_header("=?no-such-charset?Q?ok?="), "ok");
    }

    #[test]
    fn quoted_printable_body_uses_declared_charset() {
        let raw = "Subject: Budget\nFrom: a@b.io\n\
Content-Type: text/plain; charset=\"windows-1252\"\n\
Content-Transfer-Encoding: quoted-printable\n\n\
Total =80120 =96 approved\n";
        let msg = parse_eml(raw, "c.eml".into());
        assert_eq!(msg.body.trim_end(), "Total \u{20ac}120 \u{2013} approved");
    }

    #[test]
    fn multipart_part_without_headers_keeps_its_body() {
        let raw = "Subject: Plan\nFrom: a@b.io\n\
Content-Type: multipart/mixed; boundary=XYZ\n\n\
--XYZ\n\n\
Deadline: the venue is booked\nsecond line\n\
--XYZ--\n";
        let msg = parse_eml(raw, "d.eml".into());
        assert!(msg.body.contains("Deadline: the venue is booked"), "body: {:?}", msg.body);
        assert!(msg.body.contains("second line"));
        assert_eq!(msg.format, MessageFormat::Eml);
    }

    #[test]
    fn outlook_files_are_unsupported() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("note.msg");
        fs::write(&path, b"\xd0\xcf\x11\xe0").unwrap();
        assert!(matches!(
            parse_message(&path),
            Err(MessageError::UnsupportedFormat(_))
        ));
        assert!(parse_message(&tmp.path().join("x.pdf")).unwrap().is_none());
    }

    #[test]
    fn lists_only_message_files() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b.eml"), "x").unwrap();
        fs::write(tmp.path().join("a.txt"), "x").unwrap();
        fs::write(tmp.path().join("c.png"), "x").unwrap();
        fs::create_dir_all(tmp.path().join("nested")).unwrap();
        fs::write(tmp.path().join("nested/d.txt"), "x").unwrap();

        let files = list_message_files(tmp.path());
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.eml"]);
        assert!(list_message_files(&tmp.path().join("missing")).is_empty());
    }
}
