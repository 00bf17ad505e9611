//! Transcript parser
//!
//! Converts exported chat transcript text into messages, participants and
//! chat metadata. Header lines are matched against an ordered list of
//! dialects (date/time layouts of the various exporters); lines that match
//! no dialect continue the previous message.

use chrono::NaiveDateTime;
use encoding_rs::Encoding;
use hbd_common::config::{AnalysisConfig, DialectConfig, ExportFormats};
use hbd_common::models::{
    ChatId, ChatMeta, ChatType, Message, MessageId, MessageType, Participant, ParticipantId,
};
use hbd_common::time::expand_two_digit_year;
use hbd_common::{Error, Result};
use regex::{Captures, Regex};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Messages inspected when inferring the chat type
const CHAT_TYPE_SAMPLE: usize = 50;

/// Parser output for one transcript
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTranscript {
    pub chat: ChatMeta,
    pub messages: Vec<Message>,
    pub participants: Vec<Participant>,
    /// Orphan lines (no header match, nothing to continue) that were dropped
    pub dropped_lines: usize,
}

impl ParsedTranscript {
    /// Replace provisional ids with store-assigned ones
    ///
    /// `message_ids` and `participant_ids` are positional: the n-th id belongs
    /// to the n-th message/participant.
    pub fn rebind(
        mut self,
        chat_id: ChatId,
        message_ids: &[MessageId],
        participant_ids: &[ParticipantId],
    ) -> Result<Self> {
        if message_ids.len() != self.messages.len() {
            return Err(Error::InvalidInput(format!(
                "expected {} message ids, got {}",
                self.messages.len(),
                message_ids.len()
            )));
        }
        if participant_ids.len() != self.participants.len() {
            return Err(Error::InvalidInput(format!(
                "expected {} participant ids, got {}",
                self.participants.len(),
                participant_ids.len()
            )));
        }

        self.chat.id = chat_id;
        for (message, &id) in self.messages.iter_mut().zip(message_ids) {
            message.id = id;
            message.chat_id = chat_id;
        }
        for (participant, &id) in self.participants.iter_mut().zip(participant_ids) {
            participant.id = id;
            participant.chat_id = chat_id;
        }
        Ok(self)
    }
}

/// Header dialect with its regex compiled
#[derive(Debug)]
struct CompiledDialect {
    name: String,
    regex: Regex,
    date_format: String,
    time_format: String,
    groups: Vec<String>,
}

impl CompiledDialect {
    fn compile(name: &str, dialect: &DialectConfig) -> std::result::Result<Self, regex::Error> {
        Ok(Self {
            name: name.to_string(),
            regex: Regex::new(&dialect.pattern)?,
            date_format: dialect.date_format.clone(),
            time_format: dialect.time_format.clone(),
            groups: dialect.groups.clone(),
        })
    }

    /// Named capture first, then the positional group listed in `groups`
    fn group<'t>(&self, caps: &Captures<'t>, name: &str) -> Option<&'t str> {
        caps.name(name)
            .or_else(|| {
                self.groups
                    .iter()
                    .position(|g| g == name)
                    .and_then(|i| caps.get(i + 1))
            })
            .map(|m| m.as_str())
    }
}

/// Header fields extracted from one line
#[derive(Debug)]
struct Header {
    timestamp: NaiveDateTime,
    sender: Option<String>,
    text: String,
}

/// Message under construction (continuation lines still arriving)
#[derive(Debug)]
struct PendingMessage {
    header: Header,
    original_line: String,
}

/// Transcript parser
pub struct TranscriptParser {
    dialects: Vec<CompiledDialect>,
    encodings: Vec<&'static Encoding>,
    media_placeholders: Vec<String>,
    system_patterns: Vec<Regex>,
    phone_patterns: Vec<Regex>,
    name_prefixes: Vec<String>,
    group_filename_hints: Vec<String>,
}

impl TranscriptParser {
    /// Compile the parser tables from configuration
    ///
    /// Invalid entries are skipped with a warning. If no configured dialect
    /// compiles, the built-in dialects are used.
    pub fn new(config: &AnalysisConfig) -> Self {
        let mut dialects = compile_dialects(&config.export_formats);
        if dialects.is_empty() {
            warn!("No usable export format dialects configured, using built-in dialects");
            dialects = compile_dialects(&ExportFormats::builtin());
        }

        let mut encodings: Vec<&'static Encoding> = config
            .encodings
            .iter()
            .filter_map(|label| {
                let encoding = Encoding::for_label(label.trim().as_bytes());
                if encoding.is_none() {
                    warn!("Unknown encoding label '{}' ignored", label);
                }
                encoding
            })
            .collect();
        if encodings.is_empty() {
            encodings.push(encoding_rs::UTF_8);
        }

        let patterns = &config.patterns;
        Self {
            dialects,
            encodings,
            media_placeholders: patterns
                .media_placeholders
                .iter()
                .map(|p| p.to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
            system_patterns: compile_all("system pattern", &patterns.system_patterns, |p| {
                p.to_string()
            }),
            phone_patterns: compile_all(
                "phone pattern",
                &patterns.name_extraction.phone_patterns,
                |p| format!("^(?:{})", p),
            ),
            name_prefixes: patterns.name_extraction.name_prefixes.clone(),
            group_filename_hints: patterns
                .group_filename_hints
                .iter()
                .map(|h| h.to_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }

    /// Number of usable header dialects
    pub fn dialect_count(&self) -> usize {
        self.dialects.len()
    }

    /// Decode raw transcript bytes
    ///
    /// A leading BOM selects its encoding; otherwise the configured encodings
    /// are tried in order and the first one that decodes cleanly wins.
    pub fn decode(&self, bytes: &[u8], path: &str) -> Result<String> {
        if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
            let (text, had_errors) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
            if !had_errors {
                debug!(path, encoding = encoding.name(), "Decoded transcript using BOM");
                return Ok(text.into_owned());
            }
        }

        for encoding in &self.encodings {
            let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
            if !had_errors {
                debug!(path, encoding = encoding.name(), "Decoded transcript");
                return Ok(text.into_owned());
            }
        }

        Err(Error::Encoding {
            path: path.to_string(),
            tried: self
                .encodings
                .iter()
                .map(|e| e.name())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }

    /// Read, decode and parse a transcript file
    ///
    /// The chat is named after the file stem.
    pub fn parse_file(&self, path: &Path) -> Result<ParsedTranscript> {
        let bytes = std::fs::read(path)?;
        let display = path.display().to_string();
        let text = self.decode(&bytes, &display)?;
        let chat_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| display.clone());

        Ok(self.parse_transcript(text.lines(), &chat_name, Some(&display)))
    }

    /// Parse transcript lines into chat metadata, messages and participants
    ///
    /// Ids are provisional: messages and participants are numbered from 1 in
    /// transcript order and the chat id is 0 until [`ParsedTranscript::rebind`].
    pub fn parse_transcript<I, S>(
        &self,
        lines: I,
        chat_name: &str,
        source_path: Option<&str>,
    ) -> ParsedTranscript
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut pending: Option<PendingMessage> = None;
        let mut messages = Vec::new();
        let mut dropped_lines = 0;

        for (index, raw) in lines.into_iter().enumerate() {
            let line = clean_line(raw.as_ref());
            if line.is_empty() {
                continue;
            }

            match self.parse_header(&line) {
                Some(header) => {
                    if let Some(done) = pending.take() {
                        messages.push(self.finish_message(done, messages.len()));
                    }
                    pending = Some(PendingMessage {
                        header,
                        original_line: line,
                    });
                }
                None => match pending.as_mut() {
                    Some(current) => {
                        current.header.text.push('\n');
                        current.header.text.push_str(&line);
                        current.original_line.push('\n');
                        current.original_line.push_str(&line);
                    }
                    None => {
                        let err = Error::MalformedLine {
                            line_number: index + 1,
                            content: line,
                        };
                        warn!(chat = chat_name, "{}", err);
                        dropped_lines += 1;
                    }
                },
            }
        }
        if let Some(done) = pending.take() {
            messages.push(self.finish_message(done, messages.len()));
        }

        let chat_type = self.infer_chat_type(chat_name, &messages);
        let participants = self.extract_participants(&messages);

        let date_range = {
            let mut stamps = messages.iter().filter_map(|m| m.timestamp);
            stamps.next().map(|first| {
                stamps.fold((first, first), |(lo, hi), ts| (lo.min(ts), hi.max(ts)))
            })
        };

        info!(
            chat = chat_name,
            chat_type = chat_type.as_str(),
            messages = messages.len(),
            participants = participants.len(),
            dropped_lines,
            "Parsed transcript"
        );

        ParsedTranscript {
            chat: ChatMeta {
                id: 0,
                name: chat_name.to_string(),
                chat_type,
                source_path: source_path.map(str::to_string),
                message_count: messages.len(),
                date_range,
            },
            messages,
            participants,
            dropped_lines,
        }
    }

    /// Try each dialect in order; a dialect whose datetime does not parse
    /// yields to the next one
    fn parse_header(&self, line: &str) -> Option<Header> {
        for dialect in &self.dialects {
            let Some(caps) = dialect.regex.captures(line) else {
                continue;
            };
            let (Some(date), Some(time)) = (dialect.group(&caps, "date"), dialect.group(&caps, "time"))
            else {
                continue;
            };
            let ampm = dialect.group(&caps, "ampm").filter(|a| !a.trim().is_empty());

            match parse_datetime(date, time, ampm, &dialect.date_format, &dialect.time_format) {
                Some(timestamp) => {
                    let sender = dialect
                        .group(&caps, "sender")
                        .map(|s| self.clean_sender(s))
                        .filter(|s| !s.is_empty());
                    let text = dialect
                        .group(&caps, "message")
                        .unwrap_or_default()
                        .trim()
                        .to_string();
                    return Some(Header {
                        timestamp,
                        sender,
                        text,
                    });
                }
                None => {
                    debug!(dialect = %dialect.name, date, time, "Header matched but datetime did not parse");
                }
            }
        }
        None
    }

    fn finish_message(&self, pending: PendingMessage, position: usize) -> Message {
        let message_type = self.classify(&pending.header.text);
        Message {
            id: position as MessageId + 1,
            chat_id: 0,
            timestamp: Some(pending.header.timestamp),
            sender: pending.header.sender,
            text: pending.header.text,
            message_type,
            original_line: pending.original_line,
        }
    }

    /// Media/edit placeholders first, then system notices
    pub fn classify(&self, text: &str) -> MessageType {
        let lower = text.to_lowercase();
        if self.media_placeholders.iter().any(|p| lower.contains(p.as_str())) {
            MessageType::MediaOmitted
        } else if self.system_patterns.iter().any(|re| re.is_match(&lower)) {
            MessageType::System
        } else {
            MessageType::Normal
        }
    }

    /// Strip one configured name prefix
    fn clean_sender(&self, sender: &str) -> String {
        let sender = sender.trim();
        let stripped = self
            .name_prefixes
            .iter()
            .find_map(|prefix| sender.strip_prefix(prefix.as_str()))
            .unwrap_or(sender);
        stripped.trim().to_string()
    }

    /// True when the sender string itself is a phone number
    pub fn looks_like_phone(&self, sender: &str) -> bool {
        self.phone_patterns.iter().any(|re| re.is_match(sender))
    }

    fn infer_chat_type(&self, chat_name: &str, messages: &[Message]) -> ChatType {
        let lower_name = chat_name.to_lowercase();
        if self.group_filename_hints.iter().any(|h| lower_name.contains(h.as_str())) {
            return ChatType::Group;
        }

        let sample = &messages[..messages.len().min(CHAT_TYPE_SAMPLE)];
        if sample
            .iter()
            .any(|m| m.message_type == MessageType::System && group_event_regex().is_match(&m.text))
        {
            return ChatType::Group;
        }

        let senders: HashSet<&str> = sample
            .iter()
            .filter(|m| m.message_type != MessageType::System)
            .filter_map(|m| m.sender.as_deref())
            .collect();
        match senders.len() {
            0 | 1 => ChatType::Unknown,
            2 => ChatType::Direct,
            _ => ChatType::Group,
        }
    }

    /// One participant per distinct sender, plus phones seen in system
    /// notices and in-text mentions
    fn extract_participants(&self, messages: &[Message]) -> Vec<Participant> {
        let mut registry = ParticipantRegistry::default();

        for message in messages {
            if let Some(sender) = message.sender.as_deref() {
                if self.looks_like_phone(sender) {
                    match normalize_phone(sender) {
                        Some(phone) => registry.add_phone(&phone, Some(sender)),
                        None => registry.add_name(sender),
                    }
                } else {
                    registry.add_name(sender);
                }
            }

            match message.message_type {
                MessageType::System => {
                    for m in system_phone_regex().find_iter(&message.text) {
                        if let Some(phone) = normalize_phone(m.as_str()) {
                            registry.add_phone(&phone, None);
                        }
                    }
                }
                MessageType::Normal => {
                    for phone in mentioned_phones(&message.text) {
                        registry.add_phone(&phone, None);
                    }
                }
                MessageType::MediaOmitted => {}
            }
        }

        registry.participants
    }
}

/// Deduplicating participant builder
#[derive(Default)]
struct ParticipantRegistry {
    participants: Vec<Participant>,
    index: HashMap<String, usize>,
}

impl ParticipantRegistry {
    fn add_phone(&mut self, phone: &str, display_name: Option<&str>) {
        let key = format!("phone:{}", phone);
        if let Some(&i) = self.index.get(&key) {
            let existing = &mut self.participants[i];
            if existing.display_name.is_none() {
                existing.display_name = display_name.map(str::to_string);
            }
            return;
        }
        self.push(
            key,
            display_name.map(str::to_string),
            Some(phone.to_string()),
        );
    }

    fn add_name(&mut self, name: &str) {
        let key = format!("name:{}", name);
        if self.index.contains_key(&key) {
            return;
        }
        self.push(key, Some(name.to_string()), None);
    }

    fn push(&mut self, key: String, display_name: Option<String>, phone: Option<String>) {
        let id = self.participants.len() as ParticipantId + 1;
        self.index.insert(key, self.participants.len());
        self.participants.push(Participant {
            id,
            chat_id: 0,
            canonical_name: display_name.clone().or_else(|| phone.clone()),
            display_name,
            phone,
        });
    }
}

/// Normalize a phone number: keep digits and `+`, prefix `+` on numbers
/// longer than 10 digits
///
/// Returns `None` when fewer than 10 digits remain.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();
    let digits = cleaned.chars().filter(|c| c.is_ascii_digit()).count();
    if digits < 10 {
        return None;
    }
    if digits > 10 && !cleaned.starts_with('+') {
        Some(format!("+{}", cleaned))
    } else {
        Some(cleaned)
    }
}

/// Normalized phones mentioned in message text
pub fn mentioned_phones(text: &str) -> Vec<String> {
    let mut phones = Vec::new();
    for re in mention_phone_regexes() {
        for caps in re.captures_iter(text) {
            if let Some(phone) = caps.get(1).and_then(|m| normalize_phone(m.as_str())) {
                if !phones.contains(&phone) {
                    phones.push(phone);
                }
            }
        }
    }
    phones
}

fn parse_datetime(
    date: &str,
    time: &str,
    ampm: Option<&str>,
    date_format: &str,
    time_format: &str,
) -> Option<NaiveDateTime> {
    let (date, date_format) = expand_two_digit_year(date.trim(), date_format);
    let time = match ampm {
        Some(marker) => format!("{} {}", time.trim(), normalize_ampm(marker)),
        None => time.trim().to_string(),
    };
    let combined = format!("{} {}", date, time);

    if let Ok(ts) = NaiveDateTime::parse_from_str(&combined, &format!("{} {}", date_format, time_format)) {
        return Some(ts);
    }

    let fallbacks = [
        format!("{} %H:%M", date_format),
        format!("{} %H:%M:%S", date_format),
        format!("{} %I:%M %p", date_format),
        format!("{} %I:%M:%S %p", date_format),
        "%m/%d/%Y %I:%M %p".to_string(),
        "%m/%d/%Y %I:%M:%S %p".to_string(),
        "%m/%d/%Y %H:%M".to_string(),
        "%d/%m/%Y %I:%M %p".to_string(),
        "%d/%m/%Y %H:%M".to_string(),
        "%d/%m/%Y %H:%M:%S".to_string(),
    ];
    fallbacks
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&combined, fmt).ok())
}

/// "p.m." / "pm" / "P M" → "PM"
fn normalize_ampm(marker: &str) -> String {
    marker
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_uppercase()
}

/// Trim, drop directional marks and BOMs, normalize no-break spaces
fn clean_line(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '\u{200E}' | '\u{200F}' | '\u{FEFF}'))
        .map(|c| match c {
            '\u{00A0}' | '\u{202F}' => ' ',
            other => other,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

fn compile_dialects(formats: &ExportFormats) -> Vec<CompiledDialect> {
    formats
        .iter()
        .filter_map(|(name, dialect)| match CompiledDialect::compile(name, dialect) {
            Ok(compiled) => Some(compiled),
            Err(e) => {
                warn!(dialect = name, "Invalid dialect pattern skipped: {}", e);
                None
            }
        })
        .collect()
}

fn compile_all(kind: &str, patterns: &[String], wrap: impl Fn(&str) -> String) -> Vec<Regex> {
    patterns
        .iter()
        .filter(|p| !p.is_empty())
        .filter_map(|p| match Regex::new(&wrap(p)) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!("Invalid {} '{}' skipped: {}", kind, p, e);
                None
            }
        })
        .collect()
}

// Compile-once regex patterns via OnceLock.
fn group_event_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)created (?:the |this )?group|changed (?:the |this group's )?(?:group )?(?:subject|name)|group subject")
            .expect("group event regex should compile")
    })
}

fn system_phone_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[+]?\d[\d\s\-()]{8,}\d").expect("system phone regex should compile")
    })
}

fn mention_phone_regexes() -> &'static [Regex] {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        [
            r"@(\d{10,15})\b",
            r"@([+]\d{11,15})\b",
            r"(?:^|\s)([+]\d{1,3}\s?\d{5}\s?\d{5})\b",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("mention phone regex should compile"))
        .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn parser() -> TranscriptParser {
        TranscriptParser::new(&AnalysisConfig::default())
    }

    fn ts(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn test_parses_android_12h_lines() {
        let parsed = parser().parse_transcript(
            [
                "8/1/24, 9:15 AM - Alice: Happy birthday!",
                "8/1/24, 9:20 PM - Bob: HBD 🎂",
            ],
            "Alice",
            None,
        );

        assert_eq!(parsed.messages.len(), 2);
        assert_eq!(parsed.messages[0].timestamp, Some(ts(2024, 8, 1, 9, 15)));
        assert_eq!(parsed.messages[1].timestamp, Some(ts(2024, 8, 1, 21, 20)));
        assert_eq!(parsed.messages[0].sender.as_deref(), Some("Alice"));
        assert_eq!(parsed.messages[1].text, "HBD 🎂");
        assert_eq!(parsed.chat.chat_type, ChatType::Direct);
        assert_eq!(parsed.chat.message_count, 2);
    }

    #[test]
    fn test_parses_24h_and_ios_dialects() {
        let parsed = parser().parse_transcript(
            [
                "31/12/20, 21:08 - Carol: Happy new year",
                "[12/30/20, 9:05:10 PM] Dave: hi",
                "[31/12/2020, 21:08:15] Erin: late",
            ],
            "Mixed",
            None,
        );

        let stamps: Vec<_> = parsed.messages.iter().map(|m| m.timestamp.unwrap()).collect();
        assert_eq!(stamps[0], ts(2020, 12, 31, 21, 8));
        assert_eq!(stamps[1], NaiveDate::from_ymd_opt(2020, 12, 30).unwrap().and_hms_opt(21, 5, 10).unwrap());
        assert_eq!(stamps[2], NaiveDate::from_ymd_opt(2020, 12, 31).unwrap().and_hms_opt(21, 8, 15).unwrap());
    }

    #[test]
    fn test_two_digit_year_pivot() {
        let parsed = parser().parse_transcript(
            ["1/2/31, 10:00 AM - Old: hello", "1/2/30, 10:00 AM - New: hello"],
            "Years",
            None,
        );
        assert_eq!(parsed.messages[0].timestamp.unwrap().date().format("%Y").to_string(), "1931");
        assert_eq!(parsed.messages[1].timestamp.unwrap().date().format("%Y").to_string(), "2030");
    }

    #[test]
    fn test_continuation_and_orphan_lines() {
        let parsed = parser().parse_transcript(
            [
                "stray line before anything",
                "8/1/24, 9:15 AM - Alice: Happy birthday",
                "have a great year",
                "",
                "8/1/24, 9:16 AM - Bob: same!",
            ],
            "Chat",
            None,
        );

        assert_eq!(parsed.dropped_lines, 1);
        assert_eq!(parsed.messages.len(), 2);
        assert_eq!(parsed.messages[0].text, "Happy birthday\nhave a great year");
        assert!(parsed.messages[0].original_line.contains('\n'));
    }

    #[test]
    fn test_message_classification() {
        let parsed = parser().parse_transcript(
            [
                "8/1/24, 9:15 AM - Alice: <Media omitted>",
                "8/1/24, 9:16 AM - Messages and calls are end-to-end encrypted. Tap to learn more.",
                "8/1/24, 9:17 AM - Bob: left the group",
                "8/1/24, 9:18 AM - Bob: just text",
            ],
            "Chat",
            None,
        );

        let kinds: Vec<_> = parsed.messages.iter().map(|m| m.message_type).collect();
        assert_eq!(
            kinds,
            vec![
                MessageType::MediaOmitted,
                MessageType::System,
                MessageType::System,
                MessageType::Normal
            ]
        );
        assert_eq!(parsed.messages[1].sender, None);
    }

    #[test]
    fn test_directional_marks_and_nbsp_are_normalized() {
        let parsed = parser().parse_transcript(
            ["\u{200E}8/1/24, 9:15\u{202F}AM - Alice: Happy\u{00A0}birthday"],
            "Chat",
            None,
        );
        assert_eq!(parsed.messages.len(), 1);
        assert_eq!(parsed.messages[0].text, "Happy birthday");
    }

    #[test]
    fn test_filename_hint_forces_group() {
        let parsed = parser().parse_transcript(
            ["8/1/24, 9:15 AM - Alice: hi", "8/1/24, 9:16 AM - Bob: hi"],
            "WhatsApp Chat with Family Group",
            None,
        );
        assert_eq!(parsed.chat.chat_type, ChatType::Group);
    }

    #[test]
    fn test_group_creation_notice_forces_group() {
        let parsed = parser().parse_transcript(
            [
                "8/1/24, 9:00 AM - Alice created group \"Cousins\"",
                "8/1/24, 9:15 AM - Alice: hi",
            ],
            "Cousins",
            None,
        );
        assert_eq!(parsed.messages[0].message_type, MessageType::System);
        assert_eq!(parsed.chat.chat_type, ChatType::Group);
    }

    #[test]
    fn test_three_senders_is_group_single_sender_unknown() {
        let p = parser();
        let group = p.parse_transcript(
            [
                "8/1/24, 9:15 AM - A: hi",
                "8/1/24, 9:16 AM - B: hi",
                "8/1/24, 9:17 AM - C: hi",
            ],
            "Chat",
            None,
        );
        assert_eq!(group.chat.chat_type, ChatType::Group);

        let single = p.parse_transcript(["8/1/24, 9:15 AM - A: hi"], "Chat", None);
        assert_eq!(single.chat.chat_type, ChatType::Unknown);
    }

    #[test]
    fn test_participants_dedupe_by_phone_and_name() {
        let parsed = parser().parse_transcript(
            [
                "8/1/24, 9:15 AM - +91 98765 43210: hello",
                "8/1/24, 9:16 AM - +919876543210: again",
                "8/1/24, 9:17 AM - Alice: hi @5551234567",
                "8/1/24, 9:18 AM - Alice: hi again",
                "8/1/24, 9:19 AM - Bob added +1 (555) 999-0000",
            ],
            "Family Group",
            None,
        );

        let phones: Vec<_> = parsed
            .participants
            .iter()
            .filter_map(|p| p.phone.clone())
            .collect();
        assert_eq!(phones, vec!["+919876543210", "5551234567", "+15559990000"]);

        let names: Vec<_> = parsed
            .participants
            .iter()
            .filter_map(|p| p.display_name.clone())
            .collect();
        assert_eq!(names, vec!["+91 98765 43210", "Alice"]);

        let ids: Vec<_> = parsed.participants.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_name_prefix_is_stripped_once() {
        let parsed = parser().parse_transcript(["8/1/24, 9:15 AM - Dr. Dr. Who: hi"], "Chat", None);
        assert_eq!(parsed.messages[0].sender.as_deref(), Some("Dr. Who"));
    }

    #[test]
    fn test_positional_groups_and_dialect_order() {
        let mut config = AnalysisConfig::default();
        config.export_formats = ExportFormats(vec![
            (
                "broken".to_string(),
                DialectConfig {
                    pattern: "([".to_string(),
                    date_format: "%Y-%m-%d".to_string(),
                    time_format: "%H:%M".to_string(),
                    groups: vec![],
                },
            ),
            (
                "iso".to_string(),
                DialectConfig {
                    pattern: r"^(\d{4}-\d{2}-\d{2}) (\d{2}:\d{2}) <([^>]+)> (.*)$".to_string(),
                    date_format: "%Y-%m-%d".to_string(),
                    time_format: "%H:%M".to_string(),
                    groups: vec!["date".into(), "time".into(), "sender".into(), "message".into()],
                },
            ),
        ]);

        let p = TranscriptParser::new(&config);
        assert_eq!(p.dialect_count(), 1);

        let parsed = p.parse_transcript(["2024-08-01 10:30 <sam> happy birthday"], "Irc", None);
        assert_eq!(parsed.messages[0].sender.as_deref(), Some("sam"));
        assert_eq!(parsed.messages[0].timestamp, Some(ts(2024, 8, 1, 10, 30)));
    }

    #[test]
    fn test_unparseable_datetime_yields_to_next_dialect() {
        let mut config = AnalysisConfig::default();
        let mut dialects = vec![(
            "wrong_format".to_string(),
            DialectConfig {
                pattern: r"^(?P<date>\S+) (?P<time>\S+) - (?P<sender>[^:]+): (?P<message>.*)$".to_string(),
                date_format: "%Y.%j".to_string(),
                time_format: "%H".to_string(),
                groups: vec![],
            },
        )];
        dialects.extend(ExportFormats::builtin().0);
        config.export_formats = ExportFormats(dialects);

        let parsed = TranscriptParser::new(&config).parse_transcript(["31/12/20, 21:08 - Carol: hi"], "Chat", None);
        assert_eq!(parsed.messages.len(), 1);
        assert_eq!(parsed.messages[0].timestamp, Some(ts(2020, 12, 31, 21, 8)));
    }

    #[test]
    fn test_empty_dialect_table_falls_back_to_builtin() {
        let mut config = AnalysisConfig::default();
        config.export_formats = ExportFormats(vec![]);
        let p = TranscriptParser::new(&config);
        assert_eq!(p.dialect_count(), ExportFormats::builtin().len());
    }

    #[test]
    fn test_decode_with_bom_and_fallback() {
        let p = parser();

        let mut utf16 = vec![0xFF, 0xFE];
        for unit in "hi".encode_utf16() {
            utf16.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(p.decode(&utf16, "a.txt").unwrap(), "hi");

        // 0xE9 is not valid UTF-8 on its own; windows-1252 reads it as é
        assert_eq!(p.decode(b"caf\xE9", "b.txt").unwrap(), "café");
    }

    #[test]
    fn test_decode_failure_is_encoding_error() {
        let mut config = AnalysisConfig::default();
        config.encodings = vec!["utf-8".to_string()];
        let err = TranscriptParser::new(&config).decode(b"\xFF\xFF\xC3", "bad.txt").unwrap_err();
        assert!(matches!(err, Error::Encoding { ref path, .. } if path == "bad.txt"));
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("+91 98765-43210").as_deref(), Some("+919876543210"));
        assert_eq!(normalize_phone("919876543210").as_deref(), Some("+919876543210"));
        assert_eq!(normalize_phone("(555) 123-4567").as_deref(), Some("5551234567"));
        assert_eq!(normalize_phone("12345"), None);
    }

    #[test]
    fn test_rebind_assigns_store_ids() {
        let parsed = parser().parse_transcript(
            ["8/1/24, 9:15 AM - Alice: hi", "8/1/24, 9:16 AM - Bob: hi"],
            "Chat",
            None,
        );
        let rebound = parsed.clone().rebind(7, &[70, 71], &[700, 701]).unwrap();
        assert_eq!(rebound.chat.id, 7);
        assert_eq!(rebound.messages[1].id, 71);
        assert!(rebound.messages.iter().all(|m| m.chat_id == 7));
        assert_eq!(rebound.participants[0].id, 700);

        assert!(parsed.rebind(7, &[1], &[1, 2]).is_err());
    }

    #[test]
    fn test_date_range_covers_all_messages() {
        let parsed = parser().parse_transcript(
            ["8/2/24, 9:15 AM - A: hi", "8/1/24, 9:15 AM - B: hi", "8/3/24, 9:15 AM - A: hi"],
            "Chat",
            None,
        );
        let (lo, hi) = parsed.chat.date_range.unwrap();
        assert_eq!(lo, ts(2024, 8, 1, 9, 15));
        assert_eq!(hi, ts(2024, 8, 3, 9, 15));
    }
}
