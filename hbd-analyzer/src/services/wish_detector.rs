//! Birthday wish detection
//!
//! Scores each normal message for how likely it is to be a birthday wish
//! and extracts the signals later stages need: mentions, thanks and timing
//! modifiers. Phrase tables come from configuration and are compiled once.

use hbd_common::config::AnalysisConfig;
use hbd_common::models::{Message, MessageType, Modifier, WishMessage};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

const STRONG_MATCH_WEIGHT: f64 = 0.8;
const WEAK_SIGNAL_WEIGHT: f64 = 0.1;
const MULTIPLE_STRONG_BONUS: f64 = 0.2;
const SHORT_MESSAGE_WORDS: usize = 3;
const SHORT_MESSAGE_FACTOR: f64 = 0.5;

/// Case-insensitive whole-word matcher over an ordered phrase list
#[derive(Debug)]
struct PhraseMatcher {
    regex: Option<Regex>,
}

impl PhraseMatcher {
    /// An empty phrase list never matches
    fn new(kind: &str, phrases: &[String]) -> Self {
        let mut phrases: Vec<&str> = phrases
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect();
        if phrases.is_empty() {
            return Self { regex: None };
        }
        // Longest first so "happy belated birthday" wins over its prefixes
        phrases.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));

        let alternatives: Vec<String> = phrases.iter().map(|p| word_bounded(p)).collect();
        let pattern = format!("(?i)(?:{})", alternatives.join("|"));
        match Regex::new(&pattern) {
            Ok(regex) => Self { regex: Some(regex) },
            Err(e) => {
                warn!("Could not compile {} phrases: {}", kind, e);
                Self { regex: None }
            }
        }
    }

    fn is_match(&self, text: &str) -> bool {
        self.regex.as_ref().is_some_and(|re| re.is_match(text))
    }

    /// Distinct matched phrases (lowercased), in order of first appearance
    fn distinct_matches(&self, text: &str) -> Vec<String> {
        let Some(re) = &self.regex else {
            return Vec::new();
        };
        let mut seen = Vec::new();
        for m in re.find_iter(text) {
            let phrase = m.as_str().to_lowercase();
            if !seen.contains(&phrase) {
                seen.push(phrase);
            }
        }
        seen
    }
}

/// `\b` only on sides where the phrase starts/ends with a word character
fn word_bounded(phrase: &str) -> String {
    let is_word = |c: Option<char>| c.is_some_and(|c| c.is_alphanumeric() || c == '_');
    let start = if is_word(phrase.chars().next()) { r"\b" } else { "" };
    let end = if is_word(phrase.chars().last()) { r"\b" } else { "" };
    format!("{}{}{}", start, regex::escape(phrase), end)
}

fn mention_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)@(\d{10,15})\b|@(\w+)|\b(?:happy\s+birthday|hbd|bday)[\s,]+(\w+)|\b(?:to|for)\s+(\w+)",
        )
        .expect("mention regex should compile")
    })
}

/// Birthday wish detector
#[derive(Debug)]
pub struct WishDetector {
    strong: PhraseMatcher,
    thanks: PhraseMatcher,
    belated: PhraseMatcher,
    advance: PhraseMatcher,
    negative: PhraseMatcher,
    weak_signals: Vec<String>,
    mention_stopwords: HashSet<String>,
}

impl WishDetector {
    pub fn new(config: &AnalysisConfig) -> Self {
        let patterns = &config.patterns;
        Self {
            strong: PhraseMatcher::new("strong wish", &patterns.strong_wishes),
            thanks: PhraseMatcher::new("thanks", &patterns.thanks_patterns),
            belated: PhraseMatcher::new("belated", &patterns.modifiers.belated),
            advance: PhraseMatcher::new("advance", &patterns.modifiers.advance),
            negative: PhraseMatcher::new("negative", &patterns.negative_patterns),
            weak_signals: patterns
                .weak_signals
                .iter()
                .filter(|s| !s.is_empty())
                .cloned()
                .collect(),
            mention_stopwords: patterns
                .name_extraction
                .mention_stopwords
                .iter()
                .map(|w| w.to_lowercase())
                .collect(),
        }
    }

    /// Analyze every normal message; messages scoring zero are skipped
    pub fn detect_wishes(&self, messages: &[Message]) -> Vec<WishMessage> {
        let wishes: Vec<WishMessage> = messages.iter().filter_map(|m| self.analyze(m)).collect();
        info!(
            messages = messages.len(),
            wishes = wishes.len(),
            "Wish detection complete"
        );
        wishes
    }

    /// Analyze one message
    ///
    /// Returns `None` for non-normal messages and for a zero score.
    pub fn analyze(&self, message: &Message) -> Option<WishMessage> {
        if message.message_type != MessageType::Normal {
            return None;
        }

        let (wish_score, patterns_matched) = self.score(&message.text);
        if wish_score <= 0.0 {
            return None;
        }

        let wish = WishMessage {
            message_id: message.id,
            wish_score,
            mentioned_names: self.extract_mentions(&message.text),
            is_thanks: self.is_thanks(&message.text),
            modifiers: self.modifiers(&message.text),
            patterns_matched,
        };
        debug!(
            message_id = message.id,
            score = wish.wish_score,
            is_thanks = wish.is_thanks,
            "Wish detected"
        );
        Some(wish)
    }

    /// Wish score in [0, 1]
    pub fn score_message(&self, text: &str) -> f64 {
        self.score(text).0
    }

    fn score(&self, text: &str) -> (f64, Vec<String>) {
        if self.negative.is_match(text) {
            return (0.0, Vec::new());
        }

        let mut matched = self.strong.distinct_matches(text);
        let strong_count = matched.len();
        let mut score = STRONG_MATCH_WEIGHT * strong_count as f64;

        for signal in &self.weak_signals {
            if text.contains(signal.as_str()) {
                score += WEAK_SIGNAL_WEIGHT;
                matched.push(signal.clone());
            }
        }

        if strong_count > 1 {
            score += MULTIPLE_STRONG_BONUS;
        }

        if strong_count == 0 && text.split_whitespace().count() < SHORT_MESSAGE_WORDS {
            score *= SHORT_MESSAGE_FACTOR;
        }

        (score.clamp(0.0, 1.0), matched)
    }

    /// Phone mentions (kept as `@<digits>`) and name mentions, deduplicated
    pub fn extract_mentions(&self, text: &str) -> Vec<String> {
        let mut mentions: Vec<String> = Vec::new();
        for caps in mention_regex().captures_iter(text) {
            let mention = if let Some(phone) = caps.get(1) {
                format!("@{}", phone.as_str())
            } else if let Some(name) = caps.get(2).or_else(|| caps.get(3)).or_else(|| caps.get(4)) {
                let name = name.as_str();
                if name.chars().count() <= 1 || self.mention_stopwords.contains(&name.to_lowercase()) {
                    continue;
                }
                name.to_string()
            } else {
                continue;
            };

            if !mentions.contains(&mention) {
                mentions.push(mention);
            }
        }
        mentions
    }

    pub fn is_thanks(&self, text: &str) -> bool {
        self.thanks.is_match(text)
    }

    /// Belated and advance may both be present
    pub fn modifiers(&self, text: &str) -> Vec<Modifier> {
        let mut modifiers = Vec::new();
        if self.belated.is_match(text) {
            modifiers.push(Modifier::Belated);
        }
        if self.advance.is_match(text) {
            modifiers.push(Modifier::Advance);
        }
        modifiers
    }
}

impl Default for WishDetector {
    fn default() -> Self {
        Self::new(&AnalysisConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: i64, text: &str, message_type: MessageType) -> Message {
        Message {
            id,
            chat_id: 1,
            timestamp: None,
            sender: Some("Alice".to_string()),
            text: text.to_string(),
            message_type,
            original_line: text.to_string(),
        }
    }

    #[test]
    fn test_single_strong_phrase() {
        let detector = WishDetector::default();
        let score = detector.score_message("Happy birthday my friend");
        assert!((score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_multiple_strong_phrases_clamp_to_one() {
        let detector = WishDetector::default();
        assert_eq!(detector.score_message("Happy birthday! HBD! Many happy returns 🎂🎉"), 1.0);
    }

    #[test]
    fn test_repeated_phrase_counts_once() {
        let detector = WishDetector::default();
        let score = detector.score_message("happy birthday happy birthday happy birthday");
        assert!((score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_weak_signals_in_short_message_are_halved() {
        let detector = WishDetector::default();
        let score = detector.score_message("🎂🎉");
        assert!((score - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_whole_word_matching() {
        let detector = WishDetector::default();
        // "hbd" inside another word must not match
        assert_eq!(detector.score_message("the hbdx server is down today"), 0.0);
    }

    #[test]
    fn test_negative_pattern_short_circuits() {
        let detector = WishDetector::default();
        assert_eq!(
            detector.score_message("Happy birthday planning meeting, when is your birthday? 🎂"),
            0.0
        );
    }

    #[test]
    fn test_score_always_in_unit_interval() {
        let detector = WishDetector::default();
        for text in [
            "",
            "hi",
            "🎂",
            "🎂🎉🎈🥳🎁🍰🎊💐",
            "happy birthday hbd happy bday many happy returns birthday wishes 🎂🎉🎈🥳🎁🍰🎊",
            "whose birthday is it",
        ] {
            let s = detector.score_message(text);
            assert!((0.0..=1.0).contains(&s), "{} scored {}", text, s);
        }
    }

    #[test]
    fn test_only_normal_messages_are_analyzed() {
        let detector = WishDetector::default();
        let messages = vec![
            message(1, "Happy birthday!", MessageType::Normal),
            message(2, "Happy birthday!", MessageType::System),
            message(3, "Happy birthday!", MessageType::MediaOmitted),
            message(4, "see you later", MessageType::Normal),
        ];
        let wishes = detector.detect_wishes(&messages);
        assert_eq!(wishes.len(), 1);
        assert_eq!(wishes[0].message_id, 1);
        assert_eq!(wishes[0].patterns_matched, vec!["happy birthday".to_string()]);
    }

    #[test]
    fn test_mentions() {
        let detector = WishDetector::default();
        let mentions = detector.extract_mentions("Happy birthday Sarath! @5551234567 @Priya hbd to you");
        assert_eq!(mentions, vec!["Sarath", "@5551234567", "Priya"]);
    }

    #[test]
    fn test_mentions_drop_single_letters_and_stopwords() {
        let detector = WishDetector::default();
        assert!(detector.extract_mentions("happy birthday u, this is for you @x").is_empty());
    }

    #[test]
    fn test_thanks_and_modifiers() {
        let detector = WishDetector::default();
        assert!(detector.is_thanks("Thank you all for the wishes"));
        assert!(!detector.is_thanks("thanksgiving dinner"));
        assert_eq!(
            detector.modifiers("Belated happy birthday, and in advance for next year"),
            vec![Modifier::Belated, Modifier::Advance]
        );
        assert!(detector.modifiers("happy birthday").is_empty());
    }

    #[test]
    fn test_thank_you_with_birthday_wishes_is_a_wish() {
        let detector = WishDetector::default();
        let wish = detector
            .analyze(&message(9, "Thank you all for the birthday wishes", MessageType::Normal))
            .unwrap();
        assert!(wish.is_thanks);
        assert!(wish.mentioned_names.is_empty());
        assert!(wish.wish_score >= 0.8);
    }

    #[test]
    fn test_empty_phrase_lists_never_match() {
        let mut config = AnalysisConfig::default();
        config.patterns.strong_wishes.clear();
        config.patterns.negative_patterns.clear();
        let detector = WishDetector::new(&config);
        assert_eq!(detector.score_message("happy birthday to everyone here"), 0.0);
    }
}
