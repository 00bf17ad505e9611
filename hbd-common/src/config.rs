//! Analysis configuration: schema, built-in defaults, loading and resolution
//!
//! Every option has a built-in default. Missing or invalid configuration is
//! never fatal: loaders warn and fall back to defaults so analysis can run
//! with zero setup.
//!
//! Config file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`HBD_CONFIG`)
//! 3. User config file (`<config_dir>/hbd/config.toml`)
//! 4. System config file (`/etc/hbd/config.toml`, Linux only)
//! 5. Built-in defaults (no file)

use crate::{Error, Result};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "HBD_CONFIG";

// ============================================================================
// Schema
// ============================================================================

/// Complete analysis configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub patterns: PatternConfig,
    pub clustering: ClusteringConfig,
    pub confidence: ConfidenceConfig,
    /// Transcript header dialects, tried in document order
    pub export_formats: ExportFormats,
    /// Encoding labels tried in order when a transcript has no BOM
    pub encodings: Vec<String>,
    pub enrichment: EnrichmentConfig,
    pub logging: LoggingConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            patterns: PatternConfig::default(),
            clustering: ClusteringConfig::default(),
            confidence: ConfidenceConfig::default(),
            export_formats: ExportFormats::default(),
            encodings: strings(&["utf-8", "windows-1252"]),
            enrichment: EnrichmentConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Phrase tables used by parsing and wish detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    pub strong_wishes: Vec<String>,
    pub thanks_patterns: Vec<String>,
    pub modifiers: ModifierPatterns,
    pub negative_patterns: Vec<String>,
    /// Tokens (usually emoji) matched as plain substrings
    pub weak_signals: Vec<String>,
    /// Lowercase substrings marking media/edit placeholders
    pub media_placeholders: Vec<String>,
    /// Regexes (matched against lowercased text) marking system notices
    pub system_patterns: Vec<String>,
    pub name_extraction: NameExtractionConfig,
    /// Filename substrings that force a group chat
    pub group_filename_hints: Vec<String>,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            strong_wishes: strings(&[
                "happy birthday",
                "happy bday",
                "happy b'day",
                "happy birth day",
                "hbd",
                "many happy returns",
                "happy returns of the day",
                "birthday wishes",
                "bday wishes",
                "happy belated birthday",
                "feliz cumpleaños",
                "feliz aniversário",
                "joyeux anniversaire",
                "alles gute zum geburtstag",
                "buon compleanno",
                "janamdin mubarak",
            ]),
            thanks_patterns: strings(&[
                "thank you",
                "thanks",
                "thank u",
                "thanku",
                "thx",
                "tysm",
                "grateful",
                "much appreciated",
                "thanks for the wishes",
            ]),
            modifiers: ModifierPatterns::default(),
            negative_patterns: strings(&[
                "when is your birthday",
                "whose birthday",
                "not my birthday",
                "birthday party invitation",
                "birthday planning",
                "forgot your birthday",
            ]),
            weak_signals: strings(&["🎂", "🎉", "🎈", "🥳", "🎁", "🍰", "🎊", "💐"]),
            media_placeholders: strings(&[
                "<media omitted>",
                "image omitted",
                "video omitted",
                "audio omitted",
                "document omitted",
                "sticker omitted",
                "gif omitted",
                "contact card omitted",
                "<this message was edited>",
                "this message was deleted",
                "you deleted this message",
            ]),
            system_patterns: strings(&[
                r"\badded\s+[+\d][\d\s\-()]{6,}",
                r"changed.*phone.*number.*to\s+[+\d][\d\s\-()]+",
                r"\bleft the group\b",
                r"^left$",
                r"messages.*secured.*end-to-end.*encryption",
                r"messages and calls are end-to-end encrypted",
                r"created.*group",
                r"changed.*group.*subject",
                r"changed the subject",
                r"joined using this group's invite link",
            ]),
            name_extraction: NameExtractionConfig::default(),
            group_filename_hints: strings(&["group", "grupo", "groupe"]),
        }
    }
}

/// Timing modifier phrase sets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModifierPatterns {
    pub belated: Vec<String>,
    pub advance: Vec<String>,
}

impl Default for ModifierPatterns {
    fn default() -> Self {
        Self {
            belated: strings(&[
                "belated",
                "late wishes",
                "sorry for the late",
                "sorry i'm late",
                "bit late",
                "yesterday",
            ]),
            advance: strings(&[
                "in advance",
                "advance",
                "early wishes",
                "a day early",
                "tomorrow",
            ]),
        }
    }
}

/// Sender cleanup and mention extraction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NameExtractionConfig {
    /// Prefixes stripped (once) from sender names
    pub name_prefixes: Vec<String>,
    /// Regexes deciding whether a sender string is a phone number
    pub phone_patterns: Vec<String>,
    /// Words captured by mention patterns that are not names
    pub mention_stopwords: Vec<String>,
}

impl Default for NameExtractionConfig {
    fn default() -> Self {
        Self {
            name_prefixes: strings(&["MS - ", "Mr. ", "Mrs. ", "Dr. "]),
            phone_patterns: strings(&[r"[+]?[\d\s\-\(\)]{10,}"]),
            mention_stopwords: strings(&[
                "you", "u", "ya", "yaa", "all", "everyone", "everybody", "the", "me", "us",
                "him", "her", "them", "dear", "my", "your", "our", "to", "for", "and",
            ]),
        }
    }
}

/// Shortest clustering window accepted (one minute)
pub const MIN_WINDOW_HOURS: f64 = 1.0 / 60.0;
/// Longest clustering window accepted (one year)
pub const MAX_WINDOW_HOURS: f64 = 24.0 * 366.0;

/// Sliding-window clustering settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    pub window_hours: f64,
    pub min_wish_score: f64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            window_hours: 36.0,
            min_wish_score: 0.3,
        }
    }
}

impl ClusteringConfig {
    /// Window length in whole seconds, bounded to the accepted range
    ///
    /// A non-finite value yields the default window.
    pub fn window_seconds(&self) -> i64 {
        let hours = if self.window_hours.is_finite() {
            self.window_hours.clamp(MIN_WINDOW_HOURS, MAX_WINDOW_HOURS)
        } else {
            ClusteringConfig::default().window_hours
        };
        (hours * 3600.0).round() as i64
    }
}

/// Additive confidence model magnitudes
///
/// Penalties may be written with either sign; their magnitude is subtracted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    pub base_score: f64,
    pub multi_year_bonus: f64,
    pub unique_wishers_bonus: f64,
    pub explicit_mention_bonus: f64,
    pub thanks_bonus: f64,
    pub phone_bonus: f64,
    pub multi_chat_phone_bonus: f64,
    pub date_consistency_bonus: f64,
    pub conflicting_dates_penalty: f64,
    pub low_evidence_penalty: f64,
    pub group_inference_penalty: f64,
    pub min_threshold: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            base_score: 0.3,
            multi_year_bonus: 0.2,
            unique_wishers_bonus: 0.2,
            explicit_mention_bonus: 0.1,
            thanks_bonus: 0.15,
            phone_bonus: 0.05,
            multi_chat_phone_bonus: 0.05,
            date_consistency_bonus: 0.1,
            conflicting_dates_penalty: 0.2,
            low_evidence_penalty: 0.1,
            group_inference_penalty: 0.15,
            min_threshold: 0.6,
        }
    }
}

/// One transcript header dialect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialectConfig {
    /// Regex with named groups (date, time, ampm, sender, message) or
    /// positional groups named by `groups`
    pub pattern: String,
    pub date_format: String,
    pub time_format: String,
    #[serde(default)]
    pub groups: Vec<String>,
}

/// Ordered dialect table
///
/// Deserialized from a map while keeping document order, so the first
/// dialect listed is the first one tried.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportFormats(pub Vec<(String, DialectConfig)>);

impl ExportFormats {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DialectConfig)> {
        self.0.iter().map(|(name, dialect)| (name.as_str(), dialect))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Built-in dialects covering common Android and iOS exports
    pub fn builtin() -> Self {
        let dialect = |pattern: &str, date_format: &str, time_format: &str| DialectConfig {
            pattern: pattern.to_string(),
            date_format: date_format.to_string(),
            time_format: time_format.to_string(),
            groups: Vec::new(),
        };
        Self(vec![
            (
                "android_12h".to_string(),
                dialect(
                    r"^(?P<date>\d{1,2}/\d{1,2}/\d{2,4}),?\s+(?P<time>\d{1,2}:\d{2})\s*(?P<ampm>[AaPp]\.?\s?[Mm]\.?)\s*-\s*(?:(?P<sender>[^:]+?):\s*)?(?P<message>.*)$",
                    "%m/%d/%y",
                    "%I:%M %p",
                ),
            ),
            (
                "android_24h".to_string(),
                dialect(
                    r"^(?P<date>\d{1,2}/\d{1,2}/\d{2,4}),?\s+(?P<time>\d{1,2}:\d{2})\s*-\s*(?:(?P<sender>[^:]+?):\s*)?(?P<message>.*)$",
                    "%d/%m/%y",
                    "%H:%M",
                ),
            ),
            (
                "dotted_24h".to_string(),
                dialect(
                    r"^(?P<date>\d{1,2}\.\d{1,2}\.\d{2,4}),?\s+(?P<time>\d{1,2}:\d{2})\s*-\s*(?:(?P<sender>[^:]+?):\s*)?(?P<message>.*)$",
                    "%d.%m.%y",
                    "%H:%M",
                ),
            ),
            (
                "ios".to_string(),
                dialect(
                    r"^\[(?P<date>\d{1,2}/\d{1,2}/\d{2,4}),\s*(?P<time>\d{1,2}:\d{2}:\d{2})\s*(?P<ampm>[AaPp]\.?\s?[Mm]\.?)?\]\s*(?:(?P<sender>[^:]+?):\s*)?(?P<message>.*)$",
                    "%m/%d/%y",
                    "%I:%M:%S %p",
                ),
            ),
        ])
    }
}

impl Default for ExportFormats {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Serialize for ExportFormats {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, dialect) in &self.0 {
            map.serialize_entry(name, dialect)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ExportFormats {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct OrderedDialects;

        impl<'de> Visitor<'de> for OrderedDialects {
            type Value = ExportFormats;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of dialect name to dialect definition")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
                let mut dialects = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, dialect)) = access.next_entry::<String, DialectConfig>()? {
                    dialects.push((name, dialect));
                }
                Ok(ExportFormats(dialects))
            }
        }

        deserializer.deserialize_map(OrderedDialects)
    }
}

/// Optional AI-assisted enrichment settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub enabled: bool,
    pub timeout_ms: u64,
    /// Upper bound on messages handed to the enrichment collaborator
    pub max_messages: usize,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_ms: 10_000,
            max_messages: 10,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// Loading
// ============================================================================

impl AnalysisConfig {
    /// Parse TOML configuration text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Parse JSON configuration text
    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| Error::Config(format!("Parse JSON failed: {}", e)))
    }

    /// Load a config file; `.json` files are read as JSON, anything else as TOML
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let config = if is_json {
            Self::from_json_str(&content)?
        } else {
            Self::from_toml_str(&content)?
        };

        Ok(config.sanitize())
    }

    /// Load a config file, falling back to built-in defaults on any failure
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            info!("No config file found, using built-in defaults");
            return Self::default();
        };

        match Self::load(path) {
            Ok(config) => {
                info!("Loaded configuration from {}", path.display());
                config
            }
            Err(e) => {
                warn!("{}; using built-in defaults", e);
                Self::default()
            }
        }
    }

    /// Replace out-of-range numeric settings with their defaults
    pub fn sanitize(mut self) -> Self {
        let clustering = ClusteringConfig::default();
        if !(self.clustering.window_hours.is_finite() && self.clustering.window_hours > 0.0) {
            warn!(
                "Invalid clustering.window_hours {}, using {}",
                self.clustering.window_hours, clustering.window_hours
            );
            self.clustering.window_hours = clustering.window_hours;
        } else if !(MIN_WINDOW_HOURS..=MAX_WINDOW_HOURS).contains(&self.clustering.window_hours) {
            warn!(
                "clustering.window_hours {} outside [{:.4}, {}], clamping",
                self.clustering.window_hours, MIN_WINDOW_HOURS, MAX_WINDOW_HOURS
            );
            self.clustering.window_hours = self
                .clustering
                .window_hours
                .clamp(MIN_WINDOW_HOURS, MAX_WINDOW_HOURS);
        }
        if !(self.clustering.min_wish_score.is_finite() && self.clustering.min_wish_score >= 0.0) {
            warn!(
                "Invalid clustering.min_wish_score {}, using {}",
                self.clustering.min_wish_score, clustering.min_wish_score
            );
            self.clustering.min_wish_score = clustering.min_wish_score;
        }

        let defaults = ConfidenceConfig::default();
        let c = &mut self.confidence;
        for (name, value, default) in [
            ("base_score", &mut c.base_score, defaults.base_score),
            ("multi_year_bonus", &mut c.multi_year_bonus, defaults.multi_year_bonus),
            ("unique_wishers_bonus", &mut c.unique_wishers_bonus, defaults.unique_wishers_bonus),
            ("explicit_mention_bonus", &mut c.explicit_mention_bonus, defaults.explicit_mention_bonus),
            ("thanks_bonus", &mut c.thanks_bonus, defaults.thanks_bonus),
            ("phone_bonus", &mut c.phone_bonus, defaults.phone_bonus),
            ("multi_chat_phone_bonus", &mut c.multi_chat_phone_bonus, defaults.multi_chat_phone_bonus),
            ("date_consistency_bonus", &mut c.date_consistency_bonus, defaults.date_consistency_bonus),
            ("conflicting_dates_penalty", &mut c.conflicting_dates_penalty, defaults.conflicting_dates_penalty),
            ("low_evidence_penalty", &mut c.low_evidence_penalty, defaults.low_evidence_penalty),
            ("group_inference_penalty", &mut c.group_inference_penalty, defaults.group_inference_penalty),
            ("min_threshold", &mut c.min_threshold, defaults.min_threshold),
        ] {
            if !value.is_finite() {
                warn!("Invalid confidence.{} {}, using {}", name, value, default);
                *value = default;
            }
        }
        if !(0.0..=1.0).contains(&c.min_threshold) {
            warn!("confidence.min_threshold {} outside [0, 1], clamping", c.min_threshold);
            c.min_threshold = c.min_threshold.clamp(0.0, 1.0);
        }

        if self.encodings.is_empty() {
            warn!("No encodings configured, using defaults");
            self.encodings = AnalysisConfig::default().encodings;
        }

        self
    }
}

/// Resolve which config file to load, following the documented priority order
///
/// Returns `None` when no file applies (built-in defaults should be used).
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3/4: Platform config files that exist
    default_config_locations().into_iter().find(|p| p.exists())
}

/// Candidate config file locations for the platform, most specific first
fn default_config_locations() -> Vec<PathBuf> {
    let mut locations = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        locations.push(dir.join("hbd").join("config.toml"));
        locations.push(dir.join("hbd").join("config.json"));
    }
    if cfg!(target_os = "linux") {
        locations.push(PathBuf::from("/etc/hbd/config.toml"));
    }
    locations
}
