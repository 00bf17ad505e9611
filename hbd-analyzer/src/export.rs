//! Report export
//!
//! JSON carries the full batch report. CSV and the text table carry only
//! the reported identities.

use crate::pipeline::{BatchReport, FileOutcome, ScoredIdentity};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// CSV header row
pub const CSV_HEADER: &str = "Name,Birthday (MM-DD),Phone,Confidence,Years Observed,Total Wishers";

/// Pretty JSON of the whole batch
pub fn to_json(report: &BatchReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

/// Identity rows as CSV, one line per identity
pub fn to_csv(identities: &[ScoredIdentity]) -> String {
    let mut output = String::from(CSV_HEADER);
    output.push('\n');

    for scored in identities {
        let identity = &scored.identity;
        let row = [
            csv_field(&identity.canonical_name),
            identity.birthday().to_string(),
            csv_field(identity.phone.as_deref().unwrap_or("")),
            format!("{:.3}", identity.confidence),
            identity.years_observed.to_string(),
            identity.total_wishers.to_string(),
        ];
        output.push_str(&row.join(","));
        output.push('\n');
    }

    output
}

/// Quote a field when it contains a separator, quote or line break
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Human-readable summary for the terminal
pub fn to_table(report: &BatchReport, explain: bool) -> String {
    let mut output = String::new();

    output.push_str(&format!("\nRun {}\n", report.run_id));
    output.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
    for file in &report.files {
        match &file.outcome {
            FileOutcome::Analyzed {
                chat_name,
                chat_type,
                messages,
                clusters,
                dropped_lines,
                ..
            } => output.push_str(&format!(
                "[✓] {} ({}, {}): {} messages, {} clusters, {} dropped lines\n",
                file.path,
                chat_name,
                chat_type.as_str(),
                messages,
                clusters,
                dropped_lines
            )),
            FileOutcome::Failed { error } => {
                output.push_str(&format!("[✗] {}: {}\n", file.path, error))
            }
        }
    }

    if report.identities.is_empty() {
        output.push_str("\nNo birthdays found above the confidence threshold.\n");
        return output;
    }

    output.push_str(&format!("\n{:<24} {:<6} {:<16} {:>6} {:>5} {:>7}\n", "Name", "Date", "Phone", "Conf", "Years", "Wishers"));
    output.push_str(&format!("{}\n", "─".repeat(69)));
    for scored in &report.identities {
        let identity = &scored.identity;
        output.push_str(&format!(
            "{:<24} {:<6} {:<16} {:>6.3} {:>5} {:>7}\n",
            identity.canonical_name,
            identity.birthday().to_string(),
            identity.phone.as_deref().unwrap_or("-"),
            identity.confidence,
            identity.years_observed,
            identity.total_wishers
        ));
        if explain {
            for line in scored.explanation.render().lines() {
                output.push_str(&format!("    {}\n", line));
            }
        }
    }

    output
}

/// Write rendered output to a file
pub fn write_to<P: AsRef<Path>>(path: P, contents: &str) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(contents.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ConfidenceExplanation;
    use chrono::{NaiveDate, Utc};
    use hbd_common::models::{BestObservation, DateResolution, EvidenceSummary, Identity};
    use uuid::Uuid;

    fn scored(name: &str, phone: Option<&str>, confidence: f64) -> ScoredIdentity {
        ScoredIdentity {
            identity: Identity {
                id: Some(1),
                canonical_name: name.to_string(),
                phone: phone.map(str::to_string),
                birthday_month: 3,
                birthday_day: 7,
                confidence,
                years_observed: 2,
                total_wishers: 6,
                evidence_summary: EvidenceSummary {
                    total_observations: 2,
                    years: vec![2022, 2023],
                    chats: 1,
                    chat_ids: vec![1],
                    total_wishers: 6,
                    has_explicit_mentions: true,
                    has_thanks_messages: false,
                    date_consistency: true,
                    date_resolution: DateResolution::Unanimous,
                    best_observation: BestObservation {
                        date: NaiveDate::from_ymd_opt(2023, 3, 7).unwrap(),
                        chat_id: 1,
                        wishers: 4,
                        score: 3.2,
                        has_mentions: true,
                        has_thanks: false,
                    },
                },
            },
            explanation: ConfidenceExplanation {
                base: 0.3,
                adjustments: Vec::new(),
                raw_total: confidence,
                final_score: confidence,
            },
        }
    }

    #[test]
    fn test_csv_rows() {
        let csv = to_csv(&[scored("Priya", Some("+919876543210"), 0.8125)]);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], "Priya,03-07,+919876543210,0.812,2,6");
    }

    #[test]
    fn test_csv_quotes_awkward_names() {
        let csv = to_csv(&[scored("Doe, \"JD\" John", None, 0.7)]);
        assert!(csv.contains("\"Doe, \"\"JD\"\" John\",03-07,,0.700"));
    }

    #[test]
    fn test_table_mentions_failures_and_empty_result() {
        let report = BatchReport {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            duration_ms: 3,
            files: vec![crate::pipeline::FileReport {
                path: "broken.txt".to_string(),
                outcome: FileOutcome::Failed {
                    error: "could not decode".to_string(),
                },
            }],
            identities: Vec::new(),
        };
        let table = to_table(&report, false);
        assert!(table.contains("[✗] broken.txt: could not decode"));
        assert!(table.contains("No birthdays found"));
    }

    #[test]
    fn test_json_contains_identities() {
        let report = BatchReport {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            duration_ms: 3,
            files: Vec::new(),
            identities: vec![scored("Priya", None, 0.9)],
        };
        let json: serde_json::Value = serde_json::from_str(&to_json(&report).unwrap()).unwrap();
        assert_eq!(json["identities"][0]["identity"]["canonical_name"], "Priya");
    }
}
