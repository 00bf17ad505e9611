//! Birthday analysis pipeline
//!
//! Per chat: detect wishes → cluster → infer target → adjust date. Each
//! stage returns new values; clusters are never mutated in place.
//!
//! Per batch: one blocking parse task per transcript, persistence through
//! the [`RecordStore`], then cross-chat identity resolution and confidence
//! scoring over every chat that parsed. A transcript that fails is reported
//! and never stops its siblings.

use crate::enrichment::{
    enrich_with_fallback, select_messages_for_analysis, ClusterEnricher, EnrichmentResult,
    HeuristicEnricher,
};
use crate::error::AnalyzerError;
use crate::services::{
    ClusterEngine, ConfidenceExplanation, ConfidenceScorer, DateAdjuster, IdentityResolver,
    ParsedTranscript, TargetInferencer, TranscriptParser, WishDetector,
};
use crate::store::RecordStore;
use chrono::{DateTime, NaiveDate, Utc};
use hbd_common::events::{AnalysisEvent, EventBus};
use hbd_common::models::{
    ChatId, ChatType, ClusterId, Identity, Message, MessageId, Participant, WishCluster,
    WishMessage,
};
use hbd_common::AnalysisConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

/// Result of the pure per-chat stages
#[derive(Debug, Clone, PartialEq)]
pub struct ChatAnalysis {
    pub wishes: Vec<WishMessage>,
    /// Targeted and date-adjusted clusters
    pub clusters: Vec<WishCluster>,
}

/// Identity with the audit trail of its confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredIdentity {
    pub identity: Identity,
    pub explanation: ConfidenceExplanation,
}

/// Enrichment answer for one cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterEnrichment {
    pub cluster_id: Option<ClusterId>,
    pub date: NaiveDate,
    pub result: EnrichmentResult,
}

/// Outcome of one transcript in a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    Analyzed {
        chat_id: ChatId,
        chat_name: String,
        chat_type: ChatType,
        messages: usize,
        participants: usize,
        wishes: usize,
        clusters: usize,
        dropped_lines: usize,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        enrichments: Vec<ClusterEnrichment>,
    },
    Failed {
        error: String,
    },
}

/// Per-file entry of a batch report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileReport {
    pub path: String,
    pub outcome: FileOutcome,
}

impl FileReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, FileOutcome::Analyzed { .. })
    }
}

/// Everything a batch run produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub files: Vec<FileReport>,
    /// Identities at or above the threshold, highest confidence first
    pub identities: Vec<ScoredIdentity>,
}

impl BatchReport {
    pub fn files_failed(&self) -> usize {
        self.files.iter().filter(|f| !f.is_success()).count()
    }
}

/// Chat that made it through parsing and persistence
struct AnalyzedChat {
    parsed: ParsedTranscript,
    analysis: ChatAnalysis,
}

/// Batch orchestrator over the pipeline components
pub struct BirthdayPipeline {
    config: AnalysisConfig,
    parser: TranscriptParser,
    detector: WishDetector,
    cluster_engine: ClusterEngine,
    inferencer: TargetInferencer,
    adjuster: DateAdjuster,
    resolver: IdentityResolver,
    scorer: ConfidenceScorer,
    enricher: Option<Arc<dyn ClusterEnricher>>,
}

impl BirthdayPipeline {
    /// Compile every component from one configuration
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            parser: TranscriptParser::new(&config),
            detector: WishDetector::new(&config),
            cluster_engine: ClusterEngine::new(&config),
            inferencer: TargetInferencer::new(),
            adjuster: DateAdjuster::new(),
            resolver: IdentityResolver::new(),
            scorer: ConfidenceScorer::new(&config),
            enricher: None,
            config,
        }
    }

    /// Attach an enrichment collaborator (used only when enrichment is enabled)
    pub fn with_enricher(mut self, enricher: Arc<dyn ClusterEnricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn parser(&self) -> &TranscriptParser {
        &self.parser
    }

    /// Pure per-chat stages over one parsed transcript
    pub fn analyze_chat(&self, parsed: &ParsedTranscript) -> ChatAnalysis {
        let wishes = self.detector.detect_wishes(&parsed.messages);
        let clusters = self
            .cluster_engine
            .cluster_wishes(&parsed.messages, &wishes, parsed.chat.id)
            .into_iter()
            .map(|cluster| {
                let target = self.inferencer.infer_target(
                    &cluster,
                    &parsed.participants,
                    &parsed.messages,
                    parsed.chat.chat_type,
                );
                cluster.with_target(target)
            })
            .map(|cluster| self.adjuster.apply(cluster))
            .collect();

        ChatAnalysis { wishes, clusters }
    }

    /// Resolve identities across chats, score them and keep those at or
    /// above the threshold, highest first
    pub fn resolve_and_score(
        &self,
        clusters: &[WishCluster],
        participants: &[Participant],
    ) -> Vec<ScoredIdentity> {
        let identities = self.resolver.resolve_identities(clusters, participants);
        self.scorer
            .score_identities(identities)
            .into_iter()
            .map(|identity| {
                let (_, explanation) = self.scorer.score_confidence(&identity);
                ScoredIdentity {
                    identity,
                    explanation,
                }
            })
            .collect()
    }

    /// Analyze a batch of transcript files
    pub async fn run_batch(
        self: &Arc<Self>,
        paths: &[PathBuf],
        store: &dyn RecordStore,
        events: &EventBus,
    ) -> BatchReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let timer = Instant::now();
        info!(%run_id, files = paths.len(), "Starting batch analysis");
        events.emit_lossy(AnalysisEvent::BatchStarted {
            run_id,
            file_count: paths.len(),
            timestamp: Utc::now(),
        });

        // Parse every file on the blocking pool
        let mut tasks = JoinSet::new();
        for (index, path) in paths.iter().enumerate() {
            let pipeline = Arc::clone(self);
            let path = path.clone();
            tasks.spawn_blocking(move || (index, pipeline.parser.parse_file(&path)));
        }

        let mut parsed: Vec<Option<Result<ParsedTranscript, AnalyzerError>>> =
            (0..paths.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => parsed[index] = Some(result.map_err(AnalyzerError::from)),
                Err(e) => warn!(%run_id, "{}", AnalyzerError::from(e)),
            }
        }

        let mut files = Vec::with_capacity(paths.len());
        let mut chats: Vec<AnalyzedChat> = Vec::new();

        for (path, result) in paths.iter().zip(parsed) {
            let path_str = path.display().to_string();
            let result = result.unwrap_or_else(|| {
                Err(AnalyzerError::InvalidInput("analysis task did not complete".to_string()))
            });

            match result.and_then(|p| self.persist_and_analyze(p, store)) {
                Ok(chat) => {
                    events.emit_lossy(AnalysisEvent::FileParsed {
                        run_id,
                        path: path_str.clone(),
                        chat_name: chat.parsed.chat.name.clone(),
                        message_count: chat.parsed.messages.len(),
                        participant_count: chat.parsed.participants.len(),
                        dropped_lines: chat.parsed.dropped_lines,
                        timestamp: Utc::now(),
                    });
                    events.emit_lossy(AnalysisEvent::ClustersDetected {
                        run_id,
                        chat_name: chat.parsed.chat.name.clone(),
                        cluster_count: chat.analysis.clusters.len(),
                        timestamp: Utc::now(),
                    });

                    let enrichments = self.enrich_chat(&chat).await;
                    files.push(FileReport {
                        path: path_str,
                        outcome: FileOutcome::Analyzed {
                            chat_id: chat.parsed.chat.id,
                            chat_name: chat.parsed.chat.name.clone(),
                            chat_type: chat.parsed.chat.chat_type,
                            messages: chat.parsed.messages.len(),
                            participants: chat.parsed.participants.len(),
                            wishes: chat.analysis.wishes.len(),
                            clusters: chat.analysis.clusters.len(),
                            dropped_lines: chat.parsed.dropped_lines,
                            enrichments,
                        },
                    });
                    chats.push(chat);
                }
                Err(e) => {
                    warn!(%run_id, path = %path_str, "Transcript failed: {}", e);
                    events.emit_lossy(AnalysisEvent::FileFailed {
                        run_id,
                        path: path_str.clone(),
                        error: e.to_string(),
                        timestamp: Utc::now(),
                    });
                    files.push(FileReport {
                        path: path_str,
                        outcome: FileOutcome::Failed {
                            error: e.to_string(),
                        },
                    });
                }
            }
        }

        let clusters: Vec<WishCluster> = chats
            .iter()
            .flat_map(|c| c.analysis.clusters.iter().cloned())
            .collect();
        let participants: Vec<Participant> = chats
            .iter()
            .flat_map(|c| c.parsed.participants.iter().cloned())
            .collect();

        let mut identities = self.resolve_and_score(&clusters, &participants);
        events.emit_lossy(AnalysisEvent::IdentitiesResolved {
            run_id,
            identity_count: identities.len(),
            timestamp: Utc::now(),
        });

        let records: Vec<Identity> = identities.iter().map(|s| s.identity.clone()).collect();
        match store.save_identities(&records) {
            Ok(ids) => {
                for (scored, id) in identities.iter_mut().zip(ids) {
                    scored.identity.id = Some(id);
                }
            }
            Err(e) => warn!(%run_id, "Could not persist identities: {}", e),
        }

        let duration_ms = timer.elapsed().as_millis() as u64;
        let report = BatchReport {
            run_id,
            started_at,
            duration_ms,
            files,
            identities,
        };

        info!(
            %run_id,
            files = report.files.len(),
            failed = report.files_failed(),
            identities = report.identities.len(),
            duration_ms,
            "Batch analysis complete"
        );
        events.emit_lossy(AnalysisEvent::BatchCompleted {
            run_id,
            files_analyzed: report.files.len() - report.files_failed(),
            files_failed: report.files_failed(),
            identities_reported: report.identities.len(),
            duration_ms,
            timestamp: Utc::now(),
        });

        report
    }

    /// Store the transcript, adopt the store's ids, run the chat stages and
    /// store the resulting clusters
    fn persist_and_analyze(
        &self,
        parsed: ParsedTranscript,
        store: &dyn RecordStore,
    ) -> Result<AnalyzedChat, AnalyzerError> {
        let chat_id = store.save_chat(&parsed.chat)?;
        let message_ids = store.save_messages(chat_id, &parsed.messages)?;
        let participant_ids = store.save_participants(chat_id, &parsed.participants)?;
        let parsed = parsed.rebind(chat_id, &message_ids, &participant_ids)?;

        let mut analysis = self.analyze_chat(&parsed);
        let cluster_ids = store.save_clusters(&analysis.clusters)?;
        for (cluster, id) in analysis.clusters.iter_mut().zip(cluster_ids) {
            cluster.id = Some(id);
        }

        Ok(AnalyzedChat { parsed, analysis })
    }

    /// Enrich every cluster of a chat when enrichment is enabled
    async fn enrich_chat(&self, chat: &AnalyzedChat) -> Vec<ClusterEnrichment> {
        let settings = &self.config.enrichment;
        if !settings.enabled {
            return Vec::new();
        }

        let fallback = HeuristicEnricher::with_participants(chat.parsed.participants.clone());
        let timeout = Duration::from_millis(settings.timeout_ms);
        let mut enrichments = Vec::with_capacity(chat.analysis.clusters.len());

        for cluster in &chat.analysis.clusters {
            let member_ids: HashSet<MessageId> =
                cluster.wish_messages.iter().map(|w| w.message_id).collect();
            let members: Vec<Message> = chat
                .parsed
                .messages
                .iter()
                .filter(|m| member_ids.contains(&m.id))
                .cloned()
                .collect();
            let selected: Vec<Message> = select_messages_for_analysis(&members, settings.max_messages)
                .into_iter()
                .cloned()
                .collect();

            let result = enrich_with_fallback(
                self.enricher.as_deref(),
                &fallback,
                cluster,
                &selected,
                timeout,
            )
            .await;
            enrichments.push(ClusterEnrichment {
                cluster_id: cluster.id,
                date: cluster.date,
                result,
            });
        }
        enrichments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_analyze_chat_sets_target_and_adjusts_date() {
        let pipeline = BirthdayPipeline::new(AnalysisConfig::default());
        let parsed = pipeline.parser().parse_transcript(
            lines(&[
                "8/2/24, 9:00 AM - Alice: Belated happy birthday Sam!",
                "8/2/24, 9:05 AM - Bob: happy birthday Sam, belated wishes",
                "8/2/24, 9:10 AM - Sam: thank you for the birthday wishes",
            ]),
            "Friends",
            None,
        );

        let analysis = pipeline.analyze_chat(&parsed);
        assert_eq!(analysis.wishes.len(), 3);
        assert_eq!(analysis.clusters.len(), 1);

        let cluster = &analysis.clusters[0];
        let sam = parsed
            .participants
            .iter()
            .find(|p| p.display_name.as_deref() == Some("Sam"))
            .unwrap();
        assert_eq!(cluster.target_participant_id, Some(sam.id));
        // Two of three wishes are belated: the birthday was the day before
        assert_eq!(cluster.date, NaiveDate::from_ymd_opt(2024, 8, 1).unwrap());
    }

    #[test]
    fn test_analyze_chat_without_wishes_is_empty() {
        let pipeline = BirthdayPipeline::new(AnalysisConfig::default());
        let parsed = pipeline
            .parser()
            .parse_transcript(lines(&["8/2/24, 9:00 AM - Alice: lunch?"]), "Chat", None);
        let analysis = pipeline.analyze_chat(&parsed);
        assert!(analysis.wishes.is_empty());
        assert!(analysis.clusters.is_empty());
    }

    #[test]
    fn test_failed_file_report() {
        let report = FileReport {
            path: "x.txt".to_string(),
            outcome: FileOutcome::Failed {
                error: "boom".to_string(),
            },
        };
        assert!(!report.is_success());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"]["status"], "failed");
    }
}
