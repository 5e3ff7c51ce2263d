//! Orchestrates one analysis run: graph build, network metrics, the four
//! independent detectors on scoped threads, then pathway tracing.

use std::collections::BTreeSet;
use std::thread;

use anyhow::Context;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use spreadtrace_behavior::{
    BotDetector, BotMetrics, CoordinationDetector, CoordinationGroup, MisinformationPathway,
    PathwayTracer, ViralityMetrics, ViralityScorer,
};
use spreadtrace_common::{AnalysisConfig, DataCollection, Result, SpreadTraceError};
use spreadtrace_graph::{
    BuildOutput, Community, CommunityDetector, GraphBuilder, GraphStats, GraphWire,
    NetworkAnalysis, NetworkAnalyzer, PropagationGraph,
};

use crate::sources::{fetch_all, DataSource};
use crate::summary::{AnalysisSummary, SummaryCounts};

/// Communities scoring above this mark their accounts as flagged.
const SUSPICIOUS_COMMUNITY_SCORE: f64 = 0.7;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisResult {
    pub run_id: Uuid,
    pub analyzed_at: DateTime<Utc>,
    pub graph: GraphWire,
    pub graph_stats: GraphStats,
    pub network_metrics: NetworkAnalysis,
    pub communities: Vec<Community>,
    pub bot_metrics: Vec<BotMetrics>,
    pub coordination_groups: Vec<CoordinationGroup>,
    pub virality_metrics: Vec<ViralityMetrics>,
    pub misinformation_pathways: Vec<MisinformationPathway>,
    pub flagged_accounts: BTreeSet<String>,
    pub summary: AnalysisSummary,
}

#[derive(Debug, Clone, Default)]
pub struct Analyzer {
    config: AnalysisConfig,
}

impl Analyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Fetch every source concurrently, then analyze whatever arrived.
    pub async fn run(
        &self,
        sources: &[Box<dyn DataSource>],
        query: Option<&str>,
    ) -> Result<AnalysisResult> {
        let report = fetch_all(sources, query).await;
        if report.collections.is_empty() {
            warn!(
                sources = sources.len(),
                failures = report.failures.len(),
                "No source produced data"
            );
            return Err(SpreadTraceError::EmptyInput);
        }
        info!(
            succeeded = report.collections.len(),
            failed = report.failures.len(),
            "Sources fetched"
        );

        let analyzer = self.clone();
        let collections = report.collections;
        tokio::task::spawn_blocking(move || analyzer.analyze(&collections, Utc::now()))
            .await
            .context("Analysis task failed")?
    }

    /// Analyze collections as of `now`. Only empty input or an empty graph
    /// fail; everything else degrades per entity.
    pub fn analyze(&self, collections: &[DataCollection], now: DateTime<Utc>) -> Result<AnalysisResult> {
        if collections.iter().all(DataCollection::is_empty) {
            return Err(SpreadTraceError::EmptyInput);
        }

        let BuildOutput { graph, stats } = GraphBuilder::new(&self.config, now).build(collections);
        if graph.is_empty() {
            return Err(SpreadTraceError::EmptyGraph);
        }

        let network = NetworkAnalyzer::new(&self.config).analyze(&graph);
        let stages = self.run_stages(&graph, &network, now);

        let misinformation_pathways = if self.config.include_misinformation_pathways {
            PathwayTracer::new(&self.config, now).trace(&graph, &network, &stages.virality)
        } else {
            Vec::new()
        };
        let virality_metrics = if self.config.include_virality_analysis {
            stages.virality
        } else {
            Vec::new()
        };

        let flagged_accounts = self.flagged_accounts(&stages.bots, &stages.communities, &stages.groups);
        let overall_virality = overall_virality(&virality_metrics);
        let counts = SummaryCounts {
            total_nodes: graph.node_count(),
            total_edges: graph.edge_count(),
            total_accounts: graph.accounts().count(),
            total_posts: graph.posts().count(),
            communities: stages.communities.len(),
            suspicious_communities: stages
                .communities
                .iter()
                .filter(|c| c.suspicious_score > SUSPICIOUS_COMMUNITY_SCORE)
                .count(),
            likely_bots: stages
                .bots
                .iter()
                .filter(|b| b.bot_score > self.config.bot_detection_threshold)
                .count(),
            coordinated_groups: stages.groups.len(),
            viral_posts: virality_metrics
                .iter()
                .filter(|v| v.virality_score > self.config.virality_threshold)
                .count(),
            misinformation_pathways: misinformation_pathways.len(),
            flagged_accounts: flagged_accounts.len(),
        };
        let summary = AnalysisSummary::new(counts, overall_virality);

        info!(
            nodes = summary.counts.total_nodes,
            edges = summary.counts.total_edges,
            flagged = summary.counts.flagged_accounts,
            pathways = summary.counts.misinformation_pathways,
            risk = %summary.risk_level,
            "Analysis complete"
        );

        Ok(AnalysisResult {
            run_id: Uuid::new_v4(),
            analyzed_at: now,
            graph: GraphWire::from_graph(&graph)?,
            graph_stats: stats,
            network_metrics: network,
            communities: stages.communities,
            bot_metrics: stages.bots,
            coordination_groups: stages.groups,
            virality_metrics,
            misinformation_pathways,
            flagged_accounts,
            summary,
        })
    }

    /// Community, bot, virality and coordination stages share the read-only
    /// graph on scoped threads. Virality is also scored when only pathway
    /// tracing asks for it.
    fn run_stages(&self, graph: &PropagationGraph, network: &NetworkAnalysis, now: DateTime<Utc>) -> Stages {
        let config = &self.config;
        thread::scope(|s| {
            let communities = s.spawn(|| {
                if config.include_community_detection {
                    CommunityDetector::new(config, now).detect(graph, network)
                } else {
                    Vec::new()
                }
            });
            let bots = s.spawn(|| {
                if config.include_bot_detection {
                    BotDetector::new(config, now).detect(graph)
                } else {
                    Vec::new()
                }
            });
            let virality = s.spawn(|| {
                if config.include_virality_analysis || config.include_misinformation_pathways {
                    ViralityScorer::new(config).score(graph)
                } else {
                    Vec::new()
                }
            });
            let groups = s.spawn(|| {
                if config.include_coordination_analysis {
                    CoordinationDetector::new(config).detect(graph)
                } else {
                    Vec::new()
                }
            });

            Stages {
                communities: join(communities),
                bots: join(bots),
                virality: join(virality),
                groups: join(groups),
            }
        })
    }

    fn flagged_accounts(
        &self,
        bots: &[BotMetrics],
        communities: &[Community],
        groups: &[CoordinationGroup],
    ) -> BTreeSet<String> {
        let mut flagged: BTreeSet<String> = bots
            .iter()
            .filter(|b| b.bot_score > self.config.bot_detection_threshold)
            .map(|b| b.node_id.clone())
            .collect();
        flagged.extend(
            communities
                .iter()
                .filter(|c| c.suspicious_score > SUSPICIOUS_COMMUNITY_SCORE)
                .flat_map(|c| c.account_members().cloned()),
        );
        flagged.extend(groups.iter().flat_map(|g| g.members.iter().cloned()));
        flagged
    }
}

struct Stages {
    communities: Vec<Community>,
    bots: Vec<BotMetrics>,
    virality: Vec<ViralityMetrics>,
    groups: Vec<CoordinationGroup>,
}

/// A stage panic is a bug; re-raise it on the calling thread.
fn join<T>(handle: thread::ScopedJoinHandle<'_, T>) -> T {
    handle
        .join()
        .unwrap_or_else(|payload| std::panic::resume_unwind(payload))
}

/// Reach-weighted mean of post virality; the plain mean when no post has
/// reach, 0 without posts.
pub fn overall_virality(metrics: &[ViralityMetrics]) -> f64 {
    if metrics.is_empty() {
        return 0.0;
    }
    let total_reach: usize = metrics.iter().map(|m| m.reach).sum();
    if total_reach == 0 {
        return metrics.iter().map(|m| m.virality_score).sum::<f64>() / metrics.len() as f64;
    }
    metrics
        .iter()
        .map(|m| m.virality_score * m.reach as f64)
        .sum::<f64>()
        / total_reach as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(reach: usize, score: f64) -> ViralityMetrics {
        ViralityMetrics {
            node_id: format!("post_{reach}_{score}"),
            reach,
            engagement: 0,
            velocity: 0.0,
            amplification: 0.0,
            cascade_depth: 0,
            unique_users: 0,
            time_to_viral_minutes: None,
            peak_activity_hour: None,
            virality_score: score,
        }
    }

    #[test]
    fn overall_virality_weights_by_reach() {
        let metrics = vec![scored(3, 0.8), scored(1, 0.4)];
        assert!((overall_virality(&metrics) - 0.7).abs() < 1e-10);
    }

    #[test]
    fn overall_virality_without_reach_is_plain_mean() {
        let metrics = vec![scored(0, 0.2), scored(0, 0.4)];
        assert!((overall_virality(&metrics) - 0.3).abs() < 1e-10);
        assert_eq!(overall_virality(&[]), 0.0);
    }
}
