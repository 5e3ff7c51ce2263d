//! Run summary: headline counts, risk level, findings and recommendations.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use spreadtrace_common::RiskLevel;

/// Raw counts gathered by the analyzer after every stage has run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SummaryCounts {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub total_accounts: usize,
    pub total_posts: usize,
    pub communities: usize,
    pub suspicious_communities: usize,
    pub likely_bots: usize,
    pub coordinated_groups: usize,
    pub viral_posts: usize,
    pub misinformation_pathways: usize,
    pub flagged_accounts: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisSummary {
    #[serde(flatten)]
    pub counts: SummaryCounts,
    /// Flagged accounts over all accounts in the graph.
    pub suspicious_user_fraction: f64,
    pub overall_virality: f64,
    pub risk_level: RiskLevel,
    pub key_findings: Vec<String>,
    pub recommendations: Vec<String>,
}

impl AnalysisSummary {
    pub fn new(counts: SummaryCounts, overall_virality: f64) -> Self {
        let suspicious_user_fraction = if counts.total_accounts == 0 {
            0.0
        } else {
            counts.flagged_accounts as f64 / counts.total_accounts as f64
        };
        let risk_level = risk_level(
            suspicious_user_fraction,
            counts.coordinated_groups,
            counts.misinformation_pathways,
        );
        let key_findings = key_findings(&counts, suspicious_user_fraction, overall_virality);
        let recommendations = recommendations(&counts, risk_level);

        Self {
            counts,
            suspicious_user_fraction,
            overall_virality,
            risk_level,
            key_findings,
            recommendations,
        }
    }
}

/// First matching tier wins, checked from `Critical` down.
pub fn risk_level(suspicious_fraction: f64, groups: usize, pathways: usize) -> RiskLevel {
    if suspicious_fraction > 0.3 || groups > 5 || pathways > 3 {
        RiskLevel::Critical
    } else if suspicious_fraction > 0.2 || groups > 3 || pathways > 1 {
        RiskLevel::High
    } else if suspicious_fraction > 0.1 || groups > 1 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

fn key_findings(counts: &SummaryCounts, fraction: f64, overall_virality: f64) -> Vec<String> {
    let mut findings = vec![format!(
        "Analyzed {} accounts and {} posts across {} connections",
        counts.total_accounts, counts.total_posts, counts.total_edges
    )];
    if counts.likely_bots > 0 {
        findings.push(format!("{} accounts show bot-like behavior", counts.likely_bots));
    }
    if counts.coordinated_groups > 0 {
        findings.push(format!(
            "{} coordinated account groups detected",
            counts.coordinated_groups
        ));
    }
    if counts.suspicious_communities > 0 {
        findings.push(format!(
            "{} of {} communities look inauthentic",
            counts.suspicious_communities, counts.communities
        ));
    }
    if counts.viral_posts > 0 {
        findings.push(format!("{} posts are spreading virally", counts.viral_posts));
    }
    if counts.misinformation_pathways > 0 {
        findings.push(format!(
            "{} likely misinformation pathways traced",
            counts.misinformation_pathways
        ));
    }
    if counts.flagged_accounts > 0 {
        findings.push(format!(
            "{:.1}% of accounts flagged as suspicious",
            fraction * 100.0
        ));
    }
    findings.push(format!("Overall virality score {overall_virality:.2}"));
    findings
}

fn recommendations(counts: &SummaryCounts, risk: RiskLevel) -> Vec<String> {
    let mut recs = Vec::new();
    if risk >= RiskLevel::High {
        recs.push("Escalate this network for manual trust and safety review".to_string());
    }
    if counts.likely_bots > 0 {
        recs.push("Review flagged bot accounts for automation policy violations".to_string());
    }
    if counts.coordinated_groups > 0 {
        recs.push("Investigate coordinated groups for shared operators".to_string());
    }
    if counts.misinformation_pathways > 0 {
        recs.push("Apply context labels at the listed intervention points".to_string());
    }
    if recs.is_empty() {
        recs.push("Continue routine monitoring".to_string());
    }
    recs
}
