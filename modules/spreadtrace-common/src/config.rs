use std::env;
use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::SpreadTraceError;

/// How edge weights are derived from interactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EdgeWeighting {
    /// Every edge weighs 1.0.
    Uniform,
    /// Per-kind base weights with engagement boosts.
    #[default]
    Weighted,
    /// `Weighted`, decayed by interaction age.
    Temporal,
}

impl FromStr for EdgeWeighting {
    type Err = SpreadTraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "uniform" => Ok(EdgeWeighting::Uniform),
            "weighted" => Ok(EdgeWeighting::Weighted),
            "temporal" => Ok(EdgeWeighting::Temporal),
            other => Err(SpreadTraceError::Config(format!(
                "unknown edge weight calculation: {other}"
            ))),
        }
    }
}

/// Analysis configuration. Keys are camelCase on the wire and in TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct AnalysisConfig {
    // Graph construction
    pub include_user_nodes: bool,
    pub include_post_nodes: bool,
    pub edge_weight_calculation: EdgeWeighting,
    pub time_decay_factor: f64,
    pub min_edge_weight: f64,
    pub max_graph_size: usize,

    // Network analysis
    pub page_rank_damping: f64,
    pub page_rank_iterations: usize,
    /// Accepted for tuning; the greedy modularity pass does not read it.
    pub community_resolution: f64,
    pub centrality_threshold: f64,

    // Behavior thresholds
    pub bot_detection_threshold: f64,
    pub coordination_threshold: f64,
    pub content_similarity_threshold: f64,
    pub network_reciprocity_threshold: f64,
    pub virality_threshold: f64,
    pub credibility_threshold: f64,
    /// Deduct for brand new authors and text copied from another author
    /// when scoring pathway sources. Off leaves the additive 0.5 base formula.
    pub credibility_penalties: bool,

    // Category switches
    pub include_bot_detection: bool,
    pub include_community_detection: bool,
    pub include_virality_analysis: bool,
    pub include_coordination_analysis: bool,
    pub include_misinformation_pathways: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            include_user_nodes: true,
            include_post_nodes: true,
            edge_weight_calculation: EdgeWeighting::Weighted,
            time_decay_factor: 0.1,
            min_edge_weight: 0.1,
            max_graph_size: 10_000,
            page_rank_damping: 0.85,
            page_rank_iterations: 100,
            community_resolution: 1.0,
            centrality_threshold: 0.1,
            bot_detection_threshold: 0.7,
            coordination_threshold: 0.6,
            content_similarity_threshold: 0.8,
            network_reciprocity_threshold: 0.1,
            virality_threshold: 0.7,
            credibility_threshold: 0.3,
            credibility_penalties: false,
            include_bot_detection: true,
            include_community_detection: true,
            include_virality_analysis: true,
            include_coordination_analysis: true,
            include_misinformation_pathways: true,
        }
    }
}

impl AnalysisConfig {
    /// Defaults overridden by any `SPREADTRACE_*` environment variables present.
    pub fn from_env() -> Result<Self, SpreadTraceError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay `SPREADTRACE_*` environment variables onto this config.
    pub fn apply_env(&mut self) -> Result<(), SpreadTraceError> {
        override_env("SPREADTRACE_INCLUDE_USER_NODES", &mut self.include_user_nodes)?;
        override_env("SPREADTRACE_INCLUDE_POST_NODES", &mut self.include_post_nodes)?;
        override_env("SPREADTRACE_EDGE_WEIGHT_CALCULATION", &mut self.edge_weight_calculation)?;
        override_env("SPREADTRACE_TIME_DECAY_FACTOR", &mut self.time_decay_factor)?;
        override_env("SPREADTRACE_MIN_EDGE_WEIGHT", &mut self.min_edge_weight)?;
        override_env("SPREADTRACE_MAX_GRAPH_SIZE", &mut self.max_graph_size)?;
        override_env("SPREADTRACE_PAGE_RANK_DAMPING", &mut self.page_rank_damping)?;
        override_env("SPREADTRACE_PAGE_RANK_ITERATIONS", &mut self.page_rank_iterations)?;
        override_env("SPREADTRACE_COMMUNITY_RESOLUTION", &mut self.community_resolution)?;
        override_env("SPREADTRACE_CENTRALITY_THRESHOLD", &mut self.centrality_threshold)?;
        override_env("SPREADTRACE_BOT_DETECTION_THRESHOLD", &mut self.bot_detection_threshold)?;
        override_env("SPREADTRACE_COORDINATION_THRESHOLD", &mut self.coordination_threshold)?;
        override_env(
            "SPREADTRACE_CONTENT_SIMILARITY_THRESHOLD",
            &mut self.content_similarity_threshold,
        )?;
        override_env(
            "SPREADTRACE_NETWORK_RECIPROCITY_THRESHOLD",
            &mut self.network_reciprocity_threshold,
        )?;
        override_env("SPREADTRACE_VIRALITY_THRESHOLD", &mut self.virality_threshold)?;
        override_env("SPREADTRACE_CREDIBILITY_THRESHOLD", &mut self.credibility_threshold)?;
        override_env("SPREADTRACE_CREDIBILITY_PENALTIES", &mut self.credibility_penalties)?;
        override_env("SPREADTRACE_INCLUDE_BOT_DETECTION", &mut self.include_bot_detection)?;
        override_env(
            "SPREADTRACE_INCLUDE_COMMUNITY_DETECTION",
            &mut self.include_community_detection,
        )?;
        override_env(
            "SPREADTRACE_INCLUDE_VIRALITY_ANALYSIS",
            &mut self.include_virality_analysis,
        )?;
        override_env(
            "SPREADTRACE_INCLUDE_COORDINATION_ANALYSIS",
            &mut self.include_coordination_analysis,
        )?;
        override_env(
            "SPREADTRACE_INCLUDE_MISINFORMATION_PATHWAYS",
            &mut self.include_misinformation_pathways,
        )?;
        Ok(())
    }

    /// Check every option against its documented range.
    pub fn validate(&self) -> Result<(), SpreadTraceError> {
        if !(self.time_decay_factor >= 0.0) {
            return Err(invalid("timeDecayFactor must be >= 0"));
        }
        if !(self.min_edge_weight >= 0.0) {
            return Err(invalid("minEdgeWeight must be >= 0"));
        }
        if self.max_graph_size == 0 {
            return Err(invalid("maxGraphSize must be > 0"));
        }
        if !(self.page_rank_damping > 0.0 && self.page_rank_damping < 1.0) {
            return Err(invalid("pageRankDamping must be in (0, 1)"));
        }
        if self.page_rank_iterations == 0 {
            return Err(invalid("pageRankIterations must be > 0"));
        }
        for (name, value) in [
            ("botDetectionThreshold", self.bot_detection_threshold),
            ("coordinationThreshold", self.coordination_threshold),
            ("contentSimilarityThreshold", self.content_similarity_threshold),
            ("networkReciprocityThreshold", self.network_reciprocity_threshold),
            ("viralityThreshold", self.virality_threshold),
            ("credibilityThreshold", self.credibility_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(&format!("{name} must be in [0, 1]")));
            }
        }
        Ok(())
    }

    /// Log the effective configuration.
    pub fn log_summary(&self) {
        info!(
            weighting = ?self.edge_weight_calculation,
            max_graph_size = self.max_graph_size,
            damping = self.page_rank_damping,
            iterations = self.page_rank_iterations,
            bot_threshold = self.bot_detection_threshold,
            coordination_threshold = self.coordination_threshold,
            "Analysis config loaded"
        );
    }
}

/// Load and validate a TOML config file. Missing keys fall back to defaults.
pub fn load_config(path: &Path) -> anyhow::Result<AnalysisConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: AnalysisConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

fn override_env<T: FromStr>(key: &str, slot: &mut T) -> Result<(), SpreadTraceError> {
    if let Ok(raw) = env::var(key) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|_| invalid(&format!("{key} has an invalid value: {raw}")))?;
    }
    Ok(())
}

fn invalid(message: &str) -> SpreadTraceError {
    SpreadTraceError::Config(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(AnalysisConfig::default().validate().is_ok());
    }

    #[test]
    fn damping_outside_open_interval_is_rejected() {
        let config = AnalysisConfig {
            page_rank_damping: 1.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SpreadTraceError::Config(_))));
    }

    #[test]
    fn zero_graph_size_is_rejected() {
        let config = AnalysisConfig {
            max_graph_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn threshold_above_one_is_rejected() {
        let config = AnalysisConfig {
            coordination_threshold: 1.5,
            ..Default::default()
        };
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("coordinationThreshold"));
    }

    #[test]
    fn nan_decay_is_rejected() {
        let config = AnalysisConfig {
            time_decay_factor: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: AnalysisConfig = toml::from_str(
            r#"
            edgeWeightCalculation = "temporal"
            maxGraphSize = 50
            includeBotDetection = false
            "#,
        )
        .unwrap();
        assert_eq!(config.edge_weight_calculation, EdgeWeighting::Temporal);
        assert_eq!(config.max_graph_size, 50);
        assert!(!config.include_bot_detection);
        assert_eq!(config.page_rank_iterations, 100);
        assert!(!config.credibility_penalties);

        let penalized: AnalysisConfig = toml::from_str("credibilityPenalties = true").unwrap();
        assert!(penalized.credibility_penalties);
    }

    #[test]
    fn unknown_toml_key_is_an_error() {
        let parsed: Result<AnalysisConfig, _> = toml::from_str("notAnOption = 3");
        assert!(parsed.is_err());
    }

    #[test]
    fn edge_weighting_parses_case_insensitively() {
        assert_eq!("Temporal".parse::<EdgeWeighting>().unwrap(), EdgeWeighting::Temporal);
        assert!("linear".parse::<EdgeWeighting>().is_err());
    }
}
