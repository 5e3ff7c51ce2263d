//! Coordinated account groups: accounts linked by shared content, shared
//! posting hours, or shared connections, scored as a group.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Timelike, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

use spreadtrace_common::text::{jaccard, mean_cross_jaccard};
use spreadtrace_common::AnalysisConfig;
use spreadtrace_graph::PropagationGraph;

use crate::activity::{AccountActivity, ActivityIndex};

const PAIR_CONTENT_SIMILARITY: f64 = 0.6;
const PAIR_HOUR_CORRELATION: f64 = 0.7;
const PAIR_CONNECTION_OVERLAP: f64 = 0.5;

/// Posts closer than this count as synchronized.
const SYNC_WINDOW_SECONDS: i64 = 5 * 60;
/// Share of cross-member post pairs that must fall in the window.
const SYNC_FRACTION: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CoordinationGroup {
    pub id: String,
    pub members: Vec<String>,
    pub coordination_score: f64,
    pub content_similarity: f64,
    pub network_overlap: f64,
    pub synchronized_activity: bool,
    pub evidence: Vec<String>,
}

pub struct CoordinationDetector<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> CoordinationDetector<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self { config }
    }

    /// Groups at or above the coordination threshold, highest score first.
    pub fn detect(&self, graph: &PropagationGraph) -> Vec<CoordinationGroup> {
        let index = ActivityIndex::new(graph);
        let accounts = index.accounts();
        let histograms: Vec<[f64; 24]> = accounts.iter().map(|a| hour_histogram(&a.post_times)).collect();

        let mut sets = DisjointSet::new(accounts.len());
        for i in 0..accounts.len() {
            for j in (i + 1)..accounts.len() {
                if linked(&accounts[i], &accounts[j], &histograms[i], &histograms[j]) {
                    sets.union(i, j);
                }
            }
        }

        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for i in 0..accounts.len() {
            groups.entry(sets.find(i)).or_default().push(i);
        }

        let candidates = groups.values().filter(|g| g.len() > 1).count();
        let mut scored: Vec<CoordinationGroup> = groups
            .into_values()
            .filter(|members| members.len() > 1)
            .enumerate()
            .map(|(k, members)| {
                let refs: Vec<&AccountActivity<'_>> = members.iter().map(|&m| &accounts[m]).collect();
                score_group(k, &refs)
            })
            .filter(|g| g.coordination_score >= self.config.coordination_threshold)
            .collect();

        scored.sort_by(|a, b| {
            b.coordination_score
                .partial_cmp(&a.coordination_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.members.len().cmp(&a.members.len()))
                .then_with(|| a.id.cmp(&b.id))
        });

        info!(
            candidates,
            groups = scored.len(),
            threshold = self.config.coordination_threshold,
            "Coordination detection complete"
        );
        scored
    }
}

fn linked(a: &AccountActivity<'_>, b: &AccountActivity<'_>, ha: &[f64; 24], hb: &[f64; 24]) -> bool {
    mean_cross_jaccard(&a.word_sets, &b.word_sets) > PAIR_CONTENT_SIMILARITY
        || pearson(ha, hb) > PAIR_HOUR_CORRELATION
        || jaccard(&a.connections, &b.connections) > PAIR_CONNECTION_OVERLAP
}

fn score_group(k: usize, members: &[&AccountActivity<'_>]) -> CoordinationGroup {
    let mut content_total = 0.0;
    let mut overlap_total = 0.0;
    let mut pairs = 0usize;
    let mut time_pairs = 0usize;
    let mut close_pairs = 0usize;

    for i in 0..members.len() {
        for j in (i + 1)..members.len() {
            let (a, b) = (members[i], members[j]);
            content_total += mean_cross_jaccard(&a.word_sets, &b.word_sets);
            overlap_total += jaccard(&a.connections, &b.connections);
            pairs += 1;
            let (total, close) = synchronized_pairs(&a.post_times, &b.post_times);
            time_pairs += total;
            close_pairs += close;
        }
    }

    let content_similarity = content_total / pairs as f64;
    let network_overlap = overlap_total / pairs as f64;
    let synchronized_activity =
        time_pairs > 0 && close_pairs as f64 / time_pairs as f64 > SYNC_FRACTION;

    let mut coordination_score = 0.0;
    let mut evidence = Vec::new();
    if content_similarity > 0.5 {
        coordination_score += 0.3;
        evidence.push(format!("Shared content across members ({content_similarity:.2})"));
    }
    if network_overlap > 0.3 {
        coordination_score += 0.3;
        evidence.push(format!("Overlapping network connections ({network_overlap:.2})"));
    }
    if synchronized_activity {
        coordination_score += 0.4;
        evidence.push(format!(
            "{close_pairs} of {time_pairs} cross-member posts within 5 minutes"
        ));
    }

    CoordinationGroup {
        id: format!("group_{k}"),
        members: members.iter().map(|m| m.node_id.to_string()).collect(),
        coordination_score,
        content_similarity,
        network_overlap,
        synchronized_activity,
        evidence,
    }
}

/// `(all cross pairs, pairs within the sync window)`.
fn synchronized_pairs(a: &[DateTime<Utc>], b: &[DateTime<Utc>]) -> (usize, usize) {
    let close = a
        .iter()
        .flat_map(|ta| b.iter().map(move |tb| (*ta - *tb).num_seconds().abs()))
        .filter(|gap| *gap <= SYNC_WINDOW_SECONDS)
        .count();
    (a.len() * b.len(), close)
}

fn hour_histogram(times: &[DateTime<Utc>]) -> [f64; 24] {
    let mut histogram = [0.0; 24];
    for t in times {
        histogram[t.hour() as usize] += 1.0;
    }
    histogram
}

/// Pearson correlation; 0 when either side is constant.
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }
    let mean_a = a[..n].iter().sum::<f64>() / n as f64;
    let mean_b = b[..n].iter().sum::<f64>() / n as f64;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..n {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a == 0.0 || var_b == 0.0 {
        return 0.0;
    }
    cov / (var_a.sqrt() * var_b.sqrt())
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self { parent: (0..n).collect() }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cur = x;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    /// Merge, keeping the smaller index as root.
    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (low, high) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[high] = low;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_histograms_correlate_fully() {
        let mut a = [0.0; 24];
        a[9] = 3.0;
        a[21] = 1.0;
        assert!((pearson(&a, &a) - 1.0).abs() < 1e-10);
    }

    #[test]
    fn constant_histogram_has_no_correlation() {
        let a = [0.0; 24];
        let mut b = [0.0; 24];
        b[3] = 1.0;
        assert_eq!(pearson(&a, &b), 0.0);
    }

    #[test]
    fn sync_window_is_inclusive() {
        let t = chrono::Utc::now();
        let (total, close) =
            synchronized_pairs(&[t], &[t + chrono::Duration::minutes(5), t + chrono::Duration::minutes(6)]);
        assert_eq!((total, close), (2, 1));
    }

    #[test]
    fn union_find_merges_transitively() {
        let mut sets = DisjointSet::new(4);
        sets.union(3, 1);
        sets.union(1, 2);
        assert_eq!(sets.find(3), 1);
        assert_eq!(sets.find(2), 1);
        assert_eq!(sets.find(0), 0);
    }
}
