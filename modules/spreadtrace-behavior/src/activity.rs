//! Per-account activity derived from the graph: authored posts, their word
//! sets and times, the accounts each account acts on, and its connections.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};

use spreadtrace_common::text::word_set;
use spreadtrace_common::Account;
use spreadtrace_graph::{NodeIndex, NodeKind, PropagationGraph};

pub struct AccountActivity<'g> {
    pub index: NodeIndex,
    pub node_id: &'g str,
    pub account: &'g Account,
    /// Authored post node indices in insertion order.
    pub posts: Vec<NodeIndex>,
    pub post_times: Vec<DateTime<Utc>>,
    pub word_sets: Vec<HashSet<String>>,
    /// Other accounts this account mentions or whose posts it acts on.
    pub counterparts: BTreeSet<NodeIndex>,
    /// Every node adjacent to this account in either direction.
    pub connections: HashSet<NodeIndex>,
}

pub struct ActivityIndex<'g> {
    accounts: Vec<AccountActivity<'g>>,
    by_node: HashMap<NodeIndex, usize>,
}

impl<'g> ActivityIndex<'g> {
    pub fn new(graph: &'g PropagationGraph) -> Self {
        let mut accounts: Vec<AccountActivity<'g>> = Vec::new();
        let mut by_node = HashMap::new();

        for index in graph.node_indices() {
            let node = graph.node_at(index);
            if let Some(account) = node.as_account() {
                by_node.insert(index, accounts.len());
                accounts.push(AccountActivity {
                    index,
                    node_id: node.id.as_str(),
                    account,
                    posts: Vec::new(),
                    post_times: Vec::new(),
                    word_sets: Vec::new(),
                    counterparts: BTreeSet::new(),
                    connections: HashSet::new(),
                });
            }
        }

        for index in graph.node_indices() {
            let Some(post) = graph.node_at(index).as_post() else { continue };
            let Some(author) = graph.author_of(post) else { continue };
            if let Some(&slot) = by_node.get(&author) {
                let activity = &mut accounts[slot];
                activity.posts.push(index);
                activity.post_times.push(post.created_at);
                activity.word_sets.push(word_set(&post.content));
            }
        }

        for (s, t, _) in graph.links() {
            if s == t {
                continue;
            }
            if let Some(&slot) = by_node.get(&s) {
                accounts[slot].connections.insert(t);
                let counterpart = match graph.node_at(t).kind() {
                    NodeKind::User => Some(t),
                    NodeKind::Post => graph.node_at(t).as_post().and_then(|p| graph.author_of(p)),
                };
                if let Some(c) = counterpart.filter(|&c| c != s) {
                    accounts[slot].counterparts.insert(c);
                }
            }
            if let Some(&slot) = by_node.get(&t) {
                accounts[slot].connections.insert(s);
            }
        }

        Self { accounts, by_node }
    }

    pub fn accounts(&self) -> &[AccountActivity<'g>] {
        &self.accounts
    }

    pub fn get(&self, node_index: NodeIndex) -> Option<&AccountActivity<'g>> {
        self.by_node.get(&node_index).map(|&slot| &self.accounts[slot])
    }

    /// Share of an account's counterparts that act on it in return.
    pub fn reciprocity(&self, activity: &AccountActivity<'_>) -> f64 {
        if activity.counterparts.is_empty() {
            return 0.0;
        }
        let reciprocated = activity
            .counterparts
            .iter()
            .filter(|&&other| {
                self.get(other)
                    .is_some_and(|o| o.counterparts.contains(&activity.index))
            })
            .count();
        reciprocated as f64 / activity.counterparts.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spreadtrace_common::fixtures::{account, base_time, collection, interaction, post};
    use spreadtrace_common::{AnalysisConfig, InteractionKind};
    use spreadtrace_graph::GraphBuilder;

    fn graph() -> PropagationGraph {
        let mut pa = post("pa", "a", "hello from a", 0);
        pa.mentions = vec!["c".into()];
        let data = collection(
            "x",
            vec![account("a", 1, 1, 100), account("b", 1, 1, 100), account("c", 1, 1, 100)],
            vec![pa, post("pb", "b", "hello from b", 1)],
            vec![
                interaction("i1", InteractionKind::Likes, "a", "pb", 2),
                interaction("i2", InteractionKind::Comments, "b", "pa", 3),
            ],
        );
        GraphBuilder::new(&AnalysisConfig::default(), base_time())
            .build(&[data])
            .graph
    }

    #[test]
    fn counterparts_include_authors_of_engaged_posts() {
        let graph = graph();
        let index = ActivityIndex::new(&graph);
        let a = index.get(graph.index_of("user_a").unwrap()).unwrap();
        let b = graph.index_of("user_b").unwrap();
        let c = graph.index_of("user_c").unwrap();
        assert_eq!(a.counterparts, BTreeSet::from([b, c]));
        assert_eq!(a.posts.len(), 1);
    }

    #[test]
    fn reciprocity_counts_mutual_counterparts() {
        let graph = graph();
        let index = ActivityIndex::new(&graph);
        let a = index.get(graph.index_of("user_a").unwrap()).unwrap();
        // b engages back, c never does
        assert!((index.reciprocity(a) - 0.5).abs() < 1e-10);
        let c = index.get(graph.index_of("user_c").unwrap()).unwrap();
        assert_eq!(index.reciprocity(c), 0.0);
    }
}
