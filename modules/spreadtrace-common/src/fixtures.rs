//! Fixture builders for tests across the workspace.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::types::{Account, DataCollection, Interaction, InteractionKind, Post};

/// Fixed reference instant so fixtures and scores are reproducible.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Unverified account created `age_days` before [`base_time`].
pub fn account(id: &str, followers: u64, following: u64, age_days: i64) -> Account {
    Account {
        id: id.to_string(),
        platform: "x".to_string(),
        username: Some(format!("{id}_handle")),
        follower_count: followers,
        following_count: following,
        verified: false,
        created_at: base_time() - Duration::days(age_days),
        bio: String::new(),
    }
}

pub fn verified_account(id: &str, followers: u64, following: u64, age_days: i64) -> Account {
    Account {
        verified: true,
        ..account(id, followers, following, age_days)
    }
}

/// Post by `author` at `base_time() + offset_minutes`.
pub fn post(id: &str, author: &str, content: &str, offset_minutes: i64) -> Post {
    Post {
        id: id.to_string(),
        author_id: author.to_string(),
        platform: "x".to_string(),
        content: content.to_string(),
        created_at: base_time() + Duration::minutes(offset_minutes),
        likes: 0,
        shares: 0,
        comments: 0,
        reposts: 0,
        parent_post_id: None,
        is_share: false,
        hashtags: Vec::new(),
        mentions: Vec::new(),
        urls: Vec::new(),
    }
}

/// Post that replies to (or shares, when `share`) `parent`.
pub fn child_post(id: &str, author: &str, parent: &str, share: bool, offset_minutes: i64) -> Post {
    Post {
        parent_post_id: Some(parent.to_string()),
        is_share: share,
        ..post(id, author, &format!("re {parent}"), offset_minutes)
    }
}

pub fn interaction(
    id: &str,
    kind: InteractionKind,
    account: &str,
    post: &str,
    offset_minutes: i64,
) -> Interaction {
    Interaction {
        id: id.to_string(),
        kind,
        account_id: account.to_string(),
        post_id: post.to_string(),
        timestamp: base_time() + Duration::minutes(offset_minutes),
        metadata: BTreeMap::new(),
    }
}

pub fn collection(
    platform: &str,
    accounts: Vec<Account>,
    posts: Vec<Post>,
    interactions: Vec<Interaction>,
) -> DataCollection {
    DataCollection {
        platform: platform.to_string(),
        accounts,
        posts,
        interactions,
        collected_at: base_time(),
        query: None,
        time_range: None,
    }
}
