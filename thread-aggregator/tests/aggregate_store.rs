mod common;

use common::{scenario_accounts, scenario_content, MockAccountsApi, MockContentApi};
use std::sync::Arc;
use thread_aggregator::{
    find_node, walk, AggregateStore, LoadPhase, ProfileCache, StoreOptions,
};
use serde_json::json;
use threadline_core::{NodeKey, NodePatch};

fn store_for(
    content: &Arc<MockContentApi>,
    accounts: &Arc<MockAccountsApi>,
    author: &str,
    permlink: &str,
) -> AggregateStore {
    AggregateStore::from_sources(
        NodeKey::new(author, permlink),
        content.clone(),
        accounts.clone(),
        Arc::new(ProfileCache::new()),
        StoreOptions::default(),
    )
}

async fn loaded_scenario() -> (Arc<MockContentApi>, AggregateStore) {
    let content = scenario_content();
    let accounts = scenario_accounts();
    let store = store_for(&content, &accounts, "alice", "p1");
    store.refresh_all().await;
    (content, store)
}

#[tokio::test]
async fn test_initial_state_is_idle() {
    let content = scenario_content();
    let accounts = scenario_accounts();
    let store = store_for(&content, &accounts, "alice", "p1");

    let state = store.state();
    assert_eq!(state.root_phase, LoadPhase::Idle);
    assert_eq!(state.tree_phase, LoadPhase::Idle);
    assert!(state.root.is_none());
    assert!(state.tree.is_empty());
    assert!(!state.root_loading() && !state.tree_loading());
}

#[tokio::test]
async fn test_refresh_all_populates_both_sides() {
    let (_content, store) = loaded_scenario().await;
    let state = store.state();

    assert_eq!(state.root_phase, LoadPhase::Ready);
    assert_eq!(state.tree_phase, LoadPhase::Ready);
    assert!(state.root_error.is_none() && state.tree_error.is_none());

    let root = state.root.unwrap();
    assert_eq!(root.title, "Title of p1");
    assert_eq!(root.avatar_url.as_deref(), Some("https://img/alice.png"));

    // newest first at the top level
    let top: Vec<&str> = state.tree.iter().map(|n| n.permlink.as_str()).collect();
    assert_eq!(top, vec!["p3", "p2"]);
}

#[tokio::test]
async fn test_top_level_sorted_but_nested_in_fetch_order() {
    let content = scenario_content();
    content.add_reply(("bob", "p2"), "dave", "p5", "2020-01-01T00:00:00");
    content.add_reply(("bob", "p2"), "erin", "p6", "2022-01-01T00:00:00");
    let accounts = scenario_accounts();
    let store = store_for(&content, &accounts, "alice", "p1");

    let tree = store.fetch_tree().await.unwrap();
    let bob = find_node(&tree, "bob", "p2").unwrap();
    let nested: Vec<&str> = bob.replies.iter().map(|n| n.permlink.as_str()).collect();
    assert_eq!(nested, vec!["p4", "p5", "p6"]);
}

#[tokio::test]
async fn test_tree_failure_leaves_root_intact() {
    let content = scenario_content();
    content.fail_listing("alice", "p1");
    let accounts = scenario_accounts();
    let store = store_for(&content, &accounts, "alice", "p1");

    store.refresh_all().await;
    let state = store.state();

    assert!(state.root.is_some());
    assert!(state.root_error.is_none());
    assert_eq!(state.root_phase, LoadPhase::Ready);
    assert!(state.tree.is_empty());
    assert_eq!(state.tree_phase, LoadPhase::Failed);
    let tree_error = state.tree_error.unwrap();
    assert_eq!(tree_error.code, "TREE_FETCH_FAILURE");
    assert!(tree_error.retryable);
}

#[tokio::test]
async fn test_missing_root_is_not_found() {
    let content = Arc::new(MockContentApi::new());
    let accounts = Arc::new(MockAccountsApi::new());
    let store = store_for(&content, &accounts, "alice", "nope");

    store.refresh_all().await;
    let state = store.state();

    assert!(state.root.is_none());
    assert_eq!(state.root_phase, LoadPhase::Failed);
    assert_eq!(state.root_error.unwrap().code, "NOT_FOUND");
    // the tree side is judged on its own
    assert_eq!(state.tree_phase, LoadPhase::Ready);
    assert!(state.tree_error.is_none());
}

#[tokio::test]
async fn test_record_without_author_is_not_found() {
    let content = Arc::new(MockContentApi::new());
    content.insert_record(
        "alice",
        "p1",
        threadline_core::RawContent {
            permlink: "p1".to_string(),
            body: "orphaned".to_string(),
            ..Default::default()
        },
    );
    let accounts = Arc::new(MockAccountsApi::new());
    let store = store_for(&content, &accounts, "alice", "p1");

    assert!(store.fetch_root().await.is_err());
    assert_eq!(store.state().root_error.unwrap().code, "NOT_FOUND");
}

#[tokio::test]
async fn test_transient_root_failure_keeps_last_root() {
    let (content, store) = loaded_scenario().await;
    let before = store.root().unwrap();

    content.fail_record("alice", "p1");
    assert!(store.fetch_root().await.is_err());

    let state = store.state();
    assert!(Arc::ptr_eq(state.root.as_ref().unwrap(), &before));
    assert_eq!(state.root_phase, LoadPhase::Failed);
    assert!(state.root_error.unwrap().retryable);

    content.heal_record("alice", "p1");
    store.fetch_root().await.unwrap();
    assert!(store.state().root_error.is_none());
}

#[tokio::test]
async fn test_deleted_reply_disappears_on_refresh() {
    let (content, store) = loaded_scenario().await;
    assert!(find_node(&store.tree(), "carol", "p3").is_some());

    content.remove_reply(("alice", "p1"), "carol", "p3");
    store.refresh_all().await;

    let tree = store.tree();
    assert!(find_node(&tree, "carol", "p3").is_none());
    assert_eq!(tree.len(), 1);
}

#[tokio::test]
async fn test_update_node_is_referentially_minimal() {
    let (content, store) = loaded_scenario().await;
    let before = store.state();
    let calls = (content.listing_calls(), content.content_calls());

    let patched = store.update_node("bob", "p2", &NodePatch::new().with_vote_count(5));
    assert!(patched);

    let after = store.state();
    let bob_before = find_node(&before.tree, "bob", "p2").unwrap();
    let bob_after = find_node(&after.tree, "bob", "p2").unwrap();
    assert_eq!(bob_after.vote_count, 5);
    assert_eq!(bob_after.body, bob_before.body);
    assert!(!Arc::ptr_eq(bob_before, bob_after));
    // bob's own replies are shared
    assert!(Arc::ptr_eq(&bob_before.replies[0], &bob_after.replies[0]));

    let carol_before = find_node(&before.tree, "carol", "p3").unwrap();
    let carol_after = find_node(&after.tree, "carol", "p3").unwrap();
    assert!(Arc::ptr_eq(carol_before, carol_after));
    assert!(Arc::ptr_eq(
        before.root.as_ref().unwrap(),
        after.root.as_ref().unwrap()
    ));

    // purely local
    assert_eq!((content.listing_calls(), content.content_calls()), calls);
}

#[tokio::test]
async fn test_update_nested_node_copies_only_its_path() {
    let (_content, store) = loaded_scenario().await;
    let before = store.tree();

    assert!(store.update_node("alice", "p4", &NodePatch::new().with_body("edited")));

    let after = store.tree();
    assert_eq!(find_node(&after, "alice", "p4").unwrap().body, "edited");
    assert!(Arc::ptr_eq(
        find_node(&before, "carol", "p3").unwrap(),
        find_node(&after, "carol", "p3").unwrap()
    ));
    let untouched = walk(&after)
        .filter(|node| node.permlink != "p4")
        .all(|node| node.body.starts_with("body of"));
    assert!(untouched);
}

#[tokio::test]
async fn test_update_root_leaves_tree_untouched() {
    let (_content, store) = loaded_scenario().await;
    let before = store.state();

    assert!(store.update_node(
        "alice",
        "p1",
        &NodePatch::new().with_vote_count(42).with_title("Edited")
    ));

    let after = store.state();
    let root = after.root.as_ref().unwrap();
    assert_eq!(root.vote_count, 42);
    assert_eq!(root.title, "Edited");
    assert_eq!(before.tree.len(), after.tree.len());
    for (old, new) in before.tree.iter().zip(after.tree.iter()) {
        assert!(Arc::ptr_eq(old, new));
    }
}

#[tokio::test]
async fn test_update_unknown_node_changes_nothing() {
    let (_content, store) = loaded_scenario().await;
    let before = store.state();

    assert!(!store.update_node("zed", "p9", &NodePatch::new().with_vote_count(1)));

    let after = store.state();
    for (old, new) in before.tree.iter().zip(after.tree.iter()) {
        assert!(Arc::ptr_eq(old, new));
    }
}

#[tokio::test]
async fn test_fetch_tree_with_custom_depth() {
    let content = scenario_content();
    let accounts = scenario_accounts();
    let store = store_for(&content, &accounts, "alice", "p1");

    let tree = store.fetch_tree_with_depth(0).await.unwrap();
    assert!(tree.iter().all(|node| node.replies.is_empty()));
    assert_eq!(store.state().tree_phase, LoadPhase::Ready);
}

#[tokio::test]
async fn test_shared_cache_spans_root_and_tree() {
    let content = scenario_content();
    let accounts = scenario_accounts();
    let cache = Arc::new(ProfileCache::new());
    let store = AggregateStore::from_sources(
        NodeKey::new("alice", "p1"),
        content.clone(),
        accounts.clone(),
        cache.clone(),
        StoreOptions::default(),
    );

    store.fetch_root().await.unwrap();
    store.fetch_tree().await.unwrap();
    store.refresh_all().await;

    // alice, then {bob, carol}; the refresh is served from cache
    assert_eq!(accounts.calls(), 2);
    assert_eq!(cache.len(), 3);
}

#[tokio::test]
async fn test_superseded_tree_fetch_is_discarded() {
    let content = scenario_content();
    let accounts = scenario_accounts();
    let store = store_for(&content, &accounts, "alice", "p1");
    let gate = content.hold_next_listing();

    let (stale, newer) = tokio::join!(store.fetch_tree(), async {
        gate.entered.notified().await;
        let state = store.state();
        assert_eq!(state.tree_phase, LoadPhase::Loading);
        assert!(state.tree_loading());

        // the thread changes while the first fetch is held
        content.remove_reply(("alice", "p1"), "carol", "p3");
        content.add_reply(("alice", "p1"), "dave", "p9", "2021-02-01T00:00:00");
        let newer = store.fetch_tree().await;

        gate.release.notify_one();
        newer
    });

    // the held fetch still answers its caller with what it saw
    let stale = stale.unwrap();
    assert!(find_node(&stale, "carol", "p3").is_some());
    assert!(find_node(&stale, "dave", "p9").is_none());

    let newer = newer.unwrap();
    let state = store.state();
    assert_eq!(state.tree_phase, LoadPhase::Ready);
    assert!(!state.tree_loading());
    assert_eq!(state.tree.len(), newer.len());
    assert!(find_node(&state.tree, "dave", "p9").is_some());
    assert!(find_node(&state.tree, "carol", "p3").is_none());
}

#[tokio::test]
async fn test_serialized_state_carries_loading_flags() {
    let content = scenario_content();
    let accounts = scenario_accounts();
    let store = store_for(&content, &accounts, "alice", "p1");
    let gate = content.hold_next_listing();

    let (_, during) = tokio::join!(store.refresh_all(), async {
        gate.entered.notified().await;
        let during = serde_json::to_value(store.state()).unwrap();
        gate.release.notify_one();
        during
    });

    assert_eq!(during["tree_phase"], json!("loading"));
    assert_eq!(during["tree_loading"], json!(true));

    let after = serde_json::to_value(store.state()).unwrap();
    assert_eq!(after["root_phase"], json!("ready"));
    assert_eq!(after["root_loading"], json!(false));
    assert_eq!(after["tree_loading"], json!(false));
    assert_eq!(after["root"]["permlink"], json!("p1"));
    assert_eq!(after["tree"].as_array().unwrap().len(), 2);
    assert!(after["tree_error"].is_null());
}
