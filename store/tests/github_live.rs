//! Runs against a real repository. Needs `GITHUB_TOKEN`, `GITHUB_OWNER`,
//! `GITHUB_REPO` and a disposable `GITHUB_BRANCH`.

use std::sync::Arc;
use std::time::Duration;
use store::{CommitBuilder, CommitRequest, FileOperation, GitHubConfig, GitHubStore, GitStore};

const TIMEOUT: Duration = Duration::from_secs(60);

fn make_store() -> Arc<GitHubStore> {
    let config = GitHubConfig::from_env().with_timeout(TIMEOUT);
    Arc::new(GitHubStore::new(config).expect("store creation"))
}

fn branch() -> String {
    std::env::var("GITHUB_BRANCH").expect("GITHUB_BRANCH must name a scratch branch")
}

#[tokio::test]
#[ignore]
async fn test_commit_round_trip() {
    let store = make_store();
    let branch = branch();
    let builder = CommitBuilder::new(store.clone());
    let stamp = chrono::Utc::now().timestamp();
    let dir = format!("_scratch/{}", stamp);

    let request = CommitRequest::new(&branch, "Live store test")
        .with_operation(FileOperation::text(format!("{}/note.md", dir), "hello"))
        .with_operation(FileOperation::binary(format!("{}/pixel.png", dir), vec![137u8, 80, 78, 71]));
    let outcome = tokio::time::timeout(TIMEOUT, builder.create_commit(request))
        .await
        .expect("commit timed out")
        .expect("commit failed");

    assert_eq!(store.get_ref(&branch).await.unwrap(), outcome.commit_id);
    assert_eq!(
        store.get_text(&format!("{}/note.md", dir), &branch).await.unwrap().as_deref(),
        Some("hello")
    );

    let listing = store.list_directory(&dir, &branch).await.unwrap();
    let mut names: Vec<_> = listing.iter().map(|e| e.name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["note.md", "pixel.png"]);

    let cleanup = CommitRequest::new(&branch, "Live store test cleanup")
        .with_operation(FileOperation::delete(format!("{}/note.md", dir)))
        .with_operation(FileOperation::delete(format!("{}/pixel.png", dir)));
    builder.create_commit(cleanup).await.expect("cleanup failed");
    assert!(store.list_directory(&dir, &branch).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore]
async fn test_runs_for_unknown_commit_are_empty() {
    let store = make_store();
    let runs = store
        .list_runs_for_commit("0000000000000000000000000000000000000000")
        .await
        .expect("listing runs failed");
    assert_eq!(runs.total_count, 0);
}
