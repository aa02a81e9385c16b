use chrono::{DateTime, TimeZone, Utc};
use forum::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use store::{InMemoryStore, RunList, RunStatus, WorkflowRun};
use tokio::sync::Barrier;

const BRANCH: &str = "master";
const POST_DIR: &str = "_posts/2025-03-09-hello-world";
const POST_DOC: &str = "_posts/2025-03-09-hello-world/index.md";
const COMMENT_DIR: &str = "_data/comments/2025-03-09-hello-world";

fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 9, h, m, s).unwrap()
}

fn service_at(store: &Arc<InMemoryStore>, now: DateTime<Utc>) -> ContentService {
    ContentService::new(
        store.clone(),
        BRANCH,
        SiteSecret::new("forum_secret_key_2025_secure_hash_verification").unwrap(),
    )
    .with_clock(Arc::new(move || now))
}

fn png(name: &str) -> ImageUpload {
    ImageUpload::new(name, "image/png", format!("png bytes of {}", name).into_bytes())
}

fn text(store: &InMemoryStore, path: &str) -> String {
    String::from_utf8(store.file(BRANCH, path).expect("file exists")).unwrap()
}

fn paths(store: &InMemoryStore) -> BTreeSet<String> {
    store.paths(BRANCH).into_iter().collect()
}

async fn hello_world(store: &Arc<InMemoryStore>, token: &OwnerToken) {
    service_at(store, at(10, 0, 0))
        .create_post(
            NewPost {
                title: "Hello World".to_string(),
                body: "First post.".to_string(),
                images: vec![png("cat.png")],
            },
            token,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_create_post_writes_document_and_image_in_one_commit() {
    let store = Arc::new(InMemoryStore::new(BRANCH));
    let token = OwnerToken::issue();
    let history = store.history_len(BRANCH);

    let outcome = service_at(&store, at(10, 0, 0))
        .create_post(
            NewPost {
                title: "Hello World".to_string(),
                body: "First post.".to_string(),
                images: vec![png("cat.png")],
            },
            &token,
        )
        .await
        .unwrap();

    assert_eq!(store.history_len(BRANCH), history + 1);
    assert_eq!(store.ref_update_count(), 1);
    assert_eq!(store.tip(BRANCH).as_deref(), Some(outcome.commit_id.as_str()));
    assert_eq!(
        store.commit_message(&outcome.commit_id).as_deref(),
        Some("Create new blog post: Hello World")
    );
    assert_eq!(
        store.file(BRANCH, &format!("{}/cat.png", POST_DIR)),
        Some(b"png bytes of cat.png".to_vec())
    );

    let raw = text(&store, POST_DOC);
    let doc = PostDocument::parse(&raw).unwrap();
    assert_eq!(doc.front.layout, "post");
    assert_eq!(doc.front.title, "Hello World");
    assert_eq!(doc.front.slug, "hello-world");
    assert_eq!(doc.front.author, "Anonymous");
    assert_eq!(doc.front.date, "2025-03-09T10:00:00Z");
    assert_eq!(doc.front.cookie_hash.len(), 16);
    assert_eq!(doc.body, "First post.");
    assert_eq!(
        raw.matches("![cat.png](memory://master/_posts/2025-03-09-hello-world/cat.png)")
            .count(),
        1
    );
}

#[tokio::test]
async fn test_duplicate_post_on_same_day_is_rejected() {
    let store = Arc::new(InMemoryStore::new(BRANCH));
    let token = OwnerToken::issue();
    hello_world(&store, &token).await;
    let tip = store.tip(BRANCH);

    let err = service_at(&store, at(18, 0, 0))
        .create_post(
            NewPost {
                title: "hello   world!".to_string(),
                body: "again".to_string(),
                images: vec![],
            },
            &OwnerToken::issue(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ForumError::Conflict { .. }));
    assert_eq!(store.tip(BRANCH), tip);
}

#[tokio::test]
async fn test_edit_post_replaces_deleted_image_and_keeps_date() {
    let store = Arc::new(InMemoryStore::new(BRANCH));
    let token = OwnerToken::issue();
    hello_world(&store, &token).await;

    let outcome = service_at(&store, at(15, 30, 0))
        .edit_post(
            PostEdit {
                slug: "hello-world".to_string(),
                date: "2025-03-09".to_string(),
                title: "Hello World (edited)".to_string(),
                body: "Updated body.".to_string(),
                new_images: vec![png("dog.png")],
                deleted_images: vec!["cat.png".to_string()],
            },
            &token,
        )
        .await
        .unwrap();

    assert_eq!(
        store.commit_message(&outcome.commit_id).as_deref(),
        Some("Update blog post: Hello World (edited)")
    );
    let files = paths(&store);
    assert!(!files.contains(&format!("{}/cat.png", POST_DIR)));
    assert!(files.contains(&format!("{}/dog.png", POST_DIR)));

    let raw = text(&store, POST_DOC);
    assert!(!raw.contains("![cat.png]"));
    assert_eq!(raw.matches("![dog.png]").count(), 1);

    let doc = PostDocument::parse(&raw).unwrap();
    assert_eq!(doc.front.title, "Hello World (edited)");
    assert_eq!(doc.front.date, "2025-03-09T10:00:00Z");
    assert_eq!(doc.body, "Updated body.");
}

#[tokio::test]
async fn test_edit_post_keeps_untouched_images() {
    let store = Arc::new(InMemoryStore::new(BRANCH));
    let token = OwnerToken::issue();
    hello_world(&store, &token).await;

    service_at(&store, at(11, 0, 0))
        .edit_post(
            PostEdit {
                slug: "hello-world".to_string(),
                date: "2025-03-09".to_string(),
                title: "Hello World".to_string(),
                body: "Same images.".to_string(),
                deleted_images: vec!["not-there.png".to_string()],
                ..PostEdit::default()
            },
            &token,
        )
        .await
        .unwrap();

    let doc = PostDocument::parse(&text(&store, POST_DOC)).unwrap();
    let names: Vec<&str> = doc.front.images.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["cat.png"]);
    assert!(store.file(BRANCH, &format!("{}/cat.png", POST_DIR)).is_some());
}

#[tokio::test]
async fn test_non_owner_cannot_edit_or_delete() {
    let store = Arc::new(InMemoryStore::new(BRANCH));
    let owner = OwnerToken::issue();
    let intruder = OwnerToken::issue();
    hello_world(&store, &owner).await;
    let service = service_at(&store, at(12, 0, 0));
    let comment = service
        .submit_comment(
            CommentSubmission {
                post_slug: "hello-world".to_string(),
                post_date: "2025-03-09".to_string(),
                text: "mine".to_string(),
                ..CommentSubmission::default()
            },
            &owner,
        )
        .await;
    assert!(comment.is_ok());
    let comment_id = "comment-09-03-2025--17-30-00";

    let tip = store.tip(BRANCH);
    let updates = store.ref_update_count();

    let edit = service
        .edit_post(
            PostEdit {
                slug: "hello-world".to_string(),
                date: "2025-03-09".to_string(),
                title: "Hijacked".to_string(),
                body: "x".to_string(),
                ..PostEdit::default()
            },
            &intruder,
        )
        .await;
    assert!(matches!(edit, Err(ForumError::Unauthorized { .. })));

    let delete = service.delete_post("hello-world", "2025-03-09", &intruder).await;
    assert!(matches!(delete, Err(ForumError::Unauthorized { .. })));

    let comment_edit = service
        .submit_comment(
            CommentSubmission {
                post_slug: "hello-world".to_string(),
                post_date: "2025-03-09".to_string(),
                text: "not yours".to_string(),
                comment_id: Some(comment_id.to_string()),
                ..CommentSubmission::default()
            },
            &intruder,
        )
        .await;
    assert!(matches!(comment_edit, Err(ForumError::Unauthorized { .. })));

    let comment_delete = service
        .delete_comment("hello-world", "2025-03-09", comment_id, &intruder)
        .await;
    assert!(matches!(comment_delete, Err(ForumError::Unauthorized { .. })));

    assert_eq!(store.tip(BRANCH), tip);
    assert_eq!(store.ref_update_count(), updates);
}

#[tokio::test]
async fn test_comment_lifecycle_with_image() {
    let store = Arc::new(InMemoryStore::new(BRANCH));
    let token = OwnerToken::issue();
    hello_world(&store, &token).await;

    // 06:15:42 UTC is 11:45:42 IST.
    let outcome = service_at(&store, at(6, 15, 42))
        .submit_comment(
            CommentSubmission {
                post_slug: "hello-world".to_string(),
                post_date: "2025-03-09".to_string(),
                text: "Nice post: really".to_string(),
                comment_id: None,
                image: Some(png("dog.png")),
            },
            &token,
        )
        .await
        .unwrap();
    assert_eq!(
        store.commit_message(&outcome.commit_id).as_deref(),
        Some("Add comment to post: hello-world")
    );

    let comment_id = "comment-09-03-2025--11-45-42";
    let comment_path = format!("{}/{}.yml", COMMENT_DIR, comment_id);
    let image_path = format!("{}/comment-dog.png", POST_DIR);
    let record = CommentRecord::parse(&text(&store, &comment_path)).unwrap();
    assert_eq!(record.message, "Nice post: really");
    assert_eq!(record.image_path.as_deref(), Some(image_path.as_str()));
    assert!(store.file(BRANCH, &image_path).is_some());

    // Editing without a new image keeps the old one.
    let outcome = service_at(&store, at(7, 0, 0))
        .submit_comment(
            CommentSubmission {
                post_slug: "hello-world".to_string(),
                post_date: "2025-03-09".to_string(),
                text: "Edited".to_string(),
                comment_id: Some(comment_id.to_string()),
                image: None,
            },
            &token,
        )
        .await
        .unwrap();
    assert_eq!(
        store.commit_message(&outcome.commit_id).as_deref(),
        Some(format!("Edit comment {} in post: hello-world", comment_id).as_str())
    );
    let edited = CommentRecord::parse(&text(&store, &comment_path)).unwrap();
    assert_eq!(edited.message, "Edited");
    assert_eq!(edited.image, record.image);
    assert_eq!(edited.image_path, record.image_path);

    // The post does not claim comment images as its own.
    let post = PostDocument::parse(&text(&store, POST_DOC)).unwrap();
    assert!(post.front.images.iter().all(|i| i.name == "cat.png"));

    let before = paths(&store);
    let outcome = service_at(&store, at(8, 0, 0))
        .delete_comment("hello-world", "2025-03-09", comment_id, &token)
        .await
        .unwrap();
    let after = paths(&store);

    let removed: BTreeSet<String> = before.difference(&after).cloned().collect();
    assert_eq!(removed, BTreeSet::from([comment_path, image_path]));
    assert!(after.is_subset(&before));
    assert_eq!(
        store.commit_message(&outcome.commit_id).as_deref(),
        Some(format!("Delete comment {} from post: hello-world", comment_id).as_str())
    );
}

#[tokio::test]
async fn test_legacy_comment_image_is_deleted() {
    let store = Arc::new(InMemoryStore::new(BRANCH));
    let token = OwnerToken::issue();
    hello_world(&store, &token).await;

    let secret = SiteSecret::new("forum_secret_key_2025_secure_hash_verification").unwrap();
    let legacy = format!(
        "date: 2024-12-01T08:00:00.000Z\ncookie_hash: {}\nmessage: old\nimage: https://github.com/o/r/blob/master/{}/comment-old.jpg?raw=true\n",
        secret.ownership_hash(&token),
        POST_DIR
    );
    store.seed_file(&format!("{}/comment-legacy.yml", COMMENT_DIR), legacy.into_bytes());
    store.seed_file(&format!("{}/comment-old.jpg", POST_DIR), b"jpg".to_vec());

    let before = paths(&store);
    service_at(&store, at(9, 0, 0))
        .delete_comment("hello-world", "2025-03-09", "comment-legacy", &token)
        .await
        .unwrap();
    let removed: Vec<String> = before.difference(&paths(&store)).cloned().collect();

    assert_eq!(
        removed,
        vec![
            format!("{}/comment-legacy.yml", COMMENT_DIR),
            format!("{}/comment-old.jpg", POST_DIR),
        ]
    );
}

#[tokio::test]
async fn test_post_without_owner_hash_is_unauthorized() {
    let store = Arc::new(InMemoryStore::new(BRANCH));
    store.seed_file(
        POST_DOC,
        b"---\nlayout: post\ntitle: Hello World\ndate: 2025-03-09\nauthor: Anonymous\nslug: hello-world\n---\n\nLegacy.\n".to_vec(),
    );
    let service = service_at(&store, at(12, 0, 0));
    let token = OwnerToken::issue();

    let edit = service
        .edit_post(
            PostEdit {
                slug: "hello-world".to_string(),
                date: "2025-03-09".to_string(),
                title: "Taken over".to_string(),
                body: "Mine now.".to_string(),
                ..PostEdit::default()
            },
            &token,
        )
        .await
        .unwrap_err();
    assert!(matches!(edit, ForumError::Unauthorized { .. }), "{:?}", edit);
    assert_eq!(edit.status_code(), 403);

    let delete = service
        .delete_post("hello-world", "2025-03-09", &token)
        .await
        .unwrap_err();
    assert!(matches!(delete, ForumError::Unauthorized { .. }), "{:?}", delete);
    assert_eq!(store.ref_update_count(), 0);
}

#[tokio::test]
async fn test_delete_post_removes_comments_too() {
    let store = Arc::new(InMemoryStore::new(BRANCH));
    let token = OwnerToken::issue();
    hello_world(&store, &token).await;
    service_at(&store, at(11, 0, 0))
        .submit_comment(
            CommentSubmission {
                post_slug: "hello-world".to_string(),
                post_date: "2025-03-09".to_string(),
                text: "first!".to_string(),
                ..CommentSubmission::default()
            },
            &OwnerToken::issue(),
        )
        .await
        .unwrap();
    store.seed_file("_posts/2025-03-08-other/index.md", b"keep me".to_vec());

    let outcome = service_at(&store, at(12, 0, 0))
        .delete_post("hello-world", "2025-03-09", &token)
        .await
        .unwrap();

    assert_eq!(
        store.commit_message(&outcome.commit_id).as_deref(),
        Some("Delete post: hello-world")
    );
    let remaining = paths(&store);
    assert!(remaining.iter().all(|p| !p.starts_with(POST_DIR) && !p.starts_with(COMMENT_DIR)));
    assert!(remaining.contains("_posts/2025-03-08-other/index.md"));
}

#[tokio::test]
async fn test_missing_resources_are_not_found() {
    let store = Arc::new(InMemoryStore::new(BRANCH));
    let token = OwnerToken::issue();
    let service = service_at(&store, at(10, 0, 0));

    let edit = service
        .edit_post(
            PostEdit {
                slug: "nope".to_string(),
                date: "2025-03-09".to_string(),
                title: "t".to_string(),
                body: "b".to_string(),
                ..PostEdit::default()
            },
            &token,
        )
        .await;
    assert!(matches!(edit, Err(ForumError::NotFound { .. })));

    let delete = service.delete_post("nope", "2025-03-09", &token).await;
    assert!(matches!(delete, Err(ForumError::NotFound { .. })));

    let comment = service
        .delete_comment("nope", "2025-03-09", "comment-1", &token)
        .await;
    assert!(matches!(comment, Err(ForumError::NotFound { .. })));
    assert_eq!(store.ref_update_count(), 0);
}

#[tokio::test]
async fn test_invalid_uploads_are_rejected() {
    let store = Arc::new(InMemoryStore::new(BRANCH));
    let service = service_at(&store, at(10, 0, 0));

    let err = service
        .create_post(
            NewPost {
                title: "Docs".to_string(),
                body: "see attachment".to_string(),
                images: vec![ImageUpload::new("notes.pdf", "application/pdf", b"%PDF".to_vec())],
            },
            &OwnerToken::issue(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ForumError::Validation { .. }));
    assert_eq!(store.ref_update_count(), 0);
}

#[tokio::test]
async fn test_post_image_with_comment_prefix_is_rejected() {
    let store = Arc::new(InMemoryStore::new(BRANCH));
    let token = OwnerToken::issue();

    let err = service_at(&store, at(10, 0, 0))
        .create_post(
            NewPost {
                title: "Hello World".to_string(),
                body: "First post.".to_string(),
                images: vec![png("comment-photo.png")],
            },
            &token,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ForumError::Validation { .. }), "{:?}", err);
    assert_eq!(store.ref_update_count(), 0);

    hello_world(&store, &token).await;
    let tip = store.tip(BRANCH);
    let err = service_at(&store, at(11, 0, 0))
        .edit_post(
            PostEdit {
                slug: "hello-world".to_string(),
                date: "2025-03-09".to_string(),
                title: "Hello World".to_string(),
                body: "First post.".to_string(),
                new_images: vec![png("comment-photo.png")],
                ..PostEdit::default()
            },
            &token,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ForumError::Validation { .. }), "{:?}", err);
    assert_eq!(store.tip(BRANCH), tip);
}

#[tokio::test]
async fn test_comments_in_the_same_second_do_not_overwrite() {
    let store = Arc::new(InMemoryStore::new(BRANCH));
    let alice = OwnerToken::issue();
    let bob = OwnerToken::issue();
    hello_world(&store, &alice).await;

    let comment = |text: &str| CommentSubmission {
        post_slug: "hello-world".to_string(),
        post_date: "2025-03-09".to_string(),
        text: text.to_string(),
        comment_id: None,
        image: None,
    };
    let service = service_at(&store, at(10, 0, 0));
    service.submit_comment(comment("alice comment"), &alice).await.unwrap();
    let tip = store.tip(BRANCH);

    let err = service
        .submit_comment(comment("bob comment"), &bob)
        .await
        .unwrap_err();
    assert!(matches!(err, ForumError::Conflict { .. }), "{:?}", err);
    assert_eq!(err.status_code(), 409);
    assert_eq!(store.tip(BRANCH), tip);

    let path = format!("{}/comment-09-03-2025--15-30-00.yml", COMMENT_DIR);
    let record = CommentRecord::parse(&text(&store, &path)).unwrap();
    assert_eq!(record.message, "alice comment");
    assert!(SiteSecret::new("forum_secret_key_2025_secure_hash_verification")
        .unwrap()
        .verify(&alice, &record.cookie_hash));
}

#[tokio::test]
async fn test_concurrent_writes_one_conflicts() {
    let gate = Arc::new(Barrier::new(2));
    let store = Arc::new(InMemoryStore::new(BRANCH).with_update_gate(gate));
    let history = store.history_len(BRANCH);
    let a = service_at(&store, at(10, 0, 0));
    let b = service_at(&store, at(10, 0, 1));

    let post = |title: &str| NewPost {
        title: title.to_string(),
        body: "racing".to_string(),
        images: vec![],
    };
    let token = OwnerToken::issue();
    let (first, second) = tokio::join!(
        a.create_post(post("First"), &token),
        b.create_post(post("Second"), &token)
    );

    let results = [first, second];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let conflict = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert!(matches!(conflict, ForumError::Conflict { .. }));
    assert_eq!(conflict.status_code(), 409);
    assert_eq!(store.history_len(BRANCH), history + 1);
}

#[tokio::test]
async fn test_commit_status() {
    let store = Arc::new(InMemoryStore::new(BRANCH));
    let service = service_at(&store, at(10, 0, 0));

    let status = service.commit_status("abc123").await.unwrap();
    assert_eq!(status.status, RunStatus::Pending);

    store.set_runs(
        "abc123",
        RunList {
            total_count: 1,
            runs: vec![WorkflowRun {
                status: RunStatus::Completed,
                conclusion: Some("success".to_string()),
                created_at: Some(at(10, 1, 0)),
            }],
        },
    );
    let status = service.commit_status("abc123").await.unwrap();
    assert!(status.is_terminal());
    assert_eq!(status.conclusion.as_deref(), Some("success"));

    assert!(matches!(
        service.commit_status("").await,
        Err(ForumError::Validation { .. })
    ));
}
