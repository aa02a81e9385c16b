use forum::prelude::*;
use std::sync::Arc;
use store::InMemoryStore;

fn endpoints(store: &Arc<InMemoryStore>) -> Endpoints {
    let service = ContentService::new(store.clone(), "master", SiteSecret::new("s").unwrap());
    Endpoints::new(Arc::new(service))
}

fn today() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

#[tokio::test]
async fn test_post_edit_and_delete_through_endpoints() {
    let store = Arc::new(InMemoryStore::new("master"));
    let api = endpoints(&store);
    let owner = OwnerToken::issue();

    let created = api
        .submit_post(
            EndpointRequest::post()
                .with_token(&owner)
                .with_field("title", "Hello World")
                .with_field("description", "First post.")
                .with_file(ImageUpload::new("cat.png", "image/png", b"cat".to_vec()))
                .with_file(ImageUpload::new("dog.png", "image/png", b"dog".to_vec())),
        )
        .await;
    assert_eq!(created.status, 200, "{:?}", created.body);

    let date = today();
    let dir = format!("_posts/{}-hello-world", date);

    let edited = api
        .submit_post(
            EndpointRequest::post()
                .with_token(&owner)
                .with_field("slug", "hello-world")
                .with_field("date", date.as_str())
                .with_field("title", "Hello again")
                .with_field("description", "Edited.")
                .with_field("deletedFiles", "cat.png, "),
        )
        .await;
    assert_eq!(edited.status, 200, "{:?}", edited.body);
    assert!(store.file("master", &format!("{}/cat.png", dir)).is_none());
    assert!(store.file("master", &format!("{}/dog.png", dir)).is_some());

    let intruder = api
        .delete_content(
            EndpointRequest::post()
                .with_token(&OwnerToken::issue())
                .with_field("postSlug", "hello-world")
                .with_field("postDate", date.as_str()),
        )
        .await;
    assert_eq!(intruder.status, 403);
    assert_eq!(
        intruder.body.unwrap()["error"],
        "You can only delete your own posts."
    );

    let missing_comment = api
        .delete_content(
            EndpointRequest::post()
                .with_token(&owner)
                .with_field("postSlug", "hello-world")
                .with_field("postDate", date.as_str())
                .with_field("commentId", "comment-nope"),
        )
        .await;
    assert_eq!(missing_comment.status, 404);

    let deleted = api
        .delete_content(
            EndpointRequest::post()
                .with_token(&owner)
                .with_field("postSlug", "hello-world")
                .with_field("postDate", date.as_str()),
        )
        .await;
    assert_eq!(deleted.status, 200);
    assert!(store.paths("master").is_empty());
}

#[tokio::test]
async fn test_comment_endpoint_uses_first_file() {
    let store = Arc::new(InMemoryStore::new("master"));
    let api = endpoints(&store);
    let token = OwnerToken::issue();

    let response = api
        .submit_comment(
            EndpointRequest::post()
                .with_token(&token)
                .with_field("postSlug", "hello-world")
                .with_field("postDate", "2025-03-09")
                .with_field("comment", "Looks good")
                .with_file(ImageUpload::new("a.gif", "image/gif", b"gif".to_vec()))
                .with_file(ImageUpload::new("b.gif", "image/gif", b"gif".to_vec())),
        )
        .await;

    assert_eq!(response.status, 200, "{:?}", response.body);
    let files = store.paths("master");
    assert!(files.contains(&"_posts/2025-03-09-hello-world/comment-a.gif".to_string()));
    assert!(!files.iter().any(|p| p.ends_with("comment-b.gif")));
    assert_eq!(files.iter().filter(|p| p.ends_with(".yml")).count(), 1);
}
