use std::sync::Arc;

use curator::Console;
use curator::api::{ApiClient, HttpAuthBackend};
use curator::cache::query_keys::{self, Channel, LeadFilters, PostFilters};
use curator::cache::{CacheConfig, EntryStatus};
use curator::infinite::NextPage;
use curator::polling::PollingConfig;
use curator::session::{MemorySessionStore, SessionManager, SystemClock};
use curator::{ErrorKind, SyncError};
use curator_api_types::{ContentType, FeedCreate, JobStatus, JobSnapshot};
use httpmock::MockServer;
use serde_json::{Value, json};

fn console_with(server: &MockServer, attach_token: bool) -> Console {
    let session = SessionManager::new(
        Arc::new(HttpAuthBackend::new(&server.base_url()).expect("auth backend")),
        Arc::new(MemorySessionStore::default()),
        Arc::new(SystemClock),
        time::Duration::minutes(5),
    );
    let mut api = ApiClient::new(&server.base_url()).expect("api client");
    if attach_token {
        api = api.with_session(session.clone());
    }
    let cache = CacheConfig {
        query_retry_limit: 0,
        ..CacheConfig::default()
    };
    Console::from_parts(api, session, cache, PollingConfig::default())
}

fn console(server: &MockServer) -> Console {
    console_with(server, false)
}

fn feed(id: i64, active: i64) -> Value {
    json!({
        "id": id,
        "category_id": 1,
        "url": format!("https://news.example/{id}.xml"),
        "source_name": format!("Source {id}"),
        "fetch_interval": 60,
        "is_active": active,
        "created_at": "2024-05-01T10:00:00"
    })
}

fn pending(content_type: &str, content_id: i64) -> Value {
    json!({
        "content_type": content_type,
        "content_id": content_id,
        "title": "Mining permit protests",
        "source_name": "Source",
        "collected_at": "2024-05-01T10:00:00"
    })
}

fn ids(value: &Value) -> Vec<i64> {
    value
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|item| item["id"].as_i64())
        .collect()
}

#[tokio::test]
async fn failed_delete_restores_cached_feeds() -> Result<(), SyncError> {
    let server = MockServer::start_async().await;
    let list = server
        .mock_async(|when, then| {
            when.method("GET").path("/feeds");
            then.status(200).json_body(json!([feed(1, 1), feed(2, 1)]));
        })
        .await;
    let delete = server
        .mock_async(|when, then| {
            when.method("DELETE").path("/feeds/2");
            then.status(500).json_body(json!({"detail": "database is locked"}));
        })
        .await;

    let console = console(&server);
    assert_eq!(console.feeds().await?.len(), 2);

    let err = console.delete_feed(2).await.expect_err("delete fails");
    assert_eq!(err.status(), Some(500));
    assert_eq!(err.message(), "database is locked");

    let cached = console.store().value(&query_keys::feeds()).expect("feeds cached");
    assert_eq!(ids(&cached), vec![1, 2]);
    list.assert_calls_async(1).await;
    delete.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn successful_delete_drops_feed_and_marks_dependents_stale() -> Result<(), SyncError> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("GET").path("/feeds");
            then.status(200).json_body(json!([feed(1, 1), feed(2, 0)]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method("DELETE").path("/feeds/2");
            then.status(204);
        })
        .await;

    let console = console(&server);
    console.feeds().await?;
    console.delete_feed(2).await?;

    let entry = console.store().get(&query_keys::feeds());
    assert_eq!(ids(entry.value.as_ref().expect("feeds cached")), vec![1]);
    assert_eq!(entry.status, EntryStatus::Stale);
    assert!(entry.tag.is_none());
    Ok(())
}

#[tokio::test]
async fn created_feed_is_appended_from_server_record() -> Result<(), SyncError> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("GET").path("/feeds");
            then.status(200).json_body(json!([feed(1, 1)]));
        })
        .await;
    let create = server
        .mock_async(|when, then| {
            when.method("POST").path("/feeds");
            then.status(200).json_body(feed(9, 1));
        })
        .await;

    let console = console(&server);
    console.feeds().await?;
    let created = console
        .create_feed(&FeedCreate {
            category_id: 1,
            url: "https://news.example/9.xml".to_owned(),
            source_name: "Source 9".to_owned(),
            website: None,
            fetch_interval: 60,
            is_active: 1,
        })
        .await?;

    assert_eq!(created.id, 9);
    let cached = console.store().value(&query_keys::feeds()).expect("feeds cached");
    assert_eq!(ids(&cached), vec![1, 9]);
    create.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn approval_removes_item_from_both_pending_views() -> Result<(), SyncError> {
    let server = MockServer::start_async().await;
    let all = server
        .mock_async(|when, then| {
            when.method("GET").path("/approval/pending");
            then.status(200).json_body(json!({
                "total_count": 2,
                "items": [pending("reddit_post", 7), pending("lead", 7)]
            }));
        })
        .await;

    let console = console(&server);
    assert_eq!(console.approval_pending(None).await?.total_count, 2);
    all.delete_async().await;

    server
        .mock_async(|when, then| {
            when.method("GET")
                .path("/approval/pending")
                .query_param("content_type", "reddit_post");
            then.status(200).json_body(json!({
                "total_count": 1,
                "items": [pending("reddit_post", 7)]
            }));
        })
        .await;
    assert_eq!(
        console
            .approval_pending(Some(ContentType::RedditPost))
            .await?
            .items
            .len(),
        1
    );

    let decide = server
        .mock_async(|when, then| {
            when.method("POST").path("/approval/approve");
            then.status(200).json_body(json!({"message": "approved"}));
        })
        .await;
    console
        .approve(ContentType::RedditPost, 7, Some("on topic".to_owned()))
        .await?;
    decide.assert_async().await;

    let all = console
        .store()
        .value(&query_keys::approval_pending(None))
        .expect("all view cached");
    assert_eq!(all["total_count"], json!(1));
    assert_eq!(all["items"][0]["content_type"], json!("lead"));

    let filtered = console
        .store()
        .value(&query_keys::approval_pending(Some(ContentType::RedditPost)))
        .expect("filtered view cached");
    assert_eq!(filtered["total_count"], json!(0));
    assert_eq!(filtered["items"], json!([]));
    assert_eq!(console.reviewer(), "admin");
    Ok(())
}

#[tokio::test]
async fn leads_infinite_accumulates_until_short_page() -> Result<(), SyncError> {
    let server = MockServer::start_async().await;
    let first = server
        .mock_async(|when, then| {
            when.method("GET")
                .path("/leads")
                .query_param("search", "peru")
                .query_param("limit", "30")
                .query_param("offset", "0");
            let items: Vec<Value> = (1..=30).map(|id| json!({"id": id})).collect();
            then.status(200).json_body(Value::Array(items));
        })
        .await;
    let second = server
        .mock_async(|when, then| {
            when.method("GET")
                .path("/leads")
                .query_param("search", "peru")
                .query_param("offset", "30");
            let items: Vec<Value> = (31..=35).map(|id| json!({"id": id})).collect();
            then.status(200).json_body(Value::Array(items));
        })
        .await;

    let console = console(&server);
    let list = console.leads_infinite(LeadFilters {
        search: Some("peru".to_owned()),
        ..LeadFilters::default()
    });

    let state = list.load().await?;
    assert_eq!(state.item_count(), 30);
    assert_eq!(state.next_cursor, Some(30));

    let next = list.fetch_next_page().await?;
    assert!(matches!(next, NextPage::Appended { cursor: 30, items: 5, .. }));
    let state = list.state()?;
    assert_eq!(state.item_count(), 35);
    assert!(state.is_exhausted());
    assert_eq!(list.fetch_next_page().await?, NextPage::Exhausted);

    first.assert_calls_async(1).await;
    second.assert_calls_async(1).await;
    Ok(())
}

#[tokio::test]
async fn failed_post_delete_restores_list_and_infinite_pages() -> Result<(), SyncError> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("GET")
                .path("/instagram-posts")
                .query_param("instagram_feed_id", "4")
                .query_param("offset", "0");
            let items: Vec<Value> = (1..=3).map(|id| json!({"id": id})).collect();
            then.status(200).json_body(Value::Array(items));
        })
        .await;
    let delete = server
        .mock_async(|when, then| {
            when.method("DELETE").path("/instagram-posts/2");
            then.status(502).json_body(json!({"detail": "upstream timeout"}));
        })
        .await;

    let console = console(&server);
    let filters = PostFilters {
        feed_id: Some(4),
        ..PostFilters::default()
    };
    let page = console
        .channel_posts(Channel::Instagram, &filters, Some(30), Some(0))
        .await?;
    assert_eq!(ids(&page), vec![1, 2, 3]);
    let list = console.channel_posts_infinite(Channel::Instagram, filters.clone());
    let before = list.load().await?;
    assert!(before.is_exhausted());

    let err = console
        .delete_channel_post(Channel::Instagram, 2)
        .await
        .expect_err("delete fails");
    assert_eq!(err.status(), Some(502));
    delete.assert_async().await;

    let list_key = query_keys::channel_posts_list(Channel::Instagram, &filters, Some(30), Some(0));
    assert_eq!(console.store().value(&list_key).map(|v| ids(&v)), Some(vec![1, 2, 3]));
    assert_eq!(list.state()?, before);
    Ok(())
}

#[tokio::test]
async fn post_delete_stays_within_its_channel() -> Result<(), SyncError> {
    let server = MockServer::start_async().await;
    for slug in ["youtube", "el-comercio"] {
        server
            .mock_async(|when, then| {
                when.method("GET").path(format!("/{slug}-posts"));
                then.status(200)
                    .json_body(json!([{"id": 7}, {"id": 8}]));
            })
            .await;
    }
    server
        .mock_async(|when, then| {
            when.method("DELETE").path("/youtube-posts/7");
            then.status(204);
        })
        .await;

    let console = console(&server);
    let filters = PostFilters::default();
    let youtube = console.channel_posts_infinite(Channel::Youtube, filters.clone());
    let el_comercio = console.channel_posts_infinite(Channel::ElComercio, filters);
    youtube.load().await?;
    el_comercio.load().await?;

    console.delete_channel_post(Channel::Youtube, 7).await?;

    let remaining: Vec<i64> = youtube
        .state()?
        .items()
        .filter_map(|item| item["id"].as_i64())
        .collect();
    assert_eq!(remaining, vec![8]);
    assert_eq!(
        console.store().get(youtube.key()).status,
        EntryStatus::Stale
    );
    assert_eq!(el_comercio.state()?.item_count(), 2);
    assert_eq!(
        console.store().get(el_comercio.key()).status,
        EntryStatus::Fresh
    );
    Ok(())
}

#[tokio::test]
async fn channel_fetch_marks_posts_and_approval_stale() -> Result<(), SyncError> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("GET").path("/diario-correo-feeds");
            then.status(200).json_body(json!([{"id": 1}]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method("GET").path("/diario-correo-posts");
            then.status(200).json_body(json!([{"id": 11}]));
        })
        .await;
    let fetch_all = server
        .mock_async(|when, then| {
            when.method("POST").path("/diario-correo-feeds/fetch-all");
            then.status(200).json_body(json!({"new_posts": 3}));
        })
        .await;

    let console = console(&server);
    console.channel_feeds(Channel::DiarioCorreo).await?;
    console
        .channel_posts(Channel::DiarioCorreo, &PostFilters::default(), None, None)
        .await?;
    console.store().set(&query_keys::approval_pending(None), json!([]));

    let summary = console.fetch_channel_feeds(Channel::DiarioCorreo, None).await?;
    assert_eq!(summary["new_posts"], json!(3));
    fetch_all.assert_async().await;

    let posts = query_keys::channel_posts_list(Channel::DiarioCorreo, &PostFilters::default(), None, None);
    for key in [
        query_keys::channel_feeds(Channel::DiarioCorreo),
        posts,
        query_keys::approval_pending(None),
    ] {
        assert_eq!(console.store().get(&key).status, EntryStatus::Stale, "{key}");
    }
    Ok(())
}

#[tokio::test]
async fn subreddits_create_appends_and_delete_removes() -> Result<(), SyncError> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("GET").path("/subreddits");
            then.status(200).json_body(json!([{"id": 1, "name": "peru"}]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method("POST")
                .path("/subreddits")
                .json_body(json!({"name": "lima"}));
            then.status(201).json_body(json!({"id": 2, "name": "lima"}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method("DELETE").path("/subreddits/1");
            then.status(204);
        })
        .await;

    let console = console(&server);
    console.subreddits().await?;
    let created = console.create_subreddit(&json!({"name": "lima"})).await?;
    assert_eq!(created["id"], json!(2));
    let key = query_keys::subreddits();
    assert_eq!(console.store().value(&key).map(|v| ids(&v)), Some(vec![1, 2]));

    console.delete_subreddit(1).await?;
    assert_eq!(console.store().value(&key).map(|v| ids(&v)), Some(vec![2]));
    assert_eq!(
        console.store().get(&query_keys::dashboard_stats()).status,
        EntryStatus::Empty
    );
    Ok(())
}

#[tokio::test]
async fn dashboard_counts_collections_and_lead_total() -> Result<(), SyncError> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("GET").path("/categories");
            then.status(200)
                .json_body(json!([{"id": 1, "name": "Mining"}, {"id": 2, "name": "Water"}]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method("GET").path("/feeds");
            then.status(200)
                .json_body(json!([feed(1, 1), feed(2, 0), feed(3, 1)]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method("GET").path("/tags");
            then.status(200).json_body(json!([{"id": 4, "name": "lithium"}]));
        })
        .await;
    let lead_count = server
        .mock_async(|when, then| {
            when.method("GET").path("/leads").query_param("limit", "1");
            then.status(200)
                .json_body(json!({"total_count": 812, "items": [{"id": 1}]}));
        })
        .await;

    let console = console(&server);
    let stats = console.dashboard_stats().await?;
    assert_eq!(stats.categories, 2);
    assert_eq!(stats.feeds, 3);
    assert_eq!(stats.active_feeds, 2);
    assert_eq!(stats.tags, 1);
    assert_eq!(stats.leads, 812);

    // Served from the cache the second time.
    console.dashboard_stats().await?;
    lead_count.assert_calls_async(1).await;
    Ok(())
}

#[tokio::test]
async fn current_job_poll_publishes_snapshot() -> Result<(), SyncError> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("GET").path("/batch-fetch/current");
            then.status(200).json_body(json!({
                "id": 12,
                "status": "completed",
                "created_at": "2024-05-01T10:00:00",
                "total_steps": 3,
                "completed_steps": 3,
                "steps": []
            }));
        })
        .await;

    let console = console(&server);
    let mut handle = console.watch_current_job();
    let tick = handle.next_tick().await.expect("first poll");
    assert!(tick.error.is_none());
    assert_eq!(tick.next_interval, std::time::Duration::from_secs(30));

    let job = console
        .store()
        .get(handle.key())
        .decode::<JobSnapshot>()?
        .expect("job cached");
    assert_eq!(job.id, 12);
    assert_eq!(job.status, JobStatus::Completed);
    Ok(())
}

#[tokio::test]
async fn no_current_job_decodes_as_none() -> Result<(), SyncError> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("GET").path("/batch-fetch/current");
            then.status(200).body("null");
        })
        .await;

    let console = console(&server);
    assert!(console.current_job().await?.is_none());
    Ok(())
}

#[tokio::test]
async fn token_bound_client_refuses_without_session() {
    let server = MockServer::start_async().await;
    let feeds = server
        .mock_async(|when, then| {
            when.method("GET").path("/feeds");
            then.status(200).json_body(json!([]));
        })
        .await;

    let console = console_with(&server, true);
    let err = console.feeds().await.expect_err("no session");
    assert_eq!(err.kind(), ErrorKind::StaleSession);
    feeds.assert_calls_async(0).await;
}
