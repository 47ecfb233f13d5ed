use dispatchq::error::Error;
use dispatchq::model::WorkItem;
use dispatchq::queue::{LocalQueue, QueueFactory, QueueSettings, RequestQueue};
use std::sync::Arc;
use std::time::Duration;

fn item(url: &str) -> WorkItem {
    WorkItem::new(url)
}

#[tokio::test]
async fn equal_priorities_are_served_fifo() {
    let q = LocalQueue::unbounded();
    for url in ["https://a", "https://b", "https://c"] {
        q.put(item(url), None).await.unwrap();
    }
    assert_eq!(q.size().await.unwrap(), 3);

    for expected in ["https://a", "https://b", "https://c"] {
        assert_eq!(q.get().await.unwrap().url, expected);
    }
    assert_eq!(q.size().await.unwrap(), 0);
}

#[tokio::test]
async fn lower_priority_value_is_served_first() {
    let q = LocalQueue::unbounded();
    q.put(item("https://p5a"), Some(5)).await.unwrap();
    q.put(item("https://p1a"), Some(1)).await.unwrap();
    q.put(item("https://p1b"), Some(1)).await.unwrap();
    q.put(item("https://p5b"), Some(5)).await.unwrap();

    let mut order = Vec::new();
    for _ in 0..4 {
        order.push(q.get().await.unwrap().url);
    }
    assert_eq!(order, ["https://p1a", "https://p1b", "https://p5a", "https://p5b"]);
}

#[tokio::test]
async fn explicit_priority_overrides_item_priority() {
    let q = LocalQueue::unbounded();
    q.put(item("https://late").priority(-10), Some(10)).await.unwrap();
    q.put(item("https://early").priority(0), None).await.unwrap();

    assert_eq!(q.get().await.unwrap().url, "https://early");
    assert_eq!(q.get().await.unwrap().url, "https://late");
}

#[tokio::test]
async fn request_fields_survive_the_queue() {
    let q = LocalQueue::unbounded();
    let sent = item("https://example.com/search")
        .method("POST")
        .header("Accept", "text/html")
        .cookie("session", "abc")
        .body(b"q=rust".to_vec())
        .retries(2)
        .timeout_ms(2_500)
        .proxy("http://proxy:3128")
        .meta("depth", serde_json::json!(3));
    q.put(sent.clone(), None).await.unwrap();

    let got = q.get().await.unwrap();
    assert_eq!(got.url, sent.url);
    assert_eq!(got.method, "POST");
    assert_eq!(got.headers, sent.headers);
    assert_eq!(got.cookies, sent.cookies);
    assert_eq!(got.body.as_deref(), Some(&b"q=rust"[..]));
    assert_eq!(got.retries, 2);
    assert_eq!(got.timeout_ms, 2_500);
    assert_eq!(got.proxy.as_deref(), Some("http://proxy:3128"));
    assert_eq!(got.meta, sent.meta);
    assert!(got.timestamp_ms.is_some());
    assert!(got.lease.is_none());
}

#[tokio::test]
async fn get_drains_after_close_then_cancels() {
    let q = LocalQueue::unbounded();
    q.put(item("https://a"), None).await.unwrap();
    q.close().await.unwrap();

    // Closed: new puts are ignored, remaining items still come out.
    q.put(item("https://b"), None).await.unwrap();
    assert_eq!(q.size().await.unwrap(), 1);
    assert_eq!(q.get().await.unwrap().url, "https://a");

    let err = q.get().await.unwrap_err();
    assert!(err.is_cancelled(), "got {err:?}");
}

#[tokio::test]
async fn close_is_idempotent() {
    let q = LocalQueue::unbounded();
    q.close().await.unwrap();
    q.close().await.unwrap();
    assert!(q.is_closed());
}

#[tokio::test]
async fn waiting_getter_receives_later_put() {
    let q = Arc::new(LocalQueue::unbounded());
    let getter = {
        let q = Arc::clone(&q);
        tokio::spawn(async move { q.get().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!getter.is_finished());

    q.put(item("https://late"), None).await.unwrap();
    let got = tokio::time::timeout(Duration::from_secs(1), getter)
        .await
        .expect("getter not woken by put")
        .unwrap()
        .unwrap();
    assert_eq!(got.url, "https://late");
}

#[tokio::test]
async fn full_queue_suspends_put_until_get() {
    let q = Arc::new(LocalQueue::new(2));
    q.put(item("https://1"), None).await.unwrap();
    q.put(item("https://2"), None).await.unwrap();

    let producer = {
        let q = Arc::clone(&q);
        tokio::spawn(async move { q.put(item("https://3"), None).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!producer.is_finished());
    assert_eq!(q.size().await.unwrap(), 2);

    assert_eq!(q.get().await.unwrap().url, "https://1");
    tokio::time::timeout(Duration::from_secs(1), producer)
        .await
        .expect("put not released by get")
        .unwrap()
        .unwrap();
    assert_eq!(q.size().await.unwrap(), 2);
}

#[tokio::test]
async fn clear_empties_and_frees_capacity() {
    let q = Arc::new(LocalQueue::new(1));
    q.put(item("https://1"), None).await.unwrap();

    let producer = {
        let q = Arc::clone(&q);
        tokio::spawn(async move { q.put(item("https://2"), None).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    q.clear().await.unwrap();
    tokio::time::timeout(Duration::from_secs(1), producer)
        .await
        .expect("put not released by clear")
        .unwrap()
        .unwrap();
    assert_eq!(q.size().await.unwrap(), 1);
    assert_eq!(q.get().await.unwrap().url, "https://2");
}

#[tokio::test]
async fn get_timeout_elapses_on_empty_queue() {
    let q = LocalQueue::unbounded();
    let err = q.get_timeout(Duration::from_millis(30)).await.unwrap_err();
    assert!(matches!(err, Error::Timeout(_)), "got {err:?}");

    q.put(item("https://a"), None).await.unwrap();
    let got = q.get_timeout(Duration::from_millis(30)).await.unwrap();
    assert_eq!(got.url, "https://a");
}

#[tokio::test]
async fn empty_url_is_rejected_on_put() {
    let q = LocalQueue::unbounded();
    let err = q.put(item(""), None).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)), "got {err:?}");
    assert_eq!(q.size().await.unwrap(), 0);
}

#[tokio::test]
async fn ack_is_a_no_op_for_local() {
    let q = LocalQueue::unbounded();
    q.put(item("https://a"), None).await.unwrap();
    let got = q.get().await.unwrap();
    q.ack(&got).await.unwrap();
}

#[tokio::test]
async fn factory_builds_bounded_local_queue() {
    let settings = QueueSettings::from_toml_str(
        r#"
        [queue]
        backend = "local"

        [queue.backends.local]
        maxsize = 1
        "#,
    )
    .unwrap();
    let q = QueueFactory::new().create(&settings).await.unwrap();
    assert_eq!(q.backend(), "local");

    q.put(item("https://1"), None).await.unwrap();
    let blocked = tokio::time::timeout(Duration::from_millis(30), q.put(item("https://2"), None)).await;
    assert!(blocked.is_err(), "second put should wait for capacity");
}

/// Minimal custom backend: delegates to a local heap under another name.
struct Tagged(LocalQueue);

#[async_trait::async_trait]
impl RequestQueue for Tagged {
    fn backend(&self) -> &'static str {
        "tagged"
    }

    async fn put(&self, item: WorkItem, priority: Option<i32>) -> dispatchq::error::Result<()> {
        self.0.put(item, priority).await
    }

    async fn get(&self) -> dispatchq::error::Result<WorkItem> {
        self.0.get().await
    }

    async fn size(&self) -> dispatchq::error::Result<usize> {
        self.0.size().await
    }

    async fn clear(&self) -> dispatchq::error::Result<()> {
        self.0.clear().await
    }

    async fn close(&self) -> dispatchq::error::Result<()> {
        self.0.close().await
    }
}

#[tokio::test]
async fn custom_backend_is_selected_through_class() {
    let mut factory = QueueFactory::new();
    factory.register("tagged", |table| async move {
        Ok::<_, Error>(Tagged(LocalQueue::from_options(table)?))
    });
    assert!(factory.supported().contains(&"tagged".to_string()));

    let settings = QueueSettings::from_toml_str(
        r#"
        [queue]
        backend = "frontier"

        [queue.backends.frontier]
        class = "tagged"
        maxsize = 4
        "#,
    )
    .unwrap();
    let q = factory.create(&settings).await.unwrap();
    assert_eq!(q.backend(), "tagged");

    q.put(item("https://x"), Some(1)).await.unwrap();
    assert_eq!(q.size().await.unwrap(), 1);
    assert_eq!(q.get().await.unwrap().url, "https://x");
}

#[tokio::test]
async fn custom_backend_options_are_validated() {
    let mut factory = QueueFactory::new();
    factory.register("tagged", |table| async move {
        Ok::<_, Error>(Tagged(LocalQueue::from_options(table)?))
    });

    let settings = QueueSettings::from_toml_str(
        "[queue]\nbackend = \"tagged\"\n[queue.backends.tagged]\nmaxsize = -3\n",
    )
    .unwrap();
    let err = factory.create(&settings).await.unwrap_err();
    assert!(matches!(err, Error::Capacity(_)), "got {err:?}");
}
