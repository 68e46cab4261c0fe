use api_gateway::{Config, initialize_routes, models::Item, server};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

// Gateway running on an ephemeral port until stop() is called
struct TestServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<std::io::Result<()>>>,
}

impl TestServer {
    async fn start(yaml: &str) -> Self {
        let config = Config::from_yaml(yaml).unwrap();
        let app = initialize_routes(&config).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(server::serve(listener, app, async move {
            let _ = rx.await;
        }));

        Self {
            addr,
            shutdown: Some(tx),
            handle: Some(handle),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.await.unwrap().unwrap();
        }
    }
}

// Talk to the loopback listener directly, whatever proxy the environment sets
fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

const LIMITED: &str = r#"
server:
  address: "127.0.0.1:0"
api:
  version: "v1"
telemetry:
  enabled: true
rate_limiting:
  enabled: true
  max_requests: 3
  time_window: "1m"
"#;

#[tokio::test]
async fn peer_address_is_rate_limited_end_to_end() {
    let server = TestServer::start(LIMITED).await;
    let client = client();

    for _ in 0..3 {
        let res = client.get(server.url("/health")).send().await.unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::OK);
        assert_eq!(res.text().await.unwrap(), "OK");
    }

    let res = client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = res.headers()["retry-after"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));
    assert_eq!(res.text().await.unwrap(), "Rate limit exceeded");

    // a forwarded client behind the same peer has its own bucket
    let res = client
        .get(server.url("/api/v1/items"))
        .header("X-Forwarded-For", "203.0.113.7, 127.0.0.1")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::OK);
    let items: Vec<Item> = res.json().await.unwrap();
    assert_eq!(items.len(), 2);

    drop(client);
    server.stop().await;
}

#[tokio::test]
async fn items_round_trip_without_limiter() {
    let server = TestServer::start("server:\n  address: \"127.0.0.1:0\"\n").await;
    let client = client();

    for _ in 0..20 {
        let res = client.get(server.url("/health")).send().await.unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::OK);
    }

    let res = client
        .post(server.url("/api/v1/items"))
        .json(&Item::new("3", "Item Three"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::OK);
    assert_eq!(res.json::<Item>().await.unwrap(), Item::new("3", "Item Three"));

    let items: Vec<Item> = client
        .get(server.url("/api/v1/items"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(items.last(), Some(&Item::new("3", "Item Three")));

    drop(client);
    server.stop().await;
}

#[tokio::test]
async fn concurrent_clients_get_exactly_the_quota() {
    let server = TestServer::start(LIMITED).await;
    let client = client();

    let requests = (0..12).map(|_| {
        let client = client.clone();
        let url = server.url("/health");
        tokio::spawn(async move {
            client
                .get(url)
                .header("X-Forwarded-For", "198.51.100.1")
                .send()
                .await
                .unwrap()
                .status()
        })
    });

    let mut admitted = 0;
    for request in requests.collect::<Vec<_>>() {
        if request.await.unwrap() == reqwest::StatusCode::OK {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 3);

    drop(client);
    server.stop().await;
}
