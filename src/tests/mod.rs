use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::app;
use crate::cli::command::Command;
use crate::controller::{self, Applied, Completion, InputController};
use crate::output::OutputFormat;
use crate::pagination::PageState;
use crate::source::{FetchQuery, RecordId, RemoteRecordSource, SourceError, SourceOptions};

const COLLECTION_SIZE: u64 = 25;

#[derive(Clone, Debug)]
struct StubResponse {
    headers: Vec<(String, String)>,
    body: String,
    delay: Duration,
}

type Route = Arc<dyn Fn(&HashMap<String, String>) -> StubResponse + Send + Sync>;

// loopback HTTP/1.1 server that records request targets and answers from a route
struct StubServer {
    addr: SocketAddr,
    targets: Arc<Mutex<Vec<String>>>,
}

impl StubServer {
    async fn start(route: Route) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let targets = Arc::new(Mutex::new(Vec::new()));
        let seen = targets.clone();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let route = route.clone();
                let seen = seen.clone();
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 1024];
                    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                        match stream.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => buf.extend_from_slice(&chunk[..n]),
                        }
                    }
                    let head = String::from_utf8_lossy(&buf).to_string();
                    let target = head
                        .lines()
                        .next()
                        .and_then(|l| l.split_whitespace().nth(1))
                        .unwrap_or("/")
                        .to_string();
                    seen.lock().unwrap().push(target.clone());

                    let resp = route(&query_of(&target));
                    tokio::time::sleep(resp.delay).await;
                    let mut out = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
                        resp.body.len()
                    );
                    for (k, v) in resp.headers.iter() {
                        out.push_str(&format!("{k}: {v}\r\n"));
                    }
                    out.push_str("\r\n");
                    out.push_str(&resp.body);
                    let _ = stream.write_all(out.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });
        Self { addr, targets }
    }

    fn base_url(&self) -> String {
        format!("http://{}/posts", self.addr)
    }

    fn source(&self) -> RemoteRecordSource {
        RemoteRecordSource::new(&SourceOptions {
            base_url: self.base_url(),
            ..Default::default()
        })
        .unwrap()
    }

    fn queries(&self) -> Vec<HashMap<String, String>> {
        self.targets
            .lock()
            .unwrap()
            .iter()
            .map(|t| query_of(t))
            .collect()
    }
}

fn query_of(target: &str) -> HashMap<String, String> {
    reqwest::Url::parse(&format!("http://stub{target}"))
        .map(|u| {
            u.query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect()
        })
        .unwrap_or_default()
}

// a json-server style collection of 25 posts
fn collection(delay_for_page: Option<(u64, Duration)>) -> Route {
    Arc::new(move |q: &HashMap<String, String>| {
        let limit = q.get("_limit").and_then(|v| v.parse::<u64>().ok()).unwrap_or(10);
        let page = q.get("_page").and_then(|v| v.parse::<u64>().ok()).unwrap_or(1);
        let excluded: HashSet<u64> = q
            .get("id_ne")
            .map(|v| v.split(',').filter_map(|s| s.parse().ok()).collect())
            .unwrap_or_default();
        let search = q.get("q").cloned().unwrap_or_default();

        let matching: Vec<u64> = (1..=COLLECTION_SIZE)
            .filter(|id| !excluded.contains(id))
            .filter(|id| search.is_empty() || format!("post {id}").contains(&search))
            .collect();
        let start = ((page.max(1) - 1) * limit) as usize;
        let records: Vec<_> = matching
            .iter()
            .skip(start)
            .take(limit as usize)
            .map(|id| json!({"userId": 1, "id": id, "title": format!("post {id}"), "body": "text"}))
            .collect();

        let delay = match delay_for_page {
            Some((p, d)) if p == page && limit > 0 => d,
            _ => Duration::ZERO,
        };
        StubResponse {
            headers: vec![("X-Total-Count".to_string(), matching.len().to_string())],
            body: serde_json::Value::Array(records).to_string(),
            delay,
        }
    })
}

fn ids(ctl: &InputController) -> Vec<u64> {
    ctl.list()
        .units()
        .iter()
        .map(|u| u.id.as_str().parse().unwrap())
        .collect()
}

fn element_ids(ctl: &InputController) -> Vec<String> {
    ctl.list().units().iter().map(|u| u.element_id.clone()).collect()
}

// every JSON list the session printed, in order
fn printed_lists(out: &[u8]) -> Vec<serde_json::Value> {
    serde_json::Deserializer::from_slice(out)
        .into_iter::<serde_json::Value>()
        .map(|v| v.unwrap())
        .collect()
}

#[tokio::test]
async fn fetch_sends_pagination_search_and_exclusions() {
    let server = StubServer::start(collection(None)).await;
    let source = server.source();

    let query = FetchQuery {
        limit: 10,
        page: 2,
        search: Some("foo".to_string()),
        exclude: vec![RecordId::from(3), RecordId::from(7)],
    };
    source.fetch_records(&query).await.unwrap();

    let queries = server.queries();
    let q = &queries[0];
    assert_eq!(q["_limit"], "10");
    assert_eq!(q["_page"], "2");
    assert_eq!(q["q"], "foo");
    assert_eq!(q["id_ne"], "3,7");
}

#[tokio::test]
async fn fetch_keeps_server_order() {
    let server = StubServer::start(collection(None)).await;
    let records = server
        .source()
        .fetch_records(&FetchQuery {
            page: 3,
            ..Default::default()
        })
        .await
        .unwrap();
    let got: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(got, vec!["21", "22", "23", "24", "25"]);
    assert_eq!(records[0].title, "post 21");
}

#[tokio::test]
async fn count_comes_from_header() {
    let server = StubServer::start(collection(None)).await;
    let count = server.source().get_count().await.unwrap();
    assert_eq!(count, Some(COLLECTION_SIZE));
    assert_eq!(server.queries()[0]["_limit"], "0");
}

#[tokio::test]
async fn missing_count_header_leaves_total_unknown() {
    let route: Route = Arc::new(|_: &HashMap<String, String>| StubResponse {
        headers: vec![],
        body: "[]".to_string(),
        delay: Duration::ZERO,
    });
    let server = StubServer::start(route).await;
    assert_eq!(server.source().get_count().await.unwrap(), None);
}

#[tokio::test]
async fn undecodable_body_is_a_network_error() {
    let route: Route = Arc::new(|_: &HashMap<String, String>| StubResponse {
        headers: vec![],
        body: "<html>oops</html>".to_string(),
        delay: Duration::ZERO,
    });
    let server = StubServer::start(route).await;
    let err = server
        .source()
        .fetch_records(&FetchQuery::default())
        .await
        .unwrap_err();
    assert!(err.is_network());
    assert!(err.to_string().starts_with("DecodeError: "));
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let source = RemoteRecordSource::new(&SourceOptions {
        base_url: format!("http://{addr}/posts"),
        ..Default::default()
    })
    .unwrap();
    let err = source.get_count().await.unwrap_err();
    match err {
        SourceError::Network { message } => assert!(message.starts_with("ConnectError: ")),
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn initial_load_renders_first_page_and_stores_count() {
    let server = StubServer::start(collection(None)).await;
    let source = server.source();
    let mut ctl = InputController::default();

    let request = ctl.load();
    let completion = controller::run_request(&source, request).await;
    assert!(matches!(ctl.apply(completion), Applied::Rendered));

    assert_eq!(ids(&ctl), (1..=10).collect::<Vec<_>>());
    assert_eq!(ctl.page().total_count(), Some(COLLECTION_SIZE));
    assert_eq!(ctl.list().units()[0].element_id, "post-1");

    let queries = server.queries();
    assert_eq!(queries.len(), 2);
    assert_eq!(queries[0]["_page"], "1");
    assert_eq!(queries[1]["_limit"], "0");
}

#[tokio::test]
async fn walks_to_last_page_and_stops() {
    let server = StubServer::start(collection(None)).await;
    let source = server.source();
    let mut ctl = InputController::default();

    let completion = controller::run_request(&source, ctl.load()).await;
    ctl.apply(completion);

    while let Some(request) = ctl.next() {
        let completion = controller::run_request(&source, request).await;
        assert!(matches!(ctl.apply(completion), Applied::Rendered));
    }
    assert_eq!(ctl.page().page(), 3);
    assert!(ctl.page().is_last_page());
    assert_eq!(ids(&ctl), vec![21, 22, 23, 24, 25]);
}

#[tokio::test]
async fn deleted_records_stay_hidden_on_later_fetches() {
    let server = StubServer::start(collection(None)).await;
    let source = server.source();
    let mut ctl = InputController::default();

    let completion = controller::run_request(&source, ctl.load()).await;
    ctl.apply(completion);

    ctl.delete(RecordId::from(5)).unwrap();
    let mut expected: Vec<u64> = (1..=10).filter(|id| *id != 5).collect();
    assert_eq!(ids(&ctl), expected);

    let request = ctl.reset();
    let completion = controller::run_request(&source, request).await;
    ctl.apply(completion);

    expected.push(11);
    assert_eq!(ids(&ctl), expected);
    assert_eq!(server.queries().last().unwrap()["id_ne"], "5");
}

#[tokio::test]
async fn search_after_navigation_fetches_first_page() {
    let server = StubServer::start(collection(None)).await;
    let source = server.source();
    let mut ctl = InputController::default();

    let completion = controller::run_request(&source, ctl.load()).await;
    ctl.apply(completion);
    for _ in 0..2 {
        let request = ctl.next().unwrap();
        let completion = controller::run_request(&source, request).await;
        ctl.apply(completion);
    }
    assert_eq!(ctl.page().page(), 3);

    let completion = controller::run_request(&source, ctl.search("post 1")).await;
    ctl.apply(completion);

    let q = server.queries().last().cloned().unwrap();
    assert_eq!(q["_page"], "1");
    assert_eq!(q["_limit"], "10");
    assert_eq!(q["q"], "post 1");
    assert_eq!(ids(&ctl), vec![1, 10, 11, 12, 13, 14, 15, 16, 17, 18]);
    assert_eq!(ctl.page().page(), 3);
}

#[tokio::test]
async fn slow_older_response_does_not_overwrite_newer_one() {
    let server = StubServer::start(collection(Some((2, Duration::from_millis(300))))).await;
    let source = server.source();
    let mut ctl = InputController::new(PageState::default());

    let completion = controller::run_request(&source, ctl.load()).await;
    ctl.apply(completion);

    let (tx, mut rx) = mpsc::channel::<Completion>(4);
    let slow = ctl.next().unwrap();
    let fast = ctl.next().unwrap();
    let (slow_ticket, fast_ticket) = (slow.ticket, fast.ticket);
    controller::spawn_request(source.clone(), slow, tx.clone());
    controller::spawn_request(source.clone(), fast, tx);

    let first = rx.recv().await.unwrap();
    assert_eq!(first.ticket, fast_ticket);
    assert!(matches!(ctl.apply(first), Applied::Rendered));

    let second = rx.recv().await.unwrap();
    assert_eq!(second.ticket, slow_ticket);
    assert!(matches!(ctl.apply(second), Applied::Stale));

    assert_eq!(ids(&ctl), vec![21, 22, 23, 24, 25]);
    assert_eq!(ctl.page().page(), 3);
}

#[tokio::test]
async fn string_ids_are_listed_hidden_and_excluded() {
    let route: Route = Arc::new(|q: &HashMap<String, String>| {
        let excluded = q.get("id_ne").cloned().unwrap_or_default();
        let records: Vec<_> = ["a1b2", "c3d4", "e5f6"]
            .into_iter()
            .filter(|id| !excluded.split(',').any(|e| e == *id))
            .map(|id| json!({"id": id, "title": format!("post {id}"), "body": "text"}))
            .collect();
        StubResponse {
            headers: vec![("X-Total-Count".to_string(), records.len().to_string())],
            body: serde_json::Value::Array(records).to_string(),
            delay: Duration::ZERO,
        }
    });
    let server = StubServer::start(route).await;
    let source = server.source();
    let mut ctl = InputController::default();

    let completion = controller::run_request(&source, ctl.load()).await;
    assert!(matches!(ctl.apply(completion), Applied::Rendered));
    assert_eq!(element_ids(&ctl), vec!["post-a1b2", "post-c3d4", "post-e5f6"]);
    assert_eq!(ctl.page().total_count(), Some(3));

    let id = match "d c3d4".parse::<Command>().unwrap() {
        Command::Delete(id) => id,
        other => panic!("unexpected command {other:?}"),
    };
    ctl.delete(id).unwrap();

    let completion = controller::run_request(&source, ctl.reset()).await;
    ctl.apply(completion);
    assert_eq!(server.queries().last().unwrap()["id_ne"], "c3d4");
    assert_eq!(element_ids(&ctl), vec!["post-a1b2", "post-e5f6"]);
}

#[tokio::test]
async fn session_applies_in_flight_fetches_before_returning_at_eof() {
    let server = StubServer::start(collection(Some((2, Duration::from_millis(150))))).await;
    let (mut typed, input) = tokio::io::duplex(256);
    let session = tokio::spawn(app::run_session(
        server.source(),
        InputController::default(),
        OutputFormat::Json,
        tokio::io::BufReader::new(input),
        Vec::new(),
    ));

    tokio::time::sleep(Duration::from_millis(300)).await;
    typed.write_all(b"next\n").await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    typed.write_all(b"d 13\nreset\n").await.unwrap();
    drop(typed);

    let (ctl, out) = session.await.unwrap();

    let expected: Vec<u64> = (11..=21).filter(|id| *id != 13).collect();
    assert_eq!(ids(&ctl), expected);
    assert_eq!(ctl.tracker().ids(), &[RecordId::from(13)]);
    assert_eq!(ctl.page().page(), 2);
    assert_eq!(ctl.page().total_count(), Some(COLLECTION_SIZE));

    let last = server.queries().last().cloned().unwrap();
    assert_eq!(last["_page"], "2");
    assert_eq!(last["id_ne"], "13");

    // load, next, the delete reprint and the reset
    let lists = printed_lists(&out);
    assert_eq!(lists.len(), 4);
    assert_eq!(lists[3].as_array().unwrap().len(), 10);
    assert_eq!(lists[3][2]["element_id"], "post-14");
}

#[tokio::test]
async fn session_quit_does_not_wait_for_fetches() {
    let server = StubServer::start(collection(Some((1, Duration::from_secs(2))))).await;
    let run = app::run_session(
        server.source(),
        InputController::default(),
        OutputFormat::Json,
        &b"quit\nnext\n"[..],
        Vec::new(),
    );
    let (ctl, out) = tokio::time::timeout(Duration::from_millis(500), run)
        .await
        .unwrap();
    assert!(ctl.list().is_empty());
    assert_eq!(ctl.page().page(), 1);
    assert!(out.is_empty());
}

#[tokio::test]
async fn session_skips_bad_lines_and_keeps_reading() {
    let server = StubServer::start(collection(None)).await;
    let (ctl, _) = app::run_session(
        server.source(),
        InputController::new(PageState::new(5)),
        OutputFormat::Text,
        &b"\njump 3\nnext 2\nsearch post 2\n"[..],
        Vec::new(),
    )
    .await;
    assert_eq!(ctl.search_text(), "post 2");
    assert_eq!(ctl.page().page(), 1);

    let searched = server
        .queries()
        .into_iter()
        .find(|q| q.contains_key("q"))
        .unwrap();
    assert_eq!(searched["q"], "post 2");
    assert_eq!(searched["_limit"], "5");
    assert_eq!(searched["_page"], "1");
}

#[tokio::test]
async fn once_prints_the_first_page() {
    let server = StubServer::start(collection(None)).await;
    let mut out = Vec::new();
    let ctl = app::run_once(&server.source(), 5, OutputFormat::Json, &mut out)
        .await
        .unwrap();

    let lists = printed_lists(&out);
    assert_eq!(lists.len(), 1);
    let shown: Vec<&str> = lists[0]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["element_id"].as_str().unwrap())
        .collect();
    assert_eq!(shown, vec!["post-1", "post-2", "post-3", "post-4", "post-5"]);
    assert_eq!(ctl.page().total_count(), Some(COLLECTION_SIZE));
    assert_eq!(server.queries()[0]["_limit"], "5");
}

#[tokio::test]
async fn once_reports_an_unreachable_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let source = RemoteRecordSource::new(&SourceOptions {
        base_url: format!("http://{addr}/posts"),
        ..Default::default()
    })
    .unwrap();
    let mut out = Vec::new();
    let err = app::run_once(&source, 10, OutputFormat::Text, &mut out)
        .await
        .unwrap_err();
    assert!(err.starts_with("ConnectError: "));
    assert!(out.is_empty());
}
