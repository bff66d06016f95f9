#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use serde_json::{Value, json};

#[derive(Debug, Clone)]
pub struct StubChapter {
    pub id: &'static str,
    pub chapter: Option<&'static str>,
    pub title: Option<&'static str>,
}

#[derive(Debug, Clone)]
pub struct StubFixture {
    pub manga_id: &'static str,
    pub manga_title: &'static str,
    pub chapters: Vec<StubChapter>,
    /// Manifest filenames served for every chapter, in page order.
    pub pages: Vec<&'static str>,
}

impl StubFixture {
    pub fn foo() -> Self {
        Self {
            manga_id: "m1",
            manga_title: "Foo",
            chapters: vec![
                StubChapter {
                    id: "c1",
                    chapter: Some("1"),
                    title: None,
                },
                StubChapter {
                    id: "c2",
                    chapter: Some("2"),
                    title: None,
                },
            ],
            pages: vec!["x2.jpg", "x10.jpg", "x1.jpg"],
        }
    }
}

pub struct CatalogStub {
    pub base_url: String,
    image_requests: Arc<AtomicUsize>,
    manifest_requests: Arc<AtomicUsize>,
    missing_pages: Arc<Mutex<HashSet<String>>>,
    failing_listing_offset: Arc<Mutex<Option<usize>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl CatalogStub {
    pub fn spawn(fixture: StubFixture) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start catalog stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}");

        let image_requests = Arc::new(AtomicUsize::new(0));
        let manifest_requests = Arc::new(AtomicUsize::new(0));
        let missing_pages = Arc::new(Mutex::new(HashSet::new()));
        let failing_listing_offset = Arc::new(Mutex::new(None));
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let state = StubState {
            base_url: base_url.clone(),
            fixture,
            image_requests: Arc::clone(&image_requests),
            manifest_requests: Arc::clone(&manifest_requests),
            missing_pages: Arc::clone(&missing_pages),
            failing_listing_offset: Arc::clone(&failing_listing_offset),
        };

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let (status, body) = state.route(request.url());
                let _ = request.respond(tiny_http::Response::from_data(body).with_status_code(status));
            }
        });

        Self {
            base_url,
            image_requests,
            manifest_requests,
            missing_pages,
            failing_listing_offset,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn image_requests(&self) -> usize {
        self.image_requests.load(Ordering::SeqCst)
    }

    pub fn manifest_requests(&self) -> usize {
        self.manifest_requests.load(Ordering::SeqCst)
    }

    pub fn set_missing_pages(&self, pages: &[&str]) {
        let mut missing = self.missing_pages.lock().expect("lock missing pages");
        missing.clear();
        missing.extend(pages.iter().map(|page| page.to_string()));
    }

    /// Chapter listings at or past `offset` answer 500.
    pub fn fail_listing_from(&self, offset: usize) {
        *self
            .failing_listing_offset
            .lock()
            .expect("lock failing listing offset") = Some(offset);
    }
}

impl Drop for CatalogStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

struct StubState {
    base_url: String,
    fixture: StubFixture,
    image_requests: Arc<AtomicUsize>,
    manifest_requests: Arc<AtomicUsize>,
    missing_pages: Arc<Mutex<HashSet<String>>>,
    failing_listing_offset: Arc<Mutex<Option<usize>>>,
}

impl StubState {
    fn route(&self, raw_url: &str) -> (u16, Vec<u8>) {
        let url = url::Url::parse(&format!("http://stub{raw_url}")).expect("parse request url");
        let query = |key: &str| {
            url.query_pairs()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.into_owned())
        };
        let segments: Vec<&str> = url.path_segments().map(|s| s.collect()).unwrap_or_default();

        match segments.as_slice() {
            ["manga"] => {
                let title = query("title").unwrap_or_default();
                if title == "Broken" {
                    return json_response(json!({"result": "ok"}));
                }
                let data = if self
                    .fixture
                    .manga_title
                    .to_lowercase()
                    .contains(&title.to_lowercase())
                {
                    vec![json!({
                        "id": self.fixture.manga_id,
                        "type": "manga",
                        "attributes": {"title": {"en": self.fixture.manga_title}},
                        "relationships": [
                            {"type": "cover_art", "attributes": {"fileName": "cover.jpg"}}
                        ]
                    })]
                } else {
                    Vec::new()
                };
                json_response(json!({"result": "ok", "data": data}))
            }
            ["chapter"] => {
                if query("manga").as_deref() != Some(self.fixture.manga_id) {
                    return json_response(json!({"data": [], "total": 0}));
                }
                let limit: usize = query("limit").and_then(|v| v.parse().ok()).unwrap_or(10);
                let offset: usize = query("offset").and_then(|v| v.parse().ok()).unwrap_or(0);
                let failing = *self
                    .failing_listing_offset
                    .lock()
                    .expect("lock failing listing offset");
                if failing.is_some_and(|from| offset >= from) {
                    return (500, b"internal error".to_vec());
                }
                let data: Vec<Value> = self
                    .fixture
                    .chapters
                    .iter()
                    .skip(offset)
                    .take(limit)
                    .map(|chapter| {
                        json!({
                            "id": chapter.id,
                            "type": "chapter",
                            "attributes": {
                                "chapter": chapter.chapter,
                                "title": chapter.title,
                                "translatedLanguage": "en",
                                "pages": self.fixture.pages.len(),
                            }
                        })
                    })
                    .collect();
                json_response(json!({
                    "result": "ok",
                    "data": data,
                    "limit": limit,
                    "offset": offset,
                    "total": self.fixture.chapters.len(),
                }))
            }
            ["at-home", "server", chapter_id] => {
                self.manifest_requests.fetch_add(1, Ordering::SeqCst);
                if !self.fixture.chapters.iter().any(|c| c.id == *chapter_id) {
                    return (404, b"not found".to_vec());
                }
                json_response(json!({
                    "result": "ok",
                    "baseUrl": self.base_url,
                    "chapter": {"hash": format!("h-{chapter_id}"), "data": self.fixture.pages}
                }))
            }
            ["data", hash, filename] => {
                self.image_requests.fetch_add(1, Ordering::SeqCst);
                let missing = self.missing_pages.lock().expect("lock missing pages");
                if missing.contains(*filename) {
                    return (404, b"not found".to_vec());
                }
                (200, page_bytes(hash, filename))
            }
            _ => (404, b"not found".to_vec()),
        }
    }
}

pub fn page_bytes(hash: &str, filename: &str) -> Vec<u8> {
    format!("{hash}/{filename}").into_bytes()
}

fn json_response(value: Value) -> (u16, Vec<u8>) {
    (200, value.to_string().into_bytes())
}
