// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::mock_transport::{MockTransport, Scripted};
use super::helpers::{noop_registry, run_bounded, test_config};
use crawlrs_engine::crawler::{
    CrawlContext, Crawler, EngineState, HandlerRegistry, HeaderHook, RequestHook, ResultHandler,
    TaskSource,
};
use crawlrs_engine::domain::models::{Request, Response};
use crawlrs_engine::infrastructure::stat::{
    REQUEST_FAIL, REQUEST_OK, REQUEST_PROCESSED, REQUEST_REJECTED, REQUEST_RETRY,
};
use crawlrs_engine::proxy::{Proxy, ProxyList, ProxyRotation, ProxyScheme};
use crawlrs_engine::queue::remote::{RemoteTask, RemoteTaskQueue};
use crawlrs_engine::utils::errors::{CrawlError, HandlerError};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_retry_exhaustion_routes_to_rejected_handler() {
    let transport = MockTransport::new().respond("http://down.test/", Scripted::ConnectError);
    let rejected_calls = Arc::new(AtomicUsize::new(0));
    let calls = rejected_calls.clone();

    let registry = noop_registry().on_rejected(
        "default",
        move |_: &CrawlContext, req: &Request, res: &Response| -> Result<(), HandlerError> {
            assert_eq!(req.retry_count(), 2);
            assert!(res.error.is_some());
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
    );

    let mut config = test_config();
    config.retry_limit = 2;
    let report = run_bounded(
        Crawler::builder(config)
            .handlers(registry)
            .source(TaskSource::from_requests(vec![
                Request::get("http://down.test/").build()
            ]))
            .transport(transport.factory())
            .build()
            .unwrap()
            .run(),
    )
    .await
    .unwrap();

    assert_eq!(transport.fetch_count("http://down.test/"), 3);
    assert_eq!(rejected_calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.counter(REQUEST_RETRY), 2);
    assert_eq!(report.counter(REQUEST_REJECTED), 1);
    assert_eq!(report.counter(REQUEST_FAIL), 3);
    assert_eq!(report.counter("network-error:connect-error"), 3);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].url, "http://down.test/");
    assert_eq!(report.rejected[0].reason, "connect-error");
}

#[tokio::test]
async fn test_handler_feedback_reaches_quiescence() {
    let transport = MockTransport::new();
    let registry = HandlerRegistry::new().on(
        "default",
        |_: &CrawlContext, req: &Request, _: &Response| -> Result<Vec<Request>, HandlerError> {
            if req.url() == "http://site.test/a" {
                Ok(vec![
                    Request::get("http://site.test/b").build(),
                    Request::get("http://site.test/c").build(),
                ])
            } else {
                Ok(vec![])
            }
        },
    );

    let crawler = Crawler::builder(test_config())
        .handlers(registry)
        .source(TaskSource::from_requests(vec![
            Request::get("http://site.test/a").build()
        ]))
        .transport(transport.factory())
        .build()
        .unwrap();
    let state = crawler.subscribe();
    let report = run_bounded(crawler.run()).await.unwrap();

    let mut fetched = transport.fetched();
    fetched.sort();
    assert_eq!(
        fetched,
        vec![
            "http://site.test/a",
            "http://site.test/b",
            "http://site.test/c"
        ]
    );
    assert_eq!(report.counter(REQUEST_PROCESSED), 3);
    assert_eq!(report.counter(REQUEST_OK), 3);
    assert_eq!(report.state, EngineState::Stopped);
    assert_eq!(*state.borrow(), EngineState::Stopped);
    assert!(report.rejected.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_deep_chain_with_slow_fetches() {
    let transport = MockTransport::new();
    for page in 0..20 {
        transport.clone().respond(
            &format!("http://chain.test/{}", page),
            Scripted::Slow(Duration::from_millis(15), 200),
        );
    }

    let registry = HandlerRegistry::new().on(
        "default",
        |_: &CrawlContext, req: &Request, _: &Response| -> Result<Vec<Request>, HandlerError> {
            let page: u32 = req
                .url()
                .rsplit('/')
                .next()
                .and_then(|p| p.parse().ok())
                .unwrap_or(0);
            if page < 19 {
                Ok(vec![Request::get(format!("http://chain.test/{}", page + 1)).build()])
            } else {
                Ok(vec![])
            }
        },
    );

    let mut config = test_config();
    config.network_workers = 4;
    config.result_workers = 3;
    let report = run_bounded(
        Crawler::builder(config)
            .handlers(registry)
            .source(TaskSource::from_requests(vec![
                Request::get("http://chain.test/0").build()
            ]))
            .transport(transport.factory())
            .build()
            .unwrap()
            .run(),
    )
    .await
    .unwrap();

    assert_eq!(transport.fetched().len(), 20);
    assert_eq!(report.counter(REQUEST_OK), 20);
}

/// 先等待一段时间再产出后续请求的处理器
struct SlowFollowUp;

#[async_trait::async_trait]
impl ResultHandler for SlowFollowUp {
    async fn handle(
        &self,
        _ctx: &CrawlContext,
        request: &Request,
        _response: &Response,
    ) -> Result<Vec<Request>, HandlerError> {
        if request.url() != "http://slow.test/start" {
            return Ok(vec![]);
        }
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok(vec![Request::get("http://slow.test/follow-up").build()])
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slow_result_handler_keeps_crawler_alive() {
    let transport = MockTransport::new();
    let report = run_bounded(
        Crawler::builder(test_config())
            .handlers(HandlerRegistry::new().on("default", SlowFollowUp))
            .source(TaskSource::from_requests(vec![
                Request::get("http://slow.test/start").build()
            ]))
            .transport(transport.factory())
            .build()
            .unwrap()
            .run(),
    )
    .await
    .unwrap();

    assert_eq!(transport.fetch_count("http://slow.test/follow-up"), 1);
    assert_eq!(report.counter(REQUEST_OK), 2);
}

#[tokio::test]
async fn test_retries_rotate_hook_assigned_proxy() {
    let transport = MockTransport::new().respond("http://proxied.test/", Scripted::ProxyError);
    let proxies = ProxyList::from_list(
        vec![
            Proxy::new("p1", 8080, ProxyScheme::Http),
            Proxy::new("p2", 8080, ProxyScheme::Http),
            Proxy::new("p3", 8080, ProxyScheme::Http),
        ],
        ProxyRotation::RoundRobin,
    )
    .unwrap();

    let mut config = test_config();
    config.retry_limit = 2;
    let report = run_bounded(
        Crawler::builder(config)
            .handlers(noop_registry())
            .source(TaskSource::from_requests(vec![
                Request::get("http://proxied.test/").build()
            ]))
            .transport(transport.factory())
            .proxies(Arc::new(proxies))
            .build()
            .unwrap()
            .run(),
    )
    .await
    .unwrap();

    let used = transport.proxies_used();
    assert_eq!(
        used,
        vec![
            Some("p1".to_string()),
            Some("p2".to_string()),
            Some("p3".to_string())
        ]
    );
    assert_eq!(report.counter("network-error:proxy-error"), 3);
    assert_eq!(report.counter(REQUEST_REJECTED), 1);
}

#[tokio::test]
async fn test_panicking_handler_does_not_stop_lenient_crawl() {
    let registry = HandlerRegistry::new().on(
        "default",
        |_: &CrawlContext, req: &Request, _: &Response| -> Result<Vec<Request>, HandlerError> {
            if req.url() == "http://site.test/1" {
                let links: Vec<Request> = Vec::new();
                return Ok(vec![links[3].clone()]);
            }
            Ok(vec![])
        },
    );
    let transport = MockTransport::new();

    let report = run_bounded(
        Crawler::builder(test_config())
            .handlers(registry)
            .source(TaskSource::from_requests(vec![
                Request::get("http://site.test/1").build(),
                Request::get("http://site.test/2").build(),
            ]))
            .transport(transport.factory())
            .build()
            .unwrap()
            .run(),
    )
    .await
    .unwrap();

    assert_eq!(transport.fetch_count("http://site.test/2"), 1);
    assert_eq!(report.counter(REQUEST_OK), 2);
    assert_eq!(report.counter("result-handler-error:handler-error"), 1);
}

#[tokio::test]
async fn test_empty_source_stops() {
    let transport = MockTransport::new();
    let report = run_bounded(
        Crawler::builder(test_config())
            .handlers(noop_registry())
            .transport(transport.factory())
            .build()
            .unwrap()
            .run(),
    )
    .await
    .unwrap();

    assert!(transport.fetched().is_empty());
    assert_eq!(report.counter(REQUEST_PROCESSED), 0);
}

#[tokio::test]
async fn test_multiple_generators() {
    let transport = MockTransport::new();
    let mut config = test_config();
    config.task_generators = 3;
    config.taskq_limit = 4;

    let source = TaskSource::generator(|generator_id| {
        stream::iter((0..10).map(move |i| {
            Request::get(format!("http://gen.test/{}/{}", generator_id, i)).build()
        }))
        .boxed()
    });
    let report = run_bounded(
        Crawler::builder(config)
            .handlers(noop_registry())
            .source(source)
            .transport(transport.factory())
            .build()
            .unwrap()
            .run(),
    )
    .await
    .unwrap();

    assert_eq!(transport.fetched().len(), 30);
    assert_eq!(report.counter(REQUEST_OK), 30);
}

struct ExplodingHook;

impl RequestHook for ExplodingHook {
    fn setup_request(&self, _request: &mut Request) -> anyhow::Result<()> {
        anyhow::bail!("hook failed")
    }
}

#[tokio::test]
async fn test_hook_error_stops_crawler() {
    let transport = MockTransport::new();
    let result = run_bounded(
        Crawler::builder(test_config())
            .handlers(noop_registry())
            .source(TaskSource::from_requests(vec![
                Request::get("http://site.test/a").build()
            ]))
            .transport(transport.factory())
            .hook(ExplodingHook)
            .build()
            .unwrap()
            .run(),
    )
    .await;

    match result {
        Err(CrawlError::Fatal { message, context }) => {
            assert!(message.contains("hook failed"));
            assert_eq!(context.get("url"), Some("http://site.test/a"));
        }
        other => panic!("expected fatal error, got {:?}", other.map(|r| r.counters)),
    }
    assert!(transport.fetched().is_empty());
}

#[tokio::test]
async fn test_missing_handler_is_fatal() {
    let transport = MockTransport::new();
    let result = run_bounded(
        Crawler::builder(test_config())
            .handlers(noop_registry())
            .source(TaskSource::from_requests(vec![Request::get(
                "http://site.test/a",
            )
            .name("product")
            .build()]))
            .transport(transport.factory())
            .build()
            .unwrap()
            .run(),
    )
    .await;

    assert!(matches!(
        result,
        Err(CrawlError::Fatal { ref message, .. }) if message.contains("product")
    ));
}

#[tokio::test]
async fn test_stop_on_handler_error() {
    let failing = || {
        HandlerRegistry::new().on(
            "default",
            |_: &CrawlContext, _: &Request, _: &Response| -> Result<Vec<Request>, HandlerError> {
                Err(HandlerError::Other(anyhow::anyhow!("bad markup")))
            },
        )
    };
    let seeds = || {
        TaskSource::from_requests(vec![
            Request::get("http://site.test/1").build(),
            Request::get("http://site.test/2").build(),
        ])
    };

    let lenient = run_bounded(
        Crawler::builder(test_config())
            .handlers(failing())
            .source(seeds())
            .transport(MockTransport::new().factory())
            .build()
            .unwrap()
            .run(),
    )
    .await
    .unwrap();
    assert_eq!(lenient.counter("result-handler-error:handler-error"), 2);

    let mut config = test_config();
    config.stop_on_handler_error = true;
    let strict = run_bounded(
        Crawler::builder(config)
            .handlers(failing())
            .source(seeds())
            .transport(MockTransport::new().factory())
            .build()
            .unwrap()
            .run(),
    )
    .await;
    assert!(matches!(strict, Err(CrawlError::Fatal { .. })));
}

#[tokio::test]
async fn test_status_classification() {
    let transport = MockTransport::new()
        .respond("http://site.test/missing", Scripted::Status(404))
        .respond("http://site.test/forbidden", Scripted::Status(403))
        .respond("http://site.test/teapot", Scripted::Status(418));
    let mut config = test_config();
    config.retry_limit = 1;

    let report = run_bounded(
        Crawler::builder(config)
            .handlers(noop_registry())
            .source(TaskSource::from_requests(vec![
                Request::get("http://site.test/missing").build(),
                Request::get("http://site.test/forbidden").build(),
                Request::get("http://site.test/teapot")
                    .extra_valid_status(418)
                    .build(),
            ]))
            .transport(transport.factory())
            .build()
            .unwrap()
            .run(),
    )
    .await
    .unwrap();

    assert_eq!(report.counter(REQUEST_OK), 2);
    assert_eq!(transport.fetch_count("http://site.test/forbidden"), 2);
    assert_eq!(report.counter("http:status-403"), 2);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].reason, "http:status-403");
}

#[tokio::test]
async fn test_header_hook_and_shutdown_hook() {
    #[derive(Clone, Default)]
    struct HeaderCheck(Arc<Mutex<Vec<Option<String>>>>);

    let seen = HeaderCheck::default();
    let record = seen.clone();
    let registry = HandlerRegistry::new().on(
        "default",
        move |_: &CrawlContext, req: &Request, _: &Response| -> Result<Vec<Request>, HandlerError> {
            record
                .0
                .lock()
                .push(req.headers().get("User-Agent").cloned());
            Ok(vec![])
        },
    );
    let shutdown_called = Arc::new(AtomicUsize::new(0));
    let called = shutdown_called.clone();

    run_bounded(
        Crawler::builder(test_config())
            .handlers(registry)
            .source(TaskSource::from_requests(vec![
                Request::get("http://site.test/a").build()
            ]))
            .transport(MockTransport::new().factory())
            .hook(HeaderHook::new().header("User-Agent", "crawlrs-test"))
            .on_shutdown(move |report| {
                assert_eq!(report.counter(REQUEST_OK), 1);
                called.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap()
            .run(),
    )
    .await
    .unwrap();

    assert_eq!(
        *seen.0.lock(),
        vec![Some("crawlrs-test".to_string())]
    );
    assert_eq!(shutdown_called.load(Ordering::SeqCst), 1);
}

struct EndAfter {
    remaining: Mutex<Vec<Request>>,
}

#[async_trait::async_trait]
impl RemoteTaskQueue for EndAfter {
    async fn pop(&self) -> Result<RemoteTask, CrawlError> {
        Ok(match self.remaining.lock().pop() {
            Some(request) => RemoteTask::Request(request),
            None => RemoteTask::EndOfStream,
        })
    }
}

#[tokio::test]
async fn test_remote_source() {
    let transport = MockTransport::new();
    let queue = Arc::new(EndAfter {
        remaining: Mutex::new(vec![
            Request::get("http://remote.test/1").build(),
            Request::get("http://remote.test/2").build(),
        ]),
    });

    let report = run_bounded(
        Crawler::builder(test_config())
            .handlers(noop_registry())
            .source(TaskSource::Remote(queue.clone()))
            .transport(transport.factory())
            .build()
            .unwrap()
            .run(),
    )
    .await
    .unwrap();
    assert_eq!(report.counter(REQUEST_OK), 2);

    let mut config = test_config();
    config.task_generators = 2;
    let result = Crawler::builder(config)
        .handlers(noop_registry())
        .source(TaskSource::Remote(queue))
        .build();
    assert!(matches!(result, Err(CrawlError::Config(_))));
}
