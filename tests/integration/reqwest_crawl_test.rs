// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{run_bounded, test_config};
use crawlrs_engine::crawler::{CrawlContext, Crawler, HandlerRegistry, TaskSource};
use crawlrs_engine::domain::models::{Request, Response};
use crawlrs_engine::infrastructure::stat::{REQUEST_OK, REQUEST_REJECTED};
use crawlrs_engine::utils::errors::HandlerError;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// 提取 `href="..."` 中的链接
fn extract_links(base: &str, body: &str) -> Vec<String> {
    let Ok(base) = Url::parse(base) else {
        return Vec::new();
    };
    body.split("href=\"")
        .skip(1)
        .filter_map(|rest| rest.split('"').next())
        .filter_map(|href| base.join(href).ok())
        .map(|url| url.to_string())
        .collect()
}

#[tokio::test]
async fn test_crawl_site_with_reqwest_transport() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<a href="/one">one</a> <a href="/two">two</a> <a href="/broken">broken</a>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/one"))
        .respond_with(ResponseTemplate::new(200).set_body_string("leaf"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/two"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let registry = HandlerRegistry::new()
        .on(
            "default",
            |_: &CrawlContext, req: &Request, res: &Response| -> Result<Vec<Request>, HandlerError> {
                Ok(extract_links(req.url(), &res.text())
                    .into_iter()
                    .map(|url| Request::get(url).name("leaf").build())
                    .collect())
            },
        )
        .on(
            "leaf",
            |_: &CrawlContext, _: &Request, _: &Response| -> Result<Vec<Request>, HandlerError> {
                Ok(vec![])
            },
        );

    let mut config = test_config();
    config.retry_limit = 1;
    let report = run_bounded(
        Crawler::builder(config)
            .handlers(registry)
            .source(TaskSource::from_requests(vec![
                Request::get(format!("{}/", server.uri())).build()
            ]))
            .build()
            .unwrap()
            .run(),
    )
    .await
    .unwrap();

    assert_eq!(report.counter(REQUEST_OK), 3);
    assert_eq!(report.counter(REQUEST_REJECTED), 1);
    assert_eq!(report.counter("http:status-503"), 2);
    assert_eq!(report.rejected[0].name, "leaf");
    assert!(report.rejected[0].url.ends_with("/broken"));
}

#[test]
fn test_extract_links() {
    let links = extract_links(
        "http://example.com/dir/page",
        r#"<a href="other">x</a><a href="/root">y</a>"#,
    );
    assert_eq!(
        links,
        vec!["http://example.com/dir/other", "http://example.com/root"]
    );
}
