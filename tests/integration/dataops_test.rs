// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::mock_transport::MockTransport;
use super::helpers::{run_bounded, test_config};
use crawlrs_engine::crawler::{
    CrawlContext, Crawler, DataOp, DataOpThreshold, HandlerRegistry, ResultHandler, TaskSource,
};
use crawlrs_engine::domain::models::{Request, Response};
use crawlrs_engine::utils::errors::{CrawlError, HandlerError};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;

type Batches = Arc<Mutex<Vec<Vec<DataOp>>>>;

fn row_registry(batches: Batches) -> HandlerRegistry {
    HandlerRegistry::new()
        .on("default", RowWriter)
        .flush_handler("rows", move |_: &str, ops: Vec<DataOp>| -> Result<(), HandlerError> {
            batches.lock().push(ops);
            Ok(())
        })
}

struct RowWriter;

#[async_trait::async_trait]
impl ResultHandler for RowWriter {
    async fn handle(
        &self,
        ctx: &CrawlContext,
        request: &Request,
        _response: &Response,
    ) -> Result<Vec<Request>, HandlerError> {
        ctx.enqueue_op("rows", Some(json!({ "url": request.url() })), None)
            .await?;
        Ok(vec![])
    }
}

fn seeds(count: usize) -> TaskSource {
    TaskSource::from_requests(
        (0..count)
            .map(|i| Request::get(format!("http://rows.test/{}", i)).build())
            .collect(),
    )
}

#[tokio::test]
async fn test_threshold_flushes_and_final_flush() {
    let batches: Batches = Arc::new(Mutex::new(Vec::new()));
    let registry = row_registry(batches.clone());

    let mut config = test_config();
    config.dataop_thresholds.insert(
        "rows".to_string(),
        DataOpThreshold {
            count: Some(3),
            size: None,
        },
    );

    let report = run_bounded(
        Crawler::builder(config)
            .handlers(registry)
            .source(seeds(7))
            .transport(MockTransport::new().factory())
            .build()
            .unwrap()
            .run(),
    )
    .await
    .unwrap();

    let batches = batches.lock();
    let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![3, 3, 1]);
    assert_eq!(report.counter("dataop-dump-rows"), 3);
}

#[tokio::test]
async fn test_failing_flush_at_shutdown() {
    let registry = HandlerRegistry::new()
        .on("default", RowWriter)
        .flush_handler("rows", |_: &str, _: Vec<DataOp>| -> Result<(), HandlerError> {
            Err(HandlerError::Other(anyhow::anyhow!("database unavailable")))
        });

    let lenient = run_bounded(
        Crawler::builder(test_config())
            .handlers(registry.clone())
            .source(seeds(2))
            .transport(MockTransport::new().factory())
            .build()
            .unwrap()
            .run(),
    )
    .await;
    assert!(lenient.is_ok());

    let mut config = test_config();
    config.stop_on_handler_error = true;
    let strict = run_bounded(
        Crawler::builder(config)
            .handlers(registry)
            .source(seeds(2))
            .transport(MockTransport::new().factory())
            .build()
            .unwrap()
            .run(),
    )
    .await;
    match strict {
        Err(CrawlError::Fatal { message, .. }) => assert!(message.contains("database unavailable")),
        other => panic!("expected fatal error, got {:?}", other.map(|r| r.counters)),
    }
}

#[tokio::test]
async fn test_missing_flush_handler_reported() {
    let registry = HandlerRegistry::new().on("default", RowWriter);
    let report = run_bounded(
        Crawler::builder(test_config())
            .handlers(registry)
            .source(seeds(1))
            .transport(MockTransport::new().factory())
            .build()
            .unwrap()
            .run(),
    )
    .await
    .unwrap();

    assert_eq!(report.counter("dataop-dump-rows"), 1);
}
