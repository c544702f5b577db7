mod common;

use std::time::Duration;

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{Request, StatusCode};
use futures::StreamExt;
use lmgate_infer::server::NDJSON_CONTENT_TYPE;
use serde_json::json;
use tower::ServiceExt;

use common::{
    CountingLoader, Part, ScriptedBackend, app, app_with, joined_deltas, json_body,
    json_request, multipart_request, ndjson_lines, png, test_config,
};

#[tokio::test]
async fn predict_reports_usage_and_performance() {
    let app = app(ScriptedBackend::default().with_script("2+2=?", &["2", "2+2", "4"]));

    let resp = app
        .router
        .oneshot(json_request("/predict", r#"{"prompt":"2+2=?"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["x-instance-id"], "test-instance");

    let body = json_body(resp).await;
    assert_eq!(body["response"], "4");
    assert_eq!(body["usage"]["prompt_tokens"], common::PROMPT_TOKENS);
    assert_eq!(body["usage"]["completion_tokens"], 3);
    assert_eq!(
        body["usage"]["total_tokens"],
        common::PROMPT_TOKENS as u64 + 3
    );
    assert!(body["performance"]["elapsed_seconds"].as_f64().unwrap() >= 0.0);
    assert!(body["performance"]["tokens_per_second"].as_f64().unwrap() >= 0.0);

    let prompts = app.backend.prompts.lock().unwrap().clone();
    assert_eq!(
        prompts,
        vec!["<start_of_turn>user\n2+2=?<end_of_turn>\n<start_of_turn>model\n".to_string()]
    );
}

#[tokio::test]
async fn predict_rejects_missing_prompt_before_the_engine() {
    let app = app(ScriptedBackend::default());

    for body in [r#"{}"#, r#"{"prompt":""}"#, r#"{"prompt":"   "}"#] {
        let resp = app
            .router
            .clone()
            .oneshot(json_request("/predict", body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await, json!({"detail": "No prompt provided"}));
    }

    let resp = app
        .router
        .clone()
        .oneshot(json_request("/predictstream", r#"{"prompt":null}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    assert!(app.backend.prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn predict_rejects_malformed_json() {
    let app = app(ScriptedBackend::default());
    let resp = app
        .router
        .oneshot(json_request("/predict", r#"{"prompt": "#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(resp).await["detail"].is_string());
}

#[tokio::test]
async fn predict_stream_sends_deltas() {
    let app = app(ScriptedBackend::default().with_script("Hi", &["Hi", "Hi there"]));

    let resp = app
        .router
        .oneshot(json_request("/predictstream", r#"{"prompt":"Hi"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[CONTENT_TYPE], NDJSON_CONTENT_TYPE);

    let lines = ndjson_lines(resp).await;
    assert_eq!(
        lines,
        vec![json!({"response": "Hi"}), json!({"response": " there"})]
    );
}

#[tokio::test]
async fn predict_stream_appends_done_marker_when_enabled() {
    let cfg = lmgate_infer::config::BackendConfig {
        stream_done_marker: true,
        ..test_config()
    };
    let app = app_with(
        cfg,
        ScriptedBackend::default().with_script("Hi", &["Hi", "Hi there"]),
        CountingLoader::new(0),
    );

    let resp = app
        .router
        .oneshot(json_request("/predictstream", r#"{"prompt":"Hi"}"#))
        .await
        .unwrap();
    let lines = ndjson_lines(resp).await;
    assert_eq!(lines.len(), 3);
    assert_eq!(joined_deltas(&lines), "Hi there");
    assert_eq!(lines[2], json!({"done": true}));
}

#[tokio::test]
async fn predict_stream_disconnect_aborts_the_engine_request() {
    let app = app(
        ScriptedBackend::default()
            .with_script("count", &["1"])
            .hanging(),
    );

    let resp = app
        .router
        .oneshot(json_request("/predictstream", r#"{"prompt":"count"}"#))
        .await
        .unwrap();
    let mut body = resp.into_body().into_data_stream();
    let first = body.next().await.expect("first chunk").expect("chunk bytes");
    assert_eq!(&first[..], b"{\"response\":\"1\"}\n");
    drop(body);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while app.backend.aborted().is_empty() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "engine request was never aborted"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(app.backend.aborted().len(), 1);
}

#[tokio::test]
async fn describe_image_answers_with_model_and_defaults() {
    let app = app(ScriptedBackend::default());

    let resp = app
        .router
        .oneshot(multipart_request(
            "/describeimage",
            vec![Part::File("file", "cat.png", png(4, 3))],
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        json_body(resp).await,
        json!({
            "response": "A 4x3 image.",
            "model": "google/gemma-3-4b-it",
            "filename": "cat.png",
            "max_new_tokens": 512,
        })
    );
    assert_eq!(app.loader.loads(), 1);
}

#[tokio::test]
async fn max_new_tokens_is_bounded_on_every_image_route() {
    let app = app(ScriptedBackend::default());

    for uri in ["/describeimage", "/describeimagestream"] {
        for (value, status) in [
            ("0", StatusCode::BAD_REQUEST),
            ("3000", StatusCode::BAD_REQUEST),
            ("512", StatusCode::OK),
        ] {
            let resp = app
                .router
                .clone()
                .oneshot(multipart_request(
                    uri,
                    vec![
                        Part::File("file", "a.png", png(2, 2)),
                        Part::Text("max_new_tokens", value),
                    ],
                ))
                .await
                .unwrap();
            assert_eq!(resp.status(), status, "{uri} max_new_tokens={value}");
        }
    }

    for uri in ["/describeimagebatch", "/describeimagebatchstream"] {
        for (value, status) in [
            ("0", StatusCode::BAD_REQUEST),
            ("3000", StatusCode::BAD_REQUEST),
            ("512", StatusCode::OK),
        ] {
            let resp = app
                .router
                .clone()
                .oneshot(multipart_request(
                    uri,
                    vec![
                        Part::File("files", "a.png", png(2, 2)),
                        Part::Text("max_new_tokens", value),
                    ],
                ))
                .await
                .unwrap();
            assert_eq!(resp.status(), status, "{uri} max_new_tokens={value}");
            if status == StatusCode::BAD_REQUEST {
                assert_eq!(
                    json_body(resp).await["detail"],
                    "max_new_tokens must be between 1 and 2048"
                );
            }
        }
    }
}

#[tokio::test]
async fn describe_image_rejects_bad_uploads() {
    let app = app(ScriptedBackend::default());

    let resp = app
        .router
        .clone()
        .oneshot(multipart_request(
            "/describeimage",
            vec![Part::Text("prompt", "What is this?")],
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(resp).await["detail"], "No image uploaded");

    let resp = app
        .router
        .clone()
        .oneshot(multipart_request(
            "/describeimage",
            vec![Part::File("file", "notes.txt", b"plain text".to_vec())],
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let detail = json_body(resp).await["detail"].as_str().unwrap().to_string();
    assert!(detail.starts_with("Invalid image upload"), "{detail}");

    let resp = app
        .router
        .clone()
        .oneshot(multipart_request(
            "/describeimage",
            vec![
                Part::File("file", "a.png", png(2, 2)),
                Part::Text("prompt", "  "),
            ],
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Validation failures never load the model.
    assert_eq!(app.loader.loads(), 0);
}

#[tokio::test]
async fn describe_image_stream_deltas_rebuild_the_final_text() {
    let app = app(ScriptedBackend::default());

    let resp = app
        .router
        .oneshot(multipart_request(
            "/describeimagestream",
            vec![Part::File("file", "a.png", png(7, 9))],
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[CONTENT_TYPE], NDJSON_CONTENT_TYPE);

    let lines = ndjson_lines(resp).await;
    assert_eq!(lines[0], json!({"response": "A"}));
    assert_eq!(joined_deltas(&lines), "A 7x9 image.");
    assert!(lines.iter().all(|line| line.get("error").is_none()));
}

#[tokio::test]
async fn describe_image_stream_reports_generation_errors_inline() {
    let app = app(ScriptedBackend::default());

    let resp = app
        .router
        .oneshot(multipart_request(
            "/describeimagestream",
            vec![Part::File("file", "wide.png", png(13, 2))],
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let lines = ndjson_lines(resp).await;
    assert_eq!(lines, vec![json!({"error": "model rejected image"})]);
}

#[tokio::test]
async fn batch_keeps_order_and_isolates_failures() {
    let app = app(ScriptedBackend::default());

    let resp = app
        .router
        .oneshot(multipart_request(
            "/describeimagebatch",
            vec![
                Part::File("files", "a.png", png(1, 2)),
                Part::File("files", "b.png", Vec::new()),
                Part::File("files", "c.png", png(3, 4)),
                Part::Text("prompt", "Describe each image."),
            ],
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        json_body(resp).await,
        json!({
            "results": [
                {"filename": "a.png", "response": "A 1x2 image."},
                {"filename": "b.png", "error": "Empty image upload: b.png"},
                {"filename": "c.png", "response": "A 3x4 image."},
            ],
            "model": "google/gemma-3-4b-it",
            "max_new_tokens": 512,
        })
    );
}

#[tokio::test]
async fn batch_stream_emits_meta_progress_result_done() {
    let app = app(ScriptedBackend::default());

    let resp = app
        .router
        .oneshot(multipart_request(
            "/describeimagebatchstream",
            vec![
                Part::File("files", "a.png", png(1, 1)),
                Part::File("files", "wide.png", png(13, 1)),
                Part::Text("max_new_tokens", "64"),
            ],
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[CONTENT_TYPE], NDJSON_CONTENT_TYPE);

    let lines = ndjson_lines(resp).await;
    assert_eq!(
        lines,
        vec![
            json!({"type": "meta", "count": 2, "model": "google/gemma-3-4b-it", "max_new_tokens": 64}),
            json!({"type": "progress", "index": 0, "filename": "a.png", "status": "started"}),
            json!({"type": "result", "index": 0, "filename": "a.png", "response": "A 1x1 image."}),
            json!({"type": "progress", "index": 1, "filename": "wide.png", "status": "started"}),
            json!({"type": "result", "index": 1, "filename": "wide.png", "error": "model rejected image"}),
            json!({"type": "done"}),
        ]
    );
}

#[tokio::test]
async fn batch_without_files_is_rejected() {
    let app = app(ScriptedBackend::default());

    for uri in ["/describeimagebatch", "/describeimagebatchstream"] {
        let resp = app
            .router
            .clone()
            .oneshot(multipart_request(uri, vec![Part::Text("prompt", "hi")]))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await, json!({"detail": "No images uploaded"}));
    }
}

#[tokio::test]
async fn vision_load_failure_is_a_server_error_and_is_retried() {
    let app = app_with(
        test_config(),
        ScriptedBackend::default(),
        CountingLoader::new(1),
    );
    let request = || {
        multipart_request(
            "/describeimage",
            vec![Part::File("file", "a.png", png(2, 2))],
        )
    };

    let resp = app.router.clone().oneshot(request()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let detail = json_body(resp).await["detail"].as_str().unwrap().to_string();
    assert!(
        detail.starts_with("Failed to load vision model from /app/models/gemma-3-4b-it"),
        "{detail}"
    );
    assert!(!app.vision.is_loaded());

    let resp = app.router.clone().oneshot(request()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(app.loader.loads(), 2);
    assert!(app.vision.is_loaded());
}

#[tokio::test]
async fn concurrent_first_requests_load_the_model_once() {
    let app = app(ScriptedBackend::default());

    let requests = (0..6).map(|i| {
        let router = app.router.clone();
        async move {
            router
                .oneshot(multipart_request(
                    "/describeimage",
                    vec![Part::File("file", "a.png", png(i + 1, 1))],
                ))
                .await
                .unwrap()
        }
    });
    let responses = futures::future::join_all(requests).await;

    assert!(responses.iter().all(|r| r.status() == StatusCode::OK));
    assert_eq!(app.loader.loads(), 1);
}

#[tokio::test]
async fn health_is_static() {
    let app = app(ScriptedBackend::default());

    let resp = app
        .router
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["x-instance-id"], "test-instance");
    assert_eq!(
        json_body(resp).await,
        json!({"status": "healthy", "model_loaded": true})
    );
    assert!(!app.vision.is_loaded());
}
