mod common;

use std::sync::Arc;
use std::time::Duration;

use reqwest::multipart::Form;
use reqwest::StatusCode;

use common::{
    files_in, image_part, jpeg, spawn_server, spawn_server_with, wait_for_empty_storage,
    FixedLoader, FlakyLoader,
};

fn stylize_form(style_ratio: Option<&str>) -> Form {
    let form = Form::new()
        .part("content", image_part(jpeg(40, 24, [200, 30, 30]), "content.jpg"))
        .part("style", image_part(jpeg(64, 64, [20, 20, 220]), "style.jpg"));
    match style_ratio {
        Some(r) => form.text("styleRatio", r.to_string()),
        None => form,
    }
}

fn combine_form() -> Form {
    Form::new()
        .part("content", image_part(jpeg(30, 20, [120, 120, 120]), "content.jpg"))
        .part("style1", image_part(jpeg(16, 16, [250, 0, 0]), "s1.jpg"))
        .part("style2", image_part(jpeg(16, 16, [0, 0, 250]), "s2.png"))
        .text("styleRatio", "0.3")
}

#[tokio::test]
async fn stylize_returns_jpeg_with_content_dimensions() {
    let server = spawn_server(Arc::new(FlakyLoader::reliable())).await;
    let resp = reqwest::Client::new()
        .post(server.url("/stylize"))
        .multipart(stylize_form(Some("0.8")))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "image/jpeg");
    let disposition = resp.headers()["content-disposition"].to_str().unwrap().to_string();
    assert!(disposition.starts_with("attachment"));
    assert!(disposition.contains("stylized_"));

    let body = resp.bytes().await.unwrap();
    let img = image::load_from_memory(&body).unwrap();
    assert_eq!((img.width(), img.height()), (40, 24));

    assert!(wait_for_empty_storage(&server).await, "artifacts left behind");
}

#[tokio::test]
async fn combine_styles_returns_jpeg() {
    let server = spawn_server(Arc::new(FlakyLoader::reliable())).await;
    let resp = reqwest::Client::new()
        .post(server.url("/combine-styles"))
        .multipart(combine_form())
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers()["content-disposition"]
        .to_str()
        .unwrap()
        .contains("combined_stylized_"));
    let body = resp.bytes().await.unwrap();
    let img = image::load_from_memory(&body).unwrap();
    assert_eq!((img.width(), img.height()), (30, 20));

    assert!(wait_for_empty_storage(&server).await, "artifacts left behind");
}

#[tokio::test]
async fn missing_style_is_rejected_without_touching_disk() {
    let server = spawn_server(Arc::new(FlakyLoader::reliable())).await;
    let form = Form::new().part("content", image_part(jpeg(8, 8, [1, 2, 3]), "c.jpg"));
    let resp = reqwest::Client::new()
        .post(server.url("/stylize"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        resp.text().await.unwrap(),
        "Please upload both content and style images."
    );
    assert!(files_in(server.upload_dir()).is_empty());
    assert!(files_in(server.output_dir()).is_empty());
    assert!(!server.state.engine.registry().is_loaded());
}

#[tokio::test]
async fn combine_requires_all_three_images() {
    let server = spawn_server(Arc::new(FlakyLoader::reliable())).await;
    let form = Form::new()
        .part("content", image_part(jpeg(8, 8, [1, 2, 3]), "c.jpg"))
        .part("style1", image_part(jpeg(8, 8, [4, 5, 6]), "s1.jpg"));
    let resp = reqwest::Client::new()
        .post(server.url("/combine-styles"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        resp.text().await.unwrap(),
        "Please upload content and both style images."
    );
}

#[tokio::test]
async fn non_numeric_style_ratio_is_a_bad_request() {
    let server = spawn_server(Arc::new(FlakyLoader::reliable())).await;
    let resp = reqwest::Client::new()
        .post(server.url("/stylize"))
        .multipart(stylize_form(Some("lots")))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(wait_for_empty_storage(&server).await);
}

#[tokio::test]
async fn undecodable_upload_fails_and_is_cleaned_up() {
    let server = spawn_server(Arc::new(FlakyLoader::reliable())).await;
    let form = Form::new()
        .part("content", image_part(b"definitely not an image".to_vec(), "c.jpg"))
        .part("style", image_part(jpeg(8, 8, [9, 9, 9]), "s.jpg"));
    let resp = reqwest::Client::new()
        .post(server.url("/stylize"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.text().await.unwrap(), "Error processing style transfer");
    assert!(wait_for_empty_storage(&server).await, "artifacts left behind");
    assert_eq!(server.state.jobs.in_flight(), 0);
}

#[tokio::test]
async fn failed_model_load_is_retried_on_next_request() {
    let server = spawn_server(Arc::new(FlakyLoader::failing_first(1))).await;
    let client = reqwest::Client::new();

    let first = client
        .post(server.url("/stylize"))
        .multipart(stylize_form(None))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!server.state.engine.registry().is_loaded());

    let second = client
        .post(server.url("/stylize"))
        .multipart(stylize_form(None))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    second.bytes().await.unwrap();
    assert!(server.state.engine.registry().is_loaded());
    assert_eq!(server.state.engine.registry().load_count(), 2);
}

#[tokio::test]
async fn manual_cleanup_empties_storage_and_is_idempotent() {
    let server = spawn_server(Arc::new(FlakyLoader::reliable())).await;
    std::fs::write(server.upload_dir().join("orphan.jpg"), b"x").unwrap();
    std::fs::write(server.output_dir().join("stylized_orphan.jpg"), b"y").unwrap();

    let client = reqwest::Client::new();
    for _ in 0..2 {
        let resp = client.post(server.url("/cleanup")).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.text().await.unwrap(), "Cleanup completed successfully");
        assert!(files_in(server.upload_dir()).is_empty());
        assert!(files_in(server.output_dir()).is_empty());
    }
}

#[tokio::test]
async fn index_and_health_respond() {
    let server = spawn_server(Arc::new(FlakyLoader::reliable())).await;
    let client = reqwest::Client::new();

    let index = client.get(server.url("/")).send().await.unwrap();
    assert_eq!(index.status(), StatusCode::OK);
    assert!(index.headers().contains_key("x-request-id"));
    assert_eq!(index.text().await.unwrap(), "Welcome to the Style Transfer API!");

    let health = client.get(server.url("/api/health")).send().await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_slice(&health.bytes().await.unwrap()).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["modelsLoaded"], false);
    assert_eq!(body["inFlightJobs"], 0);
    assert_eq!(body["computeBuffers"]["liveBuffers"], 0);
}

#[tokio::test]
async fn slow_inference_times_out_and_staged_inputs_are_removed() {
    let server = spawn_server_with(
        Arc::new(FixedLoader::slow_style(Duration::from_millis(2500))),
        |config| config.compute_timeout_secs = 1,
    )
    .await;

    let resp = reqwest::Client::new()
        .post(server.url("/stylize"))
        .multipart(stylize_form(None))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(resp.text().await.unwrap(), "Style transfer timed out");
    assert!(wait_for_empty_storage(&server).await, "artifacts left behind");
    assert_eq!(server.state.jobs.in_flight(), 0);

    // The abandoned inference must not leave an output behind when it finishes.
    tokio::time::sleep(Duration::from_millis(2000)).await;
    assert!(files_in(server.output_dir()).is_empty());
}

#[tokio::test]
async fn oversized_upload_is_rejected_before_staging() {
    let server = spawn_server_with(Arc::new(FlakyLoader::reliable()), |config| {
        config.max_upload_bytes = 1000
    })
    .await;

    let form = Form::new()
        .part("content", image_part(vec![7u8; 5000], "big.jpg"))
        .part("style", image_part(jpeg(8, 8, [1, 1, 1]), "s.jpg"));
    let resp = reqwest::Client::new()
        .post(server.url("/stylize"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(files_in(server.upload_dir()).is_empty());
    assert!(files_in(server.output_dir()).is_empty());
    assert!(!server.state.engine.registry().is_loaded());
}

#[tokio::test]
async fn duplicated_file_part_is_a_bad_request() {
    let server = spawn_server(Arc::new(FlakyLoader::reliable())).await;
    let form = Form::new()
        .part("content", image_part(jpeg(8, 8, [1, 2, 3]), "c1.jpg"))
        .part("content", image_part(jpeg(8, 8, [3, 2, 1]), "c2.jpg"))
        .part("style", image_part(jpeg(8, 8, [9, 9, 9]), "s.jpg"));
    let resp = reqwest::Client::new()
        .post(server.url("/stylize"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(resp.text().await.unwrap().contains("content"));
    assert!(files_in(server.upload_dir()).is_empty());
    assert!(files_in(server.output_dir()).is_empty());
}

#[tokio::test]
async fn client_that_stops_reading_still_gets_artifacts_deleted() {
    let server = spawn_server(Arc::new(FlakyLoader::reliable())).await;
    let form = Form::new()
        .part("content", image_part(jpeg(640, 480, [90, 160, 30]), "content.jpg"))
        .part("style", image_part(jpeg(64, 64, [20, 20, 220]), "style.jpg"));

    let resp = reqwest::Client::new()
        .post(server.url("/stylize"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    drop(resp);

    assert!(wait_for_empty_storage(&server).await, "artifacts left behind");
    for _ in 0..200 {
        if server.state.jobs.in_flight() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(server.state.jobs.in_flight(), 0);
}

#[tokio::test]
async fn version_reports_package_and_model_files() {
    let server = spawn_server(Arc::new(FlakyLoader::reliable())).await;
    let resp = reqwest::Client::new()
        .get(server.url("/api/version"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_slice(&resp.bytes().await.unwrap()).unwrap();
    assert_eq!(body["name"], "stylize-server");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["styleModel"], "style_predict.onnx");
    assert_eq!(body["transformModel"], "style_transform.onnx");
}
