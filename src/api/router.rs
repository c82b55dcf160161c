//! HTTP router.
//!
//! Returns a composable `Router` that can be served directly or mounted
//! under another axum app. CORS is fully permissive; uploads are capped by
//! a request body limit derived from the per-file maximum.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::api::endpoints;
use crate::api::types::AppState;

/// Build the API router over shared state.
///
/// NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.request_body_limit();

    Router::new()
        .route("/info", get(endpoints::info::info))
        .route(
            "/data-extraction/",
            post(endpoints::extraction::extract_batch),
        )
        .route(
            "/data-extraction/schema-mapping",
            post(endpoints::extraction::schema_mapping),
        )
        .route(
            "/document-types",
            get(endpoints::document_types::list).post(endpoints::document_types::create),
        )
        .route(
            "/document-types/:id/schemas",
            get(endpoints::document_types::list_schemas)
                .post(endpoints::document_types::add_schema),
        )
        .route(
            "/document-types/:id/extractions",
            get(endpoints::document_types::list_extractions),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::db::SqliteStore;
    use crate::pipeline::extraction::testing::pdf_with_pages;
    use crate::pipeline::extraction::{
        encode_gray_png, DocumentPipeline, MockOcrEngine, MockPdfPageRenderer, OcrExtractor,
        OtsuBinarizer, PipelineSettings, PositionalLayoutExtractor, LopdfTextLayer,
        NO_CONTENT_MESSAGE,
    };
    use crate::pipeline::structuring::{MockLlmClient, SchemaMapper};

    const BOUNDARY: &str = "pdfintake-test-boundary";

    struct TestApp {
        router: Router,
        _staging: tempfile::TempDir,
    }

    impl TestApp {
        async fn send(&self, req: Request<Body>) -> Response {
            self.router.clone().oneshot(req).await.unwrap()
        }
    }

    fn test_app(engine: MockOcrEngine, llm_reply: &str) -> TestApp {
        let staging = tempfile::tempdir().unwrap();
        let ocr = OcrExtractor::new(
            Arc::new(MockPdfPageRenderer::new(1)),
            Arc::new(OtsuBinarizer),
            Arc::new(engine),
            200,
            2,
        );
        let pipeline = DocumentPipeline::new(
            Arc::new(LopdfTextLayer),
            ocr,
            Arc::new(PositionalLayoutExtractor),
            PipelineSettings {
                max_file_bytes: 1024 * 1024,
                document_timeout: Duration::from_secs(30),
                staging_dir: Some(staging.path().to_path_buf()),
            },
        );
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let mapper = SchemaMapper::new(
            store.clone(),
            Arc::new(MockLlmClient::new(llm_reply)),
            "test-model",
        );
        let state = AppState {
            pipeline: Arc::new(pipeline),
            store,
            mapper: Arc::new(mapper),
            environment: Arc::from("test"),
        };
        TestApp {
            router: build_router(state),
            _staging: staging,
        }
    }

    enum Part<'a> {
        File(&'a str, &'a str, &'a [u8]),
        Text(&'a str, &'a str),
    }

    fn multipart_request(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part {
                Part::File(name, filename, bytes) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                             Content-Type: application/octet-stream\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(bytes);
                }
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}")
                            .as_bytes(),
                    );
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn json_request(method: &str, uri: &str, payload: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&payload).unwrap()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Registers "invoice" with one schema; returns its id.
    async fn register_invoice(app: &TestApp) -> i64 {
        let response = app
            .send(json_request(
                "POST",
                "/document-types",
                json!({"name": "invoice", "description": "Supplier invoices"}),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let id = json_body(response).await["id"].as_i64().unwrap();

        let response = app
            .send(json_request(
                "POST",
                &format!("/document-types/{id}/schemas"),
                json!({
                    "schema": {"total": "number"},
                    "prompt_template": "Devuelve JSON con {schema} para:\n{pdf_content}"
                }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        id
    }

    #[tokio::test]
    async fn info_reports_environment() {
        let app = test_app(MockOcrEngine::new(""), "{}");
        let response = app.send(get("/info")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        let message = json["message"].as_str().unwrap();
        assert!(message.contains("PDF Intake"));
        assert!(message.ends_with("Running in test mode."));
    }

    #[tokio::test]
    async fn batch_preserves_order_and_isolates_failures() {
        let app = test_app(MockOcrEngine::new("unused"), "{}");
        let pdf = pdf_with_pages(&["Invoice #123"]);
        let request = multipart_request(
            "/data-extraction/",
            &[
                Part::File("files", "invoice.pdf", &pdf),
                Part::File("files", "report.docx", b"PK\x03\x04"),
                Part::File("files", "again.PDF", &pdf),
            ],
        );

        let response = app.send(request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        let results = json["results"].as_array().unwrap();
        assert_eq!(results.len(), 3);

        assert_eq!(results[0]["filename"], "invoice.pdf");
        assert_eq!(results[0]["pdf_pure"], true);
        assert_eq!(results[0]["content"], json!(["Invoice #123"]));

        assert_eq!(
            results[1],
            json!({"filename": "report.docx", "error": "El archivo report.docx no es un PDF."})
        );

        assert_eq!(results[2]["filename"], "again.PDF");
        assert_eq!(results[2]["page_count"], 1);
    }

    #[tokio::test]
    async fn batch_without_files_is_bad_request() {
        let app = test_app(MockOcrEngine::new(""), "{}");
        let response = app
            .send(multipart_request("/data-extraction/", &[Part::Text("other", "x")]))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn document_type_registry() {
        let app = test_app(MockOcrEngine::new(""), "{}");
        let id = register_invoice(&app).await;

        let duplicate = app
            .send(json_request("POST", "/document-types", json!({"name": "invoice"})))
            .await;
        assert_eq!(duplicate.status(), StatusCode::CONFLICT);

        let listed = json_body(app.send(get("/document-types")).await).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let schemas =
            json_body(app.send(get(&format!("/document-types/{id}/schemas"))).await).await;
        assert_eq!(schemas[0]["schema"], json!({"total": "number"}));

        let missing = app.send(get("/document-types/999/schemas")).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn schema_with_unknown_placeholder_rejected() {
        let app = test_app(MockOcrEngine::new(""), "{}");
        let id = register_invoice(&app).await;
        let response = app
            .send(json_request(
                "POST",
                &format!("/document-types/{id}/schemas"),
                json!({"schema": {}, "prompt_template": "Hola {nombre}"}),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn schema_mapping_pdf_end_to_end() {
        let app = test_app(
            MockOcrEngine::new("unused"),
            "```json\n{\"total\": 50}\n```",
        );
        let id = register_invoice(&app).await;
        let pdf = pdf_with_pages(&["Total: $50"]);

        let response = app
            .send(multipart_request(
                "/data-extraction/schema-mapping",
                &[
                    Part::Text("document_type", &id.to_string()),
                    Part::File("file", "invoice.pdf", &pdf),
                ],
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({"total": 50}));

        let stored =
            json_body(app.send(get(&format!("/document-types/{id}/extractions"))).await).await;
        let stored = stored.as_array().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0]["document_path"], "invoice.pdf");
        assert_eq!(stored[0]["ocr_text"], "Total: $50");
        assert_eq!(stored[0]["model_response"], json!({"total": 50}));
    }

    #[tokio::test]
    async fn schema_mapping_image_uses_ocr() {
        let app = test_app(MockOcrEngine::new("Total: $75"), "{\"total\": 75}");
        let id = register_invoice(&app).await;
        let png = encode_gray_png(&image::GrayImage::from_pixel(8, 8, image::Luma([255u8])))
            .unwrap();

        let response = app
            .send(multipart_request(
                "/data-extraction/schema-mapping",
                &[
                    Part::File("file", "receipt.PNG", &png),
                    Part::Text("document_type", &id.to_string()),
                ],
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({"total": 75}));
    }

    #[tokio::test]
    async fn schema_mapping_rejects_unsupported_extension() {
        let app = test_app(MockOcrEngine::new(""), "{}");
        let id = register_invoice(&app).await;
        let response = app
            .send(multipart_request(
                "/data-extraction/schema-mapping",
                &[
                    Part::Text("document_type", &id.to_string()),
                    Part::File("file", "notes.txt", b"hola"),
                ],
            ))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn schema_mapping_without_text_is_422() {
        let app = test_app(MockOcrEngine::new("  "), "{}");
        let id = register_invoice(&app).await;
        let pdf = pdf_with_pages(&[""]);
        let response = app
            .send(multipart_request(
                "/data-extraction/schema-mapping",
                &[
                    Part::Text("document_type", &id.to_string()),
                    Part::File("file", "scan.pdf", &pdf),
                ],
            ))
            .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = json_body(response).await;
        assert_eq!(json["error"]["message"], NO_CONTENT_MESSAGE);
    }

    #[tokio::test]
    async fn schema_mapping_prose_reply_is_502() {
        let app = test_app(MockOcrEngine::new(""), "Lo siento, no puedo.");
        let id = register_invoice(&app).await;
        let pdf = pdf_with_pages(&["Total: $50"]);
        let response = app
            .send(multipart_request(
                "/data-extraction/schema-mapping",
                &[
                    Part::Text("document_type", &id.to_string()),
                    Part::File("file", "invoice.pdf", &pdf),
                ],
            ))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let stored =
            json_body(app.send(get(&format!("/document-types/{id}/extractions"))).await).await;
        assert!(stored.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn schema_mapping_unknown_type_is_404() {
        let app = test_app(MockOcrEngine::new(""), "{}");
        let pdf = pdf_with_pages(&["Total: $50"]);
        let response = app
            .send(multipart_request(
                "/data-extraction/schema-mapping",
                &[
                    Part::Text("document_type", "77"),
                    Part::File("file", "invoice.pdf", &pdf),
                ],
            ))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cors_allows_any_origin() {
        let app = test_app(MockOcrEngine::new(""), "{}");
        let request = Request::builder()
            .uri("/info")
            .header(header::ORIGIN, "https://example.org")
            .body(Body::empty())
            .unwrap();
        let response = app.send(request).await;
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );
    }
}
