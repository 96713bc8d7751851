// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Drive HTTP long-running operations against a local server.

#[cfg(test)]
mod tests {
    use gax::options::{ClientOptions, RetryOptions};
    use gax::pipeline::Pipeline;
    use gax::request::Request;
    use gax::transport::ReqwestTransport;
    use httptest::{Expectation, Server, matchers::*, responders::*};
    use cloud_client_lro as lro;
    use lro::http::LocationPoller;
    use lro::{OperationStatus, PollerOptions};
    use serde_json::{Value, json};
    use std::time::Duration;

    fn pipeline() -> anyhow::Result<Pipeline> {
        let retry = RetryOptions::builder()
            .with_max_retries(2)
            .with_base_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(1))
            .build()?;
        let pipeline = Pipeline::builder()
            .with_client_options(ClientOptions::default().with_retry_options(retry))
            .with_transport(ReqwestTransport::new())
            .build()?;
        Ok(pipeline)
    }

    fn poller() -> anyhow::Result<LocationPoller> {
        let options = PollerOptions::default()
            .with_poll_interval(Duration::from_millis(10))
            .with_timeout(Duration::from_secs(30));
        Ok(LocationPoller::new(pipeline()?).with_options(options))
    }

    fn url(server: &Server, path: &str) -> anyhow::Result<url::Url> {
        Ok(url::Url::parse(&format!("http://{}{path}", server.addr()))?)
    }

    fn json_response(code: u16, body: Value) -> Box<dyn Responder> {
        Box::new(
            status_code(code)
                .insert_header("content-type", "application/json")
                .body(body.to_string()),
        )
    }

    fn accepted() -> Box<dyn Responder> {
        Box::new(status_code(202))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn operation_location() -> anyhow::Result<()> {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/v1/jobs")).respond_with(
                status_code(202).insert_header("operation-location", "/v1/operations/1"),
            ),
        );
        server.expect(
            Expectation::matching(request::method_path("GET", "/v1/operations/1"))
                .times(3)
                .respond_with(cycle(vec![
                    json_response(200, json!({"status": "NotStarted"})),
                    json_response(200, json!({"status": "Running"})),
                    json_response(
                        200,
                        json!({"status": "Succeeded", "resourceLocation": "/v1/results/1"}),
                    ),
                ])),
        );
        server.expect(
            Expectation::matching(request::method_path("GET", "/v1/results/1"))
                .times(1)
                .respond_with(cycle(vec![json_response(200, json!({"name": "job-1", "size": 42}))])),
        );

        let request = Request::new(http::Method::POST, url(&server, "/v1/jobs")?)
            .set_body(json!({"size": 42}).to_string());
        let poller = poller()?.begin::<Value>(request);
        let response = poller.block_until_done().await?;
        assert!(response.status().is_success(), "{response:?}");
        let operation = poller.activation_response().and_then(|r| r.into_value());
        let operation = operation.expect("activation response has a value");
        assert_eq!(operation.status_code(), http::StatusCode::ACCEPTED);
        assert_eq!(
            operation.poll_url(),
            Some(&url(&server, "/v1/operations/1")?)
        );

        let want = json!({"name": "job-1", "size": 42});
        assert_eq!(poller.get_result().await?, want);
        // The result is cached, the server expects a single request.
        assert_eq!(poller.get_result().await?, want);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn put_with_async_operation() -> anyhow::Result<()> {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("PUT", "/v1/things/a")).respond_with(
                status_code(201)
                    .insert_header("azure-asyncoperation", "/v1/status/a")
                    .insert_header("retry-after-ms", "5")
                    .body(json!({"name": "a", "properties": {"provisioningState": "Creating"}}).to_string()),
            ),
        );
        server.expect(
            Expectation::matching(request::method_path("GET", "/v1/status/a"))
                .respond_with(cycle(vec![json_response(200, json!({"status": "Succeeded"}))])),
        );
        server.expect(
            Expectation::matching(request::method_path("GET", "/v1/things/a"))
                .respond_with(cycle(vec![json_response(200, json!({"name": "a", "ready": true}))])),
        );

        let request = Request::new(http::Method::PUT, url(&server, "/v1/things/a")?);
        let poller = poller()?.begin::<Value>(request);
        let activation = poller.activate().await?;
        assert_eq!(
            activation.status(),
            &OperationStatus::custom("Creating", false)
        );
        assert!(!activation.status().is_complete());
        assert_eq!(activation.retry_after(), Some(Duration::from_millis(5)));

        poller.block_until_done().await?;
        assert_eq!(
            poller.get_result().await?,
            json!({"name": "a", "ready": true})
        );
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn location_header_with_final_body() -> anyhow::Result<()> {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/v1/exports"))
                .respond_with(status_code(202).insert_header("location", "/v1/exports/status")),
        );
        server.expect(
            Expectation::matching(request::method_path("GET", "/v1/exports/status"))
                .times(3)
                .respond_with(cycle(vec![
                    accepted(),
                    json_response(404, json!({"error": {"code": "NotFound", "message": "not yet"}})),
                    json_response(200, json!({"exported": 7})),
                ])),
        );

        let request = Request::new(http::Method::POST, url(&server, "/v1/exports")?);
        let poller = poller()?.begin::<Value>(request);
        let response = poller.block_until_done().await?;
        assert!(response.status().is_success(), "{response:?}");
        assert_eq!(poller.get_result().await?, json!({"exported": 7}));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn synchronous_completion() -> anyhow::Result<()> {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/v1/quick"))
                .respond_with(cycle(vec![json_response(200, json!({"done": true}))])),
        );

        let request = Request::new(http::Method::POST, url(&server, "/v1/quick")?);
        let poller = poller()?.begin::<Value>(request);
        let response = poller.block_until_done().await?;
        assert!(response.status().is_success(), "{response:?}");
        assert_eq!(poller.get_result().await?, json!({"done": true}));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reported_failure() -> anyhow::Result<()> {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("DELETE", "/v1/things/b"))
                .respond_with(status_code(202).insert_header("operation-location", "/v1/ops/b")),
        );
        server.expect(
            Expectation::matching(request::method_path("GET", "/v1/ops/b")).respond_with(cycle(vec![
                json_response(200, json!({"status": "Failed", "error": {"code": "Conflict"}})),
            ])),
        );

        let request = Request::new(http::Method::DELETE, url(&server, "/v1/things/b")?);
        let poller = poller()?.begin::<Value>(request);
        let response = poller.block_until_done().await?;
        assert_eq!(response.status(), &OperationStatus::Failed);
        let body = response.value().map(|op| op.body().clone()).unwrap_or_default();
        let body: Value = serde_json::from_slice(&body)?;
        assert_eq!(body["error"]["code"], "Conflict");
        let err = poller.get_result().await.unwrap_err();
        assert!(err.is_operation_failed(), "{err:?}");
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn activation_error() -> anyhow::Result<()> {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/v1/jobs")).respond_with(cycle(vec![
                json_response(400, json!({"error": {"code": "BadRequest", "message": "uh-oh"}})),
            ])),
        );

        let request = Request::new(http::Method::POST, url(&server, "/v1/jobs")?);
        let poller = poller()?.begin::<Value>(request);
        let err = poller.block_until_done().await.unwrap_err();
        assert!(err.is_operation_failed(), "{err:?}");
        assert_eq!(poller.status(), OperationStatus::Failed);
        let cause = poller.last_error().expect("activation error is recorded");
        assert_eq!(cause.http_status_code(), Some(400));
        let err = poller.get_result().await.unwrap_err();
        assert!(err.is_operation_failed(), "{err:?}");
        Ok(())
    }
}
