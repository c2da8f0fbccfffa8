use std::time::Duration;

use http::{
    Request, StatusCode,
    header::{AUTHORIZATION, CONTENT_TYPE, HOST},
};
use hawk_apiserver::entrypoint;
use tokio::time::{sleep, timeout};

use crate::common::{
    CIB_DOCUMENT, ServerHandle, TestFiles, TestResponse, send_request, wait_for_server,
};

async fn get_cib(files: &TestFiles, port: u16, authorization: Option<&str>) -> TestResponse {
    let tls_stream = files.connect_tls(port).await;
    let mut request = Request::builder()
        .method("GET")
        .uri("/api/v1/cib")
        .header(HOST, format!("localhost:{port}"));
    if let Some(authorization) = authorization {
        request = request.header(AUTHORIZATION, authorization);
    }
    send_request(tls_stream, request.body(String::new()).unwrap()).await
}

/// This test ensures that the CIB is served over TLS on the shared port to
/// authorized clients, and that it follows changes to its source.
#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn https_serves_cib() {
    // 1. Initialize the server
    let files = TestFiles::new();
    let config = files.config(
        17632,
        &[
            "--hawk-chkpwd-path=/bin/true",
            "--attrd-updater-path=/bin/false",
        ],
    );
    let _server_handle = ServerHandle(tokio::spawn(async move { entrypoint(config).await }));
    wait_for_server(17632).await;

    // 2. Wait for the CIB to be synced
    if timeout(Duration::from_secs(5), async {
        loop {
            let response = get_cib(&files, 17632, Some("Basic aGFjbHVzdGVyOmxpbnV4")).await;
            assert_eq!(response.status, StatusCode::OK);
            assert_eq!(
                response.headers.get(CONTENT_TYPE).unwrap(),
                "application/xml"
            );
            if response.body == CIB_DOCUMENT {
                break;
            }
            sleep(Duration::from_millis(100)).await;
        }
    })
    .await
    .is_err()
    {
        panic!("Timeout waiting for CIB to be served.")
    };

    // 3. Update the CIB and wait for the change
    std::fs::write(files.path("cib.xml"), "<cib epoch=\"2\"/>").unwrap();
    if timeout(Duration::from_secs(5), async {
        while get_cib(&files, 17632, Some("Basic aGFjbHVzdGVyOmxpbnV4"))
            .await
            .body
            != "<cib epoch=\"2\"/>"
        {
            sleep(Duration::from_millis(100)).await;
        }
    })
    .await
    .is_err()
    {
        panic!("Timeout waiting for CIB update to be served.")
    };
}

/// This test ensures that the CIB is never served to clients without valid
/// credentials.
#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn https_rejects_unauthorized_requests() {
    // 1. Initialize the server with a password check that always fails
    let files = TestFiles::new();
    let config = files.config(
        17633,
        &[
            "--hawk-chkpwd-path=/bin/false",
            "--attrd-updater-path=/bin/false",
        ],
    );
    let _server_handle = ServerHandle(tokio::spawn(async move { entrypoint(config).await }));
    wait_for_server(17633).await;

    // 2. Request without credentials
    let response = get_cib(&files, 17633, None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body, "Unauthorized request.");

    // 3. Request with rejected credentials
    let response = get_cib(&files, 17633, Some("Basic aGFjbHVzdGVyOndyb25n")).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body, "Unauthorized request.");
}
