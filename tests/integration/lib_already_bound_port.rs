use std::time::Duration;

use hawk_apiserver::entrypoint;
use tokio::{net::TcpListener, time::timeout};

use crate::common::TestFiles;

/// This test ensures that the server fails to start if its port is taken.
#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn lib_already_bound_port() {
    let files = TestFiles::new();
    let _listener = TcpListener::bind("127.0.0.1:17637")
        .await
        .expect("Failed to bind port");
    let config = files.config(17637, &[]);
    if timeout(Duration::from_secs(5), async {
        assert!(entrypoint(config).await.is_err());
    })
    .await
    .is_err()
    {
        panic!("Timeout waiting for server to fail.")
    };
}
