use std::{path::PathBuf, time::Duration};

use hawk_apiserver::entrypoint;
use tokio::time::timeout;

use crate::common::TestFiles;

/// This test ensures that the server refuses to start without usable
/// certificates or CIB source.
#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn config_invalid_options() {
    let files = TestFiles::new();

    // 1. Missing certificate file
    let mut config = files.config(17636, &[]);
    config.cert = PathBuf::from("/nonexistent/harmonies.pem");
    if timeout(Duration::from_secs(5), async {
        assert!(entrypoint(config).await.is_err());
    })
    .await
    .is_err()
    {
        panic!("Timeout waiting for server to fail.")
    };

    // 2. Key file that doesn't contain a key
    let mut config = files.config(17636, &[]);
    config.key = files.path("cib.xml");
    if timeout(Duration::from_secs(5), async {
        assert!(entrypoint(config).await.is_err());
    })
    .await
    .is_err()
    {
        panic!("Timeout waiting for server to fail.")
    };

    // 3. File source without a file
    let mut config = files.config(17636, &[]);
    config.cib_file = None;
    if timeout(Duration::from_secs(5), async {
        assert!(entrypoint(config).await.is_err());
    })
    .await
    .is_err()
    {
        panic!("Timeout waiting for server to fail.")
    };
}
