use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use hawk_apiserver::ApplicationConfig;
use http::{HeaderMap, Request, StatusCode};
use http_body_util::BodyExt;
use hyper_util::rt::TokioIo;
use rcgen::{CertifiedKey, generate_simple_self_signed};
use rustls::{RootCertStore, pki_types::CertificateDer};
use tempfile::TempDir;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
    time::{sleep, timeout},
};
use tokio_rustls::{TlsConnector, client::TlsStream};

pub(crate) const CIB_DOCUMENT: &str = "<cib epoch=\"1\" num_updates=\"0\" admin_epoch=\"0\"/>";
pub(crate) const INDEX_PAGE: &str = "<html><body>Hawk</body></html>";

// Join handle for a running server, which is aborted when the handle is dropped.
pub(crate) struct ServerHandle(pub(crate) tokio::task::JoinHandle<color_eyre::Result<()>>);

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.0.abort();
    }
}

// Files used by a server under test, removed once dropped.
pub(crate) struct TestFiles {
    pub(crate) directory: TempDir,
    pub(crate) certificate: CertificateDer<'static>,
}

impl TestFiles {
    pub(crate) fn new() -> Self {
        let directory = tempfile::tempdir().expect("Failed to create temporary directory");
        let CertifiedKey { cert, signing_key } =
            generate_simple_self_signed(vec!["localhost".into()])
                .expect("Failed to generate certificate");
        std::fs::write(directory.path().join("harmonies.pem"), cert.pem()).unwrap();
        std::fs::write(
            directory.path().join("harmonies.key"),
            signing_key.serialize_pem(),
        )
        .unwrap();
        std::fs::write(directory.path().join("cib.xml"), CIB_DOCUMENT).unwrap();
        std::fs::write(directory.path().join("index.html"), INDEX_PAGE).unwrap();
        std::fs::write(directory.path().join("favicon.ico"), [0u8, 0, 1, 0]).unwrap();
        TestFiles {
            directory,
            certificate: cert.der().clone(),
        }
    }

    pub(crate) fn path(&self, file: &str) -> PathBuf {
        self.directory.path().join(file)
    }

    // Configuration reading the CIB from the test file, listening on localhost.
    pub(crate) fn config(&self, port: u16, extra_args: &[&str]) -> ApplicationConfig {
        let mut args = vec![
            "hawk-apiserver".to_string(),
            "--listen-address=127.0.0.1".into(),
            format!("--port={port}"),
            format!("--cert={}", self.path("harmonies.pem").display()),
            format!("--key={}", self.path("harmonies.key").display()),
            format!("--index-file={}", self.path("index.html").display()),
            format!("--favicon-file={}", self.path("favicon.ico").display()),
            "--cib-source=file".into(),
            format!("--cib-file={}", self.path("cib.xml").display()),
            "--cib-retry-interval=100ms".into(),
            "--authentication-timeout=5s".into(),
        ];
        args.extend(extra_args.iter().map(|arg| arg.to_string()));
        ApplicationConfig::parse_from(args)
    }

    pub(crate) fn tls_connector(&self) -> TlsConnector {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
        let mut root_store = RootCertStore::empty();
        root_store
            .add(self.certificate.clone())
            .expect("Failed to add certificate");
        TlsConnector::from(Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        ))
    }

    pub(crate) async fn connect_tls(&self, port: u16) -> TlsStream<TcpStream> {
        let tcp_stream = TcpStream::connect(("127.0.0.1", port))
            .await
            .expect("TCP connection failed");
        self.tls_connector()
            .connect("localhost".try_into().unwrap(), tcp_stream)
            .await
            .expect("TLS stream failed")
    }
}

pub(crate) async fn wait_for_server(port: u16) {
    if timeout(Duration::from_secs(5), async {
        while TcpStream::connect(("127.0.0.1", port)).await.is_err() {
            sleep(Duration::from_millis(100)).await;
        }
    })
    .await
    .is_err()
    {
        panic!("Timeout waiting for server to start.")
    };
}

pub(crate) struct TestResponse {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) body: String,
}

// Send a single HTTP/1.1 request over the given stream.
pub(crate) async fn send_request<S>(stream: S, request: Request<String>) -> TestResponse
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .expect("HTTP handshake failed");
    let jh = tokio::spawn(async move {
        if let Err(error) = conn.await {
            eprintln!("Connection failed: {error:?}");
        }
    });
    let Ok(response) = timeout(Duration::from_secs(5), async move {
        sender
            .send_request(request)
            .await
            .expect("Error sending HTTP request")
    })
    .await
    else {
        panic!("Timeout waiting for request to finish.");
    };
    let status = response.status();
    let headers = response.headers().clone();
    let body = String::from_utf8(
        response
            .into_body()
            .collect()
            .await
            .expect("Error collecting response")
            .to_bytes()
            .into(),
    )
    .expect("Invalid response body");
    jh.abort();
    TestResponse {
        status,
        headers,
        body,
    }
}
