use std::{fmt::Display, future::Future, io, sync::Arc, time::Duration};

use color_eyre::eyre::Context;
use hyper::{Request, body::Incoming, server::conn::http1, service::service_fn};
use hyper_util::rt::TokioIo;
use tokio::{net::TcpListener, pin, time::sleep};
use tower::{Layer, ServiceExt};
use tracing::{debug, info, warn};

use crate::{
    api::{ApiState, router},
    auth::HawkAuthenticator,
    certificates::load_server_config,
    cib::{CibCache, CibSync},
    config::{ApplicationConfig, CibSource},
    droppable_handle::DroppableHandle,
    error::ServerError,
    provider::{CibProvider, CibadminProvider, FileProvider},
    redirect::HttpsRedirectLayer,
    split_listener::{ConnectionInfo, SplitAcceptor, SplitListener},
};

// Pause after a failed accept, such as when running out of file descriptors.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

#[doc(hidden)]
// Main entrypoint of the application.
pub async fn entrypoint(config: ApplicationConfig) -> color_eyre::Result<()> {
    info!("Starting hawk-apiserver...");
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    let tls_config = load_server_config(&config.cert, &config.key)?;

    // Keep the CIB in sync in the background. The task is aborted once this function returns.
    let cache = Arc::new(CibCache::new());
    let _cib_sync = match config.cib_source {
        CibSource::Cibadmin => spawn_cib_sync(
            CibadminProvider::builder()
                .path(config.cibadmin_path.clone())
                .poll_interval(*config.cib_poll_interval)
                .command_timeout(*config.cib_command_timeout)
                .build(),
            Arc::clone(&cache),
            &config,
        ),
        CibSource::File => {
            let Some(cib_file) = config.cib_file.clone() else {
                return Err(ServerError::InvalidConfig(
                    "--cib-file is required when --cib-source=file".into(),
                )
                .into());
            };
            spawn_cib_sync(FileProvider::new(cib_file), Arc::clone(&cache), &config)
        }
    };

    let authenticator = HawkAuthenticator::builder()
        .attrd_updater(config.attrd_updater_path.clone())
        .hawk_chkpwd(config.hawk_chkpwd_path.clone())
        .timeout(*config.authentication_timeout)
        .build();
    let state = ApiState::builder()
        .cache(cache)
        .authenticator(Arc::new(authenticator))
        .build();
    let service =
        HttpsRedirectLayer.layer(router(state, &config.index_file, &config.favicon_file));

    let listener = TcpListener::bind((config.listen_address, config.port))
        .await
        .with_context(|| format!("Error listening to port {}", config.port))?;
    let listener = SplitListener::new(
        listener,
        SplitAcceptor::new(tls_config, *config.classify_timeout),
    );
    info!(
        "Listening for HTTPS and HTTP connections on port {}.",
        config.port
    );
    info!("hawk-apiserver is now running.");

    // Add OS signal handlers for termination.
    let signal_handler = wait_for_signal();
    pin!(signal_handler);
    loop {
        tokio::select! {
            (stream, address) = accept_next(|| listener.accept_raw(), ACCEPT_RETRY_DELAY) => {
                let acceptor = listener.acceptor().clone();
                let service = service.clone();
                tokio::spawn(async move {
                    // Classify inside the connection's task, so that slow peers don't hold up others.
                    let stream = match acceptor.split(stream, address).await {
                        Ok(stream) => stream,
                        Err(error) => {
                            debug!(%error, "Dropping unclassified connection.");
                            return;
                        }
                    };
                    let info = ConnectionInfo {
                        protocol: stream.protocol(),
                        remote_address: address,
                    };
                    let service = service_fn(move |mut request: Request<Incoming>| {
                        request.extensions_mut().insert(info);
                        service.clone().oneshot(request)
                    });
                    let io = TokioIo::new(stream);
                    if let Err(error) = http1::Builder::new()
                        .keep_alive(true)
                        .serve_connection(io, service)
                        .await
                    {
                        debug!(%error, %address, "Error serving connection.");
                    }
                });
            }
            signal = &mut signal_handler => {
                signal.with_context(|| "Error listening for termination signals")?;
                break;
            }
        }
    }
    info!("hawk-apiserver is shutting down.");
    Ok(())
}

// Accept the next connection, retrying failed accepts after `retry_delay`.
async fn accept_next<T, E, F, Fut>(mut accept: F, retry_delay: Duration) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    loop {
        match accept().await {
            Ok(connection) => return connection,
            Err(error) => {
                warn!(%error, "Unable to accept connection.");
                sleep(retry_delay).await;
            }
        }
    }
}

fn spawn_cib_sync<P: CibProvider + 'static>(
    provider: P,
    cache: Arc<CibCache>,
    config: &ApplicationConfig,
) -> DroppableHandle<()> {
    let cib_sync = CibSync::builder()
        .provider(provider)
        .cache(cache)
        .retry_interval(*config.cib_retry_interval)
        .subscribe_attempts(config.cib_subscribe_attempts)
        .build();
    DroppableHandle::spawn(async move { cib_sync.run().await })
}

#[cfg(unix)]
async fn wait_for_signal() -> io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut signal_terminate = signal(SignalKind::terminate())?;
    let mut signal_interrupt = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = signal_terminate.recv() => debug!("Received SIGTERM."),
        _ = signal_interrupt.recv() => debug!("Received SIGINT."),
    };
    Ok(())
}

#[cfg(windows)]
async fn wait_for_signal() -> io::Result<()> {
    use tokio::signal::windows;

    let mut signal_c = windows::ctrl_c()?;
    let mut signal_break = windows::ctrl_break()?;
    let mut signal_close = windows::ctrl_close()?;
    let mut signal_shutdown = windows::ctrl_shutdown()?;

    tokio::select! {
        _ = signal_c.recv() => debug!("Received CTRL_C."),
        _ = signal_break.recv() => debug!("Received CTRL_BREAK."),
        _ = signal_close.recv() => debug!("Received CTRL_CLOSE."),
        _ = signal_shutdown.recv() => debug!("Received CTRL_SHUTDOWN."),
    };
    Ok(())
}
