use std::{path::Path, sync::Arc};

use color_eyre::eyre::Context;
use rustls::{
    ServerConfig,
    pki_types::{CertificateDer, PrivateKeyDer, pem::PemObject},
};

use crate::error::ServerError;

// Only HTTP/1.1 is served over TLS.
const ALPN_HTTP11: &[u8] = b"http/1.1";

// Load a PEM certificate chain and its private key into a TLS server configuration.
pub(crate) fn load_server_config(
    certificate_file: &Path,
    key_file: &Path,
) -> color_eyre::Result<Arc<ServerConfig>> {
    let certificates = CertificateDer::pem_file_iter(certificate_file)
        .and_then(|iter| iter.collect::<Result<Vec<_>, _>>())
        .with_context(|| format!("Error reading certificate file {}", certificate_file.display()))?;
    if certificates.is_empty() {
        return Err(ServerError::MissingCertificate(certificate_file.to_path_buf()).into());
    }
    let key = PrivateKeyDer::from_pem_file(key_file)
        .with_context(|| format!("Error reading private key file {}", key_file.display()))?;
    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certificates, key)
        .with_context(|| "Error matching certificate to private key")?;
    config.alpn_protocols = vec![ALPN_HTTP11.to_vec()];
    Ok(Arc::new(config))
}
