// crates/admission-gate-server/src/tls.rs
// ============================================================================
// Module: Mutual TLS Listener
// Description: rustls server configuration and peer certificate propagation.
// Purpose: Require verified client certificates and expose them to requests.
// Dependencies: admission-gate-core, axum-server, rustls, tokio-rustls
// ============================================================================

//! ## Overview
//! The listener accepts TLS 1.3 only and requires a client certificate that
//! chains to the configured CA bundle. After each handshake the
//! [`ClientCertAcceptor`] attaches the presented chain to every request on the
//! connection as a [`PeerCertificates`] extension, which the identity stage
//! reads. Handshakes without a valid client certificate never reach HTTP.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use admission_gate_config::ServerTlsConfig;
use admission_gate_core::PeerCertificates;
use axum::Extension;
use axum::middleware::AddExtension;
use axum_server::accept::Accept;
use axum_server::tls_rustls::RustlsAcceptor;
use axum_server::tls_rustls::RustlsConfig;
use rustls::RootCertStore;
use rustls::ServerConfig;
use rustls::server::WebPkiClientVerifier;
use rustls_pki_types::CertificateDer;
use rustls_pki_types::PrivateKeyDer;
use rustls_pki_types::pem::PemObject;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio_rustls::server::TlsStream;
use tower::Layer;

use crate::error::ServerError;

// ============================================================================
// SECTION: Server Configuration
// ============================================================================

/// Builds the rustls server configuration for the gateway listener.
///
/// # Errors
///
/// Returns [`ServerError::Init`] when a PEM file cannot be read or parsed or
/// the client CA bundle is empty.
pub fn load_server_tls(config: &ServerTlsConfig) -> Result<Arc<ServerConfig>, ServerError> {
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let certs = read_certificates(Path::new(&config.cert_path))?;
    let key = read_private_key(Path::new(&config.key_path))?;

    let mut roots = RootCertStore::empty();
    for ca in read_certificates(Path::new(&config.client_ca_path))? {
        roots
            .add(ca)
            .map_err(|err| ServerError::Init(format!("invalid client ca certificate: {err}")))?;
    }
    if roots.is_empty() {
        return Err(ServerError::Init("client ca bundle contains no certificates".to_string()));
    }

    let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
        .build()
        .map_err(|err| ServerError::Init(format!("client verifier error: {err}")))?;
    let mut server = ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(|err| ServerError::Init(format!("tls protocol error: {err}")))?
        .with_client_cert_verifier(verifier)
        .with_single_cert(certs, key)
        .map_err(|err| ServerError::Init(format!("server certificate error: {err}")))?;
    server.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(Arc::new(server))
}

/// Reads every certificate in a PEM file.
fn read_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, ServerError> {
    let pem = read_pem(path)?;
    let certs = CertificateDer::pem_slice_iter(&pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| ServerError::Init(format!("{}: invalid certificate pem: {err}", path.display())))?;
    if certs.is_empty() {
        return Err(ServerError::Init(format!("{}: no certificates found", path.display())));
    }
    Ok(certs)
}

/// Reads the first private key in a PEM file.
fn read_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, ServerError> {
    let pem = read_pem(path)?;
    PrivateKeyDer::from_pem_slice(&pem)
        .map_err(|err| ServerError::Init(format!("{}: invalid private key pem: {err}", path.display())))
}

/// Reads a PEM file from disk.
fn read_pem(path: &Path) -> Result<Vec<u8>, ServerError> {
    std::fs::read(path)
        .map_err(|err| ServerError::Init(format!("{}: unable to read: {err}", path.display())))
}

// ============================================================================
// SECTION: Acceptor
// ============================================================================

/// TLS acceptor that forwards the verified client chain to requests.
#[derive(Clone)]
pub struct ClientCertAcceptor {
    /// Underlying rustls acceptor.
    inner: RustlsAcceptor,
}

impl ClientCertAcceptor {
    /// Creates an acceptor for a client-verifying server configuration.
    #[must_use]
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self {
            inner: RustlsAcceptor::new(RustlsConfig::from_config(config)),
        }
    }
}

impl<I, S> Accept<I, S> for ClientCertAcceptor
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    S: Send + 'static,
{
    type Stream = TlsStream<I>;
    type Service = AddExtension<S, PeerCertificates>;
    type Future = Pin<Box<dyn Future<Output = io::Result<(Self::Stream, Self::Service)>> + Send>>;

    fn accept(&self, stream: I, service: S) -> Self::Future {
        let acceptor = self.inner.clone();
        Box::pin(async move {
            let (stream, service) = acceptor.accept(stream, service).await?;
            let chain = stream
                .get_ref()
                .1
                .peer_certificates()
                .map(<[CertificateDer<'static>]>::to_vec)
                .unwrap_or_default();
            // The handshake only completes after the client verifier accepted the chain.
            let peer = PeerCertificates::verified(chain);
            Ok((stream, Extension(peer).layer(service)))
        })
    }
}
