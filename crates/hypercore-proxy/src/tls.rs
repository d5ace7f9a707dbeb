//! TLS termination support.

use std::path::PathBuf;
use std::sync::Arc;

use rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

use crate::error::{ProxyError, Result};

/// Certificate/key paths for TLS-terminated listeners.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

impl TlsConfig {
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        }
    }

    /// Loads the PEM pair into an acceptor.
    pub fn build_acceptor(&self) -> Result<TlsAcceptor> {
        let cert_file = std::fs::File::open(&self.cert_path)
            .map_err(|e| ProxyError::Tls(format!("open {}: {e}", self.cert_path.display())))?;
        let certs: Vec<_> = rustls_pemfile::certs(&mut std::io::BufReader::new(cert_file))
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| ProxyError::Tls(format!("parse certs: {e}")))?;

        let key_file = std::fs::File::open(&self.key_path)
            .map_err(|e| ProxyError::Tls(format!("open {}: {e}", self.key_path.display())))?;
        let key = rustls_pemfile::private_key(&mut std::io::BufReader::new(key_file))
            .map_err(|e| ProxyError::Tls(format!("parse key: {e}")))?
            .ok_or_else(|| ProxyError::Tls("no private key in file".to_string()))?;

        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| ProxyError::Tls(e.to_string()))?;

        Ok(TlsAcceptor::from(Arc::new(config)))
    }
}
