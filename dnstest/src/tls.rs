//! Trust store loading for the TLS transport.

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    sync::Arc,
};

use tokio_rustls::{
    rustls::{crypto::ring, ClientConfig, RootCertStore},
    TlsConnector,
};

use crate::error::CredentialError;

/// TLS client configuration trusting a custom CA bundle.
#[derive(Debug, Clone)]
pub struct Credential {
    cfg: Arc<ClientConfig>,
}

impl Credential {
    /// Returns a connector performing handshakes with this credential.
    #[inline]
    pub fn connector(&self) -> TlsConnector {
        TlsConnector::from(self.cfg.clone())
    }
}

/// Loads root certificates from the PEM bundle at the given path.
///
/// An empty path means the bundled web PKI roots.
pub fn load<P>(path: P) -> Result<Credential, CredentialError>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let roots = if path.as_os_str().is_empty() {
        log::debug!("no CA bundle given, using web PKI roots");
        RootCertStore { roots: webpki_roots::TLS_SERVER_ROOTS.into() }
    } else {
        load_roots(path)?
    };

    let cfg = ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();

    let m = Credential { cfg: Arc::new(cfg) };

    Ok(m)
}

fn load_roots(path: &Path) -> Result<RootCertStore, CredentialError> {
    log::debug!("loading CA certificates from '{}' ...", path.display());

    let io_err = |source| CredentialError::Io { path: PathBuf::from(path), source };
    let mut rd = BufReader::new(File::open(path).map_err(io_err)?);

    let mut roots = RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut rd) {
        roots.add(cert.map_err(io_err)?)?;
    }
    if roots.is_empty() {
        return Err(CredentialError::NoCertificates(path.to_path_buf()));
    }
    log::debug!("loaded {} CA certificates", roots.len());

    Ok(roots)
}
