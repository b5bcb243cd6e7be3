use rustls::{pki_types::CertificateDer, ClientConfig, RootCertStore};
use rustls_pemfile::certs;

use std::{fs::File, io::BufReader, path::Path};

use tracing::debug;

use crate::{MailError, MailResult};

/// Builds the client configuration used for the `STARTTLS` upgrade.
///
/// The bundled web PKI roots are always trusted, the PEM certificates in
/// `ca_path` (if any) are added on top of them, which allows relays using
/// a private certificate authority.
pub fn load_tls_client_config(ca_path: Option<&Path>) -> MailResult<ClientConfig> {
    let mut root_store = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    if let Some(ca_path) = ca_path {
        let cert_chain = load_ca_cert(ca_path)?;
        let (added, ignored) = root_store.add_parsable_certificates(cert_chain);
        debug!(path = %ca_path.display(), added, ignored, "Loaded CA certificates");
        if added == 0 {
            return Err(MailError::Tls(format!(
                "no usable certificate in {}",
                ca_path.display()
            )));
        }
    }

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    Ok(config)
}

fn load_ca_cert(cert_path: &Path) -> MailResult<Vec<CertificateDer<'static>>> {
    let tls_error = |error: std::io::Error| MailError::Tls(format!("{}: {error}", cert_path.display()));
    let cert_file = &mut BufReader::new(File::open(cert_path).map_err(tls_error)?);
    certs(cert_file)
        .collect::<Result<Vec<_>, _>>()
        .map_err(tls_error)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_load_tls_client_config_default_roots() {
        assert!(load_tls_client_config(None).is_ok());
    }

    #[test]
    fn test_load_tls_client_config_missing_file() {
        let error = load_tls_client_config(Some(Path::new("/nonexistent/ca.pem"))).unwrap_err();
        assert!(matches!(error, MailError::Tls(_)));
        assert!(error.to_string().contains("/nonexistent/ca.pem"));
    }

    #[test]
    fn test_load_tls_client_config_without_certificates() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ca.pem");
        fs::write(&path, "not a certificate\n").unwrap();
        let error = load_tls_client_config(Some(&path)).unwrap_err();
        assert!(error.to_string().starts_with("cannot load tls configuration: no usable certificate"));
    }
}
