//! TLS utilities for the HTTP client.
//!
//! Native root certificates are loaded once and cached, since OS certificate
//! store lookups can be slow on some platforms.

use rustls::DigitallySignedStruct;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use std::sync::{Arc, OnceLock};

/// Cached native root certificates.
/// Always stores Ok; empty vec means no certs found (warned, not errored).
static NATIVE_ROOTS_CACHE: OnceLock<Vec<CertificateDer<'static>>> = OnceLock::new();

#[cfg(test)]
static LOAD_COUNT: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);

fn load_native_certs_inner() -> Vec<CertificateDer<'static>> {
    #[cfg(test)]
    LOAD_COUNT.fetch_add(1, std::sync::atomic::Ordering::SeqCst);

    let result = rustls_native_certs::load_native_certs();

    for err in &result.errors {
        tracing::warn!(error = %err, "error loading native root certificate");
    }

    let certs: Vec<CertificateDer<'static>> = result.certs;

    if certs.is_empty() {
        tracing::warn!("no native root CA certificates found");
    } else {
        tracing::debug!(count = certs.len(), "loaded native root certificates");
    }

    certs
}

/// Get cached native root certificates (may be empty).
pub fn native_root_certs() -> &'static [CertificateDer<'static>] {
    NATIVE_ROOTS_CACHE
        .get_or_init(load_native_certs_inner)
        .as_slice()
}

/// Get the crypto provider for TLS connections.
///
/// Uses the process-wide default provider when one is installed, otherwise an
/// aws-lc-rs provider that is not installed globally.
pub fn get_crypto_provider() -> Arc<CryptoProvider> {
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

/// Build a rustls `ClientConfig` using the cached native root certificates.
///
/// # Errors
///
/// Returns an error if no valid root certificates are available, either
/// because the OS store is empty or because none of its certificates parse.
pub fn native_roots_client_config() -> Result<rustls::ClientConfig, String> {
    let certs = native_root_certs();

    if certs.is_empty() {
        return Err("no native root CA certificates found in OS certificate store".to_owned());
    }

    let mut root_store = rustls::RootCertStore::empty();
    let (added, ignored) = root_store.add_parsable_certificates(certs.iter().cloned());

    if ignored > 0 {
        tracing::warn!(
            added = added,
            ignored = ignored,
            "some native root certificates could not be parsed"
        );
    }

    if added == 0 {
        return Err(format!(
            "no valid native root CA certificates parsed (found {}, all {} failed to parse)",
            certs.len(),
            ignored
        ));
    }

    let config = rustls::ClientConfig::builder_with_provider(get_crypto_provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| format!("failed to set TLS protocol versions: {e}"))?
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(config)
}

/// Build a rustls `ClientConfig` that accepts any server certificate.
///
/// Handshake signatures are still checked against the presented certificate;
/// only chain and hostname validation are skipped.
///
/// # Errors
///
/// Returns an error if the crypto provider rejects the default protocol versions.
pub fn insecure_client_config() -> Result<rustls::ClientConfig, String> {
    let provider = get_crypto_provider();
    let verifier = AcceptAnyServerCert {
        provider: Arc::clone(&provider),
    };

    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| format!("failed to set TLS protocol versions: {e}"))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();

    Ok(config)
}

/// Certificate verifier used when server verification is switched off
#[derive(Debug)]
struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    /// Verifies "at most one load": the counter is global, so another test may
    /// already have initialized the cache.
    #[test]
    fn test_native_roots_cached() {
        let initial_count = LOAD_COUNT.load(Ordering::SeqCst);

        let result1 = native_root_certs();
        let result2 = native_root_certs();

        let final_count = LOAD_COUNT.load(Ordering::SeqCst);
        assert!(final_count <= initial_count + 1);
        assert!(std::ptr::eq(result1, result2), "should return same slice");
    }

    #[test]
    fn test_native_roots_client_config_does_not_panic() {
        // CI containers may have no OS certs, so only the absence of a panic is checked
        if let Err(e) = native_roots_client_config() {
            tracing::debug!(error = %e, "native_roots_client_config failed");
        }
    }

    #[test]
    fn test_insecure_client_config_accepts_any_certificate() {
        assert!(insecure_client_config().is_ok());

        let verifier = AcceptAnyServerCert {
            provider: get_crypto_provider(),
        };
        let cert = CertificateDer::from(vec![0u8; 16]);
        let name = ServerName::try_from("registry.invalid").unwrap();
        let verified = verifier.verify_server_cert(&cert, &[], &name, &[], UnixTime::now());
        assert!(verified.is_ok());
        assert!(!verifier.supported_verify_schemes().is_empty());
    }
}
