//! CA bundle verification

use x509_parser::parse_x509_certificate;

use crate::error::ConfigError;

const CERTIFICATE_PEM_TAG: &str = "CERTIFICATE";

/// Verify that `ca_bundle` starts with a PEM `CERTIFICATE` block holding a
/// well-formed X.509 certificate. Returns the certificate subject.
pub fn verify_ca_bundle(ca_bundle: &[u8]) -> Result<String, ConfigError> {
    let block = pem::parse(ca_bundle)
        .map_err(|e| verify_error(format!("could not decode pem: {}", e)))?;

    if block.tag() != CERTIFICATE_PEM_TAG {
        return Err(verify_error(format!(
            "cert contains wrong pem type: {:?}",
            block.tag()
        )));
    }

    let (rest, cert) = parse_x509_certificate(block.contents())
        .map_err(|e| verify_error(format!("cert contains invalid x509 certificate: {}", e)))?;
    if !rest.is_empty() {
        return Err(verify_error(
            "cert contains invalid x509 certificate: trailing data".to_string(),
        ));
    }

    Ok(cert.subject().to_string())
}

fn verify_error(message: String) -> ConfigError {
    ConfigError::new(ConfigError::VERIFY_CA_BUNDLE, message)
}
