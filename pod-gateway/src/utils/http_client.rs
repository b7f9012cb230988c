use std::path::Path;
use std::{sync::OnceLock, time::Duration};

use tracing::{debug, info};

use crate::error::{Error, Result};

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Safe to ignore: can happen if another crate installed it first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Build a `reqwest::Client` for backend calls.
///
/// `root_ca` points at a PEM file with an extra trusted root, for backends
/// whose certificates chain to a private CA.
pub fn build_client(request_timeout: Duration, root_ca: Option<&Path>) -> Result<reqwest::Client> {
    install_rustls_provider();

    let mut builder = reqwest::Client::builder()
        .user_agent(concat!("pod-gateway/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10));

    if request_timeout > Duration::ZERO {
        builder = builder.timeout(request_timeout);
    }

    if let Some(path) = root_ca {
        let pem = std::fs::read(path)?;
        let certificate = reqwest::Certificate::from_pem(&pem).map_err(|e| {
            Error::config(format!("Invalid root CA PEM at {}: {}", path.display(), e))
        })?;
        builder = builder.add_root_certificate(certificate);
        info!(path = %path.display(), "Trusting additional root CA");
    }

    Ok(builder.build()?)
}
