use reqwest::Client;
use tracing::{debug, info, warn};

use crate::{DownloaderConfig, VodError, proxy::build_proxy_from_config};

/// Create a reqwest Client with the provided configuration.
///
/// Timeouts are applied per request (playlist and segment budgets differ),
/// so only the connect timeout is set here.
pub fn create_client(config: &DownloaderConfig) -> Result<Client, VodError> {
    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .user_agent(&config.user_agent)
        .default_headers(config.headers.clone())
        .use_rustls_tls()
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    if config.danger_accept_invalid_certs {
        warn!("TLS certificate verification is disabled");
        client_builder = client_builder.danger_accept_invalid_certs(true);
    }

    if let Some(proxy_config) = &config.proxy {
        // Explicit proxy configuration takes precedence
        let proxy = build_proxy_from_config(proxy_config)?;
        client_builder = client_builder.proxy(proxy);
        info!(proxy_url = %proxy_config.url, proxy_type = %proxy_config.proxy_type, "Using explicitly configured proxy");
    } else if config.use_system_proxy {
        // reqwest picks up system proxy settings unless no_proxy() is called
        debug!("Using system proxy settings");
    } else {
        client_builder = client_builder.no_proxy();
        debug!("Proxy disabled");
    }

    client_builder
        .build()
        .map_err(|e| VodError::Configuration(format!("failed to build HTTP client: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::{ProxyConfig, ProxyType};

    #[test]
    fn test_create_client_with_defaults() {
        assert!(create_client(&DownloaderConfig::default()).is_ok());
    }

    #[test]
    fn test_invalid_proxy_is_configuration_error() {
        let config = DownloaderConfig::builder()
            .with_proxy(ProxyConfig {
                url: "http://[::1".to_string(),
                proxy_type: ProxyType::All,
                auth: None,
            })
            .build();
        let err = create_client(&config).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
    }
}
