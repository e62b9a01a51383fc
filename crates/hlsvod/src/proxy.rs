use std::fmt;
use std::str::FromStr;

use reqwest::Proxy;

use crate::VodError;

/// Which traffic a proxy applies to
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum ProxyType {
    Http,
    Https,
    /// SOCKS5, with DNS resolved on the client side
    Socks5,
    /// Every scheme through one general-purpose proxy
    All,
}

impl FromStr for ProxyType {
    type Err = VodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(ProxyType::Http),
            "https" => Ok(ProxyType::Https),
            "socks5" | "socks" => Ok(ProxyType::Socks5),
            "all" => Ok(ProxyType::All),
            other => Err(VodError::Configuration(format!(
                "unknown proxy type '{other}' (expected http, https, socks5 or all)"
            ))),
        }
    }
}

impl fmt::Display for ProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProxyType::Http => "http",
            ProxyType::Https => "https",
            ProxyType::Socks5 => "socks5",
            ProxyType::All => "all",
        };
        f.write_str(name)
    }
}

/// Basic credentials for the proxy
#[derive(Clone)]
pub struct ProxyAuth {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for ProxyAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyAuth")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Proxy server URL (e.g. "http://proxy.example.com:8080")
    pub url: String,
    pub proxy_type: ProxyType,
    pub auth: Option<ProxyAuth>,
}

/// Build a reqwest Proxy from the configuration
pub fn build_proxy_from_config(config: &ProxyConfig) -> Result<Proxy, VodError> {
    let proxy_url = &config.url;
    let invalid = |kind: &str, e: reqwest::Error| {
        VodError::Configuration(format!("invalid {kind} proxy URL '{proxy_url}': {e}"))
    };

    let mut proxy = match config.proxy_type {
        ProxyType::Http => Proxy::http(proxy_url).map_err(|e| invalid("HTTP", e))?,
        ProxyType::Https => Proxy::https(proxy_url).map_err(|e| invalid("HTTPS", e))?,
        ProxyType::Socks5 => {
            let url = if proxy_url.starts_with("socks5://") || proxy_url.starts_with("socks5h://")
            {
                proxy_url.to_string()
            } else {
                format!("socks5://{proxy_url}")
            };
            Proxy::all(&url).map_err(|e| invalid("SOCKS5", e))?
        }
        ProxyType::All => Proxy::all(proxy_url).map_err(|e| invalid("general", e))?,
    };

    if let Some(auth) = &config.auth {
        proxy = proxy.basic_auth(&auth.username, &auth.password);
    }

    Ok(proxy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_type_parsing() {
        assert_eq!("HTTP".parse::<ProxyType>().unwrap(), ProxyType::Http);
        assert_eq!("socks".parse::<ProxyType>().unwrap(), ProxyType::Socks5);
        assert!("ftp".parse::<ProxyType>().is_err());
    }

    #[test]
    fn test_build_socks5_without_scheme() {
        let config = ProxyConfig {
            url: "127.0.0.1:1080".to_string(),
            proxy_type: ProxyType::Socks5,
            auth: None,
        };
        assert!(build_proxy_from_config(&config).is_ok());
    }

    #[test]
    fn test_auth_password_is_redacted() {
        let auth = ProxyAuth {
            username: "user".to_string(),
            password: "hunter2".to_string(),
        };
        let printed = format!("{auth:?}");
        assert!(printed.contains("user"));
        assert!(!printed.contains("hunter2"));
    }
}
