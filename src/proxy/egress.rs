//! Egress policy (C9): refuse to fetch URLs that resolve to local/private
//! addresses unless explicitly allowed.
//!
//! Grounded on `utils.ParseURLIsLocalIP` + the `settings.AllowProxyToLocal`
//! check in `synctv`'s `utils/proxy/proxy.go`. DNS-rebinding defense (racing
//! the resolved IP against the IP actually connected to) is out of scope, as
//! in the source.

use std::net::IpAddr;

use tokio::net::lookup_host;

use crate::errors::{AppError, AppResult};

/// Returns `Ok(())` if `url` is allowed to be fetched given `allow_local`,
/// `Err(AppError::Forbidden)` otherwise.
pub async fn check_egress(url: &url::Url, allow_local: bool) -> AppResult<()> {
    if allow_local {
        return Ok(());
    }

    let host = url
        .host_str()
        .ok_or_else(|| AppError::bad_request("url has no host"))?;
    let port = url.port_or_known_default().unwrap_or(80);

    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_disallowed(ip) {
            return Err(AppError::forbidden(format!(
                "egress to local/private address denied: {host}"
            )));
        }
        return Ok(());
    }

    let addrs = lookup_host((host, port))
        .await
        .map_err(|e| AppError::upstream(format!("dns lookup failed for {host}: {e}")))?;

    for addr in addrs {
        if is_disallowed(addr.ip()) {
            return Err(AppError::forbidden(format!(
                "egress to local/private address denied: {host} resolved to {}",
                addr.ip()
            )));
        }
    }

    Ok(())
}

fn is_disallowed(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                || v6.is_unique_local()
                || v6.is_unicast_link_local()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_when_flag_set() {
        let url = url::Url::parse("http://127.0.0.1/x").unwrap();
        assert!(check_egress(&url, true).await.is_ok());
    }

    #[tokio::test]
    async fn rejects_loopback_literal() {
        let url = url::Url::parse("http://127.0.0.1/x").unwrap();
        assert!(check_egress(&url, false).await.is_err());
    }

    #[tokio::test]
    async fn rejects_private_literal() {
        let url = url::Url::parse("http://10.0.0.5/x").unwrap();
        assert!(check_egress(&url, false).await.is_err());
    }

    #[tokio::test]
    async fn rejects_unspecified_literal() {
        let url = url::Url::parse("http://0.0.0.0/x").unwrap();
        assert!(check_egress(&url, false).await.is_err());
    }

    #[test]
    fn disallowed_ip_classification() {
        assert!(is_disallowed("127.0.0.1".parse().unwrap()));
        assert!(is_disallowed("192.168.1.1".parse().unwrap()));
        assert!(is_disallowed("169.254.1.1".parse().unwrap()));
        assert!(!is_disallowed("8.8.8.8".parse().unwrap()));
    }
}
