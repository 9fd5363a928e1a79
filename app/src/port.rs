use std::future::Future;
use std::net::IpAddr;

use crate::switch::SwitchError;

/// Device discovery and on/off control of a network switch.
pub trait SwitchDriver: Send + Sync + 'static {
    /// Resolves a configured address to a network address. Literal IPs pass through, anything
    /// else goes through DNS.
    fn resolve(&self, address: &str) -> impl Future<Output = Result<IpAddr, SwitchError>> + Send {
        let address = address.to_owned();
        async move { resolve_address(&address).await }
    }

    /// Raw binary-state code of the device, see [`crate::switch::SwitchState::from_raw`].
    fn query(&self, address: &str, ip: IpAddr) -> impl Future<Output = anyhow::Result<i32>> + Send;

    fn switch(&self, address: &str, ip: IpAddr, on: bool) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// The printer-control application hosting the switches: connection handling, print status
/// and the operating system shell for auxiliary commands.
pub trait PrinterHost: Send + Sync + 'static {
    fn is_printing(&self) -> bool;

    fn connect(&self) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn disconnect(&self) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn run_system_command(&self, command: &str) -> impl Future<Output = anyhow::Result<()>> + Send;
}

pub async fn resolve_address(address: &str) -> Result<IpAddr, SwitchError> {
    if let Ok(ip) = address.parse::<IpAddr>() {
        tracing::debug!("IP {} is valid", address);
        return Ok(ip);
    }

    tracing::debug!("Invalid IP {}, trying hostname", address);

    match tokio::net::lookup_host((address, 0)).await {
        Ok(mut addrs) => match addrs.next() {
            Some(addr) => {
                tracing::debug!("Hostname {} resolved to {}", address, addr.ip());
                Ok(addr.ip())
            }
            None => {
                tracing::debug!("Hostname {} resolved to no address", address);
                Err(SwitchError::unreachable(address))
            }
        },
        Err(e) => {
            tracing::debug!("Invalid hostname {}: {}", address, e);
            Err(SwitchError::unreachable(address))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn literal_ip_resolves_without_lookup() {
        assert_eq!(resolve_address("10.0.0.5").await, Ok("10.0.0.5".parse().unwrap()));
        assert_eq!(resolve_address("::1").await, Ok("::1".parse().unwrap()));
    }

    #[tokio::test]
    async fn malformed_hostname_is_unreachable() {
        assert_eq!(
            resolve_address("not a host").await,
            Err(SwitchError::unreachable("not a host"))
        );
    }
}
