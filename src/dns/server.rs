use crate::config::SharedConfig;
use crate::dns::challenge::ChallengeTable;
use crate::dns::handlers::Handler;
use std::sync::Arc;
use tokio::net::{TcpListener, UdpSocket};
use trust_dns_server::ServerFuture;

pub async fn new(
    config: SharedConfig,
    table: Arc<ChallengeTable>,
) -> anyhow::Result<ServerFuture<Handler>> {
    let handler = Handler::new(config.zone()?, config.ns_name()?, table)?;
    let mut dns_server = ServerFuture::new(handler);
    dns_server.register_socket(UdpSocket::bind(config.dns.listen).await?);
    dns_server.register_listener(
        TcpListener::bind(config.dns.listen).await?,
        config.dns.tcp_timeout,
    );
    Ok(dns_server)
}
