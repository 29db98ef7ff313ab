// Server stats fan-out
// One probe task per server, collected until a cancellable deadline

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

use batata_common::{ServerInfo, ServerStats, StatsProbe};

use crate::signal::StopReceiver;

/// Point in time after which outstanding probes are abandoned, optionally
/// cut short by a stop signal
pub struct Deadline {
    at: Instant,
    cancel: StopReceiver,
}

impl Deadline {
    pub fn at(at: Instant) -> Self {
        Self {
            at,
            cancel: StopReceiver::never(),
        }
    }

    pub fn after(timeout: Duration) -> Self {
        Self::at(Instant::now() + timeout)
    }

    pub fn with_cancel(mut self, cancel: StopReceiver) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Probe every server concurrently and return the stats that arrived in time.
///
/// A failed or late probe leaves no entry for its server. Probes still running
/// when the deadline passes are aborted.
pub async fn fetch_stats(
    probe: Arc<dyn StatsProbe>,
    servers: Vec<ServerInfo>,
    mut deadline: Deadline,
) -> HashMap<String, ServerStats> {
    let mut probes = JoinSet::new();
    for server in servers {
        let probe = probe.clone();
        probes.spawn(async move {
            let result = probe.probe(&server).await;
            (server, result)
        });
    }

    let mut stats = HashMap::new();
    let expired = tokio::time::sleep_until(deadline.at);
    tokio::pin!(expired);

    loop {
        tokio::select! {
            joined = probes.join_next() => match joined {
                None => break,
                Some(Ok((server, Ok(server_stats)))) => {
                    stats.insert(server.id, server_stats);
                }
                Some(Ok((server, Err(e)))) => {
                    warn!(id = %server.id, addr = %server.addr, "Failed to fetch server stats: {}", e);
                }
                Some(Err(e)) => {
                    warn!("Server stats probe task failed: {}", e);
                }
            },
            _ = &mut expired => {
                debug!(pending = probes.len(), "Server stats deadline reached");
                break;
            }
            _ = deadline.cancel.stopped() => {
                debug!(pending = probes.len(), "Server stats fetch cancelled");
                break;
            }
        }
    }

    probes.abort_all();
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    use batata_common::{BuildVersion, MemberStatus};

    use crate::signal::StopSignal;

    struct FixedProbe;

    #[async_trait::async_trait]
    impl StatsProbe for FixedProbe {
        async fn probe(&self, server: &ServerInfo) -> anyhow::Result<ServerStats> {
            match server.id.as_str() {
                "hung" => std::future::pending().await,
                "broken" => Err(anyhow::anyhow!("connection refused")),
                _ => Ok(ServerStats {
                    last_contact: Duration::from_millis(3),
                    last_term: 2,
                    last_index: 42,
                }),
            }
        }
    }

    fn server(id: &str) -> ServerInfo {
        ServerInfo {
            id: id.to_string(),
            name: format!("node-{}", id),
            addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8300),
            build: BuildVersion::new(1, 9, 3),
            status: MemberStatus::Alive,
        }
    }

    #[tokio::test]
    async fn test_all_probes_finish_before_deadline() {
        let started = Instant::now();
        let stats = fetch_stats(
            Arc::new(FixedProbe),
            vec![server("a"), server("b")],
            Deadline::after(Duration::from_secs(5)),
        )
        .await;

        assert_eq!(stats.len(), 2);
        assert_eq!(stats["a"].last_index, 42);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_hung_and_failed_probes_are_absent() {
        let started = Instant::now();
        let stats = fetch_stats(
            Arc::new(FixedProbe),
            vec![server("a"), server("hung"), server("broken"), server("b")],
            Deadline::after(Duration::from_millis(200)),
        )
        .await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(stats.len(), 2);
        assert!(stats.contains_key("a"));
        assert!(stats.contains_key("b"));
        assert!(!stats.contains_key("hung"));
    }

    #[tokio::test]
    async fn test_cancel_returns_early() {
        let signal = StopSignal::new();
        let deadline = Deadline::after(Duration::from_secs(30)).with_cancel(signal.subscribe());

        let handle = tokio::spawn(fetch_stats(
            Arc::new(FixedProbe),
            vec![server("hung")],
            deadline,
        ));
        tokio::time::sleep(Duration::from_millis(20)).await;
        signal.stop();

        let stats = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("fetch should return after cancel")
            .unwrap();
        assert!(stats.is_empty());
    }

    #[tokio::test]
    async fn test_no_servers() {
        let stats = fetch_stats(
            Arc::new(FixedProbe),
            Vec::new(),
            Deadline::after(Duration::from_secs(1)),
        )
        .await;
        assert!(stats.is_empty());
    }
}
