use tonic::transport::{Channel, Endpoint};

use crate::error::ClientError;
use crate::shardkv::kv_store_client::KvStoreClient;
use crate::transport::KvTransport;

/// Fixed set of connections per destination host. Keys are routed to hosts
/// by id, and each host's connections are handed out round robin so no single
/// socket carries a whole batch.
#[derive(Debug, Clone)]
pub struct ConnectionPool<T> {
    hosts: Vec<Vec<T>>,
    cursors: Vec<usize>,
}

impl<T: KvTransport> ConnectionPool<T> {
    pub fn new(hosts: Vec<Vec<T>>) -> Result<Self, ClientError> {
        if hosts.is_empty() {
            return Err(ClientError::InvalidConfig(
                "at least one host is required".to_string(),
            ));
        }
        if let Some(host) = hosts.iter().position(|conns| conns.is_empty()) {
            return Err(ClientError::InvalidConfig(format!(
                "host {} has no connections",
                host
            )));
        }
        let cursors = vec![0; hosts.len()];
        Ok(Self { hosts, cursors })
    }

    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    pub fn connections_per_host(&self, host: usize) -> usize {
        self.hosts[host].len()
    }

    pub fn host_of(&self, key_id: u64) -> usize {
        (key_id % self.hosts.len() as u64) as usize
    }

    pub fn next(&mut self, host: usize) -> &mut T {
        let conns = &mut self.hosts[host];
        let index = self.cursors[host] % conns.len();
        self.cursors[host] = index + 1;
        &mut conns[index]
    }
}

impl ConnectionPool<KvStoreClient<Channel>> {
    /// Dials `per_host` independent connections to every host.
    pub async fn connect(hosts: &[String], per_host: usize) -> Result<Self, ClientError> {
        if per_host == 0 {
            return Err(ClientError::InvalidConfig(
                "connections per host must be greater than 0".to_string(),
            ));
        }

        let mut pool = Vec::with_capacity(hosts.len());
        for host in hosts {
            let endpoint = Endpoint::from_shared(endpoint_uri(host))
                .map_err(|_| ClientError::InvalidUri(host.clone()))?
                .tcp_nodelay(true);
            let mut conns = Vec::with_capacity(per_host);
            for _ in 0..per_host {
                // each connect() opens its own HTTP/2 connection
                let channel = endpoint.connect().await?;
                conns.push(KvStoreClient::new(channel));
            }
            tracing::debug!("Connected {} channels to {}", per_host, host);
            pool.push(conns);
        }
        Self::new(pool)
    }
}

pub fn endpoint_uri(host: &str) -> String {
    if host.contains("://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    }
}
