use key_value::{Key, Value};
use tonic::{Request, Status, transport::Channel};

use crate::service::KvStoreService;
use crate::shardkv::kv_store_client::KvStoreClient;
use crate::shardkv::kv_store_server::KvStore;
use crate::shardkv::{BatchGetRequest, GetRequest, PutRequest};

/// One connection's worth of the key-value RPC surface. Clones share the
/// underlying connection.
#[tonic::async_trait]
pub trait KvTransport: Clone + Send + 'static {
    async fn get(&mut self, key: Key) -> Result<Value, Status>;
    async fn put(&mut self, key: Key, value: Value) -> Result<(), Status>;
    async fn batch_get(&mut self, keys: Vec<Key>) -> Result<Vec<Value>, Status>;
}

fn batch_request(keys: Vec<Key>) -> BatchGetRequest {
    BatchGetRequest {
        requests: keys.into_iter().map(|key| GetRequest { key }).collect(),
    }
}

#[tonic::async_trait]
impl KvTransport for KvStoreClient<Channel> {
    async fn get(&mut self, key: Key) -> Result<Value, Status> {
        let response = KvStoreClient::get(self, Request::new(GetRequest { key })).await?;
        Ok(response.into_inner().value)
    }

    async fn put(&mut self, key: Key, value: Value) -> Result<(), Status> {
        KvStoreClient::put(self, Request::new(PutRequest { key, value })).await?;
        Ok(())
    }

    async fn batch_get(&mut self, keys: Vec<Key>) -> Result<Vec<Value>, Status> {
        let response = KvStoreClient::batch_get(self, Request::new(batch_request(keys))).await?;
        Ok(response
            .into_inner()
            .responses
            .into_iter()
            .map(|get| get.value)
            .collect())
    }
}

/// Calls straight into an in-process service, skipping the network.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    service: KvStoreService,
}

impl LocalTransport {
    pub fn new(service: KvStoreService) -> Self {
        Self { service }
    }
}

#[tonic::async_trait]
impl KvTransport for LocalTransport {
    async fn get(&mut self, key: Key) -> Result<Value, Status> {
        let response = KvStore::get(&self.service, Request::new(GetRequest { key })).await?;
        Ok(response.into_inner().value)
    }

    async fn put(&mut self, key: Key, value: Value) -> Result<(), Status> {
        KvStore::put(&self.service, Request::new(PutRequest { key, value })).await?;
        Ok(())
    }

    async fn batch_get(&mut self, keys: Vec<Key>) -> Result<Vec<Value>, Status> {
        let response =
            KvStore::batch_get(&self.service, Request::new(batch_request(keys))).await?;
        Ok(response
            .into_inner()
            .responses
            .into_iter()
            .map(|get| get.value)
            .collect())
    }
}
