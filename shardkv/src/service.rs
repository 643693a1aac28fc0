use std::{future::Future, sync::Arc};

use key_value::Key;
use stats::OpCounters;
use store::{KvBackend, Store};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::{Request, Response, Status, transport::Server};

use crate::error::ServerError;
use crate::shardkv::kv_store_server::{KvStore, KvStoreServer};
use crate::shardkv::*;

/// gRPC front for a [`Store`]. Every call bumps the shared counters before
/// touching the store.
#[derive(Debug, Clone)]
pub struct KvStoreService {
    store: Arc<Store>,
    counters: Arc<OpCounters>,
}

impl KvStoreService {
    pub fn new(store: Arc<Store>, counters: Arc<OpCounters>) -> Self {
        Self { store, counters }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn counters(&self) -> &Arc<OpCounters> {
        &self.counters
    }
}

#[tonic::async_trait]
impl KvStore for KvStoreService {
    #[tracing::instrument(level = "trace", skip(self))]
    async fn get(&self, request: Request<GetRequest>) -> Result<Response<GetResponse>, Status> {
        self.counters.record_gets(1);
        let input = request.into_inner();

        let value = self.store.get(&input.key);
        tracing::trace!("Returning {} byte value", value.len());
        Ok(Response::new(GetResponse { value }))
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn put(&self, request: Request<PutRequest>) -> Result<Response<PutResponse>, Status> {
        self.counters.record_puts(1);
        let input = request.into_inner();

        self.store.put(input.key, input.value);
        Ok(Response::new(PutResponse {}))
    }

    #[tracing::instrument(level = "trace", skip_all, fields(keys = tracing::field::Empty))]
    async fn batch_get(
        &self,
        request: Request<BatchGetRequest>,
    ) -> Result<Response<BatchGetResponse>, Status> {
        let keys: Vec<Key> = request
            .into_inner()
            .requests
            .into_iter()
            .map(|get| get.key)
            .collect();
        tracing::Span::current().record("keys", keys.len());
        self.counters.record_gets(keys.len() as u64);

        let responses = self
            .store
            .batch_get(&keys)
            .into_iter()
            .map(|value| GetResponse { value })
            .collect();
        Ok(Response::new(BatchGetResponse { responses }))
    }
}

/// Serves `service` plus gRPC reflection on an already bound listener until
/// `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    service: KvStoreService,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send,
{
    let reflection_service = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(crate::shardkv::FILE_DESCRIPTOR_SET)
        .build_v1()?;

    tracing::info!(
        "Starting shardkv gRPC server on socket address: {}",
        listener.local_addr()?
    );
    Server::builder()
        .add_service(KvStoreServer::new(service))
        .add_service(reflection_service)
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await?;

    Ok(())
}
