//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use queue_gateway::broker::{Broker, InMemoryBroker, MicroserviceBinding};
use queue_gateway::config::parse_config;
use queue_gateway::gateway::ConsumerState;
use queue_gateway::{Gateway, GatewayHandle, Microservice, Shutdown};

/// A gateway serving on an ephemeral port against an in-memory broker.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub broker: InMemoryBroker,
    pub handle: GatewayHandle,
    pub shutdown: Shutdown,
}

#[allow(dead_code)]
impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn binding(&self, name: &str) -> MicroserviceBinding {
        let broker: Arc<dyn Broker> = Arc::new(self.broker.clone());
        MicroserviceBinding::new(name, broker)
    }

    /// Run `service` until the gateway shuts down.
    pub fn spawn_service(&self, service: Microservice) {
        let rx = self.shutdown.subscribe();
        tokio::spawn(async move {
            service.run(rx).await.unwrap();
        });
    }

    pub fn spawn_echo(&self, name: &str) {
        self.spawn_service(Microservice::echo(self.binding(name)));
    }
}

/// Build a gateway from TOML, let `customize` add routes, then serve it.
pub async fn start_gateway<F>(config: &str, customize: F) -> TestGateway
where
    F: FnOnce(&mut Gateway),
{
    let config = parse_config(config).unwrap();
    let broker = InMemoryBroker::new();
    let shutdown = Shutdown::new();

    let mut gateway = Gateway::from_config(&config, Arc::new(broker.clone()), shutdown.clone());
    customize(&mut gateway);
    let handle = gateway.handle();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        gateway.listen(listener).await.unwrap();
    });

    wait_for(|| handle.consumer_state() == ConsumerState::Ready).await;

    TestGateway {
        addr,
        broker,
        handle,
        shutdown,
    }
}

/// Poll `check` until it holds, failing the test after two seconds.
pub async fn wait_for(mut check: impl FnMut() -> bool) {
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within 2s");
}

/// Client without connection pooling so shutdown tests do not reuse sockets.
#[allow(dead_code)]
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}
