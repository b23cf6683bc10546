//! Test server wrapper that starts Keel on a random port

use std::net::SocketAddr;

use keel_server::{Builder, Server, ServerHandle};

use super::routes;

/// A running test server instance
pub struct TestServer {
    server: Server,
    addr: SocketAddr,
    client: reqwest::Client,
}

impl TestServer {
    /// Builder bound to loopback on an ephemeral port, with the test routes registered
    pub fn builder() -> Builder {
        Builder::new()
            .host("127.0.0.1")
            .port(0)
            .stop_at_shutdown(false)
            .register(routes::router())
    }

    /// Start a test server from the default test builder
    pub async fn start_default() -> anyhow::Result<Self> {
        Self::start(Self::builder()).await
    }

    /// Build and start a server
    pub async fn start(builder: Builder) -> anyhow::Result<Self> {
        let mut server = builder.build()?;
        let addr = server.start().await?;

        // No gzip feature on the client, so encodings stay visible
        let client = reqwest::Client::builder().build()?;

        Ok(Self { server, addr, client })
    }

    /// URL of `path` on the running test server
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    pub fn handle(&self) -> ServerHandle {
        self.server.handle()
    }

    /// Wait for the server to stop
    pub async fn wait(&mut self) -> anyhow::Result<()> {
        self.server.wait().await
    }
}
