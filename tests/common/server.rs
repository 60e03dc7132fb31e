//! Test server management.
//!
//! [`TestServer`] runs the HTTP router in-process on an ephemeral port.
//! [`DaemonProcess`] spawns the real `bruteguard` binary with a generated config.

use bruteguard::http::{self, AppState};
use bruteguard::metrics;
use bruteguard::security::buckets::{BucketPolicy, BucketStore, Ceilings};
use bruteguard::security::{AdmissionPolicy, IpListStore};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;

static METRICS: Once = Once::new();

/// An in-process server instance.
pub struct TestServer {
    addr: SocketAddr,
    buckets: Arc<BucketStore>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<std::io::Result<()>>>,
}

impl TestServer {
    /// Spawn a server with in-memory lists and the given ceilings.
    pub async fn spawn(ceilings: Ceilings) -> anyhow::Result<Self> {
        Self::spawn_with_policy(BucketPolicy {
            ceilings,
            window: Duration::from_secs(60),
            sweep_interval: Duration::from_millis(500),
        })
        .await
    }

    pub async fn spawn_with_policy(policy: BucketPolicy) -> anyhow::Result<Self> {
        METRICS.call_once(metrics::init);

        let buckets = BucketStore::start(policy);
        let lists = Arc::new(IpListStore::in_memory());
        let admission = AdmissionPolicy::new(lists, buckets.clone());
        let app = http::router(AppState::new(admission, Duration::from_secs(2)), true);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(http::run_http_server(listener, app, async move {
            let _ = rx.await;
        }));

        Ok(Self {
            addr,
            buckets,
            shutdown: Some(tx),
            handle: Some(handle),
        })
    }

    /// Get the server address.
    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    /// Create a client for this server.
    pub fn client(&self) -> super::client::TestClient {
        super::client::TestClient::new(&self.address())
    }

    /// Direct access to the bucket store behind the API.
    pub fn buckets(&self) -> &Arc<BucketStore> {
        &self.buckets
    }

    /// Stop accepting requests, drain, and stop the sweeper.
    pub async fn stop(mut self) -> anyhow::Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.await??;
        }
        self.buckets.shutdown().await;
        Ok(())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// A spawned `bruteguard` process.
pub struct DaemonProcess {
    child: Child,
    port: u16,
}

impl DaemonProcess {
    /// Spawn the daemon with its config and SQLite file inside `data_dir`.
    ///
    /// `extra` is appended to the generated config.
    pub async fn spawn(data_dir: &Path, extra: &str) -> anyhow::Result<Self> {
        let port = free_port()?;
        let config_path = data_dir.join("bruteguard.toml");
        let config_content = format!(
            r#"
[http]
listen = "127.0.0.1:{}"

[database]
path = "{}"

[log]
level = "warn"
{}
"#,
            port,
            data_dir.join("lists.db").display(),
            extra
        );
        std::fs::write(&config_path, config_content)?;

        let binary_path = PathBuf::from(env!("CARGO_BIN_EXE_bruteguard"));
        let child = Command::new(&binary_path).arg(&config_path).spawn()?;

        let daemon = Self { child, port };
        daemon.wait_until_ready().await?;
        Ok(daemon)
    }

    /// Wait until the daemon is accepting connections.
    async fn wait_until_ready(&self) -> anyhow::Result<()> {
        for _ in 0..50 {
            if tokio::net::TcpStream::connect(("127.0.0.1", self.port))
                .await
                .is_ok()
            {
                return Ok(());
            }
            sleep(Duration::from_millis(100)).await;
        }
        anyhow::bail!("Daemon failed to start within 5 seconds")
    }

    pub fn address(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    pub fn client(&self) -> super::client::TestClient {
        super::client::TestClient::new(&self.address())
    }

    /// Ask the daemon to exit (SIGTERM on Unix) and wait for it.
    pub fn terminate(mut self) -> anyhow::Result<std::process::ExitStatus> {
        #[cfg(unix)]
        {
            let status = Command::new("kill")
                .arg("-TERM")
                .arg(self.child.id().to_string())
                .status()?;
            anyhow::ensure!(status.success(), "kill -TERM failed");
        }
        #[cfg(not(unix))]
        self.child.kill()?;

        Ok(self.child.wait()?)
    }
}

impl Drop for DaemonProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Reserve an ephemeral port number.
fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}
