//! In-memory collaborators for tests.

use async_trait::async_trait;
use dockyard_core::build::{BuildOptions, BuildpackBuilder, ImageAgent};
use dockyard_core::deployer::{Notifier, NotifyTarget};
use dockyard_core::release::{
    ArchiveUrl, GitSourceConfig, ReleaseApi, ReleaseDescriptor, ReleaseWebhook,
};
use dockyard_core::{Error, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Image store standing in for both the Docker daemon and the `pack` CLI.
///
/// References map to image ids. Every operation is appended to `ops`.
#[derive(Default)]
pub struct FakeImages {
    pub local: Mutex<HashMap<String, u32>>,
    pub registry: Mutex<HashMap<String, u32>>,
    pub ops: Mutex<Vec<String>>,
    pub pull_error: Mutex<Option<Error>>,
    pub build_delay: Option<Duration>,
    pub next_id: Mutex<u32>,
}

impl FakeImages {
    pub fn with_registry_image(self, image: &str) -> Self {
        let id = self.new_id();
        self.registry.lock().unwrap().insert(image.to_string(), id);
        self
    }

    pub fn has_local(&self, image: &str) -> bool {
        self.local.lock().unwrap().contains_key(image)
    }

    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    fn new_id(&self) -> u32 {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        *next
    }

    fn record(&self, op: String) {
        self.ops.lock().unwrap().push(op);
    }

    async fn produce(&self, image: String) {
        self.record(format!("build {}", image));
        if let Some(delay) = self.build_delay {
            tokio::time::sleep(delay).await;
        }
        let id = self.new_id();
        self.local.lock().unwrap().insert(image, id);
    }
}

#[async_trait]
impl ImageAgent for FakeImages {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn build_local(&self, opts: BuildOptions, dockerfile: &Path) -> Result<()> {
        self.record(format!("dockerfile {}", dockerfile.display()));
        self.produce(opts.image_ref()).await;
        Ok(())
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        self.record(format!("pull {}", image));
        if let Some(err) = self.pull_error.lock().unwrap().take() {
            return Err(err);
        }
        let id = self
            .registry
            .lock()
            .unwrap()
            .get(image)
            .copied()
            .ok_or_else(|| Error::ImageNotFound(image.to_string()))?;
        self.local.lock().unwrap().insert(image.to_string(), id);
        Ok(())
    }

    async fn tag_image(&self, source: &str, target: &str) -> Result<()> {
        self.record(format!("tag {} {}", source, target));
        let mut local = self.local.lock().unwrap();
        let id = local
            .get(source)
            .copied()
            .ok_or_else(|| Error::ImageNotFound(source.to_string()))?;
        local.insert(target.to_string(), id);
        Ok(())
    }

    async fn untag_image(&self, image: &str) -> Result<()> {
        self.record(format!("untag {}", image));
        self.local
            .lock()
            .unwrap()
            .remove(image)
            .map(|_| ())
            .ok_or_else(|| Error::ImageNotFound(image.to_string()))
    }

    async fn push_image(&self, image: &str) -> Result<()> {
        self.record(format!("push {}", image));
        let id = self
            .local
            .lock()
            .unwrap()
            .get(image)
            .copied()
            .ok_or_else(|| Error::PushFailed(format!("no such image: {}", image)))?;
        self.registry.lock().unwrap().insert(image.to_string(), id);
        Ok(())
    }
}

#[async_trait]
impl BuildpackBuilder for FakeImages {
    fn name(&self) -> &'static str {
        "fake-pack"
    }

    async fn build(&self, opts: BuildOptions) -> Result<()> {
        let env: Vec<String> = opts.env.keys().cloned().collect();
        self.record(format!("pack env {}", env.join(",")));
        self.produce(opts.image_ref()).await;
        Ok(())
    }
}

/// Release API serving a fixed archive location, or none at all.
#[derive(Default)]
pub struct FakeApi {
    pub archive: Option<ArchiveUrl>,
}

impl FakeApi {
    pub fn with_archive(url: String, latest_commit_sha: &str) -> Self {
        Self {
            archive: Some(ArchiveUrl {
                url,
                latest_commit_sha: latest_commit_sha.to_string(),
            }),
        }
    }
}

#[async_trait]
impl ReleaseApi for FakeApi {
    async fn get_release(
        &self,
        _project_id: u64,
        _cluster_id: u64,
        _namespace: &str,
        name: &str,
    ) -> Result<ReleaseDescriptor> {
        Err(Error::NotFound(name.to_string()))
    }

    async fn get_repo_archive_url(
        &self,
        _project_id: u64,
        git_source: &GitSourceConfig,
    ) -> Result<ArchiveUrl> {
        self.archive.clone().ok_or_else(|| {
            Error::Transport(format!("no archive for {}", git_source.git_repo))
        })
    }

    async fn get_release_webhook(
        &self,
        _project_id: u64,
        _cluster_id: u64,
        name: &str,
        _namespace: &str,
    ) -> Result<ReleaseWebhook> {
        Err(Error::NotFound(name.to_string()))
    }

    async fn deploy_with_webhook(&self, _webhook_token: &str, _tag: &str) -> Result<()> {
        Ok(())
    }
}

/// Notifier recording requested rollouts.
#[derive(Default)]
pub struct FakeNotifier {
    pub notified: Mutex<Vec<(NotifyTarget, String)>>,
}

#[async_trait]
impl Notifier for FakeNotifier {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn notify(&self, target: &NotifyTarget, tag: &str) -> Result<()> {
        self.notified
            .lock()
            .unwrap()
            .push((target.clone(), tag.to_string()));
        Ok(())
    }
}

/// Gzip-compressed tarball holding `files`.
pub fn tarball(files: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, content.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Serve `body` to a single HTTP request on a local port and return its URL.
pub async fn serve_once(body: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();

        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }

        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/gzip\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        stream.write_all(head.as_bytes()).await.unwrap();
        stream.write_all(&body).await.unwrap();
        stream.shutdown().await.unwrap();
    });

    format!("http://{}/acme/web/tarball", addr)
}
