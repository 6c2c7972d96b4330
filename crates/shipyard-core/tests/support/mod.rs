#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use shipyard_core::config::Settings;
use shipyard_core::context::AppContext;
use shipyard_core::package::Package;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;

/// Write a zip archive named `file_name` into `dir`.
pub fn write_package(dir: &Path, file_name: &str, entries: &[(&str, &str)]) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(file_name);
    let file = std::fs::File::create(&path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options =
        zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, content) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
    path
}

/// Isolated state dir and target root under `tmp`.
pub struct Workspace {
    pub state_dir: PathBuf,
    pub target_root: PathBuf,
    pub uploads: PathBuf,
}

impl Workspace {
    pub fn new(tmp: &Path) -> Self {
        let ws = Self {
            state_dir: tmp.join("state"),
            target_root: tmp.join("srv"),
            uploads: tmp.join("uploads"),
        };
        std::fs::create_dir_all(&ws.target_root).unwrap();
        ws
    }

    pub fn settings(&self) -> Settings {
        let mut settings = Settings::with_state_dir(self.state_dir.clone())
            .with_target_root(self.target_root.clone());
        settings.probe_timeout = Duration::from_millis(500);
        settings.probe_use_proxy = false;
        settings
    }

    pub fn context(&self) -> AppContext {
        AppContext::new(self.settings())
    }

    pub fn write_target(&self, rel: &str, content: &str) {
        let path = self.target_root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    pub fn read_target(&self, rel: &str) -> Option<String> {
        std::fs::read_to_string(self.target_root.join(rel)).ok()
    }

    /// Build and register a package archive.
    pub fn upload(&self, ctx: &AppContext, file_name: &str, entries: &[(&str, &str)]) -> Package {
        let archive = write_package(&self.uploads, file_name, entries);
        let (package, _) = ctx.package_registry().register(&archive).unwrap();
        package
    }
}

/// Answer every request with `status` until the runtime shuts down.
pub async fn spawn_http(status: u16) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {} Canned\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok",
                    status
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    Url::parse(&format!("http://{}/health", addr)).unwrap()
}

/// Accept connections and never answer, so clients time out.
pub async fn spawn_silent() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    Url::parse(&format!("http://{}/health", addr)).unwrap()
}
