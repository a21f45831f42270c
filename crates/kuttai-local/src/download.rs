//! Direct-download retry for large binary assets (the local model file).
//!
//! Candidates are tried in order. Each attempt streams into `<dest>.part`; a failed attempt
//! removes its partial file before the next candidate starts. Only the last error is surfaced.

use futures_util::StreamExt;
use kuttai_core::{Error, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

pub const MODEL_FILE_NAME: &str = "hf_mradermacher_ClinIQ-Gemma-2B-v0-hf.IQ4_XS.gguf";
pub const MODEL_REPO_URL: &str = "https://huggingface.co/mradermacher/ClinIQ-Gemma-2B-v0-hf-GGUF";

/// The model file under each URL layout the hub has served it from.
pub fn model_candidate_urls() -> Vec<String> {
    ["resolve", "blob", "raw"]
        .iter()
        .map(|kind| format!("{MODEL_REPO_URL}/{kind}/main/{MODEL_FILE_NAME}"))
        .collect()
}

/// A client for long transfers: bounded connect, no total deadline.
pub fn download_client(connect_timeout_ms: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_millis(connect_timeout_ms))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| Error::NotConfigured(format!("http client: {e}")))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downloaded {
    pub url: String,
    pub path: PathBuf,
    pub bytes: u64,
    pub sha256: String,
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

async fn download_one(
    client: &reqwest::Client,
    url: &str,
    part: &Path,
    on_progress: &mut (dyn FnMut(u64, Option<u64>) + Send),
) -> Result<(u64, String)> {
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| crate::classify_reqwest_error(url, &e))?;
    let status = resp.status();
    if status.as_u16() != 200 {
        return Err(Error::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
        });
    }
    let total = resp.content_length();

    let io_err = |e: std::io::Error| Error::Download {
        url: url.to_string(),
        message: e.to_string(),
    };
    let mut file = tokio::fs::File::create(part).await.map_err(io_err)?;
    let mut hasher = Sha256::new();
    let mut written: u64 = 0;
    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| crate::classify_reqwest_error(url, &e))?;
        file.write_all(&chunk).await.map_err(io_err)?;
        hasher.update(&chunk);
        written += chunk.len() as u64;
        on_progress(written, total);
    }
    file.flush().await.map_err(io_err)?;
    if let Some(total) = total {
        if written != total {
            return Err(Error::Download {
                url: url.to_string(),
                message: format!("short body: {written} of {total} bytes"),
            });
        }
    }
    Ok((written, hex::encode(hasher.finalize())))
}

/// Download the first candidate that succeeds into `dest`.
///
/// `on_progress(bytes_so_far, content_length)` is called per received chunk.
pub async fn download_first<S, F>(
    client: &reqwest::Client,
    urls: &[S],
    dest: &Path,
    mut on_progress: F,
) -> Result<Downloaded>
where
    S: AsRef<str>,
    F: FnMut(u64, Option<u64>) + Send,
{
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::Io(format!("{}: {e}", parent.display())))?;
    }
    let part = part_path(dest);
    let mut last: Option<Error> = None;

    for url in urls {
        let url = url.as_ref();
        info!(url = %url, "trying download");
        match download_one(client, url, &part, &mut on_progress).await {
            Ok((bytes, sha256)) => {
                tokio::fs::rename(&part, dest)
                    .await
                    .map_err(|e| Error::Io(format!("{}: {e}", dest.display())))?;
                return Ok(Downloaded {
                    url: url.to_string(),
                    path: dest.to_path_buf(),
                    bytes,
                    sha256,
                });
            }
            Err(e) => {
                warn!(url = %url, error = %e, "download failed, advancing");
                if tokio::fs::try_exists(&part).await.unwrap_or(false) {
                    let _ = tokio::fs::remove_file(&part).await;
                }
                last = Some(e);
            }
        }
    }

    let last = last.unwrap_or_else(|| Error::NotConfigured("no download candidates".to_string()));
    Err(Error::AllDownloadsFailed {
        last: Box::new(last),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Router};
    use std::net::SocketAddr;

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    #[test]
    fn candidates_cover_three_layouts() {
        let urls = model_candidate_urls();
        assert_eq!(urls.len(), 3);
        assert!(urls[0].contains("/resolve/main/"));
        assert!(urls[1].contains("/blob/main/"));
        assert!(urls[2].contains("/raw/main/"));
        assert!(urls.iter().all(|u| u.ends_with(MODEL_FILE_NAME)));
    }

    #[tokio::test]
    async fn falls_through_to_the_first_working_candidate() {
        let app = Router::new()
            .route("/missing", get(|| async { (StatusCode::NOT_FOUND, "nope") }))
            .route("/model", get(|| async { "gguf-bytes" }));
        let addr = serve(app).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("models").join("m.gguf");
        let client = download_client(2_000).unwrap();

        let mut seen = Vec::new();
        let urls = [
            format!("http://{addr}/missing"),
            format!("http://{addr}/model"),
        ];
        let got = download_first(&client, &urls, &dest, |n, _| seen.push(n))
            .await
            .unwrap();

        assert_eq!(got.url, urls[1]);
        assert_eq!(got.bytes, 10);
        assert_eq!(std::fs::read(&dest).unwrap(), b"gguf-bytes");
        assert_eq!(got.sha256, hex::encode(Sha256::digest(b"gguf-bytes")));
        assert_eq!(seen.last().copied(), Some(10));
        assert!(!part_path(&dest).exists());
    }

    #[tokio::test]
    async fn surfaces_the_last_error_and_leaves_no_partial_file() {
        let app = Router::new()
            .route("/a", get(|| async { (StatusCode::NOT_FOUND, "nope") }))
            .route(
                "/b",
                get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
            );
        let addr = serve(app).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("m.gguf");
        let client = download_client(2_000).unwrap();

        let urls = [format!("http://{addr}/a"), format!("http://{addr}/b")];
        let err = download_first(&client, &urls, &dest, |_, _| {})
            .await
            .unwrap_err();
        match err {
            Error::AllDownloadsFailed { last } => {
                assert!(matches!(*last, Error::HttpStatus { status: 500, .. }))
            }
            other => panic!("expected AllDownloadsFailed, got {other:?}"),
        }
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
    }

    #[tokio::test]
    async fn empty_candidate_list_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let client = download_client(2_000).unwrap();
        let urls: [&str; 0] = [];
        let err = download_first(&client, &urls, &dir.path().join("x"), |_, _| {})
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AllDownloadsFailed { .. }));
    }
}
