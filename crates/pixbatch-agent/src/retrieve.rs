use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{info, warn};

use pixbatch_core::config::RetrievalConfig;
use pixbatch_core::error::{PixbatchError, Result};
use pixbatch_core::traits::ImageRetriever;
use pixbatch_core::types::RetrievalOutcome;

/// Downloads image references over HTTP into the output directory.
///
/// Reference `i` (1-based) is written to `{prefix}{i}.{extension}`. Each
/// reference is fetched independently; one failure never stops the rest.
pub struct HttpRetriever {
    client: reqwest::Client,
    output_dir: PathBuf,
    file_prefix: String,
    extension: String,
}

impl HttpRetriever {
    pub fn new(config: &RetrievalConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("pixbatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PixbatchError::Config(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            output_dir: config.output_path(),
            file_prefix: config.file_prefix.clone(),
            extension: config.extension.clone(),
        })
    }

    /// Destination for the image at `index`.
    pub fn file_path(&self, index: usize) -> PathBuf {
        self.output_dir
            .join(format!("{}{}.{}", self.file_prefix, index, self.extension))
    }

    async fn fetch_one(&self, index: usize, reference: &str) -> Result<PathBuf> {
        let failed = |message: String| PixbatchError::Retrieval {
            reference: reference.to_string(),
            message,
        };

        let resp = self
            .client
            .get(reference)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(failed(format!("HTTP {}", resp.status())));
        }
        let bytes = resp.bytes().await.map_err(|e| failed(e.to_string()))?;

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self.file_path(index);
        tokio::fs::write(&path, &bytes).await?;
        Ok(path)
    }
}

impl ImageRetriever for HttpRetriever {
    fn retrieve<'a>(&'a self, references: &'a [String]) -> BoxFuture<'a, Vec<RetrievalOutcome>> {
        Box::pin(async move {
            let mut outcomes = Vec::with_capacity(references.len());
            for (i, reference) in references.iter().enumerate() {
                let index = i + 1;
                match self.fetch_one(index, reference).await {
                    Ok(path) => {
                        info!(index, path = %path.display(), "Image saved");
                        outcomes.push(RetrievalOutcome::Saved {
                            index,
                            reference: reference.clone(),
                            path,
                        });
                    }
                    Err(e) => {
                        warn!(index, reference = %reference, error = %e, "Image download failed");
                        outcomes.push(RetrievalOutcome::Failed {
                            index,
                            reference: reference.clone(),
                            error: e.to_string(),
                        });
                    }
                }
            }
            outcomes
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn retriever(dir: &Path) -> HttpRetriever {
        HttpRetriever::new(&RetrievalConfig {
            output_dir: dir.display().to_string(),
            timeout_secs: 5,
            ..Default::default()
        })
        .unwrap()
    }

    /// Serve `body` with `status` to each of `hits` connections.
    async fn serve(status: &'static str, body: &'static [u8], hits: usize) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for _ in 0..hits {
                let (mut sock, _) = listener.accept().await.unwrap();
                let mut buf = [0u8; 2048];
                let _ = sock.read(&mut buf).await;
                let head = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status,
                    body.len()
                );
                sock.write_all(head.as_bytes()).await.unwrap();
                sock.write_all(body).await.unwrap();
                sock.shutdown().await.ok();
            }
        });
        format!("http://{}", addr)
    }

    #[test]
    fn file_names_use_prefix_and_index() {
        let dir = tempfile::tempdir().unwrap();
        let r = retriever(dir.path());
        assert_eq!(r.file_path(3), dir.path().join("generated_image_3.png"));
    }

    #[tokio::test]
    async fn saves_each_reference_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let base = serve("200 OK", b"PNGDATA", 2).await;
        let refs = vec![format!("{}/a.png", base), format!("{}/b.png", base)];

        let outcomes = retriever(dir.path()).retrieve(&refs).await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.is_saved()));
        let saved = std::fs::read(dir.path().join("generated_image_2.png")).unwrap();
        assert_eq!(saved, b"PNGDATA");
    }

    #[tokio::test]
    async fn failure_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let base = serve("200 OK", b"ok", 1).await;
        let refs = vec!["not a url".to_string(), format!("{}/ok.png", base)];

        let outcomes = retriever(dir.path()).retrieve(&refs).await;

        assert!(matches!(&outcomes[0], RetrievalOutcome::Failed { index: 1, .. }));
        assert!(matches!(&outcomes[1], RetrievalOutcome::Saved { index: 2, .. }));
        assert!(!dir.path().join("generated_image_1.png").exists());
    }

    #[tokio::test]
    async fn http_error_status_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let base = serve("404 Not Found", b"", 1).await;
        let refs = vec![format!("{}/missing.png", base)];

        let outcomes = retriever(dir.path()).retrieve(&refs).await;
        match &outcomes[0] {
            RetrievalOutcome::Failed { error, .. } => assert!(error.contains("404")),
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
