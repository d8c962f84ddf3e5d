use super::error::TrackerError;
use super::response::AnnounceResponse;
use crate::metainfo::InfoHash;
use crate::peer::PeerId;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const REPORT_QUEUE_DEPTH: usize = 8;

/// One announce's worth of client state, sent by the session whenever it
/// wants the tracker contacted.
#[derive(Debug, Clone)]
pub struct StatusReport {
    /// "started", "stopped", "completed", or empty for a periodic announce.
    pub event: &'static str,
    pub info_hash: InfoHash,
    pub peer_id: PeerId,
    pub port: u16,
    pub uploaded: u64,
    pub downloaded: u64,
    pub left: u64,
}

/// A channel-driven HTTP announce task.
pub struct TrackerClient {
    http: reqwest::Client,
    urls: Vec<String>,
}

impl TrackerClient {
    /// Spawns the announce task. Reports pushed into the returned sender
    /// are announced to each URL in order until one succeeds; decoded
    /// responses flow back through `responses`. With no URLs the task
    /// consumes reports without announcing.
    pub fn start(
        urls: Vec<String>,
        responses: mpsc::Sender<AnnounceResponse>,
    ) -> Result<mpsc::Sender<StatusReport>, TrackerError> {
        let (report_tx, mut report_rx) = mpsc::channel::<StatusReport>(REPORT_QUEUE_DEPTH);

        let client = Self {
            http: reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?,
            urls: urls
                .into_iter()
                .filter(|u| u.starts_with("http://") || u.starts_with("https://"))
                .collect(),
        };

        tokio::spawn(async move {
            while let Some(report) = report_rx.recv().await {
                if client.urls.is_empty() {
                    continue;
                }
                match client.announce_any(&report).await {
                    Ok(response) => {
                        if responses.send(response).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!(%err, "all tracker announces failed"),
                }
            }
        });

        Ok(report_tx)
    }

    async fn announce_any(&self, report: &StatusReport) -> Result<AnnounceResponse, TrackerError> {
        let mut last_err = TrackerError::UnsupportedUrl("no announce urls".into());
        for url in &self.urls {
            match self.announce(url, report).await {
                Ok(response) => {
                    debug!(
                        url,
                        peers = response.peers.len() + response.peers6.len(),
                        interval = response.interval,
                        "tracker announce ok"
                    );
                    return Ok(response);
                }
                Err(err) => {
                    debug!(url, %err, "tracker announce failed");
                    last_err = err;
                }
            }
        }
        Err(last_err)
    }

    async fn announce(
        &self,
        url: &str,
        report: &StatusReport,
    ) -> Result<AnnounceResponse, TrackerError> {
        let mut query = format!(
            "{}?info_hash={}&peer_id={}&port={}&uploaded={}&downloaded={}&left={}&compact=1",
            url,
            report.info_hash.url_encode(),
            percent_encode(report.peer_id.as_bytes()),
            report.port,
            report.uploaded,
            report.downloaded,
            report.left,
        );
        if !report.event.is_empty() {
            query.push_str("&event=");
            query.push_str(report.event);
        }

        let body = self.http.get(&query).send().await?.bytes().await?;
        AnnounceResponse::parse(&body)
    }
}

fn percent_encode(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(60), |mut s, &b| {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            s.push(b as char);
        } else {
            use std::fmt::Write;
            let _ = write!(s, "%{:02x}", b);
        }
        s
    })
}
