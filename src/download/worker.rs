//! Pipeline halves: watermarking producer and streaming uploader
//!
//! The two halves run as separate tasks joined by a single-slot channel of
//! `io::Result<Vec<u8>>`. Carrying the error inside the channel lets a
//! producer failure reach the uploader as a failed body item, which aborts
//! the PUT mid-transfer instead of silently committing a truncated object.

use crate::fingerprint::{insert_fingerprint, FINGERPRINT_GROUP_SIZE};
use crate::progress::{ProgressTracker, PROGRESS_DONE, PROGRESS_FAILED};
use log::{debug, warn};
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Watermark one raw line read off the source.
///
/// The trailing newline is stripped before embedding and re-appended after,
/// so the codec sees the same line shape the verifier later reads back.
/// Non-UTF-8 lines pass through untouched.
fn watermark_line(raw: &[u8], timestamp: &str, group_pos: usize) -> Vec<u8> {
    let Ok(text) = std::str::from_utf8(raw) else {
        return raw.to_vec();
    };

    let (line, newline) = match text.strip_suffix('\n') {
        Some(stripped) => (stripped, "\n"),
        None => (text, ""),
    };

    let mut out = insert_fingerprint(line, timestamp, group_pos);
    out.push_str(newline);
    out.into_bytes()
}

/// Progress step in source bytes; one percent per step, capped at 99.
/// Unknown or non-positive sizes fall back to a 1-byte step so the job
/// still advances toward 99 instead of sitting at 0.
fn progress_step(file_size: i64) -> u64 {
    if file_size <= 0 {
        return 1;
    }
    ((file_size as u64).div_ceil(100)).max(1)
}

/// Read lines off `source`, watermark them, and feed the handoff channel.
///
/// Drops the sender on EOF so the uploader sees a clean end of body. Read
/// errors are forwarded into the channel and the job is marked failed.
/// Cancellation forwards an error too: the body must end in a failure, not
/// a clean EOF, or the destination could commit the truncated prefix as a
/// complete object. Progress is left untouched on cancel; the superseding
/// job owns the key by then.
pub(crate) async fn run_producer<R>(
    mut source: R,
    timestamp: String,
    file_size: i64,
    tx: mpsc::Sender<io::Result<Vec<u8>>>,
    tracker: ProgressTracker,
    buyer_id: i64,
    dataset_id: i64,
    cancel: CancellationToken,
) where
    R: AsyncBufRead + Unpin + Send,
{
    let step = progress_step(file_size);
    let mut bytes_read: u64 = 0;
    let mut local_progress: i64 = 0;
    let mut line_index: usize = 0;
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let n = tokio::select! {
            // Biased so an already-fired token stops the read loop before
            // another line goes out
            biased;
            _ = cancel.cancelled() => {
                debug!("download_producer_cancelled: {}-{}", buyer_id, dataset_id);
                let _ = tx.send(Err(io::Error::other("download cancelled"))).await;
                return;
            }
            read = source.read_until(b'\n', &mut buf) => match read {
                Ok(n) => n,
                Err(e) => {
                    warn!(
                        "download_producer_read_failed: {}-{} error={}",
                        buyer_id, dataset_id, e
                    );
                    let _ = tx.send(Err(e)).await;
                    if let Err(e) = tracker
                        .set_progress(buyer_id, dataset_id, PROGRESS_FAILED)
                        .await
                    {
                        warn!("download_progress_write_failed: {}-{} error={}", buyer_id, dataset_id, e);
                    }
                    return;
                }
            },
        };
        if n == 0 {
            // EOF; dropping the sender ends the upload body
            debug!(
                "download_producer_done: {}-{} lines={}",
                buyer_id, dataset_id, line_index
            );
            return;
        }

        bytes_read += n as u64;
        let out = watermark_line(&buf, &timestamp, line_index % FINGERPRINT_GROUP_SIZE);
        line_index += 1;

        if tx.send(Ok(out)).await.is_err() {
            // Uploader is gone; it already recorded the job outcome
            return;
        }

        let advanced = ((bytes_read / step) as i64).min(99);
        if advanced > local_progress {
            local_progress = advanced;
            if let Err(e) = tracker
                .set_progress(buyer_id, dataset_id, local_progress)
                .await
            {
                warn!(
                    "download_progress_write_failed: {}-{} error={}",
                    buyer_id, dataset_id, e
                );
            }
        }
    }
}

/// Drain the handoff channel into a chunked PUT against `upload_url`.
///
/// Writes 100 only after the destination confirms the upload; any transfer
/// error (including one forwarded by the producer) marks the job failed.
pub(crate) async fn run_uploader(
    http: reqwest::Client,
    upload_url: String,
    rx: mpsc::Receiver<io::Result<Vec<u8>>>,
    tracker: ProgressTracker,
    buyer_id: i64,
    dataset_id: i64,
    cancel: CancellationToken,
) {
    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });
    let body = reqwest::Body::wrap_stream(stream);

    let result = tokio::select! {
        // Biased: when the token has fired, never report the PUT's outcome,
        // even if both branches are ready on the same poll
        biased;
        _ = cancel.cancelled() => {
            debug!("download_uploader_cancelled: {}-{}", buyer_id, dataset_id);
            return;
        }
        result = crate::blob::stream_put(&http, &upload_url, body) => result,
    };

    let terminal = match result {
        Ok(()) => {
            debug!("download_uploader_done: {}-{}", buyer_id, dataset_id);
            PROGRESS_DONE
        }
        Err(e) => {
            warn!(
                "download_upload_failed: {}-{} error={}",
                buyer_id, dataset_id, e
            );
            PROGRESS_FAILED
        }
    };
    if let Err(e) = tracker.set_progress(buyer_id, dataset_id, terminal).await {
        warn!(
            "download_progress_write_failed: {}-{} error={}",
            buyer_id, dataset_id, e
        );
    }
}
