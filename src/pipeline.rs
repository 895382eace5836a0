use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::classify;
use crate::extract;
use crate::fetch::{Fetcher, RetryPolicy};
use crate::store::{Record, RecordStore};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub concurrency: usize,
    pub limit: Option<usize>,
}

pub struct RunStats {
    pub processed: usize,
    pub ok: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Drive fetch → extract → classify for every pending domain, streaming
/// each finished record into the store as it arrives. Every scheduled
/// domain ends up persisted exactly once, failures included.
pub async fn run(
    store: &mut RecordStore,
    done: &HashSet<String>,
    domains: Vec<String>,
    config: &PipelineConfig,
) -> Result<RunStats> {
    let total_input = domains.len();
    let mut pending: Vec<String> = domains
        .into_iter()
        .filter(|d| !done.contains(d))
        .collect();
    let skipped = total_input - pending.len();
    if let Some(n) = config.limit {
        pending.truncate(n);
    }
    if pending.is_empty() {
        info!("Nothing to do: all {} domains already processed", total_input);
        return Ok(RunStats {
            processed: 0,
            ok: 0,
            failed: 0,
            skipped,
        });
    }

    let fetcher = Arc::new(Fetcher::new(
        config.timeout,
        RetryPolicy::new(config.max_retries),
    )?);
    let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let shutdown = Arc::new(AtomicBool::new(false));

    // Ctrl-C: in-flight fetches finish their attempt, queued domains are
    // skipped, everything already appended stays persisted.
    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Stop requested; letting in-flight fetches finish");
                shutdown.store(true, Ordering::Relaxed);
            }
        });
    }

    let total = pending.len();
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    // Channel: workers send finished records, this loop owns the writer
    let (tx, mut rx) = tokio::sync::mpsc::channel::<Record>(config.concurrency.max(1) * 2);

    for domain in pending {
        let fetcher = Arc::clone(&fetcher);
        let sem = Arc::clone(&semaphore);
        let shutdown = Arc::clone(&shutdown);
        let tx = tx.clone();

        tokio::spawn(async move {
            let Ok(_permit) = sem.acquire().await else {
                return;
            };
            if shutdown.load(Ordering::Relaxed) {
                return;
            }
            let result = fetcher.fetch(&domain).await;
            debug!(
                "{} -> {} in {}ms ({} attempts)",
                result.domain, result.status_code, result.elapsed_ms, result.attempts
            );
            let fields = extract::extract(&result);
            let class = classify::classify(&fields, &result.final_url);
            let _ = tx.send(Record::new(&domain, &fields, &class)).await;
        });
    }

    // Drop our copy of tx so rx closes when all spawned tasks finish
    drop(tx);

    let mut ok = 0usize;
    let mut failed = 0usize;
    while let Some(record) = rx.recv().await {
        if record.status_code == 0 {
            failed += 1;
        } else {
            ok += 1;
        }
        // Persistence failure is fatal: continuing would break resume
        store.append(&record)?;
        pb.inc(1);
    }
    pb.finish_and_clear();

    let processed = ok + failed;
    info!(
        "Processed {} domains ({} ok, {} failed, {} skipped as done)",
        processed, ok, failed, skipped
    );
    Ok(RunStats {
        processed,
        ok,
        failed,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store;

    fn config() -> PipelineConfig {
        PipelineConfig {
            timeout: Duration::from_secs(2),
            max_retries: 0,
            concurrency: 2,
            limit: None,
        }
    }

    // Reserved TLD, so this resolves nowhere and fails fast without
    // touching any real host.
    const UNREACHABLE: &str = "zapscan-test-host.invalid";

    #[tokio::test]
    async fn unreachable_domain_still_persists_one_failure_record() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.csv");

        let mut record_store = RecordStore::open(&path).unwrap();
        let stats = run(
            &mut record_store,
            &HashSet::new(),
            vec![UNREACHABLE.to_string()],
            &config(),
        )
        .await
        .unwrap();
        drop(record_store);

        assert_eq!(stats.processed, 1);
        assert_eq!(stats.failed, 1);
        let index = store::load_index(&path).unwrap();
        assert!(index.contains(UNREACHABLE));
    }

    #[tokio::test]
    async fn second_run_skips_completed_domains() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.csv");

        let mut record_store = RecordStore::open(&path).unwrap();
        run(
            &mut record_store,
            &HashSet::new(),
            vec![UNREACHABLE.to_string()],
            &config(),
        )
        .await
        .unwrap();
        drop(record_store);

        // Resume against the same store: nothing left to do, no new rows
        let index = store::load_index(&path).unwrap();
        let mut record_store = RecordStore::open(&path).unwrap();
        let stats = run(
            &mut record_store,
            &index,
            vec![UNREACHABLE.to_string()],
            &config(),
        )
        .await
        .unwrap();
        drop(record_store);

        assert_eq!(stats.processed, 0);
        assert_eq!(stats.skipped, 1);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2); // header + one record
    }

    #[tokio::test]
    async fn concurrent_appends_never_corrupt_the_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.csv");

        let domains: Vec<String> = (0..50).map(|i| format!("h{}.{}", i, UNREACHABLE)).collect();
        let mut record_store = RecordStore::open(&path).unwrap();
        let stats = run(
            &mut record_store,
            &HashSet::new(),
            domains.clone(),
            &PipelineConfig {
                concurrency: 10,
                ..config()
            },
        )
        .await
        .unwrap();
        drop(record_store);

        assert_eq!(stats.processed, 50);
        // Every row parses back whole; nothing interleaved or lost
        let index = store::load_index(&path).unwrap();
        assert_eq!(index.len(), 50);
        for domain in &domains {
            assert!(index.contains(domain));
        }
    }

    #[tokio::test]
    async fn limit_caps_scheduled_domains() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.csv");

        let domains = vec![
            format!("a.{}", UNREACHABLE),
            format!("b.{}", UNREACHABLE),
            format!("c.{}", UNREACHABLE),
        ];
        let mut record_store = RecordStore::open(&path).unwrap();
        let stats = run(
            &mut record_store,
            &HashSet::new(),
            domains,
            &PipelineConfig {
                limit: Some(2),
                ..config()
            },
        )
        .await
        .unwrap();

        assert_eq!(stats.processed, 2);
    }
}
