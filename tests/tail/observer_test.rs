//! Background observer: delivery, overflow policies and shutdown.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use mcrelay::tail::observer::{LineObserver, ObservedLines, ObserverConfig, OverflowPolicy};
use mcrelay::tail::{LineSource, TailReader};

fn append(path: &Path, text: &str) {
    let mut file = OpenOptions::new()
        .append(true)
        .open(path)
        .expect("open log for append");
    file.write_all(text.as_bytes()).expect("append to log");
}

fn config(capacity: usize, overflow: OverflowPolicy) -> ObserverConfig {
    ObserverConfig {
        interval: Duration::from_millis(10),
        queue_capacity: capacity,
        overflow,
    }
}

/// Pull lines one at a time, pausing between pulls, until `count` arrive
/// or five seconds pass.
async fn collect(lines: &mut ObservedLines, count: usize) -> Vec<String> {
    let mut out = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        while out.len() < count {
            match lines.next_line() {
                Some(line) => out.push(line),
                None => tokio::time::sleep(Duration::from_millis(5)).await,
            }
        }
    })
    .await;
    out
}

fn expected(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("line {i}")).collect()
}

fn payload(count: usize) -> String {
    expected(count).iter().map(|l| format!("{l}\n")).collect()
}

#[tokio::test]
async fn observer_delivers_appended_lines() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("latest.log");
    fs::write(&path, "").expect("create log");

    let reader = TailReader::open(&path).expect("open");
    let (observer, mut lines) = LineObserver::spawn(reader, ObserverConfig {
        interval: Duration::from_millis(10),
        ..ObserverConfig::default()
    });

    append(&path, &payload(3));
    assert_eq!(collect(&mut lines, 3).await, expected(3));

    observer.join().await;
}

#[tokio::test]
async fn defer_policy_loses_nothing_when_queue_is_small() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("latest.log");
    fs::write(&path, "").expect("create log");

    let reader = TailReader::open(&path).expect("open");
    let (observer, mut lines) = LineObserver::spawn(reader, config(2, OverflowPolicy::Defer));

    append(&path, &payload(7));
    // Let the queue fill up and a few ticks get deferred.
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert_eq!(collect(&mut lines, 7).await, expected(7));
    observer.join().await;
}

#[tokio::test]
async fn block_policy_loses_nothing_when_queue_is_small() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("latest.log");
    fs::write(&path, "").expect("create log");

    let reader = TailReader::open(&path).expect("open");
    let (observer, mut lines) = LineObserver::spawn(reader, config(1, OverflowPolicy::Block));

    append(&path, &payload(5));
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert_eq!(collect(&mut lines, 5).await, expected(5));
    observer.join().await;
}

#[tokio::test]
async fn block_policy_stops_while_queue_stays_full() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("latest.log");
    fs::write(&path, "").expect("create log");

    let reader = TailReader::open(&path).expect("open");
    let (observer, _lines) = LineObserver::spawn(reader, config(1, OverflowPolicy::Block));

    append(&path, &payload(4));
    // Nobody drains, so the task sits waiting for queue space.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let joined = tokio::time::timeout(Duration::from_secs(1), observer.join()).await;
    assert!(joined.is_ok(), "observer should stop with a full queue");
}

#[tokio::test]
async fn stop_is_observed_within_an_interval() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("latest.log");
    fs::write(&path, "").expect("create log");

    let reader = TailReader::open(&path).expect("open");
    let (observer, _lines) = LineObserver::spawn(reader, config(4, OverflowPolicy::Defer));
    assert!(observer.is_running());

    observer.stop();
    assert!(!observer.is_running());

    let joined = tokio::time::timeout(Duration::from_secs(1), observer.join()).await;
    assert!(joined.is_ok(), "observer should stop promptly");
}

#[tokio::test]
async fn zero_capacity_is_raised_to_one() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("latest.log");
    fs::write(&path, "").expect("create log");

    let reader = TailReader::open(&path).expect("open");
    let (observer, mut lines) = LineObserver::spawn(reader, config(0, OverflowPolicy::Defer));

    append(&path, &payload(2));
    assert_eq!(collect(&mut lines, 2).await, expected(2));
    observer.join().await;
}
