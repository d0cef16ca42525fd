use std::io::Write;

use chrono::{DateTime, Duration, TimeZone, Utc};

use authwatch::alerter::AlertManager;
use authwatch::config::DetectorConfig;
use authwatch::monitor::Monitor;
use authwatch::parser::LineParser;
use authwatch::tailer::LogTailer;
use authwatch::types::{Alert, AnomalyKind, Event, Finding, Metadata};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
}

fn error_from(secs: i64, ip: &str) -> Event {
    Event::new(t0() + Duration::seconds(secs), "ERROR", Metadata {
        ip: Some(ip.to_string()),
        ..Default::default()
    })
}

#[test]
fn structured_line_scenario() {
    let parsed = LineParser::new()
        .unwrap()
        .parse("2024-01-15 10:30:45 ERROR Authentication failed for user admin")
        .unwrap();

    assert_eq!(parsed.event.level, "ERROR");
    assert!(parsed.message.contains("Authentication failed"));
    assert_eq!(parsed.event.metadata.user.as_deref(), Some("admin"));
    assert!(parsed.event.metadata.ip.is_none());
}

#[test]
fn sshd_line_scenario() {
    let parsed = LineParser::new()
        .unwrap()
        .parse("Jan 15 10:30:45 server sshd[1234]: Failed password for user admin from 192.168.1.100")
        .unwrap();

    let meta = &parsed.event.metadata;
    assert_eq!(parsed.event.level, "ERROR");
    assert_eq!(meta.ip.as_deref(), Some("192.168.1.100"));
    assert_eq!(meta.user.as_deref(), Some("admin"));
    assert_eq!(meta.service.as_deref(), Some("sshd"));
    assert_eq!(meta.pid.as_deref(), Some("1234"));
}

#[test]
fn brute_force_scenario() {
    let mut monitor = Monitor::new("auth.log", &DetectorConfig::default()).unwrap();
    let findings = (0..10)
        .map(|i| monitor.add_event(error_from(i, "10.0.0.5")))
        .last()
        .unwrap();

    assert_eq!(findings.get(AnomalyKind::BruteForce), &[Finding::BruteForce {
        ip: "10.0.0.5".into(),
        failed_attempts: 10,
        threshold: 10,
    }]);
}

#[test]
fn distributed_attack_scenario() {
    let config = DetectorConfig { suspicious_ip_count: 5, ..Default::default() };
    let mut monitor = Monitor::new("auth.log", &config).unwrap();
    let findings = (0..10)
        .map(|i| monitor.add_event(error_from(i, &format!("203.0.113.{}", i % 5))))
        .last()
        .unwrap();

    assert_eq!(findings.get(AnomalyKind::DistributedAttack), &[Finding::DistributedAttack {
        unique_ips: 5,
        total_errors: 10,
    }]);
    assert!(!findings.contains(AnomalyKind::BruteForce));
}

#[test]
fn every_brute_force_ip_is_reported() {
    let mut monitor = Monitor::new("auth.log", &DetectorConfig::default()).unwrap();
    let ips = ["10.0.0.1", "10.0.0.2", "10.0.0.3"];
    let findings = (0..30i64)
        .map(|i| monitor.add_event(error_from(i, ips[(i % 3) as usize])))
        .last()
        .unwrap();

    let reported: Vec<_> = findings.get(AnomalyKind::BruteForce).iter()
        .map(|f| match f {
            Finding::BruteForce { ip, .. } => ip.as_str(),
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(reported, ips);
}

#[test]
fn findings_expire_with_the_window() {
    let mut monitor = Monitor::new("auth.log", &DetectorConfig::default()).unwrap();
    for i in 0..10 {
        monitor.add_event(error_from(i, "10.0.0.5"));
    }
    // Ten minutes later a single benign event pushes everything out
    let quiet = Event::new(t0() + Duration::minutes(10), "INFO", Metadata::default());
    assert!(monitor.add_event(quiet).is_empty());
    assert!(!monitor.window().ip_index().contains_key("10.0.0.5"));
    assert_eq!(monitor.statistics().total_events, 1);
}

#[tokio::test]
async fn tailed_file_flows_into_alerts() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    let mut tailer = LogTailer::open(file.path(), false).await.unwrap();
    let mut monitor = Monitor::new(file.path().display().to_string(), &DetectorConfig::default()).unwrap();
    let mut manager = AlertManager::with_channels(vec![], 100);

    for i in 0..5 {
        writeln!(file, "2024-01-15 10:30:0{} ERROR payment backend unreachable", i).unwrap();
    }
    writeln!(file, "garbage that matches nothing").unwrap();
    file.flush().unwrap();

    for line in tailer.read_lines().await.unwrap() {
        for finding in monitor.ingest(&line) {
            let alert = Alert::from_finding(finding, monitor.source(), "test-host");
            manager.dispatch(alert).await.unwrap();
        }
    }

    assert_eq!(monitor.lines_seen(), 6);
    assert_eq!(manager.history_len(), 1);
    let alert = manager.recent(1)[0];
    assert_eq!(alert.kind, AnomalyKind::ErrorThreshold);
    assert_eq!(alert.finding, Finding::ErrorThreshold { count: 5, threshold: 5 });
}
