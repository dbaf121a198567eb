//! Kernel log macro tests
//!
//! The level gate in `sonar_sched::logger` is process-global, so tests that
//! change it are `#[serial]`; tests that install a `log` backend run in a
//! forked process.

use rusty_fork::rusty_fork_test;
use serial_test::serial;

use sonar_sched::logger::{self, LogLevel};
use sonar_sched::{kdebug, kinfo, kwarn, PolicyKind, SchedOps, Settings};

use crate::mock::{CaptureLogger, Harness, MockRuntime};

// ============================================================================
// Level parsing
// ============================================================================

#[test]
fn test_parse_level_directive() {
    assert_eq!(
        logger::parse_level_directive("quiet loglevel=debug"),
        Some(LogLevel::DEBUG)
    );
    assert_eq!(logger::parse_level_directive("log=WARNING"), Some(LogLevel::WARN));
    assert_eq!(logger::parse_level_directive("log=loud other=1"), None);
    assert_eq!(logger::parse_level_directive(""), None);
}

#[test]
#[serial]
fn test_set_max_level_roundtrip() {
    let before = logger::max_level();
    logger::set_max_level(LogLevel::TRACE);
    assert_eq!(logger::max_level(), LogLevel::TRACE);
    logger::set_max_level(before);
}

// ============================================================================
// Forwarding to the log facade
// ============================================================================

rusty_fork_test! {
    #[test]
    fn test_macros_forward_with_target() {
        let capture = CaptureLogger::install();
        logger::set_max_level(LogLevel::INFO);

        kinfo!("attached {}", 3);
        kwarn!("slow tick");
        kdebug!("filtered out");

        let records = capture.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].target, logger::TARGET);
        assert_eq!(records[0].level, log::Level::Info);
        assert_eq!(records[0].message, "attached 3");
        assert_eq!(records[1].level, log::Level::Warn);
    }
}

rusty_fork_test! {
    #[test]
    fn test_init_failure_is_logged() {
        let capture = CaptureLogger::install();
        logger::set_max_level(LogLevel::INFO);

        let rt = MockRuntime::new(2);
        rt.occupy_dsq(sonar_sched::scheduler::SHARED_DSQ_ID);
        let ctx = sonar_sched::PolicyContext::new(rt.clone(), Settings::default());
        let policy = sonar_sched::Policy::new(PolicyKind::Fifo);
        assert!(policy.init(&ctx).is_err());

        let records = capture.records();
        assert!(records
            .iter()
            .any(|r| r.level == log::Level::Error && r.message.contains("fifo_sonar: init failed")));
    }
}

rusty_fork_test! {
    #[test]
    fn test_attach_detach_announced() {
        let capture = CaptureLogger::install();
        logger::set_max_level(LogLevel::INFO);

        let h = Harness::new(PolicyKind::VTime, 2, Settings::default());
        h.policy.exit(&h.ctx);

        let messages: Vec<String> = capture.records().into_iter().map(|r| r.message).collect();
        assert!(messages.iter().any(|m| m.starts_with("vtime_sonar: attached")));
        assert!(messages.iter().any(|m| m == "vtime_sonar: detached"));
    }
}
