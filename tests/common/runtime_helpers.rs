//! Runtime construction helpers

use chronotrace_rs::{PlaybackUpdate, TraceConfig, TraceRuntime};
use crossbeam_channel::Receiver;

/// Config with short intervals so background threads react quickly
pub fn fast_config() -> TraceConfig {
    let mut config = TraceConfig::default();
    config.capture.flush_interval_ms = 5;
    config.store.prune_interval_ms = 3_600_000;
    config.playback.base_interval_ms = 2;
    config
}

pub fn create_test_runtime() -> TraceRuntime {
    TraceRuntime::new(fast_config()).expect("runtime should start")
}

/// Collect updates until `Finished` arrives or the timeout expires
pub fn collect_until_finished(updates: &Receiver<PlaybackUpdate>) -> Vec<PlaybackUpdate> {
    let mut seen = Vec::new();
    while let Ok(update) = updates.recv_timeout(super::test_timeout()) {
        let finished = update == PlaybackUpdate::Finished;
        seen.push(update);
        if finished {
            break;
        }
    }
    seen
}
