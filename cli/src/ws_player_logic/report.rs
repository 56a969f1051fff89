use lib_player::{PlayerState, Severity};

/// One-line summary of a snapshot.
pub fn summarize(state: &PlayerState) -> String {
    let name = state.name.replace('\n', " / ");
    let mut text = format!("[{:?}] {}", state.presence, name);

    if let Some(data) = &state.active_data {
        text.push_str(&format!(
            " | topics: {}, messages: {}, bytes: {}, time: {}.{:09}",
            data.topics.len(),
            data.messages.len(),
            data.total_bytes_received,
            data.current_time.sec,
            data.current_time.nsec
        ));
        if data.last_seek_time > 0 {
            text.push_str(&format!(", seeks: {}", data.last_seek_time));
        }
    }

    if !state.problems.is_empty() {
        text.push_str(&format!(" | problems: {}", state.problems.len()));
    }
    text
}

/// Logs a snapshot: the summary, each problem, and each message at debug.
pub fn log_state(state: &PlayerState) {
    log::info!("{}", summarize(state));

    for (key, problem) in &state.problems {
        let detail = problem.error.as_deref().unwrap_or("");
        match problem.severity {
            Severity::Error => log::error!("  {}: {} {}", key, problem.message, detail),
            Severity::Warn => log::warn!("  {}: {} {}", key, problem.message, detail),
        }
    }

    if log::log_enabled!(log::Level::Debug) {
        for event in state.active_data.iter().flat_map(|data| &data.messages) {
            log::debug!(
                "  {} @ {}.{:09}: {}",
                event.topic,
                event.receive_time.sec,
                event.receive_time.nsec,
                event.message
            );
        }
    }
}
