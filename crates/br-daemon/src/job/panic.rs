//! Panic capture for run tasks
//!
//! A process-wide hook records where each panic happened, with a backtrace,
//! in a thread-local slot. The run task catches the unwind on the thread that
//! panicked and takes that trace when converting the panic into a failure.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::sync::Once;

use br_core::RunError;

thread_local! {
    static LAST_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Install the recording hook, chaining to whatever hook was set before
pub(crate) fn install_hook() {
    HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let location = info
                .location()
                .map(|l| l.to_string())
                .unwrap_or_else(|| "unknown location".to_string());
            let trace = format!("at {}\n{}", location, Backtrace::force_capture());
            let _ = LAST_TRACE.try_with(|slot| {
                if let Ok(mut slot) = slot.try_borrow_mut() {
                    *slot = Some(trace);
                }
            });
            previous(info);
        }));
    });
}

/// Take the trace of the last panic on this thread
pub(crate) fn take_trace() -> Option<String> {
    LAST_TRACE
        .try_with(|slot| slot.borrow_mut().take())
        .ok()
        .flatten()
}

fn payload_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

/// Convert a caught panic into an internal failure, logging its trace
pub(crate) fn into_failure(payload: Box<dyn Any + Send>) -> RunError {
    let message = payload_message(payload.as_ref());
    match take_trace() {
        Some(trace) => tracing::error!("Run panicked: {}\n{}", message, trace),
        None => tracing::error!("Run panicked: {}", message),
    }
    RunError::Internal(format!("run panicked: {}", message))
}
