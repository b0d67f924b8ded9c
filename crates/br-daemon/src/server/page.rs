//! Status page markup

use std::time::Duration;

use br_core::JobSnapshot;

/// Render the status page
pub(super) fn render(snapshot: &JobSnapshot, elapsed: Option<Duration>) -> String {
    let status = if snapshot.working {
        match elapsed {
            Some(elapsed) => format!("Working ({}s elapsed)", elapsed.as_secs()),
            None => "Working".to_string(),
        }
    } else {
        "Idle".to_string()
    };

    let last_run = match (&snapshot.last_run.started_at, snapshot.last_run.error.as_str()) {
        (None, _) => "Never run".to_string(),
        (Some(started), "") => format!("Succeeded (started at {} ms)", started.as_millis()),
        (Some(started), error) => format!(
            "Failed (started at {} ms): {}",
            started.as_millis(),
            escape(error)
        ),
    };

    let disabled = if snapshot.working { " disabled" } else { "" };

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>big-red</title>
<style>
body {{ font-family: sans-serif; text-align: center; margin-top: 4em; }}
button {{ background: #c0392b; color: #fff; border: none; border-radius: 50%;
         width: 10em; height: 10em; font-size: 1.5em; cursor: pointer; }}
button[disabled] {{ background: #999; cursor: default; }}
</style>
</head>
<body>
<form method="post" action="/press">
<button type="submit"{disabled}>Run</button>
</form>
<p id="status">{status}</p>
<p id="last-run">{last_run}</p>
</body>
</html>
"#
    )
}

/// Minimal HTML escaping for text content
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
