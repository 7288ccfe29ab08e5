//! Server-rendered HTML dashboard.

use crate::config::POPULAR_PACKAGES;
use crate::engine::ExecutionResult;
use crate::packages::{InstallResult, PackageListing};
use crate::telemetry::{gib, TelemetrySnapshot};
use std::fmt::Write;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success(String),
    Error(String),
}

/// Everything one render of the dashboard shows.
#[derive(Debug, Default)]
pub struct DashboardView {
    pub visitor_number: Option<u64>,
    pub telemetry: TelemetrySnapshot,
    pub source: String,
    pub notices: Vec<Notice>,
    pub execution: Option<ExecutionResult>,
    pub install: Option<InstallResult>,
    pub packages: Option<Result<PackageListing, String>>,
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const STYLE: &str = "body{font-family:sans-serif;margin:1.5em}\
.cols{display:grid;grid-template-columns:2fr 3fr 2fr;gap:1.5em}\
pre{background:#f4f4f4;padding:.5em;overflow:auto;max-height:30em}\
textarea{width:100%;font-family:monospace}\
.ok{color:#1a7f37}.err{color:#cf222e}.muted{color:#666}";

pub fn render(view: &DashboardView) -> String {
    let mut html = String::new();
    let _ = write!(
        html,
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\">\
         <title>Shared Python Playground</title><style>{STYLE}</style></head><body>\
         <h1>Shared Python Playground + System Monitor</h1>"
    );
    if let Some(n) = view.visitor_number {
        let _ = write!(html, "<p>You are visitor <b>#{n}</b></p>");
    }
    for notice in &view.notices {
        let _ = match notice {
            Notice::Success(msg) => write!(html, "<p class=\"ok\">{}</p>", escape(msg)),
            Notice::Error(msg) => write!(html, "<p class=\"err\">{}</p>", escape(msg)),
        };
    }
    html.push_str("<div class=\"cols\">");
    render_telemetry(&mut html, &view.telemetry);
    render_editor(&mut html, view);
    render_installer(&mut html, view);
    html.push_str("</div></body></html>");
    html
}

fn render_telemetry(html: &mut String, t: &TelemetrySnapshot) {
    html.push_str("<section><h2>System Monitor</h2><pre>");
    let _ = writeln!(html, "OS: {} {}", escape(&t.os), escape(&t.kernel));
    let _ = writeln!(html, "Arch: {}", escape(&t.arch));
    if !t.hostname.is_empty() {
        let _ = writeln!(html, "Host: {}", escape(&t.hostname));
    }
    let _ = writeln!(
        html,
        "Runtime: {}",
        escape(t.runtime_version.as_deref().unwrap_or("unavailable"))
    );
    html.push_str("CPU usage:\n");
    for (i, usage) in t.cpu_per_core.iter().enumerate() {
        let _ = writeln!(html, "  core {}: {:.1}%", i + 1, usage);
    }
    let _ = writeln!(html, "Average CPU: {:.1}%", t.cpu_average);
    let _ = writeln!(
        html,
        "Memory: {}/{} GB ({:.1}%)",
        gib(t.memory.used),
        gib(t.memory.total),
        t.memory.usage_percent
    );
    html.push_str("Disks:\n");
    for disk in &t.disks {
        let _ = writeln!(
            html,
            "  {} ({}): {}/{} GB ({:.1}%)",
            escape(&disk.device),
            escape(&disk.mount_point),
            gib(disk.used),
            gib(disk.total),
            disk.usage_percent
        );
    }
    if t.gpus.is_empty() {
        html.push_str("No GPU detected\n");
    } else {
        html.push_str("GPUs:\n");
        for gpu in &t.gpus {
            let _ = writeln!(
                html,
                "  {}: {}/{} MB ({:.2}%)",
                escape(&gpu.name),
                gpu.memory_used_mb,
                gpu.memory_total_mb,
                gpu.load_percent
            );
        }
    }
    html.push_str("</pre></section>");
}

fn render_output(html: &mut String, stdout: &str, stderr: &str, truncated: bool) {
    if !stdout.is_empty() {
        let _ = write!(html, "<pre>{}</pre>", escape(stdout));
    }
    if !stderr.is_empty() {
        let _ = write!(html, "<pre class=\"err\">{}</pre>", escape(stderr));
    }
    if truncated {
        html.push_str("<p class=\"muted\">Output was cut to the display limit.</p>");
    }
}

fn render_editor(html: &mut String, view: &DashboardView) {
    let _ = write!(
        html,
        "<section><h2>Shared Code</h2>\
         <p class=\"muted\">Everyone edits and runs this same buffer.</p>\
         <form method=\"post\">\
         <textarea name=\"source\" rows=\"22\">\n{}</textarea><br>\
         <button formaction=\"/save\">Save code</button> \
         <button formaction=\"/execute\">Run code</button>\
         </form>",
        escape(&view.source)
    );
    if let Some(run) = &view.execution {
        html.push_str("<h3>Result</h3>");
        if run.timed_out {
            html.push_str("<p class=\"err\">Execution timed out</p>");
        } else if let Some(code) = run.exit_code {
            let _ = write!(html, "<p class=\"muted\">Exit code {code}</p>");
        } else if let Some(sig) = run.signal {
            let _ = write!(html, "<p class=\"err\">Killed by signal {sig}</p>");
        }
        render_output(
            html,
            &run.stdout,
            &run.stderr,
            run.stdout_truncated || run.stderr_truncated,
        );
    }
    html.push_str("</section>");
}

fn render_installer(html: &mut String, view: &DashboardView) {
    html.push_str(
        "<section><h2>Package Installer</h2><form method=\"post\" action=\"/install\">\
         <input name=\"package\" placeholder=\"package name\"> \
         <select name=\"suggested\"><option value=\"\"></option>",
    );
    for name in POPULAR_PACKAGES {
        let _ = write!(html, "<option>{name}</option>");
    }
    html.push_str("</select> <button>Install</button></form>");

    if let Some(install) = &view.install {
        html.push_str("<h3>Install result</h3>");
        render_output(
            html,
            &install.stdout,
            &install.stderr,
            install.stdout_truncated || install.stderr_truncated,
        );
        if install.success {
            let _ = write!(
                html,
                "<p class=\"ok\">{} installed</p>",
                escape(&install.package)
            );
        } else if install.timed_out {
            let _ = write!(
                html,
                "<p class=\"err\">{} install timed out</p>",
                escape(&install.package)
            );
        } else {
            let _ = write!(
                html,
                "<p class=\"err\">{} install failed</p>",
                escape(&install.package)
            );
        }
    }

    html.push_str("<h3>Installed packages</h3>");
    match &view.packages {
        Some(Ok(listing)) => {
            html.push_str("<pre>");
            for pkg in &listing.packages {
                let _ = writeln!(html, "{}=={}", escape(&pkg.name), escape(&pkg.version));
            }
            if listing.truncated {
                let _ = writeln!(
                    html,
                    "... showing {} of {} packages ...",
                    listing.packages.len(),
                    listing.total
                );
            }
            html.push_str("</pre>");
        }
        Some(Err(msg)) => {
            let _ = write!(
                html,
                "<p class=\"err\">Could not list packages: {}</p>",
                escape(msg)
            );
        }
        None => {}
    }
    html.push_str("</section>");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packages::Package;

    #[test]
    fn test_escape() {
        assert_eq!(
            escape("<script>alert('x') & \"y\"</script>"),
            "&lt;script&gt;alert(&#39;x&#39;) &amp; &quot;y&quot;&lt;/script&gt;"
        );
    }

    #[test]
    fn test_render_escapes_buffer_content() {
        let view = DashboardView {
            source: "</textarea><b>".to_string(),
            ..Default::default()
        };
        let html = render(&view);
        assert!(html.contains("&lt;/textarea&gt;&lt;b&gt;"));
        assert!(!html.contains("</textarea><b>"));
    }

    #[test]
    fn test_render_listing_marks_truncation() {
        let view = DashboardView {
            packages: Some(Ok(PackageListing {
                packages: vec![Package {
                    name: "numpy".to_string(),
                    version: "1.26.4".to_string(),
                }],
                total: 80,
                truncated: true,
            })),
            ..Default::default()
        };
        let html = render(&view);
        assert!(html.contains("numpy==1.26.4"));
        assert!(html.contains("showing 1 of 80 packages"));
    }

    #[test]
    fn test_render_notices_and_visitor() {
        let view = DashboardView {
            visitor_number: Some(7),
            notices: vec![Notice::Error("disk full".to_string())],
            ..Default::default()
        };
        let html = render(&view);
        assert!(html.contains("visitor <b>#7</b>"));
        assert!(html.contains("<p class=\"err\">disk full</p>"));
    }

    #[test]
    fn test_render_install_marks_cut_output() {
        let mut install = InstallResult {
            run_id: "r1".to_string(),
            package: "numpy".to_string(),
            stdout: "Collecting".to_string(),
            stderr: String::new(),
            exit_code: Some(0),
            timed_out: false,
            stdout_truncated: false,
            stderr_truncated: true,
            success: true,
        };
        let view = DashboardView {
            install: Some(install.clone()),
            ..Default::default()
        };
        let html = render(&view);
        assert!(html.contains("<pre>Collecting</pre>"));
        assert!(html.contains("Output was cut to the display limit"));

        install.stderr_truncated = false;
        let view = DashboardView {
            install: Some(install),
            ..Default::default()
        };
        assert!(!render(&view).contains("Output was cut to the display limit"));
    }
}
