use super::types::{Grade, RunReport};
use crate::runner::orchestrator::PhaseStatus;
use crate::runner::state::{TestResult, TestStatus};

/// Self-contained HTML page for a run
pub fn render(report: &RunReport) -> String {
    let mut sections = String::new();
    for breakdown in &report.categories {
        let rows: String = report
            .results
            .iter()
            .filter(|r| r.category() == &breakdown.category)
            .map(render_row)
            .collect();

        let class = if breakdown.counts.failed + breakdown.counts.errored > 0 {
            "failed"
        } else {
            "passed"
        };

        sections.push_str(&format!(
            r#"
        <section class="category {class}">
            <div class="category-header">
                <h3>{name}</h3>
                <span class="badge">{passed}/{total} &middot; {rate:.1}%</span>
            </div>
            <div class="rows">{rows}
            </div>
        </section>"#,
            class = class,
            name = html_escape(breakdown.category.label()),
            passed = breakdown.counts.passed,
            total = breakdown.counts.total(),
            rate = breakdown.pass_rate,
            rows = rows,
        ));
    }

    let phases: String = report
        .phases
        .iter()
        .map(|p| {
            let (label, class) = match &p.status {
                PhaseStatus::Completed => ("Completed".to_string(), "passed"),
                PhaseStatus::Interrupted => ("Interrupted".to_string(), "skipped"),
                PhaseStatus::NotStarted => ("Not started".to_string(), "skipped"),
                PhaseStatus::Failed { error } => (format!("Failed: {}", error), "failed"),
            };
            format!(
                r#"
                <tr class="{}"><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>"#,
                class,
                html_escape(&p.phase),
                html_escape(&label),
                p.recorded,
                format_duration(p.duration_ms)
            )
        })
        .collect();

    let grade_class = match report.grade {
        Grade::Excellent | Grade::Good => "passed",
        Grade::Acceptable => "skipped",
        Grade::Critical => "failed",
    };
    let interrupted = if report.interrupted {
        r#"<div class="notice">Run was interrupted before completion</div>"#
    } else {
        ""
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Platform Test Report - {run_id}</title>
    <style>
        :root {{
            --bg: #0a0f1d;
            --panel: #141b2d;
            --border: #374151;
            --text: #f9fafb;
            --muted: #9ca3af;
            --green: #10b981;
            --red: #ef4444;
            --yellow: #f59e0b;
        }}
        * {{ margin: 0; padding: 0; box-sizing: border-box; }}
        body {{ font-family: system-ui, sans-serif; background: var(--bg); color: var(--text); padding: 2rem 1rem; }}
        .container {{ max-width: 1100px; margin: 0 auto; }}
        header {{ display: flex; justify-content: space-between; align-items: flex-end; margin-bottom: 2rem; }}
        h1 {{ font-size: 2rem; font-weight: 800; }}
        .meta {{ color: var(--muted); font-size: 0.875rem; }}
        .grade {{ padding: 1rem 1.5rem; border-radius: 0.75rem; background: var(--panel); border: 1px solid var(--border); margin-bottom: 2rem; font-weight: 700; }}
        .grade.passed {{ color: var(--green); }}
        .grade.failed {{ color: var(--red); }}
        .grade.skipped {{ color: var(--yellow); }}
        .notice {{ color: var(--yellow); margin-bottom: 1.5rem; }}
        .summary {{ display: grid; grid-template-columns: repeat(auto-fit, minmax(160px, 1fr)); gap: 1rem; margin-bottom: 2rem; }}
        .stat {{ background: var(--panel); border: 1px solid var(--border); border-radius: 0.75rem; padding: 1rem; }}
        .stat-value {{ font-size: 2rem; font-weight: 800; }}
        .stat-label {{ color: var(--muted); font-size: 0.75rem; text-transform: uppercase; }}
        .stat.passed .stat-value {{ color: var(--green); }}
        .stat.failed .stat-value {{ color: var(--red); }}
        .stat.skipped .stat-value {{ color: var(--yellow); }}
        table {{ width: 100%; border-collapse: collapse; margin-bottom: 2rem; }}
        td, th {{ padding: 0.5rem; border-bottom: 1px solid var(--border); text-align: left; }}
        tr.failed td {{ color: var(--red); }}
        tr.skipped td {{ color: var(--yellow); }}
        .category {{ background: var(--panel); border: 1px solid var(--border); border-radius: 1rem; margin-bottom: 1.5rem; overflow: hidden; }}
        .category-header {{ display: flex; justify-content: space-between; padding: 1rem 1.5rem; border-bottom: 1px solid var(--border); }}
        .category.failed .badge {{ color: var(--red); }}
        .category.passed .badge {{ color: var(--green); }}
        .rows {{ padding: 0.5rem 1.5rem; }}
        .row {{ display: flex; gap: 1rem; padding: 0.5rem 0; }}
        .row .icon {{ width: 1.5rem; font-weight: 700; }}
        .row.pass .icon {{ color: var(--green); }}
        .row.fail .icon, .row.error .icon {{ color: var(--red); }}
        .row.skip .icon {{ color: var(--yellow); }}
        .row-name {{ font-weight: 600; }}
        .row-meta {{ color: var(--muted); font-size: 0.8rem; }}
        .row-error {{ color: var(--red); font-family: monospace; font-size: 0.8rem; white-space: pre-wrap; }}
    </style>
</head>
<body>
    <div class="container">
        <header>
            <h1>Platform Test Report</h1>
            <div class="meta">Run {run_id} &middot; {generated_at} &middot; {duration}</div>
        </header>
        {interrupted}
        <div class="grade {grade_class}">{headline} ({pass_rate:.1}%)</div>
        <div class="summary">
            <div class="stat"><div class="stat-value">{total}</div><div class="stat-label">Total</div></div>
            <div class="stat passed"><div class="stat-value">{passed}</div><div class="stat-label">Passed</div></div>
            <div class="stat failed"><div class="stat-value">{failed}</div><div class="stat-label">Failed</div></div>
            <div class="stat failed"><div class="stat-value">{errored}</div><div class="stat-label">Errors</div></div>
            <div class="stat skipped"><div class="stat-value">{skipped}</div><div class="stat-label">Skipped</div></div>
        </div>
        <table>
            <tr><th>Phase</th><th>Status</th><th>Rows</th><th>Duration</th></tr>{phases}
        </table>{sections}
    </div>
</body>
</html>
"#,
        run_id = html_escape(&report.run_id),
        generated_at = html_escape(&report.generated_at),
        duration = format_duration(report.duration_ms),
        interrupted = interrupted,
        grade_class = grade_class,
        headline = report.grade.headline(),
        pass_rate = report.pass_rate,
        total = report.total_tests,
        passed = report.totals.passed,
        failed = report.totals.failed,
        errored = report.totals.errored,
        skipped = report.totals.skipped,
        phases = phases,
        sections = sections,
    )
}

fn render_row(row: &TestResult) -> String {
    let (icon, class) = match row.status() {
        TestStatus::Pass => ("✓", "pass"),
        TestStatus::Fail => ("✗", "fail"),
        TestStatus::Error => ("!", "error"),
        TestStatus::Skip => ("○", "skip"),
    };

    let target = row
        .target()
        .map(|t| format!(" &middot; {}", html_escape(t)))
        .unwrap_or_default();
    let error = row
        .error()
        .map(|e| format!(r#"<div class="row-error">{}</div>"#, html_escape(e)))
        .unwrap_or_default();

    format!(
        r#"
                <div class="row {class}">
                    <div class="icon">{icon}</div>
                    <div>
                        <div class="row-name">{name}</div>
                        <div class="row-meta">{details} &middot; {duration}{target}</div>
                        {error}
                    </div>
                </div>"#,
        class = class,
        icon = icon,
        name = html_escape(row.name()),
        details = html_escape(row.details()),
        duration = format_duration(row.duration_ms()),
        target = target,
        error = error,
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        let minutes = ms / 60000;
        let seconds = (ms % 60000) as f64 / 1000.0;
        format!("{}m {:.0}s", minutes, seconds)
    }
}
