use super::types::RunReport;
use crate::runner::state::{Category, TestResult, TestStatus};
use crate::runner::recorder::StatusCounts;
use anyhow::Result;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;

fn seconds(ms: u64) -> String {
    format!("{:.3}", ms as f64 / 1000.0)
}

fn push_counts(start: &mut BytesStart, counts: &StatusCounts) {
    start.push_attribute(("tests", counts.total().to_string().as_str()));
    start.push_attribute(("failures", counts.failed.to_string().as_str()));
    start.push_attribute(("errors", counts.errored.to_string().as_str()));
    start.push_attribute(("skipped", counts.skipped.to_string().as_str()));
}

/// JUnit XML with one `<testsuite>` per category
pub fn render(report: &RunReport) -> Result<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut suites = BytesStart::new("testsuites");
    suites.push_attribute(("name", "lumi-e2e"));
    suites.push_attribute(("id", report.run_id.as_str()));
    push_counts(&mut suites, &report.totals);
    suites.push_attribute(("time", seconds(report.duration_ms).as_str()));
    writer.write_event(Event::Start(suites))?;

    for breakdown in &report.categories {
        let rows: Vec<&TestResult> = report
            .results
            .iter()
            .filter(|r| r.category() == &breakdown.category)
            .collect();
        let time: u64 = rows.iter().map(|r| r.duration_ms()).sum();

        let mut suite = BytesStart::new("testsuite");
        suite.push_attribute(("name", breakdown.category.label()));
        push_counts(&mut suite, &breakdown.counts);
        suite.push_attribute(("time", seconds(time).as_str()));
        suite.push_attribute(("timestamp", report.generated_at.as_str()));
        writer.write_event(Event::Start(suite))?;

        for row in rows {
            write_test_case(&mut writer, &breakdown.category, row)?;
        }

        writer.write_event(Event::End(BytesEnd::new("testsuite")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("testsuites")))?;

    let xml = String::from_utf8(writer.into_inner().into_inner())?;
    Ok(xml)
}

fn write_test_case<W: std::io::Write>(
    writer: &mut Writer<W>,
    category: &Category,
    row: &TestResult,
) -> Result<()> {
    let classname = format!("lumi_e2e.{}", category.label().replace(' ', "_"));
    let mut case = BytesStart::new("testcase");
    case.push_attribute(("name", row.name()));
    case.push_attribute(("classname", classname.as_str()));
    case.push_attribute(("time", seconds(row.duration_ms()).as_str()));

    let element = match row.status() {
        TestStatus::Pass => None,
        TestStatus::Fail => Some("failure"),
        TestStatus::Error => Some("error"),
        TestStatus::Skip => Some("skipped"),
    };

    let Some(element) = element else {
        writer.write_event(Event::Empty(case))?;
        return Ok(());
    };

    writer.write_event(Event::Start(case))?;

    let mut inner = BytesStart::new(element);
    inner.push_attribute(("message", row.details()));
    if let Some(kind) = row.kind() {
        inner.push_attribute(("type", kind.as_str()));
    }
    match row.error() {
        Some(err) => {
            writer.write_event(Event::Start(inner))?;
            writer.write_event(Event::Text(BytesText::new(err)))?;
            writer.write_event(Event::End(BytesEnd::new(element)))?;
        }
        None => writer.write_event(Event::Empty(inner))?,
    }

    writer.write_event(Event::End(BytesEnd::new("testcase")))?;
    Ok(())
}
