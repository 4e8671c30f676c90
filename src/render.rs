//! Confluence storage-format rendering of a [`ReportSummary`].
//!
//! Rows are grouped by status in [`TestStatus::DISPLAY_ORDER`] (failed, errored,
//! skipped, passed) and keep their source order within a group. Rendering reads
//! no clock or environment, so the same summary always yields the same bytes.

use std::fmt;
use std::io::{self, Cursor};

use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

use crate::error::RenderError;
use crate::results::{ReportSummary, TestOutcome, TestStatus};

/// Failure details longer than this are cut and suffixed with an ellipsis.
pub const MAX_DETAIL_CHARS: usize = 2000;

static MACRO_TAG: &str = "ac:structured-macro";
static PARAMETER_TAG: &str = "ac:parameter";
static RICH_TEXT_TAG: &str = "ac:rich-text-body";

type PageWriter = Writer<Cursor<Vec<u8>>>;

/// Rendered page content, ready to send as the `storage` representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageBody(String);

impl PageBody {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn render_page(summary: &ReportSummary) -> Result<PageBody, RenderError> {
    for test in &summary.tests {
        check_test(test)?;
    }
    check_metadata(summary)?;

    let mut writer = Writer::new(Cursor::new(Vec::new()));
    write_page(summary, &mut writer)?;
    let markup = String::from_utf8(writer.into_inner().into_inner())?;
    Ok(PageBody(markup))
}

fn write_page(summary: &ReportSummary, writer: &mut PageWriter) -> io::Result<()> {
    text_element("h1", "Test results", writer)?;

    if !summary.metadata.is_empty() {
        write_metadata(summary, writer)?;
    }

    let c = &summary.counts;
    start_tag("p", writer)?;
    text_element(
        "strong",
        &format!(
            "{} passed, {} failed, {} skipped, {} errors",
            c.passed, c.failed, c.skipped, c.errors
        ),
        writer,
    )?;
    end_tag("p", writer)?;

    for mismatch in &summary.mismatches {
        start_macro("warning", writer)?;
        start_tag(RICH_TEXT_TAG, writer)?;
        text_element("p", &mismatch.to_string(), writer)?;
        end_tag(RICH_TEXT_TAG, writer)?;
        end_tag(MACRO_TAG, writer)?;
    }

    if summary.tests.is_empty() {
        return text_element("p", "No tests ran.", writer);
    }

    let failures: Vec<&TestOutcome> = ordered(summary)
        .into_iter()
        .filter(|t| t.status.is_failure())
        .collect();
    if !failures.is_empty() {
        text_element("h2", "Failures", writer)?;
        start_table(["Test", "Status", "Message"], writer)?;
        for test in failures {
            start_tag("tr", writer)?;
            text_element("td", &test.id(), writer)?;
            start_tag("td", writer)?;
            write_status_lozenge(test.status, writer)?;
            end_tag("td", writer)?;
            start_tag("td", writer)?;
            write_failure(test, writer)?;
            end_tag("td", writer)?;
            end_tag("tr", writer)?;
        }
        end_table(writer)?;
    }

    text_element("h2", "All tests", writer)?;
    start_table(["Test", "Status", "Duration"], writer)?;
    for test in ordered(summary) {
        start_tag("tr", writer)?;
        text_element("td", &test.id(), writer)?;
        start_tag("td", writer)?;
        write_status_lozenge(test.status, writer)?;
        end_tag("td", writer)?;
        text_element("td", &format!("{:.3}s", test.duration_secs), writer)?;
        end_tag("tr", writer)?;
    }
    end_table(writer)
}

fn ordered(summary: &ReportSummary) -> Vec<&TestOutcome> {
    TestStatus::DISPLAY_ORDER
        .iter()
        .flat_map(|status| summary.tests.iter().filter(move |t| t.status == *status))
        .collect()
}

fn metadata_fields(summary: &ReportSummary) -> [(&'static str, Option<&str>); 3] {
    let meta = &summary.metadata;
    [
        ("Run at", meta.timestamp.as_deref()),
        ("Host", meta.hostname.as_deref()),
        ("Platform", meta.platform.as_deref()),
    ]
}

fn write_metadata(summary: &ReportSummary, writer: &mut PageWriter) -> io::Result<()> {
    start_tag("p", writer)?;
    for (label, value) in metadata_fields(summary) {
        if let Some(value) = value {
            text_element("strong", &format!("{label}:"), writer)?;
            text(&format!(" {value} | "), writer)?;
        }
    }
    text_element("strong", "Duration:", writer)?;
    text(&format!(" {:.3}s", summary.duration_secs), writer)?;
    end_tag("p", writer)
}

fn write_failure(test: &TestOutcome, writer: &mut PageWriter) -> io::Result<()> {
    if let Some(msg) = &test.message {
        text(msg, writer)?;
    }
    if let Some(detail) = &test.detail {
        text_element("pre", &truncate(detail), writer)?;
    }
    Ok(())
}

fn truncate(text: &str) -> String {
    match text.char_indices().nth(MAX_DETAIL_CHARS) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

fn write_status_lozenge(status: TestStatus, writer: &mut PageWriter) -> io::Result<()> {
    let colour = match status {
        TestStatus::Passed => "Green",
        TestStatus::Failed | TestStatus::Errored => "Red",
        TestStatus::Skipped => "Yellow",
    };
    start_macro("status", writer)?;
    write_parameter("colour", colour, writer)?;
    write_parameter("title", &status.to_string().to_uppercase(), writer)?;
    end_tag(MACRO_TAG, writer)
}

// --- Markup helpers ---

fn start_macro(name: &str, writer: &mut PageWriter) -> io::Result<()> {
    let mut tag = BytesStart::new(MACRO_TAG);
    tag.push_attribute(("ac:name", name));
    writer.write_event(Event::Start(tag))
}

fn write_parameter(name: &str, value: &str, writer: &mut PageWriter) -> io::Result<()> {
    let mut tag = BytesStart::new(PARAMETER_TAG);
    tag.push_attribute(("ac:name", name));
    writer.write_event(Event::Start(tag))?;
    text(value, writer)?;
    end_tag(PARAMETER_TAG, writer)
}

fn start_table(headings: [&str; 3], writer: &mut PageWriter) -> io::Result<()> {
    start_tag("table", writer)?;
    start_tag("tbody", writer)?;
    start_tag("tr", writer)?;
    for heading in headings {
        text_element("th", heading, writer)?;
    }
    end_tag("tr", writer)
}

fn end_table(writer: &mut PageWriter) -> io::Result<()> {
    end_tag("tbody", writer)?;
    end_tag("table", writer)
}

fn text_element(tag: &str, content: &str, writer: &mut PageWriter) -> io::Result<()> {
    start_tag(tag, writer)?;
    text(content, writer)?;
    end_tag(tag, writer)
}

fn start_tag(tag: &str, writer: &mut PageWriter) -> io::Result<()> {
    writer.write_event(Event::Start(BytesStart::new(tag)))
}

fn end_tag(tag: &str, writer: &mut PageWriter) -> io::Result<()> {
    writer.write_event(Event::End(BytesEnd::new(tag)))
}

fn text(content: &str, writer: &mut PageWriter) -> io::Result<()> {
    writer.write_event(Event::Text(BytesText::new(content)))
}

// --- Character checks ---

fn check_test(test: &TestOutcome) -> Result<(), RenderError> {
    let id = test.id();
    check_text(&id, "name", &id)?;
    if let Some(msg) = &test.message {
        check_text(&id, "message", msg)?;
    }
    if let Some(detail) = &test.detail {
        check_text(&id, "detail", detail)?;
    }
    Ok(())
}

fn check_metadata(summary: &ReportSummary) -> Result<(), RenderError> {
    for (label, value) in metadata_fields(summary) {
        if let Some(value) = value {
            check_text("run metadata", label, value)?;
        }
    }
    Ok(())
}

fn check_text(test: &str, field: &'static str, text: &str) -> Result<(), RenderError> {
    match text.chars().find(|c| !is_xml_char(*c)) {
        Some(c) => Err(RenderError::IllegalCharacter {
            test: test.to_string(),
            field,
            code: c as u32,
        }),
        None => Ok(()),
    }
}

fn is_xml_char(c: char) -> bool {
    matches!(
        c,
        '\t' | '\n'
            | '\r'
            | '\u{20}'..='\u{D7FF}'
            | '\u{E000}'..='\u{FFFD}'
            | '\u{10000}'..='\u{10FFFF}'
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::{parse_junit_str, CountMismatch};

    const NIGHTLY_XML: &str = r#"<testsuites><testsuite name="pytest" tests="4" failures="1" skipped="0" errors="0">
  <testcase classname="tests.test_math" name="test_add" time="0.001"/>
  <testcase classname="tests.test_math" name="test_sub" time="0.002"/>
  <testcase classname="tests.test_math" name="test_mul" time="0.003"><failure message="AssertionError: expected 1, got 2"/></testcase>
  <testcase classname="tests.test_math" name="test_div" time="0.004"/>
</testsuite></testsuites>"#;

    fn nightly() -> ReportSummary {
        parse_junit_str(NIGHTLY_XML).unwrap()
    }

    #[test]
    fn test_summary_line_and_failure_section() {
        let body = render_page(&nightly()).unwrap();
        let body = body.as_str();
        assert!(body.contains("3 passed, 1 failed, 0 skipped"));
        let failures = body.find("<h2>Failures</h2>").unwrap();
        let all = body.find("<h2>All tests</h2>").unwrap();
        assert!(failures < all);
        let section = &body[failures..all];
        assert!(section.contains("tests.test_math::test_mul"));
        assert!(section.contains("AssertionError: expected 1, got 2"));
        assert!(!section.contains("test_add"));
    }

    #[test]
    fn test_failures_listed_before_passes() {
        let body = render_page(&nightly()).unwrap();
        let body = body.as_str();
        let all = body.find("<h2>All tests</h2>").unwrap();
        let table = &body[all..];
        let order: Vec<usize> = ["test_mul", "test_add", "test_sub", "test_div"]
            .iter()
            .map(|name| table.find(name).unwrap())
            .collect();
        assert!(order.windows(2).all(|w| w[0] < w[1]), "{order:?}");
    }

    #[test]
    fn test_status_order_pinned() {
        let xml = r#"<testsuite name="s">
  <testcase name="p1"/>
  <testcase name="s1"><skipped message="later"/></testcase>
  <testcase name="e1"><error message="boom"/></testcase>
  <testcase name="f1"><failure message="no"/></testcase>
  <testcase name="p2"/>
</testsuite>"#;
        let body = render_page(&parse_junit_str(xml).unwrap()).unwrap();
        let body = body.as_str();
        let table = &body[body.find("<h2>All tests</h2>").unwrap()..];
        let pos = |n: &str| table.find(&format!("<td>{n}</td>")).unwrap();
        assert!(pos("f1") < pos("e1"));
        assert!(pos("e1") < pos("s1"));
        assert!(pos("s1") < pos("p1"));
        assert!(pos("p1") < pos("p2"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let summary = nightly().with_platform("Running on linux platform");
        let first = render_page(&summary).unwrap();
        let second = render_page(&summary).unwrap();
        assert_eq!(first.as_str().as_bytes(), second.as_str().as_bytes());
    }

    #[test]
    fn test_markup_in_names_is_escaped() {
        let xml = r#"<testsuite name="s">
  <testcase classname="t" name="test_x[&lt;/td&gt;&lt;script&gt;]"><failure message="a &amp; b &lt; c"/></testcase>
</testsuite>"#;
        let summary = parse_junit_str(xml).unwrap();
        assert_eq!(summary.tests[0].name, "test_x[</td><script>]");
        let body = render_page(&summary).unwrap();
        let body = body.as_str();
        assert!(!body.contains("<script>"));
        assert!(body.contains("test_x[&lt;/td&gt;&lt;script&gt;]"));
        assert!(body.contains("a &amp; b &lt; c"));
        assert_eq!(body.matches("<td>").count(), body.matches("</td>").count());
    }

    #[test]
    fn test_quotes_escaped_and_lozenge_markup() {
        let xml = r#"<testsuite name="s">
  <testcase name="t"><failure message="expected &quot;ok&quot;, got 'err'"/></testcase>
</testsuite>"#;
        let body = render_page(&parse_junit_str(xml).unwrap()).unwrap();
        let body = body.as_str();
        assert!(body.contains("expected &quot;ok&quot;, got &apos;err&apos;"));
        assert!(body.contains(
            "<ac:structured-macro ac:name=\"status\">\
             <ac:parameter ac:name=\"colour\">Red</ac:parameter>\
             <ac:parameter ac:name=\"title\">FAILED</ac:parameter>\
             </ac:structured-macro>"
        ));
    }

    #[test]
    fn test_empty_summary_renders_no_tests_ran() {
        let summary = parse_junit_str("<testsuites/>").unwrap();
        let body = render_page(&summary).unwrap();
        assert!(body.as_str().contains("0 passed, 0 failed, 0 skipped, 0 errors"));
        assert!(body.as_str().contains("<p>No tests ran.</p>"));
        assert!(!body.as_str().contains("<table>"));
    }

    #[test]
    fn test_mismatch_rendered_as_warning() {
        let mut summary = nightly();
        summary.mismatches.push(CountMismatch {
            suite: Some("pytest".to_string()),
            attribute: "tests",
            declared: 9,
            actual: 4,
        });
        let body = render_page(&summary).unwrap();
        assert!(body.as_str().contains("ac:name=\"warning\""));
        assert!(body.as_str().contains("declares tests=9 but contains 4"));
    }

    #[test]
    fn test_metadata_line() {
        let xml = r#"<testsuite name="s" hostname="ci-7" timestamp="2026-10-18T23:05:11"><testcase name="a" time="1.5"/></testsuite>"#;
        let summary = parse_junit_str(xml).unwrap().with_platform("linux");
        let body = render_page(&summary).unwrap();
        assert!(body.as_str().contains(
            "<p><strong>Run at:</strong> 2026-10-18 23:05:11 | <strong>Host:</strong> ci-7 | \
             <strong>Platform:</strong> linux | <strong>Duration:</strong> 1.500s</p>"
        ));
    }

    #[test]
    fn test_control_character_rejected() {
        let mut summary = nightly();
        summary.tests[2].message = Some("bad \u{1b} byte".to_string());
        let err = render_page(&summary).unwrap_err();
        assert!(matches!(err, RenderError::IllegalCharacter { code: 0x1b, field: "message", .. }));
    }

    #[test]
    fn test_long_detail_truncated() {
        let mut summary = nightly();
        summary.tests[2].detail = Some("x".repeat(MAX_DETAIL_CHARS + 50));
        let body = render_page(&summary).unwrap();
        let expected = format!("<pre>{}…</pre>", "x".repeat(MAX_DETAIL_CHARS));
        assert!(body.as_str().contains(&expected));
    }
}
