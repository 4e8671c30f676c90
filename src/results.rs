use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use console::Style;
use quick_xml::events::Event;
use quick_xml::{DeError, Reader};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ReportParseError;

/// Results file read when `--pytest-xml-path` is not given.
pub const DEFAULT_XML_PATH: &str = "pytest.xml";

// --- JUnit XML deserialization structs ---

#[derive(Debug, Deserialize)]
struct JUnitTestSuites {
    #[serde(rename = "@tests", default)]
    tests: Option<usize>,
    #[serde(rename = "@failures", default)]
    failures: Option<usize>,
    #[serde(rename = "@errors", default)]
    errors: Option<usize>,
    #[serde(rename = "@skipped", default)]
    skipped: Option<usize>,
    #[serde(rename = "testsuite", default)]
    suites: Vec<JUnitTestSuite>,
}

#[derive(Debug, Deserialize)]
struct JUnitTestSuite {
    #[serde(rename = "@name", default)]
    name: String,
    #[serde(rename = "@timestamp", default)]
    timestamp: Option<String>,
    #[serde(rename = "@hostname", default)]
    hostname: Option<String>,
    #[serde(rename = "@tests", default)]
    tests: Option<usize>,
    #[serde(rename = "@failures", default)]
    failures: Option<usize>,
    #[serde(rename = "@errors", default)]
    errors: Option<usize>,
    #[serde(rename = "@skipped", default)]
    skipped: Option<usize>,
    #[serde(rename = "testcase", default)]
    testcases: Vec<JUnitTestCase>,
}

/// Totals a suite (or the root) claims for itself.
#[derive(Debug)]
struct DeclaredCounts {
    tests: Option<usize>,
    failures: Option<usize>,
    errors: Option<usize>,
    skipped: Option<usize>,
}

impl JUnitTestSuites {
    fn declared(&self) -> DeclaredCounts {
        DeclaredCounts {
            tests: self.tests,
            failures: self.failures,
            errors: self.errors,
            skipped: self.skipped,
        }
    }
}

impl JUnitTestSuite {
    fn declared(&self) -> DeclaredCounts {
        DeclaredCounts {
            tests: self.tests,
            failures: self.failures,
            errors: self.errors,
            skipped: self.skipped,
        }
    }
}

/// Element tallies for a group of test cases. A case with both `<failure>` and
/// `<error>` adds to both, matching how pytest fills in `failures` and `errors`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct ElementCounts {
    tests: usize,
    failures: usize,
    errors: usize,
    skipped: usize,
}

impl ElementCounts {
    fn add(&mut self, tc: &JUnitTestCase) {
        self.tests += 1;
        self.failures += usize::from(!tc.failure.is_empty());
        self.errors += usize::from(!tc.error.is_empty());
        self.skipped += usize::from(!tc.skipped.is_empty());
    }

    fn merge(&mut self, other: ElementCounts) {
        self.tests += other.tests;
        self.failures += other.failures;
        self.errors += other.errors;
        self.skipped += other.skipped;
    }
}

#[derive(Debug, Deserialize)]
struct JUnitTestCase {
    #[serde(rename = "@classname", default)]
    classname: String,
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@time", default)]
    time: f64,
    #[serde(default)]
    error: Vec<JUnitIssue>,
    #[serde(default)]
    failure: Vec<JUnitIssue>,
    #[serde(default)]
    skipped: Vec<JUnitIssue>,
}

/// Body of a `<failure>`, `<error>` or `<skipped>` element.
#[derive(Debug, Deserialize)]
struct JUnitIssue {
    #[serde(rename = "@message", default)]
    message: Option<String>,
    #[serde(rename = "$text", default)]
    text: Option<String>,
}

// --- Output structs ---

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
    Errored,
}

impl TestStatus {
    /// Order in which statuses are listed on the rendered page.
    pub const DISPLAY_ORDER: [TestStatus; 4] = [
        TestStatus::Failed,
        TestStatus::Errored,
        TestStatus::Skipped,
        TestStatus::Passed,
    ];

    pub fn is_failure(self) -> bool {
        matches!(self, TestStatus::Failed | TestStatus::Errored)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Passed => write!(f, "passed"),
            TestStatus::Failed => write!(f, "failed"),
            TestStatus::Skipped => write!(f, "skipped"),
            TestStatus::Errored => write!(f, "error"),
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct TestOutcome {
    pub classname: String,
    pub name: String,
    pub status: TestStatus,
    pub duration_secs: f64,
    pub message: Option<String>,
    pub detail: Option<String>,
}

impl TestOutcome {
    /// `classname::name`, or just the name when the case has no class.
    pub fn id(&self) -> String {
        if self.classname.is_empty() {
            self.name.clone()
        } else {
            format!("{}::{}", self.classname, self.name)
        }
    }
}

#[derive(Debug, Serialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl StatusCounts {
    fn from_tests<'a>(tests: impl IntoIterator<Item = &'a TestOutcome>) -> Self {
        let mut counts = StatusCounts::default();
        for test in tests {
            counts.total += 1;
            match test.status {
                TestStatus::Passed => counts.passed += 1,
                TestStatus::Failed => counts.failed += 1,
                TestStatus::Skipped => counts.skipped += 1,
                TestStatus::Errored => counts.errors += 1,
            }
        }
        counts
    }
}

/// A total declared in the results file that disagrees with the test cases it contains.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct CountMismatch {
    /// Suite name, or `None` for the `<testsuites>` root.
    pub suite: Option<String>,
    pub attribute: &'static str,
    pub declared: usize,
    pub actual: usize,
}

impl fmt::Display for CountMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.suite {
            Some(name) => write!(f, "suite `{name}`")?,
            None => write!(f, "report")?,
        }
        write!(
            f,
            " declares {}={} but contains {}",
            self.attribute, self.declared, self.actual
        )
    }
}

#[derive(Debug, Serialize, Clone, Default, PartialEq)]
pub struct RunMetadata {
    pub timestamp: Option<String>,
    pub hostname: Option<String>,
    pub platform: Option<String>,
    pub suite_names: Vec<String>,
}

impl RunMetadata {
    pub fn is_empty(&self) -> bool {
        self.timestamp.is_none() && self.hostname.is_none() && self.platform.is_none()
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ReportSummary {
    pub counts: StatusCounts,
    pub duration_secs: f64,
    pub metadata: RunMetadata,
    pub mismatches: Vec<CountMismatch>,
    pub tests: Vec<TestOutcome>,
}

impl ReportSummary {
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.metadata.platform = Some(platform.into());
        self
    }
}

// --- ANSI stripping ---

static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").expect("invalid ANSI regex"));

fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPE.replace_all(text, "").to_string()
}

// --- JUnit XML parser ---

/// Parse a JUnit XML file into a [`ReportSummary`].
pub fn parse_junit_xml(xml_path: &Path) -> Result<ReportSummary, ReportParseError> {
    let xml_content = fs::read_to_string(xml_path).map_err(|source| ReportParseError::Read {
        path: xml_path.to_path_buf(),
        source,
    })?;
    parse_junit_str(&xml_content).map_err(|e| e.with_path(xml_path))
}

/// Parse JUnit XML content. Accepts a `<testsuites>` root or a single `<testsuite>` root.
pub fn parse_junit_str(xml_content: &str) -> Result<ReportSummary, ReportParseError> {
    let xml_err = |source: DeError| ReportParseError::Xml { path: None, source };

    let (suites, root_declared) = match root_element(xml_content)?.as_str() {
        "testsuites" => {
            let parsed: JUnitTestSuites = quick_xml::de::from_str(xml_content).map_err(xml_err)?;
            let declared = parsed.declared();
            (parsed.suites, Some(declared))
        }
        "testsuite" => {
            let parsed: JUnitTestSuite = quick_xml::de::from_str(xml_content).map_err(xml_err)?;
            (vec![parsed], None)
        }
        other => {
            return Err(ReportParseError::Schema {
                path: None,
                root: other.to_string(),
            });
        }
    };

    let mut tests = Vec::new();
    let mut mismatches = Vec::new();
    let mut metadata = RunMetadata::default();
    let mut total_duration = 0.0;
    let mut root_elements = ElementCounts::default();

    for suite in suites {
        let declared = suite.declared();
        let mut elements = ElementCounts::default();
        for tc in &suite.testcases {
            elements.add(tc);
        }
        mismatches.extend(reconcile(Some(suite.name.as_str()), &declared, &elements));
        root_elements.merge(elements);

        let suite_tests: Vec<TestOutcome> = suite.testcases.into_iter().map(to_outcome).collect();

        if metadata.timestamp.is_none() {
            metadata.timestamp = suite.timestamp.as_deref().map(normalize_timestamp);
        }
        if metadata.hostname.is_none() {
            metadata.hostname = suite.hostname.filter(|h| !h.is_empty());
        }
        if !suite.name.is_empty() {
            metadata.suite_names.push(suite.name);
        }

        total_duration += suite_tests.iter().map(|t| t.duration_secs).sum::<f64>();
        tests.extend(suite_tests);
    }

    let counts = StatusCounts::from_tests(&tests);
    if let Some(declared) = root_declared {
        mismatches.extend(reconcile(None, &declared, &root_elements));
    }

    Ok(ReportSummary {
        counts,
        duration_secs: total_duration,
        metadata,
        mismatches,
        tests,
    })
}

fn root_element(xml_content: &str) -> Result<String, ReportParseError> {
    let mut reader = Reader::from_str(xml_content);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Ok(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Ok(Event::Eof) => return Err(ReportParseError::NoRoot { path: None }),
            Ok(_) => continue,
            Err(e) => {
                return Err(ReportParseError::Xml {
                    path: None,
                    source: DeError::InvalidXml(e),
                });
            }
        }
    }
}

fn to_outcome(tc: JUnitTestCase) -> TestOutcome {
    let (status, issue) = if let Some(issue) = tc.error.into_iter().next() {
        (TestStatus::Errored, Some(issue))
    } else if let Some(issue) = tc.failure.into_iter().next() {
        (TestStatus::Failed, Some(issue))
    } else if let Some(issue) = tc.skipped.into_iter().next() {
        (TestStatus::Skipped, Some(issue))
    } else {
        (TestStatus::Passed, None)
    };

    let (message, detail) = match issue {
        Some(issue) => {
            let detail = issue
                .text
                .map(|t| strip_ansi(t.trim()))
                .filter(|t| !t.is_empty());
            let message = issue
                .message
                .map(|m| strip_ansi(m.trim()))
                .filter(|m| !m.is_empty())
                .or_else(|| {
                    detail
                        .as_deref()
                        .and_then(|d| d.lines().next())
                        .map(|l| l.to_string())
                });
            (message, detail)
        }
        None => (None, None),
    };

    TestOutcome {
        classname: tc.classname,
        name: tc.name,
        status,
        duration_secs: tc.time,
        message,
        detail,
    }
}

fn reconcile(
    suite: Option<&str>,
    declared: &DeclaredCounts,
    actual: &ElementCounts,
) -> Vec<CountMismatch> {
    let pairs = [
        ("tests", declared.tests, actual.tests),
        ("failures", declared.failures, actual.failures),
        ("errors", declared.errors, actual.errors),
        ("skipped", declared.skipped, actual.skipped),
    ];
    pairs
        .into_iter()
        .filter_map(|(attribute, declared, actual)| {
            let declared = declared?;
            (declared != actual).then(|| CountMismatch {
                suite: suite.map(|s| s.to_string()),
                attribute,
                declared,
                actual,
            })
        })
        .collect()
}

/// Render a suite timestamp as `YYYY-MM-DD HH:MM:SS`, keeping the offset when one is given.
fn normalize_timestamp(raw: &str) -> String {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return dt.format("%Y-%m-%d %H:%M:%S %:z").to_string();
    }
    match chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        Ok(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        Err(_) => raw.to_string(),
    }
}

// --- Console output ---

/// Print per-test results to stdout with colors.
pub fn print_results(summary: &ReportSummary) {
    let green = Style::new().green().bold();
    let red = Style::new().red().bold();
    let yellow = Style::new().yellow().bold();

    println!();
    println!("Test Results:");
    println!("{}", "-".repeat(60));

    for test in &summary.tests {
        let status = match test.status {
            TestStatus::Passed => green.apply_to("[PASS] "),
            TestStatus::Failed => red.apply_to("[FAIL] "),
            TestStatus::Errored => red.apply_to("[ERROR]"),
            TestStatus::Skipped => yellow.apply_to("[SKIP] "),
        };

        println!("{} {} ({:.3}s)", status, test.id(), test.duration_secs);

        if let Some(ref msg) = test.message {
            if let Some(first_line) = msg.lines().next() {
                println!("        {}", first_line);
            }
        }
    }

    let c = &summary.counts;
    println!("{}", "-".repeat(60));
    println!(
        "{} passed, {} failed, {} skipped, {} errors ({:.1}s total)",
        c.passed, c.failed, c.skipped, c.errors, summary.duration_secs
    );
    for mismatch in &summary.mismatches {
        println!("{} {}", yellow.apply_to("warning:"), mismatch);
    }
    println!();
}

/// Write the summary as pretty-printed JSON to a file.
pub fn write_json(summary: &ReportSummary, output_path: &Path) -> Result<()> {
    let json =
        serde_json::to_string_pretty(summary).context("Failed to serialize results to JSON")?;
    fs::write(output_path, json)
        .with_context(|| format!("Failed to write results to {}", output_path.display()))?;
    Ok(())
}
