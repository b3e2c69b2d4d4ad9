/// Output formatter for keycap reports
///
/// This module renders analysis results for the console and exports them as
/// JSON, HTML and CSV. It only presents reports; it never changes them.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use handlebars::Handlebars;
use serde_json::{json, Value};

use crate::core::model::{AnalysisReport, DetectedCharacter, ImageAnalysis};

fn join_chars(chars: &[char]) -> String {
    chars.iter().map(char::to_string).collect::<Vec<_>>().join(", ")
}

fn or_none(list: String) -> String {
    if list.is_empty() {
        "None".to_string()
    } else {
        list
    }
}

/// Show a detected value so blanks stay visible
fn printable(value: &str) -> String {
    if value.trim().is_empty() {
        format!("{:?}", value)
    } else {
        value.to_string()
    }
}

/// Format detections, one line each with position and size
pub fn format_detections(detections: &[DetectedCharacter]) -> String {
    let mut output = format!("{}\n", "Detected Characters:".bold());
    for d in detections {
        output.push_str(&format!(
            "Character: {}, X: {}, Y: {}, Width: {}, Height: {}",
            printable(&d.char),
            d.x,
            d.y,
            d.width,
            d.height
        ));
        if let Some(confidence) = d.confidence {
            output.push_str(&format!(", Confidence: {:.1}", confidence));
        }
        output.push('\n');
    }
    output
}

/// Format an analysis report for console output
///
/// # Arguments
///
/// * `report` - Report to render
/// * `use_markdown` - Whether to wrap the output in markdown triple backticks
pub fn format_report(report: &AnalysisReport, use_markdown: bool) -> String {
    let mut output = String::new();

    if use_markdown {
        output.push_str("```\n");
    }

    output.push_str(&format!("{}\n", "=== Analysis Results ===".yellow().bold()));
    output.push_str(&format!(
        "{} {}\n",
        "Total Characters Detected:".cyan().bold(),
        report.total_detected
    ));

    output.push_str(&format!(
        "\n{} {}\n",
        "Missing Numbers:".cyan().bold(),
        or_none(join_chars(&report.missing_numbers))
    ));
    output.push_str(&format!(
        "\n{} {}\n",
        "Missing Letters:".cyan().bold(),
        or_none(join_chars(&report.missing_letters))
    ));

    let unexpected: Vec<String> = report
        .unique_unexpected()
        .into_iter()
        .map(printable)
        .collect();
    output.push_str(&format!(
        "\n{} {}\n",
        "Unexpected Characters:".cyan().bold(),
        or_none(unexpected.join(", "))
    ));

    output.push_str(&format!("\n{}\n", "Duplicate Characters:".cyan().bold()));
    if report.duplicates.is_empty() {
        output.push_str("None\n");
    }
    for (c, count) in &report.duplicates {
        output.push_str(&format!("{}: found {} times\n", printable(c), count));
    }

    if use_markdown {
        output.push_str("```\n");
    }

    output
}

/// Build the JSON document for one checked image
pub fn analysis_to_json(analysis: &ImageAnalysis) -> Result<Value> {
    serde_json::to_value(analysis).context("Failed to serialize analysis")
}

/// Export one image's analysis to a JSON file
pub fn export_report_json(analysis: &ImageAnalysis, output_path: &Path) -> Result<()> {
    let file = File::create(output_path)
        .context(format!("Failed to create JSON output file: {}", output_path.display()))?;

    serde_json::to_writer_pretty(file, &analysis_to_json(analysis)?)
        .context("Failed to write JSON data")?;

    Ok(())
}

const HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Keycap Check Report</title>
    <style>
        body { font-family: Arial, sans-serif; line-height: 1.6; color: #333; max-width: 1200px; margin: 0 auto; padding: 20px; }
        h1 { color: #2c3e50; border-bottom: 2px solid #3498db; padding-bottom: 10px; }
        h2 { color: #2980b9; margin-top: 30px; }
        .timestamp { color: #7f8c8d; font-size: 0.9em; margin-bottom: 30px; }
        .summary { background-color: #e8f4f8; padding: 15px; border-radius: 5px; margin-bottom: 30px; }
        .ok { color: #27ae60; font-weight: bold; }
        .fail { color: #c0392b; font-weight: bold; }
        .section { background-color: #f8f9fa; border-radius: 5px; padding: 15px; margin-bottom: 20px; }
        .photo { max-width: 100%; border: 1px solid #ddd; }
        table { border-collapse: collapse; }
        td, th { border: 1px solid #ddd; padding: 4px 10px; text-align: left; }
    </style>
</head>
<body>
    <h1>Keycap Check Report</h1>
    <div class="timestamp">Generated on: {{timestamp}}</div>

    <div class="summary">
        <h2>{{image}}</h2>
        <p>Engine: {{engine}} &middot; SHA-256: {{sha256}}</p>
        <p>Total characters detected: {{report.totalDetected}}</p>
        {{#if complete}}<p class="ok">All keycaps found</p>{{else}}<p class="fail">Keyboard incomplete</p>{{/if}}
    </div>

    {{#if data_url}}<img class="photo" src="{{data_url}}" alt="{{image}}">{{/if}}

    <div class="section">
        <h2>Missing Numbers</h2>
        <p>{{#each report.missingNumbers}}{{this}} {{else}}None{{/each}}</p>
        <h2>Missing Letters</h2>
        <p>{{#each report.missingLetters}}{{this}} {{else}}None{{/each}}</p>
        <h2>Unexpected Characters</h2>
        <p>{{#each unexpected}}<code>{{this}}</code> {{else}}None{{/each}}</p>
        <h2>Duplicate Characters</h2>
        <ul>{{#each report.duplicates}}<li>{{@key}}: found {{this}} times</li>{{else}}<li>None</li>{{/each}}</ul>
    </div>

    <div class="section">
        <h2>Detections</h2>
        <table>
            <tr><th>Character</th><th>X</th><th>Y</th><th>Width</th><th>Height</th><th>Confidence</th></tr>
            {{#each detections}}
            <tr><td><code>{{char}}</code></td><td>{{x}}</td><td>{{y}}</td><td>{{width}}</td><td>{{height}}</td><td>{{confidence}}</td></tr>
            {{/each}}
        </table>
    </div>
</body>
</html>
"#;

/// Render the HTML report for one image, with the photo embedded as a data URL
pub fn render_html_report(analysis: &ImageAnalysis) -> Result<String> {
    let mut handlebars = Handlebars::new();
    handlebars
        .register_template_string("report", HTML_TEMPLATE)
        .context("Failed to register HTML template")?;

    let data = json!({
        "timestamp": chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        "image": analysis.image,
        "engine": analysis.engine,
        "sha256": analysis.sha256,
        "data_url": analysis.data_url,
        "complete": analysis.report.is_complete(),
        "unexpected": analysis.report.unique_unexpected(),
        "report": analysis.report,
        "detections": analysis.detections,
    });

    handlebars
        .render("report", &data)
        .context("Failed to render HTML template")
}

/// Create an HTML report file
pub fn create_html_report(analysis: &ImageAnalysis, output_path: &Path) -> Result<()> {
    let html = render_html_report(analysis)?;

    let mut file = File::create(output_path)
        .context(format!("Failed to create HTML output file: {}", output_path.display()))?;
    file.write_all(html.as_bytes())
        .context("Failed to write HTML data")?;

    Ok(())
}

/// Write the report as `Category,Value,Count` rows
pub fn write_csv_report<W: Write>(report: &AnalysisReport, writer: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);

    writer
        .write_record(["Category", "Value", "Count"])
        .context("Failed to write CSV header")?;

    for c in &report.missing_numbers {
        let value = c.to_string();
        writer.write_record(["Missing Number", value.as_str(), ""])?;
    }
    for c in &report.missing_letters {
        let value = c.to_string();
        writer.write_record(["Missing Letter", value.as_str(), ""])?;
    }
    for c in &report.unexpected_chars {
        writer.write_record(["Unexpected", c.as_str(), ""])?;
    }
    for (c, count) in &report.duplicates {
        let count = count.to_string();
        writer.write_record(["Duplicate", c.as_str(), count.as_str()])?;
    }
    let total = report.total_detected.to_string();
    writer.write_record(["Total Detected", "", total.as_str()])?;

    writer.flush().context("Failed to flush CSV writer")?;
    Ok(())
}

/// Create a CSV report file
pub fn create_csv_report(report: &AnalysisReport, output_path: &Path) -> Result<()> {
    let file = File::create(output_path)
        .context(format!("Failed to create CSV output file: {}", output_path.display()))?;
    write_csv_report(report, file)
}

/// Create a summary of results for multiple images
pub fn create_summary(analyses: &[ImageAnalysis]) -> String {
    let mut output = String::new();

    output.push_str(&format!("{}\n\n", "Check Summary".yellow().bold()));
    output.push_str(&format!("Images checked: {}\n", analyses.len()));

    let complete = analyses.iter().filter(|a| a.report.is_complete()).count();
    output.push_str(&format!("Complete keyboards: {}\n", complete));
    output.push_str(&format!("Incomplete keyboards: {}\n\n", analyses.len() - complete));

    let mut incomplete: Vec<_> = analyses.iter().filter(|a| !a.report.is_complete()).collect();
    if !incomplete.is_empty() {
        output.push_str(&format!("{}\n", "Incomplete Images".cyan().bold()));
        // Worst first
        incomplete.sort_by(|a, b| b.report.missing_count().cmp(&a.report.missing_count()));
        for (i, analysis) in incomplete.iter().enumerate() {
            output.push_str(&format!(
                "{}. {}: {} missing, {} unexpected, {} duplicated\n",
                i + 1,
                analysis.image,
                analysis.report.missing_count(),
                analysis.report.unexpected_chars.len(),
                analysis.report.duplicates.len()
            ));
        }
    }

    output
}
