/// Simple example demonstrating how to use the Keycap Check library

use anyhow::Result;
use keycap_check::config::RecognitionConfig;
use keycap_check::utils::output_formatter;
use keycap_check::{analyze, check_image, DetectedCharacter};

fn main() -> Result<()> {
    // Analysis on its own needs no engine
    let detections: Vec<DetectedCharacter> = ["Q", "w", "E", "W", "3", "%"]
        .iter()
        .map(|c| DetectedCharacter::from_char(c))
        .collect();
    let report = analyze(&detections);
    println!("{}", output_formatter::format_report(&report, false));

    // With tesseract installed, check a real photo
    if let Some(path) = std::env::args().nth(1) {
        println!("Checking image: {}", path);
        let analysis = check_image(&path, &RecognitionConfig::default())?;
        println!("{}", output_formatter::format_detections(&analysis.detections));
        println!("{}", output_formatter::format_report(&analysis.report, false));
    }

    Ok(())
}
