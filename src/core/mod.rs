/// Core module for keycap checks
///
/// This module contains the expected alphabet, the recognition engine boundary,
/// ingestion of engine output and the analyzer that produces reports.

pub mod alphabet;
pub mod analyzer;
pub mod ingestion;
pub mod model;
pub mod recognizer;
