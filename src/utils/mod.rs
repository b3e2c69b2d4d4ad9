/// Utility modules for keycap checks
///
/// This module contains image loading helpers and report formatting.

pub mod image_utils;
pub mod output_formatter;
