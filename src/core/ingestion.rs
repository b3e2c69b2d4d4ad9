/// Conversion of engine output into detections

use log::debug;

use crate::core::model::DetectedCharacter;
use crate::core::recognizer::{Recognition, RecognitionError, RecognizedSymbol, Recognizer};
use crate::utils::image_utils::KeyboardImage;

impl TryFrom<&RecognizedSymbol> for DetectedCharacter {
    type Error = RecognitionError;

    /// Size is `x1 - x0` by `y1 - y0`; a box whose extent does not fit in
    /// `i32` is malformed engine data.
    fn try_from(symbol: &RecognizedSymbol) -> Result<Self, Self::Error> {
        let bbox = symbol.bbox;
        let extent = |from: i32, to: i32| {
            to.checked_sub(from).ok_or_else(|| {
                RecognitionError::Malformed(format!(
                    "bounding box of {:?} overflows: {:?}",
                    symbol.text, bbox
                ))
            })
        };

        Ok(Self {
            char: symbol.text.clone(),
            x: bbox.x0,
            y: bbox.y0,
            width: extent(bbox.x0, bbox.x1)?,
            height: extent(bbox.y0, bbox.y1)?,
            confidence: symbol.confidence,
        })
    }
}

/// Flatten words into one detection per symbol.
///
/// Order follows the engine (word, then symbol). Nothing is filtered: empty
/// or whitespace-only symbol text is kept as it is. One malformed box fails
/// the whole recognition.
pub fn ingest(recognition: &Recognition) -> Result<Vec<DetectedCharacter>, RecognitionError> {
    recognition
        .words
        .iter()
        .flat_map(|word| word.symbols.iter())
        .map(DetectedCharacter::try_from)
        .collect()
}

/// Run the engine on an image and ingest the result.
///
/// Engine failures are returned unchanged; no partial detections are produced.
pub fn recognize_characters(
    recognizer: &dyn Recognizer,
    image: &KeyboardImage,
) -> Result<Vec<DetectedCharacter>, RecognitionError> {
    let recognition = recognizer.recognize(image)?;
    let detections = ingest(&recognition)?;
    debug!(
        "{} produced {} detections in {} words for {}",
        recognizer.name(),
        detections.len(),
        recognition.words.len(),
        image.name()
    );
    Ok(detections)
}
