/// Recognition engine boundary
///
/// The engine is an external collaborator: it receives image bytes and returns
/// words made of recognized symbols with bounding boxes. Everything in this
/// module is about talking to that collaborator and decoding what it returns;
/// no analysis happens here.

use std::io::{self, Read, Write};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use crate::config::RecognitionConfig;
use crate::utils::image_utils::KeyboardImage;

/// Failure of the recognition collaborator.
///
/// Raised when the engine cannot run, fails, or returns data that cannot be
/// decoded. It always carries the underlying cause.
#[derive(Debug, thiserror::Error)]
pub enum RecognitionError {
    #[error("Failed to start recognition engine `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error while talking to the recognition engine: {0}")]
    Io(#[from] io::Error),

    #[error("Recognition engine exited with {status}: {stderr}")]
    EngineFailed { status: String, stderr: String },

    #[error("Recognition engine timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Malformed recognition output: {0}")]
    Malformed(String),

    #[error("Failed to decode recognition data: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Symbol bounding box, corners in image pixels with a top-left origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

/// One recognized symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedSymbol {
    pub text: String,
    pub bbox: BoundingBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// A group of symbols the engine considered one word
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedWord {
    #[serde(default)]
    pub text: String,
    pub symbols: Vec<RecognizedSymbol>,
}

/// Complete engine output for one image
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recognition {
    pub words: Vec<RecognizedWord>,
}

impl Recognition {
    /// Total number of symbols across all words
    pub fn symbol_count(&self) -> usize {
        self.words.iter().map(|w| w.symbols.len()).sum()
    }
}

/// A recognition engine that turns image bytes into words and symbols
pub trait Recognizer: Send + Sync {
    /// Short engine name used in logs and reports
    fn name(&self) -> &str;

    /// Run recognition on one image
    fn recognize(&self, image: &KeyboardImage) -> Result<Recognition, RecognitionError>;
}

/// Tesseract driven through its command-line executable
///
/// The image is streamed on stdin and the engine writes hOCR with character
/// boxes, which carries word grouping and a confidence for every symbol.
pub struct TesseractCli {
    config: RecognitionConfig,
}

impl TesseractCli {
    pub fn new(config: RecognitionConfig) -> Self {
        Self { config }
    }

    /// Check that the configured executable can be started
    pub fn is_available(&self) -> bool {
        Command::new(&self.config.tesseract_path)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    /// Build the engine invocation from the configuration
    fn build_command(&self) -> Command {
        let config = &self.config;
        let mut command = Command::new(&config.tesseract_path);
        command
            .arg("stdin")
            .arg("stdout")
            .arg("-l")
            .arg(&config.language)
            .arg("--psm")
            .arg(config.page_seg_mode.to_string())
            .arg("--oem")
            .arg(config.engine_mode.to_string());

        if !config.char_whitelist.is_empty() {
            command
                .arg("-c")
                .arg(format!("tessedit_char_whitelist={}", config.char_whitelist));
        }
        for (name, value) in &config.variables {
            command.arg("-c").arg(format!("{}={}", name, value));
        }

        command.arg("-c").arg("hocr_char_boxes=1");
        command.arg("hocr");
        command
    }

    /// Run the engine with the image on stdin and collect its stdout
    fn run(&self, bytes: &[u8]) -> Result<String, RecognitionError> {
        let program = self.config.tesseract_path.clone();
        let mut child = self
            .build_command()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RecognitionError::Spawn { program, source })?;

        let (mut stdin, mut stdout, mut stderr) =
            match (child.stdin.take(), child.stdout.take(), child.stderr.take()) {
                (Some(i), Some(o), Some(e)) => (i, o, e),
                _ => {
                    let _ = child.kill();
                    return Err(io::Error::new(io::ErrorKind::Other, "engine pipes unavailable").into());
                }
            };

        let input = bytes.to_vec();
        let writer = thread::spawn(move || stdin.write_all(&input));
        let out_reader = thread::spawn(move || {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).map(|_| buf)
        });
        let err_reader = thread::spawn(move || {
            let mut buf = String::new();
            stderr.read_to_string(&mut buf).map(|_| buf)
        });

        let status = self.wait(&mut child)?;

        let output = join(out_reader)??;
        let diagnostics = join(err_reader)??;
        for line in diagnostics.lines().filter(|l| !l.trim().is_empty()) {
            debug!("tesseract: {}", line);
        }

        if !status.success() {
            return Err(RecognitionError::EngineFailed {
                status: status.to_string(),
                stderr: diagnostics.trim().to_string(),
            });
        }

        // The engine may stop reading early once it has decoded the image
        if let Err(e) = join(writer)? {
            if e.kind() != io::ErrorKind::BrokenPipe {
                return Err(e.into());
            }
        }

        String::from_utf8(output)
            .map_err(|e| RecognitionError::Malformed(format!("engine output is not UTF-8: {}", e)))
    }

    /// Wait for the engine, killing it once the configured timeout elapses
    fn wait(&self, child: &mut Child) -> Result<ExitStatus, RecognitionError> {
        if self.config.timeout_seconds == 0 {
            return Ok(child.wait()?);
        }

        let timeout = Duration::from_secs(self.config.timeout_seconds);
        let start = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if start.elapsed() >= timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(RecognitionError::TimedOut(timeout));
            }
            thread::sleep(Duration::from_millis(25));
        }
    }
}

fn join<T>(handle: thread::JoinHandle<T>) -> Result<T, RecognitionError> {
    handle
        .join()
        .map_err(|_| io::Error::new(io::ErrorKind::Other, "engine I/O thread panicked").into())
}

impl Recognizer for TesseractCli {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(&self, image: &KeyboardImage) -> Result<Recognition, RecognitionError> {
        info!("Running tesseract on {}", image.name());
        let output = self.run(&image.bytes)?;
        parse_hocr(&output)
    }
}

fn selector(css: &str) -> Result<Selector, RecognitionError> {
    Selector::parse(css).map_err(|e| RecognitionError::Malformed(format!("selector {:?}: {:?}", css, e)))
}

/// Split an hOCR `title` attribute into its `name values` properties
fn title_property<'a>(element: &ElementRef<'a>, name: &str) -> Option<&'a str> {
    element
        .value()
        .attr("title")?
        .split(';')
        .map(str::trim)
        .find_map(|prop| prop.strip_prefix(name).filter(|rest| rest.starts_with(' ')))
        .map(str::trim)
}

fn parse_bbox(values: &str) -> Result<BoundingBox, RecognitionError> {
    let coords = values
        .split_whitespace()
        .map(|v| {
            v.parse::<i32>()
                .map_err(|_| RecognitionError::Malformed(format!("invalid coordinate {:?}", v)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    match coords[..] {
        [x0, y0, x1, y1] => Ok(BoundingBox { x0, y0, x1, y1 }),
        _ => Err(RecognitionError::Malformed(format!(
            "expected 4 coordinates, found {}: {:?}",
            coords.len(),
            values
        ))),
    }
}

/// Decode tesseract hOCR produced with `hocr_char_boxes=1`.
///
/// Words are `ocrx_word` spans; each holds `ocrx_cinfo` spans whose title
/// carries `x_bboxes x0 y0 x1 y1` (top-left origin) and `x_conf`. A word
/// with no character spans means the engine ignored `hocr_char_boxes`.
pub fn parse_hocr(hocr: &str) -> Result<Recognition, RecognitionError> {
    let document = Html::parse_document(hocr);
    let word_selector = selector("span.ocrx_word")?;
    let char_selector = selector("span.ocrx_cinfo")?;

    let mut words = Vec::new();
    for word in document.select(&word_selector) {
        let text = word.text().collect::<String>().trim().to_string();

        let mut symbols = Vec::new();
        for cinfo in word.select(&char_selector) {
            let bboxes = title_property(&cinfo, "x_bboxes").ok_or_else(|| {
                RecognitionError::Malformed(format!("character {:?} has no x_bboxes", cinfo.html()))
            })?;
            let confidence = match title_property(&cinfo, "x_conf") {
                Some(value) => Some(value.parse::<f64>().map_err(|_| {
                    RecognitionError::Malformed(format!("invalid x_conf {:?}", value))
                })?),
                None => None,
            };

            symbols.push(RecognizedSymbol {
                text: cinfo.text().collect(),
                bbox: parse_bbox(bboxes)?,
                confidence,
            });
        }

        if symbols.is_empty() && !text.is_empty() {
            return Err(RecognitionError::Malformed(format!(
                "word {:?} has no character boxes (tesseract 4.1+ with hocr_char_boxes is required)",
                text
            )));
        }
        words.push(RecognizedWord { text, symbols });
    }

    Ok(Recognition { words })
}

/// Replays a recognition result captured earlier as JSON
///
/// The image passed to `recognize` is ignored.
pub struct RecordedRecognition {
    recognition: Recognition,
}

impl RecordedRecognition {
    pub fn new(recognition: Recognition) -> Self {
        Self { recognition }
    }

    pub fn from_json(json: &str) -> Result<Self, RecognitionError> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    pub fn from_file(path: &Path) -> Result<Self, RecognitionError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

impl Recognizer for RecordedRecognition {
    fn name(&self) -> &str {
        "recorded"
    }

    fn recognize(&self, image: &KeyboardImage) -> Result<Recognition, RecognitionError> {
        debug!("Replaying {} recorded symbols for {}", self.recognition.symbol_count(), image.name());
        Ok(self.recognition.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOCR: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xml:lang="en" lang="en">
 <body>
  <div class='ocr_page' id='page_1' title='image "stdin"; bbox 0 0 640 480; ppageno 0'>
   <span class='ocr_line' id='line_1_1' title="bbox 10 20 120 44; baseline 0 0">
    <span class='ocrx_word' id='word_1_1' title='bbox 10 20 62 44; x_wconf 91'>
     <span class='ocrx_cinfo' title='x_bboxes 10 20 30 44; x_conf 98.8'>Q</span><span class='ocrx_cinfo' title='x_bboxes 40 22 62 44; x_conf 83.25'>w</span>
    </span>
    <span class='ocrx_word' id='word_1_2' title='bbox 90 20 120 44; x_wconf 77'>
     <span class='ocrx_cinfo' title='x_bboxes 90 20 120 44; x_conf 77'>&amp;</span>
    </span>
   </span>
  </div>
 </body>
</html>"#;

    fn word(inner: &str) -> String {
        format!("<html><body><span class='ocrx_word' title='bbox 0 0 9 9'>{}</span></body></html>", inner)
    }

    #[test]
    fn test_parse_hocr_keeps_words_boxes_and_confidence() {
        let recognition = parse_hocr(HOCR).unwrap();

        assert_eq!(recognition.words.len(), 2);
        assert_eq!(recognition.words[0].text, "Qw");
        assert_eq!(recognition.symbol_count(), 3);

        let q = &recognition.words[0].symbols[0];
        assert_eq!(q.text, "Q");
        assert_eq!(q.bbox, BoundingBox { x0: 10, y0: 20, x1: 30, y1: 44 });
        assert_eq!(q.confidence, Some(98.8));

        let w = &recognition.words[0].symbols[1];
        assert_eq!(w.bbox, BoundingBox { x0: 40, y0: 22, x1: 62, y1: 44 });
        assert_eq!(w.confidence, Some(83.25));

        assert_eq!(recognition.words[1].symbols[0].text, "&");
        assert_eq!(recognition.words[1].symbols[0].confidence, Some(77.0));
    }

    #[test]
    fn test_parse_hocr_empty_page() {
        let recognition = parse_hocr("<html><body><div class='ocr_page'></div></body></html>").unwrap();
        assert!(recognition.words.is_empty());
        assert_eq!(recognition.symbol_count(), 0);

        assert_eq!(parse_hocr("").unwrap(), Recognition::default());
    }

    #[test]
    fn test_parse_hocr_confidence_is_optional() {
        let hocr = word("<span class='ocrx_cinfo' title='x_bboxes 1 2 3 4'>A</span>");
        let recognition = parse_hocr(&hocr).unwrap();
        assert_eq!(recognition.words[0].symbols[0].confidence, None);
    }

    #[test]
    fn test_parse_hocr_rejects_garbage() {
        let err = parse_hocr(&word("<span class='ocrx_cinfo' title='x_bboxes 1 2 3; x_conf 90'>A</span>")).unwrap_err();
        assert!(matches!(err, RecognitionError::Malformed(_)));

        let err = parse_hocr(&word("<span class='ocrx_cinfo' title='x_bboxes 1 2 x 4'>A</span>")).unwrap_err();
        assert!(err.to_string().contains("invalid coordinate"));

        let err = parse_hocr(&word("<span class='ocrx_cinfo' title='x_bboxes 1 2 3 4; x_conf high'>A</span>")).unwrap_err();
        assert!(err.to_string().contains("invalid x_conf"));

        let err = parse_hocr(&word("<span class='ocrx_cinfo' title='x_conf 90'>A</span>")).unwrap_err();
        assert!(err.to_string().contains("no x_bboxes"));
    }

    #[test]
    fn test_parse_hocr_rejects_out_of_range_coordinates() {
        let hocr = word("<span class='ocrx_cinfo' title='x_bboxes 0 0 1 -2147483649'>A</span>");
        assert!(matches!(parse_hocr(&hocr), Err(RecognitionError::Malformed(_))));

        let hocr = word("<span class='ocrx_cinfo' title='x_bboxes 0 99999999999 1 2'>A</span>");
        assert!(matches!(parse_hocr(&hocr), Err(RecognitionError::Malformed(_))));

        // Extreme but representable values pass through untouched
        let hocr = word("<span class='ocrx_cinfo' title='x_bboxes 0 -2147483648 1 2147483647'>A</span>");
        let bbox = parse_hocr(&hocr).unwrap().words[0].symbols[0].bbox;
        assert_eq!((bbox.y0, bbox.y1), (i32::MIN, i32::MAX));
    }

    #[test]
    fn test_parse_hocr_requires_character_boxes() {
        let hocr = "<html><body><span class='ocrx_word' title='bbox 0 0 9 9; x_wconf 90'>QW</span></body></html>";
        let err = parse_hocr(hocr).unwrap_err();
        assert!(err.to_string().contains("hocr_char_boxes"));
    }

    #[test]
    fn test_build_command_arguments() {
        let engine = TesseractCli::new(RecognitionConfig::default());
        let command = engine.build_command();
        let args: Vec<String> = command
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();

        assert_eq!(&args[..8], &["stdin", "stdout", "-l", "eng", "--psm", "6", "--oem", "3"]);
        assert!(args.iter().any(|a| a.starts_with("tessedit_char_whitelist=ABC")));
        assert!(args.contains(&"preserve_interword_spaces=1".to_string()));
        assert!(args.contains(&"hocr_char_boxes=1".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("hocr"));
    }

    #[test]
    fn test_missing_executable_is_a_spawn_error() {
        let engine = TesseractCli::new(RecognitionConfig {
            tesseract_path: "/nonexistent/tesseract-binary".to_string(),
            ..Default::default()
        });
        assert!(!engine.is_available());

        let err = engine.run(b"bytes").unwrap_err();
        assert!(matches!(err, RecognitionError::Spawn { .. }));
    }

    #[test]
    fn test_recorded_recognition_replays() {
        let json = r#"{"words": [{"text": "A1", "symbols": [
            {"text": "A", "bbox": {"x0": 0, "y0": 0, "x1": 5, "y1": 8}, "confidence": 93.5},
            {"text": "1", "bbox": {"x0": 6, "y0": 0, "x1": 9, "y1": 8}}
        ]}]}"#;
        let recorder = RecordedRecognition::from_json(json).unwrap();
        let image = KeyboardImage::from_bytes("mem", Vec::new());

        let recognition = recorder.recognize(&image).unwrap();
        assert_eq!(recognition.symbol_count(), 2);
        assert_eq!(recognition.words[0].symbols[0].confidence, Some(93.5));
        assert_eq!(recognition.words[0].symbols[1].confidence, None);
    }

    #[test]
    fn test_recorded_recognition_rejects_malformed_json() {
        assert!(matches!(
            RecordedRecognition::from_json(r#"{"words": [{"symbols": [{"text": "A"}]}]}"#),
            Err(RecognitionError::Decode(_))
        ));
        assert!(RecordedRecognition::from_json(r#"{"lines": []}"#).is_err());
    }
}
