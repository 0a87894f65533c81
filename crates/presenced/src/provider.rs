//! Line-delimited JSON embedding provider.
//!
//! The face detector runs as a separate process and writes one JSON array of
//! detections per captured frame:
//!
//! ```text
//! [{"boundingBox": {"x": 10, "y": 20, "width": 80, "height": 80}, "embedding": [/* 128 floats */]}]
//! ```
//!
//! Each `detect()` call consumes one line. A blank line or end of input is a
//! frame with no faces.

use presence_core::{Detection, EmbeddingProvider, ProviderError};
use std::fs::File;
use std::io::{BufRead, BufReader};

pub struct JsonLinesProvider<R> {
    reader: R,
    exhausted: bool,
    line: String,
}

impl JsonLinesProvider<Box<dyn BufRead + Send>> {
    /// Read from `path`, or stdin when `path` is `-`.
    pub fn open(path: &str) -> Result<Self, ProviderError> {
        let reader: Box<dyn BufRead + Send> = if path == "-" {
            Box::new(BufReader::new(std::io::stdin()))
        } else {
            let file = File::open(path)
                .map_err(|e| ProviderError::Unavailable(format!("{path}: {e}")))?;
            Box::new(BufReader::new(file))
        };
        tracing::info!(source = path, "detection source opened");
        Ok(Self::new(reader))
    }
}

impl<R: BufRead> JsonLinesProvider<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            exhausted: false,
            line: String::new(),
        }
    }
}

impl<R: BufRead + Send> EmbeddingProvider for JsonLinesProvider<R> {
    fn detect(&mut self) -> Result<Vec<Detection>, ProviderError> {
        if self.exhausted {
            return Ok(Vec::new());
        }

        self.line.clear();
        let read = self
            .reader
            .read_line(&mut self.line)
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;
        if read == 0 {
            tracing::info!("detection source reached end of input");
            self.exhausted = true;
            return Ok(Vec::new());
        }

        let line = self.line.trim();
        if line.is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(line).map_err(|e| ProviderError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use presence_core::EMBEDDING_DIM;
    use std::io::Cursor;

    fn frame(faces: &[f32]) -> String {
        let detections: Vec<_> = faces
            .iter()
            .map(|v| {
                serde_json::json!({
                    "boundingBox": {"x": 1.0, "y": 2.0, "width": 3.0, "height": 4.0},
                    "embedding": vec![*v; EMBEDDING_DIM],
                })
            })
            .collect();
        serde_json::Value::Array(detections).to_string()
    }

    #[test]
    fn test_one_line_per_frame() {
        let input = format!("{}\n\n{}\n", frame(&[0.1, 0.2]), frame(&[0.3]));
        let mut provider = JsonLinesProvider::new(Cursor::new(input));

        let first = provider.detect().unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].bounding_box.width, 3.0);
        assert_eq!(first[1].embedding.values()[0], 0.2);

        assert!(provider.detect().unwrap().is_empty());
        assert_eq!(provider.detect().unwrap().len(), 1);
        assert!(provider.detect().unwrap().is_empty());
        assert!(provider.detect().unwrap().is_empty());
    }

    #[test]
    fn test_bounding_box_optional() {
        let line = serde_json::json!([{ "embedding": vec![0.0f32; EMBEDDING_DIM] }]).to_string();
        let mut provider = JsonLinesProvider::new(Cursor::new(line));
        let detections = provider.detect().unwrap();
        assert_eq!(detections[0].bounding_box, Default::default());
    }

    #[test]
    fn test_malformed_line() {
        let mut provider = JsonLinesProvider::new(Cursor::new("[{\"embedding\": [1, 2]}]\n"));
        assert!(matches!(provider.detect(), Err(ProviderError::Malformed(_))));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            JsonLinesProvider::open("/nonexistent/presence/detections"),
            Err(ProviderError::Unavailable(_))
        ));
    }
}
