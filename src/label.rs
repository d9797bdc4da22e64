//! ITK-SNAP label description files.
//!
//! Each label line reads `IDX -R- -G- -B- -A-- VIS MSH "LABEL"`, anything
//! else (comments, blank lines) is skipped.

use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LabelError {
    #[error("duplicate label #{id} ({name})")]
    Duplicate { id: i32, name: String },

    #[error("line {line}: colour components must be 0..=255")]
    Colour { line: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub name: String,
    pub rgb: [u8; 3],
}

#[derive(Debug, Clone, Default)]
pub struct LabelPalette {
    labels: BTreeMap<i32, Label>,
}

impl LabelPalette {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, LabelError> {
        Self::parse(BufReader::new(File::open(path.as_ref())?))
    }

    pub fn parse(reader: impl BufRead) -> Result<Self, LabelError> {
        let mut labels = BTreeMap::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let Some((id, rgb, name)) = Self::parse_line(&line, index + 1)? else {
                continue;
            };
            if labels.contains_key(&id) {
                return Err(LabelError::Duplicate { id, name });
            }
            labels.insert(id, Label { name, rgb });
        }
        Ok(Self { labels })
    }

    fn parse_line(line: &str, number: usize) -> Result<Option<(i32, [u8; 3], String)>, LabelError> {
        let (Some(open), Some(close)) = (line.find('"'), line.rfind('"')) else {
            return Ok(None);
        };
        if open == close {
            return Ok(None);
        }
        let fields: Vec<&str> = line[..open].split_whitespace().collect();
        if fields.len() < 4 || !fields[..4].iter().all(|f| f.bytes().all(|b| b.is_ascii_digit())) {
            return Ok(None);
        }
        let Ok(id) = fields[0].parse::<i32>() else {
            return Ok(None);
        };
        let mut rgb = [0u8; 3];
        for (component, field) in rgb.iter_mut().zip(&fields[1..4]) {
            *component = field
                .parse()
                .map_err(|_| LabelError::Colour { line: number })?;
        }
        Ok(Some((id, rgb, line[open + 1..close].to_string())))
    }

    pub fn get(&self, id: i32) -> Option<&Label> {
        self.labels.get(&id)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"################################################
# ITK-SnAP Label Description File
################################################
    0     0    0    0        0  0  0    "Clear Label"
    1   255    0    0        1  1  1    "Cortex"
   42    10  200   30        1  1  0    "Said "hello" here"
"#;

    #[test]
    fn parses_labels_and_skips_comments() {
        let palette = LabelPalette::parse(SAMPLE.as_bytes()).unwrap();
        assert_eq!(palette.len(), 3);
        assert_eq!(
            palette.get(1),
            Some(&Label {
                name: "Cortex".into(),
                rgb: [255, 0, 0]
            })
        );
        assert_eq!(palette.get(42).unwrap().name, r#"Said "hello" here"#);
        assert_eq!(palette.get(42).unwrap().rgb, [10, 200, 30]);
        assert!(palette.get(7).is_none());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let text = "1 1 1 1 1 1 1 \"a\"\n1 2 2 2 1 1 1 \"b\"\n";
        assert!(matches!(
            LabelPalette::parse(text.as_bytes()),
            Err(LabelError::Duplicate { id: 1, .. })
        ));
    }

    #[test]
    fn out_of_range_colour_is_rejected() {
        let text = "# header\n3 300 0 0 1 1 1 \"too red\"\n";
        assert!(matches!(
            LabelPalette::parse(text.as_bytes()),
            Err(LabelError::Colour { line: 2 })
        ));
    }
}
