//! Single-stroke font glyph store
//!
//! The font file is a sequence of text records. A header record
//! `999 <code> <count>` is followed by exactly `<count>` stroke records
//! `<dx> <dy> <pen>`. The whole file is parsed once into a map keyed by
//! character code; when a code is defined twice the first definition wins.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use strokeplot_core::{FontError, Glyph, PenState, Stroke};

/// Leading field of every glyph header record
const HEADER_MARKER: &str = "999";

/// Upper bound on strokes reserved up front for one glyph
const MAX_PREALLOCATED_STROKES: usize = 256;

/// In-memory index of glyphs keyed by character code
#[derive(Debug, Clone, Default)]
pub struct GlyphStore {
    glyphs: HashMap<u32, Glyph>,
}

impl GlyphStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a font file from disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, FontError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| FontError::Io {
            reason: format!("{}: {}", path.display(), e),
        })?;

        let store = Self::from_reader(BufReader::new(file))?;
        tracing::info!("Loaded {} glyphs from {}", store.len(), path.display());
        Ok(store)
    }

    /// Parse a font held in memory
    pub fn parse(source: &str) -> Result<Self, FontError> {
        Self::from_reader(source.as_bytes())
    }

    /// Parse a font from any buffered reader
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, FontError> {
        let mut records = Records::new(reader);
        let mut glyphs = HashMap::new();

        while let Some((line, content)) = records.next_record()? {
            let (code, count) = parse_header(line, &content)?;
            let strokes = read_strokes(&mut records, code, count)?;

            match glyphs.entry(code) {
                Entry::Occupied(_) => {
                    tracing::debug!(
                        "Duplicate glyph {} at line {} ignored; first definition wins",
                        code,
                        line
                    );
                }
                Entry::Vacant(slot) => {
                    slot.insert(Glyph::new(code, strokes));
                }
            }
        }

        Ok(Self { glyphs })
    }

    /// Look up a glyph by character code
    pub fn lookup(&self, code: u32) -> Option<&Glyph> {
        self.glyphs.get(&code)
    }

    /// Look up the glyph for a character
    pub fn lookup_char(&self, ch: char) -> Option<&Glyph> {
        self.lookup(u32::from(ch))
    }

    /// Check if a character code is defined
    pub fn contains(&self, code: u32) -> bool {
        self.glyphs.contains_key(&code)
    }

    /// Defined character codes in ascending order
    pub fn codes(&self) -> Vec<u32> {
        let mut codes: Vec<u32> = self.glyphs.keys().copied().collect();
        codes.sort_unstable();
        codes
    }

    /// Number of glyphs
    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    /// Check if the store has no glyphs
    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }
}

/// Non-blank lines of the font source with their 1-based line numbers
struct Records<R> {
    lines: std::io::Lines<R>,
    line_number: usize,
}

impl<R: BufRead> Records<R> {
    fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_number: 0,
        }
    }

    fn next_record(&mut self) -> Result<Option<(usize, String)>, FontError> {
        for line in self.lines.by_ref() {
            self.line_number += 1;
            let line = line.map_err(|e| FontError::Io {
                reason: format!("line {}: {}", self.line_number, e),
            })?;
            if !line.trim().is_empty() {
                return Ok(Some((self.line_number, line)));
            }
        }
        Ok(None)
    }
}

/// Split a record into exactly three integer fields
fn parse_fields(content: &str) -> Option<[i32; 3]> {
    let mut fields = content.split_whitespace().map(str::parse::<i32>);
    let record = [
        fields.next()?.ok()?,
        fields.next()?.ok()?,
        fields.next()?.ok()?,
    ];
    if fields.next().is_some() {
        return None;
    }
    Some(record)
}

fn parse_header(line: usize, content: &str) -> Result<(u32, usize), FontError> {
    if content.split_whitespace().next() != Some(HEADER_MARKER) {
        return Err(FontError::UnexpectedRecord {
            line,
            content: content.to_string(),
        });
    }

    let malformed = || FontError::MalformedHeader {
        line,
        content: content.to_string(),
    };

    let [_, code, count] = parse_fields(content).ok_or_else(malformed)?;
    let code = u32::try_from(code).map_err(|_| malformed())?;
    let count = usize::try_from(count).map_err(|_| malformed())?;
    Ok((code, count))
}

fn read_strokes<R: BufRead>(
    records: &mut Records<R>,
    code: u32,
    count: usize,
) -> Result<Vec<Stroke>, FontError> {
    // count comes from the file; never trust it for an allocation size
    let mut strokes = Vec::with_capacity(count.min(MAX_PREALLOCATED_STROKES));

    while strokes.len() < count {
        let Some((line, content)) = records.next_record()? else {
            return Err(FontError::TruncatedGlyph {
                code,
                expected: count,
                found: strokes.len(),
            });
        };

        let [dx, dy, flag] = parse_fields(&content).ok_or_else(|| FontError::MalformedStroke {
            line,
            content: content.clone(),
        })?;
        let pen = PenState::from_flag(flag)
            .ok_or(FontError::InvalidPenFlag { line, value: flag })?;

        strokes.push(Stroke::new(dx, dy, pen));
    }

    Ok(strokes)
}
