//! Compound label parsing.
//!
//! Measurement exports carry one label per row such as
//! `p03_0_A1_f00_12_label.png:0004-0123-0456`. Splitting on `_` and `:` gives
//! the frame in token 0 (`p`-prefixed), the well in token 4 and the cell
//! identifier in the last token.

use super::Frame;

const MIN_TOKENS: usize = 5;
const WELL_TOKEN: usize = 4;

/// Identifiers recovered from a compound label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLabel {
    pub frame: Frame,
    pub well: u32,
    pub cell_id: String,
}

/// Split a label into frame, well and cell identifier.
///
/// The error is a short reason; callers attach file and row context.
pub fn parse_label(label: &str) -> Result<ParsedLabel, &'static str> {
    let tokens: Vec<&str> = label.split(|c: char| c == '_' || c == ':').collect();
    if tokens.len() < MIN_TOKENS {
        return Err("expected at least 5 tokens separated by '_' or ':'");
    }

    let frame = Frame::parse_token(tokens[0]).ok_or("frame token must be 'p' followed by digits")?;
    let well = tokens[WELL_TOKEN]
        .parse::<u32>()
        .map_err(|_| "well token (5th) is not a non-negative integer")?;
    let cell_id = tokens[tokens.len() - 1];
    if cell_id.is_empty() {
        return Err("cell identifier (last token) is empty");
    }

    Ok(ParsedLabel {
        frame,
        well,
        cell_id: cell_id.to_string(),
    })
}
