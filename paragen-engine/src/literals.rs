//! Fixed literal token sequences and the small glyph set the pose-array
//! grammar reasons over. Built once at init from the tokenizer adapter; the
//! rest of the engine only ever reads from this table.

use crate::error::{EngineError, Result};
use crate::tokenizer::TokenizerAdapter;

/// The fixed JSON fragment emitted token-by-token by one `add` state.
#[derive(Debug, Clone)]
pub struct Literal {
    pub text: &'static str,
    pub tokens: Vec<u32>,
}

impl Literal {
    fn build(tokenizer: &TokenizerAdapter, text: &'static str) -> Result<Self> {
        let tokens = tokenizer.encode_literal(text)?;
        Ok(Self { text, tokens })
    }
}

/// Every fixed literal the FSM emits, in the order the transition table
/// (SPEC_FULL.md §4.3.2) visits them.
#[derive(Debug, Clone)]
pub struct Literals {
    pub wait_code: Literal,
    pub category_key: Literal,
    pub position_key: Literal,
    pub rotation_key: Literal,
    pub concept_key: Literal,
    pub param_con: Literal,
    pub param_kv_con: Literal,
    pub param_value_con: Literal,
    pub next_template_con: Literal,
    pub end: Literal,

    /// The end-of-name token `":` that, offered alongside `PARAM_TRIE`
    /// continuations, signals a complete (and not yet emitted) parameter
    /// name (§3, §4.3.3 `GEN_PARAM_KEY`).
    pub param_name_end: u32,
    /// Chosen in `GEN_TEMPLATE_OR_END` to start another template (`]}`).
    pub template_continue: u32,
    /// Chosen in `GEN_TEMPLATE_OR_END` to close the conceptualization array (`]`).
    pub document_end: u32,
}

impl Literals {
    pub fn build(tokenizer: &TokenizerAdapter) -> Result<Self> {
        let single = |text: &str| -> Result<u32> {
            let ids = tokenizer.encode_literal(text)?;
            if ids.len() != 1 {
                return Err(EngineError::GlyphNotSingleToken {
                    glyph: text.to_string(),
                    got: ids.len(),
                });
            }
            Ok(ids[0])
        };

        Ok(Self {
            wait_code: Literal::build(tokenizer, "<code>{\"")?,
            category_key: Literal::build(tokenizer, "category\": \"")?,
            position_key: Literal::build(tokenizer, "\", \"pose\": {\"global_position\":")?,
            rotation_key: Literal::build(tokenizer, " \"global_rotation\":")?,
            concept_key: Literal::build(tokenizer, " \"conceptualization\": [{\"template\": \"")?,
            param_con: Literal::build(tokenizer, "\", \"parameters\": {\"")?,
            param_kv_con: Literal::build(tokenizer, " [")?,
            param_value_con: Literal::build(tokenizer, "], \"")?,
            next_template_con: Literal::build(tokenizer, "}, {\"template\": \"")?,
            end: Literal::build(tokenizer, "}}]}</code>")?,
            param_name_end: single("\":")?,
            template_continue: single("]}")?,
            document_end: single("]")?,
        })
    }

    /// All literals, for the init-time vocabulary-collision check against
    /// the reserved value-token range.
    pub fn iter(&self) -> impl Iterator<Item = &Literal> {
        [
            &self.wait_code,
            &self.category_key,
            &self.position_key,
            &self.rotation_key,
            &self.concept_key,
            &self.param_con,
            &self.param_kv_con,
            &self.param_value_con,
            &self.next_template_con,
            &self.end,
        ]
        .into_iter()
    }
}

/// Single-token glyphs the pose-array grammar (`GEN_POSITION_VALUE` /
/// `GEN_ROTATION_VALUE`) masks over. Each glyph MUST encode to exactly one
/// token under the loaded tokenizer, or table construction fails with
/// [`EngineError::GlyphNotSingleToken`] rather than silently degrading the
/// grammar at generation time.
#[derive(Debug, Clone)]
pub struct PoseGlyphs {
    pub open_positive: u32,
    pub open_negative: u32,
    pub digits: [u32; 10],
    pub comma: u32,
    pub space: u32,
    pub space_minus: u32,
    pub close_position: u32,
    pub close_rotation: u32,
}

impl PoseGlyphs {
    pub fn build(tokenizer: &TokenizerAdapter) -> Result<Self> {
        let one = |text: &str| -> Result<u32> {
            let ids = tokenizer.encode_literal(text)?;
            if ids.len() != 1 {
                return Err(EngineError::GlyphNotSingleToken {
                    glyph: text.to_string(),
                    got: ids.len(),
                });
            }
            Ok(ids[0])
        };

        let mut digits = [0u32; 10];
        for (d, slot) in digits.iter_mut().enumerate() {
            *slot = one(&d.to_string())?;
        }

        Ok(Self {
            open_positive: one(" [")?,
            open_negative: one(" [-")?,
            digits,
            comma: one(",")?,
            space: one(" ")?,
            space_minus: one(" -")?,
            close_position: one("],")?,
            close_rotation: one("]},")?,
        })
    }

    pub fn digit_token(&self, d: u8) -> u32 {
        self.digits[d as usize]
    }

    pub fn digit_value(&self, token: u32) -> Option<u8> {
        self.digits.iter().position(|&t| t == token).map(|d| d as u8)
    }

    pub fn is_digit(&self, token: u32) -> bool {
        self.digits.contains(&token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digit_vocab() -> TokenizerAdapter {
        let mut entries: Vec<(String, u32)> = vec![
            (" [".into(), 100),
            (" [-".into(), 101),
            ("-".into(), 102),
            (",".into(), 103),
            (" ".into(), 104),
            (" -".into(), 105),
            ("],".into(), 106),
            ("]},".into(), 107),
        ];
        for d in 0..10u32 {
            entries.push((d.to_string(), 200 + d));
        }
        TokenizerAdapter::from_vocab(entries)
    }

    #[test]
    fn pose_glyphs_build_from_single_token_vocab() {
        let glyphs = PoseGlyphs::build(&digit_vocab()).unwrap();
        assert_eq!(glyphs.digit_token(0), 200);
        assert_eq!(glyphs.digit_token(9), 209);
        assert!(glyphs.is_digit(204));
        assert_eq!(glyphs.digit_value(204), Some(4));
        assert_eq!(glyphs.digit_value(999), None);
    }

    #[test]
    fn glyph_not_single_token_is_rejected() {
        // No entry for the literal "," here, so encode_literal would need
        // more than one underlying token (or fail) -- verify a vocab
        // lacking a direct single-token mapping surfaces as an error
        // rather than a silently multi-token glyph.
        let tok = TokenizerAdapter::from_vocab([(",".to_string(), 1u32)]);
        // "comma" isn't single-token encodable from a vocab with only ",".
        let err = PoseGlyphs::build(&tok);
        assert!(err.is_err());
    }
}
