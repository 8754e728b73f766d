//! Grammar-constrained token generation for parametric 3D object JSON.
//!
//! [`Engine`] wires together the schema, tokenizer, prefix acceptors, fixed
//! literals, and the FSM that drives a [`backend::VlmBackend`] step by step
//! toward a document matching the corpus grammar (see the crate's
//! `fsm` module for the state machine itself).

pub mod acceptor;
pub mod backend;
pub mod config;
pub mod error;
pub mod fsm;
pub mod literals;
pub mod processor;
pub mod schema;
pub mod tokenizer;
pub mod trie;

use std::sync::Arc;

use tracing::info;

use acceptor::Acceptors;
use backend::VlmBackend;
use config::EngineConfig;
use error::{EngineError, Result};
use fsm::{ConstrainedGenerator, GenerationContext};
use literals::{Literals, PoseGlyphs};
use schema::Schema;
use tokenizer::TokenizerAdapter;

/// The fully initialized engine: an immutable, `Arc`-shareable bundle of
/// every precomputed table plus the generator that consults them. Cheap to
/// clone; every independent generation should own its own [`GenerationContext`]
/// and may drive the same `Engine` concurrently.
#[derive(Clone)]
pub struct Engine {
    schema: Arc<Schema>,
    tokenizer: Arc<TokenizerAdapter>,
    generator: ConstrainedGenerator,
}

impl Engine {
    /// Build every table from a schema and tokenizer, then verify that no
    /// glyph or literal token collides with the reserved value-token range
    /// (SPEC_FULL.md §7, `VocabularyCollision`). This check covers the
    /// category/template/parameter enumeration tokens (performed inside
    /// [`Acceptors::build`]) plus the pose-array glyph set and the three
    /// standalone special literals, which are not visited by that pass.
    pub fn build(schema: Schema, tokenizer: TokenizerAdapter, config: EngineConfig) -> Result<Self> {
        info!(v0 = config.v0, n_bins = config.n_bins, "building engine tables");

        let literals = Literals::build(&tokenizer)?;
        let glyphs = PoseGlyphs::build(&tokenizer)?;
        let acceptors = Acceptors::build(&schema, &tokenizer, &literals, &config)?;

        Self::check_glyph_collisions(&glyphs, &config)?;
        for (token, name) in [
            (literals.param_name_end, "param_name_end"),
            (literals.template_continue, "template_continue"),
            (literals.document_end, "document_end"),
        ] {
            if config.is_value_token(token) {
                return Err(EngineError::VocabularyCollision {
                    token,
                    literal: name.to_string(),
                });
            }
        }

        let schema = Arc::new(schema);
        let tokenizer = Arc::new(tokenizer);
        let generator = ConstrainedGenerator::new(
            Arc::clone(&schema),
            Arc::new(acceptors),
            Arc::new(literals),
            Arc::new(glyphs),
            config,
        );

        Ok(Self {
            schema,
            tokenizer,
            generator,
        })
    }

    fn check_glyph_collisions(glyphs: &PoseGlyphs, config: &EngineConfig) -> Result<()> {
        let named = [
            (glyphs.open_positive, "open_positive"),
            (glyphs.open_negative, "open_negative"),
            (glyphs.comma, "comma"),
            (glyphs.space, "space"),
            (glyphs.space_minus, "space_minus"),
            (glyphs.close_position, "close_position"),
            (glyphs.close_rotation, "close_rotation"),
        ];
        for (token, name) in named {
            if config.is_value_token(token) {
                return Err(EngineError::VocabularyCollision {
                    token,
                    literal: name.to_string(),
                });
            }
        }
        for (d, &token) in glyphs.digits.iter().enumerate() {
            if config.is_value_token(token) {
                return Err(EngineError::VocabularyCollision {
                    token,
                    literal: format!("digit {d}"),
                });
            }
        }
        Ok(())
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn tokenizer(&self) -> &TokenizerAdapter {
        &self.tokenizer
    }

    pub fn generator(&self) -> &ConstrainedGenerator {
        &self.generator
    }

    /// Run a fresh generation from the initial state through to completion
    /// against `backend`.
    pub fn run(&self, backend: &mut dyn VlmBackend) -> Result<Vec<u32>> {
        let mut ctx = GenerationContext::new();
        self.generator.run(&mut ctx, backend)
    }
}
