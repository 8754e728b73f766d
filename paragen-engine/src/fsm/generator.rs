//! The constrained generator: computes the allowed-token set for the
//! current FSM state, masks a caller-owned logits buffer, and updates
//! context from the sampled token (SPEC_FULL.md §4.3.3–§4.3.5). Drives a
//! [`VlmBackend`] step by step until the terminal state is reached.

use std::ops::Range;
use std::sync::Arc;

use crate::acceptor::Acceptors;
use crate::backend::VlmBackend;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::fsm::context::GenerationContext;
use crate::fsm::state::{State, StateKind};
use crate::literals::{Literal, Literals, PoseGlyphs};
use crate::schema::Schema;

/// The set of tokens a `gen` state currently permits. `Range` is used for
/// the reserved value-token range so masking it is a single bound check
/// rather than a membership test against 1,024 individual ids.
#[derive(Debug, Clone)]
pub enum Allowed {
    All,
    Tokens(Vec<u32>),
    Range(Range<u32>),
}

/// Owns the immutable, precomputed tables and drives any number of
/// independent [`GenerationContext`]s against them. Cheap to clone (every
/// field is `Arc`-shared or `Copy`), so independent generations can each
/// hold their own handle and run in parallel (§5).
#[derive(Clone)]
pub struct ConstrainedGenerator {
    schema: Arc<Schema>,
    acceptors: Arc<Acceptors>,
    literals: Arc<Literals>,
    glyphs: Arc<PoseGlyphs>,
    config: EngineConfig,
}

impl ConstrainedGenerator {
    pub fn new(
        schema: Arc<Schema>,
        acceptors: Arc<Acceptors>,
        literals: Arc<Literals>,
        glyphs: Arc<PoseGlyphs>,
        config: EngineConfig,
    ) -> Self {
        Self {
            schema,
            acceptors,
            literals,
            glyphs,
            config,
        }
    }

    /// Drive `backend` step by step from `ctx`'s current state until the
    /// terminal state is reached, returning the full emitted token stream.
    pub fn run(&self, ctx: &mut GenerationContext, backend: &mut dyn VlmBackend) -> Result<Vec<u32>> {
        let eos = backend.eos_token_id();
        loop {
            if ctx.emitted.len() >= self.config.max_document_tokens {
                return Err(EngineError::DocumentTooLong {
                    budget: self.config.max_document_tokens,
                });
            }

            let was_terminal = ctx.state.is_terminal();
            let allowed = self.allowed_set(ctx, eos)?;

            let mut logits = backend.step(&ctx.emitted);
            self.mask_logits(&allowed, &mut logits);
            let token = backend.sample(&logits);
            self.advance(ctx, token)?;

            if was_terminal {
                return Ok(ctx.emitted.clone());
            }
        }
    }

    /// Compute the allowed-token set for `ctx`'s current state, resolving
    /// any pending "no more continuations" completions along the way
    /// (`GEN_CATEGORY_VALUE`, `GEN_TEMPLATE_NAME`) before returning.
    pub fn allowed_set(&self, ctx: &mut GenerationContext, eos_token: u32) -> Result<Allowed> {
        loop {
            match ctx.state {
                State::WaitCode => return Ok(Allowed::All),
                State::End => return Ok(Allowed::Tokens(vec![eos_token])),
                _ => {}
            }

            if ctx.state.kind() == StateKind::Add {
                let literal = self.literal_for(ctx.state);
                return Ok(Allowed::Tokens(vec![literal.tokens[ctx.fixed_literal_pos]]));
            }

            match ctx.state {
                State::GenCategoryValue => {
                    let next = self.acceptors.category_allowed_next(&ctx.category_tokens);
                    if next.is_empty() {
                        if ctx.category_tokens.is_empty() {
                            return Err(self.empty_acceptor(ctx));
                        }
                        ctx.category_id = Some(
                            self.acceptors
                                .resolve_category(&ctx.category_tokens)
                                .expect("a complete category prefix must resolve to a category id"),
                        );
                        ctx.state = State::AddPositionKey;
                        ctx.fixed_literal_pos = 0;
                        continue;
                    }
                    return Ok(Allowed::Tokens(next));
                }
                State::GenTemplateName => {
                    let category = ctx
                        .category_id
                        .expect("category is resolved before template generation begins");
                    let next = self.acceptors.template_allowed_next(category, &ctx.template_tokens);
                    if next.is_empty() {
                        if ctx.template_tokens.is_empty() {
                            return Err(self.empty_acceptor(ctx));
                        }
                        ctx.template_id = Some(
                            self.acceptors
                                .resolve_template(category, &ctx.template_tokens)
                                .expect("a complete template prefix must resolve to a template id"),
                        );
                        ctx.state = State::AddParamCon;
                        ctx.fixed_literal_pos = 0;
                        continue;
                    }
                    return Ok(Allowed::Tokens(next));
                }
                State::GenPositionValue => return self.pose_allowed(ctx, false),
                State::GenRotationValue => return self.pose_allowed(ctx, true),
                State::GenParamKey => return self.param_key_allowed(ctx),
                State::GenParamValue => return self.param_value_allowed(ctx),
                State::GenTemplateOrEnd => {
                    return Ok(Allowed::Tokens(vec![
                        self.literals.template_continue,
                        self.literals.document_end,
                    ]));
                }
                _ => unreachable!("non-gen, non-add, non-wait, non-terminal state"),
            }
        }
    }

    /// Write `-inf` into every logit not in `allowed`.
    pub fn mask_logits(&self, allowed: &Allowed, logits: &mut [f32]) {
        match allowed {
            Allowed::All => {}
            Allowed::Range(range) => {
                for (i, v) in logits.iter_mut().enumerate() {
                    if !range.contains(&(i as u32)) {
                        *v = f32::NEG_INFINITY;
                    }
                }
            }
            Allowed::Tokens(tokens) => {
                let set: std::collections::HashSet<u32> = tokens.iter().copied().collect();
                for (i, v) in logits.iter_mut().enumerate() {
                    if !set.contains(&(i as u32)) {
                        *v = f32::NEG_INFINITY;
                    }
                }
            }
        }
    }

    /// Update context from a sampled token and apply any transition the
    /// emission triggers (SPEC_FULL.md §4.3.5).
    pub fn advance(&self, ctx: &mut GenerationContext, token: u32) -> Result<()> {
        ctx.emitted.push(token);

        match ctx.state {
            State::WaitCode => {
                ctx.wait_tokens_seen += 1;
                if ctx.wait_tokens_seen > self.config.wait_max_tokens {
                    return Err(EngineError::LiteralMismatch {
                        expected: self.literals.wait_code.text.to_string(),
                        budget: self.config.wait_max_tokens,
                    });
                }
                let lit = &self.literals.wait_code.tokens;
                if ctx.emitted.len() >= lit.len() && ctx.emitted[ctx.emitted.len() - lit.len()..] == lit[..] {
                    ctx.state = State::AddCategoryKey;
                    ctx.fixed_literal_pos = 0;
                    ctx.wait_tokens_seen = 0;
                }
                Ok(())
            }
            State::End => Ok(()),
            State::GenCategoryValue => {
                ctx.category_tokens.push(token);
                Ok(())
            }
            State::GenPositionValue => self.advance_pose(ctx, token, false),
            State::GenRotationValue => self.advance_pose(ctx, token, true),
            State::GenTemplateName => {
                ctx.template_tokens.push(token);
                Ok(())
            }
            State::GenParamKey => self.advance_param_key(ctx, token),
            State::GenParamValue => self.advance_param_value(ctx, token),
            State::GenTemplateOrEnd => {
                if token == self.literals.template_continue {
                    ctx.state = State::AddNextTemplateCon;
                } else if token == self.literals.document_end {
                    ctx.state = State::AddEnd;
                } else {
                    return Err(self.empty_acceptor(ctx));
                }
                ctx.fixed_literal_pos = 0;
                Ok(())
            }
            add_state if add_state.kind() == StateKind::Add => {
                ctx.fixed_literal_pos += 1;
                let exhausted = ctx.fixed_literal_pos >= self.literal_for(add_state).tokens.len();
                if exhausted {
                    ctx.fixed_literal_pos = 0;
                    self.on_add_complete(ctx, add_state);
                }
                Ok(())
            }
            _ => unreachable!("unhandled state in advance()"),
        }
    }

    fn on_add_complete(&self, ctx: &mut GenerationContext, completed: State) {
        match completed {
            State::AddCategoryKey => ctx.state = State::GenCategoryValue,
            State::AddPositionKey => {
                ctx.reset_pose_array();
                ctx.state = State::GenPositionValue;
            }
            State::AddRotationKey => {
                ctx.reset_pose_array();
                ctx.state = State::GenRotationValue;
            }
            State::AddConceptKey => ctx.state = State::GenTemplateName,
            State::AddParamCon => ctx.state = State::GenParamKey,
            State::AddParamKvCon => ctx.state = State::GenParamValue,
            State::AddParamValueCon => ctx.state = State::GenParamKey,
            State::AddNextTemplateCon => {
                ctx.reset_template();
                ctx.state = State::GenTemplateName;
            }
            State::AddEnd => ctx.state = State::End,
            _ => unreachable!("on_add_complete called with a non-Add state"),
        }
    }

    fn advance_pose(&self, ctx: &mut GenerationContext, token: u32, is_rotation: bool) -> Result<()> {
        let close = if is_rotation {
            self.glyphs.close_rotation
        } else {
            self.glyphs.close_position
        };

        if is_rotation {
            ctx.rotation_tokens.push(token);
        } else {
            ctx.position_tokens.push(token);
        }

        if token == self.glyphs.comma {
            ctx.commas_in_array += 1;
            ctx.pose_digit_buf.clear();
        } else if let Some(d) = self.glyphs.digit_value(token) {
            ctx.pose_digit_buf.push(d);
        } else if token == close {
            ctx.fixed_literal_pos = 0;
            ctx.state = if is_rotation {
                State::AddConceptKey
            } else {
                State::AddRotationKey
            };
        }
        Ok(())
    }

    fn advance_param_key(&self, ctx: &mut GenerationContext, token: u32) -> Result<()> {
        if token == self.literals.param_name_end {
            let category = ctx.category_id.expect("category resolved before GEN_PARAM_KEY");
            let template = ctx.template_id.expect("template resolved before GEN_PARAM_KEY");
            let param = self
                .acceptors
                .resolve_param(category, template, &ctx.param_tokens)
                .expect("param_name_end is only offered for a resolved, complete name");
            ctx.emitted_params.insert(param);
            ctx.current_param_id = Some(param);
            ctx.param_tokens.clear();
            ctx.fixed_literal_pos = 0;
            ctx.state = State::AddParamKvCon;
        } else {
            ctx.param_tokens.push(token);
        }
        Ok(())
    }

    fn advance_param_value(&self, ctx: &mut GenerationContext, token: u32) -> Result<()> {
        ctx.param_value_tokens.push(token);
        if !self.config.is_value_token(token) {
            return Ok(());
        }

        ctx.param_value_index += 1;
        let category = ctx.category_id.expect("category resolved before GEN_PARAM_VALUE");
        let template = ctx.template_id.expect("template resolved before GEN_PARAM_VALUE");
        let param = ctx
            .current_param_id
            .expect("current parameter resolved before GEN_PARAM_VALUE");
        let dims = self.schema.param_dims(category, template, param);

        if ctx.param_value_index == dims {
            ctx.param_value_tokens.clear();
            ctx.param_value_index = 0;
            let all_emitted = ctx.emitted_params.len() == self.schema.param_count(category, template);
            ctx.fixed_literal_pos = 0;
            ctx.state = if all_emitted {
                State::GenTemplateOrEnd
            } else {
                State::AddParamValueCon
            };
        }
        Ok(())
    }

    fn pose_allowed(&self, ctx: &GenerationContext, is_rotation: bool) -> Result<Allowed> {
        let buf = if is_rotation {
            &ctx.rotation_tokens
        } else {
            &ctx.position_tokens
        };
        let close = if is_rotation {
            self.glyphs.close_rotation
        } else {
            self.glyphs.close_position
        };

        let last = buf.last().copied();
        let tokens = match last {
            None => vec![self.glyphs.open_positive, self.glyphs.open_negative],
            Some(t) if t == self.glyphs.open_positive || t == self.glyphs.space => {
                self.glyphs.digits.to_vec()
            }
            Some(t) if t == self.glyphs.open_negative || t == self.glyphs.space_minus => self
                .glyphs
                .digits
                .iter()
                .copied()
                .filter(|&d| d != self.glyphs.digit_token(0))
                .collect(),
            Some(t) if t == self.glyphs.comma => vec![self.glyphs.space, self.glyphs.space_minus],
            Some(t) if self.glyphs.is_digit(t) => {
                let may_continue = ctx.pose_digit_buf.len() < self.config.pose_max_digits
                    && !(ctx.pose_digit_buf.len() == 1 && ctx.pose_digit_buf[0] == 0);
                let mut candidates = if may_continue {
                    self.glyphs.digits.to_vec()
                } else {
                    Vec::new()
                };
                if ctx.commas_in_array < 2 {
                    candidates.push(self.glyphs.comma);
                } else {
                    candidates.push(close);
                }
                candidates
            }
            Some(_) => return Err(self.empty_acceptor(ctx)),
        };

        if tokens.is_empty() {
            return Err(self.empty_acceptor(ctx));
        }
        Ok(Allowed::Tokens(tokens))
    }

    fn param_key_allowed(&self, ctx: &GenerationContext) -> Result<Allowed> {
        let category = ctx.category_id.expect("category resolved before GEN_PARAM_KEY");
        let template = ctx.template_id.expect("template resolved before GEN_PARAM_KEY");
        let prefix = &ctx.param_tokens;

        let mut next: std::collections::HashSet<u32> = std::collections::HashSet::new();
        let mut prefix_is_live_complete_name = false;

        for param in self.schema.param_ids(category, template) {
            if ctx.emitted_params.contains(&param) {
                continue;
            }
            let name_tokens = self.acceptors.param_tokens(category, template, param);
            if name_tokens.len() < prefix.len() || name_tokens[..prefix.len()] != prefix[..] {
                continue;
            }
            if name_tokens.len() == prefix.len() {
                prefix_is_live_complete_name = true;
            } else {
                next.insert(name_tokens[prefix.len()]);
            }
        }

        if prefix_is_live_complete_name {
            next.insert(self.literals.param_name_end);
        }

        if next.is_empty() {
            return Err(self.empty_acceptor(ctx));
        }
        Ok(Allowed::Tokens(next.into_iter().collect()))
    }

    fn param_value_allowed(&self, ctx: &GenerationContext) -> Result<Allowed> {
        let last = ctx.param_value_tokens.last().copied();
        let allowed = if ctx.param_value_tokens.is_empty() || last == Some(self.glyphs.space) {
            Allowed::Range(self.config.v0..self.config.value_token_end())
        } else if last.is_some_and(|t| self.config.is_value_token(t)) {
            Allowed::Tokens(vec![self.glyphs.comma])
        } else if last == Some(self.glyphs.comma) {
            Allowed::Tokens(vec![self.glyphs.space])
        } else {
            return Err(self.empty_acceptor(ctx));
        };
        Ok(allowed)
    }

    fn literal_for(&self, state: State) -> &Literal {
        match state {
            State::AddCategoryKey => &self.literals.category_key,
            State::AddPositionKey => &self.literals.position_key,
            State::AddRotationKey => &self.literals.rotation_key,
            State::AddConceptKey => &self.literals.concept_key,
            State::AddParamCon => &self.literals.param_con,
            State::AddParamKvCon => &self.literals.param_kv_con,
            State::AddParamValueCon => &self.literals.param_value_con,
            State::AddNextTemplateCon => &self.literals.next_template_con,
            State::AddEnd => &self.literals.end,
            _ => unreachable!("literal_for called on a non-Add state"),
        }
    }

    fn empty_acceptor(&self, ctx: &GenerationContext) -> EngineError {
        EngineError::SchemaEmptyAcceptor {
            state: ctx.state,
            category_prefix: ctx.category_tokens.clone(),
            template_prefix: ctx.template_tokens.clone(),
        }
    }
}
