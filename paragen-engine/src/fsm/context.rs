//! The mutable per-stream record threaded through the decoding loop
//! (SPEC_FULL.md §3, `GenerationContext`). Owned and mutated by exactly one
//! generation; no global state. Independent generations each own their own
//! context and may run in parallel against the shared, immutable tables.

use std::collections::HashSet;

use crate::fsm::state::State;
use crate::schema::{CategoryId, ParamId, TemplateId};

/// Per-stream mutable state the FSM reads and updates at every step.
#[derive(Debug, Clone)]
pub struct GenerationContext {
    pub state: State,

    pub category_tokens: Vec<u32>,
    pub position_tokens: Vec<u32>,
    pub rotation_tokens: Vec<u32>,
    pub pose_digit_buf: Vec<u8>,
    pub commas_in_array: u8,

    pub template_tokens: Vec<u32>,
    pub param_tokens: Vec<u32>,
    pub param_value_tokens: Vec<u32>,
    pub param_value_index: u32,
    pub emitted_params: HashSet<ParamId>,

    pub fixed_literal_pos: usize,

    /// Resolved once `category_tokens` matches exactly one candidate.
    pub category_id: Option<CategoryId>,
    /// Resolved once `template_tokens` matches exactly one candidate.
    pub template_id: Option<TemplateId>,
    /// Resolved once the current `param_tokens` name is committed.
    pub current_param_id: Option<ParamId>,

    /// The full output stream: every token emitted so far, across all
    /// states. Never cleared (unlike the per-segment parsing buffers
    /// above, which reset at template boundaries).
    pub emitted: Vec<u32>,

    /// How many tokens have been passed through unconstrained in the
    /// current `wait` state, for the `LiteralMismatch` budget check.
    pub wait_tokens_seen: usize,
}

impl GenerationContext {
    pub fn new() -> Self {
        Self {
            state: State::initial(),
            category_tokens: Vec::new(),
            position_tokens: Vec::new(),
            rotation_tokens: Vec::new(),
            pose_digit_buf: Vec::new(),
            commas_in_array: 0,
            template_tokens: Vec::new(),
            param_tokens: Vec::new(),
            param_value_tokens: Vec::new(),
            param_value_index: 0,
            emitted_params: HashSet::new(),
            fixed_literal_pos: 0,
            category_id: None,
            template_id: None,
            current_param_id: None,
            emitted: Vec::new(),
            wait_tokens_seen: 0,
        }
    }

    /// Reset the fields that describe "the current template" so the FSM can
    /// begin a fresh `{"template": ...}` entry (`ADD_NEXT_TEMPLATE_CON`).
    pub fn reset_template(&mut self) {
        self.template_tokens.clear();
        self.param_tokens.clear();
        self.param_value_tokens.clear();
        self.param_value_index = 0;
        self.emitted_params.clear();
        self.template_id = None;
        self.current_param_id = None;
    }

    /// Reset the fields that describe "the current pose array" so the FSM
    /// can begin `global_position` or `global_rotation` fresh.
    pub fn reset_pose_array(&mut self) {
        self.commas_in_array = 0;
        self.pose_digit_buf.clear();
    }
}

impl Default for GenerationContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_context_starts_at_wait_code() {
        let ctx = GenerationContext::new();
        assert_eq!(ctx.state, State::WaitCode);
        assert!(ctx.emitted.is_empty());
    }

    #[test]
    fn reset_template_clears_template_scoped_fields() {
        let mut ctx = GenerationContext::new();
        ctx.template_tokens.push(1);
        ctx.param_tokens.push(2);
        ctx.emitted_params.insert(ParamId(0));
        ctx.template_id = Some(TemplateId(0));
        ctx.current_param_id = Some(ParamId(0));

        ctx.reset_template();

        assert!(ctx.template_tokens.is_empty());
        assert!(ctx.param_tokens.is_empty());
        assert!(ctx.emitted_params.is_empty());
        assert_eq!(ctx.template_id, None);
        assert_eq!(ctx.current_param_id, None);
    }

    #[test]
    fn reset_pose_array_clears_comma_and_digit_state() {
        let mut ctx = GenerationContext::new();
        ctx.commas_in_array = 2;
        ctx.pose_digit_buf.push(5);

        ctx.reset_pose_array();

        assert_eq!(ctx.commas_in_array, 0);
        assert!(ctx.pose_digit_buf.is_empty());
    }
}
