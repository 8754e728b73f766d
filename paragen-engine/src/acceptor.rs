//! Builds the precomputed prefix-acceptor tables (`CAT_TRIE`, `TPL_TRIE`,
//! `PARAM_TRIE`) from a [`Schema`] and a [`TokenizerAdapter`], once at init.
//! Also performs the init-time vocabulary-collision check (§7,
//! `VocabularyCollision`): every enumeration and literal token must fall
//! outside the reserved value-token range.

use std::collections::HashMap;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::literals::Literals;
use crate::schema::{CategoryId, ParamId, Schema, TemplateId};
use crate::tokenizer::TokenizerAdapter;
use crate::trie::TokenTrie;

/// Prefix acceptors for category, template, and parameter names, keyed by
/// the interned ids from [`Schema`].
pub struct Acceptors {
    cat_trie: TokenTrie,
    cat_id_by_tokens: HashMap<Vec<u32>, CategoryId>,

    tpl_tries: HashMap<CategoryId, TokenTrie>,
    tpl_id_by_tokens: HashMap<(CategoryId, Vec<u32>), TemplateId>,

    param_tries: HashMap<(CategoryId, TemplateId), TokenTrie>,
    param_id_by_tokens: HashMap<(CategoryId, TemplateId, Vec<u32>), ParamId>,
    param_tokens_by_id: HashMap<(CategoryId, TemplateId, ParamId), Vec<u32>>,
}

impl Acceptors {
    /// Build every trie from `schema`, encoding each name with `tokenizer`,
    /// then verify no resulting token (enumeration or literal) collides
    /// with the reserved value-token range.
    pub fn build(schema: &Schema, tokenizer: &TokenizerAdapter, literals: &Literals, config: &EngineConfig) -> Result<Self> {
        let mut cat_trie = TokenTrie::new();
        let mut cat_id_by_tokens = HashMap::new();
        let mut tpl_tries = HashMap::new();
        let mut tpl_id_by_tokens = HashMap::new();
        let mut param_tries = HashMap::new();
        let mut param_id_by_tokens = HashMap::new();
        let mut param_tokens_by_id = HashMap::new();

        let mut enumeration_tokens: Vec<(u32, String)> = Vec::new();

        for category in schema.category_ids() {
            let name = schema.category_name(category);
            let tokens = tokenizer.encode_literal(name)?;
            for &t in &tokens {
                enumeration_tokens.push((t, name.to_string()));
            }
            cat_trie.insert(&tokens);
            cat_id_by_tokens.insert(tokens, category);

            let mut tpl_trie = TokenTrie::new();
            for template in schema.template_ids(category) {
                let tname = schema.template_name(category, template);
                let ttokens = tokenizer.encode_literal(tname)?;
                for &t in &ttokens {
                    enumeration_tokens.push((t, tname.to_string()));
                }
                tpl_trie.insert(&ttokens);
                tpl_id_by_tokens.insert((category, ttokens), template);

                let mut param_trie = TokenTrie::new();
                for param in schema.param_ids(category, template) {
                    let pname = schema.param_name(category, template, param);
                    let ptokens = tokenizer.encode_literal(pname)?;
                    for &t in &ptokens {
                        enumeration_tokens.push((t, pname.to_string()));
                    }
                    param_trie.insert(&ptokens);
                    param_tokens_by_id.insert((category, template, param), ptokens.clone());
                    param_id_by_tokens.insert((category, template, ptokens), param);
                }
                param_tries.insert((category, template), param_trie);
            }
            tpl_tries.insert(category, tpl_trie);
        }

        for (token, literal) in literals.iter().flat_map(|l| l.tokens.iter().map(move |t| (*t, l.text.to_string()))) {
            enumeration_tokens.push((token, literal));
        }

        for (token, source) in &enumeration_tokens {
            if config.is_value_token(*token) {
                return Err(EngineError::VocabularyCollision {
                    token: *token,
                    literal: source.clone(),
                });
            }
        }

        Ok(Self {
            cat_trie,
            cat_id_by_tokens,
            tpl_tries,
            tpl_id_by_tokens,
            param_tries,
            param_id_by_tokens,
            param_tokens_by_id,
        })
    }

    pub fn category_allowed_next(&self, prefix: &[u32]) -> Vec<u32> {
        self.cat_trie.allowed_next(prefix)
    }

    pub fn category_is_complete(&self, prefix: &[u32]) -> bool {
        self.cat_trie.is_complete(prefix)
    }

    pub fn resolve_category(&self, tokens: &[u32]) -> Option<CategoryId> {
        self.cat_id_by_tokens.get(tokens).copied()
    }

    pub fn template_allowed_next(&self, category: CategoryId, prefix: &[u32]) -> Vec<u32> {
        self.tpl_tries
            .get(&category)
            .map(|t| t.allowed_next(prefix))
            .unwrap_or_default()
    }

    pub fn template_is_complete(&self, category: CategoryId, prefix: &[u32]) -> bool {
        self.tpl_tries
            .get(&category)
            .is_some_and(|t| t.is_complete(prefix))
    }

    pub fn resolve_template(&self, category: CategoryId, tokens: &[u32]) -> Option<TemplateId> {
        self.tpl_id_by_tokens.get(&(category, tokens.to_vec())).copied()
    }

    pub fn param_allowed_next(&self, category: CategoryId, template: TemplateId, prefix: &[u32]) -> Vec<u32> {
        self.param_tries
            .get(&(category, template))
            .map(|t| t.allowed_next(prefix))
            .unwrap_or_default()
    }

    pub fn param_is_complete(&self, category: CategoryId, template: TemplateId, prefix: &[u32]) -> bool {
        self.param_tries
            .get(&(category, template))
            .is_some_and(|t| t.is_complete(prefix))
    }

    pub fn resolve_param(&self, category: CategoryId, template: TemplateId, tokens: &[u32]) -> Option<ParamId> {
        self.param_id_by_tokens
            .get(&(category, template, tokens.to_vec()))
            .copied()
    }

    /// The full token sequence encoding a parameter's name, for the
    /// duplicate-free candidate computation in `GEN_PARAM_KEY` (see
    /// [`crate::fsm::generator`]), which needs to reason about which
    /// unemitted names are still reachable from a given prefix rather than
    /// just "what tokens extend this prefix in the shared trie".
    pub fn param_tokens(&self, category: CategoryId, template: TemplateId, param: ParamId) -> &[u32] {
        &self.param_tokens_by_id[&(category, template, param)]
    }
}
