//! The FSM's states, expressed as a sum type with exhaustive matching
//! rather than the string-keyed dispatch the distilled system used
//! (SPEC_FULL.md §9). Each non-terminal state is one of three kinds;
//! [`State::kind`] derives the kind for the generator's dispatch.

/// One state of the constrained generation FSM (SPEC_FULL.md §4.3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    WaitCode,
    AddCategoryKey,
    GenCategoryValue,
    AddPositionKey,
    GenPositionValue,
    AddRotationKey,
    GenRotationValue,
    AddConceptKey,
    GenTemplateName,
    AddParamCon,
    GenParamKey,
    AddParamKvCon,
    GenParamValue,
    AddParamValueCon,
    GenTemplateOrEnd,
    AddNextTemplateCon,
    AddEnd,
    End,
}

/// The three families of behavior a non-terminal state exhibits, plus the
/// terminal state. Dispatch on `StateKind` (rather than on `State`
/// directly) keeps the masking and update logic blind to which literal or
/// trie a given `Add`/`Gen` state happens to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    /// Emit a fixed literal token-by-token.
    Add,
    /// Masked free generation over a dynamic allowed set.
    Gen,
    /// Pass logits through unconstrained until a recognition condition fires.
    Wait,
    /// Only EOS is permitted; generation is done.
    Terminal,
}

impl State {
    pub fn kind(self) -> StateKind {
        use State::*;
        match self {
            WaitCode => StateKind::Wait,
            AddCategoryKey | AddPositionKey | AddRotationKey | AddConceptKey | AddParamCon
            | AddParamKvCon | AddParamValueCon | AddNextTemplateCon | AddEnd => StateKind::Add,
            GenCategoryValue | GenPositionValue | GenRotationValue | GenTemplateName
            | GenParamKey | GenParamValue | GenTemplateOrEnd => StateKind::Gen,
            End => StateKind::Terminal,
        }
    }

    pub fn initial() -> Self {
        State::WaitCode
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, State::End)
    }
}
