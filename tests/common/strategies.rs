//! Proptest strategies

#![allow(dead_code)]

use proptest::prelude::*;

/// What a junction sub-signal is told
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubOutcome {
    Success,
    Failure,
    Abort,
}

impl SubOutcome {
    /// Name of the parent call this outcome drives
    pub fn parent_call(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Abort => "aborted",
        }
    }
}

pub fn sub_outcome_strategy() -> impl Strategy<Value = SubOutcome> {
    prop_oneof![
        6 => Just(SubOutcome::Success),
        1 => Just(SubOutcome::Failure),
        1 => Just(SubOutcome::Abort),
    ]
}

/// Outcome per sub-signal, plus the order in which sub-signals are fired
pub fn junction_schedule_strategy() -> impl Strategy<Value = (Vec<SubOutcome>, Vec<usize>)> {
    prop::collection::vec(sub_outcome_strategy(), 1..24).prop_flat_map(|outcomes| {
        let order: Vec<usize> = (0..outcomes.len()).collect();
        (Just(outcomes), Just(order).prop_shuffle())
    })
}

/// Candidate edges between `nodes` graph nodes; self-edges included
pub fn edge_list_strategy(nodes: usize) -> impl Strategy<Value = Vec<(usize, usize)>> {
    prop::collection::vec((0..nodes, 0..nodes), 0..nodes * 3)
}
