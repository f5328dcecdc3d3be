//! Builder for the `NextRound` input.

use crate::types::{ParticipantId, RoundInfoInput};
use std::collections::BTreeMap;

/// Fluent construction of a [`RoundInfoInput`].
///
/// Lists left unset stay `None`, so the next round opens without that check
/// category.
#[derive(Debug, Clone, Default)]
pub struct RoundPlanBuilder {
    node_result: BTreeMap<ParticipantId, bool>,
    node_list: Option<Vec<ParticipantId>>,
    cloud_list: Option<Vec<ParticipantId>>,
    positive_list: Option<Vec<ParticipantId>>,
}

impl RoundPlanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the server's verdict for a node check of the closing round.
    pub fn finalize(mut self, participant: ParticipantId, result: bool) -> Self {
        self.node_result.insert(participant, result);
        self
    }

    pub fn node_checks<I>(mut self, participants: I) -> Self
    where
        I: IntoIterator<Item = ParticipantId>,
    {
        self.node_list
            .get_or_insert_with(Vec::new)
            .extend(participants);
        self
    }

    pub fn cloud_checks<I>(mut self, participants: I) -> Self
    where
        I: IntoIterator<Item = ParticipantId>,
    {
        self.cloud_list
            .get_or_insert_with(Vec::new)
            .extend(participants);
        self
    }

    pub fn positive_checks<I>(mut self, participants: I) -> Self
    where
        I: IntoIterator<Item = ParticipantId>,
    {
        self.positive_list
            .get_or_insert_with(Vec::new)
            .extend(participants);
        self
    }

    pub fn build(self) -> RoundInfoInput {
        RoundInfoInput {
            node_result: self.node_result,
            node_list: self.node_list,
            cloud_list: self.cloud_list,
            positive_list: self.positive_list,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_plan() {
        let input = RoundPlanBuilder::new().build();
        assert_eq!(input, RoundInfoInput::default());
    }

    #[test]
    fn test_plan_collects_lists() {
        let a = ParticipantId::from("a");
        let b = ParticipantId::from("b");
        let input = RoundPlanBuilder::new()
            .finalize(a.clone(), true)
            .node_checks([a.clone()])
            .node_checks([b.clone()])
            .positive_checks([b.clone()])
            .build();

        assert_eq!(input.node_result.get(&a), Some(&true));
        assert_eq!(input.node_list, Some(vec![a, b.clone()]));
        assert_eq!(input.positive_list, Some(vec![b]));
        assert!(input.cloud_list.is_none());
    }
}
