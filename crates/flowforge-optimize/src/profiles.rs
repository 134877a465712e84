//! Named experiment profiles resolving to a concrete knob configuration (C9).

use flowforge_core::ExperimentProfile;

/// The set of toggles an [`ExperimentProfile`] resolves to, consumed by the dataset
/// synthesizer, judge construction, and the search engine's mutation gates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizationKnobs {
    pub profile: ExperimentProfile,
    pub dynamic_dataset: bool,
    pub enable_paraphrase: bool,
    pub enable_hard_negatives: bool,
    pub use_ensemble_judge: bool,
    pub enable_prompt_mutation: bool,
    pub enable_tool_mutation: bool,
    pub enable_topology_mutation: bool,
    pub enable_failure_aware_mutation: bool,
    pub use_holdout: bool,
    pub enable_tool_historical_gain: bool,
    pub uncertainty_penalty: f64,
    pub generalization_penalty: f64,
}

impl OptimizationKnobs {
    /// `full_system` defaults: every mutation/augmentation path active. Not present anywhere
    /// in the originating implementation; values chosen here (all booleans true, zero
    /// uncertainty penalty, a light 0.1 generalization penalty) are recorded as a resolved
    /// open question rather than reverse-engineered from a missing source.
    fn full_system() -> Self {
        OptimizationKnobs {
            profile: ExperimentProfile::FullSystem,
            dynamic_dataset: true,
            enable_paraphrase: true,
            enable_hard_negatives: true,
            use_ensemble_judge: true,
            enable_prompt_mutation: true,
            enable_tool_mutation: true,
            enable_topology_mutation: true,
            enable_failure_aware_mutation: true,
            use_holdout: true,
            enable_tool_historical_gain: true,
            uncertainty_penalty: 0.0,
            generalization_penalty: 0.1,
        }
    }
}

/// Resolves a profile tag to its knob configuration. Ablation profiles start from
/// `full_system` and flip exactly one axis; the three named-system profiles
/// (baseline/dynamic-prompt/dynamic-prompt-tool) set every axis explicitly.
pub fn resolve_optimization_knobs(profile: ExperimentProfile) -> OptimizationKnobs {
    let base = OptimizationKnobs::full_system();
    match profile {
        ExperimentProfile::BaselineStaticPromptOnly => OptimizationKnobs {
            profile,
            dynamic_dataset: false,
            enable_paraphrase: false,
            enable_hard_negatives: false,
            use_ensemble_judge: false,
            enable_prompt_mutation: true,
            enable_tool_mutation: false,
            enable_topology_mutation: false,
            enable_failure_aware_mutation: true,
            use_holdout: true,
            enable_tool_historical_gain: false,
            uncertainty_penalty: 0.0,
            generalization_penalty: 0.0,
        },
        ExperimentProfile::DynamicPromptOnly => OptimizationKnobs {
            profile,
            dynamic_dataset: true,
            enable_paraphrase: true,
            enable_hard_negatives: true,
            use_ensemble_judge: false,
            enable_prompt_mutation: true,
            enable_tool_mutation: false,
            enable_topology_mutation: false,
            enable_failure_aware_mutation: true,
            use_holdout: true,
            enable_tool_historical_gain: false,
            uncertainty_penalty: 0.0,
            generalization_penalty: 0.0,
        },
        ExperimentProfile::DynamicPromptTool => OptimizationKnobs {
            profile,
            dynamic_dataset: true,
            enable_paraphrase: true,
            enable_hard_negatives: true,
            use_ensemble_judge: false,
            enable_prompt_mutation: true,
            enable_tool_mutation: true,
            enable_topology_mutation: false,
            enable_failure_aware_mutation: true,
            use_holdout: true,
            enable_tool_historical_gain: true,
            uncertainty_penalty: 0.0,
            generalization_penalty: 0.0,
        },
        ExperimentProfile::AblationNoHoldout => {
            OptimizationKnobs { profile, use_holdout: false, uncertainty_penalty: 0.12, generalization_penalty: 0.0, ..base }
        }
        ExperimentProfile::AblationSingleJudge => {
            OptimizationKnobs { profile, use_ensemble_judge: false, ..base }
        }
        ExperimentProfile::AblationNoHardNegative => {
            OptimizationKnobs { profile, enable_hard_negatives: false, ..base }
        }
        ExperimentProfile::AblationNoToolGain => {
            OptimizationKnobs { profile, enable_tool_historical_gain: false, ..base }
        }
        ExperimentProfile::AblationNoTopologyMutation => {
            OptimizationKnobs { profile, enable_topology_mutation: false, ..base }
        }
        ExperimentProfile::FullSystem | ExperimentProfile::IdeaFailureAwareMutation => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_system_enables_every_axis() {
        let knobs = resolve_optimization_knobs(ExperimentProfile::FullSystem);
        assert!(knobs.dynamic_dataset);
        assert!(knobs.enable_tool_mutation);
        assert!(knobs.enable_topology_mutation);
        assert_eq!(knobs.uncertainty_penalty, 0.0);
    }

    #[test]
    fn no_holdout_ablation_sets_uncertainty_penalty() {
        let knobs = resolve_optimization_knobs(ExperimentProfile::AblationNoHoldout);
        assert!(!knobs.use_holdout);
        assert_eq!(knobs.uncertainty_penalty, 0.12);
    }

    #[test]
    fn baseline_disables_tool_and_topology_mutation() {
        let knobs = resolve_optimization_knobs(ExperimentProfile::BaselineStaticPromptOnly);
        assert!(!knobs.enable_tool_mutation);
        assert!(!knobs.enable_topology_mutation);
        assert!(!knobs.dynamic_dataset);
    }
}
