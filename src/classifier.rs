//! Command classifier
//!
//! Decides whether a command goes to one agent or to a collaborative
//! workflow. Matching is purely lexical and deterministic:
//!
//! 1. the command is split into lowercase alphanumeric tokens
//! 2. each agent's intent tags are matched (whole token for single words,
//!    substring for phrases and symbols)
//! 3. one match runs single, zero matches runs the fallback agent
//! 4. several matches run collaboratively only when a breadth signal fires,
//!    otherwise the highest-priority match runs alone

use crate::agent::AgentDescriptor;
use crate::config::ClassifierConfig;
use crate::error::{Error, Result};
use crate::registry::RegistrySnapshot;
use crate::types::{AgentId, Command};
use crate::workflow::{Workflow, WorkflowMode};
use serde::Serialize;
use std::cmp::Reverse;
use std::sync::Arc;
use std::time::Instant;

/// Intent tags an agent matched
#[derive(Debug, Clone, Serialize)]
pub struct IntentMatch {
    /// Matching agent
    pub agent_id: AgentId,
    /// Tags that matched, in declaration order
    pub tags: Vec<String>,
}

/// Why a multi-match command was considered broad
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum BreadthSignal {
    /// Several agents each matched a tag no other matched agent holds
    IndependentIntents { agents: usize },
    /// Several breadth keyword categories were present
    Categories { categories: Vec<String> },
    /// An explicit multi-topic phrase was present
    Phrase { phrase: String },
    /// The command is long enough to be a compound request
    CompoundLength { tokens: usize },
}

/// Result of classifying one command
#[derive(Debug)]
pub struct Classification {
    /// Workflow in the `Classified` state
    pub workflow: Workflow,
    /// Every agent that matched, registry order
    pub matches: Vec<IntentMatch>,
    /// Breadth signals that fired (empty unless several agents matched)
    pub breadth: Vec<BreadthSignal>,
    /// Whether the fallback agent was used
    pub used_fallback: bool,
}

/// Lexical command classifier
#[derive(Debug, Clone, Default)]
pub struct CommandClassifier {
    config: ClassifierConfig,
}

impl CommandClassifier {
    /// Create a classifier with the given thresholds
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// Classifier thresholds
    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify a command against a registry snapshot
    pub fn classify(&self, command: Command, registry: &RegistrySnapshot) -> Result<Classification> {
        let started_at = Instant::now();
        let lowered = command.text().to_lowercase();
        let tokens = tokenize(&lowered);

        let matched: Vec<(usize, &Arc<AgentDescriptor>, Vec<String>)> = registry
            .iter()
            .enumerate()
            .filter_map(|(index, descriptor)| {
                let tags: Vec<String> = descriptor
                    .intents
                    .iter()
                    .filter(|tag| matches_term(tag, &tokens, &lowered))
                    .cloned()
                    .collect();
                (!tags.is_empty()).then_some((index, descriptor, tags))
            })
            .collect();

        let matches: Vec<IntentMatch> = matched
            .iter()
            .map(|(_, d, tags)| IntentMatch {
                agent_id: d.agent_id.clone(),
                tags: tags.clone(),
            })
            .collect();

        let mut breadth = Vec::new();
        let mut used_fallback = false;

        let (mode, targets) = match matched.len() {
            0 => {
                used_fallback = true;
                (WorkflowMode::Single, vec![self.fallback(registry)?])
            }
            1 => (WorkflowMode::Single, vec![matched[0].1.agent_id.clone()]),
            _ => {
                breadth = self.breadth_signals(&matches, &tokens, &lowered);
                if breadth.is_empty() {
                    let (_, best, _) = matched
                        .iter()
                        .min_by_key(|(index, d, _)| (Reverse(d.priority), *index))
                        .ok_or_else(|| Error::NoCapableAgent(command.text().to_string()))?;
                    (WorkflowMode::Single, vec![best.agent_id.clone()])
                } else {
                    let targets = matched
                        .iter()
                        .take(self.config.max_collaborators)
                        .map(|(_, d, _)| d.agent_id.clone())
                        .collect();
                    (WorkflowMode::Collaborative, targets)
                }
            }
        };

        tracing::debug!(
            mode = %mode,
            targets = ?targets,
            matched = matches.len(),
            breadth = ?breadth,
            "Classified command"
        );

        let workflow = Workflow::new(command, mode, targets, started_at)?;
        Ok(Classification {
            workflow,
            matches,
            breadth,
            used_fallback,
        })
    }

    fn fallback(&self, registry: &RegistrySnapshot) -> Result<AgentId> {
        let Some(fallback) = &self.config.fallback_agent else {
            return Err(Error::NoCapableAgent(
                "no agent matched the command and no fallback agent is configured".to_string(),
            ));
        };
        let fallback = AgentId::new(fallback.as_str());
        if registry.get(&fallback).is_none() {
            return Err(Error::NoCapableAgent(format!(
                "no agent matched the command and fallback agent '{}' is not registered",
                fallback
            )));
        }
        Ok(fallback)
    }

    fn breadth_signals(&self, matches: &[IntentMatch], tokens: &[String], lowered: &str) -> Vec<BreadthSignal> {
        let mut signals = Vec::new();

        let independent = matches
            .iter()
            .filter(|m| {
                m.tags.iter().any(|tag| {
                    matches
                        .iter()
                        .filter(|other| other.agent_id != m.agent_id)
                        .all(|other| !other.tags.contains(tag))
                })
            })
            .count();
        if independent >= self.config.min_independent_agents {
            signals.push(BreadthSignal::IndependentIntents { agents: independent });
        }

        let categories: Vec<String> = self
            .config
            .breadth_categories
            .iter()
            .filter(|(_, words)| words.iter().any(|w| matches_term(&w.to_lowercase(), tokens, lowered)))
            .map(|(name, _)| name.clone())
            .collect();
        if categories.len() >= self.config.min_breadth_categories {
            signals.push(BreadthSignal::Categories { categories });
        }

        if let Some(phrase) = self
            .config
            .breadth_phrases
            .iter()
            .find(|p| lowered.contains(&p.to_lowercase()))
        {
            signals.push(BreadthSignal::Phrase {
                phrase: phrase.clone(),
            });
        }

        if tokens.len() >= self.config.min_compound_tokens {
            signals.push(BreadthSignal::CompoundLength {
                tokens: tokens.len(),
            });
        }

        signals
    }
}

/// Split lowercased text into alphanumeric tokens
fn tokenize(lowered: &str) -> Vec<String> {
    lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Single words match the start of a token ("pdf" matches "pdfs"); phrases and symbols match substrings
fn matches_term(term: &str, tokens: &[String], lowered: &str) -> bool {
    if term.is_empty() {
        return false;
    }
    if term.chars().all(char::is_alphanumeric) {
        tokens.iter().any(|t| t.starts_with(term))
    } else {
        lowered.contains(term)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::FnAgent;
    use crate::registry::AgentRegistry;
    use serde_json::Value;

    fn agent(id: &str, intents: &[&str], priority: i32) -> AgentDescriptor {
        AgentDescriptor::new(id, id.trim_end_matches("_agent"), Arc::new(FnAgent::new(|_| async { Ok(Value::Null) })))
            .with_intents(intents.iter().copied())
            .with_priority(priority)
    }

    fn registry() -> AgentRegistry {
        let registry = AgentRegistry::new();
        registry.register(agent("math_agent", &["calculate", "math", "%", "+"], 0)).unwrap();
        registry.register(agent("document_agent", &["pdf", "document", "analyze", "extract text"], 5)).unwrap();
        registry.register(agent("ocr_agent", &["ocr", "image", "extract text"], 1)).unwrap();
        registry.register(agent("echo_agent", &[], 0)).unwrap();
        registry
    }

    fn classify(classifier: &CommandClassifier, text: &str) -> Result<Classification> {
        classifier.classify(Command::new(text).unwrap(), &registry().snapshot())
    }

    #[test]
    fn test_single_match_is_single_mode() {
        let classifier = CommandClassifier::default();
        let c = classify(&classifier, "Calculate 15% of 200").unwrap();
        assert_eq!(c.workflow.mode, WorkflowMode::Single);
        assert_eq!(c.workflow.agent_ids, vec![AgentId::new("math_agent")]);
        assert_eq!(c.matches[0].tags, vec!["calculate", "%"]);
    }

    #[test]
    fn test_word_tags_match_token_prefixes() {
        let classifier = CommandClassifier::default();
        let c = classify(&classifier, "summarize these PDFs").unwrap();
        assert_eq!(c.workflow.agent_ids, vec![AgentId::new("document_agent")]);
        assert_eq!(c.matches[0].tags, vec!["pdf"]);

        // "aftermath" ends with "math" but does not start with it
        let err = classify(&classifier, "tell me about the aftermath").unwrap_err();
        assert!(matches!(err, Error::NoCapableAgent(_)));
    }

    #[test]
    fn test_no_match_uses_fallback() {
        let classifier = CommandClassifier::new(ClassifierConfig::default().with_fallback("echo_agent"));
        let c = classify(&classifier, "hello there").unwrap();
        assert!(c.used_fallback);
        assert_eq!(c.workflow.agent_ids, vec![AgentId::new("echo_agent")]);
    }

    #[test]
    fn test_unregistered_fallback_fails() {
        let classifier = CommandClassifier::new(ClassifierConfig::default().with_fallback("missing"));
        assert!(matches!(classify(&classifier, "hello"), Err(Error::NoCapableAgent(_))));
    }

    #[test]
    fn test_empty_registry_without_fallback() {
        let classifier = CommandClassifier::default();
        let empty = AgentRegistry::new();
        let err = classifier
            .classify(Command::new("anything").unwrap(), &empty.snapshot())
            .unwrap_err();
        assert!(matches!(err, Error::NoCapableAgent(_)));
    }

    #[test]
    fn test_weak_multi_match_picks_priority() {
        let classifier = CommandClassifier::default();
        let c = classify(&classifier, "extract text from this").unwrap();
        assert_eq!(c.matches.len(), 2);
        assert!(c.breadth.is_empty());
        assert_eq!(c.workflow.mode, WorkflowMode::Single);
        assert_eq!(c.workflow.agent_ids, vec![AgentId::new("document_agent")]);
    }

    #[test]
    fn test_priority_tie_breaks_on_insertion_order() {
        let registry = AgentRegistry::new();
        registry.register(agent("first_agent", &["report"], 2)).unwrap();
        registry.register(agent("second_agent", &["report"], 2)).unwrap();

        let c = CommandClassifier::default()
            .classify(Command::new("report please").unwrap(), &registry.snapshot())
            .unwrap();
        assert_eq!(c.workflow.agent_ids, vec![AgentId::new("first_agent")]);
    }

    #[test]
    fn test_breadth_phrase_triggers_collaboration() {
        let classifier = CommandClassifier::default();
        let c = classify(&classifier, "OCR the image, extract and analyze the pdf").unwrap();
        assert_eq!(c.workflow.mode, WorkflowMode::Collaborative);
        assert_eq!(
            c.workflow.agent_ids,
            vec![AgentId::new("document_agent"), AgentId::new("ocr_agent")]
        );
        assert!(c
            .breadth
            .contains(&BreadthSignal::Phrase { phrase: "extract and analyze".into() }));
    }

    #[test]
    fn test_breadth_categories_trigger_collaboration() {
        let classifier = CommandClassifier::default();
        let c = classify(&classifier, "give a thorough study of the pdf and ocr output").unwrap();
        assert_eq!(c.workflow.mode, WorkflowMode::Collaborative);
        assert!(matches!(c.breadth[0], BreadthSignal::Categories { .. }));
    }

    #[test]
    fn test_token_threshold_is_configurable() {
        let classifier = CommandClassifier::new(ClassifierConfig::default().with_min_compound_tokens(6));
        let c = classify(&classifier, "ocr this image then check pdf").unwrap();
        assert_eq!(c.workflow.mode, WorkflowMode::Collaborative);
        assert_eq!(c.breadth, vec![BreadthSignal::CompoundLength { tokens: 6 }]);
    }

    #[test]
    fn test_collaborators_are_capped() {
        let registry = AgentRegistry::new();
        for i in 0..4 {
            registry.register(agent(&format!("agent_{i}"), &[format!("topic{i}").as_str()], 0)).unwrap();
        }
        let mut config = ClassifierConfig::default();
        config.max_collaborators = 2;

        let c = CommandClassifier::new(config)
            .classify(
                Command::new("topic0 topic1 topic2 topic3").unwrap(),
                &registry.snapshot(),
            )
            .unwrap();
        assert_eq!(c.workflow.mode, WorkflowMode::Collaborative);
        assert!(matches!(c.breadth[0], BreadthSignal::IndependentIntents { agents: 4 }));
        assert_eq!(
            c.workflow.agent_ids,
            vec![AgentId::new("agent_0"), AgentId::new("agent_1")]
        );
    }
}
