//! Result synthesis for collaborative workflows
//!
//! Outputs are merged strictly in dispatch order, so the synthesis only
//! depends on what the agents returned and never on which finished first.

use crate::error::{Error, Result};
use crate::types::AgentId;
use crate::workflow::AgentInvocationResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// How agent payloads are combined into the synthesis text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisStrategy {
    /// One headed section per agent
    #[default]
    Concatenate,
    /// Join all lines, dropping lines already seen
    Merge,
}

/// One agent's payload inside a synthesized result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentContribution {
    /// Contributing agent
    pub agent_id: AgentId,
    /// Agent type
    pub agent_type: String,
    /// Raw payload
    pub payload: Value,
}

/// Merged answer of a collaborative workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizedResult {
    /// Combined answer text
    pub synthesis: String,
    /// Payloads keyed by agent, dispatch order
    pub agent_outputs: Vec<AgentContribution>,
    /// Agents whose output is part of the synthesis
    pub contributing_agents: Vec<AgentId>,
    /// True when at least one dispatched agent failed
    pub degraded: bool,
    /// Agents that failed or timed out
    pub failed_agents: Vec<AgentId>,
}

/// Merges collaborative agent outputs
#[derive(Debug, Clone, Default)]
pub struct ResultSynthesizer {
    strategy: SynthesisStrategy,
}

impl ResultSynthesizer {
    /// Create a synthesizer
    pub fn new(strategy: SynthesisStrategy) -> Self {
        Self { strategy }
    }

    /// Merge the results of one workflow, given in dispatch order
    pub fn synthesize(&self, results: &[AgentInvocationResult]) -> Result<SynthesizedResult> {
        let (succeeded, failed): (Vec<_>, Vec<_>) = results.iter().partition(|r| r.success);
        if succeeded.is_empty() {
            return Err(Error::AllAgentsFailed {
                failures: failed.iter().map(|r| r.failure_summary()).collect(),
            });
        }

        let synthesis = match self.strategy {
            SynthesisStrategy::Concatenate => succeeded
                .iter()
                .map(|r| format!("## {}\n\n{}", r.agent_id, payload_text(&r.payload)))
                .collect::<Vec<_>>()
                .join("\n\n---\n\n"),
            SynthesisStrategy::Merge => {
                let mut seen = HashSet::new();
                let texts: Vec<String> = succeeded.iter().map(|r| payload_text(&r.payload)).collect();
                texts
                    .iter()
                    .flat_map(|text| text.lines())
                    .filter(|line| seen.insert(line.to_string()))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        };

        Ok(SynthesizedResult {
            synthesis,
            agent_outputs: succeeded
                .iter()
                .map(|r| AgentContribution {
                    agent_id: r.agent_id.clone(),
                    agent_type: r.agent_type.clone(),
                    payload: r.payload.clone(),
                })
                .collect(),
            contributing_agents: succeeded.iter().map(|r| r.agent_id.clone()).collect(),
            degraded: !failed.is_empty(),
            failed_agents: failed.iter().map(|r| r.agent_id.clone()).collect(),
        })
    }
}

/// Human-readable text of an opaque payload
pub fn payload_text(payload: &Value) -> String {
    match payload {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        Value::Object(map) => ["result", "message", "answer", "text"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| payload.to_string()),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ok(id: &str, payload: Value) -> AgentInvocationResult {
        AgentInvocationResult::success(AgentId::new(id), "test", payload, 5)
    }

    fn failed(id: &str) -> AgentInvocationResult {
        AgentInvocationResult::failure(AgentId::new(id), "test", "boom", 5)
    }

    #[test]
    fn test_concatenate_in_dispatch_order() {
        let results = vec![
            ok("pdf_agent", json!({ "text": "Invoice total 42" })),
            ok("ocr_agent", json!("Scanned header")),
        ];
        let merged = ResultSynthesizer::default().synthesize(&results).unwrap();

        assert_eq!(
            merged.synthesis,
            "## pdf_agent\n\nInvoice total 42\n\n---\n\n## ocr_agent\n\nScanned header"
        );
        assert!(!merged.degraded);
        assert_eq!(merged.agent_outputs[0].agent_id, AgentId::new("pdf_agent"));
    }

    #[test]
    fn test_partial_failure_is_degraded() {
        let results = vec![failed("pdf_agent"), ok("ocr_agent", json!({ "result": "text" }))];
        let merged = ResultSynthesizer::default().synthesize(&results).unwrap();

        assert!(merged.degraded);
        assert_eq!(merged.failed_agents, vec![AgentId::new("pdf_agent")]);
        assert_eq!(merged.contributing_agents, vec![AgentId::new("ocr_agent")]);
        assert_eq!(merged.synthesis, "## ocr_agent\n\ntext");
    }

    #[test]
    fn test_merge_deduplicates_lines() {
        let results = vec![ok("a", json!("alpha\nshared")), ok("b", json!("shared\nbeta"))];
        let merged = ResultSynthesizer::new(SynthesisStrategy::Merge)
            .synthesize(&results)
            .unwrap();
        assert_eq!(merged.synthesis, "alpha\nshared\nbeta");
    }

    #[test]
    fn test_no_survivors_is_an_error() {
        let err = ResultSynthesizer::default()
            .synthesize(&[failed("a"), failed("b")])
            .unwrap_err();
        assert!(matches!(err, Error::AllAgentsFailed { failures } if failures.len() == 2));
    }

    #[test]
    fn test_payload_text_falls_back_to_json() {
        assert_eq!(payload_text(&json!({ "value": 3 })), r#"{"value":3}"#);
        assert_eq!(payload_text(&json!(7)), "7");
    }
}
