//! Plan-writing tool: lets a planning agent lay out steps before handing off.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::{Tool, ToolContext, ToolOutput};

pub struct WritePlanTool;

#[derive(Debug, Deserialize)]
struct PlanInput {
    steps: Vec<PlanStep>,
}

#[derive(Debug, Deserialize)]
struct PlanStep {
    title: String,
    #[serde(default)]
    description: String,
}

#[async_trait]
impl Tool for WritePlanTool {
    fn name(&self) -> &str {
        "write_plan"
    }

    fn description(&self) -> &str {
        "Write an execution plan for the user's request as an ordered list of steps."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "steps": {
                    "type": "array",
                    "description": "Ordered steps of the plan",
                    "items": {
                        "type": "object",
                        "properties": {
                            "title": { "type": "string", "description": "Short step title" },
                            "description": { "type": "string", "description": "What the step does" }
                        },
                        "required": ["title", "description"]
                    }
                }
            },
            "required": ["steps"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        _context: &ToolContext,
    ) -> anyhow::Result<ToolOutput> {
        let input: PlanInput = serde_json::from_value(params)?;
        if input.steps.is_empty() {
            return Ok(ToolOutput::error("plan has no steps"));
        }

        let mut content = format!("Plan written with {} steps:", input.steps.len());
        for (i, step) in input.steps.iter().enumerate() {
            content.push_str(&format!("\n{}. {}", i + 1, step.title));
            if !step.description.is_empty() {
                content.push_str(&format!(": {}", step.description));
            }
        }
        Ok(ToolOutput::ok(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChannelNotifier;
    use std::sync::Arc;

    fn ctx() -> ToolContext {
        ToolContext {
            session_id: "s1".into(),
            canvas_id: None,
            tool_call_id: "call_1".into(),
            image_model: None,
            notifier: Arc::new(ChannelNotifier::new().0),
        }
    }

    #[tokio::test]
    async fn test_write_plan_lists_steps() {
        let out = WritePlanTool
            .execute(
                json!({"steps": [
                    {"title": "Design", "description": "Pick a palette"},
                    {"title": "Generate", "description": "Render the poster"}
                ]}),
                &ctx(),
            )
            .await
            .unwrap();
        assert!(!out.is_error);
        assert!(out.content.starts_with("Plan written with 2 steps:"));
        assert!(out.content.contains("2. Generate: Render the poster"));
    }

    #[tokio::test]
    async fn test_write_plan_rejects_bad_input() {
        assert!(WritePlanTool.execute(json!({"step": []}), &ctx()).await.is_err());
        let empty = WritePlanTool
            .execute(json!({"steps": []}), &ctx())
            .await
            .unwrap();
        assert!(empty.is_error);
    }
}
