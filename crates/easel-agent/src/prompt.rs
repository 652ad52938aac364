//! Built-in agent catalogue: the single designer and the default swarm.

use tracing::warn;

use easel_core::config::{AgentConfig, Config, HandoffConfig};
use easel_tools::ToolSet;

use crate::handoff::Handoff;
use crate::runtime::AgentDefinition;

pub const DESIGNER_PROMPT: &str = "You are a professional design agent specializing in visual design and image generation.

IMPORTANT: When users request image generation (using phrases like \"generate image\", \"/generate\", \"create image\", etc.), you MUST use the generate_image tool to actually create the image.

Instructions:
1. For image requests, analyze the prompt and call generate_image with:
   - prompt: Detailed description for image generation
   - aspect_ratio: Choose from 1:1, 16:9, 4:3, 3:4, 9:16 based on content
2. Always use tools when available rather than just describing what you would do
3. Be helpful and creative in interpreting user requests";

pub const PLANNER_PROMPT: &str = "You are a design planning agent. For ALL image generation requests:

1. Write a brief execution plan using write_plan tool
2. IMMEDIATELY transfer to image_designer agent to generate the actual image
3. Do NOT generate text descriptions of images - let image_designer create real images";

pub const IMAGE_DESIGNER_PROMPT: &str = "You are an image generation specialist. Your primary job is to create actual images using the generate_image tool.

1. When you receive an image generation request, immediately use the generate_image tool
2. Extract the main visual elements from the user's request
3. Choose appropriate aspect_ratio: 1:1, 16:9, 4:3, 3:4, or 9:16
4. Generate detailed, descriptive prompts for high-quality image generation
5. ALWAYS call generate_image tool - never just describe what the image would look like";

/// Tools the single-agent designer may call.
pub const DESIGNER_TOOLS: [&str; 1] = ["generate_image"];

/// The single-agent designer. Only [`DESIGNER_TOOLS`] are taken from `tools`.
pub fn designer_agent(tools: &ToolSet) -> AgentDefinition {
    AgentDefinition::new("designer", DESIGNER_PROMPT, tools.subset(&DESIGNER_TOOLS))
}

/// Planner hands off to image designer.
pub fn default_swarm() -> Vec<AgentConfig> {
    vec![
        AgentConfig {
            name: "planner".into(),
            system_prompt: PLANNER_PROMPT.into(),
            tools: vec!["write_plan".into()],
            handoffs: vec![HandoffConfig {
                agent_name: "image_designer".into(),
                description: Some(
                    "Transfer user to the image_designer. About this agent: Specialize in generating images."
                        .into(),
                ),
            }],
        },
        AgentConfig {
            name: "image_designer".into(),
            system_prompt: IMAGE_DESIGNER_PROMPT.into(),
            tools: vec!["generate_image".into()],
            handoffs: Vec::new(),
        },
    ]
}

/// Resolve agent configs against the available tools. Unknown tool names are
/// skipped.
pub fn build_agents(configs: &[AgentConfig], tools: &ToolSet) -> Vec<AgentDefinition> {
    configs
        .iter()
        .map(|c| {
            let own = tools.subset(c.tools.as_slice());
            if own.names().len() < c.tools.len() {
                warn!(agent = %c.name, requested = ?c.tools, available = ?own.names(), "Agent references unknown tools");
            }
            AgentDefinition {
                name: c.name.clone(),
                system_prompt: c.system_prompt.clone(),
                tools: own,
                handoffs: c.handoffs.iter().map(Handoff::from).collect(),
            }
        })
        .collect()
}

/// Swarm agents from config, or the built-in pair when none are configured.
pub fn swarm_agents(config: &Config, tools: &ToolSet) -> Vec<AgentDefinition> {
    match config.swarm_agents() {
        Some(configured) if !configured.is_empty() => build_agents(configured, tools),
        _ => build_agents(&default_swarm(), tools),
    }
}
