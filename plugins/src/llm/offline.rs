use async_trait::async_trait;
use serde_json::{json, Value};

use super::{GenerationPrompt, TextGenerator};

const TONES: &[&str] = &["grim", "hopeful", "mysterious", "whimsical", "heroic"];
const THEMES: &[&str] = &["betrayal", "discovery", "survival", "legacy", "ambition", "faith"];
const REGIONS: &[&str] = &["the Ashen Reach", "Low Harbor", "the Glass Steppe", "Thornwood", "the Sunken Vaults"];
const ROLES: &[&str] = &["leader", "rival", "mentor", "outcast"];

/// Template-based generator that needs no model server.
///
/// Output depends only on the prompt, so repeated runs for the same request
/// produce the same content.
#[derive(Debug, Clone, Default)]
pub struct OfflineGenerator;

impl OfflineGenerator {
    pub fn new() -> Self {
        Self
    }

    fn render(&self, prompt: &GenerationPrompt) -> anyhow::Result<Value> {
        let title = prompt.subject_title.trim();
        let kind = prompt.subject_type.as_str();
        let seed = fnv1a(title) ^ fnv1a(kind);

        let value = match prompt.purpose.as_str() {
            "analyze_request" => json!({
                "themes": [pick(THEMES, seed), pick(THEMES, seed >> 7)],
                "tone": pick(TONES, seed >> 3),
                "key_elements": [title, kind],
                "scope": "standard",
            }),
            "world_building" => json!({
                "name": title,
                "setting": format!("A {} land shaped by {}", pick(TONES, seed >> 3), pick(THEMES, seed)),
                "regions": [pick(REGIONS, seed), pick(REGIONS, seed >> 5)],
                "history": format!("Long before the {kind} of {title} was known, its borders were drawn in conflict."),
            }),
            "characters" => {
                let characters: Vec<Value> = ROLES
                    .iter()
                    .enumerate()
                    .take(3)
                    .map(|(i, role)| {
                        json!({
                            "name": format!("{} {}", title, ["Vale", "Morrow", "Kest"][i]),
                            "role": role,
                            "motivation": pick(THEMES, seed >> (i * 4)),
                        })
                    })
                    .collect();
                json!({ "characters": characters })
            }
            "narrative" => json!({
                "hook": format!("A stranger arrives in {} carrying news of {}.", title, pick(THEMES, seed >> 2)),
                "arcs": [
                    format!("The {kind} is tested by {}", pick(THEMES, seed)),
                    format!("Old allies choose {}", pick(THEMES, seed >> 9)),
                ],
                "resolution": format!("{title} endures, changed by what it lost."),
            }),
            other => anyhow::bail!("offline generator has no template for '{other}'"),
        };
        Ok(value)
    }
}

#[async_trait]
impl TextGenerator for OfflineGenerator {
    fn name(&self) -> &str {
        "offline"
    }

    async fn generate(&self, prompt: &GenerationPrompt) -> anyhow::Result<String> {
        let value = self.render(prompt)?;
        Ok(serde_json::to_string_pretty(&value)?)
    }
}

fn fnv1a(s: &str) -> u64 {
    s.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, b| {
        (hash ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
    })
}

fn pick(pool: &[&'static str], seed: u64) -> &'static str {
    pool[(seed % pool.len() as u64) as usize]
}

#[cfg(test)]
mod tests {
    use super::*;
    use taleforge_core::api::SubjectType;

    #[tokio::test]
    async fn same_prompt_same_output() {
        let gen = OfflineGenerator::new();
        let prompt = GenerationPrompt::new("world_building", "Alpha", SubjectType::World);
        let a = gen.generate(&prompt).await.unwrap();
        let b = gen.generate(&prompt).await.unwrap();
        assert_eq!(a, b);

        let value: Value = serde_json::from_str(&a).unwrap();
        assert_eq!(value["name"], "Alpha");
        assert_eq!(value["regions"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn characters_template_lists_three() {
        let gen = OfflineGenerator::new();
        let prompt = GenerationPrompt::new("characters", "Beta", SubjectType::Faction);
        let value: Value = serde_json::from_str(&gen.generate(&prompt).await.unwrap()).unwrap();
        assert_eq!(value["characters"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn unknown_purpose_is_an_error() {
        let gen = OfflineGenerator::new();
        let prompt = GenerationPrompt::new("poetry", "Alpha", SubjectType::Item);
        assert!(gen.generate(&prompt).await.is_err());
    }
}
