//! Built-in provider registry: well-known OpenAI-compatible endpoints, used
//! to fill in a profile's `baseUrl`/default model when a deployment omits
//! them rather than requiring every installation to look up vendor URLs.

/// A well-known, OpenAI-compatible provider.
#[derive(Debug, Clone, Copy)]
pub struct KnownProvider {
    pub id: &'static str,
    pub display_name: &'static str,
    pub base_url: &'static str,
    pub default_model: &'static str,
}

pub const KNOWN_PROVIDERS: &[KnownProvider] = &[
    KnownProvider {
        id: "anthropic",
        display_name: "Anthropic",
        base_url: "https://api.anthropic.com",
        default_model: "claude3opus",
    },
    KnownProvider {
        id: "openai",
        display_name: "OpenAI",
        base_url: "https://api.openai.com",
        default_model: "gpt-4o",
    },
    KnownProvider {
        id: "groq",
        display_name: "Groq",
        base_url: "https://api.groq.com/openai",
        default_model: "llama-3.3-70b-versatile",
    },
    KnownProvider {
        id: "openrouter",
        display_name: "OpenRouter",
        base_url: "https://openrouter.ai/api",
        default_model: "openai/gpt-4o",
    },
];

pub fn lookup(provider_id: &str) -> Option<&'static KnownProvider> {
    KNOWN_PROVIDERS.iter().find(|p| p.id == provider_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_finds_known_provider_by_id() {
        assert_eq!(lookup("groq").unwrap().default_model, "llama-3.3-70b-versatile");
        assert!(lookup("nonexistent").is_none());
    }
}
