#[cfg(test)]
mod tests {
    use crate::config::{CacheConfig, Config, DiscoveryConfig, LLMConfig, LLMProvider, StageCaps};
    use std::io::Write;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert!(!config.verbose);
        assert!(config.cache.enabled);
        assert_eq!(config.discovery.max_research_attempts, 3);
        assert_eq!(config.discovery.combination_count, 15);
    }

    #[test]
    fn test_llm_provider_default() {
        let provider = LLMProvider::default();
        assert_eq!(provider, LLMProvider::Gemini);
    }

    #[test]
    fn test_llm_provider_from_str() {
        assert_eq!(
            "openai".parse::<LLMProvider>().unwrap(),
            LLMProvider::OpenAI
        );
        assert_eq!(
            "DeepSeek".parse::<LLMProvider>().unwrap(),
            LLMProvider::DeepSeek
        );
        assert_eq!(
            "anthropic".parse::<LLMProvider>().unwrap(),
            LLMProvider::Anthropic
        );
        assert_eq!(
            "gemini".parse::<LLMProvider>().unwrap(),
            LLMProvider::Gemini
        );
        assert_eq!(
            "ollama".parse::<LLMProvider>().unwrap(),
            LLMProvider::Ollama
        );

        assert!("invalid".parse::<LLMProvider>().is_err());
    }

    #[test]
    fn test_llm_provider_display() {
        assert_eq!(LLMProvider::OpenAI.to_string(), "openai");
        assert_eq!(LLMProvider::DeepSeek.to_string(), "deepseek");
        assert_eq!(LLMProvider::Anthropic.to_string(), "anthropic");
        assert_eq!(LLMProvider::Gemini.to_string(), "gemini");
        assert_eq!(LLMProvider::Ollama.to_string(), "ollama");
    }

    #[test]
    fn test_llm_config_default() {
        let config = LLMConfig::default();

        // api_key may be empty if env var is not set
        assert!(!config.api_base_url.is_empty());
        assert!(!config.model_efficient.is_empty());
        assert!(!config.model_powerful.is_empty());
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.retry_delay_ms, 1000);
        assert_eq!(config.max_retry_delay_ms, 30_000);
        assert_eq!(config.rate_limit_rpm, 1000);
        assert_eq!(config.max_parallels, 8);
    }

    #[test]
    fn test_discovery_config_default() {
        let config = DiscoveryConfig::default();

        assert_eq!(config.min_attributes_per_combo, 2);
        assert_eq!(config.decay_rate, 0.7);
        assert_eq!(config.figures_per_search, 3);
        assert_eq!(config.min_similarity, 0.2);
        assert_eq!(config.immediate_results_limit, 100);
        assert!(!config.retry_exhausted);
        assert!(!config.refresh_on_cache_hit);
        assert!(config.salvage_rejected_names);
    }

    #[test]
    fn test_cache_config_default() {
        let config = CacheConfig::default();

        assert!(config.enabled);
        assert_eq!(config.cache_dir, PathBuf::from(".kindred/cache"));
        assert_eq!(config.expire_hours, 720); // 30 days
        assert_eq!(config.facet_ttl(), Duration::from_secs(3600));
        assert_eq!(config.facet_max_entries, 1000);
    }

    #[test]
    fn test_stage_caps_budgeted_against_ceiling() {
        let config = DiscoveryConfig {
            angle_parallels: 12,
            person_parallels: 0,
            ..Default::default()
        };

        assert_eq!(
            config.stage_caps(4),
            StageCaps {
                angle: 4,
                person: 1
            }
        );
        assert_eq!(
            config.stage_caps(0),
            StageCaps {
                angle: 1,
                person: 1
            }
        );
    }

    #[test]
    fn test_timeouts_never_zero() {
        let config = DiscoveryConfig {
            call_timeout_seconds: 0,
            item_timeout_seconds: 0,
            ..Default::default()
        };

        assert_eq!(config.call_timeout(), Duration::from_secs(1));
        assert_eq!(config.item_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_config_from_file_partial_sections() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("kindred.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
verbose = true

[llm]
provider = "openai"
model_efficient = "gpt-4o-mini"
max_parallels = 4

[discovery]
max_research_attempts = 5
person_parallels = 2

[cache]
enabled = false
"#
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();

        assert!(config.verbose);
        assert_eq!(config.llm.provider, LLMProvider::OpenAI);
        assert_eq!(config.llm.model_efficient, "gpt-4o-mini");
        assert_eq!(config.llm.max_parallels, 4);
        // 未出现的字段使用默认值
        assert_eq!(config.llm.retry_attempts, 3);
        assert_eq!(config.discovery.max_research_attempts, 5);
        assert_eq!(config.discovery.person_parallels, 2);
        assert_eq!(config.discovery.combination_count, 15);
        assert!(!config.cache.enabled);
    }

    #[test]
    fn test_config_from_missing_file() {
        let result = Config::from_file(&PathBuf::from("/nonexistent/kindred.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_config_from_invalid_toml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.toml");
        std::fs::write(&path, "[llm\nprovider = ").unwrap();

        assert!(Config::from_file(&path).is_err());
    }
}
