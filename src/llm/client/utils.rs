use rand::Rng;
use serde_json::Value;
use std::time::Duration;

use crate::{
    config::LLMConfig,
    error::GenerationError,
    llm::client::backend::{ModelTier, OutputSchema},
};

/// 根据档位与输入长度选择模型，返回 (首选模型, 备选模型)
pub fn evaluate_befitting_model(
    llm_config: &LLMConfig,
    tier: ModelTier,
    system_prompt: &str,
    user_prompt: &str,
) -> (String, Option<String>) {
    if tier == ModelTier::Efficient && system_prompt.len() + user_prompt.len() <= 32 * 1024 {
        return (
            llm_config.model_efficient.clone(),
            Some(llm_config.model_powerful.clone()),
        );
    }
    (llm_config.model_powerful.clone(), None)
}

/// 第 `retry_index` 次重试前的等待时间（从0开始）
///
/// delay = min(base * 2^n, max) + random(0, delay * jitter)，限流错误再乘以额外倍数（不超过上限）。
pub fn backoff_delay<R: Rng>(
    llm_config: &LLMConfig,
    retry_index: u32,
    rate_limited: bool,
    rng: &mut R,
) -> Duration {
    let base = llm_config.retry_delay_ms as f64;
    let max = llm_config.max_retry_delay_ms as f64;

    let mut delay = (base * 2f64.powi(retry_index.min(30) as i32)).min(max);
    let jitter_span = delay * llm_config.jitter_factor.max(0.0);
    if jitter_span > 0.0 {
        delay += rng.random_range(0.0..jitter_span);
    }
    if rate_limited {
        delay = (delay * llm_config.rate_limit_delay_multiplier).min(max);
    }

    Duration::from_millis(delay.max(0.0) as u64)
}

/// 追加到系统提示词中的输出格式约束
pub fn schema_instruction(schema: &OutputSchema) -> String {
    let schema_text =
        serde_json::to_string_pretty(&schema.schema).unwrap_or_else(|_| "{}".to_string());
    format!(
        "**输出格式要求**\n只输出一个符合以下JSON Schema（{}）的JSON对象，不要输出任何解释性文字或Markdown：\n{}",
        schema.name, schema_text
    )
}

/// 从模型文本输出中解析JSON
///
/// 兼容 ```json 代码块包裹，以及前后夹杂说明文字的情况。
pub fn parse_json_payload(text: &str) -> Result<Value, GenerationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(GenerationError::EmptyOutput);
    }

    let unfenced = strip_code_fence(trimmed);
    if let Ok(value) = serde_json::from_str::<Value>(unfenced) {
        return Ok(value);
    }

    match (unfenced.find('{'), unfenced.rfind('}')) {
        (Some(start), Some(end)) if start < end => {
            serde_json::from_str::<Value>(&unfenced[start..=end])
                .map_err(|e| GenerationError::Malformed(e.to_string()))
        }
        _ => Err(GenerationError::Malformed(format!(
            "未找到JSON对象: {}",
            preview(unfenced)
        ))),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn preview(text: &str) -> String {
    text.chars().take(80).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_evaluate_befitting_model() {
        let config = LLMConfig::default();

        let (model, fallback) =
            evaluate_befitting_model(&config, ModelTier::Efficient, "system", "user");
        assert_eq!(model, config.model_efficient);
        assert_eq!(fallback, Some(config.model_powerful.clone()));

        let long_prompt = "x".repeat(40 * 1024);
        let (model, fallback) =
            evaluate_befitting_model(&config, ModelTier::Efficient, "system", &long_prompt);
        assert_eq!(model, config.model_powerful);
        assert!(fallback.is_none());

        let (model, fallback) = evaluate_befitting_model(&config, ModelTier::Powerful, "s", "u");
        assert_eq!(model, config.model_powerful);
        assert!(fallback.is_none());
    }

    #[test]
    fn test_backoff_delay_grows_and_caps() {
        let config = LLMConfig {
            jitter_factor: 0.0,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(7);

        assert_eq!(
            backoff_delay(&config, 0, false, &mut rng),
            Duration::from_millis(1000)
        );
        assert_eq!(
            backoff_delay(&config, 2, false, &mut rng),
            Duration::from_millis(4000)
        );
        assert_eq!(
            backoff_delay(&config, 10, false, &mut rng),
            Duration::from_millis(30_000)
        );
        // 限流错误加倍，但不超过上限
        assert_eq!(
            backoff_delay(&config, 1, true, &mut rng),
            Duration::from_millis(4000)
        );
        assert_eq!(
            backoff_delay(&config, 4, true, &mut rng),
            Duration::from_millis(30_000)
        );
    }

    #[test]
    fn test_backoff_delay_jitter_bounds() {
        let config = LLMConfig::default();
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..50 {
            let delay = backoff_delay(&config, 1, false, &mut rng);
            assert!(delay >= Duration::from_millis(2000));
            assert!(delay <= Duration::from_millis(2200));
        }
    }

    #[test]
    fn test_parse_json_payload_variants() {
        let fenced = "```json\n{\"names\": [\"Ada Lovelace\"]}\n```";
        assert_eq!(
            parse_json_payload(fenced).unwrap()["names"][0],
            "Ada Lovelace"
        );

        let chatty = "Here you go: {\"ok\": true} Hope this helps.";
        assert_eq!(parse_json_payload(chatty).unwrap()["ok"], true);

        assert!(matches!(
            parse_json_payload("   "),
            Err(GenerationError::EmptyOutput)
        ));
        assert!(matches!(
            parse_json_payload("no json here"),
            Err(GenerationError::Malformed(_))
        ));
    }
}
