//! 错误类型 - 发现流程与LLM调用边界的错误分类

/// LLM结构化生成错误
#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerationError {
    /// 模型返回空内容
    #[error("模型返回了空结果")]
    EmptyOutput,

    /// 模型返回内容无法解析为JSON
    #[error("模型输出格式错误: {0}")]
    Malformed(String),

    /// 输出与期望的schema不匹配
    #[error("模型输出不符合 {schema} 结构: {reason}")]
    SchemaMismatch { schema: &'static str, reason: String },

    /// Provider调用失败
    #[error("模型服务调用失败: {0}")]
    Provider(String),

    /// 单次调用超时
    #[error("模型服务调用超时 ({0}秒)")]
    Timeout(u64),
}

impl GenerationError {
    /// 是否为限流类错误（429 / rate limit）
    pub fn is_rate_limited(&self) -> bool {
        match self {
            GenerationError::Provider(message) => {
                let lower = message.to_lowercase();
                lower.contains("429") || lower.contains("rate")
            }
            _ => false,
        }
    }
}

/// 发现流程错误
///
/// 只有 `Extraction` 会让整次运行失败，其余都按条目隔离并计入汇总。
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// 属性提取失败，终止整次运行
    #[error("属性提取失败: {0}")]
    Extraction(String),

    /// 单个检索角度失败
    #[error("检索角度 [{angle}] 失败: {reason}")]
    SearchAngle { angle: String, reason: String },

    /// 单次人物调研调用失败，计为一次已用尝试
    #[error("人物 {name} 调研调用失败: {reason}")]
    ResearchCall { name: String, reason: String },

    /// 人物持久化失败
    #[error("人物 {name} 持久化失败: {reason}")]
    Persistence { name: String, reason: String },

    /// 外部调用或单个条目超时
    #[error("{stage} 超时 ({seconds}秒)")]
    Timeout { stage: String, seconds: u64 },

    /// 结构化生成失败（未归入具体阶段）
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// 配置或协作方初始化失败
    #[error("配置错误: {0}")]
    Config(String),

    /// 调用方取消了本次运行
    #[error("发现流程已被取消")]
    Cancelled,
}

impl DiscoveryError {
    /// 是否为终止整次运行的错误
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DiscoveryError::Extraction(_) | DiscoveryError::Config(_) | DiscoveryError::Cancelled
        )
    }

    pub(crate) fn timeout(stage: impl Into<String>, timeout: std::time::Duration) -> Self {
        DiscoveryError::Timeout {
            stage: stage.into(),
            seconds: timeout.as_secs(),
        }
    }
}
