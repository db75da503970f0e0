//! 人名清洗与校验 - 过滤模型返回的描述性文本、机构名等非人名条目

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

/// 人名最大长度（字符数）
pub const MAX_NAME_LENGTH: usize = 60;
/// 人名最少单词数
pub const MIN_WORDS_IN_NAME: usize = 2;
/// 人名最多单词数
pub const MAX_WORDS_IN_NAME: usize = 6;
/// 长于该值的无效条目才可能藏有人名
const SALVAGE_MIN_LENGTH: usize = 10;

const HONORIFICS: [&str; 6] = ["Dr", "Mr", "Ms", "Mrs", "Jr", "Sr"];

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|pattern| Regex::new(&format!("(?i){}", pattern)).expect("valid name regex"))
        .collect()
}

static LEADING_NUMBERING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+[.)]|[-•])\s*").expect("valid numbering regex"));
static MARKDOWN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*+").expect("valid regex"));
static TRAILING_PARENTHETICAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\([^)]*\)\s*$").expect("valid regex"));
static EDGE_QUOTES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^["']+|["']+$"#).expect("valid regex"));
static DASH_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*[–-]\s+.*$").expect("valid regex"));
static COLON_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":\s+.*$").expect("valid regex"));
static ENDS_WITH_PARENTHETICAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^)]+\)$").expect("valid regex"));

static ORG_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"^(The|A|An)\s",
        r"\b(Club|Society|Foundation|Organization|Institute|Company|Inc|LLC|Corp|Corporation)\b",
        r"\b(Movement|Campaign|Project|Initiative|Committee)\b",
    ])
});

static DESCRIPTIVE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"^(Born|Called|Known|Named|From|Located|Based|Living)\s",
        r"\b(born|from|located|based)\s+(in|at|near)\s+",
        r"^(Is|Was|Are|Were|Has|Have|Had)\s",
        r"^(A|An)\s+\w+\s+(of|from|in)\b",
    ])
});

static SENTENCE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"\b(is|was|are|were|has|have|had|the|a|an|who|which|that|this|these|those)\b",
        r"\b(represents|explores|discusses|earned|received|wrote|published|works|worked)\b",
        r#"^\s*["']"#,
        r"specifically|regarding|intersection|infrastructure|including|extensively",
        r"\bshe\b|\bhe\b|\bher\b|\bhis\b|\btheir\b",
        r"^(born|called|known|named|from|located)\s",
    ])
});

static NON_NAME_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"^(cultural|values|design|teams|scale|technology|modeling|reality)$",
        r"^(Microsoft|Google|Apple|Amazon|Facebook|Netflix|Adobe)$",
        r"^(XR|VR|AR|AI|UX|UI)(\s|$)",
        r"\b(at scale|in 3D|bridging|gap)\b",
    ])
});

/// 人名被拒绝的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    InvalidName,
    TooLong,
    SentencePattern,
    WrongWordCount,
    NonNamePattern,
    BadStart,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::InvalidName => "invalid_name",
            RejectionReason::TooLong => "too_long",
            RejectionReason::SentencePattern => "sentence_pattern",
            RejectionReason::WrongWordCount => "wrong_word_count",
            RejectionReason::NonNamePattern => "non_name_pattern",
            RejectionReason::BadStart => "bad_start",
        }
    }

    /// 被拒绝的文本是否值得尝试挽回人名
    pub fn is_salvageable(&self, text: &str) -> bool {
        match self {
            RejectionReason::InvalidName => text.chars().count() > SALVAGE_MIN_LENGTH,
            RejectionReason::TooLong | RejectionReason::SentencePattern => true,
            RejectionReason::WrongWordCount => word_count(text) > MAX_WORDS_IN_NAME,
            RejectionReason::NonNamePattern | RejectionReason::BadStart => false,
        }
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 一条被拒绝的候选文本
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub text: String,
    pub reason: RejectionReason,
}

/// 一次检索输出的筛选结果
#[derive(Debug, Clone, Default)]
pub struct NameScreening {
    pub accepted: Vec<String>,
    pub rejected: Vec<Rejection>,
}

impl NameScreening {
    /// 可尝试挽回人名的被拒文本
    pub fn salvageable(&self) -> impl Iterator<Item = &Rejection> {
        self.rejected
            .iter()
            .filter(|rejection| rejection.reason.is_salvageable(&rejection.text))
    }
}

/// 按 `|`、换行与逗号拆分模型返回的人名文本
pub fn split_raw_names(text: &str) -> Vec<String> {
    text.split(['|', '\n', ','])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// 清洗人名：去掉编号、Markdown、引号、括号注释及描述性后缀
pub fn clean_name(name: &str) -> String {
    let cleaned = LEADING_NUMBERING.replace(name, "");
    let cleaned = MARKDOWN.replace_all(&cleaned, "");
    let cleaned = TRAILING_PARENTHETICAL.replace(&cleaned, "");
    let cleaned = EDGE_QUOTES.replace_all(&cleaned, "");
    let cleaned = DASH_SUFFIX.replace(&cleaned, "");
    let cleaned = COLON_SUFFIX.replace(&cleaned, "");
    cleaned.trim().to_string()
}

/// 基本的人名形态检查
pub fn is_valid_person_name(name: &str) -> bool {
    if name.is_empty() || name.contains('*') {
        return false;
    }
    if name.starts_with('"') || name.starts_with('\'') {
        return false;
    }

    let total = name.chars().count();
    let alpha = name
        .chars()
        .filter(|c| c.is_alphabetic() || c.is_whitespace())
        .count();
    if (alpha as f64) / (total as f64) < 0.7 {
        return false;
    }

    if ENDS_WITH_PARENTHETICAL.is_match(name) {
        return false;
    }

    !ORG_PATTERNS
        .iter()
        .chain(DESCRIPTIVE_PATTERNS.iter())
        .any(|pattern| pattern.is_match(name))
}

/// 校验已清洗的人名
pub fn validate_name(cleaned: &str) -> Result<(), RejectionReason> {
    if !is_valid_person_name(cleaned) {
        return Err(RejectionReason::InvalidName);
    }
    if cleaned.chars().count() > MAX_NAME_LENGTH {
        return Err(RejectionReason::TooLong);
    }
    if looks_like_sentence(cleaned) {
        return Err(RejectionReason::SentencePattern);
    }
    let words = word_count(cleaned);
    if !(MIN_WORDS_IN_NAME..=MAX_WORDS_IN_NAME).contains(&words) {
        return Err(RejectionReason::WrongWordCount);
    }
    if NON_NAME_PATTERNS
        .iter()
        .any(|pattern| pattern.is_match(cleaned))
    {
        return Err(RejectionReason::NonNamePattern);
    }
    if !starts_like_name(cleaned) {
        return Err(RejectionReason::BadStart);
    }
    Ok(())
}

/// 拆分、清洗并校验一段模型输出中的所有人名
pub fn screen_names(raw: &str) -> NameScreening {
    let mut screening = NameScreening::default();
    let mut seen = HashSet::new();

    for part in split_raw_names(raw) {
        let cleaned = clean_name(&part);
        if cleaned.is_empty() {
            continue;
        }
        match validate_name(&cleaned) {
            Ok(()) => {
                if seen.insert(normalize_name(&cleaned)) {
                    screening.accepted.push(cleaned);
                }
            }
            Err(reason) => {
                tracing::debug!("   ⏭️ 跳过非人名条目 [{}]: {}", reason, preview(&cleaned));
                screening.rejected.push(Rejection {
                    text: cleaned,
                    reason,
                });
            }
        }
    }

    screening
}

/// 按原因统计拒绝数
pub fn count_rejections<'a, I>(rejections: I) -> BTreeMap<RejectionReason, usize>
where
    I: IntoIterator<Item = &'a Rejection>,
{
    let mut counts = BTreeMap::new();
    for rejection in rejections {
        *counts.entry(rejection.reason).or_insert(0) += 1;
    }
    counts
}

/// 人名的归一化键：折叠空白并转小写
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn looks_like_sentence(name: &str) -> bool {
    SENTENCE_PATTERNS
        .iter()
        .any(|pattern| pattern.is_match(name))
        || has_sentence_break(name)
}

/// 句号后接新词视为句子断点，称谓缩写与单字母首字母除外
fn has_sentence_break(name: &str) -> bool {
    let tokens: Vec<&str> = name.split_whitespace().collect();
    tokens.windows(2).any(|pair| {
        let Some(stem) = pair[0].strip_suffix('.') else {
            return false;
        };
        let next_is_word = pair[1].chars().next().is_some_and(char::is_alphabetic);
        let is_abbreviation = HONORIFICS
            .iter()
            .any(|honorific| stem.eq_ignore_ascii_case(honorific))
            || (stem.chars().count() == 1 && stem.chars().all(char::is_alphabetic));
        next_is_word && !is_abbreviation
    })
}

fn starts_like_name(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

fn preview(text: &str) -> String {
    text.chars().take(50).collect()
}

/// 单次发现运行内的候选人名集合（大小写不敏感去重，保留首次出现的写法）
#[derive(Debug, Default)]
pub struct CandidateSet {
    keys: HashSet<String>,
    names: Vec<String>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 原子地判断并加入，已存在时返回false
    pub fn insert(&mut self, name: &str) -> bool {
        if self.keys.insert(normalize_name(name)) {
            self.names.push(name.trim().to_string());
            true
        } else {
            false
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.keys.contains(&normalize_name(name))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}
