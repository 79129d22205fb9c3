//! 正则模式缓存
//!
//! 模式文本中的 `{{.Name}}` 占位符按当前模式字典展开后再编译，
//! 编译结果按展开后的文本缓存。与表达式缓存共用分片双重检查的并发设计。

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use filter_shared::config::{CacheSettings, EngineConfig};
use regex::{Captures, Regex};
use tracing::{debug, warn};

use crate::cache::{CacheKey, CacheStats, ShardedCache};
use crate::error::{EngineError, Result};

/// 模式字典
///
/// 由外部配置加载器定期刷新，本模块只读取最新快照。
pub trait PatternDictionary: Send + Sync {
    fn current(&self) -> Arc<HashMap<String, String>>;
}

/// 可热替换的模式字典
///
/// 整张映射原子替换，读者总是看到某个完整的快照。
#[derive(Clone, Default)]
pub struct SharedPatternDictionary {
    inner: Arc<ArcSwap<HashMap<String, String>>>,
}

impl SharedPatternDictionary {
    pub fn new(patterns: HashMap<String, String>) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(patterns)),
        }
    }

    /// 替换整个字典
    pub fn replace(&self, patterns: HashMap<String, String>) {
        let count = patterns.len();
        self.inner.store(Arc::new(patterns));
        debug!(patterns = count, "模式字典已更新");
    }
}

impl PatternDictionary for SharedPatternDictionary {
    fn current(&self) -> Arc<HashMap<String, String>> {
        self.inner.load_full()
    }
}

impl<const N: usize> From<[(&str, &str); N]> for SharedPatternDictionary {
    fn from(entries: [(&str, &str); N]) -> Self {
        Self::new(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

/// 占位符展开结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    pub text: String,
    /// 展开结束后仍残留的占位符名称
    pub unresolved: Vec<String>,
}

impl Expansion {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

pub struct PatternCache {
    cache: ShardedCache<Arc<Regex>>,
    dictionary: Arc<dyn PatternDictionary>,
    max_expansion_depth: usize,
    /// 匹配 {{.Name}} 格式的占位符，允许内部空白
    placeholder_regex: Regex,
}

impl PatternCache {
    pub fn new(
        settings: &CacheSettings,
        max_expansion_depth: usize,
        dictionary: Arc<dyn PatternDictionary>,
    ) -> Result<Self> {
        let capacity = NonZeroUsize::new(settings.capacity)
            .ok_or_else(|| EngineError::Config("模式缓存容量必须大于 0".to_string()))?;
        if settings.ttl_seconds == 0 {
            return Err(EngineError::Config("模式缓存 TTL 必须大于 0".to_string()));
        }

        let placeholder_regex = Regex::new(r"\{\{\s*\.([A-Za-z_][A-Za-z0-9_]*)\s*\}\}")
            .map_err(|e| EngineError::Config(format!("占位符模式无效: {}", e)))?;

        Ok(Self {
            cache: ShardedCache::new(
                "pattern",
                capacity,
                Duration::from_secs(settings.ttl_seconds),
            ),
            dictionary,
            max_expansion_depth,
            placeholder_regex,
        })
    }

    pub fn from_config(config: &EngineConfig, dictionary: Arc<dyn PatternDictionary>) -> Result<Self> {
        Self::new(&config.pattern_cache, config.max_expansion_depth, dictionary)
    }

    /// 展开占位符
    ///
    /// 每轮读取字典的最新快照替换全部已知占位符；没有占位符、本轮没有变化或
    /// 达到最大轮数时停止。
    pub fn expand(&self, pattern: &str) -> Expansion {
        let mut text = pattern.to_string();

        for _ in 0..self.max_expansion_depth {
            if !self.placeholder_regex.is_match(&text) {
                break;
            }

            let dictionary = self.dictionary.current();
            let replaced = self
                .placeholder_regex
                .replace_all(&text, |caps: &Captures<'_>| match dictionary.get(&caps[1]) {
                    Some(replacement) => replacement.clone(),
                    None => caps[0].to_string(),
                });

            if replaced == text {
                break;
            }
            text = replaced.into_owned();
        }

        let unresolved = self
            .placeholder_regex
            .captures_iter(&text)
            .map(|caps| caps[1].to_string())
            .collect();

        Expansion { text, unresolved }
    }

    /// 获取编译后的正则
    ///
    /// 占位符无法全部展开时按部分展开的文本编译；编译失败返回
    /// `EngineError::Pattern` 且不写入缓存。
    pub fn get_compiled_pattern(&self, pattern: &str) -> Result<Arc<Regex>> {
        let expansion = self.expand(pattern);
        let key = CacheKey::new(expansion.text.as_str());

        self.cache.get_or_try_insert_with(&key, || {
            if !expansion.is_complete() {
                warn!(
                    pattern = %pattern,
                    expanded = %expansion.text,
                    unresolved = ?expansion.unresolved,
                    "占位符未能全部展开，按部分展开的文本编译"
                );
            }

            match Regex::new(&expansion.text) {
                Ok(regex) => {
                    debug!(pattern = %expansion.text, "正则已编译");
                    Ok(Arc::new(regex))
                }
                Err(source) => {
                    warn!(pattern = %expansion.text, error = %source, "正则编译失败");
                    Err(EngineError::Pattern {
                        pattern: expansion.text.clone(),
                        source,
                    })
                }
            }
        })
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired()
    }

    pub fn clear(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    fn cache_with(dictionary: SharedPatternDictionary) -> PatternCache {
        PatternCache::new(&CacheSettings::new(16, 3600), 10, Arc::new(dictionary)).unwrap()
    }

    #[test]
    fn test_expands_placeholder() {
        let cache = cache_with(SharedPatternDictionary::from([("IP", r"\d+\.\d+\.\d+\.\d+")]));

        let regex = cache.get_compiled_pattern("{{.IP}}").unwrap();
        assert!(regex.is_match("1.2.3.4"));
        assert!(!regex.is_match("a.b.c.d"));
    }

    #[test]
    fn test_whitespace_inside_marker() {
        let cache = cache_with(SharedPatternDictionary::from([("Word", r"\w+")]));
        assert_eq!(cache.expand("^{{ .Word }}$").text, r"^\w+$");
    }

    #[test]
    fn test_recursive_expansion() {
        let cache = cache_with(SharedPatternDictionary::from([
            ("Octet", r"\d{1,3}"),
            ("IP", r"{{.Octet}}\.{{.Octet}}\.{{.Octet}}\.{{.Octet}}"),
            ("Endpoint", r"{{.IP}}:\d+"),
        ]));

        let expansion = cache.expand("^{{.Endpoint}}$");
        assert!(expansion.is_complete());

        let regex = cache.get_compiled_pattern("^{{.Endpoint}}$").unwrap();
        assert!(regex.is_match("10.0.0.1:8080"));
    }

    #[test]
    fn test_unknown_placeholder_terminates() {
        let cache = cache_with(SharedPatternDictionary::default());

        let expansion = cache.expand("a{{.Missing}}b");
        assert_eq!(expansion.text, "a{{.Missing}}b");
        assert_eq!(expansion.unresolved, vec!["Missing".to_string()]);

        // 部分展开的文本仍然尝试编译：`{` 在这里按字面量解析失败
        let result = cache.get_compiled_pattern("a{{.Missing}}b");
        assert!(matches!(result, Err(EngineError::Pattern { .. })));
    }

    #[test]
    fn test_self_referencing_placeholder_is_bounded() {
        let cache = cache_with(SharedPatternDictionary::from([("Loop", "x{{.Loop}}")]));

        let expansion = cache.expand("{{.Loop}}");
        assert!(!expansion.is_complete());
        assert_eq!(expansion.text.matches('x').count(), 10);
    }

    #[test]
    fn test_invalid_pattern_is_not_cached() {
        let cache = cache_with(SharedPatternDictionary::default());

        let err = cache.get_compiled_pattern("[unclosed").unwrap_err();
        assert_eq!(err.code(), "PATTERN_ERROR");
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().compile_failures, 1);
    }

    #[test]
    fn test_same_pattern_shares_instance() {
        let cache = cache_with(SharedPatternDictionary::default());
        let a = cache.get_compiled_pattern(r"^\d+$").unwrap();
        let b = cache.get_compiled_pattern(r"^\d+$").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_dictionary_swap_changes_expansion() {
        let dictionary = SharedPatternDictionary::from([("Env", "prod")]);
        let cache = cache_with(dictionary.clone());

        assert!(cache.get_compiled_pattern("^{{.Env}}$").unwrap().is_match("prod"));

        dictionary.replace(HashMap::from([("Env".to_string(), "staging".to_string())]));
        let regex = cache.get_compiled_pattern("^{{.Env}}$").unwrap();
        assert!(regex.is_match("staging"));
        assert!(!regex.is_match("prod"));
    }

    #[test]
    fn test_concurrent_compile_shares_one_regex() {
        let cache = Arc::new(cache_with(SharedPatternDictionary::default()));
        let barrier = Arc::new(Barrier::new(16));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cache.get_compiled_pattern(r"^(?:[a-z]+\.)+example\.com$").unwrap()
                })
            })
            .collect();

        let regexes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(regexes.iter().all(|r| Arc::ptr_eq(r, &regexes[0])));
        assert_eq!(cache.stats().compilations, 1);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = PatternCache::new(
            &CacheSettings::new(0, 60),
            10,
            Arc::new(SharedPatternDictionary::default()),
        );
        assert!(matches!(result, Err(EngineError::Config(_))));
    }
}
