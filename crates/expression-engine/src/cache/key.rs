//! 缓存键

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rustc_hash::FxHasher;

use crate::value::ValueSignature;

/// 缓存键
///
/// `digest` 是规范文本的 FxHash 摘要，用于哈希和分片选择；
/// 相等性比较规范文本本身，摘要碰撞不会让两个不同的程序共用一个条目。
#[derive(Clone)]
pub struct CacheKey {
    digest: u64,
    text: Arc<str>,
}

impl CacheKey {
    /// 以任意文本为键（模式缓存使用展开后的模式文本）
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        let text = text.into();
        Self {
            digest: digest_of(&text),
            text,
        }
    }

    /// 以表达式文本和输入类型签名为键
    pub fn for_expression(expression: &str, signature: &ValueSignature) -> Self {
        let canonical = signature.canonical();
        let mut text = String::with_capacity(expression.len() + canonical.len() + 24);
        text.push_str(&expression.len().to_string());
        text.push(':');
        text.push_str(expression);
        text.push('|');
        text.push_str(&canonical);
        Self::new(text)
    }

    pub fn digest(&self) -> u64 {
        self.digest
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

fn digest_of(text: &str) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write(text.as_bytes());
    hasher.finish()
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.digest == other.digest && self.text == other.text
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.digest);
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({:016x})", self.digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::TypeTag;

    #[test]
    fn test_key_is_deterministic() {
        let sig = ValueSignature::new()
            .with("b", TypeTag::String)
            .with("a", TypeTag::Int);
        let k1 = CacheKey::for_expression("a > 1", &sig);
        let k2 = CacheKey::for_expression("a > 1", &sig.clone());
        assert_eq!(k1, k2);
        assert_eq!(k1.digest(), k2.digest());
    }

    #[test]
    fn test_type_change_changes_key() {
        let int_sig = ValueSignature::new().with("age", TypeTag::Int);
        let str_sig = ValueSignature::new().with("age", TypeTag::String);
        assert_ne!(
            CacheKey::for_expression("equals(\"age\", 30)", &int_sig),
            CacheKey::for_expression("equals(\"age\", 30)", &str_sig)
        );
    }

    #[test]
    fn test_expression_and_signature_do_not_alias() {
        // 表达式文本带长度前缀，拼接边界不会混淆
        let empty = ValueSignature::new();
        let sig = ValueSignature::new().with("x", TypeTag::Int);
        assert_ne!(
            CacheKey::for_expression("true|1:x=int;", &empty),
            CacheKey::for_expression("true", &sig)
        );
    }
}
