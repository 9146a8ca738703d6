use std::collections::HashMap;
use std::sync::Arc;

use crate::expr::{CompileError, Program, Scope, compile};

/// 按 (作用域, 源文本) 缓存编译结果，同一表达式只编译一次。
#[derive(Debug, Default)]
pub struct ExprCache {
    programs: HashMap<(Scope, String), Arc<Program>>,
    hits: usize,
}

impl ExprCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compile(&mut self, text: &str, scope: Scope) -> Result<Arc<Program>, CompileError> {
        let key = (scope, text.to_owned());
        if let Some(program) = self.programs.get(&key) {
            self.hits += 1;
            return Ok(Arc::clone(program));
        }
        let program = Arc::new(compile(text, scope)?);
        self.programs.insert(key, Arc::clone(&program));
        Ok(program)
    }

    /// 已编译的不同程序数。
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    pub fn hits(&self) -> usize {
        self.hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_compiles_once() {
        let mut cache = ExprCache::new();
        let a = cache.compile("color == 1", Scope::Guard).unwrap();
        let b = cache.compile("color == 1", Scope::Guard).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.hits(), 1);
    }

    #[test]
    fn scopes_are_cached_separately() {
        let mut cache = ExprCache::new();
        cache.compile("42", Scope::Guard).unwrap();
        cache.compile("42", Scope::Production).unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn failures_are_not_cached() {
        let mut cache = ExprCache::new();
        assert!(cache.compile("colors", Scope::Guard).is_err());
        assert!(cache.is_empty());
    }
}
