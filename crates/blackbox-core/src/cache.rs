use std::collections::HashMap;

/// Last complete content per navigation path. Lives for the process only.
#[derive(Debug, Clone, Default)]
pub struct ResponseCache {
    entries: HashMap<String, String>,
}

pub fn cache_key(path: &[String]) -> String {
    path.join("__")
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &[String]) -> Option<&str> {
        self.entries.get(&cache_key(path)).map(String::as_str)
    }

    /// Returns whether the stored value changed.
    pub fn store(&mut self, path: &[String], content: &str) -> bool {
        let key = cache_key(path);
        if self.entries.get(&key).map(String::as_str) == Some(content) {
            return false;
        }
        self.entries.insert(key, content.to_string());
        true
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_reports_only_real_changes() {
        let path = vec!["home".to_string(), "user".to_string()];
        let mut cache = ResponseCache::new();

        assert!(cache.store(&path, "<p>a</p>"));
        assert!(!cache.store(&path, "<p>a</p>"));
        assert!(cache.store(&path, "<p>b</p>"));
        assert_eq!(cache.get(&path), Some("<p>b</p>"));
        assert_eq!(cache_key(&path), "home__user");
    }
}
