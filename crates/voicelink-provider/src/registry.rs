use crate::adapter::ProviderAdapter;
use std::collections::HashMap;
use voicelink_core::ProviderError;

pub struct ProviderRegistry {
    factories: HashMap<String, fn() -> Box<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register("aliyun-asr", || {
            Box::new(crate::aliyun::AliyunRecognizer::new())
        });
        registry.register("aliyun-tts", || {
            Box::new(crate::aliyun::AliyunSynthesizer::new())
        });
        registry.register("baidu-asr", || Box::new(crate::baidu::BaiduRecognizer::new()));
        registry.register("baidu-tts", || Box::new(crate::baidu::BaiduSynthesizer::new()));
        registry
    }

    pub fn register(&mut self, name: &str, factory: fn() -> Box<dyn ProviderAdapter>) {
        self.factories.insert(name.to_string(), factory);
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn ProviderAdapter>, ProviderError> {
        self.factories
            .get(name)
            .map(|f| f())
            .ok_or_else(|| ProviderError::NotFound(name.to_string()))
    }

    pub fn list_providers(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
