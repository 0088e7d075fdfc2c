pub mod adapter;
pub mod aliyun;
pub mod baidu;
pub mod registry;

pub use adapter::{ControlKind, ProviderAdapter};
pub use aliyun::{AliyunRecognizer, AliyunSynthesizer};
pub use baidu::{BaiduRecognizer, BaiduSynthesizer};
pub use registry::ProviderRegistry;
