mod settings;

pub use settings::{
    BackoffKind, CacheSettings, ProviderConfig, ProviderKind, ResponseShape, RetrySettings, Settings,
    UsageSettings, ValidationSettings,
};
