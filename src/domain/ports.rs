use crate::domain::model::{AuditRecord, ExtensionMap};
use crate::utils::error::Result;
use async_trait::async_trait;

/// 副檔名對應表的持久化介面，load/save 皆為全有或全無
#[async_trait]
pub trait ConfigStore: Send + Sync + 'static {
    async fn load(&self) -> Result<ExtensionMap>;
    async fn save(&self, map: &ExtensionMap) -> Result<()>;
}

/// Receives one entry per attempted sort.
pub trait AuditSink: Send + Sync + 'static {
    fn record(&self, record: &AuditRecord);
}

pub trait AutostartRegistrar: Send + Sync {
    fn register(&self, command: &[String]) -> Result<()>;
}
