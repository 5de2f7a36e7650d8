use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

/// Which chat user opened which ticket.
#[async_trait]
pub trait TicketRegistry: Send + Sync {
    async fn record(&self, ticket_id: u64, user_id: u64) -> Result<()>;

    async fn owner(&self, ticket_id: u64) -> Result<Option<u64>>;

    async fn contains(&self, ticket_id: u64) -> Result<bool> {
        Ok(self.owner(ticket_id).await?.is_some())
    }
}

/// Process-lifetime registry; entries are lost on restart.
#[derive(Default)]
pub struct InMemoryRegistry {
    entries: RwLock<HashMap<u64, u64>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl TicketRegistry for InMemoryRegistry {
    async fn record(&self, ticket_id: u64, user_id: u64) -> Result<()> {
        self.entries.write().await.insert(ticket_id, user_id);
        Ok(())
    }

    async fn owner(&self, ticket_id: u64) -> Result<Option<u64>> {
        Ok(self.entries.read().await.get(&ticket_id).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_record_and_lookup() {
        let registry = InMemoryRegistry::new();
        registry.record(42, 1001).await.unwrap();

        assert_eq!(registry.owner(42).await.unwrap(), Some(1001));
        assert!(registry.contains(42).await.unwrap());
        assert_eq!(registry.owner(43).await.unwrap(), None);
        assert!(!registry.contains(43).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_inserts_from_many_flows() {
        let registry = Arc::new(InMemoryRegistry::new());

        let handles: Vec<_> = (0..50u64)
            .map(|i| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.record(i, 10_000 + i).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(registry.len().await, 50);
        for i in 0..50u64 {
            assert_eq!(registry.owner(i).await.unwrap(), Some(10_000 + i));
        }
    }
}
