//! Coin shop selling lives and hints

use std::sync::Arc;
use tracing::debug;

use crate::config::EconomyConfig;
use crate::events::{EventSink, UiEvent};
use crate::ledger::ResourceLedger;
use crate::storage::{StorageResult, UserId};

/// Something the shop sells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Item {
    Life,
    Hint,
}

impl Item {
    pub fn name(&self) -> &'static str {
        match self {
            Item::Life => "life",
            Item::Hint => "hint",
        }
    }
}

pub struct Shop {
    ledger: Arc<ResourceLedger>,
    events: EventSink,
    life_price: u32,
    hint_price: u32,
}

impl Shop {
    pub fn new(ledger: Arc<ResourceLedger>, events: EventSink, economy: &EconomyConfig) -> Self {
        Self {
            ledger,
            events,
            life_price: economy.life_price,
            hint_price: economy.hint_price,
        }
    }

    pub fn price(&self, item: Item) -> u32 {
        match item {
            Item::Life => self.life_price,
            Item::Hint => self.hint_price,
        }
    }

    /// Buy one unit of `item`. Emits [`UiEvent::NoCoins`] and returns false
    /// when the learner cannot afford it.
    pub async fn buy(&self, uid: &UserId, item: Item) -> StorageResult<bool> {
        let ledger = &self.ledger;
        let bought = ledger
            .purchase(uid, self.price(item), || async move {
                match item {
                    Item::Life => ledger.add_lives(uid, 1).await,
                    Item::Hint => ledger.add_hints(uid, 1).await,
                }
            })
            .await?;

        if !bought {
            debug!(%uid, item = item.name(), "not enough coins");
            self.events.emit(UiEvent::NoCoins);
        }
        Ok(bought)
    }

    pub async fn buy_life(&self, uid: &UserId) -> StorageResult<bool> {
        self.buy(uid, Item::Life).await
    }

    pub async fn buy_hint(&self, uid: &UserId) -> StorageResult<bool> {
        self.buy(uid, Item::Hint).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::regen::RegenPolicy;
    use crate::storage::backends::MemoryBackend;
    use crate::storage::{DocumentStore, RetryPolicy, UserDocument, Version};

    async fn shop(coins: u32, lives: u32) -> (Arc<MemoryBackend>, Shop, EventSink, UserId) {
        let store = Arc::new(MemoryBackend::new());
        let uid = UserId::from("buyer");
        store
            .write_user(
                &uid,
                Version::ABSENT,
                UserDocument {
                    coins: Some(coins),
                    lives: Some(lives),
                    hints: Some(0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let economy = EconomyConfig::default();
        let ledger = Arc::new(ResourceLedger::new(
            store.clone(),
            Arc::new(SystemClock),
            RetryPolicy::default(),
            RegenPolicy::from_economy(&economy),
        ));
        let events = EventSink::new();
        (store, Shop::new(ledger, events.clone(), &economy), events, uid)
    }

    #[tokio::test]
    async fn test_buy_life_and_hint() {
        let (store, shop, _events, uid) = shop(50, 2).await;

        assert!(shop.buy_life(&uid).await.unwrap());
        assert!(shop.buy_hint(&uid).await.unwrap());

        let doc = store.read_user(&uid).await.unwrap().value.unwrap();
        assert_eq!((doc.lives(), doc.hints(), doc.coins()), (3, 1, 0));
    }

    #[tokio::test]
    async fn test_short_on_coins_emits_event() {
        let (store, shop, events, uid) = shop(25, 2).await;
        let mut rx = events.subscribe();

        assert!(!shop.buy_life(&uid).await.unwrap());
        assert_eq!(rx.recv().await.unwrap(), UiEvent::NoCoins);

        let doc = store.read_user(&uid).await.unwrap().value.unwrap();
        assert_eq!((doc.lives(), doc.coins()), (2, 25));
    }

    #[tokio::test]
    async fn test_life_bought_at_cap_is_lost() {
        let (store, shop, _events, uid) = shop(30, 10).await;

        assert!(shop.buy_life(&uid).await.unwrap());
        let doc = store.read_user(&uid).await.unwrap().value.unwrap();
        assert_eq!((doc.lives(), doc.coins()), (10, 0));
    }
}
