use crate::error::{Result, ScoutError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Listing as shown to the user and persisted per conversation thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingInput {
    pub title: String,
    pub address: String,
    pub price: i64,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredListing {
    pub id: String,
    pub thread_id: String,
    pub title: String,
    pub address: String,
    pub price: i64,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteListing {
    pub id: String,
    pub thread_id: String,
    pub title: String,
    pub address: String,
    pub price: i64,
    pub image_url: Option<String>,
    pub favorited_at: DateTime<Utc>,
}

#[async_trait]
pub trait ListingStore: Send + Sync {
    /// Insert listings, updating any with the same thread, title and address
    async fn record_listings(&self, thread_id: &str, listings: &[ListingInput]) -> Result<()>;

    /// All listings, newest first
    async fn list_listings(&self) -> Result<Vec<StoredListing>>;

    /// All favorites, newest first
    async fn list_favorites(&self) -> Result<Vec<FavoriteListing>>;

    /// Move a listing into favorites
    async fn favorite_listing(&self, listing_id: &str) -> Result<()>;

    async fn remove_listing(&self, listing_id: &str) -> Result<()>;

    async fn remove_favorite(&self, favorite_id: &str) -> Result<()>;
}

#[derive(Default)]
struct Tables {
    listings: Vec<StoredListing>,
    favorites: Vec<FavoriteListing>,
}

/// Process-local listing store
#[derive(Default)]
pub struct InMemoryListingStore {
    tables: Mutex<Tables>,
}

impl InMemoryListingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ListingStore for InMemoryListingStore {
    async fn record_listings(&self, thread_id: &str, listings: &[ListingInput]) -> Result<()> {
        let now = Utc::now();
        let mut tables = self.tables.lock();

        for listing in listings {
            let existing = tables.listings.iter().position(|l| {
                l.thread_id == thread_id && l.title == listing.title && l.address == listing.address
            });

            match existing {
                Some(index) => {
                    let stored = &mut tables.listings[index];
                    stored.price = listing.price;
                    stored.image_url = listing.image_url.clone();
                }
                None => tables.listings.push(StoredListing {
                    id: Uuid::new_v4().to_string(),
                    thread_id: thread_id.to_string(),
                    title: listing.title.clone(),
                    address: listing.address.clone(),
                    price: listing.price,
                    image_url: listing.image_url.clone(),
                    created_at: now,
                }),
            }
        }

        Ok(())
    }

    async fn list_listings(&self) -> Result<Vec<StoredListing>> {
        // Inserted in time order, so reversing gives newest first
        Ok(self.tables.lock().listings.iter().rev().cloned().collect())
    }

    async fn list_favorites(&self) -> Result<Vec<FavoriteListing>> {
        Ok(self.tables.lock().favorites.iter().rev().cloned().collect())
    }

    async fn favorite_listing(&self, listing_id: &str) -> Result<()> {
        let mut tables = self.tables.lock();

        let index = tables
            .listings
            .iter()
            .position(|l| l.id == listing_id)
            .ok_or_else(|| ScoutError::NotFound(format!("listing {}", listing_id)))?;
        let listing = tables.listings.remove(index);

        let already_favorited = tables.favorites.iter().any(|f| {
            f.thread_id == listing.thread_id
                && f.title == listing.title
                && f.address == listing.address
        });

        if !already_favorited {
            tables.favorites.push(FavoriteListing {
                id: Uuid::new_v4().to_string(),
                thread_id: listing.thread_id,
                title: listing.title,
                address: listing.address,
                price: listing.price,
                image_url: listing.image_url,
                favorited_at: Utc::now(),
            });
        }

        Ok(())
    }

    async fn remove_listing(&self, listing_id: &str) -> Result<()> {
        self.tables.lock().listings.retain(|l| l.id != listing_id);
        Ok(())
    }

    async fn remove_favorite(&self, favorite_id: &str) -> Result<()> {
        self.tables.lock().favorites.retain(|f| f.id != favorite_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(title: &str, address: &str, price: i64) -> ListingInput {
        ListingInput {
            title: title.to_string(),
            address: address.to_string(),
            price,
            image_url: None,
        }
    }

    #[tokio::test]
    async fn test_record_listings_upserts() {
        let store = InMemoryListingStore::new();
        store
            .record_listings("t1", &[input("Ellipse", "1 River Dr", 2100)])
            .await
            .unwrap();
        store
            .record_listings(
                "t1",
                &[input("Ellipse", "1 River Dr", 1950), input("Beacon", "2 Beacon Way", 1800)],
            )
            .await
            .unwrap();
        store
            .record_listings("t2", &[input("Ellipse", "1 River Dr", 2000)])
            .await
            .unwrap();

        let listings = store.list_listings().await.unwrap();
        assert_eq!(listings.len(), 3);
        assert_eq!(listings[0].thread_id, "t2");
        let updated = listings
            .iter()
            .find(|l| l.thread_id == "t1" && l.title == "Ellipse")
            .unwrap();
        assert_eq!(updated.price, 1950);
    }

    #[tokio::test]
    async fn test_favorite_moves_listing() {
        let store = InMemoryListingStore::new();
        store
            .record_listings("t1", &[input("Ellipse", "1 River Dr", 2100)])
            .await
            .unwrap();
        let id = store.list_listings().await.unwrap()[0].id.clone();

        store.favorite_listing(&id).await.unwrap();

        assert!(store.list_listings().await.unwrap().is_empty());
        let favorites = store.list_favorites().await.unwrap();
        assert_eq!(favorites.len(), 1);
        assert_eq!(favorites[0].title, "Ellipse");
    }

    #[tokio::test]
    async fn test_favorite_does_not_duplicate() {
        let store = InMemoryListingStore::new();
        for _ in 0..2 {
            store
                .record_listings("t1", &[input("Ellipse", "1 River Dr", 2100)])
                .await
                .unwrap();
            let id = store.list_listings().await.unwrap()[0].id.clone();
            store.favorite_listing(&id).await.unwrap();
        }
        assert_eq!(store.list_favorites().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_favorite_missing_listing() {
        let store = InMemoryListingStore::new();
        let err = store.favorite_listing("nope").await.unwrap_err();
        assert!(matches!(err, ScoutError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_remove_listing_and_favorite() {
        let store = InMemoryListingStore::new();
        store
            .record_listings("t1", &[input("A", "1", 1), input("B", "2", 2)])
            .await
            .unwrap();
        let listings = store.list_listings().await.unwrap();
        store.favorite_listing(&listings[0].id).await.unwrap();
        store.remove_listing(&listings[1].id).await.unwrap();
        assert!(store.list_listings().await.unwrap().is_empty());

        let favorite = store.list_favorites().await.unwrap()[0].id.clone();
        store.remove_favorite(&favorite).await.unwrap();
        assert!(store.list_favorites().await.unwrap().is_empty());
    }
}
