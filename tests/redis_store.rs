//! Runs against a live server when `REDIS_URL` is set; otherwise each test
//! returns early. Every test works under its own key prefix.

use std::sync::Arc;

use listing_tracker::model::{EntityId, Sample};
use listing_tracker::range::TimeRange;
use listing_tracker::store::{EntityStore, RedisStore, StoreError};

async fn store() -> Option<RedisStore> {
    let Ok(url) = std::env::var("REDIS_URL") else {
        eprintln!("REDIS_URL not set, skipping");
        return None;
    };
    let store = RedisStore::connect(&url).await.expect("connect to REDIS_URL");
    Some(store.with_prefix(format!("test-{}", EntityId::new())))
}

#[tokio::test]
async fn create_is_unique_per_pair() {
    let Some(store) = store().await else { return };

    let id = store.create("moskva", "iphone").await.unwrap();
    match store.create("moskva", "iphone").await {
        Err(StoreError::AlreadyExists { existing, .. }) => assert_eq!(existing, id),
        other => panic!("expected AlreadyExists, got {other:?}"),
    }

    let entity = store.get(id).await.unwrap();
    assert_eq!(entity.header.region, "moskva");
    assert!(entity.samples.is_empty());
    assert!(entity.top_items.is_empty());
}

#[tokio::test]
async fn pairs_differing_around_a_colon_are_distinct() {
    let Some(store) = store().await else { return };

    let a = store.create("moskva", "b:c").await.unwrap();
    let b = store.create("moskva:b", "c").await.unwrap();
    assert_ne!(a, b);
}

#[tokio::test]
async fn concurrent_creates_have_one_winner() {
    let Some(store) = store().await else { return };
    let store = Arc::new(store);

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.create("spb", "lada").await })
        })
        .collect();

    let mut winners = Vec::new();
    let mut losers = Vec::new();
    for h in handles {
        match h.await.unwrap() {
            Ok(id) => winners.push(id),
            Err(StoreError::AlreadyExists { existing, .. }) => losers.push(existing),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(winners.len(), 1);
    assert!(losers.iter().all(|id| *id == winners[0]));
    // The winner's record is complete as soon as anyone can see its id.
    assert!(store.get(winners[0]).await.is_ok());
    assert_eq!(store.list_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn append_checks_existence_and_order() {
    let Some(store) = store().await else { return };
    let id = store.create("moskva", "iphone").await.unwrap();

    store.append_sample(id, Sample::recorded(100.0, 5)).await.unwrap();
    store.append_sample(id, Sample::recorded(100.0, 6)).await.unwrap();
    store.append_sample(id, Sample::gap(200.0)).await.unwrap();

    match store.append_sample(id, Sample::recorded(150.0, 1)).await {
        Err(StoreError::OutOfOrder { last, attempted }) => {
            assert_eq!(last, 200.0);
            assert_eq!(attempted, 150.0);
        }
        other => panic!("expected OutOfOrder, got {other:?}"),
    }

    let missing = EntityId::new();
    assert!(matches!(
        store.append_sample(missing, Sample::recorded(1.0, 1)).await,
        Err(StoreError::NotFound(id)) if id == missing
    ));

    let samples = store.get(id).await.unwrap().samples;
    assert_eq!(
        samples,
        vec![Sample::recorded(100.0, 5), Sample::recorded(100.0, 6), Sample::gap(200.0)]
    );
}

#[tokio::test]
async fn range_reads_only_the_closed_interval() {
    let Some(store) = store().await else { return };
    let id = store.create("moskva", "iphone").await.unwrap();
    for sample in [
        Sample::recorded(100.0, 5),
        Sample::recorded(200.0, 7),
        Sample::recorded(200.0, 8),
        Sample::gap(300.0),
    ] {
        store.append_sample(id, sample).await.unwrap();
    }

    let got = store.samples_in_range(id, TimeRange::new(150.0, 300.0)).await.unwrap();
    assert_eq!(
        got,
        vec![Sample::recorded(200.0, 7), Sample::recorded(200.0, 8), Sample::gap(300.0)]
    );

    let all = store
        .samples_in_range(id, TimeRange::new(f64::NEG_INFINITY, f64::INFINITY))
        .await
        .unwrap();
    assert_eq!(all.len(), 4);

    assert!(store.samples_in_range(id, TimeRange::new(300.0, 100.0)).await.unwrap().is_empty());
    assert!(store.samples_in_range(id, TimeRange::new(f64::NAN, 300.0)).await.unwrap().is_empty());
    assert!(matches!(
        store.samples_in_range(EntityId::new(), TimeRange::new(0.0, 1.0)).await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn top_items_are_capped_and_listed_in_creation_order() {
    let Some(store) = store().await else { return };
    let a = store.create("moskva", "iphone").await.unwrap();
    let b = store.create("spb", "lada").await.unwrap();

    let items: Vec<String> = (0..7).map(|i| format!("https://x/{i}")).collect();
    store.set_top_items(a, items.clone()).await.unwrap();
    assert_eq!(store.top_items(a).await.unwrap(), items[..5].to_vec());
    assert!(store.top_items(b).await.unwrap().is_empty());
    assert!(matches!(
        store.set_top_items(EntityId::new(), items).await,
        Err(StoreError::NotFound(_))
    ));

    let ids: Vec<EntityId> = store.list_all().await.unwrap().iter().map(|h| h.id).collect();
    assert_eq!(ids, vec![a, b]);
}
