//! crates/study_tracker_core/src/reorder.rs
//!
//! Moving and removing lesson content items while keeping their `order`
//! fields a dense `1..N` sequence.
//!
//! Every change rewrites the order of the whole lesson in one batch instead of
//! swapping two values, which also repairs gaps or duplicates left by earlier
//! partial failures.

use serde_json::json;
use tracing::{debug, info};

use crate::domain::LessonContentItem;
use crate::ports::{PortError, PortResult, WriteBatch};
use crate::store::{fields, StudyStore, LESSON_CONTENTS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
}

/// Whether a reorder actually wrote anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved,
    Unchanged,
}

/// Swaps `index` with its neighbour; returns `false` at the boundary.
fn swap_neighbour(items: &mut [LessonContentItem], index: usize, direction: MoveDirection) -> bool {
    let target = match direction {
        MoveDirection::Up if index > 0 => index - 1,
        MoveDirection::Down if index + 1 < items.len() => index + 1,
        _ => return false,
    };
    items.swap(index, target);
    true
}

/// Queues an order rewrite for every item: position `i` gets `i + 1`.
fn renumber(batch: &mut WriteBatch, items: &[LessonContentItem]) {
    for (position, item) in items.iter().enumerate() {
        batch.update(
            LESSON_CONTENTS,
            &item.id,
            fields(json!({ "order": position + 1 })),
        );
    }
}

/// Resolves where `item_id` sits now. The caller's index comes from the last
/// render and may be stale; the id wins when they disagree.
fn locate(items: &[LessonContentItem], item_id: &str, hint: usize) -> PortResult<usize> {
    if items.get(hint).is_some_and(|item| item.id == item_id) {
        return Ok(hint);
    }
    items
        .iter()
        .position(|item| item.id == item_id)
        .ok_or_else(|| PortError::NotFound(format!("{LESSON_CONTENTS}/{item_id}")))
}

pub async fn move_item(
    store: &StudyStore,
    item_id: &str,
    current_index: usize,
    lesson_id: &str,
    direction: MoveDirection,
) -> PortResult<MoveOutcome> {
    let mut items = store.lesson_contents(lesson_id).await?;
    let index = locate(&items, item_id, current_index)?;
    if !swap_neighbour(&mut items, index, direction) {
        debug!(item_id, ?direction, "at boundary, nothing to move");
        return Ok(MoveOutcome::Unchanged);
    }

    let mut batch = WriteBatch::new();
    renumber(&mut batch, &items);
    store.gateway().commit(batch).await?;
    info!(item_id, lesson_id, ?direction, "lesson content reordered");
    Ok(MoveOutcome::Moved)
}

pub async fn move_up(
    store: &StudyStore,
    item_id: &str,
    current_index: usize,
    lesson_id: &str,
) -> PortResult<MoveOutcome> {
    move_item(store, item_id, current_index, lesson_id, MoveDirection::Up).await
}

pub async fn move_down(
    store: &StudyStore,
    item_id: &str,
    current_index: usize,
    lesson_id: &str,
) -> PortResult<MoveOutcome> {
    move_item(store, item_id, current_index, lesson_id, MoveDirection::Down).await
}

/// Deletes an item and closes the gap it leaves, in a single batch.
pub async fn remove_item(store: &StudyStore, item_id: &str) -> PortResult<()> {
    let item = store
        .gateway()
        .get(LESSON_CONTENTS, item_id)
        .await?
        .ok_or_else(|| PortError::NotFound(format!("{LESSON_CONTENTS}/{item_id}")))?;
    let lesson_id = item
        .get("lessonId")
        .and_then(|v| v.as_str())
        .ok_or_else(|| PortError::Unexpected(format!("{item_id} has no lessonId")))?
        .to_string();

    let mut remaining = store.lesson_contents(&lesson_id).await?;
    remaining.retain(|i| i.id != item_id);

    let mut batch = WriteBatch::new();
    batch.delete(LESSON_CONTENTS, item_id);
    renumber(&mut batch, &remaining);
    store.gateway().commit(batch).await?;
    info!(item_id, %lesson_id, "lesson content removed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryGateway;
    use std::sync::Arc;

    async fn seeded(n: usize) -> (MemoryGateway, StudyStore, Vec<String>) {
        let gw = MemoryGateway::new();
        let store = StudyStore::new(Arc::new(gw.clone()));
        for i in 0..n {
            store
                .add_content("l1", &format!("item {i}"), "https://x", i as i64)
                .await
                .unwrap();
        }
        let ids = ids(&store).await;
        (gw, store, ids)
    }

    async fn ids(store: &StudyStore) -> Vec<String> {
        store
            .lesson_contents("l1")
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect()
    }

    async fn orders(store: &StudyStore) -> Vec<u32> {
        store
            .lesson_contents("l1")
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.order)
            .collect()
    }

    #[tokio::test]
    async fn down_then_up_restores_original_order() {
        let (_, store, original) = seeded(4).await;

        let moved = move_down(&store, &original[1], 1, "l1").await.unwrap();
        assert_eq!(moved, MoveOutcome::Moved);
        let after_down = ids(&store).await;
        assert_eq!(after_down[2], original[1]);
        assert_eq!(orders(&store).await, vec![1, 2, 3, 4]);

        move_up(&store, &original[1], 2, "l1").await.unwrap();
        assert_eq!(ids(&store).await, original);
        assert_eq!(orders(&store).await, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn boundaries_write_nothing() {
        let (gw, store, original) = seeded(3).await;
        let writes = gw.write_count();

        assert_eq!(
            move_up(&store, &original[0], 0, "l1").await.unwrap(),
            MoveOutcome::Unchanged
        );
        assert_eq!(
            move_down(&store, &original[2], 2, "l1").await.unwrap(),
            MoveOutcome::Unchanged
        );
        assert_eq!(gw.write_count(), writes);
    }

    #[tokio::test]
    async fn reorder_repairs_gaps_and_duplicates() {
        let (gw, store, original) = seeded(3).await;
        for (id, order) in original.iter().zip([2, 2, 9]) {
            let mut doc = gw.document(LESSON_CONTENTS, id).unwrap();
            doc.insert("order".into(), json!(order));
            gw.insert(LESSON_CONTENTS, id, doc);
        }
        let current = ids(&store).await;

        move_down(&store, &current[0], 0, "l1").await.unwrap();
        assert_eq!(orders(&store).await, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn stale_index_is_resolved_by_id() {
        let (_, store, original) = seeded(3).await;
        move_up(&store, &original[2], 1, "l1").await.unwrap();
        let now = ids(&store).await;
        assert_eq!(now, vec![original[0].clone(), original[2].clone(), original[1].clone()]);
    }

    #[tokio::test]
    async fn stale_first_index_does_not_pin_the_item() {
        let (_, store, original) = seeded(3).await;
        let moved = move_up(&store, &original[2], 0, "l1").await.unwrap();
        assert_eq!(moved, MoveOutcome::Moved);
        assert_eq!(
            ids(&store).await,
            vec![original[0].clone(), original[2].clone(), original[1].clone()]
        );
    }

    #[tokio::test]
    async fn removing_closes_the_gap() {
        let (gw, store, original) = seeded(3).await;
        remove_item(&store, &original[0]).await.unwrap();
        assert!(gw.document(LESSON_CONTENTS, &original[0]).is_none());
        assert_eq!(orders(&store).await, vec![1, 2]);
        assert_eq!(ids(&store).await, original[1..].to_vec());
    }
}
