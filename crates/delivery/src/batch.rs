//! Partitioning of delivery items into batches.

use mediarelay_protocol::MediaKind;

use crate::types::DeliveryItem;

/// Items of a single kind sent together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub kind: MediaKind,
    pub items: Vec<DeliveryItem>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Groups items by kind in delivery order and chunks each group.
///
/// Input order is preserved within a kind. Groupable kinds are chunked to
/// at most `max_batch` items; other kinds yield batches of one.
pub fn plan_batches(items: &[DeliveryItem], max_batch: usize) -> Vec<Batch> {
    let mut batches = Vec::new();
    for kind in MediaKind::ALL {
        let of_kind: Vec<DeliveryItem> = items.iter().filter(|i| i.kind == kind).cloned().collect();
        let limit = kind.batch_limit(max_batch);
        for chunk in of_kind.chunks(limit) {
            batches.push(Batch {
                kind,
                items: chunk.to_vec(),
            });
        }
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediarelay_protocol::MediaRef;

    fn item(id: &str, kind: MediaKind) -> DeliveryItem {
        DeliveryItem {
            media: MediaRef::new(id),
            kind,
            name: id.into(),
            size: 0,
        }
    }

    #[test]
    fn orders_by_kind_and_chunks() {
        let mut items = Vec::new();
        items.push(item("doc1", MediaKind::Document));
        for i in 0..10 {
            items.push(item(&format!("p{i}"), MediaKind::Photo));
        }
        items.push(item("v1", MediaKind::Video));
        items.push(item("a1", MediaKind::Audio));
        items.push(item("a2", MediaKind::Audio));

        let batches = plan_batches(&items, 8);
        let shape: Vec<(MediaKind, usize)> = batches.iter().map(|b| (b.kind, b.len())).collect();
        assert_eq!(
            shape,
            vec![
                (MediaKind::Photo, 8),
                (MediaKind::Photo, 2),
                (MediaKind::Video, 1),
                (MediaKind::Audio, 1),
                (MediaKind::Audio, 1),
                (MediaKind::Document, 1),
            ]
        );
        assert_eq!(batches[0].items[0].name, "p0");
        assert_eq!(batches[1].items[1].name, "p9");
    }

    #[test]
    fn smaller_max_batch() {
        let items: Vec<_> = (0..5).map(|i| item(&format!("v{i}"), MediaKind::Video)).collect();
        let sizes: Vec<usize> = plan_batches(&items, 2).iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn empty_input() {
        assert!(plan_batches(&[], 8).is_empty());
    }
}
